use ldap3::{controls::RawControl, DerefAliases, Ldap, Scope, SearchOptions, SearchResult};
use parse_display::{Display, FromStr};

/// How far below the base DN a search reaches.
#[derive(Display, FromStr, Default, Debug, Clone, Copy, Eq, PartialEq)]
#[display(style = "lowercase")]
pub enum SearchScope {
    /// Only the base entry itself.
    Base,
    /// Direct children of the base entry.
    #[display("one")]
    OneLevel,
    /// The base entry and all of its descendants.
    #[default]
    #[display("sub")]
    Subtree,
}

impl From<SearchScope> for Scope {
    fn from(scope: SearchScope) -> Self {
        match scope {
            SearchScope::Base => Scope::Base,
            SearchScope::OneLevel => Scope::OneLevel,
            SearchScope::Subtree => Scope::Subtree,
        }
    }
}

/// When the server dereferences alias entries during a search.
#[derive(Display, FromStr, Default, Debug, Clone, Copy, Eq, PartialEq)]
#[display(style = "lowercase")]
pub enum DerefPolicy {
    /// Aliases are returned as they are.
    Never,
    /// Aliases below the base are dereferenced.
    Searching,
    /// Only the base DN is dereferenced.
    Finding,
    /// Aliases are dereferenced everywhere.
    #[default]
    Always,
}

impl From<DerefPolicy> for DerefAliases {
    fn from(policy: DerefPolicy) -> Self {
        match policy {
            DerefPolicy::Never => DerefAliases::Never,
            DerefPolicy::Searching => DerefAliases::Searching,
            DerefPolicy::Finding => DerefAliases::Finding,
            DerefPolicy::Always => DerefAliases::Always,
        }
    }
}

/// A single search operation, built once and then handed to
/// [`DirectoryConnection::search`](super::DirectoryConnection::search).
///
/// Defaults: subtree scope, aliases always dereferenced, no size or time limit,
/// values returned along with attribute types, all user attributes (`*`), no controls.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    base: String,
    scope: SearchScope,
    deref: DerefPolicy,
    size_limit: i32,
    time_limit: i32,
    types_only: bool,
    filter: String,
    attributes: Vec<String>,
    controls: Vec<RawControl>,
}

impl SearchRequest {
    /// Creates a request searching below `base` for entries matching `filter`.
    pub fn new(base: impl ToString, filter: impl ToString) -> Self {
        Self {
            base: base.to_string(),
            scope: SearchScope::default(),
            deref: DerefPolicy::default(),
            size_limit: 0,
            time_limit: 0,
            types_only: false,
            filter: filter.to_string(),
            attributes: vec!["*".to_owned()],
            controls: Vec::new(),
        }
    }

    /// Sets the search scope.
    /// Default: [`SearchScope::Subtree`]
    pub fn with_scope(mut self, scope: SearchScope) -> Self {
        self.scope = scope;
        self
    }

    /// Sets the alias dereferencing policy.
    /// Default: [`DerefPolicy::Always`]
    pub fn with_deref(mut self, deref: DerefPolicy) -> Self {
        self.deref = deref;
        self
    }

    /// Caps the number of returned entries, `0` meaning no limit.
    /// Default: `0`
    pub fn with_size_limit(mut self, size_limit: i32) -> Self {
        self.size_limit = size_limit;
        self
    }

    /// Caps the server-side search time in seconds, `0` meaning no limit.
    /// Default: `0`
    pub fn with_time_limit(mut self, time_limit: i32) -> Self {
        self.time_limit = time_limit;
        self
    }

    /// Requests attribute types without their values.
    /// Default: `false`
    pub fn with_types_only(mut self, types_only: bool) -> Self {
        self.types_only = types_only;
        self
    }

    /// Replaces the list of requested attributes.
    /// Default: `["*"]`
    pub fn with_attributes<S: ToString>(mut self, attributes: impl IntoIterator<Item = S>) -> Self {
        self.attributes = attributes.into_iter().map(|a| a.to_string()).collect();
        self
    }

    /// Attaches request controls.
    /// Default: none
    pub fn with_controls(mut self, controls: impl IntoIterator<Item = RawControl>) -> Self {
        self.controls = controls.into_iter().collect();
        self
    }

    /// Search base DN.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Search filter.
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Search scope.
    pub fn scope(&self) -> SearchScope {
        self.scope
    }

    /// Alias dereferencing policy.
    pub fn deref(&self) -> DerefPolicy {
        self.deref
    }

    /// Size limit, `0` meaning none.
    pub fn size_limit(&self) -> i32 {
        self.size_limit
    }

    /// Time limit in seconds, `0` meaning none.
    pub fn time_limit(&self) -> i32 {
        self.time_limit
    }

    /// Whether only attribute types are requested.
    pub fn types_only(&self) -> bool {
        self.types_only
    }

    /// Requested attributes.
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    /// Attached controls.
    pub fn controls(&self) -> &[RawControl] {
        &self.controls
    }

    fn options(&self) -> SearchOptions {
        SearchOptions::new()
            .deref(self.deref.into())
            .sizelimit(self.size_limit)
            .timelimit(self.time_limit)
            .typesonly(self.types_only)
    }

    pub(super) async fn execute(&self, ldap: &mut Ldap) -> ldap3::result::Result<SearchResult> {
        ldap.with_search_options(self.options());
        if !self.controls.is_empty() {
            ldap.with_controls(self.controls.clone());
        }
        ldap.search(
            &self.base,
            self.scope.into(),
            &self.filter,
            self.attributes.as_slice(),
        )
        .await
    }
}

/// The lookup the harness runs against a freshly seeded directory: every `inetOrgPerson`
/// below `ou=users,<base_dn>`, at most one entry, only the `dn` pseudo-attribute.
pub fn users_search(base_dn: &str) -> SearchRequest {
    SearchRequest::new(format!("ou=users,{base_dn}"), "(objectClass=inetOrgPerson)")
        .with_scope(SearchScope::Subtree)
        .with_deref(DerefPolicy::Always)
        .with_size_limit(1)
        .with_time_limit(0)
        .with_types_only(false)
        .with_attributes(["dn"])
}
