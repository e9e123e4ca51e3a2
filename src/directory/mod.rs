use std::{fmt, time::Duration};

use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapError, LdapResult, SearchEntry, SearchResult};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};

mod search;

pub use search::{users_search, DerefPolicy, SearchRequest, SearchScope};

const SUCCESS: u32 = 0;
const SIZE_LIMIT_EXCEEDED: u32 = 4;

/// Authentication state of a [`DirectoryConnection`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ConnectionState {
    /// The transport is open, no bind has succeeded yet.
    Connected,
    /// A simple bind succeeded for `dn`.
    Bound {
        /// DN the connection is authenticated as.
        dn: String,
    },
    /// The connection has been unbound.
    Closed,
}

/// An LDAP connection together with the task driving its socket.
///
/// Dropping the connection aborts the driver task, which closes the socket,
/// so the connection never outlives the scope that opened it.
/// [`DirectoryConnection::close`] unbinds politely first.
pub struct DirectoryConnection {
    url: String,
    ldap: Ldap,
    driver: JoinHandle<()>,
    state: ConnectionState,
}

impl DirectoryConnection {
    /// Opens a connection to `url` (e.g. `ldap://localhost:32768`).
    pub async fn open(url: &str, timeout: Duration) -> Result<Self> {
        let settings = LdapConnSettings::new().set_conn_timeout(timeout);
        let (conn, ldap) = LdapConnAsync::with_settings(settings, url)
            .await
            .map_err(|source| Error::Connect {
                url: url.to_owned(),
                source,
            })?;
        let driver = tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                log::warn!("LDAP connection error: {e}");
            }
        });
        log::debug!("connected to {url}");

        Ok(Self {
            url: url.to_owned(),
            ldap,
            driver,
            state: ConnectionState::Connected,
        })
    }

    /// URL the connection was opened with.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Current authentication state.
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Authenticates with a DN and a plaintext password.
    pub async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()> {
        self.ldap
            .simple_bind(dn, password)
            .await
            .and_then(LdapResult::success)
            .map_err(|source| Error::Bind {
                dn: dn.to_owned(),
                source,
            })?;
        log::debug!("bound to {} as {dn}", self.url);
        self.state = ConnectionState::Bound { dn: dn.to_owned() };
        Ok(())
    }

    /// Runs `request` and returns the entries in the order the server sent them.
    ///
    /// A search hitting its size limit yields the entries received so far;
    /// a search matching nothing yields an empty vector.
    pub async fn search(&mut self, request: &SearchRequest) -> Result<Vec<SearchEntry>> {
        if !matches!(self.state, ConnectionState::Bound { .. }) {
            return Err(Error::NotBound);
        }

        let SearchResult(entries, result) = request
            .execute(&mut self.ldap)
            .await
            .map_err(|source| search_error(request, source))?;
        match result.rc {
            SUCCESS => {}
            SIZE_LIMIT_EXCEEDED => log::debug!(
                "search under '{}' stopped at size limit {}",
                request.base(),
                request.size_limit()
            ),
            _ => return Err(search_error(request, LdapError::LdapResult { result })),
        }

        log::debug!(
            "search under '{}' ({}, {}) returned {} entries",
            request.base(),
            request.scope(),
            request.filter(),
            entries.len()
        );
        Ok(entries.into_iter().map(SearchEntry::construct).collect())
    }

    /// Unbinds and marks the connection closed.
    pub async fn close(&mut self) -> Result<()> {
        if self.state == ConnectionState::Closed {
            return Ok(());
        }
        self.state = ConnectionState::Closed;
        self.ldap.unbind().await.map_err(|source| Error::Unbind {
            url: self.url.clone(),
            source,
        })
    }
}

impl fmt::Debug for DirectoryConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryConnection")
            .field("url", &self.url)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Drop for DirectoryConnection {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

fn search_error(request: &SearchRequest, source: LdapError) -> Error {
    Error::Search {
        base: request.base().to_owned(),
        filter: request.filter().to_owned(),
        source,
    }
}
