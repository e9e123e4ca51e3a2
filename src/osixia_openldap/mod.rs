use std::{borrow::Cow, collections::HashMap, path::Path};

use testcontainers::{
    core::{AccessMode, ContainerPort, Mount, WaitFor},
    Image,
};

const NAME: &str = "osixia/openldap";
const TAG: &str = "1.3.0";

/// Port the `slapd` daemon listens on inside of the container.
/// Can be rebound externally via [`testcontainers::core::ImageExt::with_mapped_port`]
pub const LDAP_PORT: ContainerPort = ContainerPort::Tcp(389);

/// Location inside of the container from which the image loads custom seed data on first start.
pub const BOOTSTRAP_LDIF_PATH: &str =
    "/container/service/slapd/assets/config/bootstrap/ldif/custom/node.ldif";

/// Log line `slapd` prints once the daemon has finished starting.
pub const READY_MESSAGE: &str = "slapd starting";

/// Module to work with the [`osixia/openldap docker image`] inside of tests.
///
/// Starts an instance of [`OpenLDAP`] configured through the image's environment variables.
/// The container is always started with `--copy-service` so that a bind-mounted bootstrap
/// LDIF (see [`OsixiaOpenLdap::with_bootstrap_ldif`]) can be processed by the startup scripts
/// without touching the host file.
///
/// # Example
/// ```no_run
/// use openldap_interop::{
///     osixia_openldap::{OsixiaOpenLdap, LDAP_PORT},
///     testcontainers::runners::AsyncRunner,
/// };
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error + 'static>> {
/// let node = OsixiaOpenLdap::default()
///     .with_organisation("Test")
///     .with_domain("test.com")
///     .with_base_dn("dc=test,dc=com")
///     .with_tls(false)
///     .start()
///     .await?;
/// let url = format!(
///     "ldap://{}:{}",
///     node.get_host().await?,
///     node.get_host_port_ipv4(LDAP_PORT).await?
/// );
/// # let _ = url;
/// # Ok(())
/// # }
/// ```
///
/// [`OpenLDAP`]: https://www.openldap.org/
/// [`osixia/openldap docker image`]: https://hub.docker.com/r/osixia/openldap
#[derive(Debug, Clone, Default)]
pub struct OsixiaOpenLdap {
    env_vars: HashMap<String, String>,
    bootstrap_mount: Option<Mount>,
}

impl OsixiaOpenLdap {
    /// Sets the organisation name.
    /// Default: `"Example Inc."`
    pub fn with_organisation(mut self, org_name: impl ToString) -> Self {
        self.env_vars
            .insert("LDAP_ORGANISATION".to_owned(), org_name.to_string());
        self
    }

    /// Sets the LDAP domain.
    /// Default: `"example.org"`
    pub fn with_domain(mut self, domain: impl ToString) -> Self {
        self.env_vars
            .insert("LDAP_DOMAIN".to_owned(), domain.to_string());
        self
    }

    /// Sets the base DN of the directory tree.
    /// Default: derived from the domain, e.g. `"dc=example,dc=org"`
    pub fn with_base_dn(mut self, base_dn: impl ToString) -> Self {
        self.env_vars
            .insert("LDAP_BASE_DN".to_owned(), base_dn.to_string());
        self
    }

    /// Enables or disables TLS support of the server.
    /// Default: `true` (the image's own default)
    pub fn with_tls(mut self, tls: bool) -> Self {
        self.env_vars
            .insert("LDAP_TLS".to_owned(), tls.to_string());
        self
    }

    /// Sets the password of `cn=admin,<base dn>`.
    /// Default: `"admin"`
    pub fn with_admin_password(mut self, password: impl ToString) -> Self {
        self.env_vars
            .insert("LDAP_ADMIN_PASSWORD".to_owned(), password.to_string());
        self
    }

    /// Mounts an LDIF file from the host read-only at [`BOOTSTRAP_LDIF_PATH`],
    /// so the entries it contains are loaded as seed data.
    pub fn with_bootstrap_ldif(self, ldif: impl AsRef<Path>) -> Self {
        let host_path = ldif.as_ref().to_string_lossy().into_owned();
        Self {
            bootstrap_mount: Some(
                Mount::bind_mount(host_path, BOOTSTRAP_LDIF_PATH)
                    .with_access_mode(AccessMode::ReadOnly),
            ),
            ..self
        }
    }
}

impl Image for OsixiaOpenLdap {
    fn name(&self) -> &str {
        NAME
    }

    fn tag(&self) -> &str {
        TAG
    }

    fn ready_conditions(&self) -> Vec<WaitFor> {
        // slapd runs in the foreground with debug output, which goes to stderr
        vec![WaitFor::message_on_stderr(READY_MESSAGE)]
    }

    fn env_vars(
        &self,
    ) -> impl IntoIterator<Item = (impl Into<Cow<'_, str>>, impl Into<Cow<'_, str>>)> {
        &self.env_vars
    }

    fn mounts(&self) -> impl IntoIterator<Item = &Mount> {
        self.bootstrap_mount.iter()
    }

    fn cmd(&self) -> impl IntoIterator<Item = impl Into<Cow<'_, str>>> {
        ["--copy-service"]
    }

    fn expose_ports(&self) -> &[ContainerPort] {
        &[LDAP_PORT]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_of(image: &OsixiaOpenLdap) -> HashMap<String, String> {
        image
            .env_vars()
            .into_iter()
            .map(|(k, v)| {
                let (k, v): (Cow<'_, str>, Cow<'_, str>) = (k.into(), v.into());
                (k.into_owned(), v.into_owned())
            })
            .collect()
    }

    #[test]
    fn image_reference_is_pinned() {
        let image = OsixiaOpenLdap::default();
        assert_eq!(image.name(), "osixia/openldap");
        assert_eq!(image.tag(), "1.3.0");
        assert_eq!(image.expose_ports(), &[ContainerPort::Tcp(389)]);
    }

    #[test]
    fn builder_sets_environment() {
        let image = OsixiaOpenLdap::default()
            .with_organisation("Test")
            .with_domain("test.com")
            .with_base_dn("dc=test,dc=com")
            .with_tls(false)
            .with_admin_password("admin");

        let env = env_of(&image);
        assert_eq!(env.len(), 5);
        assert_eq!(env["LDAP_ORGANISATION"], "Test");
        assert_eq!(env["LDAP_DOMAIN"], "test.com");
        assert_eq!(env["LDAP_BASE_DN"], "dc=test,dc=com");
        assert_eq!(env["LDAP_TLS"], "false");
        assert_eq!(env["LDAP_ADMIN_PASSWORD"], "admin");
    }

    #[test]
    fn tls_flag_is_stringified() {
        let enabled = env_of(&OsixiaOpenLdap::default().with_tls(true));
        assert_eq!(enabled["LDAP_TLS"], "true");
        let disabled = env_of(&OsixiaOpenLdap::default().with_tls(false));
        assert_eq!(disabled["LDAP_TLS"], "false");
    }

    #[test]
    fn default_leaves_image_defaults_alone() {
        let image = OsixiaOpenLdap::default();
        assert!(env_of(&image).is_empty());
        assert_eq!(image.mounts().into_iter().count(), 0);
    }

    #[test]
    fn copy_service_is_always_passed() {
        let cmd: Vec<String> = OsixiaOpenLdap::default()
            .cmd()
            .into_iter()
            .map(|arg| Into::<Cow<'_, str>>::into(arg).into_owned())
            .collect();
        assert_eq!(cmd, vec!["--copy-service".to_owned()]);
    }

    #[test]
    fn bootstrap_ldif_is_mounted_at_custom_path() {
        let image = OsixiaOpenLdap::default().with_bootstrap_ldif("/tmp/seed/test.ldif");
        let mounts: Vec<&Mount> = image.mounts().into_iter().collect();
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].source(), Some("/tmp/seed/test.ldif"));
        assert_eq!(mounts[0].target(), Some(BOOTSTRAP_LDIF_PATH));
    }

    #[test]
    fn waits_for_a_single_log_line() {
        assert_eq!(OsixiaOpenLdap::default().ready_conditions().len(), 1);
    }
}
