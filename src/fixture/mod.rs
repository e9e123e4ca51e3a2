use std::{
    fmt, fs, io,
    path::{self, Path, PathBuf},
    time::Duration,
};

use retry::delay::Fixed;
use testcontainers::{
    core::ContainerPort, runners::AsyncRunner, ContainerAsync, Image, ImageExt,
};
use tokio::time::Instant;

use crate::{
    directory::DirectoryConnection,
    error::{Error, Result},
    osixia_openldap::{OsixiaOpenLdap, LDAP_PORT},
};

const DEFAULT_ADMIN_PASSWORD: &str = "admin";
const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const PROBE_INTERVAL_MS: u64 = 250;

/// Everything needed to launch a seeded `osixia/openldap` container.
///
/// # Example
/// ```no_run
/// use openldap_interop::{directory::users_search, fixture::LdapContainerRequest};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error + 'static>> {
/// let ctx = LdapContainerRequest::new("/abs/path/test.ldif", "dc=test,dc=com", "Test", "test.com")
///     .start()
///     .await?;
/// let mut conn = ctx.connect_as_admin().await?;
/// let users = conn.search(&users_search(ctx.base_dn())).await?;
/// # let _ = users;
/// conn.close().await?;
/// ctx.terminate().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct LdapContainerRequest {
    ldif: PathBuf,
    base_dn: String,
    org_name: String,
    domain: String,
    tls: bool,
    admin_password: String,
    startup_timeout: Duration,
    readiness_probe: bool,
}

impl LdapContainerRequest {
    /// Creates a request. A relative `ldif` path is resolved against the current directory,
    /// since the file is bind-mounted.
    pub fn new(
        ldif: impl AsRef<Path>,
        base_dn: impl ToString,
        org_name: impl ToString,
        domain: impl ToString,
    ) -> Self {
        Self {
            ldif: path::absolute(ldif.as_ref()).unwrap_or_else(|_| ldif.as_ref().to_path_buf()),
            base_dn: base_dn.to_string(),
            org_name: org_name.to_string(),
            domain: domain.to_string(),
            tls: false,
            admin_password: DEFAULT_ADMIN_PASSWORD.to_owned(),
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            readiness_probe: true,
        }
    }

    /// Enables TLS inside of the container.
    /// Default: `false`
    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    /// Sets the password of `cn=admin,<base dn>`.
    /// Default: `"admin"`
    pub fn with_admin_password(mut self, password: impl ToString) -> Self {
        self.admin_password = password.to_string();
        self
    }

    /// Bounds the wait for the readiness log line and the readiness probe.
    /// Default: 60 seconds
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Whether to wait, after the readiness log line, until the administrator can bind
    /// through the mapped port.
    /// Default: `true`
    pub fn with_readiness_probe(mut self, readiness_probe: bool) -> Self {
        self.readiness_probe = readiness_probe;
        self
    }

    /// Base DN the directory is created with.
    pub fn base_dn(&self) -> &str {
        &self.base_dn
    }

    /// Bootstrap LDIF that will be mounted into the container.
    pub fn ldif(&self) -> &Path {
        &self.ldif
    }

    /// Checks that all names are set and that the bootstrap LDIF is a readable regular file.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("base_dn", &self.base_dn),
            ("org_name", &self.org_name),
            ("domain", &self.domain),
        ] {
            if value.trim().is_empty() {
                return Err(Error::InvalidRequest(field));
            }
        }
        let bootstrap_error = |source| Error::BootstrapFile {
            path: self.ldif.clone(),
            source,
        };
        if !fs::metadata(&self.ldif).map_err(bootstrap_error)?.is_file() {
            return Err(bootstrap_error(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a regular file",
            )));
        }
        fs::File::open(&self.ldif).map_err(bootstrap_error)?;
        Ok(())
    }

    /// The container specification this request describes.
    pub fn image(&self) -> OsixiaOpenLdap {
        OsixiaOpenLdap::default()
            .with_organisation(&self.org_name)
            .with_domain(&self.domain)
            .with_base_dn(&self.base_dn)
            .with_tls(self.tls)
            .with_admin_password(&self.admin_password)
            .with_bootstrap_ldif(&self.ldif)
    }

    /// Starts the container and waits until the directory accepts an administrator bind.
    ///
    /// The returned [`LdapContext`] owns the container; dropping it removes the container.
    pub async fn start(self) -> Result<LdapContext> {
        self.validate()?;
        let image = self.image();
        log::info!(
            "starting {}:{} for {}",
            image.name(),
            image.tag(),
            self.base_dn
        );
        let container = image
            .with_startup_timeout(self.startup_timeout)
            .start()
            .await
            .map_err(Error::Startup)?;

        let host = container
            .get_host()
            .await
            .map_err(Error::Startup)?
            .to_string();
        let port = resolve_mapped_port(&container, LDAP_PORT).await?;
        log::info!("directory for {} listening on {host} ({port})", self.base_dn);

        let ctx = LdapContext {
            container,
            host,
            port,
            base_dn: self.base_dn,
            admin_password: self.admin_password,
        };
        if self.readiness_probe {
            wait_for_directory(
                &ctx.url(),
                &ctx.admin_dn(),
                &ctx.admin_password,
                self.startup_timeout,
            )
            .await?;
        }
        Ok(ctx)
    }
}

/// A host port published for one of the container's internal ports.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct MappedPort {
    internal: ContainerPort,
    host_port: u16,
}

impl MappedPort {
    /// Protocol tag of the mapping, e.g. `"tcp"`.
    pub fn protocol(&self) -> &'static str {
        protocol_tag(self.internal)
    }

    /// Port inside of the container.
    pub fn internal(&self) -> ContainerPort {
        self.internal
    }

    /// Port on the host.
    pub fn port(&self) -> u16 {
        self.host_port
    }
}

impl fmt::Display for MappedPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} -> {}",
            self.internal.as_u16(),
            self.protocol(),
            self.host_port
        )
    }
}

/// Looks up the host port the container publishes for `internal`.
pub async fn resolve_mapped_port<I: Image>(
    container: &ContainerAsync<I>,
    internal: ContainerPort,
) -> Result<MappedPort> {
    let host_port = container
        .get_host_port_ipv4(internal)
        .await
        .map_err(|source| Error::PortMapping {
            port: format!("{}/{}", internal.as_u16(), protocol_tag(internal)),
            source,
        })?;
    Ok(MappedPort {
        internal,
        host_port,
    })
}

fn protocol_tag(port: ContainerPort) -> &'static str {
    match port {
        ContainerPort::Tcp(_) => "tcp",
        ContainerPort::Udp(_) => "udp",
        ContainerPort::Sctp(_) => "sctp",
    }
}

// The published port is accepted by the docker proxy before slapd listens, and the
// bootstrap slapd prints the readiness line too. Only an answered bind counts.
async fn wait_for_directory(url: &str, dn: &str, password: &str, timeout: Duration) -> Result<()> {
    let started = Instant::now();
    for delay in Fixed::from_millis(PROBE_INTERVAL_MS) {
        let remaining = timeout.saturating_sub(started.elapsed());
        match tokio::time::timeout(remaining, try_bind(url, dn, password)).await {
            Ok(Ok(())) => {
                log::debug!("{url} accepted a bind after {:?}", started.elapsed());
                return Ok(());
            }
            Ok(Err(e)) => log::debug!("{url} not ready yet: {e}"),
            Err(_) => break,
        }
        if started.elapsed() + delay >= timeout {
            break;
        }
        tokio::time::sleep(delay).await;
    }
    Err(Error::Unreachable {
        address: url.to_owned(),
        timeout,
    })
}

async fn try_bind(url: &str, dn: &str, password: &str) -> Result<()> {
    let mut conn = DirectoryConnection::open(url, CONNECT_TIMEOUT).await?;
    conn.simple_bind(dn, password).await?;
    conn.close().await
}

/// A running, seeded directory and everything needed to talk to it.
///
/// Passed explicitly to whatever needs the server; dropping it removes the container.
pub struct LdapContext {
    container: ContainerAsync<OsixiaOpenLdap>,
    host: String,
    port: MappedPort,
    base_dn: String,
    admin_password: String,
}

impl LdapContext {
    /// Host the container is reachable on.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Host port mapped to the server's `389/tcp`.
    pub fn mapped_port(&self) -> MappedPort {
        self.port
    }

    /// Base DN of the directory.
    pub fn base_dn(&self) -> &str {
        &self.base_dn
    }

    /// `cn=admin,<base dn>`
    pub fn admin_dn(&self) -> String {
        format!("cn=admin,{}", self.base_dn)
    }

    /// `ldap://<host>:<mapped port>`
    pub fn url(&self) -> String {
        format!("ldap://{}:{}", self.host, self.port.port())
    }

    /// Opens an unauthenticated connection.
    pub async fn connect(&self) -> Result<DirectoryConnection> {
        DirectoryConnection::open(&self.url(), CONNECT_TIMEOUT).await
    }

    /// Opens a connection and binds as the administrator.
    pub async fn connect_as_admin(&self) -> Result<DirectoryConnection> {
        let mut conn = self.connect().await?;
        conn.simple_bind(&self.admin_dn(), &self.admin_password)
            .await?;
        Ok(conn)
    }

    /// Stops and removes the container.
    pub async fn terminate(self) -> Result<()> {
        log::info!("terminating directory for {}", self.base_dn);
        self.container.rm().await.map_err(Error::Terminate)
    }
}

impl fmt::Debug for LdapContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LdapContext")
            .field("container", &self.container.id())
            .field("host", &self.host)
            .field("port", &self.port)
            .field("base_dn", &self.base_dn)
            .finish_non_exhaustive()
    }
}
