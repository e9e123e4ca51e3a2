use std::{io, path::PathBuf, time::Duration};

use ldap3::LdapError;
use testcontainers::TestcontainersError;

/// Result code the server returns for a bind with a wrong DN or password.
const INVALID_CREDENTIALS: u32 = 49;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong between launching the container and reading search results.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required field of the container request was left empty.
    #[error("invalid LDAP container request: {0} must not be empty")]
    InvalidRequest(&'static str),

    /// The bootstrap LDIF is missing, unreadable or not a regular file.
    #[error("bootstrap LDIF '{}' is not a readable file", path.display())]
    BootstrapFile {
        /// Path that was handed to the request.
        path: PathBuf,
        /// Underlying IO failure.
        #[source]
        source: io::Error,
    },

    /// The image could not be pulled or started, or readiness timed out.
    #[error("failed to start the LDAP container")]
    Startup(#[source] TestcontainersError),

    /// The container does not publish the requested port.
    #[error("failed to resolve the host port mapped to {port}")]
    PortMapping {
        /// Internal port, e.g. `389/tcp`.
        port: String,
        /// Error reported by the container runtime.
        #[source]
        source: TestcontainersError,
    },

    /// Removing the container failed.
    #[error("failed to terminate the LDAP container")]
    Terminate(#[source] TestcontainersError),

    /// The directory never answered an administrator bind.
    #[error("{address} did not accept an administrator bind within {timeout:?}")]
    Unreachable {
        /// `ldap://` URL that was probed.
        address: String,
        /// Total time spent probing.
        timeout: Duration,
    },

    /// Opening the LDAP connection failed.
    #[error("failed to connect to {url}")]
    Connect {
        /// `ldap://` URL of the server.
        url: String,
        /// Client error.
        #[source]
        source: LdapError,
    },

    /// The server rejected the simple bind.
    #[error("simple bind as '{dn}' failed")]
    Bind {
        /// DN used for the bind.
        dn: String,
        /// Client error, usually carrying the server's result code.
        #[source]
        source: LdapError,
    },

    /// Unbinding while closing a connection failed.
    #[error("failed to unbind from {url}")]
    Unbind {
        /// `ldap://` URL of the server.
        url: String,
        /// Client error.
        #[source]
        source: LdapError,
    },

    /// A search was issued on a connection that has not been bound (or is closed).
    #[error("search issued on a connection that is not bound")]
    NotBound,

    /// The search was malformed or the server answered with an error code.
    #[error("search under '{base}' with filter '{filter}' failed")]
    Search {
        /// Search base DN.
        base: String,
        /// Search filter.
        filter: String,
        /// Client error.
        #[source]
        source: LdapError,
    },
}

impl Error {
    /// `true` when the server refused a bind because of bad credentials.
    pub fn is_invalid_credentials(&self) -> bool {
        match self {
            Error::Bind {
                source: LdapError::LdapResult { result },
                ..
            } => result.rc == INVALID_CREDENTIALS,
            _ => false,
        }
    }

    /// `true` for failures that leave no live server to test against.
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            Error::InvalidRequest(_)
                | Error::BootstrapFile { .. }
                | Error::Startup(_)
                | Error::PortMapping { .. }
                | Error::Unreachable { .. }
                | Error::Connect { .. }
        )
    }
}
