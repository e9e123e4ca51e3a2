// let's document our code for other/future developers
#![deny(missing_docs)]
#![cfg_attr(docsrs, deny(rustdoc::broken_intra_doc_links))]
#![doc = include_str!("../README.md")]
//! Please have a look at the documentation of the separate modules for examples on how to use them.

/// **ldap3** connection, simple bind and search
pub mod directory;
/// Error type shared by all modules
pub mod error;
/// Launching a seeded directory and handing it to tests as an explicit context
pub mod fixture;
/// **osixia/openldap** (ldap directory) testcontainer
pub mod osixia_openldap;

pub use error::{Error, Result};
/// Re-exported version of `ldap3` to avoid version conflicts
pub use ldap3;
/// Re-exported version of `testcontainers` to avoid version conflicts
pub use testcontainers;
