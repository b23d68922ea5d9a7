//! Construction-time configuration for a [`crate::server::Server`] /
//! [`crate::client::Client`] pair.

use std::path::PathBuf;

/// Tunable parameters for building an oblivious storage engine. Everything
/// else (OAEP/PSS parameters, bucket size) is derived, not user-settable,
/// per spec §6.
#[derive(Debug, Clone)]
pub struct OramConfig {
    /// Number of leaves requested for the server's bucket tree. Rounded up
    /// to the next power of two at construction.
    pub num_leaves: usize,
    /// Directory key material is persisted to and loaded from.
    pub keys_dir: PathBuf,
    /// When `true`, `Client::_encrypt_bucket`/`_decrypt_bucket` become
    /// no-ops. Spec §4.4: "this must never be enabled in deployment."
    pub debug_disable_encryption: bool,
}

impl Default for OramConfig {
    fn default() -> Self {
        Self {
            num_leaves: 8,
            keys_dir: PathBuf::from("./keys"),
            debug_disable_encryption: false,
        }
    }
}

impl OramConfig {
    /// Builds a config requesting `num_leaves` leaves, keeping the rest at
    /// their defaults.
    pub fn with_num_leaves(num_leaves: usize) -> Self {
        Self {
            num_leaves,
            ..Self::default()
        }
    }
}
