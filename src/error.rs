//! Error taxonomy for the oblivious storage engine.

use thiserror::Error;

/// All recoverable and fatal error conditions a `Client` or `Server` can
/// raise. Recoverable kinds are returned from the offending logical
/// operation only; no cross-operation state is poisoned.
#[derive(Debug, Error)]
pub enum OramError {
    /// A caller-supplied argument was malformed (non-positive leaf count,
    /// unparseable payload, and similar).
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// Human-readable description of what was wrong.
        reason: String,
    },

    /// `read`/`delete` was issued for a filename absent from the position
    /// map.
    #[error("file not found: {filename}")]
    NotFound {
        /// The filename that could not be located.
        filename: String,
    },

    /// A located block's signature did not verify against the client's own
    /// public key.
    #[error("tamper detected on file: {filename}")]
    TamperDetected {
        /// The filename whose signature failed to verify.
        filename: String,
    },

    /// `oread`/`owrite` referenced a node key absent from the tree.
    #[error("node {key} does not exist in the tree")]
    UnknownNode {
        /// The offending node key.
        key: u64,
    },

    /// An internal consistency check failed: a path could not be
    /// reconstructed, or a sampled node was inconsistent with the tree
    /// topology. These are fatal; they indicate a bug, not a recoverable
    /// runtime condition.
    #[error("internal invariant violated: {reason}")]
    Invariant {
        /// Description of the violated invariant.
        reason: String,
    },

    /// Failure loading or generating RSA key material.
    #[error("key material error: {0}")]
    KeyFormat(#[from] pkcs8::Error),

    /// Failure loading or generating RSA key material via SPKI.
    #[error("public key material error: {0}")]
    SpkiFormat(#[from] spki::Error),

    /// RSA operation (encrypt/decrypt/sign/verify key construction) failed.
    #[error("rsa error: {0}")]
    Rsa(#[from] rsa::Error),

    /// Filesystem error while persisting or loading key material.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type OramResult<T> = Result<T, OramError>;
