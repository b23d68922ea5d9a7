//! A Path-ORAM-style oblivious storage engine: a [`client::Client`] stores
//! named blobs on a [`server::Server`] such that the server observes only a
//! uniform sequence of bucket reads/writes, never which filename or logical
//! operation (read, write, or delete) produced them.
//!
//! See [`binary_tree`] for the tree topology, [`block`] for the bucket/block
//! storage unit, [`crypto`] for the RSA confidentiality/authenticity layer,
//! and [`config`] for the handful of construction-time knobs.

#![warn(clippy::cargo, clippy::doc_markdown, missing_docs, rustdoc::all)]

pub mod binary_tree;
pub mod block;
pub mod client;
pub mod config;
pub mod crypto;
pub mod error;
pub mod server;

pub use binary_tree::{BinaryTree, NodeKey};
pub use client::Client;
pub use config::OramConfig;
pub use error::{OramError, OramResult};
pub use server::Server;
