//! The storage side: holds the bucket tree and exposes uniform "read bucket
//! by node id" / "write block to root" / "return bucket to storage"
//! primitives. Pure storage: no knowledge of plaintext, position mapping,
//! or client policy.

use rand::{CryptoRng, RngCore};
use rsa::RsaPublicKey;

use crate::binary_tree::{BinaryTree, NodeKey};
use crate::block::Bucket;
use crate::config::OramConfig;
use crate::crypto::KeyPair;
use crate::error::{OramError, OramResult};

const ROOT: NodeKey = 0;

/// The oblivious storage server. Holds the `BinaryTree` topology, one
/// encrypted [`Bucket`] per node, and its own RSA key pair (used only for
/// registration with clients; the server never decrypts anything).
pub struct Server {
    tree: BinaryTree,
    buckets: Vec<Bucket>,
    key_pair: KeyPair,
}

impl Server {
    /// Builds a server whose tree has (at least) `config.num_leaves`
    /// leaves, rounded up to the next power of two, with every node's
    /// bucket initialized to `Z = height + 1` vacant blocks, per spec §4.3.
    pub fn construct<R: RngCore + CryptoRng>(
        config: &OramConfig,
        rng: &mut R,
    ) -> OramResult<Self> {
        if config.num_leaves == 0 {
            return Err(OramError::InvalidArgument {
                reason: "num_leaves must be a positive integer".to_string(),
            });
        }
        let tree = BinaryTree::build_for_leaves(config.num_leaves)?;
        let bucket_size = tree.bucket_size();

        let mut buckets = Vec::with_capacity(tree.num_nodes() as usize);
        for key in 0..tree.num_nodes() {
            let reachable = tree
                .get_reachable_leaves(key)
                .ok_or(OramError::UnknownNode { key })?;
            buckets.push(Bucket::new(bucket_size, key, reachable, rng));
        }

        let key_pair = KeyPair::generate_or_load(
            &config.keys_dir,
            "pr_key_server",
            "pb_key_server",
            rng,
        )?;

        log::info!(
            "Server::construct -- leaves={} height={} bucket_size={}",
            tree.leaves().len(),
            tree.height(),
            bucket_size
        );

        Ok(Self {
            tree,
            buckets,
            key_pair,
        })
    }

    /// The tree topology this server stores buckets for.
    pub fn tree(&self) -> &BinaryTree {
        &self.tree
    }

    /// Number of leaves in the tree (after rounding up to a power of two).
    pub fn num_leaves(&self) -> u64 {
        self.tree.leaves().len() as u64
    }

    /// `Z`, the fixed number of blocks every bucket carries.
    pub fn bucket_size(&self) -> usize {
        self.tree.bucket_size()
    }

    /// Returns a copy of the bucket at `node_key`. The server performs no
    /// decryption; at rest this bucket's blocks are ciphertext.
    pub fn oread(&self, node_key: NodeKey) -> OramResult<Bucket> {
        log::trace!("Server::oread -- node={node_key}");
        self.buckets
            .get(node_key as usize)
            .cloned()
            .ok_or(OramError::UnknownNode { key: node_key })
    }

    /// Replaces the stored bucket at `node_key` wholesale. This is how a
    /// client "returns [a] bucket to storage" (spec §2) after re-encrypting
    /// it locally; it is the Rust-safe realization of the Python
    /// reference's shared-object-reference mutation (see DESIGN.md).
    pub fn owrite_bucket(&mut self, node_key: NodeKey, bucket: Bucket) -> OramResult<()> {
        log::trace!("Server::owrite_bucket -- node={node_key}");
        let slot = self
            .buckets
            .get_mut(node_key as usize)
            .ok_or(OramError::UnknownNode { key: node_key })?;
        *slot = bucket;
        Ok(())
    }

    /// Unconditionally inserts an already-encrypted block into the root
    /// bucket via [`Bucket::write_data_cipher`]. This is the only write
    /// entry point into the tree; all data enters at the root (spec §4.3).
    pub fn owrite(&mut self, payload: Vec<u8>, leaf_id: Vec<u8>) -> OramResult<()> {
        log::trace!("Server::owrite -- root");
        self.buckets[ROOT as usize].write_data_cipher(payload, leaf_id);
        Ok(())
    }

    /// This server's public key, for a client's registration / known-hosts
    /// bookkeeping.
    pub fn public_key(&self) -> RsaPublicKey {
        self.key_pair.public_key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn test_config(num_leaves: usize) -> (OramConfig, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = OramConfig::with_num_leaves(num_leaves);
        config.keys_dir = dir.path().to_path_buf();
        (config, dir)
    }

    #[test]
    fn construct_rounds_up_and_sizes_buckets() {
        let mut rng = StdRng::seed_from_u64(0);
        let (config, _dir) = test_config(5);
        let server = Server::construct(&config, &mut rng).unwrap();
        assert_eq!(server.num_leaves(), 8);
        assert_eq!(server.bucket_size(), 4);
        for key in 0..server.tree().num_nodes() {
            let bucket = server.oread(key).unwrap();
            assert_eq!(bucket.size(), 4);
        }
    }

    #[test]
    fn oread_unknown_node_fails() {
        let mut rng = StdRng::seed_from_u64(0);
        let (config, _dir) = test_config(2);
        let server = Server::construct(&config, &mut rng).unwrap();
        assert!(matches!(
            server.oread(9999),
            Err(OramError::UnknownNode { key: 9999 })
        ));
    }

    #[test]
    fn owrite_inserts_into_root_bucket() {
        let mut rng = StdRng::seed_from_u64(0);
        let (config, _dir) = test_config(2);
        let mut server = Server::construct(&config, &mut rng).unwrap();
        let before = server.oread(0).unwrap().get_available_blocks().len();
        server.owrite(vec![1, 2, 3], vec![4, 5, 6]).unwrap();
        let after = server.oread(0).unwrap().get_available_blocks().len();
        assert_eq!(after, before - 1);
    }
}
