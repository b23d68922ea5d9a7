//! The client protocol: position map, signature table, and the uniform
//! read/write/delete/flush access shape that hides which logical operation
//! touches which filename.

use std::collections::{HashMap, HashSet};

use rand::seq::SliceRandom;
use rand::{CryptoRng, Rng, RngCore};
use rsa::pkcs8::EncodePublicKey;
use rsa::RsaPublicKey;

use crate::binary_tree::NodeKey;
use crate::block::{Block, BlockState, Bucket, EMPTY_DATA};
use crate::config::OramConfig;
use crate::crypto::{self, KeyPair};
use crate::error::{OramError, OramResult};
use crate::server::Server;

const ROOT: NodeKey = 0;

/// The client: owns the position map, signature table, known-hosts set, and
/// its own RSA key pair. A client is registered against exactly one server
/// at construction time.
pub struct Client {
    key_pair: KeyPair,
    position_map: HashMap<String, NodeKey>,
    signature_table: HashMap<String, Vec<u8>>,
    known_hosts: HashSet<Vec<u8>>,
    min_leaf: NodeKey,
    max_leaf: NodeKey,
    debug_disable_encryption: bool,
}

impl Client {
    /// Registers a fresh client against `server`: generates (or loads) the
    /// client's own key pair, trusts `server`'s public key, and derives the
    /// valid leaf range from the server's tree.
    pub fn register<R: RngCore + CryptoRng>(
        server: &Server,
        config: &OramConfig,
        rng: &mut R,
    ) -> OramResult<Self> {
        let leaves = server.tree().leaves();
        let min_leaf = *leaves.iter().min().ok_or_else(|| OramError::Invariant {
            reason: "server tree has no leaves".to_string(),
        })?;
        let max_leaf = *leaves.iter().max().unwrap();

        let key_pair =
            KeyPair::generate_or_load(&config.keys_dir, "pr_key_client", "pb_key_client", rng)?;

        let mut known_hosts = HashSet::new();
        known_hosts.insert(server.public_key().to_public_key_der()?.as_bytes().to_vec());

        Ok(Self {
            key_pair,
            position_map: HashMap::new(),
            signature_table: HashMap::new(),
            known_hosts,
            min_leaf,
            max_leaf,
            debug_disable_encryption: config.debug_disable_encryption,
        })
    }

    /// This client's public key.
    pub fn public_key(&self) -> RsaPublicKey {
        self.key_pair.public_key()
    }

    /// Whether `key` (SPKI DER) is among this client's trusted servers.
    pub fn trusts(&self, key: &RsaPublicKey) -> bool {
        key.to_public_key_der()
            .map(|der| self.known_hosts.contains(der.as_bytes()))
            .unwrap_or(false)
    }

    /// Writes `data` under `filename`: path sweep, flush, then a dedicated
    /// root insertion, per spec §4.4.
    pub fn write<R: RngCore + CryptoRng>(
        &mut self,
        server: &mut Server,
        filename: &str,
        data: &str,
        rng: &mut R,
    ) -> OramResult<()> {
        let file_plain = format!("{filename};{data}");
        let leaf_id = self.assign_to_leaf(filename, rng);

        self.sweep_path(server, leaf_id, rng)?;
        self.flush(server, rng)?;
        self.commit_root_block(server, file_plain.clone(), leaf_id, rng)?;

        let signature = crypto::sign(rng, self.key_pair.private_key(), file_plain.as_bytes());
        self.signature_table.insert(filename.to_string(), signature);

        log::debug!("Client::write -- file={filename} leaf={leaf_id}");
        Ok(())
    }

    /// Reads `filename`, re-randomizing its position. Returns `None` if the
    /// block was never found on the path (overflow loss), not if the
    /// filename is unknown to this client (that is a [`OramError::NotFound`]).
    pub fn read<R: RngCore + CryptoRng>(
        &mut self,
        server: &mut Server,
        filename: &str,
        rng: &mut R,
    ) -> OramResult<Option<String>> {
        self.read_impl(server, filename, false, rng)
    }

    /// Deletes `filename`. Fails with [`OramError::NotFound`] if the block
    /// was not found on its path (spec §4.4: "must fail with not found if
    /// the read returns None").
    pub fn delete<R: RngCore + CryptoRng>(
        &mut self,
        server: &mut Server,
        filename: &str,
        rng: &mut R,
    ) -> OramResult<()> {
        match self.read_impl(server, filename, true, rng)? {
            Some(_) => Ok(()),
            None => Err(OramError::NotFound {
                filename: filename.to_string(),
            }),
        }
    }

    fn read_impl<R: RngCore + CryptoRng>(
        &mut self,
        server: &mut Server,
        filename: &str,
        delete: bool,
        rng: &mut R,
    ) -> OramResult<Option<String>> {
        let leaf_id = *self
            .position_map
            .get(filename)
            .ok_or_else(|| OramError::NotFound {
                filename: filename.to_string(),
            })?;

        let path = server
            .tree()
            .get_root_path(leaf_id)
            .ok_or_else(|| OramError::Invariant {
                reason: format!("no path for assigned leaf {leaf_id}"),
            })?
            .to_vec();

        let mut requested: Option<String> = None;

        for node in path {
            let mut bucket = server.oread(node)?;
            self.decrypt_bucket(&mut bucket);

            for idx in 0..bucket.blocks().len() {
                let matched = matches!(
                    bucket.blocks()[idx].filename_and_data(),
                    Some((name, _)) if name == filename
                );
                if !matched {
                    continue;
                }

                let (name, data) = bucket.blocks()[idx].filename_and_data().unwrap();
                let file_plain = format!("{name};{data}");

                let signature = self.signature_table.get(filename).cloned();
                let authentic = signature
                    .as_ref()
                    .map(|sig| crypto::verify(&self.key_pair.public_key(), file_plain.as_bytes(), sig))
                    .unwrap_or(false);
                if !authentic {
                    log::warn!("Client::read -- tamper detected on file={filename}");
                    return Err(OramError::TamperDetected {
                        filename: filename.to_string(),
                    });
                }

                requested = Some(data.to_string());
                bucket.blocks_mut()[idx].clear();

                let (new_payload, new_leaf) = if delete {
                    self.position_map.remove(filename);
                    (EMPTY_DATA.to_string(), self.draw_leaf(rng))
                } else {
                    let fresh = self.assign_to_leaf(filename, rng);
                    let resigned =
                        crypto::sign(rng, self.key_pair.private_key(), file_plain.as_bytes());
                    self.signature_table.insert(filename.to_string(), resigned);
                    (file_plain.clone(), fresh)
                };

                if node == ROOT {
                    self.insert_into_bucket(&mut bucket, new_payload, new_leaf, rng)?;
                } else {
                    self.commit_root_block(server, new_payload, new_leaf, rng)?;
                }

                break;
            }

            self.encrypt_bucket(&mut bucket, rng)?;
            server.owrite_bucket(node, bucket)?;
        }

        self.flush(server, rng)?;
        Ok(requested)
    }

    /// Reads, decrypts, and re-encrypts every bucket on `leaf_id`'s path
    /// without mutating any block. Used by `write` for its dummy sweep, so
    /// writes and reads issue the same shape of server interactions
    /// (Property 1).
    fn sweep_path<R: RngCore + CryptoRng>(
        &self,
        server: &mut Server,
        leaf_id: NodeKey,
        rng: &mut R,
    ) -> OramResult<()> {
        let path = server
            .tree()
            .get_root_path(leaf_id)
            .ok_or_else(|| OramError::Invariant {
                reason: format!("no path for assigned leaf {leaf_id}"),
            })?
            .to_vec();

        for node in path {
            let mut bucket = server.oread(node)?;
            self.decrypt_bucket(&mut bucket);
            self.encrypt_bucket(&mut bucket, rng)?;
            server.owrite_bucket(node, bucket)?;
        }
        Ok(())
    }

    /// Eviction pass: for every level, sample two nodes with replacement,
    /// push one randomly chosen block from each toward its assigned leaf.
    /// Returns the payloads of any blocks that overflowed out of a leaf
    /// bucket (spec §4.4 flush / §7 "Bucket overflow").
    pub fn flush<R: RngCore + CryptoRng>(
        &self,
        server: &mut Server,
        rng: &mut R,
    ) -> OramResult<Vec<String>> {
        let levels = server.tree().levels().to_vec();
        let mut evicted = Vec::new();

        for level in levels {
            let node1 = *level.choose(rng).ok_or_else(|| OramError::Invariant {
                reason: "tree level has no nodes".to_string(),
            })?;
            let node2 = *level.choose(rng).unwrap();
            let same_node = node1 == node2;

            let mut bucket1 = server.oread(node1)?;
            self.decrypt_bucket(&mut bucket1);
            let mut bucket2 = if same_node {
                None
            } else {
                let mut b = server.oread(node2)?;
                self.decrypt_bucket(&mut b);
                Some(b)
            };

            let idx1 = rng.gen_range(0..bucket1.blocks().len());
            let bid1 = bucket1.blocks()[idx1].bid();
            let (idx2, bid2) = match &bucket2 {
                Some(b2) => {
                    let i = rng.gen_range(0..b2.blocks().len());
                    (i, b2.blocks()[i].bid())
                }
                None => {
                    let i = rng.gen_range(0..bucket1.blocks().len());
                    (i, bucket1.blocks()[i].bid())
                }
            };

            if let Some(data) = self.push_down(server, &mut bucket1, idx1, node1, rng)? {
                evicted.push(data);
            }

            if bid1 != bid2 {
                let data = match &mut bucket2 {
                    Some(b2) => self.push_down(server, b2, idx2, node2, rng)?,
                    None => self.push_down(server, &mut bucket1, idx2, node1, rng)?,
                };
                if let Some(data) = data {
                    evicted.push(data);
                }
            }

            self.encrypt_bucket(&mut bucket1, rng)?;
            server.owrite_bucket(node1, bucket1)?;
            if let Some(mut b2) = bucket2 {
                self.encrypt_bucket(&mut b2, rng)?;
                server.owrite_bucket(node2, b2)?;
            }
        }

        Ok(evicted)
    }

    /// Pushes the block at `bucket[idx]` one level deeper, toward its
    /// assigned leaf. Returns `Some(data)` only when `node` is itself a
    /// leaf and the block was non-empty (an overflow eviction, spec §4.4).
    fn push_down<R: RngCore + CryptoRng>(
        &self,
        server: &mut Server,
        bucket: &mut Bucket,
        idx: usize,
        node: NodeKey,
        rng: &mut R,
    ) -> OramResult<Option<String>> {
        let (payload, leaf_id) = match bucket.blocks()[idx].state() {
            BlockState::Plain { payload, leaf_id } => (payload.clone(), *leaf_id),
            // A block we could not decrypt carries no actionable leaf_id;
            // leave it untouched (spec §7 decrypt-skip).
            BlockState::Cipher { .. } => return Ok(None),
        };

        if server.tree().is_leaf(node) {
            if payload == EMPTY_DATA {
                return Ok(None);
            }
            bucket.blocks_mut()[idx].clear();
            log::debug!("Client::flush -- overflow evicted at leaf {node}");
            return Ok(Some(payload));
        }

        let left = server
            .tree()
            .left_child(node)
            .ok_or_else(|| OramError::Invariant {
                reason: format!("node {node} has no left child"),
            })?;
        let right = server
            .tree()
            .right_child(node)
            .ok_or_else(|| OramError::Invariant {
                reason: format!("node {node} has no right child"),
            })?;

        if payload == EMPTY_DATA {
            // Nothing to move, but touch both children so the access
            // shape is identical to a real push (spec §4.4).
            for child in [left, right] {
                let mut child_bucket = server.oread(child)?;
                self.decrypt_bucket(&mut child_bucket);
                self.encrypt_bucket(&mut child_bucket, rng)?;
                server.owrite_bucket(child, child_bucket)?;
            }
            return Ok(None);
        }

        bucket.blocks_mut()[idx].clear();

        let target_path = server
            .tree()
            .get_root_path(leaf_id as NodeKey)
            .ok_or_else(|| OramError::Invariant {
                reason: format!("no path for leaf {leaf_id}"),
            })?;
        let target = if target_path.contains(&left) {
            left
        } else if target_path.contains(&right) {
            right
        } else {
            return Err(OramError::Invariant {
                reason: format!(
                    "block assigned to leaf {leaf_id} is unreachable from either child of {node}"
                ),
            });
        };

        // Deliberately asymmetric: only the chosen child is touched, the
        // sibling is left alone. See DESIGN.md's resolution of the
        // corresponding Open Question in spec §9.
        let mut child_bucket = server.oread(target)?;
        self.decrypt_bucket(&mut child_bucket);
        child_bucket.write_data(payload, leaf_id);
        self.encrypt_bucket(&mut child_bucket, rng)?;
        server.owrite_bucket(target, child_bucket)?;

        Ok(None)
    }

    fn draw_leaf<R: Rng + ?Sized>(&self, rng: &mut R) -> NodeKey {
        rng.gen_range(self.min_leaf..=self.max_leaf)
    }

    fn assign_to_leaf<R: Rng + ?Sized>(&mut self, filename: &str, rng: &mut R) -> NodeKey {
        let leaf_id = self.draw_leaf(rng);
        self.position_map.insert(filename.to_string(), leaf_id);
        leaf_id
    }

    /// Writes `(payload, leaf_id)` into a bucket the caller already holds a
    /// decrypted copy of (only ever the root, mid path-sweep). Used instead
    /// of [`Client::commit_root_block`] when the current loop iteration's
    /// local bucket *is* the root, to avoid a redundant, racing fetch of
    /// the same node (see DESIGN.md).
    fn insert_into_bucket<R: RngCore + CryptoRng>(
        &self,
        bucket: &mut Bucket,
        payload: String,
        leaf_id: NodeKey,
        rng: &mut R,
    ) -> OramResult<()> {
        if self.debug_disable_encryption {
            bucket.write_data(payload, leaf_id as i64);
            return Ok(());
        }
        let pub_key = self.key_pair.public_key();
        let payload_ct = crypto::encrypt(rng, &pub_key, payload.as_bytes())?;
        let leaf_ct = crypto::encrypt(rng, &pub_key, leaf_id.to_string().as_bytes())?;
        bucket.write_data_cipher(payload_ct, leaf_ct);
        Ok(())
    }

    /// Fetches the current root bucket, inserts `(payload, leaf_id)`, and
    /// commits it back. Used whenever the root is not the bucket the
    /// caller already has open.
    fn commit_root_block<R: RngCore + CryptoRng>(
        &self,
        server: &mut Server,
        payload: String,
        leaf_id: NodeKey,
        rng: &mut R,
    ) -> OramResult<()> {
        if self.debug_disable_encryption {
            let mut root_bucket = server.oread(ROOT)?;
            root_bucket.write_data(payload, leaf_id as i64);
            return server.owrite_bucket(ROOT, root_bucket);
        }
        let pub_key = self.key_pair.public_key();
        let payload_ct = crypto::encrypt(rng, &pub_key, payload.as_bytes())?;
        let leaf_ct = crypto::encrypt(rng, &pub_key, leaf_id.to_string().as_bytes())?;
        server.owrite(payload_ct, leaf_ct)
    }

    fn decrypt_bucket(&self, bucket: &mut Bucket) {
        if self.debug_disable_encryption {
            return;
        }
        for block in bucket.blocks_mut() {
            let (payload_ct, leaf_ct) = match block.state() {
                BlockState::Cipher { payload, leaf_id } => (payload.clone(), leaf_id.clone()),
                BlockState::Plain { .. } => continue,
            };
            match self.decrypt_block(&payload_ct, &leaf_ct) {
                Some((payload, leaf_id)) => block.write_plain(payload, leaf_id),
                None => log::trace!("Client::decrypt_bucket -- decrypt-skip on bid={}", block.bid()),
            }
        }
    }

    fn decrypt_block(&self, payload_ct: &[u8], leaf_ct: &[u8]) -> Option<(String, i64)> {
        let payload_bytes = crypto::decrypt(self.key_pair.private_key(), payload_ct).ok()?;
        let leaf_bytes = crypto::decrypt(self.key_pair.private_key(), leaf_ct).ok()?;
        let payload = String::from_utf8(payload_bytes).ok()?;
        let leaf_str = String::from_utf8(leaf_bytes).ok()?;
        let leaf_id: i64 = leaf_str.parse().ok()?;
        Some((payload, leaf_id))
    }

    fn encrypt_bucket<R: RngCore + CryptoRng>(
        &self,
        bucket: &mut Bucket,
        rng: &mut R,
    ) -> OramResult<()> {
        if self.debug_disable_encryption {
            return Ok(());
        }
        let pub_key = self.key_pair.public_key();
        for block in bucket.blocks_mut() {
            encrypt_one(block, &pub_key, rng)?;
        }
        Ok(())
    }
}

fn encrypt_one<R: RngCore + CryptoRng>(
    block: &mut Block,
    pub_key: &RsaPublicKey,
    rng: &mut R,
) -> OramResult<()> {
    let (payload, leaf_id, vacant) = match block.state() {
        BlockState::Plain { payload, leaf_id } => (payload.clone(), *leaf_id, block.is_vacant()),
        BlockState::Cipher { .. } => return Ok(()),
    };
    let payload_ct = crypto::encrypt(rng, pub_key, payload.as_bytes())?;
    let leaf_ct = crypto::encrypt(rng, pub_key, leaf_id.to_string().as_bytes())?;
    block.write_cipher(payload_ct, leaf_ct, vacant);
    Ok(())
}
