//! Blocks and buckets: the atomic storage unit and its fixed-size container.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::binary_tree::NodeKey;

/// Plaintext placeholder payload for a vacant block: `"<filename>;<data>"`
/// with both halves zeroed, per spec §3/§6.
pub const EMPTY_DATA: &str = "0;0";

/// Sentinel leaf id for a block that has never been assigned to a leaf.
pub const UNASSIGNED: i64 = -1;

/// A block's payload and leaf assignment, either in the clear or encrypted.
/// Never mixed: `decrypt_bucket`/`encrypt_bucket` are total transitions
/// between the two variants, never a partial one (spec §9).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockState {
    /// `payload` is `"<filename>;<data>"`; `leaf_id` is the plain leaf
    /// assignment (or [`UNASSIGNED`]).
    Plain { payload: String, leaf_id: i64 },
    /// `payload` and `leaf_id` are independently RSA-OAEP ciphertexts.
    Cipher {
        payload: Vec<u8>,
        leaf_id: Vec<u8>,
    },
}

/// The atomic storage unit. `bid` is assigned once at bucket construction
/// and never changes for the lifetime of the block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    bid: u64,
    /// Tracks slot occupancy independent of `state`'s encoding. Spec §4.2
    /// defines vacancy as `payload == EMPTY_DATA`, a plaintext-content
    /// comparison; since at-rest blocks are ciphertext under randomized
    /// OAEP padding, content can no longer signal vacancy once encrypted.
    /// This flag carries the same information across the plaintext/
    /// ciphertext boundary, so `Bucket::write_data` (and hence
    /// `Server::owrite`) behaves identically whether or not the bucket is
    /// currently encrypted.
    vacant: bool,
    state: BlockState,
}

impl Block {
    /// Constructs a vacant block with the given stable id and (possibly
    /// cosmetic) leaf assignment.
    pub fn empty(bid: u64, leaf_id: i64) -> Self {
        Self {
            bid,
            vacant: true,
            state: BlockState::Plain {
                payload: EMPTY_DATA.to_string(),
                leaf_id,
            },
        }
    }

    /// This block's stable identity.
    pub fn bid(&self) -> u64 {
        self.bid
    }

    /// Whether this slot currently holds no committed data.
    pub fn is_vacant(&self) -> bool {
        self.vacant
    }

    /// Read-only access to this block's state.
    pub fn state(&self) -> &BlockState {
        &self.state
    }

    /// Overwrites this block's payload and leaf assignment, in whichever
    /// representation `payload`/`leaf_id` are given in, and marks it
    /// occupied.
    pub fn write_plain(&mut self, payload: String, leaf_id: i64) {
        self.vacant = payload == EMPTY_DATA;
        self.state = BlockState::Plain { payload, leaf_id };
    }

    /// As [`Block::write_plain`], but writing already-encrypted bytes.
    /// `vacant` must be supplied by the caller, since ciphertext content
    /// cannot be inspected for emptiness.
    pub fn write_cipher(&mut self, payload: Vec<u8>, leaf_id: Vec<u8>, vacant: bool) {
        self.vacant = vacant;
        self.state = BlockState::Cipher { payload, leaf_id };
    }

    /// Clears this block's payload to [`EMPTY_DATA`], leaving its
    /// `leaf_id` untouched (spec §3's `Block.clear`: "`self.leaf_id =
    /// UNASSIGNED` is commented out in the source; the field is left
    /// alone").
    pub fn clear(&mut self) {
        match &mut self.state {
            BlockState::Plain { payload, .. } => *payload = EMPTY_DATA.to_string(),
            BlockState::Cipher { .. } => {
                // Already ciphertext; re-assert emptiness via the flag and
                // leave bytes untouched until the next encrypt pass
                // overwrites them with a real EMPTY_DATA ciphertext.
            }
        }
        self.vacant = true;
    }

    /// If this block is in plaintext and not a filename separator-free
    /// malformed payload, returns `(filename, data)`.
    pub fn filename_and_data(&self) -> Option<(&str, &str)> {
        match &self.state {
            BlockState::Plain { payload, .. } => split_payload(payload),
            BlockState::Cipher { .. } => None,
        }
    }
}

/// Splits `"<filename>;<data>"` on the first `;`.
pub fn split_payload(payload: &str) -> Option<(&str, &str)> {
    let idx = payload.find(';')?;
    Some((&payload[..idx], &payload[idx + 1..]))
}

/// A fixed-size ordered array of blocks attached to exactly one tree node.
#[derive(Debug, Clone)]
pub struct Bucket {
    size: usize,
    key: NodeKey,
    idx_pt: usize,
    blocks: Vec<Block>,
}

impl Bucket {
    /// Builds a bucket of `size` vacant blocks owned by tree node `key`,
    /// each pre-assigned a uniformly random leaf id from `leaf_keys` (spec
    /// §4.3: "cosmetic... ensures `block.leaf_id` is always valid-looking
    /// in a leaked bucket").
    pub fn new<R: Rng>(size: usize, key: NodeKey, leaf_keys: &[NodeKey], rng: &mut R) -> Self {
        let blocks = (0..size)
            .map(|i| {
                let leaf_id = *leaf_keys.choose(rng).expect("leaf_keys is non-empty") as i64;
                Block::empty(key * size as u64 + i as u64, leaf_id)
            })
            .collect();
        Self {
            size,
            key,
            idx_pt: 0,
            blocks,
        }
    }

    /// The node key this bucket is attached to.
    pub fn key(&self) -> NodeKey {
        self.key
    }

    /// The fixed bucket size `Z`.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Writes `(payload, leaf_id)` into the lowest-indexed vacant block, or
    /// overwrites the block at the rotating `idx_pt` (advanced modulo
    /// `size`) if the bucket is full. Never fails; on overflow the
    /// overwritten block's prior contents are silently discarded (spec
    /// §4.2's deliberate lossiness, regulated by the client's flush
    /// policy).
    pub fn write_data(&mut self, payload: String, leaf_id: i64) {
        if let Some(idx) = self.get_available_blocks().into_iter().next() {
            self.blocks[idx].write_plain(payload, leaf_id);
            return;
        }
        if self.idx_pt >= self.size {
            self.idx_pt = 0;
        }
        self.blocks[self.idx_pt].write_plain(payload, leaf_id);
        self.idx_pt = (self.idx_pt + 1) % self.size;
    }

    /// As [`Bucket::write_data`] but with already-encrypted bytes; used by
    /// `Server::owrite` so the root can accept new blocks without ever
    /// decrypting.
    pub fn write_data_cipher(&mut self, payload: Vec<u8>, leaf_id: Vec<u8>) {
        if let Some(idx) = self.get_available_blocks().into_iter().next() {
            self.blocks[idx].write_cipher(payload, leaf_id, false);
            return;
        }
        if self.idx_pt >= self.size {
            self.idx_pt = 0;
        }
        self.blocks[self.idx_pt].write_cipher(payload, leaf_id, false);
        self.idx_pt = (self.idx_pt + 1) % self.size;
    }

    /// Mutable view over all blocks.
    pub fn blocks_mut(&mut self) -> &mut [Block] {
        &mut self.blocks
    }

    /// Read-only view over all blocks.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Indices of vacant blocks, lowest first.
    pub fn get_available_blocks(&self) -> Vec<usize> {
        self.blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| b.is_vacant())
            .map(|(i, _)| i)
            .collect()
    }
}
