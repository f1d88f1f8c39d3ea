use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};

use super::CommitError;

/// How many nonce attempts the miner makes between cancellation checks.
const CANCEL_CHECK_INTERVAL: u64 = 1024;

/// A single block in the ledger carrying one integer payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: String, // RFC 3339, informational only
    pub payload: i64,
    pub prev_hash: String,
    pub difficulty: u32,
    pub nonce: String, // lowercase hex counter found by the miner
    pub hash: String,  // empty for genesis by convention
}

/// True iff the first `difficulty` characters of `hash` are all `'0'`.
pub fn is_valid_hash(hash: &str, difficulty: u32) -> bool {
    let want = difficulty as usize;
    hash.len() >= want && hash.bytes().take(want).all(|b| b == b'0')
}

impl Block {
    /// Create the genesis block: index 0, empty prev_hash and an empty hash.
    pub fn genesis(difficulty: u32) -> Self {
        Self {
            index: 0,
            timestamp: Utc::now().to_rfc3339(),
            payload: 0,
            prev_hash: String::new(),
            difficulty,
            nonce: String::new(),
            hash: String::new(),
        }
    }

    /// Compute the SHA-256 hex digest over the canonical concatenation of
    /// `index` (decimal), `timestamp`, `payload` (decimal), `prev_hash` and
    /// `nonce`. Deterministic: identical fields always yield the same digest.
    pub fn compute_hash(&self) -> String {
        let record = format!(
            "{}{}{}{}{}",
            self.index, self.timestamp, self.payload, self.prev_hash, self.nonce
        );
        let mut hasher = Sha256::new();
        hasher.update(record.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Mine a block extending `predecessor` by brute-forcing nonces
    /// `0, 1, 2, …` (hex-encoded) until the digest meets `difficulty`.
    ///
    /// Touches no shared state; callers run it against a tip snapshot with
    /// no lock held and must re-validate at commit time. Returns `None` if
    /// `cancel` is raised mid-search, so shutdown never waits on a miner.
    pub fn mine(
        predecessor: &Block,
        payload: i64,
        difficulty: u32,
        cancel: &AtomicBool,
    ) -> Option<Block> {
        let mut block = Block {
            index: predecessor.index + 1,
            timestamp: Utc::now().to_rfc3339(),
            payload,
            prev_hash: predecessor.hash.clone(),
            difficulty,
            nonce: String::new(),
            hash: String::new(),
        };
        for attempt in 0u64.. {
            if attempt % CANCEL_CHECK_INTERVAL == 0 && cancel.load(Ordering::Relaxed) {
                return None;
            }
            block.nonce = format!("{attempt:x}");
            let hash = block.compute_hash();
            if is_valid_hash(&hash, difficulty) {
                block.hash = hash;
                return Some(block);
            }
        }
        None
    }

    /// Check that this block legally extends `predecessor`: consecutive
    /// index, linked prev_hash, cached hash matching the recomputed digest
    /// and satisfying the difficulty predicate.
    pub fn check_extension(
        &self,
        predecessor: &Block,
        difficulty: u32,
    ) -> Result<(), CommitError> {
        if self.index != predecessor.index + 1 {
            return Err(CommitError::IndexMismatch {
                candidate: self.index,
                tip: predecessor.index,
            });
        }
        if self.prev_hash != predecessor.hash {
            return Err(CommitError::PrevHashMismatch);
        }
        if self.compute_hash() != self.hash {
            return Err(CommitError::HashMismatch);
        }
        if !is_valid_hash(&self.hash, difficulty) {
            return Err(CommitError::BelowDifficulty(difficulty));
        }
        Ok(())
    }

    /// Boolean form of [`check_extension`](Self::check_extension).
    pub fn is_valid_extension(&self, predecessor: &Block, difficulty: u32) -> bool {
        self.check_extension(predecessor, difficulty).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_cancel() -> AtomicBool {
        AtomicBool::new(false)
    }

    #[test]
    fn genesis_shape() {
        let g = Block::genesis(3);
        assert_eq!(g.index, 0);
        assert!(g.prev_hash.is_empty());
        assert!(g.hash.is_empty());
        assert!(g.nonce.is_empty());
        assert_eq!(g.difficulty, 3);
    }

    #[test]
    fn mining_meets_difficulty_and_caches_digest() {
        let genesis = Block::genesis(2);
        let b = Block::mine(&genesis, 7, 2, &no_cancel()).unwrap();
        assert_eq!(b.index, 1);
        assert_eq!(b.prev_hash, genesis.hash);
        assert!(b.hash.starts_with("00"));
        assert_eq!(b.compute_hash(), b.hash);
        assert!(b.is_valid_extension(&genesis, 2));
    }

    #[test]
    fn mining_payload_42_at_difficulty_3() {
        let genesis = Block::genesis(3);
        let b = Block::mine(&genesis, 42, 3, &no_cancel()).unwrap();
        assert_eq!(b.index, 1);
        assert_eq!(b.prev_hash, "");
        assert!(b.hash.starts_with("000"));
        assert_eq!(b.compute_hash(), b.hash);
    }

    #[test]
    fn digest_is_deterministic_and_field_sensitive() {
        let genesis = Block::genesis(1);
        let a = Block::mine(&genesis, 5, 1, &no_cancel()).unwrap();
        let b = a.clone();
        assert_eq!(a.compute_hash(), b.compute_hash());

        let mut changed = a.clone();
        changed.payload = 6;
        assert_ne!(a.compute_hash(), changed.compute_hash());

        let mut changed = a.clone();
        changed.nonce.push('f');
        assert_ne!(a.compute_hash(), changed.compute_hash());

        let mut changed = a.clone();
        changed.timestamp.push('Z');
        assert_ne!(a.compute_hash(), changed.compute_hash());

        let mut changed = a;
        changed.prev_hash.push('0');
        assert_ne!(changed.compute_hash(), b.compute_hash());
    }

    #[test]
    fn extension_checks_reject_tampering() {
        let genesis = Block::genesis(1);
        let good = Block::mine(&genesis, 9, 1, &no_cancel()).unwrap();

        let mut skipped = good.clone();
        skipped.index = 5;
        assert_eq!(
            skipped.check_extension(&genesis, 1),
            Err(CommitError::IndexMismatch { candidate: 5, tip: 0 })
        );

        let mut unlinked = good.clone();
        unlinked.prev_hash = "deadbeef".into();
        assert_eq!(
            unlinked.check_extension(&genesis, 1),
            Err(CommitError::PrevHashMismatch)
        );

        let mut mutated = good.clone();
        mutated.payload = 10;
        assert_eq!(
            mutated.check_extension(&genesis, 1),
            Err(CommitError::HashMismatch)
        );

        // A digest-consistent block still fails a stricter difficulty.
        assert_eq!(
            good.check_extension(&genesis, 64),
            Err(CommitError::BelowDifficulty(64))
        );
    }

    #[test]
    fn cancelled_search_returns_none() {
        let genesis = Block::genesis(6);
        let cancel = AtomicBool::new(true);
        assert!(Block::mine(&genesis, 1, 6, &cancel).is_none());
    }

    #[test]
    fn hash_predicate() {
        assert!(is_valid_hash("000abc", 3));
        assert!(is_valid_hash("abc", 0));
        assert!(!is_valid_hash("00abc", 3));
        assert!(!is_valid_hash("00", 3));
    }
}
