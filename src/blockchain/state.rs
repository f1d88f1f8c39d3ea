use std::sync::Arc;

use log::info;
use tokio::sync::{RwLock, broadcast};

use super::Block;
use super::Blockchain;
use super::CommitError;

/// Capacity of the change-notification channel. A lagging subscriber loses
/// intermediate notifications, never the latest one.
const CHANGE_CHANNEL_CAPACITY: usize = 16;

/// Shared handle to the authoritative chain.
///
/// Every session holds a clone. The write lock makes [`commit`](Self::commit)
/// the single mutation point; readers take the read lock and always see a
/// complete chain because replacement is wholesale. Successful commits fan
/// out the new chain length to all subscribers over a broadcast channel.
#[derive(Clone)]
pub struct SharedChain {
    inner: Arc<RwLock<Blockchain>>,
    changes: broadcast::Sender<usize>,
}

impl SharedChain {
    pub fn new(difficulty: u32) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(RwLock::new(Blockchain::new(difficulty))),
            changes,
        }
    }

    /// Clone of the current tip, for miners to build on. The tip may advance
    /// while a miner works from this snapshot; `commit` re-validates.
    pub async fn tip(&self) -> Block {
        self.inner.read().await.tip().clone()
    }

    /// Clone of the whole chain.
    pub async fn snapshot(&self) -> Vec<Block> {
        self.inner.read().await.chain.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn difficulty(&self) -> u32 {
        self.inner.read().await.difficulty
    }

    /// Commit a candidate mined from some, possibly stale, tip snapshot.
    ///
    /// Exactly one commit runs at a time; validation happens against the
    /// live tip under the write lock, not the miner's snapshot. On success
    /// subscribers are notified and the new chain length is returned.
    pub async fn commit(&self, candidate: Block) -> Result<usize, CommitError> {
        let new_len = {
            let mut bc = self.inner.write().await;
            bc.try_extend(candidate)?;
            bc.len()
        };
        info!("chain extended to {new_len} blocks");
        // Send only fails when no session is subscribed.
        let _ = self.changes.send(new_len);
        Ok(new_len)
    }

    /// Subscribe to commit notifications carrying the new chain length.
    pub fn subscribe(&self) -> broadcast::Receiver<usize> {
        self.changes.subscribe()
    }
}
