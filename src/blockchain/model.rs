use super::Block;
use super::CommitError;

/// The held chain plus the rules deciding how it grows.
///
/// Exclusively owned by [`SharedChain`](super::SharedChain) at runtime;
/// kept as a plain value so the fork-choice stays testable without any
/// synchronization in play.
#[derive(Debug, Clone)]
pub struct Blockchain {
    pub chain: Vec<Block>,
    pub difficulty: u32,
}

impl Blockchain {
    /// Initialize a new chain holding only the genesis block.
    pub fn new(difficulty: u32) -> Self {
        Self {
            chain: vec![Block::genesis(difficulty)],
            difficulty,
        }
    }

    /// The last (highest-index) block of the held chain.
    pub fn tip(&self) -> &Block {
        self.chain
            .last()
            .expect("chain always holds at least the genesis block")
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Validate `candidate` against the current tip and, if it survives,
    /// replace the held chain with the one-block-longer candidate chain.
    ///
    /// Longest chain wins: the swap only happens when the candidate chain
    /// is strictly longer, and it is a whole-vector replacement rather than
    /// an in-place mutation so concurrent readers never observe a torn
    /// chain. A rejected candidate leaves the chain untouched.
    pub fn try_extend(&mut self, candidate: Block) -> Result<(), CommitError> {
        candidate.check_extension(self.tip(), self.difficulty)?;
        let mut next = self.chain.clone();
        next.push(candidate);
        if next.len() > self.chain.len() {
            self.chain = next;
            Ok(())
        } else {
            Err(CommitError::NotLonger)
        }
    }

    /// Whole-chain audit: genesis shape plus link validation over every
    /// adjacent pair.
    pub fn is_valid_chain(&self) -> bool {
        let Some(genesis) = self.chain.first() else {
            return false;
        };
        if genesis.index != 0 || !genesis.prev_hash.is_empty() || !genesis.hash.is_empty() {
            return false;
        }
        self.chain
            .windows(2)
            .all(|pair| pair[1].is_valid_extension(&pair[0], self.difficulty))
    }
}
