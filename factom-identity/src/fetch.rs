//! Walking the history of a chain.
mod mem;
pub use mem::InMemory;

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::ledger::{Block, ChainId, Directory, Entry, EntryHash, Height, KeyMr, Timestamp};

/// Read access to a ledger. Every method is a request against a remote
/// service and may fail.
pub trait Fetcher {
    type Error: std::error::Error + Send + Sync + 'static;

    /// The most recent block of `chain`, or [`crate::ledger::Hash::ZERO`] if
    /// the chain has never been written to.
    fn head(&self, chain: &ChainId) -> Result<KeyMr, Self::Error>;

    fn block(&self, keymr: &KeyMr) -> Result<Block, Self::Error>;

    fn entry(&self, hash: &EntryHash) -> Result<Entry, Self::Error>;

    fn directory(&self, height: Height) -> Result<Directory, Self::Error>;

    /// Whether the ledger is reachable.
    fn is_alive(&self) -> bool;
}

impl<T: Fetcher + ?Sized> Fetcher for &T {
    type Error = T::Error;

    fn head(&self, chain: &ChainId) -> Result<KeyMr, Self::Error> {
        (**self).head(chain)
    }

    fn block(&self, keymr: &KeyMr) -> Result<Block, Self::Error> {
        (**self).block(keymr)
    }

    fn entry(&self, hash: &EntryHash) -> Result<Entry, Self::Error> {
        (**self).entry(hash)
    }

    fn directory(&self, height: Height) -> Result<Directory, Self::Error> {
        (**self).directory(height)
    }

    fn is_alive(&self) -> bool {
        (**self).is_alive()
    }
}

/// Error returned by [`chain_entries`].
#[derive(Debug, Error)]
pub enum Error<E> {
    #[error(transparent)]
    Fetch(E),
    #[error("chain {chain}: block {block} was already visited")]
    Cycle { chain: ChainId, block: KeyMr },
    #[error("chain {chain}: block {block} belongs to chain {found}")]
    ForeignBlock {
        chain: ChainId,
        block: KeyMr,
        found: ChainId,
    },
}

/// An entry together with the height and time of the block that sealed it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainEntry {
    pub entry: Entry,
    pub timestamp: Timestamp,
    pub height: Height,
}

/// Retrieve all entries of `chain` in the order they were created.
///
/// The ledger can only be walked backwards from the head, so the blocks are
/// collected newest first and replayed in reverse. Minute markers are
/// skipped. A failed request aborts the walk: a chain's history is either
/// returned in full or not at all. Blocks linking back to a visited block or
/// belonging to another chain abort it too.
pub fn chain_entries<F>(fetcher: &F, chain: &ChainId) -> Result<Vec<ChainEntry>, Error<F::Error>>
where
    F: Fetcher + ?Sized,
{
    let head = fetcher.head(chain).map_err(Error::Fetch)?;
    if head.is_zero() {
        log::debug!(target: "walker", "Chain {chain} has no blocks");
        return Ok(Vec::new());
    }

    let mut blocks = Vec::new();
    let mut visited = HashSet::new();
    let mut next = head;
    loop {
        if !visited.insert(next) {
            return Err(Error::Cycle {
                chain: *chain,
                block: next,
            });
        }
        let block = fetcher.block(&next).map_err(Error::Fetch)?;
        if block.chain != *chain {
            return Err(Error::ForeignBlock {
                chain: *chain,
                block: next,
                found: block.chain,
            });
        }
        let genesis = block.is_genesis();
        next = block.prev;
        blocks.push(block);

        if genesis {
            break;
        }
    }
    log::debug!(target: "walker", "Chain {chain} has {} block(s)", blocks.len());

    let mut times = HashMap::<Height, Timestamp>::new();
    let mut entries = Vec::new();
    for block in blocks.into_iter().rev() {
        let timestamp = match times.get(&block.height) {
            Some(t) => *t,
            None => {
                let t = fetcher.directory(block.height).map_err(Error::Fetch)?.timestamp;
                times.insert(block.height, t);
                t
            }
        };

        for hash in block.entries.iter().filter(|h| !h.is_minute_marker()) {
            let entry = fetcher.entry(hash).map_err(Error::Fetch)?;
            entries.push(ChainEntry {
                entry,
                timestamp,
                height: block.height,
            });
        }
    }
    log::trace!(target: "walker", "Chain {chain} has {} entries", entries.len());

    Ok(entries)
}
