use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use thiserror::Error;

use crate::fetch::Fetcher;
use crate::ledger::{Block, ChainId, Directory, Entry, EntryHash, Hash, Height, KeyMr, Timestamp};

/// Directory blocks are ten minutes apart.
const BLOCK_TIME: u64 = 600;

/// Time of the first directory block of the in-memory ledger.
const GENESIS: u64 = 1_442_000_000;

#[derive(Debug, Error)]
pub enum Error {
    #[error("block {0} not found")]
    Block(KeyMr),
    #[error("entry {0} not found")]
    Entry(EntryHash),
    #[error("directory block at height {0} not found")]
    Directory(Height),
}

/// A ledger held in memory.
///
/// Entries are sealed into blocks with [`InMemory::seal`], one block per chain
/// and height, each block closed by a minute marker.
#[derive(Debug, Default)]
pub struct InMemory {
    heads: HashMap<ChainId, KeyMr>,
    blocks: HashMap<KeyMr, Block>,
    entries: HashMap<EntryHash, Entry>,
    directories: BTreeMap<Height, Timestamp>,
    height: Height,
    walks: Mutex<HashMap<ChainId, usize>>,
}

impl InMemory {
    /// Seal `entries` at the next height and return that height.
    pub fn seal(&mut self, entries: impl IntoIterator<Item = Entry>) -> Height {
        self.height += 1;
        let height = self.height;

        let mut chains: Vec<(ChainId, Vec<EntryHash>)> = Vec::new();
        for entry in entries {
            match chains.iter_mut().find(|(c, _)| *c == entry.chain) {
                Some((_, hashes)) => hashes.push(entry.hash),
                None => chains.push((entry.chain, vec![entry.hash])),
            }
            self.entries.insert(entry.hash, entry);
        }

        for (chain, mut hashes) in chains {
            let prev = self.heads.get(&chain).copied().unwrap_or(Hash::ZERO);
            let keymr = {
                let mut data = chain.as_bytes().to_vec();
                data.extend_from_slice(&height.to_be_bytes());
                data.extend_from_slice(prev.as_bytes());
                Hash::sha256(&data)
            };
            hashes.push(Hash::minute_marker(1));

            self.blocks.insert(
                keymr,
                Block {
                    keymr,
                    chain,
                    prev,
                    height,
                    entries: hashes,
                },
            );
            self.heads.insert(chain, keymr);
        }
        self.directories.insert(
            height,
            Timestamp::from_secs(GENESIS + u64::from(height) * BLOCK_TIME),
        );

        height
    }

    /// Blocks of `chain`, newest first.
    pub fn blocks(&self, chain: &ChainId) -> Vec<KeyMr> {
        let mut blocks = Vec::new();
        let mut next = self.heads.get(chain).copied().unwrap_or(Hash::ZERO);
        while let Some(block) = self.blocks.get(&next) {
            blocks.push(block.keymr);
            next = block.prev;
        }
        blocks
    }

    pub fn remove_entry(&mut self, hash: &EntryHash) -> Option<Entry> {
        self.entries.remove(hash)
    }

    /// Insert `block` as is, replacing any block with the same key.
    pub fn insert_block(&mut self, block: Block) -> Option<Block> {
        self.blocks.insert(block.keymr, block)
    }

    pub fn remove_block(&mut self, keymr: &KeyMr) -> Option<Block> {
        self.blocks.remove(keymr)
    }

    /// How many times the head of `chain` was requested, ie. how many times
    /// the chain was walked.
    pub fn walks(&self, chain: &ChainId) -> usize {
        self.walks
            .lock()
            .map(|w| w.get(chain).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

impl Fetcher for InMemory {
    type Error = Error;

    fn head(&self, chain: &ChainId) -> Result<KeyMr, Self::Error> {
        if let Ok(mut walks) = self.walks.lock() {
            *walks.entry(*chain).or_default() += 1;
        }
        Ok(self.heads.get(chain).copied().unwrap_or(Hash::ZERO))
    }

    fn block(&self, keymr: &KeyMr) -> Result<Block, Self::Error> {
        self.blocks
            .get(keymr)
            .cloned()
            .ok_or(Error::Block(*keymr))
    }

    fn entry(&self, hash: &EntryHash) -> Result<Entry, Self::Error> {
        self.entries
            .get(hash)
            .cloned()
            .ok_or(Error::Entry(*hash))
    }

    fn directory(&self, height: Height) -> Result<Directory, Self::Error> {
        self.directories
            .get(&height)
            .map(|timestamp| Directory {
                height,
                timestamp: *timestamp,
            })
            .ok_or(Error::Directory(height))
    }

    fn is_alive(&self) -> bool {
        true
    }
}
