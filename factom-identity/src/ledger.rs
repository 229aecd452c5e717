//! Ledger primitives: hashes, blocks, entries and directory records.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256, Sha512};
use thiserror::Error;

/// Height of a directory block.
pub type Height = u32;

/// Identifier of a chain.
pub type ChainId = Hash;

/// Key Merkle root of an entry block, used to reference it.
pub type KeyMr = Hash;

/// Hash of an entry.
pub type EntryHash = Hash;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("expected 32 bytes, found {0}")]
    Length(usize),
}

/// A 32 byte hash. The all-zero hash is the "not set" sentinel.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash([u8; 32]);

impl Hash {
    pub const ZERO: Hash = Hash([0; 32]);

    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; 32]
    }

    /// Entry blocks close every minute with a marker whose first 31 bytes are
    /// zero and whose last byte is the minute number.
    pub fn is_minute_marker(&self) -> bool {
        self.0[..31].iter().all(|b| *b == 0)
    }

    /// The marker closing minute `minute`.
    pub fn minute_marker(minute: u8) -> Self {
        let mut bytes = [0; 32];
        bytes[31] = minute;
        Self(bytes)
    }

    pub fn sha256(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Derive the id of a chain from the external ids of its first entry.
    pub fn chain(ext_ids: &[Vec<u8>]) -> ChainId {
        let mut hasher = Sha256::new();
        for id in ext_ids {
            hasher.update(Sha256::digest(id));
        }
        Self(hasher.finalize().into())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl TryFrom<&[u8]> for Hash {
    type Error = HashError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        <[u8; 32]>::try_from(bytes)
            .map(Self)
            .map_err(|_| HashError::Length(bytes.len()))
    }
}

impl From<[u8; 32]> for Hash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl FromStr for Hash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        Self::try_from(bytes.as_slice())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({self})")
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Seconds since the unix epoch.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// Directory block headers count time in minutes. Saturates at the
    /// largest representable time.
    pub const fn from_minutes(minutes: u64) -> Self {
        Self(minutes.saturating_mul(60))
    }

    pub const fn as_secs(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An entry block: one chain's batch of entries sealed at a directory height.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub keymr: KeyMr,
    pub chain: ChainId,
    /// The previous block of the same chain, [`Hash::ZERO`] for the first block.
    pub prev: KeyMr,
    pub height: Height,
    /// Entry hashes in listing order, minute markers included.
    pub entries: Vec<EntryHash>,
}

impl Block {
    pub fn is_genesis(&self) -> bool {
        self.prev.is_zero()
    }
}

/// The directory block record of a height.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Directory {
    pub height: Height,
    pub timestamp: Timestamp,
}

/// An entry of a chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub hash: EntryHash,
    pub chain: ChainId,
    pub ext_ids: Vec<Vec<u8>>,
    pub content: Vec<u8>,
}

impl Entry {
    /// Construct an entry and compute its hash.
    pub fn new(chain: ChainId, ext_ids: Vec<Vec<u8>>, content: Vec<u8>) -> Self {
        let data = marshal(&chain, &ext_ids, &content);
        let mut hasher = Sha256::new();
        hasher.update(Sha512::digest(&data));
        hasher.update(&data);

        Self {
            hash: Hash(hasher.finalize().into()),
            chain,
            ext_ids,
            content,
        }
    }

    /// Construct the first entry of a chain, deriving the chain id from the
    /// external ids.
    pub fn first(ext_ids: Vec<Vec<u8>>, content: Vec<u8>) -> Self {
        Self::new(Hash::chain(&ext_ids), ext_ids, content)
    }
}

/// Binary entry layout: version, chain id, length of the external id
/// section, length-prefixed external ids, content.
fn marshal(chain: &ChainId, ext_ids: &[Vec<u8>], content: &[u8]) -> Vec<u8> {
    let section = ext_ids.iter().map(|id| id.len() + 2).sum::<usize>();
    let mut data = Vec::with_capacity(35 + section + content.len());

    data.push(0);
    data.extend_from_slice(chain.as_bytes());
    data.extend_from_slice(&(section as u16).to_be_bytes());
    for id in ext_ids {
        data.extend_from_slice(&(id.len() as u16).to_be_bytes());
        data.extend_from_slice(id);
    }
    data.extend_from_slice(content);
    data
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_hash_text() {
        let s = "888888001750ede0eff4b05f0c3f557890b256450cabbb84cada937f9c258327";
        let hash = s.parse::<Hash>().unwrap();

        assert_eq!(hash.to_string(), s);
        assert_eq!(hash.as_bytes()[..3], [0x88, 0x88, 0x88]);
        assert!(matches!("abcd".parse::<Hash>(), Err(HashError::Length(2))));
        assert!(matches!("zz".parse::<Hash>(), Err(HashError::Hex(_))));
    }

    #[test]
    fn test_minute_marker() {
        assert!(Hash::minute_marker(1).is_minute_marker());
        assert!(Hash::minute_marker(10).is_minute_marker());
        assert!(Hash::ZERO.is_minute_marker());
        assert!(!Hash::sha256(b"entry").is_minute_marker());
    }

    #[test]
    fn test_timestamp_from_minutes() {
        assert_eq!(Timestamp::from_minutes(24_019_710).as_secs(), 1_441_182_600);
        assert_eq!(Timestamp::from_minutes(u64::MAX), Timestamp::from_secs(u64::MAX));
        assert_eq!(Timestamp::from_minutes(u64::MAX / 60 + 1).as_secs(), u64::MAX);
    }

    #[test]
    fn test_chain_id_derivation() {
        let ext_ids = vec![vec![0], b"Identity Chain".to_vec()];
        let entry = Entry::first(ext_ids.clone(), vec![]);

        assert_eq!(entry.chain, Hash::chain(&ext_ids));
        assert_ne!(entry.hash, entry.chain);
        assert_eq!(Entry::new(entry.chain, ext_ids, vec![]).hash, entry.hash);
    }

    #[test]
    fn test_entry_hash_covers_content() {
        let chain = Hash::sha256(b"chain");
        let a = Entry::new(chain, vec![b"a".to_vec()], b"one".to_vec());
        let b = Entry::new(chain, vec![b"a".to_vec()], b"two".to_vec());

        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn test_hash_serde() {
        let hash = Hash::sha256(b"serde");
        let json = serde_json::to_string(&hash).unwrap();

        assert_eq!(json, format!("\"{hash}\""));
        assert_eq!(serde_json::from_str::<Hash>(&json).unwrap(), hash);
    }
}
