//! Resolution settings.
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::ledger::{ChainId, EntryHash, Hash};

/// The chain on which identities are registered.
pub const REGISTRY_CHAIN: Hash = Hash::new([
    0x88, 0x88, 0x88, 0x00, 0x17, 0x50, 0xed, 0xe0, 0xef, 0xf4, 0xb0, 0x5f, 0x0c, 0x3f, 0x55, 0x78,
    0x90, 0xb2, 0x56, 0x45, 0x0c, 0xab, 0xbb, 0x84, 0xca, 0xda, 0x93, 0x7f, 0x9c, 0x25, 0x83, 0x27,
]);

/// The entry that created the registry chain. It carries no identity data.
pub const REGISTRY_GENESIS_ENTRY: Hash = Hash::new([
    0x17, 0x2e, 0xb5, 0xcb, 0x84, 0xa4, 0x92, 0x80, 0xc9, 0xad, 0x0b, 0xaf, 0x13, 0xbe, 0xa7, 0x79,
    0xa6, 0x24, 0xde, 0xf8, 0xd1, 0x0a, 0xda, 0xb8, 0x0c, 0x3d, 0x00, 0x7f, 0xe8, 0xbc, 0xe9, 0xec,
]);

/// Every identity related chain id starts with these bytes.
pub const IDENTITY_PREFIX: [u8; 3] = [0x88, 0x88, 0x88];

/// When to walk the registration chain in a single identity lookup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Rescan {
    /// On every lookup.
    #[default]
    Always,
    /// On the first lookup of a controller.
    Once,
}

/// What to do with an entry that fails validation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Malformed {
    /// Log the entry and carry on with the rest of the batch.
    #[default]
    Skip,
    /// Fail the batch.
    Reject,
}

/// What to do when one identity of a full enumeration fails to resolve.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OnFailure {
    /// Record the failure and resolve the remaining identities.
    #[default]
    Continue,
    /// Fail the enumeration.
    Abort,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Chain listing the registered identities.
    pub registry: ChainId,
    /// Prefix of every chain the parser accepts entries from.
    #[serde(with = "hex::serde")]
    pub prefix: Vec<u8>,
    /// Entries skipped without validation.
    pub ignored: BTreeSet<EntryHash>,
    pub rescan: Rescan,
    pub malformed: Malformed,
    pub on_failure: OnFailure,
    /// Number of threads walking chains concurrently when resolving all
    /// identities.
    pub workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            registry: REGISTRY_CHAIN,
            prefix: IDENTITY_PREFIX.to_vec(),
            ignored: BTreeSet::from([REGISTRY_GENESIS_ENTRY]),
            rescan: Rescan::default(),
            malformed: Malformed::default(),
            on_failure: OnFailure::default(),
            workers: 1,
        }
    }
}
