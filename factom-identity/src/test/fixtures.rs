//! Identity entries for building test ledgers.
use crate::entries::IdentityEntry;
use crate::identity::AnchorKey;
use crate::ledger::{ChainId, Entry, Hash, Timestamp};

/// A chain id carrying the identity prefix, derived from `name`.
pub fn chain(name: &str) -> ChainId {
    let mut bytes = *Hash::sha256(name.as_bytes()).as_bytes();
    bytes[..3].copy_from_slice(&[0x88, 0x88, 0x88]);
    Hash::new(bytes)
}

/// A 32 byte key derived from `name`.
pub fn key(name: &str) -> Hash {
    Hash::sha256(name.as_bytes())
}

pub fn entry(chain: ChainId, entry: IdentityEntry) -> Entry {
    Entry::new(chain, entry.encode(), vec![])
}

/// The first entry of the root chain `root`.
pub fn identity_chain(root: ChainId) -> Entry {
    let keys = [1, 2, 3, 4].map(|i| key(&format!("{root}/{i}")));
    entry(root, IdentityEntry::Chain { keys })
}

/// A registration of `root` on the registration chain `registry`.
pub fn register(registry: ChainId, root: ChainId) -> Entry {
    entry(registry, IdentityEntry::Register { identity: root })
}

/// The root chain entry declaring `management`.
pub fn register_management(root: ChainId, management: ChainId) -> Entry {
    entry(root, IdentityEntry::RegisterManagement { management })
}

/// The first entry of the management chain of `root`.
pub fn management_chain(management: ChainId, root: ChainId) -> Entry {
    entry(management, IdentityEntry::Management { identity: root })
}

pub fn signing_key(management: ChainId, root: ChainId, key: Hash, secs: u64) -> Entry {
    entry(
        management,
        IdentityEntry::SigningKey {
            identity: root,
            key,
            timestamp: Timestamp::from_secs(secs),
        },
    )
}

pub fn anchor_key(management: ChainId, root: ChainId, level: u8, secs: u64) -> Entry {
    entry(
        management,
        IdentityEntry::AnchorKey {
            identity: root,
            key: AnchorKey {
                blockchain: String::from("BTC"),
                level,
                key_type: 0,
                signing_key: [level; 20],
            },
            timestamp: Timestamp::from_secs(secs),
        },
    )
}

pub fn coinbase_address(root: ChainId, address: Hash, secs: u64) -> Entry {
    entry(
        root,
        IdentityEntry::CoinbaseAddress {
            identity: root,
            address,
            timestamp: Timestamp::from_secs(secs),
        },
    )
}

pub fn efficiency(root: ChainId, efficiency: u16, secs: u64) -> Entry {
    entry(
        root,
        IdentityEntry::Efficiency {
            identity: root,
            efficiency,
            timestamp: Timestamp::from_secs(secs),
        },
    )
}
