//! Identity entries as laid out in their external ids.
//!
//! Every identity entry starts with a version byte (`0x00`) and the entry
//! name. The remaining external ids depend on the entry type. Public keys and
//! signatures trailing the fields below are carried but not interpreted.
use thiserror::Error;

use crate::identity::AnchorKey;
use crate::ledger::{ChainId, Hash, Timestamp};

pub const IDENTITY_CHAIN: &str = "Identity Chain";
pub const REGISTER_IDENTITY: &str = "Register Factom Identity";
pub const REGISTER_MANAGEMENT: &str = "Register Server Management";
pub const MANAGEMENT_CHAIN: &str = "Server Management";
pub const SIGNING_KEY: &str = "New Block Signing Key";
pub const ANCHOR_KEY: &str = "New Bitcoin Key";
pub const MATRYOSHKA_HASH: &str = "New Matryoshka Hash";
pub const COINBASE_ADDRESS: &str = "Coinbase Address";
pub const EFFICIENCY: &str = "Server Efficiency";

/// Efficiency is capped at 100.00%.
pub const MAX_EFFICIENCY: u16 = 10_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("expected at least {expected} external ids, found {found}")]
    Count { expected: usize, found: usize },
    #[error("unsupported version {0}")]
    Version(u8),
    #[error("unknown entry type '{0}'")]
    Unknown(String),
    #[error("field '{field}' must be {expected} bytes, found {found}")]
    Length {
        field: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("efficiency {0} exceeds {MAX_EFFICIENCY}")]
    Efficiency(u16),
}

/// A decoded identity entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdentityEntry {
    /// First entry of a root chain.
    Chain { keys: [Hash; 4] },
    /// Registration record on the registration chain.
    Register { identity: ChainId },
    /// Root chain entry declaring the management chain.
    RegisterManagement { management: ChainId },
    /// First entry of a management chain.
    Management { identity: ChainId },
    SigningKey {
        identity: ChainId,
        key: Hash,
        timestamp: Timestamp,
    },
    AnchorKey {
        identity: ChainId,
        key: AnchorKey,
        timestamp: Timestamp,
    },
    MatryoshkaHash {
        identity: ChainId,
        hash: Hash,
        timestamp: Timestamp,
    },
    CoinbaseAddress {
        identity: ChainId,
        address: Hash,
        timestamp: Timestamp,
    },
    Efficiency {
        identity: ChainId,
        efficiency: u16,
        timestamp: Timestamp,
    },
}

impl IdentityEntry {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Chain { .. } => IDENTITY_CHAIN,
            Self::Register { .. } => REGISTER_IDENTITY,
            Self::RegisterManagement { .. } => REGISTER_MANAGEMENT,
            Self::Management { .. } => MANAGEMENT_CHAIN,
            Self::SigningKey { .. } => SIGNING_KEY,
            Self::AnchorKey { .. } => ANCHOR_KEY,
            Self::MatryoshkaHash { .. } => MATRYOSHKA_HASH,
            Self::CoinbaseAddress { .. } => COINBASE_ADDRESS,
            Self::Efficiency { .. } => EFFICIENCY,
        }
    }

    /// The identity an entry refers to, if it names one explicitly.
    pub fn identity(&self) -> Option<&ChainId> {
        match self {
            Self::Chain { .. } | Self::RegisterManagement { .. } => None,
            Self::Register { identity }
            | Self::Management { identity }
            | Self::SigningKey { identity, .. }
            | Self::AnchorKey { identity, .. }
            | Self::MatryoshkaHash { identity, .. }
            | Self::CoinbaseAddress { identity, .. }
            | Self::Efficiency { identity, .. } => Some(identity),
        }
    }

    /// Decode the external ids of an entry.
    pub fn decode(ext_ids: &[Vec<u8>]) -> Result<Self, DecodeError> {
        let fields = Fields::new(ext_ids)?;
        let name = String::from_utf8_lossy(&ext_ids[1]);

        match name.as_ref() {
            IDENTITY_CHAIN => Ok(Self::Chain {
                keys: [
                    fields.hash(2, "key 1")?,
                    fields.hash(3, "key 2")?,
                    fields.hash(4, "key 3")?,
                    fields.hash(5, "key 4")?,
                ],
            }),
            REGISTER_IDENTITY => Ok(Self::Register {
                identity: fields.hash(2, "identity chain")?,
            }),
            REGISTER_MANAGEMENT => Ok(Self::RegisterManagement {
                management: fields.hash(2, "management chain")?,
            }),
            MANAGEMENT_CHAIN => Ok(Self::Management {
                identity: fields.hash(2, "identity chain")?,
            }),
            SIGNING_KEY => Ok(Self::SigningKey {
                identity: fields.hash(2, "identity chain")?,
                key: fields.hash(3, "signing key")?,
                timestamp: fields.timestamp(4)?,
            }),
            ANCHOR_KEY => Ok(Self::AnchorKey {
                identity: fields.hash(2, "identity chain")?,
                key: AnchorKey {
                    blockchain: String::from("BTC"),
                    level: fields.byte(3, "key level")?,
                    key_type: fields.byte(4, "key type")?,
                    signing_key: fields.array::<20>(5, "anchor key")?,
                },
                timestamp: fields.timestamp(6)?,
            }),
            MATRYOSHKA_HASH => Ok(Self::MatryoshkaHash {
                identity: fields.hash(2, "identity chain")?,
                hash: fields.hash(3, "matryoshka hash")?,
                timestamp: fields.timestamp(4)?,
            }),
            COINBASE_ADDRESS => Ok(Self::CoinbaseAddress {
                identity: fields.hash(2, "identity chain")?,
                address: fields.hash(3, "coinbase address")?,
                timestamp: fields.timestamp(4)?,
            }),
            EFFICIENCY => {
                let efficiency = u16::from_be_bytes(fields.array::<2>(3, "efficiency")?);
                if efficiency > MAX_EFFICIENCY {
                    return Err(DecodeError::Efficiency(efficiency));
                }
                Ok(Self::Efficiency {
                    identity: fields.hash(2, "identity chain")?,
                    efficiency,
                    timestamp: fields.timestamp(4)?,
                })
            }
            other => Err(DecodeError::Unknown(other.to_owned())),
        }
    }

    /// Encode the entry's external ids, without public key or signature.
    pub fn encode(&self) -> Vec<Vec<u8>> {
        let mut ext_ids = vec![vec![0], self.name().as_bytes().to_vec()];
        let ts = |t: &Timestamp| t.as_secs().to_be_bytes().to_vec();

        match self {
            Self::Chain { keys } => {
                ext_ids.extend(keys.iter().map(|k| k.as_bytes().to_vec()));
            }
            Self::Register { identity } | Self::Management { identity } => {
                ext_ids.push(identity.as_bytes().to_vec());
            }
            Self::RegisterManagement { management } => {
                ext_ids.push(management.as_bytes().to_vec());
            }
            Self::SigningKey {
                identity,
                key: hash,
                timestamp,
            }
            | Self::MatryoshkaHash {
                identity,
                hash,
                timestamp,
            }
            | Self::CoinbaseAddress {
                identity,
                address: hash,
                timestamp,
            } => {
                ext_ids.push(identity.as_bytes().to_vec());
                ext_ids.push(hash.as_bytes().to_vec());
                ext_ids.push(ts(timestamp));
            }
            Self::AnchorKey {
                identity,
                key,
                timestamp,
            } => {
                ext_ids.push(identity.as_bytes().to_vec());
                ext_ids.push(vec![key.level]);
                ext_ids.push(vec![key.key_type]);
                ext_ids.push(key.signing_key.to_vec());
                ext_ids.push(ts(timestamp));
            }
            Self::Efficiency {
                identity,
                efficiency,
                timestamp,
            } => {
                ext_ids.push(identity.as_bytes().to_vec());
                ext_ids.push(efficiency.to_be_bytes().to_vec());
                ext_ids.push(ts(timestamp));
            }
        }
        ext_ids
    }
}

/// Positional access to external ids.
struct Fields<'a>(&'a [Vec<u8>]);

impl<'a> Fields<'a> {
    fn new(ext_ids: &'a [Vec<u8>]) -> Result<Self, DecodeError> {
        if ext_ids.len() < 2 {
            return Err(DecodeError::Count {
                expected: 2,
                found: ext_ids.len(),
            });
        }
        match ext_ids[0].first() {
            Some(0) => Ok(Self(ext_ids)),
            Some(v) => Err(DecodeError::Version(*v)),
            None => Err(DecodeError::Length {
                field: "version",
                expected: 1,
                found: 0,
            }),
        }
    }

    fn get(&self, i: usize) -> Result<&'a [u8], DecodeError> {
        self.0
            .get(i)
            .map(Vec::as_slice)
            .ok_or(DecodeError::Count {
                expected: i + 1,
                found: self.0.len(),
            })
    }

    fn array<const N: usize>(&self, i: usize, field: &'static str) -> Result<[u8; N], DecodeError> {
        let bytes = self.get(i)?;
        <[u8; N]>::try_from(bytes).map_err(|_| DecodeError::Length {
            field,
            expected: N,
            found: bytes.len(),
        })
    }

    fn hash(&self, i: usize, field: &'static str) -> Result<Hash, DecodeError> {
        let bytes = self.get(i)?;
        Hash::try_from(bytes).map_err(|_| DecodeError::Length {
            field,
            expected: 32,
            found: bytes.len(),
        })
    }

    fn byte(&self, i: usize, field: &'static str) -> Result<u8, DecodeError> {
        self.array::<1>(i, field).map(|[b]| b)
    }

    fn timestamp(&self, i: usize) -> Result<Timestamp, DecodeError> {
        self.array::<8>(i, "timestamp")
            .map(|b| Timestamp::from_secs(u64::from_be_bytes(b)))
    }
}
