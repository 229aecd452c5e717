//! Resolved identity and authority state.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ledger::{ChainId, Hash, Height, Timestamp};

/// Efficiency is expressed in hundredths of a percent; new identities start
/// at 100%.
pub const DEFAULT_EFFICIENCY: u16 = 10_000;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    #[default]
    Unassigned,
    FederatedServer,
    AuditServer,
    Full,
    PendingFederatedServer,
    PendingAuditServer,
    PendingFull,
    Pending,
    Skeleton,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unassigned => "Unassigned",
            Self::FederatedServer => "Federated Server",
            Self::AuditServer => "Audit Server",
            Self::Full => "Full",
            Self::PendingFederatedServer => "Pending Federated Server",
            Self::PendingAuditServer => "Pending Audit Server",
            Self::PendingFull => "Pending Full",
            Self::Pending => "Pending",
            Self::Skeleton => "Skeleton Identity",
        };
        f.write_str(s)
    }
}

/// A key used to sign anchors on another blockchain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorKey {
    pub blockchain: String,
    pub level: u8,
    pub key_type: u8,
    #[serde(with = "hex::serde")]
    pub signing_key: [u8; 20],
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// The root chain. Zero until the identity chain's first entry is seen.
    pub identity_chain_id: ChainId,
    pub identity_registered: Height,
    pub identity_created: Height,
    /// Zero until the root chain registers a management chain.
    pub management_chain_id: ChainId,
    pub management_registered: Height,
    pub management_created: Height,
    pub matryoshka_hash: Hash,
    pub keys: [Hash; 4],
    pub signing_key: Hash,
    pub anchor_keys: Vec<AnchorKey>,
    pub coinbase_address: Hash,
    pub efficiency: u16,
    pub status: Status,
    pub key_updated: Timestamp,
    pub matryoshka_updated: Timestamp,
    pub coinbase_updated: Timestamp,
    pub efficiency_updated: Timestamp,
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            identity_chain_id: Hash::ZERO,
            identity_registered: 0,
            identity_created: 0,
            management_chain_id: Hash::ZERO,
            management_registered: 0,
            management_created: 0,
            matryoshka_hash: Hash::ZERO,
            keys: [Hash::ZERO; 4],
            signing_key: Hash::ZERO,
            anchor_keys: Vec::new(),
            coinbase_address: Hash::ZERO,
            efficiency: DEFAULT_EFFICIENCY,
            status: Status::Unassigned,
            key_updated: Timestamp::default(),
            matryoshka_updated: Timestamp::default(),
            coinbase_updated: Timestamp::default(),
            efficiency_updated: Timestamp::default(),
        }
    }
}

impl Identity {
    pub fn new(chain: ChainId) -> Self {
        Self {
            identity_chain_id: chain,
            ..Self::default()
        }
    }

    /// Whether the identity has a registered, created management chain and a
    /// block signing key.
    pub fn is_complete(&self) -> bool {
        !self.identity_chain_id.is_zero()
            && self.identity_registered > 0
            && !self.management_chain_id.is_zero()
            && self.management_created > 0
            && !self.signing_key.is_zero()
    }

    /// Insert or replace the anchor key for the key's blockchain and level.
    pub fn set_anchor_key(&mut self, key: AnchorKey) {
        insert_anchor_key(&mut self.anchor_keys, key)
    }
}

/// A server identity promoted by the admin chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authority {
    pub authority_chain_id: ChainId,
    pub management_chain_id: ChainId,
    pub matryoshka_hash: Hash,
    pub signing_key: Hash,
    pub anchor_keys: Vec<AnchorKey>,
    pub coinbase_address: Hash,
    pub efficiency: u16,
    pub status: Status,
    /// Height at which the authority was promoted.
    pub promoted: Height,
}

impl Authority {
    /// Promote `identity` at `height` with the given status.
    pub fn promote(identity: &Identity, status: Status, height: Height) -> Self {
        Self {
            authority_chain_id: identity.identity_chain_id,
            management_chain_id: identity.management_chain_id,
            matryoshka_hash: identity.matryoshka_hash,
            signing_key: identity.signing_key,
            anchor_keys: identity.anchor_keys.clone(),
            coinbase_address: identity.coinbase_address,
            efficiency: identity.efficiency,
            status,
            promoted: height,
        }
    }

    pub fn set_anchor_key(&mut self, key: AnchorKey) {
        insert_anchor_key(&mut self.anchor_keys, key)
    }
}

/// Anchor keys are unique per blockchain and level, and kept sorted by level.
fn insert_anchor_key(keys: &mut Vec<AnchorKey>, key: AnchorKey) {
    match keys
        .iter_mut()
        .find(|k| k.blockchain == key.blockchain && k.level == key.level)
    {
        Some(existing) => *existing = key,
        None => {
            keys.push(key);
            keys.sort_by_key(|k| k.level);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn anchor(level: u8, byte: u8) -> AnchorKey {
        AnchorKey {
            blockchain: String::from("BTC"),
            level,
            key_type: 0,
            signing_key: [byte; 20],
        }
    }

    #[test]
    fn test_anchor_keys_replace_by_level() {
        let mut id = Identity::new(Hash::sha256(b"id"));

        id.set_anchor_key(anchor(1, 1));
        id.set_anchor_key(anchor(0, 2));
        id.set_anchor_key(anchor(1, 3));

        assert_eq!(id.anchor_keys, vec![anchor(0, 2), anchor(1, 3)]);
    }

    #[test]
    fn test_identity_json() {
        let mut id = Identity::new(Hash::sha256(b"id"));
        id.set_anchor_key(anchor(0, 0xab));

        let json = serde_json::to_value(&id).unwrap();
        assert_eq!(json["status"], "unassigned");
        assert_eq!(json["efficiency"], 10_000);
        assert_eq!(json["anchorKeys"][0]["signingKey"], "ab".repeat(20));
        assert_eq!(json["identityChainId"], id.identity_chain_id.to_hex());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(Status::FederatedServer.to_string(), "Federated Server");
        assert_eq!(Status::default().to_string(), "Unassigned");
    }
}
