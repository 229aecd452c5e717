//! Administrative directives from the admin chain.
use crate::identity::AnchorKey;
use crate::ledger::{ChainId, Hash, Height};

/// A directive from the admin chain, affecting an authority.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Directive {
    AddFederatedServer {
        identity: ChainId,
        height: Height,
    },
    AddAuditServer {
        identity: ChainId,
        height: Height,
    },
    RemoveFederatedServer {
        identity: ChainId,
        height: Height,
    },
    AddSigningKey {
        identity: ChainId,
        key: Hash,
    },
    AddAnchorKey {
        identity: ChainId,
        key: AnchorKey,
    },
    AddEfficiency {
        identity: ChainId,
        efficiency: u16,
    },
    CoinbaseAddress {
        identity: ChainId,
        address: Hash,
    },
}

impl Directive {
    /// The identity the directive applies to.
    pub fn identity(&self) -> &ChainId {
        match self {
            Self::AddFederatedServer { identity, .. }
            | Self::AddAuditServer { identity, .. }
            | Self::RemoveFederatedServer { identity, .. }
            | Self::AddSigningKey { identity, .. }
            | Self::AddAnchorKey { identity, .. }
            | Self::AddEfficiency { identity, .. }
            | Self::CoinbaseAddress { identity, .. } => identity,
        }
    }
}

/// How to handle the removal of an authority.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Removal {
    /// Delete the authority, and with it the identity.
    #[default]
    Hard,
    /// Keep the authority and the identity, marking both unassigned.
    Soft,
}
