//! The identity state engine.
mod mem;
pub use mem::Memory;

use crate::admin::Directive;
use crate::identity::{Authority, Identity};
use crate::ledger::{ChainId, Entry, Height, Timestamp};

/// Holds identity and authority state, keyed by chain id, and decides how a
/// single entry or directive changes it.
///
/// Entries are applied in creation order. An engine may hold back an entry
/// that refers to state it has not seen yet and retry it on
/// [`Engine::flush_deferred`].
pub trait Engine {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Apply `entry`, sealed at `height` and `timestamp`. `new` is false when
    /// the entry is being retried. Returns whether the entry changed any
    /// identity.
    fn apply_entry(
        &mut self,
        entry: &Entry,
        height: Height,
        timestamp: Timestamp,
        new: bool,
    ) -> Result<bool, Self::Error>;

    /// Retry every deferred entry, returning the ones that were applied.
    fn flush_deferred(&mut self) -> Result<Vec<Entry>, Self::Error>;

    fn identity(&self, chain: &ChainId) -> Option<&Identity>;

    /// All identities, with the chain they are stored under.
    fn identities(&self) -> Box<dyn Iterator<Item = (&ChainId, &Identity)> + '_>;

    fn authority(&self, chain: &ChainId) -> Option<&Authority>;

    fn set_identity(&mut self, chain: ChainId, identity: Identity);

    fn set_authority(&mut self, chain: ChainId, authority: Authority);

    fn remove_authority(&mut self, chain: &ChainId) -> Option<Authority>;

    /// Apply an admin chain directive. Removing a federated server removes
    /// the identity along with the authority.
    fn apply_admin(&mut self, directive: &Directive) -> Result<(), Self::Error>;
}
