use std::collections::BTreeMap;
use std::mem;

use thiserror::Error;

use crate::admin::Directive;
use crate::engine::Engine;
use crate::entries::{DecodeError, IdentityEntry};
use crate::identity::{Authority, Identity, Status};
use crate::ledger::{ChainId, Entry, EntryHash, Height, Timestamp};

#[derive(Debug, Error)]
pub enum Error {
    #[error("identity {0} not found")]
    IdentityNotFound(ChainId),
    #[error("authority {0} not found")]
    AuthorityNotFound(ChainId),
    #[error("entry {entry}: '{name}' must be on chain {expected}, found on {found}")]
    WrongChain {
        entry: EntryHash,
        name: &'static str,
        expected: ChainId,
        found: ChainId,
    },
    #[error("entry {entry}: {source}")]
    Decode {
        entry: EntryHash,
        #[source]
        source: DecodeError,
    },
}

/// Result of trying to apply an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Applied,
    /// The entry refers to state that is not known yet.
    Pending,
    Ignored,
}

#[derive(Debug, Clone)]
struct Deferred {
    entry: Entry,
    height: Height,
    timestamp: Timestamp,
}

/// An [`Engine`] holding all state in memory.
///
/// Applies the structure of the identity entries only: public keys and
/// signatures are not checked.
#[derive(Debug, Default)]
pub struct Memory {
    identities: BTreeMap<ChainId, Identity>,
    authorities: BTreeMap<ChainId, Authority>,
    deferred: Vec<Deferred>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries waiting for state they refer to.
    pub fn deferred(&self) -> usize {
        self.deferred.len()
    }

    fn try_apply(
        &mut self,
        entry: &Entry,
        height: Height,
        _timestamp: Timestamp,
    ) -> Result<Outcome, Error> {
        let decoded = match IdentityEntry::decode(&entry.ext_ids) {
            Ok(decoded) => decoded,
            Err(
                DecodeError::Count { found: 0..=1, .. }
                | DecodeError::Version(_)
                | DecodeError::Length {
                    field: "version", ..
                }
                | DecodeError::Unknown(_),
            ) => return Ok(Outcome::Ignored),
            Err(source) => {
                return Err(Error::Decode {
                    entry: entry.hash,
                    source,
                })
            }
        };
        let name = decoded.name();
        let wrong_chain = |expected: ChainId| Error::WrongChain {
            entry: entry.hash,
            name,
            expected,
            found: entry.chain,
        };

        match decoded {
            IdentityEntry::Chain { keys } => {
                let id = self.identities.entry(entry.chain).or_default();
                if id.identity_created > 0 {
                    // Only the first entry of a chain creates the identity.
                    return Ok(if id.keys == keys {
                        Outcome::Applied
                    } else {
                        Outcome::Ignored
                    });
                }
                id.identity_chain_id = entry.chain;
                id.identity_created = height;
                id.keys = keys;
            }
            IdentityEntry::Register { identity } => {
                let Some(id) = self.known_mut(&identity) else {
                    return Ok(Outcome::Pending);
                };
                if id.identity_registered == 0 {
                    id.identity_registered = height;
                }
                promote(id);
            }
            IdentityEntry::RegisterManagement { management } => {
                let Some(id) = self.known_mut(&entry.chain) else {
                    return Ok(Outcome::Pending);
                };
                if id.management_chain_id.is_zero() {
                    id.management_chain_id = management;
                    id.management_registered = height;
                } else if id.management_chain_id != management {
                    log::warn!(
                        target: "engine",
                        "Identity {} already has management chain {}, ignoring {management}",
                        id.identity_chain_id, id.management_chain_id
                    );
                    return Ok(Outcome::Ignored);
                }
            }
            IdentityEntry::Management { identity } => {
                let Some(id) = self.known_mut(&identity) else {
                    return Ok(Outcome::Pending);
                };
                if id.management_chain_id.is_zero() {
                    return Ok(Outcome::Pending);
                }
                if id.management_chain_id != entry.chain {
                    return Err(wrong_chain(id.management_chain_id));
                }
                if id.management_created == 0 {
                    id.management_created = height;
                }
                promote(id);
            }
            IdentityEntry::SigningKey {
                identity,
                key,
                timestamp,
            } => {
                let id = match self.managed_mut(&identity) {
                    None => return Ok(Outcome::Pending),
                    Some(id) if id.management_chain_id != entry.chain => {
                        return Err(wrong_chain(id.management_chain_id))
                    }
                    Some(id) => id,
                };
                if timestamp >= id.key_updated {
                    id.signing_key = key;
                    id.key_updated = timestamp;
                }
                promote(id);
            }
            IdentityEntry::AnchorKey { identity, key, .. } => {
                let id = match self.managed_mut(&identity) {
                    None => return Ok(Outcome::Pending),
                    Some(id) if id.management_chain_id != entry.chain => {
                        return Err(wrong_chain(id.management_chain_id))
                    }
                    Some(id) => id,
                };
                id.set_anchor_key(key);
            }
            IdentityEntry::MatryoshkaHash {
                identity,
                hash,
                timestamp,
            } => {
                let id = match self.managed_mut(&identity) {
                    None => return Ok(Outcome::Pending),
                    Some(id) if id.management_chain_id != entry.chain => {
                        return Err(wrong_chain(id.management_chain_id))
                    }
                    Some(id) => id,
                };
                if timestamp >= id.matryoshka_updated {
                    id.matryoshka_hash = hash;
                    id.matryoshka_updated = timestamp;
                }
            }
            IdentityEntry::CoinbaseAddress {
                identity,
                address,
                timestamp,
            } => {
                if identity != entry.chain {
                    return Err(wrong_chain(identity));
                }
                let Some(id) = self.known_mut(&identity) else {
                    return Ok(Outcome::Pending);
                };
                if timestamp >= id.coinbase_updated {
                    id.coinbase_address = address;
                    id.coinbase_updated = timestamp;
                }
            }
            IdentityEntry::Efficiency {
                identity,
                efficiency,
                timestamp,
            } => {
                if identity != entry.chain {
                    return Err(wrong_chain(identity));
                }
                let Some(id) = self.known_mut(&identity) else {
                    return Ok(Outcome::Pending);
                };
                if timestamp >= id.efficiency_updated {
                    id.efficiency = efficiency;
                    id.efficiency_updated = timestamp;
                }
            }
        }
        Ok(Outcome::Applied)
    }

    /// An identity whose root chain has been seen.
    fn known_mut(&mut self, chain: &ChainId) -> Option<&mut Identity> {
        self.identities
            .get_mut(chain)
            .filter(|id| !id.identity_chain_id.is_zero())
    }

    /// An identity whose management chain has been created.
    fn managed_mut(&mut self, chain: &ChainId) -> Option<&mut Identity> {
        self.known_mut(chain)
            .filter(|id| !id.management_chain_id.is_zero() && id.management_created > 0)
    }

    fn authority_mut(&mut self, chain: &ChainId) -> Result<&mut Authority, Error> {
        self.authorities
            .get_mut(chain)
            .ok_or(Error::AuthorityNotFound(*chain))
    }

    fn promote_authority(
        &mut self,
        chain: &ChainId,
        status: Status,
        height: Height,
    ) -> Result<(), Error> {
        let id = self
            .identities
            .get_mut(chain)
            .ok_or(Error::IdentityNotFound(*chain))?;
        id.status = status;

        self.authorities
            .entry(*chain)
            .and_modify(|a| a.status = status)
            .or_insert_with(|| Authority::promote(id, status, height));

        Ok(())
    }
}

/// A complete identity that was never assigned a role becomes full.
fn promote(id: &mut Identity) {
    if id.status == Status::Unassigned && id.is_complete() {
        id.status = Status::Full;
    }
}

impl Engine for Memory {
    type Error = Error;

    fn apply_entry(
        &mut self,
        entry: &Entry,
        height: Height,
        timestamp: Timestamp,
        new: bool,
    ) -> Result<bool, Self::Error> {
        match self.try_apply(entry, height, timestamp)? {
            Outcome::Applied => Ok(true),
            Outcome::Ignored => Ok(false),
            Outcome::Pending => {
                if new && !self.deferred.iter().any(|d| d.entry.hash == entry.hash) {
                    log::debug!(target: "engine", "Deferring entry {} of chain {}", entry.hash, entry.chain);
                    self.deferred.push(Deferred {
                        entry: entry.clone(),
                        height,
                        timestamp,
                    });
                }
                Ok(false)
            }
        }
    }

    fn flush_deferred(&mut self) -> Result<Vec<Entry>, Self::Error> {
        let mut applied = Vec::new();
        // An applied entry can unblock others, so retry until nothing moves.
        loop {
            let mut progress = false;
            for d in mem::take(&mut self.deferred) {
                match self.try_apply(&d.entry, d.height, d.timestamp) {
                    Ok(Outcome::Pending) => self.deferred.push(d),
                    Ok(Outcome::Applied) => {
                        progress = true;
                        applied.push(d.entry);
                    }
                    Ok(Outcome::Ignored) => {}
                    Err(e) => {
                        log::warn!(target: "engine", "Dropping deferred entry {}: {e}", d.entry.hash)
                    }
                }
            }
            if !progress || self.deferred.is_empty() {
                break;
            }
        }
        Ok(applied)
    }

    fn identity(&self, chain: &ChainId) -> Option<&Identity> {
        self.identities.get(chain)
    }

    fn identities(&self) -> Box<dyn Iterator<Item = (&ChainId, &Identity)> + '_> {
        Box::new(self.identities.iter())
    }

    fn authority(&self, chain: &ChainId) -> Option<&Authority> {
        self.authorities.get(chain)
    }

    fn set_identity(&mut self, chain: ChainId, identity: Identity) {
        self.identities.insert(chain, identity);
    }

    fn set_authority(&mut self, chain: ChainId, authority: Authority) {
        self.authorities.insert(chain, authority);
    }

    fn remove_authority(&mut self, chain: &ChainId) -> Option<Authority> {
        self.authorities.remove(chain)
    }

    fn apply_admin(&mut self, directive: &Directive) -> Result<(), Self::Error> {
        match directive {
            Directive::AddFederatedServer { identity, height } => {
                self.promote_authority(identity, Status::FederatedServer, *height)?
            }
            Directive::AddAuditServer { identity, height } => {
                self.promote_authority(identity, Status::AuditServer, *height)?
            }
            Directive::RemoveFederatedServer { identity, .. } => {
                self.remove_authority(identity)
                    .ok_or(Error::AuthorityNotFound(*identity))?;
                self.identities.remove(identity);
            }
            Directive::AddSigningKey { identity, key } => {
                self.authority_mut(identity)?.signing_key = *key;
            }
            Directive::AddAnchorKey { identity, key } => {
                self.authority_mut(identity)?.set_anchor_key(key.clone());
            }
            Directive::AddEfficiency {
                identity,
                efficiency,
            } => {
                self.authority_mut(identity)?.efficiency = *efficiency;
                if let Some(id) = self.identities.get_mut(identity) {
                    id.efficiency = *efficiency;
                }
            }
            Directive::CoinbaseAddress { identity, address } => {
                self.authority_mut(identity)?.coinbase_address = *address;
                if let Some(id) = self.identities.get_mut(identity) {
                    id.coinbase_address = *address;
                }
            }
        }
        Ok(())
    }
}
