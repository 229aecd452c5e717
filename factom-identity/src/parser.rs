//! Feeding ordered entries into an [`Engine`] and tracking which chains
//! belong to which identity.
use std::collections::{BTreeSet, HashMap};

use crate::admin::{Directive, Removal};
use crate::config::{Config, Malformed};
use crate::engine::Engine;
use crate::entries::IdentityEntry;
use crate::fetch::ChainEntry;
use crate::identity::{Authority, Identity, Status};
use crate::ledger::{ChainId, Entry, EntryHash};

pub mod error {
    use thiserror::Error;

    use crate::ledger::{ChainId, EntryHash};

    /// Structural problems with an entry that the engine did not consume.
    #[derive(Debug, Error)]
    pub enum Validation {
        #[error("entry {entry}: chain {chain} does not carry the identity prefix")]
        Prefix { entry: EntryHash, chain: ChainId },
        #[error("entry {entry}: expected at least 2 external ids, found {found}")]
        Markers { entry: EntryHash, found: usize },
        #[error("entry {entry}: empty version")]
        EmptyVersion { entry: EntryHash },
        #[error("entry {entry}: unsupported version {version}")]
        Version { entry: EntryHash, version: u8 },
    }

    #[derive(Debug, Error)]
    pub enum Parse<E: std::error::Error + 'static> {
        #[error(transparent)]
        Engine(E),
        #[error(transparent)]
        Validation(#[from] Validation),
        #[error("entry {entry}: extension '{name}' failed: {source}")]
        Extension {
            entry: EntryHash,
            name: String,
            #[source]
            source: Box<dyn std::error::Error + Send + Sync + 'static>,
        },
    }

    #[derive(Debug, Error)]
    pub enum Admin<E: std::error::Error + 'static> {
        #[error("authority {0} not found")]
        AuthorityNotFound(ChainId),
        #[error(transparent)]
        Engine(E),
    }
}

/// A handler for entry types the engine does not know about, selected by the
/// entry's second external id.
pub trait Extension {
    /// The entry name this extension handles.
    fn name(&self) -> &[u8];

    /// Parse an entry, returning the identity it changed, if any.
    fn parse(
        &mut self,
        entry: &ChainEntry,
    ) -> Result<Option<ChainId>, Box<dyn std::error::Error + Send + Sync + 'static>>;
}

/// Parses identity entries and admin directives into an [`Engine`].
pub struct Parser<E> {
    engine: E,
    prefix: Vec<u8>,
    ignored: BTreeSet<EntryHash>,
    malformed: Malformed,
    /// Management chain to the root chain of its identity.
    management: HashMap<ChainId, ChainId>,
    extensions: HashMap<Vec<u8>, Box<dyn Extension>>,
}

impl<E: Engine> Parser<E> {
    pub fn new(engine: E, config: &Config) -> Self {
        Self {
            engine,
            prefix: config.prefix.clone(),
            ignored: config.ignored.clone(),
            malformed: config.malformed,
            management: HashMap::new(),
            extensions: HashMap::new(),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Install an extension, returning the one previously installed under
    /// the same name.
    pub fn register(&mut self, extension: Box<dyn Extension>) -> Option<Box<dyn Extension>> {
        self.extensions
            .insert(extension.name().to_vec(), extension)
    }

    pub fn identity(&self, chain: &ChainId) -> Option<&Identity> {
        self.engine.identity(chain)
    }

    pub fn authority(&self, chain: &ChainId) -> Option<&Authority> {
        self.engine.authority(chain)
    }

    /// The root chain of the identity managed by `chain`.
    pub fn owner(&self, chain: &ChainId) -> Option<&ChainId> {
        self.management.get(chain)
    }

    /// Parse `entries` in order and flush whatever the engine deferred.
    /// Returns the identities that changed.
    pub fn parse_entries(
        &mut self,
        entries: &[ChainEntry],
    ) -> Result<BTreeSet<ChainId>, error::Parse<E::Error>> {
        let mut changed = BTreeSet::new();

        for e in entries {
            match self.parse_entry(e, true) {
                Ok(Some(chain)) => {
                    changed.insert(chain);
                }
                Ok(None) => {}
                Err(err) if self.malformed == Malformed::Skip => {
                    log::error!(
                        target: "parser",
                        "Skipping entry {} of chain {}: {err}", e.entry.hash, e.entry.chain
                    );
                }
                Err(err) => return Err(err),
            }
        }
        changed.extend(self.finalize().map_err(error::Parse::Engine)?);

        Ok(changed)
    }

    /// Parse a single entry, returning the root chain of the identity it
    /// changed, if any.
    pub fn parse_entry(
        &mut self,
        e: &ChainEntry,
        new: bool,
    ) -> Result<Option<ChainId>, error::Parse<E::Error>> {
        let entry = &e.entry;
        let changed = self
            .engine
            .apply_entry(entry, e.height, e.timestamp, new)
            .map_err(error::Parse::Engine)?;

        if changed {
            return Ok(Some(self.changed(entry)));
        }

        if !entry.chain.as_bytes().starts_with(&self.prefix) {
            return Err(error::Validation::Prefix {
                entry: entry.hash,
                chain: entry.chain,
            }
            .into());
        }
        if self.ignored.contains(&entry.hash) {
            return Ok(None);
        }
        // Every chain with the prefix ends up here: registry, root and
        // management chains alike.
        let ext_ids = &entry.ext_ids;
        if ext_ids.len() < 2 {
            return Err(error::Validation::Markers {
                entry: entry.hash,
                found: ext_ids.len(),
            }
            .into());
        }
        match ext_ids[0].first() {
            None => return Err(error::Validation::EmptyVersion { entry: entry.hash }.into()),
            Some(0) => {}
            Some(version) => {
                return Err(error::Validation::Version {
                    entry: entry.hash,
                    version: *version,
                }
                .into())
            }
        }

        match self.extensions.get_mut(ext_ids[1].as_slice()) {
            Some(ext) => ext.parse(e).map_err(|source| error::Parse::Extension {
                entry: entry.hash,
                name: String::from_utf8_lossy(&ext_ids[1]).into_owned(),
                source,
            }),
            None => Ok(None),
        }
    }

    /// Retry the entries the engine deferred, then pick up management chains
    /// that were only declared by those entries. Returns the identities the
    /// retried entries changed.
    pub fn finalize(&mut self) -> Result<BTreeSet<ChainId>, E::Error> {
        let applied = self.engine.flush_deferred()?;
        let changed = applied.iter().map(|e| self.changed(e)).collect();

        for (_, id) in self.engine.identities() {
            if id.identity_chain_id.is_zero() || id.management_chain_id.is_zero() {
                continue;
            }
            self.management
                .entry(id.management_chain_id)
                .or_insert(id.identity_chain_id);
        }
        Ok(changed)
    }

    /// Record the management chain of the identity `entry` changed and return
    /// the root chain of that identity.
    fn changed(&mut self, entry: &Entry) -> ChainId {
        let root = IdentityEntry::decode(&entry.ext_ids)
            .ok()
            .and_then(|e| e.identity().copied())
            .or_else(|| self.management.get(&entry.chain).copied())
            .unwrap_or(entry.chain);

        if let Some(id) = self.engine.identity(&root) {
            if !id.management_chain_id.is_zero() {
                self.management
                    .insert(id.management_chain_id, id.identity_chain_id);
            }
        }
        root
    }

    /// Apply an admin directive. The removal of a federated server is handled
    /// here according to `removal`; everything else goes to the engine.
    pub fn parse_admin(
        &mut self,
        directive: &Directive,
        removal: Removal,
    ) -> Result<(), error::Admin<E::Error>> {
        log::trace!(target: "parser", "Applying admin directive for {}", directive.identity());

        match (directive, removal) {
            (Directive::RemoveFederatedServer { identity, .. }, Removal::Soft) => {
                let mut authority = self
                    .engine
                    .authority(identity)
                    .cloned()
                    .ok_or(error::Admin::AuthorityNotFound(*identity))?;
                authority.status = Status::Unassigned;
                self.engine.set_authority(*identity, authority);

                if let Some(mut id) = self.engine.identity(identity).cloned() {
                    id.status = Status::Unassigned;
                    self.engine.set_identity(*identity, id);
                }
                log::debug!(target: "parser", "Authority {identity} is now unassigned");

                Ok(())
            }
            (Directive::RemoveFederatedServer { identity, .. }, Removal::Hard) => {
                if self.engine.authority(identity).is_none() {
                    return Err(error::Admin::AuthorityNotFound(*identity));
                }
                self.engine
                    .apply_admin(directive)
                    .map_err(error::Admin::Engine)
            }
            _ => self
                .engine
                .apply_admin(directive)
                .map_err(error::Admin::Engine),
        }
    }
}

#[cfg(test)]
mod test {
    use std::cell::RefCell;
    use std::rc::Rc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::engine::Memory;
    use crate::ledger::{Entry, Timestamp};
    use crate::test::fixtures::*;

    fn parser() -> Parser<Memory> {
        Parser::new(Memory::new(), &Config::default())
    }

    fn at(entry: Entry, height: u32) -> ChainEntry {
        ChainEntry {
            entry,
            timestamp: Timestamp::from_secs(u64::from(height) * 600),
            height,
        }
    }

    /// Root chain with a management chain holding a signing key.
    fn identity(root: ChainId, m: ChainId) -> (Vec<ChainEntry>, Vec<ChainEntry>) {
        (
            vec![
                at(identity_chain(root), 1),
                at(register_management(root, m), 2),
            ],
            vec![
                at(management_chain(m, root), 3),
                at(signing_key(m, root, key("signing"), 100), 4),
            ],
        )
    }

    #[test]
    fn test_management_chain_maps_to_root() {
        let root = chain("root");
        let m = chain("management");
        let (rooted, managed) = identity(root, m);
        let mut parser = parser();

        assert_eq!(parser.parse_entries(&rooted).unwrap(), BTreeSet::from([root]));
        assert_eq!(parser.owner(&m), Some(&root));
        assert_eq!(parser.parse_entries(&managed).unwrap(), BTreeSet::from([root]));
        assert_eq!(parser.identity(&root).unwrap().signing_key, key("signing"));
    }

    #[test]
    fn test_management_chain_before_root() {
        let root = chain("root");
        let m = chain("management");
        let (rooted, managed) = identity(root, m);
        let mut parser = parser();

        assert!(parser.parse_entries(&managed).unwrap().is_empty());
        assert_eq!(parser.engine().deferred(), 2);

        parser.parse_entries(&rooted).unwrap();
        let id = parser.identity(&root).unwrap();

        assert_eq!(parser.engine().deferred(), 0);
        assert_eq!(parser.owner(&m), Some(&root));
        assert_eq!(id.signing_key, key("signing"));
        assert_eq!(id.management_created, 3);
    }

    #[test]
    fn test_registration_reports_root() {
        let registry = Config::default().registry;
        let root = chain("root");
        let mut parser = parser();

        parser.parse_entries(&[at(identity_chain(root), 1)]).unwrap();
        let changed = parser.parse_entries(&[at(register(registry, root), 2)]).unwrap();

        assert_eq!(changed, BTreeSet::from([root]));
        assert_eq!(parser.identity(&root).unwrap().identity_registered, 2);
    }

    #[test]
    fn test_deferred_changes_are_reported() {
        let registry = Config::default().registry;
        let root = chain("root");
        let m = chain("management");
        let (_, managed) = identity(root, m);
        let mut parser = parser();

        assert!(parser.parse_entries(&managed).unwrap().is_empty());
        assert!(parser
            .parse_entries(&[at(register(registry, root), 1)])
            .unwrap()
            .is_empty());

        parser.parse_entry(&at(identity_chain(root), 2), true).unwrap();
        parser
            .parse_entry(&at(register_management(root, m), 2), true)
            .unwrap();

        assert_eq!(parser.finalize().unwrap(), BTreeSet::from([root]));
        assert_eq!(parser.engine().deferred(), 0);
        assert_eq!(parser.owner(&m), Some(&root));
        assert_eq!(parser.identity(&root).unwrap().signing_key, key("signing"));
    }

    #[test]
    fn test_parse_twice() {
        let root = chain("root");
        let m = chain("management");
        let (rooted, managed) = identity(root, m);
        let all = [rooted, managed].concat();

        let mut once = parser();
        once.parse_entries(&all).unwrap();
        let mut twice = parser();
        twice.parse_entries(&all).unwrap();
        twice.parse_entries(&all).unwrap();

        assert_eq!(once.identity(&root), twice.identity(&root));
        assert_eq!(once.owner(&m), twice.owner(&m));
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let root = chain("root");
        let mut parser = parser();
        let entries = vec![
            at(Entry::new(root, vec![vec![0]], vec![]), 1),
            at(Entry::new(root, vec![vec![], b"x".to_vec()], vec![]), 1),
            at(Entry::new(root, vec![vec![1], b"x".to_vec()], vec![]), 1),
            at(Entry::new(key("elsewhere"), vec![], vec![]), 1),
            at(identity_chain(root), 2),
        ];

        assert_eq!(parser.parse_entries(&entries).unwrap(), BTreeSet::from([root]));
        assert!(parser.identity(&root).is_some());
    }

    #[test]
    fn test_malformed_entries_rejected() {
        let root = chain("root");
        let config = Config {
            malformed: Malformed::Reject,
            ..Config::default()
        };
        let mut parser = Parser::new(Memory::new(), &config);
        let entries = vec![
            at(Entry::new(root, vec![vec![1], b"x".to_vec()], vec![]), 1),
            at(identity_chain(root), 2),
        ];

        let err = parser.parse_entries(&entries).unwrap_err();
        assert!(matches!(
            err,
            error::Parse::Validation(error::Validation::Version { version: 1, .. })
        ));
        assert!(parser.identity(&root).is_none());
    }

    #[test]
    fn test_validation_errors() {
        let root = chain("root");
        let mut parser = parser();
        let check = |parser: &mut Parser<Memory>, entry: Entry| {
            parser.parse_entry(&at(entry, 1), true).unwrap_err().to_string()
        };

        let outside = Entry::new(key("elsewhere"), vec![], vec![]);
        assert_eq!(
            check(&mut parser, outside.clone()),
            format!(
                "entry {}: chain {} does not carry the identity prefix",
                outside.hash, outside.chain
            )
        );
        let short = Entry::new(root, vec![vec![0]], vec![]);
        assert_eq!(
            check(&mut parser, short.clone()),
            format!("entry {}: expected at least 2 external ids, found 1", short.hash)
        );
        let empty = Entry::new(root, vec![vec![], vec![1]], vec![]);
        assert_eq!(
            check(&mut parser, empty.clone()),
            format!("entry {}: empty version", empty.hash)
        );
    }

    #[test]
    fn test_ignored_entry() {
        let root = chain("root");
        let entry = Entry::new(root, vec![vec![9]], vec![]);
        let config = Config {
            ignored: BTreeSet::from([entry.hash]),
            ..Config::default()
        };
        let mut parser = Parser::new(Memory::new(), &config);

        assert_eq!(parser.parse_entry(&at(entry, 1), true).unwrap(), None);
    }

    struct Naming {
        seen: Rc<RefCell<Vec<Vec<u8>>>>,
    }

    impl Extension for Naming {
        fn name(&self) -> &[u8] {
            b"Name"
        }

        fn parse(
            &mut self,
            entry: &ChainEntry,
        ) -> Result<Option<ChainId>, Box<dyn std::error::Error + Send + Sync + 'static>> {
            let name = entry.entry.ext_ids.get(2).ok_or("missing name")?;
            self.seen.borrow_mut().push(name.clone());
            Ok(Some(entry.entry.chain))
        }
    }

    #[test]
    fn test_extension() {
        let root = chain("root");
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut parser = parser();
        assert!(parser
            .register(Box::new(Naming { seen: seen.clone() }))
            .is_none());

        let named = Entry::new(root, vec![vec![0], b"Name".to_vec(), b"alice".to_vec()], vec![]);
        let broken = Entry::new(root, vec![vec![0], b"Name".to_vec()], vec![]);
        let other = Entry::new(root, vec![vec![0], b"Other".to_vec()], vec![]);

        assert_eq!(parser.parse_entry(&at(named, 1), true).unwrap(), Some(root));
        assert_eq!(parser.parse_entry(&at(other, 1), true).unwrap(), None);
        assert!(matches!(
            parser.parse_entry(&at(broken, 1), true),
            Err(error::Parse::Extension { .. })
        ));
        assert_eq!(*seen.borrow(), vec![b"alice".to_vec()]);
    }

    fn federated(root: ChainId) -> Parser<Memory> {
        let m = chain("management");
        let (rooted, managed) = identity(root, m);
        let mut parser = parser();

        parser.parse_entries(&[rooted, managed].concat()).unwrap();
        parser
            .parse_admin(
                &Directive::AddFederatedServer {
                    identity: root,
                    height: 5,
                },
                Removal::Hard,
            )
            .unwrap();
        parser
    }

    #[test]
    fn test_soft_removal() {
        let root = chain("root");
        let mut parser = federated(root);
        let remove = Directive::RemoveFederatedServer {
            identity: root,
            height: 6,
        };

        parser.parse_admin(&remove, Removal::Soft).unwrap();

        assert_eq!(parser.authority(&root).unwrap().status, Status::Unassigned);
        assert_eq!(parser.identity(&root).unwrap().status, Status::Unassigned);
        assert_eq!(parser.identity(&root).unwrap().signing_key, key("signing"));
    }

    #[test]
    fn test_hard_removal() {
        let root = chain("root");
        let mut parser = federated(root);
        let remove = Directive::RemoveFederatedServer {
            identity: root,
            height: 6,
        };

        parser.parse_admin(&remove, Removal::Hard).unwrap();

        assert!(parser.authority(&root).is_none());
        assert!(parser.identity(&root).is_none());
    }

    #[test]
    fn test_removal_of_unknown_authority() {
        let root = chain("root");
        let mut parser = parser();
        let remove = Directive::RemoveFederatedServer {
            identity: root,
            height: 6,
        };

        for removal in [Removal::Soft, Removal::Hard] {
            assert!(matches!(
                parser.parse_admin(&remove, removal),
                Err(error::Admin::AuthorityNotFound(id)) if id == root
            ));
        }
    }
}
