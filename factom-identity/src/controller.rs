//! Deciding which chains to walk, and in which order, to resolve identities.
use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::config::{Config, OnFailure, Rescan};
use crate::engine::Engine;
use crate::entries::IdentityEntry;
use crate::fetch::{self, ChainEntry, Fetcher};
use crate::identity::Identity;
use crate::ledger::ChainId;
use crate::parser::{self, Parser};
use crate::worker::{Pool, Walk};

/// Error returned when resolving identities, generic over the fetcher and
/// engine errors.
#[derive(Debug, Error)]
pub enum Error<F: std::error::Error + 'static, E: std::error::Error + 'static> {
    #[error("failed to walk chain {chain}: {source}")]
    Fetch {
        chain: ChainId,
        #[source]
        source: fetch::Error<F>,
    },
    #[error(transparent)]
    Parse(parser::error::Parse<E>),
    #[error("identity {0} not found")]
    NotFound(ChainId),
}

impl<F: std::error::Error + 'static, E: std::error::Error + 'static> Error<F, E> {
    /// Whether the ledger itself could not be read.
    pub fn is_fetch(&self) -> bool {
        matches!(self, Self::Fetch { .. })
    }
}

/// Outcome of resolving every registered identity.
#[derive(Debug)]
pub struct Resolved<F: std::error::Error + 'static, E: std::error::Error + 'static> {
    /// Resolved identities, keyed by the hex form of their root chain id.
    pub identities: BTreeMap<String, Identity>,
    /// Identities that failed to resolve, keyed the same way.
    pub failures: BTreeMap<String, Error<F, E>>,
}

/// Resolves identities by walking the registration, root and management
/// chains of a ledger, in that order.
pub struct Controller<F, E> {
    fetcher: F,
    parser: Parser<E>,
    config: Config,
    /// Roots named by the last walk of the registration chain.
    registered: Option<Vec<ChainId>>,
}

impl<F, E> Controller<F, E>
where
    F: Fetcher + Sync,
    E: Engine,
{
    pub fn new(fetcher: F, engine: E, config: Config) -> Self {
        Self {
            parser: Parser::new(engine, &config),
            fetcher,
            config,
            registered: None,
        }
    }

    pub fn parser(&self) -> &Parser<E> {
        &self.parser
    }

    pub fn parser_mut(&mut self) -> &mut Parser<E> {
        &mut self.parser
    }

    /// Whether the ledger can be reached.
    pub fn is_alive(&self) -> bool {
        self.fetcher.is_alive()
    }

    /// Resolve the identity rooted at `root`.
    pub fn find_identity(&mut self, root: &ChainId) -> Result<Identity, Error<F::Error, E::Error>> {
        self.scan_registry()?;

        log::debug!(target: "controller", "Resolving identity {root}..");
        let entries = self.walk(root)?;
        self.parse(&entries)?;

        let management = match self.resolved(root) {
            Some(id) => id.management_chain_id,
            None => return Err(Error::NotFound(*root)),
        };
        if !management.is_zero() {
            let entries = self.walk(&management)?;
            self.parse(&entries)?;
        }

        self.resolved(root)
            .cloned()
            .ok_or(Error::NotFound(*root))
    }

    /// Resolve every identity named by the registration chain.
    ///
    /// Failing to read the registration chain fails the whole enumeration.
    /// Other failures are handled according to [`Config::on_failure`].
    pub fn find_all(&mut self) -> Result<Resolved<F::Error, E::Error>, Error<F::Error, E::Error>> {
        let roots = self.scan_registry()?;
        let pool = Pool::new(self.config.workers);
        let mut failures = BTreeMap::new();
        let mut visited = BTreeSet::from([self.config.registry]);

        log::info!(
            target: "controller",
            "Resolving {} registered identities with {} worker(s)..",
            roots.len(),
            self.config.workers.max(1)
        );

        let roots: Vec<ChainId> = roots.into_iter().filter(|r| visited.insert(*r)).collect();
        let walks = pool.walk(&self.fetcher, &roots);
        let mut resolved = Vec::with_capacity(roots.len());

        for (root, walk) in roots.into_iter().zip(walks) {
            match self.absorb(&root, walk) {
                Ok(()) => resolved.push(root),
                Err(e) => self.fail(&mut failures, root, e)?,
            }
        }

        // Management chains are declared by the root chains, so they are only
        // known once every root chain has been parsed.
        let mut owners = Vec::new();
        let mut managed = Vec::new();
        for root in resolved {
            let Some(id) = self.resolved(&root) else {
                log::debug!(target: "controller", "Identity {root} has no entries");
                continue;
            };
            let management = id.management_chain_id;
            if !management.is_zero() && visited.insert(management) {
                owners.push(root);
                managed.push(management);
            }
        }
        let walks = pool.walk(&self.fetcher, &managed);

        for ((root, management), walk) in owners.into_iter().zip(managed).zip(walks) {
            if let Err(e) = self.absorb(&management, walk) {
                self.fail(&mut failures, root, e)?;
            }
        }

        let identities = self
            .parser
            .engine()
            .identities()
            .filter(|(_, id)| !id.identity_chain_id.is_zero())
            .map(|(chain, id)| (chain.to_hex(), id.clone()))
            .collect();

        Ok(Resolved {
            identities,
            failures,
        })
    }

    /// Walk and parse the registration chain, returning the roots it
    /// registers in registration order.
    fn scan_registry(&mut self) -> Result<Vec<ChainId>, Error<F::Error, E::Error>> {
        if let (Rescan::Once, Some(roots)) = (self.config.rescan, &self.registered) {
            return Ok(roots.clone());
        }
        let registry = self.config.registry;
        let entries = self.walk(&registry)?;
        self.parse(&entries)?;

        let mut roots = Vec::new();
        for e in &entries {
            if let Ok(IdentityEntry::Register { identity }) = IdentityEntry::decode(&e.entry.ext_ids) {
                if !identity.is_zero() && !roots.contains(&identity) {
                    roots.push(identity);
                }
            }
        }
        log::debug!(
            target: "controller",
            "Registration chain {registry} names {} identities", roots.len()
        );
        self.registered = Some(roots.clone());

        Ok(roots)
    }

    /// Parse the result of walking `chain`.
    fn absorb(
        &mut self,
        chain: &ChainId,
        walk: Walk<F::Error>,
    ) -> Result<(), Error<F::Error, E::Error>> {
        let entries = walk.map_err(|source| Error::Fetch {
            chain: *chain,
            source,
        })?;
        self.parse(&entries)
    }

    /// Record the failure of `root`, or return it if failures abort.
    fn fail(
        &self,
        failures: &mut BTreeMap<String, Error<F::Error, E::Error>>,
        root: ChainId,
        err: Error<F::Error, E::Error>,
    ) -> Result<(), Error<F::Error, E::Error>> {
        match self.config.on_failure {
            OnFailure::Abort => Err(err),
            OnFailure::Continue => {
                log::warn!(target: "controller", "Failed to resolve identity {root}: {err}");
                failures.insert(root.to_hex(), err);

                Ok(())
            }
        }
    }

    fn walk(&self, chain: &ChainId) -> Result<Vec<ChainEntry>, Error<F::Error, E::Error>> {
        fetch::chain_entries(&self.fetcher, chain).map_err(|source| Error::Fetch {
            chain: *chain,
            source,
        })
    }

    fn parse(&mut self, entries: &[ChainEntry]) -> Result<(), Error<F::Error, E::Error>> {
        self.parser
            .parse_entries(entries)
            .map(|_| ())
            .map_err(Error::Parse)
    }

    /// An identity whose root chain has been seen.
    fn resolved(&self, root: &ChainId) -> Option<&Identity> {
        self.parser
            .identity(root)
            .filter(|id| !id.identity_chain_id.is_zero())
    }
}
