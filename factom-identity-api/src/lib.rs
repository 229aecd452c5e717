//! A [`Fetcher`] reading the ledger from a factomd node over its v2 JSON-RPC
//! interface.
pub mod wire;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;

use factom_identity::fetch::Fetcher;
use factom_identity::ledger::{
    Block, ChainId, Directory, Entry, EntryHash, Hash, HashError, Height, KeyMr,
};

/// Address of a local factomd node.
pub const DEFAULT_ADDRESS: &str = "localhost:8088";

/// Time allowed for a single request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request '{method}' failed: {source}")]
    Http {
        method: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("request '{method}' failed with code {code}: {message}")]
    Rpc {
        method: &'static str,
        code: i64,
        message: String,
    },
    #[error("request '{method}' returned neither a result nor an error")]
    Empty { method: &'static str },
    #[error("invalid result for '{method}': {source}")]
    Decode {
        method: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid hash in result for '{method}': {source}")]
    Hash {
        method: &'static str,
        #[source]
        source: HashError,
    },
    #[error("invalid hex in result for '{method}': {source}")]
    Hex {
        method: &'static str,
        #[source]
        source: hex::FromHexError,
    },
    #[error("requested entry {requested}, received entry {computed}")]
    EntryMismatch {
        requested: EntryHash,
        computed: EntryHash,
    },
}

/// JSON-RPC client of a factomd node.
#[derive(Debug)]
pub struct Client {
    http: reqwest::blocking::Client,
    url: String,
    next: AtomicU64,
}

impl Client {
    /// Create a client of the node at `addr`, eg. `localhost:8088`.
    pub fn new(addr: &str) -> Result<Self, Error> {
        Self::with_timeout(addr, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(addr: &str, timeout: Duration) -> Result<Self, Error> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(Error::Client)?;

        Ok(Self {
            http,
            url: format!("http://{addr}/v2"),
            next: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn call<R: DeserializeOwned>(
        &self,
        method: &'static str,
        params: serde_json::Value,
    ) -> Result<R, Error> {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        let request = wire::Request::new(id, method, params);

        log::trace!(target: "api", "Sending request #{id} '{method}' to {}", self.url);

        let response: wire::Response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .and_then(|r| r.json())
            .map_err(|source| Error::Http { method, source })?;

        response.into_result(method)
    }
}

impl Fetcher for Client {
    type Error = Error;

    fn head(&self, chain: &ChainId) -> Result<KeyMr, Self::Error> {
        match self.call::<wire::ChainHead>("chain-head", json!({ "chainid": chain })) {
            Ok(head) => head.keymr(),
            Err(Error::Rpc {
                code: wire::MISSING_CHAIN_HEAD,
                ..
            }) => {
                log::debug!(target: "api", "Chain {chain} has no head");
                Ok(Hash::ZERO)
            }
            Err(e) => Err(e),
        }
    }

    fn block(&self, keymr: &KeyMr) -> Result<Block, Self::Error> {
        let block: wire::EntryBlock = self.call("entry-block", json!({ "keymr": keymr }))?;

        Ok(block.into_block(*keymr))
    }

    fn entry(&self, hash: &EntryHash) -> Result<Entry, Self::Error> {
        let entry: wire::Entry = self.call("entry", json!({ "hash": hash }))?;

        entry.into_entry(hash)
    }

    fn directory(&self, height: Height) -> Result<Directory, Self::Error> {
        let dblock: wire::DirectoryBlock =
            self.call("dblock-by-height", json!({ "height": height }))?;

        Ok(dblock.into_directory())
    }

    fn is_alive(&self) -> bool {
        match self.call::<wire::DirectoryHead>("directory-block-head", serde_json::Value::Null) {
            Ok(head) => {
                log::debug!(target: "api", "Node at {} is at directory block {}", self.url, head.keymr);
                true
            }
            Err(e) => {
                log::warn!(target: "api", "Node at {} is not reachable: {e}", self.url);
                false
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_url() {
        let client = Client::new(DEFAULT_ADDRESS).unwrap();

        assert_eq!(client.url(), "http://localhost:8088/v2");
    }

    #[test]
    fn test_unreachable_node() {
        // Nothing listens on the discard port.
        let client = Client::with_timeout("127.0.0.1:9", Duration::from_millis(200)).unwrap();

        assert!(!client.is_alive());
        assert!(matches!(
            client.head(&Hash::ZERO),
            Err(Error::Http { method: "chain-head", .. })
        ));
    }
}
