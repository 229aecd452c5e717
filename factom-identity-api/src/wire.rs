//! factomd v2 JSON-RPC messages.
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use factom_identity::ledger::{self, Directory, EntryHash, Hash, Height, KeyMr, Timestamp};

use crate::Error;

/// Code returned by `chain-head` for a chain that has no blocks.
pub const MISSING_CHAIN_HEAD: i64 = -32009;

#[derive(Debug, Serialize)]
pub struct Request<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub params: serde_json::Value,
}

impl<'a> Request<'a> {
    pub fn new(id: u64, method: &'a str, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl Response {
    /// Decode the result of `method`, or turn the RPC error into an [`Error`].
    pub fn into_result<R: DeserializeOwned>(self, method: &'static str) -> Result<R, Error> {
        if let Some(RpcError {
            code,
            message,
            data,
        }) = self.error
        {
            let message = match data {
                Some(serde_json::Value::String(data)) => format!("{message}: {data}"),
                _ => message,
            };
            return Err(Error::Rpc {
                method,
                code,
                message,
            });
        }
        let result = self.result.ok_or(Error::Empty { method })?;

        serde_json::from_value(result).map_err(|source| Error::Decode { method, source })
    }
}

#[derive(Debug, Deserialize)]
pub struct ChainHead {
    /// Empty while the chain's first block is still being built.
    pub chainhead: String,
}

impl ChainHead {
    pub fn keymr(&self) -> Result<KeyMr, Error> {
        if self.chainhead.is_empty() {
            return Ok(Hash::ZERO);
        }
        self.chainhead.parse().map_err(|source| Error::Hash {
            method: "chain-head",
            source,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct EntryBlock {
    pub header: EntryBlockHeader,
    #[serde(default)]
    pub entrylist: Vec<EntryRef>,
}

#[derive(Debug, Deserialize)]
pub struct EntryBlockHeader {
    pub chainid: Hash,
    pub prevkeymr: Hash,
    pub dbheight: Height,
    #[serde(default)]
    pub blocksequencenumber: u32,
}

#[derive(Debug, Deserialize)]
pub struct EntryRef {
    pub entryhash: EntryHash,
    #[serde(default)]
    pub timestamp: u64,
}

impl EntryBlock {
    pub fn into_block(self, keymr: KeyMr) -> ledger::Block {
        ledger::Block {
            keymr,
            chain: self.header.chainid,
            prev: self.header.prevkeymr,
            height: self.header.dbheight,
            entries: self.entrylist.into_iter().map(|e| e.entryhash).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Entry {
    pub chainid: Hash,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub extids: Vec<String>,
}

impl Entry {
    /// Decode the entry, checking that it hashes to `hash`.
    pub fn into_entry(self, hash: &EntryHash) -> Result<ledger::Entry, Error> {
        let decode = |s: &str| {
            hex::decode(s).map_err(|source| Error::Hex {
                method: "entry",
                source,
            })
        };
        let ext_ids = self
            .extids
            .iter()
            .map(|id| decode(id.as_str()))
            .collect::<Result<Vec<_>, _>>()?;
        let content = decode(self.content.as_str())?;
        let entry = ledger::Entry::new(self.chainid, ext_ids, content);

        if entry.hash != *hash {
            return Err(Error::EntryMismatch {
                requested: *hash,
                computed: entry.hash,
            });
        }
        Ok(entry)
    }
}

#[derive(Debug, Deserialize)]
pub struct DirectoryBlock {
    pub dblock: DirectoryBlockBody,
}

#[derive(Debug, Deserialize)]
pub struct DirectoryBlockBody {
    pub header: DirectoryBlockHeader,
}

#[derive(Debug, Deserialize)]
pub struct DirectoryBlockHeader {
    pub dbheight: Height,
    /// Minutes since the Unix epoch.
    pub timestamp: u64,
}

impl DirectoryBlock {
    pub fn into_directory(self) -> Directory {
        let header = self.dblock.header;

        Directory {
            height: header.dbheight,
            timestamp: Timestamp::from_minutes(header.timestamp),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DirectoryHead {
    pub keymr: Hash,
}
