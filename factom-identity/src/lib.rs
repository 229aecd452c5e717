pub mod admin;
pub mod config;
pub use config::{Config, Malformed, OnFailure, Rescan};

pub mod controller;
pub use controller::{Controller, Resolved};

pub mod engine;
pub use engine::Engine;

pub mod entries;
pub mod fetch;
pub use fetch::{ChainEntry, Fetcher};

pub mod identity;
pub use identity::{Authority, Identity, Status};

pub mod ledger;
pub use ledger::{ChainId, Entry, Hash};

pub mod parser;
pub use parser::{Extension, Parser};

pub mod worker;
