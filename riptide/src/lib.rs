//! Synchronize a wallet's transaction set with the Bitcoin block chain,
//! either through a remote transaction indexer or through a peer-to-peer
//! manager, and report everything that happens as an ordered event stream.

pub mod chain;
pub mod client;
pub mod config;
pub mod events;
pub mod p2p;
pub mod poller;
pub mod sync;
#[cfg(test)]
mod testutils;
pub mod wallet;

pub use miniscript;

pub use crate::{
    chain::{ChainParams, Checkpoint},
    config::Config,
    events::{EventSink, SyncEvent},
    sync::{SyncDepth, SyncManager, SyncMode},
    wallet::Wallet,
};
