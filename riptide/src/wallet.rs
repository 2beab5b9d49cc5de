//! Interface to the wallet's address book and transaction set.
//!
//! The sync engine never owns the wallet. It borrows it through this trait
//! to enumerate addresses, pre-derive them up to the gap limits, and record
//! the transactions discovered on the chain.

use std::collections::HashSet;

use miniscript::bitcoin::{Address, Amount, Transaction, Txid};

/// How many consecutive unused receive addresses to keep derived ahead.
pub const GAP_LIMIT_EXTERNAL: u32 = 10;
/// How many consecutive unused change addresses to keep derived ahead.
pub const GAP_LIMIT_INTERNAL: u32 = 5;

/// The two derivation chains of a wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyChain {
    /// Receive addresses, handed out to external parties.
    External,
    /// Change addresses, only ever paid by the wallet itself.
    Internal,
}

/// Confirmation info for a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub height: u64,
    /// Header timestamp of the confirming block.
    pub time: u64,
}

/// Per-transaction data the sync engine needs to pick rescan start points.
#[derive(Debug, Clone)]
pub struct TxSummary {
    pub txid: Txid,
    pub block: Option<BlockInfo>,
    /// Total amount debited from the wallet by this transaction.
    pub amount_sent: Amount,
    /// Whether the transaction is well-formed and properly signed as far
    /// as the wallet can tell.
    pub is_valid: bool,
}

/// Our window into the wallet.
///
/// Addresses compare and hash by their canonical payload. The same key in
/// its native and legacy encodings yields two distinct entries, which is
/// what a remote indexer expects to be queried with.
pub trait Wallet: Send {
    /// Every address the wallet has derived so far, canonical encoding.
    fn all_addresses(&self) -> HashSet<Address>;

    /// Legacy-encoded counterparts of the wallet's addresses. Empty for
    /// wallets without a legacy form.
    fn legacy_addresses(&self) -> HashSet<Address>;

    /// Derive addresses on `keychain` until `gap_limit` consecutive unused
    /// ones exist, and return those, first unused first.
    fn unused_addresses(&mut self, keychain: KeyChain, gap_limit: u32) -> Vec<Address>;

    /// Whether a transaction with this txid is already recorded.
    fn contains_transaction(&self, txid: &Txid) -> bool;

    /// Record a newly discovered transaction. Recording the same
    /// transaction again must be a no-op.
    fn register_transaction(&mut self, tx: Transaction, block: Option<BlockInfo>);

    /// Update the confirmation status of a known transaction.
    fn update_transaction(&mut self, txid: &Txid, block: Option<BlockInfo>);

    /// Summaries of all recorded transactions.
    fn transactions(&self) -> Vec<TxSummary>;
}
