//! Interface to the remote transaction indexer backing client-mode sync.

use std::collections::HashSet;

use miniscript::bitcoin::{Address, Txid};

/// Correlates an indexer response with the call that caused it. Allocated
/// by the sync engine, strictly increasing over a manager's lifetime, never
/// zero.
pub type RequestId = u64;

/// A remote service that can be asked about the chain and the wallet's
/// transactions.
///
/// All calls are fire-and-forget: the implementation performs the network
/// round trip on its own threads and feeds the outcome back through the
/// manager's `announce_*` methods, quoting the request id it was given.
/// Responses quoting an id the manager no longer expects are dropped.
pub trait IndexerClient: Send + Sync {
    /// Ask for the current best block height. Answered through
    /// `announce_block_number`.
    fn get_block_number(&self, request_id: RequestId);

    /// Ask for every transaction touching one of `addresses` with a
    /// confirmation height in the half-open range `[begin, end)`, plus any
    /// relevant unconfirmed ones. Each hit is returned through
    /// `announce_transaction`, then the round is closed with
    /// `announce_transactions_done`.
    fn get_transactions(
        &self,
        addresses: &HashSet<Address>,
        begin: u64,
        end: u64,
        request_id: RequestId,
    );

    /// Broadcast a raw transaction. The verdict is reported through
    /// `announce_transaction_submitted`.
    fn submit_transaction(&self, raw_tx: Vec<u8>, txid: Txid, request_id: RequestId);
}
