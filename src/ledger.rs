//! Collaborator seams: the ledger RPC client and the signing wallet

use crate::contract::MoveCall;
use crate::types::{Address, LedgerObject, ObjectId, TransactionEffects, TxDigest};
use std::future::Future;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("transaction {0} not found")]
    TransactionNotFound(TxDigest),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("rejected by user")]
    Rejected,
    #[error("no account connected")]
    NoAccount,
    #[error("submission failed: {0}")]
    Submission(String),
}

/// Read side of the ledger. Every call may fail transiently.
pub trait LedgerClient: Send + Sync {
    /// Block until `digest` is final and return its effects
    fn wait_for_transaction(
        &self,
        digest: &TxDigest,
    ) -> impl Future<Output = Result<TransactionEffects, LedgerError>> + Send;

    /// `Ok(None)` when the object does not exist (deleted, wrapped, never created)
    fn get_object(
        &self,
        id: &ObjectId,
    ) -> impl Future<Output = Result<Option<LedgerObject>, LedgerError>> + Send;

    fn owned_objects(
        &self,
        owner: &Address,
    ) -> impl Future<Output = Result<Vec<LedgerObject>, LedgerError>> + Send;
}

/// Wallet that signs a call as `sender` and submits it
pub trait WalletSigner: Send + Sync {
    fn sign_and_submit(
        &self,
        sender: &Address,
        call: &MoveCall,
    ) -> impl Future<Output = Result<TxDigest, WalletError>> + Send;
}
