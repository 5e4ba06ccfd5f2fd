// src/error.rs

use ethers::types::U256;
use thiserror::Error;

use crate::provider::ProviderRpcError;

/// Why an on-chain write was reverted, decoded from the revert payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RevertReason {
    #[error("Not owner")]
    NotOwner,
    #[error("{0}")]
    Message(String),
    #[error("panic code {0}")]
    Panic(U256),
    #[error("custom error 0x{}", hex::encode(.0))]
    Custom([u8; 4]),
    #[error("reverted without reason")]
    Unknown,
}

/// Every failure the session can run into. None of these escape the
/// controller; they end up inside a `TxStatus::Failed`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("no wallet provider available")]
    NoProvider,
    #[error("request rejected in wallet")]
    UserRejected,
    #[error("chain switch failed: {0}")]
    ChainSwitchFailed(String),
    #[error("no signer: wallet has no connected account")]
    NoSigner,
    #[error("contract read failed: {0}")]
    ReadFailure(String),
    #[error("transaction reverted: {0}")]
    Reverted(RevertReason),
    #[error("transaction failed: {0}")]
    TransactionFailed(String),
    #[error("wallet request failed: {0}")]
    Provider(ProviderRpcError),
}

impl From<ProviderRpcError> for SessionError {
    fn from(err: ProviderRpcError) -> Self {
        if err.is_user_rejected() {
            SessionError::UserRejected
        } else {
            SessionError::Provider(err)
        }
    }
}

/// Local validation failures for the value draft.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DraftError {
    #[error("enter a value first")]
    Empty,
    #[error("value must be non-negative")]
    Negative,
    #[error("value must be a whole decimal number")]
    NotNumeric,
    #[error("value does not fit in uint256")]
    Overflow,
}

/// User actions the controller refused without touching the network.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("another action is still in flight")]
    Busy,
    #[error("session is not ready for this action")]
    NotReady,
    #[error("connected account is not the contract owner")]
    NotOwner,
    #[error("invalid draft: {0}")]
    InvalidDraft(#[from] DraftError),
}
