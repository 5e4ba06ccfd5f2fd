//! Maps controller state to the single status line the user sees.

use crate::error::{RevertReason, SessionError};
use crate::session::{SessionPhase, TxStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCategory {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub category: StatusCategory,
    pub message: String,
}

impl StatusReport {
    fn new(category: StatusCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }
}

/// Coarse controller state the reporter looks at when no status is set.
#[derive(Debug, Clone, Copy)]
pub struct StatusContext<'a> {
    pub phase: SessionPhase,
    pub is_owner: bool,
    pub chain_ok: bool,
    pub chain_name: &'a str,
}

pub fn report(status: &TxStatus, ctx: StatusContext<'_>) -> Option<StatusReport> {
    use StatusCategory::*;

    match status {
        TxStatus::Submitted(_) => Some(StatusReport::new(
            Info,
            "Transaction submitted... waiting for confirmation",
        )),
        TxStatus::Confirmed(_) => Some(StatusReport::new(Success, "Value updated successfully!")),
        TxStatus::Failed(err) => Some(failure(err)),
        TxStatus::Info(text) => Some(StatusReport::new(Info, text.clone())),
        TxStatus::Idle => idle(ctx),
    }
}

fn failure(err: &SessionError) -> StatusReport {
    use StatusCategory::*;

    match err {
        SessionError::NoProvider => StatusReport::new(Error, "Please install MetaMask!"),
        SessionError::UserRejected => StatusReport::new(Info, "Request rejected in wallet"),
        SessionError::ChainSwitchFailed(_) | SessionError::NoSigner | SessionError::Provider(_) => {
            StatusReport::new(Error, "Failed to connect wallet")
        }
        SessionError::ReadFailure(_) => {
            StatusReport::new(Error, "Failed to read contract state. Try refreshing.")
        }
        SessionError::Reverted(RevertReason::NotOwner) => {
            StatusReport::new(Error, "Error: Only owner can update value")
        }
        SessionError::Reverted(reason) => {
            StatusReport::new(Error, format!("Transaction failed: {}", reason))
        }
        SessionError::TransactionFailed(reason) => {
            StatusReport::new(Error, format!("Transaction failed: {}", reason))
        }
    }
}

fn idle(ctx: StatusContext<'_>) -> Option<StatusReport> {
    use StatusCategory::*;

    match ctx.phase {
        SessionPhase::Disconnected => Some(StatusReport::new(
            Warning,
            "Connect your wallet to continue",
        )),
        _ if !ctx.chain_ok => Some(StatusReport::new(
            Warning,
            format!("Switch your wallet to {}", ctx.chain_name),
        )),
        SessionPhase::Ready if !ctx.is_owner => Some(StatusReport::new(
            Warning,
            "Only the contract owner can update the value",
        )),
        _ => None,
    }
}
