// src/session/models.rs

use ethers::types::{Address, H256, U256};

use crate::contract::ContractBinding;
use crate::error::{DraftError, SessionError};
use crate::status::StatusReport;

/// Where the controller is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Disconnected,
    Connecting,
    /// Account known, contract state not (yet) read
    Connected,
    Syncing,
    Ready,
    Submitting,
}

/// The connected account and what it is allowed to do.
#[derive(Clone, Default)]
pub struct Session {
    pub account: Option<Address>,
    pub binding: Option<ContractBinding>,
    /// Owner as of the last successful `owner()` read
    pub owner: Option<Address>,
    pub is_owner: bool,
}

impl Session {
    /// Recompute ownership from a fresh `owner()` read. Address equality is
    /// byte equality, so checksum casing never matters.
    pub fn record_owner(&mut self, owner: Address) {
        self.owner = Some(owner);
        self.is_owner = self.account == Some(owner);
    }

    pub fn can_write(&self) -> bool {
        self.account.is_some() && self.binding.is_some() && self.is_owner
    }
}

/// Last value read from the contract, kept as a decimal string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredValue {
    raw: String,
}

impl StoredValue {
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl From<U256> for StoredValue {
    fn from(value: U256) -> Self {
        Self {
            raw: value.to_string(),
        }
    }
}

impl std::fmt::Display for StoredValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// What the user has typed into the value field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputDraft {
    text: String,
}

impl InputDraft {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    /// Accepts plain decimal digits only; no sign, exponent or fraction.
    pub fn parse(&self) -> Result<U256, DraftError> {
        let text = self.text.trim();
        if text.is_empty() {
            return Err(DraftError::Empty);
        }
        if text.starts_with('-') {
            return Err(DraftError::Negative);
        }
        if !text.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DraftError::NotNumeric);
        }
        U256::from_dec_str(text).map_err(|_| DraftError::Overflow)
    }
}

/// The one status message on screen. Each action replaces it.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TxStatus {
    #[default]
    Idle,
    Submitted(H256),
    Confirmed(H256),
    Failed(SessionError),
    Info(String),
}

/// Everything a renderer needs, published after every transition.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub account: Option<Address>,
    pub owner: Option<Address>,
    pub is_owner: bool,
    pub chain_ok: bool,
    pub stored_value: Option<StoredValue>,
    pub draft: InputDraft,
    pub status: TxStatus,
    pub report: Option<StatusReport>,
}

impl SessionSnapshot {
    /// Value to display; a never-read value shows as zero.
    pub fn display_value(&self) -> &str {
        self.stored_value.as_ref().map_or("0", StoredValue::as_str)
    }

    pub fn can_submit(&self) -> bool {
        self.phase == SessionPhase::Ready && self.is_owner && self.draft.parse().is_ok()
    }
}
