// src/lib.rs

// Re-export commonly used types
pub use ethers::types::{Address, H256, U256};

pub mod chain;
pub mod config;
pub mod contract;
pub mod error;
pub mod provider;
pub mod session;
pub mod status;
pub mod utils;

pub use chain::ChainDescriptor;
pub use config::Config;
pub use contract::{ContractBinding, ContractInterface};
pub use error::{DraftError, Rejection, RevertReason, SessionError};
pub use provider::{LocalWalletProvider, ProviderEvent, ProviderGateway, WalletProvider};
pub use session::{SessionController, SessionHandle, SessionPhase, SessionSnapshot, TxStatus};
pub use status::{StatusCategory, StatusReport};
