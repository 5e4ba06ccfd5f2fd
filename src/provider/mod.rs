//! Wallet provider boundary.
//!
//! A [`WalletProvider`] is anything that answers EIP-1193 style
//! `request(method, params)` calls: an injected browser wallet bridge, the
//! [`LocalWalletProvider`] backed by a private key, or a scripted test double.
//! The rest of the crate only talks to it through [`ProviderGateway`].

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

pub mod gateway;
pub mod local;
pub mod nonce_manager;
pub mod protocol;

pub use gateway::{ProviderGateway, WalletSigner};
pub use local::LocalWalletProvider;
pub use protocol::{error_codes, methods, ProviderEvent, ProviderRpcError};

#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Issue a single request. Anything that prompts the user happens here.
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderRpcError>;

    /// Stream of account/chain notifications, if the provider emits them.
    fn subscribe(&self) -> Option<broadcast::Receiver<ProviderEvent>> {
        None
    }
}
