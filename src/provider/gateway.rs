// src/provider/gateway.rs

use std::sync::Arc;

use ethers::types::{Address, H256};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::protocol::{methods, ProviderEvent, ProviderRpcError};
use super::WalletProvider;
use crate::chain::ChainDescriptor;
use crate::error::SessionError;

/// Thin adapter over the wallet provider. A gateway without a provider is a
/// valid value: every call then fails with [`SessionError::NoProvider`].
#[derive(Clone)]
pub struct ProviderGateway {
    provider: Option<Arc<dyn WalletProvider>>,
}

impl ProviderGateway {
    pub fn new(provider: Arc<dyn WalletProvider>) -> Self {
        Self {
            provider: Some(provider),
        }
    }

    /// Gateway for an environment with no wallet installed.
    pub fn absent() -> Self {
        Self { provider: None }
    }

    pub fn is_available(&self) -> bool {
        self.provider.is_some()
    }

    fn provider(&self) -> Result<&Arc<dyn WalletProvider>, SessionError> {
        self.provider.as_ref().ok_or(SessionError::NoProvider)
    }

    /// Accounts already authorized for this origin. Never prompts.
    pub async fn list_accounts(&self) -> Result<Vec<Address>, SessionError> {
        let result = self
            .provider()?
            .request(methods::ETH_ACCOUNTS, json!([]))
            .await?;
        parse_accounts(result)
    }

    /// Prompts the user to authorize accounts.
    pub async fn request_accounts(&self) -> Result<Vec<Address>, SessionError> {
        let result = self
            .provider()?
            .request(methods::ETH_REQUEST_ACCOUNTS, json!([]))
            .await?;
        parse_accounts(result)
    }

    pub async fn chain_id(&self) -> Result<String, SessionError> {
        let result = self
            .provider()?
            .request(methods::ETH_CHAIN_ID, json!([]))
            .await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| SessionError::Provider(malformed("eth_chainId", &result)))
    }

    /// Switch the wallet to `descriptor`, registering the chain first when
    /// the wallet does not know it. Adding a chain prompts for the switch
    /// itself, so no second switch request is issued.
    pub async fn ensure_chain(&self, descriptor: &ChainDescriptor) -> Result<(), SessionError> {
        let provider = self.provider()?;
        let switched = provider
            .request(methods::WALLET_SWITCH_CHAIN, descriptor.switch_params())
            .await;

        let err = match switched {
            Ok(_) => {
                debug!("Wallet switched to chain {}", descriptor.chain_id);
                return Ok(());
            }
            Err(err) => err,
        };

        if !err.is_unrecognized_chain() {
            warn!("Chain switch to {} failed: {}", descriptor.chain_id, err);
            return Err(SessionError::ChainSwitchFailed(err.message));
        }

        info!(
            "Wallet does not know chain {}, requesting it be added",
            descriptor.chain_id
        );
        provider
            .request(methods::WALLET_ADD_CHAIN, descriptor.add_params())
            .await
            .map_err(|add_err| {
                warn!("Adding chain {} failed: {}", descriptor.chain_id, add_err);
                SessionError::ChainSwitchFailed(add_err.message)
            })?;
        Ok(())
    }

    /// Authority for sending transactions from the first connected account.
    pub async fn get_signer(&self) -> Result<WalletSigner, SessionError> {
        let provider = self.provider()?.clone();
        let accounts = self.list_accounts().await?;
        let address = accounts.first().copied().ok_or(SessionError::NoSigner)?;
        Ok(WalletSigner { address, provider })
    }

    pub fn subscribe(&self) -> Option<broadcast::Receiver<ProviderEvent>> {
        self.provider.as_ref().and_then(|provider| provider.subscribe())
    }
}

/// Sends requests on behalf of one account through the wallet.
#[derive(Clone)]
pub struct WalletSigner {
    address: Address,
    provider: Arc<dyn WalletProvider>,
}

impl WalletSigner {
    pub fn address(&self) -> Address {
        self.address
    }

    pub async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderRpcError> {
        self.provider.request(method, params).await
    }

    /// Hand a call object to the wallet for signing and broadcast.
    pub async fn send_transaction(&self, mut tx: Value) -> Result<H256, ProviderRpcError> {
        if let Some(object) = tx.as_object_mut() {
            object.insert("from".to_string(), json!(self.address));
        }
        let result = self
            .provider
            .request(methods::ETH_SEND_TRANSACTION, json!([tx]))
            .await?;
        serde_json::from_value(result.clone())
            .map_err(|_| malformed(methods::ETH_SEND_TRANSACTION, &result))
    }
}

fn parse_accounts(value: Value) -> Result<Vec<Address>, SessionError> {
    serde_json::from_value(value.clone())
        .map_err(|_| SessionError::Provider(malformed("account list", &value)))
}

fn malformed(what: &str, value: &Value) -> ProviderRpcError {
    ProviderRpcError::new(
        super::error_codes::INTERNAL_ERROR,
        format!("unexpected {} response: {}", what, value),
    )
}
