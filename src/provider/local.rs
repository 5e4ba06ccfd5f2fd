//! A wallet provider that signs with a local private key and talks to a
//! node over HTTP JSON-RPC. It lets the session run headless (scripts,
//! integration environments) with the same request surface a browser wallet
//! exposes.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use ethers::types::{transaction::eip2718::TypedTransaction, Address, TransactionRequest, U256};
use ethers_signers::{LocalWallet, Signer};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use super::nonce_manager::NonceManager;
use super::protocol::{
    error_codes, methods, ProviderEvent, ProviderRpcError, RpcRequest, RpcResponse,
};
use super::WalletProvider;
use crate::chain::ChainDescriptor;
use crate::config::Config;
use crate::utils::{encode_hex, parse_hex_u64, to_hex_quantity};

const EVENT_BUFFER: usize = 16;

pub struct LocalWalletProvider {
    wallet: LocalWallet,
    client: Client,
    rpc_url: RwLock<String>,
    nonce_manager: NonceManager,
    next_id: AtomicU64,
    events: broadcast::Sender<ProviderEvent>,
}

impl LocalWalletProvider {
    pub fn new(private_key: &str, rpc_url: impl Into<String>) -> Result<Self> {
        let wallet = LocalWallet::from_str(private_key)
            .map_err(|e| anyhow!("Invalid private key: {}", e))?;
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Ok(Self {
            wallet,
            client: Client::new(),
            rpc_url: RwLock::new(rpc_url.into()),
            nonce_manager: NonceManager::new(),
            next_id: AtomicU64::new(1),
            events,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let key = config
            .private_key
            .as_ref()
            .context("PRIVATE_KEY must be set to use the local wallet provider")?;
        Self::new(key.expose_secret(), config.rpc_url.clone())
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    pub async fn rpc_url(&self) -> String {
        self.rpc_url.read().await.clone()
    }

    async fn forward(&self, method: &str, params: Value) -> Result<Value, ProviderRpcError> {
        let url = self.rpc_url().await;
        self.forward_to(&url, method, params).await
    }

    async fn forward_to(
        &self,
        url: &str,
        method: &str,
        params: Value,
    ) -> Result<Value, ProviderRpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!("-> {} {} {}", url, method, params);

        let response = self
            .client
            .post(url)
            .json(&RpcRequest::new(id, method, params))
            .send()
            .await
            .map_err(|e| ProviderRpcError::new(error_codes::DISCONNECTED, e.to_string()))?;
        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| ProviderRpcError::new(error_codes::INTERNAL_ERROR, e.to_string()))?;

        body.into_result()
    }

    async fn remote_chain_id(&self, url: &str) -> Result<u64, ProviderRpcError> {
        let result = self.forward_to(url, methods::ETH_CHAIN_ID, json!([])).await?;
        result
            .as_str()
            .and_then(|hex| parse_hex_u64(hex).ok())
            .ok_or_else(|| {
                ProviderRpcError::new(
                    error_codes::INTERNAL_ERROR,
                    format!("node returned invalid chain id: {}", result),
                )
            })
    }

    /// Succeeds only when the current endpoint already serves the chain.
    async fn switch_chain(&self, params: Value) -> Result<Value, ProviderRpcError> {
        let requested = params
            .get(0)
            .and_then(|p| p.get("chainId"))
            .and_then(Value::as_str)
            .and_then(|id| parse_hex_u64(id).ok())
            .ok_or_else(|| invalid_params("expected [{ chainId }]"))?;

        let url = self.rpc_url().await;
        let current = self.remote_chain_id(&url).await?;
        if current == requested {
            return Ok(Value::Null);
        }

        Err(ProviderRpcError::new(
            error_codes::UNRECOGNIZED_CHAIN,
            format!(
                "Unrecognized chain ID {}, add it with wallet_addEthereumChain first",
                to_hex_quantity(requested)
            ),
        ))
    }

    /// Re-points the provider at the chain's first RPC URL once that
    /// endpoint confirms it serves the requested chain id.
    async fn add_chain(&self, params: Value) -> Result<Value, ProviderRpcError> {
        let descriptor: ChainDescriptor = params
            .get(0)
            .cloned()
            .and_then(|p| serde_json::from_value(p).ok())
            .ok_or_else(|| invalid_params("expected [ChainDescriptor]"))?;
        let requested = descriptor
            .chain_id_u64()
            .ok_or_else(|| invalid_params("chainId must be a hex quantity"))?;
        let url = descriptor
            .default_rpc_url()
            .ok_or_else(|| invalid_params("rpcUrls must not be empty"))?
            .to_string();

        let served = self.remote_chain_id(&url).await.map_err(|err| {
            if err.code == error_codes::DISCONNECTED {
                ProviderRpcError::new(
                    error_codes::CHAIN_DISCONNECTED,
                    format!("{} is unreachable: {}", url, err.message),
                )
            } else {
                err
            }
        })?;
        if served != requested {
            return Err(ProviderRpcError::new(
                error_codes::INTERNAL_ERROR,
                format!(
                    "{} serves chain {}, not {}",
                    url,
                    to_hex_quantity(served),
                    descriptor.chain_id
                ),
            ));
        }

        *self.rpc_url.write().await = url.clone();
        info!("Local wallet now targets {} via {}", descriptor.chain_name, url);
        // No subscribers is fine
        let _ = self
            .events
            .send(ProviderEvent::ChainChanged(to_hex_quantity(requested)));
        Ok(Value::Null)
    }

    async fn fetch_quantity(&self, method: &str, params: Value) -> Result<U256, ProviderRpcError> {
        let result = self.forward(method, params).await?;
        result
            .as_str()
            .and_then(|hex| U256::from_str_radix(hex.trim_start_matches("0x"), 16).ok())
            .ok_or_else(|| {
                ProviderRpcError::new(
                    error_codes::INTERNAL_ERROR,
                    format!("{} returned {}", method, result),
                )
            })
    }

    async fn send_transaction(&self, params: Value) -> Result<Value, ProviderRpcError> {
        let tx: TransactionRequest = params
            .get(0)
            .cloned()
            .and_then(|p| serde_json::from_value(p).ok())
            .ok_or_else(|| invalid_params("expected [TransactionRequest]"))?;

        let from = self.address();
        if tx.from.map_or(false, |requested| requested != from) {
            return Err(ProviderRpcError::new(
                error_codes::UNAUTHORIZED,
                "requested sender is not managed by this wallet",
            ));
        }

        let url = self.rpc_url().await;
        let chain_id = self.remote_chain_id(&url).await?;
        let nonce = self
            .nonce_manager
            .next_nonce(
                from,
                self.fetch_quantity(
                    methods::ETH_GET_TRANSACTION_COUNT,
                    json!([from, "pending"]),
                ),
            )
            .await?;

        let tx = tx.from(from).nonce(nonce).chain_id(chain_id);
        let sent = self.sign_and_send(tx, chain_id).await;
        if let Err(err) = &sent {
            warn!("Transaction from {:?} with nonce {} not sent: {}", from, nonce, err);
            self.nonce_manager.reset(from).await;
        }
        sent
    }

    // Any error here leaves the allocated nonce unused.
    async fn sign_and_send(
        &self,
        mut tx: TransactionRequest,
        chain_id: u64,
    ) -> Result<Value, ProviderRpcError> {
        if tx.gas.is_none() {
            let call = serde_json::to_value(&tx)
                .map_err(|e| ProviderRpcError::new(error_codes::INTERNAL_ERROR, e.to_string()))?;
            let gas = self
                .fetch_quantity(methods::ETH_ESTIMATE_GAS, json!([call]))
                .await?;
            tx = tx.gas(gas);
        }

        if tx.gas_price.is_none() {
            let gas_price = self.fetch_quantity(methods::ETH_GAS_PRICE, json!([])).await?;
            tx = tx.gas_price(gas_price);
        }

        let typed: TypedTransaction = tx.into();
        let signature = self
            .wallet
            .clone()
            .with_chain_id(chain_id)
            .sign_transaction(&typed)
            .await
            .map_err(|e| ProviderRpcError::new(error_codes::INTERNAL_ERROR, e.to_string()))?;
        let raw = typed.rlp_signed(&signature);

        self.forward(methods::ETH_SEND_RAW_TRANSACTION, json!([encode_hex(&raw)]))
            .await
    }
}

#[async_trait]
impl WalletProvider for LocalWalletProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderRpcError> {
        match method {
            methods::ETH_ACCOUNTS | methods::ETH_REQUEST_ACCOUNTS => Ok(json!([self.address()])),
            methods::WALLET_SWITCH_CHAIN => self.switch_chain(params).await,
            methods::WALLET_ADD_CHAIN => self.add_chain(params).await,
            methods::ETH_SEND_TRANSACTION => self.send_transaction(params).await,
            _ => self.forward(method, params).await,
        }
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<ProviderEvent>> {
        Some(self.events.subscribe())
    }
}

fn invalid_params(message: &str) -> ProviderRpcError {
    ProviderRpcError::new(error_codes::INVALID_PARAMS, message)
}
