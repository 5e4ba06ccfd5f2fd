//! Typed handle over the SimpleStorage contract.
//!
//! Calls are ABI-encoded locally and routed through the wallet signer, so
//! reads and writes hit whatever network the wallet currently targets.

use std::time::Duration;

use anyhow::{anyhow, Result};
use ethers::abi::{parse_abi, Abi, Event, Function, RawLog, Token};
use ethers::types::{Address, Bytes, H256, U256, U64};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::{RevertReason, SessionError};
use crate::provider::{error_codes, methods, ProviderRpcError, WalletSigner};
use crate::utils::{decode_hex_str, encode_hex};

pub mod revert;

pub use revert::{classify_send_error, decode_revert_data};

pub const DEFAULT_CONTRACT_ADDRESS: &str = "0x6ee367ae6704b26d31b7b0d7ae91efc81a7e82db";

pub const SIMPLE_STORAGE_ABI: &[&str] = &[
    "function owner() view returns (address)",
    "function setValue(uint256 _value)",
    "function getValue() view returns (uint256)",
    "event ValueUpdated(uint256 newValue)",
];

const OWNER: &str = "owner";
const GET_VALUE: &str = "getValue";
const SET_VALUE: &str = "setValue";
const VALUE_UPDATED: &str = "ValueUpdated";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct ContractInterface {
    abi: Abi,
}

impl ContractInterface {
    /// Build from human-readable signatures. The interface must provide
    /// `owner`, `getValue`, `setValue` and the `ValueUpdated` event.
    pub fn parse(signatures: &[&str]) -> Result<Self> {
        let abi = parse_abi(signatures).map_err(|e| anyhow!("Invalid contract ABI: {}", e))?;
        for name in [OWNER, GET_VALUE, SET_VALUE] {
            abi.function(name)
                .map_err(|_| anyhow!("Contract ABI is missing function `{}`", name))?;
        }
        abi.event(VALUE_UPDATED)
            .map_err(|_| anyhow!("Contract ABI is missing event `{}`", VALUE_UPDATED))?;
        Ok(Self { abi })
    }

    pub fn simple_storage() -> Result<Self> {
        Self::parse(SIMPLE_STORAGE_ABI)
    }

    fn function(&self, name: &str) -> Result<&Function, SessionError> {
        self.abi
            .function(name)
            .map_err(|e| SessionError::ReadFailure(e.to_string()))
    }

    fn value_updated(&self) -> Option<&Event> {
        self.abi.event(VALUE_UPDATED).ok()
    }
}

#[derive(Clone)]
pub struct ContractBinding {
    address: Address,
    interface: ContractInterface,
    signer: WalletSigner,
    poll_interval: Duration,
}

impl ContractBinding {
    pub fn new(address: Address, interface: ContractInterface, signer: WalletSigner) -> Self {
        Self {
            address,
            interface,
            signer,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn call_object(&self, data: &[u8]) -> Value {
        json!({
            "from": self.signer.address(),
            "to": self.address,
            "data": encode_hex(data),
        })
    }

    async fn call(&self, name: &str, args: &[Token]) -> Result<Vec<Token>, SessionError> {
        let function = self.interface.function(name)?;
        let data = function
            .encode_input(args)
            .map_err(|e| SessionError::ReadFailure(e.to_string()))?;

        let result = self
            .signer
            .request(methods::ETH_CALL, json!([self.call_object(&data), "latest"]))
            .await
            .map_err(|e| SessionError::ReadFailure(e.message))?;

        let raw = result
            .as_str()
            .ok_or_else(|| SessionError::ReadFailure(format!("{} returned {}", name, result)))?;
        let bytes = decode_hex_str(raw).map_err(|e| SessionError::ReadFailure(e.to_string()))?;
        function
            .decode_output(&bytes)
            .map_err(|e| SessionError::ReadFailure(format!("{}: {}", name, e)))
    }

    pub async fn read_owner(&self) -> Result<Address, SessionError> {
        self.call(OWNER, &[])
            .await?
            .into_iter()
            .next()
            .and_then(Token::into_address)
            .ok_or_else(|| SessionError::ReadFailure("owner() returned no address".to_string()))
    }

    pub async fn read_value(&self) -> Result<U256, SessionError> {
        self.call(GET_VALUE, &[])
            .await?
            .into_iter()
            .next()
            .and_then(Token::into_uint)
            .ok_or_else(|| SessionError::ReadFailure("getValue() returned no value".to_string()))
    }

    /// Ask the wallet to send `setValue(value)`. Returns once the wallet has
    /// broadcast the transaction; confirmation is awaited separately.
    pub async fn write_value(&self, value: U256) -> Result<PendingTransaction, SessionError> {
        let function = self
            .interface
            .function(SET_VALUE)
            .map_err(|e| SessionError::TransactionFailed(e.to_string()))?;
        let data = function
            .encode_input(&[Token::Uint(value)])
            .map_err(|e| SessionError::TransactionFailed(e.to_string()))?;

        let call = self.call_object(&data);
        let hash = self
            .signer
            .send_transaction(call.clone())
            .await
            .map_err(|err| {
                warn!("setValue({}) was not sent: {}", value, err);
                classify_send_error(err)
            })?;

        info!("setValue({}) sent as {:?}", value, hash);
        Ok(PendingTransaction {
            hash,
            call,
            signer: self.signer.clone(),
            value_updated: self.interface.value_updated().cloned(),
            poll_interval: self.poll_interval,
        })
    }
}

/// A broadcast transaction whose outcome is not known yet.
pub struct PendingTransaction {
    hash: H256,
    call: Value,
    signer: WalletSigner,
    value_updated: Option<Event>,
    poll_interval: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub hash: H256,
    pub block_number: Option<U64>,
    /// Value carried by the `ValueUpdated` event, when the receipt has one
    pub new_value: Option<U256>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TxReceipt {
    #[serde(default)]
    block_number: Option<U64>,
    #[serde(default)]
    status: Option<U64>,
    #[serde(default)]
    logs: Vec<ReceiptLog>,
}

#[derive(Debug, Deserialize)]
struct ReceiptLog {
    address: Address,
    #[serde(default)]
    topics: Vec<H256>,
    #[serde(default)]
    data: Bytes,
}

impl PendingTransaction {
    pub fn hash(&self) -> H256 {
        self.hash
    }

    /// Poll for the receipt until the network includes the transaction.
    /// There is no timeout; dropping the future abandons the wait.
    pub async fn await_confirmation(self) -> Result<Confirmation, SessionError> {
        loop {
            let result = match self
                .signer
                .request(methods::ETH_GET_TRANSACTION_RECEIPT, json!([self.hash]))
                .await
            {
                Ok(result) => result,
                Err(err) if is_permanent(&err) => {
                    return Err(SessionError::TransactionFailed(err.message))
                }
                // The transaction may still land; keep polling
                Err(err) => {
                    warn!("Receipt lookup for {:?} failed: {}", self.hash, err);
                    tokio::time::sleep(self.poll_interval).await;
                    continue;
                }
            };

            if result.is_null() {
                debug!("{:?} not mined yet", self.hash);
                tokio::time::sleep(self.poll_interval).await;
                continue;
            }

            let receipt: TxReceipt = serde_json::from_value(result).map_err(|e| {
                SessionError::TransactionFailed(format!("malformed receipt: {}", e))
            })?;

            // Pre-Byzantium receipts carry no status; inclusion is success
            if receipt.status.map_or(true, |status| !status.is_zero()) {
                return Ok(Confirmation {
                    hash: self.hash,
                    block_number: receipt.block_number,
                    new_value: self.decode_value_updated(&receipt.logs),
                });
            }

            let reason = self.replay_revert(receipt.block_number).await;
            warn!("{:?} reverted: {}", self.hash, reason);
            return Err(SessionError::Reverted(reason));
        }
    }

    fn decode_value_updated(&self, logs: &[ReceiptLog]) -> Option<U256> {
        let event = self.value_updated.as_ref()?;
        let target = self
            .call
            .get("to")
            .and_then(|to| serde_json::from_value::<Address>(to.clone()).ok());
        logs.iter()
            .filter(|log| target.map_or(true, |to| to == log.address))
            .filter(|log| log.topics.first() == Some(&event.signature()))
            .find_map(|log| {
                event
                    .parse_log(RawLog {
                        topics: log.topics.clone(),
                        data: log.data.to_vec(),
                    })
                    .ok()?
                    .params
                    .into_iter()
                    .next()?
                    .value
                    .into_uint()
            })
    }

    /// Receipts carry no revert payload, so re-run the call against the
    /// block it was mined in to recover one.
    async fn replay_revert(&self, block: Option<U64>) -> RevertReason {
        let tag = match block {
            Some(number) => json!(number),
            None => json!("latest"),
        };
        match self
            .signer
            .request(methods::ETH_CALL, json!([self.call, tag]))
            .await
        {
            Err(err) => revert::revert_data(&err)
                .map(|data| decode_revert_data(&data))
                .unwrap_or(RevertReason::Unknown),
            Ok(_) => RevertReason::Unknown,
        }
    }
}

// Retrying cannot fix these
fn is_permanent(err: &ProviderRpcError) -> bool {
    matches!(err.code, error_codes::UNSUPPORTED_METHOD | error_codes::UNAUTHORIZED)
}
