//! In-memory wallet + chain used to drive the session controller.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ethers::abi::{decode, encode, ParamType, Token};
use ethers::types::{Address, H256, U256};
use ethers::utils::{id, keccak256};
use serde_json::{json, Value};
use tokio::sync::{broadcast, Notify};

use simple_storage_session::provider::{
    error_codes, ProviderEvent, ProviderRpcError, WalletProvider,
};
use simple_storage_session::utils::{decode_hex_str, encode_hex};
use simple_storage_session::{
    Config, ContractInterface, ProviderGateway, SessionController, SessionHandle, SessionSnapshot,
};

pub const FUJI: &str = "0xa869";

pub fn owner() -> Address {
    Address::repeat_byte(0x0a)
}

pub fn stranger() -> Address {
    Address::repeat_byte(0x0b)
}

pub fn contract() -> Address {
    Address::repeat_byte(0xcc)
}

struct Receipt {
    block: u64,
    success: bool,
    value: U256,
}

pub struct ChainState {
    pub authorized: Vec<Address>,
    pub reject_connect: bool,
    pub chain_id: String,
    pub known_chains: Vec<String>,
    pub reject_add_chain: bool,

    pub owner: Address,
    pub value: U256,
    pub fail_reads: bool,
    pub insufficient_funds: bool,
    /// Accept the tx but revert it in the block with this reason
    pub revert_in_block: Option<String>,
    /// Receipt lookups to fail before answering
    pub receipt_errors: u32,

    pub calls: Vec<String>,
    block: u64,
    receipts: HashMap<H256, Receipt>,
}

pub struct ScriptedWallet {
    state: Mutex<ChainState>,
    events: broadcast::Sender<ProviderEvent>,
    hold_receipts: Mutex<Option<Arc<Notify>>>,
}

impl ScriptedWallet {
    pub fn new(account: Address) -> Arc<Self> {
        let (events, _) = broadcast::channel(16);
        Arc::new(Self {
            state: Mutex::new(ChainState {
                authorized: vec![account],
                reject_connect: false,
                chain_id: FUJI.to_string(),
                known_chains: vec![FUJI.to_string()],
                reject_add_chain: false,
                owner: owner(),
                value: U256::from(100),
                fail_reads: false,
                insufficient_funds: false,
                revert_in_block: None,
                receipt_errors: 0,
                calls: Vec::new(),
                block: 1,
                receipts: HashMap::new(),
            }),
            events,
            hold_receipts: Mutex::new(None),
        })
    }

    pub fn configure(&self, f: impl FnOnce(&mut ChainState)) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn value(&self) -> U256 {
        self.state.lock().unwrap().value
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn called(&self, method: &str) -> bool {
        self.calls().iter().any(|m| m == method)
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn emit(&self, event: ProviderEvent) {
        self.events.send(event).unwrap();
    }

    /// Make receipt lookups wait until the returned gate is notified.
    pub fn hold_receipts(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.hold_receipts.lock().unwrap() = Some(gate.clone());
        gate
    }

    fn call_contract(&self, state: &ChainState, data: &[u8]) -> Result<Value, ProviderRpcError> {
        if state.fail_reads {
            return Err(ProviderRpcError::new(-32000, "header not found"));
        }
        let selector = &data[..4];
        if selector == id("owner()") {
            Ok(json!(encode_hex(&encode(&[Token::Address(state.owner)]))))
        } else if selector == id("getValue()") {
            Ok(json!(encode_hex(&encode(&[Token::Uint(state.value)]))))
        } else if selector == id("setValue(uint256)") {
            match &state.revert_in_block {
                Some(reason) => Err(revert(reason)),
                None => Ok(json!("0x")),
            }
        } else {
            Err(ProviderRpcError::new(error_codes::EXECUTION_REVERTED, "execution reverted"))
        }
    }

    fn send(&self, state: &mut ChainState, tx: &Value) -> Result<Value, ProviderRpcError> {
        let from: Address = serde_json::from_value(tx["from"].clone()).unwrap();
        let data = decode_hex_str(tx["data"].as_str().unwrap()).unwrap();
        assert_eq!(&data[..4], &id("setValue(uint256)"));

        if state.insufficient_funds {
            return Err(ProviderRpcError::new(
                -32000,
                "insufficient funds for gas * price + value",
            ));
        }
        if from != state.owner {
            // Wallets surface the gas-estimation revert before sending
            return Err(
                ProviderRpcError::new(-32603, "Internal JSON-RPC error.").with_data(json!({
                    "code": 3,
                    "message": "execution reverted: Not owner",
                    "data": encode_hex(&revert_payload("Not owner")),
                })),
            );
        }

        let value = decode(&[ParamType::Uint(256)], &data[4..]).unwrap()[0]
            .clone()
            .into_uint()
            .unwrap();
        state.block += 1;
        let hash = H256::from(keccak256(state.block.to_be_bytes()));
        let success = state.revert_in_block.is_none();
        if success {
            state.value = value;
        }
        state.receipts.insert(
            hash,
            Receipt {
                block: state.block,
                success,
                value,
            },
        );
        Ok(json!(hash))
    }

    fn receipt(&self, state: &ChainState, hash: H256) -> Value {
        let Some(receipt) = state.receipts.get(&hash) else {
            return Value::Null;
        };
        let logs = if receipt.success {
            json!([{
                "address": contract(),
                "topics": [H256::from(keccak256("ValueUpdated(uint256)"))],
                "data": encode_hex(&encode(&[Token::Uint(receipt.value)])),
            }])
        } else {
            json!([])
        };
        let status = if receipt.success { "0x1" } else { "0x0" };
        json!({
            "transactionHash": hash,
            "blockNumber": format!("{:#x}", receipt.block),
            "status": status,
            "logs": logs,
        })
    }
}

fn revert_payload(reason: &str) -> Vec<u8> {
    let mut data = vec![0x08, 0xc3, 0x79, 0xa0];
    data.extend(encode(&[Token::String(reason.to_string())]));
    data
}

fn user_rejected() -> ProviderRpcError {
    ProviderRpcError::new(error_codes::USER_REJECTED, "User rejected the request.")
}

fn revert(reason: &str) -> ProviderRpcError {
    ProviderRpcError::new(
        error_codes::EXECUTION_REVERTED,
        format!("execution reverted: {}", reason),
    )
    .with_data(json!(encode_hex(&revert_payload(reason))))
}

#[async_trait]
impl WalletProvider for ScriptedWallet {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderRpcError> {
        if method == "eth_getTransactionReceipt" {
            let gate = self.hold_receipts.lock().unwrap().take();
            if let Some(gate) = gate {
                gate.notified().await;
            }
        }

        let mut state = self.state.lock().unwrap();
        state.calls.push(method.to_string());

        match method {
            "eth_accounts" => Ok(json!(state.authorized)),
            "eth_requestAccounts" => {
                if state.reject_connect {
                    Err(user_rejected())
                } else {
                    Ok(json!(state.authorized))
                }
            }
            "eth_chainId" => Ok(json!(state.chain_id)),
            "wallet_switchEthereumChain" => {
                let requested = params[0]["chainId"].as_str().unwrap().to_string();
                if state.known_chains.contains(&requested) {
                    state.chain_id = requested;
                    Ok(Value::Null)
                } else {
                    Err(ProviderRpcError::new(
                        error_codes::UNRECOGNIZED_CHAIN,
                        "Unrecognized chain ID",
                    ))
                }
            }
            "wallet_addEthereumChain" => {
                if state.reject_add_chain {
                    return Err(user_rejected());
                }
                let requested = params[0]["chainId"].as_str().unwrap().to_string();
                state.known_chains.push(requested.clone());
                state.chain_id = requested;
                Ok(Value::Null)
            }
            "eth_call" => {
                let to: Address = serde_json::from_value(params[0]["to"].clone()).unwrap();
                assert_eq!(to, contract());
                let data = decode_hex_str(params[0]["data"].as_str().unwrap()).unwrap();
                self.call_contract(&state, &data)
            }
            "eth_sendTransaction" => self.send(&mut state, &params[0]),
            "eth_getTransactionReceipt" => {
                if state.receipt_errors > 0 {
                    state.receipt_errors -= 1;
                    return Err(ProviderRpcError::new(-32000, "header not found"));
                }
                let hash: H256 = serde_json::from_value(params[0].clone()).unwrap();
                Ok(self.receipt(&state, hash))
            }
            other => Err(ProviderRpcError::new(error_codes::UNSUPPORTED_METHOD, other)),
        }
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<ProviderEvent>> {
        Some(self.events.subscribe())
    }
}

pub fn test_config() -> Config {
    Config {
        contract_address: contract(),
        confirmation_poll: Duration::from_millis(5),
        ..Config::default()
    }
}

pub fn session_for(wallet: &Arc<ScriptedWallet>) -> SessionHandle {
    let provider: Arc<dyn WalletProvider> = wallet.clone();
    session_with(ProviderGateway::new(provider))
}

pub fn session_with(gateway: ProviderGateway) -> SessionHandle {
    let interface = ContractInterface::simple_storage().unwrap();
    SessionHandle::new(SessionController::new(gateway, &test_config(), interface))
}

/// Wait until a published snapshot satisfies `pred`.
pub async fn wait_for(
    session: &SessionHandle,
    pred: impl Fn(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    let mut rx = session.subscribe();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            {
                let snapshot = rx.borrow_and_update();
                if pred(&snapshot) {
                    return snapshot.clone();
                }
            }
            rx.changed().await.unwrap();
        }
    })
    .await
    .expect("snapshot condition not reached")
}
