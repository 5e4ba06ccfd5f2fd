//! Static description of the network the session must run on.
//!
//! The descriptor serializes to the EIP-3085 shape accepted by
//! `wallet_addEthereumChain`, so it can be handed to the wallet verbatim.

use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::utils::parse_hex_u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainDescriptor {
    /// Hex quantity, e.g. `0xa869`
    pub chain_id: String,
    pub chain_name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<String>,
    #[serde(default)]
    pub block_explorer_urls: Vec<String>,
}

impl ChainDescriptor {
    /// Avalanche C-Chain testnet (chain id 43113).
    pub fn avalanche_fuji() -> Self {
        Self {
            chain_id: "0xa869".to_string(),
            chain_name: "Avalanche Fuji Testnet".to_string(),
            native_currency: NativeCurrency {
                name: "AVAX".to_string(),
                symbol: "AVAX".to_string(),
                decimals: 18,
            },
            rpc_urls: vec!["https://api.avax-test.network/ext/bc/C/rpc".to_string()],
            block_explorer_urls: vec!["https://testnet.snowtrace.io/".to_string()],
        }
    }

    pub fn chain_id_u64(&self) -> Option<u64> {
        parse_hex_u64(&self.chain_id).ok()
    }

    /// Compares numerically so `0xA869` and `0xa869` are the same chain.
    pub fn matches(&self, chain_id: &str) -> bool {
        match (self.chain_id_u64(), parse_hex_u64(chain_id).ok()) {
            (Some(ours), Some(theirs)) => ours == theirs,
            _ => false,
        }
    }

    pub fn default_rpc_url(&self) -> Option<&str> {
        self.rpc_urls.first().map(String::as_str)
    }

    /// Params for `wallet_switchEthereumChain`.
    pub fn switch_params(&self) -> Value {
        json!([{ "chainId": self.chain_id }])
    }

    /// Params for `wallet_addEthereumChain`.
    pub fn add_params(&self) -> Value {
        json!([self])
    }

    pub fn address_url(&self, address: &Address) -> Option<String> {
        self.explorer_link("address", &format!("{:?}", address))
    }

    pub fn tx_url(&self, hash: &H256) -> Option<String> {
        self.explorer_link("tx", &format!("{:?}", hash))
    }

    fn explorer_link(&self, kind: &str, id: &str) -> Option<String> {
        let base = self.block_explorer_urls.first()?;
        Some(format!("{}/{}/{}", base.trim_end_matches('/'), kind, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fuji_serializes_in_add_chain_shape() {
        let value = serde_json::to_value(ChainDescriptor::avalanche_fuji()).unwrap();
        assert_eq!(value["chainId"], "0xa869");
        assert_eq!(value["chainName"], "Avalanche Fuji Testnet");
        assert_eq!(value["nativeCurrency"]["decimals"], 18);
        assert_eq!(
            value["rpcUrls"][0],
            "https://api.avax-test.network/ext/bc/C/rpc"
        );
        assert_eq!(value["blockExplorerUrls"][0], "https://testnet.snowtrace.io/");
    }

    #[test]
    fn chain_ids_compare_numerically() {
        let fuji = ChainDescriptor::avalanche_fuji();
        assert_eq!(fuji.chain_id_u64(), Some(43113));
        assert!(fuji.matches("0xA869"));
        assert!(fuji.matches("0xa869"));
        assert!(!fuji.matches("0x1"));
        assert!(!fuji.matches("garbage"));
    }

    #[test]
    fn explorer_links_use_first_explorer() {
        let fuji = ChainDescriptor::avalanche_fuji();
        let address: Address = "0x6ee367ae6704b26d31b7b0d7ae91efc81a7e82db".parse().unwrap();
        assert_eq!(
            fuji.address_url(&address).unwrap(),
            "https://testnet.snowtrace.io/address/0x6ee367ae6704b26d31b7b0d7ae91efc81a7e82db"
        );

        let mut bare = fuji.clone();
        bare.block_explorer_urls.clear();
        assert!(bare.tx_url(&H256::zero()).is_none());
    }
}
