// src/config.rs

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use ethers::types::Address;
use secrecy::SecretString;
use url::Url;

use crate::chain::ChainDescriptor;
use crate::contract::DEFAULT_CONTRACT_ADDRESS;

const DEFAULT_POLL_MS: u64 = 1000;

// Everything the session needs to know about its environment, loaded once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    /// Network the session insists on
    pub chain: ChainDescriptor,
    /// SimpleStorage deployment
    pub contract_address: Address,

    // Local signing provider settings
    pub rpc_url: String,
    pub private_key: Option<SecretString>,

    /// Delay between receipt polls while awaiting confirmation
    pub confirmation_poll: Duration,
}

impl Default for Config {
    fn default() -> Self {
        let chain = ChainDescriptor::avalanche_fuji();
        let rpc_url = chain.default_rpc_url().unwrap_or_default().to_string();
        Self {
            chain,
            contract_address: DEFAULT_CONTRACT_ADDRESS
                .parse()
                .unwrap_or_else(|_| Address::zero()),
            rpc_url,
            private_key: None,
            confirmation_poll: Duration::from_millis(DEFAULT_POLL_MS),
        }
    }
}

impl Config {
    /// Loads configuration from environment variables (and `.env` if present).
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Config::default();

        let contract_address = match env::var("CONTRACT_ADDRESS") {
            Ok(raw) => raw
                .parse::<Address>()
                .context("CONTRACT_ADDRESS must be a 20-byte hex address")?,
            Err(_) => defaults.contract_address,
        };

        let rpc_url = env::var("RPC_URL").unwrap_or(defaults.rpc_url);
        Url::parse(&rpc_url).context("RPC_URL must be a valid URL")?;

        let confirmation_poll = env::var("CONFIRMATION_POLL_MS")
            .unwrap_or_else(|_| DEFAULT_POLL_MS.to_string())
            .parse::<u64>()
            .map(Duration::from_millis)
            .context("CONFIRMATION_POLL_MS must be a valid number")?;

        Ok(Config {
            chain: defaults.chain,
            contract_address,
            rpc_url,
            private_key: env::var("PRIVATE_KEY")
                .ok()
                .filter(|key| !key.is_empty())
                .map(SecretString::new),
            confirmation_poll,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_target_fuji_deployment() {
        let config = Config::default();
        assert!(config.chain.matches("0xa869"));
        assert_eq!(
            format!("{:?}", config.contract_address),
            "0x6ee367ae6704b26d31b7b0d7ae91efc81a7e82db"
        );
        assert_eq!(config.rpc_url, "https://api.avax-test.network/ext/bc/C/rpc");
        assert!(config.private_key.is_none());
        assert_eq!(config.confirmation_poll, Duration::from_secs(1));
    }
}
