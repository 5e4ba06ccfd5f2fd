// src/main.rs

use std::sync::Arc;

use anyhow::{Context, Result};
use ethers::utils::to_checksum;
use simple_storage_session::{
    Config, ContractInterface, LocalWalletProvider, ProviderGateway, SessionController,
    SessionHandle, SessionPhase,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "simple_storage_session=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        error!("❌ {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    let gateway = match config.private_key {
        Some(_) => {
            let provider = LocalWalletProvider::from_config(&config)?;
            info!("Local wallet {:?} via {}", provider.address(), config.rpc_url);
            ProviderGateway::new(Arc::new(provider))
        }
        None => {
            warn!("PRIVATE_KEY not set, running without a wallet");
            ProviderGateway::absent()
        }
    };

    let interface = ContractInterface::simple_storage()?;
    let session = SessionHandle::new(SessionController::new(gateway, &config, interface));
    let _events = session.spawn_event_listener().await;

    session.load().await;
    let loaded = session.state();
    if loaded.phase == SessionPhase::Disconnected || !loaded.chain_ok {
        if let Err(rejected) = session.connect().await {
            warn!("Connect not attempted: {}", rejected);
        }
    }

    let state = session.state();
    if let Some(report) = &state.report {
        info!("[{:?}] {}", report.category, report.message);
    }
    if state.phase == SessionPhase::Ready {
        info!("Contract {}", to_checksum(&config.contract_address, None));
        if let Some(link) = config.chain.address_url(&config.contract_address) {
            info!("Explorer {}", link);
        }
        info!("Stored value: {}", state.display_value());
        if let Some(account) = &state.account {
            info!(
                "Account {} {} the owner",
                to_checksum(account, None),
                if state.is_owner { "is" } else { "is not" }
            );
        }
    }

    Ok(())
}
