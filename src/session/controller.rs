// src/session/controller.rs

use std::time::Duration;

use ethers::types::Address;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::models::{InputDraft, Session, SessionPhase, SessionSnapshot, StoredValue, TxStatus};
use crate::chain::ChainDescriptor;
use crate::config::Config;
use crate::contract::{ContractBinding, ContractInterface};
use crate::error::{Rejection, SessionError};
use crate::provider::{ProviderEvent, ProviderGateway};
use crate::status::{self, StatusContext};

/// Owns the session and every transition on it.
///
/// All methods take `&mut self`, so whoever holds the controller is the only
/// writer. Network failures never escape: they are logged and turned into a
/// [`TxStatus::Failed`]. The `Err` side of user actions is reserved for
/// requests refused before any network call.
pub struct SessionController {
    gateway: ProviderGateway,
    chain: ChainDescriptor,
    contract_address: Address,
    interface: ContractInterface,
    poll_interval: Duration,

    phase: SessionPhase,
    session: Session,
    chain_ok: bool,
    stored_value: Option<StoredValue>,
    draft: InputDraft,
    status: TxStatus,

    observer: watch::Sender<SessionSnapshot>,
}

impl SessionController {
    pub fn new(gateway: ProviderGateway, config: &Config, interface: ContractInterface) -> Self {
        let (observer, _) = watch::channel(SessionSnapshot::default());
        let controller = Self {
            gateway,
            chain: config.chain.clone(),
            contract_address: config.contract_address,
            interface,
            poll_interval: config.confirmation_poll,
            phase: SessionPhase::Disconnected,
            session: Session::default(),
            chain_ok: true,
            stored_value: None,
            draft: InputDraft::default(),
            status: TxStatus::Idle,
            observer,
        };
        controller.publish();
        controller
    }

    pub fn gateway(&self) -> &ProviderGateway {
        &self.gateway
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.observer.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let ctx = StatusContext {
            phase: self.phase,
            is_owner: self.session.is_owner,
            chain_ok: self.chain_ok,
            chain_name: &self.chain.chain_name,
        };
        SessionSnapshot {
            phase: self.phase,
            account: self.session.account,
            owner: self.session.owner,
            is_owner: self.session.is_owner,
            chain_ok: self.chain_ok,
            stored_value: self.stored_value.clone(),
            draft: self.draft.clone(),
            status: self.status.clone(),
            report: status::report(&self.status, ctx),
        }
    }

    fn publish(&self) {
        self.observer.send_replace(self.snapshot());
    }

    fn set_phase(&mut self, phase: SessionPhase) {
        debug!("Session phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
        self.publish();
    }

    fn set_status(&mut self, status: TxStatus) {
        self.status = status;
        self.publish();
    }

    /// Page load: reuse an already-authorized account without prompting.
    pub async fn load(&mut self) {
        if !self.gateway.is_available() {
            warn!("No wallet provider detected");
            self.set_status(TxStatus::Failed(SessionError::NoProvider));
            return;
        }
        if self.phase != SessionPhase::Disconnected {
            return;
        }

        match self.gateway.list_accounts().await {
            Ok(accounts) => match accounts.first() {
                Some(account) => {
                    info!("Reusing authorized account {:?}", account);
                    self.session.account = Some(*account);
                    self.chain_ok = self.on_target_chain().await;
                    self.set_phase(SessionPhase::Connected);
                    if self.chain_ok {
                        self.setup_binding().await;
                    }
                }
                None => debug!("No authorized accounts, waiting for connect"),
            },
            Err(err) => error!("Silent account lookup failed: {}", err),
        }
    }

    async fn on_target_chain(&self) -> bool {
        match self.gateway.chain_id().await {
            Ok(chain_id) if self.chain.matches(&chain_id) => true,
            Ok(chain_id) => {
                warn!("Wallet is on chain {}, expected {}", chain_id, self.chain.chain_id);
                false
            }
            Err(err) => {
                error!("Could not read wallet chain: {}", err);
                false
            }
        }
    }

    /// Prompt for accounts, then make sure the wallet is on the target chain.
    /// Also available while connected on the wrong chain, to switch back.
    pub async fn connect(&mut self) -> Result<(), Rejection> {
        let wrong_chain = self.phase == SessionPhase::Connected && !self.chain_ok;
        if self.phase != SessionPhase::Disconnected && !wrong_chain {
            return Err(Rejection::NotReady);
        }
        self.set_phase(SessionPhase::Connecting);

        let account = match self.gateway.request_accounts().await {
            Ok(accounts) => match accounts.first() {
                Some(account) => *account,
                None => return self.abort_connect(SessionError::NoSigner),
            },
            Err(err) => return self.abort_connect(err),
        };

        if let Err(err) = self.gateway.ensure_chain(&self.chain).await {
            return self.abort_connect(err);
        }

        info!("Connected {:?} on {}", account, self.chain.chain_name);
        self.session.account = Some(account);
        self.chain_ok = true;
        self.status = TxStatus::Info("Wallet connected!".to_string());
        self.set_phase(SessionPhase::Connected);
        self.setup_binding().await;
        Ok(())
    }

    fn abort_connect(&mut self, err: SessionError) -> Result<(), Rejection> {
        match &err {
            SessionError::UserRejected => info!("Connection request rejected by user"),
            _ => error!("Failed to connect wallet: {}", err),
        }
        self.reset_session();
        self.status = TxStatus::Failed(err);
        self.set_phase(SessionPhase::Disconnected);
        Ok(())
    }

    fn reset_session(&mut self) {
        self.session = Session::default();
        self.stored_value = None;
    }

    /// Obtain a signer for the current account, bind the contract and sync.
    async fn setup_binding(&mut self) {
        self.session.binding = None;
        self.session.owner = None;
        self.session.is_owner = false;

        let signer = match self.gateway.get_signer().await {
            Ok(signer) => signer,
            Err(err) => {
                warn!("Could not obtain signer: {}", err);
                self.reset_session();
                self.status = TxStatus::Failed(err);
                self.set_phase(SessionPhase::Disconnected);
                return;
            }
        };

        self.session.account = Some(signer.address());
        let binding = ContractBinding::new(self.contract_address, self.interface.clone(), signer)
            .with_poll_interval(self.poll_interval);
        self.session.binding = Some(binding);
        self.sync().await;
    }

    /// Read value and owner. A failed read leaves the session `Connected`
    /// so the user can retry with a refresh.
    async fn sync(&mut self) {
        let binding = match self.session.binding.clone() {
            Some(binding) => binding,
            None => return,
        };
        self.set_phase(SessionPhase::Syncing);

        match tokio::try_join!(binding.read_value(), binding.read_owner()) {
            Ok((value, owner)) => {
                self.stored_value = Some(StoredValue::from(value));
                self.session.record_owner(owner);
                debug!(
                    "Synced value {} (owner {:?}, is_owner {})",
                    value, owner, self.session.is_owner
                );
                self.set_phase(SessionPhase::Ready);
            }
            Err(err) => {
                error!("Contract sync failed: {}", err);
                self.status = TxStatus::Failed(err);
                self.set_phase(SessionPhase::Connected);
            }
        }
    }

    /// Re-read contract state. Also retries after a failed sync.
    pub async fn refresh(&mut self) -> Result<(), Rejection> {
        match self.phase {
            SessionPhase::Ready => {
                self.sync().await;
                Ok(())
            }
            SessionPhase::Connected if self.chain_ok && self.session.account.is_some() => {
                if self.session.binding.is_some() {
                    self.sync().await;
                } else {
                    self.setup_binding().await;
                }
                Ok(())
            }
            _ => Err(Rejection::NotReady),
        }
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft.set(text);
        self.publish();
    }

    /// Validate `draft`, send `setValue` and wait for it to confirm.
    pub async fn submit(&mut self, draft: &str) -> Result<(), Rejection> {
        self.draft.set(draft);
        self.publish();

        if self.phase != SessionPhase::Ready {
            return Err(Rejection::NotReady);
        }
        if !self.session.can_write() {
            debug!("Rejecting submit from non-owner {:?}", self.session.account);
            return Err(Rejection::NotOwner);
        }
        let value = self.draft.parse()?;
        let binding = match self.session.binding.clone() {
            Some(binding) => binding,
            None => return Err(Rejection::NotReady),
        };

        self.status = TxStatus::Idle;
        self.set_phase(SessionPhase::Submitting);

        let pending = match binding.write_value(value).await {
            Ok(pending) => pending,
            Err(err) => {
                self.fail_submit(err);
                return Ok(());
            }
        };
        match self.chain.tx_url(&pending.hash()) {
            Some(link) => info!("setValue({}) submitted: {}", value, link),
            None => info!("setValue({}) submitted: {:?}", value, pending.hash()),
        }
        self.set_status(TxStatus::Submitted(pending.hash()));

        match pending.await_confirmation().await {
            Ok(confirmation) => {
                if let Some(emitted) = confirmation.new_value {
                    debug!("ValueUpdated({}) emitted", emitted);
                }
                info!(
                    "Value {} confirmed in {:?} at block {:?}",
                    value, confirmation.hash, confirmation.block_number
                );
                self.draft.clear();
                self.status = TxStatus::Confirmed(confirmation.hash);
                self.sync().await;
            }
            Err(err) => self.fail_submit(err),
        }
        Ok(())
    }

    fn fail_submit(&mut self, err: SessionError) {
        error!("setValue failed: {}", err);
        self.status = TxStatus::Failed(err);
        self.set_phase(SessionPhase::Ready);
    }

    /// Apply a wallet notification. Callers must route these through the
    /// same serialized path as user actions.
    pub async fn handle_event(&mut self, event: ProviderEvent) {
        match event {
            ProviderEvent::AccountsChanged(accounts) => self.accounts_changed(accounts).await,
            ProviderEvent::ChainChanged(chain_id) => self.chain_changed(chain_id).await,
        }
    }

    async fn accounts_changed(&mut self, accounts: Vec<Address>) {
        let Some(account) = accounts.first().copied() else {
            info!("Wallet reports no accounts, disconnecting");
            self.reset_session();
            self.status = TxStatus::Idle;
            self.set_phase(SessionPhase::Disconnected);
            return;
        };

        if self.phase == SessionPhase::Disconnected {
            debug!("Ignoring account change while disconnected");
            return;
        }

        info!("Active account changed to {:?}", account);
        self.session.account = Some(account);
        self.status = TxStatus::Idle;
        self.set_phase(SessionPhase::Connected);
        if self.chain_ok {
            self.setup_binding().await;
        }
    }

    async fn chain_changed(&mut self, chain_id: String) {
        let on_target = self.chain.matches(&chain_id);
        let was_ok = self.chain_ok;
        self.chain_ok = on_target;

        if self.phase == SessionPhase::Disconnected {
            self.publish();
            return;
        }

        if !on_target {
            warn!("Wallet moved to chain {}, expected {}", chain_id, self.chain.chain_id);
            self.session.binding = None;
            self.session.owner = None;
            self.session.is_owner = false;
            self.status = TxStatus::Idle;
            self.set_phase(SessionPhase::Connected);
        } else if !was_ok {
            info!("Wallet back on {}", self.chain.chain_name);
            self.status = TxStatus::Idle;
            self.set_phase(SessionPhase::Connected);
            self.setup_binding().await;
        }
    }
}
