// src/session/handle.rs

use std::sync::Arc;

use tokio::sync::{broadcast::error::RecvError, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::controller::SessionController;
use super::models::SessionSnapshot;
use crate::error::Rejection;
use crate::provider::ProviderEvent;

/// Shareable front door to a [`SessionController`].
///
/// User actions never wait behind one another: if the controller is busy the
/// action is dropped with [`Rejection::Busy`]. Wallet notifications do wait
/// their turn, so they are applied in order and never interleave with an
/// in-flight action.
#[derive(Clone)]
pub struct SessionHandle {
    controller: Arc<Mutex<SessionController>>,
    state: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    pub fn new(controller: SessionController) -> Self {
        let state = controller.subscribe();
        Self {
            controller: Arc::new(Mutex::new(controller)),
            state,
        }
    }

    /// Latest published snapshot. Readable while an action is in flight.
    pub fn state(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.clone()
    }

    fn try_controller(&self) -> Result<tokio::sync::MutexGuard<'_, SessionController>, Rejection> {
        self.controller.try_lock().map_err(|_| {
            debug!("Controller busy, dropping user action");
            Rejection::Busy
        })
    }

    pub async fn load(&self) {
        self.controller.lock().await.load().await;
    }

    pub async fn connect(&self) -> Result<(), Rejection> {
        self.try_controller()?.connect().await
    }

    pub async fn refresh(&self) -> Result<(), Rejection> {
        self.try_controller()?.refresh().await
    }

    pub async fn submit(&self, draft: &str) -> Result<(), Rejection> {
        self.try_controller()?.submit(draft).await
    }

    pub fn set_draft(&self, text: impl Into<String>) -> Result<(), Rejection> {
        self.try_controller()?.set_draft(text);
        Ok(())
    }

    pub async fn dispatch(&self, event: ProviderEvent) {
        self.controller.lock().await.handle_event(event).await;
    }

    /// Forward wallet notifications into the controller until the provider
    /// goes away. `None` when the provider emits no notifications.
    pub async fn spawn_event_listener(&self) -> Option<JoinHandle<()>> {
        let mut events = self.controller.lock().await.gateway().subscribe()?;
        let handle = self.clone();

        Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        debug!("Wallet event {:?}", event);
                        handle.dispatch(event).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Dropped {} wallet events", skipped);
                    }
                    Err(RecvError::Closed) => {
                        info!("Wallet event stream closed");
                        break;
                    }
                }
            }
        }))
    }
}
