//! Wallet session state machine.
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Syncing -> Ready -> Submitting -> Ready
//! ```
//!
//! `Disconnected` and `Ready` are the resting states. A failed read parks the
//! session in `Connected` until the user refreshes.

pub mod controller;
pub mod handle;
pub mod models;

pub use controller::SessionController;
pub use handle::SessionHandle;
pub use models::{InputDraft, Session, SessionPhase, SessionSnapshot, StoredValue, TxStatus};
