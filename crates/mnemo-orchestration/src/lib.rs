//! # Mnemo Orchestration
//!
//! The in-process engine room of the mnemo server:
//!
//! - **events**: typed pub/sub bus with per-type FIFO delivery, error
//!   isolation, and metric accounting
//! - **orchestrator**: lifecycle owner that subscribes to conversation
//!   events, keeps bounded per-project history, and republishes governance
//!   guidance
//! - **watchdog**: periodic stale-task recovery loop over the store
//! - **governance**: activity classification, rule retrieval with cached
//!   token loads, and token effectiveness accumulation

pub mod events;
pub mod governance;
pub mod history;
pub mod orchestrator;
pub mod watchdog;

pub use events::{Event, EventBus, EventHandler, HandlerError, SharedHandler};
pub use events::{CONVERSATION_MESSAGE, GOVERNANCE_GUIDANCE};
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use watchdog::Watchdog;
