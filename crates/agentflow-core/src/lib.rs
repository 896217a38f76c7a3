pub mod config;
pub mod error;
pub mod event;
pub mod scope;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{BoxError, FlowError, Result};
pub use event::{EventBus, FlowEvent, FlowEventKind, RecoveryAction};
pub use scope::Scope;
pub use traits::{Agent, AgentResult, FnAgent};
pub use types::*;
