pub mod catalog;
pub mod config;
pub mod error;
pub mod event;
pub mod executor;
pub mod export;
pub mod io;
pub mod paths;
pub mod stream;
pub mod types;

pub use catalog::Catalog;
pub use error::{OpsError, Result};
pub use event::{EventRecord, ExecutionEvent};
pub use stream::{run_action, ActionStream};
pub use types::{Action, CommandSpec, CommandStatus};
