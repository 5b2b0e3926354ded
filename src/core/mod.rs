//! Core module - Values, errors and locking shared by every layer
//!
//! This module contains the structured value model exchanged with scripted
//! handlers, the status/error types, process records and the interpreter lock.

pub mod context;
pub mod lock;
pub mod process;
pub mod status;
pub mod structured;

// Re-export common types
pub use context::{ExecutionContext, ExecutionContextRef};
pub use lock::{InterpreterGuard, InterpreterLock, LockObserver};
pub use process::{Pid, ProcessAttachInfo, ProcessInfoError, ProcessInstanceInfo, ProcessLaunchInfo};
pub use status::{PlatformError, Status};
pub use structured::{ConversionError, Dictionary, FromStructured, GenericObject, StructuredValue};
