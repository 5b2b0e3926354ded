//! Script module - Handler objects and the bridges that create them
//!
//! A scripted platform is any object implementing `PlatformHandler`. Bridges
//! (`ScriptBridge`) turn a class name plus construction arguments into such
//! an object: the native `HandlerRegistry` maps names to Rust factories, and
//! the Python bridge (feature "python") instantiates classes defined in
//! loaded scripts.

#[cfg(feature = "python")]
pub mod bridge;
pub mod fixture;
pub mod registry;

#[cfg(feature = "python")]
pub use bridge::PythonBridge;
pub use fixture::FixturePlatform;
pub use registry::HandlerRegistry;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::core::{Dictionary, ExecutionContextRef, GenericObject, Pid, StructuredValue};

/// Errors raised while creating scripted objects
#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Python error: {0}")]
    PythonError(String),

    #[error("Script not found: {0}")]
    ScriptNotFound(String),

    #[error("Failed to initialize Python: {0}")]
    InitError(String),

    #[error("Unknown scripted class: {0}")]
    UnknownClass(String),

    #[error("Invalid construction arguments: {0}")]
    InvalidArguments(String),
}

/// Failures reported by a handler method
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HandlerError {
    /// The handler does not provide the method
    #[error("method '{0}' is not implemented")]
    MissingMethod(&'static str),

    /// The handler signalled failure (a script exception)
    #[error("{0}")]
    Raised(String),
}

pub type HandlerResult = Result<StructuredValue, HandlerError>;

/// Capability interface implemented by scripted platforms.
///
/// Every method defaults to reporting itself as missing, so an
/// implementation only provides what it supports.
pub trait PlatformHandler: Send + Sync {
    /// Dictionary keyed by pid, one process description per entry
    fn list_processes(&self) -> HandlerResult {
        Err(HandlerError::MissingMethod("list_processes"))
    }

    /// Dictionary describing `pid`
    fn get_process_info(&self, pid: Pid) -> HandlerResult {
        let _ = pid;
        Err(HandlerError::MissingMethod("get_process_info"))
    }

    fn attach_to_process(&self, attach_info: &Dictionary) -> HandlerResult {
        let _ = attach_info;
        Err(HandlerError::MissingMethod("attach_to_process"))
    }

    fn launch_process(&self, launch_info: &Dictionary) -> HandlerResult {
        let _ = launch_info;
        Err(HandlerError::MissingMethod("launch_process"))
    }

    fn kill_process(&self, pid: Pid) -> HandlerResult {
        let _ = pid;
        Err(HandlerError::MissingMethod("kill_process"))
    }
}

/// Reference-counted handle to a scripted object
#[derive(Clone)]
pub struct HandlerHandle {
    handler: Arc<dyn PlatformHandler>,
    class_name: Arc<str>,
}

impl HandlerHandle {
    pub fn new(class_name: &str, handler: Arc<dyn PlatformHandler>) -> Self {
        Self {
            handler,
            class_name: Arc::from(class_name),
        }
    }

    pub fn handler(&self) -> &dyn PlatformHandler {
        self.handler.as_ref()
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Wrap as an opaque structured value
    pub fn to_generic(&self) -> GenericObject {
        GenericObject::new(self.clone())
    }

    /// Recover a handle previously wrapped with `to_generic`
    pub fn from_generic(object: &GenericObject) -> Option<HandlerHandle> {
        object.downcast_ref::<HandlerHandle>().cloned()
    }

    pub fn ptr_eq(&self, other: &HandlerHandle) -> bool {
        Arc::ptr_eq(&self.handler, &other.handler)
    }
}

impl fmt::Debug for HandlerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerHandle")
            .field("class_name", &self.class_name)
            .finish_non_exhaustive()
    }
}

/// Creates scripted objects by class name
pub trait ScriptBridge: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &str;

    /// Instantiate `class_name` with the execution context and arguments.
    ///
    /// `session_dictionary` names the namespace the class is resolved in
    /// when the name is not qualified.
    fn create_scripted_object(
        &self,
        class_name: &str,
        session_dictionary: &str,
        exe_ctx: ExecutionContextRef,
        args: &Dictionary,
    ) -> Result<HandlerHandle, ScriptError>;
}

/// Stub PythonBridge for when Python feature is disabled
#[cfg(not(feature = "python"))]
pub struct PythonBridge;

#[cfg(not(feature = "python"))]
impl PythonBridge {
    pub fn new() -> Self {
        Self
    }
    pub fn initialize(&mut self) -> Result<(), ScriptError> {
        Err(ScriptError::InitError(
            "Python support not compiled. Enable 'python' feature.".into(),
        ))
    }
    pub fn load_script(&self, _path: &str) -> Result<String, ScriptError> {
        Err(ScriptError::InitError("Python support not compiled".into()))
    }
}

#[cfg(not(feature = "python"))]
impl Default for PythonBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(not(feature = "python"))]
impl ScriptBridge for PythonBridge {
    fn name(&self) -> &str {
        "python"
    }

    fn create_scripted_object(
        &self,
        class_name: &str,
        _session_dictionary: &str,
        _exe_ctx: ExecutionContextRef,
        _args: &Dictionary,
    ) -> Result<HandlerHandle, ScriptError> {
        Err(ScriptError::InitError(format!(
            "cannot create '{}': Python support not compiled",
            class_name
        )))
    }
}
