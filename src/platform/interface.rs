//! Scripted platform interface - dispatch into a bound handler object
//!
//! The interface owns at most one handler handle. Every operation goes
//! through `dispatch`, which enters the interpreter lock, calls the handler,
//! and converts the returned value into the requested type. Failures never
//! escape as panics; they come back as `PlatformError` or a failed `Status`.

use std::sync::Arc;

use crate::core::{
    Dictionary, ExecutionContext, FromStructured, GenericObject, InterpreterLock, Pid, PlatformError,
    ProcessAttachInfo, ProcessLaunchInfo, Status,
};
use crate::script::{HandlerError, HandlerHandle, HandlerResult, PlatformHandler, ScriptBridge};

/// Namespace unqualified class names are resolved in
pub const DEFAULT_SESSION_DICTIONARY: &str = "__main__";

const INTERFACE_NAME: &str = "ScriptedPlatformInterface";

/// Dispatcher between native platform code and a scripted handler
pub struct ScriptedPlatformInterface {
    bridge: Arc<dyn ScriptBridge>,
    lock: Arc<InterpreterLock>,
    session_dictionary: String,
    object_instance: Option<HandlerHandle>,
}

impl ScriptedPlatformInterface {
    /// Create an interface using the process-wide interpreter lock
    pub fn new(bridge: Arc<dyn ScriptBridge>) -> Self {
        Self::with_lock(bridge, InterpreterLock::global())
    }

    pub fn with_lock(bridge: Arc<dyn ScriptBridge>, lock: Arc<InterpreterLock>) -> Self {
        Self {
            bridge,
            lock,
            session_dictionary: DEFAULT_SESSION_DICTIONARY.to_string(),
            object_instance: None,
        }
    }

    pub fn set_session_dictionary(&mut self, name: impl Into<String>) {
        self.session_dictionary = name.into();
    }

    /// The currently bound handler, if any
    pub fn object_instance(&self) -> Option<&HandlerHandle> {
        self.object_instance.as_ref()
    }

    /// Instantiate (or adopt) the handler object.
    ///
    /// An empty `class_name` fails before the lock is taken or the bridge is
    /// consulted. With `script_obj` the wrapped handler is adopted instead of
    /// constructing a new one; it must hold a `HandlerHandle`. The handle is
    /// stored only on success.
    pub fn create_plugin_object(
        &mut self,
        class_name: &str,
        exe_ctx: &ExecutionContext,
        args: Option<&Dictionary>,
        script_obj: Option<&GenericObject>,
    ) -> Result<HandlerHandle, PlatformError> {
        if class_name.is_empty() {
            return Err(PlatformError::EmptyClassName);
        }

        let handle = {
            let _guard = self.lock.acquire("create_plugin_object");

            match script_obj {
                Some(object) => {
                    let existing = HandlerHandle::from_generic(object).ok_or_else(|| {
                        PlatformError::Construction {
                            class_name: class_name.to_string(),
                            reason: format!("{} is not a scripted platform object", object.type_name()),
                        }
                    })?;
                    log::debug!(
                        "Adopting existing scripted object ({}) as {}",
                        existing.class_name(),
                        class_name
                    );
                    existing
                }
                None => {
                    let exe_ctx_ref = Arc::new(exe_ctx.clone());
                    let empty = Dictionary::new();
                    self.bridge
                        .create_scripted_object(
                            class_name,
                            &self.session_dictionary,
                            exe_ctx_ref,
                            args.unwrap_or(&empty),
                        )
                        .map_err(|e| PlatformError::Construction {
                            class_name: class_name.to_string(),
                            reason: e.to_string(),
                        })?
                }
            }
        };

        if self.object_instance.is_some() {
            log::debug!("Replacing bound scripted object with {}", class_name);
        }
        log::info!(
            "Created scripted platform object {} via {} bridge",
            class_name,
            self.bridge.name()
        );

        self.object_instance = Some(handle.clone());
        Ok(handle)
    }

    /// Call a handler method and convert its result.
    ///
    /// `method` names the operation for diagnostics; `call` performs it on
    /// the bound handler while the interpreter lock is held.
    pub fn dispatch<T, F>(&self, method: &'static str, call: F) -> Result<T, PlatformError>
    where
        T: FromStructured,
        F: FnOnce(&dyn PlatformHandler) -> HandlerResult,
    {
        let _guard = self.lock.acquire(method);

        let instance = self
            .object_instance
            .as_ref()
            .ok_or(PlatformError::NoHandler { method })?;

        log::debug!("Dispatching {} to {}", method, instance.class_name());

        let value = call(instance.handler()).map_err(|e| match e {
            HandlerError::MissingMethod(_) => PlatformError::MissingMethod { method },
            HandlerError::Raised(message) => PlatformError::Raised { method, message },
        })?;

        T::from_structured(value).map_err(|source| PlatformError::Conversion { method, source })
    }

    /// Wrap a failure with the caller identity, log it, and return it
    fn error_with_message(caller: String, err: PlatformError) -> PlatformError {
        let err = PlatformError::InvalidObject {
            caller,
            message: err.to_string(),
        };
        log::error!("{}", err);
        err
    }

    fn dispatch_dictionary<F>(
        &self,
        method: &'static str,
        caller: impl FnOnce() -> String,
        call: F,
    ) -> Result<Dictionary, PlatformError>
    where
        F: FnOnce(&dyn PlatformHandler) -> HandlerResult,
    {
        self.dispatch::<Dictionary, _>(method, call)
            .map_err(|err| Self::error_with_message(caller(), err))
    }

    fn dispatch_status<F>(&self, method: &'static str, call: F) -> Status
    where
        F: FnOnce(&dyn PlatformHandler) -> HandlerResult,
    {
        match self.dispatch::<Status, _>(method, call) {
            Ok(status) => status,
            Err(err) => {
                log::warn!("{}::{} failed: {}", INTERFACE_NAME, method, err);
                err.into()
            }
        }
    }

    /// All processes the platform knows about, keyed by pid
    pub fn list_processes(&self) -> Result<Dictionary, PlatformError> {
        self.dispatch_dictionary(
            "list_processes",
            || format!("{}::list_processes", INTERFACE_NAME),
            |handler| handler.list_processes(),
        )
    }

    /// Description of one process
    pub fn get_process_info(&self, pid: Pid) -> Result<Dictionary, PlatformError> {
        self.dispatch_dictionary(
            "get_process_info",
            || format!("{}::get_process_info(pid={})", INTERFACE_NAME, pid),
            |handler| handler.get_process_info(pid),
        )
    }

    /// Ask the handler to attach.
    ///
    /// The attach configuration is forwarded as a dictionary (`pid`, `name`,
    /// `wait_for_launch`, `continue_once_attached`). Handlers written against
    /// the argument-less form must accept one positional argument.
    pub fn attach_to_process(&self, attach_info: &ProcessAttachInfo) -> Status {
        let info = attach_info.to_dictionary();
        self.dispatch_status("attach_to_process", |handler| handler.attach_to_process(&info))
    }

    /// Ask the handler to launch.
    ///
    /// The launch configuration is forwarded as a dictionary (`executable`,
    /// `args`, `env`, `working_dir`, `stop_at_entry`). Handlers written
    /// against the argument-less form must accept one positional argument.
    pub fn launch_process(&self, launch_info: &ProcessLaunchInfo) -> Status {
        let info = launch_info.to_dictionary();
        self.dispatch_status("launch_process", |handler| handler.launch_process(&info))
    }

    pub fn kill_process(&self, pid: Pid) -> Status {
        self.dispatch_status("kill_process", |handler| handler.kill_process(pid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ConversionError, StructuredValue};
    use crate::script::{FixturePlatform, HandlerRegistry, ScriptError};

    struct Broken;

    impl PlatformHandler for Broken {
        fn list_processes(&self) -> HandlerResult {
            Ok(StructuredValue::Null)
        }

        fn get_process_info(&self, _pid: Pid) -> HandlerResult {
            Ok(StructuredValue::Integer(1))
        }

        fn kill_process(&self, _pid: Pid) -> HandlerResult {
            Ok(StructuredValue::String("killed".into()))
        }
    }

    fn registry() -> Arc<HandlerRegistry> {
        let mut registry = HandlerRegistry::with_builtins();
        registry.register("Broken", |_ctx, _args| {
            Ok(Arc::new(Broken) as Arc<dyn PlatformHandler>)
        });
        registry.register("Failing", |_ctx, _args| {
            Err(ScriptError::PythonError("TypeError: __init__() missing argument".into()))
        });
        Arc::new(registry)
    }

    fn interface() -> ScriptedPlatformInterface {
        ScriptedPlatformInterface::with_lock(registry(), Arc::new(InterpreterLock::new()))
    }

    #[test]
    fn test_dispatch_without_handler() {
        let interface = interface();
        assert_eq!(
            interface.dispatch::<Dictionary, _>("list_processes", |h| h.list_processes()),
            Err(PlatformError::NoHandler {
                method: "list_processes"
            })
        );
        assert!(interface.kill_process(1).is_failure());
    }

    #[test]
    fn test_construction_failure_keeps_state() {
        let mut interface = interface();
        let ctx = ExecutionContext::new();

        interface
            .create_plugin_object("FixturePlatform", &ctx, None, None)
            .unwrap();
        let bound = interface.object_instance().cloned().unwrap();

        let err = interface
            .create_plugin_object("Failing", &ctx, None, None)
            .unwrap_err();
        assert!(matches!(err, PlatformError::Construction { ref class_name, .. } if class_name == "Failing"));
        assert!(err.to_string().contains("missing argument"));

        assert!(interface.object_instance().unwrap().ptr_eq(&bound));
    }

    #[test]
    fn test_adopts_existing_object() {
        let mut interface = interface();
        let existing = HandlerHandle::new("Adopted", Arc::new(FixturePlatform::new(Dictionary::new())));

        let handle = interface
            .create_plugin_object("Adopted", &ExecutionContext::new(), None, Some(&existing.to_generic()))
            .unwrap();
        assert!(handle.ptr_eq(&existing));
        assert!(interface.list_processes().unwrap().is_empty());
    }

    #[test]
    fn test_rejects_foreign_script_object() {
        let mut interface = interface();
        let foreign = GenericObject::new(String::from("not a handler"));

        let err = interface
            .create_plugin_object("Adopted", &ExecutionContext::new(), None, Some(&foreign))
            .unwrap_err();
        assert!(matches!(err, PlatformError::Construction { ref reason, .. } if reason.contains("String")));
        assert!(interface.object_instance().is_none());
    }

    #[test]
    fn test_null_dictionary_is_wrapped() {
        let mut interface = interface();
        interface
            .create_plugin_object("Broken", &ExecutionContext::new(), None, None)
            .unwrap();

        let err = interface.list_processes().unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("ScriptedPlatformInterface::list_processes ERROR = Null or invalid object"));

        let err = interface.get_process_info(31).unwrap_err();
        match err {
            PlatformError::InvalidObject { caller, message } => {
                assert!(caller.contains("pid=31"));
                assert!(message.contains("expected dictionary, found integer"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_missing_method_and_bad_status() {
        let mut interface = interface();
        interface
            .create_plugin_object("Broken", &ExecutionContext::new(), None, None)
            .unwrap();

        let status = interface.launch_process(&ProcessLaunchInfo::new("/bin/true"));
        assert!(status.message().unwrap().contains("does not implement 'launch_process'"));

        assert_eq!(
            interface.dispatch::<Status, _>("kill_process", |h| h.kill_process(1)),
            Err(PlatformError::Conversion {
                method: "kill_process",
                source: ConversionError::TypeMismatch {
                    expected: "status",
                    found: "string"
                }
            })
        );
    }

    #[test]
    fn test_fixture_operations() {
        let mut interface = interface();
        let args = Dictionary::new().with(
            "processes",
            Dictionary::new().with("10", Dictionary::new().with("name", "daemon")),
        );
        interface
            .create_plugin_object("FixturePlatform", &ExecutionContext::new(), Some(&args), None)
            .unwrap();

        assert_eq!(interface.list_processes().unwrap().len(), 1);
        assert!(interface.attach_to_process(&ProcessAttachInfo::by_pid(10)).is_success());
        assert!(interface.attach_to_process(&ProcessAttachInfo::by_pid(11)).is_failure());
        assert!(interface
            .launch_process(&ProcessLaunchInfo::new("/opt/app"))
            .is_success());
        assert_eq!(interface.list_processes().unwrap().len(), 2);
        assert!(interface.kill_process(10).is_success());
        assert!(interface.get_process_info(10).is_err());
    }
}
