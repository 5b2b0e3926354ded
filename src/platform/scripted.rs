//! Scripted platform - the native owner of a scripted handler
//!
//! Turns the raw dictionaries returned by the interface into typed process
//! records the rest of the debugger consumes.

use std::sync::Arc;

use super::interface::ScriptedPlatformInterface;
use crate::core::{
    Dictionary, ExecutionContext, Pid, PlatformError, ProcessAttachInfo, ProcessInstanceInfo,
    ProcessLaunchInfo, Status,
};
use crate::script::ScriptBridge;

/// Platform whose behavior is supplied by a scripted object
pub struct ScriptedPlatform {
    interface: ScriptedPlatformInterface,
    class_name: String,
}

impl ScriptedPlatform {
    /// Bind a new scripted object of `class_name`
    pub fn create(
        bridge: Arc<dyn ScriptBridge>,
        class_name: &str,
        exe_ctx: &ExecutionContext,
        args: Option<&Dictionary>,
    ) -> Result<Self, PlatformError> {
        Self::with_interface(ScriptedPlatformInterface::new(bridge), class_name, exe_ctx, args)
    }

    /// Bind through a preconfigured interface (custom lock or session)
    pub fn with_interface(
        mut interface: ScriptedPlatformInterface,
        class_name: &str,
        exe_ctx: &ExecutionContext,
        args: Option<&Dictionary>,
    ) -> Result<Self, PlatformError> {
        interface.create_plugin_object(class_name, exe_ctx, args, None)?;
        Ok(Self {
            interface,
            class_name: class_name.to_string(),
        })
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn interface(&self) -> &ScriptedPlatformInterface {
        &self.interface
    }

    /// Processes known to the platform, optionally filtered by a name
    /// substring, sorted by pid
    pub fn find_processes(&self, name_filter: Option<&str>) -> Result<Vec<ProcessInstanceInfo>, PlatformError> {
        let dict = self.interface.list_processes()?;

        let mut processes = Vec::with_capacity(dict.len());
        for (key, value) in dict.iter() {
            let entry = value
                .as_dictionary()
                .ok_or_else(|| PlatformError::MalformedProcessInfo {
                    key: key.to_string(),
                    reason: format!("expected dictionary, found {}", value.kind()),
                })?;
            let info = ProcessInstanceInfo::from_dictionary(Some(key), entry).map_err(|e| {
                PlatformError::MalformedProcessInfo {
                    key: key.to_string(),
                    reason: e.to_string(),
                }
            })?;

            if name_filter.map_or(true, |filter| info.name.contains(filter)) {
                processes.push(info);
            }
        }

        processes.sort_by_key(|p| p.pid);
        Ok(processes)
    }

    pub fn get_process_info(&self, pid: Pid) -> Result<ProcessInstanceInfo, PlatformError> {
        let dict = self.interface.get_process_info(pid)?;
        let key = pid.to_string();
        ProcessInstanceInfo::from_dictionary(Some(&key), &dict).map_err(|e| {
            PlatformError::MalformedProcessInfo {
                key,
                reason: e.to_string(),
            }
        })
    }

    pub fn attach(&self, attach_info: &ProcessAttachInfo) -> Status {
        self.interface.attach_to_process(attach_info)
    }

    pub fn launch(&self, launch_info: &ProcessLaunchInfo) -> Status {
        self.interface.launch_process(launch_info)
    }

    pub fn kill(&self, pid: Pid) -> Status {
        self.interface.kill_process(pid)
    }
}
