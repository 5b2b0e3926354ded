//! Fixture platform - a handler backed by an in-memory process table
//!
//! Useful for exercising the dispatch path without a script runtime. The
//! table is loaded from a JSON file (`path` argument) or passed inline
//! (`processes` argument) and has the shape `{"<pid>": {"name": ...}}`.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Deserialize;

use super::{HandlerError, HandlerResult, PlatformHandler, ScriptError};
use crate::core::{Dictionary, Pid, StructuredValue};

/// Lowest pid handed out to launched processes
const FIRST_LAUNCH_PID: Pid = 1000;

/// On-disk layouts accepted for a process table
#[derive(Deserialize)]
#[serde(untagged)]
enum FixtureFile {
    Wrapped {
        processes: serde_json::Map<String, serde_json::Value>,
    },
    Table(serde_json::Map<String, serde_json::Value>),
}

/// Process table platform
pub struct FixturePlatform {
    processes: Mutex<Dictionary>,
}

impl FixturePlatform {
    pub const CLASS_NAME: &'static str = "FixturePlatform";

    pub fn new(processes: Dictionary) -> Self {
        Self {
            processes: Mutex::new(processes),
        }
    }

    /// Build from construction arguments (`path` or `processes`)
    pub fn from_args(args: &Dictionary) -> Result<Self, ScriptError> {
        if let Some(path) = args.get_str("path") {
            return Self::from_file(path);
        }

        match args.get("processes") {
            Some(StructuredValue::Dictionary(table)) => Ok(Self::new(table.clone())),
            Some(other) => Err(ScriptError::InvalidArguments(format!(
                "'processes' must be a dictionary, found {}",
                other.kind()
            ))),
            None => Ok(Self::new(Dictionary::new())),
        }
    }

    /// Load a JSON process table
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ScriptError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|_| ScriptError::ScriptNotFound(path.display().to_string()))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ScriptError> {
        let file: FixtureFile = serde_json::from_str(text)
            .map_err(|e| ScriptError::InvalidArguments(format!("bad process table: {}", e)))?;

        let table = match file {
            FixtureFile::Wrapped { processes } | FixtureFile::Table(processes) => processes,
        };
        log::debug!("Fixture platform loaded {} processes", table.len());

        Ok(Self::new(table.into_iter().collect()))
    }

    fn table(&self) -> MutexGuard<'_, Dictionary> {
        self.processes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_pid(table: &Dictionary) -> Result<Pid, HandlerError> {
        let next = match table.keys().filter_map(|key| key.parse::<Pid>().ok()).max() {
            Some(max) => max
                .checked_add(1)
                .ok_or_else(|| HandlerError::Raised("no free pid".into()))?,
            None => FIRST_LAUNCH_PID,
        };
        Ok(next.max(FIRST_LAUNCH_PID))
    }
}

impl PlatformHandler for FixturePlatform {
    fn list_processes(&self) -> HandlerResult {
        Ok(StructuredValue::Dictionary(self.table().clone()))
    }

    fn get_process_info(&self, pid: Pid) -> HandlerResult {
        self.table()
            .get(&pid.to_string())
            .cloned()
            .ok_or_else(|| HandlerError::Raised(format!("no process with pid {}", pid)))
    }

    fn attach_to_process(&self, attach_info: &Dictionary) -> HandlerResult {
        let table = self.table();

        if let Some(pid) = attach_info.get_unsigned("pid") {
            return if table.contains_key(&pid.to_string()) {
                Ok(StructuredValue::Null)
            } else {
                Err(HandlerError::Raised(format!("no process with pid {}", pid)))
            };
        }

        let name = attach_info
            .get_str("name")
            .ok_or_else(|| HandlerError::Raised("attach requires a pid or a name".into()))?;

        let found = table
            .iter()
            .any(|(_, entry)| entry.as_dictionary().and_then(|d| d.get_str("name")) == Some(name));
        if found {
            Ok(StructuredValue::Null)
        } else {
            Err(HandlerError::Raised(format!("no process named '{}'", name)))
        }
    }

    fn launch_process(&self, launch_info: &Dictionary) -> HandlerResult {
        let executable = launch_info
            .get_str("executable")
            .filter(|e| !e.is_empty())
            .ok_or_else(|| HandlerError::Raised("launch requires an executable".into()))?;

        let name = Path::new(executable)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| executable.to_string());

        let mut table = self.table();
        let pid = Self::next_pid(&table)?;

        let mut entry = Dictionary::new()
            .with("pid", pid)
            .with("name", name);
        if let Some(args) = launch_info.get("args") {
            entry.insert("args", args.clone());
        }
        table.insert(pid.to_string(), entry);

        log::info!("Fixture platform launched {} as pid {}", executable, pid);
        Ok(Dictionary::new()
            .with("success", true)
            .with("pid", pid)
            .into())
    }

    fn kill_process(&self, pid: Pid) -> HandlerResult {
        match self.table().remove(&pid.to_string()) {
            Some(_) => Ok(StructuredValue::Null),
            None => Err(HandlerError::Raised(format!("no process with pid {}", pid))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn platform() -> FixturePlatform {
        FixturePlatform::from_json(
            r#"{"processes": {"1234": {"name": "a.out"}, "42": {"name": "init", "uid": 0}}}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_accepts_bare_table() {
        let platform = FixturePlatform::from_json(r#"{"7": {"name": "x"}}"#).unwrap();
        let list = platform.list_processes().unwrap();
        assert_eq!(list.as_dictionary().unwrap().len(), 1);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(FixturePlatform::from_json("[1, 2]").is_err());
        assert!(FixturePlatform::from_file("/definitely/not/here.json").is_err());
    }

    #[test]
    fn test_from_args() {
        let inline = Dictionary::new().with(
            "processes",
            Dictionary::new().with("5", Dictionary::new().with("name", "sh")),
        );
        let platform = FixturePlatform::from_args(&inline).unwrap();
        assert!(platform.get_process_info(5).is_ok());

        let bad = Dictionary::new().with("processes", 3i64);
        assert!(FixturePlatform::from_args(&bad).is_err());

        let empty = FixturePlatform::from_args(&Dictionary::new()).unwrap();
        assert_eq!(
            empty.list_processes().unwrap(),
            StructuredValue::Dictionary(Dictionary::new())
        );
    }

    #[test]
    fn test_process_info() {
        let platform = platform();
        let info = platform.get_process_info(1234).unwrap();
        assert_eq!(info.as_dictionary().unwrap().get_str("name"), Some("a.out"));

        let err = platform.get_process_info(9).unwrap_err();
        assert_eq!(err, HandlerError::Raised("no process with pid 9".into()));
    }

    #[test]
    fn test_attach() {
        let platform = platform();
        assert!(platform
            .attach_to_process(&Dictionary::new().with("pid", 42i64))
            .is_ok());
        assert!(platform
            .attach_to_process(&Dictionary::new().with("name", "a.out"))
            .is_ok());
        assert!(platform
            .attach_to_process(&Dictionary::new().with("name", "ghost"))
            .is_err());
        assert!(platform.attach_to_process(&Dictionary::new()).is_err());
    }

    #[test]
    fn test_launch_then_kill() {
        let platform = platform();
        let launch = Dictionary::new().with("executable", "/usr/bin/top");

        let result = platform.launch_process(&launch).unwrap();
        assert_eq!(result.as_dictionary().unwrap().get_integer("pid"), Some(1235));

        let info = platform.get_process_info(1235).unwrap();
        assert_eq!(info.as_dictionary().unwrap().get_str("name"), Some("top"));

        assert!(platform.kill_process(1235).is_ok());
        assert!(platform.kill_process(1235).is_err());
        assert!(platform.launch_process(&Dictionary::new()).is_err());
    }

    #[test]
    fn test_launch_with_exhausted_pids() {
        let platform =
            FixturePlatform::from_json(r#"{"18446744073709551615": {"name": "big"}}"#).unwrap();
        let launch = Dictionary::new().with("executable", "/bin/true");

        assert_eq!(
            platform.launch_process(&launch),
            Err(HandlerError::Raised("no free pid".into()))
        );
        assert_eq!(platform.list_processes().unwrap().as_dictionary().unwrap().len(), 1);
    }

    #[test]
    fn test_large_pids_are_preserved() {
        let big = i64::MAX as u64 + 1;
        let platform = FixturePlatform::from_json(&format!(r#"{{"{}": {{"name": "big"}}}}"#, big)).unwrap();

        assert!(platform.attach_to_process(&Dictionary::new().with("pid", big)).is_ok());

        let result = platform
            .launch_process(&Dictionary::new().with("executable", "a.out"))
            .unwrap();
        assert_eq!(result.as_dictionary().unwrap().get_unsigned("pid"), Some(big + 1));
        assert!(platform.kill_process(big + 1).is_ok());
    }

    #[test]
    fn test_first_launch_pid() {
        let platform = FixturePlatform::new(Dictionary::new());
        let result = platform
            .launch_process(&Dictionary::new().with("executable", "a.out"))
            .unwrap();
        assert_eq!(result.as_dictionary().unwrap().get_integer("pid"), Some(1000));
    }
}
