//! Process records exchanged with scripted platforms
//!
//! Attach and launch configurations are flattened to dictionaries before
//! they reach a handler; process descriptions come back as dictionaries and
//! are parsed into `ProcessInstanceInfo`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::structured::{Dictionary, StructuredValue};

/// Process identifier as seen by the debugger
pub type Pid = u64;

/// Errors while reading a process description
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProcessInfoError {
    #[error("missing '{0}' entry")]
    MissingField(&'static str),

    #[error("entry '{field}' has the wrong type (expected {expected})")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("invalid pid '{0}'")]
    InvalidPid(String),
}

/// A process known to the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInstanceInfo {
    pub pid: Pid,
    pub name: String,
    pub arch: Option<String>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub parent_pid: Option<Pid>,
    pub args: Vec<String>,
}

impl ProcessInstanceInfo {
    pub fn new(pid: Pid, name: impl Into<String>) -> Self {
        Self {
            pid,
            name: name.into(),
            arch: None,
            uid: None,
            gid: None,
            parent_pid: None,
            args: Vec::new(),
        }
    }

    /// Parse a handler-provided description.
    ///
    /// `key` is the dictionary key the entry was stored under; it supplies
    /// the pid when the entry has no `pid` of its own.
    pub fn from_dictionary(key: Option<&str>, dict: &Dictionary) -> Result<Self, ProcessInfoError> {
        let pid = match dict.get("pid") {
            Some(StructuredValue::Integer(pid)) => {
                Pid::try_from(*pid).map_err(|_| ProcessInfoError::InvalidPid(pid.to_string()))?
            }
            Some(StructuredValue::Unsigned(pid)) => *pid,
            Some(_) => {
                return Err(ProcessInfoError::WrongType {
                    field: "pid",
                    expected: "integer",
                })
            }
            None => {
                let key = key.ok_or(ProcessInfoError::MissingField("pid"))?;
                key.trim()
                    .parse()
                    .map_err(|_| ProcessInfoError::InvalidPid(key.to_string()))?
            }
        };

        let name = match dict.get("name") {
            Some(StructuredValue::String(name)) => name.clone(),
            Some(_) => {
                return Err(ProcessInfoError::WrongType {
                    field: "name",
                    expected: "string",
                })
            }
            None => return Err(ProcessInfoError::MissingField("name")),
        };

        let args = match dict.get_array("args") {
            Some(items) => items
                .iter()
                .map(|arg| {
                    arg.as_str().map(str::to_string).ok_or(ProcessInfoError::WrongType {
                        field: "args",
                        expected: "array of strings",
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        Ok(Self {
            pid,
            name,
            arch: dict.get_str("arch").map(str::to_string),
            uid: dict.get_integer("uid").and_then(|v| u32::try_from(v).ok()),
            gid: dict.get_integer("gid").and_then(|v| u32::try_from(v).ok()),
            parent_pid: dict.get_unsigned("parent_pid"),
            args,
        })
    }

    pub fn to_dictionary(&self) -> Dictionary {
        let mut dict = Dictionary::new()
            .with("pid", self.pid)
            .with("name", self.name.as_str());
        if let Some(arch) = &self.arch {
            dict.insert("arch", arch.as_str());
        }
        if let Some(uid) = self.uid {
            dict.insert("uid", uid);
        }
        if let Some(gid) = self.gid {
            dict.insert("gid", gid);
        }
        if let Some(parent) = self.parent_pid {
            dict.insert("parent_pid", parent);
        }
        if !self.args.is_empty() {
            dict.insert(
                "args",
                self.args
                    .iter()
                    .map(|a| StructuredValue::from(a.as_str()))
                    .collect::<Vec<_>>(),
            );
        }
        dict
    }
}

/// How to attach to a process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessAttachInfo {
    pub pid: Option<Pid>,
    pub name: Option<String>,
    /// Wait for a process with `name` to appear
    pub wait_for_launch: bool,
    pub continue_once_attached: bool,
}

impl ProcessAttachInfo {
    pub fn by_pid(pid: Pid) -> Self {
        Self {
            pid: Some(pid),
            ..Default::default()
        }
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn to_dictionary(&self) -> Dictionary {
        let mut dict = Dictionary::new()
            .with("wait_for_launch", self.wait_for_launch)
            .with("continue_once_attached", self.continue_once_attached);
        if let Some(pid) = self.pid {
            dict.insert("pid", pid);
        }
        if let Some(name) = &self.name {
            dict.insert("name", name.as_str());
        }
        dict
    }
}

/// How to launch a process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessLaunchInfo {
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub working_dir: Option<PathBuf>,
    pub stop_at_entry: bool,
}

impl ProcessLaunchInfo {
    pub fn new(executable: impl AsRef<Path>) -> Self {
        Self {
            executable: executable.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn to_dictionary(&self) -> Dictionary {
        let mut dict = Dictionary::new()
            .with("executable", self.executable.display().to_string())
            .with(
                "args",
                self.args
                    .iter()
                    .map(|a| StructuredValue::from(a.as_str()))
                    .collect::<Vec<_>>(),
            )
            .with(
                "env",
                self.env
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.as_str()))
                    .collect::<Dictionary>(),
            )
            .with("stop_at_entry", self.stop_at_entry);
        if let Some(dir) = &self.working_dir {
            dict.insert("working_dir", dir.display().to_string());
        }
        dict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uses_key_as_pid() {
        let entry = Dictionary::new().with("name", "a.out").with("arch", "x86_64");
        let info = ProcessInstanceInfo::from_dictionary(Some("1234"), &entry).unwrap();

        assert_eq!(info.pid, 1234);
        assert_eq!(info.name, "a.out");
        assert_eq!(info.arch.as_deref(), Some("x86_64"));
        assert!(info.args.is_empty());
    }

    #[test]
    fn test_parse_prefers_pid_entry() {
        let entry = Dictionary::new().with("name", "a.out").with("pid", 99i64);
        let info = ProcessInstanceInfo::from_dictionary(Some("1234"), &entry).unwrap();
        assert_eq!(info.pid, 99);
    }

    #[test]
    fn test_parse_errors() {
        let no_name = Dictionary::new();
        assert_eq!(
            ProcessInstanceInfo::from_dictionary(Some("1"), &no_name),
            Err(ProcessInfoError::MissingField("name"))
        );

        let named = Dictionary::new().with("name", "a.out");
        assert_eq!(
            ProcessInstanceInfo::from_dictionary(Some("abc"), &named),
            Err(ProcessInfoError::InvalidPid("abc".into()))
        );
        assert_eq!(
            ProcessInstanceInfo::from_dictionary(None, &named),
            Err(ProcessInfoError::MissingField("pid"))
        );

        let negative = named.clone().with("pid", -5i64);
        assert_eq!(
            ProcessInstanceInfo::from_dictionary(None, &negative),
            Err(ProcessInfoError::InvalidPid("-5".into()))
        );
    }

    #[test]
    fn test_instance_round_trip() {
        let mut info = ProcessInstanceInfo::new(7, "server");
        info.uid = Some(1000);
        info.args = vec!["--port".into(), "80".into()];

        let parsed = ProcessInstanceInfo::from_dictionary(None, &info.to_dictionary()).unwrap();
        assert_eq!(parsed, info);
    }

    #[test]
    fn test_pids_above_signed_range() {
        let pid = i64::MAX as u64 + 10;
        let mut info = ProcessInstanceInfo::new(pid, "x");
        info.parent_pid = Some(u64::MAX);

        let parsed = ProcessInstanceInfo::from_dictionary(None, &info.to_dictionary()).unwrap();
        assert_eq!(parsed, info);

        let attach = ProcessAttachInfo::by_pid(pid).to_dictionary();
        assert_eq!(attach.get_unsigned("pid"), Some(pid));
        assert_eq!(attach.get_integer("pid"), None);

        let keyed = Dictionary::new().with("name", "max");
        let parsed = ProcessInstanceInfo::from_dictionary(Some(u64::MAX.to_string().as_str()), &keyed).unwrap();
        assert_eq!(parsed.pid, u64::MAX);
    }

    #[test]
    fn test_launch_info_dictionary() {
        let launch = ProcessLaunchInfo::new("/bin/ls").with_args(["-l", "/tmp"]);
        let dict = launch.to_dictionary();

        assert_eq!(dict.get_str("executable"), Some("/bin/ls"));
        assert_eq!(dict.get_array("args").map(|a| a.len()), Some(2));
        assert_eq!(dict.get_bool("stop_at_entry"), Some(false));
        assert!(!dict.contains_key("working_dir"));
    }

    #[test]
    fn test_attach_info_dictionary() {
        let dict = ProcessAttachInfo::by_name("a.out").to_dictionary();
        assert_eq!(dict.get_str("name"), Some("a.out"));
        assert!(!dict.contains_key("pid"));
    }
}
