//! Execution context snapshots handed to scripted object constructors.

use std::sync::Arc;

use super::process::Pid;
use super::structured::Dictionary;

/// Snapshot of the debugger's current selection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionContext {
    pub target_id: Option<u64>,
    pub process_id: Option<Pid>,
    pub thread_id: Option<u64>,
    pub frame_index: Option<u32>,
}

/// Shared snapshot; handlers may keep it past the creating call
pub type ExecutionContextRef = Arc<ExecutionContext>;

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target(mut self, target_id: u64) -> Self {
        self.target_id = Some(target_id);
        self
    }

    pub fn with_process(mut self, pid: Pid) -> Self {
        self.process_id = Some(pid);
        self
    }

    pub fn with_thread(mut self, thread_id: u64) -> Self {
        self.thread_id = Some(thread_id);
        self
    }

    pub fn with_frame(mut self, frame_index: u32) -> Self {
        self.frame_index = Some(frame_index);
        self
    }

    /// Dictionary form for script runtimes; unset entries are omitted
    pub fn to_dictionary(&self) -> Dictionary {
        let mut dict = Dictionary::new();
        if let Some(target) = self.target_id {
            dict.insert("target", target);
        }
        if let Some(pid) = self.process_id {
            dict.insert("process", pid);
        }
        if let Some(tid) = self.thread_id {
            dict.insert("thread", tid);
        }
        if let Some(frame) = self.frame_index {
            dict.insert("frame", frame);
        }
        dict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_dictionary_skips_unset() {
        let ctx = ExecutionContext::new().with_target(1).with_process(4242);
        let dict = ctx.to_dictionary();

        assert_eq!(dict.get_integer("target"), Some(1));
        assert_eq!(dict.get_integer("process"), Some(4242));
        assert!(!dict.contains_key("thread"));
        assert!(!dict.contains_key("frame"));
    }
}
