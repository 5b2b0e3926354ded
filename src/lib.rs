//! Scripted Platform - debugger platforms implemented by scripted objects
//!
//! Native debugger code talks to a `platform::ScriptedPlatformInterface`,
//! which forwards each operation to a handler object created by a
//! `script::ScriptBridge` and converts the result back into typed values.

pub mod core;
pub mod platform;
pub mod script;
pub mod ui;
