//! UI module - Command Line Interface
//!
//! Provides the reedline-based REPL used to drive a scripted platform.

pub mod cli;
