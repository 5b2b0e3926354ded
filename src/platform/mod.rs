//! Platform module - scripted platform dispatch and its native owner

pub mod interface;
pub mod scripted;

pub use interface::{ScriptedPlatformInterface, DEFAULT_SESSION_DICTIONARY};
pub use scripted::ScriptedPlatform;
