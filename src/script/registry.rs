//! Native handler registry
//!
//! Maps class names to Rust factories so platforms written in Rust (or
//! test doubles) can be bound exactly like scripted ones.

use std::collections::HashMap;
use std::sync::Arc;

use super::{FixturePlatform, HandlerHandle, PlatformHandler, ScriptBridge, ScriptError};
use crate::core::{Dictionary, ExecutionContextRef};

/// Factory producing a handler from the execution context and arguments
pub type HandlerFactory = Box<
    dyn Fn(ExecutionContextRef, &Dictionary) -> Result<Arc<dyn PlatformHandler>, ScriptError>
        + Send
        + Sync,
>;

/// Bridge resolving class names against registered factories
pub struct HandlerRegistry {
    factories: HashMap<String, HandlerFactory>,
}

impl HandlerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with the built-in platforms (`FixturePlatform`)
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(FixturePlatform::CLASS_NAME, |_ctx, args| {
            Ok(Arc::new(FixturePlatform::from_args(args)?) as Arc<dyn PlatformHandler>)
        });
        registry
    }

    /// Register (or replace) the factory for `class_name`
    pub fn register<F>(&mut self, class_name: impl Into<String>, factory: F)
    where
        F: Fn(ExecutionContextRef, &Dictionary) -> Result<Arc<dyn PlatformHandler>, ScriptError>
            + Send
            + Sync
            + 'static,
    {
        let class_name = class_name.into();
        if self.factories.insert(class_name.clone(), Box::new(factory)).is_some() {
            log::debug!("Replaced handler factory for {}", class_name);
        }
    }

    pub fn contains(&self, class_name: &str) -> bool {
        self.factories.contains_key(class_name)
    }

    /// Registered class names, sorted
    pub fn class_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptBridge for HandlerRegistry {
    fn name(&self) -> &str {
        "native"
    }

    fn create_scripted_object(
        &self,
        class_name: &str,
        _session_dictionary: &str,
        exe_ctx: ExecutionContextRef,
        args: &Dictionary,
    ) -> Result<HandlerHandle, ScriptError> {
        let factory = self
            .factories
            .get(class_name)
            .ok_or_else(|| ScriptError::UnknownClass(class_name.to_string()))?;

        let handler = factory(exe_ctx, args)?;
        Ok(HandlerHandle::new(class_name, handler))
    }
}
