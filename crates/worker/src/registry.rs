//! Capability registry: workflow name → processing function.
//!
//! Populated once at process start and never mutated afterwards. Adding a
//! workflow means adding one registry entry; there is no fallback branch
//! for unknown names, only a non-retryable failure that lists what the
//! worker does support.

use std::collections::HashMap;
use std::sync::Arc;

use contentpipe_core::error::ExecutionFailure;
use contentpipe_core::processing::ProcessingFunction;

/// Fixed mapping from workflow name to capability.
#[derive(Default)]
pub struct CapabilityRegistry {
    entries: HashMap<String, Arc<dyn ProcessingFunction>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability under a workflow name. Later registrations
    /// replace earlier ones with the same name.
    pub fn register(&mut self, name: impl Into<String>, capability: Arc<dyn ProcessingFunction>) {
        self.entries.insert(name.into(), capability);
    }

    /// Sorted list of supported workflow names, for diagnostics.
    pub fn supported_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    /// Route a workflow name to its capability.
    ///
    /// Unknown names fail with `UnsupportedWorkflow`, always terminal,
    /// since retrying cannot make the name known.
    pub fn dispatch(&self, name: &str) -> Result<Arc<dyn ProcessingFunction>, ExecutionFailure> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| ExecutionFailure::unsupported(name, &self.supported_names()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
