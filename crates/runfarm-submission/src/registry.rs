//! Named run functions.
//!
//! A run is identified by a qualified function name (`module::function` or
//! `module.function`). The registry maps those names to callables so a farm can
//! invoke the function named in the resolved config.

use crate::config::{RunFuncKwargs, SubmitConfig};
use crate::error::{SubmitError, SubmitResult};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Body of a run. Receives the resolved config and the keyword arguments.
pub type RunFn = dyn Fn(&SubmitConfig, &RunFuncKwargs) -> anyhow::Result<()> + Send + Sync;

#[derive(Clone, Default)]
pub struct RunFunctionRegistry {
    functions: BTreeMap<String, Arc<RunFn>>,
}

impl fmt::Debug for RunFunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunFunctionRegistry").field("functions", &self.names()).finish()
    }
}

/// Qualified names have at least one `::` or `.` separator and no empty segments.
pub fn is_qualified_name(name: &str) -> bool {
    let segments: Vec<&str> = name.split("::").flat_map(|s| s.split('.')).collect();
    segments.len() >= 2
        && segments
            .iter()
            .all(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
}

impl RunFunctionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `func` under `name`, replacing any previous entry.
    pub fn register<F>(&mut self, name: &str, func: F) -> SubmitResult<()>
    where
        F: Fn(&SubmitConfig, &RunFuncKwargs) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        if !is_qualified_name(name) {
            return Err(SubmitError::InvalidConfig(format!(
                "run function name must be qualified (e.g. `module::function`): {name}"
            )));
        }
        if self.functions.insert(name.to_string(), Arc::new(func)).is_some() {
            tracing::warn!(name, "replaced previously registered run function");
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> SubmitResult<Arc<RunFn>> {
        self.functions.get(name).cloned().ok_or_else(|| SubmitError::UnknownRunFunction(name.to_string()))
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.functions.keys().map(String::as_str).collect()
    }
}
