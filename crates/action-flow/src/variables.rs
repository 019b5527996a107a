//! Variable sources and resolution

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::VariableError;
use crate::types::{VariableSource, Workflow};

/// Caller-supplied values that override declared sources
pub type VariableBindings = HashMap<String, String>;

/// Interactive value providers
#[async_trait]
pub trait VariableProvider: Send + Sync {
    /// Ask the user for a value
    async fn prompt_user(&self, name: &str) -> Result<String, VariableError>;

    /// Current clipboard text, if any
    async fn clipboard_suggestion(&self) -> Option<String>;
}

/// Provider answering from fixed values
///
/// Each prompt pops the next queued answer for that name; the last answer is
/// reused once the queue runs dry.
#[derive(Debug, Default)]
pub struct StaticVariables {
    answers: Mutex<HashMap<String, VecDeque<String>>>,
    clipboard: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl StaticVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_answer(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.answers
            .lock()
            .entry(name.into())
            .or_default()
            .push_back(value.into());
        self
    }

    pub fn with_clipboard(mut self, value: impl Into<String>) -> Self {
        self.clipboard = Some(value.into());
        self
    }

    /// Names prompted for, in order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl VariableProvider for StaticVariables {
    async fn prompt_user(&self, name: &str) -> Result<String, VariableError> {
        self.prompts.lock().push(name.to_string());
        let mut answers = self.answers.lock();
        let queue = answers
            .get_mut(name)
            .ok_or_else(|| VariableError::unresolved(name, "no answer available"))?;
        let value = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        value.ok_or_else(|| VariableError::unresolved(name, "no answer available"))
    }

    async fn clipboard_suggestion(&self) -> Option<String> {
        self.clipboard.clone()
    }
}

/// Values fixed at workflow start plus the names resolved per use
#[derive(Debug, Clone, Default)]
pub struct ResolvedVariables {
    values: BTreeMap<String, String>,
    per_use: Vec<String>,
}

impl ResolvedVariables {
    /// Resolve everything that is not prompted per step
    ///
    /// Bindings win over declared sources. Clipboard sources fall back to a
    /// prompt when the clipboard is empty.
    pub async fn resolve(
        workflow: &Workflow,
        bindings: &VariableBindings,
        provider: &dyn VariableProvider,
        cancel: &CancellationToken,
    ) -> Result<Self, VariableError> {
        let mut resolved = Self::default();

        for (name, source) in &workflow.variables {
            if let Some(value) = bindings.get(name) {
                resolved.values.insert(name.clone(), value.clone());
                continue;
            }
            let value = match source {
                VariableSource::Literal { value } => value.clone(),
                VariableSource::Clipboard => match clipboard_or_cancel(provider, cancel).await? {
                    Some(value) if !value.is_empty() => value,
                    _ => {
                        debug!(variable = %name, "clipboard empty, prompting");
                        prompt_or_cancel(provider, name, cancel).await?
                    }
                },
                VariableSource::Prompt {
                    per_step_confirm: true,
                } => {
                    resolved.per_use.push(name.clone());
                    continue;
                }
                VariableSource::Prompt {
                    per_step_confirm: false,
                } => prompt_or_cancel(provider, name, cancel).await?,
            };
            resolved.values.insert(name.clone(), value);
        }

        Ok(resolved)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Whether `name` is prompted at every use
    pub fn is_per_use(&self, name: &str) -> bool {
        self.per_use.iter().any(|n| n == name)
    }

    /// Values for `names`, prompting for per-use variables now
    pub async fn values_for(
        &self,
        names: &[String],
        provider: &dyn VariableProvider,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, String>, VariableError> {
        let mut values = HashMap::new();
        for name in names {
            if values.contains_key(name) {
                continue;
            }
            let value = match self.get(name) {
                Some(value) => value.to_string(),
                None if self.is_per_use(name) => prompt_or_cancel(provider, name, cancel).await?,
                None => return Err(VariableError::unresolved(name, "variable not declared")),
            };
            values.insert(name.clone(), value);
        }
        Ok(values)
    }
}

/// Prompt for `name`, giving up as soon as the run is cancelled
async fn prompt_or_cancel(
    provider: &dyn VariableProvider,
    name: &str,
    cancel: &CancellationToken,
) -> Result<String, VariableError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!(variable = %name, "prompt cancelled");
            Err(VariableError::Cancelled)
        }
        answer = provider.prompt_user(name) => answer,
    }
}

async fn clipboard_or_cancel(
    provider: &dyn VariableProvider,
    cancel: &CancellationToken,
) -> Result<Option<String>, VariableError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(VariableError::Cancelled),
        text = provider.clipboard_suggestion() => Ok(text),
    }
}
