//! Task execution - the seam to an external LLM runtime
//!
//! Specialists never talk to a model directly. They hand a [`TaskRequest`]
//! to a [`TaskExecutor`]; the deterministic executor is used whenever no
//! runtime is wired in.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::analysis::Dataset;
use crate::catalog::SpecialistKind;
use crate::error::Result;

/// Work handed to the executor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    pub kind: SpecialistKind,
    pub agent: String,
    pub task: String,
    pub client: String,
    /// Table attached by the client, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Dataset>,
}

impl TaskRequest {
    /// Instructions for a model-backed executor
    pub fn prompt(&self) -> String {
        let entry = self.kind.entry();
        format!(
            "You are {} ({}), a specialist in {}.\n\
             CLIENT: {}\n\
             TASK: {}\n\
             YOUR RATE: {}\n\
             DATASET: {}\n\
             Complete the task and return the finished work.",
            entry.display_name,
            self.agent,
            entry.categories.join(", "),
            self.client,
            self.task,
            entry.pricing.label(),
            self.data
                .as_ref()
                .map_or_else(|| "none".to_string(), |d| d.column_names().join(", ")),
        )
    }
}

/// What the executor produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutput {
    pub text: String,
}

/// Runs specialist work
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Executor name for logs
    fn name(&self) -> &'static str;

    async fn execute(&self, request: &TaskRequest) -> Result<TaskOutput>;
}

/// Reproducible stand-in for a model runtime
#[derive(Debug, Clone, Copy, Default)]
pub struct DeterministicExecutor;

impl DeterministicExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TaskExecutor for DeterministicExecutor {
    fn name(&self) -> &'static str {
        "deterministic"
    }

    async fn execute(&self, request: &TaskRequest) -> Result<TaskOutput> {
        let entry = request.kind.entry();
        let mut text = format!(
            "{} completed the task \"{}\" for {}.",
            entry.display_name, request.task, request.client
        );
        if let (SpecialistKind::DataAnalyst, Some(data)) = (request.kind, &request.data) {
            text.push(' ');
            text.push_str(&data.digest());
        }
        Ok(TaskOutput { text })
    }
}
