use crate::stream::{StreamMode, WorkerStream};
use async_trait::async_trait;
use dworkers_core::{DworkersResult, WorkerRole};
use serde::{Deserialize, Serialize};

/// Inputs handed to a worker alongside its task: pipeline inputs plus
/// upstream step outputs keyed by step id.
pub type TaskContext = serde_json::Map<String, serde_json::Value>;

/// Result of one worker invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerOutput {
    /// Whether the task succeeded.
    pub success: bool,
    /// Text or structured output. `null` on failure.
    pub output: serde_json::Value,
    /// Failure detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkerOutput {
    /// Successful output.
    pub fn success(output: impl Into<serde_json::Value>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    /// Failed output with `error`.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: serde_json::Value::Null,
            error: Some(error.into()),
        }
    }

    /// The output as plain text: strings verbatim, anything else as JSON.
    pub fn text(&self) -> String {
        match &self.output {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

/// A digital worker.
///
/// Ordinary model failures are reported as `Ok(WorkerOutput { success: false, .. })`.
/// `Err` is reserved for misconfiguration and cancellation.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Unique worker name.
    fn name(&self) -> &str;

    /// Role the worker plays.
    fn role(&self) -> WorkerRole;

    /// Run `task` with `context`.
    async fn run(&self, task: &str, context: &TaskContext) -> DworkersResult<WorkerOutput>;

    /// Start a fresh generation and stream it. Dropping the returned stream
    /// stops the generation.
    async fn run_stream(
        &self,
        task: &str,
        context: &TaskContext,
        mode: StreamMode,
    ) -> DworkersResult<WorkerStream>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_output_text() {
        assert_eq!(WorkerOutput::success("plain").text(), "plain");
        assert_eq!(WorkerOutput::success(json!({"a": 1})).text(), r#"{"a":1}"#);
        assert_eq!(WorkerOutput::failure("boom").text(), "");
    }

    #[test]
    fn test_failure_serialization() {
        let json = serde_json::to_value(WorkerOutput::failure("boom")).unwrap_or_default();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "boom");
        assert!(json["output"].is_null());

        let ok = serde_json::to_value(WorkerOutput::success("x")).unwrap_or_default();
        assert!(ok.get("error").is_none());
    }
}
