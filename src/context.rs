//! Per-turn context threaded through skill preparation and tool execution.

use std::collections::HashMap;

use uuid::Uuid;

/// Identifiers and data for one conversation turn.
///
/// Built once by the caller and passed by reference; nothing in this crate
/// keeps turn state in globals.
#[derive(Debug, Clone)]
pub struct TurnContext {
    /// Correlation id for logs and metrics.
    pub request_id: Uuid,
    /// Task (conversation) id.
    pub task_id: i64,
    /// Subtask (message) id.
    pub subtask_id: i64,
    /// Id of the user driving the turn.
    pub user_id: i64,
    /// Display name of the user.
    pub user_name: String,
    /// Extra task data made available to `${var}` substitution in MCP configs.
    pub task_data: HashMap<String, serde_json::Value>,
}

impl TurnContext {
    pub fn new(task_id: i64, subtask_id: i64, user_id: i64) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            task_id,
            subtask_id,
            user_id,
            user_name: String::new(),
            task_data: HashMap::new(),
        }
    }

    pub fn with_user_name(mut self, user_name: impl Into<String>) -> Self {
        self.user_name = user_name.into();
        self
    }

    pub fn with_task_data(mut self, task_data: HashMap<String, serde_json::Value>) -> Self {
        self.task_data = task_data;
        self
    }

    /// Variables available for substitution in MCP server configs.
    ///
    /// Built-in identifiers win over task data keys of the same name.
    pub fn template_vars(&self) -> HashMap<String, String> {
        let mut vars: HashMap<String, String> = self
            .task_data
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), value)
            })
            .collect();

        vars.insert("task_id".to_string(), self.task_id.to_string());
        vars.insert("subtask_id".to_string(), self.subtask_id.to_string());
        vars.insert("user_id".to_string(), self.user_id.to_string());
        vars.insert("user_name".to_string(), self.user_name.clone());
        vars
    }
}
