//! Migration tasks: one idempotent unit of remote-creation work each.

use serde::{Deserialize, Serialize};

use catbridge_catalog::LocalProduct;
use catbridge_core::RemoteId;

/// Deterministic task identifier derived from the kind and natural key.
///
/// Rebuilding a plan from the same inputs yields the same ids, so tasks map 1:1
/// onto the remote entities they create. Key parts are escaped (`\\` and `\:`)
/// so names containing `:` cannot collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn attribute(name: &str) -> Self {
        Self(format!("attribute:{}", escape_key(name)))
    }

    pub fn value(attribute: &str, value: &str) -> Self {
        Self(format!("value:{}:{}", escape_key(attribute), escape_key(value)))
    }

    pub fn template(name: &str) -> Self {
        Self(format!("template:{}", escape_key(name)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn escape_key(part: &str) -> String {
    let mut out = String::with_capacity(part.len());
    for ch in part.chars() {
        if ch == '\\' || ch == ':' {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

impl core::fmt::Display for TaskId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Attribute,
    Value,
    Template,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Attribute => "attribute",
            TaskKind::Value => "value",
            TaskKind::Template => "template",
        }
    }
}

/// What a task creates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TaskPayload {
    Attribute { name: String },
    Value { attribute: String, value: String },
    /// A template and every local variant that belongs to it.
    Template { name: String, variants: Vec<LocalProduct> },
}

impl TaskPayload {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskPayload::Attribute { .. } => TaskKind::Attribute,
            TaskPayload::Value { .. } => TaskKind::Value,
            TaskPayload::Template { .. } => TaskKind::Template,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Success,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationTask {
    pub id: TaskId,
    /// Human-readable label for logs and the UI.
    pub name: String,
    pub data: TaskPayload,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Task-level retries used so far.
    #[serde(default)]
    pub retries: u32,
    /// Id of the entity this task created, once it succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<RemoteId>,
}

impl MigrationTask {
    pub fn attribute(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::pending(TaskId::attribute(&name), name.clone(), TaskPayload::Attribute { name })
    }

    pub fn value(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        let attribute = attribute.into();
        let value = value.into();
        Self::pending(
            TaskId::value(&attribute, &value),
            format!("{attribute}: {value}"),
            TaskPayload::Value { attribute, value },
        )
    }

    pub fn template(name: impl Into<String>, variants: Vec<LocalProduct>) -> Self {
        let name = name.into();
        Self::pending(
            TaskId::template(&name),
            name.clone(),
            TaskPayload::Template { name, variants },
        )
    }

    fn pending(id: TaskId, name: String, data: TaskPayload) -> Self {
        Self {
            id,
            name,
            data,
            status: TaskStatus::Pending,
            error: None,
            retries: 0,
            remote_id: None,
        }
    }

    pub fn kind(&self) -> TaskKind {
        self.data.kind()
    }

    /// Success and skipped tasks are never executed again.
    pub fn is_settled(&self) -> bool {
        matches!(self.status, TaskStatus::Success | TaskStatus::Skipped)
    }

    pub fn mark_success(&mut self, remote_id: Option<RemoteId>) {
        self.status = TaskStatus::Success;
        self.error = None;
        self.remote_id = remote_id;
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = TaskStatus::Failed;
        self.error = Some(error.into());
    }

    /// Put a failed task back in the queue with a fresh retry budget.
    pub fn reset_for_resume(&mut self) {
        if self.status == TaskStatus::Failed {
            self.status = TaskStatus::Pending;
            self.retries = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_derived_from_natural_keys() {
        assert_eq!(MigrationTask::attribute("Width").id.as_str(), "attribute:Width");
        assert_eq!(MigrationTask::value("Width", "1.10m").id.as_str(), "value:Width:1.10m");
        assert_eq!(MigrationTask::template("Banner Roll", vec![]).id.as_str(), "template:Banner Roll");
    }

    #[test]
    fn colons_in_names_do_not_collide() {
        let left = TaskId::value("A:B", "C");
        let right = TaskId::value("A", "B:C");
        assert_ne!(left, right);
        assert_eq!(left.as_str(), r"value:A\:B:C");
        assert_eq!(right.as_str(), r"value:A:B\:C");

        assert_ne!(TaskId::value(r"A\", "B"), TaskId::value("A", r"\B"));
        assert_eq!(TaskId::attribute("Size:EU").as_str(), r"attribute:Size\:EU");
    }

    #[test]
    fn payload_serializes_with_type_tag() {
        let task = MigrationTask::value("Width", "1.10m");
        let json = serde_json::to_value(&task).unwrap();

        assert_eq!(json["data"]["type"], "value");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["retries"], 0);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn resume_only_resets_failed_tasks() {
        let mut failed = MigrationTask::attribute("Width");
        failed.retries = 3;
        failed.mark_failed("boom");
        failed.reset_for_resume();
        assert_eq!(failed.status, TaskStatus::Pending);
        assert_eq!(failed.retries, 0);

        let mut done = MigrationTask::attribute("Color");
        done.mark_success(Some(7));
        done.reset_for_resume();
        assert_eq!(done.status, TaskStatus::Success);
        assert_eq!(done.remote_id, Some(7));
    }
}
