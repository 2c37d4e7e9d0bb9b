//! Wire DTOs for the dashboard API and the data-shape checks applied to
//! them before a request leaves the client.
//!
//! # Design
//! These types mirror the backend's schema but are defined independently of
//! the mock-server crate; integration tests catch schema drift. Validation
//! limits follow the backend so a bad form never costs a round-trip.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ApiError;

pub const NAME_MAX_CHARS: usize = 100;
pub const DESCRIPTION_MAX_CHARS: usize = 500;

// ---------------------------------------------------------------------------
// Data entries
// ---------------------------------------------------------------------------

/// Lifecycle state of a data entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataEntryStatus {
    #[default]
    Active,
    Inactive,
    Archived,
}

impl DataEntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataEntryStatus::Active => "active",
            DataEntryStatus::Inactive => "inactive",
            DataEntryStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for DataEntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataEntryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(DataEntryStatus::Active),
            "inactive" => Ok(DataEntryStatus::Inactive),
            "archived" => Ok(DataEntryStatus::Archived),
            other => Err(format!(
                "unknown status '{other}' (expected active, inactive or archived)"
            )),
        }
    }
}

/// A persisted data entry. The identifier and both timestamps are assigned
/// by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataEntry {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub value: f64,
    #[serde(default)]
    pub status: DataEntryStatus,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

/// Request payload for creating a data entry. An omitted `status` lets the
/// server apply its default (`active`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataEntryCreate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DataEntryStatus>,
}

impl DataEntryCreate {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            description: None,
            value,
            status: None,
        }
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        validate_name(&self.name)?;
        if let Some(description) = &self.description {
            validate_description(description)?;
        }
        validate_value(self.value)
    }
}

/// Request payload for updating a data entry. Only the fields present in
/// the JSON are applied; omitted fields remain unchanged on the server.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DataEntryUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DataEntryStatus>,
}

impl DataEntryUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.value.is_none()
            && self.status.is_none()
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(description) = &self.description {
            validate_description(description)?;
        }
        if let Some(value) = self.value {
            validate_value(value)?;
        }
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<(), ApiError> {
    let len = name.chars().count();
    if len == 0 {
        return Err(ApiError::Validation("name must not be empty".to_string()));
    }
    if len > NAME_MAX_CHARS {
        return Err(ApiError::Validation(format!(
            "name is {len} characters, at most {NAME_MAX_CHARS} allowed"
        )));
    }
    Ok(())
}

fn validate_description(description: &str) -> Result<(), ApiError> {
    let len = description.chars().count();
    if len > DESCRIPTION_MAX_CHARS {
        return Err(ApiError::Validation(format!(
            "description is {len} characters, at most {DESCRIPTION_MAX_CHARS} allowed"
        )));
    }
    Ok(())
}

fn validate_value(value: f64) -> Result<(), ApiError> {
    if !value.is_finite() {
        return Err(ApiError::Validation(format!("value must be a finite number, got {value}")));
    }
    Ok(())
}

/// Identifiers are opaque, but they end up as a single path segment.
pub fn validate_id(id: &str) -> Result<(), ApiError> {
    if id.is_empty() {
        return Err(ApiError::Validation("identifier must not be empty".to_string()));
    }
    if id.contains(['/', '?', '#']) {
        return Err(ApiError::Validation(format!("identifier '{id}' is not a single path segment")));
    }
    Ok(())
}

/// Offset pagination for the entry listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pagination {
    pub skip: u32,
    pub limit: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { skip: 0, limit: 100 }
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Status vocabulary of a background task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Started,
    Progress,
    Success,
    Failure,
    Retry,
}

impl TaskStatus {
    /// `Success` and `Failure` never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failure)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Started => "started",
            TaskStatus::Progress => "progress",
            TaskStatus::Success => "success",
            TaskStatus::Failure => "failure",
            TaskStatus::Retry => "retry",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task types the backend knows how to run. The wire field stays a free
/// string so newer backends can add types without a client release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    ProcessData,
    GenerateReport,
    SimulateLoad,
}

impl TaskKind {
    pub const ALL: [TaskKind; 3] = [
        TaskKind::ProcessData,
        TaskKind::GenerateReport,
        TaskKind::SimulateLoad,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::ProcessData => "process_data",
            TaskKind::GenerateReport => "generate_report",
            TaskKind::SimulateLoad => "simulate_load",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown task type '{s}'"))
    }
}

/// Request payload for submitting a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskCreate {
    pub task_type: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl TaskCreate {
    pub fn new(task_type: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            params: Map::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        if self.task_type.trim().is_empty() {
            return Err(ApiError::Validation("task_type must not be empty".to_string()));
        }
        Ok(())
    }
}

impl From<TaskKind> for TaskCreate {
    fn from(kind: TaskKind) -> Self {
        TaskCreate::new(kind.as_str())
    }
}

/// Server-side snapshot of a task. `result` is only present on success and
/// `error` only on failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskResponse {
    pub task_id: String,
    pub status: TaskStatus,
    pub task_type: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskResponse {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// ---------------------------------------------------------------------------
// Health and metrics
// ---------------------------------------------------------------------------

/// Point-in-time health of the backend: an aggregate `status` plus one
/// status string per monitored dependency.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthCheck {
    pub status: String,
    #[serde(flatten)]
    pub dependencies: BTreeMap<String, String>,
}

impl HealthCheck {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }

    pub fn dependency(&self, name: &str) -> Option<&str> {
        self.dependencies.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Metrics {
    pub total_tasks: u64,
    pub active_tasks: u64,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    pub total_data_entries: u64,
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Parse either an RFC 3339 timestamp or a naive ISO-8601 one (no offset),
/// which is taken to be UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    use chrono::{NaiveDateTime, TimeZone};

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|e| format!("invalid timestamp '{raw}': {e}"))
}

mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_timestamp(&raw).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn data_entry_reads_underscore_id_and_naive_timestamps() {
        let json = r#"{
            "_id": "65a1f0c2e4b0a1b2c3d4e5f6",
            "name": "Sensor A",
            "description": null,
            "value": 42.5,
            "status": "inactive",
            "created_at": "2024-01-12T10:30:00.123456",
            "updated_at": "2024-01-12T10:31:00"
        }"#;
        let entry: DataEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.id, "65a1f0c2e4b0a1b2c3d4e5f6");
        assert_eq!(entry.status, DataEntryStatus::Inactive);
        assert!(entry.description.is_none());
        assert_eq!(entry.created_at.year(), 2024);
        assert_eq!(entry.created_at.nanosecond(), 123_456_000);
        assert_eq!(entry.updated_at.minute(), 31);
    }

    #[test]
    fn data_entry_serializes_rfc3339_and_underscore_id() {
        let entry = DataEntry {
            id: "abc".to_string(),
            name: "n".to_string(),
            description: None,
            value: 1.0,
            status: DataEntryStatus::Active,
            created_at: parse_timestamp("2024-01-01T00:00:00Z").unwrap(),
            updated_at: parse_timestamp("2024-01-01T00:00:00Z").unwrap(),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["_id"], "abc");
        assert_eq!(json["created_at"], "2024-01-01T00:00:00Z");
        assert!(json.get("description").is_none());
    }

    #[test]
    fn data_entry_rejects_unknown_status() {
        let json = r#"{"_id":"x","name":"n","value":1,"status":"deleted",
            "created_at":"2024-01-01T00:00:00Z","updated_at":"2024-01-01T00:00:00Z"}"#;
        assert!(serde_json::from_str::<DataEntry>(json).is_err());
    }

    #[test]
    fn timestamp_with_offset_is_normalized_to_utc() {
        let ts = parse_timestamp("2024-03-01T12:00:00+02:00").unwrap();
        assert_eq!(ts.hour(), 10);
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn create_omits_absent_optional_fields() {
        let input = DataEntryCreate::new("Widget", 3.0);
        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json, serde_json::json!({"name": "Widget", "value": 3.0}));
    }

    #[test]
    fn create_validation_mirrors_backend_limits() {
        assert!(DataEntryCreate::new("ok", 1.0).validate().is_ok());
        assert!(matches!(
            DataEntryCreate::new("", 1.0).validate(),
            Err(ApiError::Validation(_))
        ));
        assert!(DataEntryCreate::new("x".repeat(NAME_MAX_CHARS), 1.0).validate().is_ok());
        assert!(DataEntryCreate::new("x".repeat(NAME_MAX_CHARS + 1), 1.0).validate().is_err());
        assert!(DataEntryCreate::new("ok", f64::NAN).validate().is_err());

        let mut long = DataEntryCreate::new("ok", 1.0);
        long.description = Some("d".repeat(DESCRIPTION_MAX_CHARS + 1));
        assert!(long.validate().is_err());
    }

    #[test]
    fn update_serializes_only_present_fields() {
        let update = DataEntryUpdate {
            value: Some(7.0),
            ..Default::default()
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json, serde_json::json!({"value": 7.0}));
        assert!(!update.is_empty());
        assert!(DataEntryUpdate::default().is_empty());
    }

    #[test]
    fn update_validation_checks_only_present_fields() {
        assert!(DataEntryUpdate::default().validate().is_ok());
        let update = DataEntryUpdate {
            name: Some(String::new()),
            ..Default::default()
        };
        assert!(update.validate().is_err());
    }

    #[test]
    fn ids_must_be_single_path_segments() {
        assert!(validate_id("65a1f0c2e4b0a1b2c3d4e5f6").is_ok());
        assert!(validate_id("").is_err());
        assert!(validate_id("a/b").is_err());
        assert!(validate_id("a?b").is_err());
    }

    #[test]
    fn task_status_terminal_set() {
        let terminal: Vec<_> = [
            TaskStatus::Pending,
            TaskStatus::Started,
            TaskStatus::Progress,
            TaskStatus::Success,
            TaskStatus::Failure,
            TaskStatus::Retry,
        ]
        .into_iter()
        .filter(|s| s.is_terminal())
        .collect();
        assert_eq!(terminal, vec![TaskStatus::Success, TaskStatus::Failure]);
    }

    #[test]
    fn task_create_defaults_params_to_empty_object() {
        let task: TaskCreate = serde_json::from_str(r#"{"task_type":"simulate_load"}"#).unwrap();
        assert!(task.params.is_empty());
        let json = serde_json::to_value(TaskCreate::from(TaskKind::GenerateReport)).unwrap();
        assert_eq!(json, serde_json::json!({"task_type": "generate_report", "params": {}}));
    }

    #[test]
    fn task_kind_parses_wire_names() {
        assert_eq!("simulate_load".parse::<TaskKind>(), Ok(TaskKind::SimulateLoad));
        assert!("reticulate".parse::<TaskKind>().is_err());
    }

    #[test]
    fn task_response_carries_result_only_when_present() {
        let json = r#"{"task_id":"t1","status":"success","task_type":"process_data",
            "created_at":"2024-01-01T00:00:00","result":{"items_processed":120},"error":null}"#;
        let task: TaskResponse = serde_json::from_str(json).unwrap();
        assert!(task.is_terminal());
        assert_eq!(task.result.unwrap()["items_processed"], 120);
        assert!(task.error.is_none());
    }

    #[test]
    fn health_check_flattens_dependencies() {
        let json = r#"{"status":"unhealthy","mongodb":"connected","redis":"error: refused","celery":"no workers"}"#;
        let health: HealthCheck = serde_json::from_str(json).unwrap();
        assert!(!health.is_healthy());
        assert_eq!(health.dependencies.len(), 3);
        assert_eq!(health.dependency("redis"), Some("error: refused"));
    }
}
