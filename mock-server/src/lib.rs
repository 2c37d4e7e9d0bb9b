use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};
use uuid::Uuid;

pub const TASK_TYPES: [&str; 3] = ["process_data", "generate_report", "simulate_load"];

// --- wire types ---

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    #[default]
    Active,
    Inactive,
    Archived,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataEntry {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub value: f64,
    pub status: EntryStatus,
    #[serde(with = "naive_utc")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "naive_utc")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct CreateEntry {
    pub name: String,
    pub description: Option<String>,
    pub value: f64,
    #[serde(default)]
    pub status: EntryStatus,
}

#[derive(Deserialize)]
pub struct UpdateEntry {
    pub name: Option<String>,
    pub description: Option<String>,
    pub value: Option<f64>,
    pub status: Option<EntryStatus>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Started,
    Progress,
    Success,
    Failure,
    Retry,
}

#[derive(Deserialize)]
pub struct CreateTask {
    pub task_type: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskView {
    pub task_id: String,
    pub status: TaskStatus,
    pub task_type: String,
    #[serde(with = "naive_utc")]
    pub created_at: DateTime<Utc>,
    pub result: Option<Value>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Metrics {
    pub total_tasks: usize,
    pub active_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub total_data_entries: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Detail {
    pub detail: String,
}

/// Timestamps go out without an offset, the way the reference backend
/// renders its naive UTC datetimes.
mod naive_utc {
    use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| Utc.from_utc_datetime(&naive))
            .map_err(de::Error::custom)
    }
}

// --- state ---

struct StoredEntry {
    seq: u64,
    entry: DataEntry,
}

struct StoredTask {
    view: TaskView,
    remaining: VecDeque<TaskStatus>,
    outcome: Result<Value, String>,
}

#[derive(Default)]
pub struct Store {
    entries: HashMap<String, StoredEntry>,
    tasks: HashMap<String, StoredTask>,
    next_seq: u64,
}

pub type Db = Arc<RwLock<Store>>;

type ApiError = (StatusCode, Json<Detail>);

fn error(status: StatusCode, detail: impl Into<String>) -> ApiError {
    (status, Json(Detail { detail: detail.into() }))
}

fn entry_not_found() -> ApiError {
    error(StatusCode::NOT_FOUND, "Data entry not found")
}

/// Entry ids are 24 hex digits, like a database object id.
fn check_entry_id(id: &str) -> Result<(), ApiError> {
    if id.len() == 24 && id.bytes().all(|b| b.is_ascii_hexdigit()) {
        Ok(())
    } else {
        Err(error(StatusCode::BAD_REQUEST, "Invalid ID format"))
    }
}

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Store::default()));
    let api = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/tasks", post(create_task))
        .route("/tasks/{id}", get(get_task))
        .route("/data", get(list_entries).post(create_entry))
        .route("/data/{id}", get(get_entry).put(update_entry).delete(delete_entry))
        .with_state(db);
    Router::new().nest("/api", api)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

// --- health & metrics ---

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "mongodb": "connected",
        "redis": "connected",
        "celery": "connected (1 workers)",
    }))
}

async fn metrics(State(db): State<Db>) -> Json<Metrics> {
    let store = db.read().await;
    let count = |pred: fn(TaskStatus) -> bool| {
        store.tasks.values().filter(|t| pred(t.view.status)).count()
    };
    Json(Metrics {
        total_tasks: store.tasks.len(),
        active_tasks: count(|s| matches!(s, TaskStatus::Started | TaskStatus::Progress | TaskStatus::Retry)),
        completed_tasks: count(|s| s == TaskStatus::Success),
        failed_tasks: count(|s| s == TaskStatus::Failure),
        total_data_entries: store.entries.len(),
    })
}

// --- tasks ---

/// Statuses a task walks through, one per status check, after `pending`.
fn script(task_type: &str, fail: bool) -> VecDeque<TaskStatus> {
    let progress_steps = match task_type {
        "generate_report" => 3,
        _ => 1,
    };
    let mut steps = VecDeque::from([TaskStatus::Started]);
    steps.extend(std::iter::repeat(TaskStatus::Progress).take(progress_steps));
    steps.push_back(if fail { TaskStatus::Failure } else { TaskStatus::Success });
    steps
}

fn task_result(task_type: &str, params: &Map<String, Value>, seq: u64, now: DateTime<Utc>) -> Value {
    let stamp = now.format(naive_utc::FORMAT).to_string();
    match task_type {
        "process_data" => json!({
            "data_id": params.get("data_id").cloned().unwrap_or(Value::Null),
            "processed_at": stamp,
            "items_processed": 100 + (seq * 137) % 900,
            "success": true,
        }),
        "generate_report" => json!({
            "report_type": params.get("report_type").and_then(Value::as_str).unwrap_or("summary"),
            "generated_at": stamp,
            "pages": 5 + seq % 45,
            "file_size_kb": 100 + (seq * 311) % 4900,
        }),
        _ => {
            let duration = params.get("duration").and_then(Value::as_u64).unwrap_or(10).max(1);
            let intensity = params.get("intensity").and_then(Value::as_str).unwrap_or("medium");
            let per_second = match intensity {
                "low" => 10,
                "high" => 100,
                _ => 50,
            };
            let total = duration * per_second;
            json!({
                "duration": duration,
                "intensity": intensity,
                "total_operations": total,
                "ops_per_second": total as f64 / duration as f64,
                "completed_at": stamp,
            })
        }
    }
}

async fn create_task(
    State(db): State<Db>,
    Json(input): Json<CreateTask>,
) -> Result<(StatusCode, Json<TaskView>), ApiError> {
    if !TASK_TYPES.contains(&input.task_type.as_str()) {
        return Err(error(
            StatusCode::BAD_REQUEST,
            format!("Unknown task type: {}", input.task_type),
        ));
    }

    let mut store = db.write().await;
    store.next_seq += 1;
    let seq = store.next_seq;
    let now = Utc::now();
    let fail = input.params.get("fail").and_then(Value::as_bool).unwrap_or(false);
    let outcome = if fail {
        Err(format!("{} failed: simulated failure", input.task_type))
    } else {
        Ok(task_result(&input.task_type, &input.params, seq, now))
    };

    let view = TaskView {
        task_id: Uuid::new_v4().to_string(),
        status: TaskStatus::Pending,
        task_type: input.task_type.clone(),
        created_at: now,
        result: None,
        error: None,
    };
    info!(task_id = %view.task_id, task_type = %view.task_type, "task queued");
    store.tasks.insert(
        view.task_id.clone(),
        StoredTask {
            view: view.clone(),
            remaining: script(&input.task_type, fail),
            outcome,
        },
    );
    Ok((StatusCode::CREATED, Json(view)))
}

async fn get_task(State(db): State<Db>, Path(id): Path<String>) -> Result<Json<TaskView>, ApiError> {
    let mut store = db.write().await;
    let task = store
        .tasks
        .get_mut(&id)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "Task not found"))?;

    if let Some(next) = task.remaining.pop_front() {
        task.view.status = next;
        match (next, &task.outcome) {
            (TaskStatus::Success, Ok(result)) => task.view.result = Some(result.clone()),
            (TaskStatus::Failure, Err(message)) => task.view.error = Some(message.clone()),
            _ => {}
        }
        debug!(task_id = %id, status = ?next, "task advanced");
    }
    Ok(Json(task.view.clone()))
}

// --- data entries ---

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub skip: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    100
}

fn validate_name(name: &str) -> Result<(), ApiError> {
    let len = name.chars().count();
    if len == 0 || len > 100 {
        return Err(error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "name must be between 1 and 100 characters",
        ));
    }
    Ok(())
}

fn validate_description(description: Option<&str>) -> Result<(), ApiError> {
    if description.is_some_and(|d| d.chars().count() > 500) {
        return Err(error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "description must be at most 500 characters",
        ));
    }
    Ok(())
}

async fn list_entries(State(db): State<Db>, Query(q): Query<ListQuery>) -> Json<Vec<DataEntry>> {
    let store = db.read().await;
    let mut stored: Vec<&StoredEntry> = store.entries.values().collect();
    stored.sort_by(|a, b| b.seq.cmp(&a.seq));
    Json(
        stored
            .into_iter()
            .skip(q.skip)
            .take(q.limit)
            .map(|s| s.entry.clone())
            .collect(),
    )
}

async fn create_entry(
    State(db): State<Db>,
    Json(input): Json<CreateEntry>,
) -> Result<(StatusCode, Json<DataEntry>), ApiError> {
    validate_name(&input.name)?;
    validate_description(input.description.as_deref())?;

    let now = Utc::now();
    let entry = DataEntry {
        id: Uuid::new_v4().simple().to_string()[..24].to_string(),
        name: input.name,
        description: input.description,
        value: input.value,
        status: input.status,
        created_at: now,
        updated_at: now,
    };
    let mut store = db.write().await;
    store.next_seq += 1;
    let seq = store.next_seq;
    store.entries.insert(entry.id.clone(), StoredEntry { seq, entry: entry.clone() });
    info!(id = %entry.id, "data entry created");
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn get_entry(State(db): State<Db>, Path(id): Path<String>) -> Result<Json<DataEntry>, ApiError> {
    check_entry_id(&id)?;
    let store = db.read().await;
    store
        .entries
        .get(&id)
        .map(|s| Json(s.entry.clone()))
        .ok_or_else(entry_not_found)
}

async fn update_entry(
    State(db): State<Db>,
    Path(id): Path<String>,
    Json(input): Json<UpdateEntry>,
) -> Result<Json<DataEntry>, ApiError> {
    check_entry_id(&id)?;
    if let Some(name) = &input.name {
        validate_name(name)?;
    }
    validate_description(input.description.as_deref())?;

    let mut store = db.write().await;
    let entry = &mut store.entries.get_mut(&id).ok_or_else(entry_not_found)?.entry;
    let mut touched = false;
    if let Some(name) = input.name {
        entry.name = name;
        touched = true;
    }
    if let Some(description) = input.description {
        entry.description = Some(description);
        touched = true;
    }
    if let Some(value) = input.value {
        entry.value = value;
        touched = true;
    }
    if let Some(status) = input.status {
        entry.status = status;
        touched = true;
    }
    if touched {
        entry.updated_at = Utc::now();
    }
    Ok(Json(entry.clone()))
}

async fn delete_entry(State(db): State<Db>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    check_entry_id(&id)?;
    let mut store = db.write().await;
    store
        .entries
        .remove(&id)
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or_else(entry_not_found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_serializes_underscore_id_and_naive_timestamps() {
        let ts = DateTime::parse_from_rfc3339("2024-01-12T10:30:00.5Z")
            .unwrap()
            .with_timezone(&Utc);
        let entry = DataEntry {
            id: "65a1f0c2e4b0a1b2c3d4e5f6".to_string(),
            name: "Test".to_string(),
            description: None,
            value: 1.5,
            status: EntryStatus::Active,
            created_at: ts,
            updated_at: ts,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["_id"], "65a1f0c2e4b0a1b2c3d4e5f6");
        assert_eq!(json["created_at"], "2024-01-12T10:30:00.500000");
        assert_eq!(json["status"], "active");
        assert!(json["description"].is_null());
    }

    #[test]
    fn create_entry_defaults_status_to_active() {
        let input: CreateEntry = serde_json::from_str(r#"{"name":"No status","value":1}"#).unwrap();
        assert_eq!(input.status, EntryStatus::Active);
        assert!(input.description.is_none());
    }

    #[test]
    fn create_entry_rejects_missing_value() {
        let result: Result<CreateEntry, _> = serde_json::from_str(r#"{"name":"x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn update_entry_all_fields_optional() {
        let input: UpdateEntry = serde_json::from_str(r#"{}"#).unwrap();
        assert!(input.name.is_none());
        assert!(input.value.is_none());
        assert!(input.status.is_none());
    }

    #[test]
    fn entry_ids_must_be_24_hex_digits() {
        assert!(check_entry_id("65a1f0c2e4b0a1b2c3d4e5f6").is_ok());
        for bad in ["", "abc", "65a1f0c2e4b0a1b2c3d4e5fz", "65a1f0c2e4b0a1b2c3d4e5f6a", "a b"] {
            let (status, Json(detail)) = check_entry_id(bad).unwrap_err();
            assert_eq!(status, StatusCode::BAD_REQUEST, "{bad}");
            assert_eq!(detail.detail, "Invalid ID format");
        }
    }

    #[test]
    fn scripts_end_in_one_terminal_status() {
        for task_type in TASK_TYPES {
            let steps = script(task_type, false);
            assert_eq!(steps.front(), Some(&TaskStatus::Started));
            assert_eq!(steps.back(), Some(&TaskStatus::Success));
            assert!(steps.iter().filter(|s| **s == TaskStatus::Success).count() == 1);
        }
        assert_eq!(script("simulate_load", true).back(), Some(&TaskStatus::Failure));
    }

    #[test]
    fn simulate_load_result_scales_with_intensity() {
        let mut params = Map::new();
        params.insert("duration".into(), json!(10));
        params.insert("intensity".into(), json!("high"));
        let result = task_result("simulate_load", &params, 1, Utc::now());
        assert_eq!(result["total_operations"], 1000);
        assert_eq!(result["intensity"], "high");
    }
}
