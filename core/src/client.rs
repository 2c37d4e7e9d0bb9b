//! Resource gateways for the dashboard API.
//!
//! # Design
//! `ApiClient` holds only a base URL and a `Transport` and carries no
//! mutable state between calls. Each operation is split three ways:
//! `build_*` produces an `HttpRequest`, `parse_*` consumes an
//! `HttpResponse`, and the plain method (`get_health`, `create_task`, ...)
//! runs build, exactly one `Transport::execute`, then parse. The build and
//! parse halves are pure, so the wire contract can be tested without I/O.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport};
use crate::types::{
    validate_id, DataEntry, DataEntryCreate, DataEntryUpdate, HealthCheck, Metrics, Pagination,
    TaskCreate, TaskResponse,
};

const JSON_CONTENT_TYPE: (&str, &str) = ("content-type", "application/json");

/// Stateless, typed client for the dashboard REST API.
#[derive(Debug, Clone)]
pub struct ApiClient<T> {
    base_url: String,
    transport: T,
}

impl<T> ApiClient<T> {
    pub fn new(base_url: &str, transport: T) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            transport,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    // --- request builders ---

    pub fn build_get_health(&self) -> HttpRequest {
        self.request(HttpMethod::Get, "/health")
    }

    pub fn build_get_metrics(&self) -> HttpRequest {
        self.request(HttpMethod::Get, "/metrics")
    }

    pub fn build_create_task(&self, input: &TaskCreate) -> Result<HttpRequest, ApiError> {
        input.validate()?;
        self.json_request(HttpMethod::Post, "/tasks", input)
    }

    pub fn build_get_task_status(&self, task_id: &str) -> Result<HttpRequest, ApiError> {
        let task_id = path_segment(task_id)?;
        Ok(self.request(HttpMethod::Get, &format!("/tasks/{task_id}")))
    }

    pub fn build_list_data_entries(&self, page: Pagination) -> HttpRequest {
        let mut req = self.request(HttpMethod::Get, "/data");
        req.query = vec![
            ("skip".to_string(), page.skip.to_string()),
            ("limit".to_string(), page.limit.to_string()),
        ];
        req
    }

    pub fn build_create_data_entry(&self, input: &DataEntryCreate) -> Result<HttpRequest, ApiError> {
        input.validate()?;
        self.json_request(HttpMethod::Post, "/data", input)
    }

    pub fn build_get_data_entry(&self, id: &str) -> Result<HttpRequest, ApiError> {
        let id = path_segment(id)?;
        Ok(self.request(HttpMethod::Get, &format!("/data/{id}")))
    }

    pub fn build_update_data_entry(
        &self,
        id: &str,
        input: &DataEntryUpdate,
    ) -> Result<HttpRequest, ApiError> {
        let id = path_segment(id)?;
        input.validate()?;
        self.json_request(HttpMethod::Put, &format!("/data/{id}"), input)
    }

    pub fn build_delete_data_entry(&self, id: &str) -> Result<HttpRequest, ApiError> {
        let id = path_segment(id)?;
        Ok(self.request(HttpMethod::Delete, &format!("/data/{id}")))
    }

    // --- response parsers ---

    pub fn parse_get_health(&self, response: HttpResponse) -> Result<HealthCheck, ApiError> {
        decode(response)
    }

    pub fn parse_get_metrics(&self, response: HttpResponse) -> Result<Metrics, ApiError> {
        decode(response)
    }

    pub fn parse_create_task(&self, response: HttpResponse) -> Result<TaskResponse, ApiError> {
        decode(response)
    }

    pub fn parse_get_task_status(&self, response: HttpResponse) -> Result<TaskResponse, ApiError> {
        decode(response)
    }

    pub fn parse_list_data_entries(&self, response: HttpResponse) -> Result<Vec<DataEntry>, ApiError> {
        decode(response)
    }

    pub fn parse_create_data_entry(&self, response: HttpResponse) -> Result<DataEntry, ApiError> {
        decode(response)
    }

    pub fn parse_get_data_entry(&self, response: HttpResponse) -> Result<DataEntry, ApiError> {
        decode(response)
    }

    pub fn parse_update_data_entry(&self, response: HttpResponse) -> Result<DataEntry, ApiError> {
        decode(response)
    }

    pub fn parse_delete_data_entry(&self, response: HttpResponse) -> Result<(), ApiError> {
        check_status(&response)
    }

    fn request(&self, method: HttpMethod, resource: &str) -> HttpRequest {
        HttpRequest {
            method,
            path: format!("{}{resource}", self.base_url),
            query: Vec::new(),
            headers: vec![(JSON_CONTENT_TYPE.0.to_string(), JSON_CONTENT_TYPE.1.to_string())],
            body: None,
        }
    }

    fn json_request<B: Serialize>(
        &self,
        method: HttpMethod,
        resource: &str,
        body: &B,
    ) -> Result<HttpRequest, ApiError> {
        let body = serde_json::to_string(body).map_err(|e| ApiError::Serialization(e.to_string()))?;
        let mut req = self.request(method, resource);
        req.body = Some(body);
        Ok(req)
    }
}

impl<T: Transport> ApiClient<T> {
    pub fn get_health(&self) -> Result<HealthCheck, ApiError> {
        let response = self.transport.execute(self.build_get_health())?;
        self.parse_get_health(response)
    }

    pub fn get_metrics(&self) -> Result<Metrics, ApiError> {
        let response = self.transport.execute(self.build_get_metrics())?;
        self.parse_get_metrics(response)
    }

    pub fn create_task(&self, input: &TaskCreate) -> Result<TaskResponse, ApiError> {
        let response = self.transport.execute(self.build_create_task(input)?)?;
        self.parse_create_task(response)
    }

    pub fn get_task_status(&self, task_id: &str) -> Result<TaskResponse, ApiError> {
        let response = self.transport.execute(self.build_get_task_status(task_id)?)?;
        self.parse_get_task_status(response)
    }

    pub fn list_data_entries(&self, page: Pagination) -> Result<Vec<DataEntry>, ApiError> {
        let response = self.transport.execute(self.build_list_data_entries(page))?;
        self.parse_list_data_entries(response)
    }

    pub fn create_data_entry(&self, input: &DataEntryCreate) -> Result<DataEntry, ApiError> {
        let response = self.transport.execute(self.build_create_data_entry(input)?)?;
        self.parse_create_data_entry(response)
    }

    pub fn get_data_entry(&self, id: &str) -> Result<DataEntry, ApiError> {
        let response = self.transport.execute(self.build_get_data_entry(id)?)?;
        self.parse_get_data_entry(response)
    }

    pub fn update_data_entry(&self, id: &str, input: &DataEntryUpdate) -> Result<DataEntry, ApiError> {
        let response = self.transport.execute(self.build_update_data_entry(id, input)?)?;
        self.parse_update_data_entry(response)
    }

    pub fn delete_data_entry(&self, id: &str) -> Result<(), ApiError> {
        let response = self.transport.execute(self.build_delete_data_entry(id)?)?;
        self.parse_delete_data_entry(response)
    }
}

/// An identifier as one percent-encoded path segment.
fn path_segment(id: &str) -> Result<String, ApiError> {
    validate_id(id)?;
    Ok(urlencoding::encode(id).into_owned())
}

/// Map non-success status codes to the appropriate `ApiError` variant.
fn check_status(response: &HttpResponse) -> Result<(), ApiError> {
    if response.is_success() {
        return Ok(());
    }
    if response.status == 404 {
        return Err(ApiError::NotFound {
            body: response.body.clone(),
        });
    }
    Err(ApiError::HttpStatus {
        status: response.status,
        body: response.body.clone(),
    })
}

fn decode<R: DeserializeOwned>(response: HttpResponse) -> Result<R, ApiError> {
    check_status(&response)?;
    serde_json::from_str(&response.body).map_err(|e| ApiError::Deserialization(e.to_string()))
}
