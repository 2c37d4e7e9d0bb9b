//! Client core for the operations dashboard API.
//!
//! # Overview
//! Typed gateways over a small REST API (health, metrics, background tasks,
//! data entries), a polling controller that follows a submitted task to
//! completion, and a query cache that knows which mutations make which reads
//! stale.
//!
//! # Design
//! - `ApiClient` is stateless: it holds a base URL and a `Transport`.
//! - Each operation is split into `build_*` (produces request) and
//!   `parse_*` (consumes response), so the I/O boundary is explicit and the
//!   wire contract can be checked without a network.
//! - `UreqTransport` is the real network; tests substitute their own.
//! - State that outlives a call (cached reads, the task on display, its
//!   polling thread) lives in `cache` and `poll`, never in the client.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod poll;
pub mod transport;
pub mod types;

pub use cache::{CachingClient, Mutation, QueryCache};
pub use client::ApiClient;
pub use config::ClientConfig;
pub use error::ApiError;
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport};
pub use poll::{CancelToken, PollConfig, PollEvent, PollOutcome, TaskPoller, TaskWatcher};
pub use transport::UreqTransport;
pub use types::{
    DataEntry, DataEntryCreate, DataEntryStatus, DataEntryUpdate, HealthCheck, Metrics, Pagination,
    TaskCreate, TaskKind, TaskResponse, TaskStatus,
};
