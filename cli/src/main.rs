mod render;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::bail;
use clap::{Parser, Subcommand};
use opsdash_core::config::{self, ClientConfig};
use opsdash_core::{
    ApiClient, ApiError, CachingClient, DataEntryCreate, DataEntryStatus, DataEntryUpdate,
    Pagination, PollConfig, PollEvent, PollOutcome, TaskCreate, TaskWatcher, Transport,
    UreqTransport,
};
use serde_json::Value;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use render::Format;

#[derive(Parser, Debug)]
#[command(name = "opsdash")]
#[command(about = "Operations dashboard CLI", long_about = None)]
struct Args {
    /// API base URL, absolute or relative to --origin
    #[arg(long, env = config::API_URL_ENV, default_value = config::DEFAULT_BASE_URL)]
    api_url: String,

    /// Origin a relative API base URL is resolved against
    #[arg(long, env = config::ORIGIN_ENV, default_value = config::DEFAULT_ORIGIN)]
    origin: String,

    /// Delay between task status checks, in milliseconds
    #[arg(long, default_value = "2000")]
    poll_interval_ms: u64,

    /// Give up following a task after this many status checks
    #[arg(long)]
    max_poll_attempts: Option<u32>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    format: Format,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show backend and dependency health
    Health,

    /// Show task and data counts
    Metrics,

    /// Refresh health and metrics periodically
    Watch {
        /// Seconds between refreshes [default: 5]
        #[arg(long)]
        interval: Option<u64>,

        /// Stop after this many refreshes
        #[arg(long)]
        iterations: Option<u32>,
    },

    /// Background tasks
    #[command(subcommand)]
    Task(TaskCommand),

    /// Data entries
    #[command(subcommand)]
    Data(DataCommand),
}

#[derive(Subcommand, Debug)]
enum TaskCommand {
    /// Submit a task and follow it until it finishes
    Run {
        /// Task type (process_data, generate_report, simulate_load)
        task_type: String,

        /// Task parameter as key=value; JSON values are parsed, anything else is a string
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, Value)>,

        /// Print the submitted task and return without polling
        #[arg(long)]
        no_wait: bool,
    },

    /// Get task status
    Status {
        /// Task ID
        task_id: String,
    },
}

#[derive(Subcommand, Debug)]
enum DataCommand {
    /// List data entries, newest first
    List {
        #[arg(long, default_value = "0")]
        skip: u32,

        #[arg(short, long, default_value = "100")]
        limit: u32,
    },

    /// Show one data entry
    Get { id: String },

    /// Create a data entry
    Create {
        #[arg(short, long)]
        name: String,

        #[arg(short, long, allow_hyphen_values = true)]
        value: f64,

        #[arg(short, long)]
        description: Option<String>,

        /// active, inactive or archived
        #[arg(short, long)]
        status: Option<DataEntryStatus>,
    },

    /// Change the given fields of a data entry
    Update {
        id: String,

        #[arg(short, long)]
        name: Option<String>,

        #[arg(short, long, allow_hyphen_values = true)]
        value: Option<f64>,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(short, long)]
        status: Option<DataEntryStatus>,
    },

    /// Delete a data entry
    Delete { id: String },
}

fn parse_param(s: &str) -> Result<(String, Value), String> {
    let (key, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{s}'"))?;
    if key.is_empty() {
        return Err(format!("empty parameter name in '{s}'"));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

fn refresh_interval(secs: Option<u64>, config: &ClientConfig) -> Duration {
    secs.map_or(config.refresh_interval, Duration::from_secs)
}

/// Attach enough context that an unreachable backend reads differently
/// from a server-side rejection.
fn describe(err: ApiError, base_url: &str) -> anyhow::Error {
    if err.is_connectivity() {
        anyhow::anyhow!("cannot reach the API at {base_url}: {err}")
    } else if let Some(detail) = err.detail() {
        anyhow::anyhow!("{err} ({detail})")
    } else {
        err.into()
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = ClientConfig {
        base_url: args.api_url.clone(),
        origin: args.origin.clone(),
        poll_interval: Duration::from_millis(args.poll_interval_ms),
        max_poll_attempts: args.max_poll_attempts,
        ..ClientConfig::default()
    };
    let base_url = config.resolved_base_url();
    debug!(%base_url, "resolved API base URL");
    let client = ApiClient::new(&base_url, UreqTransport::new());
    let format = args.format;

    match args.command {
        Commands::Health => {
            let health = client.get_health().map_err(|e| describe(e, &base_url))?;
            render::health(format, &health)?;
        }

        Commands::Metrics => {
            let metrics = client.get_metrics().map_err(|e| describe(e, &base_url))?;
            render::metrics(format, &metrics)?;
        }

        Commands::Watch { interval, iterations } => {
            let interval = refresh_interval(interval, &config);
            let mut round = 0u32;
            loop {
                round += 1;
                // A failed refresh is reported and retried on the next tick.
                match client.get_health() {
                    Ok(health) => render::health(format, &health)?,
                    Err(e) => eprintln!("health: {}", describe(e, &base_url)),
                }
                match client.get_metrics() {
                    Ok(metrics) => render::metrics(format, &metrics)?,
                    Err(e) => eprintln!("metrics: {}", describe(e, &base_url)),
                }
                if iterations.is_some_and(|n| round >= n) {
                    break;
                }
                thread::sleep(interval);
            }
        }

        Commands::Task(TaskCommand::Run { task_type, params, no_wait }) => {
            let mut task = TaskCreate::new(task_type);
            task.params.extend(params);

            if no_wait {
                let submitted = client.create_task(&task).map_err(|e| describe(e, &base_url))?;
                render::task(format, &submitted)?;
                return Ok(());
            }

            let mut watcher = TaskWatcher::new(Arc::new(client), PollConfig::from(&config));
            let events = watcher.submit(&task).map_err(|e| describe(e, &base_url))?;
            if let Some(submitted) = watcher.current() {
                render::task_progress(format, &submitted)?;
            }
            for event in events {
                match event {
                    PollEvent::Snapshot(snapshot) if !snapshot.is_terminal() => {
                        render::task_progress(format, &snapshot)?;
                    }
                    PollEvent::Snapshot(_) => {}
                    PollEvent::Finished(outcome) => {
                        render::task(format, outcome.last())?;
                        match outcome {
                            PollOutcome::Completed(_) => info!("task finished"),
                            PollOutcome::Stopped { error, .. } => {
                                return Err(describe(error, &base_url).context("stopped following task"));
                            }
                            PollOutcome::Exhausted { attempts, .. } => {
                                bail!("task still running after {attempts} status checks");
                            }
                            PollOutcome::Cancelled { .. } => bail!("polling cancelled"),
                        }
                    }
                }
            }
        }

        Commands::Task(TaskCommand::Status { task_id }) => {
            let task = client.get_task_status(&task_id).map_err(|e| describe(e, &base_url))?;
            render::task(format, &task)?;
        }

        Commands::Data(command) => run_data(CachingClient::new(client), command, format, &base_url)?,
    }

    Ok(())
}

/// Data commands go through the cache so that the listing and counts shown
/// after a write never predate it.
fn run_data<T: Transport>(
    mut cached: CachingClient<T>,
    command: DataCommand,
    format: Format,
    base_url: &str,
) -> anyhow::Result<()> {
    match command {
        DataCommand::List { skip, limit } => {
            let entries = cached
                .entries(Pagination { skip, limit })
                .map_err(|e| describe(e, base_url))?;
            render::entries(format, &entries)?;
        }

        DataCommand::Get { id } => {
            let entry = cached.client().get_data_entry(&id).map_err(|e| describe(e, base_url))?;
            render::entry(format, &entry)?;
        }

        DataCommand::Create { name, value, description, status } => {
            let input = DataEntryCreate {
                name,
                description,
                value,
                status,
            };
            let created = cached.create_entry(&input).map_err(|e| describe(e, base_url))?;
            render::entry(format, &created)?;
            after_mutation(&mut cached, format, base_url)?;
        }

        DataCommand::Update { id, name, value, description, status } => {
            let input = DataEntryUpdate {
                name,
                description,
                value,
                status,
            };
            if input.is_empty() {
                bail!("nothing to update: pass at least one of --name, --value, --description, --status");
            }
            let updated = cached.update_entry(&id, &input).map_err(|e| describe(e, base_url))?;
            render::entry(format, &updated)?;
            after_mutation(&mut cached, format, base_url)?;
        }

        DataCommand::Delete { id } => {
            cached.delete_entry(&id).map_err(|e| describe(e, base_url))?;
            if format == Format::Table {
                println!("Deleted {id}");
            }
            after_mutation(&mut cached, format, base_url)?;
        }
    }
    Ok(())
}

fn after_mutation<T: Transport>(
    cached: &mut CachingClient<T>,
    format: Format,
    base_url: &str,
) -> anyhow::Result<()> {
    if format == Format::Json {
        return Ok(());
    }
    let entries = cached
        .entries(Pagination::default())
        .map_err(|e| describe(e, base_url))?;
    render::entries(format, &entries)?;
    let metrics = cached.metrics().map_err(|e| describe(e, base_url))?;
    render::metrics(format, &metrics)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use opsdash_core::{HttpMethod, HttpRequest, HttpResponse};

    use super::*;

    const EMPTY_METRICS: &str = r#"{"total_tasks":0,"active_tasks":0,"completed_tasks":0,"failed_tasks":0,"total_data_entries":0}"#;

    /// Answers by method and records what it was asked.
    #[derive(Default)]
    struct CountingTransport {
        seen: Mutex<Vec<(HttpMethod, String)>>,
    }

    impl Transport for CountingTransport {
        fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
            let body = match request.method {
                HttpMethod::Delete => String::new(),
                _ if request.path.ends_with("/metrics") => EMPTY_METRICS.to_string(),
                _ => "[]".to_string(),
            };
            let status = if request.method == HttpMethod::Delete { 204 } else { 200 };
            self.seen.lock().unwrap().push((request.method, request.path));
            Ok(HttpResponse {
                status,
                headers: Vec::new(),
                body,
            })
        }
    }

    fn run_delete(format: Format) -> Vec<(HttpMethod, String)> {
        let transport = Arc::new(CountingTransport::default());
        let cached = CachingClient::new(ApiClient::new("http://h/api", Arc::clone(&transport)));
        run_data(cached, DataCommand::Delete { id: "e1".to_string() }, format, "http://h/api").unwrap();
        let seen = transport.seen.lock().unwrap().clone();
        seen
    }

    #[test]
    fn delete_issues_no_read_before_the_write() {
        let seen = run_delete(Format::Json);
        assert_eq!(seen, vec![(HttpMethod::Delete, "http://h/api/data/e1".to_string())]);

        let seen = run_delete(Format::Table);
        let paths: Vec<&str> = seen.iter().map(|(_, p)| p.as_str()).collect();
        assert_eq!(paths, vec!["http://h/api/data/e1", "http://h/api/data", "http://h/api/metrics"]);
        assert_eq!(seen[0].0, HttpMethod::Delete);
    }

    #[test]
    fn params_parse_json_or_fall_back_to_string() {
        assert_eq!(parse_param("duration=10").unwrap(), ("duration".to_string(), Value::from(10)));
        assert_eq!(parse_param("fail=true").unwrap(), ("fail".to_string(), Value::Bool(true)));
        assert_eq!(
            parse_param("intensity=high").unwrap(),
            ("intensity".to_string(), Value::from("high"))
        );
        assert_eq!(parse_param("note=a=b").unwrap(), ("note".to_string(), Value::from("a=b")));
        assert!(parse_param("no-equals").is_err());
        assert!(parse_param("=1").is_err());
    }

    #[test]
    fn data_list_parses_pagination() {
        let args = Args::try_parse_from([
            "opsdash",
            "--api-url",
            "/api",
            "--origin",
            "http://dash.local:9000",
            "data",
            "list",
            "--limit",
            "5",
        ])
        .unwrap();
        assert_eq!(args.format, Format::Table);
        assert!(matches!(args.command, Commands::Data(DataCommand::List { skip: 0, limit: 5 })));
    }

    #[test]
    fn task_run_collects_params() {
        let args = Args::try_parse_from([
            "opsdash", "--format", "json", "task", "run", "simulate_load", "-p", "duration=3", "-p",
            "intensity=low",
        ])
        .unwrap();
        assert_eq!(args.format, Format::Json);
        match args.command {
            Commands::Task(TaskCommand::Run { task_type, params, no_wait }) => {
                assert_eq!(task_type, "simulate_load");
                assert_eq!(params.len(), 2);
                assert!(!no_wait);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn entry_status_is_validated_by_clap() {
        let parsed = Args::try_parse_from(["opsdash", "data", "create", "-n", "x", "-v", "1", "-s", "bogus"]);
        assert!(parsed.is_err());
        let parsed = Args::try_parse_from(["opsdash", "data", "create", "-n", "x", "-v", "-2.5", "-s", "archived"]);
        assert!(parsed.is_ok());
    }

    #[test]
    fn watch_interval_defaults_to_configured_refresh() {
        let defaults = ClientConfig::default();
        assert_eq!(refresh_interval(None, &defaults), config::DEFAULT_REFRESH_INTERVAL);
        assert_eq!(refresh_interval(Some(30), &defaults), Duration::from_secs(30));

        let args = Args::try_parse_from(["opsdash", "watch", "--iterations", "1"]).unwrap();
        assert!(matches!(args.command, Commands::Watch { interval: None, iterations: Some(1) }));
    }

    #[test]
    fn connectivity_errors_name_the_backend() {
        let err = describe(ApiError::Transport("connection refused".into()), "http://h/api");
        assert!(err.to_string().contains("cannot reach the API at http://h/api"));

        let err = describe(
            ApiError::HttpStatus {
                status: 400,
                body: r#"{"detail":"Unknown task type: x"}"#.into(),
            },
            "http://h/api",
        );
        assert!(err.to_string().contains("Unknown task type: x"));
    }
}
