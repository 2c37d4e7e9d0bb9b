use comfy_table::{presets::UTF8_FULL, Table};
use opsdash_core::{DataEntry, HealthCheck, Metrics, TaskResponse};
use serde::Serialize;

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Table,
    Json,
}

fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(header);
    table
}

fn json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn health(format: Format, health: &HealthCheck) -> anyhow::Result<()> {
    if format == Format::Json {
        return json(health);
    }
    let mut t = table(vec!["Component", "Status"]);
    t.add_row(vec!["overall", health.status.as_str()]);
    for (name, status) in &health.dependencies {
        t.add_row(vec![name.as_str(), status.as_str()]);
    }
    println!("{t}");
    Ok(())
}

pub fn metrics(format: Format, metrics: &Metrics) -> anyhow::Result<()> {
    if format == Format::Json {
        return json(metrics);
    }
    let mut t = table(vec!["Metric", "Value"]);
    t.add_row(vec!["Total tasks".to_string(), metrics.total_tasks.to_string()]);
    t.add_row(vec!["Active tasks".to_string(), metrics.active_tasks.to_string()]);
    t.add_row(vec!["Completed tasks".to_string(), metrics.completed_tasks.to_string()]);
    t.add_row(vec!["Failed tasks".to_string(), metrics.failed_tasks.to_string()]);
    t.add_row(vec!["Data entries".to_string(), metrics.total_data_entries.to_string()]);
    println!("{t}");
    Ok(())
}

pub fn task(format: Format, task: &TaskResponse) -> anyhow::Result<()> {
    if format == Format::Json {
        return json(task);
    }
    let mut t = table(vec!["Field", "Value"]);
    t.add_row(vec!["ID", &task.task_id]);
    t.add_row(vec!["Type", &task.task_type]);
    t.add_row(vec!["Status", task.status.as_str()]);
    t.add_row(vec!["Created", &task.created_at.to_rfc3339()]);
    if let Some(result) = &task.result {
        t.add_row(vec!["Result".to_string(), serde_json::to_string_pretty(result)?]);
    }
    if let Some(error) = &task.error {
        t.add_row(vec!["Error", error]);
    }
    println!("{t}");
    Ok(())
}

/// One line per intermediate snapshot while a task is being followed.
pub fn task_progress(format: Format, task: &TaskResponse) -> anyhow::Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string(task)?),
        Format::Table => println!("{}  {}", task.task_id, task.status),
    }
    Ok(())
}

pub fn entries(format: Format, entries: &[DataEntry]) -> anyhow::Result<()> {
    if format == Format::Json {
        return json(&entries);
    }
    if entries.is_empty() {
        println!("No data entries");
        return Ok(());
    }
    let mut t = table(vec!["ID", "Name", "Value", "Status", "Updated"]);
    for entry in entries {
        t.add_row(vec![
            entry.id.clone(),
            entry.name.clone(),
            entry.value.to_string(),
            entry.status.to_string(),
            entry.updated_at.to_rfc3339(),
        ]);
    }
    println!("{t}");
    Ok(())
}

pub fn entry(format: Format, entry: &DataEntry) -> anyhow::Result<()> {
    if format == Format::Json {
        return json(entry);
    }
    let mut t = table(vec!["Field", "Value"]);
    t.add_row(vec!["ID", &entry.id]);
    t.add_row(vec!["Name", &entry.name]);
    t.add_row(vec!["Description", entry.description.as_deref().unwrap_or("")]);
    t.add_row(vec!["Value".to_string(), entry.value.to_string()]);
    t.add_row(vec!["Status".to_string(), entry.status.to_string()]);
    t.add_row(vec!["Created".to_string(), entry.created_at.to_rfc3339()]);
    t.add_row(vec!["Updated".to_string(), entry.updated_at.to_rfc3339()]);
    println!("{t}");
    Ok(())
}
