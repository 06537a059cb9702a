use std::fs::{OpenOptions, create_dir_all};
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, Utc};
use serde::Serialize;

use populate_core::RedactedUrl;
use populate_generate::{GenerateOptions, GenerationReport, TargetCounts};

use super::RegistryResult;

/// Metadata captured at run start.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub engine: String,
    pub run_dir: PathBuf,
    pub targets: TargetCounts,
    pub options: GenerateOptions,
    pub postgis: bool,
    pub reset: bool,
    pub connection: Option<RedactedUrl>,
}

/// JSON config written to each run directory.
#[derive(Debug, Serialize)]
pub struct RunConfig {
    pub run_id: String,
    pub started_at: String,
    pub engine: String,
    pub targets: TargetCounts,
    pub options: GenerateOptions,
    pub postgis: bool,
    pub reset: bool,
    pub connection: Option<RedactedUrl>,
    pub git: GitInfo,
}

/// Git metadata for reproducibility.
#[derive(Debug, Serialize)]
pub struct GitInfo {
    pub commit: Option<String>,
    pub dirty: Option<bool>,
}

/// Paths for run artifacts.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub root: PathBuf,
    pub logs_path: PathBuf,
    pub report_path: PathBuf,
    /// Where the CSV store writes its tables.
    pub data_dir: PathBuf,
}

pub fn start_run(ctx: &RunContext) -> RegistryResult<RunPaths> {
    let timestamp = ctx.started_at.format("%Y-%m-%dT%H-%M-%SZ").to_string();
    let root = ctx
        .run_dir
        .join(format!("{timestamp}__run_{}", ctx.run_id));

    create_dir_all(&root)?;

    let config_path = root.join("config.json");
    let logs_path = root.join("logs.ndjson");
    let report_path = root.join("generation_report.json");
    let data_dir = root.join("data");

    let config = RunConfig {
        run_id: ctx.run_id.clone(),
        started_at: ctx.started_at.to_rfc3339(),
        engine: ctx.engine.clone(),
        targets: ctx.targets,
        options: ctx.options.clone(),
        postgis: ctx.postgis,
        reset: ctx.reset,
        connection: ctx.connection.clone(),
        git: collect_git_info(),
    };

    write_json(&config_path, &config)?;

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&logs_path)?;

    Ok(RunPaths {
        root,
        logs_path,
        report_path,
        data_dir,
    })
}

pub fn write_report(paths: &RunPaths, report: &GenerationReport) -> RegistryResult<()> {
    write_json(&paths.report_path, report)
}

fn collect_git_info() -> GitInfo {
    let commit = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string())
        .filter(|value| !value.is_empty());

    let dirty = Command::new("git")
        .args(["status", "--porcelain"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| !output.stdout.is_empty());

    GitInfo { commit, dirty }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> RegistryResult<()> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(path)?;
    serde_json::to_writer_pretty(file, value)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_run_writes_config_with_redacted_connection() {
        let run_dir = std::env::temp_dir().join(format!("populate_runs_{}", uuid::Uuid::new_v4()));
        let ctx = RunContext {
            run_id: "abc".to_string(),
            started_at: Utc::now(),
            engine: "postgres".to_string(),
            run_dir: run_dir.clone(),
            targets: TargetCounts::default(),
            options: GenerateOptions::default(),
            postgis: false,
            reset: false,
            connection: Some(populate_core::redact_database_url(
                "postgres://app:hunter2@db:5432/jobs",
            )),
        };

        let paths = start_run(&ctx).expect("start run");
        assert!(paths.root.ends_with(format!(
            "{}__run_abc",
            ctx.started_at.format("%Y-%m-%dT%H-%M-%SZ")
        )));
        assert!(paths.logs_path.exists());

        let config = std::fs::read_to_string(paths.root.join("config.json")).expect("config");
        assert!(!config.contains("hunter2"));
        assert!(config.contains("\"users\": 70000"));

        std::fs::remove_dir_all(&run_dir).ok();
    }
}
