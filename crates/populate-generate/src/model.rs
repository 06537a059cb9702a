use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use populate_core::{EntityKind, RecordStore};

use crate::errors::GenerationError;
use crate::fanout::FanOutShape;
use crate::retry::RetryPolicy;
use crate::summary::DatasetSummary;

pub const DEFAULT_USERS: u64 = 70_000;
pub const DEFAULT_APPLIERS: u64 = 150_000;
pub const DEFAULT_QUESTIONS: u64 = 1_000_000;
pub const DEFAULT_BATCH_SIZE: usize = 5_000;
pub const DEFAULT_SEED: u64 = 42;

/// Requested dataset size. Appliers and questions are expectations: the
/// actual totals depend on the fan-out draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetCounts {
    pub users: u64,
    pub appliers: u64,
    pub questions: u64,
}

impl Default for TargetCounts {
    fn default() -> Self {
        Self {
            users: DEFAULT_USERS,
            appliers: DEFAULT_APPLIERS,
            questions: DEFAULT_QUESTIONS,
        }
    }
}

impl TargetCounts {
    /// Validate counts coming from user input.
    pub fn from_signed(users: i64, appliers: i64, questions: i64) -> Result<Self, GenerationError> {
        let convert = |name: &str, value: i64| {
            u64::try_from(value).map_err(|_| {
                GenerationError::Configuration(format!("{name} must not be negative, got {value}"))
            })
        };
        Ok(Self {
            users: convert("users", users)?,
            appliers: convert("appliers", appliers)?,
            questions: convert("questions", questions)?,
        })
    }

    pub fn appliers_per_user(&self) -> f64 {
        ratio(self.appliers, self.users)
    }

    pub fn questions_per_applier(&self) -> f64 {
        ratio(self.questions, self.appliers)
    }
}

fn ratio(children: u64, parents: u64) -> f64 {
    if parents == 0 {
        0.0
    } else {
        children as f64 / parents as f64
    }
}

/// How applier coordinates are spread over the globe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeoSpread {
    /// Uniform latitude/longitude over the whole globe.
    Global,
    /// Clustered around a fixed pool of metropolitan areas.
    #[default]
    Metro,
}

impl GeoSpread {
    pub fn as_str(self) -> &'static str {
        match self {
            GeoSpread::Global => "global",
            GeoSpread::Metro => "metro",
        }
    }
}

impl fmt::Display for GeoSpread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GeoSpread {
    type Err = GenerationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "global" => Ok(GeoSpread::Global),
            "metro" => Ok(GeoSpread::Metro),
            other => Err(GenerationError::Configuration(format!(
                "unknown geo spread '{other}' (expected global or metro)"
            ))),
        }
    }
}

/// Options for the generation pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateOptions {
    /// Rows per bulk insert.
    pub batch_size: usize,
    /// Bulk inserts of one phase allowed to run concurrently.
    pub max_in_flight: usize,
    /// Seed for every random stream of the run.
    pub seed: u64,
    pub fan_out: FanOutShape,
    pub geo: GeoSpread,
    pub retry: RetryPolicy,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_in_flight: 1,
            seed: DEFAULT_SEED,
            fan_out: FanOutShape::default(),
            geo: GeoSpread::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl GenerateOptions {
    /// Fail fast on settings that cannot produce a run against `store`.
    pub fn validate(&self, store: &dyn RecordStore) -> Result<(), GenerationError> {
        self.validate_settings()?;
        for kind in EntityKind::ALL {
            let limit = store.max_batch_rows(kind);
            if self.batch_size > limit {
                return Err(GenerationError::Configuration(format!(
                    "batch_size {} exceeds the {} limit of {limit} rows for {kind}",
                    self.batch_size,
                    store.engine()
                )));
            }
        }
        Ok(())
    }

    /// The checks that need no store.
    pub fn validate_settings(&self) -> Result<(), GenerationError> {
        if self.batch_size == 0 {
            return Err(GenerationError::Configuration(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.max_in_flight == 0 {
            return Err(GenerationError::Configuration(
                "max_in_flight must be at least 1".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(GenerationError::Configuration(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            return Err(GenerationError::Configuration(format!(
                "retry.initial_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.retry.initial_delay_ms, self.retry.max_delay_ms
            )));
        }
        Ok(())
    }
}

/// Outcome of one generation phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseReport {
    pub phase: EntityKind,
    pub rows_expected: u64,
    pub rows_persisted: u64,
    pub batches: u64,
    pub retries: u64,
    pub duration_ms: u64,
    pub skipped: bool,
}

impl PhaseReport {
    pub fn skipped(phase: EntityKind) -> Self {
        Self {
            phase,
            rows_expected: 0,
            rows_persisted: 0,
            batches: 0,
            retries: 0,
            duration_ms: 0,
            skipped: true,
        }
    }
}

/// Report for a generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationReport {
    pub run_id: String,
    pub engine: String,
    pub seed: u64,
    pub targets: TargetCounts,
    pub batch_size: usize,
    pub fan_out: FanOutShape,
    pub phases: Vec<PhaseReport>,
    pub summary: DatasetSummary,
    pub duration_ms: u64,
    pub rows_per_sec: f64,
}

impl GenerationReport {
    pub fn new(run_id: String, engine: &str, targets: TargetCounts, options: &GenerateOptions) -> Self {
        Self {
            run_id,
            engine: engine.to_string(),
            seed: options.seed,
            targets,
            batch_size: options.batch_size,
            fan_out: options.fan_out,
            phases: Vec::new(),
            summary: DatasetSummary::default(),
            duration_ms: 0,
            rows_per_sec: 0.0,
        }
    }

    pub fn phase(&self, kind: EntityKind) -> Option<&PhaseReport> {
        self.phases.iter().find(|phase| phase.phase == kind)
    }

    pub fn persisted(&self, kind: EntityKind) -> u64 {
        self.phase(kind).map(|phase| phase.rows_persisted).unwrap_or(0)
    }

    pub fn total_rows(&self) -> u64 {
        self.phases.iter().map(|phase| phase.rows_persisted).sum()
    }

    pub fn retries_total(&self) -> u64 {
        self.phases.iter().map(|phase| phase.retries).sum()
    }
}
