use std::sync::Arc;
use std::time::Instant;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{info, warn};

use populate_core::{
    ApplierRecord, EntityKind, QuestionRecord, Record, RecordKey, RecordStore, UserRecord,
};

use crate::errors::GenerationError;
use crate::factory::{GeneratedRecord, RecordFactory};
use crate::fanout::FanOut;
use crate::model::{GenerateOptions, GenerationReport, PhaseReport, TargetCounts};
use crate::progress::{ProgressReporter, TracingReporter};
use crate::stop::StopSignal;
use crate::summary::DatasetSummary;
use crate::writer::{BatchWriter, WriterOutput};

/// Result of a generation run.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub report: GenerationReport,
    /// Persisted user keys in generation order.
    pub user_keys: Vec<RecordKey>,
    /// Persisted applier keys in generation order.
    pub applier_keys: Vec<RecordKey>,
}

/// Drives the three generation phases against one store.
pub struct Orchestrator {
    store: Arc<dyn RecordStore>,
    options: GenerateOptions,
    factory: RecordFactory,
    reporter: Arc<dyn ProgressReporter>,
    stop: StopSignal,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn RecordStore>, options: GenerateOptions) -> Self {
        Self {
            store,
            factory: RecordFactory::new(options.geo),
            options,
            reporter: Arc::new(TracingReporter),
            stop: StopSignal::default(),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Handle that stops the run at the next batch boundary.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub async fn run(&self, targets: TargetCounts) -> Result<GenerationResult, GenerationError> {
        self.options.validate(self.store.as_ref())?;
        let applier_fan_out = FanOut::new(self.options.fan_out, targets.appliers_per_user())?;
        let question_fan_out = FanOut::new(self.options.fan_out, targets.questions_per_applier())?;

        let start = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let mut report = GenerationReport::new(
            run_id.clone(),
            self.store.engine(),
            targets,
            &self.options,
        );

        info!(
            run_id = %run_id,
            engine = self.store.engine(),
            users = targets.users,
            appliers = targets.appliers,
            questions = targets.questions,
            seed = self.options.seed,
            fan_out = %self.options.fan_out,
            "generation started"
        );

        let outcome = self
            .run_phases(targets, &applier_fan_out, &question_fan_out, &mut report)
            .await;
        let (user_keys, applier_keys) = match outcome {
            Ok(keys) => keys,
            Err(err) => {
                warn!(run_id = %run_id, error = %err, "generation failed");
                return Err(err);
            }
        };

        report.duration_ms = start.elapsed().as_millis() as u64;
        let seconds = start.elapsed().as_secs_f64();
        if seconds > 0.0 {
            report.rows_per_sec = report.total_rows() as f64 / seconds;
        }

        info!(
            run_id = %run_id,
            rows = report.total_rows(),
            retries = report.retries_total(),
            duration_ms = report.duration_ms,
            rows_per_sec = report.rows_per_sec,
            appliers_above_question_threshold = report.summary.appliers_above_question_threshold,
            skipped_questions = report.summary.skipped_questions,
            "generation finished"
        );

        Ok(GenerationResult {
            report,
            user_keys,
            applier_keys,
        })
    }

    async fn run_phases(
        &self,
        targets: TargetCounts,
        applier_fan_out: &FanOut,
        question_fan_out: &FanOut,
        report: &mut GenerationReport,
    ) -> Result<(Vec<RecordKey>, Vec<RecordKey>), GenerationError> {
        let (users_report, user_keys) = self.users_phase(targets.users).await?;
        report.phases.push(users_report);

        let (appliers_report, applier_keys) = self
            .child_phase::<ApplierRecord, _>(
                &user_keys,
                applier_fan_out,
                &mut report.summary,
                DatasetSummary::record_applier_fan_out,
                |applier, summary| summary.record_applier(applier),
            )
            .await?;
        report.phases.push(appliers_report);

        let (questions_report, _) = self
            .child_phase::<QuestionRecord, _>(
                &applier_keys,
                question_fan_out,
                &mut report.summary,
                DatasetSummary::record_question_fan_out,
                |question, summary| {
                    if question.is_skipped {
                        summary.record_skipped_question();
                    }
                },
            )
            .await?;
        report.phases.push(questions_report);

        Ok((user_keys, applier_keys))
    }

    async fn users_phase(
        &self,
        target: u64,
    ) -> Result<(PhaseReport, Vec<RecordKey>), GenerationError> {
        self.check_stop(EntityKind::User)?;
        let started = Instant::now();
        self.reporter.phase_started(EntityKind::User, target);
        info!(phase = %EntityKind::User, rows = target, "generating phase");

        let mut rng = phase_rng(self.options.seed, EntityKind::User);
        let mut writer = self.writer::<UserRecord>(target);
        for ordinal in 1..=target {
            let user: UserRecord = self.factory.generate_as(ordinal, None, &mut rng)?;
            writer.push(user).await?;
        }
        let output = writer.finish().await?;

        Ok(self.finish_phase(EntityKind::User, target, output, started))
    }

    /// Generate children for every parent key, in parent order, as one
    /// continuous stream into a single writer.
    async fn child_phase<R, F>(
        &self,
        parents: &[RecordKey],
        fan_out: &FanOut,
        summary: &mut DatasetSummary,
        record_fan_out: fn(&mut DatasetSummary, u64),
        observe: F,
    ) -> Result<(PhaseReport, Vec<RecordKey>), GenerationError>
    where
        R: Record + TryFrom<GeneratedRecord, Error = GeneratedRecord>,
        F: Fn(&R, &mut DatasetSummary),
    {
        let kind = R::KIND;
        if parents.is_empty() {
            let report = PhaseReport::skipped(kind);
            info!(phase = %kind, "phase skipped: no parent records");
            self.reporter.phase_finished(&report);
            return Ok((report, Vec::new()));
        }
        self.check_stop(kind)?;
        let started = Instant::now();

        // Counts are drawn up front from their own stream so the phase
        // target is known before the first record is built.
        let mut fan_rng = ChaCha8Rng::seed_from_u64(hash_seed(
            self.options.seed,
            &format!("{}.fan_out", kind.phase()),
        ));
        let counts: Vec<u64> = parents.iter().map(|_| fan_out.sample(&mut fan_rng)).collect();
        for count in &counts {
            record_fan_out(summary, *count);
        }
        let target: u64 = counts.iter().sum();

        self.reporter.phase_started(kind, target);
        info!(
            phase = %kind,
            parents = parents.len(),
            rows = target,
            "generating phase"
        );

        let mut rng = phase_rng(self.options.seed, kind);
        let mut writer = self.writer::<R>(target);
        let mut ordinal = 0;
        for (parent, count) in parents.iter().zip(&counts) {
            for _ in 0..*count {
                ordinal += 1;
                let record: R = self.factory.generate_as(ordinal, Some(*parent), &mut rng)?;
                observe(&record, summary);
                writer.push(record).await?;
            }
        }
        let output = writer.finish().await?;

        Ok(self.finish_phase(kind, target, output, started))
    }

    fn writer<R: Record>(&self, target: u64) -> BatchWriter<R> {
        BatchWriter::new(Arc::clone(&self.store), self.options.batch_size, target)
            .with_max_in_flight(self.options.max_in_flight)
            .with_retry(self.options.retry.clone())
            .with_reporter(Arc::clone(&self.reporter))
            .with_stop_signal(self.stop.clone())
    }

    fn finish_phase(
        &self,
        kind: EntityKind,
        target: u64,
        output: WriterOutput,
        started: Instant,
    ) -> (PhaseReport, Vec<RecordKey>) {
        let report = PhaseReport {
            phase: kind,
            rows_expected: target,
            rows_persisted: output.keys.len() as u64,
            batches: output.batches,
            retries: output.retries,
            duration_ms: started.elapsed().as_millis() as u64,
            skipped: false,
        };
        self.reporter.phase_finished(&report);
        (report, output.keys)
    }

    fn check_stop(&self, kind: EntityKind) -> Result<(), GenerationError> {
        if self.stop.is_requested() {
            return Err(GenerationError::Interrupted {
                phase: kind,
                persisted: 0,
            });
        }
        Ok(())
    }
}

fn phase_rng(seed: u64, kind: EntityKind) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(hash_seed(seed, kind.phase()))
}

fn hash_seed(seed: u64, key: &str) -> u64 {
    let mut hash = seed ^ 0xcbf29ce484222325;
    for byte in key.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}
