use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::task::{JoinError, JoinSet};
use tracing::{debug, warn};

use populate_core::{Record, RecordKey, RecordStore, StoreError, align_keys};

use crate::errors::GenerationError;
use crate::progress::{PhaseProgress, ProgressReporter};
use crate::retry::RetryPolicy;
use crate::stop::StopSignal;

/// Result of a fully flushed writer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriterOutput {
    /// Persisted keys, one per pushed record, in push order.
    pub keys: Vec<RecordKey>,
    pub batches: u64,
    pub retries: u64,
}

struct BatchOutcome {
    index: u64,
    rows: usize,
    retries: u32,
    result: Result<Vec<RecordKey>, StoreError>,
}

/// Buffers records of one kind and persists them in bounded batches.
///
/// Up to `max_in_flight` batches are handed to the store concurrently; keys
/// are reassembled by batch index so [`WriterOutput::keys`] follows push
/// order regardless of completion order. No batch is submitted once a
/// failure has been observed.
pub struct BatchWriter<R: Record> {
    store: Arc<dyn RecordStore>,
    batch_size: usize,
    max_in_flight: usize,
    retry: RetryPolicy,
    target: u64,
    reporter: Option<Arc<dyn ProgressReporter>>,
    stop: StopSignal,
    buffer: Vec<R>,
    next_index: u64,
    in_flight: JoinSet<BatchOutcome>,
    completed: BTreeMap<u64, Vec<RecordKey>>,
    persisted: u64,
    batches: u64,
    retries: u64,
    failure: Option<GenerationError>,
}

impl<R: Record> BatchWriter<R> {
    /// `target` is the number of records the phase expects; it is only used
    /// for progress reporting.
    pub fn new(store: Arc<dyn RecordStore>, batch_size: usize, target: u64) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            store,
            batch_size,
            max_in_flight: 1,
            retry: RetryPolicy::default(),
            target,
            reporter: None,
            stop: StopSignal::default(),
            buffer: Vec::with_capacity(batch_size),
            next_index: 0,
            in_flight: JoinSet::new(),
            completed: BTreeMap::new(),
            persisted: 0,
            batches: 0,
            retries: 0,
            failure: None,
        }
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Records persisted so far.
    pub fn persisted(&self) -> u64 {
        self.persisted
    }

    pub async fn push(&mut self, record: R) -> Result<(), GenerationError> {
        self.buffer.push(record);
        if self.buffer.len() >= self.batch_size {
            self.flush().await?;
        }
        Ok(())
    }

    /// Hand the buffered records to the store as one batch.
    pub async fn flush(&mut self) -> Result<(), GenerationError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        if self.stop.is_requested() || self.failure.is_some() {
            self.drain().await;
            return Err(self.take_failure());
        }

        let rows = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.batch_size));
        let index = self.next_index;
        self.next_index += 1;
        debug!(phase = %R::KIND, batch = index, rows = rows.len(), "batch submitted");
        self.in_flight.spawn(persist_batch(
            Arc::clone(&self.store),
            rows,
            self.retry.clone(),
            index,
        ));

        while self.in_flight.len() >= self.max_in_flight {
            let Some(joined) = self.in_flight.join_next().await else {
                break;
            };
            self.complete(joined);
            if self.failure.is_some() {
                self.drain().await;
                return Err(self.take_failure());
            }
        }
        Ok(())
    }

    /// Flush the tail and wait for every in-flight batch.
    pub async fn finish(mut self) -> Result<WriterOutput, GenerationError> {
        self.flush().await?;
        self.drain().await;
        if self.failure.is_some() {
            return Err(self.take_failure());
        }

        let keys = self.completed.into_values().flatten().collect();
        Ok(WriterOutput {
            keys,
            batches: self.batches,
            retries: self.retries,
        })
    }

    async fn drain(&mut self) {
        while let Some(joined) = self.in_flight.join_next().await {
            self.complete(joined);
        }
    }

    fn complete(&mut self, joined: Result<BatchOutcome, JoinError>) {
        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(err) => {
                self.record_failure(1, format!("batch task aborted: {err}"));
                return;
            }
        };
        self.retries += u64::from(outcome.retries);

        match outcome.result {
            Ok(keys) => {
                self.persisted += keys.len() as u64;
                self.batches += 1;
                self.completed.insert(outcome.index, keys);
                if let Some(reporter) = &self.reporter {
                    reporter.batch_persisted(&PhaseProgress {
                        phase: R::KIND,
                        persisted: self.persisted,
                        target: self.target,
                        batch_index: self.batches,
                        batch_rows: outcome.rows as u64,
                    });
                }
            }
            Err(err) => self.record_failure(outcome.retries + 1, err.to_string()),
        }
    }

    fn record_failure(&mut self, attempts: u32, message: String) {
        if self.failure.is_none() {
            self.failure = Some(GenerationError::StorageWrite {
                phase: R::KIND,
                persisted: 0,
                attempts,
                message,
            });
        }
    }

    /// The first failure with the persisted count as of now, or an
    /// interruption when no batch failed.
    ///
    /// With several batches in flight, batches after a failed one may still
    /// commit. The reported count is the contiguous prefix of the input; rows
    /// committed past the gap are named in the message.
    fn take_failure(&mut self) -> GenerationError {
        let prefix = self.contiguous_prefix();
        match self.failure.take() {
            Some(GenerationError::StorageWrite {
                phase,
                attempts,
                mut message,
                ..
            }) => {
                let beyond = self.persisted - prefix;
                if beyond > 0 {
                    message.push_str(&format!(
                        "; {beyond} record(s) from later batches were also committed"
                    ));
                }
                GenerationError::StorageWrite {
                    phase,
                    persisted: prefix,
                    attempts,
                    message,
                }
            }
            Some(other) => other,
            None => GenerationError::Interrupted {
                phase: R::KIND,
                persisted: prefix,
            },
        }
    }

    /// Records persisted by the unbroken run of batches starting at index 0.
    fn contiguous_prefix(&self) -> u64 {
        let mut prefix = 0;
        for (expected, (index, keys)) in self.completed.iter().enumerate() {
            if *index != expected as u64 {
                break;
            }
            prefix += keys.len() as u64;
        }
        prefix
    }
}

async fn persist_batch<R: Record>(
    store: Arc<dyn RecordStore>,
    rows: Vec<R>,
    retry: RetryPolicy,
    index: u64,
) -> BatchOutcome {
    let mut attempt: u32 = 1;
    loop {
        let result = match store.insert(R::batch(&rows)).await {
            Ok(persisted) => align_keys(R::batch(&rows), persisted),
            Err(err) => Err(err),
        };

        match result {
            Ok(keys) => {
                return BatchOutcome {
                    index,
                    rows: rows.len(),
                    retries: attempt - 1,
                    result: Ok(keys),
                };
            }
            Err(err) if err.is_transient() && attempt < retry.max_attempts => {
                let delay = retry.delay_for(attempt);
                warn!(
                    phase = %R::KIND,
                    batch = index,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient batch failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                warn!(
                    phase = %R::KIND,
                    batch = index,
                    attempt,
                    error = %err,
                    "batch failed"
                );
                return BatchOutcome {
                    index,
                    rows: rows.len(),
                    retries: attempt - 1,
                    result: Err(err),
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use populate_core::{EntityKind, UserRecord};

    use super::*;
    use crate::factory::RecordFactory;
    use crate::store::InMemoryStore;

    fn users(count: u64) -> Vec<UserRecord> {
        let factory = RecordFactory::default();
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        (1..=count).map(|i| factory.user(i, &mut rng)).collect()
    }

    #[tokio::test]
    async fn empty_writer_persists_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let writer: BatchWriter<UserRecord> = BatchWriter::new(store.clone(), 4, 0);
        let output = writer.finish().await.expect("finish");
        assert!(output.keys.is_empty());
        assert_eq!(output.batches, 0);
        assert_eq!(store.insert_calls(), 0);
    }

    #[tokio::test]
    async fn concurrent_batches_keep_push_order() {
        let store = Arc::new(InMemoryStore::new());
        let mut writer = BatchWriter::new(store.clone(), 3, 20).with_max_in_flight(4);
        let records = users(20);
        for record in records.clone() {
            writer.push(record).await.expect("push");
        }
        let output = writer.finish().await.expect("finish");
        assert_eq!(output.keys.len(), 20);
        assert_eq!(output.batches, 7);

        let stored = store.users();
        for (record, key) in records.iter().zip(&output.keys) {
            let index = (key.get() - 1) as usize;
            assert_eq!(stored[index].external_id, record.external_id);
        }
        assert_eq!(store.batch_sizes(EntityKind::User).iter().sum::<usize>(), 20);
    }
}
