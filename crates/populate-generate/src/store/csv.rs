use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use populate_core::{
    ApplierRecord, BatchRows, DatasetCounts, EntityKind, PersistedKey, QuestionRecord, Record,
    RecordKey, RecordStore, StoreError, StoreResult, UserRecord,
};

const USER_COLUMNS: &[&str] = &[
    "id",
    "external_id",
    "first_name",
    "last_name",
    "email",
    "phone",
    "resume",
    "cover_letter",
    "country",
];
const APPLIER_COLUMNS: &[&str] = &[
    "id",
    "external_id",
    "user_id",
    "source",
    "qualified",
    "latitude",
    "longitude",
];
const QUESTION_COLUMNS: &[&str] = &[
    "id",
    "external_id",
    "application_id",
    "question",
    "type",
    "answer",
    "is_skipped",
];

type TableWriter = csv::Writer<CountingWriter<BufWriter<File>>>;

struct CsvTable {
    path: PathBuf,
    columns: &'static [&'static str],
    writer: TableWriter,
    by_external: HashMap<String, RecordKey>,
    rows: u64,
}

impl CsvTable {
    fn create(path: PathBuf, columns: &'static [&'static str]) -> Result<Self, csv::Error> {
        let writer = open_writer(&path, columns)?;
        Ok(Self {
            path,
            columns,
            writer,
            by_external: HashMap::new(),
            rows: 0,
        })
    }

    fn truncate(&mut self) -> Result<(), csv::Error> {
        self.writer = open_writer(&self.path, self.columns)?;
        self.by_external.clear();
        self.rows = 0;
        Ok(())
    }

    fn contains(&self, key: RecordKey) -> bool {
        u64::try_from(key.get()).is_ok_and(|index| index <= self.rows)
    }

    /// Append rows whose natural key is new; return one key per input row.
    fn append<T: Record>(
        &mut self,
        rows: &[T],
        record: impl Fn(i64, &T) -> StoreResult<Vec<String>>,
    ) -> StoreResult<Vec<PersistedKey>> {
        let mut persisted = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.external_id();
            let key = match self.by_external.get(id) {
                Some(key) => *key,
                None => {
                    let key = RecordKey::new(self.rows as i64 + 1)
                        .map_err(|err| StoreError::Fatal(err.to_string()))?;
                    self.writer
                        .write_record(record(key.get(), row)?)
                        .map_err(write_error)?;
                    self.rows += 1;
                    self.by_external.insert(id.to_string(), key);
                    key
                }
            };
            persisted.push(PersistedKey {
                external_id: id.to_string(),
                key,
            });
        }
        self.writer.flush().map_err(|err| write_error(err.into()))?;
        Ok(persisted)
    }

    fn bytes_written(&self) -> u64 {
        self.writer.get_ref().bytes_written()
    }
}

struct Tables {
    users: CsvTable,
    appliers: CsvTable,
    questions: CsvTable,
}

/// Writes the dataset as one CSV file per table, with keys assigned
/// sequentially from 1 the way a fresh identity column would.
pub struct CsvStore {
    dir: PathBuf,
    tables: Mutex<Tables>,
}

impl CsvStore {
    /// Create (or truncate) `users.csv`, `appliers.csv` and
    /// `screening_questions.csv` under `dir`.
    pub fn create(dir: &Path) -> Result<Self, csv::Error> {
        std::fs::create_dir_all(dir).map_err(csv::Error::from)?;
        let tables = Tables {
            users: CsvTable::create(table_path(dir, EntityKind::User), USER_COLUMNS)?,
            appliers: CsvTable::create(table_path(dir, EntityKind::Applier), APPLIER_COLUMNS)?,
            questions: CsvTable::create(table_path(dir, EntityKind::Question), QUESTION_COLUMNS)?,
        };
        Ok(Self {
            dir: dir.to_path_buf(),
            tables: Mutex::new(tables),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `kind`.
    pub fn table_path(&self, kind: EntityKind) -> PathBuf {
        table_path(&self.dir, kind)
    }

    /// Bytes written across all three files since the last reset.
    pub fn bytes_written(&self) -> u64 {
        let tables = self.lock();
        tables.users.bytes_written()
            + tables.appliers.bytes_written()
            + tables.questions.bytes_written()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert_now(&self, rows: BatchRows<'_>) -> StoreResult<Vec<PersistedKey>> {
        let mut tables = self.lock();
        match rows {
            BatchRows::Users(rows) => tables.users.append(rows, user_record),
            BatchRows::Appliers(rows) => {
                if let Some(row) = rows.iter().find(|row| !tables.users.contains(row.user_id)) {
                    return Err(dangling(EntityKind::Applier, row.user_id));
                }
                tables.appliers.append(rows, applier_record)
            }
            BatchRows::Questions(rows) => {
                if let Some(row) = rows
                    .iter()
                    .find(|row| !tables.appliers.contains(row.application_id))
                {
                    return Err(dangling(EntityKind::Question, row.application_id));
                }
                tables.questions.append(rows, question_record)
            }
        }
    }
}

#[async_trait]
impl RecordStore for CsvStore {
    fn engine(&self) -> &'static str {
        "csv"
    }

    async fn insert(&self, rows: BatchRows<'_>) -> StoreResult<Vec<PersistedKey>> {
        self.insert_now(rows)
    }

    async fn reset(&self) -> StoreResult<()> {
        let mut tables = self.lock();
        tables.users.truncate().map_err(write_error)?;
        tables.appliers.truncate().map_err(write_error)?;
        tables.questions.truncate().map_err(write_error)?;
        Ok(())
    }

    async fn counts(&self) -> StoreResult<DatasetCounts> {
        let tables = self.lock();
        Ok(DatasetCounts {
            users: tables.users.rows,
            appliers: tables.appliers.rows,
            questions: tables.questions.rows,
        })
    }
}

fn table_path(dir: &Path, kind: EntityKind) -> PathBuf {
    dir.join(format!("{}.csv", kind.phase()))
}

fn open_writer(path: &Path, columns: &[&str]) -> Result<TableWriter, csv::Error> {
    let file = BufWriter::new(File::create(path).map_err(csv::Error::from)?);
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(CountingWriter::new(file));
    writer.write_record(columns)?;
    writer.flush()?;
    Ok(writer)
}

fn user_record(id: i64, row: &UserRecord) -> StoreResult<Vec<String>> {
    Ok(vec![
        id.to_string(),
        row.external_id.clone(),
        row.first_name.clone(),
        row.last_name.clone(),
        row.email.clone(),
        row.phone.clone(),
        row.resume.clone(),
        row.cover_letter.clone(),
        row.country.clone(),
    ])
}

fn applier_record(id: i64, row: &ApplierRecord) -> StoreResult<Vec<String>> {
    let source = serde_json::to_string(&row.source)
        .map_err(|err| StoreError::Fatal(format!("failed to encode applier source: {err}")))?;
    Ok(vec![
        id.to_string(),
        row.external_id.clone(),
        row.user_id.to_string(),
        source,
        row.qualified.as_str().to_string(),
        format!("{:.6}", row.coordinates.latitude),
        format!("{:.6}", row.coordinates.longitude),
    ])
}

fn question_record(id: i64, row: &QuestionRecord) -> StoreResult<Vec<String>> {
    Ok(vec![
        id.to_string(),
        row.external_id.clone(),
        row.application_id.to_string(),
        row.question.clone(),
        row.question_type.as_str().to_string(),
        row.answer.clone(),
        row.is_skipped.to_string(),
    ])
}

fn dangling(kind: EntityKind, key: RecordKey) -> StoreError {
    StoreError::Fatal(format!(
        "foreign key violation: {kind} row references missing parent {key}"
    ))
}

fn write_error(err: csv::Error) -> StoreError {
    StoreError::Fatal(format!("csv write failed: {err}"))
}

struct CountingWriter<W: Write> {
    inner: W,
    bytes: u64,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, bytes: 0 }
    }

    fn bytes_written(&self) -> u64 {
        self.bytes
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let size = self.inner.write(buf)?;
        self.bytes = self.bytes.saturating_add(size as u64);
        Ok(size)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
