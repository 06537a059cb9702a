use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};

use populate_core::{ApplierRecord, QuestionRecord, UserRecord};

/// Bind parameters PostgreSQL accepts in a single statement.
pub const MAX_BIND_PARAMS: usize = 65_535;

pub const USER_BINDS: usize = 8;
pub const APPLIER_BINDS: usize = 6;
pub const APPLIER_BINDS_POSTGIS: usize = 8;
pub const QUESTION_BINDS: usize = 6;

pub const CREATE_USER_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS appliers_user (
  id BIGSERIAL PRIMARY KEY,
  external_id UUID NOT NULL UNIQUE,
  first_name VARCHAR(100) NOT NULL,
  last_name VARCHAR(100) NOT NULL,
  email VARCHAR(254) NOT NULL,
  phone VARCHAR(64) NOT NULL,
  resume VARCHAR(255) NOT NULL,
  cover_letter TEXT NOT NULL,
  country VARCHAR(2) NOT NULL,
  created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
  updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

pub const CREATE_APPLIER_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS appliers_applier (
  id BIGSERIAL PRIMARY KEY,
  external_id UUID NOT NULL UNIQUE,
  user_id BIGINT NOT NULL REFERENCES appliers_user (id) DEFERRABLE INITIALLY DEFERRED,
  source JSONB NOT NULL,
  qualified VARCHAR(7) NOT NULL DEFAULT 'PENDING'
    CHECK (qualified IN ('PENDING', 'YES', 'NO')),
  latitude NUMERIC(9, 6) NOT NULL,
  longitude NUMERIC(9, 6) NOT NULL,
  created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
  updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

pub const CREATE_QUESTION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS appliers_screeningquestion (
  id BIGSERIAL PRIMARY KEY,
  external_id UUID NOT NULL UNIQUE,
  application_id BIGINT NOT NULL REFERENCES appliers_applier (id) DEFERRABLE INITIALLY DEFERRED,
  question TEXT NOT NULL,
  type VARCHAR(5) NOT NULL CHECK (type IN ('TEXT', 'VIDEO', 'FILE')),
  answer TEXT NOT NULL,
  is_skipped BOOLEAN NOT NULL DEFAULT FALSE,
  created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
  updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

/// Tables created by the serving application have neither a unique natural
/// key nor (for screening questions) an `external_id` column; the upserts
/// below need both.
pub const ENSURE_NATURAL_KEYS: &[&str] = &[
    "ALTER TABLE appliers_user ADD COLUMN IF NOT EXISTS external_id UUID",
    "ALTER TABLE appliers_applier ADD COLUMN IF NOT EXISTS external_id UUID",
    "ALTER TABLE appliers_screeningquestion ADD COLUMN IF NOT EXISTS external_id UUID",
    "CREATE UNIQUE INDEX IF NOT EXISTS appliers_user_external_id_uniq \
     ON appliers_user (external_id)",
    "CREATE UNIQUE INDEX IF NOT EXISTS appliers_applier_external_id_uniq \
     ON appliers_applier (external_id)",
    "CREATE UNIQUE INDEX IF NOT EXISTS appliers_screeningquestion_external_id_uniq \
     ON appliers_screeningquestion (external_id)",
];

pub const CREATE_FOREIGN_KEY_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS appliers_applier_user_id_idx ON appliers_applier (user_id)",
    "CREATE INDEX IF NOT EXISTS appliers_screeningquestion_application_id_idx \
     ON appliers_screeningquestion (application_id)",
];

pub const ENABLE_POSTGIS: &[&str] = &[
    "CREATE EXTENSION IF NOT EXISTS postgis",
    "ALTER TABLE appliers_applier ADD COLUMN IF NOT EXISTS location geography(Point, 4326)",
    "CREATE INDEX IF NOT EXISTS appliers_applier_location_idx \
     ON appliers_applier USING GIST (location)",
];

pub const TRUNCATE_ALL: &str = "TRUNCATE appliers_screeningquestion, appliers_applier, appliers_user \
     RESTART IDENTITY CASCADE";

pub const COUNT_ALL: &str = r#"
SELECT
  (SELECT count(*) FROM appliers_user) AS users,
  (SELECT count(*) FROM appliers_applier) AS appliers,
  (SELECT count(*) FROM appliers_screeningquestion) AS questions
"#;

const NOW: &str = "now()";

/// Existing rows are matched on `external_id` and returned unchanged.
const UPSERT_TAIL: &str =
    " ON CONFLICT (external_id) DO UPDATE SET external_id = EXCLUDED.external_id \
     RETURNING id, external_id::text";

pub async fn insert_users(pool: &PgPool, rows: &[UserRecord]) -> sqlx::Result<Vec<(i64, String)>> {
    let mut builder = users_query(rows);
    builder
        .build_query_as::<(i64, String)>()
        .fetch_all(pool)
        .await
}

/// Timestamps are written explicitly; Django's `auto_now` columns carry no
/// database default.
fn users_query(rows: &[UserRecord]) -> QueryBuilder<'_, Postgres> {
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "INSERT INTO appliers_user \
         (external_id, first_name, last_name, email, phone, resume, cover_letter, country, \
         created_at, updated_at) ",
    );
    builder.push_values(rows, |mut b, row| {
        b.push_bind(&row.external_id)
            .push_unseparated("::uuid")
            .push_bind(&row.first_name)
            .push_bind(&row.last_name)
            .push_bind(&row.email)
            .push_bind(&row.phone)
            .push_bind(&row.resume)
            .push_bind(&row.cover_letter)
            .push_bind(&row.country)
            .push(NOW)
            .push(NOW);
    });
    builder.push(UPSERT_TAIL);
    builder
}

pub async fn insert_appliers(
    pool: &PgPool,
    rows: &[ApplierRecord],
    postgis: bool,
) -> sqlx::Result<Vec<(i64, String)>> {
    let mut builder = appliers_query(rows, postgis);
    builder
        .build_query_as::<(i64, String)>()
        .fetch_all(pool)
        .await
}

fn appliers_query(rows: &[ApplierRecord], postgis: bool) -> QueryBuilder<'_, Postgres> {
    let columns = if postgis {
        "(external_id, user_id, source, qualified, latitude, longitude, created_at, updated_at, \
         location) "
    } else {
        "(external_id, user_id, source, qualified, latitude, longitude, created_at, updated_at) "
    };
    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new(format!("INSERT INTO appliers_applier {columns}"));
    builder.push_values(rows, |mut b, row| {
        let latitude = row.coordinates.latitude;
        let longitude = row.coordinates.longitude;
        b.push_bind(&row.external_id)
            .push_unseparated("::uuid")
            .push_bind(row.user_id.get())
            .push_bind(Json(&row.source))
            .push_bind(row.qualified.as_str())
            .push_bind(latitude)
            .push_unseparated("::numeric(9, 6)")
            .push_bind(longitude)
            .push_unseparated("::numeric(9, 6)")
            .push(NOW)
            .push(NOW);
        if postgis {
            b.push("ST_SetSRID(ST_MakePoint(")
                .push_bind_unseparated(longitude)
                .push_unseparated(", ")
                .push_bind_unseparated(latitude)
                .push_unseparated("), 4326)::geography");
        }
    });
    builder.push(UPSERT_TAIL);
    builder
}

pub async fn insert_questions(
    pool: &PgPool,
    rows: &[QuestionRecord],
) -> sqlx::Result<Vec<(i64, String)>> {
    let mut builder = questions_query(rows);
    builder
        .build_query_as::<(i64, String)>()
        .fetch_all(pool)
        .await
}

fn questions_query(rows: &[QuestionRecord]) -> QueryBuilder<'_, Postgres> {
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "INSERT INTO appliers_screeningquestion \
         (external_id, application_id, question, type, answer, is_skipped, created_at, \
         updated_at) ",
    );
    builder.push_values(rows, |mut b, row| {
        b.push_bind(&row.external_id)
            .push_unseparated("::uuid")
            .push_bind(row.application_id.get())
            .push_bind(&row.question)
            .push_bind(row.question_type.as_str())
            .push_bind(&row.answer)
            .push_bind(row.is_skipped)
            .push(NOW)
            .push(NOW);
    });
    builder.push(UPSERT_TAIL);
    builder
}

#[cfg(test)]
mod tests {
    use populate_core::{
        ApplierSource, Coordinates, QualifiedStatus, QuestionType, RecordKey, SourceProduct,
    };

    use super::*;

    fn key(value: i64) -> RecordKey {
        RecordKey::new(value).expect("key")
    }

    fn applier() -> ApplierRecord {
        ApplierRecord {
            external_id: "8d0c6a1e-3f7b-4c55-9d3a-0f1b2c3d4e5f".to_string(),
            user_id: key(1),
            source: ApplierSource {
                product: SourceProduct::LinkedIn,
                is_premium: true,
            },
            qualified: QualifiedStatus::Pending,
            coordinates: Coordinates::new(40.7128, -74.006).expect("coords"),
        }
    }

    #[test]
    fn inserts_write_timestamps_without_column_defaults() {
        let users = vec![UserRecord {
            external_id: "1b4e28ba-2fa1-4d3b-a3f5-ef19b5a7633b".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada.lovelace.1@example.com".to_string(),
            phone: "555-0100".to_string(),
            resume: "https://files.example.com/resumes/1.pdf".to_string(),
            cover_letter: "Hello.".to_string(),
            country: "GB".to_string(),
        }];
        let questions = vec![QuestionRecord {
            external_id: "c56a4180-65aa-42ec-a945-5fd21dec0538".to_string(),
            application_id: key(1),
            question: "Why us?".to_string(),
            question_type: QuestionType::Text,
            answer: "Because.".to_string(),
            is_skipped: false,
        }];
        let appliers = vec![applier()];

        let sql = [
            users_query(&users).sql().to_string(),
            appliers_query(&appliers, false).sql().to_string(),
            questions_query(&questions).sql().to_string(),
        ];
        for sql in &sql {
            assert!(sql.contains("created_at, updated_at"), "{sql}");
            assert!(sql.contains("now(), now()"), "{sql}");
            assert!(sql.contains("ON CONFLICT (external_id)"), "{sql}");
        }
    }

    #[test]
    fn spatial_inserts_append_the_location_last() {
        let appliers = vec![applier()];
        let sql = appliers_query(&appliers, true).sql().to_string();
        assert!(sql.contains("updated_at, location)"), "{sql}");
        assert!(sql.contains("now(), now(), ST_SetSRID(ST_MakePoint("), "{sql}");
    }

    #[test]
    fn every_table_gets_a_unique_natural_key() {
        for table in [
            "appliers_user",
            "appliers_applier",
            "appliers_screeningquestion",
        ] {
            let unique_index = format!("ON {table} (external_id)");
            let add_column = format!("ALTER TABLE {table} ADD COLUMN IF NOT EXISTS external_id");
            assert!(
                ENSURE_NATURAL_KEYS
                    .iter()
                    .any(|sql| sql.starts_with("CREATE UNIQUE INDEX") && sql.contains(&unique_index))
            );
            assert!(
                ENSURE_NATURAL_KEYS
                    .iter()
                    .any(|sql| sql.starts_with(&add_column))
            );
        }
    }
}
