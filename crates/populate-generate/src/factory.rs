use fake::Fake;
use fake::faker::lorem::en::{Paragraph, Sentence};
use fake::faker::name::en::{FirstName, LastName};
use fake::faker::phone_number::en::PhoneNumber;
use rand::Rng;
use rand::RngCore;
use rand::seq::IndexedRandom;

use populate_core::{
    ApplierRecord, ApplierSource, Coordinates, EntityKind, QualifiedStatus, QuestionRecord,
    QuestionType, Record, RecordKey, SourceProduct, UserRecord,
};

use crate::errors::GenerationError;
use crate::model::GeoSpread;

const EMAIL_DOMAIN: &str = "example.com";
const RESUME_BASE_URL: &str = "https://files.example.com/resumes";
const SKIP_PROBABILITY: f64 = 0.15;
const PREMIUM_PROBABILITY: f64 = 0.5;
/// Half-width of the square around a metro center, in degrees (~17 km).
const METRO_JITTER_DEGREES: f64 = 0.15;

const COUNTRY_CODES: &[&str] = &[
    "US", "CA", "MX", "BR", "AR", "CL", "CO", "GB", "IE", "FR", "DE", "NL", "ES", "PT", "IT",
    "PL", "SE", "NO", "FI", "IN", "JP", "KR", "SG", "AU", "NZ", "ZA", "NG", "KE", "EG", "AE",
];

struct Metro {
    latitude: f64,
    longitude: f64,
}

const fn metro(latitude: f64, longitude: f64) -> Metro {
    Metro {
        latitude,
        longitude,
    }
}

const METROS: &[Metro] = &[
    metro(40.7128, -74.0060),   // New York
    metro(34.0522, -118.2437),  // Los Angeles
    metro(41.8781, -87.6298),   // Chicago
    metro(43.6532, -79.3832),   // Toronto
    metro(19.4326, -99.1332),   // Mexico City
    metro(-23.5505, -46.6333),  // Sao Paulo
    metro(-34.6037, -58.3816),  // Buenos Aires
    metro(51.5074, -0.1278),    // London
    metro(48.8566, 2.3522),     // Paris
    metro(52.5200, 13.4050),    // Berlin
    metro(40.4168, -3.7038),    // Madrid
    metro(52.3676, 4.9041),     // Amsterdam
    metro(59.3293, 18.0686),    // Stockholm
    metro(28.6139, 77.2090),    // Delhi
    metro(12.9716, 77.5946),    // Bangalore
    metro(35.6762, 139.6503),   // Tokyo
    metro(37.5665, 126.9780),   // Seoul
    metro(1.3521, 103.8198),    // Singapore
    metro(-33.8688, 151.2093),  // Sydney
    metro(-36.8485, 174.7633),  // Auckland
    metro(-26.2041, 28.0473),   // Johannesburg
    metro(6.5244, 3.3792),      // Lagos
    metro(-1.2921, 36.8219),    // Nairobi
    metro(25.2048, 55.2708),    // Dubai
];

/// A record of any kind, as produced by [`RecordFactory::generate`].
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratedRecord {
    User(UserRecord),
    Applier(ApplierRecord),
    Question(QuestionRecord),
}

impl GeneratedRecord {
    pub fn kind(&self) -> EntityKind {
        match self {
            GeneratedRecord::User(_) => EntityKind::User,
            GeneratedRecord::Applier(_) => EntityKind::Applier,
            GeneratedRecord::Question(_) => EntityKind::Question,
        }
    }
}

macro_rules! impl_try_from_generated {
    ($record:ty, $variant:ident) => {
        impl TryFrom<GeneratedRecord> for $record {
            type Error = GeneratedRecord;

            fn try_from(value: GeneratedRecord) -> Result<Self, Self::Error> {
                match value {
                    GeneratedRecord::$variant(record) => Ok(record),
                    other => Err(other),
                }
            }
        }
    };
}

impl_try_from_generated!(UserRecord, User);
impl_try_from_generated!(ApplierRecord, Applier);
impl_try_from_generated!(QuestionRecord, Question);

/// Produces one synthetic record at a time from bounded sample pools.
///
/// Every method is a pure function of its arguments and the random stream it
/// is handed; the factory itself holds no mutable state.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordFactory {
    geo: GeoSpread,
}

impl RecordFactory {
    pub fn new(geo: GeoSpread) -> Self {
        Self { geo }
    }

    /// Generate a record of `kind`.
    ///
    /// Users must not carry a parent key; appliers and screening questions
    /// must. `ordinal` feeds the unique identity fields (the user email).
    pub fn generate<R: Rng + ?Sized>(
        &self,
        kind: EntityKind,
        ordinal: u64,
        parent: Option<RecordKey>,
        rng: &mut R,
    ) -> Result<GeneratedRecord, GenerationError> {
        match (kind, parent) {
            (EntityKind::User, None) => Ok(GeneratedRecord::User(self.user(ordinal, rng))),
            (EntityKind::User, Some(key)) => Err(GenerationError::InvalidReference(format!(
                "users have no parent, got reference {key}"
            ))),
            (EntityKind::Applier, Some(user)) => {
                Ok(GeneratedRecord::Applier(self.applier(user, rng)))
            }
            (EntityKind::Question, Some(applier)) => {
                Ok(GeneratedRecord::Question(self.question(applier, rng)))
            }
            (kind, None) => Err(GenerationError::InvalidReference(format!(
                "{kind} require a persisted parent key"
            ))),
        }
    }

    /// [`generate`](Self::generate) for the kind of `T`, unwrapped.
    pub fn generate_as<T, R>(
        &self,
        ordinal: u64,
        parent: Option<RecordKey>,
        rng: &mut R,
    ) -> Result<T, GenerationError>
    where
        T: Record + TryFrom<GeneratedRecord, Error = GeneratedRecord>,
        R: Rng + ?Sized,
    {
        self.generate(T::KIND, ordinal, parent, rng)?
            .try_into()
            .map_err(|other: GeneratedRecord| {
                GenerationError::InvalidRecord(format!(
                    "expected {}, generated {}",
                    T::KIND,
                    other.kind()
                ))
            })
    }

    pub fn user<R: Rng + ?Sized>(&self, ordinal: u64, rng: &mut R) -> UserRecord {
        let external_id = random_uuid(rng);
        let first_name: String = FirstName().fake_with_rng(rng);
        let last_name: String = LastName().fake_with_rng(rng);
        let phone: String = PhoneNumber().fake_with_rng(rng);
        let cover_letter: String = Paragraph(2..5).fake_with_rng(rng);
        let country = COUNTRY_CODES.choose(rng).copied().unwrap_or("US");

        UserRecord {
            email: format!(
                "{}.{}.{ordinal}@{EMAIL_DOMAIN}",
                slug(&first_name),
                slug(&last_name)
            ),
            resume: format!("{RESUME_BASE_URL}/{external_id}.pdf"),
            external_id,
            first_name,
            last_name,
            phone,
            cover_letter,
            country: country.to_string(),
        }
    }

    pub fn applier<R: Rng + ?Sized>(&self, user_id: RecordKey, rng: &mut R) -> ApplierRecord {
        let external_id = random_uuid(rng);
        let product = SourceProduct::ALL
            .choose(rng)
            .copied()
            .unwrap_or(SourceProduct::Internal);
        let is_premium = rng.random_bool(PREMIUM_PROBABILITY);
        let qualified = QualifiedStatus::ALL
            .choose(rng)
            .copied()
            .unwrap_or(QualifiedStatus::Pending);

        ApplierRecord {
            external_id,
            user_id,
            source: ApplierSource {
                product,
                is_premium,
            },
            qualified,
            coordinates: self.coordinates(rng),
        }
    }

    pub fn question<R: Rng + ?Sized>(
        &self,
        application_id: RecordKey,
        rng: &mut R,
    ) -> QuestionRecord {
        let external_id = random_uuid(rng);
        let sentence: String = Sentence(10..11).fake_with_rng(rng);
        let answer: String = Sentence(15..16).fake_with_rng(rng);
        let question_type = QuestionType::ALL
            .choose(rng)
            .copied()
            .unwrap_or(QuestionType::Text);

        QuestionRecord {
            external_id,
            application_id,
            question: format!("{}?", sentence.trim_end_matches('.')),
            question_type,
            answer,
            is_skipped: rng.random_bool(SKIP_PROBABILITY),
        }
    }

    fn coordinates<R: Rng + ?Sized>(&self, rng: &mut R) -> Coordinates {
        let (latitude, longitude) = match self.geo {
            GeoSpread::Global => (
                rng.random_range(-90.0..=90.0),
                rng.random_range(-180.0..=180.0),
            ),
            GeoSpread::Metro => {
                let center = &METROS[rng.random_range(0..METROS.len())];
                let latitude = center.latitude
                    + rng.random_range(-METRO_JITTER_DEGREES..=METRO_JITTER_DEGREES);
                let longitude = center.longitude
                    + rng.random_range(-METRO_JITTER_DEGREES..=METRO_JITTER_DEGREES);
                (latitude.clamp(-90.0, 90.0), wrap_longitude(longitude))
            }
        };
        Coordinates {
            latitude: round6(latitude),
            longitude: round6(longitude),
        }
    }
}

fn random_uuid<R: RngCore + ?Sized>(rng: &mut R) -> String {
    let mut bytes = [0_u8; 16];
    rng.fill_bytes(&mut bytes);
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    uuid::Uuid::from_bytes(bytes).to_string()
}

fn slug(value: &str) -> String {
    let slug: String = value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if slug.is_empty() {
        "user".to_string()
    } else {
        slug
    }
}

fn wrap_longitude(longitude: f64) -> f64 {
    if longitude > 180.0 {
        longitude - 360.0
    } else if longitude < -180.0 {
        longitude + 360.0
    } else {
        longitude
    }
}

fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use populate_core::{validate_applier, validate_question, validate_user};

    use super::*;

    fn key(value: i64) -> RecordKey {
        RecordKey::new(value).expect("key")
    }

    #[test]
    fn users_are_valid_and_emails_embed_the_ordinal() {
        let factory = RecordFactory::default();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for ordinal in 1..=200 {
            let user = factory.user(ordinal, &mut rng);
            validate_user(&user).expect("valid user");
            assert!(
                user.email.ends_with(&format!(".{ordinal}@{EMAIL_DOMAIN}")),
                "email {}",
                user.email
            );
        }
    }

    #[test]
    fn appliers_have_valid_coordinates_for_every_spread() {
        for geo in [GeoSpread::Global, GeoSpread::Metro] {
            let factory = RecordFactory::new(geo);
            let mut rng = ChaCha8Rng::seed_from_u64(5);
            for _ in 0..2_000 {
                let applier = factory.applier(key(1), &mut rng);
                validate_applier(&applier).expect("valid applier");
                assert!(QualifiedStatus::ALL.contains(&applier.qualified));
            }
        }
    }

    #[test]
    fn questions_end_with_a_question_mark() {
        let factory = RecordFactory::default();
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let question = factory.question(key(9), &mut rng);
        validate_question(&question).expect("valid question");
        assert!(question.question.ends_with('?'));
        assert!(!question.question.ends_with(".?"));
        assert_eq!(question.application_id, key(9));
    }

    #[test]
    fn same_seed_produces_same_records() {
        let factory = RecordFactory::default();
        let mut left = ChaCha8Rng::seed_from_u64(99);
        let mut right = ChaCha8Rng::seed_from_u64(99);
        assert_eq!(factory.user(1, &mut left), factory.user(1, &mut right));
        assert_eq!(
            factory.applier(key(4), &mut left),
            factory.applier(key(4), &mut right)
        );
    }

    #[test]
    fn generate_rejects_missing_or_unexpected_parents() {
        let factory = RecordFactory::default();
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let err = factory
            .generate(EntityKind::Applier, 1, None, &mut rng)
            .expect_err("applier without user");
        assert!(matches!(err, GenerationError::InvalidReference(_)));

        let err = factory
            .generate(EntityKind::Question, 1, None, &mut rng)
            .expect_err("question without applier");
        assert!(matches!(err, GenerationError::InvalidReference(_)));

        let err = factory
            .generate(EntityKind::User, 1, Some(key(3)), &mut rng)
            .expect_err("user with parent");
        assert!(matches!(err, GenerationError::InvalidReference(_)));

        let record = factory
            .generate(EntityKind::Question, 1, Some(key(3)), &mut rng)
            .expect("question");
        assert_eq!(record.kind(), EntityKind::Question);
    }

    #[test]
    fn generate_as_returns_the_typed_record() {
        let factory = RecordFactory::default();
        let mut rng = ChaCha8Rng::seed_from_u64(8);

        let user: UserRecord = factory.generate_as(7, None, &mut rng).expect("user");
        assert!(user.email.ends_with(".7@example.com"));

        let applier: ApplierRecord = factory
            .generate_as(1, Some(key(4)), &mut rng)
            .expect("applier");
        assert_eq!(applier.user_id, key(4));

        let err = factory
            .generate_as::<QuestionRecord, _>(1, None, &mut rng)
            .expect_err("question without applier");
        assert!(matches!(err, GenerationError::InvalidReference(_)));
    }

    #[test]
    fn longitude_wraps_across_the_antimeridian() {
        assert_eq!(wrap_longitude(180.5), -179.5);
        assert_eq!(wrap_longitude(-180.25), 179.75);
        assert_eq!(wrap_longitude(12.0), 12.0);
    }
}
