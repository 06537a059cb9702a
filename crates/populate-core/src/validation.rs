use crate::error::{Error, Result};
use crate::record::{ApplierRecord, QuestionRecord, UserRecord};

/// Validate field-level invariants of a user record.
///
/// This checks:
/// - the natural key and identity fields are present
/// - the email has a local part and a domain
/// - the country is a two-letter code
pub fn validate_user(user: &UserRecord) -> Result<()> {
    require_external_id("user", &user.external_id)?;

    for (field, value) in [
        ("first_name", &user.first_name),
        ("last_name", &user.last_name),
        ("phone", &user.phone),
    ] {
        if value.trim().is_empty() {
            return Err(Error::InvalidRecord(format!(
                "user {}: {field} is empty",
                user.external_id
            )));
        }
    }

    match user.email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => {}
        _ => {
            return Err(Error::InvalidRecord(format!(
                "user {}: malformed email '{}'",
                user.external_id, user.email
            )));
        }
    }

    if user.country.len() != 2 || !user.country.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(Error::InvalidRecord(format!(
            "user {}: country '{}' is not an ISO alpha-2 code",
            user.external_id, user.country
        )));
    }

    Ok(())
}

/// Validate field-level invariants of an applier record.
pub fn validate_applier(applier: &ApplierRecord) -> Result<()> {
    require_external_id("applier", &applier.external_id)?;
    if !applier.coordinates.is_valid() {
        return Err(Error::InvalidRecord(format!(
            "applier {}: coordinates out of range ({}, {})",
            applier.external_id, applier.coordinates.latitude, applier.coordinates.longitude
        )));
    }
    Ok(())
}

/// Validate field-level invariants of a screening question record.
pub fn validate_question(question: &QuestionRecord) -> Result<()> {
    require_external_id("screening question", &question.external_id)?;
    if question.question.trim().is_empty() {
        return Err(Error::InvalidRecord(format!(
            "screening question {}: empty question text",
            question.external_id
        )));
    }
    Ok(())
}

fn require_external_id(kind: &str, external_id: &str) -> Result<()> {
    if external_id.trim().is_empty() {
        return Err(Error::InvalidRecord(format!("{kind}: missing external_id")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ApplierSource, Coordinates, QualifiedStatus, RecordKey, SourceProduct};

    fn user() -> UserRecord {
        UserRecord {
            external_id: "u-1".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada.lovelace.1@example.com".to_string(),
            phone: "555-0100".to_string(),
            resume: "https://files.example.com/resumes/u-1.pdf".to_string(),
            cover_letter: "Dear hiring manager".to_string(),
            country: "GB".to_string(),
        }
    }

    #[test]
    fn accepts_well_formed_user() {
        assert!(validate_user(&user()).is_ok());
    }

    #[test]
    fn rejects_bad_email_and_country() {
        let mut bad_email = user();
        bad_email.email = "nobody".to_string();
        assert!(validate_user(&bad_email).is_err());

        let mut bad_country = user();
        bad_country.country = "gbr".to_string();
        assert!(validate_user(&bad_country).is_err());
    }

    #[test]
    fn rejects_applier_with_invalid_coordinates() {
        let applier = ApplierRecord {
            external_id: "a-1".to_string(),
            user_id: RecordKey::new(1).expect("key"),
            source: ApplierSource {
                product: SourceProduct::Internal,
                is_premium: true,
            },
            qualified: QualifiedStatus::Yes,
            coordinates: Coordinates {
                latitude: 91.0,
                longitude: 0.0,
            },
        };
        assert!(validate_applier(&applier).is_err());
    }
}
