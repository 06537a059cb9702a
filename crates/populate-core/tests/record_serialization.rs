use populate_core::{
    ApplierRecord, ApplierSource, Coordinates, QualifiedStatus, QuestionRecord, QuestionType,
    RecordKey, SourceProduct,
};

#[test]
fn serializes_applier_deterministically() {
    let applier = ApplierRecord {
        external_id: "0b7c1f3e-2a4d-4c55-9a8e-5f1d2c3b4a69".to_string(),
        user_id: RecordKey::new(42).expect("key"),
        source: ApplierSource {
            product: SourceProduct::LinkedIn,
            is_premium: true,
        },
        qualified: QualifiedStatus::Pending,
        coordinates: Coordinates::new(-23.55052, -46.633308).expect("coords"),
    };

    let json = serde_json::to_string_pretty(&applier).expect("serialize applier");
    let expected = r#"{
  "external_id": "0b7c1f3e-2a4d-4c55-9a8e-5f1d2c3b4a69",
  "user_id": 42,
  "source": {
    "product": "LinkedIn",
    "isPremium": true
  },
  "qualified": "PENDING",
  "coordinates": {
    "latitude": -23.55052,
    "longitude": -46.633308
  }
}"#;
    assert_eq!(json, expected);
}

#[test]
fn question_type_uses_upper_case_tags() {
    let question = QuestionRecord {
        external_id: "q-1".to_string(),
        application_id: RecordKey::new(3).expect("key"),
        question: "Are you willing to relocate?".to_string(),
        question_type: QuestionType::Video,
        answer: "Yes, within the region.".to_string(),
        is_skipped: false,
    };

    let value = serde_json::to_value(&question).expect("serialize question");
    assert_eq!(value["type"], "VIDEO");
    assert_eq!(value["application_id"], 3);
}

#[test]
fn status_round_trips_through_wire_names() {
    for status in QualifiedStatus::ALL {
        let encoded = serde_json::to_string(&status).expect("encode");
        assert_eq!(encoded, format!("\"{}\"", status.as_str()));
    }
    assert!(serde_json::from_str::<QualifiedStatus>("\"MAYBE\"").is_err());
}
