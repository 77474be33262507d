use chrono::{TimeZone, Utc};
use notedesk_core::{NoteDraft, NoteId, NoteRecord, ValidationError};
use serde_json::json;

#[test]
fn wire_record_uses_camel_case_timestamps() {
    let record: NoteRecord = serde_json::from_value(json!({
        "id": 7,
        "title": "Weekly plan",
        "content": "- [ ] ship export",
        "createdAt": "2024-03-01T09:00:00Z",
        "updatedAt": "2024-03-02T10:30:00Z"
    }))
    .unwrap();

    assert_eq!(record.id, NoteId(7));
    assert_eq!(record.title, "Weekly plan");
    assert_eq!(
        record.created_at,
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    );

    let encoded = serde_json::to_value(&record).unwrap();
    assert_eq!(encoded["createdAt"], "2024-03-01T09:00:00Z");
    assert_eq!(encoded["updatedAt"], "2024-03-02T10:30:00Z");
    assert!(encoded.get("created_at").is_none());
}

#[test]
fn missing_content_defaults_to_empty() {
    let record: NoteRecord = serde_json::from_value(json!({
        "id": 1,
        "title": "empty",
        "createdAt": "2024-03-01T09:00:00Z",
        "updatedAt": "2024-03-01T09:00:00Z"
    }))
    .unwrap();
    assert_eq!(record.content, "");
    assert_eq!(record.preview(), None);
}

#[test]
fn wire_record_with_updated_before_created_is_rejected() {
    let result = serde_json::from_value::<NoteRecord>(json!({
        "id": 3,
        "title": "time travel",
        "content": "",
        "createdAt": "2024-03-02T00:00:00Z",
        "updatedAt": "2024-03-01T00:00:00Z"
    }));
    assert!(result.is_err());
}

#[test]
fn wire_record_with_non_positive_id_is_rejected() {
    let result = serde_json::from_value::<NoteRecord>(json!({
        "id": 0,
        "title": "ghost",
        "createdAt": "2024-03-01T00:00:00Z",
        "updatedAt": "2024-03-01T00:00:00Z"
    }));
    assert!(result.is_err());
}

#[test]
fn draft_validation_trims_title_and_keeps_content() {
    let payload = NoteDraft::new("  Groceries  ", "  | a | b |\n")
        .validated()
        .unwrap();
    assert_eq!(payload.title, "Groceries");
    assert_eq!(payload.content, "  | a | b |\n");

    assert_eq!(
        NoteDraft::new(" \t\n", "body").validated().unwrap_err(),
        ValidationError::EmptyTitle
    );
}

#[test]
fn preview_strips_markdown_symbols() {
    let record: NoteRecord = serde_json::from_value(json!({
        "id": 2,
        "title": "links",
        "content": "# Heading\n\nSee [the docs](https://example.com) and **bold** text.",
        "createdAt": "2024-03-01T00:00:00Z",
        "updatedAt": "2024-03-01T00:00:00Z"
    }))
    .unwrap();

    let preview = record.preview().unwrap();
    assert!(preview.contains("the docs"));
    assert!(!preview.contains("https://"));
    assert!(!preview.contains('#'));
    assert!(!preview.contains('*'));
}
