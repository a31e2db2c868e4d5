//! Tests for record types, patches, and change notifications.

use crate::record::{
    now_millis, FieldKind, RecordId, Role, TaskPatch, TaskRecord, UserRecord,
};

#[test]
fn test_record_ids_are_unique() {
    let a = RecordId::generate();
    let b = RecordId::generate();
    assert_ne!(a, b);
}

#[test]
fn test_record_id_serde_is_transparent() {
    let id = RecordId::generate();
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, format!("\"{id}\""));
    let back: RecordId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}

#[test]
fn test_new_task_has_matching_timestamps() {
    let before = now_millis();
    let task = TaskRecord::new("slab", "structural", "concrete", "pour slab");
    assert_eq!(task.created_at, task.updated_at);
    assert!(task.created_at >= before);
}

#[test]
fn test_task_validation_rejects_blank_facets() {
    let mut task = TaskRecord::new("t", "structural", "concrete", "desc");
    task.validate().unwrap();

    task.discipline = String::new();
    assert!(task.validate().is_err());

    task.discipline = "structural".to_string();
    task.resource_type = "   ".to_string();
    assert!(task.validate().is_err());
}

#[test]
fn test_patch_affected_fields() {
    let patch = TaskPatch::default();
    assert!(patch.affected_fields().is_empty());

    let patch = TaskPatch {
        description: Some("new".to_string()),
        resource_type: Some("steel".to_string()),
        ..TaskPatch::default()
    };
    let fields = patch.affected_fields();
    assert!(fields.contains(&FieldKind::Description));
    assert!(fields.contains(&FieldKind::ResourceType));
    assert!(!fields.contains(&FieldKind::Discipline));
}

#[test]
fn test_patch_name_only_touches_no_indexed_field() {
    let patch = TaskPatch {
        name: Some("renamed".to_string()),
        ..TaskPatch::default()
    };
    assert!(patch.affected_fields().is_empty());
}

#[test]
fn test_patch_apply_bumps_updated_at() {
    let mut task = TaskRecord::new("t", "structural", "concrete", "desc");
    let original = task.updated_at;
    std::thread::sleep(std::time::Duration::from_millis(2));

    let patch = TaskPatch {
        description: Some("new description".to_string()),
        ..TaskPatch::default()
    };
    patch.apply_to(&mut task);

    assert_eq!(task.description, "new description");
    assert!(task.updated_at > original);
}

#[test]
fn test_field_kind_extracts_values() {
    let task = TaskRecord::new("t", "structural", "concrete", "pour slab");
    assert_eq!(FieldKind::Description.value_of(&task), "pour slab");
    assert_eq!(FieldKind::Discipline.value_of(&task), "structural");
    assert_eq!(FieldKind::ResourceType.value_of(&task), "concrete");
}

#[test]
fn test_role_serde_kebab_case() {
    assert_eq!(serde_json::to_string(&Role::Owner).unwrap(), "\"owner\"");
    assert_eq!(
        serde_json::to_string(&Role::ReadOnly).unwrap(),
        "\"read-only\""
    );
    let role: Role = serde_json::from_str("\"read-only\"").unwrap();
    assert_eq!(role, Role::ReadOnly);
}

#[test]
fn test_user_record_roundtrip() {
    let user = UserRecord::new("chef", "chef@site.fr", Role::Owner);
    let json = serde_json::to_string(&user).unwrap();
    let back: UserRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(back, user);
}
