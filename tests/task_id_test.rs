//! Task id generation and taskcode mapping.

use atabus::adapters::sqlite::{migrated_test_pool, SqliteIdRepository};
use atabus::domain::errors::DomainError;
use atabus::domain::models::task_id::{TaskCode, TaskId};
use atabus::services::TaskIdManager;

async fn manager() -> TaskIdManager {
    TaskIdManager::new(SqliteIdRepository::new(migrated_test_pool().await))
}

#[tokio::test]
async fn test_generate_monotonic_sequence() {
    let ids = manager().await;

    let mut seen = Vec::new();
    for expected_seq in 1..=5u32 {
        let id = ids.generate("QSYS", Some("20260125"), None).await.unwrap();
        let parts = id.parts().unwrap();
        assert_eq!(parts.area, "QSYS");
        assert_eq!(parts.date, "20260125");
        assert_eq!(parts.seq, expected_seq);
        assert!(!seen.contains(&id));
        seen.push(id);
    }
    assert_eq!(seen[0].as_str(), "QSYS-20260125-001");
}

#[tokio::test]
async fn test_sequences_independent_per_date() {
    let ids = manager().await;

    let a = ids.generate("QSYS", Some("20260125"), None).await.unwrap();
    let b = ids.generate("QSYS", Some("20260126"), None).await.unwrap();
    assert_eq!(a.parts().unwrap().seq, 1);
    assert_eq!(b.parts().unwrap().seq, 1);
}

#[tokio::test]
async fn test_explicit_seq_bypasses_counter() {
    let ids = manager().await;
    let id = ids.generate("ATA", Some("20260125"), Some(77)).await.unwrap();
    assert_eq!(id.as_str(), "ATA-20260125-077");
    // counter untouched
    let next = ids.generate("ATA", Some("20260125"), None).await.unwrap();
    assert_eq!(next.parts().unwrap().seq, 1);
}

#[tokio::test]
async fn test_mapping_bijection() {
    let ids = manager().await;

    let task_id = ids.generate("QSYS", Some("20260125"), None).await.unwrap();
    let code = TaskCode::new("QSYS__20260125");
    ids.register_mapping(&code, &task_id).await.unwrap();

    let mapped_id = ids.get_task_id(code.as_str()).await.unwrap().unwrap();
    assert_eq!(mapped_id, task_id);
    let mapped_code = ids.get_taskcode(task_id.as_str()).await.unwrap().unwrap();
    assert_eq!(mapped_code.as_str(), code.as_str());

    // round trip both ways
    let back = ids
        .get_task_id(ids.get_taskcode(task_id.as_str()).await.unwrap().unwrap().as_str())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(back, task_id);
}

#[tokio::test]
async fn test_mapping_conflicts_rejected() {
    let ids = manager().await;

    let id1 = ids.generate("QSYS", Some("20260125"), None).await.unwrap();
    let id2 = ids.generate("QSYS", Some("20260125"), None).await.unwrap();
    ids.register_mapping(&TaskCode::new("CODE-A"), &id1).await.unwrap();

    // same taskcode, different id
    let err = ids.register_mapping(&TaskCode::new("CODE-A"), &id2).await.unwrap_err();
    assert!(matches!(err, DomainError::MappingConflict { .. }));

    // same id, different taskcode
    let err = ids.register_mapping(&TaskCode::new("CODE-B"), &id1).await.unwrap_err();
    assert!(matches!(err, DomainError::MappingConflict { .. }));

    // re-registering the identical pair is fine
    ids.register_mapping(&TaskCode::new("CODE-A"), &id1).await.unwrap();
}

#[tokio::test]
async fn test_ensure_task_id_parses_area_date() {
    let ids = manager().await;

    let id = ids.ensure_task_id("INTEGRATION_MVP_TEST__20260124", None).await.unwrap();
    let parts = id.parts().unwrap();
    assert_eq!(parts.area, "INTEGRATION_MVP_TEST");
    assert_eq!(parts.date, "20260124");

    // idempotent: same code returns the same id
    let again = ids.ensure_task_id("INTEGRATION_MVP_TEST__20260124", None).await.unwrap();
    assert_eq!(again, id);
}

#[tokio::test]
async fn test_migrate_taskcode_fallback() {
    let ids = manager().await;

    // no area/date structure: defaults to QSYS and an embedded date if any
    let id = ids.ensure_task_id("LEGACY-20260101-misc", None).await.unwrap();
    let parts = id.parts().unwrap();
    assert_eq!(parts.area, "QSYS");
    assert_eq!(parts.date, "20260101");

    // no date at all: today's date
    let id2 = ids.ensure_task_id("TOTALLY_FREEFORM", None).await.unwrap();
    assert!(TaskId::is_valid(id2.as_str()));
    assert_eq!(id2.parts().unwrap().area, "QSYS");
}

#[tokio::test]
async fn test_batch_migrate() {
    let ids = manager().await;
    let codes = vec!["OLD_1".to_string(), "OLD_2".to_string()];
    let migrated = ids.batch_migrate(&codes, "QSYS").await.unwrap();
    assert_eq!(migrated.len(), 2);
    assert_ne!(migrated[0].1, migrated[1].1);
    // mappings persisted
    assert_eq!(ids.get_task_id("OLD_1").await.unwrap().unwrap(), migrated[0].1);
}
