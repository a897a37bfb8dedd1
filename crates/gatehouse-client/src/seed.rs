//! Starter data for empty deployments.
//!
//! Each collection is seeded with one batched write, and only when it has no
//! documents at all; re-running is harmless.

use gatehouse_types::{Fields, Personnel, PersonnelStatus, Visitor, VisitorStatus};
use serde::Serialize;
use tracing::info;

use crate::constants::{PERSONNEL_COLLECTION, VISITORS_COLLECTION};
use crate::error::StoreError;
use crate::reference::Reference;
use crate::store::{DocumentStore, SetMode, WriteBatch};

/// What happened to one collection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeedOutcome {
    /// Wrote this many documents.
    Seeded(usize),
    /// Collection already had documents.
    Skipped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SeedReport {
    pub personnel: SeedOutcome,
    pub visitors: SeedOutcome,
}

fn visitor(id: &str, name: &str, host: &str, time_in: &str, status: VisitorStatus) -> Visitor {
    Visitor {
        id: id.into(),
        name: name.into(),
        photo_id: Some(format!("visitor-{}", id.trim_start_matches('v'))),
        visiting_personnel_id: host.into(),
        time_in: time_in.into(),
        status,
    }
}

pub fn starter_personnel() -> Vec<Personnel> {
    vec![
        Personnel {
            id: "p1".into(),
            name: "Clinton Giri".into(),
            rank: "Cadet".into(),
            force_id: "F1234".into(),
            department: "Training Wing".into(),
            facility: "Military Camp Alpha".into(),
            block: "Upper Block".into(),
            room: "Room 12".into(),
            status: PersonnelStatus::Active,
            user_id: None,
        },
        Personnel {
            id: "p2".into(),
            name: "Sonia Sharma".into(),
            rank: "Sergeant".into(),
            force_id: "F5678".into(),
            department: "Logistics".into(),
            facility: "Military Camp Alpha".into(),
            block: "Lower Block".into(),
            room: "Room 3".into(),
            status: PersonnelStatus::Active,
            user_id: None,
        },
        Personnel {
            id: "p3".into(),
            name: "Amit Kumar".into(),
            rank: "Officer".into(),
            force_id: "F9012".into(),
            department: "Command".into(),
            facility: "Military Camp Alpha".into(),
            block: "Admin Building".into(),
            room: "Office 1".into(),
            status: PersonnelStatus::Active,
            user_id: None,
        },
        Personnel {
            id: "p4".into(),
            name: "Ravi Singh".into(),
            rank: "Teacher".into(),
            force_id: "T3456".into(),
            department: "Science".into(),
            facility: "Central School".into(),
            block: "Main Building".into(),
            room: "Class 10A".into(),
            status: PersonnelStatus::Active,
            user_id: None,
        },
    ]
}

pub fn starter_visitors() -> Vec<Visitor> {
    vec![
        visitor("v1", "John Doe", "p1", "14:00", VisitorStatus::OnSite),
        visitor("v2", "Jane Smith", "p2", "13:30", VisitorStatus::OnSite),
        visitor("v3", "Peter Jones", "p1", "10:00", VisitorStatus::Overstaying),
    ]
}

fn to_fields<T: Serialize>(record: &T) -> Result<Fields, StoreError> {
    match serde_json::to_value(record) {
        Ok(serde_json::Value::Object(fields)) => Ok(fields),
        Ok(_) => Err(StoreError::Malformed("record did not serialize to an object".into())),
        Err(e) => Err(StoreError::Malformed(e.to_string())),
    }
}

async fn seed_collection<T: Serialize>(
    store: &dyn DocumentStore,
    collection: &str,
    records: &[(String, T)],
) -> Result<SeedOutcome, StoreError> {
    let target = Reference::collection(collection)?;
    if !store.get(&target).await?.is_empty() {
        info!("{} already has documents; skipping seed", collection);
        return Ok(SeedOutcome::Skipped);
    }

    let mut batch = WriteBatch::new();
    for (id, record) in records {
        batch = batch.set(target.doc(id)?, to_fields(record)?, SetMode::Overwrite);
    }
    store.commit(batch).await?;
    info!("Seeded {} with {} documents", collection, records.len());
    Ok(SeedOutcome::Seeded(records.len()))
}

/// Seed `personnel` and `visitors` with the starter set where empty.
pub async fn seed(store: &dyn DocumentStore) -> Result<SeedReport, StoreError> {
    let personnel: Vec<_> = starter_personnel().into_iter().map(|p| (p.id.clone(), p)).collect();
    let visitors: Vec<_> = starter_visitors().into_iter().map(|v| (v.id.clone(), v)).collect();
    Ok(SeedReport {
        personnel: seed_collection(store, PERSONNEL_COLLECTION, &personnel).await?,
        visitors: seed_collection(store, VISITORS_COLLECTION, &visitors).await?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryStore;
    use crate::error::Operation;
    use crate::store::Snapshot;
    use gatehouse_types::FromDocument;

    #[tokio::test]
    async fn test_seed_fills_empty_collections_once() {
        let store = MemoryStore::new();
        let report = seed(&store).await.unwrap();
        assert_eq!(report.personnel, SeedOutcome::Seeded(4));
        assert_eq!(report.visitors, SeedOutcome::Seeded(3));
        assert_eq!(store.commit_count(), 2);

        let again = seed(&store).await.unwrap();
        assert_eq!(again.personnel, SeedOutcome::Skipped);
        assert_eq!(again.visitors, SeedOutcome::Skipped);
        assert_eq!(store.commit_count(), 2);
    }

    #[tokio::test]
    async fn test_seeded_documents_decode() {
        let store = MemoryStore::new();
        seed(&store).await.unwrap();
        let Snapshot::Query(docs) = store.get(&Reference::collection("visitors").unwrap()).await.unwrap() else {
            panic!("expected query snapshot");
        };
        let ids: Vec<_> = docs.iter().map(|d| d.id().to_string()).collect();
        assert_eq!(ids, ["v1", "v2", "v3"]);

        let v3 = Visitor::from_document("visitors", "v3", docs[2].fields.as_ref().unwrap()).unwrap();
        assert_eq!(v3.status, VisitorStatus::Overstaying);
        assert_eq!(v3.photo_id.as_deref(), Some("visitor-3"));
    }

    #[test]
    fn test_starter_personnel_fields_land_in_place() {
        let people = starter_personnel();
        let ravi = people.iter().find(|p| p.id == "p4").unwrap();
        assert_eq!(
            (ravi.rank.as_str(), ravi.force_id.as_str(), ravi.department.as_str()),
            ("Teacher", "T3456", "Science")
        );
        assert_eq!(
            (ravi.facility.as_str(), ravi.block.as_str(), ravi.room.as_str()),
            ("Central School", "Main Building", "Class 10A")
        );
        assert!(people.iter().all(|p| p.status == PersonnelStatus::Active && p.user_id.is_none()));
    }

    #[tokio::test]
    async fn test_partial_seed_skips_populated_collection() {
        let store = MemoryStore::new();
        let existing = Reference::document("personnel/x1").unwrap();
        store
            .commit(WriteBatch::new().set(existing, Fields::new(), SetMode::Overwrite))
            .await
            .unwrap();
        let report = seed(&store).await.unwrap();
        assert_eq!(report.personnel, SeedOutcome::Skipped);
        assert_eq!(report.visitors, SeedOutcome::Seeded(3));
    }

    #[tokio::test]
    async fn test_seed_surfaces_store_errors() {
        let store = MemoryStore::new();
        store.deny("personnel", Operation::Create);
        let err = seed(&store).await.unwrap_err();
        assert!(matches!(err, StoreError::PermissionDenied(_)));
        assert_eq!(store.document(&Reference::document("personnel/p1").unwrap()), None);
    }
}
