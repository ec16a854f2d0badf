//! Postgres-backed integration tests.
//!
//! These are ignored by default and are intended to run in CI (or locally)
//! with `DATABASE_URL` set.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use provenance_registry::crypto::compute_fingerprint;
use provenance_registry::domain::{
    ContentMetadata, LedgerReceipt, OwnerId, ProofRecord, ProofStatus, RegistrationOutcome,
};
use provenance_registry::infra::{
    InsertOutcome, PgProofStore, ProofTier, ProvenanceError, StoragePolicy, TieredProofStore,
};
use provenance_registry::ledger::MemoryLedger;
use provenance_registry::resolver::{OwnershipResolver, RegisterRequest};

async fn connect_db() -> Option<sqlx::PgPool> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&url)
        .await
        .ok()?;
    Some(pool)
}

/// Fresh content per run so reruns against one database do not collide
fn unique_content(label: &str) -> Vec<u8> {
    format!("{label}-{}", Uuid::new_v4()).into_bytes()
}

fn record(owner: &str, content: &[u8]) -> ProofRecord {
    ProofRecord::pending(
        compute_fingerprint(content),
        OwnerId::new(owner),
        ContentMetadata {
            content_type: "video/mp4".into(),
            filename: "clip.mp4".into(),
            file_size_bytes: content.len() as u64,
            content_id: Some(format!("cid-{owner}")),
        },
        LedgerReceipt {
            transaction_id: format!("0x{}", hex::encode(Uuid::new_v4().as_bytes())),
            explorer_url: "https://explorer.example/tx".into(),
        },
    )
}

#[tokio::test]
#[ignore]
async fn postgres_round_trip_preserves_fields() {
    let Some(pool) = connect_db().await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };
    provenance_registry::migrations::run_postgres(&pool)
        .await
        .unwrap();

    let store = PgProofStore::new(pool);
    let rec = record("alice", &unique_content("round-trip"));

    assert!(matches!(
        store.insert_if_absent(&rec).await.unwrap(),
        InsertOutcome::Inserted(_)
    ));

    let found = store.find(&rec.fingerprint).await.unwrap().unwrap();
    assert!(found.same_content_as(&rec));

    let confirmed = store
        .update_status(&rec.fingerprint, ProofStatus::Confirmed)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(confirmed.status, ProofStatus::Confirmed);
    assert!(confirmed.updated_at >= found.updated_at);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn postgres_concurrent_inserts_have_one_winner() {
    let Some(pool) = connect_db().await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };
    provenance_registry::migrations::run_postgres(&pool)
        .await
        .unwrap();

    let store = Arc::new(PgProofStore::new(pool));
    let content = unique_content("race");

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = store.clone();
            let rec = record(&format!("owner-{i}"), &content);
            tokio::spawn(async move { store.insert_if_absent(&rec).await.unwrap() })
        })
        .collect();

    let mut inserted = Vec::new();
    let mut existing = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            InsertOutcome::Inserted(r) => inserted.push(r),
            InsertOutcome::Existing(r) => existing.push(r),
        }
    }

    assert_eq!(inserted.len(), 1);
    assert_eq!(existing.len(), 7);
    let winner = &inserted[0].owner_id;
    assert!(existing.iter().all(|r| &r.owner_id == winner));
}

#[tokio::test]
#[ignore]
async fn postgres_missing_table_is_classified() {
    let Some(pool) = connect_db().await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };

    let schema = format!("empty_{}", Uuid::new_v4().simple());
    sqlx::query(&format!("CREATE SCHEMA {schema}"))
        .execute(&pool)
        .await
        .unwrap();

    // Point one connection at a schema with no proofs table
    let url = std::env::var("DATABASE_URL").unwrap();
    let isolated = PgPoolOptions::new()
        .max_connections(1)
        .after_connect({
            let schema = schema.clone();
            move |conn, _| {
                let schema = schema.clone();
                Box::pin(async move {
                    sqlx::query(&format!("SET search_path TO {schema}"))
                        .execute(conn)
                        .await?;
                    Ok(())
                })
            }
        })
        .connect(&url)
        .await
        .unwrap();

    let store = PgProofStore::new(isolated);
    let err = store
        .find(&compute_fingerprint(b"anything"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProvenanceError::StoreSchemaMissing(_)));

    let tiered = TieredProofStore::primary_only(StoragePolicy::production(), Arc::new(store));
    assert!(matches!(
        tiered.find_by_fingerprint(&compute_fingerprint(b"anything")).await,
        Err(ProvenanceError::DataUnavailable)
    ));

    sqlx::query(&format!("DROP SCHEMA {schema} CASCADE"))
        .execute(&pool)
        .await
        .unwrap();
}

#[tokio::test]
#[ignore]
async fn postgres_resolver_registers_once() {
    let Some(pool) = connect_db().await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };
    provenance_registry::migrations::run_postgres(&pool)
        .await
        .unwrap();

    let ledger = Arc::new(MemoryLedger::for_tests());
    let store = TieredProofStore::primary_only(
        StoragePolicy::production(),
        Arc::new(PgProofStore::new(pool)),
    );
    let resolver = OwnershipResolver::new(Arc::new(store), ledger.clone());

    let content = unique_content("resolver");
    let request = |owner: &str| RegisterRequest {
        content: content.clone(),
        content_type: "image/png".into(),
        filename: "art.png".into(),
        requester: OwnerId::new(owner),
        content_id: None,
    };

    let first = resolver.register_proof(request("alice")).await.unwrap();
    let second = resolver.register_proof(request("alice")).await.unwrap();
    assert_eq!(
        first.registration().unwrap().transaction_id(),
        second.registration().unwrap().transaction_id()
    );

    let bob = resolver.register_proof(request("bob")).await.unwrap();
    assert!(matches!(bob, RegistrationOutcome::Rejected(_)));
    assert_eq!(ledger.register_calls(), 1);

    let owned = resolver
        .proofs_owned_by(&OwnerId::new("alice"))
        .await
        .unwrap();
    assert!(owned
        .iter()
        .any(|r| r.fingerprint == compute_fingerprint(&content)));
}
