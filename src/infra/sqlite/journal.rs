//! SQLite mirror journal
//!
//! Follows the outbox flow: a proof is appended when the ledger accepted it
//! but no tier stored it, and stays pending until reconciliation resolves
//! it. Records are kept as JSON so the journal does not track the `proofs`
//! schema.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;

use crate::crypto::ContentFingerprint;
use crate::domain::ProofRecord;
use crate::infra::{classify_sqlite_error, MirrorJournal, ProvenanceError, Result, UnmirroredProof};

/// SQLite-backed [`MirrorJournal`]
pub struct SqliteMirrorJournal {
    pool: SqlitePool,
}

impl SqliteMirrorJournal {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a journal file, e.g. `sqlite://mirror-journal.db?mode=rwc`
    pub async fn from_path(path: &str) -> Result<Self> {
        let pool = SqlitePool::connect(path)
            .await
            .map_err(classify_sqlite_error)?;
        Ok(Self { pool })
    }

    /// Private in-memory journal, single connection so every query sees it
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(classify_sqlite_error)?;
        Ok(Self { pool })
    }

    /// Initialize the journal schema
    pub async fn initialize(&self) -> Result<()> {
        crate::migrations::run_journal(&self.pool)
            .await
            .map_err(|e| ProvenanceError::Configuration(format!("mirror journal schema: {e}")))
    }

    /// Close the pool, flushing pending writes
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl MirrorJournal for SqliteMirrorJournal {
    async fn append(&self, record: &ProofRecord) -> Result<()> {
        let record_json =
            serde_json::to_string(record).map_err(|e| ProvenanceError::Internal(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO mirror_journal (
                file_hash, ledger_transaction_id, record, queued_at, attempts
            ) VALUES (?, ?, ?, ?, 0)
            ON CONFLICT(file_hash) DO UPDATE SET
                ledger_transaction_id = excluded.ledger_transaction_id,
                record = excluded.record,
                queued_at = excluded.queued_at,
                attempts = 0,
                resolved_at = NULL
            WHERE mirror_journal.resolved_at IS NOT NULL
            "#,
        )
        .bind(record.fingerprint.to_hex())
        .bind(&record.ledger_transaction_id)
        .bind(&record_json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(classify_sqlite_error)?;

        Ok(())
    }

    async fn find(&self, fingerprint: &ContentFingerprint) -> Result<Option<UnmirroredProof>> {
        let row = sqlx::query_as::<_, JournalRow>(
            r#"
            SELECT record, queued_at, attempts
            FROM mirror_journal
            WHERE file_hash = ? AND resolved_at IS NULL
            "#,
        )
        .bind(fingerprint.to_hex())
        .fetch_optional(&self.pool)
        .await
        .map_err(classify_sqlite_error)?;

        row.map(UnmirroredProof::try_from).transpose()
    }

    async fn pending(&self) -> Result<Vec<UnmirroredProof>> {
        let rows = sqlx::query_as::<_, JournalRow>(
            r#"
            SELECT record, queued_at, attempts
            FROM mirror_journal
            WHERE resolved_at IS NULL
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(classify_sqlite_error)?;

        rows.into_iter().map(UnmirroredProof::try_from).collect()
    }

    async fn record_attempt(&self, fingerprint: &ContentFingerprint) -> Result<()> {
        sqlx::query(
            "UPDATE mirror_journal SET attempts = attempts + 1 \
             WHERE file_hash = ? AND resolved_at IS NULL",
        )
        .bind(fingerprint.to_hex())
        .execute(&self.pool)
        .await
        .map_err(classify_sqlite_error)?;
        Ok(())
    }

    async fn mark_resolved(&self, fingerprint: &ContentFingerprint) -> Result<()> {
        sqlx::query(
            "UPDATE mirror_journal SET resolved_at = ? \
             WHERE file_hash = ? AND resolved_at IS NULL",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(fingerprint.to_hex())
        .execute(&self.pool)
        .await
        .map_err(classify_sqlite_error)?;
        Ok(())
    }

    async fn pending_count(&self) -> Result<u64> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM mirror_journal WHERE resolved_at IS NULL")
                .fetch_one(&self.pool)
                .await
                .map_err(classify_sqlite_error)?;
        Ok(row.0 as u64)
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}

#[derive(Debug, FromRow)]
struct JournalRow {
    record: String,
    queued_at: String,
    attempts: i64,
}

impl TryFrom<JournalRow> for UnmirroredProof {
    type Error = ProvenanceError;

    fn try_from(row: JournalRow) -> Result<Self> {
        let record: ProofRecord = serde_json::from_str(&row.record)
            .map_err(|e| ProvenanceError::Internal(format!("corrupt journal record: {e}")))?;
        let queued_at = DateTime::parse_from_rfc3339(&row.queued_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                ProvenanceError::Internal(format!("invalid timestamp {:?}: {e}", row.queued_at))
            })?;

        Ok(UnmirroredProof {
            record,
            queued_at,
            attempts: u32::try_from(row.attempts).unwrap_or(u32::MAX),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::compute_fingerprint;
    use crate::domain::{ContentMetadata, LedgerReceipt, OwnerId};

    async fn journal() -> SqliteMirrorJournal {
        let journal = SqliteMirrorJournal::in_memory().await.unwrap();
        journal.initialize().await.unwrap();
        journal
    }

    fn record(owner: &str, content: &[u8]) -> ProofRecord {
        ProofRecord::pending(
            compute_fingerprint(content),
            OwnerId::new(owner),
            ContentMetadata {
                content_type: "image/png".into(),
                filename: "cover.png".into(),
                file_size_bytes: content.len() as u64,
                content_id: Some("cover-1".into()),
            },
            LedgerReceipt {
                transaction_id: format!("0x{owner}"),
                explorer_url: format!("https://explorer.example/tx/0x{owner}"),
            },
        )
    }

    #[tokio::test]
    async fn test_append_then_find() {
        let journal = journal().await;
        let rec = record("alice", b"cover");

        journal.append(&rec).await.unwrap();
        let entry = journal.find(&rec.fingerprint).await.unwrap().unwrap();
        assert_eq!(entry.record, rec);
        assert_eq!(entry.attempts, 0);
        assert_eq!(journal.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_pending_entry_is_not_replaced() {
        let journal = journal().await;
        let first = record("alice", b"same");
        journal.append(&first).await.unwrap();
        journal.append(&record("bob", b"same")).await.unwrap();

        let entry = journal.find(&first.fingerprint).await.unwrap().unwrap();
        assert_eq!(entry.record.owner_id.as_str(), "alice");
        assert_eq!(journal.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_resolve_then_reopen() {
        let journal = journal().await;
        let rec = record("alice", b"reopen");
        journal.append(&rec).await.unwrap();
        journal.record_attempt(&rec.fingerprint).await.unwrap();
        journal.record_attempt(&rec.fingerprint).await.unwrap();
        assert_eq!(journal.pending().await.unwrap()[0].attempts, 2);

        journal.mark_resolved(&rec.fingerprint).await.unwrap();
        assert!(journal.find(&rec.fingerprint).await.unwrap().is_none());
        assert_eq!(journal.pending_count().await.unwrap(), 0);

        journal.append(&rec).await.unwrap();
        let entry = journal.find(&rec.fingerprint).await.unwrap().unwrap();
        assert_eq!(entry.attempts, 0);
    }

    #[tokio::test]
    async fn test_pending_is_oldest_first() {
        let journal = journal().await;
        for content in [b"one".as_slice(), b"two", b"three"] {
            journal.append(&record("alice", content)).await.unwrap();
        }
        let pending = journal.pending().await.unwrap();
        assert_eq!(pending.len(), 3);
        assert_eq!(pending[0].record.fingerprint, compute_fingerprint(b"one"));
        assert_eq!(pending[2].record.fingerprint, compute_fingerprint(b"three"));
    }

    #[tokio::test]
    async fn test_uninitialized_journal_reports_schema_missing() {
        let journal = SqliteMirrorJournal::in_memory().await.unwrap();
        let err = journal
            .find(&compute_fingerprint(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProvenanceError::StoreSchemaMissing(_)));
    }
}
