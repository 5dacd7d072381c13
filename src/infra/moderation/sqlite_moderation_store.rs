// SQLite-backed moderation store.
//
// Tables:
// - moderation_evidence: append-only record of every flagged message
// - moderation_warnings: one row per warning, keyed by (scope, actor, sequence).
//   Removed warnings stay behind as tombstones so their ids are never reissued.
// - moderation_mutes: at most one row per (scope, actor)
//
// Timestamps are stored as RFC 3339 text, ids as text (they are opaque).

use crate::core::moderation::{
    EvidenceRecord, LedgerSnapshot, ModerationStore, MuteRecord, ScopedKey, StoreError,
    WarningRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite};

pub struct SqliteModerationStore {
    pool: Pool<Sqlite>,
}

fn storage(e: sqlx::Error) -> StoreError {
    StoreError::StorageError(e.to_string())
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::CorruptRecord(format!("bad timestamp `{value}`: {e}")))
}

fn scoped_key(row: &sqlx::sqlite::SqliteRow) -> ScopedKey {
    ScopedKey::new(
        row.get::<String, _>("scope_id").as_str(),
        row.get::<String, _>("actor_id").as_str(),
    )
}

impl SqliteModerationStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database file and run migrations.
    pub async fn connect(path: &str) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .connect(&format!("sqlite://{}?mode=rwc", path))
            .await
            .map_err(storage)?;

        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Run database migrations to create required tables.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS moderation_evidence (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                scope_id TEXT NOT NULL,
                actor_id TEXT NOT NULL,
                content_fingerprint TEXT NOT NULL,
                text TEXT NOT NULL,
                occurred_at TEXT NOT NULL,
                category TEXT NOT NULL,
                severity TEXT NOT NULL,
                score REAL NOT NULL,
                verdict TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_moderation_evidence_actor
                ON moderation_evidence(scope_id, actor_id, occurred_at);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS moderation_warnings (
                scope_id TEXT NOT NULL,
                actor_id TEXT NOT NULL,
                sequence_id INTEGER NOT NULL,
                reason TEXT NOT NULL,
                severity TEXT NOT NULL,
                content_fingerprint TEXT,
                created_at TEXT NOT NULL,
                removed BOOLEAN NOT NULL DEFAULT 0,
                PRIMARY KEY (scope_id, actor_id, sequence_id)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS moderation_mutes (
                scope_id TEXT NOT NULL,
                actor_id TEXT NOT NULL,
                started_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                reason TEXT NOT NULL,
                enforcement_applied BOOLEAN NOT NULL DEFAULT 0,
                active BOOLEAN NOT NULL DEFAULT 1,
                PRIMARY KEY (scope_id, actor_id)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        Ok(())
    }

    /// The most recent evidence recorded for a member, newest first.
    pub async fn evidence_for_actor(
        &self,
        key: &ScopedKey,
        limit: u32,
    ) -> Result<Vec<EvidenceRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT verdict, scope_id, actor_id, content_fingerprint, text, occurred_at \
             FROM moderation_evidence WHERE scope_id = ? AND actor_id = ? \
             ORDER BY id DESC LIMIT ?",
        )
        .bind(key.scope.as_str())
        .bind(key.actor.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.iter()
            .map(|row| {
                let key = scoped_key(row);
                let verdict = serde_json::from_str(&row.get::<String, _>("verdict"))
                    .map_err(|e| StoreError::CorruptRecord(e.to_string()))?;
                Ok(EvidenceRecord {
                    actor: key.actor,
                    scope: key.scope,
                    text: row.get("text"),
                    occurred_at: parse_time(&row.get::<String, _>("occurred_at"))?,
                    content_fingerprint: row.get("content_fingerprint"),
                    verdict,
                })
            })
            .collect()
    }
}

#[async_trait]
impl ModerationStore for SqliteModerationStore {
    async fn append_evidence(&self, evidence: &EvidenceRecord) -> Result<(), StoreError> {
        let verdict = serde_json::to_string(&evidence.verdict)
            .map_err(|e| StoreError::StorageError(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO moderation_evidence
                (scope_id, actor_id, content_fingerprint, text, occurred_at, category, severity, score, verdict)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(evidence.scope.as_str())
        .bind(evidence.actor.as_str())
        .bind(&evidence.content_fingerprint)
        .bind(&evidence.text)
        .bind(evidence.occurred_at.to_rfc3339())
        .bind(evidence.verdict.category.as_str())
        .bind(evidence.verdict.severity.to_string())
        .bind(evidence.verdict.score)
        .bind(verdict)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn save_warning(
        &self,
        key: &ScopedKey,
        warning: &WarningRecord,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO moderation_warnings
                (scope_id, actor_id, sequence_id, reason, severity, content_fingerprint, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(scope_id, actor_id, sequence_id) DO UPDATE SET
                reason = excluded.reason,
                severity = excluded.severity,
                content_fingerprint = excluded.content_fingerprint,
                created_at = excluded.created_at,
                removed = 0
            "#,
        )
        .bind(key.scope.as_str())
        .bind(key.actor.as_str())
        .bind(warning.sequence_id as i64)
        .bind(&warning.reason)
        .bind(warning.severity.to_string())
        .bind(warning.content_fingerprint.as_deref())
        .bind(warning.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn delete_warning(&self, key: &ScopedKey, sequence_id: u64) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE moderation_warnings SET removed = 1 \
             WHERE scope_id = ? AND actor_id = ? AND sequence_id = ?",
        )
        .bind(key.scope.as_str())
        .bind(key.actor.as_str())
        .bind(sequence_id as i64)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        // Removing the last live warning is a full clear.
        sqlx::query(
            r#"
            DELETE FROM moderation_warnings
            WHERE scope_id = ?1 AND actor_id = ?2
              AND NOT EXISTS (
                  SELECT 1 FROM moderation_warnings
                  WHERE scope_id = ?1 AND actor_id = ?2 AND removed = 0
              )
            "#,
        )
        .bind(key.scope.as_str())
        .bind(key.actor.as_str())
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn clear_warnings(&self, key: &ScopedKey) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM moderation_warnings WHERE scope_id = ? AND actor_id = ?")
            .bind(key.scope.as_str())
            .bind(key.actor.as_str())
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(())
    }

    async fn save_mute(&self, key: &ScopedKey, mute: &MuteRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO moderation_mutes
                (scope_id, actor_id, started_at, expires_at, reason, enforcement_applied, active)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(scope_id, actor_id) DO UPDATE SET
                started_at = excluded.started_at,
                expires_at = excluded.expires_at,
                reason = excluded.reason,
                enforcement_applied = excluded.enforcement_applied,
                active = excluded.active
            "#,
        )
        .bind(key.scope.as_str())
        .bind(key.actor.as_str())
        .bind(mute.started_at.to_rfc3339())
        .bind(mute.expires_at.to_rfc3339())
        .bind(&mute.reason)
        .bind(mute.enforcement_applied)
        .bind(mute.active)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn delete_mute(&self, key: &ScopedKey) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM moderation_mutes WHERE scope_id = ? AND actor_id = ?")
            .bind(key.scope.as_str())
            .bind(key.actor.as_str())
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(())
    }

    async fn load_snapshot(&self) -> Result<LedgerSnapshot, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT scope_id, actor_id, sequence_id, reason, severity, content_fingerprint,
                   created_at, removed
            FROM moderation_warnings
            ORDER BY scope_id, actor_id, sequence_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        let mut warnings: Vec<(ScopedKey, Vec<WarningRecord>)> = Vec::new();
        let mut sequences: Vec<(ScopedKey, u64)> = Vec::new();
        for row in rows {
            let key = scoped_key(&row);
            let sequence_id = row.get::<i64, _>("sequence_id") as u64;

            // Rows arrive in sequence order, so the last one per key is the highest.
            match sequences.last_mut() {
                Some((last_key, highest)) if *last_key == key => *highest = sequence_id,
                _ => sequences.push((key.clone(), sequence_id)),
            }
            if row.get::<bool, _>("removed") {
                continue;
            }

            let severity = row
                .get::<String, _>("severity")
                .parse()
                .map_err(StoreError::CorruptRecord)?;
            let record = WarningRecord {
                sequence_id,
                reason: row.get("reason"),
                severity,
                content_fingerprint: row.get("content_fingerprint"),
                created_at: parse_time(&row.get::<String, _>("created_at"))?,
            };

            match warnings.last_mut() {
                Some((last_key, records)) if *last_key == key => records.push(record),
                _ => warnings.push((key, vec![record])),
            }
        }

        let rows = sqlx::query(
            r#"
            SELECT scope_id, actor_id, started_at, expires_at, reason, enforcement_applied, active
            FROM moderation_mutes
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        let mut mutes = Vec::with_capacity(rows.len());
        for row in rows {
            mutes.push((
                scoped_key(&row),
                MuteRecord {
                    started_at: parse_time(&row.get::<String, _>("started_at"))?,
                    expires_at: parse_time(&row.get::<String, _>("expires_at"))?,
                    reason: row.get("reason"),
                    enforcement_applied: row.get("enforcement_applied"),
                    active: row.get("active"),
                },
            ));
        }

        Ok(LedgerSnapshot {
            warnings,
            mutes,
            sequences,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::{
        AbuseVerdict, Category, EscalationConfig, EscalationLedger, NewWarning, Severity,
    };
    use std::collections::BTreeMap;
    use tempfile::NamedTempFile;

    async fn store() -> (SqliteModerationStore, NamedTempFile) {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_string_lossy().to_string();
        let store = SqliteModerationStore::connect(&path).await.unwrap();
        (store, tmp)
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn warning(sequence_id: u64, fingerprint: Option<&str>) -> WarningRecord {
        WarningRecord {
            sequence_id,
            reason: format!("warning {sequence_id}"),
            severity: Severity::High,
            content_fingerprint: fingerprint.map(str::to_string),
            created_at: at(sequence_id as i64),
        }
    }

    #[tokio::test]
    async fn test_warning_round_trip() {
        let (store, _tmp) = store().await;
        let key = ScopedKey::new("guild", "user");

        store.save_warning(&key, &warning(1, Some("abc"))).await.unwrap();
        store.save_warning(&key, &warning(2, None)).await.unwrap();
        store
            .save_warning(&ScopedKey::new("guild", "other"), &warning(1, None))
            .await
            .unwrap();
        store.delete_warning(&key, 1).await.unwrap();

        let snapshot = store.load_snapshot().await.unwrap();
        assert_eq!(snapshot.warnings.len(), 2);
        assert!(snapshot.sequences.contains(&(key.clone(), 2)));

        let (_, records) = snapshot
            .warnings
            .iter()
            .find(|(k, _)| *k == key)
            .unwrap();
        assert_eq!(records, &vec![warning(2, None)]);

        store.clear_warnings(&key).await.unwrap();
        let snapshot = store.load_snapshot().await.unwrap();
        assert_eq!(snapshot.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_mute_upsert_and_delete() {
        let (store, _tmp) = store().await;
        let key = ScopedKey::new("guild", "user");
        let mut mute = MuteRecord {
            started_at: at(0),
            expires_at: at(600),
            reason: "spam".to_string(),
            enforcement_applied: false,
            active: true,
        };

        store.save_mute(&key, &mute).await.unwrap();
        mute.enforcement_applied = true;
        mute.expires_at = at(1_800);
        store.save_mute(&key, &mute).await.unwrap();

        let snapshot = store.load_snapshot().await.unwrap();
        assert_eq!(snapshot.mutes, vec![(key.clone(), mute)]);

        store.delete_mute(&key).await.unwrap();
        assert!(store.load_snapshot().await.unwrap().mutes.is_empty());
    }

    #[tokio::test]
    async fn test_evidence_is_appended() {
        let (store, _tmp) = store().await;
        let verdict = AbuseVerdict {
            is_flagged: true,
            score: 1.2,
            severity: Severity::High,
            category: Category::ThreatViolence,
            matched_terms: vec!["threat-self-harm".to_string()],
            term_count: 1,
            language: "en".to_string(),
            sentiment: BTreeMap::new(),
            produced_at: at(0),
            content_fingerprint: "fp".to_string(),
        };
        let evidence = EvidenceRecord {
            actor: "user".into(),
            scope: "guild".into(),
            text: "kill yourself".to_string(),
            occurred_at: at(0),
            content_fingerprint: "fp".to_string(),
            verdict,
        };

        let mut later = evidence.clone();
        later.text = "kys".to_string();
        later.occurred_at = at(60);
        let mut elsewhere = evidence.clone();
        elsewhere.scope = "other".into();

        store.append_evidence(&evidence).await.unwrap();
        store.append_evidence(&later).await.unwrap();
        store.append_evidence(&elsewhere).await.unwrap();

        let key = ScopedKey::new("guild", "user");
        let stored = store.evidence_for_actor(&key, 10).await.unwrap();
        assert_eq!(stored, vec![later.clone(), evidence]);

        let newest = store.evidence_for_actor(&key, 1).await.unwrap();
        assert_eq!(newest, vec![later]);
    }

    #[tokio::test]
    async fn test_removed_top_warning_id_survives_restart() {
        let (store, _tmp) = store().await;
        let key = ScopedKey::new("guild", "user");
        for id in 1..=3 {
            store.save_warning(&key, &warning(id, None)).await.unwrap();
        }
        store.delete_warning(&key, 3).await.unwrap();

        let snapshot = store.load_snapshot().await.unwrap();
        assert_eq!(snapshot.warnings, vec![(key.clone(), vec![warning(1, None), warning(2, None)])]);
        assert_eq!(snapshot.sequences, vec![(key.clone(), 3)]);

        let ledger = EscalationLedger::new();
        ledger.restore(snapshot);
        let next = ledger.record_warning(
            &key,
            NewWarning {
                reason: "again".to_string(),
                severity: Severity::Low,
                content_fingerprint: None,
            },
            at(10),
            &EscalationConfig::default(),
        );
        assert_eq!(next.record.sequence_id, 4);

        // Removing the remaining warnings clears the key, tombstones included.
        store.delete_warning(&key, 1).await.unwrap();
        store.delete_warning(&key, 2).await.unwrap();
        let snapshot = store.load_snapshot().await.unwrap();
        assert!(snapshot.warnings.is_empty());
        assert!(snapshot.sequences.is_empty());
    }

    #[tokio::test]
    async fn test_data_survives_reconnect() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_string_lossy().to_string();
        let key = ScopedKey::new("guild", "user");

        {
            let store = SqliteModerationStore::connect(&path).await.unwrap();
            store.save_warning(&key, &warning(7, None)).await.unwrap();
        }

        let store = SqliteModerationStore::connect(&path).await.unwrap();
        let snapshot = store.load_snapshot().await.unwrap();
        assert_eq!(snapshot.warnings[0].1[0].sequence_id, 7);
    }
}
