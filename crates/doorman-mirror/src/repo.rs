#![allow(async_fn_in_trait)]

//! Repositories over the mirrored `users` and `access_log` tables.

use crate::error::MirrorResult;
use chrono::NaiveDate;
use doorman_core::constants::FILE_DATE_FORMAT;
use doorman_core::{AccessEvent, Credential, Uid};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

/// Row in the mirrored `users` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MirrorUser {
    pub id: i64,
    pub nfc_uid: String,
    pub user_name: String,
    pub role: String,
    pub created_at: Option<String>,
}

/// Row in the mirrored `access_log` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MirrorRecord {
    pub id: i64,
    pub uid: String,
    pub event_time: String,
    pub status: String,
    pub station_id: i64,
    pub user_name: Option<String>,
}

/// Repository contract for mirrored credentials.
///
/// Native async trait methods (Edition 2024), so mock implementations for
/// tests need no extra crates.
pub trait UserRepository: Send + Sync {
    /// Insert the credential unless its uid is already mirrored.
    ///
    /// Returns `true` when a row was inserted. Existing rows are left
    /// untouched, so a renamed credential keeps its first mirrored name
    /// until the row is removed by hand.
    async fn ensure(&self, credential: &Credential) -> MirrorResult<bool>;

    /// Check whether a uid is mirrored.
    async fn exists(&self, uid: &Uid) -> MirrorResult<bool>;

    /// Look up the mirrored display name for a uid.
    async fn find_name(&self, uid: &Uid) -> MirrorResult<Option<String>>;

    /// All mirrored credentials, ordered by display name.
    async fn all(&self) -> MirrorResult<Vec<MirrorUser>>;

    /// Count mirrored credentials.
    async fn count(&self) -> MirrorResult<i64>;
}

/// Repository contract for mirrored access events.
pub trait RecordRepository: Send + Sync {
    /// Insert a batch of events atomically.
    ///
    /// Events without a resolved name get one from the mirrored `users`
    /// table where the uid matches; otherwise the column stays NULL.
    async fn insert_batch(&self, events: &[AccessEvent]) -> MirrorResult<u64>;

    /// All records whose event time falls on the given date, newest first.
    async fn on_date(&self, date: NaiveDate) -> MirrorResult<Vec<MirrorRecord>>;

    /// Count records on the given date.
    async fn count_on(&self, date: NaiveDate) -> MirrorResult<i64>;

    /// The most recently inserted records.
    async fn recent(&self, limit: i64) -> MirrorResult<Vec<MirrorRecord>>;
}

/// SQLite implementation of [`UserRepository`].
pub struct SqliteUserRepository {
    pool: SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl UserRepository for SqliteUserRepository {
    async fn ensure(&self, credential: &Credential) -> MirrorResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (nfc_uid, user_name, role, created_at)
            VALUES (?, ?, 'user', ?)
            ON CONFLICT (nfc_uid) DO NOTHING
            "#,
        )
        .bind(credential.uid.as_str())
        .bind(&credential.display_name)
        .bind(credential.registered_at.map(|t| t.format()))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn exists(&self, uid: &Uid) -> MirrorResult<bool> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE nfc_uid = ?")
            .bind(uid.as_str())
            .fetch_one(&self.pool)
            .await?;

        Ok(result.0 > 0)
    }

    async fn find_name(&self, uid: &Uid) -> MirrorResult<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT user_name FROM users WHERE nfc_uid = ?")
                .bind(uid.as_str())
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|r| r.0))
    }

    async fn all(&self) -> MirrorResult<Vec<MirrorUser>> {
        let users = sqlx::query_as::<_, MirrorUser>(
            r#"
            SELECT id, nfc_uid, user_name, role, created_at
            FROM users
            ORDER BY user_name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    async fn count(&self) -> MirrorResult<i64> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;

        Ok(result.0)
    }
}

/// SQLite implementation of [`RecordRepository`].
pub struct SqliteRecordRepository {
    pool: SqlitePool,
}

impl SqliteRecordRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl RecordRepository for SqliteRecordRepository {
    async fn insert_batch(&self, events: &[AccessEvent]) -> MirrorResult<u64> {
        let mut tx = self.pool.begin().await?;

        for event in events {
            sqlx::query(
                r#"
                INSERT INTO access_log (uid, event_time, status, station_id, user_name)
                VALUES (?, ?, ?, ?, COALESCE(?, (SELECT user_name FROM users WHERE nfc_uid = ?)))
                "#,
            )
            .bind(event.uid.as_str())
            .bind(event.timestamp.format())
            .bind(event.decision.as_str())
            .bind(i64::from(event.station_id))
            .bind(event.resolved_name.as_deref())
            .bind(event.uid.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(events.len() as u64)
    }

    async fn on_date(&self, date: NaiveDate) -> MirrorResult<Vec<MirrorRecord>> {
        let (start, end) = day_bounds(date);
        let records = sqlx::query_as::<_, MirrorRecord>(
            r#"
            SELECT id, uid, event_time, status, station_id, user_name
            FROM access_log
            WHERE event_time BETWEEN ? AND ?
            ORDER BY event_time DESC
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn count_on(&self, date: NaiveDate) -> MirrorResult<i64> {
        let (start, end) = day_bounds(date);
        let result: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM access_log WHERE event_time BETWEEN ? AND ?")
                .bind(start)
                .bind(end)
                .fetch_one(&self.pool)
                .await?;

        Ok(result.0)
    }

    async fn recent(&self, limit: i64) -> MirrorResult<Vec<MirrorRecord>> {
        let records = sqlx::query_as::<_, MirrorRecord>(
            r#"
            SELECT id, uid, event_time, status, station_id, user_name
            FROM access_log
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}

/// Inclusive event-time bounds for one day. The stored format sorts
/// lexicographically, which is what makes BETWEEN work on TEXT.
fn day_bounds(date: NaiveDate) -> (String, String) {
    let day = date.format(FILE_DATE_FORMAT);
    (format!("{day} 00:00:00"), format!("{day} 23:59:59"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MirrorDb;
    use doorman_core::{Decision, LogTimestamp};

    async fn setup() -> MirrorDb {
        MirrorDb::in_memory().await.unwrap()
    }

    fn credential(uid: &str, name: &str) -> Credential {
        Credential::new(Uid::new(uid).unwrap(), name)
    }

    fn event_at(uid: &str, stamp: &str, decision: Decision) -> AccessEvent {
        AccessEvent {
            uid: Uid::new(uid).unwrap(),
            timestamp: LogTimestamp::parse(stamp).unwrap(),
            decision,
            station_id: 1,
            resolved_name: None,
        }
    }

    #[tokio::test]
    async fn test_ensure_inserts_once() {
        let db = setup().await;
        let repo = SqliteUserRepository::new(db.pool().clone());

        assert!(repo.ensure(&credential("AA-BB-CC-01", "Ana")).await.unwrap());
        assert!(
            !repo
                .ensure(&credential("AA-BB-CC-01", "Renamed"))
                .await
                .unwrap()
        );

        assert_eq!(repo.count().await.unwrap(), 1);
        // First mirrored name wins.
        let name = repo
            .find_name(&Uid::new("AA-BB-CC-01").unwrap())
            .await
            .unwrap();
        assert_eq!(name.as_deref(), Some("Ana"));
    }

    #[tokio::test]
    async fn test_exists_and_find_name_for_unknown_uid() {
        let db = setup().await;
        let repo = SqliteUserRepository::new(db.pool().clone());

        let uid = Uid::new("99-99-99-99").unwrap();
        assert!(!repo.exists(&uid).await.unwrap());
        assert_eq!(repo.find_name(&uid).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_all_orders_by_display_name() {
        let db = setup().await;
        let repo = SqliteUserRepository::new(db.pool().clone());

        repo.ensure(&credential("11-22-33-44", "Luis")).await.unwrap();
        repo.ensure(&credential("AA-BB-CC-01", "Ana")).await.unwrap();

        let users = repo.all().await.unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].user_name, "Ana");
        assert_eq!(users[0].role, "user");
        assert_eq!(users[1].nfc_uid, "11-22-33-44");
        assert!(users[1].created_at.is_some());
    }

    #[tokio::test]
    async fn test_insert_batch_resolves_names_from_users() {
        let db = setup().await;
        let users = SqliteUserRepository::new(db.pool().clone());
        let records = SqliteRecordRepository::new(db.pool().clone());

        users
            .ensure(&credential("AA-BB-CC-01", "Ana"))
            .await
            .unwrap();

        let inserted = records
            .insert_batch(&[
                event_at("AA-BB-CC-01", "2025-03-01 08:15:00", Decision::Granted),
                event_at("11-22-33-44", "2025-03-01 08:16:30", Decision::Denied),
            ])
            .await
            .unwrap();
        assert_eq!(inserted, 2);

        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let rows = records.on_date(date).await.unwrap();
        assert_eq!(rows.len(), 2);
        // Newest first.
        assert_eq!(rows[0].uid, "11-22-33-44");
        assert_eq!(rows[0].user_name, None);
        assert_eq!(rows[1].uid, "AA-BB-CC-01");
        assert_eq!(rows[1].user_name.as_deref(), Some("Ana"));
        assert_eq!(rows[1].status, "GRANTED");
    }

    #[tokio::test]
    async fn test_pre_resolved_name_is_kept() {
        let db = setup().await;
        let records = SqliteRecordRepository::new(db.pool().clone());

        let event = event_at("EB-EE-C0-01", "2025-03-01 09:00:00", Decision::Granted)
            .with_resolved_name("Admin");
        records.insert_batch(&[event]).await.unwrap();

        let rows = records.recent(1).await.unwrap();
        assert_eq!(rows[0].user_name.as_deref(), Some("Admin"));
    }

    #[tokio::test]
    async fn test_count_on_ignores_other_days() {
        let db = setup().await;
        let records = SqliteRecordRepository::new(db.pool().clone());

        records
            .insert_batch(&[
                event_at("AA-BB-CC-01", "2025-03-01 23:59:59", Decision::Granted),
                event_at("AA-BB-CC-01", "2025-03-02 00:00:00", Decision::Granted),
            ])
            .await
            .unwrap();

        let first = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let second = NaiveDate::from_ymd_opt(2025, 3, 2).unwrap();
        assert_eq!(records.count_on(first).await.unwrap(), 1);
        assert_eq!(records.count_on(second).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_recent_limits_and_orders() {
        let db = setup().await;
        let records = SqliteRecordRepository::new(db.pool().clone());

        for minute in 0..5 {
            records
                .insert_batch(&[event_at(
                    "AA-BB-CC-01",
                    &format!("2025-03-01 10:{minute:02}:00"),
                    Decision::Denied,
                )])
                .await
                .unwrap();
        }

        let rows = records.recent(3).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].event_time, "2025-03-01 10:04:00");
    }

    #[test]
    fn test_day_bounds_cover_whole_day() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let (start, end) = day_bounds(date);
        assert_eq!(start, "2025-03-01 00:00:00");
        assert_eq!(end, "2025-03-01 23:59:59");
    }
}
