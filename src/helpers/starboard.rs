use sqlx::sqlite::SqlitePool;

pub(crate) use crate::structs::starboard_message::MirrorRecord;

/// Durable map from source message id to mirror state. The UNIQUE column
/// keeps at most one record per source message; all writers go through the
/// manager's global lock, so the store only needs atomic get-or-create.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = SqlitePool::connect(database_url).await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self, sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS starboard_messages (
                id INTEGER PRIMARY KEY,
                source_message_id TEXT NOT NULL UNIQUE,
                source_channel_id TEXT NOT NULL,
                mirror_message_id TEXT,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    pub async fn get(&self, source_message_id: u64) -> Result<Option<MirrorRecord>, sqlx::Error> {
        sqlx::query_as::<_, MirrorRecord>(
            "SELECT * FROM starboard_messages WHERE source_message_id = ?",
        )
        .bind(source_message_id.to_string())
        .fetch_optional(&self.pool)
        .await
    }

    /// Upsert returning `(record, created)`. A lost insert against an
    /// existing row is not an error; `created` is false in that case.
    pub async fn get_or_create(
        &self,
        source_message_id: u64,
        source_channel_id: u64,
    ) -> Result<(MirrorRecord, bool), sqlx::Error> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO starboard_messages (source_message_id, source_channel_id)
            VALUES (?, ?)
            ON CONFLICT(source_message_id) DO NOTHING
            "#,
        )
        .bind(source_message_id.to_string())
        .bind(source_channel_id.to_string())
        .execute(&self.pool)
        .await?
        .rows_affected();

        let record = sqlx::query_as::<_, MirrorRecord>(
            "SELECT * FROM starboard_messages WHERE source_message_id = ?",
        )
        .bind(source_message_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok((record, inserted > 0))
    }

    pub async fn set_mirror_message(
        &self,
        source_message_id: u64,
        mirror_message_id: u64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE starboard_messages SET mirror_message_id = ? WHERE source_message_id = ?",
        )
        .bind(mirror_message_id.to_string())
        .bind(source_message_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Drops the mirror reference while keeping the record, for when the
    /// mirror message is known to no longer exist.
    pub async fn clear_mirror_message(
        &self,
        source_message_id: u64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE starboard_messages SET mirror_message_id = NULL WHERE source_message_id = ?",
        )
        .bind(source_message_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, source_message_id: u64) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM starboard_messages WHERE source_message_id = ?")
            .bind(source_message_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
