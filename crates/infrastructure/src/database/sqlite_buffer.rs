use anyhow::Result;
use sqlx::{Pool, Row, Sqlite, sqlite::SqlitePoolOptions};

/// Outbound message waiting for the broker to come back
#[derive(Debug, Clone, PartialEq)]
pub struct BufferedMessage {
    pub id: i64,
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

/// Store-and-forward queue for outbound broker messages
#[derive(Clone)]
pub struct SQLiteBuffer {
    pool: Pool<Sqlite>,
}

impl SQLiteBuffer {
    pub async fn new(connection_string: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1) // SQLite is single-writer
            .connect(connection_string)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS outbound_buffer (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                topic TEXT NOT NULL,
                payload BLOB NOT NULL,
                retain INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            )",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    pub async fn enqueue(&self, topic: &str, payload: &[u8], retain: bool) -> Result<()> {
        sqlx::query(
            "INSERT INTO outbound_buffer (topic, payload, retain, created_at) VALUES (?, ?, ?, strftime('%s','now'))",
        )
        .bind(topic)
        .bind(payload)
        .bind(retain)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Oldest messages first, in insertion order
    pub async fn dequeue_batch(&self, limit: i64) -> Result<Vec<BufferedMessage>> {
        let rows = sqlx::query(
            "SELECT id, topic, payload, retain FROM outbound_buffer ORDER BY id ASC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| BufferedMessage {
                id: row.get(0),
                topic: row.get(1),
                payload: row.get(2),
                retain: row.get(3),
            })
            .collect())
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM outbound_buffer WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM outbound_buffer")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
