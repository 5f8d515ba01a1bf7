//! PostgreSQL metadata store.

use async_trait::async_trait;
use deadpool_postgres::{Config, Pool, Runtime};
use tokio_postgres::{NoTls, Row};

use crate::config::DatabaseConfig;
use crate::error::StoreError;
use crate::store::{FileRecord, MediaKind, MetadataStore};

mod embedded {
    refinery::embed_migrations!("migrations");
}

/// Metadata store backed by a deadpool-managed connection pool.
pub struct PostgresStore {
    pool: Pool,
}

impl PostgresStore {
    /// Create a new store and verify connectivity.
    pub async fn new(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let mut cfg = Config::new();
        cfg.url = Some(config.url.clone());
        cfg.pool = Some(deadpool_postgres::PoolConfig {
            max_size: config.pool_size,
            ..Default::default()
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StoreError::Pool(e.to_string()))?;

        // Test connection
        let _ = pool.get().await?;

        Ok(Self { pool })
    }

    /// Apply embedded schema migrations.
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await?;
        let client = &mut **conn;
        let report = embedded::migrations::runner()
            .run_async(client)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        for migration in report.applied_migrations() {
            tracing::info!("applied migration {}", migration);
        }
        Ok(())
    }

    async fn conn(&self) -> Result<deadpool_postgres::Object, StoreError> {
        Ok(self.pool.get().await?)
    }
}

#[async_trait]
impl MetadataStore for PostgresStore {
    async fn lookup(&self, file_id: &str) -> Result<Option<FileRecord>, StoreError> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                "SELECT file_id, file_name, mime_type, size_bytes, kind, caption, thumb_id, created_at
                 FROM files WHERE file_id = $1",
                &[&file_id],
            )
            .await?;

        row.map(row_to_record).transpose()
    }

    async fn upsert(&self, record: &FileRecord) -> Result<(), StoreError> {
        let conn = self.conn().await?;
        let size = record.size.and_then(|s| i64::try_from(s).ok());

        // Re-ingestion of a known id is a no-op, records are immutable.
        conn.execute(
            "INSERT INTO files (file_id, file_name, mime_type, size_bytes, kind, caption, thumb_id, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (file_id) DO NOTHING",
            &[
                &record.file_id,
                &record.file_name,
                &record.mime_type,
                &size,
                &record.kind.as_str(),
                &record.caption,
                &record.thumb_id,
                &record.created_at,
            ],
        )
        .await?;
        Ok(())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<FileRecord>, StoreError> {
        let conn = self.conn().await?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = conn
            .query(
                "SELECT file_id, file_name, mime_type, size_bytes, kind, caption, thumb_id, created_at
                 FROM files ORDER BY created_at DESC, file_id LIMIT $1",
                &[&limit],
            )
            .await?;

        rows.into_iter().map(row_to_record).collect()
    }
}

fn row_to_record(row: Row) -> Result<FileRecord, StoreError> {
    let kind_raw: String = row.get("kind");
    let kind = MediaKind::parse(&kind_raw).unwrap_or(MediaKind::Document);
    let size: Option<i64> = row.get("size_bytes");

    Ok(FileRecord {
        file_id: row.get("file_id"),
        file_name: row.get("file_name"),
        mime_type: row.get("mime_type"),
        size: size.and_then(|s| u64::try_from(s).ok()),
        kind,
        caption: row.get("caption"),
        thumb_id: row.get("thumb_id"),
        created_at: row.get("created_at"),
    })
}
