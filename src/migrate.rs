use anyhow::Result;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    // Documents are content-addressed: the id is the content hash, which is
    // what makes re-ingestion idempotent.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            title TEXT,
            page_count INTEGER NOT NULL,
            block_count INTEGER NOT NULL,
            ingested_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            text TEXT NOT NULL,
            token_start INTEGER NOT NULL,
            token_end INTEGER NOT NULL,
            heading_level INTEGER NOT NULL DEFAULT 0,
            UNIQUE(document_id, position),
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // One vector per chunk per (model, pooling) configuration; vectors from
    // different configurations never share a similarity query.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunk_vectors (
            chunk_id TEXT NOT NULL,
            document_id TEXT NOT NULL,
            model_id TEXT NOT NULL,
            pooling TEXT NOT NULL,
            dims INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            PRIMARY KEY (chunk_id, model_id, pooling),
            FOREIGN KEY (chunk_id) REFERENCES chunks(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id)")
        .execute(&pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_chunk_vectors_config ON chunk_vectors(model_id, pooling)",
    )
    .execute(&pool)
    .await?;

    pool.close().await;
    Ok(())
}
