//! Database statistics overview.
//!
//! A quick summary of what's indexed: document and chunk counts plus a
//! per-embedding-configuration breakdown, which makes it visible that
//! vectors from different `(model, pooling)` configurations live in
//! separate similarity scopes.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let total_docs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(&pool)
        .await?;

    let total_chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
        .fetch_one(&pool)
        .await?;

    let total_vectors: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors")
        .fetch_one(&pool)
        .await?;

    println!("ragloom — index stats");
    println!();
    println!("  Database:   {}", config.db.path.display());
    println!("  Documents:  {}", total_docs);
    println!("  Chunks:     {}", total_chunks);
    println!("  Vectors:    {}", total_vectors);

    let config_rows = sqlx::query(
        r#"
        SELECT model_id, pooling, COUNT(*) AS vector_count, MAX(dims) AS dims
        FROM chunk_vectors
        GROUP BY model_id, pooling
        ORDER BY vector_count DESC
        "#,
    )
    .fetch_all(&pool)
    .await?;

    if !config_rows.is_empty() {
        println!();
        println!(
            "  {:<28} {:<16} {:>8} {:>6}",
            "MODEL", "POOLING", "VECTORS", "DIMS"
        );
        for row in &config_rows {
            let model: String = row.get("model_id");
            let pooling: String = row.get("pooling");
            let count: i64 = row.get("vector_count");
            let dims: i64 = row.get("dims");
            println!("  {:<28} {:<16} {:>8} {:>6}", model, pooling, count, dims);
        }
    }

    pool.close().await;
    Ok(())
}
