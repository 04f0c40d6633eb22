//! SQLite vector index tests: schema migrations, upsert idempotence keyed
//! by (document, position), and configuration-scoped search.

use std::path::Path;

use ragloom::config::Config;
use ragloom::db;
use ragloom::migrate;
use ragloom::models::{Block, Chunk, Document, Embedding, PoolingMethod, TokenSpan};
use ragloom::store::{SqliteIndex, VectorIndex};
use tempfile::TempDir;

fn test_config(root: &Path) -> Config {
    let toml = format!(
        r#"
[db]
path = "{}/ragloom.sqlite"
"#,
        root.display()
    );
    toml::from_str::<Config>(&toml).unwrap()
}

async fn open_index(config: &Config) -> SqliteIndex {
    migrate::run_migrations(config).await.unwrap();
    SqliteIndex::new(db::connect(config).await.unwrap())
}

fn sample_document() -> (Document, Vec<Chunk>, Vec<Embedding>) {
    let doc = Document::new(
        Some("sample".into()),
        vec![Block::new("alpha beta gamma delta", 0, Some(12.0))],
    );
    let chunk = |position: usize, text: &str, start: usize, end: usize| Chunk {
        document_id: doc.id.clone(),
        position,
        text: text.to_string(),
        token_span: TokenSpan { start, end },
        heading_level: 0,
    };
    let embedding = |vector: Vec<f32>| Embedding {
        vector,
        model_id: "model-a".to_string(),
        pooling: PoolingMethod::LateMean,
    };

    let chunks = vec![
        chunk(0, "alpha beta ", 0, 2),
        chunk(1, "gamma delta", 2, 4),
    ];
    let embeddings = vec![embedding(vec![1.0, 0.0]), embedding(vec![0.0, 1.0])];
    (doc, chunks, embeddings)
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    migrate::run_migrations(&config).await.unwrap();
    migrate::run_migrations(&config).await.unwrap();
}

#[tokio::test]
async fn reinserting_a_document_creates_no_duplicates() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let index = open_index(&config).await;
    let (doc, chunks, embeddings) = sample_document();

    index
        .insert_document(&doc, &chunks, &embeddings)
        .await
        .unwrap();
    index
        .insert_document(&doc, &chunks, &embeddings)
        .await
        .unwrap();

    let chunk_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
        .fetch_one(index.pool())
        .await
        .unwrap();
    assert_eq!(chunk_count, 2);

    let vector_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors")
        .fetch_one(index.pool())
        .await
        .unwrap();
    assert_eq!(vector_count, 2);

    assert!(index.contains_document(&doc.id).await.unwrap());
    index.pool().close().await;
}

#[tokio::test]
async fn search_returns_descending_similarity_within_one_config() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let index = open_index(&config).await;
    let (doc, chunks, embeddings) = sample_document();
    index
        .insert_document(&doc, &chunks, &embeddings)
        .await
        .unwrap();

    let hits = index
        .search(&[1.0, 0.1], "model-a", "late-mean", 10)
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].position, 0);
    assert!(hits[0].score > hits[1].score);

    // A different model id sees nothing.
    let other_model = index
        .search(&[1.0, 0.1], "model-b", "late-mean", 10)
        .await
        .unwrap();
    assert!(other_model.is_empty());

    // A different pooling method sees nothing either.
    let other_pooling = index
        .search(&[1.0, 0.1], "model-a", "provider-pooled", 10)
        .await
        .unwrap();
    assert!(other_pooling.is_empty());

    index.pool().close().await;
}

#[tokio::test]
async fn persisted_chunk_record_carries_span_and_heading() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let index = open_index(&config).await;

    let doc = Document::new(
        None,
        vec![Block::new("Heading words", 0, Some(18.0))],
    );
    let chunks = vec![Chunk {
        document_id: doc.id.clone(),
        position: 0,
        text: "Heading words".to_string(),
        token_span: TokenSpan { start: 0, end: 2 },
        heading_level: 1,
    }];
    let embeddings = vec![Embedding {
        vector: vec![0.5, 0.5],
        model_id: "model-a".to_string(),
        pooling: PoolingMethod::LateMean,
    }];
    index
        .insert_document(&doc, &chunks, &embeddings)
        .await
        .unwrap();

    let row: (i64, i64, i64) = sqlx::query_as(
        "SELECT token_start, token_end, heading_level FROM chunks WHERE document_id = ?",
    )
    .bind(&doc.id)
    .fetch_one(index.pool())
    .await
    .unwrap();
    assert_eq!(row, (0, 2, 1));

    index.pool().close().await;
}
