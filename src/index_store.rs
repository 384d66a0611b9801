//! Per-session on-disk index store.
//!
//! A session's [`VectorIndex`] is written to `<workdir>/<session_id>/index.sqlite`:
//!
//! ```text
//! meta   (key TEXT PRIMARY KEY, value TEXT)          -- embedding model + dims
//! chunks (id, chunk_index, document_id, text, hash,  -- one row per chunk
//!         vector BLOB)                               -- little-endian f32
//! ```
//!
//! The session directory may already exist (empty) before a build. At query
//! time a missing or unreadable store is an error for the caller to surface.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use docqa_core::embedding::{blob_to_vec, vec_to_blob, EmbeddingSignature};
use docqa_core::index::VectorIndex;
use docqa_core::models::Chunk;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

const INDEX_FILE: &str = "index.sqlite";

#[derive(Debug, Clone)]
pub struct IndexStore {
    dir: PathBuf,
}

impl IndexStore {
    pub fn for_session(workdir: &Path, session_id: &str) -> Self {
        Self {
            dir: workdir.join(session_id),
        }
    }

    /// The session's working directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    pub fn exists(&self) -> bool {
        self.path().is_file()
    }

    async fn connect(&self, create: bool) -> Result<SqlitePool> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", self.path().display()))?
            .create_if_missing(create)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Ok(pool)
    }

    /// Write `index` to a fresh store, replacing any previous one.
    pub async fn save(&self, index: &VectorIndex) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create session directory {}", self.dir.display()))?;
        if self.exists() {
            tokio::fs::remove_file(self.path()).await?;
        }

        let pool = self.connect(true).await?;

        sqlx::query("CREATE TABLE meta (key TEXT PRIMARY KEY, value TEXT NOT NULL)")
            .execute(&pool)
            .await?;
        sqlx::query(
            r#"
            CREATE TABLE chunks (
                id TEXT PRIMARY KEY,
                chunk_index INTEGER NOT NULL,
                document_id TEXT NOT NULL,
                text TEXT NOT NULL,
                hash TEXT NOT NULL,
                vector BLOB NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        let mut tx = pool.begin().await?;
        let signature = index.signature();
        sqlx::query("INSERT INTO meta (key, value) VALUES ('model', ?), ('dims', ?)")
            .bind(&signature.model)
            .bind(signature.dims.to_string())
            .execute(&mut *tx)
            .await?;
        for entry in index.entries() {
            sqlx::query(
                "INSERT INTO chunks (id, chunk_index, document_id, text, hash, vector) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&entry.chunk.id)
            .bind(entry.chunk.chunk_index)
            .bind(&entry.chunk.document_id)
            .bind(&entry.chunk.text)
            .bind(&entry.chunk.hash)
            .bind(vec_to_blob(&entry.vector))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        pool.close().await;
        Ok(())
    }

    /// Read the store back into a [`VectorIndex`].
    pub async fn load(&self) -> Result<VectorIndex> {
        if !self.exists() {
            bail!("index store {} is missing", self.path().display());
        }
        let pool = self.connect(false).await?;

        let meta = sqlx::query("SELECT key, value FROM meta")
            .fetch_all(&pool)
            .await?;
        let mut model = None;
        let mut dims = None;
        for row in meta {
            let key: String = row.try_get("key")?;
            let value: String = row.try_get("value")?;
            match key.as_str() {
                "model" => model = Some(value),
                "dims" => dims = Some(value.parse::<usize>().context("corrupt dims in index meta")?),
                _ => {}
            }
        }
        let (Some(model), Some(dims)) = (model, dims) else {
            bail!("index store meta is incomplete");
        };

        let mut index = VectorIndex::new(EmbeddingSignature { model, dims });
        let rows = sqlx::query(
            "SELECT id, chunk_index, document_id, text, hash, vector FROM chunks ORDER BY chunk_index",
        )
        .fetch_all(&pool)
        .await?;
        for row in rows {
            let chunk = Chunk {
                id: row.try_get("id")?,
                document_id: row.try_get("document_id")?,
                chunk_index: row.try_get("chunk_index")?,
                text: row.try_get("text")?,
                hash: row.try_get("hash")?,
            };
            let blob: Vec<u8> = row.try_get("vector")?;
            index.insert(chunk, blob_to_vec(&blob))?;
        }
        pool.close().await;
        Ok(index)
    }

    /// Remove the session directory. A directory that is already gone is fine.
    pub async fn destroy(&self) -> Result<()> {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to remove session directory {}", self.dir.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_core::chunk::chunk_text;
    use tempfile::TempDir;

    fn sample_index() -> VectorIndex {
        let mut index = VectorIndex::new(EmbeddingSignature {
            model: "test".into(),
            dims: 2,
        });
        let chunks = chunk_text("doc.txt", "First part.\n\nSecond part.", 14, 0);
        for (i, chunk) in chunks.into_iter().enumerate() {
            index.insert(chunk, vec![i as f32, 1.0]).unwrap();
        }
        index
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let tmp = TempDir::new().unwrap();
        let store = IndexStore::for_session(tmp.path(), "s1");
        let index = sample_index();
        store.save(&index).await.unwrap();
        assert!(store.exists());

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.signature(), index.signature());
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.entries()[1].chunk.text, "Second part.");
        assert_eq!(loaded.entries()[1].vector, vec![1.0, 1.0]);
    }

    #[tokio::test]
    async fn test_save_into_existing_empty_dir() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("s1")).unwrap();
        let store = IndexStore::for_session(tmp.path(), "s1");
        store.save(&sample_index()).await.unwrap();
        assert!(store.exists());
    }

    #[tokio::test]
    async fn test_load_missing_store_fails() {
        let tmp = TempDir::new().unwrap();
        let store = IndexStore::for_session(tmp.path(), "nope");
        assert!(store.load().await.is_err());
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = IndexStore::for_session(tmp.path(), "s1");
        store.save(&sample_index()).await.unwrap();
        store.destroy().await.unwrap();
        assert!(!store.dir().exists());
        store.destroy().await.unwrap();
    }
}
