use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use shared::domain::{ButtonConfig, ControlId};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, warn};

/// Document key under which the ordered button list is persisted.
pub const BUTTON_CONFIGS_KEY: &str = "button_configs_json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("stored button configs are not valid: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("config writer stopped")]
    WriterStopped,
}

/// Simple key to document store. Values are opaque text blobs.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, blob: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct SqliteDocumentStore {
    pool: Pool<Sqlite>,
}

impl SqliteDocumentStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(connect_options)
            .await
            .with_context(|| format!("failed to open sqlite database: {database_url}"))?;
        let store = Self { pool };
        store.ensure_documents_table().await?;
        Ok(store)
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    async fn ensure_documents_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                doc_key    TEXT PRIMARY KEY NOT NULL,
                body       TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create documents table")?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT body FROM documents WHERE doc_key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to read document '{key}'"))?;
        Ok(row.map(|row| row.get::<String, _>("body")))
    }

    async fn set(&self, key: &str, blob: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (doc_key, body, updated_at)
            VALUES (?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(doc_key) DO UPDATE SET
                body = excluded.body,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(key)
        .bind(blob)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to write document '{key}'"))?;
        Ok(())
    }
}

/// Process-local store, used for ephemeral sessions and tests.
#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: Mutex<HashMap<String, String>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_document(key: &str, blob: &str) -> Self {
        let store = Self::new();
        store
            .documents
            .lock()
            .await
            .insert(key.to_string(), blob.to_string());
        store
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.documents.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, blob: &str) -> Result<()> {
        self.documents
            .lock()
            .await
            .insert(key.to_string(), blob.to_string());
        Ok(())
    }
}

pub fn encode_configs(configs: &[ButtonConfig]) -> Result<String, StoreError> {
    Ok(serde_json::to_string(configs)?)
}

pub fn decode_configs(raw: &str) -> Result<Vec<ButtonConfig>, StoreError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str::<Option<Vec<ButtonConfig>>>(raw)?.unwrap_or_default())
}

enum WriteCommand {
    Persist(String),
    Flush(oneshot::Sender<()>),
}

/// Ordered, durable collection of button configs.
///
/// Reads and writes go through an in-process cache so callers always see their
/// own writes. Every mutation queues a full snapshot for a background writer;
/// the writer persists only the newest snapshot when several are pending.
pub struct ButtonConfigStore {
    configs: Vec<ButtonConfig>,
    writes: mpsc::UnboundedSender<WriteCommand>,
}

impl ButtonConfigStore {
    pub async fn open(documents: Arc<dyn DocumentStore>) -> Self {
        let configs = match documents.get(BUTTON_CONFIGS_KEY).await {
            Ok(Some(raw)) => decode_configs(&raw).unwrap_or_else(|error| {
                warn!(%error, "discarding unreadable button configs");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(error) => {
                warn!(%error, "failed to load button configs; starting empty");
                Vec::new()
            }
        };
        debug!(count = configs.len(), "loaded button configs");

        let (writes, rx) = mpsc::unbounded_channel();
        // The writer drains whatever is queued once the store is dropped.
        tokio::spawn(run_writer(documents, rx));
        Self { configs, writes }
    }

    pub fn load_all(&self) -> Vec<ButtonConfig> {
        self.configs.clone()
    }

    pub fn configs(&self) -> &[ButtonConfig] {
        &self.configs
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    pub fn index_of(&self, id: ControlId) -> Option<usize> {
        self.configs.iter().position(|config| config.id == id)
    }

    pub fn get(&self, id: ControlId) -> Option<&ButtonConfig> {
        self.configs.iter().find(|config| config.id == id)
    }

    pub fn add(&mut self, config: ButtonConfig) {
        self.configs.push(config);
        self.persist();
    }

    pub fn update_at(&mut self, index: usize, config: ButtonConfig) -> bool {
        let Some(slot) = self.configs.get_mut(index) else {
            return false;
        };
        *slot = config;
        self.persist();
        true
    }

    pub fn delete_at(&mut self, index: usize) -> bool {
        if index >= self.configs.len() {
            return false;
        }
        self.configs.remove(index);
        self.persist();
        true
    }

    pub fn delete_by_label(&mut self, label: &str) -> bool {
        if label.is_empty() {
            return false;
        }
        match self.configs.iter().position(|config| config.label == label) {
            Some(index) => self.delete_at(index),
            None => false,
        }
    }

    pub fn delete_by_id(&mut self, id: ControlId) -> bool {
        match self.index_of(id) {
            Some(index) => self.delete_at(index),
            None => false,
        }
    }

    /// Waits until every mutation made so far has reached the document store.
    pub async fn flush(&self) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.writes
            .send(WriteCommand::Flush(tx))
            .map_err(|_| StoreError::WriterStopped)?;
        rx.await.map_err(|_| StoreError::WriterStopped)
    }

    fn persist(&self) {
        let snapshot = match encode_configs(&self.configs) {
            Ok(snapshot) => snapshot,
            Err(error) => {
                warn!(%error, "failed to encode button configs");
                return;
            }
        };
        if self.writes.send(WriteCommand::Persist(snapshot)).is_err() {
            warn!("config writer stopped; change kept in memory only");
        }
    }
}

async fn run_writer(
    documents: Arc<dyn DocumentStore>,
    mut rx: mpsc::UnboundedReceiver<WriteCommand>,
) {
    while let Some(command) = rx.recv().await {
        let mut latest = None;
        let mut waiters = Vec::new();
        let mut next = Some(command);
        while let Some(command) = next.take() {
            match command {
                WriteCommand::Persist(snapshot) => latest = Some(snapshot),
                WriteCommand::Flush(done) => waiters.push(done),
            }
            next = rx.try_recv().ok();
        }

        if let Some(snapshot) = latest {
            if let Err(error) = documents.set(BUTTON_CONFIGS_KEY, &snapshot).await {
                warn!(%error, "failed to persist button configs");
            }
        }
        for done in waiters {
            let _ = done.send(());
        }
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;
    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
