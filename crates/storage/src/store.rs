//! File-backed document store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::fs;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cipher::Cipher;
use crate::config::StoreConfig;
use crate::document::Document;
use crate::event::StoreEvent;
use crate::persist::{self, Job, WriteTicket, Writer};
use crate::schema::SchemaRegistry;
use crate::table::{Query, Table};
use crate::{Error, Result};

const EVENT_CAPACITY: usize = 256;

/// Outcome of the boot-time load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: Vec<String>,
    pub failed: Vec<PathBuf>,
}

/// Name, schema and size of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub name: String,
    pub schema: String,
    pub documents: usize,
}

/// Named tables kept in memory and written back to one file each.
///
/// Cloning is cheap; clones share the same tables and background tasks.
/// Background tasks stop once the last clone is dropped.
#[derive(Clone)]
pub struct DocumentStore {
    inner: Arc<Inner>,
}

struct Inner {
    config: StoreConfig,
    directory: PathBuf,
    schemas: SchemaRegistry,
    cipher: Option<Arc<Cipher>>,
    tables: RwLock<BTreeMap<String, Table>>,
    writer: mpsc::UnboundedSender<Job>,
    events: broadcast::Sender<StoreEvent>,
    ready: watch::Sender<Option<LoadReport>>,
    shutdown: watch::Sender<bool>,
}

impl DocumentStore {
    /// Open the store: prepare the directory, start the write-back queue,
    /// load every persisted table and arm autosave.
    ///
    /// The store is ready when this returns, so a table created right away
    /// can never shadow one still on disk. Unreadable files are skipped.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn open(config: StoreConfig, schemas: SchemaRegistry) -> Result<Self> {
        let directory = prepare_directory(&config.directory).await?;
        let cipher = if config.encrypt {
            Some(Arc::new(Cipher::new(config.algorithm, &config.key, &config.iv)?))
        } else {
            None
        };

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let writer = Writer {
            directory: directory.clone(),
            extension: config.extension(),
            cipher: cipher.clone(),
            events: events.clone(),
        }
        .spawn();
        let (ready, _) = watch::channel(None);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let interval = config.autosave_interval();

        let inner = Arc::new(Inner {
            config,
            directory,
            schemas,
            cipher,
            tables: RwLock::new(BTreeMap::new()),
            writer,
            events,
            ready,
            shutdown,
        });

        load_all(&inner).await;
        if let Some(interval) = interval {
            spawn_autosave(Arc::downgrade(&inner), interval, shutdown_rx);
        }

        Ok(Self { inner })
    }

    /// Directory actually in use (may carry a `_` suffix if the configured
    /// path was occupied by a file).
    pub fn directory(&self) -> &Path {
        &self.inner.directory
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub fn schemas(&self) -> &SchemaRegistry {
        &self.inner.schemas
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    /// Outcome of the boot-time load. Resolves at once for stores returned
    /// by [`open`](Self::open).
    pub async fn ready(&self) -> LoadReport {
        let mut rx = self.inner.ready.subscribe();
        match rx.wait_for(Option::is_some).await {
            Ok(report) => (*report).clone().unwrap_or_default(),
            Err(_) => LoadReport::default(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.inner.ready.borrow().is_some()
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.inner.tables.read().contains_key(name)
    }

    pub fn tables(&self) -> Vec<TableInfo> {
        self.inner
            .tables
            .read()
            .iter()
            .map(|(name, table)| TableInfo {
                name: name.clone(),
                schema: table.schema().name().to_string(),
                documents: table.len(),
            })
            .collect()
    }

    /// Create an empty table using the schema of the same name.
    pub fn new_table(&self, name: &str) -> bool {
        self.new_table_with(name, name)
    }

    /// Create an empty table for `schema`. No-op returning `false` if the
    /// table exists, the schema is unknown or `name` is not a plain file
    /// stem (empty, leading dot, path separators).
    pub fn new_table_with(&self, name: &str, schema: &str) -> bool {
        if !is_table_name(name) {
            warn!(table = name, "rejected table name");
            return false;
        }
        let Some(schema) = self.inner.schemas.get(schema) else {
            debug!(table = name, schema, "unknown schema, table not created");
            return false;
        };
        {
            let mut tables = self.inner.tables.write();
            if tables.contains_key(name) {
                return false;
            }
            tables.insert(name.to_string(), Table::new(schema));
        }
        info!(table = name, "table created");
        self.emit(StoreEvent::TableCreated {
            table: name.to_string(),
        });
        self.apply(name);
        true
    }

    /// Remove a table and delete its file.
    pub fn drop_table(&self, name: &str) -> bool {
        if self.inner.tables.write().remove(name).is_none() {
            return false;
        }
        let _ = self.inner.writer.send(Job::Remove {
            table: name.to_string(),
        });
        info!(table = name, "table dropped");
        self.emit(StoreEvent::TableDropped {
            table: name.to_string(),
        });
        true
    }

    /// Matching documents of `table`, or empty if the table is unknown.
    pub fn get(&self, table: &str, query: &Query<'_>) -> Vec<Document> {
        self.inner
            .tables
            .read()
            .get(table)
            .map(|t| t.get(query))
            .unwrap_or_default()
    }

    pub fn first(&self, table: &str, query: &Query<'_>) -> Option<Document> {
        self.inner.tables.read().get(table)?.first(query)
    }

    /// Insert into `table`. `None` if the table is unknown or the schema
    /// rejected the candidate; otherwise a write-back is queued.
    pub fn set(&self, table: &str, candidate: &Document) -> Option<Document> {
        let inserted = self.inner.tables.write().get_mut(table)?.set(candidate);
        if inserted.is_some() {
            self.apply(table);
        }
        inserted
    }

    /// Replace every matching document with `template`. `false` only if
    /// the table is unknown or the template does not fit its schema.
    pub fn update(&self, table: &str, template: &Document, query: &Query<'_>) -> bool {
        let updated = self
            .inner
            .tables
            .write()
            .get_mut(table)
            .is_some_and(|t| t.update(template, query));
        if updated {
            self.apply(table);
        }
        updated
    }

    pub fn delete(&self, table: &str, query: &Query<'_>) -> bool {
        let deleted = self
            .inner
            .tables
            .write()
            .get_mut(table)
            .is_some_and(|t| t.delete(query));
        if deleted {
            self.apply(table);
        }
        deleted
    }

    /// Queue a write-back of one table's current contents.
    ///
    /// Returns `None` for unknown tables. The ticket may be dropped; the
    /// write still happens.
    pub fn apply(&self, table: &str) -> Option<WriteTicket> {
        // snapshot and enqueue under one lock so jobs queue in snapshot order
        let tables = self.inner.tables.read();
        let t = tables.get(table)?;
        let (job, ticket) = Job::write(table, t.schema().name(), t.persisted());
        if self.inner.writer.send(job).is_err() {
            warn!(table, "write-back queue closed");
        }
        Some(ticket)
    }

    /// Write every table back and wait for the outcome. Failures are
    /// logged and otherwise ignored.
    pub async fn save(&self) {
        self.emit(StoreEvent::Saving);
        let names: Vec<String> = self.inner.tables.read().keys().cloned().collect();
        let tickets: Vec<WriteTicket> = names.iter().filter_map(|n| self.apply(n)).collect();
        for ticket in tickets {
            let table = ticket.table().to_string();
            if let Err(e) = ticket.wait().await {
                debug!(table = %table, error = %e, "save skipped table");
            }
        }
    }

    /// Wait until every write-back queued so far has been processed.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.inner.writer.send(Job::Barrier(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Stop autosave and write everything back one last time.
    pub async fn close(&self) {
        let _ = self.inner.shutdown.send(true);
        self.save().await;
        self.flush().await;
    }

    fn emit(&self, event: StoreEvent) {
        // no subscribers is fine
        let _ = self.inner.events.send(event);
    }
}

/// Make sure `requested` is a directory, appending `_` while the path is
/// taken by something else.
async fn prepare_directory(requested: &Path) -> Result<PathBuf> {
    let mut dir = requested.to_path_buf();
    loop {
        match fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => return Ok(dir),
            Ok(_) => {
                let mut name = dir.into_os_string();
                name.push("_");
                dir = PathBuf::from(name);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                fs::create_dir_all(&dir).await?;
                return Ok(dir);
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Whether `name` can safely become `<name>.<ext>` inside the data
/// directory and be found again on the next load.
fn is_table_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\'])
        && !name.contains("..")
}

async fn load_all(inner: &Inner) {
    let extension = inner.config.extension();
    let mut report = LoadReport::default();

    match table_files(&inner.directory, extension).await {
        Ok(files) => {
            for (name, path) in files {
                match load_table(inner, &path).await {
                    Ok(table) => {
                        inner.tables.write().insert(name.clone(), table);
                        report.loaded.push(name);
                    }
                    Err(e) => {
                        warn!(file = %path.display(), error = %e, "skipping unreadable table file");
                        let _ = inner.events.send(StoreEvent::LoadFailed {
                            file: path.clone(),
                            reason: e.to_string(),
                        });
                        report.failed.push(path);
                    }
                }
            }
        }
        Err(e) => warn!(directory = %inner.directory.display(), error = %e, "cannot list data directory"),
    }

    info!(
        loaded = report.loaded.len(),
        failed = report.failed.len(),
        "document store ready"
    );
    let _ = inner.events.send(StoreEvent::Ready {
        loaded: report.loaded.len(),
        failed: report.failed.len(),
    });
    inner.ready.send_replace(Some(report));
}

/// `(table name, path)` of every table file, sorted by name.
async fn table_files(directory: &Path, extension: &str) -> Result<Vec<(String, PathBuf)>> {
    let suffix = format!(".{extension}");
    let mut files = Vec::new();
    let mut entries = fs::read_dir(directory).await?;
    while let Some(entry) = entries.next_entry().await? {
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if file_name.starts_with('.') {
            continue;
        }
        if let Some(name) = file_name.strip_suffix(&suffix).filter(|n| !n.is_empty()) {
            files.push((name.to_string(), entry.path()));
        }
    }
    files.sort();
    Ok(files)
}

async fn load_table(inner: &Inner, path: &Path) -> Result<Table> {
    let raw = fs::read_to_string(path).await?;
    let (model, documents) = persist::decode(&raw, inner.cipher.as_deref(), path)?;
    let schema = inner
        .schemas
        .get(&model)
        .ok_or(Error::UnknownSchema(model))?;
    Table::restore(schema, documents)
}

fn spawn_autosave(inner: Weak<Inner>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    let Some(inner) = inner.upgrade() else { break };
                    debug!("autosave tick");
                    DocumentStore { inner }.save().await;
                }
            }
        }
    });
}
