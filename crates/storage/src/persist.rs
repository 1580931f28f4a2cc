//! On-disk envelope format and the ordered write-back queue.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, warn};

use crate::cipher::Cipher;
use crate::document::Document;
use crate::event::StoreEvent;
use crate::{Error, Result};

#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    #[serde(rename = "__model__")]
    model: String,
    #[serde(rename = "__data__")]
    data: Vec<T>,
}

/// Serialize a table as `{"__model__": .., "__data__": [..]}`, encrypted to
/// hex when a cipher is given.
pub(crate) fn encode(model: &str, documents: &[Document], cipher: Option<&Cipher>) -> Result<String> {
    let text = serde_json::to_string(&Envelope {
        model: model.to_string(),
        data: documents.to_vec(),
    })?;
    match cipher {
        Some(cipher) => cipher.encrypt(&text),
        None => Ok(text),
    }
}

/// Parse file contents back into the schema name and its documents.
pub(crate) fn decode(raw: &str, cipher: Option<&Cipher>, path: &Path) -> Result<(String, Vec<Document>)> {
    let text = match cipher {
        Some(cipher) => cipher.decrypt(raw)?,
        None => raw.to_string(),
    };
    let envelope: Envelope<Value> = serde_json::from_str(&text)?;
    let documents = envelope
        .data
        .into_iter()
        .map(|value| {
            Document::from_value(value).ok_or_else(|| Error::Envelope {
                path: path.to_path_buf(),
                reason: "__data__ entry is not an object".to_string(),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((envelope.model, documents))
}

/// Completion handle of one queued write-back.
#[derive(Debug)]
pub struct WriteTicket {
    table: String,
    done: oneshot::Receiver<Result<()>>,
}

impl WriteTicket {
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Wait until the file has been written (or the write failed).
    pub async fn wait(self) -> Result<()> {
        self.done
            .await
            .map_err(|_| Error::WriteAborted(self.table))?
    }
}

pub(crate) enum Job {
    Write {
        table: String,
        model: String,
        documents: Vec<Document>,
        done: oneshot::Sender<Result<()>>,
    },
    Remove {
        table: String,
    },
    Barrier(oneshot::Sender<()>),
}

impl Job {
    pub(crate) fn write(table: &str, model: &str, documents: Vec<Document>) -> (Self, WriteTicket) {
        let (tx, rx) = oneshot::channel();
        let job = Job::Write {
            table: table.to_string(),
            model: model.to_string(),
            documents,
            done: tx,
        };
        let ticket = WriteTicket {
            table: table.to_string(),
            done: rx,
        };
        (job, ticket)
    }
}

/// Files written by the queue live under one directory with one extension.
pub(crate) struct Writer {
    pub directory: PathBuf,
    pub extension: &'static str,
    pub cipher: Option<Arc<Cipher>>,
    pub events: broadcast::Sender<StoreEvent>,
}

impl Writer {
    pub(crate) fn spawn(self) -> mpsc::UnboundedSender<Job> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(self.run(rx));
        tx
    }

    pub(crate) fn table_path(directory: &Path, table: &str, extension: &str) -> PathBuf {
        directory.join(format!("{table}.{extension}"))
    }

    async fn run(self, mut jobs: mpsc::UnboundedReceiver<Job>) {
        while let Some(job) = jobs.recv().await {
            match job {
                Job::Write {
                    table,
                    model,
                    documents,
                    done,
                } => {
                    let _ = self.events.send(StoreEvent::TableSaving {
                        table: table.clone(),
                    });
                    let outcome = self.write(&table, &model, &documents).await;
                    match &outcome {
                        Ok(()) => {
                            debug!(table = %table, documents = documents.len(), "table saved");
                            let _ = self.events.send(StoreEvent::TableSaved { table });
                        }
                        Err(e) => {
                            warn!(table = %table, error = %e, "table write-back failed");
                            let _ = self.events.send(StoreEvent::SaveFailed {
                                table,
                                reason: e.to_string(),
                            });
                        }
                    }
                    let _ = done.send(outcome);
                }
                Job::Remove { table } => {
                    let path = Self::table_path(&self.directory, &table, self.extension);
                    match fs::remove_file(&path).await {
                        Ok(()) => debug!(table = %table, "table file removed"),
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove table file"),
                    }
                }
                Job::Barrier(done) => {
                    let _ = done.send(());
                }
            }
        }
    }

    async fn write(&self, table: &str, model: &str, documents: &[Document]) -> Result<()> {
        let payload = encode(model, documents, self.cipher.as_deref())?;
        let path = Self::table_path(&self.directory, table, self.extension);
        let temp = self.directory.join(format!(".{table}.{}.tmp", self.extension));
        fs::write(&temp, payload).await?;
        fs::rename(&temp, &path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::Algorithm;

    #[test]
    fn test_envelope_shape() {
        let docs = vec![Document::new().with("id", 1).with("name", "a")];
        let text = encode("Widget", &docs, None).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["__model__"], "Widget");
        assert_eq!(value["__data__"][0]["name"], "a");
    }

    #[test]
    fn test_decode_encrypted() {
        let cipher = Cipher::new(Algorithm::Aes256Cbc, "k", "v").unwrap();
        let docs = vec![Document::new().with("id", 3)];
        let text = encode("Widget", &docs, Some(&cipher)).unwrap();
        let (model, back) = decode(&text, Some(&cipher), Path::new("w.cryson")).unwrap();
        assert_eq!(model, "Widget");
        assert_eq!(back, docs);
    }

    #[test]
    fn test_decode_rejects_scalar_entries() {
        let raw = r#"{"__model__":"Widget","__data__":[1]}"#;
        let err = decode(raw, None, Path::new("w.json")).unwrap_err();
        assert!(matches!(err, Error::Envelope { .. }));
    }

    #[test]
    fn test_decode_requires_envelope_keys() {
        assert!(decode(r#"{"rows":[]}"#, None, Path::new("w.json")).is_err());
        assert!(decode("{not json", None, Path::new("w.json")).is_err());
    }
}
