//! In-memory table of documents sharing one schema.

use std::cmp::Ordering;
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::document::{Document, ID_FIELD};
use crate::schema::Schema;
use crate::{Error, Result};

type Filter<'a> = Box<dyn Fn(&Document) -> bool + 'a>;
type Order<'a> = Box<dyn Fn(&Document, &Document) -> Ordering + 'a>;
type Projection<'a> = Box<dyn Fn(Document) -> Document + 'a>;

/// Filter, ordering and projection applied by [`Table::get`].
///
/// Every part is optional; an empty query returns every document in
/// insertion order.
#[derive(Default)]
pub struct Query<'a> {
    filter: Option<Filter<'a>>,
    order: Option<Order<'a>>,
    projection: Option<Projection<'a>>,
}

impl<'a> Query<'a> {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn filter(mut self, f: impl Fn(&Document) -> bool + 'a) -> Self {
        self.filter = Some(Box::new(f));
        self
    }

    /// Shorthand for a filter on one field's value.
    pub fn field_eq(self, field: &'a str, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.filter(move |doc| doc.get(field) == Some(&value))
    }

    pub fn order_by(mut self, f: impl Fn(&Document, &Document) -> Ordering + 'a) -> Self {
        self.order = Some(Box::new(f));
        self
    }

    pub fn map(mut self, f: impl Fn(Document) -> Document + 'a) -> Self {
        self.projection = Some(Box::new(f));
        self
    }

    pub(crate) fn matches(&self, doc: &Document) -> bool {
        self.filter.as_ref().is_none_or(|f| f(doc))
    }
}

/// Documents of one schema plus their id counter.
#[derive(Debug, Clone)]
pub struct Table {
    schema: Arc<Schema>,
    documents: Vec<Document>,
    next_id: u64,
}

impl Table {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            documents: Vec::new(),
            next_id: 1,
        }
    }

    /// Rebuild a table from persisted documents and move the counter past
    /// the highest stored id.
    ///
    /// Fails with [`Error::IdExhausted`] when a stored id leaves no room for
    /// another one.
    pub fn restore(schema: Arc<Schema>, stored: Vec<Document>) -> Result<Self> {
        let documents: Vec<Document> = stored.iter().map(|d| schema.restore(d)).collect();
        let max_id = documents.iter().filter_map(Document::id).max().unwrap_or(0);
        let next_id = max_id
            .checked_add(1)
            .ok_or_else(|| Error::IdExhausted(schema.name().to_string()))?;
        let mut table = Self {
            schema,
            documents,
            next_id: 1,
        };
        table.set_increment(next_id);
        Ok(table)
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Id the next inserted document will receive.
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    /// Filtered, ordered and projected copy of the table contents.
    pub fn get(&self, query: &Query<'_>) -> Vec<Document> {
        let mut out: Vec<Document> = self
            .documents
            .iter()
            .filter(|d| query.matches(d))
            .cloned()
            .collect();
        if let Some(order) = &query.order {
            // stable, so equal elements keep insertion order
            out.sort_by(|a, b| order(a, b));
        }
        match &query.projection {
            Some(project) => out.into_iter().map(project).collect(),
            None => out,
        }
    }

    pub fn first(&self, query: &Query<'_>) -> Option<Document> {
        self.get(query).into_iter().next()
    }

    /// Insert a candidate. Returns `None` when the schema rejects it or the
    /// id counter is exhausted.
    pub fn set(&mut self, candidate: &Document) -> Option<Document> {
        let mut doc = self.schema.conform(candidate)?;
        if !self.schema.is_valid(&doc, &self.documents) {
            return None;
        }
        if self.schema.has_id() {
            let Some(next) = self.next_id.checked_add(1) else {
                warn!(schema = self.schema.name(), "id counter exhausted, insert rejected");
                return None;
            };
            doc.insert(ID_FIELD, self.next_id);
            self.next_id = next;
        }
        self.documents.push(doc.clone());
        Some(doc)
    }

    /// Replace every matching document with a deep copy of `template`.
    ///
    /// Fields absent from the template become their schema default; the
    /// document keeps its own id. Returns `true` even if nothing matched.
    pub fn update(&mut self, template: &Document, query: &Query<'_>) -> bool {
        let Some(replacement) = self.schema.conform(template) else {
            return false;
        };
        for doc in self.documents.iter_mut().filter(|d| query.matches(d)) {
            let id = doc.id();
            *doc = replacement.clone();
            if let Some(id) = id {
                doc.insert(ID_FIELD, id);
            }
        }
        true
    }

    /// Remove every matching document. The id counter is left untouched.
    pub fn delete(&mut self, query: &Query<'_>) -> bool {
        self.documents.retain(|d| !query.matches(d));
        true
    }

    /// Reset the id baseline to `max(n, 1)`.
    pub fn set_increment(&mut self, n: u64) {
        self.next_id = n.max(1);
    }

    /// Documents as they should be written to disk.
    pub(crate) fn persisted(&self) -> Vec<Document> {
        self.documents
            .iter()
            .map(|d| self.schema.persisted(d))
            .collect()
    }
}
