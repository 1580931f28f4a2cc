//! Where the resolver reads access-model documents from.

use std::sync::Arc;

use storage::{Document, DocumentStore, Query};

/// Read-only lookup of documents by table and predicate.
///
/// The resolver only needs "find documents matching this predicate in that
/// table", so it depends on this seam instead of the store's full API.
pub trait AccessSource {
    fn find(&self, table: &str, filter: &dyn Fn(&Document) -> bool) -> Vec<Document>;

    fn find_first(&self, table: &str, filter: &dyn Fn(&Document) -> bool) -> Option<Document> {
        self.find(table, filter).into_iter().next()
    }
}

impl AccessSource for DocumentStore {
    fn find(&self, table: &str, filter: &dyn Fn(&Document) -> bool) -> Vec<Document> {
        self.get(table, &Query::all().filter(filter))
    }

    fn find_first(&self, table: &str, filter: &dyn Fn(&Document) -> bool) -> Option<Document> {
        self.first(table, &Query::all().filter(filter))
    }
}

impl<T: AccessSource + ?Sized> AccessSource for &T {
    fn find(&self, table: &str, filter: &dyn Fn(&Document) -> bool) -> Vec<Document> {
        (**self).find(table, filter)
    }
}

impl<T: AccessSource + ?Sized> AccessSource for Arc<T> {
    fn find(&self, table: &str, filter: &dyn Fn(&Document) -> bool) -> Vec<Document> {
        (**self).find(table, filter)
    }
}
