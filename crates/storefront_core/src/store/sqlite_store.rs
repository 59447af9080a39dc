//! SQLite-backed document store.
//!
//! # Responsibility
//! - Persist documents as JSON bodies in the `documents` table.
//! - Keep the indexed `created_at` column in sync with each body's `createdAt`.
//!
//! # Invariants
//! - Every batch and every `update` runs in one `IMMEDIATE` transaction, so
//!   concurrent writers on other connections are serialized.
//! - A failed operation drops the transaction, which rolls back the batch.

use crate::model::document::{created_at_ms, DocKey, Document, Fields};
use crate::store::{
    DocumentStore, Mutation, Precondition, StoreError, StoreResult, WriteBatch, WriteOp,
};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};

/// Default per-batch operation limit, matching common document stores.
pub const DEFAULT_MAX_BATCH_OPS: usize = 500;
/// Smallest accepted limit; a final revert batch needs room for its control
/// operations plus at least one restored record.
pub const MIN_BATCH_OPS: usize = 8;

/// Document store over a migrated SQLite connection.
pub struct SqliteDocumentStore<'conn> {
    conn: &'conn Connection,
    max_batch_ops: usize,
}

impl<'conn> SqliteDocumentStore<'conn> {
    /// Wraps a connection returned by `open_db` or `open_db_in_memory`.
    pub fn new(conn: &'conn Connection) -> Self {
        Self {
            conn,
            max_batch_ops: DEFAULT_MAX_BATCH_OPS,
        }
    }

    /// Overrides the per-batch operation limit (raised to `MIN_BATCH_OPS`).
    pub fn with_max_batch_ops(mut self, max_batch_ops: usize) -> Self {
        self.max_batch_ops = max_batch_ops.max(MIN_BATCH_OPS);
        self
    }
}

impl DocumentStore for SqliteDocumentStore<'_> {
    fn get(&self, key: &DocKey) -> StoreResult<Option<Document>> {
        load_document(self.conn, key)
    }

    fn list(&self, collection: &str) -> StoreResult<Vec<Document>> {
        let mut stmt = self.conn.prepare(
            "SELECT doc_id, body
             FROM documents
             WHERE collection = ?1
             ORDER BY doc_id ASC;",
        )?;
        let rows = stmt.query([collection])?;
        let documents = collect_documents(rows)?;
        Ok(documents)
    }

    fn query_created_between(
        &self,
        collection: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> StoreResult<Vec<Document>> {
        let mut stmt = self.conn.prepare(
            "SELECT doc_id, body
             FROM documents
             WHERE collection = ?1
               AND created_at IS NOT NULL
               AND created_at BETWEEN ?2 AND ?3
             ORDER BY created_at ASC, doc_id ASC;",
        )?;
        let rows = stmt.query(params![collection, start_ms, end_ms])?;
        let documents = collect_documents(rows)?;
        Ok(documents)
    }

    fn commit(&self, batch: &WriteBatch) -> StoreResult<()> {
        if batch.len() > self.max_batch_ops {
            return Err(StoreError::BatchTooLarge {
                ops: batch.len(),
                limit: self.max_batch_ops,
            });
        }
        if batch.is_empty() {
            return Ok(());
        }
        for op in batch.ops() {
            op.key().validate()?;
        }

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        for op in batch.ops() {
            apply_op(&tx, op)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn update(
        &self,
        key: &DocKey,
        mutate: &mut dyn FnMut(Option<&Document>) -> Mutation,
    ) -> StoreResult<Option<Document>> {
        key.validate()?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let current = load_document(&tx, key)?;
        let stored = match mutate(current.as_ref()) {
            Mutation::Keep => current,
            Mutation::Put(fields) => {
                upsert(&tx, key, &fields)?;
                Some(Document::new(key.id.clone(), fields))
            }
        };
        tx.commit()?;
        Ok(stored)
    }

    fn max_batch_ops(&self) -> usize {
        self.max_batch_ops
    }
}

fn apply_op(tx: &Transaction<'_>, op: &WriteOp) -> StoreResult<()> {
    match op {
        WriteOp::Set { key, fields } => upsert(tx, key, fields),
        WriteOp::Create { key, fields } => {
            if document_exists(tx, key)? {
                return Err(StoreError::AlreadyExists(key.clone()));
            }
            upsert(tx, key, fields)
        }
        WriteOp::Delete { key } => {
            tx.execute(
                "DELETE FROM documents WHERE collection = ?1 AND doc_id = ?2;",
                params![key.collection, key.id],
            )?;
            Ok(())
        }
        WriteOp::Check { key, precondition } => check(tx, key, precondition),
    }
}

fn check(tx: &Transaction<'_>, key: &DocKey, precondition: &Precondition) -> StoreResult<()> {
    match precondition {
        Precondition::Exists => {
            if document_exists(tx, key)? {
                Ok(())
            } else {
                Err(StoreError::PreconditionFailed {
                    key: key.clone(),
                    reason: "document does not exist".to_string(),
                })
            }
        }
        Precondition::FieldEquals { field, value } => {
            let actual = load_document(tx, key)?.and_then(|doc| doc.fields.get(field).cloned());
            if actual.as_ref() == Some(value) {
                Ok(())
            } else {
                Err(StoreError::PreconditionFailed {
                    key: key.clone(),
                    reason: format!(
                        "field `{field}` expected `{value}`, found `{}`",
                        actual.map_or_else(|| "<missing>".to_string(), |v| v.to_string())
                    ),
                })
            }
        }
    }
}

fn upsert(conn: &Connection, key: &DocKey, fields: &Fields) -> StoreResult<()> {
    let body = serde_json::to_string(fields)?;
    conn.execute(
        "INSERT INTO documents (collection, doc_id, body, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, (strftime('%s', 'now') * 1000))
         ON CONFLICT (collection, doc_id) DO UPDATE SET
            body = excluded.body,
            created_at = excluded.created_at,
            updated_at = excluded.updated_at;",
        params![key.collection, key.id, body, created_at_ms(fields)],
    )?;
    Ok(())
}

fn document_exists(conn: &Connection, key: &DocKey) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM documents
            WHERE collection = ?1 AND doc_id = ?2
        );",
        params![key.collection, key.id],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn load_document(conn: &Connection, key: &DocKey) -> StoreResult<Option<Document>> {
    let body: Option<String> = conn
        .query_row(
            "SELECT body FROM documents WHERE collection = ?1 AND doc_id = ?2;",
            params![key.collection, key.id],
            |row| row.get(0),
        )
        .optional()?;

    body.map(|body| parse_body(&key.id, &body)).transpose()
}

fn collect_documents(mut rows: rusqlite::Rows<'_>) -> StoreResult<Vec<Document>> {
    let mut documents = Vec::new();
    while let Some(row) = rows.next()? {
        let id: String = row.get("doc_id")?;
        let body: String = row.get("body")?;
        documents.push(parse_body(&id, &body)?);
    }
    Ok(documents)
}

fn parse_body(id: &str, body: &str) -> StoreResult<Document> {
    let fields: Fields = serde_json::from_str(body).map_err(|err| {
        StoreError::InvalidData(format!("invalid body for document `{id}`: {err}"))
    })?;
    Ok(Document::new(id, fields))
}

#[cfg(test)]
mod tests {
    use super::{SqliteDocumentStore, MIN_BATCH_OPS};
    use crate::db::open_db_in_memory;
    use crate::model::document::DocKey;
    use crate::store::DocumentStore;

    #[test]
    fn max_batch_ops_is_raised_to_minimum() {
        let conn = open_db_in_memory().unwrap();
        let store = SqliteDocumentStore::new(&conn).with_max_batch_ops(0);
        assert_eq!(store.max_batch_ops(), MIN_BATCH_OPS);
        let store = SqliteDocumentStore::new(&conn).with_max_batch_ops(3);
        assert_eq!(store.max_batch_ops(), MIN_BATCH_OPS);
    }

    #[test]
    fn get_missing_document_returns_none() {
        let conn = open_db_in_memory().unwrap();
        let store = SqliteDocumentStore::new(&conn);
        assert!(store.get(&DocKey::new("orders", "nope")).unwrap().is_none());
    }
}
