//! Embedded SQLite store backend.
//!
//! # Responsibility
//! - Persist customers and invoices in a local transactional database.
//! - Offer native multi-record deletes for the cascade coordinator.
//!
//! # Invariants
//! - Records are keyed by id; invoices carry a secondary index on
//!   `customer_id`.
//! - Invoice creation checks the owning customer inside the same
//!   transaction as the insert.
//! - Blocking SQLite work never runs on the async executor threads.

use crate::db::{open_db, open_db_in_memory, DbError, DbResult};
use crate::model::customer::{validate_customer_name, Customer, CustomerId};
use crate::model::invoice::{Invoice, InvoiceFields, InvoiceId, LineItem};
use crate::model::photo::Photo;
use crate::model::validation::ValidationError;
use crate::store::{
    ensure_same_owner, now_epoch_ms, Deletion, Entity, StoreAdapter, StoreError, StoreResult,
    TransactionalStore, TreeDeletion,
};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::fmt::Display;
use std::path::Path;
use std::sync::{Arc, Mutex};

const INVOICE_SELECT_SQL: &str = "SELECT
    id,
    customer_id,
    title,
    date,
    amount,
    items_json,
    photo
FROM invoices";

/// SQLite-backed store adapter.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Wraps a connection that already has migrations applied.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Opens (or creates) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        open_db(path).map(Self::new)
    }

    pub fn open_in_memory() -> DbResult<Self> {
        open_db_in_memory().map(Self::new)
    }

    async fn run<T, F>(&self, work: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Unavailable("sqlite connection lock poisoned".to_string()))?;
            work(&mut guard)
        })
        .await
        .map_err(|err| StoreError::Unavailable(format!("sqlite worker failed: {err}")))?
    }
}

#[async_trait]
impl StoreAdapter for SqliteStore {
    fn backend_tag(&self) -> &'static str {
        "sqlite"
    }

    async fn list_customers(&self) -> StoreResult<Vec<Customer>> {
        self.run(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, name, created_at FROM customers ORDER BY id ASC;")?;
            let mut rows = stmt.query([])?;
            let mut customers = Vec::new();
            while let Some(row) = rows.next()? {
                customers.push(parse_customer_row(row)?);
            }
            Ok(customers)
        })
        .await
    }

    async fn create_customer(&self, name: &str) -> StoreResult<Customer> {
        let name = validate_customer_name(name)?;
        self.run(move |conn| {
            let created_at = now_epoch_ms();
            conn.execute(
                "INSERT INTO customers (name, created_at) VALUES (?1, ?2);",
                params![name.as_str(), created_at],
            )?;
            Ok(Customer {
                id: conn.last_insert_rowid(),
                name,
                created_at,
            })
        })
        .await
    }

    async fn delete_customer(&self, id: CustomerId) -> StoreResult<Deletion> {
        self.run(move |conn| {
            let changed = conn.execute("DELETE FROM customers WHERE id = ?1;", [id])?;
            Ok(Deletion::from_changed_rows(changed))
        })
        .await
    }

    async fn list_invoices(&self, customer_id: CustomerId) -> StoreResult<Vec<Invoice>> {
        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "{INVOICE_SELECT_SQL} WHERE customer_id = ?1 ORDER BY id ASC;"
            ))?;
            let mut rows = stmt.query([customer_id])?;
            let mut invoices = Vec::new();
            while let Some(row) = rows.next()? {
                invoices.push(parse_invoice_row(row)?);
            }
            Ok(invoices)
        })
        .await
    }

    async fn get_invoice(&self, id: InvoiceId) -> StoreResult<Invoice> {
        self.run(move |conn| {
            load_invoice(conn, id)?.ok_or(StoreError::not_found(Entity::Invoice, id))
        })
        .await
    }

    async fn create_invoice(&self, fields: &InvoiceFields) -> StoreResult<Invoice> {
        let fields = fields.clone();
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            if !customer_exists(&tx, fields.customer_id)? {
                return Err(ValidationError::UnknownCustomer(fields.customer_id).into());
            }

            let items_json = encode_items(&fields.items)?;
            let photo = fields.photo.as_ref().map(Photo::to_wire);
            tx.execute(
                "INSERT INTO invoices (
                    customer_id,
                    title,
                    date,
                    amount,
                    items_json,
                    photo
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
                params![
                    fields.customer_id,
                    fields.title.as_str(),
                    fields.date.as_str(),
                    fields.amount,
                    items_json,
                    photo,
                ],
            )?;
            let id = tx.last_insert_rowid();
            tx.commit()?;

            Ok(Invoice::from_fields(id, fields))
        })
        .await
    }

    async fn update_invoice(
        &self,
        id: InvoiceId,
        fields: &InvoiceFields,
    ) -> StoreResult<Invoice> {
        let fields = fields.clone();
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let stored_owner: Option<CustomerId> = tx
                .query_row(
                    "SELECT customer_id FROM invoices WHERE id = ?1;",
                    [id],
                    |row| row.get(0),
                )
                .optional()?;
            let stored_owner = stored_owner.ok_or(StoreError::not_found(Entity::Invoice, id))?;
            ensure_same_owner(id, stored_owner, &fields)?;

            let items_json = encode_items(&fields.items)?;
            let photo = fields.photo.as_ref().map(Photo::to_wire);
            tx.execute(
                "UPDATE invoices
                 SET
                    title = ?2,
                    date = ?3,
                    amount = ?4,
                    items_json = ?5,
                    photo = ?6,
                    updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?1;",
                params![
                    id,
                    fields.title.as_str(),
                    fields.date.as_str(),
                    fields.amount,
                    items_json,
                    photo,
                ],
            )?;
            tx.commit()?;

            Ok(Invoice::from_fields(id, fields))
        })
        .await
    }

    async fn delete_invoice(&self, id: InvoiceId) -> StoreResult<Deletion> {
        self.run(move |conn| {
            let changed = conn.execute("DELETE FROM invoices WHERE id = ?1;", [id])?;
            Ok(Deletion::from_changed_rows(changed))
        })
        .await
    }

    fn transactional(&self) -> Option<&dyn TransactionalStore> {
        Some(self)
    }
}

#[async_trait]
impl TransactionalStore for SqliteStore {
    async fn delete_customer_tree(
        &self,
        customer_id: CustomerId,
        invoice_ids: &[InvoiceId],
    ) -> StoreResult<TreeDeletion> {
        let invoice_ids = invoice_ids.to_vec();
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let mut removed_invoice_ids = Vec::with_capacity(invoice_ids.len());

            for invoice_id in invoice_ids {
                let changed = tx.execute(
                    "DELETE FROM invoices WHERE id = ?1 AND customer_id = ?2;",
                    params![invoice_id, customer_id],
                )?;
                if changed > 0 {
                    removed_invoice_ids.push(invoice_id);
                }
            }

            // Rows written after the caller listed the invoices.
            let mut stmt =
                tx.prepare("SELECT id FROM invoices WHERE customer_id = ?1 ORDER BY id ASC;")?;
            let stragglers = stmt
                .query_map([customer_id], |row| row.get::<_, InvoiceId>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            drop(stmt);
            if !stragglers.is_empty() {
                tx.execute("DELETE FROM invoices WHERE customer_id = ?1;", [customer_id])?;
                removed_invoice_ids.extend(stragglers);
            }

            let changed = tx.execute("DELETE FROM customers WHERE id = ?1;", [customer_id])?;
            tx.commit()?;

            Ok(TreeDeletion {
                customer: Deletion::from_changed_rows(changed),
                removed_invoice_ids,
            })
        })
        .await
    }
}

fn customer_exists(conn: &Connection, id: CustomerId) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM customers WHERE id = ?1);",
        [id],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn load_invoice(conn: &Connection, id: InvoiceId) -> StoreResult<Option<Invoice>> {
    let mut stmt = conn.prepare(&format!("{INVOICE_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([id])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_invoice_row(row)?));
    }
    Ok(None)
}

fn parse_customer_row(row: &Row<'_>) -> StoreResult<Customer> {
    Ok(Customer {
        id: row.get("id")?,
        name: row.get("name")?,
        created_at: row.get("created_at")?,
    })
}

fn parse_invoice_row(row: &Row<'_>) -> StoreResult<Invoice> {
    let id: InvoiceId = row.get("id")?;
    let items_json: String = row.get("items_json")?;
    let items: Vec<LineItem> = serde_json::from_str(&items_json)
        .map_err(|err| corrupt_invoice(id, "items_json", err))?;
    let photo_text: Option<String> = row.get("photo")?;
    let photo = Photo::from_wire_opt(photo_text.as_deref())
        .map_err(|err| corrupt_invoice(id, "photo", err))?;

    Ok(Invoice {
        id,
        customer_id: row.get("customer_id")?,
        title: row.get("title")?,
        date: row.get("date")?,
        amount: row.get("amount")?,
        items,
        photo,
    })
}

fn corrupt_invoice(id: InvoiceId, column: &'static str, err: impl Display) -> StoreError {
    DbError::CorruptRow {
        table: "invoices",
        id,
        column,
        details: err.to_string(),
    }
    .into()
}

fn encode_items(items: &[LineItem]) -> StoreResult<String> {
    serde_json::to_string(items)
        .map_err(|err| StoreError::InvalidData(format!("items encode failed: {err}")))
}

#[cfg(test)]
mod tests {
    use super::SqliteStore;
    use crate::db::open_db_in_memory;
    use crate::model::invoice::InvoiceDraft;
    use crate::store::{Deletion, StoreAdapter, StoreError, TransactionalStore};

    #[tokio::test]
    async fn tree_delete_sweeps_invoices_missing_from_the_listed_ids() {
        let store = SqliteStore::open_in_memory().unwrap();
        let customer = store.create_customer("Acme").await.unwrap();
        let listed = store
            .create_invoice(&InvoiceDraft::for_customer(customer.id).normalize().unwrap())
            .await
            .unwrap();
        let late = store
            .create_invoice(&InvoiceDraft::for_customer(customer.id).normalize().unwrap())
            .await
            .unwrap();

        let outcome = store
            .delete_customer_tree(customer.id, &[listed.id])
            .await
            .unwrap();

        assert_eq!(outcome.customer, Deletion::Removed);
        assert_eq!(outcome.removed_invoice_ids, vec![listed.id, late.id]);
        assert!(store.list_invoices(customer.id).await.unwrap().is_empty());
        assert!(store.list_customers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn tree_delete_ignores_ids_owned_by_other_customers() {
        let store = SqliteStore::open_in_memory().unwrap();
        let acme = store.create_customer("Acme").await.unwrap();
        let other = store.create_customer("Globex").await.unwrap();
        let foreign = store
            .create_invoice(&InvoiceDraft::for_customer(other.id).normalize().unwrap())
            .await
            .unwrap();

        let outcome = store
            .delete_customer_tree(acme.id, &[foreign.id])
            .await
            .unwrap();

        assert!(outcome.removed_invoice_ids.is_empty());
        assert_eq!(store.get_invoice(foreign.id).await.unwrap(), foreign);
    }

    #[tokio::test]
    async fn undecodable_items_surface_as_invalid_data() {
        let conn = open_db_in_memory().unwrap();
        conn.execute_batch(
            "INSERT INTO customers (id, name, created_at) VALUES (1, 'Acme', 0);
             INSERT INTO invoices (id, customer_id, title, date, items_json)
             VALUES (9, 1, 'Service', '2024-05-01', 'not json');",
        )
        .unwrap();
        let store = SqliteStore::new(conn);

        let err = store.get_invoice(9).await.unwrap_err();
        match err {
            StoreError::InvalidData(message) => {
                assert!(message.contains("invoices.items_json in row 9"));
            }
            other => panic!("expected invalid data, got {other:?}"),
        }
    }
}
