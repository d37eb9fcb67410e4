//! Record store: summary upsert, detail merge, and item replacement.
//!
//! Holds a single connection for its whole lifetime; a worker creates one
//! of these at startup and drops it when it exits.

use std::collections::HashSet;

use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::{AsyncConnection, RunQueryDsl, SimpleAsyncConnection};
use tracing::{debug, warn};

use super::diesel_models::{
    NewRecordItem, NewRecordSummary, RecordDetailChangeset, RecordItemRow, RecordRow,
};
use super::pool::{AsyncSqliteConnection, AsyncSqlitePool, DieselError};
use super::util::{db_now, format_naive};
use crate::error::PersistenceError;
use crate::models::{Record, RecordDetail, RecordItem};
use crate::schema::{record_items, records};

/// Which ids of an upserted batch were new and which already existed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub new_ids: Vec<String>,
    pub updated_ids: Vec<String>,
}

impl UpsertOutcome {
    pub fn new_count(&self) -> u64 {
        self.new_ids.len() as u64
    }

    pub fn updated_count(&self) -> u64 {
        self.updated_ids.len() as u64
    }
}

pub struct DieselRecordRepository {
    conn: AsyncSqliteConnection,
}

impl DieselRecordRepository {
    /// Wrap an already-open connection.
    pub fn new(conn: AsyncSqliteConnection) -> Self {
        Self { conn }
    }

    /// Open a dedicated connection from the pool.
    pub async fn connect(pool: &AsyncSqlitePool) -> Result<Self, DieselError> {
        Ok(Self::new(pool.get().await?))
    }

    /// Upsert summary fields for a batch of records.
    ///
    /// Existing ids are looked up once for the whole batch, inside the same
    /// write transaction. On conflict the mutable summary fields and the
    /// owner are overwritten, `created_at` is kept and `updated_at` stamped.
    pub async fn upsert_summaries(
        &mut self,
        batch: &[Record],
    ) -> Result<UpsertOutcome, PersistenceError> {
        if batch.is_empty() {
            return Ok(UpsertOutcome::default());
        }

        self.conn.batch_execute("BEGIN IMMEDIATE").await?;
        let result = match self.upsert_in_transaction(batch).await {
            Ok(outcome) => self.conn.batch_execute("COMMIT").await.map(|()| outcome),
            Err(e) => Err(e),
        };

        match result {
            Ok(outcome) => {
                debug!(
                    "Upserted {} records ({} new, {} updated)",
                    batch.len(),
                    outcome.new_ids.len(),
                    outcome.updated_ids.len()
                );
                Ok(outcome)
            }
            Err(e) => {
                // A failed COMMIT leaves the transaction open.
                if let Err(rollback) = self.conn.batch_execute("ROLLBACK").await {
                    warn!("Rollback after failed upsert also failed: {}", rollback);
                }
                Err(e.into())
            }
        }
    }

    async fn upsert_in_transaction(&mut self, batch: &[Record]) -> Result<UpsertOutcome, DieselError> {
        let ids: Vec<&str> = batch.iter().map(|r| r.id.as_str()).collect();
        let existing: HashSet<String> = records::table
            .filter(records::id.eq_any(ids))
            .select(records::id)
            .load::<String>(&mut self.conn)
            .await?
            .into_iter()
            .collect();

        let now = db_now();
        let mut outcome = UpsertOutcome::default();
        let mut seen = HashSet::new();

        for record in batch {
            diesel::insert_into(records::table)
                .values(NewRecordSummary {
                    id: &record.id,
                    owner_id: &record.owner_id,
                    process_number: &record.process_number,
                    organization: &record.organization,
                    status: &record.status,
                    closing_date: record.closing_date.as_ref().map(format_naive),
                    summary_text: &record.summary_text,
                    modality: &record.modality,
                    created_at: &now,
                    updated_at: None,
                })
                .on_conflict(records::id)
                .do_update()
                .set((
                    records::owner_id.eq(excluded(records::owner_id)),
                    records::status.eq(excluded(records::status)),
                    records::closing_date.eq(excluded(records::closing_date)),
                    records::summary_text.eq(excluded(records::summary_text)),
                    records::modality.eq(excluded(records::modality)),
                    records::updated_at.eq(Some(now.as_str())),
                ))
                .execute(&mut self.conn)
                .await?;

            if !seen.insert(record.id.as_str()) {
                continue;
            }
            if existing.contains(&record.id) {
                outcome.updated_ids.push(record.id.clone());
            } else {
                outcome.new_ids.push(record.id.clone());
            }
        }

        Ok(outcome)
    }

    /// Merge drill-down fields into an existing record.
    ///
    /// Returns false when the record does not exist or there was nothing
    /// to merge.
    pub async fn merge_detail(
        &mut self,
        record_id: &str,
        detail: &RecordDetail,
    ) -> Result<bool, PersistenceError> {
        if detail.is_empty() {
            return Ok(false);
        }

        let now = db_now();
        let flags = if detail.flags.is_empty() {
            None
        } else {
            serde_json::to_string(&detail.flags).ok()
        };
        let changes = RecordDetailChangeset {
            description: detail.description.as_deref(),
            disclosure_window: detail.disclosure_window.as_deref(),
            dispute_mode: detail.dispute_mode.as_deref(),
            estimated_value: detail.estimated_value,
            flags,
            updated_at: Some(&now),
        };

        let rows = diesel::update(records::table.find(record_id))
            .set(&changes)
            .execute(&mut self.conn)
            .await?;

        Ok(rows > 0)
    }

    /// Replace the full item set of a record.
    ///
    /// The delete is committed on its own; the new items are inserted in one
    /// transaction. If the insert fails the record is left with no items and
    /// [`PersistenceError::ItemsLost`] is returned.
    pub async fn replace_items(
        &mut self,
        record_id: &str,
        items: &[RecordItem],
    ) -> Result<usize, PersistenceError> {
        diesel::delete(record_items::table.filter(record_items::record_id.eq(record_id)))
            .execute(&mut self.conn)
            .await?;

        if items.is_empty() {
            return Ok(0);
        }

        self.conn
            .transaction(|conn| {
                Box::pin(async move {
                    // SQLite has no DEFAULT keyword, so no batch insert.
                    for item in items {
                        diesel::insert_into(record_items::table)
                            .values(NewRecordItem {
                                record_id,
                                line_number: item.line_number,
                                code: &item.code,
                                description: &item.description,
                                unit: &item.unit,
                                quantity: item.quantity,
                                unit_value: item.unit_value,
                                total_value: item.total_value,
                                lot_id: item.lot_id.as_deref(),
                            })
                            .execute(conn)
                            .await?;
                    }
                    Ok::<usize, DieselError>(items.len())
                })
            })
            .await
            .map_err(|source| PersistenceError::ItemsLost {
                record_id: record_id.to_string(),
                source,
            })
    }

    pub async fn get(&mut self, record_id: &str) -> Result<Option<RecordRow>, DieselError> {
        records::table
            .find(record_id)
            .select(RecordRow::as_select())
            .first(&mut self.conn)
            .await
            .optional()
    }

    /// Items of a record in line order.
    pub async fn items(&mut self, record_id: &str) -> Result<Vec<RecordItemRow>, DieselError> {
        record_items::table
            .filter(record_items::record_id.eq(record_id))
            .order((record_items::line_number.asc(), record_items::id.asc()))
            .select(RecordItemRow::as_select())
            .load(&mut self.conn)
            .await
    }
}
