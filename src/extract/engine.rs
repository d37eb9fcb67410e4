//! Per-target extraction state machine.
//!
//! load listing → resolve columns → classify → upsert summaries →
//! drill into each classified record, one at a time.

use std::collections::HashMap;

use chrono::{Local, NaiveDateTime};
use tracing::{debug, info, warn};

use super::classify::should_explore;
use super::columns::{CandidateRecord, ColumnResolver};
use super::detail::{parse_description, parse_items, parse_metadata};
use crate::browser::{DetailPanel, PortalDriver, RowHandle, RowKey};
use crate::error::ExtractionError;
use crate::models::{record_id, Record, RecordDetail, RecordKeyScope, Target};
use crate::repository::DieselRecordRepository;

/// Session-wide settings the engine needs for every target.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    /// Drill into every record regardless of closing date.
    pub force: bool,
    pub key_scope: RecordKeyScope,
}

impl SessionContext {
    pub fn new(session_id: impl Into<String>, force: bool, key_scope: RecordKeyScope) -> Self {
        Self {
            session_id: session_id.into(),
            force,
            key_scope,
        }
    }
}

/// A drill-down step that failed for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrillFailure {
    pub record_id: String,
    /// `locate`, `open`, `close`, or a panel name.
    pub stage: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionResult {
    /// Distinct keyable records in the listing.
    pub found: u64,
    /// Candidates classified for drill-down.
    pub explored: u64,
    /// Line items extracted across all drill-downs.
    pub items: u64,
    pub new_records: u64,
    pub updated_records: u64,
    pub drill_failures: Vec<DrillFailure>,
}

pub struct ExtractionEngine<D: PortalDriver> {
    driver: D,
    records: DieselRecordRepository,
    resolver: ColumnResolver,
}

impl<D: PortalDriver> ExtractionEngine<D> {
    pub fn new(driver: D, records: DieselRecordRepository, resolver: ColumnResolver) -> Self {
        Self {
            driver,
            records,
            resolver,
        }
    }

    pub fn records(&mut self) -> &mut DieselRecordRepository {
        &mut self.records
    }

    /// Release the browser session.
    pub async fn shutdown(&mut self) {
        self.driver.shutdown().await;
    }

    /// Harvest one target.
    ///
    /// Failures while loading or parsing the listing, and failures writing
    /// the summaries, abort the target. Drill-down failures are collected
    /// in the result and never abort it.
    pub async fn extract(
        &mut self,
        ctx: &SessionContext,
        target: &Target,
    ) -> Result<ExtractionResult, ExtractionError> {
        let listing = self.driver.load_listing(target).await?;
        let candidates = self.resolver.resolve(&listing.body)?;
        debug!(
            "{}: {} candidates in listing generation {}",
            target.display_name,
            candidates.len(),
            listing.generation
        );

        // A row listed twice maps to one record; the last occurrence wins.
        let mut rows: Vec<(Record, RowHandle)> = Vec::with_capacity(candidates.len());
        let mut positions: HashMap<String, usize> = HashMap::new();
        for candidate in &candidates {
            let record = to_record(ctx.key_scope, target, candidate);
            let handle = RowHandle {
                index: candidate.row_index,
                key: RowKey::new(&candidate.process_number, &candidate.organization),
                generation: listing.generation,
            };
            match positions.get(&record.id).copied() {
                Some(at) => rows[at] = (record, handle),
                None => {
                    positions.insert(record.id.clone(), rows.len());
                    rows.push((record, handle));
                }
            }
        }
        if rows.len() < candidates.len() {
            debug!(
                "{}: {} duplicate listing rows merged",
                target.display_name,
                candidates.len() - rows.len()
            );
        }

        let now = harvest_now();
        let explore: Vec<(String, RowHandle)> = rows
            .iter()
            .filter(|(record, _)| should_explore(record.closing_date, ctx.force, now))
            .map(|(record, handle)| (record.id.clone(), handle.clone()))
            .collect();
        let batch: Vec<Record> = rows.into_iter().map(|(record, _)| record).collect();

        let outcome = self.records.upsert_summaries(&batch).await?;

        let mut result = ExtractionResult {
            found: batch.len() as u64,
            explored: explore.len() as u64,
            new_records: outcome.new_count(),
            updated_records: outcome.updated_count(),
            ..ExtractionResult::default()
        };

        for (record_id, handle) in explore {
            self.drill_down(&record_id, handle, &mut result).await;
        }

        if !result.drill_failures.is_empty() {
            warn!(
                "{}: {} drill-down steps failed",
                target.display_name,
                result.drill_failures.len()
            );
        }
        info!(
            "{}: found={} new={} updated={} explored={} items={}",
            target.display_name,
            result.found,
            result.new_records,
            result.updated_records,
            result.explored,
            result.items
        );
        Ok(result)
    }

    /// Open one record's detail view, read its panels, and close it again.
    async fn drill_down(&mut self, record_id: &str, handle: RowHandle, result: &mut ExtractionResult) {
        let fail = |result: &mut ExtractionResult, stage: &str, err: &dyn std::fmt::Display| {
            warn!("Drill-down of {} failed at {}: {}", record_id, stage, err);
            result.drill_failures.push(DrillFailure {
                record_id: record_id.to_string(),
                stage: stage.to_string(),
                message: err.to_string(),
            });
        };

        let row = match self.locate(handle).await {
            Ok(row) => row,
            Err(e) => return fail(result, "locate", &e),
        };

        if let Err(e) = self.driver.open_detail(&row).await {
            fail(result, "open", &e);
            // The view may be half open; try to get back to the listing.
            let _ = self.driver.close_detail().await;
            return;
        }

        let mut detail = RecordDetail::default();
        for panel in DetailPanel::ALL {
            let html = match self.driver.read_panel(panel).await {
                Ok(html) => html,
                Err(e) => {
                    fail(result, panel.as_str(), &e);
                    continue;
                }
            };
            match panel {
                DetailPanel::Description => detail.description = parse_description(&html),
                DetailPanel::Metadata => {
                    let metadata = parse_metadata(&html);
                    detail.disclosure_window = metadata.disclosure_window;
                    detail.dispute_mode = metadata.dispute_mode;
                    detail.estimated_value = metadata.estimated_value;
                    detail.flags = metadata.flags;
                }
                DetailPanel::Items => {
                    let items = parse_items(&html, record_id);
                    match self.records.replace_items(record_id, &items).await {
                        Ok(stored) => result.items += stored as u64,
                        Err(e) => fail(result, panel.as_str(), &e),
                    }
                }
            }
        }

        if let Err(e) = self.records.merge_detail(record_id, &detail).await {
            fail(result, "detail", &e);
        }

        if let Err(e) = self.driver.close_detail().await {
            fail(result, "close", &e);
        }
    }

    /// Reuse the captured handle while it is attached, else find the row by
    /// its process number and organization.
    async fn locate(&mut self, handle: RowHandle) -> Result<RowHandle, ExtractionError> {
        if self.driver.is_attached(&handle).await? {
            return Ok(handle);
        }
        debug!("Row handle for {} is stale, re-resolving", handle.key);
        self.driver.find_row(&handle.key).await?.ok_or_else(|| {
            ExtractionError::NavigationFailed(format!("Row {} not found in listing", handle.key))
        })
    }
}

fn to_record(scope: RecordKeyScope, target: &Target, candidate: &CandidateRecord) -> Record {
    Record {
        id: record_id(
            scope,
            &target.id,
            &candidate.organization,
            &candidate.process_number,
        ),
        owner_id: target.id.clone(),
        process_number: candidate.process_number.clone(),
        organization: candidate.organization.clone(),
        status: candidate.status.clone(),
        closing_date: candidate.closing_date,
        summary_text: candidate.summary_text.clone(),
        modality: candidate.modality.clone(),
    }
}

/// Local wall-clock time used for drill-down classification.
pub fn harvest_now() -> NaiveDateTime {
    Local::now().naive_local()
}
