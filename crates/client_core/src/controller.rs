//! List screen controller: records, active filter, selection and bulk apply.

use std::{collections::HashSet, sync::Arc};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::{
    bulk::{self, BulkError, BulkGate, BulkOperation, BulkReport, ConfirmedBulk},
    record::Record,
    selection::{header_checkbox_state, HeaderCheckboxState, SelectionSet},
    AuditLog, RecordApi,
};

pub struct ListController<R: Record> {
    api: Arc<dyn RecordApi<R>>,
    audit: Arc<dyn AuditLog>,
    actor: String,
    records: Vec<R>,
    filter: R::Filter,
    selection: SelectionSet<R::Id>,
}

impl<R: Record> ListController<R> {
    pub fn new(
        api: Arc<dyn RecordApi<R>>,
        audit: Arc<dyn AuditLog>,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            api,
            audit,
            actor: actor.into(),
            records: Vec::new(),
            filter: R::Filter::default(),
            selection: SelectionSet::new(),
        }
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    /// Reloads every record. Selected ids that no longer exist are dropped.
    pub async fn refresh(&mut self) -> Result<()> {
        let records = self
            .api
            .fetch_list(&R::Filter::default())
            .await
            .with_context(|| format!("failed to load {}", R::noun(2)))?;
        self.replace_records(records);
        Ok(())
    }

    pub fn replace_records(&mut self, records: Vec<R>) {
        let existing: HashSet<&R::Id> = records.iter().map(Record::id).collect();
        let before = self.selection.len();
        self.selection.retain(|id| existing.contains(id));
        let pruned = before - self.selection.len();
        if pruned > 0 {
            debug!(pruned, "dropped selected ids missing after reload");
        }
        self.records = records;
    }

    pub fn records(&self) -> &[R] {
        &self.records
    }

    pub fn filter(&self) -> &R::Filter {
        &self.filter
    }

    /// Changing the filter keeps the selection; hidden picks stay selected until
    /// toggle-all replaces them or the selection is cleared.
    pub fn set_filter(&mut self, filter: R::Filter) {
        self.filter = filter;
    }

    pub fn visible(&self) -> impl Iterator<Item = &R> {
        self.records
            .iter()
            .filter(move |record| record.matches(&self.filter))
    }

    pub fn visible_ids(&self) -> Vec<R::Id> {
        self.visible().map(|record| record.id().clone()).collect()
    }

    pub fn selection(&self) -> &SelectionSet<R::Id> {
        &self.selection
    }

    /// Selected records in list order.
    pub fn selected_records(&self) -> Vec<&R> {
        self.records
            .iter()
            .filter(|record| self.selection.contains(record.id()))
            .collect()
    }

    pub fn header_state(&self) -> HeaderCheckboxState {
        header_checkbox_state(self.visible().map(Record::id), &self.selection)
    }

    pub fn toggle_all(&mut self) {
        let visible = self.visible_ids();
        self.selection.toggle_all(visible.iter());
    }

    /// Only visible rows can be newly selected; an already selected id can
    /// always be unticked, even when the filter now hides it.
    pub fn toggle_one(&mut self, id: &R::Id) -> bool {
        let visible = self.visible().any(|record| record.id() == id);
        if !visible && !self.selection.contains(id) {
            debug!(%id, "ignoring toggle for id outside the visible rows");
            return false;
        }
        self.selection.toggle_one(id)
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    /// Snapshots the selection for `operation`, gated behind confirmation when the
    /// operation deletes or flips flags.
    pub fn request_bulk(&self, operation: BulkOperation<R>) -> Result<BulkGate<R>, BulkError> {
        let ids: Vec<R::Id> = self
            .selected_records()
            .into_iter()
            .map(|record| record.id().clone())
            .collect();
        if ids.is_empty() {
            return Err(BulkError::EmptySelection {
                noun: R::noun(2),
            });
        }
        Ok(BulkGate::new(operation, ids))
    }

    /// Runs the operation against every snapshotted id and waits for all calls,
    /// then writes one audit entry, clears the selection and reloads.
    ///
    /// Per-record failures are reported in the returned [`BulkReport`]; the
    /// selection is cleared whatever they were.
    pub async fn apply_bulk(&mut self, bulk: ConfirmedBulk<R>) -> Result<BulkReport<R::Id>> {
        let report = bulk::execute(self.api.as_ref(), &bulk).await;

        for failure in report.failures() {
            warn!(
                id = %failure.id,
                error = failure.error.as_deref().unwrap_or_default(),
                label = %report.label,
                "bulk update failed for record"
            );
        }
        info!(
            actor = %self.actor,
            label = %report.label,
            attempted = report.attempted(),
            succeeded = report.succeeded(),
            "bulk operation finished"
        );

        if let Err(error) = self
            .audit
            .log_action(&self.actor, &report.label, report.audit_details(R::NOUN))
            .await
        {
            warn!(%error, label = %report.label, "failed to record bulk audit entry");
        }

        self.selection.clear();
        self.refresh()
            .await
            .context("reload after bulk operation failed")?;
        Ok(report)
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
