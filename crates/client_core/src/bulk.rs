//! Bulk operations over a selection: labelling, confirmation gating and the
//! per-record outcome accumulator.

use futures::future::join_all;
use serde_json::json;
use thiserror::Error;

use crate::{record::Record, RecordApi};

#[derive(Debug, Clone)]
pub enum BulkMutation<R: Record> {
    SetField { field: R::Field, value: String },
    SetFlag { flag: R::Flag, value: bool },
    Delete,
}

#[derive(Debug, Clone)]
pub struct BulkOperation<R: Record> {
    pub mutation: BulkMutation<R>,
    pub label: String,
}

impl<R: Record> BulkOperation<R> {
    pub fn set_field(field: R::Field, value: impl Into<String>) -> Self {
        let value = value.into();
        let label = if value.trim().is_empty() {
            format!("Clear {field}")
        } else {
            format!("Set {field} to {value}")
        };
        Self {
            mutation: BulkMutation::SetField { field, value },
            label,
        }
    }

    pub fn set_flag(flag: R::Flag, value: bool) -> Self {
        let verb = if value { "Mark" } else { "Unmark" };
        Self {
            mutation: BulkMutation::SetFlag { flag, value },
            label: format!("{verb} {}", R::flag_path(flag)),
        }
    }

    pub fn delete() -> Self {
        Self {
            mutation: BulkMutation::Delete,
            label: "Delete".to_string(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Deletes and flag flips must be confirmed before they run.
    pub fn requires_confirmation(&self) -> bool {
        matches!(
            self.mutation,
            BulkMutation::SetFlag { .. } | BulkMutation::Delete
        )
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BulkError {
    #[error("no {noun} selected")]
    EmptySelection { noun: String },
}

/// Result of asking to run a bulk operation against the current selection.
#[derive(Debug)]
pub enum BulkGate<R: Record> {
    Ready(ConfirmedBulk<R>),
    NeedsConfirmation(PendingConfirmation<R>),
}

impl<R: Record> BulkGate<R> {
    pub(crate) fn new(operation: BulkOperation<R>, ids: Vec<R::Id>) -> Self {
        if operation.requires_confirmation() {
            Self::NeedsConfirmation(PendingConfirmation { operation, ids })
        } else {
            Self::Ready(ConfirmedBulk { operation, ids })
        }
    }

    /// Resolves the gate, consulting `confirm` only when confirmation is required.
    pub fn resolve(
        self,
        confirm: impl FnOnce(&PendingConfirmation<R>) -> bool,
    ) -> Option<ConfirmedBulk<R>> {
        match self {
            Self::Ready(bulk) => Some(bulk),
            Self::NeedsConfirmation(pending) => {
                if confirm(&pending) {
                    Some(pending.confirm())
                } else {
                    None
                }
            }
        }
    }
}

#[derive(Debug)]
pub struct PendingConfirmation<R: Record> {
    operation: BulkOperation<R>,
    ids: Vec<R::Id>,
}

impl<R: Record> PendingConfirmation<R> {
    pub fn count(&self) -> usize {
        self.ids.len()
    }

    pub fn label(&self) -> &str {
        &self.operation.label
    }

    pub fn ids(&self) -> &[R::Id] {
        &self.ids
    }

    pub fn prompt(&self) -> String {
        format!(
            "{}: {} {}?",
            self.operation.label,
            self.count(),
            R::noun(self.count())
        )
    }

    pub fn confirm(self) -> ConfirmedBulk<R> {
        ConfirmedBulk {
            operation: self.operation,
            ids: self.ids,
        }
    }
}

/// A bulk operation cleared to run, with the ids it will touch fixed.
#[derive(Debug)]
pub struct ConfirmedBulk<R: Record> {
    operation: BulkOperation<R>,
    ids: Vec<R::Id>,
}

impl<R: Record> ConfirmedBulk<R> {
    pub fn count(&self) -> usize {
        self.ids.len()
    }

    pub fn operation(&self) -> &BulkOperation<R> {
        &self.operation
    }

    pub fn ids(&self) -> &[R::Id] {
        &self.ids
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkOutcome<Id> {
    pub id: Id,
    pub error: Option<String>,
}

impl<Id> BulkOutcome<Id> {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// One outcome per record, in the order the ids were selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkReport<Id> {
    pub label: String,
    pub outcomes: Vec<BulkOutcome<Id>>,
}

impl<Id> BulkReport<Id> {
    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.attempted() - self.succeeded()
    }

    pub fn failures(&self) -> impl Iterator<Item = &BulkOutcome<Id>> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    pub fn summary(&self) -> String {
        format!("{} of {} succeeded", self.succeeded(), self.attempted())
    }

    pub fn audit_details(&self, noun: &str) -> serde_json::Value {
        json!({
            "target": noun,
            "count": self.attempted(),
            "succeeded": self.succeeded(),
            "failed": self.failed(),
        })
    }
}

/// Issues every per-record call concurrently and waits for all of them.
pub(crate) async fn execute<R: Record>(
    api: &dyn RecordApi<R>,
    bulk: &ConfirmedBulk<R>,
) -> BulkReport<R::Id> {
    let mutation = &bulk.operation.mutation;
    let calls = bulk.ids.iter().map(|id| async move {
        let result = match mutation {
            BulkMutation::SetField { field, value } => api.update_field(id, *field, value).await,
            BulkMutation::SetFlag { flag, value } => {
                api.update_nested_flag(id, *flag, *value).await
            }
            BulkMutation::Delete => api.delete_record(id).await,
        };
        BulkOutcome {
            id: id.clone(),
            error: result.err().map(|err| format!("{err:#}")),
        }
    });

    BulkReport {
        label: bulk.operation.label.clone(),
        outcomes: join_all(calls).await,
    }
}

#[cfg(test)]
#[path = "tests/bulk_tests.rs"]
mod tests;
