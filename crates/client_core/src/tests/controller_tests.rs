use super::*;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use shared::{
    domain::{Member, MemberField, MemberId, MemberStatus, Registration, RegistrationFlag},
    protocol::MemberQuery,
};
use std::{
    collections::HashSet,
    sync::atomic::{AtomicBool, Ordering},
};
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Field(MemberId, MemberField, String),
    Flag(MemberId, RegistrationFlag, bool),
    Delete(MemberId),
}

#[derive(Default)]
struct FakeMembers {
    rows: Mutex<Vec<Member>>,
    calls: Mutex<Vec<Call>>,
    fetches: Mutex<u32>,
    failing_ids: HashSet<MemberId>,
    fail_fetch: AtomicBool,
}

impl FakeMembers {
    fn with_rows(rows: Vec<Member>) -> Self {
        Self {
            rows: Mutex::new(rows),
            ..Self::default()
        }
    }

    fn failing_for(mut self, id: &str) -> Self {
        self.failing_ids.insert(MemberId::from(id));
        self
    }

    fn check(&self, id: &MemberId) -> Result<()> {
        if self.failing_ids.contains(id) {
            return Err(anyhow!("member {id} is locked"));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordApi<Member> for FakeMembers {
    async fn fetch_list(&self, _filter: &MemberQuery) -> Result<Vec<Member>> {
        *self.fetches.lock().await += 1;
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(anyhow!("server unavailable"));
        }
        Ok(self.rows.lock().await.clone())
    }

    async fn update_field(&self, id: &MemberId, field: MemberField, value: &str) -> Result<()> {
        self.calls
            .lock()
            .await
            .push(Call::Field(id.clone(), field, value.to_string()));
        self.check(id)?;
        let mut rows = self.rows.lock().await;
        if let Some(row) = rows.iter_mut().find(|row| &row.id == id) {
            match field {
                MemberField::Status => row.status = value.parse()?,
                MemberField::Class => row.class = value.to_string(),
                MemberField::Group => row.group = Some(value.to_string()),
            }
        }
        Ok(())
    }

    async fn update_nested_flag(
        &self,
        id: &MemberId,
        flag: RegistrationFlag,
        value: bool,
    ) -> Result<()> {
        self.calls
            .lock()
            .await
            .push(Call::Flag(id.clone(), flag, value));
        self.check(id)?;
        let mut rows = self.rows.lock().await;
        if let Some(row) = rows.iter_mut().find(|row| &row.id == id) {
            row.registration.set(flag, value);
        }
        Ok(())
    }

    async fn delete_record(&self, id: &MemberId) -> Result<()> {
        self.calls.lock().await.push(Call::Delete(id.clone()));
        self.check(id)?;
        self.rows.lock().await.retain(|row| &row.id != id);
        Ok(())
    }
}

#[derive(Default)]
struct FakeAudit {
    entries: Mutex<Vec<(String, String, Value)>>,
    fail: bool,
}

#[async_trait]
impl AuditLog for FakeAudit {
    async fn log_action(&self, actor: &str, label: &str, details: Value) -> Result<()> {
        if self.fail {
            return Err(anyhow!("audit log offline"));
        }
        self.entries
            .lock()
            .await
            .push((actor.to_string(), label.to_string(), details));
        Ok(())
    }
}

fn member(id: &str, first: &str, group: &str) -> Member {
    Member {
        id: MemberId::from(id),
        first_name: first.into(),
        last_name: "Example".into(),
        group: Some(group.into()),
        class: "Juniors".into(),
        status: MemberStatus::Active,
        registration: Registration::default(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn roster() -> Vec<Member> {
    vec![
        member("a", "Ada", "Kestrels"),
        member("b", "Bea", "Kestrels"),
        member("c", "Cal", "Otters"),
    ]
}

async fn loaded(
    api: &Arc<FakeMembers>,
    audit: &Arc<FakeAudit>,
) -> ListController<Member> {
    let mut controller = ListController::<Member>::new(api.clone(), audit.clone(), "leader@club");
    controller.refresh().await.expect("initial load");
    controller
}

fn ids(raw: &[&str]) -> Vec<MemberId> {
    raw.iter().map(|id| MemberId::from(*id)).collect()
}

fn selected(controller: &ListController<Member>) -> Vec<MemberId> {
    controller.selection().iter().cloned().collect()
}

fn ready(gate: BulkGate<Member>) -> ConfirmedBulk<Member> {
    match gate {
        BulkGate::Ready(bulk) => bulk,
        BulkGate::NeedsConfirmation(pending) => {
            panic!("unexpected confirmation: {}", pending.prompt())
        }
    }
}

#[tokio::test]
async fn status_update_touches_each_selected_member_and_logs_once() {
    let api = Arc::new(FakeMembers::with_rows(roster()));
    let audit = Arc::new(FakeAudit::default());
    let mut controller = loaded(&api, &audit).await;

    controller.toggle_one(&MemberId::from("a"));
    controller.toggle_one(&MemberId::from("b"));

    let gate = controller
        .request_bulk(BulkOperation::set_field(MemberField::Status, "inactive"))
        .expect("selection is not empty");
    let report = controller
        .apply_bulk(ready(gate))
        .await
        .expect("bulk apply");

    assert_eq!(report.summary(), "2 of 2 succeeded");
    let calls = api.calls.lock().await.clone();
    assert_eq!(
        calls,
        vec![
            Call::Field(MemberId::from("a"), MemberField::Status, "inactive".into()),
            Call::Field(MemberId::from("b"), MemberField::Status, "inactive".into()),
        ]
    );

    let entries = audit.entries.lock().await.clone();
    assert_eq!(entries.len(), 1);
    let (actor, label, details) = &entries[0];
    assert_eq!(actor, "leader@club");
    assert_eq!(label, "Set status to inactive");
    assert_eq!(details["count"], 2);
    assert_eq!(details["target"], "member");
    assert_eq!(details["failed"], 0);

    assert!(controller.selection().is_empty());
    assert_eq!(*api.fetches.lock().await, 2);
    let statuses: Vec<_> = controller.records().iter().map(|m| m.status).collect();
    assert_eq!(
        statuses,
        vec![MemberStatus::Inactive, MemberStatus::Inactive, MemberStatus::Active]
    );
}

#[tokio::test]
async fn failures_are_counted_and_selection_still_clears() {
    let api = Arc::new(FakeMembers::with_rows(roster()).failing_for("b"));
    let audit = Arc::new(FakeAudit::default());
    let mut controller = loaded(&api, &audit).await;
    controller.toggle_all();

    let gate = controller
        .request_bulk(BulkOperation::set_field(MemberField::Class, "Seniors"))
        .expect("gate");
    let report = controller.apply_bulk(ready(gate)).await.expect("apply");

    assert_eq!(report.attempted(), 3);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.summary(), "2 of 3 succeeded");
    let failed: Vec<_> = report.failures().map(|o| o.id.clone()).collect();
    assert_eq!(failed, ids(&["b"]));

    let entries = audit.entries.lock().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].2["succeeded"], 2);
    assert_eq!(entries[0].2["failed"], 1);
    assert!(controller.selection().is_empty());
}

#[tokio::test]
async fn delete_waits_for_confirmation_and_declining_changes_nothing() {
    let api = Arc::new(FakeMembers::with_rows(roster()));
    let audit = Arc::new(FakeAudit::default());
    let mut controller = loaded(&api, &audit).await;
    controller.toggle_one(&MemberId::from("c"));

    let gate = controller
        .request_bulk(BulkOperation::delete())
        .expect("gate");
    let mut prompted = None;
    let declined = gate.resolve(|pending| {
        prompted = Some(pending.prompt());
        false
    });

    assert!(declined.is_none());
    assert_eq!(prompted.as_deref(), Some("Delete: 1 member?"));
    assert!(api.calls.lock().await.is_empty());
    assert!(audit.entries.lock().await.is_empty());
    assert_eq!(selected(&controller), ids(&["c"]));

    let gate = controller
        .request_bulk(BulkOperation::delete())
        .expect("gate");
    let confirmed = gate.resolve(|_| true).expect("confirmed");
    let report = controller.apply_bulk(confirmed).await.expect("apply");

    assert!(report.is_success());
    assert_eq!(controller.records().len(), 2);
    assert_eq!(audit.entries.lock().await[0].1, "Delete");
}

#[tokio::test]
async fn flag_update_prompts_with_nested_path() {
    let api = Arc::new(FakeMembers::with_rows(roster()));
    let audit = Arc::new(FakeAudit::default());
    let mut controller = loaded(&api, &audit).await;
    controller.toggle_one(&MemberId::from("a"));
    controller.toggle_one(&MemberId::from("c"));

    let gate = controller
        .request_bulk(BulkOperation::set_flag(RegistrationFlag::FeesPaid, true))
        .expect("gate");
    let BulkGate::NeedsConfirmation(pending) = gate else {
        panic!("flag updates must be confirmed");
    };
    assert_eq!(pending.prompt(), "Mark registration.feesPaid: 2 members?");
    assert_eq!(pending.ids(), ids(&["a", "c"]).as_slice());

    controller
        .apply_bulk(pending.confirm())
        .await
        .expect("apply");

    let paid: Vec<_> = controller
        .records()
        .iter()
        .filter(|m| m.registration.fees_paid)
        .map(|m| m.id.clone())
        .collect();
    assert_eq!(paid, ids(&["a", "c"]));
    assert_eq!(
        api.calls.lock().await[0],
        Call::Flag(MemberId::from("a"), RegistrationFlag::FeesPaid, true)
    );
}

#[tokio::test]
async fn empty_selection_is_rejected_before_any_call() {
    let api = Arc::new(FakeMembers::with_rows(roster()));
    let audit = Arc::new(FakeAudit::default());
    let controller = loaded(&api, &audit).await;

    let err = controller
        .request_bulk(BulkOperation::delete())
        .expect_err("nothing selected");
    assert_eq!(
        err,
        BulkError::EmptySelection {
            noun: "members".into()
        }
    );
    assert_eq!(err.to_string(), "no members selected");
    assert!(api.calls.lock().await.is_empty());
}

#[tokio::test]
async fn audit_failure_does_not_fail_the_bulk() {
    let api = Arc::new(FakeMembers::with_rows(roster()));
    let audit = Arc::new(FakeAudit {
        fail: true,
        ..FakeAudit::default()
    });
    let mut controller = loaded(&api, &audit).await;
    controller.toggle_one(&MemberId::from("a"));

    let gate = controller
        .request_bulk(BulkOperation::set_field(MemberField::Group, "Otters"))
        .expect("gate");
    let report = controller.apply_bulk(ready(gate)).await.expect("apply");

    assert!(report.is_success());
    assert!(controller.selection().is_empty());
    assert_eq!(controller.records()[0].group.as_deref(), Some("Otters"));
}

#[tokio::test]
async fn reload_failure_after_bulk_is_reported_with_selection_cleared() {
    let api = Arc::new(FakeMembers::with_rows(roster()));
    let audit = Arc::new(FakeAudit::default());
    let mut controller = loaded(&api, &audit).await;
    controller.toggle_one(&MemberId::from("b"));

    let gate = controller
        .request_bulk(BulkOperation::set_field(MemberField::Status, "pending"))
        .expect("gate");
    api.fail_fetch.store(true, Ordering::SeqCst);
    let err = controller
        .apply_bulk(ready(gate))
        .await
        .expect_err("reload fails");

    assert!(format!("{err:#}").contains("server unavailable"));
    assert!(controller.selection().is_empty());
    assert_eq!(audit.entries.lock().await.len(), 1);
}

#[tokio::test]
async fn refresh_drops_selected_ids_that_disappeared() {
    let api = Arc::new(FakeMembers::with_rows(roster()));
    let audit = Arc::new(FakeAudit::default());
    let mut controller = loaded(&api, &audit).await;
    controller.toggle_all();
    assert_eq!(controller.selection().len(), 3);

    api.rows.lock().await.retain(|row| row.id.as_str() != "b");
    controller.refresh().await.expect("refresh");

    assert_eq!(selected(&controller), ids(&["a", "c"]));
    assert_eq!(
        controller.header_state(),
        HeaderCheckboxState {
            checked: true,
            indeterminate: false,
        }
    );
}

#[tokio::test]
async fn filter_change_keeps_hidden_selection_until_toggle_all_replaces_it() {
    let api = Arc::new(FakeMembers::with_rows(roster()));
    let audit = Arc::new(FakeAudit::default());
    let mut controller = loaded(&api, &audit).await;
    controller.toggle_one(&MemberId::from("c"));

    controller.set_filter(MemberQuery {
        group: Some("kestrels".into()),
        ..MemberQuery::default()
    });
    assert_eq!(controller.visible_ids(), ids(&["a", "b"]));
    assert_eq!(selected(&controller), ids(&["c"]));
    assert_eq!(controller.header_state(), HeaderCheckboxState::default());

    controller.toggle_one(&MemberId::from("a"));
    assert_eq!(
        controller.header_state(),
        HeaderCheckboxState {
            checked: false,
            indeterminate: true,
        }
    );

    controller.toggle_all();
    assert_eq!(selected(&controller), ids(&["a", "b"]));

    controller.toggle_all();
    assert!(controller.selection().is_empty());
}

#[tokio::test]
async fn toggle_one_ignores_ids_that_are_not_loaded() {
    let api = Arc::new(FakeMembers::with_rows(roster()));
    let audit = Arc::new(FakeAudit::default());
    let mut controller = loaded(&api, &audit).await;

    assert!(!controller.toggle_one(&MemberId::from("ghost")));
    assert!(controller.selection().is_empty());

    assert!(controller.toggle_one(&MemberId::from("b")));
    assert!(!controller.toggle_one(&MemberId::from("b")));
    assert!(controller.selection().is_empty());
}

#[tokio::test]
async fn toggle_one_refuses_rows_hidden_by_the_filter() {
    let api = Arc::new(FakeMembers::with_rows(roster()));
    let audit = Arc::new(FakeAudit::default());
    let mut controller = loaded(&api, &audit).await;
    controller.set_filter(MemberQuery {
        group: Some("Kestrels".into()),
        ..MemberQuery::default()
    });

    assert!(!controller.toggle_one(&MemberId::from("c")));
    assert!(controller.selection().is_empty());
    let err = controller
        .request_bulk(BulkOperation::delete())
        .expect_err("hidden row must not be selectable");
    assert_eq!(err.to_string(), "no members selected");
    assert!(api.calls.lock().await.is_empty());
}

#[tokio::test]
async fn stale_pick_hidden_by_the_filter_can_still_be_unticked() {
    let api = Arc::new(FakeMembers::with_rows(roster()));
    let audit = Arc::new(FakeAudit::default());
    let mut controller = loaded(&api, &audit).await;
    assert!(controller.toggle_one(&MemberId::from("c")));

    controller.set_filter(MemberQuery {
        group: Some("Kestrels".into()),
        ..MemberQuery::default()
    });
    assert_eq!(selected(&controller), ids(&["c"]));

    assert!(!controller.toggle_one(&MemberId::from("c")));
    assert!(controller.selection().is_empty());
    assert!(!controller.toggle_one(&MemberId::from("c")));
    assert!(controller.selection().is_empty());
}

#[tokio::test]
async fn snapshot_follows_list_order_not_click_order() {
    let api = Arc::new(FakeMembers::with_rows(roster()));
    let audit = Arc::new(FakeAudit::default());
    let mut controller = loaded(&api, &audit).await;
    controller.toggle_one(&MemberId::from("c"));
    controller.toggle_one(&MemberId::from("a"));

    let bulk = ready(
        controller
            .request_bulk(BulkOperation::set_field(MemberField::Class, ""))
            .expect("gate"),
    );
    assert_eq!(bulk.ids(), ids(&["a", "c"]).as_slice());
    assert_eq!(bulk.operation().label, "Clear class");

    controller.clear_selection();
    assert!(controller.selection().is_empty());
    assert_eq!(bulk.count(), 2);
}
