mod common;

use chrono::{Datelike, Weekday};
use common::{at, monthly, Harness, CLIENT};
use freebill_core::{ClientId, ContractId, TemplateId};
use freebill_recurring::collaborators::{ClientRecord, ContractRecord};
use freebill_recurring::{Frequency, NewTemplate, RecurringError, SelectMode, TemplateStatus};

fn new_template() -> NewTemplate {
    NewTemplate {
        client_id: ClientId::from(CLIENT),
        contract_id: None,
        amount_cents: 1000_00,
        currency: "usd".to_string(),
        description: "  Support retainer ".to_string(),
        frequency: Frequency::Monthly,
        day_of_month: 15,
        day_of_week: Weekday::Mon,
        start: None,
        auto_pdf: false,
        auto_send: false,
        email_app: None,
    }
}

#[tokio::test]
async fn create_normalizes_and_schedules_from_now() {
    let h = Harness::new();
    let t = h
        .manager
        .create_at(new_template(), at(2024, 3, 16))
        .await
        .unwrap();

    assert_eq!(t.status(), TemplateStatus::Active);
    assert_eq!(t.currency, "USD");
    assert_eq!(t.description, "Support retainer");
    assert_eq!(t.generated_count, 0);
    assert_eq!(t.next_generation_date.date_naive(), at(2024, 4, 15).date_naive());
    assert_eq!(h.manager.get(&t.id).unwrap(), t);
}

#[tokio::test]
async fn create_clamps_day_of_month() {
    let h = Harness::new();
    let mut new = new_template();
    new.day_of_month = 31;
    let t = h.manager.create_at(new, at(2024, 1, 15)).await.unwrap();

    assert_eq!(t.day_of_month, 28);
    assert_eq!(t.next_generation_date.day(), 28);
    assert_eq!(t.next_generation_date.month(), 2);
}

#[tokio::test]
async fn explicit_start_is_the_first_due_date() {
    let h = Harness::new();
    let mut new = new_template();
    new.start = Some(at(2024, 3, 1));
    let t = h.manager.create_at(new, at(2024, 3, 16)).await.unwrap();

    assert_eq!(t.next_generation_date, at(2024, 3, 1));
    let due = h.store_select(SelectMode::OnlyDue, at(2024, 3, 16));
    assert_eq!(due, vec![t.id]);
}

#[tokio::test]
async fn create_rejects_invalid_input() {
    let h = Harness::new();
    let now = at(2024, 3, 16);

    let mut zero = new_template();
    zero.amount_cents = 0;
    assert!(matches!(
        h.manager.create_at(zero, now).await,
        Err(RecurringError::InvalidTemplate(_))
    ));

    let mut currency = new_template();
    currency.currency = "DOLLARS".to_string();
    assert!(matches!(
        h.manager.create_at(currency, now).await,
        Err(RecurringError::InvalidTemplate(_))
    ));

    let mut blank = new_template();
    blank.description = "   ".to_string();
    assert!(matches!(
        h.manager.create_at(blank, now).await,
        Err(RecurringError::InvalidTemplate(_))
    ));

    let mut stranger = new_template();
    stranger.client_id = ClientId::from("nobody");
    assert!(matches!(
        h.manager.create_at(stranger, now).await,
        Err(RecurringError::ClientNotFound { .. })
    ));

    assert!(h.manager.list().unwrap().templates.is_empty());
}

#[tokio::test]
async fn contract_must_belong_to_the_client() {
    let h = Harness::new();
    h.book
        .upsert_client(&ClientRecord {
            id: ClientId::from("client-other"),
            name: "Other Ltd".to_string(),
            email: None,
        })
        .unwrap();
    h.book
        .upsert_contract(&ContractRecord {
            id: ContractId::from("contract-mine"),
            client_id: ClientId::from(CLIENT),
            name: "Support".to_string(),
        })
        .unwrap();
    h.book
        .upsert_contract(&ContractRecord {
            id: ContractId::from("contract-theirs"),
            client_id: ClientId::from("client-other"),
            name: "Hosting".to_string(),
        })
        .unwrap();
    let now = at(2024, 3, 16);

    let mut mine = new_template();
    mine.contract_id = Some(ContractId::from("contract-mine"));
    let t = h.manager.create_at(mine, now).await.unwrap();
    assert_eq!(t.contract_id, Some(ContractId::from("contract-mine")));

    let mut theirs = new_template();
    theirs.contract_id = Some(ContractId::from("contract-theirs"));
    assert!(matches!(
        h.manager.create_at(theirs, now).await,
        Err(RecurringError::InvalidTemplate(_))
    ));

    let mut missing = new_template();
    missing.contract_id = Some(ContractId::from("contract-void"));
    assert!(matches!(
        h.manager.create_at(missing, now).await,
        Err(RecurringError::InvalidTemplate(_))
    ));
}

#[tokio::test]
async fn pause_freezes_next_date_and_hides_from_selection() {
    let h = Harness::new();
    let t = monthly(at(2024, 3, 10), 10, 100_00);
    h.insert(&t);

    let paused = h.manager.pause_at(&t.id, at(2024, 3, 11)).unwrap();
    assert_eq!(paused.status(), TemplateStatus::Paused);
    assert_eq!(paused.next_generation_date, t.next_generation_date);

    assert!(h.store_select(SelectMode::OnlyDue, at(2024, 3, 16)).is_empty());
    assert!(h.store_select(SelectMode::All, at(2024, 3, 16)).is_empty());

    // Pausing again is a no-op.
    let again = h.manager.pause_at(&t.id, at(2024, 3, 12)).unwrap();
    assert_eq!(again.updated_at, paused.updated_at);
}

#[tokio::test]
async fn resume_recomputes_from_the_resume_instant() {
    let h = Harness::new();
    let t = monthly(at(2024, 1, 10), 10, 100_00);
    h.insert(&t);
    h.manager.pause_at(&t.id, at(2024, 1, 11)).unwrap();

    let resumed_at = at(2025, 6, 20);
    let resumed = h.manager.resume_at(&t.id, resumed_at).unwrap();

    assert_eq!(resumed.status(), TemplateStatus::Active);
    assert!(resumed.next_generation_date >= resumed_at);
    assert_eq!(resumed.next_generation_date.date_naive(), at(2025, 7, 10).date_naive());
    assert_eq!(resumed.generated_count, 0);
    assert!(h.store_select(SelectMode::OnlyDue, resumed_at).is_empty());
}

#[tokio::test]
async fn resuming_an_active_template_keeps_its_date() {
    let h = Harness::new();
    let t = monthly(at(2024, 3, 10), 10, 100_00);
    h.insert(&t);

    let same = h.manager.resume_at(&t.id, at(2024, 5, 1)).unwrap();
    assert_eq!(same.next_generation_date, t.next_generation_date);
}

#[tokio::test]
async fn unknown_ids_are_reported() {
    let h = Harness::new();
    let id = TemplateId::from("does-not-exist");

    assert!(matches!(h.manager.pause(&id), Err(RecurringError::TemplateNotFound { .. })));
    assert!(matches!(h.manager.resume(&id), Err(RecurringError::TemplateNotFound { .. })));
    assert!(matches!(h.manager.delete(&id), Err(RecurringError::TemplateNotFound { .. })));
}

#[tokio::test]
async fn list_includes_paused_templates() {
    let h = Harness::new();
    let a = monthly(at(2024, 3, 10), 10, 100_00);
    let mut b = monthly(at(2024, 2, 10), 10, 100_00);
    b.active = false;
    h.insert(&a);
    h.insert(&b);

    let listing = h.manager.list().unwrap();
    assert_eq!(listing.skipped, 0);
    let ids: Vec<_> = listing.templates.iter().map(|t| t.id.clone()).collect();
    assert_eq!(ids, vec![b.id, a.id]);
}
