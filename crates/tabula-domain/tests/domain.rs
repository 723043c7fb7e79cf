//! Domain tables, typed hooks and rules against in-memory `SQLite`.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    clippy::arithmetic_side_effects,
    clippy::indexing_slicing
)]

use std::sync::{Arc, Mutex};

use tabula_domain::{
    Account, DomainHooks, Invoice, InvoiceStatus, MemberRole, Organisation, OrganisationId,
    OrganisationMember, Plan, RuleViolation, Table, bootstrap, rules,
};
use chrono::{TimeDelta, TimeZone, Utc};
use tabula_store::{
    EventKind, Filter, FilterExpression, Operator, Record, SqliteBackend, Store, StoreError,
};

struct Fixture {
    store: Store,
    domain: DomainHooks,
    accounts: Table<Account>,
    organisations: Table<Organisation>,
    members: Table<OrganisationMember>,
    invoices: Table<Invoice>,
}

async fn fixture() -> Fixture {
    let backend = SqliteBackend::in_memory().await.expect("open sqlite");
    let store = Store::with_backend(Arc::new(backend)).build();
    bootstrap(&store).await.expect("bootstrap");
    let domain = DomainHooks::attached_to(store.hooks());
    rules::install(&domain);
    Fixture {
        accounts: Table::new(&store).expect("accounts"),
        organisations: Table::new(&store).expect("organisations"),
        members: Table::new(&store).expect("members"),
        invoices: Table::new(&store).expect("invoices"),
        store,
        domain,
    }
}

fn violation(err: &StoreError) -> Option<RuleViolation> {
    err.hook_error()
        .and_then(|e| e.downcast_ref::<RuleViolation>())
        .cloned()
}

#[tokio::test]
async fn bootstrap_is_idempotent() {
    let f = fixture().await;
    bootstrap(&f.store).await.expect("second bootstrap");
}

#[tokio::test]
async fn typed_round_trip_fills_in_ids_and_timestamps() {
    let f = fixture().await;
    let mut org = Organisation::new("Acme", "acme");
    org.plan = Plan::Pro;
    org.seats = 5;
    org.settings = Some(serde_json::json!({"sso": true}));

    let created = f.organisations.create(&org).await.expect("create");
    assert!(!created.id.is_empty());
    assert!(created.created_at.is_some());
    assert_eq!(created.plan, Plan::Pro);
    assert_eq!(created.settings, org.settings);

    let fetched = f.organisations.get(created.id.as_str()).await.expect("get");
    assert_eq!(fetched, created);

    let found = f
        .organisations
        .find_one(Filter::new().eq("slug", "acme"))
        .await
        .expect("find_one");
    assert_eq!(found.id, created.id);
}

#[tokio::test]
async fn typed_hooks_run_after_generic_hooks() {
    let f = fixture().await;
    let order = Arc::new(Mutex::new(Vec::new()));

    let generic = order.clone();
    f.store.hooks().before_create.add(move |event| {
        let generic = generic.clone();
        async move {
            generic.lock().unwrap().push(format!("generic:{}", event.table));
            Ok(())
        }
    });
    let typed = order.clone();
    f.domain.accounts.before_create.add(move |event| {
        let typed = typed.clone();
        async move {
            typed.lock().unwrap().push(format!("typed:{}", event.record.email));
            Ok(())
        }
    });

    f.accounts
        .create(&Account::new("ada@example.com", "Ada"))
        .await
        .expect("create");
    assert_eq!(
        *order.lock().unwrap(),
        ["generic:accounts", "typed:ada@example.com"]
    );
}

#[tokio::test]
async fn typed_update_events_carry_the_previous_row() {
    let f = fixture().await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    f.domain.accounts.after_update.add(move |event| {
        let sink = sink.clone();
        async move {
            let old = event.old_record.as_ref().map(|a| a.display_name.clone());
            sink.lock()
                .unwrap()
                .push((event.kind, old, event.record.display_name.clone()));
            Ok(())
        }
    });

    let account = f
        .accounts
        .create(&Account::new("ada@example.com", "Ada"))
        .await
        .expect("create");
    f.accounts
        .update(
            account.id.as_str(),
            Record::new().with("display_name", "Ada Lovelace"),
        )
        .await
        .expect("update");

    assert_eq!(
        *seen.lock().unwrap(),
        [(
            EventKind::AfterUpdate,
            Some("Ada".to_owned()),
            "Ada Lovelace".to_owned()
        )]
    );
}

#[tokio::test]
async fn rule_vetoes_block_the_insert() {
    let f = fixture().await;
    let err = f
        .organisations
        .create(&Organisation::new("   ", "blank"))
        .await
        .expect_err("blank name");
    assert_eq!(violation(&err), Some(RuleViolation::EmptyOrganisationName));

    let count = f.organisations.collection().count(Filter::new()).await;
    assert_eq!(count.ok(), Some(0));
}

#[tokio::test]
async fn last_owner_cannot_leave() {
    let f = fixture().await;
    let org = f
        .organisations
        .create(&Organisation::new("Acme", "acme"))
        .await
        .expect("org");
    let ada = f
        .accounts
        .create(&Account::new("ada@example.com", "Ada"))
        .await
        .expect("ada");
    let bob = f
        .accounts
        .create(&Account::new("bob@example.com", "Bob"))
        .await
        .expect("bob");

    let owner = f
        .members
        .create(&OrganisationMember::new(
            org.id.clone(),
            ada.id.clone(),
            MemberRole::Owner,
        ))
        .await
        .expect("owner");

    let err = f
        .members
        .delete(owner.id.as_str())
        .await
        .expect_err("last owner");
    assert_eq!(violation(&err), Some(RuleViolation::LastOwner(org.id.clone())));

    let err = f
        .members
        .update(owner.id.as_str(), Record::new().with("role", MemberRole::Admin))
        .await
        .expect_err("last owner demoted");
    assert_eq!(violation(&err), Some(RuleViolation::LastOwner(org.id.clone())));

    f.members
        .create(&OrganisationMember::new(
            org.id.clone(),
            bob.id.clone(),
            MemberRole::Owner,
        ))
        .await
        .expect("second owner");
    f.members
        .delete(owner.id.as_str())
        .await
        .expect("no longer the last owner");
}

#[tokio::test]
async fn invoice_status_only_moves_forward() {
    let f = fixture().await;
    let org = f
        .organisations
        .create(&Organisation::new("Acme", "acme"))
        .await
        .expect("org");
    let invoice = f
        .invoices
        .create(&Invoice::draft(org.id.clone(), "2026-0001", 12_500))
        .await
        .expect("invoice");
    assert_eq!(invoice.status, InvoiceStatus::Draft);
    assert_eq!(invoice.currency, "EUR");

    let err = f
        .invoices
        .update(
            invoice.id.as_str(),
            Record::new().with("status", InvoiceStatus::Paid),
        )
        .await
        .expect_err("draft cannot be paid");
    assert!(matches!(
        violation(&err),
        Some(RuleViolation::InvoiceTransition { from: "draft", to: "paid" })
    ));

    for status in [InvoiceStatus::Open, InvoiceStatus::Paid] {
        f.invoices
            .update(invoice.id.as_str(), Record::new().with("status", status))
            .await
            .expect("forward transition");
    }

    let negative = f
        .invoices
        .create(&Invoice::draft(org.id.clone(), "2026-0002", -1))
        .await
        .expect_err("negative amount");
    assert_eq!(violation(&negative), Some(RuleViolation::NegativeAmount(-1)));
}

/// An organisation with two owners, Ada and Bob.
async fn two_owner_organisation(f: &Fixture) -> (OrganisationId, Vec<String>) {
    let org = f
        .organisations
        .create(&Organisation::new("Acme", "acme"))
        .await
        .expect("org");
    let mut owners = Vec::new();
    for (email, name) in [("ada@example.com", "Ada"), ("bob@example.com", "Bob")] {
        let account = f
            .accounts
            .create(&Account::new(email, name))
            .await
            .expect("account");
        let member = f
            .members
            .create(&OrganisationMember::new(
                org.id.clone(),
                account.id,
                MemberRole::Owner,
            ))
            .await
            .expect("owner");
        owners.push(member.id.as_str().to_owned());
    }
    (org.id, owners)
}

#[tokio::test]
async fn bulk_updates_are_checked_row_by_row() {
    let f = fixture().await;
    let typed_calls = Arc::new(Mutex::new(0_u32));
    let counter = typed_calls.clone();
    f.domain.organisations.before_update.add(move |_| {
        let counter = counter.clone();
        async move {
            *counter.lock().unwrap() += 1;
            Ok(())
        }
    });

    for (name, slug) in [("Acme", "acme"), ("Globex", "globex")] {
        f.organisations
            .create(&Organisation::new(name, slug))
            .await
            .expect("create");
    }
    let organisations = f.organisations.collection();
    let rows = organisations
        .update(Record::new().with("seats", 3_i64), Filter::new().eq("plan", Plan::Free))
        .await
        .expect("bulk update");
    assert_eq!(rows, 2);
    assert_eq!(*typed_calls.lock().unwrap(), 2);

    let err = organisations
        .update(Record::new().with("seats", 0_i64), Filter::new().eq("plan", Plan::Free))
        .await
        .expect_err("no seats");
    assert_eq!(violation(&err), Some(RuleViolation::NoSeats(0)));
    assert_eq!(organisations.count(Filter::new().eq("seats", 3_i64)).await.ok(), Some(2));

    let org = f
        .organisations
        .find_one(Filter::new().eq("slug", "acme"))
        .await
        .expect("acme");
    f.invoices
        .create(&Invoice::draft(org.id.clone(), "2026-0001", 100))
        .await
        .expect("invoice");
    let err = f
        .invoices
        .collection()
        .update(
            Record::new().with("status", InvoiceStatus::Paid),
            Filter::new().eq("organisation_id", &org.id),
        )
        .await
        .expect_err("draft cannot be paid in bulk");
    assert!(matches!(
        violation(&err),
        Some(RuleViolation::InvoiceTransition { from: "draft", to: "paid" })
    ));

    let err = f
        .invoices
        .collection()
        .update(
            Record::new().with("amount_cents", -5_i64),
            Filter::new().eq("organisation_id", &org.id),
        )
        .await
        .expect_err("negative amount in bulk");
    assert_eq!(violation(&err), Some(RuleViolation::NegativeAmount(-5)));
}

#[tokio::test]
async fn bulk_member_writes_keep_an_owner() {
    let f = fixture().await;
    let (org_id, owners) = two_owner_organisation(&f).await;
    let members = f.members.collection();

    let err = members
        .delete_records(Filter::new().eq("organisation_id", &org_id))
        .await
        .expect_err("removes every owner");
    assert_eq!(violation(&err), Some(RuleViolation::LastOwner(org_id.clone())));

    let err = members
        .update(
            Record::new().with("role", MemberRole::Member),
            Filter::new().eq("organisation_id", &org_id),
        )
        .await
        .expect_err("demotes every owner");
    assert_eq!(violation(&err), Some(RuleViolation::LastOwner(org_id.clone())));
    assert_eq!(
        members
            .count(Filter::new().eq("role", MemberRole::Owner))
            .await
            .ok(),
        Some(2)
    );

    let removed = members
        .delete_records(Filter::new().eq("id", owners[0].as_str()))
        .await
        .expect("one owner stays");
    assert_eq!(removed, 1);
}

#[tokio::test]
async fn owner_checks_see_earlier_writes_in_the_transaction() {
    let f = fixture().await;
    let (org_id, owners) = two_owner_organisation(&f).await;

    let tx = f.store.tx().await.expect("begin");
    let members = Table::<OrganisationMember>::within(&tx).expect("members");
    members
        .delete(owners[0].as_str())
        .await
        .expect("Bob is still an owner");
    let err = members
        .delete(owners[1].as_str())
        .await
        .expect_err("Ada already left in this transaction");
    assert_eq!(violation(&err), Some(RuleViolation::LastOwner(org_id)));
    tx.rollback().await.expect("rollback");

    let remaining = f
        .members
        .collection()
        .count(Filter::new().eq("role", MemberRole::Owner))
        .await;
    assert_eq!(remaining.ok(), Some(2));
}

#[tokio::test]
async fn invoice_due_dates_compare_chronologically() {
    let f = fixture().await;
    let org = f
        .organisations
        .create(&Organisation::new("Acme", "acme"))
        .await
        .expect("org");
    let midnight = Utc.with_ymd_and_hms(2026, 4, 30, 0, 0, 0).single().expect("date");

    for (number, due) in [
        ("2026-0001", midnight),
        ("2026-0002", midnight + TimeDelta::milliseconds(250)),
    ] {
        let mut invoice = Invoice::draft(org.id.clone(), number, 100);
        invoice.due_at = Some(due);
        let stored = f.invoices.create(&invoice).await.expect("invoice");
        assert_eq!(stored.due_at, Some(due));
    }

    let later = f
        .invoices
        .find_one(FilterExpression::condition("due_at", Operator::Gt, midnight))
        .await
        .expect("later invoice");
    assert_eq!(later.number, "2026-0002");
}
