use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier, Mutex};

use anyhow::Context;
use ops_portal::PortalError;
use ops_portal::collab::{AssetRow, DocumentSink};
use ops_portal::config::PortalConfig;
use ops_portal::directory::{Directory, Person, SledDirectory};
use ops_portal::error::StoreError;
use ops_portal::identity::{Actor, Role, capability};
use ops_portal::machine::{Command, Invoker, SignatureStamp, Verb};
use ops_portal::notify::{Audience, Source};
use ops_portal::request::{
    Completion, LeaveType, Payload, PayrollFigures, Priority, Request, RequestKind, Status,
};
use ops_portal::service::{ListFilter, PortalService};
use ops_portal::types::{Day, TimeStamp};
use ops_portal::views::{AggregationKind, AggregationResult};
use sled::open;

use tempfile::{TempDir, tempdir}; // Use for test db cleanup.

const UNIT: &str = "printers";

fn people() -> Vec<Person> {
    vec![
        Person::new("adm_1", UNIT, Role::Admin, "Amal"),
        Person::new("adm_2", UNIT, Role::Admin, "Bea").with_access([capability::LEAVE]),
        Person::new("emp_1", UNIT, Role::Employee, "Cato"),
        Person::new("emp_2", UNIT, Role::Employee, "Dara").with_access([capability::TICKETS]),
        Person::new("cus_1", UNIT, Role::Customer, "Eko Print Ltd"),
        Person::new("adm_9", "facilities", Role::Admin, "Fen"),
    ]
}

fn seed(directory: &dyn Directory) -> anyhow::Result<()> {
    for person in people() {
        directory.upsert(&person)?;
    }
    Ok(())
}

// Sled uses file-based locking to prevent concurrent access, so every test
// opens its own database under a temp dir.
fn portal(temp_dir: &TempDir, name: &str) -> anyhow::Result<PortalService> {
    let db = Arc::new(open(temp_dir.path().join(name))?);
    db.clear()?;
    let service = PortalService::new(db, PortalConfig::default())?;
    seed(service.directory().as_ref())?;
    Ok(service)
}

fn admin() -> Actor {
    Actor::admin("adm_1", UNIT)
}

fn emp() -> Actor {
    Actor::employee("emp_1", UNIT)
}

fn inbox(service: &PortalService, who: &Actor) -> anyhow::Result<Vec<String>> {
    Ok(service
        .list_notifications(who, 50)?
        .into_iter()
        .map(|n| n.title)
        .collect())
}

fn payroll(service: &PortalService) -> anyhow::Result<Request> {
    let payload = Payload::payroll(
        2025,
        6,
        PayrollFigures::new(3000, 200, 100),
        Day::ymd(2025, 7, 5).context("date")?,
    );
    Ok(service.create_request(&admin(), "emp_1", payload)?)
}

#[test]
fn advance_salary_approval_notifies_both_ways() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = portal(&temp_dir, "scenario_a.db")?;

    let request = service
        .create_request(&emp(), "emp_1", Payload::advance_salary(500, "car repair"))
        .context("Failed on create: ")?;
    assert_eq!(request.status, Status::Pending);

    // every admin of the unit hears about the new request
    assert_eq!(inbox(&service, &admin())?.len(), 1);
    assert_eq!(inbox(&service, &Actor::admin("adm_2", UNIT))?.len(), 1);
    assert!(inbox(&service, &Actor::admin("adm_9", "facilities"))?.is_empty());

    let approved = service
        .transition(&admin(), &request.id, Command::approve_with_message("ok"))
        .context("Failed on approve: ")?;
    assert_eq!(approved.status, Status::Approved);
    assert_eq!(approved.previous_status(), Some(Status::Pending));

    let mine = service.list_notifications(&emp(), 10)?;
    assert_eq!(mine.len(), 1);
    assert!(matches!(
        &mine[0].source,
        Source::Request { status: Status::Approved, .. }
    ));

    // approving twice is illegal and leaves the record alone
    let before = service.get_request(&admin(), &request.id)?;
    let err = service
        .transition(&admin(), &request.id, Command::approve())
        .unwrap_err();
    assert!(matches!(err, PortalError::IllegalTransition { .. }));
    assert_eq!(service.get_request(&admin(), &request.id)?, before);
    assert_eq!(service.list_notifications(&emp(), 10)?.len(), 1);

    Ok(())
}

#[test]
fn removing_an_employee_returns_work_to_draft() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = portal(&temp_dir, "scenario_b.db")?;

    let order = service.create_request(
        &admin(),
        "cus_1",
        Payload::work_order("Fuser jam", "3rd floor MFP")
            .for_customer("cus_1")
            .assign_to("emp_1"),
    )?;
    assert_eq!(order.status, Status::Assigned);
    assert_eq!(inbox(&service, &emp())?.len(), 1);

    let ticket = service.create_request(
        &admin(),
        "cus_1",
        Payload::ticket("Toner", "streaks on every page", Priority::High)
            .assign_to("emp_1")
            .assign_to("emp_2"),
    )?;

    let removal = service.remove_employee(&admin(), "emp_1")?;
    assert_eq!(removal.released.len(), 2);

    let order = service.get_request(&admin(), &order.id)?;
    assert_eq!(order.status, Status::Draft);
    assert!(order.assignees().is_empty());
    let last = order.last_transition().context("trail")?;
    assert_eq!(last.verb, Verb::Unassign);
    assert_eq!(last.actor_id, "system");

    let ticket = service.get_request(&admin(), &ticket.id)?;
    assert_eq!(ticket.status, Status::New);
    assert_eq!(ticket.assignees(), vec!["emp_2".to_string()]);

    assert!(service.directory().person(UNIT, "emp_1")?.is_none());
    Ok(())
}

#[test]
fn payroll_signed_then_completed() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = portal(&temp_dir, "scenario_c.db")?;

    let statement = payroll(&service)?;
    assert_eq!(statement.status, Status::Generated);

    let stamp = SignatureStamp::new("203.0.113.7", "Mozilla/5.0");
    let signed = service.transition(&emp(), &statement.id, Command::Sign(stamp.clone()))?;
    assert_eq!(signed.status, Status::Signed);
    assert_eq!(inbox(&service, &admin())?.len(), 1);

    let completed = service.transition(&admin(), &statement.id, Command::Complete)?;
    assert_eq!(completed.status, Status::Completed);
    assert_eq!(inbox(&service, &emp())?.len(), 1);

    let err = service
        .transition(&emp(), &statement.id, Command::Sign(stamp))
        .unwrap_err();
    assert!(matches!(err, PortalError::IllegalTransition { .. }));

    let Payload::Payroll(details) = &completed.payload else {
        anyhow::bail!("not a payroll payload");
    };
    assert_eq!(details.employee_sign_ip.as_deref(), Some("203.0.113.7"));
    assert!(details.signed_at.is_some());
    Ok(())
}

#[test]
fn declined_payroll_is_reissued() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = portal(&temp_dir, "scenario_d.db")?;

    let statement = payroll(&service)?;
    service.transition(&admin(), &statement.id, Command::Issue)?;
    assert_eq!(inbox(&service, &emp())?.len(), 1);

    // decline needs a reason
    let stamp = SignatureStamp::new("203.0.113.7", "Mozilla/5.0");
    let err = service
        .transition(&emp(), &statement.id, Command::decline(" ", stamp.clone()))
        .unwrap_err();
    assert!(matches!(err, PortalError::Validation(_)));

    let rejected = service.transition(
        &emp(),
        &statement.id,
        Command::decline("allowance missing", stamp),
    )?;
    assert_eq!(rejected.status, Status::Rejected);

    // a decline goes back to every admin of the unit
    assert_eq!(inbox(&service, &admin())?.len(), 1);
    assert_eq!(inbox(&service, &Actor::admin("adm_2", UNIT))?.len(), 1);
    assert!(inbox(&service, &Actor::admin("adm_9", "facilities"))?.is_empty());

    let reissued = service.transition(
        &admin(),
        &statement.id,
        Command::Reissue(PayrollFigures::new(3000, 350, 100)),
    )?;
    assert_eq!(reissued.status, Status::Generated);
    let Payload::Payroll(details) = &reissued.payload else {
        anyhow::bail!("not a payroll payload");
    };
    assert_eq!(details.issue_count, 1);
    assert_eq!(details.figures.net(), Some(3250));

    // the second round notifies again
    service.transition(&admin(), &statement.id, Command::Issue)?;
    assert_eq!(inbox(&service, &emp())?.len(), 2);
    assert_eq!(inbox(&service, &admin())?.len(), 1);
    Ok(())
}

#[test]
fn stale_commit_is_a_conflict() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = portal(&temp_dir, "conflict.db")?;

    let start = Day::ymd(2025, 9, 1).context("date")?;
    let leave = service.create_request(
        &emp(),
        "emp_1",
        Payload::leave(LeaveType::Casual, start, start, "moving house"),
    )?;

    let store = service.store();
    let snapshot = store.get(UNIT, &leave.id)?.context("missing")?;
    let engine = service.engine();
    let approve = engine.plan(
        &snapshot.request,
        Invoker::Actor(&admin()),
        Command::approve(),
        TimeStamp::new(),
    )?;
    let reject = engine.plan(
        &snapshot.request,
        Invoker::Actor(&admin()),
        Command::reject("short staffed"),
        TimeStamp::new(),
    )?;

    store.commit(&snapshot, &approve, None)?;
    let err = store.commit(&snapshot, &reject, None).unwrap_err();
    assert!(matches!(err, PortalError::Conflict(_)));

    let stored = service.get_request(&admin(), &leave.id)?;
    assert_eq!(stored.status, Status::Approved);
    Ok(())
}

#[test]
fn racing_decisions_have_one_winner() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = portal(&temp_dir, "race.db")?;

    let start = Day::ymd(2025, 10, 6).context("date")?;
    let end = Day::ymd(2025, 10, 10).context("date")?;
    let leave = service.create_request(
        &emp(),
        "emp_1",
        Payload::leave(LeaveType::Annual, start, end, "wedding"),
    )?;

    let barrier = Barrier::new(2);
    let (a, b) = std::thread::scope(|s| {
        let approve = s.spawn(|| {
            barrier.wait();
            service.transition(&admin(), &leave.id, Command::approve())
        });
        let reject = s.spawn(|| {
            barrier.wait();
            service.transition(
                &Actor::admin("adm_2", UNIT),
                &leave.id,
                Command::reject("peak season"),
            )
        });
        (approve.join(), reject.join())
    });
    let (a, b) = (
        a.map_err(|_| anyhow::anyhow!("approve thread panicked"))?,
        b.map_err(|_| anyhow::anyhow!("reject thread panicked"))?,
    );

    assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
    let (winner, loser) = match (a, b) {
        (Ok(winner), Err(loser)) | (Err(loser), Ok(winner)) => (winner, loser),
        _ => anyhow::bail!("expected exactly one winner"),
    };
    assert!(matches!(
        loser,
        PortalError::Conflict(_) | PortalError::IllegalTransition { .. }
    ));

    let stored = service.get_request(&admin(), &leave.id)?;
    assert_eq!(stored.status, winner.status);
    assert_eq!(stored.revision(), 2);
    Ok(())
}

#[test]
fn employee_without_access_keeps_self_service() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = portal(&temp_dir, "no_access.db")?;
    let day = Day::ymd(2025, 11, 3).context("date")?;

    let own = service.create_request(
        &emp(),
        "emp_1",
        Payload::leave(LeaveType::Sick, day, day, "flu"),
    )?;
    let cancelled = service.transition(&emp(), &own.id, Command::Cancel)?;
    assert_eq!(cancelled.status, Status::Cancelled);

    let colleague = Actor::employee("emp_2", UNIT).with_access([capability::TICKETS]);
    let theirs = service.create_request(
        &colleague,
        "emp_2",
        Payload::leave(LeaveType::Casual, day, day, "errands"),
    )?;
    let err = service.get_request(&emp(), &theirs.id).unwrap_err();
    assert!(matches!(err, PortalError::Authorization(_)));

    // cannot file for someone else either
    let err = service
        .create_request(&emp(), "emp_2", Payload::advance_salary(100, "lunch money"))
        .unwrap_err();
    assert!(matches!(err, PortalError::Authorization(_)));

    let ticket = service.create_request(
        &admin(),
        "cus_1",
        Payload::ticket("Paper feed", "tray 2 skips", Priority::Normal),
    )?;
    let queue = service.list_requests(&emp(), &ListFilter::new(UNIT).kind(RequestKind::Ticket))?;
    assert!(queue.is_empty());
    assert!(service.get_request(&emp(), &ticket.id).is_err());

    // emp_2 holds the tickets capability
    let queue = service.list_requests(&colleague, &ListFilter::new(UNIT).kind(RequestKind::Ticket))?;
    assert_eq!(queue.len(), 1);

    let mine = service.list_requests(&emp(), &ListFilter::new(UNIT))?;
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].id, own.id);
    Ok(())
}

#[test]
fn requests_are_listed_oldest_first() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = portal(&temp_dir, "listing.db")?;

    let mut created = vec![];
    for title in ["Toner low", "Fuser noise", "Badge reader"] {
        let ticket = service.create_request(
            &admin(),
            "cus_1",
            Payload::ticket(title, "front desk", Priority::Low),
        )?;
        created.push(ticket.id);
    }

    let listed = service.list_requests(&admin(), &ListFilter::new(UNIT).kind(RequestKind::Ticket))?;
    assert_eq!(listed.len(), 3);
    assert!(listed.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    for id in &created {
        assert!(listed.iter().any(|r| &r.id == id));
    }
    Ok(())
}

#[test]
fn foreign_unit_sees_nothing() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = portal(&temp_dir, "tenancy.db")?;
    let outsider = Actor::admin("adm_9", "facilities");

    let request = service.create_request(&emp(), "emp_1", Payload::advance_salary(900, "rent deposit"))?;

    let err = service.get_request(&outsider, &request.id).unwrap_err();
    assert!(matches!(err, PortalError::NotFound(_)));
    let err = service
        .transition(&outsider, &request.id, Command::approve())
        .unwrap_err();
    assert!(matches!(err, PortalError::NotFound(_)));

    // indistinguishable from an id that never existed
    let err = service
        .get_request(&admin(), "advance1qqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqq")
        .unwrap_err();
    assert!(matches!(err, PortalError::NotFound(_)));

    assert!(
        service
            .list_requests(&outsider, &ListFilter::new(UNIT))
            .is_err()
    );
    Ok(())
}

#[test]
fn ticket_desk_follows_the_ticket() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = portal(&temp_dir, "tickets.db")?;
    let customer = Actor::customer("cus_1", UNIT);
    let agent = Actor::employee("emp_2", UNIT).with_access([capability::TICKETS]);

    let ticket = service.create_request(
        &customer,
        "cus_1",
        Payload::ticket("Scanner", "driver crash", Priority::Urgent),
    )?;
    // adm_2 is restricted to leave
    assert_eq!(inbox(&service, &admin())?.len(), 1);
    assert!(inbox(&service, &Actor::admin("adm_2", UNIT))?.is_empty());

    service.transition(&admin(), &ticket.id, Command::assign("emp_2"))?;
    assert_eq!(inbox(&service, &agent)?.len(), 1);

    for status in [Status::InProgress, Status::Resolved, Status::InProgress] {
        service.transition(&agent, &ticket.id, Command::Move(status))?;
    }
    // the regression to In Progress is a new revision and notifies again
    assert_eq!(inbox(&service, &admin())?.len(), 4);

    let history = service.history(&customer, &ticket.id)?;
    assert_eq!(history.len(), 5);
    assert_eq!(history[0].verb, Verb::Create);

    let err = service
        .transition(&customer, &ticket.id, Command::Move(Status::Closed))
        .unwrap_err();
    assert!(matches!(err, PortalError::Authorization(_)));
    Ok(())
}

#[test]
fn work_order_completion_and_ratings() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = portal(&temp_dir, "ratings.db")?;
    let tech = Actor::employee("emp_2", UNIT);

    let mut ids = vec![];
    for title in ["Drum swap", "Network card"] {
        let order = service.create_request(
            &admin(),
            "cus_1",
            Payload::work_order(title, "on site").assign_to("emp_2"),
        )?;
        ids.push(order.id);
    }

    service.transition(
        &tech,
        &ids[0],
        Command::RecordProgress(Completion::new().photo("s3://before.jpg")),
    )?;
    let err = service
        .transition(&tech, &ids[0], Command::Submit(Completion::new().rating(5)))
        .unwrap_err();
    assert!(matches!(err, PortalError::Validation(_)));

    let submitted = service.transition(
        &tech,
        &ids[0],
        Command::Submit(Completion::new().signature("s3://sig-1.png").rating(5)),
    )?;
    assert_eq!(submitted.status, Status::Submitted);
    service.transition(
        &tech,
        &ids[1],
        Command::Submit(Completion::new().signature("s3://sig-2.png").rating(2)),
    )?;

    // each submission reaches every admin, assignments reached the tech
    assert_eq!(inbox(&service, &admin())?.len(), 2);
    assert_eq!(inbox(&service, &Actor::admin("adm_2", UNIT))?.len(), 2);
    assert_eq!(inbox(&service, &tech)?.len(), 2);

    // someone who is not assigned cannot submit
    let err = service
        .transition(&emp(), &ids[1], Command::Submit(Completion::new()))
        .unwrap_err();
    assert!(matches!(err, PortalError::Authorization(_)));

    let as_of = Day::ymd(2025, 1, 1).context("date")?;
    let AggregationResult::Ratings(ratings) =
        service.aggregate(&admin(), AggregationKind::RatingAverages, UNIT, as_of)?
    else {
        anyhow::bail!("wrong aggregation shape");
    };
    assert_eq!(ratings.len(), 1);
    assert_eq!(ratings[0].employee_id, "emp_2");
    assert_eq!(ratings[0].rated, 2);
    assert!((ratings[0].average - 3.5).abs() < f64::EPSILON);
    Ok(())
}

#[test]
fn views_respect_capabilities() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let db = Arc::new(open(temp_dir.path().join("views.db"))?);
    let as_of = Day::ymd(2025, 6, 15).context("date")?;
    let assets = vec![
        AssetRow::new("ast_1", UNIT, "Van insurance", Day::ymd(2025, 6, 1).context("date")?),
        AssetRow::new("ast_2", UNIT, "Fire extinguisher", Day::ymd(2025, 7, 1).context("date")?),
        AssetRow::new("ast_3", UNIT, "Lease", Day::ymd(2026, 1, 1).context("date")?),
        AssetRow::new("ast_4", "facilities", "Lift permit", Day::ymd(2025, 6, 20).context("date")?),
    ];
    let service = PortalService::new(db, PortalConfig::default())?.with_assets(Arc::new(assets));
    seed(service.directory().as_ref())?;

    let err = service
        .aggregate(&emp(), AggregationKind::AssetExpiry, UNIT, as_of)
        .unwrap_err();
    assert!(matches!(err, PortalError::Authorization(_)));

    let keeper = Actor::employee("emp_1", UNIT).with_access([capability::ASSETS]);
    let AggregationResult::Buckets(buckets) =
        service.aggregate(&keeper, AggregationKind::AssetExpiry, UNIT, as_of)?
    else {
        anyhow::bail!("wrong aggregation shape");
    };
    assert_eq!(buckets.overdue.len(), 1);
    assert_eq!(buckets.upcoming.len(), 1);
    assert_eq!(buckets.upcoming[0].id, "ast_2");

    // pending counts stay with admins
    let err = service
        .aggregate(&keeper, AggregationKind::PendingCounts, UNIT, as_of)
        .unwrap_err();
    assert!(matches!(err, PortalError::Authorization(_)));

    service.create_request(&emp(), "emp_1", Payload::advance_salary(250, "school fees"))?;
    payroll(&service)?;
    let AggregationResult::PendingCounts(counts) =
        service.aggregate(&admin(), AggregationKind::PendingCounts, UNIT, as_of)?
    else {
        anyhow::bail!("wrong aggregation shape");
    };
    assert_eq!(counts[&RequestKind::AdvanceSalary], 1);
    // generated payroll waits on the employee, not the admin
    assert_eq!(counts[&RequestKind::Payroll], 0);

    let AggregationResult::Buckets(due) =
        service.aggregate(&admin(), AggregationKind::PayrollDue, UNIT, as_of)?
    else {
        anyhow::bail!("wrong aggregation shape");
    };
    assert_eq!(due.upcoming.len(), 1);
    Ok(())
}

#[test]
fn broadcasts_reach_the_audience() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = portal(&temp_dir, "broadcast.db")?;

    let receipt = service.broadcast(
        &admin(),
        Audience::AllEmployees,
        "Stock take",
        "Warehouse closed Saturday",
    )?;
    assert_eq!(receipt.delivered.len(), 2);
    assert_eq!(inbox(&service, &emp())?, vec!["Stock take".to_string()]);
    assert!(inbox(&service, &Actor::customer("cus_1", UNIT))?.is_empty());

    // a complete broadcast leaves nothing to drain and is never sent twice
    let report = service.drain_outbox()?;
    assert_eq!((report.broadcasts, report.written), (0, 0));
    assert_eq!(inbox(&service, &emp())?.len(), 1);

    let err = service
        .broadcast(&emp(), Audience::AllCustomers, "Promo", "10% off toner")
        .unwrap_err();
    assert!(matches!(err, PortalError::Authorization(_)));

    let latest = service.list_notifications(&emp(), 1)?;
    let notification = latest.first().context("no notification")?;
    let read = service.mark_read(&emp(), &notification.id)?;
    assert!(read.is_read());
    let err = service.mark_read(&admin(), &notification.id).unwrap_err();
    assert!(matches!(err, PortalError::NotFound(_)));
    Ok(())
}

/// Directory whose member lookups fail while `offline` is set.
struct FlakyDirectory {
    inner: SledDirectory,
    offline: AtomicBool,
}

impl Directory for FlakyDirectory {
    fn person(&self, business_unit: &str, id: &str) -> Result<Option<Person>, StoreError> {
        self.inner.person(business_unit, id)
    }
    fn members(&self, business_unit: &str, role: Role) -> Result<Vec<Person>, StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Collaborator("directory offline".into()));
        }
        self.inner.members(business_unit, role)
    }
    fn upsert(&self, person: &Person) -> Result<(), StoreError> {
        self.inner.upsert(person)
    }
    fn remove(&self, business_unit: &str, id: &str) -> Result<Option<Person>, StoreError> {
        self.inner.remove(business_unit, id)
    }
}

#[test]
fn failed_fanout_is_drained_later() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let db = Arc::new(open(temp_dir.path().join("outbox.db"))?);
    let directory = Arc::new(FlakyDirectory {
        inner: SledDirectory::open(&db)?,
        offline: AtomicBool::new(true),
    });
    seed(directory.as_ref())?;
    let service = PortalService::with_directory(db, PortalConfig::default(), directory.clone())?;

    // the commit stands even though nobody could be notified
    let request = service.create_request(&emp(), "emp_1", Payload::advance_salary(300, "dentist bill"))?;
    assert_eq!(service.get_request(&emp(), &request.id)?.status, Status::Pending);
    assert!(inbox(&service, &admin())?.is_empty());
    assert_eq!(service.store().queued_events()?.len(), 1);

    let report = service.drain_outbox()?;
    assert_eq!(report.remaining, 1);

    directory.offline.store(false, Ordering::SeqCst);
    let report = service.drain_outbox()?;
    assert_eq!((report.events, report.written, report.remaining), (1, 2, 0));
    assert_eq!(inbox(&service, &admin())?.len(), 1);

    let report = service.drain_outbox()?;
    assert_eq!(report.events, 0);
    Ok(())
}

#[derive(Default)]
struct RecordingSink {
    seen: Mutex<Vec<(RequestKind, Status)>>,
    fail: bool,
}

impl DocumentSink for RecordingSink {
    fn committed(&self, request: &Request) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("renderer unavailable");
        }
        self.seen
            .lock()
            .map_err(|_| anyhow::anyhow!("poisoned"))?
            .push((request.kind, request.status));
        Ok(())
    }
}

#[test]
fn documents_follow_commits() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let db = Arc::new(open(temp_dir.path().join("documents.db"))?);
    let sink = Arc::new(RecordingSink::default());
    let service = PortalService::new(db, PortalConfig::default())?.with_documents(sink.clone());
    seed(service.directory().as_ref())?;

    let statement = payroll(&service)?;
    service.transition(&admin(), &statement.id, Command::Issue)?;
    service.create_request(&emp(), "emp_1", Payload::advance_salary(80, "bus pass"))?;

    let seen = sink.seen.lock().map_err(|_| anyhow::anyhow!("poisoned"))?.clone();
    assert_eq!(
        seen,
        vec![
            (RequestKind::Payroll, Status::Generated),
            (RequestKind::Payroll, Status::PendingSignature),
        ]
    );

    // a failing sink never fails the transition
    let temp_dir = tempdir()?;
    let db = Arc::new(open(temp_dir.path().join("documents_down.db"))?);
    let service = PortalService::new(db, PortalConfig::default())?.with_documents(Arc::new(
        RecordingSink {
            fail: true,
            ..Default::default()
        },
    ));
    seed(service.directory().as_ref())?;
    assert_eq!(payroll(&service)?.status, Status::Generated);
    Ok(())
}
