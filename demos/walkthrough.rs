//! Walks one business unit through a leave request, a work order and a
//! payroll statement, printing each inbox along the way.
//!
//! `cargo run --example walkthrough`
use std::sync::Arc;

use ops_portal::config::PortalConfig;
use ops_portal::directory::Person;
use ops_portal::identity::{Actor, Role};
use ops_portal::machine::{Command, SignatureStamp};
use ops_portal::notify::Audience;
use ops_portal::request::{Completion, LeaveType, Payload, PayrollFigures};
use ops_portal::types::{Day, TimeStamp};
use ops_portal::views::AggregationKind;
use ops_portal::{PortalService, telemetry};

const UNIT: &str = "print-shop";

fn show_inbox(portal: &PortalService, actor: &Actor) -> anyhow::Result<()> {
    println!("-- inbox of {} --", actor.id);
    for n in portal.list_notifications(actor, 10)? {
        let flag = if n.is_read() { " " } else { "*" };
        println!("{flag} {}: {}", n.title, n.body);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = PortalConfig {
        store_path: dir.path().join("portal.db"),
        ..PortalConfig::default()
    };
    telemetry::init(&config.logging);

    let db = Arc::new(sled::open(&config.store_path)?);
    let portal = PortalService::new(db, config)?;
    for person in [
        Person::new("adm_1", UNIT, Role::Admin, "Rosa"),
        Person::new("emp_1", UNIT, Role::Employee, "Tomas"),
    ] {
        portal.directory().upsert(&person)?;
    }
    let admin = Actor::admin("adm_1", UNIT);
    let employee = Actor::employee("emp_1", UNIT);

    // Leave, filed and approved
    let start = Day::ymd(2025, 7, 14).ok_or_else(|| anyhow::anyhow!("bad date"))?;
    let end = Day::ymd(2025, 7, 18).ok_or_else(|| anyhow::anyhow!("bad date"))?;
    let leave = portal.create_request(
        &employee,
        "emp_1",
        Payload::leave(LeaveType::Annual, start, end, "summer break"),
    )?;
    show_inbox(&portal, &admin)?;
    portal.transition(&admin, &leave.id, Command::approve_with_message("enjoy"))?;
    show_inbox(&portal, &employee)?;

    // Work order, assigned then completed with a rating
    let order = portal.create_request(
        &admin,
        "emp_1",
        Payload::work_order("Replace fuser", "Press 2 jams on heavy stock").assign_to("emp_1"),
    )?;
    portal.transition(
        &employee,
        &order.id,
        Command::Submit(
            Completion::new()
                .signature("blob://signatures/print-shop/7")
                .notes("fuser swapped")
                .rating(5),
        ),
    )?;

    // Payroll, issued and signed
    let due = Day::ymd(2025, 8, 3).ok_or_else(|| anyhow::anyhow!("bad date"))?;
    let payroll = portal.create_request(
        &admin,
        "emp_1",
        Payload::payroll(2025, 7, PayrollFigures::new(3100, 200, 120), due),
    )?;
    portal.transition(&admin, &payroll.id, Command::Issue)?;
    portal.transition(
        &employee,
        &payroll.id,
        Command::Sign(SignatureStamp::new("203.0.113.9", "Firefox")),
    )?;

    let receipt = portal.broadcast(
        &admin,
        Audience::AllEmployees,
        "Stocktake",
        "Friday from 4pm",
    )?;
    println!("broadcast {} reached {} people", receipt.id, receipt.delivered.len());

    let today = TimeStamp::new().day();
    for kind in [
        AggregationKind::PendingCounts,
        AggregationKind::RatingAverages,
        AggregationKind::UpcomingLeave,
        AggregationKind::PayrollDue,
    ] {
        println!("{kind:?}: {:?}", portal.aggregate(&admin, kind, UNIT, today)?);
    }

    for entry in portal.history(&admin, &payroll.id)? {
        println!("{} {:?} -> {} by {}", entry.verb.name(), entry.from, entry.to, entry.actor_id);
    }
    show_inbox(&portal, &employee)?;
    portal.flush()?;
    Ok(())
}
