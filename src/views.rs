//! Read-only projections over the request store.
//!
//! Nothing here is cached. Every query recomputes from the stored records
//! (and the asset register) against one `as_of` day.
use std::collections::BTreeMap;

use crate::authz::Resource;
use crate::collab::AssetSource;
use crate::error::StoreError;
use crate::identity::capability;
use crate::request::{Payload, RequestKind, Status};
use crate::store::RequestStore;
use crate::types::Day;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationKind {
    PendingCounts,
    RatingAverages,
    AssetExpiry,
    UpcomingLeave,
    PayrollDue,
}

impl AggregationKind {
    /// What the gate checks before computing the view.
    pub fn resource(&self, business_unit: &str) -> Resource {
        match self {
            AggregationKind::PendingCounts => Resource::admin_only(business_unit),
            AggregationKind::RatingAverages => {
                Resource::new(business_unit, capability::SCHEDULE_WORKS)
            }
            AggregationKind::AssetExpiry => Resource::new(business_unit, capability::ASSETS),
            AggregationKind::UpcomingLeave => Resource::new(business_unit, capability::LEAVE),
            AggregationKind::PayrollDue => Resource::new(business_unit, capability::PAYROLL),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RatingAverage {
    pub employee_id: String,
    pub average: f64,
    pub rated: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatedItem {
    pub id: String,
    pub label: String,
    pub date: Day,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateBuckets {
    pub as_of: Day,
    /// dated before `as_of`
    pub overdue: Vec<DatedItem>,
    /// from `as_of` to the end of the window, inclusive
    pub upcoming: Vec<DatedItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AggregationResult {
    PendingCounts(BTreeMap<RequestKind, usize>),
    Ratings(Vec<RatingAverage>),
    Buckets(DateBuckets),
}

/// Splits items into overdue and upcoming; anything further out is dropped.
pub fn bucket<I>(items: I, as_of: Day, window_days: i64) -> DateBuckets
where
    I: IntoIterator<Item = DatedItem>,
{
    let mut overdue = vec![];
    let mut upcoming = vec![];
    for item in items {
        let ahead = as_of.days_until(item.date);
        if ahead < 0 {
            overdue.push(item);
        } else if ahead <= window_days {
            upcoming.push(item);
        }
    }
    overdue.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
    upcoming.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
    DateBuckets {
        as_of,
        overdue,
        upcoming,
    }
}

/// Records waiting on an admin, per kind. Kinds with nothing waiting are listed with zero.
pub fn pending_counts(
    store: &RequestStore,
    business_unit: &str,
) -> Result<BTreeMap<RequestKind, usize>, StoreError> {
    let mut counts = BTreeMap::new();
    for kind in RequestKind::ALL {
        let waiting = store
            .scan(business_unit, kind, None)?
            .iter()
            .filter(|request| kind.awaits_admin(request.status))
            .count();
        counts.insert(kind, waiting);
    }
    Ok(counts)
}

/// Mean completion rating per assignee over submitted work orders.
pub fn rating_averages(
    store: &RequestStore,
    business_unit: &str,
) -> Result<Vec<RatingAverage>, StoreError> {
    let mut totals: BTreeMap<String, (u32, usize)> = BTreeMap::new();
    for order in store.scan(business_unit, RequestKind::WorkOrder, Some(Status::Submitted))? {
        let Payload::WorkOrder(details) = &order.payload else {
            continue;
        };
        if let (Some(employee), Some(rating)) =
            (&details.assigned_employee_id, details.completion.rating)
        {
            let entry = totals.entry(employee.clone()).or_default();
            entry.0 += u32::from(rating);
            entry.1 += 1;
        }
    }
    Ok(totals
        .into_iter()
        .map(|(employee_id, (sum, rated))| RatingAverage {
            employee_id,
            average: f64::from(sum) / rated as f64,
            rated,
        })
        .collect())
}

pub fn asset_expiry(
    assets: &dyn AssetSource,
    business_unit: &str,
    as_of: Day,
    window_days: i64,
) -> Result<DateBuckets, StoreError> {
    let rows = assets
        .assets(business_unit)
        .map_err(|e| StoreError::Collaborator(format!("asset register: {e:#}")))?;
    let items = rows
        .into_iter()
        .filter(|row| row.business_unit == business_unit)
        .map(|row| DatedItem {
            id: row.id,
            label: row.name,
            date: row.expires_on,
        });
    Ok(bucket(items, as_of, window_days))
}

/// Approved leave by start day. Leave already under way is reported as
/// overdue until its last day has passed.
pub fn upcoming_leave(
    store: &RequestStore,
    business_unit: &str,
    as_of: Day,
    window_days: i64,
) -> Result<DateBuckets, StoreError> {
    let mut items = vec![];
    for leave in store.scan(business_unit, RequestKind::Leave, Some(Status::Approved))? {
        let Payload::Leave(details) = &leave.payload else {
            continue;
        };
        if details.end < as_of {
            continue;
        }
        items.push(DatedItem {
            id: leave.id.clone(),
            label: format!("{} ({} days)", leave.subject_id, details.days()),
            date: details.start,
        });
    }
    Ok(bucket(items, as_of, window_days))
}

/// Payroll statements not yet completed, by due date.
pub fn payroll_due(
    store: &RequestStore,
    business_unit: &str,
    as_of: Day,
    window_days: i64,
) -> Result<DateBuckets, StoreError> {
    let mut items = vec![];
    for payroll in store.scan(business_unit, RequestKind::Payroll, None)? {
        let Payload::Payroll(details) = &payroll.payload else {
            continue;
        };
        if payroll.status == Status::Completed {
            continue;
        }
        items.push(DatedItem {
            id: payroll.id.clone(),
            label: format!(
                "{} {}-{:02} ({})",
                payroll.subject_id, details.year, details.month, payroll.status
            ),
            date: details.due_date,
        });
    }
    Ok(bucket(items, as_of, window_days))
}
