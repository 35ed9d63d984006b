//! Lifecycle records and their kind-specific payloads
use std::fmt;

use chrono::Utc;

use crate::authz::Resource;
use crate::config::Limits;
use crate::error::{PortalError, PortalResult};
use crate::identity::capability;
use crate::machine::Verb;
use crate::types::{ClockTime, Day, TimeStamp};
use crate::utils;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, minicbor::Encode, minicbor::Decode,
)]
pub enum RequestKind {
    #[n(0)]
    Leave,
    #[n(1)]
    Overtime,
    #[n(2)]
    AdvanceSalary,
    #[n(3)]
    WorkOrder,
    #[n(4)]
    Payroll,
    #[n(5)]
    Ticket,
}

impl RequestKind {
    pub const ALL: [RequestKind; 6] = [
        RequestKind::Leave,
        RequestKind::Overtime,
        RequestKind::AdvanceSalary,
        RequestKind::WorkOrder,
        RequestKind::Payroll,
        RequestKind::Ticket,
    ];

    /// bech32 human readable part of ids of this kind
    pub fn prefix(&self) -> &'static str {
        match self {
            RequestKind::Leave => "leave",
            RequestKind::Overtime => "overtime",
            RequestKind::AdvanceSalary => "advance",
            RequestKind::WorkOrder => "workorder",
            RequestKind::Payroll => "payroll",
            RequestKind::Ticket => "ticket",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        let prefix = utils::id_prefix(id)?;
        Self::ALL.into_iter().find(|kind| kind.prefix() == prefix)
    }

    pub fn tree_name(&self) -> String {
        format!("requests/{}", self.prefix())
    }

    /// Capability an employee needs to see other people's records of this kind.
    pub fn capability(&self) -> &'static str {
        match self {
            RequestKind::Leave => capability::LEAVE,
            RequestKind::Overtime => capability::OVERTIME,
            RequestKind::AdvanceSalary => capability::ADVANCE_SALARY,
            RequestKind::WorkOrder => capability::SCHEDULE_WORKS,
            RequestKind::Payroll => capability::PAYROLL,
            RequestKind::Ticket => capability::TICKETS,
        }
    }

    /// Leave, overtime and advance salary share the pending/decision shape.
    pub fn is_self_service(&self) -> bool {
        matches!(
            self,
            RequestKind::Leave | RequestKind::Overtime | RequestKind::AdvanceSalary
        )
    }

    pub fn initial_status(&self) -> Status {
        match self {
            RequestKind::Leave | RequestKind::Overtime | RequestKind::AdvanceSalary => {
                Status::Pending
            }
            RequestKind::WorkOrder => Status::Draft,
            RequestKind::Payroll => Status::Generated,
            RequestKind::Ticket => Status::New,
        }
    }

    pub fn is_terminal(&self, status: Status) -> bool {
        match self {
            RequestKind::Leave | RequestKind::Overtime | RequestKind::AdvanceSalary => matches!(
                status,
                Status::Approved | Status::Rejected | Status::Cancelled
            ),
            RequestKind::WorkOrder => status == Status::Submitted,
            // Rejected payroll goes back to the admin for correction
            RequestKind::Payroll => status == Status::Completed,
            // tickets may be reopened from any status
            RequestKind::Ticket => false,
        }
    }

    /// Statuses counted on the admin sidebar badge for this kind.
    pub fn awaits_admin(&self, status: Status) -> bool {
        match self {
            RequestKind::Leave | RequestKind::Overtime | RequestKind::AdvanceSalary => {
                status == Status::Pending
            }
            RequestKind::WorkOrder => status == Status::Draft,
            RequestKind::Payroll => matches!(status, Status::Signed | Status::Rejected),
            RequestKind::Ticket => status == Status::New,
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RequestKind::Leave => "leave request",
            RequestKind::Overtime => "overtime request",
            RequestKind::AdvanceSalary => "advance salary request",
            RequestKind::WorkOrder => "work order",
            RequestKind::Payroll => "payroll statement",
            RequestKind::Ticket => "support ticket",
        })
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, minicbor::Encode, minicbor::Decode,
)]
pub enum Status {
    #[n(0)]
    Pending,
    #[n(1)]
    Approved,
    #[n(2)]
    Rejected,
    #[n(3)]
    Cancelled,
    #[n(4)]
    Draft,
    #[n(5)]
    Assigned,
    #[n(6)]
    Submitted,
    #[n(7)]
    Generated,
    #[n(8)]
    PendingSignature,
    #[n(9)]
    Signed,
    #[n(10)]
    Completed,
    #[n(11)]
    New,
    #[n(12)]
    InProgress,
    #[n(13)]
    OnHold,
    #[n(14)]
    Resolved,
    #[n(15)]
    Closed,
}

impl Status {
    pub const TICKET: [Status; 5] = [
        Status::New,
        Status::InProgress,
        Status::OnHold,
        Status::Resolved,
        Status::Closed,
    ];

    pub fn is_ticket_status(&self) -> bool {
        Self::TICKET.contains(self)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Pending => "Pending",
            Status::Approved => "Approved",
            Status::Rejected => "Rejected",
            Status::Cancelled => "Cancelled",
            Status::Draft => "Draft",
            Status::Assigned => "Assigned",
            Status::Submitted => "Submitted",
            Status::Generated => "Generated",
            Status::PendingSignature => "Pending Signature",
            Status::Signed => "Signed",
            Status::Completed => "Completed",
            Status::New => "New",
            Status::InProgress => "In Progress",
            Status::OnHold => "On Hold",
            Status::Resolved => "Resolved",
            Status::Closed => "Closed",
        })
    }
}

/// One audit entry. `from` is `None` only for the creation entry.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct TrailEntry {
    #[n(0)]
    pub actor_id: String,
    #[n(1)]
    pub verb: Verb,
    #[n(2)]
    pub from: Option<Status>,
    #[n(3)]
    pub to: Status,
    #[n(4)]
    pub at: TimeStamp<Utc>,
    #[n(5)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum LeaveType {
    #[n(0)]
    Annual,
    #[n(1)]
    Sick,
    #[n(2)]
    Casual,
    #[n(3)]
    Unpaid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, minicbor::Encode, minicbor::Decode)]
pub enum Priority {
    #[n(0)]
    Low,
    #[n(1)]
    Normal,
    #[n(2)]
    High,
    #[n(3)]
    Urgent,
}

/// Admin decision on a self-service request. Advisory only, never state.
#[derive(Debug, Clone, Default, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Decision {
    #[n(0)]
    pub approval_message: Option<String>,
    #[n(1)]
    pub approval_attachments: Vec<String>,
    #[n(2)]
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct LeaveDetails {
    #[n(0)]
    pub leave_type: LeaveType,
    #[n(1)]
    pub start: Day,
    #[n(2)]
    pub end: Day,
    #[n(3)]
    pub reason: String,
    #[n(4)]
    pub attachments: Vec<String>,
    #[n(5)]
    pub decision: Decision,
}

impl LeaveDetails {
    pub fn days(&self) -> i64 {
        self.start.days_until(self.end) + 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct OvertimeDetails {
    #[n(0)]
    pub date: Day,
    #[n(1)]
    pub start_time: ClockTime,
    #[n(2)]
    pub end_time: ClockTime,
    #[n(3)]
    pub reason: String,
    #[n(4)]
    pub decision: Decision,
}

impl OvertimeDetails {
    /// Worked minutes; an end time before the start time crosses midnight.
    pub fn minutes(&self) -> u32 {
        let start = self.start_time.minutes_since_midnight();
        let end = self.end_time.minutes_since_midnight();
        (end + 24 * 60 - start) % (24 * 60)
    }
    pub fn hours(&self) -> f32 {
        self.minutes() as f32 / 60.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct AdvanceSalaryDetails {
    #[n(0)]
    pub amount: u64, // whole currency units
    #[n(1)]
    pub reason: String,
    #[n(2)]
    pub decision: Decision,
}

/// Field evidence captured by the assigned employee.
#[derive(Debug, Clone, Default, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Completion {
    #[n(0)]
    pub signatures: Vec<String>,
    #[n(1)]
    pub photos: Vec<String>,
    #[n(2)]
    pub notes: Option<String>,
    #[n(3)]
    pub rating: Option<u8>,
    #[n(4)]
    pub submitted_at: Option<TimeStamp<Utc>>,
}

impl Completion {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn signature(mut self, uri: impl Into<String>) -> Self {
        self.signatures.push(uri.into());
        self
    }
    pub fn photo(mut self, uri: impl Into<String>) -> Self {
        self.photos.push(uri.into());
        self
    }
    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
    pub fn rating(mut self, stars: u8) -> Self {
        self.rating = Some(stars);
        self
    }
    /// Folds a partial update into what was already captured.
    pub(crate) fn merge(&mut self, update: Completion) {
        self.signatures.extend(update.signatures);
        self.photos.extend(update.photos);
        if update.notes.is_some() {
            self.notes = update.notes;
        }
        if update.rating.is_some() {
            self.rating = update.rating;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct WorkOrderDetails {
    #[n(0)]
    pub title: String,
    #[n(1)]
    pub description: String,
    #[n(2)]
    pub customer_id: Option<String>,
    #[n(3)]
    pub scheduled_for: Option<Day>,
    #[n(4)]
    pub assigned_employee_id: Option<String>,
    #[n(5)]
    pub completion: Completion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct PayrollFigures {
    #[n(0)]
    pub base_salary: u64,
    #[n(1)]
    pub allowances: u64,
    #[n(2)]
    pub deductions: u64,
}

impl PayrollFigures {
    pub fn new(base_salary: u64, allowances: u64, deductions: u64) -> Self {
        Self {
            base_salary,
            allowances,
            deductions,
        }
    }
    pub fn net(&self) -> Option<u64> {
        self.base_salary
            .checked_add(self.allowances)?
            .checked_sub(self.deductions)
    }
    pub fn validate(&self) -> PortalResult<()> {
        if self.base_salary == 0 {
            return Err(PortalError::validation("base salary must be greater than zero"));
        }
        if self.net().is_none() {
            return Err(PortalError::validation(
                "deductions cannot exceed base salary plus allowances",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct PayrollDetails {
    #[n(0)]
    pub year: i32,
    #[n(1)]
    pub month: u32,
    #[n(2)]
    pub figures: PayrollFigures,
    #[n(3)]
    pub due_date: Day,
    #[n(4)]
    pub employee_sign_ip: Option<String>,
    #[n(5)]
    pub employee_sign_user_agent: Option<String>,
    #[n(6)]
    pub signed_at: Option<TimeStamp<Utc>>,
    #[n(7)]
    pub rejection_reason: Option<String>,
    #[n(8)]
    pub issue_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct TicketDetails {
    #[n(0)]
    pub title: String,
    #[n(1)]
    pub description: String,
    #[n(2)]
    pub priority: Priority,
    #[n(3)]
    pub assignees: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum Payload {
    #[n(0)]
    Leave(#[n(0)] LeaveDetails),
    #[n(1)]
    Overtime(#[n(0)] OvertimeDetails),
    #[n(2)]
    AdvanceSalary(#[n(0)] AdvanceSalaryDetails),
    #[n(3)]
    WorkOrder(#[n(0)] WorkOrderDetails),
    #[n(4)]
    Payroll(#[n(0)] PayrollDetails),
    #[n(5)]
    Ticket(#[n(0)] TicketDetails),
}

impl Payload {
    pub fn leave(leave_type: LeaveType, start: Day, end: Day, reason: impl Into<String>) -> Self {
        Payload::Leave(LeaveDetails {
            leave_type,
            start,
            end,
            reason: reason.into(),
            attachments: vec![],
            decision: Decision::default(),
        })
    }
    pub fn overtime(
        date: Day,
        start_time: ClockTime,
        end_time: ClockTime,
        reason: impl Into<String>,
    ) -> Self {
        Payload::Overtime(OvertimeDetails {
            date,
            start_time,
            end_time,
            reason: reason.into(),
            decision: Decision::default(),
        })
    }
    pub fn advance_salary(amount: u64, reason: impl Into<String>) -> Self {
        Payload::AdvanceSalary(AdvanceSalaryDetails {
            amount,
            reason: reason.into(),
            decision: Decision::default(),
        })
    }
    pub fn work_order(title: impl Into<String>, description: impl Into<String>) -> Self {
        Payload::WorkOrder(WorkOrderDetails {
            title: title.into(),
            description: description.into(),
            customer_id: None,
            scheduled_for: None,
            assigned_employee_id: None,
            completion: Completion::default(),
        })
    }
    pub fn payroll(year: i32, month: u32, figures: PayrollFigures, due_date: Day) -> Self {
        Payload::Payroll(PayrollDetails {
            year,
            month,
            figures,
            due_date,
            employee_sign_ip: None,
            employee_sign_user_agent: None,
            signed_at: None,
            rejection_reason: None,
            issue_count: 0,
        })
    }
    pub fn ticket(
        title: impl Into<String>,
        description: impl Into<String>,
        priority: Priority,
    ) -> Self {
        Payload::Ticket(TicketDetails {
            title: title.into(),
            description: description.into(),
            priority,
            assignees: vec![],
        })
    }

    /// Leave supporting documents (opaque URIs).
    pub fn with_attachment(mut self, uri: impl Into<String>) -> Self {
        if let Payload::Leave(leave) = &mut self {
            leave.attachments.push(uri.into());
        }
        self
    }
    pub fn for_customer(mut self, customer_id: impl Into<String>) -> Self {
        if let Payload::WorkOrder(order) = &mut self {
            order.customer_id = Some(customer_id.into());
        }
        self
    }
    pub fn scheduled_for(mut self, day: Day) -> Self {
        if let Payload::WorkOrder(order) = &mut self {
            order.scheduled_for = Some(day);
        }
        self
    }
    /// Work order assignee, or an additional ticket assignee.
    pub fn assign_to(mut self, employee_id: impl Into<String>) -> Self {
        match &mut self {
            Payload::WorkOrder(order) => order.assigned_employee_id = Some(employee_id.into()),
            Payload::Ticket(ticket) => ticket.assignees.push(employee_id.into()),
            _ => {}
        }
        self
    }

    pub fn kind(&self) -> RequestKind {
        match self {
            Payload::Leave(_) => RequestKind::Leave,
            Payload::Overtime(_) => RequestKind::Overtime,
            Payload::AdvanceSalary(_) => RequestKind::AdvanceSalary,
            Payload::WorkOrder(_) => RequestKind::WorkOrder,
            Payload::Payroll(_) => RequestKind::Payroll,
            Payload::Ticket(_) => RequestKind::Ticket,
        }
    }

    /// Checks the shape of a payload submitted for creation.
    pub fn validate(&self, limits: &Limits) -> PortalResult<()> {
        match self {
            Payload::Leave(leave) => {
                if leave.end < leave.start {
                    return Err(PortalError::validation("leave cannot end before it starts"));
                }
                require_text(&leave.reason, 1, "leave reason")
            }
            Payload::Overtime(overtime) => {
                let minutes = overtime.minutes();
                if minutes < limits.overtime_min_minutes || minutes > limits.overtime_max_minutes {
                    return Err(PortalError::validation(format!(
                        "overtime must be between {} and {} hours, got {:.2}",
                        limits.overtime_min_minutes as f32 / 60.0,
                        limits.overtime_max_minutes as f32 / 60.0,
                        overtime.hours()
                    )));
                }
                require_text(&overtime.reason, 1, "overtime reason")
            }
            Payload::AdvanceSalary(advance) => {
                if advance.amount == 0 {
                    return Err(PortalError::validation("amount must be greater than zero"));
                }
                require_length(
                    &advance.reason,
                    limits.advance_reason_min_chars,
                    "advance salary reason",
                )
            }
            Payload::WorkOrder(order) => {
                if order
                    .assigned_employee_id
                    .as_deref()
                    .is_some_and(|id| id.trim().is_empty())
                {
                    return Err(PortalError::validation("assigned employee id is blank"));
                }
                require_text(&order.title, 1, "work order title")
            }
            Payload::Payroll(payroll) => {
                if !(1..=12).contains(&payroll.month) {
                    return Err(PortalError::validation("payroll month must be 1 to 12"));
                }
                payroll.figures.validate()
            }
            Payload::Ticket(ticket) => require_text(&ticket.title, 1, "ticket title"),
        }
    }

    /// Clears fields only the lifecycle may set, so a creator cannot pre-fill them.
    pub(crate) fn scrub(&mut self) {
        match self {
            Payload::Leave(leave) => leave.decision = Decision::default(),
            Payload::Overtime(overtime) => overtime.decision = Decision::default(),
            Payload::AdvanceSalary(advance) => advance.decision = Decision::default(),
            Payload::WorkOrder(order) => order.completion = Completion::default(),
            Payload::Payroll(payroll) => {
                payroll.employee_sign_ip = None;
                payroll.employee_sign_user_agent = None;
                payroll.signed_at = None;
                payroll.rejection_reason = None;
                payroll.issue_count = 0;
            }
            Payload::Ticket(_) => {}
        }
    }

    pub fn decision(&self) -> Option<&Decision> {
        match self {
            Payload::Leave(leave) => Some(&leave.decision),
            Payload::Overtime(overtime) => Some(&overtime.decision),
            Payload::AdvanceSalary(advance) => Some(&advance.decision),
            _ => None,
        }
    }

    pub(crate) fn decision_mut(&mut self) -> Option<&mut Decision> {
        match self {
            Payload::Leave(leave) => Some(&mut leave.decision),
            Payload::Overtime(overtime) => Some(&mut overtime.decision),
            Payload::AdvanceSalary(advance) => Some(&mut advance.decision),
            _ => None,
        }
    }
}

/// Minimum number of non-whitespace characters.
pub(crate) fn require_text(value: &str, min_chars: usize, field: &str) -> PortalResult<()> {
    let count = value.chars().filter(|c| !c.is_whitespace()).count();
    if count < min_chars.max(1) {
        let msg = if min_chars <= 1 {
            format!("{field} is required")
        } else {
            format!("{field} must be at least {min_chars} characters")
        };
        return Err(PortalError::Validation(msg));
    }
    Ok(())
}

/// Minimum length once leading and trailing whitespace is dropped.
fn require_length(value: &str, min_chars: usize, field: &str) -> PortalResult<()> {
    if value.trim().chars().count() < min_chars.max(1) {
        return Err(PortalError::Validation(format!(
            "{field} must be at least {min_chars} characters"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Request {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub business_unit: String,
    #[n(2)]
    pub subject_id: String,
    #[n(3)]
    pub kind: RequestKind,
    #[n(4)]
    pub status: Status,
    #[n(5)]
    pub created_at: TimeStamp<Utc>,
    #[n(6)]
    pub updated_at: TimeStamp<Utc>,
    #[n(7)]
    pub trail: Vec<TrailEntry>,
    #[n(8)]
    pub payload: Payload,
}

impl Request {
    /// Employees currently assigned to the record.
    pub fn assignees(&self) -> Vec<String> {
        match &self.payload {
            Payload::WorkOrder(order) => order.assigned_employee_id.iter().cloned().collect(),
            Payload::Ticket(ticket) => ticket.assignees.clone(),
            _ => vec![],
        }
    }

    pub fn resource(&self) -> Resource {
        Resource::new(self.business_unit.clone(), self.kind.capability())
            .owned_by(self.subject_id.clone())
            .assigned(self.assignees())
    }

    /// Number of trail entries, bumped by every committed change.
    pub fn revision(&self) -> u32 {
        self.trail.len() as u32
    }

    pub fn created_by(&self) -> Option<&str> {
        self.trail.first().map(|entry| entry.actor_id.as_str())
    }

    pub fn last_transition(&self) -> Option<&TrailEntry> {
        self.trail.last()
    }

    /// Status held immediately before the current one.
    pub fn previous_status(&self) -> Option<Status> {
        self.trail
            .iter()
            .rev()
            .find(|entry| entry.to == self.status && entry.from != Some(self.status))
            .and_then(|entry| entry.from)
    }

    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal(self.status)
    }

    pub fn encode(&self) -> Result<Vec<u8>, crate::error::StoreError> {
        minicbor::to_vec(self).map_err(|e| crate::error::StoreError::Encode(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, crate::error::StoreError> {
        Ok(minicbor::decode(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> Limits {
        Limits::default()
    }

    #[test]
    fn kind_round_trips_through_id_prefix() {
        for kind in RequestKind::ALL {
            let id = utils::new_uuid_to_bech32(kind.prefix()).unwrap();
            assert_eq!(RequestKind::from_id(&id), Some(kind));
        }
        let other = utils::new_uuid_to_bech32("ntf").unwrap();
        assert_eq!(RequestKind::from_id(&other), None);
    }

    #[test]
    fn advance_salary_requires_amount_and_reason() {
        assert!(Payload::advance_salary(0, "car repair").validate(&limits()).is_err());
        assert!(Payload::advance_salary(500, "car").validate(&limits()).is_err());
        assert!(Payload::advance_salary(500, "  car   ").validate(&limits()).is_err());
        assert!(Payload::advance_salary(500, "car repair").validate(&limits()).is_ok());
    }

    #[test]
    fn advance_reason_length_counts_inner_spaces() {
        assert!(Payload::advance_salary(500, "ab cd").validate(&limits()).is_ok());
        assert!(Payload::advance_salary(500, "a b c d").validate(&limits()).is_ok());
        assert!(Payload::advance_salary(500, "  abcd  ").validate(&limits()).is_err());
    }

    #[test]
    fn overtime_hours_bounds() {
        let day = Day::ymd(2025, 5, 2).unwrap();
        let ot = |h1, m1, h2, m2| {
            Payload::overtime(
                day,
                ClockTime::hm(h1, m1).unwrap(),
                ClockTime::hm(h2, m2).unwrap(),
                "stock take",
            )
        };

        assert!(ot(18, 0, 18, 29).validate(&limits()).is_err());
        assert!(ot(18, 0, 18, 30).validate(&limits()).is_ok());
        assert!(ot(8, 0, 20, 0).validate(&limits()).is_ok());
        assert!(ot(8, 0, 20, 1).validate(&limits()).is_err());
        // crosses midnight
        assert!(ot(22, 0, 2, 0).validate(&limits()).is_ok());
        assert!(ot(9, 0, 9, 0).validate(&limits()).is_err());
    }

    #[test]
    fn overtime_hours_are_fractional() {
        let Payload::Overtime(ot) = Payload::overtime(
            Day::ymd(2025, 5, 2).unwrap(),
            ClockTime::hm(17, 0).unwrap(),
            ClockTime::hm(19, 30).unwrap(),
            "inventory",
        ) else {
            unreachable!()
        };
        assert_eq!(ot.hours(), 2.5);
    }

    #[test]
    fn leave_dates_must_be_ordered() {
        let a = Day::ymd(2025, 7, 10).unwrap();
        let b = Day::ymd(2025, 7, 12).unwrap();

        assert!(Payload::leave(LeaveType::Annual, b, a, "trip").validate(&limits()).is_err());
        assert!(Payload::leave(LeaveType::Annual, a, b, "trip").validate(&limits()).is_ok());
        assert!(Payload::leave(LeaveType::Sick, a, a, " ").validate(&limits()).is_err());
    }

    #[test]
    fn payroll_figures_cannot_go_negative() {
        assert!(PayrollFigures::new(1000, 100, 1100).validate().is_ok());
        assert!(PayrollFigures::new(1000, 100, 1101).validate().is_err());
        assert!(PayrollFigures::new(0, 100, 0).validate().is_err());
        assert_eq!(PayrollFigures::new(1000, 250, 50).net(), Some(1200));
    }

    #[test]
    fn scrub_clears_lifecycle_fields() {
        let mut payload = Payload::advance_salary(500, "car repair");
        if let Some(decision) = payload.decision_mut() {
            decision.approval_message = Some("pre-approved".into());
        }
        payload.scrub();

        assert_eq!(payload.decision(), Some(&Decision::default()));
    }

    #[test]
    fn terminal_statuses_per_kind() {
        assert!(RequestKind::Leave.is_terminal(Status::Cancelled));
        assert!(!RequestKind::Payroll.is_terminal(Status::Rejected));
        assert!(RequestKind::Payroll.is_terminal(Status::Completed));
        assert!(!RequestKind::Ticket.is_terminal(Status::Closed));
        assert!(RequestKind::WorkOrder.is_terminal(Status::Submitted));
    }
}
