//! Transition executor shared by every request kind.
//!
//! Each kind is described by a static edge table. Planning a transition looks
//! up the edge for `(current status, verb)`, checks the invoking party, applies
//! the command's payload effects to a copy of the record and stamps the trail.
//! Nothing here touches storage: a rejected plan leaves the caller's record as
//! it was, and the store decides whether an accepted plan can still commit.
use chrono::Utc;

use crate::authz::Action;
use crate::config::Limits;
use crate::error::{PortalError, PortalResult};
use crate::identity::{Actor, Role, capability};
use crate::request::{
    Completion, LeaveType, Payload, PayrollFigures, Request, RequestKind, Status, TrailEntry,
    require_text,
};
use crate::types::TimeStamp;
use crate::utils::new_uuid_to_bech32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode)]
pub enum Verb {
    #[n(0)]
    Create,
    #[n(1)]
    Approve,
    #[n(2)]
    Reject,
    #[n(3)]
    Cancel,
    #[n(4)]
    Assign,
    #[n(5)]
    Unassign,
    #[n(6)]
    RecordProgress,
    #[n(7)]
    Submit,
    #[n(8)]
    Issue,
    #[n(9)]
    Sign,
    #[n(10)]
    Decline,
    #[n(11)]
    Complete,
    #[n(12)]
    Reissue,
    #[n(13)]
    Move,
}

impl Verb {
    pub fn name(&self) -> &'static str {
        match self {
            Verb::Create => "create",
            Verb::Approve => "approve",
            Verb::Reject => "reject",
            Verb::Cancel => "cancel",
            Verb::Assign => "assign",
            Verb::Unassign => "unassign",
            Verb::RecordProgress => "record progress",
            Verb::Submit => "submit",
            Verb::Issue => "issue for signature",
            Verb::Sign => "sign",
            Verb::Decline => "decline",
            Verb::Complete => "complete",
            Verb::Reissue => "re-issue",
            Verb::Move => "change status",
        }
    }

    /// Gate action checked before the engine runs.
    pub fn action(&self) -> Action {
        match self {
            Verb::Create => Action::Create,
            Verb::Approve => Action::Approve,
            Verb::Reject => Action::Reject,
            Verb::Cancel => Action::Cancel,
            Verb::RecordProgress | Verb::Submit | Verb::Sign | Verb::Decline => Action::Respond,
            Verb::Move => Action::StatusUpdate,
            Verb::Assign | Verb::Unassign | Verb::Issue | Verb::Complete | Verb::Reissue => {
                Action::Manage
            }
        }
    }
}

/// Who may take an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    /// the employee the record is about
    Owner,
    Admin,
    Assignee,
    /// an admin, or an assigned employee holding the tickets capability
    TicketAgent,
    /// cascade repairs only, never a caller
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Only(Status),
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    To(Status),
    /// the status named by the command
    Requested,
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub from: Origin,
    pub verb: Verb,
    pub to: Target,
    pub by: Party,
}

const fn edge(from: Status, verb: Verb, to: Status, by: Party) -> Edge {
    Edge {
        from: Origin::Only(from),
        verb,
        to: Target::To(to),
        by,
    }
}

const SELF_SERVICE: &[Edge] = &[
    edge(Status::Pending, Verb::Approve, Status::Approved, Party::Admin),
    edge(Status::Pending, Verb::Reject, Status::Rejected, Party::Admin),
    edge(Status::Pending, Verb::Cancel, Status::Cancelled, Party::Owner),
];

const WORK_ORDER: &[Edge] = &[
    edge(Status::Draft, Verb::Assign, Status::Assigned, Party::Admin),
    edge(Status::Assigned, Verb::Assign, Status::Assigned, Party::Admin),
    Edge {
        from: Origin::Only(Status::Assigned),
        verb: Verb::RecordProgress,
        to: Target::Unchanged,
        by: Party::Assignee,
    },
    edge(Status::Assigned, Verb::Submit, Status::Submitted, Party::Assignee),
    edge(Status::Assigned, Verb::Unassign, Status::Draft, Party::System),
];

const PAYROLL: &[Edge] = &[
    edge(Status::Generated, Verb::Issue, Status::PendingSignature, Party::Admin),
    edge(Status::Generated, Verb::Sign, Status::Signed, Party::Owner),
    edge(Status::PendingSignature, Verb::Sign, Status::Signed, Party::Owner),
    edge(Status::Generated, Verb::Decline, Status::Rejected, Party::Owner),
    edge(Status::PendingSignature, Verb::Decline, Status::Rejected, Party::Owner),
    edge(Status::Signed, Verb::Complete, Status::Completed, Party::Admin),
    edge(Status::Rejected, Verb::Reissue, Status::Generated, Party::Admin),
];

const TICKET: &[Edge] = &[
    Edge {
        from: Origin::Any,
        verb: Verb::Move,
        to: Target::Requested,
        by: Party::TicketAgent,
    },
    Edge {
        from: Origin::Any,
        verb: Verb::Assign,
        to: Target::Unchanged,
        by: Party::Admin,
    },
    Edge {
        from: Origin::Any,
        verb: Verb::Unassign,
        to: Target::Unchanged,
        by: Party::System,
    },
];

pub fn table(kind: RequestKind) -> &'static [Edge] {
    match kind {
        RequestKind::Leave | RequestKind::Overtime | RequestKind::AdvanceSalary => SELF_SERVICE,
        RequestKind::WorkOrder => WORK_ORDER,
        RequestKind::Payroll => PAYROLL,
        RequestKind::Ticket => TICKET,
    }
}

pub fn find_edge(kind: RequestKind, status: Status, verb: Verb) -> Option<&'static Edge> {
    table(kind).iter().find(|edge| {
        edge.verb == verb
            && match edge.from {
                Origin::Only(from) => from == status,
                Origin::Any => true,
            }
    })
}

/// Opaque client evidence captured with a payroll signature or decline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureStamp {
    pub ip: String,
    pub user_agent: String,
}

impl SignatureStamp {
    pub fn new(ip: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            user_agent: user_agent.into(),
        }
    }
}

/// An intent against an existing record.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Approve {
        message: Option<String>,
        attachments: Vec<String>,
    },
    Reject {
        reason: String,
    },
    Cancel,
    Assign {
        employee_id: String,
    },
    /// Removes an employee from the record; only reachable through cascades.
    Unassign {
        employee_id: String,
    },
    RecordProgress(Completion),
    Submit(Completion),
    Issue,
    Sign(SignatureStamp),
    Decline {
        reason: String,
        stamp: SignatureStamp,
    },
    Complete,
    Reissue(PayrollFigures),
    Move(Status),
}

impl Command {
    pub fn approve() -> Self {
        Command::Approve {
            message: None,
            attachments: vec![],
        }
    }
    pub fn approve_with_message(message: impl Into<String>) -> Self {
        Command::Approve {
            message: Some(message.into()),
            attachments: vec![],
        }
    }
    pub fn reject(reason: impl Into<String>) -> Self {
        Command::Reject {
            reason: reason.into(),
        }
    }
    pub fn assign(employee_id: impl Into<String>) -> Self {
        Command::Assign {
            employee_id: employee_id.into(),
        }
    }
    pub fn decline(reason: impl Into<String>, stamp: SignatureStamp) -> Self {
        Command::Decline {
            reason: reason.into(),
            stamp,
        }
    }

    pub fn verb(&self) -> Verb {
        match self {
            Command::Approve { .. } => Verb::Approve,
            Command::Reject { .. } => Verb::Reject,
            Command::Cancel => Verb::Cancel,
            Command::Assign { .. } => Verb::Assign,
            Command::Unassign { .. } => Verb::Unassign,
            Command::RecordProgress(_) => Verb::RecordProgress,
            Command::Submit(_) => Verb::Submit,
            Command::Issue => Verb::Issue,
            Command::Sign(_) => Verb::Sign,
            Command::Decline { .. } => Verb::Decline,
            Command::Complete => Verb::Complete,
            Command::Reissue(_) => Verb::Reissue,
            Command::Move(_) => Verb::Move,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Invoker<'a> {
    Actor(&'a Actor),
    System,
}

impl Invoker<'_> {
    fn id(&self) -> &str {
        match self {
            Invoker::Actor(actor) => &actor.id,
            Invoker::System => "system",
        }
    }
}

pub struct Engine {
    limits: Limits,
}

impl Engine {
    pub fn new(limits: Limits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Builds a new record in its initial status. A work order created with an
    /// assignee is taken straight through the assign edge.
    pub fn create(
        &self,
        actor: &Actor,
        subject_id: &str,
        mut payload: Payload,
        now: TimeStamp<Utc>,
    ) -> PortalResult<Request> {
        let kind = payload.kind();
        may_create(actor, kind, subject_id, &payload)?;
        payload.validate(&self.limits)?;
        payload.scrub();

        let pending_assignee = match &mut payload {
            Payload::WorkOrder(order) => order.assigned_employee_id.take(),
            _ => None,
        };

        let status = kind.initial_status();
        let request = Request {
            id: new_uuid_to_bech32(kind.prefix())?,
            business_unit: actor.business_unit.clone(),
            subject_id: subject_id.to_owned(),
            kind,
            status,
            created_at: now,
            updated_at: now,
            trail: vec![TrailEntry {
                actor_id: actor.id.clone(),
                verb: Verb::Create,
                from: None,
                to: status,
                at: now,
                note: None,
            }],
            payload,
        };

        match pending_assignee {
            Some(employee_id) => self.plan(
                &request,
                Invoker::Actor(actor),
                Command::Assign { employee_id },
                now,
            ),
            None => Ok(request),
        }
    }

    /// Computes the record that results from `command`, or why it cannot happen.
    pub fn plan(
        &self,
        request: &Request,
        invoker: Invoker<'_>,
        command: Command,
        now: TimeStamp<Utc>,
    ) -> PortalResult<Request> {
        let verb = command.verb();
        let illegal = || PortalError::IllegalTransition {
            kind: request.kind,
            status: request.status,
            verb: verb.name(),
        };
        let edge = find_edge(request.kind, request.status, verb).ok_or_else(illegal)?;

        if !permits(edge.by, invoker, request) {
            return Err(PortalError::denied(refusal(edge.by, verb)));
        }

        let to = match (edge.to, &command) {
            (Target::To(status), _) => status,
            (Target::Unchanged, _) => request.status,
            (Target::Requested, Command::Move(status)) => {
                if !status.is_ticket_status() {
                    return Err(PortalError::validation(format!(
                        "'{status}' is not a ticket status"
                    )));
                }
                if *status == request.status {
                    return Err(illegal());
                }
                *status
            }
            (Target::Requested, _) => return Err(illegal()),
        };

        let mut next = request.clone();
        let note = self.apply(&mut next, command, now)?;

        next.trail.push(TrailEntry {
            actor_id: invoker.id().to_owned(),
            verb,
            from: Some(request.status),
            to,
            at: now,
            note,
        });
        next.status = to;
        next.updated_at = now;

        check_invariants(&next)?;
        Ok(next)
    }

    /// Payload side effects of a command. Returns the trail note.
    fn apply(
        &self,
        request: &mut Request,
        command: Command,
        now: TimeStamp<Utc>,
    ) -> PortalResult<Option<String>> {
        let (kind, status) = (request.kind, request.status);
        let illegal = move |verb: Verb| PortalError::IllegalTransition {
            kind,
            status,
            verb: verb.name(),
        };

        match command {
            Command::Approve {
                message,
                attachments,
            } => {
                let annual =
                    matches!(&request.payload, Payload::Leave(l) if l.leave_type == LeaveType::Annual);
                if !attachments.is_empty() && !annual {
                    return Err(PortalError::validation(
                        "attachments can only accompany an annual leave approval",
                    ));
                }
                let message = message
                    .map(|m| m.trim().to_owned())
                    .filter(|m| !m.is_empty());
                let decision = request
                    .payload
                    .decision_mut()
                    .ok_or_else(|| illegal(Verb::Approve))?;
                decision.approval_message = message.clone();
                decision.approval_attachments = attachments;
                Ok(message)
            }
            Command::Reject { reason } => {
                let reason = required_reason(reason)?;
                let decision = request
                    .payload
                    .decision_mut()
                    .ok_or_else(|| illegal(Verb::Reject))?;
                decision.rejection_reason = Some(reason.clone());
                Ok(Some(reason))
            }
            Command::Cancel | Command::Issue | Command::Complete | Command::Move(_) => Ok(None),
            Command::Assign { employee_id } => {
                require_text(&employee_id, 1, "employee id")?;
                match &mut request.payload {
                    Payload::WorkOrder(order) => {
                        order.assigned_employee_id = Some(employee_id.clone());
                    }
                    Payload::Ticket(ticket) => {
                        if ticket.assignees.contains(&employee_id) {
                            return Err(PortalError::validation(format!(
                                "{employee_id} is already assigned"
                            )));
                        }
                        ticket.assignees.push(employee_id.clone());
                    }
                    _ => return Err(illegal(Verb::Assign)),
                }
                Ok(Some(employee_id))
            }
            Command::Unassign { employee_id } => {
                match &mut request.payload {
                    Payload::WorkOrder(order) => order.assigned_employee_id = None,
                    Payload::Ticket(ticket) => {
                        let before = ticket.assignees.len();
                        ticket.assignees.retain(|id| *id != employee_id);
                        if ticket.assignees.len() == before {
                            return Err(PortalError::validation(format!(
                                "{employee_id} is not assigned"
                            )));
                        }
                    }
                    _ => return Err(illegal(Verb::Unassign)),
                }
                Ok(Some(employee_id))
            }
            Command::RecordProgress(update) => {
                check_rating(&update)?;
                let Payload::WorkOrder(order) = &mut request.payload else {
                    return Err(illegal(Verb::RecordProgress));
                };
                order.completion.merge(update);
                Ok(None)
            }
            Command::Submit(update) => {
                check_rating(&update)?;
                let Payload::WorkOrder(order) = &mut request.payload else {
                    return Err(illegal(Verb::Submit));
                };
                order.completion.merge(update);
                if order.completion.signatures.is_empty() {
                    return Err(PortalError::validation(
                        "a customer signature is required to submit a work order",
                    ));
                }
                order.completion.submitted_at = Some(now);
                Ok(order.completion.notes.clone())
            }
            Command::Sign(stamp) => {
                check_stamp(&stamp)?;
                let Payload::Payroll(payroll) = &mut request.payload else {
                    return Err(illegal(Verb::Sign));
                };
                payroll.employee_sign_ip = Some(stamp.ip);
                payroll.employee_sign_user_agent = Some(stamp.user_agent);
                payroll.signed_at = Some(now);
                payroll.rejection_reason = None;
                Ok(None)
            }
            Command::Decline { reason, stamp } => {
                let reason = required_reason(reason)?;
                check_stamp(&stamp)?;
                let Payload::Payroll(payroll) = &mut request.payload else {
                    return Err(illegal(Verb::Decline));
                };
                payroll.employee_sign_ip = Some(stamp.ip);
                payroll.employee_sign_user_agent = Some(stamp.user_agent);
                payroll.rejection_reason = Some(reason.clone());
                Ok(Some(reason))
            }
            Command::Reissue(figures) => {
                figures.validate()?;
                let Payload::Payroll(payroll) = &mut request.payload else {
                    return Err(illegal(Verb::Reissue));
                };
                payroll.figures = figures;
                payroll.issue_count += 1;
                payroll.employee_sign_ip = None;
                payroll.employee_sign_user_agent = None;
                payroll.signed_at = None;
                payroll.rejection_reason = None;
                Ok(Some(format!("issue {}", payroll.issue_count + 1)))
            }
        }
    }
}

fn may_create(
    actor: &Actor,
    kind: RequestKind,
    subject_id: &str,
    payload: &Payload,
) -> PortalResult<()> {
    let own = actor.id == subject_id;
    let allowed = match kind {
        RequestKind::Leave | RequestKind::Overtime | RequestKind::AdvanceSalary => {
            own && actor.role == Role::Employee
        }
        RequestKind::WorkOrder | RequestKind::Payroll => actor.is_admin(),
        RequestKind::Ticket => {
            let unassigned = matches!(payload, Payload::Ticket(t) if t.assignees.is_empty());
            actor.is_admin() || (own && actor.role == Role::Customer && unassigned)
        }
    };
    if allowed {
        return Ok(());
    }
    Err(PortalError::denied(match kind {
        k if k.is_self_service() => format!("a {k} can only be filed by the employee it is for"),
        RequestKind::Ticket => "tickets are opened by an admin or by the customer they concern".into(),
        k => format!("only an admin can create a {k}"),
    }))
}

fn permits(party: Party, invoker: Invoker<'_>, request: &Request) -> bool {
    let actor = match invoker {
        Invoker::System => return party == Party::System,
        Invoker::Actor(actor) => actor,
    };
    if actor.business_unit != request.business_unit {
        return false;
    }
    let assigned = || request.assignees().iter().any(|id| *id == actor.id);
    match party {
        Party::Owner => actor.id == request.subject_id && !actor.is_admin(),
        Party::Admin => actor.is_admin(),
        Party::Assignee => assigned(),
        Party::TicketAgent => {
            actor.is_admin()
                || (actor.role == Role::Employee && actor.holds(capability::TICKETS) && assigned())
        }
        Party::System => false,
    }
}

fn refusal(party: Party, verb: Verb) -> String {
    let who = match party {
        Party::Owner => "the employee the record belongs to",
        Party::Admin => "an admin of the business unit",
        Party::Assignee => "the assigned employee",
        Party::TicketAgent => "an admin or an assigned ticket agent",
        Party::System => "the portal itself",
    };
    format!("only {who} can {}", verb.name())
}

fn required_reason(reason: String) -> PortalResult<String> {
    let reason = reason.trim().to_owned();
    if reason.is_empty() {
        return Err(PortalError::validation("reason is required to reject"));
    }
    Ok(reason)
}

fn check_rating(completion: &Completion) -> PortalResult<()> {
    match completion.rating {
        Some(stars) if !(1..=5).contains(&stars) => {
            Err(PortalError::validation("rating must be between 1 and 5"))
        }
        _ => Ok(()),
    }
}

fn check_stamp(stamp: &SignatureStamp) -> PortalResult<()> {
    require_text(&stamp.ip, 1, "signing ip address")?;
    require_text(&stamp.user_agent, 1, "signing user agent")
}

fn check_invariants(request: &Request) -> PortalResult<()> {
    if let Payload::WorkOrder(order) = &request.payload {
        if request.status == Status::Assigned && order.assigned_employee_id.is_none() {
            return Err(PortalError::validation(
                "an assigned work order needs an assigned employee",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Day;

    fn engine() -> Engine {
        Engine::new(Limits::default())
    }

    fn emp() -> Actor {
        Actor::employee("emp_1", "printers")
    }

    fn admin() -> Actor {
        Actor::admin("adm_1", "printers")
    }

    fn annual_leave() -> Request {
        let start = Day::ymd(2025, 8, 4).unwrap();
        let end = Day::ymd(2025, 8, 8).unwrap();
        engine()
            .create(
                &emp(),
                "emp_1",
                Payload::leave(LeaveType::Annual, start, end, "family trip"),
                TimeStamp::new(),
            )
            .unwrap()
    }

    #[test]
    fn self_service_request_starts_pending() {
        let leave = annual_leave();

        assert_eq!(leave.status, Status::Pending);
        assert_eq!(leave.revision(), 1);
        assert_eq!(leave.created_by(), Some("emp_1"));
        assert!(leave.id.starts_with("leave1"));
    }

    #[test]
    fn only_the_owner_may_file_self_service() {
        let payload = Payload::advance_salary(500, "car repair");
        let err = engine()
            .create(&admin(), "emp_1", payload.clone(), TimeStamp::new())
            .unwrap_err();
        assert!(matches!(err, PortalError::Authorization(_)));

        let err = engine()
            .create(&emp(), "emp_2", payload, TimeStamp::new())
            .unwrap_err();
        assert!(matches!(err, PortalError::Authorization(_)));
    }

    #[test]
    fn approve_records_message_and_trail() {
        let leave = annual_leave();
        let approved = engine()
            .plan(
                &leave,
                Invoker::Actor(&admin()),
                Command::Approve {
                    message: Some("enjoy".into()),
                    attachments: vec!["s3://memo.pdf".into()],
                },
                TimeStamp::new(),
            )
            .unwrap();

        assert_eq!(approved.status, Status::Approved);
        assert_eq!(approved.previous_status(), Some(Status::Pending));
        let last = approved.last_transition().unwrap();
        assert_eq!(last.actor_id, "adm_1");
        assert_eq!(last.verb, Verb::Approve);
        let decision = approved.payload.decision().unwrap();
        assert_eq!(decision.approval_message.as_deref(), Some("enjoy"));
        assert_eq!(decision.approval_attachments.len(), 1);
    }

    #[test]
    fn attachments_only_on_annual_leave() {
        let advance = engine()
            .create(
                &emp(),
                "emp_1",
                Payload::advance_salary(500, "car repair"),
                TimeStamp::new(),
            )
            .unwrap();
        let err = engine()
            .plan(
                &advance,
                Invoker::Actor(&admin()),
                Command::Approve {
                    message: None,
                    attachments: vec!["s3://x".into()],
                },
                TimeStamp::new(),
            )
            .unwrap_err();
        assert!(matches!(err, PortalError::Validation(_)));
    }

    #[test]
    fn reject_needs_a_reason() {
        let leave = annual_leave();
        let err = engine()
            .plan(
                &leave,
                Invoker::Actor(&admin()),
                Command::reject("   "),
                TimeStamp::new(),
            )
            .unwrap_err();

        assert_eq!(err.to_string(), "invalid request: reason is required to reject");
    }

    #[test]
    fn admin_cannot_cancel_for_the_employee() {
        let leave = annual_leave();
        let err = engine()
            .plan(&leave, Invoker::Actor(&admin()), Command::Cancel, TimeStamp::new())
            .unwrap_err();
        assert!(matches!(err, PortalError::Authorization(_)));

        let cancelled = engine()
            .plan(&leave, Invoker::Actor(&emp()), Command::Cancel, TimeStamp::new())
            .unwrap();
        assert_eq!(cancelled.status, Status::Cancelled);
    }

    #[test]
    fn terminal_self_service_refuses_everything() {
        let approved = engine()
            .plan(
                &annual_leave(),
                Invoker::Actor(&admin()),
                Command::approve(),
                TimeStamp::new(),
            )
            .unwrap();

        for command in [Command::approve(), Command::reject("late"), Command::Cancel] {
            let err = engine()
                .plan(&approved, Invoker::Actor(&admin()), command, TimeStamp::new())
                .unwrap_err();
            assert!(matches!(err, PortalError::IllegalTransition { .. }));
        }
    }

    #[test]
    fn system_edges_are_not_for_callers() {
        let order = engine()
            .create(
                &admin(),
                "cus_1",
                Payload::work_order("Fuser jam", "3rd floor MFP").assign_to("emp_1"),
                TimeStamp::new(),
            )
            .unwrap();
        assert_eq!(order.status, Status::Assigned);

        let err = engine()
            .plan(
                &order,
                Invoker::Actor(&admin()),
                Command::Unassign {
                    employee_id: "emp_1".into(),
                },
                TimeStamp::new(),
            )
            .unwrap_err();
        assert!(matches!(err, PortalError::Authorization(_)));

        let draft = engine()
            .plan(
                &order,
                Invoker::System,
                Command::Unassign {
                    employee_id: "emp_1".into(),
                },
                TimeStamp::new(),
            )
            .unwrap();
        assert_eq!(draft.status, Status::Draft);
        assert!(draft.assignees().is_empty());
    }

    #[test]
    fn ticket_moves_anywhere_but_in_place() {
        let ticket = engine()
            .create(
                &admin(),
                "cus_1",
                Payload::ticket("Toner", "streaks", crate::request::Priority::High),
                TimeStamp::new(),
            )
            .unwrap();

        let resolved = engine()
            .plan(
                &ticket,
                Invoker::Actor(&admin()),
                Command::Move(Status::Resolved),
                TimeStamp::new(),
            )
            .unwrap();
        let reopened = engine()
            .plan(
                &resolved,
                Invoker::Actor(&admin()),
                Command::Move(Status::InProgress),
                TimeStamp::new(),
            )
            .unwrap();
        assert_eq!(reopened.status, Status::InProgress);

        let err = engine()
            .plan(
                &reopened,
                Invoker::Actor(&admin()),
                Command::Move(Status::InProgress),
                TimeStamp::new(),
            )
            .unwrap_err();
        assert!(matches!(err, PortalError::IllegalTransition { .. }));

        let err = engine()
            .plan(
                &reopened,
                Invoker::Actor(&admin()),
                Command::Move(Status::Approved),
                TimeStamp::new(),
            )
            .unwrap_err();
        assert!(matches!(err, PortalError::Validation(_)));
    }

    #[test]
    fn ticket_agent_needs_capability_and_assignment() {
        let ticket = engine()
            .create(
                &admin(),
                "cus_1",
                Payload::ticket("Toner", "streaks", crate::request::Priority::Low).assign_to("emp_1"),
                TimeStamp::new(),
            )
            .unwrap();
        let plain = emp();
        let agent = emp().with_access([capability::TICKETS]);
        let stranger = Actor::employee("emp_2", "printers").with_access([capability::TICKETS]);

        let moved = |who: &Actor| {
            engine().plan(
                &ticket,
                Invoker::Actor(who),
                Command::Move(Status::InProgress),
                TimeStamp::new(),
            )
        };
        assert!(moved(&plain).is_err());
        assert!(moved(&stranger).is_err());
        assert!(moved(&agent).is_ok());
    }

    #[test]
    fn reissue_counts_issues() {
        let payroll = engine()
            .create(
                &admin(),
                "emp_1",
                Payload::payroll(
                    2025,
                    6,
                    PayrollFigures::new(3000, 200, 100),
                    Day::ymd(2025, 7, 5).unwrap(),
                ),
                TimeStamp::new(),
            )
            .unwrap();
        let stamp = SignatureStamp::new("10.0.0.5", "Firefox");
        let rejected = engine()
            .plan(
                &payroll,
                Invoker::Actor(&emp()),
                Command::decline("wrong base salary", stamp),
                TimeStamp::new(),
            )
            .unwrap();
        let reissued = engine()
            .plan(
                &rejected,
                Invoker::Actor(&admin()),
                Command::Reissue(PayrollFigures::new(3200, 200, 100)),
                TimeStamp::new(),
            )
            .unwrap();

        assert_eq!(reissued.status, Status::Generated);
        let Payload::Payroll(details) = &reissued.payload else {
            unreachable!()
        };
        assert_eq!(details.issue_count, 1);
        assert_eq!(details.figures.base_salary, 3200);
        assert!(details.rejection_reason.is_none());
    }

    #[test]
    fn every_edge_belongs_to_its_kind() {
        for kind in RequestKind::ALL {
            for edge in table(kind) {
                if let Origin::Only(from) = edge.from {
                    assert!(!kind.is_terminal(from), "{kind}: edge out of terminal {from}");
                }
            }
        }
    }
}
