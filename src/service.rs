//! Service layer API for portal commands and queries
use std::sync::Arc;

use crate::authz::{Action, Resource, can};
use crate::collab::{AssetRow, AssetSource, DocumentSink, NoDocuments, has_document};
use crate::config::PortalConfig;
use crate::directory::{Directory, Person, SledDirectory};
use crate::error::{PortalError, PortalResult};
use crate::identity::{Actor, Role};
use crate::machine::{Command, Engine, Invoker};
use crate::notify::{Audience, BroadcastReceipt, Dispatcher, Notification, TransitionEvent};
use crate::request::{Payload, Request, RequestKind, Status, TrailEntry, require_text};
use crate::store::{RequestStore, Snapshot};
use crate::types::{Day, TimeStamp};
use crate::views::{self, AggregationKind, AggregationResult};

/// Re-reads a cascade target this many times when it keeps changing underneath.
const CASCADE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListFilter {
    pub business_unit: String,
    pub subject_id: Option<String>,
    pub kind: Option<RequestKind>,
    pub status: Option<Status>,
}

impl ListFilter {
    pub fn new(business_unit: impl Into<String>) -> Self {
        Self {
            business_unit: business_unit.into(),
            subject_id: None,
            kind: None,
            status: None,
        }
    }
    pub fn subject(mut self, subject_id: impl Into<String>) -> Self {
        self.subject_id = Some(subject_id.into());
        self
    }
    pub fn kind(mut self, kind: RequestKind) -> Self {
        self.kind = Some(kind);
        self
    }
    pub fn status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }
}

/// Outcome of removing an employee from a business unit.
#[derive(Debug, Clone)]
pub struct Removal {
    pub person: Person,
    /// records the employee was taken off, as they were committed
    pub released: Vec<Request>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub events: usize,
    /// broadcasts with recipients still missing their copy
    pub broadcasts: usize,
    pub written: usize,
    pub remaining: usize,
}

pub struct PortalService {
    instance: Arc<sled::Db>,
    engine: Engine,
    store: RequestStore,
    dispatcher: Dispatcher,
    directory: Arc<dyn Directory>,
    assets: Arc<dyn AssetSource>,
    documents: Arc<dyn DocumentSink>,
    config: PortalConfig,
}

impl PortalService {
    /// Opens the store at `config.store_path`.
    pub fn open(config: PortalConfig) -> anyhow::Result<Self> {
        let instance = Arc::new(sled::open(&config.store_path)?);
        tracing::info!(path = %config.store_path.display(), "opened portal store");
        Ok(Self::new(instance, config)?)
    }

    /// Uses the people tree of `instance` as the directory.
    pub fn new(instance: Arc<sled::Db>, config: PortalConfig) -> PortalResult<Self> {
        let directory = Arc::new(SledDirectory::open(&instance)?);
        Self::with_directory(instance, config, directory)
    }

    pub fn with_directory(
        instance: Arc<sled::Db>,
        config: PortalConfig,
        directory: Arc<dyn Directory>,
    ) -> PortalResult<Self> {
        Ok(Self {
            engine: Engine::new(config.limits.clone()),
            store: RequestStore::open(&instance)?,
            dispatcher: Dispatcher::open(&instance, directory.clone(), config.dispatch.attempts)?,
            directory,
            assets: Arc::new(Vec::<AssetRow>::new()),
            documents: Arc::new(NoDocuments),
            config,
            instance,
        })
    }

    pub fn with_assets(mut self, assets: Arc<dyn AssetSource>) -> Self {
        self.assets = assets;
        self
    }

    pub fn with_documents(mut self, documents: Arc<dyn DocumentSink>) -> Self {
        self.documents = documents;
        self
    }

    pub fn directory(&self) -> &Arc<dyn Directory> {
        &self.directory
    }

    pub fn store(&self) -> &RequestStore {
        &self.store
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    /// Flushes pending writes to disk
    pub fn flush(&self) -> PortalResult<()> {
        self.instance
            .flush()
            .map_err(|e| PortalError::Storage(e.into()))?;
        Ok(())
    }

    /// File a new request or issue a new record
    pub fn create_request(
        &self,
        actor: &Actor,
        subject_id: &str,
        payload: Payload,
    ) -> PortalResult<Request> {
        let kind = payload.kind();
        let resource = Resource::new(actor.business_unit.clone(), kind.capability())
            .owned_by(subject_id);
        if !can(actor, Action::Create, &resource) {
            return Err(PortalError::denied(format!("cannot create a {kind}")));
        }

        // Subject and assignees must belong to the actor's unit
        let subject = self.member(&actor.business_unit, subject_id)?;
        if kind == RequestKind::Payroll && subject.role != Role::Employee {
            return Err(PortalError::validation(format!(
                "{subject_id} is not an employee"
            )));
        }
        let assignees = match &payload {
            Payload::WorkOrder(order) => order.assigned_employee_id.iter().cloned().collect(),
            Payload::Ticket(ticket) => ticket.assignees.clone(),
            _ => vec![],
        };
        for employee_id in &assignees {
            self.employee(&actor.business_unit, employee_id)?;
        }

        let request = self
            .engine
            .create(actor, subject_id, payload, TimeStamp::new())?;
        let event = TransitionEvent::latest(&request);

        // Record, subject index and outbox entry in one transaction
        self.store.insert_new(&request, &event)?;
        tracing::info!(id = %request.id, %kind, actor = %actor.id, status = %request.status, "request created");

        self.after_commit(&request, &event);
        Ok(request)
    }

    /// Apply a command to an existing record
    pub fn transition(
        &self,
        actor: &Actor,
        request_id: &str,
        command: Command,
    ) -> PortalResult<Request> {
        // Load from DB
        let snapshot = self.load(&actor.business_unit, request_id)?;
        let current = &snapshot.request;

        let verb = command.verb();
        if !can(actor, verb.action(), &current.resource()) {
            return Err(PortalError::denied(format!(
                "cannot {} this {}",
                verb.name(),
                current.kind
            )));
        }
        if let Command::Assign { employee_id } = &command {
            self.employee(&actor.business_unit, employee_id)?;
        }

        let next = self
            .engine
            .plan(current, Invoker::Actor(actor), command, TimeStamp::new())?;
        let event = TransitionEvent::latest(&next);

        // Only lands if nobody committed since we read
        self.store.commit(&snapshot, &next, Some(&event))?;
        tracing::info!(
            id = %next.id,
            actor = %actor.id,
            verb = verb.name(),
            from = %current.status,
            to = %next.status,
            "request transitioned"
        );

        self.after_commit(&next, &event);
        Ok(next)
    }

    pub fn get_request(&self, actor: &Actor, request_id: &str) -> PortalResult<Request> {
        let snapshot = self.load(&actor.business_unit, request_id)?;
        if !can(actor, Action::View, &snapshot.request.resource()) {
            return Err(PortalError::denied(format!(
                "cannot view this {}",
                snapshot.request.kind
            )));
        }
        Ok(snapshot.request)
    }

    /// The audit trail of one record, oldest entry first
    pub fn history(&self, actor: &Actor, request_id: &str) -> PortalResult<Vec<TrailEntry>> {
        Ok(self.get_request(actor, request_id)?.trail)
    }

    /// Records matching `filter` that the actor may view, oldest first
    pub fn list_requests(&self, actor: &Actor, filter: &ListFilter) -> PortalResult<Vec<Request>> {
        if filter.business_unit != actor.business_unit {
            return Err(PortalError::denied("records of another business unit"));
        }
        let unit = &filter.business_unit;

        let mut found = match &filter.subject_id {
            Some(subject_id) => self.store.by_subject(unit, subject_id, filter.kind)?,
            None => {
                let kinds = match filter.kind {
                    Some(kind) => vec![kind],
                    None => RequestKind::ALL.to_vec(),
                };
                let mut all = vec![];
                for kind in kinds {
                    all.extend(self.store.scan(unit, kind, filter.status)?);
                }
                all
            }
        };

        found.retain(|request| {
            filter.status.is_none_or(|s| s == request.status)
                && can(actor, Action::View, &request.resource())
        });
        found.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(found)
    }

    /// The actor's own notifications, newest first
    pub fn list_notifications(&self, actor: &Actor, limit: usize) -> PortalResult<Vec<Notification>> {
        let limit = limit.min(self.config.dispatch.max_page);
        Ok(self
            .dispatcher
            .list_for(&actor.business_unit, &actor.id, limit)?)
    }

    pub fn mark_read(&self, actor: &Actor, notification_id: &str) -> PortalResult<Notification> {
        self.dispatcher
            .mark_read(
                &actor.business_unit,
                &actor.id,
                notification_id,
                TimeStamp::new(),
            )?
            .ok_or_else(|| PortalError::NotFound(notification_id.to_owned()))
    }

    pub fn aggregate(
        &self,
        actor: &Actor,
        kind: AggregationKind,
        business_unit: &str,
        as_of: Day,
    ) -> PortalResult<AggregationResult> {
        if !can(actor, Action::View, &kind.resource(business_unit)) {
            return Err(PortalError::denied(format!("cannot view {kind:?}")));
        }
        let window = self.config.views.upcoming_window_days;
        let result = match kind {
            AggregationKind::PendingCounts => {
                AggregationResult::PendingCounts(views::pending_counts(&self.store, business_unit)?)
            }
            AggregationKind::RatingAverages => {
                AggregationResult::Ratings(views::rating_averages(&self.store, business_unit)?)
            }
            AggregationKind::AssetExpiry => AggregationResult::Buckets(views::asset_expiry(
                self.assets.as_ref(),
                business_unit,
                as_of,
                window,
            )?),
            AggregationKind::UpcomingLeave => AggregationResult::Buckets(views::upcoming_leave(
                &self.store,
                business_unit,
                as_of,
                window,
            )?),
            AggregationKind::PayrollDue => AggregationResult::Buckets(views::payroll_due(
                &self.store,
                business_unit,
                as_of,
                window,
            )?),
        };
        Ok(result)
    }

    /// Send an announcement to part of the actor's business unit
    pub fn broadcast(
        &self,
        actor: &Actor,
        audience: Audience,
        title: &str,
        body: &str,
    ) -> PortalResult<BroadcastReceipt> {
        if !can(
            actor,
            Action::Broadcast,
            &Resource::admin_only(actor.business_unit.clone()),
        ) {
            return Err(PortalError::denied("only admins can broadcast"));
        }
        require_text(title, 1, "broadcast title")?;
        require_text(body, 1, "broadcast message")?;

        Ok(self
            .dispatcher
            .broadcast(actor, &audience, title, body, TimeStamp::new())?)
    }

    /// Take an employee off every open assignment, then drop them from the directory
    pub fn remove_employee(&self, actor: &Actor, employee_id: &str) -> PortalResult<Removal> {
        let unit = &actor.business_unit;
        if !can(actor, Action::Manage, &Resource::admin_only(unit.clone())) {
            return Err(PortalError::denied("only admins can remove employees"));
        }
        let person = self.employee(unit, employee_id)?;

        let mut candidates = self
            .store
            .scan(unit, RequestKind::WorkOrder, Some(Status::Assigned))?;
        candidates.extend(self.store.scan(unit, RequestKind::Ticket, None)?);

        let mut released = vec![];
        for record in candidates {
            if !record.assignees().iter().any(|id| id == employee_id) {
                continue;
            }
            if let Some(next) = self.release(unit, &record.id, employee_id)? {
                released.push(next);
            }
        }

        self.directory.remove(unit, employee_id)?;
        tracing::info!(employee = %employee_id, actor = %actor.id, released = released.len(), "employee removed");
        Ok(Removal { person, released })
    }

    /// Re-run fan-out for every transition or broadcast whose notifications
    /// did not all land
    pub fn drain_outbox(&self) -> PortalResult<DrainReport> {
        let mut report = DrainReport::default();
        for event in self.store.queued_events()? {
            report.events += 1;
            match self.dispatcher.on_transition(&event) {
                Ok(written) => {
                    report.written += written.len();
                    self.store.settle(&event)?;
                }
                Err(e) => {
                    tracing::warn!(request = %event.request_id, revision = event.revision, error = %e, "dispatch still failing");
                    report.remaining += 1;
                }
            }
        }
        for plan in self.dispatcher.pending_broadcasts()? {
            report.broadcasts += 1;
            match self.dispatcher.redeliver(&plan) {
                Ok(written) => report.written += written.len(),
                Err(e) => {
                    tracing::warn!(broadcast = %plan.id, error = %e, "broadcast still incomplete");
                    report.remaining += 1;
                }
            }
        }
        if report.events + report.broadcasts > 0 {
            tracing::info!(?report, "outbox drained");
        }
        Ok(report)
    }

    fn load(&self, business_unit: &str, request_id: &str) -> PortalResult<Snapshot> {
        self.store
            .get(business_unit, request_id)?
            .ok_or_else(|| PortalError::NotFound(request_id.to_owned()))
    }

    fn member(&self, business_unit: &str, id: &str) -> PortalResult<Person> {
        self.directory
            .person(business_unit, id)?
            .ok_or_else(|| PortalError::validation(format!("{id} is not a member of {business_unit}")))
    }

    fn employee(&self, business_unit: &str, id: &str) -> PortalResult<Person> {
        let person = self.member(business_unit, id)?;
        if person.role != Role::Employee {
            return Err(PortalError::validation(format!("{id} is not an employee")));
        }
        Ok(person)
    }

    /// System unassign of one record, re-reading on conflict.
    fn release(
        &self,
        business_unit: &str,
        request_id: &str,
        employee_id: &str,
    ) -> PortalResult<Option<Request>> {
        for _ in 0..CASCADE_ATTEMPTS {
            let Some(snapshot) = self.store.get(business_unit, request_id)? else {
                return Ok(None);
            };
            if !snapshot.request.assignees().iter().any(|id| id == employee_id) {
                return Ok(None);
            }
            let command = Command::Unassign {
                employee_id: employee_id.to_owned(),
            };
            let next = match self
                .engine
                .plan(&snapshot.request, Invoker::System, command, TimeStamp::new())
            {
                Ok(next) => next,
                // moved on to a status that keeps its assignee
                Err(PortalError::IllegalTransition { .. }) => return Ok(None),
                Err(e) => return Err(e),
            };
            let event = TransitionEvent::latest(&next);
            match self.store.commit(&snapshot, &next, Some(&event)) {
                Ok(()) => {
                    tracing::debug!(id = %next.id, employee = %employee_id, to = %next.status, "assignment released");
                    self.after_commit(&next, &event);
                    return Ok(Some(next));
                }
                Err(PortalError::Conflict(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(PortalError::Conflict(request_id.to_owned()))
    }

    /// Second phase: notifications and documents. Never fails the caller.
    fn after_commit(&self, request: &Request, event: &TransitionEvent) {
        match self.dispatcher.on_transition(event) {
            Ok(_) => {
                if let Err(e) = self.store.settle(event) {
                    tracing::warn!(request = %request.id, error = %e, "could not clear outbox entry");
                }
            }
            Err(e) => {
                tracing::warn!(request = %request.id, error = %e, "dispatch incomplete, left in outbox");
            }
        }

        if has_document(request.kind) {
            if let Err(e) = self.documents.committed(request) {
                tracing::warn!(request = %request.id, error = %format!("{e:#}"), "document sink failed");
            }
        }
    }
}
