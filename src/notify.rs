//! Transition fan-out and broadcasts.
//!
//! Recipients are a pure function of `(kind, to_status)` resolved against the
//! [`Directory`]. Every notification is stored under a sha256 digest of
//! `(source, revision, status, recipient)`, so delivering the same event twice
//! writes nothing the second time. Broadcasts keep their resolved audience in
//! `pending_broadcasts` until every copy is written.
use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use sled::Transactional;
use sled::transaction::{TransactionError, TransactionResult};

use crate::directory::Directory;
use crate::error::StoreError;
use crate::identity::{Actor, Role, capability};
use crate::machine::Verb;
use crate::request::{Request, RequestKind, Status};
use crate::store::scoped_key;
use crate::types::TimeStamp;
use crate::utils::new_uuid_to_bech32;

/// What the dispatcher needs to know about one committed change.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct TransitionEvent {
    #[n(0)]
    pub request_id: String,
    #[n(1)]
    pub kind: RequestKind,
    #[n(2)]
    pub business_unit: String,
    #[n(3)]
    pub subject_id: String,
    #[n(4)]
    pub assignees: Vec<String>,
    #[n(5)]
    pub from: Option<Status>,
    #[n(6)]
    pub to: Status,
    #[n(7)]
    pub verb: Verb,
    #[n(8)]
    pub actor_id: String,
    #[n(9)]
    pub revision: u32,
    #[n(10)]
    pub at: TimeStamp<Utc>,
}

impl TransitionEvent {
    /// The event for the newest trail entry of `request`.
    pub fn latest(request: &Request) -> Self {
        let last = request.last_transition();
        Self {
            request_id: request.id.clone(),
            kind: request.kind,
            business_unit: request.business_unit.clone(),
            subject_id: request.subject_id.clone(),
            assignees: request.assignees(),
            from: last.and_then(|entry| entry.from),
            to: request.status,
            verb: last.map_or(Verb::Create, |entry| entry.verb),
            actor_id: last.map(|entry| entry.actor_id.clone()).unwrap_or_default(),
            revision: request.revision(),
            at: request.updated_at,
        }
    }

    pub(crate) fn outbox_key(&self) -> Vec<u8> {
        let mut key = scoped_key(&self.request_id, "");
        key.extend_from_slice(&self.revision.to_be_bytes());
        key
    }

    pub fn encode(&self) -> Result<Vec<u8>, StoreError> {
        minicbor::to_vec(self).map_err(|e| StoreError::Encode(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        Ok(minicbor::decode(bytes)?)
    }

    /// Status moves notify; in-place edits only notify when someone new was assigned.
    fn is_announced(&self) -> bool {
        self.from != Some(self.to) || self.verb == Verb::Assign
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipientSelector {
    Admins,
    AdminsHolding(&'static str),
    Subject,
    Assignees,
}

pub fn recipients_for(kind: RequestKind, to: Status) -> &'static [RecipientSelector] {
    use RecipientSelector::*;

    match (kind, to) {
        (k, Status::Pending) if k.is_self_service() => &[Admins],
        (k, Status::Approved | Status::Rejected) if k.is_self_service() => &[Subject],
        (RequestKind::WorkOrder, Status::Assigned) => &[Assignees],
        (RequestKind::WorkOrder, Status::Submitted) => &[Admins],
        (RequestKind::Payroll, Status::PendingSignature | Status::Completed) => &[Subject],
        (RequestKind::Payroll, Status::Signed | Status::Rejected) => &[Admins],
        (RequestKind::Ticket, _) => &[AdminsHolding(capability::TICKETS), Assignees],
        _ => &[],
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum Source {
    #[n(0)]
    Request {
        #[n(0)]
        id: String,
        #[n(1)]
        kind: RequestKind,
        #[n(2)]
        status: Status,
        #[n(3)]
        revision: u32,
    },
    #[n(1)]
    Broadcast {
        #[n(0)]
        id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Notification {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub business_unit: String,
    #[n(2)]
    pub recipient_id: String,
    #[n(3)]
    pub source: Source,
    #[n(4)]
    pub title: String,
    #[n(5)]
    pub body: String,
    #[n(6)]
    pub created_at: TimeStamp<Utc>,
    #[n(7)]
    pub read_at: Option<TimeStamp<Utc>>,
}

impl Notification {
    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }

    fn encode(&self) -> Result<Vec<u8>, StoreError> {
        minicbor::to_vec(self).map_err(|e| StoreError::Encode(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        Ok(minicbor::decode(bytes)?)
    }
}

/// Who a broadcast goes to, snapshotted when it is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    Explicit(Vec<String>),
    AllEmployees,
    AllCustomers,
}

#[derive(Debug, Clone)]
pub struct BroadcastReceipt {
    pub id: String,
    pub delivered: Vec<Notification>,
    /// explicit recipients that are not members of the unit
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
}

/// A broadcast with its audience resolved. Kept until every recipient has it.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct BroadcastPlan {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub business_unit: String,
    #[n(2)]
    pub sender_id: String,
    #[n(3)]
    pub recipients: Vec<String>,
    #[n(4)]
    pub title: String,
    #[n(5)]
    pub body: String,
    #[n(6)]
    pub created_at: TimeStamp<Utc>,
}

impl BroadcastPlan {
    /// The unsaved notification for one recipient and its idempotency key.
    fn copy_for(&self, recipient: &str) -> (Notification, String) {
        let draft = Notification {
            id: String::new(),
            business_unit: self.business_unit.clone(),
            recipient_id: recipient.to_owned(),
            source: Source::Broadcast {
                id: self.id.clone(),
            },
            title: self.title.clone(),
            body: self.body.clone(),
            created_at: self.created_at,
            read_at: None,
        };
        (draft, digest(&["broadcast", &self.id, recipient]))
    }

    fn encode(&self) -> Result<Vec<u8>, StoreError> {
        minicbor::to_vec(self).map_err(|e| StoreError::Encode(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        Ok(minicbor::decode(bytes)?)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum DispatchError {
    #[error("could not resolve recipients: {0}")]
    Recipients(#[source] StoreError),
    #[error("could not update pending broadcasts: {0}")]
    Outbox(#[source] StoreError),
    #[error("{} of {total} notifications could not be written", .failed.len())]
    Partial {
        delivered: Vec<Notification>,
        failed: Vec<String>,
        total: usize,
    },
}

pub struct Dispatcher {
    notifications: sled::Tree,
    inbox: sled::Tree,
    ids: sled::Tree,
    broadcasts: sled::Tree,
    directory: Arc<dyn Directory>,
    attempts: u32,
}

impl Dispatcher {
    pub fn open(
        db: &Arc<sled::Db>,
        directory: Arc<dyn Directory>,
        attempts: u32,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            notifications: db.open_tree("notifications")?,
            inbox: db.open_tree("inbox")?,
            ids: db.open_tree("notification_ids")?,
            broadcasts: db.open_tree("pending_broadcasts")?,
            directory,
            attempts: attempts.max(1),
        })
    }

    /// Concrete recipient ids for `event`, never including the actor.
    pub fn recipients(&self, event: &TransitionEvent) -> Result<BTreeSet<String>, StoreError> {
        let mut ids = BTreeSet::new();
        if !event.is_announced() {
            return Ok(ids);
        }
        for selector in recipients_for(event.kind, event.to) {
            match selector {
                RecipientSelector::Admins => ids.extend(
                    self.directory
                        .members(&event.business_unit, Role::Admin)?
                        .into_iter()
                        .map(|person| person.id),
                ),
                RecipientSelector::AdminsHolding(cap) => ids.extend(
                    self.directory
                        .members(&event.business_unit, Role::Admin)?
                        .into_iter()
                        .filter(|person| person.holds(cap))
                        .map(|person| person.id),
                ),
                RecipientSelector::Subject => {
                    ids.insert(event.subject_id.clone());
                }
                RecipientSelector::Assignees => ids.extend(event.assignees.iter().cloned()),
            }
        }
        ids.remove(&event.actor_id);
        Ok(ids)
    }

    /// Writes the notifications for one committed transition and returns the
    /// ones that did not exist yet.
    pub fn on_transition(&self, event: &TransitionEvent) -> Result<Vec<Notification>, DispatchError> {
        let recipients = self.recipients(event).map_err(DispatchError::Recipients)?;
        let title = format!("{}: {}", event.kind, event.to);
        let body = match event.from {
            None => format!("{} was created", event.request_id),
            Some(from) if from == event.to => {
                format!("{} was updated ({})", event.request_id, event.verb.name())
            }
            Some(from) => format!("{} moved from {from} to {}", event.request_id, event.to),
        };
        let source = Source::Request {
            id: event.request_id.clone(),
            kind: event.kind,
            status: event.to,
            revision: event.revision,
        };

        let mut delivered = vec![];
        let mut failed = vec![];
        for recipient in &recipients {
            // The revision is part of the key so a record that returns to an
            // earlier status announces it again.
            let key = digest(&[
                &event.request_id,
                &event.revision.to_string(),
                &event.to.to_string(),
                recipient,
            ]);
            let draft = Notification {
                id: String::new(),
                business_unit: event.business_unit.clone(),
                recipient_id: recipient.clone(),
                source: source.clone(),
                title: title.clone(),
                body: body.clone(),
                created_at: event.at,
                read_at: None,
            };
            match self.deliver(draft, &key) {
                Ok(Some(notification)) => delivered.push(notification),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(request = %event.request_id, %recipient, error = %e, "notification not written");
                    failed.push(recipient.clone());
                }
            }
        }

        if !failed.is_empty() {
            return Err(DispatchError::Partial {
                delivered,
                failed,
                total: recipients.len(),
            });
        }
        tracing::debug!(request = %event.request_id, revision = event.revision, written = delivered.len(), "dispatched");
        Ok(delivered)
    }

    pub fn broadcast(
        &self,
        sender: &Actor,
        audience: &Audience,
        title: &str,
        body: &str,
        now: TimeStamp<Utc>,
    ) -> Result<BroadcastReceipt, StoreError> {
        let unit = &sender.business_unit;
        let mut recipients = BTreeSet::new();
        let mut skipped = vec![];
        match audience {
            Audience::Explicit(ids) => {
                for id in ids {
                    match self.directory.person(unit, id)? {
                        Some(person) => {
                            recipients.insert(person.id);
                        }
                        None => skipped.push(id.clone()),
                    }
                }
            }
            Audience::AllEmployees => recipients.extend(
                self.directory
                    .members(unit, Role::Employee)?
                    .into_iter()
                    .map(|p| p.id),
            ),
            Audience::AllCustomers => recipients.extend(
                self.directory
                    .members(unit, Role::Customer)?
                    .into_iter()
                    .map(|p| p.id),
            ),
        }
        recipients.remove(&sender.id);

        let plan = BroadcastPlan {
            id: new_uuid_to_bech32("advert")?,
            business_unit: unit.clone(),
            sender_id: sender.id.clone(),
            recipients: recipients.into_iter().collect(),
            title: title.to_owned(),
            body: body.to_owned(),
            created_at: now,
        };
        self.broadcasts.insert(plan.id.as_bytes(), plan.encode()?)?;

        let (delivered, failed) = self.fan_out(&plan);
        if failed.is_empty() {
            self.broadcasts.remove(plan.id.as_bytes())?;
        }
        tracing::info!(broadcast = %plan.id, sender = %sender.id, delivered = delivered.len(), skipped = skipped.len(), failed = failed.len(), "broadcast sent");
        Ok(BroadcastReceipt {
            id: plan.id,
            delivered,
            skipped,
            failed,
        })
    }

    /// Broadcasts some of whose recipients are still missing their copy.
    pub fn pending_broadcasts(&self) -> Result<Vec<BroadcastPlan>, StoreError> {
        let mut plans = vec![];
        for entry in self.broadcasts.iter() {
            let (_, raw) = entry?;
            plans.push(BroadcastPlan::decode(&raw)?);
        }
        Ok(plans)
    }

    /// Delivers `plan` to whoever does not have it yet and forgets the plan
    /// once nobody is missing.
    pub fn redeliver(&self, plan: &BroadcastPlan) -> Result<Vec<Notification>, DispatchError> {
        let (delivered, failed) = self.fan_out(plan);
        if !failed.is_empty() {
            return Err(DispatchError::Partial {
                delivered,
                failed,
                total: plan.recipients.len(),
            });
        }
        self.broadcasts
            .remove(plan.id.as_bytes())
            .map_err(|e| DispatchError::Outbox(e.into()))?;
        Ok(delivered)
    }

    fn fan_out(&self, plan: &BroadcastPlan) -> (Vec<Notification>, Vec<String>) {
        let mut delivered = vec![];
        let mut failed = vec![];
        for recipient in &plan.recipients {
            let (draft, key) = plan.copy_for(recipient);
            match self.deliver(draft, &key) {
                Ok(Some(notification)) => delivered.push(notification),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(broadcast = %plan.id, %recipient, error = %e, "notification not written");
                    failed.push(recipient.clone());
                }
            }
        }
        (delivered, failed)
    }

    /// Newest first.
    pub fn list_for(
        &self,
        business_unit: &str,
        recipient_id: &str,
        limit: usize,
    ) -> Result<Vec<Notification>, StoreError> {
        let prefix = inbox_prefix(business_unit, recipient_id);
        let mut found = vec![];
        for entry in self.inbox.scan_prefix(&prefix).rev().take(limit) {
            let (_, key) = entry?;
            if let Some(raw) = self.notifications.get(&key)? {
                found.push(Notification::decode(&raw)?);
            }
        }
        Ok(found)
    }

    /// Sets `read_at` once. `None` when the notification is not the caller's.
    pub fn mark_read(
        &self,
        business_unit: &str,
        recipient_id: &str,
        notification_id: &str,
        now: TimeStamp<Utc>,
    ) -> Result<Option<Notification>, StoreError> {
        let Some(key) = self.ids.get(notification_id.as_bytes())? else {
            return Ok(None);
        };
        loop {
            let Some(raw) = self.notifications.get(&key)? else {
                return Ok(None);
            };
            let mut notification = Notification::decode(&raw)?;
            if notification.business_unit != business_unit
                || notification.recipient_id != recipient_id
            {
                return Ok(None);
            }
            if notification.is_read() {
                return Ok(Some(notification));
            }
            notification.read_at = Some(now);
            let swapped =
                self.notifications
                    .compare_and_swap(&key, Some(&raw), Some(notification.encode()?))?;
            if swapped.is_ok() {
                return Ok(Some(notification));
            }
        }
    }

    fn deliver(&self, mut draft: Notification, key: &str) -> Result<Option<Notification>, StoreError> {
        draft.id = new_uuid_to_bech32("ntf")?;
        let mut attempt = 1;
        loop {
            match self.insert_once(&draft, key) {
                Ok(true) => return Ok(Some(draft)),
                Ok(false) => return Ok(None),
                Err(e) if attempt < self.attempts => {
                    tracing::debug!(attempt, error = %e, "retrying notification write");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Writes the record, the inbox entry and the id index together unless
    /// the digest is already present.
    fn insert_once(&self, notification: &Notification, key: &str) -> Result<bool, StoreError> {
        let bytes = notification.encode()?;
        let mut inbox_key = inbox_prefix(&notification.business_unit, &notification.recipient_id);
        inbox_key.extend_from_slice(&(notification.created_at.nanos() as u64).to_be_bytes());
        inbox_key.extend_from_slice(key.as_bytes());

        let result: TransactionResult<bool, ()> = (&self.notifications, &self.inbox, &self.ids)
            .transaction(|(records, inbox, ids)| {
                if records.get(key.as_bytes())?.is_some() {
                    return Ok(false);
                }
                records.insert(key.as_bytes(), bytes.as_slice())?;
                inbox.insert(inbox_key.as_slice(), key.as_bytes())?;
                ids.insert(notification.id.as_bytes(), key.as_bytes())?;
                Ok(true)
            });

        match result {
            Ok(fresh) => Ok(fresh),
            Err(TransactionError::Abort(())) => Ok(false),
            Err(TransactionError::Storage(e)) => Err(e.into()),
        }
    }
}

fn inbox_prefix(business_unit: &str, recipient_id: &str) -> Vec<u8> {
    let mut key = scoped_key(business_unit, recipient_id);
    key.push(0);
    key
}

fn digest(parts: &[&str]) -> String {
    sha256::digest(parts.join("\u{0}"))
}
