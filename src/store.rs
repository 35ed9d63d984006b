//! Persistent request records.
//!
//! One sled tree per request kind. Keys are `business_unit ++ 0x00 ++ id`, so
//! a lookup with the wrong business unit simply misses and a unit's records
//! are one prefix scan. The `subjects` tree indexes records by the person they
//! concern, and `outbox` holds transition events whose notifications have not
//! all been written yet.
use std::collections::HashMap;
use std::sync::Arc;

use sled::Transactional;
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionResult};

use crate::error::{PortalError, PortalResult, StoreError};
use crate::notify::TransitionEvent;
use crate::request::{Request, RequestKind, Status};

/// `scope ++ 0x00 ++ id`. With an empty id this is the prefix of the whole scope.
pub fn scoped_key(scope: &str, id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(scope.len() + id.len() + 1);
    key.extend_from_slice(scope.as_bytes());
    key.push(0);
    key.extend_from_slice(id.as_bytes());
    key
}

/// A record together with the exact bytes it was read from.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub request: Request,
    raw: sled::IVec,
}

impl Snapshot {
    pub fn bytes(&self) -> &[u8] {
        &self.raw
    }
}

pub struct RequestStore {
    kinds: HashMap<RequestKind, sled::Tree>,
    subjects: sled::Tree,
    outbox: sled::Tree,
}

impl RequestStore {
    pub fn open(db: &Arc<sled::Db>) -> Result<Self, StoreError> {
        let mut kinds = HashMap::new();
        for kind in RequestKind::ALL {
            kinds.insert(kind, db.open_tree(kind.tree_name())?);
        }
        Ok(Self {
            kinds,
            subjects: db.open_tree("subjects")?,
            outbox: db.open_tree("outbox")?,
        })
    }

    fn tree(&self, kind: RequestKind) -> &sled::Tree {
        // every kind is opened in `open`
        &self.kinds[&kind]
    }

    pub fn get(&self, business_unit: &str, id: &str) -> Result<Option<Snapshot>, StoreError> {
        let Some(kind) = RequestKind::from_id(id) else {
            return Ok(None);
        };
        match self.tree(kind).get(scoped_key(business_unit, id))? {
            Some(raw) => Ok(Some(Snapshot {
                request: Request::decode(&raw)?,
                raw,
            })),
            None => Ok(None),
        }
    }

    /// Writes a freshly created record, its subject index entry and its
    /// creation event in one transaction.
    pub fn insert_new(&self, request: &Request, event: &TransitionEvent) -> PortalResult<()> {
        let key = scoped_key(&request.business_unit, &request.id);
        let bytes = request.encode()?;
        let subject_key = subject_key(&request.business_unit, &request.subject_id, &request.id);
        let (event_key, event_bytes) = (event.outbox_key(), event.encode()?);

        let result: TransactionResult<(), ()> = (self.tree(request.kind), &self.subjects, &self.outbox)
            .transaction(|(records, subjects, outbox)| {
                if records.get(key.as_slice())?.is_some() {
                    return Err(ConflictableTransactionError::Abort(()));
                }
                records.insert(key.as_slice(), bytes.as_slice())?;
                subjects.insert(subject_key.as_slice(), &[] as &[u8])?;
                outbox.insert(event_key.as_slice(), event_bytes.as_slice())?;
                Ok(())
            });

        match result {
            Ok(()) => Ok(()),
            Err(TransactionError::Abort(())) => Err(PortalError::Conflict(request.id.clone())),
            Err(TransactionError::Storage(e)) => Err(StoreError::from(e).into()),
        }
    }

    /// Replaces `snapshot` with `next` only if the stored bytes are still the
    /// ones the snapshot was read from. The event, if any, lands in the outbox
    /// in the same transaction.
    pub fn commit(
        &self,
        snapshot: &Snapshot,
        next: &Request,
        event: Option<&TransitionEvent>,
    ) -> PortalResult<()> {
        let key = scoped_key(&next.business_unit, &next.id);
        let bytes = next.encode()?;
        let queued = match event {
            Some(event) => Some((event.outbox_key(), event.encode()?)),
            None => None,
        };
        let expected: &[u8] = &snapshot.raw;

        let result: TransactionResult<(), ()> =
            (self.tree(next.kind), &self.outbox).transaction(|(records, outbox)| {
                let current = records.get(key.as_slice())?;
                if current.as_deref() != Some(expected) {
                    return Err(ConflictableTransactionError::Abort(()));
                }
                records.insert(key.as_slice(), bytes.as_slice())?;
                if let Some((event_key, event_bytes)) = &queued {
                    outbox.insert(event_key.as_slice(), event_bytes.as_slice())?;
                }
                Ok(())
            });

        match result {
            Ok(()) => Ok(()),
            Err(TransactionError::Abort(())) => {
                tracing::debug!(id = %next.id, "lost a concurrent transition");
                Err(PortalError::Conflict(next.id.clone()))
            }
            Err(TransactionError::Storage(e)) => Err(StoreError::from(e).into()),
        }
    }

    /// All records of one kind in a business unit, optionally narrowed by status.
    pub fn scan(
        &self,
        business_unit: &str,
        kind: RequestKind,
        status: Option<Status>,
    ) -> Result<Vec<Request>, StoreError> {
        let mut found = vec![];
        for entry in self.tree(kind).scan_prefix(scoped_key(business_unit, "")) {
            let (_, raw) = entry?;
            let request = Request::decode(&raw)?;
            if status.is_none_or(|s| s == request.status) {
                found.push(request);
            }
        }
        Ok(found)
    }

    /// Records about one person, through the subject index.
    pub fn by_subject(
        &self,
        business_unit: &str,
        subject_id: &str,
        kind: Option<RequestKind>,
    ) -> Result<Vec<Request>, StoreError> {
        let prefix = subject_key(business_unit, subject_id, "");
        let mut found = vec![];
        for entry in self.subjects.scan_prefix(&prefix) {
            let (key, _) = entry?;
            let id = String::from_utf8_lossy(&key[prefix.len()..]).into_owned();
            if kind.is_some_and(|k| RequestKind::from_id(&id) != Some(k)) {
                continue;
            }
            if let Some(snapshot) = self.get(business_unit, &id)? {
                found.push(snapshot.request);
            }
        }
        Ok(found)
    }

    pub fn queued_events(&self) -> Result<Vec<TransitionEvent>, StoreError> {
        let mut events = vec![];
        for entry in self.outbox.iter() {
            let (_, raw) = entry?;
            events.push(TransitionEvent::decode(&raw)?);
        }
        Ok(events)
    }

    pub fn settle(&self, event: &TransitionEvent) -> Result<(), StoreError> {
        self.outbox.remove(event.outbox_key())?;
        Ok(())
    }
}

fn subject_key(business_unit: &str, subject_id: &str, id: &str) -> Vec<u8> {
    let mut key = scoped_key(business_unit, subject_id);
    key.push(0);
    key.extend_from_slice(id.as_bytes());
    key
}
