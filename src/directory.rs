//! Who belongs to each business unit.
//!
//! Recipient sets ("all admins of the unit", "all customers") and subject
//! checks are resolved against a [`Directory`]. The people records themselves
//! are owned by the account system; [`SledDirectory`] is the copy the portal
//! keeps next to its own data.
use std::sync::Arc;

use crate::error::StoreError;
use crate::identity::{Actor, Role};
use crate::store::scoped_key;

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Person {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub business_unit: String,
    #[n(2)]
    pub role: Role,
    #[n(3)]
    pub display_name: String,
    #[n(4)]
    pub feature_access: Vec<String>,
}

impl Person {
    pub fn new(
        id: impl Into<String>,
        business_unit: impl Into<String>,
        role: Role,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            business_unit: business_unit.into(),
            role,
            display_name: display_name.into(),
            feature_access: vec![],
        }
    }
    pub fn with_access<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.feature_access
            .extend(capabilities.into_iter().map(Into::into));
        self
    }
    /// Admins with no explicit list are unrestricted.
    pub fn holds(&self, capability: &str) -> bool {
        if self.role == Role::Admin && self.feature_access.is_empty() {
            return true;
        }
        self.feature_access.iter().any(|c| c == capability)
    }
    pub fn as_actor(&self) -> Actor {
        Actor::new(self.id.clone(), self.role, self.business_unit.clone())
            .with_access(self.feature_access.iter().cloned())
    }
}

pub trait Directory: Send + Sync {
    fn person(&self, business_unit: &str, id: &str) -> Result<Option<Person>, StoreError>;
    fn members(&self, business_unit: &str, role: Role) -> Result<Vec<Person>, StoreError>;
    fn upsert(&self, person: &Person) -> Result<(), StoreError>;
    fn remove(&self, business_unit: &str, id: &str) -> Result<Option<Person>, StoreError>;
}

pub struct SledDirectory {
    people: sled::Tree,
}

impl SledDirectory {
    pub fn open(db: &Arc<sled::Db>) -> Result<Self, StoreError> {
        Ok(Self {
            people: db.open_tree("people")?,
        })
    }
}

impl Directory for SledDirectory {
    fn person(&self, business_unit: &str, id: &str) -> Result<Option<Person>, StoreError> {
        match self.people.get(scoped_key(business_unit, id))? {
            Some(bytes) => Ok(Some(minicbor::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn members(&self, business_unit: &str, role: Role) -> Result<Vec<Person>, StoreError> {
        let mut found = vec![];
        for entry in self.people.scan_prefix(scoped_key(business_unit, "")) {
            let (_, bytes) = entry?;
            let person: Person = minicbor::decode(&bytes)?;
            if person.role == role {
                found.push(person);
            }
        }
        Ok(found)
    }

    fn upsert(&self, person: &Person) -> Result<(), StoreError> {
        let bytes = minicbor::to_vec(person).map_err(|e| StoreError::Encode(e.to_string()))?;
        self.people
            .insert(scoped_key(&person.business_unit, &person.id), bytes)?;
        Ok(())
    }

    fn remove(&self, business_unit: &str, id: &str) -> Result<Option<Person>, StoreError> {
        match self.people.remove(scoped_key(business_unit, id))? {
            Some(bytes) => Ok(Some(minicbor::decode(&bytes)?)),
            None => Ok(None),
        }
    }
}
