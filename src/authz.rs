//! The single authorization gate.
//!
//! `can` is evaluated before every mutation and before any read that crosses
//! an ownership boundary. Rules are applied in order and the first match wins:
//!
//! 1. a resource in another business unit is always denied
//! 2. employees and customers may create, view, cancel and respond to what they own
//! 3. admins may do anything
//! 4. employees holding the resource's capability may view it and update its status
//! 5. everything else is denied
use crate::identity::{Actor, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    View,
    /// Withdraw one's own request while it is still pending.
    Cancel,
    /// Sign or decline one's own payroll statement, record or submit one's own work.
    Respond,
    StatusUpdate,
    Approve,
    Reject,
    /// Issue, assign, complete and re-issue admin-owned records.
    Manage,
    Broadcast,
}

impl Action {
    fn is_self_service(&self) -> bool {
        matches!(
            self,
            Action::Create | Action::View | Action::Cancel | Action::Respond
        )
    }
}

/// What the gate needs to know about the thing being touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub business_unit: String,
    pub subject_id: Option<String>,
    pub assignees: Vec<String>,
    /// Capability that opens the resource to non-owning employees. `None` means admin only.
    pub capability: Option<&'static str>,
}

impl Resource {
    pub fn new(business_unit: impl Into<String>, capability: &'static str) -> Self {
        Self {
            business_unit: business_unit.into(),
            subject_id: None,
            assignees: vec![],
            capability: Some(capability),
        }
    }
    /// A business-unit wide resource nobody but an admin may touch.
    pub fn admin_only(business_unit: impl Into<String>) -> Self {
        Self {
            business_unit: business_unit.into(),
            subject_id: None,
            assignees: vec![],
            capability: None,
        }
    }
    pub fn owned_by(mut self, subject_id: impl Into<String>) -> Self {
        self.subject_id = Some(subject_id.into());
        self
    }
    pub fn assigned(mut self, assignees: Vec<String>) -> Self {
        self.assignees = assignees;
        self
    }
    pub fn is_owned_by(&self, actor: &Actor) -> bool {
        self.subject_id.as_deref() == Some(actor.id.as_str())
            || self.assignees.iter().any(|id| *id == actor.id)
    }
}

pub fn can(actor: &Actor, action: Action, resource: &Resource) -> bool {
    if resource.business_unit != actor.business_unit {
        return false;
    }
    if actor.role != Role::Admin && resource.is_owned_by(actor) && action.is_self_service() {
        return true;
    }
    if actor.role == Role::Admin {
        return true;
    }
    if actor.role == Role::Employee && matches!(action, Action::View | Action::StatusUpdate) {
        return resource.capability.is_some_and(|cap| actor.holds(cap));
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::capability;

    fn leave_of(owner: &str) -> Resource {
        Resource::new("printers", capability::LEAVE).owned_by(owner)
    }

    #[test]
    fn tenancy_beats_admin() {
        let admin = Actor::admin("adm_1", "facilities");
        assert!(!can(&admin, Action::View, &leave_of("emp_1")));
        assert!(!can(&admin, Action::Approve, &leave_of("emp_1")));
    }

    #[test]
    fn employee_without_access_keeps_self_service() {
        let emp = Actor::employee("emp_1", "printers");
        let own = leave_of("emp_1");

        assert!(can(&emp, Action::Create, &own));
        assert!(can(&emp, Action::View, &own));
        assert!(can(&emp, Action::Cancel, &own));
        assert!(!can(&emp, Action::Approve, &own));
        assert!(!can(&emp, Action::View, &leave_of("emp_2")));
        assert!(!can(
            &emp,
            Action::View,
            &Resource::new("printers", capability::TICKETS)
        ));
    }

    #[test]
    fn capability_opens_view_and_status_update_only() {
        let agent = Actor::employee("emp_3", "printers").with_access([capability::TICKETS]);
        let ticket = Resource::new("printers", capability::TICKETS).owned_by("cus_1");

        assert!(can(&agent, Action::View, &ticket));
        assert!(can(&agent, Action::StatusUpdate, &ticket));
        assert!(!can(&agent, Action::Manage, &ticket));
    }

    #[test]
    fn capability_never_grants_decisions() {
        let clerk = Actor::employee("emp_4", "printers").with_access([capability::LEAVE]);

        assert!(can(&clerk, Action::View, &leave_of("emp_1")));
        assert!(!can(&clerk, Action::Approve, &leave_of("emp_1")));
        assert!(!can(&clerk, Action::Reject, &leave_of("emp_1")));
    }

    #[test]
    fn assignee_counts_as_owner() {
        let tech = Actor::employee("emp_5", "printers");
        let order = Resource::new("printers", capability::SCHEDULE_WORKS)
            .owned_by("cus_9")
            .assigned(vec!["emp_5".into()]);

        assert!(can(&tech, Action::Respond, &order));
        assert!(!can(&tech, Action::StatusUpdate, &order));
    }

    #[test]
    fn customers_only_reach_their_own() {
        let customer = Actor::customer("cus_1", "printers");
        let ticket = Resource::new("printers", capability::TICKETS).owned_by("cus_1");
        let other = Resource::new("printers", capability::TICKETS).owned_by("cus_2");

        assert!(can(&customer, Action::Create, &ticket));
        assert!(!can(&customer, Action::StatusUpdate, &ticket));
        assert!(!can(&customer, Action::View, &other));
    }

    #[test]
    fn admin_only_resources() {
        let emp = Actor::employee("emp_1", "printers").with_access([capability::TICKETS]);
        let admin = Actor::admin("adm_1", "printers");
        let board = Resource::admin_only("printers");

        assert!(!can(&emp, Action::View, &board));
        assert!(can(&admin, Action::Broadcast, &board));
    }
}
