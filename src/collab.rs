//! Systems the portal reads from or reports to without owning them.
use crate::request::{Request, RequestKind};
use crate::types::Day;

/// A row from the asset register, as far as expiry tracking cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRow {
    pub id: String,
    pub business_unit: String,
    pub name: String,
    pub expires_on: Day,
}

impl AssetRow {
    pub fn new(
        id: impl Into<String>,
        business_unit: impl Into<String>,
        name: impl Into<String>,
        expires_on: Day,
    ) -> Self {
        Self {
            id: id.into(),
            business_unit: business_unit.into(),
            name: name.into(),
            expires_on,
        }
    }
}

pub trait AssetSource: Send + Sync {
    fn assets(&self, business_unit: &str) -> anyhow::Result<Vec<AssetRow>>;
}

/// In-memory register, mostly for tests and demos.
impl AssetSource for Vec<AssetRow> {
    fn assets(&self, business_unit: &str) -> anyhow::Result<Vec<AssetRow>> {
        Ok(self
            .iter()
            .filter(|row| row.business_unit == business_unit)
            .cloned()
            .collect())
    }
}

/// Receives committed records that have a printable form (payslips, work
/// order reports, leave letters). Called after the commit; an error is logged
/// and never undoes the transition.
pub trait DocumentSink: Send + Sync {
    fn committed(&self, request: &Request) -> anyhow::Result<()>;
}

pub struct NoDocuments;

impl DocumentSink for NoDocuments {
    fn committed(&self, _: &Request) -> anyhow::Result<()> {
        Ok(())
    }
}

pub fn has_document(kind: RequestKind) -> bool {
    matches!(
        kind,
        RequestKind::Payroll | RequestKind::WorkOrder | RequestKind::Leave
    )
}
