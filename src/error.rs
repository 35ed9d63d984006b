//! Error taxonomy returned from the command boundary
use crate::identity::Role;
use crate::request::{RequestKind, Status};

#[derive(thiserror::Error, Debug)]
pub enum PortalError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("not permitted: {0}")]
    Authorization(String),
    #[error("{kind} in status '{status}' does not allow '{verb}'")]
    IllegalTransition {
        kind: RequestKind,
        status: Status,
        verb: &'static str,
    },
    #[error("{0} was changed by someone else, reload and try again")]
    Conflict(String),
    #[error("{0} was not found")]
    NotFound(String),
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
}

impl PortalError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
    pub fn denied(msg: impl Into<String>) -> Self {
        Self::Authorization(msg.into())
    }
    /// Message safe to show the caller. Storage internals are only shown to admins.
    pub fn public_message(&self, role: Role) -> String {
        match self {
            Self::Storage(_) if role != Role::Admin => {
                "the portal could not complete the request, try again later".into()
            }
            other => other.to_string(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Sled(#[from] sled::Error),
    #[error("failed to encode record: {0}")]
    Encode(String),
    #[error("failed to decode record: {0}")]
    Decode(#[from] minicbor::decode::Error),
    #[error("failed to mint identifier: {0}")]
    Identifier(String),
    #[error("{0}")]
    Collaborator(String),
}

pub type PortalResult<T> = Result<T, PortalError>;
