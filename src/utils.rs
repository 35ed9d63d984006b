//! Identifier minting.
//!
//! Every id is a uuid7 encoded with bech32m; the human readable part names
//! what the id points at, so `leave1…` can be routed to the leave tree without
//! a lookup.
use bech32::{Bech32m, Hrp};
use uuid7::uuid7;

use crate::error::StoreError;

// construct a unique id then encode using bech32m
pub fn new_uuid_to_bech32(hrp: &str) -> Result<String, StoreError> {
    let hrp = Hrp::parse(hrp).map_err(|e| StoreError::Identifier(e.to_string()))?;
    bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())
        .map_err(|e| StoreError::Identifier(e.to_string()))
}

/// The human readable prefix of a bech32 id, if it decodes.
pub fn id_prefix(id: &str) -> Option<String> {
    let (hrp, data) = bech32::decode(id).ok()?;
    (data.len() == 16).then(|| hrp.as_str().to_owned())
}
