//! Policy document loader (strict parsing).

pub mod schema;

use std::fs;
use std::path::Path;

use opcage_core::error::{OpcageError, Result};
use opcage_core::policy::ApiPolicy;

use crate::guard::RuntimeGuardSettings;

pub use schema::PolicyDoc;

pub fn load_from_file(path: &str) -> Result<(ApiPolicy, RuntimeGuardSettings)> {
    let s = fs::read_to_string(path)
        .map_err(|e| OpcageError::Internal(format!("read policy failed: {e}")))?;
    if Path::new(path).extension().is_some_and(|e| e == "json") {
        load_from_json(&s)
    } else {
        load_from_str(&s)
    }
}

pub fn load_from_str(s: &str) -> Result<(ApiPolicy, RuntimeGuardSettings)> {
    let doc: PolicyDoc = serde_yaml::from_str(s)
        .map_err(|e| OpcageError::BadPolicy(format!("invalid yaml: {e}")))?;
    doc.into_policy()
}

pub fn load_from_json(s: &str) -> Result<(ApiPolicy, RuntimeGuardSettings)> {
    let doc: PolicyDoc = serde_json::from_str(s)
        .map_err(|e| OpcageError::BadPolicy(format!("invalid json: {e}")))?;
    doc.into_policy()
}
