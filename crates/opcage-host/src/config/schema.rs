use std::time::Duration;

use serde::Deserialize;

use opcage_core::error::{OpcageError, Result};
use opcage_core::policy::{AccessLevel, ApiPolicy, MemberRewriter};

use crate::guard::RuntimeGuardSettings;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyDoc {
    pub version: u32,

    #[serde(default)]
    pub guard: GuardSection,

    #[serde(default)]
    pub namespaces: Vec<NamespaceEntry>,
}

impl PolicyDoc {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(OpcageError::BadPolicy(format!(
                "unsupported policy version {}",
                self.version
            )));
        }
        self.guard.validate()?;
        Ok(())
    }

    /// Build the core policy tree plus guard settings. Goes through the
    /// checked constructors, so a hostile document trips the same contracts
    /// as programmatic misuse (member-level neutral in particular).
    pub fn into_policy(self) -> Result<(ApiPolicy, RuntimeGuardSettings)> {
        self.validate()?;

        let mut policy = ApiPolicy::deny_all();
        for ns_entry in &self.namespaces {
            if policy.get_namespace(&ns_entry.namespace).is_some() {
                return Err(OpcageError::BadPolicy(format!(
                    "duplicate namespace entry: {}",
                    ns_entry.namespace
                )));
            }
            let ns = policy.namespace(ns_entry.namespace.clone(), ns_entry.access);
            for ty_entry in &ns_entry.types {
                if ns.get_type(&ty_entry.name).is_some() {
                    return Err(OpcageError::BadPolicy(format!(
                        "duplicate type entry: {}.{}",
                        ns_entry.namespace, ty_entry.name
                    )));
                }
                let ty = ns.ty(ty_entry.name.clone(), ty_entry.access);
                for m_entry in &ty_entry.members {
                    if ty.get_member(&m_entry.name).is_some() {
                        return Err(OpcageError::BadPolicy(format!(
                            "duplicate member entry: {}.{}::{}",
                            ns_entry.namespace, ty_entry.name, m_entry.name
                        )));
                    }
                    let rule = ty.member(m_entry.name.clone(), m_entry.access)?;
                    for rewriter in &m_entry.rewriters {
                        rule.add_rewriter(rewriter.clone())?;
                    }
                }
            }
        }

        Ok((policy, self.guard.settings()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GuardSection {
    #[serde(default = "default_stack_bytes_limit")]
    pub stack_bytes_limit: u64,

    #[serde(default = "default_array_length_limit")]
    pub array_length_limit: u64,

    #[serde(default = "default_time_limit_ms")]
    pub time_limit_ms: u64,
}

impl Default for GuardSection {
    fn default() -> Self {
        Self {
            stack_bytes_limit: default_stack_bytes_limit(),
            array_length_limit: default_array_length_limit(),
            time_limit_ms: default_time_limit_ms(),
        }
    }
}

impl GuardSection {
    pub fn validate(&self) -> Result<()> {
        if !(64..=1_048_576).contains(&self.stack_bytes_limit) {
            return Err(OpcageError::BadPolicy(
                "guard.stack_bytes_limit must be between 64 and 1048576".into(),
            ));
        }
        if !(1..=1_000_000).contains(&self.array_length_limit) {
            return Err(OpcageError::BadPolicy(
                "guard.array_length_limit must be between 1 and 1000000".into(),
            ));
        }
        if !(1..=60_000).contains(&self.time_limit_ms) {
            return Err(OpcageError::BadPolicy(
                "guard.time_limit_ms must be between 1 and 60000".into(),
            ));
        }
        Ok(())
    }

    pub fn settings(&self) -> RuntimeGuardSettings {
        RuntimeGuardSettings {
            stack_bytes_limit: self.stack_bytes_limit,
            array_length_limit: self.array_length_limit,
            time_limit: Duration::from_millis(self.time_limit_ms),
        }
    }
}

fn default_stack_bytes_limit() -> u64 {
    1024
}
fn default_array_length_limit() -> u64 {
    100
}
fn default_time_limit_ms() -> u64 {
    500
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NamespaceEntry {
    pub namespace: String,
    pub access: AccessLevel,
    #[serde(default)]
    pub types: Vec<TypeEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeEntry {
    pub name: String,
    /// Absent means "inherit from the namespace".
    #[serde(default)]
    pub access: Option<AccessLevel>,
    #[serde(default)]
    pub members: Vec<MemberEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemberEntry {
    pub name: String,
    pub access: AccessLevel,
    #[serde(default)]
    pub rewriters: Vec<MemberRewriter>,
}
