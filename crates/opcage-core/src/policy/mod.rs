//! Access policy tree: namespace → type → member.
//!
//! A policy is built once, single-threaded, during setup, then shared
//! read-only between any number of concurrent validations. The one mutable
//! exception is each member's rewriter list, which is materialized lazily on
//! first touch; concurrent first access converges on a single shared list
//! with no lost additions.

mod filter;
mod rewriter;

pub use filter::{effective_member_access, effective_type_access, AccessFilter, FilterVerdict};
pub use rewriter::MemberRewriter;

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::{Mutex, OnceLock};

use serde::{Deserialize, Serialize};

use crate::error::{OpcageError, Result};

/// Access verdict attached to a policy node.
///
/// `Neutral` is legal at namespace and type level only; member rules are
/// strictly allow/deny.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Denied,
    Neutral,
    Allowed,
}

/// Root of the access-control tree, keyed by namespace.
#[derive(Debug, Default)]
pub struct ApiPolicy {
    namespaces: BTreeMap<String, NamespacePolicy>,
}

impl ApiPolicy {
    /// Empty policy: every namespace is implicitly denied.
    pub fn deny_all() -> Self {
        Self::default()
    }

    /// Insert or update a namespace rule, returning it for further building.
    pub fn namespace(
        &mut self,
        name: impl Into<String>,
        access: AccessLevel,
    ) -> &mut NamespacePolicy {
        let rule = self
            .namespaces
            .entry(name.into())
            .or_insert_with(|| NamespacePolicy::new(access));
        rule.access = access;
        rule
    }

    pub fn get_namespace(&self, name: &str) -> Option<&NamespacePolicy> {
        self.namespaces.get(name)
    }

    /// Namespace rules in sorted order.
    pub fn namespaces(&self) -> impl Iterator<Item = (&str, &NamespacePolicy)> {
        self.namespaces.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Per-namespace rule plus its explicit type rules.
#[derive(Debug)]
pub struct NamespacePolicy {
    access: AccessLevel,
    types: BTreeMap<String, TypePolicy>,
}

impl NamespacePolicy {
    pub fn new(access: AccessLevel) -> Self {
        Self {
            access,
            types: BTreeMap::new(),
        }
    }

    pub fn access(&self) -> AccessLevel {
        self.access
    }

    /// Insert or update a type rule. `access: None` inherits from this
    /// namespace.
    pub fn ty(&mut self, name: impl Into<String>, access: Option<AccessLevel>) -> &mut TypePolicy {
        let rule = self
            .types
            .entry(name.into())
            .or_insert_with(|| TypePolicy::new(access));
        rule.access = access;
        rule
    }

    pub fn get_type(&self, name: &str) -> Option<&TypePolicy> {
        self.types.get(name)
    }

    /// Type rules in sorted order.
    pub fn types(&self) -> impl Iterator<Item = (&str, &TypePolicy)> {
        self.types.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Per-type rule plus its explicit member rules.
///
/// Overloads share one rule: members are keyed by name only.
#[derive(Debug)]
pub struct TypePolicy {
    access: Option<AccessLevel>,
    members: BTreeMap<String, MemberPolicy>,
}

impl TypePolicy {
    pub fn new(access: Option<AccessLevel>) -> Self {
        Self {
            access,
            members: BTreeMap::new(),
        }
    }

    pub fn access(&self) -> Option<AccessLevel> {
        self.access
    }

    /// Insert or update a member rule. Rejects `Neutral` access.
    pub fn member(
        &mut self,
        name: impl Into<String>,
        access: AccessLevel,
    ) -> Result<&mut MemberPolicy> {
        match self.members.entry(name.into()) {
            Entry::Occupied(e) => {
                let rule = e.into_mut();
                rule.set_access(access)?;
                Ok(rule)
            }
            Entry::Vacant(e) => Ok(e.insert(MemberPolicy::new(access)?)),
        }
    }

    pub fn get_member(&self, name: &str) -> Option<&MemberPolicy> {
        self.members.get(name)
    }

    /// Member rules in sorted order.
    pub fn members(&self) -> impl Iterator<Item = (&str, &MemberPolicy)> {
        self.members.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Member-level rule: strict allow/deny plus optional call-site rewriters.
#[derive(Debug)]
pub struct MemberPolicy {
    access: AccessLevel,
    rewriters: OnceLock<Mutex<Vec<MemberRewriter>>>,
}

impl MemberPolicy {
    pub fn new(access: AccessLevel) -> Result<Self> {
        let mut rule = Self {
            access: AccessLevel::Denied,
            rewriters: OnceLock::new(),
        };
        rule.set_access(access)?;
        Ok(rule)
    }

    pub fn access(&self) -> AccessLevel {
        self.access
    }

    /// Member rules never carry `Neutral`; enforced on every assignment, not
    /// at read time.
    pub fn set_access(&mut self, access: AccessLevel) -> Result<()> {
        if access == AccessLevel::Neutral {
            return Err(OpcageError::Contract(
                "neutral access is not allowed at member level".into(),
            ));
        }
        self.access = access;
        Ok(())
    }

    /// Whether a rewriter list has been materialized.
    pub fn has_rewriters(&self) -> bool {
        self.rewriters.get().is_some()
    }

    /// Append a rewriter. Safe under concurrent first touch: every caller
    /// lands on the same list.
    pub fn add_rewriter(&self, rewriter: MemberRewriter) -> Result<&Self> {
        let list = self.rewriters.get_or_init(|| Mutex::new(Vec::new()));
        let mut list = list
            .lock()
            .map_err(|_| OpcageError::Contract("member rewriter list poisoned".into()))?;
        list.push(rewriter);
        Ok(self)
    }

    /// Snapshot of the attached rewriters in attachment order.
    pub fn rewriters(&self) -> Result<Vec<MemberRewriter>> {
        match self.rewriters.get() {
            None => Ok(Vec::new()),
            Some(list) => {
                let list = list
                    .lock()
                    .map_err(|_| OpcageError::Contract("member rewriter list poisoned".into()))?;
                Ok(list.clone())
            }
        }
    }
}
