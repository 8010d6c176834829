//! Access filter: classifies fully qualified symbols against the policy tree.
//!
//! Resolution rules:
//! - An unknown namespace is denied (default-deny).
//! - A type with no explicit rule is allowed only inside an `Allowed`
//!   namespace. An explicit `Neutral` type rule makes the type usable
//!   regardless of its namespace's access.
//! - An explicit member rule always wins; members without one follow the
//!   effective type access.
//!
//! Report tooling must call [`effective_type_access`] and
//! [`effective_member_access`] rather than re-deriving the rules, so printed
//! access can never drift from enforced access.

use crate::symbol::MemberKind;

use super::{AccessLevel, ApiPolicy};

/// Classification of one symbol lookup. Denials carry the level that caused
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterVerdict {
    Allowed,
    DeniedNamespace,
    DeniedType,
    DeniedMember,
}

/// Effective access of a type given its own rule and its namespace's access.
pub fn effective_type_access(
    type_access: Option<AccessLevel>,
    namespace_access: AccessLevel,
) -> AccessLevel {
    match type_access {
        None => {
            if namespace_access == AccessLevel::Allowed {
                AccessLevel::Allowed
            } else {
                AccessLevel::Denied
            }
        }
        // An explicit neutral entry is a deliberate override, not an
        // inherited default.
        Some(AccessLevel::Neutral) => AccessLevel::Allowed,
        Some(explicit) => explicit,
    }
}

/// Effective access of a member given its own rule and the effective access
/// of its declaring type.
pub fn effective_member_access(
    member_access: Option<AccessLevel>,
    effective_type: AccessLevel,
) -> AccessLevel {
    match member_access {
        Some(explicit) => explicit,
        None => {
            if effective_type == AccessLevel::Allowed {
                AccessLevel::Allowed
            } else {
                AccessLevel::Denied
            }
        }
    }
}

/// Read-only view over an [`ApiPolicy`] answering symbol queries.
///
/// Performs no mutation; any number of validations may share one filter.
pub struct AccessFilter<'a> {
    policy: &'a ApiPolicy,
}

impl<'a> AccessFilter<'a> {
    pub fn new(policy: &'a ApiPolicy) -> Self {
        Self { policy }
    }

    /// Classify a symbol. `member: None` means the reference is to the type
    /// itself (a cast, a type token, an array element type).
    pub fn filter(
        &self,
        namespace: &str,
        type_name: &str,
        member: Option<(&str, MemberKind)>,
    ) -> FilterVerdict {
        let Some(ns) = self.policy.get_namespace(namespace) else {
            return FilterVerdict::DeniedNamespace;
        };

        let type_rule = ns.get_type(type_name);
        let type_access = type_rule.and_then(|t| t.access());
        let effective = effective_type_access(type_access, ns.access());
        // Which level is to blame when the type is effectively denied.
        let denied_at = if type_access.is_some() {
            FilterVerdict::DeniedType
        } else {
            FilterVerdict::DeniedNamespace
        };

        let verdict = match member {
            None => {
                if effective == AccessLevel::Allowed {
                    FilterVerdict::Allowed
                } else {
                    denied_at
                }
            }
            Some((member_name, _)) => match type_rule.and_then(|t| t.get_member(member_name)) {
                Some(rule) => {
                    if rule.access() == AccessLevel::Allowed {
                        FilterVerdict::Allowed
                    } else {
                        FilterVerdict::DeniedMember
                    }
                }
                None => {
                    if effective == AccessLevel::Allowed {
                        FilterVerdict::Allowed
                    } else {
                        denied_at
                    }
                }
            },
        };

        tracing::trace!(namespace, type_name, ?member, ?verdict, "api filter");
        verdict
    }
}
