//! Call-site rewriters attachable to member rules.
//!
//! The set is closed on purpose: every transformation the pipeline can apply
//! is auditable here, and a policy document cannot smuggle in behavior the
//! host never reviewed.

use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::symbol::MethodRef;

/// One call-site transformation, applied by the rewriter pipeline after the
/// validator has approved the call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MemberRewriter {
    /// Check the call's length argument (top of stack) against the array
    /// budget before the call executes.
    ArrayLengthCheck,
    /// Poll the time budget right before the call.
    TimeCheckpoint,
    /// Replace the callee with a guarded equivalent.
    Substitute(MethodRef),
}

impl MemberRewriter {
    /// Short diagnostic name used by the policy report.
    pub fn short_name(&self) -> &'static str {
        match self {
            MemberRewriter::ArrayLengthCheck => "array-length-check",
            MemberRewriter::TimeCheckpoint => "time-checkpoint",
            MemberRewriter::Substitute(_) => "substitute",
        }
    }
}

// Deserialized by hand rather than via `#[derive(Deserialize)]`: serde_yaml's
// externally-tagged enum support requires a YAML `!tag` on map-shaped
// variants, which a plain `key: value` document never has. Dispatching on
// `deserialize_any` instead lets both the unit-variant strings and the
// `substitute: {...}` mapping parse the same way under YAML and JSON.
impl<'de> Deserialize<'de> for MemberRewriter {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct RewriterVisitor;

        impl<'de> Visitor<'de> for RewriterVisitor {
            type Value = MemberRewriter;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a rewriter name or a single-key `substitute` mapping")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                match v {
                    "array-length-check" => Ok(MemberRewriter::ArrayLengthCheck),
                    "time-checkpoint" => Ok(MemberRewriter::TimeCheckpoint),
                    other => Err(de::Error::unknown_variant(
                        other,
                        &["array-length-check", "time-checkpoint", "substitute"],
                    )),
                }
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let key: String = map
                    .next_key()?
                    .ok_or_else(|| de::Error::invalid_length(0, &"a single-entry map"))?;
                match key.as_str() {
                    "substitute" => {
                        let value: MethodRef = map.next_value()?;
                        Ok(MemberRewriter::Substitute(value))
                    }
                    other => Err(de::Error::unknown_variant(other, &["substitute"])),
                }
            }
        }

        deserializer.deserialize_any(RewriterVisitor)
    }
}
