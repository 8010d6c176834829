//! Resolved-policy report.
//!
//! Prints, for every rule in the tree, the access enforcement will actually
//! apply. Uses the filter's own effective-access functions, so the printed
//! report can never drift from enforced behavior.

use std::io::Write;

use opcage_core::error::{OpcageError, Result};
use opcage_core::policy::{
    effective_member_access, effective_type_access, AccessLevel, ApiPolicy,
};

fn access_name(access: AccessLevel) -> &'static str {
    match access {
        AccessLevel::Denied => "Denied",
        AccessLevel::Neutral => "Neutral",
        AccessLevel::Allowed => "Allowed",
    }
}

fn line<W: Write>(out: &mut W, text: &str) -> Result<()> {
    writeln!(out, "{text}").map_err(|e| OpcageError::Internal(format!("write report failed: {e}")))
}

/// Write the resolved report. Denied branches are pruned: a denied namespace
/// prints bare, a denied type prints without members.
pub fn write_policy_report<W: Write>(policy: &ApiPolicy, out: &mut W) -> Result<()> {
    for (ns_name, ns) in policy.namespaces() {
        line(out, ns_name)?;
        if ns.access() == AccessLevel::Denied {
            continue;
        }
        for (ty_name, ty) in ns.types() {
            let effective = effective_type_access(ty.access(), ns.access());
            line(out, &format!("  {ty_name}: {}", access_name(effective)))?;
            if effective == AccessLevel::Denied {
                continue;
            }
            for (m_name, rule) in ty.members() {
                let access = effective_member_access(Some(rule.access()), effective);
                let mut text = format!("     {m_name}: {}", access_name(access));
                if rule.has_rewriters() {
                    let rewriters = rule.rewriters()?;
                    let names: Vec<&str> = rewriters.iter().map(|r| r.short_name()).collect();
                    text.push_str(&format!(" ({})", names.join(", ")));
                }
                line(out, &text)?;
            }
        }
    }
    Ok(())
}
