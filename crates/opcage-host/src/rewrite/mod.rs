//! Rewriter pipeline: guard checkpoint insertion plus policy-driven member
//! rewrites.
//!
//! Checkpoint placement:
//! - `GuardEnter(frame)` as the method prologue (stack charge + time poll),
//! - `GuardTime` in front of every backward branch,
//! - `GuardArray` in front of every `NewArr`,
//! - `GuardExit(frame)` in front of every `Ret`.
//!
//! Branch targets are remapped to the first instruction inserted in front of
//! their original target, so every path into a checkpointed instruction
//! still crosses the checkpoint, while the prologue is never re-entered by a
//! loop.

use opcage_core::error::{OpcageError, Result};
use opcage_core::image::{CallTarget, Instruction, MethodDef, Program};
use opcage_core::policy::{ApiPolicy, MemberRewriter};
use opcage_core::symbol::MethodRef;

/// Fixed per-frame cost charged at `GuardEnter`.
pub const FRAME_BASE_BYTES: u32 = 32;
/// Additional cost per parameter and per local slot.
pub const FRAME_SLOT_BYTES: u32 = 8;

/// Frame estimate for one method. Coarse by intent: the image format carries
/// no calling-convention detail, and the budget is a tripwire, not a ledger.
pub fn frame_estimate(method: &MethodDef) -> u32 {
    FRAME_BASE_BYTES + FRAME_SLOT_BYTES * (u32::from(method.params) + u32::from(method.locals))
}

/// Instrument a validated program. Refuses input that already carries guard
/// opcodes.
pub fn instrument(program: &Program, policy: &ApiPolicy) -> Result<Program> {
    let mut methods = Vec::with_capacity(program.methods.len());
    for method in &program.methods {
        methods.push(instrument_method(method, policy)?);
    }
    Ok(Program {
        name: program.name.clone(),
        statics: program.statics.clone(),
        methods,
    })
}

fn instrument_method(method: &MethodDef, policy: &ApiPolicy) -> Result<MethodDef> {
    let frame = frame_estimate(method);
    let mut body = Vec::with_capacity(method.body.len() * 2);
    let mut new_index = vec![0u32; method.body.len()];

    body.push(Instruction::GuardEnter(frame));

    for (idx, instr) in method.body.iter().enumerate() {
        if instr.is_guard() {
            return Err(OpcageError::BadImage(format!(
                "method {} already instrumented",
                method.name
            )));
        }
        // Pre-instruction checkpoints land at the remapped branch target.
        new_index[idx] = body.len() as u32;
        match instr {
            Instruction::NewArr(_) => {
                body.push(Instruction::GuardArray);
                body.push(instr.clone());
            }
            Instruction::Jump(t) | Instruction::JumpIfZero(t) if *t as usize <= idx => {
                body.push(Instruction::GuardTime);
                body.push(instr.clone());
            }
            Instruction::Ret => {
                body.push(Instruction::GuardExit(frame));
                body.push(Instruction::Ret);
            }
            Instruction::Call(CallTarget::External(m)) => {
                let mut callee = m.clone();
                for rewriter in member_rewriters(policy, m)? {
                    match rewriter {
                        MemberRewriter::ArrayLengthCheck => body.push(Instruction::GuardArray),
                        MemberRewriter::TimeCheckpoint => body.push(Instruction::GuardTime),
                        MemberRewriter::Substitute(with) => callee = with,
                    }
                }
                body.push(Instruction::Call(CallTarget::External(callee)));
            }
            other => body.push(other.clone()),
        }
    }

    // Remap branch targets; bounds were checked during validation.
    for instr in &mut body {
        if let Instruction::Jump(t) | Instruction::JumpIfZero(t) = instr {
            let old = *t as usize;
            let Some(mapped) = new_index.get(old) else {
                return Err(OpcageError::BadImage(format!(
                    "branch target {old} out of range in {}",
                    method.name
                )));
            };
            *t = *mapped;
        }
    }

    tracing::debug!(
        method = %method.name,
        frame,
        before = method.body.len(),
        after = body.len(),
        "instrumented"
    );

    Ok(MethodDef {
        name: method.name.clone(),
        params: method.params,
        locals: method.locals,
        body,
    })
}

/// Rewriters attached to the policy rule for this member, if any.
fn member_rewriters(policy: &ApiPolicy, m: &MethodRef) -> Result<Vec<MemberRewriter>> {
    let Some(ns) = policy.get_namespace(&m.declaring.namespace) else {
        return Ok(Vec::new());
    };
    let Some(ty) = ns.get_type(&m.declaring.name) else {
        return Ok(Vec::new());
    };
    let Some(rule) = ty.get_member(&m.name) else {
        return Ok(Vec::new());
    };
    rule.rewriters()
}
