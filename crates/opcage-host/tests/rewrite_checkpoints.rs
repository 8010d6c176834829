//! Checkpoint placement and branch remapping by the rewriter pipeline.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use opcage_core::image::{CallTarget, Instruction, MethodDef, Program};
use opcage_core::policy::{AccessLevel, ApiPolicy, MemberRewriter};
use opcage_core::symbol::{MethodRef, TypeRef};
use opcage_host::rewrite::{frame_estimate, instrument, FRAME_BASE_BYTES, FRAME_SLOT_BYTES};

fn single_method(params: u16, locals: u16, body: Vec<Instruction>) -> Program {
    Program {
        name: "p".into(),
        statics: vec![],
        methods: vec![MethodDef {
            name: "main".into(),
            params,
            locals,
            body,
        }],
    }
}

#[test]
fn frame_estimate_counts_params_and_locals() {
    let method = MethodDef {
        name: "f".into(),
        params: 2,
        locals: 3,
        body: vec![Instruction::Ret],
    };
    assert_eq!(frame_estimate(&method), FRAME_BASE_BYTES + 5 * FRAME_SLOT_BYTES);
}

#[test]
fn prologue_and_ret_are_checkpointed() {
    let program = single_method(0, 0, vec![Instruction::PushInt(1), Instruction::Ret]);
    let guarded = instrument(&program, &ApiPolicy::deny_all()).unwrap();

    let expected = vec![
        Instruction::GuardEnter(FRAME_BASE_BYTES),
        Instruction::PushInt(1),
        Instruction::GuardExit(FRAME_BASE_BYTES),
        Instruction::Ret,
    ];
    assert_eq!(&guarded.methods[0].body, &expected);
}

#[test]
fn back_edge_gets_a_time_checkpoint() {
    let program = single_method(
        0,
        0,
        vec![
            Instruction::PushInt(1),
            Instruction::JumpIfZero(0),
            Instruction::Ret,
        ],
    );
    let guarded = instrument(&program, &ApiPolicy::deny_all()).unwrap();

    let expected = vec![
        Instruction::GuardEnter(FRAME_BASE_BYTES),
        Instruction::PushInt(1),
        Instruction::GuardTime,
        // Remapped past the prologue: a loop never re-enters GuardEnter.
        Instruction::JumpIfZero(1),
        Instruction::GuardExit(FRAME_BASE_BYTES),
        Instruction::Ret,
    ];
    assert_eq!(&guarded.methods[0].body, &expected);
}

#[test]
fn forward_branch_is_not_a_back_edge() {
    let program = single_method(
        0,
        0,
        vec![
            Instruction::PushInt(0),
            Instruction::JumpIfZero(3),
            Instruction::PushInt(1),
            Instruction::Ret,
        ],
    );
    let guarded = instrument(&program, &ApiPolicy::deny_all()).unwrap();

    let body = &guarded.methods[0].body;
    assert!(!body.contains(&Instruction::GuardTime));
    let expected = vec![
        Instruction::GuardEnter(FRAME_BASE_BYTES),
        Instruction::PushInt(0),
        Instruction::JumpIfZero(4),
        Instruction::PushInt(1),
        Instruction::GuardExit(FRAME_BASE_BYTES),
        Instruction::Ret,
    ];
    assert_eq!(body, &expected);
}

#[test]
fn array_allocation_is_checkpointed() {
    let program = single_method(
        0,
        0,
        vec![
            Instruction::PushInt(10),
            Instruction::NewArr(TypeRef::int()),
            Instruction::Ret,
        ],
    );
    let guarded = instrument(&program, &ApiPolicy::deny_all()).unwrap();

    let expected = vec![
        Instruction::GuardEnter(FRAME_BASE_BYTES),
        Instruction::PushInt(10),
        Instruction::GuardArray,
        Instruction::NewArr(TypeRef::int()),
        Instruction::GuardExit(FRAME_BASE_BYTES),
        Instruction::Ret,
    ];
    assert_eq!(&guarded.methods[0].body, &expected);
}

#[test]
fn member_rewriters_apply_in_attachment_order() {
    let callee = MethodRef::new(TypeRef::new("sys.mem", "Buf"), "alloc", 1, TypeRef::int());
    let safe = MethodRef::new(
        TypeRef::new("sys.mem", "Buf"),
        "alloc_checked",
        1,
        TypeRef::int(),
    );

    let mut policy = ApiPolicy::deny_all();
    {
        let ns = policy.namespace("sys.mem", AccessLevel::Allowed);
        let rule = ns
            .ty("Buf", None)
            .member("alloc", AccessLevel::Allowed)
            .unwrap();
        rule.add_rewriter(MemberRewriter::ArrayLengthCheck).unwrap();
        rule.add_rewriter(MemberRewriter::TimeCheckpoint).unwrap();
        rule.add_rewriter(MemberRewriter::Substitute(safe.clone()))
            .unwrap();
    }

    let program = single_method(
        0,
        0,
        vec![
            Instruction::PushInt(8),
            Instruction::Call(CallTarget::External(callee)),
            Instruction::Ret,
        ],
    );
    let guarded = instrument(&program, &policy).unwrap();

    let expected = vec![
        Instruction::GuardEnter(FRAME_BASE_BYTES),
        Instruction::PushInt(8),
        Instruction::GuardArray,
        Instruction::GuardTime,
        Instruction::Call(CallTarget::External(safe)),
        Instruction::GuardExit(FRAME_BASE_BYTES),
        Instruction::Ret,
    ];
    assert_eq!(&guarded.methods[0].body, &expected);
}

#[test]
fn pre_instrumented_input_is_refused() {
    let program = single_method(0, 0, vec![Instruction::GuardTime, Instruction::Ret]);
    let err = instrument(&program, &ApiPolicy::deny_all()).expect_err("must fail");
    assert_eq!(err.kind().as_str(), "BAD_INPUT");
}
