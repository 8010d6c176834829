//! External-reference classification by the instruction validator.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use opcage_core::error::OpcageError;
use opcage_core::image::{CallTarget, FieldTarget, Instruction, MethodDef, Program, StaticDef};
use opcage_core::policy::{AccessFilter, AccessLevel, ApiPolicy};
use opcage_core::symbol::{FieldRef, MemberKind, MethodRef, TypeRef};
use opcage_host::validate::Validator;

fn program_with_body(body: Vec<Instruction>) -> Program {
    Program {
        name: "p".into(),
        statics: vec![StaticDef {
            name: "s".into(),
            init: 0,
        }],
        methods: vec![MethodDef {
            name: "main".into(),
            params: 0,
            locals: 0,
            body,
        }],
    }
}

fn lang_allowed() -> ApiPolicy {
    let mut policy = ApiPolicy::deny_all();
    policy.namespace("lang", AccessLevel::Allowed);
    policy
}

fn checked_add() -> MethodRef {
    MethodRef::new(TypeRef::new("sys.math", "Checked"), "add", 2, TypeRef::int())
}

fn validate(policy: &ApiPolicy, program: &Program) -> opcage_core::Result<()> {
    let filter = AccessFilter::new(policy);
    Validator::new(&filter).validate_program(program)
}

#[test]
fn internal_only_program_passes_under_deny_all() {
    let policy = ApiPolicy::deny_all();
    let program = program_with_body(vec![
        Instruction::PushInt(1),
        Instruction::Call(CallTarget::Internal(0)),
        Instruction::LoadStatic(FieldTarget::Internal(0)),
        Instruction::Ret,
    ]);
    validate(&policy, &program).unwrap();
}

#[test]
fn allowed_external_call_passes() {
    let mut policy = lang_allowed();
    policy.namespace("sys.math", AccessLevel::Allowed);
    let program = program_with_body(vec![
        Instruction::PushInt(1),
        Instruction::PushInt(2),
        Instruction::Call(CallTarget::External(checked_add())),
        Instruction::Ret,
    ]);
    validate(&policy, &program).unwrap();
}

#[test]
fn denied_member_reports_exact_symbol() {
    let mut policy = lang_allowed();
    {
        let ns = policy.namespace("sys.math", AccessLevel::Allowed);
        let ty = ns.ty("Checked", None);
        ty.member("add", AccessLevel::Denied).unwrap();
    }
    let program = program_with_body(vec![
        Instruction::Call(CallTarget::External(checked_add())),
        Instruction::Ret,
    ]);

    let err = validate(&policy, &program).expect_err("must fail");
    assert_eq!(err.kind().as_str(), "POLICY_VIOLATION");
    assert_eq!(
        err.to_string(),
        "method sys.math.Checked::add is not allowed"
    );
}

#[test]
fn denied_return_type_fails_an_otherwise_allowed_member() {
    let mut policy = ApiPolicy::deny_all();
    policy.namespace("sys.math", AccessLevel::Allowed);
    let open_log = MethodRef::new(
        TypeRef::new("sys.math", "Checked"),
        "open_log",
        0,
        TypeRef::new("sys.io", "Handle"),
    );
    let program = program_with_body(vec![
        Instruction::Call(CallTarget::External(open_log)),
        Instruction::Ret,
    ]);

    let err = validate(&policy, &program).expect_err("must fail");
    assert_eq!(err.kind().as_str(), "POLICY_VIOLATION");
    assert_eq!(err.to_string(), "namespace sys.io is not allowed");
}

#[test]
fn field_reference_reports_field_kind() {
    let mut policy = lang_allowed();
    {
        let ns = policy.namespace("sys.env", AccessLevel::Allowed);
        let ty = ns.ty("Vars", None);
        ty.member("secret", AccessLevel::Denied).unwrap();
    }
    let field = FieldRef::new(TypeRef::new("sys.env", "Vars"), "secret", TypeRef::int());
    let program = program_with_body(vec![
        Instruction::LoadStatic(FieldTarget::External(field)),
        Instruction::Ret,
    ]);

    let err = validate(&policy, &program).expect_err("must fail");
    assert_eq!(err.to_string(), "field sys.env.Vars::secret is not allowed");
    match err {
        OpcageError::DeniedMember { kind, .. } => assert_eq!(kind, MemberKind::Field),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn array_element_type_is_a_bare_type_reference() {
    // Even the built-in element type needs a whitelisted namespace.
    let policy = ApiPolicy::deny_all();
    let program = program_with_body(vec![
        Instruction::PushInt(4),
        Instruction::NewArr(TypeRef::int()),
        Instruction::Ret,
    ]);

    let err = validate(&policy, &program).expect_err("must fail");
    assert_eq!(err.to_string(), "namespace lang is not allowed");
}

#[test]
fn guard_opcodes_in_input_are_rejected() {
    let policy = lang_allowed();
    let program = program_with_body(vec![Instruction::GuardExit(1024), Instruction::Ret]);

    let err = validate(&policy, &program).expect_err("must fail");
    assert_eq!(err.kind().as_str(), "BAD_INPUT");
}

#[test]
fn out_of_range_branch_target_is_rejected() {
    let policy = ApiPolicy::deny_all();
    let program = program_with_body(vec![Instruction::Jump(9), Instruction::Ret]);

    let err = validate(&policy, &program).expect_err("must fail");
    assert_eq!(err.kind().as_str(), "BAD_INPUT");
}

#[test]
fn out_of_range_internal_indices_are_rejected() {
    let policy = ApiPolicy::deny_all();

    let program = program_with_body(vec![
        Instruction::Call(CallTarget::Internal(3)),
        Instruction::Ret,
    ]);
    let err = validate(&policy, &program).expect_err("must fail");
    assert_eq!(err.kind().as_str(), "BAD_INPUT");

    let program = program_with_body(vec![
        Instruction::StoreStatic(FieldTarget::Internal(5)),
        Instruction::Ret,
    ]);
    let err = validate(&policy, &program).expect_err("must fail");
    assert_eq!(err.kind().as_str(), "BAD_INPUT");
}
