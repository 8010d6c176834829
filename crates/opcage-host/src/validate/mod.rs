//! Instruction validator: classifies every external reference in a program
//! against the access filter.
//!
//! References that resolve inside the program under validation are not
//! policed, but their indices are bounds-checked so later stages can trust
//! the tables. A single violation aborts the pass; a program is never
//! partially validated.

use opcage_core::error::{OpcageError, Result};
use opcage_core::image::{CallTarget, FieldTarget, Instruction, MethodDef, Program};
use opcage_core::policy::{AccessFilter, FilterVerdict};
use opcage_core::symbol::{FieldRef, MemberKind, MethodRef, TypeRef};

pub struct Validator<'a> {
    filter: &'a AccessFilter<'a>,
}

impl<'a> Validator<'a> {
    pub fn new(filter: &'a AccessFilter<'a>) -> Self {
        Self { filter }
    }

    /// Validate every instruction of every method body, fail-closed.
    pub fn validate_program(&self, program: &Program) -> Result<()> {
        for method in &program.methods {
            for (pc, instr) in method.body.iter().enumerate() {
                self.validate_instruction(program, method, instr)
                    .map_err(|e| {
                        tracing::debug!(method = %method.name, pc, error = %e, "validation failed");
                        e
                    })?;
            }
        }
        Ok(())
    }

    fn validate_instruction(
        &self,
        program: &Program,
        method: &MethodDef,
        instr: &Instruction,
    ) -> Result<()> {
        match instr {
            Instruction::Jump(t) | Instruction::JumpIfZero(t) => {
                if *t as usize >= method.body.len() {
                    return Err(OpcageError::BadImage(format!(
                        "branch target {t} out of range in {}",
                        method.name
                    )));
                }
            }
            Instruction::Call(CallTarget::Internal(i)) => {
                if *i as usize >= program.methods.len() {
                    return Err(OpcageError::BadImage(format!(
                        "internal method index {i} out of range"
                    )));
                }
            }
            Instruction::Call(CallTarget::External(m)) => self.check_method(m)?,
            Instruction::LoadStatic(target) | Instruction::StoreStatic(target) => match target {
                FieldTarget::Internal(i) => {
                    if *i as usize >= program.statics.len() {
                        return Err(OpcageError::BadImage(format!(
                            "internal static index {i} out of range"
                        )));
                    }
                }
                FieldTarget::External(f) => self.check_field(f)?,
            },
            Instruction::NewArr(elem) => self.check_type(elem)?,
            // Checkpoints are inserted after validation; an image carrying
            // them could forge its own stack accounting.
            Instruction::GuardEnter(_)
            | Instruction::GuardExit(_)
            | Instruction::GuardTime
            | Instruction::GuardArray => {
                return Err(OpcageError::BadImage(format!(
                    "reserved guard opcode in {}",
                    method.name
                )));
            }
            _ => {}
        }
        Ok(())
    }

    /// Method reference: the value it hands back must itself be permitted,
    /// then the declaring type + name as a member.
    fn check_method(&self, m: &MethodRef) -> Result<()> {
        self.check_type(&m.returns)?;
        self.check_member(&m.declaring, &m.name, MemberKind::Method)
    }

    /// Field reference: the field's type first, then declaring type + name.
    fn check_field(&self, f: &FieldRef) -> Result<()> {
        self.check_type(&f.field_type)?;
        self.check_member(&f.declaring, &f.name, MemberKind::Field)
    }

    fn check_type(&self, t: &TypeRef) -> Result<()> {
        match self.filter.filter(&t.namespace, &t.name, None) {
            FilterVerdict::Allowed => Ok(()),
            FilterVerdict::DeniedNamespace => {
                Err(OpcageError::DeniedNamespace(t.namespace.clone()))
            }
            FilterVerdict::DeniedType => Err(OpcageError::DeniedType(t.full_name())),
            FilterVerdict::DeniedMember => Err(OpcageError::Contract(
                "member denial for a type-only reference".into(),
            )),
        }
    }

    fn check_member(&self, declaring: &TypeRef, name: &str, kind: MemberKind) -> Result<()> {
        match self
            .filter
            .filter(&declaring.namespace, &declaring.name, Some((name, kind)))
        {
            FilterVerdict::Allowed => Ok(()),
            FilterVerdict::DeniedNamespace => {
                Err(OpcageError::DeniedNamespace(declaring.namespace.clone()))
            }
            FilterVerdict::DeniedType => Err(OpcageError::DeniedType(declaring.full_name())),
            FilterVerdict::DeniedMember => Err(OpcageError::DeniedMember {
                symbol: format!("{}::{}", declaring.full_name(), name),
                kind,
            }),
        }
    }
}
