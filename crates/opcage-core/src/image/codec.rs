//! Binary image codec (panic-free).
//!
//! Layout: version byte, then length-prefixed sections; strings are
//! u16-length UTF-8, multi-byte integers little-endian.
//!
//! Parsing rules:
//! - Never index the buffer; always use `Buf` and `remaining()` checks.
//! - Never `unwrap()` / `expect()` / `panic!()` on malformed input.
//!
//! Guard opcodes are encodable (instrumented programs can be dumped for
//! inspection) but never decodable: a program that arrives pre-instrumented
//! could forge its own stack accounting, so it is refused at the door.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{OpcageError, Result};
use crate::symbol::{FieldRef, MethodRef, TypeRef};

use super::{CallTarget, FieldTarget, Instruction, MethodDef, Program, StaticDef};

/// Image format version.
pub const IMAGE_VERSION: u8 = 1;

mod op {
    pub const PUSH_INT: u8 = 0x01;
    pub const POP: u8 = 0x02;
    pub const DUP: u8 = 0x03;
    pub const ADD: u8 = 0x10;
    pub const SUB: u8 = 0x11;
    pub const MUL: u8 = 0x12;
    pub const CMP_LT: u8 = 0x13;
    pub const LOAD_LOCAL: u8 = 0x20;
    pub const STORE_LOCAL: u8 = 0x21;
    pub const LOAD_ARG: u8 = 0x22;
    pub const JUMP: u8 = 0x30;
    pub const JUMP_IF_ZERO: u8 = 0x31;
    pub const CALL: u8 = 0x40;
    pub const RET: u8 = 0x41;
    pub const NEW_ARR: u8 = 0x50;
    pub const LOAD_ELEM: u8 = 0x51;
    pub const STORE_ELEM: u8 = 0x52;
    pub const ARRAY_LEN: u8 = 0x53;
    pub const LOAD_STATIC: u8 = 0x60;
    pub const STORE_STATIC: u8 = 0x61;
    pub const GUARD_ENTER: u8 = 0xF0;
    pub const GUARD_EXIT: u8 = 0xF1;
    pub const GUARD_TIME: u8 = 0xF2;
    pub const GUARD_ARRAY: u8 = 0xF3;
}

const TARGET_INTERNAL: u8 = 0;
const TARGET_EXTERNAL: u8 = 1;

fn bad(msg: impl Into<String>) -> OpcageError {
    OpcageError::BadImage(msg.into())
}

fn need(buf: &Bytes, n: usize, what: &str) -> Result<()> {
    if buf.remaining() < n {
        return Err(bad(format!("truncated image: expected {what}")));
    }
    Ok(())
}

fn get_string(buf: &mut Bytes) -> Result<String> {
    need(buf, 2, "string length")?;
    let len = buf.get_u16_le() as usize;
    need(buf, len, "string bytes")?;
    let raw = buf.copy_to_bytes(len);
    String::from_utf8(raw.to_vec()).map_err(|_| bad("string is not valid utf-8"))
}

fn put_string(buf: &mut BytesMut, s: &str) -> Result<()> {
    let len: u16 = s
        .len()
        .try_into()
        .map_err(|_| bad(format!("string too long: {} bytes", s.len())))?;
    buf.put_u16_le(len);
    buf.put_slice(s.as_bytes());
    Ok(())
}

fn get_type_ref(buf: &mut Bytes) -> Result<TypeRef> {
    let namespace = get_string(buf)?;
    let name = get_string(buf)?;
    Ok(TypeRef { namespace, name })
}

fn put_type_ref(buf: &mut BytesMut, t: &TypeRef) -> Result<()> {
    put_string(buf, &t.namespace)?;
    put_string(buf, &t.name)
}

fn get_method_ref(buf: &mut Bytes) -> Result<MethodRef> {
    let declaring = get_type_ref(buf)?;
    let name = get_string(buf)?;
    need(buf, 2, "method param count")?;
    let params = buf.get_u16_le();
    let returns = get_type_ref(buf)?;
    Ok(MethodRef {
        declaring,
        name,
        params,
        returns,
    })
}

fn put_method_ref(buf: &mut BytesMut, m: &MethodRef) -> Result<()> {
    put_type_ref(buf, &m.declaring)?;
    put_string(buf, &m.name)?;
    buf.put_u16_le(m.params);
    put_type_ref(buf, &m.returns)
}

fn get_field_ref(buf: &mut Bytes) -> Result<FieldRef> {
    let declaring = get_type_ref(buf)?;
    let name = get_string(buf)?;
    let field_type = get_type_ref(buf)?;
    Ok(FieldRef {
        declaring,
        name,
        field_type,
    })
}

fn put_field_ref(buf: &mut BytesMut, f: &FieldRef) -> Result<()> {
    put_type_ref(buf, &f.declaring)?;
    put_string(buf, &f.name)?;
    put_type_ref(buf, &f.field_type)
}

/// Encode a program image.
pub fn encode_program(program: &Program) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    buf.put_u8(IMAGE_VERSION);
    put_string(&mut buf, &program.name)?;

    let n_statics: u16 = program
        .statics
        .len()
        .try_into()
        .map_err(|_| bad("too many statics"))?;
    buf.put_u16_le(n_statics);
    for s in &program.statics {
        put_string(&mut buf, &s.name)?;
        buf.put_i64_le(s.init);
    }

    let n_methods: u16 = program
        .methods
        .len()
        .try_into()
        .map_err(|_| bad("too many methods"))?;
    buf.put_u16_le(n_methods);
    for m in &program.methods {
        put_string(&mut buf, &m.name)?;
        buf.put_u16_le(m.params);
        buf.put_u16_le(m.locals);
        let n_instr: u32 = m
            .body
            .len()
            .try_into()
            .map_err(|_| bad("method body too long"))?;
        buf.put_u32_le(n_instr);
        for instr in &m.body {
            put_instruction(&mut buf, instr)?;
        }
    }

    Ok(buf.freeze())
}

/// Decode a program image from bytes.
pub fn decode_program(mut buf: Bytes) -> Result<Program> {
    need(&buf, 1, "version")?;
    let version = buf.get_u8();
    if version != IMAGE_VERSION {
        return Err(bad(format!("unsupported image version {version}")));
    }

    let name = get_string(&mut buf)?;

    need(&buf, 2, "static count")?;
    let n_statics = buf.get_u16_le() as usize;
    // Each static is at least 10 bytes; bounds the allocation below.
    need(&buf, n_statics.saturating_mul(10), "static table")?;
    let mut statics = Vec::with_capacity(n_statics);
    for _ in 0..n_statics {
        let name = get_string(&mut buf)?;
        need(&buf, 8, "static initializer")?;
        statics.push(StaticDef {
            name,
            init: buf.get_i64_le(),
        });
    }

    need(&buf, 2, "method count")?;
    let n_methods = buf.get_u16_le() as usize;
    let mut methods = Vec::with_capacity(n_methods.min(1024));
    for _ in 0..n_methods {
        let name = get_string(&mut buf)?;
        need(&buf, 8, "method header")?;
        let params = buf.get_u16_le();
        let locals = buf.get_u16_le();
        let n_instr = buf.get_u32_le() as usize;
        // Every instruction is at least one byte.
        need(&buf, n_instr, "method body")?;
        let mut body = Vec::with_capacity(n_instr);
        for _ in 0..n_instr {
            body.push(get_instruction(&mut buf)?);
        }
        methods.push(MethodDef {
            name,
            params,
            locals,
            body,
        });
    }

    if buf.has_remaining() {
        return Err(bad("trailing bytes after image"));
    }

    Ok(Program {
        name,
        statics,
        methods,
    })
}

fn put_instruction(buf: &mut BytesMut, instr: &Instruction) -> Result<()> {
    match instr {
        Instruction::PushInt(v) => {
            buf.put_u8(op::PUSH_INT);
            buf.put_i64_le(*v);
        }
        Instruction::Pop => buf.put_u8(op::POP),
        Instruction::Dup => buf.put_u8(op::DUP),
        Instruction::Add => buf.put_u8(op::ADD),
        Instruction::Sub => buf.put_u8(op::SUB),
        Instruction::Mul => buf.put_u8(op::MUL),
        Instruction::CmpLt => buf.put_u8(op::CMP_LT),
        Instruction::LoadLocal(i) => {
            buf.put_u8(op::LOAD_LOCAL);
            buf.put_u16_le(*i);
        }
        Instruction::StoreLocal(i) => {
            buf.put_u8(op::STORE_LOCAL);
            buf.put_u16_le(*i);
        }
        Instruction::LoadArg(i) => {
            buf.put_u8(op::LOAD_ARG);
            buf.put_u16_le(*i);
        }
        Instruction::Jump(t) => {
            buf.put_u8(op::JUMP);
            buf.put_u32_le(*t);
        }
        Instruction::JumpIfZero(t) => {
            buf.put_u8(op::JUMP_IF_ZERO);
            buf.put_u32_le(*t);
        }
        Instruction::Call(CallTarget::Internal(i)) => {
            buf.put_u8(op::CALL);
            buf.put_u8(TARGET_INTERNAL);
            buf.put_u16_le(*i);
        }
        Instruction::Call(CallTarget::External(m)) => {
            buf.put_u8(op::CALL);
            buf.put_u8(TARGET_EXTERNAL);
            put_method_ref(buf, m)?;
        }
        Instruction::Ret => buf.put_u8(op::RET),
        Instruction::NewArr(t) => {
            buf.put_u8(op::NEW_ARR);
            put_type_ref(buf, t)?;
        }
        Instruction::LoadElem => buf.put_u8(op::LOAD_ELEM),
        Instruction::StoreElem => buf.put_u8(op::STORE_ELEM),
        Instruction::ArrayLen => buf.put_u8(op::ARRAY_LEN),
        Instruction::LoadStatic(FieldTarget::Internal(i)) => {
            buf.put_u8(op::LOAD_STATIC);
            buf.put_u8(TARGET_INTERNAL);
            buf.put_u16_le(*i);
        }
        Instruction::LoadStatic(FieldTarget::External(f)) => {
            buf.put_u8(op::LOAD_STATIC);
            buf.put_u8(TARGET_EXTERNAL);
            put_field_ref(buf, f)?;
        }
        Instruction::StoreStatic(FieldTarget::Internal(i)) => {
            buf.put_u8(op::STORE_STATIC);
            buf.put_u8(TARGET_INTERNAL);
            buf.put_u16_le(*i);
        }
        Instruction::StoreStatic(FieldTarget::External(f)) => {
            buf.put_u8(op::STORE_STATIC);
            buf.put_u8(TARGET_EXTERNAL);
            put_field_ref(buf, f)?;
        }
        Instruction::GuardEnter(b) => {
            buf.put_u8(op::GUARD_ENTER);
            buf.put_u32_le(*b);
        }
        Instruction::GuardExit(b) => {
            buf.put_u8(op::GUARD_EXIT);
            buf.put_u32_le(*b);
        }
        Instruction::GuardTime => buf.put_u8(op::GUARD_TIME),
        Instruction::GuardArray => buf.put_u8(op::GUARD_ARRAY),
    }
    Ok(())
}

fn get_call_target(buf: &mut Bytes) -> Result<CallTarget> {
    need(buf, 1, "call target kind")?;
    match buf.get_u8() {
        TARGET_INTERNAL => {
            need(buf, 2, "internal method index")?;
            Ok(CallTarget::Internal(buf.get_u16_le()))
        }
        TARGET_EXTERNAL => Ok(CallTarget::External(get_method_ref(buf)?)),
        other => Err(bad(format!("unknown call target kind {other}"))),
    }
}

fn get_field_target(buf: &mut Bytes) -> Result<FieldTarget> {
    need(buf, 1, "field target kind")?;
    match buf.get_u8() {
        TARGET_INTERNAL => {
            need(buf, 2, "internal static index")?;
            Ok(FieldTarget::Internal(buf.get_u16_le()))
        }
        TARGET_EXTERNAL => Ok(FieldTarget::External(get_field_ref(buf)?)),
        other => Err(bad(format!("unknown field target kind {other}"))),
    }
}

fn get_instruction(buf: &mut Bytes) -> Result<Instruction> {
    need(buf, 1, "opcode")?;
    let tag = buf.get_u8();
    let instr = match tag {
        op::PUSH_INT => {
            need(buf, 8, "push operand")?;
            Instruction::PushInt(buf.get_i64_le())
        }
        op::POP => Instruction::Pop,
        op::DUP => Instruction::Dup,
        op::ADD => Instruction::Add,
        op::SUB => Instruction::Sub,
        op::MUL => Instruction::Mul,
        op::CMP_LT => Instruction::CmpLt,
        op::LOAD_LOCAL => {
            need(buf, 2, "local index")?;
            Instruction::LoadLocal(buf.get_u16_le())
        }
        op::STORE_LOCAL => {
            need(buf, 2, "local index")?;
            Instruction::StoreLocal(buf.get_u16_le())
        }
        op::LOAD_ARG => {
            need(buf, 2, "argument index")?;
            Instruction::LoadArg(buf.get_u16_le())
        }
        op::JUMP => {
            need(buf, 4, "branch target")?;
            Instruction::Jump(buf.get_u32_le())
        }
        op::JUMP_IF_ZERO => {
            need(buf, 4, "branch target")?;
            Instruction::JumpIfZero(buf.get_u32_le())
        }
        op::CALL => Instruction::Call(get_call_target(buf)?),
        op::RET => Instruction::Ret,
        op::NEW_ARR => Instruction::NewArr(get_type_ref(buf)?),
        op::LOAD_ELEM => Instruction::LoadElem,
        op::STORE_ELEM => Instruction::StoreElem,
        op::ARRAY_LEN => Instruction::ArrayLen,
        op::LOAD_STATIC => Instruction::LoadStatic(get_field_target(buf)?),
        op::STORE_STATIC => Instruction::StoreStatic(get_field_target(buf)?),
        op::GUARD_ENTER | op::GUARD_EXIT | op::GUARD_TIME | op::GUARD_ARRAY => {
            return Err(bad("reserved guard opcode in image"))
        }
        other => return Err(bad(format!("unknown opcode 0x{other:02x}"))),
    };
    Ok(instr)
}
