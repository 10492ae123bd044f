//! CIL instruction representation used by the inspector and the body rewriter.
//!
//! Instructions are tagged values: an [`OpCode`], a typed [`Operand`] and the set of
//! [`Label`]s that resolve to the instruction. Branch operands and exception-handler
//! boundaries refer to labels instead of byte offsets, so instruction sequences can be
//! spliced and padded without recomputing any offsets by hand. Offsets only reappear
//! when [`crate::assembly::encoder`] lays the sequence out again.
//!
//! # Key Components
//!
//! - [`Instruction`] - A single decoded instruction with its labels
//! - [`Operand`] / [`Immediate`] - Typed operands
//! - [`StringRef`] / [`MethodRef`] - Resolved `ldstr` and call operands
//! - [`StackBehavior`] - Stack effect of the instructions the rewriter emits

use std::fmt;

use crate::{
    assembly::opcodes::{self, lookup},
    metadata::token::Token,
};

/// Encoding of an instruction operand (ECMA-335 III.1.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandType {
    /// No operand present
    None,
    /// Signed 8-bit integer (`ldc.i4.s`, `unaligned.`, `no.`)
    ShortInt,
    /// Signed 32-bit integer
    Int32,
    /// Signed 64-bit integer
    Int64,
    /// 32-bit floating point
    Float32,
    /// 64-bit floating point
    Float64,
    /// Unsigned 8-bit argument or local index
    ShortVar,
    /// Unsigned 16-bit argument or local index
    Var,
    /// Signed 8-bit branch displacement
    ShortBranchTarget,
    /// Signed 32-bit branch displacement
    BranchTarget,
    /// Jump table of 32-bit displacements
    Switch,
    /// `#US` heap token
    String,
    /// `MethodDef`, `MemberRef` or `MethodSpec` token
    Method,
    /// Field token
    Field,
    /// Type token
    Type,
    /// Any metadata token (`ldtoken`)
    Token,
    /// `StandAloneSig` token (`calli`)
    Signature,
}

impl OperandType {
    /// Size in bytes of the encoded operand, `None` for the variable-size switch table
    #[must_use]
    pub const fn size(&self) -> Option<usize> {
        match self {
            OperandType::None => Some(0),
            OperandType::ShortInt | OperandType::ShortVar | OperandType::ShortBranchTarget => {
                Some(1)
            }
            OperandType::Var => Some(2),
            OperandType::Int32
            | OperandType::Float32
            | OperandType::BranchTarget
            | OperandType::String
            | OperandType::Method
            | OperandType::Field
            | OperandType::Type
            | OperandType::Token
            | OperandType::Signature => Some(4),
            OperandType::Int64 | OperandType::Float64 => Some(8),
            OperandType::Switch => None,
        }
    }
}

/// An opcode, either single-byte or `0xFE`-prefixed.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpCode {
    /// `0` for single-byte opcodes, `0xFE` for two-byte opcodes
    pub prefix: u8,
    /// The opcode byte (second byte for two-byte opcodes)
    pub code: u8,
}

impl OpCode {
    /// A single-byte opcode
    #[must_use]
    pub const fn single(code: u8) -> Self {
        OpCode { prefix: 0, code }
    }

    /// A two-byte opcode with the `0xFE` prefix
    #[must_use]
    pub const fn extended(code: u8) -> Self {
        OpCode {
            prefix: opcodes::FE_PREFIX,
            code,
        }
    }

    /// Mnemonic of the opcode, `"??"` for unassigned byte values
    #[must_use]
    pub fn mnemonic(&self) -> &'static str {
        lookup(self.prefix, self.code).map_or("??", |(name, _)| name)
    }

    /// Operand encoding, `None` for unassigned byte values
    #[must_use]
    pub fn operand_type(&self) -> Option<OperandType> {
        lookup(self.prefix, self.code).map(|(_, operand)| operand)
    }

    /// Number of bytes the opcode itself occupies
    #[must_use]
    pub fn size(&self) -> usize {
        if self.prefix == 0 {
            1
        } else {
            2
        }
    }

    /// True for `call` and `callvirt`
    #[must_use]
    pub fn is_call(&self) -> bool {
        self.prefix == 0 && matches!(self.code, opcodes::CALL | opcodes::CALLVIRT)
    }

    /// True for the short-displacement branch forms (`br.s` .. `blt.un.s`, `leave.s`)
    #[must_use]
    pub fn is_short_branch(&self) -> bool {
        self.prefix == 0
            && ((opcodes::BR_S..=opcodes::BLT_UN_S).contains(&self.code)
                || self.code == opcodes::LEAVE_S)
    }

    /// The long-displacement form of a short branch; every other opcode maps to itself.
    #[must_use]
    pub fn long_form(&self) -> OpCode {
        if !self.is_short_branch() {
            return *self;
        }

        if self.code == opcodes::LEAVE_S {
            OpCode::single(opcodes::LEAVE)
        } else {
            OpCode::single(self.code + opcodes::SHORT_TO_LONG_BRANCH)
        }
    }
}

impl fmt::Debug for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mnemonic())
    }
}

/// Immediate value embedded in an instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Immediate {
    /// Signed 8-bit value
    Int8(i8),
    /// Unsigned 8-bit index
    UInt8(u8),
    /// Unsigned 16-bit index
    UInt16(u16),
    /// Signed 32-bit value
    Int32(i32),
    /// Signed 64-bit value
    Int64(i64),
    /// 32-bit float
    Float32(f32),
    /// 64-bit float
    Float64(f64),
}

/// A symbolic position inside a method body.
///
/// Labels are unique within one body. They are attached to the instruction they resolve
/// to, or listed as end labels of the body when they point one past the last instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IL_L{}", self.0)
    }
}

/// A resolved `ldstr` operand
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringRef {
    /// The `#US` token as encoded in the body
    pub token: Token,
    /// The literal text
    pub value: String,
}

/// A resolved call target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodRef {
    /// The method token as encoded in the body
    pub token: Token,
    /// Declaring type, simple or namespace-qualified (e.g. `UnityEngine.Debug`)
    pub declaring_type: String,
    /// Method name
    pub name: String,
    /// Number of declared parameters, excluding `this`
    pub param_count: u16,
    /// True for instance methods
    pub has_this: bool,
    /// True if the method returns a value
    pub returns_value: bool,
}

impl MethodRef {
    /// Creates a reference to a static `void` method
    pub fn new_static(
        token: Token,
        declaring_type: impl Into<String>,
        name: impl Into<String>,
        param_count: u16,
    ) -> Self {
        MethodRef {
            token,
            declaring_type: declaring_type.into(),
            name: name.into(),
            param_count,
            has_this: false,
            returns_value: false,
        }
    }

    /// True if this reference names `type_name.method_name`.
    ///
    /// `type_name` matches either the declaring type exactly or its simple name, so
    /// `Debug` matches `UnityEngine.Debug`.
    #[must_use]
    pub fn matches(&self, type_name: &str, method_name: &str) -> bool {
        if self.name != method_name {
            return false;
        }

        if self.declaring_type == type_name {
            return true;
        }

        self.declaring_type
            .rsplit_once('.')
            .is_some_and(|(_, simple)| simple == type_name)
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.declaring_type, self.name)
    }
}

/// Operand of a decoded instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand
    None,
    /// Immediate value
    Immediate(Immediate),
    /// Branch target
    Target(Label),
    /// Jump table of a `switch`
    Switch(Vec<Label>),
    /// `ldstr` operand with its resolved text
    String(StringRef),
    /// Call operand with its resolved target
    Method(MethodRef),
    /// Any other metadata token, carried through unresolved
    Token(Token),
}

/// Stack effect of an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackBehavior {
    /// Number of items popped from stack
    pub pops: u8,
    /// Number of items pushed to stack
    pub pushes: u8,
}

impl StackBehavior {
    /// Net effect on the stack depth (pushes - pops)
    #[must_use]
    pub fn net_effect(&self) -> i32 {
        i32::from(self.pushes) - i32::from(self.pops)
    }
}

/// A single CIL instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// The opcode
    pub opcode: OpCode,
    /// The typed operand
    pub operand: Operand,
    /// Labels resolving to this instruction
    pub labels: Vec<Label>,
}

impl Instruction {
    /// Creates an unlabelled instruction
    #[must_use]
    pub fn new(opcode: OpCode, operand: Operand) -> Self {
        Instruction {
            opcode,
            operand,
            labels: Vec::new(),
        }
    }

    /// Creates an unlabelled single-byte instruction without operand
    #[must_use]
    pub fn simple(code: u8) -> Self {
        Instruction::new(OpCode::single(code), Operand::None)
    }

    /// `nop`
    #[must_use]
    pub fn nop() -> Self {
        Instruction::simple(opcodes::NOP)
    }

    /// `call` of a resolved method
    #[must_use]
    pub fn call(target: MethodRef) -> Self {
        Instruction::new(OpCode::single(opcodes::CALL), Operand::Method(target))
    }

    /// Mnemonic of the instruction
    #[must_use]
    pub fn mnemonic(&self) -> &'static str {
        self.opcode.mnemonic()
    }

    /// The literal loaded by this instruction, if it is a resolved `ldstr`
    #[must_use]
    pub fn string_literal(&self) -> Option<&str> {
        match (&self.operand, self.opcode) {
            (Operand::String(string), op) if op == OpCode::single(opcodes::LDSTR) => {
                Some(&string.value)
            }
            _ => None,
        }
    }

    /// The call target, if this is a resolved `call` or `callvirt`
    #[must_use]
    pub fn call_target(&self) -> Option<&MethodRef> {
        match &self.operand {
            Operand::Method(method) if self.opcode.is_call() => Some(method),
            _ => None,
        }
    }

    /// Stack effect of this instruction.
    ///
    /// Only the loads, stores and calls that appear around diagnostic call sites are
    /// modelled. Returns `None` for anything else.
    #[must_use]
    pub fn stack_behavior(&self) -> Option<StackBehavior> {
        let (pops, pushes) = if self.opcode.prefix == opcodes::FE_PREFIX {
            match self.opcode.code {
                opcodes::FE_LDARG | opcodes::FE_LDLOC => (0, 1),
                opcodes::FE_STLOC => (1, 0),
                _ => return None,
            }
        } else {
            match self.opcode.code {
                opcodes::NOP => (0, 0),
                opcodes::LDARG_0..=opcodes::LDLOC_3
                | opcodes::LDARG_S
                | opcodes::LDLOC_S
                | opcodes::LDNULL
                | opcodes::LDC_I4_M1..=opcodes::LDC_I4
                | opcodes::LDSTR => (0, 1),
                opcodes::STLOC_0..=opcodes::STLOC_3 | opcodes::STLOC_S | opcodes::POP => (1, 0),
                opcodes::DUP => (1, 2),
                opcodes::CALL | opcodes::CALLVIRT => {
                    let target = self.call_target()?;
                    let pops = target.param_count + u16::from(target.has_this);
                    (
                        u8::try_from(pops).ok()?,
                        u8::from(target.returns_value),
                    )
                }
                _ => return None,
            }
        };

        Some(StackBehavior { pops, pushes })
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for label in &self.labels {
            write!(f, "{label}: ")?;
        }

        write!(f, "{}", self.mnemonic())?;
        match &self.operand {
            Operand::None => Ok(()),
            Operand::Immediate(imm) => write!(f, " {imm:?}"),
            Operand::Target(label) => write!(f, " {label}"),
            Operand::Switch(labels) => {
                let targets = labels
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, " ({targets})")
            }
            Operand::String(string) => write!(f, " \"{}\"", string.value),
            Operand::Method(method) => write!(f, " {method}"),
            Operand::Token(token) => write!(f, " {token}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_error() -> MethodRef {
        MethodRef::new_static(Token::new(0x0A00_0001), "UnityEngine.Debug", "LogError", 1)
    }

    #[test]
    fn test_method_ref_matching() {
        let target = log_error();
        assert!(target.matches("Debug", "LogError"));
        assert!(target.matches("UnityEngine.Debug", "LogError"));
        assert!(!target.matches("Engine.Debug", "LogError"));
        assert!(!target.matches("Debug", "LogWarning"));
        assert!(!target.matches("Logger", "LogError"));
    }

    #[test]
    fn test_long_forms() {
        assert_eq!(
            OpCode::single(opcodes::BR_S).long_form(),
            OpCode::single(opcodes::BR)
        );
        assert_eq!(
            OpCode::single(opcodes::BLT_UN_S).long_form(),
            OpCode::single(opcodes::BLT_UN)
        );
        assert_eq!(
            OpCode::single(opcodes::LEAVE_S).long_form(),
            OpCode::single(opcodes::LEAVE)
        );
        assert_eq!(
            OpCode::single(opcodes::CALL).long_form(),
            OpCode::single(opcodes::CALL)
        );
    }

    #[test]
    fn test_stack_behavior_of_call_sites() {
        let load = Instruction::new(
            OpCode::single(opcodes::LDSTR),
            Operand::String(StringRef {
                token: Token::new(0x7000_0001),
                value: "x".to_string(),
            }),
        );
        assert_eq!(load.stack_behavior().unwrap().net_effect(), 1);
        assert_eq!(load.string_literal(), Some("x"));

        let call = Instruction::call(log_error());
        assert_eq!(call.stack_behavior().unwrap().net_effect(), -1);

        let mut instance = log_error();
        instance.has_this = true;
        instance.returns_value = true;
        let callvirt = Instruction::new(
            OpCode::single(opcodes::CALLVIRT),
            Operand::Method(instance),
        );
        assert_eq!(
            callvirt.stack_behavior(),
            Some(StackBehavior { pops: 2, pushes: 1 })
        );

        assert!(Instruction::simple(opcodes::THROW).stack_behavior().is_none());
        assert_eq!(Instruction::nop().stack_behavior().unwrap().net_effect(), 0);
    }

    #[test]
    fn test_display() {
        let mut instr = Instruction::call(log_error());
        instr.labels.push(Label(3));
        assert_eq!(instr.to_string(), "IL_L3: call UnityEngine.Debug::LogError");
    }
}
