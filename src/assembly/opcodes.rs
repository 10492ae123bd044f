//! CIL opcode byte constants and the opcode metadata table (ECMA-335 III).
//!
//! Single-byte opcodes are named after their mnemonic (e.g. [`CALL`] = `0x28`). Two-byte
//! opcodes that use the `0xFE` prefix have their second byte stored with an `FE_` prefix
//! (e.g. [`FE_CEQ`] = `0x01` for `ceq`, encoded as `0xFE 0x01`).
//!
//! [`lookup`] maps an opcode to its mnemonic and operand encoding. Every opcode the runtime
//! can execute is covered, so a method body either decodes completely or is rejected.
#![allow(missing_docs)]

use crate::assembly::OperandType;

pub const FE_PREFIX: u8 = 0xFE;

pub const NOP: u8 = 0x00;
pub const LDARG_0: u8 = 0x02;
pub const LDARG_1: u8 = 0x03;
pub const LDARG_2: u8 = 0x04;
pub const LDARG_3: u8 = 0x05;
pub const LDLOC_0: u8 = 0x06;
pub const LDLOC_3: u8 = 0x09;
pub const STLOC_0: u8 = 0x0A;
pub const STLOC_3: u8 = 0x0D;
pub const LDARG_S: u8 = 0x0E;
pub const LDLOC_S: u8 = 0x11;
pub const STLOC_S: u8 = 0x13;
pub const LDNULL: u8 = 0x14;
pub const LDC_I4_M1: u8 = 0x15;
pub const LDC_I4_8: u8 = 0x1E;
pub const LDC_I4_S: u8 = 0x1F;
pub const LDC_I4: u8 = 0x20;
pub const DUP: u8 = 0x25;
pub const POP: u8 = 0x26;
pub const CALL: u8 = 0x28;
pub const RET: u8 = 0x2A;

// Short branches (0x2B – 0x37) have long forms exactly 13 bytes higher
pub const BR_S: u8 = 0x2B;
pub const BRFALSE_S: u8 = 0x2C;
pub const BRTRUE_S: u8 = 0x2D;
pub const BLT_UN_S: u8 = 0x37;
pub const BR: u8 = 0x38;
pub const BRFALSE: u8 = 0x39;
pub const BRTRUE: u8 = 0x3A;
pub const BLT_UN: u8 = 0x44;
pub const SWITCH: u8 = 0x45;

pub const CALLVIRT: u8 = 0x6F;
pub const LDSTR: u8 = 0x72;
pub const NEWOBJ: u8 = 0x73;
pub const THROW: u8 = 0x7A;
pub const ENDFINALLY: u8 = 0xDC;
pub const LEAVE: u8 = 0xDD;
pub const LEAVE_S: u8 = 0xDE;

pub const FE_CEQ: u8 = 0x01;
pub const FE_LDARG: u8 = 0x09;
pub const FE_LDLOC: u8 = 0x0C;
pub const FE_STLOC: u8 = 0x0E;
pub const FE_ENDFILTER: u8 = 0x11;
pub const FE_RETHROW: u8 = 0x1A;

/// Distance between a short branch opcode and its long form
pub const SHORT_TO_LONG_BRANCH: u8 = BR - BR_S;

/// Returns the mnemonic and operand encoding of an opcode.
///
/// `prefix` is `0` for single-byte opcodes and [`FE_PREFIX`] for two-byte opcodes.
/// Returns `None` for byte values that are not assigned to any instruction.
#[must_use]
pub fn lookup(prefix: u8, code: u8) -> Option<(&'static str, OperandType)> {
    match prefix {
        0 => lookup_single(code),
        FE_PREFIX => lookup_extended(code),
        _ => None,
    }
}

#[allow(clippy::too_many_lines)]
fn lookup_single(code: u8) -> Option<(&'static str, OperandType)> {
    use OperandType::{
        BranchTarget, Field, Float32, Float64, Int32, Int64, Method, None, ShortBranchTarget,
        ShortInt, ShortVar, Signature, String, Switch, Token, Type,
    };

    let entry = match code {
        0x00 => ("nop", None),
        0x01 => ("break", None),
        0x02 => ("ldarg.0", None),
        0x03 => ("ldarg.1", None),
        0x04 => ("ldarg.2", None),
        0x05 => ("ldarg.3", None),
        0x06 => ("ldloc.0", None),
        0x07 => ("ldloc.1", None),
        0x08 => ("ldloc.2", None),
        0x09 => ("ldloc.3", None),
        0x0A => ("stloc.0", None),
        0x0B => ("stloc.1", None),
        0x0C => ("stloc.2", None),
        0x0D => ("stloc.3", None),
        0x0E => ("ldarg.s", ShortVar),
        0x0F => ("ldarga.s", ShortVar),
        0x10 => ("starg.s", ShortVar),
        0x11 => ("ldloc.s", ShortVar),
        0x12 => ("ldloca.s", ShortVar),
        0x13 => ("stloc.s", ShortVar),
        0x14 => ("ldnull", None),
        0x15 => ("ldc.i4.m1", None),
        0x16 => ("ldc.i4.0", None),
        0x17 => ("ldc.i4.1", None),
        0x18 => ("ldc.i4.2", None),
        0x19 => ("ldc.i4.3", None),
        0x1A => ("ldc.i4.4", None),
        0x1B => ("ldc.i4.5", None),
        0x1C => ("ldc.i4.6", None),
        0x1D => ("ldc.i4.7", None),
        0x1E => ("ldc.i4.8", None),
        0x1F => ("ldc.i4.s", ShortInt),
        0x20 => ("ldc.i4", Int32),
        0x21 => ("ldc.i8", Int64),
        0x22 => ("ldc.r4", Float32),
        0x23 => ("ldc.r8", Float64),
        0x25 => ("dup", None),
        0x26 => ("pop", None),
        0x27 => ("jmp", Method),
        0x28 => ("call", Method),
        0x29 => ("calli", Signature),
        0x2A => ("ret", None),
        0x2B => ("br.s", ShortBranchTarget),
        0x2C => ("brfalse.s", ShortBranchTarget),
        0x2D => ("brtrue.s", ShortBranchTarget),
        0x2E => ("beq.s", ShortBranchTarget),
        0x2F => ("bge.s", ShortBranchTarget),
        0x30 => ("bgt.s", ShortBranchTarget),
        0x31 => ("ble.s", ShortBranchTarget),
        0x32 => ("blt.s", ShortBranchTarget),
        0x33 => ("bne.un.s", ShortBranchTarget),
        0x34 => ("bge.un.s", ShortBranchTarget),
        0x35 => ("bgt.un.s", ShortBranchTarget),
        0x36 => ("ble.un.s", ShortBranchTarget),
        0x37 => ("blt.un.s", ShortBranchTarget),
        0x38 => ("br", BranchTarget),
        0x39 => ("brfalse", BranchTarget),
        0x3A => ("brtrue", BranchTarget),
        0x3B => ("beq", BranchTarget),
        0x3C => ("bge", BranchTarget),
        0x3D => ("bgt", BranchTarget),
        0x3E => ("ble", BranchTarget),
        0x3F => ("blt", BranchTarget),
        0x40 => ("bne.un", BranchTarget),
        0x41 => ("bge.un", BranchTarget),
        0x42 => ("bgt.un", BranchTarget),
        0x43 => ("ble.un", BranchTarget),
        0x44 => ("blt.un", BranchTarget),
        0x45 => ("switch", Switch),
        0x46 => ("ldind.i1", None),
        0x47 => ("ldind.u1", None),
        0x48 => ("ldind.i2", None),
        0x49 => ("ldind.u2", None),
        0x4A => ("ldind.i4", None),
        0x4B => ("ldind.u4", None),
        0x4C => ("ldind.i8", None),
        0x4D => ("ldind.i", None),
        0x4E => ("ldind.r4", None),
        0x4F => ("ldind.r8", None),
        0x50 => ("ldind.ref", None),
        0x51 => ("stind.ref", None),
        0x52 => ("stind.i1", None),
        0x53 => ("stind.i2", None),
        0x54 => ("stind.i4", None),
        0x55 => ("stind.i8", None),
        0x56 => ("stind.r4", None),
        0x57 => ("stind.r8", None),
        0x58 => ("add", None),
        0x59 => ("sub", None),
        0x5A => ("mul", None),
        0x5B => ("div", None),
        0x5C => ("div.un", None),
        0x5D => ("rem", None),
        0x5E => ("rem.un", None),
        0x5F => ("and", None),
        0x60 => ("or", None),
        0x61 => ("xor", None),
        0x62 => ("shl", None),
        0x63 => ("shr", None),
        0x64 => ("shr.un", None),
        0x65 => ("neg", None),
        0x66 => ("not", None),
        0x67 => ("conv.i1", None),
        0x68 => ("conv.i2", None),
        0x69 => ("conv.i4", None),
        0x6A => ("conv.i8", None),
        0x6B => ("conv.r4", None),
        0x6C => ("conv.r8", None),
        0x6D => ("conv.u4", None),
        0x6E => ("conv.u8", None),
        0x6F => ("callvirt", Method),
        0x70 => ("cpobj", Type),
        0x71 => ("ldobj", Type),
        0x72 => ("ldstr", String),
        0x73 => ("newobj", Method),
        0x74 => ("castclass", Type),
        0x75 => ("isinst", Type),
        0x76 => ("conv.r.un", None),
        0x79 => ("unbox", Type),
        0x7A => ("throw", None),
        0x7B => ("ldfld", Field),
        0x7C => ("ldflda", Field),
        0x7D => ("stfld", Field),
        0x7E => ("ldsfld", Field),
        0x7F => ("ldsflda", Field),
        0x80 => ("stsfld", Field),
        0x81 => ("stobj", Type),
        0x82 => ("conv.ovf.i1.un", None),
        0x83 => ("conv.ovf.i2.un", None),
        0x84 => ("conv.ovf.i4.un", None),
        0x85 => ("conv.ovf.i8.un", None),
        0x86 => ("conv.ovf.u1.un", None),
        0x87 => ("conv.ovf.u2.un", None),
        0x88 => ("conv.ovf.u4.un", None),
        0x89 => ("conv.ovf.u8.un", None),
        0x8A => ("conv.ovf.i.un", None),
        0x8B => ("conv.ovf.u.un", None),
        0x8C => ("box", Type),
        0x8D => ("newarr", Type),
        0x8E => ("ldlen", None),
        0x8F => ("ldelema", Type),
        0x90 => ("ldelem.i1", None),
        0x91 => ("ldelem.u1", None),
        0x92 => ("ldelem.i2", None),
        0x93 => ("ldelem.u2", None),
        0x94 => ("ldelem.i4", None),
        0x95 => ("ldelem.u4", None),
        0x96 => ("ldelem.i8", None),
        0x97 => ("ldelem.i", None),
        0x98 => ("ldelem.r4", None),
        0x99 => ("ldelem.r8", None),
        0x9A => ("ldelem.ref", None),
        0x9B => ("stelem.i", None),
        0x9C => ("stelem.i1", None),
        0x9D => ("stelem.i2", None),
        0x9E => ("stelem.i4", None),
        0x9F => ("stelem.i8", None),
        0xA0 => ("stelem.r4", None),
        0xA1 => ("stelem.r8", None),
        0xA2 => ("stelem.ref", None),
        0xA3 => ("ldelem", Type),
        0xA4 => ("stelem", Type),
        0xA5 => ("unbox.any", Type),
        0xB3 => ("conv.ovf.i1", None),
        0xB4 => ("conv.ovf.u1", None),
        0xB5 => ("conv.ovf.i2", None),
        0xB6 => ("conv.ovf.u2", None),
        0xB7 => ("conv.ovf.i4", None),
        0xB8 => ("conv.ovf.u4", None),
        0xB9 => ("conv.ovf.i8", None),
        0xBA => ("conv.ovf.u8", None),
        0xC2 => ("refanyval", Type),
        0xC3 => ("ckfinite", None),
        0xC6 => ("mkrefany", Type),
        0xD0 => ("ldtoken", Token),
        0xD1 => ("conv.u2", None),
        0xD2 => ("conv.u1", None),
        0xD3 => ("conv.i", None),
        0xD4 => ("conv.ovf.i", None),
        0xD5 => ("conv.ovf.u", None),
        0xD6 => ("add.ovf", None),
        0xD7 => ("add.ovf.un", None),
        0xD8 => ("mul.ovf", None),
        0xD9 => ("mul.ovf.un", None),
        0xDA => ("sub.ovf", None),
        0xDB => ("sub.ovf.un", None),
        0xDC => ("endfinally", None),
        0xDD => ("leave", BranchTarget),
        0xDE => ("leave.s", ShortBranchTarget),
        0xDF => ("stind.i", None),
        0xE0 => ("conv.u", None),
        _ => return Option::None,
    };

    Some(entry)
}

fn lookup_extended(code: u8) -> Option<(&'static str, OperandType)> {
    use OperandType::{Method, None, ShortInt, Type, Var};

    let entry = match code {
        0x00 => ("arglist", None),
        0x01 => ("ceq", None),
        0x02 => ("cgt", None),
        0x03 => ("cgt.un", None),
        0x04 => ("clt", None),
        0x05 => ("clt.un", None),
        0x06 => ("ldftn", Method),
        0x07 => ("ldvirtftn", Method),
        0x09 => ("ldarg", Var),
        0x0A => ("ldarga", Var),
        0x0B => ("starg", Var),
        0x0C => ("ldloc", Var),
        0x0D => ("ldloca", Var),
        0x0E => ("stloc", Var),
        0x0F => ("localloc", None),
        0x11 => ("endfilter", None),
        0x12 => ("unaligned.", ShortInt),
        0x13 => ("volatile.", None),
        0x14 => ("tail.", None),
        0x15 => ("initobj", Type),
        0x16 => ("constrained.", Type),
        0x17 => ("cpblk", None),
        0x18 => ("initblk", None),
        0x19 => ("no.", ShortInt),
        0x1A => ("rethrow", None),
        0x1C => ("sizeof", Type),
        0x1D => ("refanytype", None),
        0x1E => ("readonly.", None),
        _ => return Option::None,
    };

    Some(entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_covers_marker_instructions() {
        assert_eq!(lookup(0, LDSTR), Some(("ldstr", OperandType::String)));
        assert_eq!(lookup(0, CALL), Some(("call", OperandType::Method)));
        assert_eq!(lookup(0, CALLVIRT), Some(("callvirt", OperandType::Method)));
        assert_eq!(lookup(0, NOP), Some(("nop", OperandType::None)));
        assert_eq!(lookup(FE_PREFIX, FE_CEQ), Some(("ceq", OperandType::None)));
    }

    #[test]
    fn test_unassigned_bytes() {
        assert!(lookup(0, 0x24).is_none());
        assert!(lookup(0, 0xA6).is_none());
        assert!(lookup(0, 0xF0).is_none());
        assert!(lookup(FE_PREFIX, 0x08).is_none());
        assert!(lookup(0x12, 0x00).is_none());
    }

    #[test]
    fn test_short_branches_map_to_long_forms() {
        for short in BR_S..=BLT_UN_S {
            let (short_name, short_kind) = lookup(0, short).unwrap();
            let (long_name, long_kind) = lookup(0, short + SHORT_TO_LONG_BRANCH).unwrap();
            assert_eq!(short_kind, OperandType::ShortBranchTarget);
            assert_eq!(long_kind, OperandType::BranchTarget);
            assert_eq!(short_name.trim_end_matches(".s"), long_name);
        }
    }
}
