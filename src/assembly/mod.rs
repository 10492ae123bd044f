//! CIL instruction model, decoding and encoding.
//!
//! This module is the byte-code layer underneath the body inspector and the body
//! rewriter. It converts between the raw IL bytes of a method body and a label-based
//! [`Instruction`] sequence that can be scanned and edited without tracking offsets.
//!
//! # Key Components
//!
//! - [`opcodes`] - Opcode byte constants and the opcode metadata table
//! - [`Instruction`], [`Operand`], [`Label`] - The instruction model
//! - [`decode_method`] / [`decode_stream`] - Bytes to instructions
//! - [`encode_method`] / [`encode_stream`] - Instructions to bytes
//! - [`TokenResolver`] - Resolves `ldstr` and call operands while decoding

mod decoder;
mod encoder;
mod instruction;
pub mod opcodes;

pub use decoder::{decode_method, decode_stream, DecodedCode, NullResolver, TokenResolver};
pub use encoder::{encode_method, encode_stream, EncodedCode};
pub use instruction::{
    Immediate, Instruction, Label, MethodRef, OpCode, Operand, OperandType, StackBehavior,
    StringRef,
};
