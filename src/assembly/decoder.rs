//! CIL instruction decoding.
//!
//! The decoder turns the IL code of a method body into a flat sequence of
//! [`Instruction`]s. Byte-offset branch targets and exception-clause boundaries are
//! replaced by [`Label`]s as they are encountered; once the whole stream is known, every
//! label is attached to the instruction that starts at its offset. A target that lands in
//! the middle of an instruction, or outside the code, rejects the whole body.
//!
//! `ldstr` and call operands are resolved through a [`TokenResolver`] so the inspector can
//! match on literal text and method names. Tokens the resolver does not know are kept as
//! plain [`Operand::Token`]s and survive re-encoding unchanged.
//!
//! # Key Components
//!
//! - [`decode_method`] - Parse a complete body (header, code, clauses) into [`MethodIl`]
//! - [`decode_stream`] - Decode bare IL code without a header
//! - [`TokenResolver`] - Collaborator resolving `#US` and method tokens
//!
//! # Usage Examples
//!
//! ```rust,ignore
//! use ownerscope::assembly::{decode_stream, NullResolver};
//!
//! let code = [0x00, 0x2B, 0x00, 0x2A]; // nop, br.s +0, ret
//! let instructions = decode_stream(&code, &NullResolver)?;
//! assert_eq!(instructions.len(), 3);
//! assert_eq!(instructions[2].labels.len(), 1);
//! # Ok::<(), ownerscope::Error>(())
//! ```

use std::collections::HashMap;

use crate::{
    assembly::{
        opcodes::FE_PREFIX, Immediate, Instruction, Label, MethodRef, OpCode, Operand,
        OperandType, StringRef,
    },
    file::parser::Parser,
    metadata::{
        method::{
            ClauseKind, ExceptionClause, ExceptionHandler, ExceptionHandlerFlags, MethodBody,
            MethodIl,
        },
        token::Token,
    },
    Result,
};

/// Resolves operand tokens of a method body to the values the inspector matches on.
pub trait TokenResolver {
    /// Text of a `#US` heap entry referenced by `ldstr`
    fn user_string(&self, token: Token) -> Option<String>;

    /// Target of a `call`, `callvirt` or `newobj`
    fn method(&self, token: Token) -> Option<MethodRef>;
}

/// A resolver that knows nothing; every token stays unresolved.
pub struct NullResolver;

impl TokenResolver for NullResolver {
    fn user_string(&self, _token: Token) -> Option<String> {
        None
    }

    fn method(&self, _token: Token) -> Option<MethodRef> {
        None
    }
}

/// Result of decoding a code stream
pub struct DecodedCode {
    /// Instructions with their labels attached
    pub instructions: Vec<Instruction>,
    /// Labels resolving to the end of the code
    pub end_labels: Vec<Label>,
}

/// A stateful decoder over the code of a single method body.
struct Decoder<'a> {
    /// Parser over the IL code only, offset 0 is the first instruction
    parser: Parser<'a>,
    /// Resolver for `ldstr` and method tokens
    resolver: &'a dyn TokenResolver,
    /// Decoded instructions, labels not yet attached
    instructions: Vec<Instruction>,
    /// Start offset of each entry in `instructions`
    offsets: Vec<u32>,
    /// Labels handed out so far, keyed by the offset they resolve to
    labels: HashMap<u32, Label>,
}

impl<'a> Decoder<'a> {
    /// Decode the complete code stream.
    ///
    /// # Errors
    /// Returns an error on unknown opcodes, truncated operands, or branch targets outside
    /// the code.
    fn new(code: &'a [u8], resolver: &'a dyn TokenResolver) -> Result<Self> {
        if u32::try_from(code.len()).is_err() {
            return Err(malformed_error!("Method code too large - {}", code.len()));
        }

        let mut decoder = Decoder {
            parser: Parser::new(code),
            resolver,
            instructions: Vec::new(),
            offsets: Vec::new(),
            labels: HashMap::new(),
        };

        while decoder.parser.has_more_data() {
            #[allow(clippy::cast_possible_truncation)]
            let offset = decoder.parser.pos() as u32;
            let instruction = decoder.decode_next()?;

            decoder.offsets.push(offset);
            decoder.instructions.push(instruction);
        }

        Ok(decoder)
    }

    /// The label for `offset`, allocating a new one on first use.
    ///
    /// Validity of the offset is checked when the labels are attached in [`Self::finish`].
    fn label_at(&mut self, offset: u32) -> Label {
        let next = Label(u32::try_from(self.labels.len()).unwrap_or(u32::MAX));
        *self.labels.entry(offset).or_insert(next)
    }

    /// Label for a relative branch displacement measured from `base`
    fn branch_target(&mut self, base: usize, displacement: i64) -> Result<Label> {
        let target = i64::try_from(base)
            .ok()
            .and_then(|base| base.checked_add(displacement))
            .and_then(|target| u32::try_from(target).ok())
            .filter(|target| (*target as usize) <= self.parser.len());

        match target {
            Some(target) => Ok(self.label_at(target)),
            None => Err(malformed_error!(
                "Branch target out of range - base {}, displacement {}",
                base,
                displacement
            )),
        }
    }

    fn decode_next(&mut self) -> Result<Instruction> {
        let start = self.parser.pos();
        let first = self.parser.read_le::<u8>()?;
        let opcode = if first == FE_PREFIX {
            OpCode::extended(self.parser.read_le::<u8>()?)
        } else {
            OpCode::single(first)
        };

        let Some(operand_type) = opcode.operand_type() else {
            return Err(malformed_error!(
                "Invalid opcode - 0x{:02X}{:02X} at offset {}",
                opcode.prefix,
                opcode.code,
                start
            ));
        };

        let operand = match operand_type {
            OperandType::None => Operand::None,
            OperandType::ShortInt => Operand::Immediate(Immediate::Int8(self.parser.read_le()?)),
            OperandType::Int32 => Operand::Immediate(Immediate::Int32(self.parser.read_le()?)),
            OperandType::Int64 => Operand::Immediate(Immediate::Int64(self.parser.read_le()?)),
            OperandType::Float32 => {
                Operand::Immediate(Immediate::Float32(self.parser.read_le()?))
            }
            OperandType::Float64 => {
                Operand::Immediate(Immediate::Float64(self.parser.read_le()?))
            }
            OperandType::ShortVar => Operand::Immediate(Immediate::UInt8(self.parser.read_le()?)),
            OperandType::Var => Operand::Immediate(Immediate::UInt16(self.parser.read_le()?)),
            OperandType::ShortBranchTarget => {
                let displacement = self.parser.read_le::<i8>()?;
                let base = self.parser.pos();
                Operand::Target(self.branch_target(base, i64::from(displacement))?)
            }
            OperandType::BranchTarget => {
                let displacement = self.parser.read_le::<i32>()?;
                let base = self.parser.pos();
                Operand::Target(self.branch_target(base, i64::from(displacement))?)
            }
            OperandType::Switch => {
                let count = self.parser.read_le::<u32>()? as usize;
                if count > self.parser.remaining() / 4 {
                    return Err(malformed_error!(
                        "Switch table exceeds method code - {} targets at offset {}",
                        count,
                        start
                    ));
                }

                let mut displacements = Vec::with_capacity(count);
                for _ in 0..count {
                    displacements.push(self.parser.read_le::<i32>()?);
                }

                let base = self.parser.pos();
                let targets = displacements
                    .into_iter()
                    .map(|displacement| self.branch_target(base, i64::from(displacement)))
                    .collect::<Result<Vec<_>>>()?;
                Operand::Switch(targets)
            }
            OperandType::String => {
                let token = Token::new(self.parser.read_le()?);
                match self.resolver.user_string(token) {
                    Some(value) => Operand::String(StringRef { token, value }),
                    None => Operand::Token(token),
                }
            }
            OperandType::Method => {
                let token = Token::new(self.parser.read_le()?);
                match self.resolver.method(token) {
                    Some(method) => Operand::Method(method),
                    None => Operand::Token(token),
                }
            }
            OperandType::Field | OperandType::Type | OperandType::Token | OperandType::Signature => {
                Operand::Token(Token::new(self.parser.read_le()?))
            }
        };

        Ok(Instruction::new(opcode, operand))
    }

    /// Converts a raw clause into its label form
    fn clause(&mut self, handler: &ExceptionHandler) -> Result<ExceptionClause> {
        let try_end = handler
            .try_offset
            .checked_add(handler.try_length)
            .ok_or_else(|| malformed_error!("Try region overflows - {}", handler.try_offset))?;
        let handler_end = handler
            .handler_offset
            .checked_add(handler.handler_length)
            .ok_or_else(|| {
                malformed_error!("Handler region overflows - {}", handler.handler_offset)
            })?;

        let kind = if handler.flags.contains(ExceptionHandlerFlags::FILTER) {
            ClauseKind::Filter(self.label_at(handler.filter_offset))
        } else if handler.flags.contains(ExceptionHandlerFlags::FINALLY) {
            ClauseKind::Finally
        } else if handler.flags.contains(ExceptionHandlerFlags::FAULT) {
            ClauseKind::Fault
        } else {
            ClauseKind::Catch(Token::new(handler.filter_offset))
        };

        Ok(ExceptionClause {
            kind,
            try_start: self.label_at(handler.try_offset),
            try_end: self.label_at(try_end),
            handler_start: self.label_at(handler.handler_offset),
            handler_end: self.label_at(handler_end),
        })
    }

    /// Attach every label to the instruction it resolves to.
    ///
    /// # Errors
    /// Returns an error if a label points inside an instruction or past the end of the code.
    fn finish(self) -> Result<DecodedCode> {
        let mut instructions = self.instructions;
        let mut end_labels = Vec::new();

        let mut labels = self.labels.into_iter().collect::<Vec<_>>();
        labels.sort_by_key(|(_, label)| *label);

        let code_len = self.parser.len();
        for (offset, label) in labels {
            if offset as usize == code_len {
                end_labels.push(label);
                continue;
            }

            match self.offsets.binary_search(&offset) {
                Ok(index) => instructions[index].labels.push(label),
                Err(_) => {
                    return Err(malformed_error!(
                        "Label target is not an instruction boundary - {}",
                        offset
                    ))
                }
            }
        }

        Ok(DecodedCode {
            instructions,
            end_labels,
        })
    }
}

/// Decode bare IL code into instructions with labels attached.
///
/// Labels resolving to the end of the code are dropped; use [`decode_method`] when the
/// body has to be re-encoded.
///
/// # Errors
/// Returns an error if the code cannot be decoded completely.
pub fn decode_stream(code: &[u8], resolver: &dyn TokenResolver) -> Result<Vec<Instruction>> {
    let decoder = Decoder::new(code, resolver)?;
    Ok(decoder.finish()?.instructions)
}

/// Decode a complete method body, starting at its header.
///
/// `data` may extend past the end of the body, which is convenient when the body offset is
/// known but its size is not.
///
/// # Errors
/// Returns an error if the header, the code or an exception clause is malformed.
pub fn decode_method(data: &[u8], resolver: &dyn TokenResolver) -> Result<MethodIl> {
    let body = MethodBody::from(data)?;
    let mut decoder = Decoder::new(body.code(data)?, resolver)?;

    let exception_clauses = body
        .exception_handlers
        .iter()
        .map(|handler| decoder.clause(handler))
        .collect::<Result<Vec<_>>>()?;

    let decoded = decoder.finish()?;
    Ok(MethodIl {
        max_stack: body.max_stack,
        init_locals: body.is_init_local,
        local_var_sig_token: body.local_var_sig_token,
        instructions: decoded.instructions,
        end_labels: decoded.end_labels,
        exception_clauses,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::opcodes;

    struct FixedResolver;

    impl TokenResolver for FixedResolver {
        fn user_string(&self, token: Token) -> Option<String> {
            (token.value() == 0x7000_0001).then(|| "hello".to_string())
        }

        fn method(&self, token: Token) -> Option<MethodRef> {
            (token.value() == 0x0A00_0002).then(|| {
                MethodRef::new_static(token, "UnityEngine.Debug", "LogError", 1)
            })
        }
    }

    #[test]
    fn test_resolves_operands() {
        #[rustfmt::skip]
        let code = [
            0x72, 0x01, 0x00, 0x00, 0x70,       // ldstr "hello"
            0x28, 0x02, 0x00, 0x00, 0x0A,       // call Debug::LogError
            0x72, 0x09, 0x00, 0x00, 0x70,       // ldstr <unknown>
            0x2A,                               // ret
        ];

        let instructions = decode_stream(&code, &FixedResolver).unwrap();
        assert_eq!(instructions.len(), 4);
        assert_eq!(instructions[0].string_literal(), Some("hello"));
        assert!(instructions[1]
            .call_target()
            .unwrap()
            .matches("Debug", "LogError"));
        assert_eq!(
            instructions[2].operand,
            Operand::Token(Token::new(0x7000_0009))
        );
        assert_eq!(instructions[3].mnemonic(), "ret");
    }

    #[test]
    fn test_branches_become_labels() {
        #[rustfmt::skip]
        let code = [
            0x16,                               // 0: ldc.i4.0
            0x2C, 0x02,                         // 1: brfalse.s 5
            0x00,                               // 3: nop
            0x00,                               // 4: nop
            0x38, 0xFA, 0xFF, 0xFF, 0xFF,       // 5: br 4
            0x2A,                               // 10: ret
        ];

        let instructions = decode_stream(&code, &NullResolver).unwrap();
        assert_eq!(instructions.len(), 6);

        let Operand::Target(forward) = instructions[1].operand else {
            panic!("expected branch target");
        };
        assert_eq!(instructions[4].labels, vec![forward]);

        let Operand::Target(backward) = instructions[4].operand else {
            panic!("expected branch target");
        };
        assert_eq!(instructions[3].labels, vec![backward]);
        assert_eq!(
            instructions[4].opcode,
            OpCode::single(opcodes::BR)
        );
    }

    #[test]
    fn test_switch_targets() {
        #[rustfmt::skip]
        let code = [
            0x45, 0x02, 0x00, 0x00, 0x00,       // switch (2 targets)
            0x00, 0x00, 0x00, 0x00,             // -> 13
            0x01, 0x00, 0x00, 0x00,             // -> 14
            0x00,                               // 13: nop
            0x2A,                               // 14: ret
        ];

        let instructions = decode_stream(&code, &NullResolver).unwrap();
        let Operand::Switch(targets) = &instructions[0].operand else {
            panic!("expected switch");
        };
        assert_eq!(targets.len(), 2);
        assert_eq!(instructions[1].labels, vec![targets[0]]);
        assert_eq!(instructions[2].labels, vec![targets[1]]);
    }

    #[test]
    fn test_invalid_streams() {
        // unknown opcode
        assert!(decode_stream(&[0x24], &NullResolver).is_err());
        // truncated operand
        assert!(decode_stream(&[0x20, 0x01, 0x00], &NullResolver).is_err());
        // branch into the middle of ldc.i4
        assert!(decode_stream(&[0x2B, 0x01, 0x20, 0, 0, 0, 0], &NullResolver).is_err());
        // branch before the start of the code
        assert!(decode_stream(&[0x2B, 0xF0], &NullResolver).is_err());
        // switch table larger than the code
        assert!(decode_stream(&[0x45, 0xFF, 0xFF, 0x00, 0x00], &NullResolver).is_err());
    }

    #[test]
    fn test_method_with_finally() {
        #[rustfmt::skip]
        let data = [
            0x1B, 0x30, 0x01, 0x00,
            0x04, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x00, 0xDE, 0x01, 0xDC,             // nop, leave.s 4, endfinally
            0x01, 0x10, 0x00, 0x00,
            0x02, 0x00,
            0x00, 0x00, 0x03,
            0x03, 0x00, 0x01,
            0x00, 0x00, 0x00, 0x00,
        ];

        let il = decode_method(&data, &NullResolver).unwrap();
        assert_eq!(il.instructions.len(), 3);
        assert_eq!(il.max_stack, 1);
        assert!(il.init_locals);
        assert_eq!(il.exception_clauses.len(), 1);

        let clause = &il.exception_clauses[0];
        assert_eq!(clause.kind, ClauseKind::Finally);
        assert!(il.instructions[0].labels.contains(&clause.try_start));
        assert!(il.instructions[2].labels.contains(&clause.try_end));
        assert!(il.instructions[2].labels.contains(&clause.handler_start));
        assert!(il.end_labels.contains(&clause.handler_end));

        // leave.s targets the end of the code
        let Operand::Target(leave) = il.instructions[1].operand else {
            panic!("expected branch target");
        };
        assert!(il.end_labels.contains(&leave));
    }
}
