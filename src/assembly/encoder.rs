//! CIL instruction encoding.
//!
//! The encoder is the reverse of [`crate::assembly::decoder`]. It lays out a label-based
//! instruction sequence in two passes: the first assigns a byte offset to every
//! instruction and label, the second writes opcodes and operands with all branch
//! displacements resolved.
//!
//! Every branch is written in its long form. A rewritten body can grow past the range of
//! an 8-bit displacement, and widening all branches up front keeps the layout a single
//! fixed-point pass.
//!
//! # Key Components
//!
//! - [`encode_method`] - Write a complete body: header, code and exception clauses
//! - [`encode_stream`] - Write bare code and report where each label ended up

use std::collections::HashMap;

use crate::{
    assembly::{opcodes::FE_PREFIX, Immediate, Instruction, Label, Operand, OperandType},
    file::io::push_le,
    metadata::method::{
        ClauseKind, ExceptionClause, MethodBodyFlags, MethodIl, SectionFlags, FAT_HEADER_DWORDS,
        TINY_CODE_SIZE_MAX, TINY_MAX_STACK,
    },
    Error, Result,
};

/// Result of laying out a code stream
pub struct EncodedCode {
    /// The IL bytes
    pub code: Vec<u8>,
    /// Byte offset of every label defined by the stream
    pub label_offsets: HashMap<Label, u32>,
}

/// Encoded size of an instruction once short branches are widened
fn encoded_size(instruction: &Instruction) -> Result<usize> {
    let opcode = instruction.opcode.long_form();
    let Some(operand_type) = opcode.operand_type() else {
        return Err(malformed_error!("Cannot encode opcode - {:?}", opcode));
    };

    let operand_size = match (&instruction.operand, operand_type.size()) {
        (Operand::Switch(targets), None) => 4 + targets.len() * 4,
        (_, Some(size)) => size,
        (_, None) => return Err(malformed_error!("Switch without jump table")),
    };

    Ok(opcode.size() + operand_size)
}

fn lay_out(
    instructions: &[Instruction],
    end_labels: &[Label],
) -> Result<(Vec<u32>, HashMap<Label, u32>, u32)> {
    let mut offsets = Vec::with_capacity(instructions.len());
    let mut label_offsets = HashMap::new();
    let mut offset = 0_usize;

    for instruction in instructions {
        let position = u32::try_from(offset)
            .map_err(|_| malformed_error!("Method code too large - {}", offset))?;
        for label in &instruction.labels {
            if label_offsets.insert(*label, position).is_some() {
                return Err(malformed_error!("Label defined twice - {}", label));
            }
        }

        offsets.push(position);
        offset += encoded_size(instruction)?;
    }

    let end = u32::try_from(offset)
        .map_err(|_| malformed_error!("Method code too large - {}", offset))?;
    for label in end_labels {
        if label_offsets.insert(*label, end).is_some() {
            return Err(malformed_error!("Label defined twice - {}", label));
        }
    }

    Ok((offsets, label_offsets, end))
}

fn displacement(label_offsets: &HashMap<Label, u32>, label: Label, base: usize) -> Result<i32> {
    let target = label_offsets
        .get(&label)
        .ok_or(Error::UnresolvedLabel(label.0))?;

    let displacement = i64::from(*target) - i64::try_from(base).unwrap_or(i64::MAX);
    i32::try_from(displacement)
        .map_err(|_| malformed_error!("Branch displacement out of range - {}", displacement))
}

fn write_immediate(code: &mut Vec<u8>, operand_type: OperandType, imm: Immediate) -> Result<()> {
    match (operand_type, imm) {
        (OperandType::ShortInt, Immediate::Int8(value)) => push_le(code, value),
        (OperandType::ShortVar | OperandType::ShortInt, Immediate::UInt8(value)) => {
            push_le(code, value);
        }
        (OperandType::Var, Immediate::UInt16(value)) => push_le(code, value),
        (OperandType::Int32, Immediate::Int32(value)) => push_le(code, value),
        (OperandType::Int64, Immediate::Int64(value)) => push_le(code, value),
        (OperandType::Float32, Immediate::Float32(value)) => push_le(code, value),
        (OperandType::Float64, Immediate::Float64(value)) => push_le(code, value),
        (expected, found) => {
            return Err(malformed_error!(
                "Immediate {:?} does not fit operand {:?}",
                found,
                expected
            ))
        }
    }

    Ok(())
}

/// Lay out and write a code stream.
///
/// # Errors
/// Returns [`Error::UnresolvedLabel`] if a branch refers to a label that no instruction
/// defines, and a malformed error if an operand does not match its opcode.
pub fn encode_stream(instructions: &[Instruction], end_labels: &[Label]) -> Result<EncodedCode> {
    let (offsets, label_offsets, end) = lay_out(instructions, end_labels)?;
    let mut code = Vec::with_capacity(end as usize);

    for (instruction, offset) in instructions.iter().zip(offsets) {
        let opcode = instruction.opcode.long_form();
        let Some(operand_type) = opcode.operand_type() else {
            return Err(malformed_error!("Cannot encode opcode - {:?}", opcode));
        };

        if opcode.prefix == FE_PREFIX {
            code.push(FE_PREFIX);
        }
        code.push(opcode.code);

        let next = offset as usize + encoded_size(instruction)?;
        match (&instruction.operand, operand_type) {
            (Operand::None, OperandType::None) => {}
            (Operand::Immediate(imm), _) => write_immediate(&mut code, operand_type, *imm)?,
            (Operand::Target(label), OperandType::BranchTarget) => {
                push_le(&mut code, displacement(&label_offsets, *label, next)?);
            }
            (Operand::Switch(targets), OperandType::Switch) => {
                let count = u32::try_from(targets.len())
                    .map_err(|_| malformed_error!("Switch table too large"))?;
                push_le(&mut code, count);
                for label in targets {
                    push_le(&mut code, displacement(&label_offsets, *label, next)?);
                }
            }
            (Operand::String(string), OperandType::String) => {
                push_le(&mut code, string.token.value());
            }
            (Operand::Method(method), OperandType::Method) => {
                push_le(&mut code, method.token.value());
            }
            (
                Operand::Token(token),
                OperandType::String
                | OperandType::Method
                | OperandType::Field
                | OperandType::Type
                | OperandType::Token
                | OperandType::Signature,
            ) => push_le(&mut code, token.value()),
            (operand, expected) => {
                return Err(malformed_error!(
                    "Operand {:?} does not fit {} ({:?})",
                    operand,
                    instruction.mnemonic(),
                    expected
                ))
            }
        }
    }

    Ok(EncodedCode {
        code,
        label_offsets,
    })
}

fn clause_offset(label_offsets: &HashMap<Label, u32>, label: Label) -> Result<u32> {
    label_offsets
        .get(&label)
        .copied()
        .ok_or(Error::UnresolvedLabel(label.0))
}

fn write_clause(
    buffer: &mut Vec<u8>,
    label_offsets: &HashMap<Label, u32>,
    clause: &ExceptionClause,
) -> Result<()> {
    let try_start = clause_offset(label_offsets, clause.try_start)?;
    let try_end = clause_offset(label_offsets, clause.try_end)?;
    let handler_start = clause_offset(label_offsets, clause.handler_start)?;
    let handler_end = clause_offset(label_offsets, clause.handler_end)?;
    if try_end < try_start || handler_end < handler_start {
        return Err(malformed_error!(
            "Exception clause ends before it starts - try {}..{}, handler {}..{}",
            try_start,
            try_end,
            handler_start,
            handler_end
        ));
    }

    let last = match clause.kind {
        ClauseKind::Catch(token) => token.value(),
        ClauseKind::Filter(filter) => clause_offset(label_offsets, filter)?,
        ClauseKind::Finally | ClauseKind::Fault => 0,
    };

    push_le(buffer, u32::from(clause.kind.flags().bits()));
    push_le(buffer, try_start);
    push_le(buffer, try_end - try_start);
    push_le(buffer, handler_start);
    push_le(buffer, handler_end - handler_start);
    push_le(buffer, last);

    Ok(())
}

/// Write a complete method body.
///
/// A tiny header is used when the body allows it (no locals, no clauses, small code, a
/// stack depth of at most eight). Otherwise a fat header is written, followed by a single
/// fat exception section if there are clauses.
///
/// # Errors
/// Returns an error if the code cannot be laid out or a clause refers to an unknown label.
pub fn encode_method(il: &MethodIl) -> Result<Vec<u8>> {
    let encoded = encode_stream(&il.instructions, &il.end_labels)?;
    let code_size = encoded.code.len();

    let tiny = code_size <= TINY_CODE_SIZE_MAX
        && il.max_stack <= TINY_MAX_STACK
        && il.local_var_sig_token == 0
        && !il.init_locals
        && il.exception_clauses.is_empty();

    let mut body = Vec::with_capacity(code_size + 12);
    if tiny {
        // code_size fits in six bits here
        #[allow(clippy::cast_possible_truncation)]
        let header = ((code_size as u8) << 2) | MethodBodyFlags::TINY_FORMAT.bits() as u8;
        body.push(header);
        body.extend_from_slice(&encoded.code);
        return Ok(body);
    }

    let mut flags = MethodBodyFlags::FAT_FORMAT;
    if il.init_locals {
        flags |= MethodBodyFlags::INIT_LOCALS;
    }
    if !il.exception_clauses.is_empty() {
        flags |= MethodBodyFlags::MORE_SECTS;
    }

    push_le(&mut body, flags.bits() | (FAT_HEADER_DWORDS << 12));
    push_le(&mut body, il.max_stack);
    push_le(
        &mut body,
        u32::try_from(code_size).map_err(|_| malformed_error!("Method code too large"))?,
    );
    push_le(&mut body, il.local_var_sig_token);
    body.extend_from_slice(&encoded.code);

    if il.exception_clauses.is_empty() {
        return Ok(body);
    }

    while body.len() % 4 != 0 {
        body.push(0);
    }

    let section_size = 4 + il.exception_clauses.len() * 24;
    if section_size > 0x00FF_FFFF {
        return Err(malformed_error!(
            "Too many exception clauses - {}",
            il.exception_clauses.len()
        ));
    }

    body.push((SectionFlags::EHTABLE | SectionFlags::FAT_FORMAT).bits());
    #[allow(clippy::cast_possible_truncation)]
    body.extend_from_slice(&(section_size as u32).to_le_bytes()[..3]);

    for clause in &il.exception_clauses {
        write_clause(&mut body, &encoded.label_offsets, clause)?;
    }

    Ok(body)
}
