//! In-place surgery on decoded method bodies.
//!
//! The transforms here operate on label-based instruction sequences, so they never touch
//! byte offsets. [`splice`] inserts instructions and moves the labels of the displaced
//! instruction onto the first inserted one; [`nop_fill`] neutralises a range while keeping
//! its labels alive. [`rewrite_marker_call`] combines them to redirect the generic
//! ownership diagnostic of a dispatch handler to a detailed reporter:
//!
//! ```text
//! before                                  after
//! IL_L0: ldstr "Only the owner ..."       IL_L0: ldarg.0
//!        call  Debug::LogError                   ldarg.2
//!                                                call  InboundViolationReporter::Report
//!                                                nop
//!                                                nop
//! ```

use std::ops::Range;

use crate::{
    assembly::{opcodes, Instruction, MethodRef},
    inspect::pattern::{find_adjacent, MarkerPattern},
    metadata::method::MethodIl,
    Error, Result,
};

/// Insert `insert` before the instruction at `at`.
///
/// Labels attached to the instruction previously at `at` move to the first inserted
/// instruction, so every branch or clause boundary that targeted it now targets the
/// inserted sequence. `at == instructions.len()` appends without moving labels.
///
/// # Errors
/// Returns [`Error::OutOfBounds`] if `at` lies past the end of the sequence.
pub fn splice(
    instructions: &mut Vec<Instruction>,
    at: usize,
    mut insert: Vec<Instruction>,
) -> Result<()> {
    if at > instructions.len() {
        return Err(Error::OutOfBounds);
    }

    if insert.is_empty() {
        return Ok(());
    }

    if let Some(displaced) = instructions.get_mut(at) {
        let labels = std::mem::take(&mut displaced.labels);
        insert[0].labels.extend(labels);
    }

    instructions.splice(at..at, insert);
    Ok(())
}

/// Replace every instruction in `range` by `nop`, keeping its labels.
///
/// # Errors
/// Returns [`Error::OutOfBounds`] if the range exceeds the sequence.
pub fn nop_fill(instructions: &mut [Instruction], range: Range<usize>) -> Result<()> {
    let Some(slice) = instructions.get_mut(range) else {
        return Err(Error::OutOfBounds);
    };

    for instruction in slice {
        let labels = std::mem::take(&mut instruction.labels);
        *instruction = Instruction::nop();
        instruction.labels = labels;
    }

    Ok(())
}

/// Net stack effect of a straight-line sequence, `None` if any instruction is unmodelled
#[must_use]
pub fn net_stack_effect(instructions: &[Instruction]) -> Option<i32> {
    instructions
        .iter()
        .map(|instruction| instruction.stack_behavior().map(|b| b.net_effect()))
        .sum()
}

/// The sequence forwarding a dispatch handler's target object and call parameters to
/// `reporter`.
///
/// Dispatch handlers are static with the parameters (target, reader, call parameters), so
/// argument 0 is the target and argument 2 carries the sender.
#[must_use]
pub fn reporter_call_sequence(reporter: &MethodRef) -> Vec<Instruction> {
    vec![
        Instruction::simple(opcodes::LDARG_0),
        Instruction::simple(opcodes::LDARG_2),
        Instruction::call(reporter.clone()),
    ]
}

/// Redirect the marker call site of a dispatch handler to `reporter`.
///
/// Only a literal load immediately followed by the diagnostic call is rewritten. The pair
/// is kept in place as two `nop`s after the reporter call, so the body length changes only
/// by the inserted sequence. `max_stack` grows by one for the extra argument.
///
/// # Arguments
/// * `il` - The decoded handler body
/// * `pattern` - The marker to look for
/// * `reporter` - Static reporter taking (target, call parameters)
/// * `method` - Normalized signature of the handler, used in errors
///
/// # Errors
/// Returns [`Error::BodyShapeMismatch`] if no adjacent marker pair exists, and
/// [`Error::StackImbalance`] if the reporter sequence would change the stack depth.
pub fn rewrite_marker_call(
    mut il: MethodIl,
    pattern: &MarkerPattern,
    reporter: &MethodRef,
    method: &str,
) -> Result<MethodIl> {
    let Some(site) = find_adjacent(&il.instructions, pattern) else {
        return Err(Error::BodyShapeMismatch(format!(
            "{method}: \"{}\" is not immediately followed by {}.{}",
            pattern.literal, pattern.call_type, pattern.call_name
        )));
    };

    let replacement = reporter_call_sequence(reporter);
    let removed = &il.instructions[site.load..=site.call];
    let expected = net_stack_effect(removed);
    let actual = net_stack_effect(&replacement);
    match (expected, actual) {
        (Some(expected), Some(actual)) if expected == actual => {}
        (expected, actual) => {
            return Err(Error::StackImbalance {
                method: method.to_string(),
                expected: expected.unwrap_or_default(),
                actual: actual.unwrap_or_default(),
            })
        }
    }

    let inserted = replacement.len();
    splice(&mut il.instructions, site.load, replacement)?;
    nop_fill(
        &mut il.instructions,
        site.load + inserted..site.call + inserted + 1,
    )?;

    il.max_stack = il.max_stack.saturating_add(1);
    Ok(il)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{Label, OpCode, Operand, StringRef},
        inspect::pattern::OWNERSHIP_MARKER,
        metadata::{
            method::{ClauseKind, ExceptionClause},
            token::Token,
        },
    };

    fn marker_load() -> Instruction {
        Instruction::new(
            OpCode::single(opcodes::LDSTR),
            Operand::String(StringRef {
                token: Token::new(0x7000_0001),
                value: OWNERSHIP_MARKER.to_string(),
            }),
        )
    }

    fn log_error() -> Instruction {
        Instruction::call(MethodRef::new_static(
            Token::new(0x0A00_0001),
            "UnityEngine.Debug",
            "LogError",
            1,
        ))
    }

    fn reporter() -> MethodRef {
        MethodRef::new_static(
            Token::new(0x0A00_0099),
            "ownerscope.InboundViolationReporter",
            "Report",
            2,
        )
    }

    fn handler_body() -> MethodIl {
        // if (!owner) { Debug.LogError(marker); return; }
        let mut branch = Instruction::new(
            OpCode::single(opcodes::BRTRUE),
            Operand::Target(Label(1)),
        );
        branch.labels.push(Label(0));

        let mut load = marker_load();
        load.labels.push(Label(2));

        let mut ret = Instruction::simple(opcodes::RET);
        ret.labels.push(Label(1));

        let mut il = MethodIl::new(vec![
            Instruction::simple(opcodes::LDC_I4_M1),
            branch,
            load,
            log_error(),
            ret,
        ]);
        il.max_stack = 1;
        il.exception_clauses.push(ExceptionClause {
            kind: ClauseKind::Finally,
            try_start: Label(0),
            try_end: Label(2),
            handler_start: Label(2),
            handler_end: Label(1),
        });
        il
    }

    #[test]
    fn test_splice_moves_labels() {
        let mut target = Instruction::nop();
        target.labels.push(Label(5));
        let mut instructions = vec![Instruction::simple(opcodes::RET), target];

        splice(
            &mut instructions,
            1,
            vec![Instruction::simple(opcodes::LDNULL), Instruction::simple(opcodes::POP)],
        )
        .unwrap();

        assert_eq!(instructions.len(), 4);
        assert_eq!(instructions[1].labels, vec![Label(5)]);
        assert!(instructions[3].labels.is_empty());

        assert!(splice(&mut instructions, 9, vec![Instruction::nop()]).is_err());
        splice(&mut instructions, 4, vec![Instruction::nop()]).unwrap();
        assert_eq!(instructions.len(), 5);
    }

    #[test]
    fn test_nop_fill_keeps_labels() {
        let mut labelled = log_error();
        labelled.labels.push(Label(3));
        let mut instructions = vec![marker_load(), labelled];

        nop_fill(&mut instructions, 0..2).unwrap();
        assert!(instructions.iter().all(|i| i.mnemonic() == "nop"));
        assert_eq!(instructions[1].labels, vec![Label(3)]);
        assert!(nop_fill(&mut instructions, 1..3).is_err());
    }

    #[test]
    fn test_rewrite_redirects_to_reporter() {
        let rewritten = rewrite_marker_call(
            handler_body(),
            &MarkerPattern::default(),
            &reporter(),
            "Foo.__rpc_handler_1234(NetworkBehaviour,FastBufferReader,__RpcParams)",
        )
        .unwrap();

        let mnemonics = rewritten
            .instructions
            .iter()
            .map(Instruction::mnemonic)
            .collect::<Vec<_>>();
        assert_eq!(
            mnemonics,
            ["ldc.i4.m1", "brtrue", "ldarg.0", "ldarg.2", "call", "nop", "nop", "ret"]
        );

        // label of the literal load now names the reporter sequence
        assert_eq!(rewritten.instructions[2].labels, vec![Label(2)]);
        assert!(rewritten.instructions[5].labels.is_empty());
        assert_eq!(
            rewritten.instructions[4].call_target().unwrap().name,
            "Report"
        );
        assert_eq!(rewritten.max_stack, 2);

        // stack effect of the rewritten region equals the removed pair
        assert_eq!(net_stack_effect(&rewritten.instructions[2..7]), Some(0));
        assert!(!MarkerPattern::default().matches(&rewritten.instructions));
    }

    #[test]
    fn test_rewrite_requires_adjacent_pair() {
        let mut il = handler_body();
        il.instructions.insert(3, Instruction::nop());

        let result = rewrite_marker_call(
            il,
            &MarkerPattern::default(),
            &reporter(),
            "Foo.__rpc_handler_1234()",
        );
        assert!(matches!(result, Err(Error::BodyShapeMismatch(_))));
    }

    #[test]
    fn test_rewrite_rejects_stack_imbalance() {
        let mut wrong_arity = reporter();
        wrong_arity.param_count = 1;

        let result = rewrite_marker_call(
            handler_body(),
            &MarkerPattern::default(),
            &wrong_arity,
            "Foo.__rpc_handler_1234()",
        );
        assert!(matches!(
            result,
            Err(Error::StackImbalance {
                expected: 0,
                actual: 1,
                ..
            })
        ));
    }
}
