//! QCIR reader (spec.md §6). Ported from the original Qute solver's
//! `Parser::readQCIR` and `addQCIRGate` (`parser.cc`): a prefix of
//! `exists(...)`/`forall(...)`/`free(...)` statements, one `output(g)`
//! declaration, and a sequence of `name = op(args...)` gate definitions for
//! `and`/`or`/xor`/`ite`. Each gate is lowered to a pair of auxiliary
//! variables -- one existential (the gate's value under the clause/CNF
//! side) and one universal (its value under the term/DNF side) -- exactly
//! as the original solver's dual-encoding scheme does.

use std::collections::HashMap;

use super::{ParseError, PcnfBuilder};
use crate::qbf::{Lit, QuantKind, Var};

#[derive(Clone, Copy, PartialEq, Eq)]
enum GateOp {
    And,
    Or,
    Xor,
    Ite,
}

struct Gate {
    /// The existential auxiliary standing for this gate's value on the
    /// clause (CNF) side.
    clause_var: Var,
    /// The universal auxiliary standing for this gate's value on the term
    /// (DNF) side.
    term_var: Var,
}

struct State {
    names: HashMap<String, Var>,
    gates: HashMap<String, Gate>,
    next_block: usize,
    output: Option<String>,
    next_external_name: i32,
}

/// Parses one `-?identifier` occurrence inside a gate's argument list, or a
/// bare prefix/output identifier, returning the identifier text and whether
/// it was negated.
fn split_sign(token: &str) -> (bool, &str) {
    match token.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, token),
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn validate_ident(ident: &str, line: u32) -> Result<(), ParseError> {
    if ident.is_empty() {
        return Err(ParseError::Syntax { line, message: "empty identifier".to_string() });
    }
    if !ident.chars().all(is_ident_char) {
        return Err(ParseError::Syntax { line, message: format!("'{}' is not a valid identifier", ident) });
    }
    Ok(())
}

fn split_args(inside: &str) -> Vec<&str> {
    inside.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()).collect()
}

/// Splits a `name(args)` style statement into `(name, args_text)`.
fn split_call(line_no: u32, stmt: &str) -> Result<(&str, &str), ParseError> {
    let open = stmt.find('(').ok_or_else(|| ParseError::Syntax { line: line_no, message: format!("expected '(' in '{}'", stmt) })?;
    if !stmt.ends_with(')') {
        return Err(ParseError::Syntax { line: line_no, message: format!("expected ')' at end of '{}'", stmt) });
    }
    Ok((stmt[..open].trim(), &stmt[open + 1..stmt.len() - 1]))
}

impl State {
    fn new() -> Self {
        State { names: HashMap::new(), gates: HashMap::new(), next_block: 0, output: None, next_external_name: 1 }
    }

    fn declare_prefix_var(&mut self, ident: &str, kind: QuantKind, builder: &mut impl PcnfBuilder, line: u32) -> Result<(), ParseError> {
        if self.names.contains_key(ident) || self.gates.contains_key(ident) {
            return Err(ParseError::Syntax { line, message: format!("'{}' is declared more than once", ident) });
        }
        let name = self.next_external_name;
        self.next_external_name += 1;
        let v = builder.add_variable(kind, false, self.next_block, name);
        self.names.insert(ident.to_string(), v);
        Ok(())
    }

    /// Resolves a (possibly negated) identifier appearing inside a gate's
    /// argument list to the literal it stands for on one side of the dual
    /// encoding; `on_clause_side` picks the existential/universal half of a
    /// referenced gate.
    fn resolve_lit(&self, line: u32, token: &str, on_clause_side: bool) -> Result<Lit, ParseError> {
        let (negated, ident) = split_sign(token);
        validate_ident(ident, line)?;
        let base = if let Some(&v) = self.names.get(ident) {
            v
        } else if let Some(gate) = self.gates.get(ident) {
            if on_clause_side {
                gate.clause_var
            } else {
                gate.term_var
            }
        } else {
            return Err(ParseError::Syntax { line, message: format!("'{}' is used before it is declared", ident) });
        };
        Ok(base.lit(negated))
    }
}

pub fn parse(text: &str, builder: &mut impl PcnfBuilder) -> Result<(), ParseError> {
    let mut state = State::new();

    for (i, raw_line) in text.lines().enumerate() {
        let line_no = (i + 1) as u32;
        let line = raw_line.trim();
        let line = match line.find('#') {
            Some(idx) => line[..idx].trim(),
            None => line,
        };
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix("exists(").or_else(|| line.strip_prefix("Exists(")) {
            parse_prefix_block(&mut state, rest, QuantKind::Existential, builder, line_no)?;
            continue;
        }
        if let Some(rest) = line.strip_prefix("forall(").or_else(|| line.strip_prefix("Forall(")) {
            parse_prefix_block(&mut state, rest, QuantKind::Universal, builder, line_no)?;
            continue;
        }
        if let Some(rest) = line.strip_prefix("free(").or_else(|| line.strip_prefix("Free(")) {
            // `free` variables are quantified existentially, exactly as the
            // original solver's QCIR_QTYPE_MAP treats them.
            parse_prefix_block(&mut state, rest, QuantKind::Existential, builder, line_no)?;
            continue;
        }
        if let Some(rest) = line.strip_prefix("output(").or_else(|| line.strip_prefix("Output(")) {
            let inside = rest.strip_suffix(')').ok_or_else(|| ParseError::Syntax { line: line_no, message: "expected ')'".to_string() })?;
            let ident = inside.trim();
            validate_ident(ident, line_no)?;
            if state.output.is_some() {
                return Err(ParseError::Syntax { line: line_no, message: "more than one output(...) declaration".to_string() });
            }
            state.output = Some(ident.to_string());
            continue;
        }

        let eq = line.find('=').ok_or_else(|| ParseError::Syntax { line: line_no, message: format!("expected '=' in '{}'", line) })?;
        let gate_name = line[..eq].trim();
        let (op_name, args_text) = split_call(line_no, line[eq + 1..].trim())?;
        validate_ident(gate_name, line_no)?;
        let op = match op_name.to_ascii_lowercase().as_str() {
            "and" => GateOp::And,
            "or" => GateOp::Or,
            "xor" => GateOp::Xor,
            "ite" => GateOp::Ite,
            other => return Err(ParseError::Syntax { line: line_no, message: format!("unknown gate type '{}'", other) }),
        };
        let args = split_args(args_text);
        add_gate(&mut state, builder, line_no, gate_name, op, &args)?;
    }

    let output_name = state.output.ok_or_else(|| ParseError::Syntax { line: 0, message: "no output(...) declaration".to_string() })?;

    // The original parser emits the output assertion with positive polarity
    // on both sides regardless of the gate/variable's own definition.
    let clause_lit = if let Some(&v) = state.names.get(&output_name) {
        v.pos_lit()
    } else if let Some(gate) = state.gates.get(&output_name) {
        gate.clause_var.pos_lit()
    } else {
        return Err(ParseError::Syntax { line: 0, message: format!("output '{}' was never declared", output_name) });
    };
    let term_lit = if let Some(&v) = state.names.get(&output_name) {
        v.pos_lit()
    } else {
        state.gates[&output_name].term_var.pos_lit()
    };
    builder.add_clause(&[clause_lit]);
    builder.add_term(&[term_lit], false);

    Ok(())
}

fn parse_prefix_block(state: &mut State, rest: &str, kind: QuantKind, builder: &mut impl PcnfBuilder, line_no: u32) -> Result<(), ParseError> {
    let inside = rest.strip_suffix(')').ok_or_else(|| ParseError::Syntax { line: line_no, message: "expected ')'".to_string() })?;
    for ident in split_args(inside) {
        state.declare_prefix_var(ident, kind, builder, line_no)?;
    }
    state.next_block += 1;
    Ok(())
}

fn add_gate(state: &mut State, builder: &mut impl PcnfBuilder, line_no: u32, gate_name: &str, op: GateOp, args: &[&str]) -> Result<(), ParseError> {
    if state.names.contains_key(gate_name) || state.gates.contains_key(gate_name) {
        return Err(ParseError::Syntax { line: line_no, message: format!("gate '{}' is declared more than once", gate_name) });
    }
    match op {
        GateOp::Xor if args.len() != 2 => {
            return Err(ParseError::Syntax { line: line_no, message: format!("xor gate '{}' needs exactly 2 inputs", gate_name) })
        }
        GateOp::Ite if args.len() != 3 => {
            return Err(ParseError::Syntax { line: line_no, message: format!("ite gate '{}' needs exactly 3 inputs", gate_name) })
        }
        _ => {}
    }

    let clause_lits: Vec<Lit> = args.iter().map(|a| state.resolve_lit(line_no, a, true)).collect::<Result<_, _>>()?;
    let term_lits: Vec<Lit> = args.iter().map(|a| state.resolve_lit(line_no, a, false)).collect::<Result<_, _>>()?;

    let block = state.next_block;
    state.next_block += 1;
    let clause_name = state.next_external_name;
    state.next_external_name += 1;
    let term_name = state.next_external_name;
    state.next_external_name += 1;
    let gate_clause_var = builder.add_variable(QuantKind::Existential, true, block, clause_name);
    let gate_term_var = builder.add_variable(QuantKind::Universal, true, block, term_name);

    for &l in &clause_lits {
        builder.add_dependency(gate_clause_var, l.var());
    }
    for &l in &term_lits {
        builder.add_dependency(gate_term_var, l.var());
    }

    let gc = gate_clause_var.pos_lit();
    let gt = gate_term_var.pos_lit();

    match op {
        GateOp::And => {
            for &l in &clause_lits {
                builder.add_clause(&[l, !gc]);
            }
            let mut big: Vec<Lit> = clause_lits.iter().map(|&l| !l).collect();
            big.push(gc);
            builder.add_clause(&big);

            for &l in &term_lits {
                builder.add_term(&[!l, gt], false);
            }
            let mut big_t = term_lits.clone();
            big_t.push(!gt);
            builder.add_term(&big_t, false);
        }
        GateOp::Or => {
            for &l in &clause_lits {
                builder.add_clause(&[!l, gc]);
            }
            let mut big = clause_lits.clone();
            big.push(!gc);
            builder.add_clause(&big);

            for &l in &term_lits {
                builder.add_term(&[l, !gt], false);
            }
            let mut big_t: Vec<Lit> = term_lits.iter().map(|&l| !l).collect();
            big_t.push(gt);
            builder.add_term(&big_t, false);
        }
        GateOp::Xor => {
            let (x, y) = (clause_lits[0], clause_lits[1]);
            builder.add_clause(&[!gc, !x, !y]);
            builder.add_clause(&[!gc, x, y]);
            builder.add_clause(&[gc, !x, y]);
            builder.add_clause(&[gc, x, !y]);

            let (x, y) = (term_lits[0], term_lits[1]);
            builder.add_term(&[gt, x, y], false);
            builder.add_term(&[gt, !x, !y], false);
            builder.add_term(&[!gt, x, !y], false);
            builder.add_term(&[!gt, !x, y], false);
        }
        GateOp::Ite => {
            let (cond, then_, else_) = (clause_lits[0], clause_lits[1], clause_lits[2]);
            builder.add_clause(&[!gc, !cond, then_]);
            builder.add_clause(&[!gc, cond, else_]);
            builder.add_clause(&[gc, !cond, !then_]);
            builder.add_clause(&[gc, cond, !else_]);

            let (cond, then_, else_) = (term_lits[0], term_lits[1], term_lits[2]);
            builder.add_term(&[gt, cond, !then_], false);
            builder.add_term(&[gt, !cond, !else_], false);
            builder.add_term(&[!gt, cond, then_], false);
            builder.add_term(&[!gt, !cond, else_], false);
        }
    }

    state.gates.insert(gate_name.to_string(), Gate { clause_var: gate_clause_var, term_var: gate_term_var });
    Ok(())
}
