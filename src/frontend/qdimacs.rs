//! QDIMACS reader (spec.md §6). Ported from the original Qute solver's
//! `Parser::readQDIMACS` (`parser.cc`): comment lines, the `p cnf` header, an
//! alternating `a`/`e` prefix, then the clause matrix. When no dynamic
//! model-generation strategy is in use, also injects the Tseitin DNF seed
//! the original parser builds inline (one auxiliary universal per clause,
//! a binary term per clause literal, and one aggregating term).

use super::{ParseError, PcnfBuilder};
use crate::qbf::{Lit, QuantKind, Var};

struct Tokens<'a> {
    items: Vec<(u32, &'a str)>,
    pos: usize,
}

impl<'a> Tokens<'a> {
    fn new(input: &'a str) -> Self {
        let mut items = Vec::new();
        for (i, line) in input.lines().enumerate() {
            let line_no = (i + 1) as u32;
            if line.trim_start().starts_with('c') {
                continue;
            }
            for tok in line.split_whitespace() {
                items.push((line_no, tok));
            }
        }
        Tokens { items, pos: 0 }
    }

    fn peek(&self) -> Option<(u32, &'a str)> {
        self.items.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<(u32, &'a str)> {
        let item = self.items.get(self.pos).copied();
        if item.is_some() {
            self.pos += 1;
        }
        item
    }

    fn expect_word(&mut self, expected: &str) -> Result<u32, ParseError> {
        match self.next() {
            Some((line, tok)) if tok == expected => Ok(line),
            Some((line, tok)) => Err(ParseError::Syntax { line, message: format!("expected '{}', found '{}'", expected, tok) }),
            None => Err(ParseError::Syntax { line: 0, message: format!("expected '{}', found end of input", expected) }),
        }
    }

    fn expect_int(&mut self) -> Result<(u32, i64), ParseError> {
        match self.next() {
            Some((line, tok)) => match tok.parse::<i64>() {
                Ok(v) => Ok((line, v)),
                Err(_) => Err(ParseError::Syntax { line, message: format!("expected an integer, found '{}'", tok) }),
            },
            None => Err(ParseError::Syntax { line: 0, message: "expected an integer, found end of input".to_string() }),
        }
    }
}

/// `parse(text, builder, use_model_generation)`: `use_model_generation` is
/// true when the run has a dynamic model generator selected, mirroring the
/// original `Parser`'s constructor flag of the same name.
pub fn parse(text: &str, builder: &mut impl PcnfBuilder, use_model_generation: bool) -> Result<(), ParseError> {
    let mut tokens = Tokens::new(text);

    tokens.expect_word("p")?;
    tokens.expect_word("cnf")?;
    let (line, max_var) = tokens.expect_int()?;
    if max_var < 0 {
        return Err(ParseError::Syntax { line, message: "declared variable count must be non-negative".to_string() });
    }
    let (line, num_clauses) = tokens.expect_int()?;
    if num_clauses < 0 {
        return Err(ParseError::Syntax { line, message: "declared clause count must be non-negative".to_string() });
    }
    let max_var = max_var as usize;

    // var_of[id] = the Var bound to external name `id`, once seen in the prefix.
    let mut var_of: Vec<Option<Var>> = vec![None; max_var + 1];
    let mut blocks: Vec<QuantKind> = Vec::new();

    loop {
        let kind = match tokens.peek() {
            Some((_, "a")) => {
                tokens.next();
                QuantKind::Universal
            }
            Some((_, "e")) => {
                tokens.next();
                QuantKind::Existential
            }
            _ => break,
        };
        if blocks.last() != Some(&kind) {
            blocks.push(kind);
        }
        let block = blocks.len() - 1;

        loop {
            let (line, id) = tokens.expect_int()?;
            if id == 0 {
                break;
            }
            if id < 1 || (id as usize) > max_var {
                return Err(ParseError::Syntax { line, message: format!("variable {} out of range [1, {}]", id, max_var) });
            }
            let idx = id as usize;
            if var_of[idx].is_some() {
                return Err(ParseError::Syntax { line, message: format!("variable {} is bound twice in the prefix", id) });
            }
            var_of[idx] = Some(builder.add_variable(kind, false, block, id as i32));
        }
    }

    let mut aux_block: Option<usize> = None;
    let mut top_level_term: Vec<Lit> = Vec::new();
    let mut clauses_seen: u64 = 0;

    while tokens.peek().is_some() {
        let mut raw: Vec<(u32, Lit)> = Vec::new();
        loop {
            let (line, signed) = tokens.expect_int()?;
            if signed == 0 {
                break;
            }
            let var_id = signed.unsigned_abs() as usize;
            if var_id > max_var {
                return Err(ParseError::Syntax { line, message: format!("variable {} out of range [1, {}]", var_id, max_var) });
            }
            let v = var_of[var_id].ok_or_else(|| ParseError::Syntax {
                line,
                message: format!("variable {} occurs in a clause but is not bound in the prefix", var_id),
            })?;
            raw.push((line, v.lit(signed < 0)));
        }
        clauses_seen += 1;

        let mut lits: Vec<Lit> = raw.iter().map(|&(_, l)| l).collect();
        lits.sort();
        lits.dedup();
        let tautological = lits.windows(2).any(|w| w[0] == !w[1]);

        if !tautological {
            builder.add_clause(&lits);
            if !use_model_generation {
                let block = *aux_block.get_or_insert_with(|| {
                    blocks.push(QuantKind::Universal);
                    blocks.len() - 1
                });
                let aux = builder.add_variable(QuantKind::Universal, true, block, (max_var as i64 + clauses_seen as i64) as i32);
                for &l in &lits {
                    builder.add_dependency(aux, l.var());
                    builder.add_term(&[l, aux.neg_lit()], false);
                }
                top_level_term.push(aux.pos_lit());
            }
        }
    }

    if num_clauses != 0 && clauses_seen != num_clauses as u64 {
        log::warn!("QDIMACS header declared {} clauses, {} were read", num_clauses, clauses_seen);
    }

    if !use_model_generation {
        builder.add_term(&top_level_term, false);
    }

    Ok(())
}
