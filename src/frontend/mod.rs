//! Shared front-end plumbing for the QDIMACS and QCIR readers (spec.md §6).
//! Both readers only ever talk to the solver through [`PcnfBuilder`], the
//! same shape the original Qute solver's `PCNFContainer` gives its `Parser`
//! (`parser.hh`/`.cc`): add a variable, add a dependency, add a clause or a
//! term. Keeping the readers behind this trait (rather than calling
//! `qbf::driver::Solver` directly) is what lets `tests/` drive them against
//! a recording stub instead of a full solver.

use std::fmt;
use std::io;

use crate::qbf::{Lit, QuantKind, Var};

pub mod qcir;
pub mod qdimacs;

/// Everything that can go wrong turning QDIMACS/QCIR text into a loaded
/// problem (spec.md §7 "Input syntax" and "IO").
#[derive(Debug)]
pub enum ParseError {
    Io(io::Error),
    /// A malformed header, out-of-range variable, duplicate binding, free
    /// variable, duplicate gate, unknown gate type, wrong gate arity, or a
    /// missing `output` declaration -- `line` is 1-based, 0 when the error
    /// is not tied to a single line (e.g. a missing `output`).
    Syntax { line: u32, message: String },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParseError::Io(e) => write!(f, "{}", e),
            ParseError::Syntax { line: 0, message } => write!(f, "{}", message),
            ParseError::Syntax { line, message } => write!(f, "line {}: {}", line, message),
        }
    }
}

impl std::error::Error for ParseError {}

impl From<io::Error> for ParseError {
    fn from(e: io::Error) -> Self {
        ParseError::Io(e)
    }
}

/// The load-time API both readers build a problem through. Implemented by
/// [`crate::qbf::driver::Solver`] below; a test-only recorder can implement
/// it too, to assert on parser behaviour without a full search engine.
pub trait PcnfBuilder {
    fn add_variable(&mut self, kind: QuantKind, auxiliary: bool, block: usize, external_name: i32) -> Var;
    fn add_dependency(&mut self, of: Var, on: Var);
    fn add_clause(&mut self, lits: &[Lit]);
    fn add_term(&mut self, lits: &[Lit], tainted: bool);
    fn mark_permanently_ineligible(&mut self, v: Var);
}

impl PcnfBuilder for crate::qbf::driver::Solver {
    fn add_variable(&mut self, kind: QuantKind, auxiliary: bool, block: usize, external_name: i32) -> Var {
        crate::qbf::driver::Solver::add_variable(self, kind, auxiliary, block, external_name)
    }

    fn add_dependency(&mut self, of: Var, on: Var) {
        crate::qbf::driver::Solver::add_dependency(self, of, on)
    }

    fn add_clause(&mut self, lits: &[Lit]) {
        self.add_input_clause(lits);
    }

    fn add_term(&mut self, lits: &[Lit], tainted: bool) {
        self.add_input_term(lits, tainted);
    }

    fn mark_permanently_ineligible(&mut self, v: Var) {
        crate::qbf::driver::Solver::mark_permanently_ineligible(self, v)
    }
}

/// Auto-detects QDIMACS vs. QCIR from the first non-whitespace character,
/// exactly as the original Qute solver's `Parser::readAUTO` does: QDIMACS
/// files start their first real line with `p` or `c`, QCIR files don't.
pub fn detect_and_parse<R: io::Read>(mut reader: R, builder: &mut impl PcnfBuilder, use_model_generation: bool) -> Result<(), ParseError> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    let first_token = text
        .lines()
        .map(|l| l.trim_start())
        .find(|l| !l.is_empty())
        .and_then(|l| l.chars().next());
    match first_token {
        Some('p') | Some('c') => qdimacs::parse(&text, builder, use_model_generation),
        _ => qcir::parse(&text, builder),
    }
}
