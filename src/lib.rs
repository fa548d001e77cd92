//! A QCDCL solver for quantified Boolean formulas given in prenex CNF/DNF
//! form (clauses on the existential side, terms on the universal side).
//! `qbf` holds the search engine itself; `frontend` turns QDIMACS/QCIR text
//! into calls against it; `options` turns a CLI argument list into the
//! settings `main.rs` builds a [`qbf::driver::Solver`] from.

pub mod frontend;
pub mod options;
pub mod qbf;
pub mod util;

use std::fmt;
use std::io;

/// Top-level error type spanning everything that can go wrong before the
/// search loop itself starts (spec.md §7): a missing/unreadable input file,
/// a malformed QDIMACS/QCIR document, or an invalid option combination.
#[derive(Debug)]
pub enum SolverError {
    Io(io::Error),
    Parse(frontend::ParseError),
    Option(options::OptionError),
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SolverError::Io(e) => write!(f, "{}", e),
            SolverError::Parse(e) => write!(f, "{}", e),
            SolverError::Option(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SolverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SolverError::Io(e) => Some(e),
            SolverError::Parse(e) => Some(e),
            SolverError::Option(e) => Some(e),
        }
    }
}

impl From<io::Error> for SolverError {
    fn from(e: io::Error) -> Self {
        SolverError::Io(e)
    }
}

impl From<frontend::ParseError> for SolverError {
    fn from(e: frontend::ParseError) -> Self {
        match e {
            frontend::ParseError::Io(io_err) => SolverError::Io(io_err),
            other => SolverError::Parse(other),
        }
    }
}

impl From<options::OptionError> for SolverError {
    fn from(e: options::OptionError) -> Self {
        SolverError::Option(e)
    }
}

pub type Result<T> = std::result::Result<T, SolverError>;
