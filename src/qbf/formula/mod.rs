//! Core value types: quantifier kind, variables and packed literals.

use std::fmt;
use std::ops;

pub mod arena;
pub mod assignment;
pub mod constraint;
pub mod index_map;

pub use self::index_map::{LitMap, LitVec, VarHeap, VarMap, VarVec};

/// Whether a variable is bound by an `exists` or `forall` quantifier.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum QuantKind {
    Existential,
    Universal,
}

impl QuantKind {
    #[inline]
    pub fn flip(self) -> QuantKind {
        match self {
            QuantKind::Existential => QuantKind::Universal,
            QuantKind::Universal => QuantKind::Existential,
        }
    }
}

/// A clause is evaluated over existentials/universals; a term is the dual.
/// "Primary" literals are the ones propagation prefers to watch and that
/// asserting learning resolves on; "secondary" are the others.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum ConstraintKind {
    Clause,
    Term,
}

impl ConstraintKind {
    #[inline]
    pub fn dual(self) -> ConstraintKind {
        match self {
            ConstraintKind::Clause => ConstraintKind::Term,
            ConstraintKind::Term => ConstraintKind::Clause,
        }
    }

    /// The quantifier kind that is "primary" (propagated, drives asserting
    /// learning) for this side: existential for clauses, universal for terms.
    #[inline]
    pub fn primary_kind(self) -> QuantKind {
        match self {
            ConstraintKind::Clause => QuantKind::Existential,
            ConstraintKind::Term => QuantKind::Universal,
        }
    }

    #[inline]
    pub fn secondary_kind(self) -> QuantKind {
        self.primary_kind().flip()
    }

    /// The polarity a literal must be assigned to in order to satisfy
    /// (disable) a constraint of this kind: `true` for clauses, `false` for terms.
    #[inline]
    pub fn disabling_polarity(self) -> bool {
        match self {
            ConstraintKind::Clause => true,
            ConstraintKind::Term => false,
        }
    }
}

/// Variables are dense, 0-indexed internally; `1 + index` is the external name.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct Var(pub usize);

impl Var {
    #[inline]
    pub fn from_index(i: usize) -> Var {
        Var(i)
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.0
    }

    #[inline]
    pub fn lit(&self, sign: bool) -> Lit {
        Lit((self.0 << 1) | (sign as usize))
    }

    #[inline]
    pub fn pos_lit(&self) -> Lit {
        Lit(self.0 << 1)
    }

    #[inline]
    pub fn neg_lit(&self) -> Lit {
        Lit((self.0 << 1) | 1)
    }
}

impl fmt::Debug for Var {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "x{}", self.0 + 1)
    }
}

/// A variable plus polarity, packed so negation is `^ 1` and the value can
/// index directly into a per-literal array.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct Lit(pub usize);

impl Lit {
    #[inline]
    pub fn sign(&self) -> bool {
        (self.0 & 1) != 0
    }

    #[inline]
    pub fn var(&self) -> Var {
        Var(self.0 >> 1)
    }
}

impl ops::Not for Lit {
    type Output = Lit;

    #[inline]
    fn not(self) -> Lit {
        Lit(self.0 ^ 1)
    }
}

impl fmt::Debug for Lit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.sign() {
            write!(f, "-")?;
        }
        write!(f, "{:?}", self.var())
    }
}
