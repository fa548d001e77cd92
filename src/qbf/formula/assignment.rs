//! Per-variable data store: kind, quantifier block, the assignment trail
//! and decision stack. Ported from the original Qute solver's
//! `VariableDataStore` (`variable_data.hh`), restructured in the idiom of
//! minisat-rust's `formula::assignment::Assignment`.

use super::constraint::ConstraintRef;
use super::{ConstraintKind, Lit, QuantKind, Var};

#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug)]
pub struct DecisionLevel(pub usize);

pub const GROUND_LEVEL: DecisionLevel = DecisionLevel(0);

/// Either the constraint that forced an assignment, or the sentinel meaning
/// "this literal was chosen by the decision heuristic".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reason {
    Decision,
    Forced(ConstraintKind, ConstraintRef),
}

struct VarLine {
    kind: QuantKind,
    auxiliary: bool,
    block: usize,
    is_assigned: bool,
    polarity: bool,
    level: DecisionLevel,
    reason: Reason,
}

pub struct VariableDataStore {
    vars: Vec<VarLine>,
    trail: Vec<Lit>,
    /// trail length at the start of each decision level (index 0 = level 1's start, ...)
    decisions: Vec<usize>,
    qhead: usize,

    /// blocks[i] = (kind, first_var_index_in_block)
    blocks: Vec<(QuantKind, usize)>,
    var_block: Vec<usize>,

    /// prefix_count[k][v] = number of variables of kind k with index <= v.
    exist_prefix_count: Vec<u32>,
    univ_prefix_count: Vec<u32>,
}

impl VariableDataStore {
    pub fn new() -> Self {
        VariableDataStore {
            vars: Vec::new(),
            trail: Vec::new(),
            decisions: Vec::new(),
            qhead: 0,
            blocks: Vec::new(),
            var_block: Vec::new(),
            exist_prefix_count: Vec::new(),
            univ_prefix_count: Vec::new(),
        }
    }

    /// Add a new variable at the end of the prefix. `block` is the index of
    /// the quantifier block it belongs to; all variables sharing a block
    /// must share `kind` (enforced by the front-end, not here).
    pub fn add_variable(&mut self, kind: QuantKind, auxiliary: bool, block: usize) -> Var {
        let v = Var::from_index(self.vars.len());
        self.vars.push(VarLine {
            kind,
            auxiliary,
            block,
            is_assigned: false,
            polarity: false,
            level: GROUND_LEVEL,
            reason: Reason::Decision,
        });
        self.var_block.push(block);

        while self.blocks.len() <= block {
            self.blocks.push((kind, self.vars.len() - 1));
        }

        let (prev_e, prev_u) = (
            self.exist_prefix_count.last().copied().unwrap_or(0),
            self.univ_prefix_count.last().copied().unwrap_or(0),
        );
        match kind {
            QuantKind::Existential => {
                self.exist_prefix_count.push(prev_e + 1);
                self.univ_prefix_count.push(prev_u);
            }
            QuantKind::Universal => {
                self.exist_prefix_count.push(prev_e);
                self.univ_prefix_count.push(prev_u + 1);
            }
        }
        v
    }

    #[inline]
    pub fn number_of_vars(&self) -> usize {
        self.vars.len()
    }

    #[inline]
    pub fn kind(&self, v: Var) -> QuantKind {
        self.vars[v.index()].kind
    }

    #[inline]
    pub fn is_auxiliary(&self, v: Var) -> bool {
        self.vars[v.index()].auxiliary
    }

    #[inline]
    pub fn block(&self, v: Var) -> usize {
        self.vars[v.index()].block
    }

    #[inline]
    pub fn is_assigned(&self, v: Var) -> bool {
        self.vars[v.index()].is_assigned
    }

    #[inline]
    pub fn polarity(&self, v: Var) -> bool {
        self.vars[v.index()].polarity
    }

    #[inline]
    pub fn is_assigned_true(&self, l: Lit) -> bool {
        let line = &self.vars[l.var().index()];
        line.is_assigned && line.polarity == l.sign()
    }

    #[inline]
    pub fn is_assigned_false(&self, l: Lit) -> bool {
        let line = &self.vars[l.var().index()];
        line.is_assigned && line.polarity != l.sign()
    }

    #[inline]
    pub fn level(&self, v: Var) -> DecisionLevel {
        self.vars[v.index()].level
    }

    #[inline]
    pub fn reason(&self, v: Var) -> Reason {
        self.vars[v.index()].reason
    }

    #[inline]
    pub fn decision_level(&self) -> DecisionLevel {
        DecisionLevel(self.decisions.len())
    }

    #[inline]
    pub fn is_ground_level(&self) -> bool {
        self.decisions.is_empty()
    }

    #[inline]
    pub fn new_decision_level(&mut self) {
        self.decisions.push(self.trail.len());
    }

    /// Kind of the variable decided at depth `d` (1-indexed, as in spec.md §4.2).
    pub fn decision_level_type(&self, d: usize) -> QuantKind {
        let start = self.decisions[d - 1];
        self.kind(self.trail[start].var())
    }

    pub fn assign(&mut self, lit: Lit, reason: Reason) {
        let line = &mut self.vars[lit.var().index()];
        assert!(!line.is_assigned);
        line.is_assigned = true;
        line.polarity = lit.sign();
        line.level = DecisionLevel(self.decisions.len());
        line.reason = reason;
        self.trail.push(lit);
    }

    /// Undo the most recent trail entry, invoking `f` with the popped
    /// literal before clearing its assignment.
    pub fn undo_last<F: FnMut(Lit)>(&mut self, mut f: F) -> Lit {
        let lit = self.trail.pop().expect("undo_last on empty trail");
        f(lit);
        let line = &mut self.vars[lit.var().index()];
        line.is_assigned = false;
        line.reason = Reason::Decision;
        lit
    }

    #[inline]
    pub fn trail_len(&self) -> usize {
        self.trail.len()
    }

    #[inline]
    pub fn trail(&self) -> &[Lit] {
        &self.trail
    }

    pub fn pop_decision_level(&mut self) -> usize {
        self.decisions.pop().expect("pop_decision_level on ground level")
    }

    #[inline]
    pub fn dequeue(&mut self) -> Option<Lit> {
        if self.qhead < self.trail.len() {
            let lit = self.trail[self.qhead];
            self.qhead += 1;
            Some(lit)
        } else {
            None
        }
    }

    #[inline]
    pub fn dequeue_all(&mut self) {
        self.qhead = self.trail.len();
    }

    #[inline]
    pub fn pending_from(&mut self, qhead: usize) {
        self.qhead = qhead.min(self.trail.len());
    }

    #[inline]
    pub fn qhead(&self) -> usize {
        self.qhead
    }

    pub fn all_assigned(&self) -> bool {
        self.trail.len() == self.vars.len()
    }

    /// O(1) "how many existential/universal variables exist with index <= v".
    pub fn count_of_kind_until(&self, kind: QuantKind, v: Var) -> u32 {
        match kind {
            QuantKind::Existential => self.exist_prefix_count[v.index()],
            QuantKind::Universal => self.univ_prefix_count[v.index()],
        }
    }

    pub fn number_of_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn block_kind(&self, block: usize) -> QuantKind {
        self.blocks[block].0
    }

    /// The outermost (first) quantifier block, used for partial-certificate
    /// emission (spec.md §6 -- only the outermost block's assignment is ever
    /// printed).
    /// Patch every forced reason referencing a constraint of `kind`'s
    /// arena through the relocation closure. Called once per compaction.
    pub fn relocate_reasons<F: FnMut(ConstraintKind, ConstraintRef) -> ConstraintRef>(&mut self, mut reloc: F) {
        for line in self.vars.iter_mut() {
            if let Reason::Forced(k, r) = line.reason {
                line.reason = Reason::Forced(k, reloc(k, r));
            }
        }
    }

    pub fn outermost_block_vars(&self) -> Vec<Var> {
        if self.blocks.is_empty() {
            return Vec::new();
        }
        let end = if self.blocks.len() > 1 {
            self.blocks[1].1
        } else {
            self.vars.len()
        };
        (0..end).map(Var::from_index).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_counts_are_cumulative() {
        let mut vd = VariableDataStore::new();
        let a = vd.add_variable(QuantKind::Universal, false, 0);
        let b = vd.add_variable(QuantKind::Existential, false, 1);
        let c = vd.add_variable(QuantKind::Existential, false, 1);
        assert_eq!(vd.count_of_kind_until(QuantKind::Universal, a), 1);
        assert_eq!(vd.count_of_kind_until(QuantKind::Existential, a), 0);
        assert_eq!(vd.count_of_kind_until(QuantKind::Existential, b), 1);
        assert_eq!(vd.count_of_kind_until(QuantKind::Existential, c), 2);
    }

    #[test]
    fn assign_and_undo_roundtrip() {
        let mut vd = VariableDataStore::new();
        let a = vd.add_variable(QuantKind::Existential, false, 0);
        vd.assign(a.pos_lit(), Reason::Decision);
        assert!(vd.is_assigned(a));
        assert!(vd.is_assigned_true(a.pos_lit()));
        vd.undo_last(|_| {});
        assert!(!vd.is_assigned(a));
    }
}
