//! Owns both sides' constraint arenas plus the cleaning policy (LBD/activity
//! decay, threshold-based removal, compaction). Ported from the original
//! Qute solver's `ConstraintDB` (`constraint_DB.hh`/`.cc`).

use log::info;
use std::collections::HashMap;

use super::formula::assignment::VariableDataStore;
use super::formula::constraint::{Constraint, ConstraintAllocator, ConstraintMut, ConstraintRef};
use super::propagate::Propagator;
use super::{kind_index, ConstraintKind, Lit, Stats};

#[derive(Clone, Debug)]
pub struct CleaningPolicy {
    pub constraint_activity_decay: f64,
    pub constraint_increment: f64,
    pub lbd_threshold: u32,
    pub use_activity_threshold: bool,
    /// fraction of learnt constraints removed on a clean-up pass, per kind
    /// (index 0 = clauses, 1 = terms)
    pub removal_ratio: [f64; 2],
    pub learnts_max: [u32; 2],
    pub learnts_increment: [u32; 2],
}

impl Default for CleaningPolicy {
    fn default() -> Self {
        CleaningPolicy {
            constraint_activity_decay: 0.999,
            constraint_increment: 1.0,
            lbd_threshold: 2,
            use_activity_threshold: false,
            removal_ratio: [0.5, 0.5],
            learnts_max: [2000, 2000],
            learnts_increment: [500, 500],
        }
    }
}

pub struct ConstraintDbManager {
    trace_ids: bool,
    policy: CleaningPolicy,
    constraints: [ConstraintAllocator; 2],
    input_references: [Vec<ConstraintRef>; 2],
    learnt_references: [Vec<ConstraintRef>; 2],
    literal_occurrences: [HashMap<Lit, Vec<ConstraintRef>>; 2],
    constraint_inc: [f64; 2],
}

impl ConstraintDbManager {
    pub fn new(trace_ids: bool, policy: CleaningPolicy) -> Self {
        let inc = policy.constraint_increment;
        ConstraintDbManager {
            trace_ids,
            policy,
            constraints: [ConstraintAllocator::new(trace_ids), ConstraintAllocator::new(trace_ids)],
            input_references: [Vec::new(), Vec::new()],
            learnt_references: [Vec::new(), Vec::new()],
            literal_occurrences: [HashMap::new(), HashMap::new()],
            constraint_inc: [inc, inc],
        }
    }

    pub fn policy(&self) -> &CleaningPolicy {
        &self.policy
    }

    pub fn view(&self, r: ConstraintRef, kind: ConstraintKind) -> Constraint {
        self.constraints[kind_index(kind)].view(r)
    }

    pub fn edit(&mut self, r: ConstraintRef, kind: ConstraintKind) -> ConstraintMut {
        self.constraints[kind_index(kind)].edit(r)
    }

    /// Same as `edit`; named separately for call sites in the propagator
    /// that specifically mean "I am about to rearrange watched literals".
    pub fn edit_for_watching(&mut self, r: ConstraintRef, kind: ConstraintKind) -> ConstraintMut {
        self.constraints[kind_index(kind)].edit(r)
    }

    pub fn is_marked(&self, r: ConstraintRef, kind: ConstraintKind) -> bool {
        self.constraints[kind_index(kind)].is_marked(r)
    }

    pub fn reloc(&mut self, r: ConstraintRef, kind: ConstraintKind, dst: &mut ConstraintAllocator) -> ConstraintRef {
        self.constraints[kind_index(kind)].reloc(r, dst)
    }

    pub fn garbage_fraction(&self, kind: ConstraintKind) -> f64 {
        self.constraints[kind_index(kind)].garbage_fraction()
    }

    pub fn input_references(&self, kind: ConstraintKind) -> &[ConstraintRef] {
        &self.input_references[kind_index(kind)]
    }

    pub fn learnt_references(&self, kind: ConstraintKind) -> &[ConstraintRef] {
        &self.learnt_references[kind_index(kind)]
    }

    /// The id a constraint added to `kind`'s arena right now would be
    /// stamped with; used to name the trace's terminal (never-stored) empty
    /// constraint without reserving a slot for it.
    pub fn next_trace_id(&self, kind: ConstraintKind) -> u32 {
        self.constraints[kind_index(kind)].peek_next_id()
    }

    pub fn literal_occurrences(&self, l: Lit, kind: ConstraintKind) -> &[ConstraintRef] {
        self.literal_occurrences[kind_index(kind)]
            .get(&l)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn add_constraint(&mut self, lits: &[Lit], kind: ConstraintKind, learnt: bool, tainted: bool, vd: &VariableDataStore) -> ConstraintRef {
        let i = kind_index(kind);
        let r = self.constraints[i].alloc(lits, learnt);
        if learnt {
            self.learnt_references[i].push(r);
            self.update_lbd(r, kind, vd);
            self.bump_activity(r, kind);
        } else {
            self.input_references[i].push(r);
            for &l in lits {
                self.literal_occurrences[i].entry(l).or_insert_with(Vec::new).push(r);
            }
        }
        self.edit(r, kind).set_tainted(tainted);
        r
    }

    pub fn update_lbd(&mut self, r: ConstraintRef, kind: ConstraintKind, vd: &VariableDataStore) {
        let mut seen = vec![false; vd.decision_level().0 + 1];
        let mut levels = 0u32;
        {
            let c = self.view(r, kind);
            for l in c.lits() {
                if vd.is_assigned(l.var()) {
                    let lvl = vd.level(l.var()).0;
                    if !seen[lvl] {
                        seen[lvl] = true;
                        levels += 1;
                    }
                }
            }
        }
        self.edit(r, kind).set_lbd(levels);
    }

    pub fn bump_activity(&mut self, r: ConstraintRef, kind: ConstraintKind) {
        let i = kind_index(kind);
        let inc = self.constraint_inc[i] as f32;
        let new_activity = {
            let mut c = self.edit(r, kind);
            let a = c.activity() + inc;
            c.set_activity(a);
            a
        };
        if new_activity > 1e30 {
            self.rescale_activity(kind);
        }
    }

    fn rescale_activity(&mut self, kind: ConstraintKind) {
        let i = kind_index(kind);
        let refs = self.learnt_references[i].clone();
        for r in refs {
            let mut c = self.edit(r, kind);
            let a = c.activity() * 1e-30;
            c.set_activity(a);
        }
        self.constraint_inc[i] *= 1e-30;
    }

    pub fn notify_conflict(&mut self, kind: ConstraintKind, vd: &mut VariableDataStore, propagator: &mut Propagator, stats: &mut Stats) {
        let i = kind_index(kind);
        self.constraint_inc[i] *= 1.0 / self.policy.constraint_activity_decay;
        if self.learnt_references[i].len() as u32 >= self.policy.learnts_max[i] {
            info!("reached learnt {} limit of {}", if kind == ConstraintKind::Term { "term" } else { "clause" }, self.policy.learnts_max[i]);
            self.policy.learnts_max[i] += self.policy.learnts_increment[i];
            self.clean(kind, vd, propagator, stats);
        }
    }

    fn is_locked(&self, r: ConstraintRef, kind: ConstraintKind, vd: &VariableDataStore) -> bool {
        use super::formula::assignment::Reason;
        let v = self.view(r, kind).lit_at(0).var();
        vd.is_assigned(v)
            && vd.kind(v) == kind.primary_kind()
            && matches!(vd.reason(v), Reason::Forced(k, rr) if k == kind && rr == r)
    }

    /// Sort learnt constraints by (LBD desc, activity asc) and mark the
    /// worst `removal_ratio` fraction (excluding locked/low-LBD ones) for
    /// deletion, then compact the arena.
    pub fn clean(&mut self, kind: ConstraintKind, vd: &mut VariableDataStore, propagator: &mut Propagator, stats: &mut Stats) {
        let i = kind_index(kind);
        {
            let ca = &self.constraints[i];
            self.learnt_references[i].sort_by(|&a, &b| {
                let ca_a = ca.view(a);
                let ca_b = ca.view(b);
                ca_b.lbd()
                    .cmp(&ca_a.lbd())
                    .then(ca_a.activity().partial_cmp(&ca_b.activity()).unwrap())
            });
        }
        let to_remove = (self.learnt_references[i].len() as f64 * self.policy.removal_ratio[i]) as u32;
        let threshold = self.constraint_inc[i] / (self.learnt_references[i].len().max(1) as f64);
        let mut removed = 0u32;
        let refs = self.learnt_references[i].clone();
        for r in refs {
            let (marked, lbd, activity) = {
                let c = self.view(r, kind);
                (c.is_marked(), c.lbd(), c.activity())
            };
            if marked {
                removed += 1;
            } else if !self.is_locked(r, kind, vd)
                && lbd > self.policy.lbd_threshold
                && (removed < to_remove || (self.policy.use_activity_threshold && (activity as f64) < threshold))
            {
                self.edit(r, kind).mark_for_deletion();
                let words_ref = r;
                self.constraints[i].free(words_ref);
                removed += 1;
            }
        }
        info!("removed {} learnt {}", removed, if kind == ConstraintKind::Term { "terms" } else { "clauses" });
        stats.cleanups += 1;
        self.compact(kind, vd, propagator);
        stats.compactions += 1;
    }

    /// Drop any tainted, un-antidoted learnt constraints and the most
    /// recent input constraint (the circuit output) upon enumeration of a
    /// new solution, per spec.md's "tainted constraint" edge case.
    pub fn clean_tainted_constraints(&mut self, kind: ConstraintKind, antidote: &[Lit]) {
        let i = kind_index(kind);
        if let Some(output_ref) = self.input_references[i].pop() {
            self.edit(output_ref, kind).mark_for_deletion();
            self.constraints[i].free(output_ref);
        }
        let mut sorted_antidote = antidote.to_vec();
        sorted_antidote.sort();
        let refs = self.learnt_references[i].clone();
        for r in refs {
            let (tainted, marked) = {
                let c = self.view(r, kind);
                (c.is_tainted(), c.is_marked())
            };
            if tainted && !marked {
                let has_antidote = self.view(r, kind).lits().any(|l| sorted_antidote.binary_search(&l).is_ok());
                if !has_antidote {
                    self.edit(r, kind).mark_for_deletion();
                    self.constraints[i].free(r);
                }
            }
        }
    }

    /// Relocate the arena for `kind` into a fresh, compacted allocator,
    /// updating the propagator's watch lists, the variable data store's
    /// reasons, and this database's own reference/occurrence lists.
    pub fn compact(&mut self, kind: ConstraintKind, vd: &mut VariableDataStore, propagator: &mut Propagator) {
        let i = kind_index(kind);
        let mut dst = ConstraintAllocator::new(self.trace_ids);

        propagator.reloc_constraint_references(kind, self, &mut dst);
        vd.relocate_reasons(|k, r| {
            if k == kind {
                self.constraints[i].reloc(r, &mut dst)
            } else {
                r
            }
        });
        self.relocate_own_references(kind, &mut dst);

        dst.move_to(&mut self.constraints[i]);
    }

    fn relocate_own_references(&mut self, kind: ConstraintKind, dst: &mut ConstraintAllocator) {
        let i = kind_index(kind);
        for (_, occ) in self.literal_occurrences[i].iter_mut() {
            let mut kept = Vec::with_capacity(occ.len());
            for &r in occ.iter() {
                if !self.constraints[i].is_marked(r) {
                    kept.push(self.constraints[i].reloc(r, dst));
                }
            }
            *occ = kept;
        }
        for r in self.input_references[i].iter_mut() {
            *r = self.constraints[i].reloc(*r, dst);
        }
        let mut kept = Vec::with_capacity(self.learnt_references[i].len());
        for &r in self.learnt_references[i].iter() {
            if !self.constraints[i].is_marked(r) {
                kept.push(self.constraints[i].reloc(r, dst));
            }
        }
        self.learnt_references[i] = kept;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qbf::formula::Var;

    #[test]
    fn input_constraint_records_literal_occurrences() {
        let vd = VariableDataStore::new();
        let mut db = ConstraintDbManager::new(false, CleaningPolicy::default());
        let ls = [Var(0).pos_lit(), Var(1).neg_lit()];
        let r = db.add_constraint(&ls, ConstraintKind::Clause, false, false, &vd);
        assert_eq!(db.literal_occurrences(Var(0).pos_lit(), ConstraintKind::Clause), &[r]);
    }

    #[test]
    fn learnt_constraint_gets_activity_bump() {
        let vd = VariableDataStore::new();
        let mut db = ConstraintDbManager::new(false, CleaningPolicy::default());
        let ls = [Var(0).pos_lit(), Var(1).neg_lit()];
        let r = db.add_constraint(&ls, ConstraintKind::Clause, true, false, &vd);
        assert!(db.view(r, ConstraintKind::Clause).activity() > 0.0);
    }
}
