//! Q-resolution based conflict (and solution) analysis: resolves the
//! falsified/disabled constraint against propagation reasons along the
//! trail, universally (resp. existentially, for terms) reducing after every
//! resolution step, and detecting illegal merges that trigger dependency
//! learning instead of a resolution step. Ported from the original Qute
//! solver's `StandardLearningEngine` (`standard_learning_engine.cc`/`.hh`).
//!
//! The "clause" description in spec.md §4.6 is implemented generically over
//! `ConstraintKind`: primary/secondary and the disabling polarity are asked
//! of `kind`, so the term side (universal reduction becomes existential
//! reduction, with every polarity flipped) falls out of the same code.

use std::collections::HashSet;

use super::constraint_db::ConstraintDbManager;
use super::dependency::DependencyManager;
use super::formula::assignment::{DecisionLevel, Reason, VariableDataStore, GROUND_LEVEL};
use super::formula::constraint::ConstraintRef;
use super::{ConstraintKind, Lit, Stats, Var};

/// Outcome of one call to `analyze`.
pub enum LearnOutcome {
    /// The characteristic function emptied out: the formula is decided in
    /// `kind`'s favour (spec.md §4.6 step 3). `premises` are every
    /// constraint resolved against on the way, oldest first, for the trace.
    Solved { premises: Vec<ConstraintRef> },
    /// An asserting constraint: unit on `propagate_lit` once backtracked to
    /// `backtrack_level`.
    Unit {
        lits: Vec<Lit>,
        backtrack_level: DecisionLevel,
        propagate_lit: Lit,
        premises: Vec<ConstraintRef>,
    },
    /// A pseudo-asserting constraint, learned when the popped literal was an
    /// out-of-order decision rather than a propagated one. `culprit` is that
    /// decided variable, so the caller can bar it from being picked
    /// out-of-order again until the backtrack below `backtrack_level`.
    NotUnit {
        lits: Vec<Lit>,
        backtrack_level: DecisionLevel,
        culprit: Var,
        premises: Vec<ConstraintRef>,
    },
    /// An illegal merge was found: `culprit` must learn a dependency on
    /// (some subset of) `clashing`) before the search can continue.
    Dependencies { culprit: Var, clashing: Vec<Lit>, backtrack_level: DecisionLevel },
}

pub struct LearningEngine {
    reduced_last: Vec<Lit>,
}

impl LearningEngine {
    pub fn new() -> Self {
        LearningEngine { reduced_last: Vec::new() }
    }

    /// The universally/existentially reduced tail of the most recently
    /// derived asserting constraint, exposed for partial-certificate
    /// construction (spec.md §4.6, "reduced-last record").
    pub fn reduced_last(&self) -> &[Lit] {
        &self.reduced_last
    }

    /// Resolve the conflict/solution constraint `conflict_ref` of kind
    /// `kind` against propagation reasons along the trail.
    pub fn analyze(
        &mut self,
        conflict_ref: ConstraintRef,
        kind: ConstraintKind,
        db: &ConstraintDbManager,
        vd: &VariableDataStore,
        dm: &DependencyManager,
        stats: &mut Stats,
    ) -> LearnOutcome {
        self.reduced_last.clear();
        let primary_kind = kind.primary_kind();
        let mut premises: Vec<ConstraintRef> = vec![conflict_ref];

        let mut cf: HashSet<Lit> = db.view(conflict_ref, kind).lits().collect();
        self.reduce_generic(&mut cf, vd, dm, primary_kind);

        let mut trail_cursor = vd.trail_len();
        loop {
            // Pop the most recently assigned primary variable still in `cf`.
            let pivot_var = loop {
                if trail_cursor == 0 {
                    return LearnOutcome::Solved { premises };
                }
                trail_cursor -= 1;
                let t = vd.trail()[trail_cursor];
                let v = t.var();
                if vd.kind(v) != primary_kind {
                    continue;
                }
                let lit_in_cf = v.lit(!t.sign());
                if cf.contains(&lit_in_cf) {
                    break v;
                }
            };
            let level = vd.level(pivot_var);
            let pivot_cf_lit = pivot_var.lit(!vd.polarity(pivot_var));
            cf.remove(&pivot_cf_lit);

            let primaries_left_at_level = cf
                .iter()
                .filter(|l| vd.kind(l.var()) == primary_kind && vd.level(l.var()) == level)
                .count();
            let level_is_primary_level = level > GROUND_LEVEL && vd.decision_level_type(level.0) == primary_kind;

            let deps_ok = {
                let mut ok = true;
                for &on in self.secondary_deps_of(pivot_var, dm, vd) {
                    let unassigned_or_lower = !vd.is_assigned(on) || vd.level(on) < level;
                    let still_in_cf = cf.contains(&on.lit(false)) || cf.contains(&on.lit(true));
                    if !(unassigned_or_lower || still_in_cf) {
                        ok = false;
                        break;
                    }
                }
                ok
            };

            if primaries_left_at_level == 0 && level_is_primary_level && deps_ok {
                let propagate_lit = pivot_var.lit(vd.polarity(pivot_var));
                let mut lits: Vec<Lit> = cf.iter().copied().collect();
                lits.push(propagate_lit);
                let backtrack_level = second_highest_level(&lits, vd, propagate_lit);
                stats.learned_total[super::kind_index(kind)] += 1;
                stats.learned_asserting[super::kind_index(kind)] += 1;
                return LearnOutcome::Unit {
                    lits,
                    backtrack_level: DecisionLevel(backtrack_level),
                    propagate_lit,
                    premises,
                };
            }

            if matches!(vd.reason(pivot_var), Reason::Decision) {
                let pivot_lit = pivot_var.lit(vd.polarity(pivot_var));
                let mut lits: Vec<Lit> = cf.iter().copied().collect();
                lits.push(pivot_lit);
                let backtrack_level = highest_remaining_level(&cf, vd);
                stats.learned_total[super::kind_index(kind)] += 1;
                return LearnOutcome::NotUnit {
                    lits,
                    backtrack_level: DecisionLevel(backtrack_level),
                    culprit: pivot_var,
                    premises,
                };
            }

            let (reason_kind, reason_ref) = match vd.reason(pivot_var) {
                Reason::Forced(k, r) => (k, r),
                Reason::Decision => unreachable!(),
            };
            premises.push(reason_ref);
            let mut clashing: Vec<Lit> = Vec::new();
            {
                let reason_c = db.view(reason_ref, reason_kind);
                for l in reason_c.lits() {
                    if l.var() == pivot_var {
                        continue;
                    }
                    if vd.kind(l.var()) != primary_kind && cf.contains(&!l) {
                        clashing.push(!l);
                    }
                    cf.insert(l);
                }
            }

            if cf.iter().any(|l| cf.contains(&!l) && vd.kind(l.var()) != primary_kind) {
                stats.learned_tautological[super::kind_index(kind)] += 1;
            }

            self.reduce_generic(&mut cf, vd, dm, primary_kind);

            if !clashing.is_empty() {
                if dm.rrs_enabled() {
                    dm.filter_independent_variables(pivot_var, &mut clashing);
                }
                if !clashing.is_empty() {
                    stats.dependencies_learned += 1;
                    let backtrack_level = level;
                    return LearnOutcome::Dependencies { culprit: pivot_var, clashing, backtrack_level };
                }
            }
        }
    }

    /// Opposite-kind variables `v` formally depends on (spec.md §4.3);
    /// scanned directly rather than cached since it is only needed once per
    /// pivot pop.
    fn secondary_deps_of(&self, v: Var, dm: &DependencyManager, vd: &VariableDataStore) -> Vec<Var> {
        (0..vd.number_of_vars())
            .map(Var::from_index)
            .filter(|&w| vd.kind(w) != vd.kind(v) && dm.depends_on(v, w))
            .collect()
    }

    fn reduce_generic(&mut self, cf: &mut HashSet<Lit>, vd: &VariableDataStore, dm: &DependencyManager, primary_kind: super::QuantKind) {
        let primary_vars: Vec<Var> = cf.iter().filter(|l| vd.kind(l.var()) == primary_kind).map(|l| l.var()).collect();
        let mut to_drop = Vec::new();
        for &l in cf.iter() {
            if vd.kind(l.var()) != primary_kind {
                let depended_upon = primary_vars.iter().any(|&p| dm.depends_on(p, l.var()));
                if !depended_upon {
                    to_drop.push(l);
                }
            }
        }
        for l in to_drop {
            cf.remove(&l);
            self.reduced_last.push(l);
        }
    }
}

/// The level to backtrack to before asserting `exclude`: the highest level
/// among the constraint's other literals, or ground level for a unit clause.
fn second_highest_level(lits: &[Lit], vd: &VariableDataStore, exclude: Lit) -> usize {
    lits.iter().filter(|&&l| l != exclude).map(|l| vd.level(l.var()).0).max().unwrap_or(0)
}

fn highest_remaining_level(cf: &HashSet<Lit>, vd: &VariableDataStore) -> usize {
    cf.iter().map(|l| vd.level(l.var()).0).max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qbf::dependency::{DependencyLearningStrategy, DependencyManager, OutOfOrderScope};
    use crate::qbf::formula::assignment::Reason;
    use crate::qbf::QuantKind;

    #[test]
    fn resolving_a_unit_propagation_chain_yields_an_asserting_unit_clause() {
        let mut vd = VariableDataStore::new();
        let mut dm = DependencyManager::new(DependencyLearningStrategy::All, false, OutOfOrderScope::none());
        let mut db = ConstraintDbManager::new(false, Default::default());

        let e1 = vd.add_variable(QuantKind::Existential, false, 0);
        let e2 = vd.add_variable(QuantKind::Existential, false, 0);
        dm.add_variable(false);
        dm.add_variable(false);

        vd.new_decision_level();
        vd.assign(e1.pos_lit(), Reason::Decision);
        let c1 = db.add_constraint(&[e1.neg_lit(), e2.pos_lit()], ConstraintKind::Clause, false, false, &vd);
        vd.assign(e2.pos_lit(), Reason::Forced(ConstraintKind::Clause, c1));

        let conflict = db.add_constraint(&[e1.neg_lit(), e2.neg_lit()], ConstraintKind::Clause, false, false, &vd);

        let mut engine = LearningEngine::new();
        let mut stats = Stats::default();
        match engine.analyze(conflict, ConstraintKind::Clause, &db, &vd, &dm, &mut stats) {
            LearnOutcome::Unit { lits, backtrack_level, propagate_lit, premises } => {
                assert_eq!(lits, vec![e1.pos_lit()]);
                assert_eq!(backtrack_level, GROUND_LEVEL);
                assert_eq!(propagate_lit, e1.pos_lit());
                assert_eq!(premises, vec![conflict, c1]);
            }
            _ => panic!("expected an asserting unit clause"),
        }
        assert_eq!(stats.learned_total[crate::qbf::kind_index(ConstraintKind::Clause)], 1);
    }
}
