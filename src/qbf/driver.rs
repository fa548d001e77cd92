//! The solver driver: owns every subsystem and runs the main QCDCL loop
//! (spec.md §4.10). Ported from the original Qute solver's `QCDCL_solver`
//! (`qcdcl.hh`/`.cc`), which plays the same "owns everything, passes itself
//! explicitly" role minisat-rust's `sat::minisat::Solver` does for plain
//! SAT.
//!
//! The loop itself stays deliberately close to spec.md's pseudocode: drain
//! propagation, and either make a decision or hand the falsified/satisfied
//! constraint to the learning engine, acting on whichever of its four
//! outcomes comes back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use super::constraint_db::ConstraintDbManager;
use super::dependency::{DependencyLearningStrategy, DependencyManager, OutOfOrderScope};
use super::formula::assignment::{DecisionLevel, Reason, VariableDataStore, GROUND_LEVEL};
use super::formula::constraint::ConstraintRef;
use super::heuristic::DecisionHeuristic;
use super::learn::{LearnOutcome, LearningEngine};
use super::model_gen::ModelGenerator;
use super::propagate::{Propagator, WatchScheme};
use super::restart::RestartScheduler;
use super::trace::TraceSink;
use super::{Answer, ConstraintKind, Lit, QuantKind, Stats, Var};

/// Result of a complete `solve()` run. `solutions` accumulates every
/// outermost-block certificate captured along the way: one entry for the
/// final answer (when the outer block belongs to the winning player), plus
/// one per intermediate model found while `--enumerate` is in effect.
pub struct SolveOutcome {
    pub answer: Option<Answer>,
    pub solutions: Vec<Vec<Lit>>,
}

/// Owns the dual clause/term constraint database, the dependency manager,
/// the watched-literal propagator, the learning engine, the decision
/// heuristic, the restart scheduler and the model generator, and drives
/// them through the CDCL/QCDCL search loop. A single instance is built once
/// per run by the front-end and `options`-constructed subsystems, then
/// driven to completion by `solve()`.
pub struct Solver {
    vd: VariableDataStore,
    dm: DependencyManager,
    db: ConstraintDbManager,
    propagator: Propagator,
    learning: LearningEngine,
    heuristic: DecisionHeuristic,
    restart: RestartScheduler,
    model_gen: ModelGenerator,
    stats: Stats,
    trace: Option<Box<dyn TraceSink>>,
    /// external (signed, 1-based) name of every variable, in add order.
    names: Vec<i32>,
    enumerate: bool,
    interrupted: Arc<AtomicBool>,
    deadline: Option<Instant>,
    solutions: Vec<Vec<Lit>>,
}

impl Solver {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        watch_scheme: WatchScheme,
        dependency_strategy: DependencyLearningStrategy,
        rrs_enabled: bool,
        ooo: OutOfOrderScope,
        cleaning_policy: super::constraint_db::CleaningPolicy,
        heuristic: DecisionHeuristic,
        restart: RestartScheduler,
        model_gen: ModelGenerator,
        trace_ids: bool,
        trace: Option<Box<dyn TraceSink>>,
        enumerate: bool,
        deadline: Option<Instant>,
    ) -> Self {
        Solver {
            vd: VariableDataStore::new(),
            dm: DependencyManager::new(dependency_strategy, rrs_enabled, ooo),
            db: ConstraintDbManager::new(trace_ids, cleaning_policy),
            propagator: Propagator::new(watch_scheme),
            learning: LearningEngine::new(),
            heuristic,
            restart,
            model_gen,
            stats: Stats::default(),
            trace,
            names: Vec::new(),
            enumerate,
            interrupted: Arc::new(AtomicBool::new(false)),
            deadline,
            solutions: Vec::new(),
        }
    }

    // -- front-end loading API --------------------------------------------

    /// Add a variable to every subsystem that needs to track one.
    /// `external_name` is the positive QDIMACS/QCIR name the trace and
    /// partial-certificate output report it under.
    pub fn add_variable(&mut self, kind: QuantKind, auxiliary: bool, block: usize, external_name: i32) -> Var {
        let v = self.vd.add_variable(kind, auxiliary, block);
        self.dm.add_variable(auxiliary);
        self.propagator.add_variable();
        self.heuristic.add_variable(v, auxiliary);
        self.names.push(external_name);
        v
    }

    pub fn add_dependency(&mut self, of: Var, on: Var) {
        self.dm.add_dependency(of, on, &self.vd);
    }

    pub fn mark_permanently_ineligible(&mut self, v: Var) {
        self.dm.mark_permanently_ineligible(v);
    }

    pub fn set_occurrences(&mut self, v: Var, count: u32) {
        self.heuristic.set_occurrences(v, count);
    }

    /// Swap in a weighted model generator once every variable has been
    /// loaded: `ModelGenerator::weighted` precomputes per-variable weights
    /// from the final prefix, so it cannot be built at `Solver::new` time
    /// (before the front-end has added any variable at all).
    pub fn use_weighted_model_generator(&mut self, settings: super::model_gen::WeightedSettings) {
        self.model_gen = ModelGenerator::weighted(settings, &self.vd);
    }

    pub fn add_input_clause(&mut self, lits: &[Lit]) -> ConstraintRef {
        self.add_input_constraint(lits, ConstraintKind::Clause, false)
    }

    pub fn add_input_term(&mut self, lits: &[Lit], tainted: bool) -> ConstraintRef {
        self.add_input_constraint(lits, ConstraintKind::Term, tainted)
    }

    /// Call once, after every variable, dependency and input constraint has
    /// been loaded and before the first `solve()`: seeds VSIDS tie-break
    /// occurrence counts and primes every subsystem's initial
    /// decision-candidate queues.
    pub fn finish_loading(&mut self) {
        self.heuristic.notify_start();
        for i in 0..self.vd.number_of_vars() {
            let v = Var::from_index(i);
            let count = self.db.literal_occurrences(v.pos_lit(), ConstraintKind::Clause).len()
                + self.db.literal_occurrences(v.neg_lit(), ConstraintKind::Clause).len();
            self.heuristic.set_occurrences(v, count as u32);
            if self.dm.is_decision_candidate(v, &self.vd) {
                self.heuristic.notify_eligible(v, &self.vd);
            }
        }
    }

    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        self.interrupted.clone()
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn reduced_last(&self) -> &[Lit] {
        self.learning.reduced_last()
    }

    pub fn name_of(&self, v: Var) -> i32 {
        self.names[v.index()]
    }

    pub fn outermost_block_kind(&self) -> Option<QuantKind> {
        if self.vd.number_of_blocks() == 0 {
            None
        } else {
            Some(self.vd.block_kind(0))
        }
    }

    // -- main loop ---------------------------------------------------------

    /// Run the search to completion: `spec.md §4.10`'s `propagate` /
    /// `decide` / `learn` loop, stopping early (with `answer: None`) if
    /// interrupted or past the wall-clock deadline.
    pub fn solve(&mut self) -> SolveOutcome {
        loop {
            if self.is_interrupted() {
                return SolveOutcome { answer: None, solutions: self.solutions.clone() };
            }

            let conflict = self.propagator.propagate(&mut self.db, &mut self.vd, &self.dm);
            self.drain_notifications();

            match conflict {
                Some((kind, r)) => {
                    if let Some(answer) = self.handle_conflict(kind, r) {
                        return SolveOutcome { answer: Some(answer), solutions: self.solutions.clone() };
                    }
                }
                None => {
                    if self.vd.all_assigned() {
                        let r = self.synthesize_initial_term();
                        if let Some(answer) = self.handle_conflict(ConstraintKind::Term, r) {
                            return SolveOutcome { answer: Some(answer), solutions: self.solutions.clone() };
                        }
                    } else {
                        match self.heuristic.get_decision_literal(&self.dm, &self.vd) {
                            Some(lit) => {
                                self.stats.decisions += 1;
                                self.vd.new_decision_level();
                                self.vd.assign(lit, Reason::Decision);
                                self.propagator.notify_assigned(lit);
                            }
                            None => {
                                // Every variable is either assigned or blocked on a
                                // dependency that can never resolve; the all_assigned
                                // branch above should always fire first in practice.
                                return SolveOutcome { answer: None, solutions: self.solutions.clone() };
                            }
                        }
                    }
                }
            }
        }
    }

    fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Relaxed) || self.deadline.map_or(false, |d| Instant::now() >= d)
    }

    /// Apply every notification owed to literals assigned since the last
    /// call: phase saving, dependency-watcher advancement and newly-eligible
    /// decision candidates. Kept as one post-`propagate` sweep (using
    /// `VariableDataStore`'s `qhead`) rather than notifying inline at every
    /// assignment site, since most assignments happen deep inside the
    /// propagator's own watcher bookkeeping.
    fn drain_notifications(&mut self) {
        while let Some(lit) = self.vd.dequeue() {
            self.heuristic.notify_assigned(lit);
            let ready = self.dm.notify_assigned(lit.var(), &self.vd);
            for v in ready {
                self.heuristic.notify_eligible(v, &self.vd);
            }
        }
    }

    /// spec.md §4.10's `learn` step and everything it triggers: adding the
    /// derived constraint, notifying the heuristic/restart scheduler,
    /// backtracking, and (for enumeration) re-seeding the search with a
    /// blocking constraint. Returns `Some(answer)` only when the search is
    /// actually done.
    fn handle_conflict(&mut self, kind: ConstraintKind, r: ConstraintRef) -> Option<Answer> {
        self.stats.conflicts += 1;
        let outcome = self.learning.analyze(r, kind, &self.db, &self.vd, &self.dm, &mut self.stats);

        let terminal = match outcome {
            LearnOutcome::Solved { premises } => {
                let answer = Answer::of_constraint_kind(kind);
                self.capture_certificate_if_applicable(answer);
                if self.enumerate && kind == ConstraintKind::Term {
                    self.add_blocking_constraint(kind);
                    self.backtrack_to(GROUND_LEVEL);
                    None
                } else {
                    self.emit_trace_terminal(kind, &premises);
                    Some(answer)
                }
            }
            LearnOutcome::Unit { lits, backtrack_level, propagate_lit, premises } => {
                self.stats.backtracks_total += 1;
                let tainted = premises.iter().any(|&p| self.db.view(p, kind).is_tainted());
                self.backtrack_to(backtrack_level);
                let r_new = self.add_learnt_constraint(&lits, kind, tainted, &premises);
                self.heuristic.notify_learned(kind, &self.vd, &lits);
                let lbd = self.db.view(r_new, kind).lbd();
                self.restart.notify_learned(lbd);
                self.vd.assign(propagate_lit, Reason::Forced(kind, r_new));
                self.stats.propagations += 1;
                self.propagator.notify_assigned(propagate_lit);
                None
            }
            LearnOutcome::NotUnit { lits, backtrack_level, culprit, premises } => {
                self.stats.backtracks_total += 1;
                let tainted = premises.iter().any(|&p| self.db.view(p, kind).is_tainted());
                self.backtrack_to(backtrack_level);
                let r_new = self.add_learnt_constraint(&lits, kind, tainted, &premises);
                self.heuristic.notify_learned(kind, &self.vd, &lits);
                let lbd = self.db.view(r_new, kind).lbd();
                self.restart.notify_learned(lbd);
                self.dm.set_ineligible(culprit, backtrack_level);
                None
            }
            LearnOutcome::Dependencies { culprit, clashing, backtrack_level } => {
                self.stats.backtracks_dependency += 1;
                self.stats.backtracks_total += 1;
                self.dm.learn_dependencies(culprit, &clashing, &self.vd);
                self.backtrack_to(backtrack_level);
                None
            }
        };

        self.db.notify_conflict(kind, &mut self.vd, &mut self.propagator, &mut self.stats);
        self.heuristic.notify_conflict(kind);
        self.restart.notify_conflict(kind);
        if terminal.is_none() && self.restart.should_restart() {
            self.stats.restarts += 1;
            self.backtrack_to(GROUND_LEVEL);
        }
        terminal
    }

    /// spec.md §4.5: once every variable is assigned with no falsified
    /// clause, ask the model generator for an initial satisfying term,
    /// install it as a (to-be-deleted) learnt term, and hand it to the
    /// learning engine exactly like a conflict -- the universal reduction
    /// and trail walk are the same code, dualized by `ConstraintKind`.
    fn synthesize_initial_term(&mut self) -> ConstraintRef {
        let model = self.model_gen.generate(&self.db, &self.vd);
        self.stats.note_initial_term_size(model.len());
        let r = self.db.add_constraint(&model, ConstraintKind::Term, true, false, &self.vd);
        self.db.edit(r, ConstraintKind::Term).mark_for_deletion();
        self.propagator.add_constraint(&mut self.db, &self.vd, &self.dm, r, ConstraintKind::Term);
        self.emit_trace(r, ConstraintKind::Term, &[]);
        r
    }

    /// Undo the trail back to (but not past) `level`, notifying the
    /// dependency manager and decision heuristic of each unassignment in
    /// trail order, then resetting the propagator's queue and the
    /// dependency manager's AET stack.
    fn backtrack_to(&mut self, level: DecisionLevel) {
        self.heuristic.notify_backtrack(self.vd.decision_level().0);
        while self.vd.decision_level() > level {
            let start = self.vd.pop_decision_level();
            let dm = &mut self.dm;
            let heuristic = &mut self.heuristic;
            while self.vd.trail_len() > start {
                self.vd.undo_last(|l| {
                    dm.notify_unassigned(l.var());
                    heuristic.notify_unassigned(l);
                });
            }
        }
        self.vd.pending_from(self.vd.trail_len());
        self.propagator.notify_backtrack();
        self.dm.restore_eligibility_before(level);
    }

    /// spec.md §6 "Enumeration": block the just-found solution's outermost
    /// block from recurring by asserting the negation of its assignment as
    /// an input constraint on the dual side, dropping the previous such
    /// constraint (and any tainted learnts it alone justified) first.
    fn add_blocking_constraint(&mut self, solved_kind: ConstraintKind) {
        let dual = solved_kind.dual();
        let blocking_lits: Vec<Lit> = self.vd.outermost_block_vars().into_iter().map(|v| v.lit(!self.vd.polarity(v))).collect();
        self.db.clean_tainted_constraints(dual, &blocking_lits);
        self.add_input_constraint(&blocking_lits, dual, false);
    }

    /// spec.md §6 "partial certificate": record the outermost block's
    /// current assignment when (and only when) that block belongs to the
    /// player who just won, since only their assignment is a guaranteed
    /// witness of the answer.
    fn capture_certificate_if_applicable(&mut self, answer: Answer) {
        let winning_kind = match answer {
            Answer::Sat => QuantKind::Existential,
            Answer::Unsat => QuantKind::Universal,
        };
        if self.vd.number_of_blocks() > 0 && self.vd.block_kind(0) == winning_kind {
            let cert: Vec<Lit> = self.vd.outermost_block_vars().into_iter().map(|v| v.lit(self.vd.polarity(v))).collect();
            self.solutions.push(cert);
        }
    }

    fn add_input_constraint(&mut self, lits: &[Lit], kind: ConstraintKind, tainted: bool) -> ConstraintRef {
        let r = self.db.add_constraint(lits, kind, false, tainted, &self.vd);
        self.propagator.add_constraint(&mut self.db, &self.vd, &self.dm, r, kind);
        self.emit_trace(r, kind, &[]);
        r
    }

    fn add_learnt_constraint(&mut self, lits: &[Lit], kind: ConstraintKind, tainted: bool, premises: &[ConstraintRef]) -> ConstraintRef {
        let r = self.db.add_constraint(lits, kind, true, tainted, &self.vd);
        self.propagator.add_constraint(&mut self.db, &self.vd, &self.dm, r, kind);
        self.emit_trace(r, kind, premises);
        r
    }

    fn emit_trace(&mut self, r: ConstraintRef, kind: ConstraintKind, premises: &[ConstraintRef]) {
        if self.trace.is_none() {
            return;
        }
        let id = match self.db.view(r, kind).trace_id() {
            Some(id) => id,
            None => return,
        };
        let premise_ids: Vec<u32> = premises.iter().filter_map(|&p| self.db.view(p, kind).trace_id()).collect();
        let lits: Vec<Lit> = self.db.view(r, kind).lits().collect();
        let names = &self.names;
        let name_of = move |v: Var| names[v.index()];
        if let Some(sink) = self.trace.as_mut() {
            sink.emit(id, kind, &lits, &premise_ids, &name_of);
        }
    }

    /// Emit the resolution proof's terminal (empty) constraint, naming it
    /// with the id its kind's arena would stamp next without actually
    /// allocating it.
    fn emit_trace_terminal(&mut self, kind: ConstraintKind, premises: &[ConstraintRef]) {
        if self.trace.is_none() {
            return;
        }
        let id = self.db.next_trace_id(kind);
        let premise_ids: Vec<u32> = premises.iter().filter_map(|&p| self.db.view(p, kind).trace_id()).collect();
        let names = &self.names;
        let name_of = move |v: Var| names[v.index()];
        if let Some(sink) = self.trace.as_mut() {
            sink.emit(id, kind, &[], &premise_ids, &name_of);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qbf::heuristic::{DecisionHeuristic, PhaseHeuristic};

    fn solver(enumerate: bool) -> Solver {
        Solver::new(
            WatchScheme::TwoWatch,
            DependencyLearningStrategy::All,
            false,
            OutOfOrderScope::none(),
            Default::default(),
            DecisionHeuristic::vmtf(PhaseHeuristic::False, 12345.0, false),
            RestartScheduler::none(),
            ModelGenerator::simple(),
            false,
            None,
            enumerate,
            None,
        )
    }

    /// spec.md §8 scenario 1: `p cnf 2 1 / a 1 0 / e 2 0 / 1 2 0` is SAT
    /// (the universal is outermost, so no certificate is expected).
    #[test]
    fn outer_universal_sat_instance_solves() {
        let mut s = solver(false);
        let a1 = s.add_variable(QuantKind::Universal, false, 0, 1);
        let e2 = s.add_variable(QuantKind::Existential, false, 1, 2);
        s.add_dependency(e2, a1);
        s.add_input_clause(&[a1.pos_lit(), e2.pos_lit()]);
        s.finish_loading();

        let outcome = s.solve();
        assert_eq!(outcome.answer, Some(Answer::Sat));
    }

    /// spec.md §8 scenario 2: `p cnf 2 2 / e 1 0 / a 2 0 / 1 2 0 / -1 2 0`
    /// is UNSAT.
    #[test]
    fn outer_existential_unsat_instance_solves() {
        let mut s = solver(false);
        let e1 = s.add_variable(QuantKind::Existential, false, 0, 1);
        let a2 = s.add_variable(QuantKind::Universal, false, 1, 2);
        s.add_dependency(a2, e1);
        s.add_input_clause(&[e1.pos_lit(), a2.pos_lit()]);
        s.add_input_clause(&[e1.neg_lit(), a2.pos_lit()]);
        s.finish_loading();

        let outcome = s.solve();
        assert_eq!(outcome.answer, Some(Answer::Unsat));
    }

    /// spec.md §8 scenario 3 (existential-outer variant): a partial
    /// certificate is captured because the winning (existential) player is
    /// outermost.
    #[test]
    fn outer_existential_sat_instance_captures_certificate() {
        let mut s = solver(false);
        let e1 = s.add_variable(QuantKind::Existential, false, 0, 1);
        let a2 = s.add_variable(QuantKind::Universal, false, 1, 2);
        s.add_dependency(a2, e1);
        s.add_input_clause(&[e1.pos_lit(), a2.pos_lit()]);
        s.add_input_clause(&[e1.neg_lit(), a2.neg_lit()]);
        s.finish_loading();

        let outcome = s.solve();
        assert_eq!(outcome.answer, Some(Answer::Sat));
        assert_eq!(outcome.solutions.len(), 1);
    }
}
