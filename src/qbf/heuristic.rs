//! Decision heuristics. Ported from the original Qute solver's
//! `DecisionHeuristic*` family: `decision_heuristic.hh` (shared phase
//! selection), `decision_heuristic_VMTF_deplearn.{hh,cc}` (global VMTF list),
//! `decision_heuristic_VSIDS_deplearn.{hh,cc}` (activity heap) and
//! `decision_heuristic_SGDB.{hh,cc}` (logistic-regression heuristic). The
//! priority-queue plumbing mirrors `sat::minisat::search::decision_heuristic`
//! in minisat-rust, generalized from a single `VarHeap` to the two
//! independently-ordered queues QBF needs for VSIDS/SGDB (one per
//! quantifier kind is unnecessary for VMTF, whose single timestamp order
//! already spans both).

use super::dependency::DependencyManager;
use super::formula::assignment::VariableDataStore;
use super::formula::index_map::{VarHeap, VarVec};
use super::{ConstraintKind, Lit, QuantKind, Var};
use crate::util::Random;

/// `--phase` option value (spec.md §4.7).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhaseHeuristic {
    InvJeroslowWang,
    Qtype,
    Watcher,
    Random,
    True,
    False,
}

struct PhaseSelector {
    heuristic: PhaseHeuristic,
    rand: Random,
}

impl PhaseSelector {
    fn new(heuristic: PhaseHeuristic, seed: f64) -> Self {
        PhaseSelector { heuristic, rand: Random::new(seed) }
    }

    /// Only consulted when `v` has no saved phase (or phase saving is off).
    fn select(&mut self, v: Var, vd: &VariableDataStore) -> bool {
        match self.heuristic {
            PhaseHeuristic::True => false,
            PhaseHeuristic::False => true,
            PhaseHeuristic::Random => self.rand.chance(0.5),
            // Existentials default to false (try to satisfy), universals to
            // true (try to falsify) absent a more specific signal -- qtype's
            // namesake behaviour.
            PhaseHeuristic::Qtype => vd.kind(v) == QuantKind::Universal,
            // invJW/watcher need literal-occurrence data this module doesn't
            // own; fall back to qtype's prefix-based default.
            PhaseHeuristic::InvJeroslowWang | PhaseHeuristic::Watcher => vd.kind(v) == QuantKind::Universal,
        }
    }
}

// ---------------------------------------------------------------------
// VMTF
// ---------------------------------------------------------------------

#[derive(Clone, Copy)]
struct ListEntry {
    prev: Var,
    next: Var,
    timestamp: u32,
}

/// Single global variable-move-to-front list (spec.md §4.7 "VMTF with
/// dependency learning: a single global list").
struct Vmtf {
    list: Vec<ListEntry>,
    list_head: Option<Var>,
    next_search: Option<Var>,
    timestamp: u32,
    is_auxiliary: Vec<bool>,
}

impl Vmtf {
    fn new() -> Self {
        Vmtf { list: Vec::new(), list_head: None, next_search: None, timestamp: 0, is_auxiliary: Vec::new() }
    }

    fn add_variable(&mut self, v: Var, auxiliary: bool) {
        self.list.push(ListEntry { prev: v, next: v, timestamp: 0 });
        self.is_auxiliary.push(auxiliary);
        match self.list_head {
            None => {
                self.list_head = Some(v);
                self.next_search = Some(v);
            }
            Some(head) => self.link_front(v, head),
        }
    }

    fn link_front(&mut self, v: Var, head: Var) {
        let tail = self.list[head.index()].prev;
        self.list[v.index()].prev = tail;
        self.list[v.index()].next = head;
        self.list[tail.index()].next = v;
        self.list[head.index()].prev = v;
        self.list_head = Some(v);
    }

    fn unlink(&mut self, v: Var) {
        let (prev, next) = (self.list[v.index()].prev, self.list[v.index()].next);
        if prev == v {
            // v was the only element; leave the singleton list in place.
            return;
        }
        self.list[prev.index()].next = next;
        self.list[next.index()].prev = prev;
        if self.list_head == Some(v) {
            self.list_head = Some(next);
        }
    }

    fn move_to_front(&mut self, v: Var) {
        if self.list_head == Some(v) {
            return;
        }
        self.unlink(v);
        let head = self.list_head.expect("list non-empty");
        self.link_front(v, head);
    }

    /// Called once at search start: assigns increasing timestamps walking
    /// the list from the tail forward, so `move_to_front` candidates always
    /// compare greater than anything not yet touched.
    fn notify_start(&mut self) {
        if let Some(head) = self.list_head {
            let mut v = self.list[head.index()].prev;
            loop {
                self.list[v.index()].timestamp = self.timestamp;
                self.timestamp += 1;
                if v == head {
                    break;
                }
                v = self.list[v.index()].prev;
            }
        }
    }

    fn notify_learned(&mut self, vd: &VariableDataStore, lits: impl Iterator<Item = Lit>) {
        for l in lits {
            let v = l.var();
            if vd.is_assigned(v) && !self.is_auxiliary[v.index()] {
                self.move_to_front(v);
            }
        }
    }

    /// After `v` is unassigned, restore it as a search candidate if its
    /// timestamp exceeds the current search pointer's.
    fn notify_unassigned(&mut self, v: Var) {
        if let Some(ns) = self.next_search {
            if self.list[v.index()].timestamp > self.list[ns.index()].timestamp {
                self.next_search = Some(v);
            }
        }
    }

    fn get_decision_variable(&mut self, dm: &DependencyManager, vd: &VariableDataStore) -> Option<Var> {
        let head = self.list_head?;
        let mut v = self.next_search?;
        loop {
            if !self.is_auxiliary[v.index()] && dm.is_decision_candidate(v, vd) {
                self.next_search = Some(self.list[v.index()].prev);
                return Some(v);
            }
            if v == head {
                return None;
            }
            v = self.list[v.index()].prev;
        }
    }
}

// ---------------------------------------------------------------------
// VSIDS
// ---------------------------------------------------------------------

#[derive(Clone, Copy, Debug)]
pub struct VsidsSettings {
    pub score_decay_factor: f64,
    pub score_increment: f64,
    pub tiebreak_by_occurrences: bool,
    pub prefer_fewer_occurrences: bool,
}

impl Default for VsidsSettings {
    fn default() -> Self {
        VsidsSettings {
            score_decay_factor: 0.95,
            score_increment: 1.0,
            tiebreak_by_occurrences: false,
            prefer_fewer_occurrences: false,
        }
    }
}

/// Per-variable activity with a decay-and-rescale scheme identical to
/// minisat-rust's, tie-broken by a precomputed literal-occurrence count
/// (spec.md §4.7: "Tie-breaks by number of primary or secondary occurrences").
struct Vsids {
    settings: VsidsSettings,
    score: VarVec<f64>,
    occurrences: VarVec<u32>,
    increment: f64,
    queue: VarHeap,
    is_auxiliary: Vec<bool>,
}

impl Vsids {
    fn new(settings: VsidsSettings) -> Self {
        let increment = settings.score_increment;
        Vsids {
            settings,
            score: VarVec::new(),
            occurrences: VarVec::new(),
            increment,
            queue: VarHeap::new(),
            is_auxiliary: Vec::new(),
        }
    }

    fn add_variable(&mut self, v: Var, auxiliary: bool) {
        self.score.init(v);
        self.occurrences.init(v);
        self.is_auxiliary.push(auxiliary);
    }

    fn set_occurrences(&mut self, v: Var, count: u32) {
        self.occurrences[v] = count;
    }

    fn before(&self, a: &Var, b: &Var) -> bool {
        let (sa, sb) = (self.score[*a], self.score[*b]);
        if sa != sb {
            return sa > sb;
        }
        if !self.settings.tiebreak_by_occurrences {
            return false;
        }
        if self.settings.prefer_fewer_occurrences {
            self.occurrences[*a] < self.occurrences[*b]
        } else {
            self.occurrences[*a] > self.occurrences[*b]
        }
    }

    fn notify_eligible(&mut self, v: Var) {
        if !self.is_auxiliary[v.index()] && !self.queue.contains(&v) {
            let score = &self.score;
            let occurrences = &self.occurrences;
            let settings = &self.settings;
            self.queue.insert(v, |a, b| cmp(score, occurrences, settings, a, b));
        }
    }

    fn bump(&mut self, v: Var) {
        self.score[v] += self.increment;
        if self.score[v] > 1e100 {
            self.rescale();
        }
        if self.queue.contains(&v) {
            let score = &self.score;
            let occurrences = &self.occurrences;
            let settings = &self.settings;
            self.queue.update(&v, |a, b| cmp(score, occurrences, settings, a, b));
        }
    }

    fn rescale(&mut self) {
        for x in self.score.iter_mut() {
            *x *= 1e-100;
        }
        self.increment *= 1e-100;
    }

    fn decay(&mut self) {
        self.increment *= 1.0 / self.settings.score_decay_factor;
    }

    fn get_decision_variable(&mut self, dm: &DependencyManager, vd: &VariableDataStore) -> Option<Var> {
        loop {
            let score = &self.score;
            let occurrences = &self.occurrences;
            let settings = &self.settings;
            let v = self.queue.pop(|a, b| cmp(score, occurrences, settings, a, b))?;
            if dm.is_decision_candidate(v, vd) {
                return Some(v);
            }
        }
    }
}

fn cmp(score: &VarVec<f64>, occurrences: &VarVec<u32>, settings: &VsidsSettings, a: &Var, b: &Var) -> bool {
    let (sa, sb) = (score[*a], score[*b]);
    if sa != sb {
        return sa > sb;
    }
    if !settings.tiebreak_by_occurrences {
        return false;
    }
    if settings.prefer_fewer_occurrences {
        occurrences[*a] < occurrences[*b]
    } else {
        occurrences[*a] > occurrences[*b]
    }
}

// ---------------------------------------------------------------------
// SGDB
// ---------------------------------------------------------------------

#[derive(Clone, Copy, Debug)]
pub struct SgdbSettings {
    pub initial_learning_rate: f64,
    pub learning_rate_decay: f64,
    pub minimum_learning_rate: f64,
    pub lambda_factor: f64,
}

impl Default for SgdbSettings {
    fn default() -> Self {
        SgdbSettings {
            initial_learning_rate: 0.2,
            learning_rate_decay: 0.00002,
            minimum_learning_rate: 0.05,
            lambda_factor: 0.001,
        }
    }
}

/// Sigmoid-over-linear-score heuristic: a per-variable coefficient predicts
/// whether assigning it pushes the current partial assignment toward a
/// conflict (for clauses) or a solution (for terms); stochastic-gradient
/// updated on every conflict, lazily regularized at access time (spec.md
/// §4.7).
struct Sgdb {
    settings: SgdbSettings,
    learning_rate: f64,
    lambda: f64,
    coefficient: VarVec<f64>,
    regularized_last: VarVec<u32>,
    conflict_counter: u32,
    is_auxiliary: Vec<bool>,
    existential_queue: VarHeap,
    universal_queue: VarHeap,
}

impl Sgdb {
    fn new(settings: SgdbSettings) -> Self {
        let learning_rate = settings.initial_learning_rate;
        let lambda = learning_rate * settings.lambda_factor;
        Sgdb {
            settings,
            learning_rate,
            lambda,
            coefficient: VarVec::new(),
            regularized_last: VarVec::new(),
            conflict_counter: 0,
            is_auxiliary: Vec::new(),
            existential_queue: VarHeap::new(),
            universal_queue: VarHeap::new(),
        }
    }

    fn add_variable(&mut self, v: Var, auxiliary: bool) {
        self.coefficient.init(v);
        self.regularized_last.init(v);
        self.is_auxiliary.push(auxiliary);
    }

    fn lazy_regularize(&mut self, v: Var) {
        let last = self.regularized_last[v];
        if self.conflict_counter > last {
            let decay = (1.0 - self.learning_rate * self.lambda / 2.0).powi((self.conflict_counter - last) as i32);
            self.coefficient[v] *= decay;
            self.regularized_last[v] = self.conflict_counter;
        }
    }

    fn queue_for(&mut self, kind: QuantKind) -> &mut VarHeap {
        match kind {
            QuantKind::Existential => &mut self.existential_queue,
            QuantKind::Universal => &mut self.universal_queue,
        }
    }

    fn notify_eligible(&mut self, v: Var, vd: &VariableDataStore) {
        if self.is_auxiliary[v.index()] {
            return;
        }
        self.lazy_regularize(v);
        let kind = vd.kind(v);
        let coeff = &self.coefficient;
        let queue = self.queue_for(kind);
        if !queue.contains(&v) {
            queue.insert(v, |a, b| ordered(kind, coeff, a, b));
        } else {
            queue.update(&v, |a, b| ordered(kind, coeff, a, b));
        }
    }

    /// Stochastic-gradient step toward "predict conflict" (clauses) or
    /// "predict solution" (terms), applied to every assigned, non-auxiliary
    /// variable in the learned constraint.
    fn notify_learned(&mut self, kind: ConstraintKind, vd: &VariableDataStore, lits: impl Iterator<Item = Lit>) {
        let target = match kind {
            ConstraintKind::Clause => 1.0,
            ConstraintKind::Term => 0.0,
        };
        for l in lits {
            let v = l.var();
            if self.is_auxiliary[v.index()] || !vd.is_assigned(v) {
                continue;
            }
            self.lazy_regularize(v);
            let activation = sigmoid(self.coefficient[v]);
            let gradient = (activation - target) * self.learning_rate;
            self.coefficient[v] -= gradient;
            self.regularized_last[v] = self.conflict_counter;
        }
        self.conflict_counter += 1;
        if self.learning_rate > self.settings.minimum_learning_rate {
            self.learning_rate -= self.settings.learning_rate_decay;
            self.lambda = self.learning_rate * self.settings.lambda_factor;
        }
    }

    /// Try both per-kind queues (their top may or may not be a live decision
    /// candidate -- the watched-dependency scheme can make either kind ready
    /// at once) and return the first that yields one.
    fn get_decision_variable(&mut self, dm: &DependencyManager, vd: &VariableDataStore) -> Option<Var> {
        for kind in [QuantKind::Existential, QuantKind::Universal] {
            loop {
                let coeff = &self.coefficient;
                let queue = match kind {
                    QuantKind::Existential => &mut self.existential_queue,
                    QuantKind::Universal => &mut self.universal_queue,
                };
                match queue.pop(|a, b| ordered(kind, coeff, a, b)) {
                    None => break,
                    Some(v) if dm.is_decision_candidate(v, vd) => return Some(v),
                    Some(_) => continue,
                }
            }
        }
        None
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// For universals, larger coefficients come first (predicted to falsify);
/// for existentials, smaller coefficients come first (predicted to satisfy).
fn ordered(kind: QuantKind, coeff: &VarVec<f64>, a: &Var, b: &Var) -> bool {
    match kind {
        QuantKind::Universal => coeff[*a] > coeff[*b],
        QuantKind::Existential => coeff[*a] < coeff[*b],
    }
}

// ---------------------------------------------------------------------
// Shared front
// ---------------------------------------------------------------------

enum Variant {
    Vmtf(Vmtf),
    Vsids(Vsids),
    Sgdb(Sgdb),
}

pub struct DecisionHeuristic {
    variant: Variant,
    phase: PhaseSelector,
    no_phase_saving: bool,
    saved_phase: Vec<Option<bool>>,
    conflict_kind: ConstraintKind,
}

impl DecisionHeuristic {
    fn base(variant: Variant, phase: PhaseHeuristic, phase_seed: f64, no_phase_saving: bool) -> Self {
        DecisionHeuristic {
            variant,
            phase: PhaseSelector::new(phase, phase_seed),
            no_phase_saving,
            saved_phase: Vec::new(),
            conflict_kind: ConstraintKind::Clause,
        }
    }

    pub fn vmtf(phase: PhaseHeuristic, phase_seed: f64, no_phase_saving: bool) -> Self {
        Self::base(Variant::Vmtf(Vmtf::new()), phase, phase_seed, no_phase_saving)
    }

    pub fn vsids(settings: VsidsSettings, phase: PhaseHeuristic, phase_seed: f64, no_phase_saving: bool) -> Self {
        Self::base(Variant::Vsids(Vsids::new(settings)), phase, phase_seed, no_phase_saving)
    }

    pub fn sgdb(settings: SgdbSettings, phase: PhaseHeuristic, phase_seed: f64, no_phase_saving: bool) -> Self {
        Self::base(Variant::Sgdb(Sgdb::new(settings)), phase, phase_seed, no_phase_saving)
    }

    pub fn add_variable(&mut self, v: Var, auxiliary: bool) {
        self.saved_phase.push(None);
        match &mut self.variant {
            Variant::Vmtf(h) => h.add_variable(v, auxiliary),
            Variant::Vsids(h) => h.add_variable(v, auxiliary),
            Variant::Sgdb(h) => h.add_variable(v, auxiliary),
        }
    }

    pub fn set_occurrences(&mut self, v: Var, count: u32) {
        if let Variant::Vsids(h) = &mut self.variant {
            h.set_occurrences(v, count);
        }
    }

    pub fn notify_start(&mut self) {
        if let Variant::Vmtf(h) = &mut self.variant {
            h.notify_start();
        }
    }

    pub fn notify_assigned(&mut self, l: Lit) {
        if !self.no_phase_saving {
            self.saved_phase[l.var().index()] = Some(l.sign());
        }
    }

    pub fn notify_unassigned(&mut self, l: Lit) {
        if let Variant::Vmtf(h) = &mut self.variant {
            h.notify_unassigned(l.var());
        }
    }

    pub fn notify_eligible(&mut self, v: Var, vd: &VariableDataStore) {
        match &mut self.variant {
            Variant::Vmtf(_) => {}
            Variant::Vsids(h) => h.notify_eligible(v),
            Variant::Sgdb(h) => h.notify_eligible(v, vd),
        }
    }

    pub fn notify_conflict(&mut self, kind: ConstraintKind) {
        self.conflict_kind = kind;
        if let Variant::Vsids(h) = &mut self.variant {
            h.decay();
        }
    }

    pub fn notify_learned(&mut self, kind: ConstraintKind, vd: &VariableDataStore, lits: &[Lit]) {
        match &mut self.variant {
            Variant::Vmtf(h) => h.notify_learned(vd, lits.iter().copied()),
            Variant::Vsids(h) => {
                for &l in lits {
                    if vd.is_assigned(l.var()) {
                        h.bump(l.var());
                    }
                }
            }
            Variant::Sgdb(h) => h.notify_learned(kind, vd, lits.iter().copied()),
        }
    }

    pub fn notify_backtrack(&mut self, _decision_level_before: usize) {}

    pub fn get_decision_literal(&mut self, dm: &DependencyManager, vd: &VariableDataStore) -> Option<Lit> {
        let v = match &mut self.variant {
            Variant::Vmtf(h) => h.get_decision_variable(dm, vd),
            Variant::Vsids(h) => h.get_decision_variable(dm, vd),
            Variant::Sgdb(h) => h.get_decision_variable(dm, vd),
        }?;
        let sign = match self.saved_phase.get(v.index()).copied().flatten() {
            Some(s) if !self.no_phase_saving => s,
            _ => self.phase.select(v, vd),
        };
        Some(v.lit(sign))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qbf::dependency::{DependencyLearningStrategy, OutOfOrderScope};
    use crate::qbf::formula::assignment::Reason;

    #[test]
    fn vmtf_prefers_most_recently_bumped_variable() {
        let mut vd = VariableDataStore::new();
        let mut dm = DependencyManager::new(DependencyLearningStrategy::All, false, OutOfOrderScope::none());
        let mut h = DecisionHeuristic::vmtf(PhaseHeuristic::False, 12345.0, false);
        let a = vd.add_variable(QuantKind::Existential, false, 0);
        let b = vd.add_variable(QuantKind::Existential, false, 0);
        dm.add_variable(false);
        dm.add_variable(false);
        h.add_variable(a, false);
        h.add_variable(b, false);
        h.notify_start();
        h.notify_learned(ConstraintKind::Clause, &vd, &[b.pos_lit()]);
        vd.assign(b.pos_lit(), Reason::Decision);
        h.notify_learned(ConstraintKind::Clause, &vd, &[b.pos_lit()]);

        let lit = h.get_decision_literal(&dm, &vd).expect("a candidate remains");
        assert_eq!(lit.var(), a);
    }

    #[test]
    fn vsids_bump_reorders_the_queue() {
        let mut vd = VariableDataStore::new();
        let mut dm = DependencyManager::new(DependencyLearningStrategy::All, false, OutOfOrderScope::none());
        let mut h = DecisionHeuristic::vsids(VsidsSettings::default(), PhaseHeuristic::False, 1.0, false);
        let a = vd.add_variable(QuantKind::Existential, false, 0);
        let b = vd.add_variable(QuantKind::Existential, false, 0);
        let c = vd.add_variable(QuantKind::Existential, false, 0);
        dm.add_variable(false);
        dm.add_variable(false);
        dm.add_variable(false);
        h.add_variable(a, false);
        h.add_variable(b, false);
        h.add_variable(c, false);
        h.notify_eligible(a, &vd);
        h.notify_eligible(b, &vd);

        // b gets assigned (by something outside the heuristic's control,
        // e.g. unit propagation) and is then bumped via a learned clause
        // that mentions it; its activity should now outrank a's.
        vd.assign(b.pos_lit(), Reason::Decision);
        h.notify_learned(ConstraintKind::Clause, &vd, &[b.pos_lit()]);
        h.notify_eligible(c, &vd);

        let lit = h.get_decision_literal(&dm, &vd).expect("a candidate remains");
        assert_eq!(lit.var(), a);
    }
}
