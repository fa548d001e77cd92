//! Generates a minimal satisfying term from a total satisfying assignment,
//! so the universal player is forced to revisit the falsification of that
//! term rather than the full assignment. Ported from the original Qute
//! solver's `ModelGeneratorSimple` / `ModelGeneratorWeighted`
//! (`model_generator_simple.cc`, `model_generator_weighted.cc`).

use std::collections::HashSet;

use super::constraint_db::ConstraintDbManager;
use super::formula::assignment::VariableDataStore;
use super::{ConstraintKind, Lit, QuantKind, Var};

#[derive(Clone, Copy, Debug)]
pub struct WeightedSettings {
    pub exponent: f64,
    pub scaling_factor: f64,
    pub universal_penalty: f64,
}

impl Default for WeightedSettings {
    fn default() -> Self {
        WeightedSettings { exponent: 1.0, scaling_factor: 1.0, universal_penalty: 0.0 }
    }
}

pub enum ModelGenerator {
    Simple,
    Weighted(WeightedModelGenerator),
}

impl ModelGenerator {
    pub fn simple() -> Self {
        ModelGenerator::Simple
    }

    pub fn weighted(settings: WeightedSettings, vd: &VariableDataStore) -> Self {
        ModelGenerator::Weighted(WeightedModelGenerator::new(settings, vd))
    }

    pub fn generate(&self, db: &ConstraintDbManager, vd: &VariableDataStore) -> Vec<Lit> {
        match self {
            ModelGenerator::Simple => generate_simple(db, vd),
            ModelGenerator::Weighted(w) => w.generate(db, vd),
        }
    }
}

/// For each input clause keep the first existential satisfying literal if
/// one exists, else the first satisfying literal at all; dedup by variable.
fn generate_simple(db: &ConstraintDbManager, vd: &VariableDataStore) -> Vec<Lit> {
    let mut chosen: HashSet<Lit> = HashSet::new();
    for &r in db.input_references(ConstraintKind::Clause) {
        let c = db.view(r, ConstraintKind::Clause);
        let mut fallback: Option<Lit> = None;
        let mut picked = false;
        for l in c.lits() {
            if vd.is_assigned_true(l) {
                if fallback.is_none() {
                    fallback = Some(l);
                }
                if vd.kind(l.var()) == QuantKind::Existential {
                    chosen.insert(l);
                    picked = true;
                    break;
                }
            }
        }
        if !picked {
            if let Some(l) = fallback {
                chosen.insert(l);
            }
        }
    }
    chosen.into_iter().collect()
}

pub struct WeightedModelGenerator {
    settings: WeightedSettings,
    /// weight per variable, only meaningful up to the last universal; the
    /// trailing existential block always has weight 0 (always safe to drop).
    weights: Vec<f64>,
}

impl WeightedModelGenerator {
    fn new(settings: WeightedSettings, vd: &VariableDataStore) -> Self {
        let n = vd.number_of_vars();
        let mut weights = vec![0.0; n];
        let total_exist = vd.count_of_kind_until(QuantKind::Existential, Var::from_index(n.saturating_sub(1))).max(1) as f64;
        let total_univ = vd.count_of_kind_until(QuantKind::Universal, Var::from_index(n.saturating_sub(1))).max(1) as f64;
        for i in 0..n {
            let v = Var::from_index(i);
            let kind = vd.kind(v);
            let cost = match kind {
                // existentials: fraction of universals strictly to their right
                QuantKind::Existential => {
                    let univ_total = vd.count_of_kind_until(QuantKind::Universal, Var::from_index(n - 1));
                    let univ_upto = vd.count_of_kind_until(QuantKind::Universal, v);
                    (univ_total - univ_upto) as f64 / total_univ
                }
                // universals: fraction of existentials strictly to their left
                QuantKind::Universal => {
                    let exist_upto = vd.count_of_kind_until(QuantKind::Existential, v);
                    exist_upto as f64 / total_exist
                }
            };
            let penalty = if kind == QuantKind::Universal { settings.universal_penalty } else { 0.0 };
            weights[i] = 1.0 + settings.scaling_factor * cost.powf(settings.exponent) + penalty;
        }
        WeightedModelGenerator { settings, weights }
    }

    /// Greedy weighted hitting set: pre-saturate with innermost-existential
    /// and singleton-clause satisfiers (always sound / forced), then
    /// repeatedly pick the variable maximizing uncovered-clauses / weight
    /// until every clause is covered.
    fn generate(&self, db: &ConstraintDbManager, vd: &VariableDataStore) -> Vec<Lit> {
        let _ = self.settings;
        let mut model: Vec<Lit> = Vec::new();
        let mut in_model = vec![false; vd.number_of_vars()];
        let mut occurrences: std::collections::HashMap<usize, HashSet<super::formula::constraint::ConstraintRef>> = std::collections::HashMap::new();
        let mut covered: HashSet<super::formula::constraint::ConstraintRef> = HashSet::new();

        let is_innermost_existential = |v: Var| -> bool {
            vd.kind(v) == QuantKind::Existential && vd.block(v) + 1 == vd.number_of_blocks()
        };

        for &r in db.input_references(ConstraintKind::Clause) {
            let c = db.view(r, ConstraintKind::Clause);
            let mut true_vars = Vec::new();
            let mut already = false;
            for l in c.lits() {
                if vd.is_assigned_true(l) {
                    let v = l.var();
                    if in_model[v.index()] {
                        already = true;
                        break;
                    } else if is_innermost_existential(v) {
                        in_model[v.index()] = true;
                        model.push(l);
                        already = true;
                        break;
                    }
                    true_vars.push(v);
                }
            }
            if !already && true_vars.len() == 1 {
                let v = true_vars[0];
                in_model[v.index()] = true;
                model.push(v.lit(vd.polarity(v)));
                already = true;
            }
            if !already {
                for &v in &true_vars {
                    occurrences.entry(v.index()).or_insert_with(HashSet::new).insert(r);
                }
            } else {
                covered.insert(r);
            }
        }

        // remove clauses already covered by the pre-saturation pass from
        // every remaining variable's occurrence set.
        for &l in &model {
            for set in occurrences.values_mut() {
                set.retain(|r| !covered.contains(r));
            }
            let _ = l;
        }

        let total_clauses = db.input_references(ConstraintKind::Clause).len();
        while covered.len() < total_clauses {
            let best = occurrences
                .iter()
                .filter(|(_, set)| !set.is_empty())
                .max_by(|(va, sa), (vb, sb)| {
                    let score_a = sa.len() as f64 / self.weights[**va];
                    let score_b = sb.len() as f64 / self.weights[**vb];
                    score_a.partial_cmp(&score_b).unwrap()
                })
                .map(|(&v, _)| v);
            let Some(vidx) = best else { break };
            let v = Var::from_index(vidx);
            in_model[vidx] = true;
            model.push(v.lit(vd.polarity(v)));
            let newly_covered: Vec<_> = occurrences[&vidx].iter().copied().collect();
            for r in newly_covered {
                covered.insert(r);
                for set in occurrences.values_mut() {
                    set.remove(&r);
                }
            }
        }

        model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qbf::formula::assignment::Reason;

    fn setup() -> (ConstraintDbManager, VariableDataStore) {
        let db = ConstraintDbManager::new(false, Default::default());
        let vd = VariableDataStore::new();
        (db, vd)
    }

    #[test]
    fn simple_prefers_existential_satisfier() {
        let (mut db, mut vd) = setup();
        let a = vd.add_variable(QuantKind::Universal, false, 0);
        let b = vd.add_variable(QuantKind::Existential, false, 1);
        vd.assign(a.pos_lit(), Reason::Decision);
        vd.assign(b.pos_lit(), Reason::Decision);
        let r = db.add_constraint(&[a.pos_lit(), b.pos_lit()], ConstraintKind::Clause, false, false, &vd);
        let _ = r;
        let model = generate_simple(&db, &vd);
        assert_eq!(model, vec![b.pos_lit()]);
    }
}
