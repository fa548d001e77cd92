//! Restart scheduling. Ported from the original Qute solver's
//! `RestartScheduler*` family (`restart_scheduler_{none,inner_outer,luby,ema}.hh`):
//! each variant is notified of every conflict/solution and every learned
//! constraint, and is polled once per conflict for whether to restart.

use log::info;

use super::ConstraintKind;

#[derive(Clone, Copy, Debug)]
pub struct InnerOuterSettings {
    pub inner_restart_limit: u32,
    pub outer_restart_limit: u32,
    pub restart_multiplier: f64,
}

impl Default for InnerOuterSettings {
    fn default() -> Self {
        InnerOuterSettings {
            inner_restart_limit: 100,
            outer_restart_limit: 100,
            restart_multiplier: 1.1,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct EmaSettings {
    pub alpha: f64,
    pub minimum_distance: u32,
    pub threshold_factor: f64,
}

impl Default for EmaSettings {
    fn default() -> Self {
        EmaSettings {
            alpha: 0.02,
            minimum_distance: 16,
            threshold_factor: 1.2,
        }
    }
}

struct InnerOuter {
    settings: InnerOuterSettings,
    conflict_counter: u32,
    current_inner_limit: u32,
    outer_limit: u32,
}

impl InnerOuter {
    fn new(settings: InnerOuterSettings) -> Self {
        InnerOuter {
            current_inner_limit: settings.inner_restart_limit,
            outer_limit: settings.outer_restart_limit,
            settings,
            conflict_counter: 0,
        }
    }

    fn notify_conflict(&mut self) -> bool {
        self.conflict_counter += 1;
        if self.conflict_counter >= self.current_inner_limit {
            self.conflict_counter = 0;
            if (self.current_inner_limit as f64) >= self.outer_limit as f64 {
                info!("outer restart");
                self.outer_limit = (self.outer_limit as f64 * self.settings.restart_multiplier) as u32;
                self.current_inner_limit = self.settings.inner_restart_limit;
            } else {
                self.current_inner_limit = (self.current_inner_limit as f64 * self.settings.restart_multiplier) as u32;
            }
            true
        } else {
            false
        }
    }
}

struct Luby {
    multiplier: u32,
    u: u32,
    v: u32,
    conflict_counter: u32,
    limit: u32,
}

impl Luby {
    fn new(multiplier: u32) -> Self {
        Luby {
            multiplier,
            u: 1,
            v: 1,
            conflict_counter: 0,
            limit: multiplier,
        }
    }

    fn next_luby(&mut self) {
        if (self.u as i64 & -(self.u as i64)) == self.v as i64 {
            self.u += 1;
            self.v = 1;
        } else {
            self.v *= 2;
        }
    }

    fn notify_conflict(&mut self) -> bool {
        self.conflict_counter += 1;
        if self.conflict_counter >= self.limit {
            self.conflict_counter = 0;
            self.next_luby();
            self.limit = self.multiplier * self.v;
            true
        } else {
            false
        }
    }
}

struct Ema {
    settings: EmaSettings,
    long_term: [f64; 2],
    short_term: [f64; 2],
    conflict_counter: u32,
    nr_updates: u32,
    pending_kind: ConstraintKind,
    restart_flag: bool,
}

impl Ema {
    fn new(settings: EmaSettings) -> Self {
        Ema {
            settings,
            long_term: [0.0, 0.0],
            short_term: [0.0, 0.0],
            conflict_counter: 0,
            nr_updates: 0,
            pending_kind: ConstraintKind::Clause,
            restart_flag: false,
        }
    }

    fn notify_conflict(&mut self, kind: ConstraintKind) {
        self.conflict_counter += 1;
        self.pending_kind = kind;
    }

    fn notify_learned(&mut self, lbd: u32) {
        let i = super::kind_index(self.pending_kind);
        let lbd = lbd as f64;
        let delta = (lbd - self.long_term[i]) / (1.0 + self.nr_updates as f64);
        self.long_term[i] += delta;
        let alpha_smoothed = if self.nr_updates as f64 > -self.settings.alpha.log2() {
            self.settings.alpha
        } else {
            1.0 / 2f64.powi(self.nr_updates as i32)
        };
        self.short_term[i] = lbd * alpha_smoothed + self.short_term[i] * (1.0 - alpha_smoothed);
        self.nr_updates += 1;
        if self.short_term[i] > self.long_term[i] * self.settings.threshold_factor
            && self.conflict_counter >= self.settings.minimum_distance
        {
            self.restart_flag = true;
        }
    }

    fn should_restart(&mut self) -> bool {
        if self.restart_flag {
            info!("restarting after {} conflicts/solutions (EMA)", self.conflict_counter);
            self.restart_flag = false;
            self.conflict_counter = 0;
            true
        } else {
            false
        }
    }
}

enum Scheme {
    None,
    InnerOuter(InnerOuter),
    Luby(Luby),
    Ema(Ema),
}

/// `--restart` option value (spec.md §4.8: "none, inner-outer, luby, EMA, or off").
pub struct RestartScheduler {
    scheme: Scheme,
    pending_restart: bool,
}

impl RestartScheduler {
    pub fn none() -> Self {
        RestartScheduler { scheme: Scheme::None, pending_restart: false }
    }

    pub fn inner_outer(settings: InnerOuterSettings) -> Self {
        RestartScheduler { scheme: Scheme::InnerOuter(InnerOuter::new(settings)), pending_restart: false }
    }

    pub fn luby(multiplier: u32) -> Self {
        RestartScheduler { scheme: Scheme::Luby(Luby::new(multiplier)), pending_restart: false }
    }

    pub fn ema(settings: EmaSettings) -> Self {
        RestartScheduler { scheme: Scheme::Ema(Ema::new(settings)), pending_restart: false }
    }

    /// Called once per conflict/solution, before `should_restart` is polled.
    pub fn notify_conflict(&mut self, kind: ConstraintKind) {
        match &mut self.scheme {
            Scheme::None => {}
            Scheme::InnerOuter(s) => {
                if s.notify_conflict() {
                    self.pending_restart = true;
                }
            }
            Scheme::Luby(s) => {
                if s.notify_conflict() {
                    self.pending_restart = true;
                }
            }
            Scheme::Ema(s) => s.notify_conflict(kind),
        }
    }

    /// Called after a constraint is learned from that conflict (EMA tracks LBD).
    pub fn notify_learned(&mut self, lbd: u32) {
        if let Scheme::Ema(s) = &mut self.scheme {
            s.notify_learned(lbd);
        }
    }

    pub fn should_restart(&mut self) -> bool {
        match &mut self.scheme {
            Scheme::None => false,
            Scheme::InnerOuter(_) | Scheme::Luby(_) => std::mem::take(&mut self.pending_restart),
            Scheme::Ema(s) => s.should_restart(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_outer_restarts_after_limit() {
        let mut r = RestartScheduler::inner_outer(InnerOuterSettings { inner_restart_limit: 3, outer_restart_limit: 3, restart_multiplier: 2.0 });
        for _ in 0..2 {
            r.notify_conflict(ConstraintKind::Clause);
            assert!(!r.should_restart());
        }
        r.notify_conflict(ConstraintKind::Clause);
        assert!(r.should_restart());
    }

    #[test]
    fn luby_sequence_grows() {
        let mut r = RestartScheduler::luby(2);
        let mut restarts = 0;
        for _ in 0..20 {
            r.notify_conflict(ConstraintKind::Clause);
            if r.should_restart() {
                restarts += 1;
            }
        }
        assert!(restarts >= 2);
    }

    #[test]
    fn none_never_restarts() {
        let mut r = RestartScheduler::none();
        for _ in 0..1000 {
            r.notify_conflict(ConstraintKind::Clause);
            assert!(!r.should_restart());
        }
    }
}
