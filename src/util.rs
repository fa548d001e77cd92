//! Small utilities shared across the crate: a xorshift-free linear
//! congruential RNG (ported from minisat-rust's `sat::minisat::search::util::Random`,
//! used for random decisions and initial-activity jitter) and a
//! `/proc/self/status` peak-memory reader for `--print-stats`.

use std::fs::File;
use std::io::Read;
use std::process;

pub struct Random {
    seed: f64,
}

impl Random {
    pub fn new(seed: f64) -> Random {
        assert!(seed != 0.0, "random seed must be non-zero");
        Random { seed }
    }

    /// A random float `0 <= x < 1`.
    pub fn drand(&mut self) -> f64 {
        self.seed *= 1389796.0;
        let q = (self.seed / 2147483647.0) as i32;
        self.seed -= (q as f64) * 2147483647.0;
        self.seed / 2147483647.0
    }

    /// A random integer `0 <= x < size`.
    pub fn irand(&mut self, size: usize) -> usize {
        (self.drand() * (size as f64)) as usize
    }

    pub fn chance(&mut self, p: f64) -> bool {
        self.drand() < p
    }
}

#[cfg(not(target_os = "linux"))]
pub fn mem_used_peak() -> Option<usize> {
    None
}

#[cfg(target_os = "linux")]
pub fn mem_used_peak() -> Option<usize> {
    let mut buf = String::new();
    let mut stats = File::open(format!("/proc/{}/status", process::id())).ok()?;
    stats.read_to_string(&mut buf).ok()?;
    let line = buf.lines().find(|line| line.starts_with("VmPeak:"))?;
    let mem_kb: String = line.chars().filter(|c| c.is_ascii_digit()).collect();
    mem_kb.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drand_stays_in_unit_interval() {
        let mut r = Random::new(91648253.0);
        for _ in 0..1000 {
            let x = r.drand();
            assert!(x >= 0.0 && x < 1.0);
        }
    }

    #[test]
    fn irand_respects_bound() {
        let mut r = Random::new(12345.0);
        for _ in 0..1000 {
            assert!(r.irand(7) < 7);
        }
    }
}
