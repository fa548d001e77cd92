//! CLI option parsing and cross-option validation (spec.md §6). Built on
//! `clap`, matching the teacher's use of `clap::App`/`clap::Arg` to turn a
//! flat argument list into a validated settings struct before anything in
//! `qbf` is constructed.

use std::time::Duration;

use clap::{App, Arg};

use crate::qbf::constraint_db::CleaningPolicy;
use crate::qbf::dependency::{DependencyLearningStrategy, OutOfOrderScope};
use crate::qbf::heuristic::{PhaseHeuristic, SgdbSettings, VsidsSettings};
use crate::qbf::model_gen::WeightedSettings;
use crate::qbf::propagate::WatchScheme;
use crate::qbf::restart::{EmaSettings, InnerOuterSettings};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeuristicChoice {
    Vmtf,
    Vsids,
    Sgdb,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestartChoice {
    None,
    InnerOuter,
    Luby,
    Ema,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelGenChoice {
    Simple,
    Weighted,
}

/// Every CLI flag from spec.md §6, parsed and cross-validated. Constructed
/// once by [`parse`]; everything downstream (`main.rs`) reads from this
/// rather than touching `clap::ArgMatches` again.
pub struct Options {
    pub input_path: Option<String>,

    pub watch_scheme: WatchScheme,
    pub dependency_strategy: DependencyLearningStrategy,
    pub rrs_enabled: bool,
    pub ooo_scope: OutOfOrderScope,

    pub cleaning_policy: CleaningPolicy,

    pub heuristic: HeuristicChoice,
    pub vsids: VsidsSettings,
    pub sgdb: SgdbSettings,
    pub phase: PhaseHeuristic,
    pub phase_seed: f64,
    pub no_phase_saving: bool,

    pub restart: RestartChoice,
    pub inner_outer: InnerOuterSettings,
    pub luby_multiplier: u32,
    pub ema: EmaSettings,

    pub model_gen: ModelGenChoice,
    pub weighted: WeightedSettings,

    pub trace_path: Option<String>,
    pub verbose: bool,
    pub print_stats: bool,
    pub machine_readable: bool,
    pub partial_certificate: bool,
    pub enumerate: bool,
    pub time_limit: Option<Duration>,
}

/// A validated, out-of-range or mutually-exclusive option combination
/// (spec.md §7 "Option validation"), reported with exit code 1.
#[derive(Debug)]
pub struct OptionError(pub String);

impl std::fmt::Display for OptionError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for OptionError {}

fn app() -> App<'static, 'static> {
    App::new("qute")
        .version(env!("CARGO_PKG_VERSION"))
        .about("A QCDCL solver for quantified Boolean formulas in prenex CNF/DNF form")
        .arg(Arg::with_name("input").help("QDIMACS or QCIR file (stdin if omitted)").index(1))
        .arg(Arg::with_name("watches").long("watches").takes_value(true).possible_values(&["2", "3"]).default_value("2").help("Number of watched literals per constraint"))
        .arg(Arg::with_name("dependency-learning").long("dependency-learning").takes_value(true).possible_values(&["all", "outermost", "fewest", "off"]).default_value("all").help("Dependency-learning strategy"))
        .arg(Arg::with_name("rrs").long("rrs").help("Enable reflexive resolution-path independence filtering"))
        .arg(Arg::with_name("ooo-decisions").long("ooo-decisions").takes_value(true).possible_values(&["none", "existential", "universal", "both"]).default_value("none").help("Out-of-order decision scope (requires --watches=3)"))
        .arg(Arg::with_name("constraint-activity-decay").long("constraint-activity-decay").takes_value(true).help("Learnt constraint activity decay factor, in (0, 1]"))
        .arg(Arg::with_name("constraint-increment").long("constraint-increment").takes_value(true).help("Learnt constraint activity bump increment"))
        .arg(Arg::with_name("lbd-threshold").long("lbd-threshold").takes_value(true).help("LBD at or below which a learnt constraint is never removed"))
        .arg(Arg::with_name("use-activity-threshold").long("use-activity-threshold").help("Also remove learnt constraints below the mean activity"))
        .arg(Arg::with_name("removal-ratio-clauses").long("removal-ratio-clauses").takes_value(true).help("Fraction of learnt clauses removed per clean-up, in [0, 1]"))
        .arg(Arg::with_name("removal-ratio-terms").long("removal-ratio-terms").takes_value(true).help("Fraction of learnt terms removed per clean-up, in [0, 1]"))
        .arg(Arg::with_name("learnts-max-clauses").long("learnts-max-clauses").takes_value(true).help("Initial learnt-clause limit before a clean-up"))
        .arg(Arg::with_name("learnts-max-terms").long("learnts-max-terms").takes_value(true).help("Initial learnt-term limit before a clean-up"))
        .arg(Arg::with_name("heuristic").long("heuristic").takes_value(true).possible_values(&["vmtf", "vsids", "sgdb"]).default_value("vmtf").help("Decision heuristic"))
        .arg(Arg::with_name("vsids-tiebreak").long("vsids-tiebreak").help("Break VSIDS score ties by literal-occurrence count"))
        .arg(Arg::with_name("vsids-prefer-fewer-occurrences").long("vsids-prefer-fewer-occurrences").help("VSIDS tie-break favors fewer occurrences instead of more"))
        .arg(Arg::with_name("score-decay-factor").long("score-decay-factor").takes_value(true).help("VSIDS score decay factor, in (0, 1]"))
        .arg(Arg::with_name("phase").long("phase").takes_value(true).possible_values(&["invjw", "qtype", "watcher", "random", "true", "false"]).default_value("qtype").help("Phase-selection heuristic"))
        .arg(Arg::with_name("phase-seed").long("phase-seed").takes_value(true).help("Seed for the random phase heuristic"))
        .arg(Arg::with_name("no-phase-saving").long("no-phase-saving").help("Disable phase saving"))
        .arg(Arg::with_name("restart").long("restart").takes_value(true).possible_values(&["none", "inner-outer", "luby", "ema"]).default_value("inner-outer").help("Restart scheduler"))
        .arg(Arg::with_name("restart-multiplier").long("restart-multiplier").takes_value(true).help("Inner-outer restart growth factor, > 1"))
        .arg(Arg::with_name("luby-multiplier").long("luby-multiplier").takes_value(true).help("Luby sequence base unit, in conflicts"))
        .arg(Arg::with_name("ema-alpha").long("ema-alpha").takes_value(true).help("EMA short-term smoothing factor, in (0, 1)"))
        .arg(Arg::with_name("model-gen").long("model-gen").takes_value(true).possible_values(&["simple", "weighted"]).default_value("simple").help("Model-generation strategy"))
        .arg(Arg::with_name("weighted-exponent").long("weighted-exponent").takes_value(true).help("Weighted model generation cost exponent"))
        .arg(Arg::with_name("weighted-scaling-factor").long("weighted-scaling-factor").takes_value(true).help("Weighted model generation cost scale"))
        .arg(Arg::with_name("weighted-universal-penalty").long("weighted-universal-penalty").takes_value(true).help("Extra weight added to universal variables"))
        .arg(Arg::with_name("trace").long("trace").takes_value(true).help("Write a resolution-proof trace to this file"))
        .arg(Arg::with_name("verbose").short("v").long("verbose").help("Enable trace-level logging"))
        .arg(Arg::with_name("print-stats").long("print-stats").help("Print solver statistics to stderr on exit"))
        .arg(Arg::with_name("machine-readable").long("machine-readable").help("Print the single-line CSV summary instead of SAT/UNSAT/UNDEF"))
        .arg(Arg::with_name("partial-certificate").long("partial-certificate").help("Print the outermost-block certificate when the winning player owns it"))
        .arg(Arg::with_name("enumerate").long("enumerate").help("Keep searching for further solutions after the first"))
        .arg(Arg::with_name("time-limit").long("time-limit").takes_value(true).help("Wall-clock time limit, in seconds"))
}

fn parse_ratio(matches: &clap::ArgMatches, name: &str) -> Result<Option<f64>, OptionError> {
    match matches.value_of(name) {
        None => Ok(None),
        Some(s) => {
            let v: f64 = s.parse().map_err(|_| OptionError(format!("--{} must be a number", name)))?;
            if !(0.0..=1.0).contains(&v) {
                return Err(OptionError(format!("--{} must be in [0, 1]", name)));
            }
            Ok(Some(v))
        }
    }
}

fn parse_positive_f64(matches: &clap::ArgMatches, name: &str) -> Result<Option<f64>, OptionError> {
    match matches.value_of(name) {
        None => Ok(None),
        Some(s) => {
            let v: f64 = s.parse().map_err(|_| OptionError(format!("--{} must be a number", name)))?;
            if v <= 0.0 {
                return Err(OptionError(format!("--{} must be positive", name)));
            }
            Ok(Some(v))
        }
    }
}

fn parse_u32(matches: &clap::ArgMatches, name: &str) -> Result<Option<u32>, OptionError> {
    match matches.value_of(name) {
        None => Ok(None),
        Some(s) => s.parse().map(Some).map_err(|_| OptionError(format!("--{} must be a non-negative integer", name))),
    }
}

/// Parses `args` (pass `std::env::args()` from `main`) into validated
/// [`Options`], or an [`OptionError`] naming the first offending flag.
pub fn parse<I, T>(args: I) -> Result<Options, OptionError>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let matches = app().get_matches_from_safe(args).map_err(|e| OptionError(e.message))?;

    let watch_scheme = match matches.value_of("watches").unwrap() {
        "2" => WatchScheme::TwoWatch,
        _ => WatchScheme::ThreeWatch,
    };

    let dependency_strategy: DependencyLearningStrategy =
        matches.value_of("dependency-learning").unwrap().parse().map_err(|_| OptionError("invalid --dependency-learning value".to_string()))?;
    let rrs_enabled = matches.is_present("rrs");

    let ooo_scope = match matches.value_of("ooo-decisions").unwrap() {
        "none" => OutOfOrderScope::none(),
        "existential" => OutOfOrderScope { existential: true, universal: false },
        "universal" => OutOfOrderScope { existential: false, universal: true },
        "both" => OutOfOrderScope { existential: true, universal: true },
        _ => unreachable!(),
    };
    if !ooo_scope.is_empty() && watch_scheme == WatchScheme::TwoWatch {
        return Err(OptionError("--ooo-decisions requires --watches=3".to_string()));
    }

    let heuristic = match matches.value_of("heuristic").unwrap() {
        "vmtf" => HeuristicChoice::Vmtf,
        "vsids" => HeuristicChoice::Vsids,
        _ => HeuristicChoice::Sgdb,
    };
    if dependency_strategy == DependencyLearningStrategy::Off && heuristic != HeuristicChoice::Vmtf {
        return Err(OptionError("--heuristic=vmtf is required when --dependency-learning=off".to_string()));
    }

    let mut cleaning_policy = CleaningPolicy::default();
    if let Some(v) = parse_positive_f64(&matches, "constraint-activity-decay")? {
        if v > 1.0 {
            return Err(OptionError("--constraint-activity-decay must be in (0, 1]".to_string()));
        }
        cleaning_policy.constraint_activity_decay = v;
    }
    if let Some(v) = parse_positive_f64(&matches, "constraint-increment")? {
        cleaning_policy.constraint_increment = v;
    }
    if let Some(v) = parse_u32(&matches, "lbd-threshold")? {
        cleaning_policy.lbd_threshold = v;
    }
    cleaning_policy.use_activity_threshold = matches.is_present("use-activity-threshold");
    if let Some(v) = parse_ratio(&matches, "removal-ratio-clauses")? {
        cleaning_policy.removal_ratio[0] = v;
    }
    if let Some(v) = parse_ratio(&matches, "removal-ratio-terms")? {
        cleaning_policy.removal_ratio[1] = v;
    }
    if let Some(v) = parse_u32(&matches, "learnts-max-clauses")? {
        cleaning_policy.learnts_max[0] = v;
    }
    if let Some(v) = parse_u32(&matches, "learnts-max-terms")? {
        cleaning_policy.learnts_max[1] = v;
    }

    let mut vsids = VsidsSettings::default();
    vsids.tiebreak_by_occurrences = matches.is_present("vsids-tiebreak");
    vsids.prefer_fewer_occurrences = matches.is_present("vsids-prefer-fewer-occurrences");
    if let Some(v) = parse_positive_f64(&matches, "score-decay-factor")? {
        if v > 1.0 {
            return Err(OptionError("--score-decay-factor must be in (0, 1]".to_string()));
        }
        vsids.score_decay_factor = v;
    }
    let sgdb = SgdbSettings::default();

    let phase = match matches.value_of("phase").unwrap() {
        "invjw" => PhaseHeuristic::InvJeroslowWang,
        "qtype" => PhaseHeuristic::Qtype,
        "watcher" => PhaseHeuristic::Watcher,
        "random" => PhaseHeuristic::Random,
        "true" => PhaseHeuristic::True,
        _ => PhaseHeuristic::False,
    };
    let phase_seed = parse_positive_f64(&matches, "phase-seed")?.unwrap_or(91648253.0);
    let no_phase_saving = matches.is_present("no-phase-saving");

    let restart = match matches.value_of("restart").unwrap() {
        "none" => RestartChoice::None,
        "inner-outer" => RestartChoice::InnerOuter,
        "luby" => RestartChoice::Luby,
        _ => RestartChoice::Ema,
    };
    let mut inner_outer = InnerOuterSettings::default();
    if let Some(v) = parse_positive_f64(&matches, "restart-multiplier")? {
        if v <= 1.0 {
            return Err(OptionError("--restart-multiplier must be > 1".to_string()));
        }
        inner_outer.restart_multiplier = v;
    }
    let luby_multiplier = parse_u32(&matches, "luby-multiplier")?.unwrap_or(32);
    let mut ema = EmaSettings::default();
    if let Some(v) = parse_ratio(&matches, "ema-alpha")? {
        ema.alpha = v;
    }

    let model_gen = match matches.value_of("model-gen").unwrap() {
        "weighted" => ModelGenChoice::Weighted,
        _ => ModelGenChoice::Simple,
    };
    let mut weighted = WeightedSettings::default();
    if let Some(v) = parse_positive_f64(&matches, "weighted-exponent")? {
        weighted.exponent = v;
    }
    if let Some(v) = parse_positive_f64(&matches, "weighted-scaling-factor")? {
        weighted.scaling_factor = v;
    }
    if let Some(s) = matches.value_of("weighted-universal-penalty") {
        weighted.universal_penalty = s.parse().map_err(|_| OptionError("--weighted-universal-penalty must be a number".to_string()))?;
    }

    let time_limit = match matches.value_of("time-limit") {
        None => None,
        Some(s) => {
            let secs: f64 = s.parse().map_err(|_| OptionError("--time-limit must be a number of seconds".to_string()))?;
            if secs <= 0.0 {
                return Err(OptionError("--time-limit must be positive".to_string()));
            }
            Some(Duration::from_secs_f64(secs))
        }
    };

    Ok(Options {
        input_path: matches.value_of("input").map(|s| s.to_string()),
        watch_scheme,
        dependency_strategy,
        rrs_enabled,
        ooo_scope,
        cleaning_policy,
        heuristic,
        vsids,
        sgdb,
        phase,
        phase_seed,
        no_phase_saving,
        restart,
        inner_outer,
        luby_multiplier,
        ema,
        model_gen,
        weighted,
        trace_path: matches.value_of("trace").map(|s| s.to_string()),
        verbose: matches.is_present("verbose"),
        print_stats: matches.is_present("print-stats"),
        machine_readable: matches.is_present("machine-readable"),
        partial_certificate: matches.is_present("partial-certificate"),
        enumerate: matches.is_present("enumerate"),
        time_limit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ooo_decisions_require_three_watches() {
        let err = parse(["qute", "--ooo-decisions=existential", "--watches=2"]).unwrap_err();
        assert!(err.0.contains("--watches=3"));
    }

    #[test]
    fn ooo_decisions_accepted_with_three_watches() {
        let opts = parse(["qute", "--ooo-decisions=existential", "--watches=3"]).unwrap();
        assert_eq!(opts.watch_scheme, WatchScheme::ThreeWatch);
    }

    #[test]
    fn dependency_learning_off_requires_vmtf() {
        let err = parse(["qute", "--dependency-learning=off", "--heuristic=vsids"]).unwrap_err();
        assert!(err.0.contains("vmtf"));
    }

    #[test]
    fn defaults_parse_cleanly() {
        let opts = parse(["qute", "input.qdimacs"]).unwrap();
        assert_eq!(opts.input_path.as_deref(), Some("input.qdimacs"));
        assert_eq!(opts.watch_scheme, WatchScheme::TwoWatch);
    }
}
