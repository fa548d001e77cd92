//! CLI entry point: parse options, load a QDIMACS/QCIR problem, run the
//! search, and report the answer the way spec.md §6 describes. Mirrors the
//! teacher's `main.rs` shape (build settings from `clap`, set up
//! `env_logger`, drive a `Solver`, map the result to a process exit code)
//! generalized to QBF's SAT/UNSAT/UNDEF trichotomy and optional trace/
//! certificate/statistics output.

use std::fs::File;
use std::io::{self, Read, Write};
use std::process::ExitCode;
use std::time::Instant;

use qute::frontend;
use qute::options::{self, HeuristicChoice, ModelGenChoice, Options, RestartChoice};
use qute::qbf::driver::Solver;
use qute::qbf::heuristic::DecisionHeuristic;
use qute::qbf::model_gen::ModelGenerator;
use qute::qbf::restart::RestartScheduler;
use qute::qbf::trace::TraceWriter;
use qute::qbf::Answer;

const EXIT_USAGE: u8 = 1;
const EXIT_MISSING_INPUT: u8 = 2;

fn main() -> ExitCode {
    let options = match options::parse(std::env::args()) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("qute: {}", e);
            return ExitCode::from(EXIT_USAGE);
        }
    };

    init_logging(options.verbose);

    match run(options) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("qute: {}", e);
            ExitCode::from(EXIT_USAGE)
        }
    }
}

fn init_logging(verbose: bool) {
    let mut builder = env_logger::Builder::from_default_env();
    if verbose {
        builder.filter_level(log::LevelFilter::Trace);
    }
    let _ = builder.try_init();
}

fn run(options: Options) -> qute::Result<u8> {
    let total_start = Instant::now();

    let mut input: Box<dyn Read> = match &options.input_path {
        Some(path) => match File::open(path) {
            Ok(f) => Box::new(f),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                eprintln!("qute: input file '{}' not found", path);
                return Ok(EXIT_MISSING_INPUT);
            }
            Err(e) => return Err(e.into()),
        },
        None => Box::new(io::stdin()),
    };

    let heuristic = build_heuristic(&options);
    let restart = build_restart(&options);
    let model_gen = ModelGenerator::simple();
    let trace_writer: Option<Box<dyn qute::qbf::trace::TraceSink>> = match &options.trace_path {
        Some(path) => Some(Box::new(TraceWriter::new(File::create(path)?))),
        None => None,
    };

    let mut solver = Solver::new(
        options.watch_scheme,
        options.dependency_strategy,
        options.rrs_enabled,
        options.ooo_scope,
        options.cleaning_policy.clone(),
        heuristic,
        restart,
        model_gen,
        options.trace_path.is_some(),
        trace_writer,
        options.enumerate,
        options.time_limit.map(|d| Instant::now() + d),
    );

    frontend::detect_and_parse(&mut input, &mut solver, options.model_gen == ModelGenChoice::Weighted)?;
    if options.model_gen == ModelGenChoice::Weighted {
        solver.use_weighted_model_generator(options.weighted);
    }
    solver.finish_loading();

    let solve_start = Instant::now();
    let outcome = solver.solve();
    let solve_time = solve_start.elapsed().as_secs_f64();
    let total_time = total_start.elapsed().as_secs_f64();

    let stats = solver.stats();
    let path_display = options.input_path.as_deref().unwrap_or("-");

    let exit_code = match outcome.answer {
        Some(Answer::Sat) => Answer::Sat.exit_code() as u8,
        Some(Answer::Unsat) => Answer::Unsat.exit_code() as u8,
        None => 0,
    };
    let result_text = match outcome.answer {
        Some(Answer::Sat) => "SAT",
        Some(Answer::Unsat) => "UNSAT",
        None => "UNDEF",
    };

    if options.machine_readable {
        println!(
            "QUTE_ANS,{},{},{:.3},{:.3},{:.4},{},{:.4},{}",
            path_display,
            result_text,
            solve_time,
            total_time,
            stats.asserting_fraction(qute::qbf::ConstraintKind::Clause),
            stats.learned_total[qute::qbf::kind_index(qute::qbf::ConstraintKind::Clause)],
            stats.asserting_fraction(qute::qbf::ConstraintKind::Term),
            stats.learned_total[qute::qbf::kind_index(qute::qbf::ConstraintKind::Term)],
        );
    } else {
        println!("{}", result_text);
    }

    if options.partial_certificate {
        if let Some(cert) = outcome.solutions.last() {
            print_certificate(cert, &solver);
        }
    }

    if options.print_stats {
        print_stats(stats);
    }

    Ok(exit_code)
}

fn print_certificate(cert: &[qute::qbf::Lit], solver: &Solver) {
    let mut out = io::stdout();
    let _ = write!(out, "v");
    for &l in cert {
        let name = solver.name_of(l.var());
        let _ = write!(out, " {}", if l.sign() { -name } else { name });
    }
    let _ = writeln!(out, " 0");
}

fn print_stats(stats: &qute::qbf::Stats) {
    eprintln!("decisions:              {}", stats.decisions);
    eprintln!("random decisions:       {}", stats.random_decisions);
    eprintln!("propagations:           {}", stats.propagations);
    eprintln!("conflicts/solutions:    {}", stats.conflicts);
    eprintln!("restarts:               {}", stats.restarts);
    eprintln!("backtracks (total):     {}", stats.backtracks_total);
    eprintln!("backtracks (dep-learn): {}", stats.backtracks_dependency);
    eprintln!("dependencies learned:   {}", stats.dependencies_learned);
    eprintln!("clean-ups:              {}", stats.cleanups);
    eprintln!("compactions:            {}", stats.compactions);
    eprintln!(
        "learnt clauses:         {} ({:.1}% asserting)",
        stats.learned_total[qute::qbf::kind_index(qute::qbf::ConstraintKind::Clause)],
        100.0 * stats.asserting_fraction(qute::qbf::ConstraintKind::Clause)
    );
    eprintln!(
        "learnt terms:           {} ({:.1}% asserting)",
        stats.learned_total[qute::qbf::kind_index(qute::qbf::ConstraintKind::Term)],
        100.0 * stats.asserting_fraction(qute::qbf::ConstraintKind::Term)
    );
    eprintln!(
        "initial terms:          {} (avg size {:.1})",
        stats.initial_terms_generated, stats.average_initial_term_size
    );
    if let Some(peak) = qute::util::mem_used_peak() {
        eprintln!("peak memory:            {} KB", peak);
    }
}

fn build_heuristic(options: &Options) -> DecisionHeuristic {
    match options.heuristic {
        HeuristicChoice::Vmtf => DecisionHeuristic::vmtf(options.phase, options.phase_seed, options.no_phase_saving),
        HeuristicChoice::Vsids => DecisionHeuristic::vsids(options.vsids.clone(), options.phase, options.phase_seed, options.no_phase_saving),
        HeuristicChoice::Sgdb => DecisionHeuristic::sgdb(options.sgdb.clone(), options.phase, options.phase_seed, options.no_phase_saving),
    }
}

fn build_restart(options: &Options) -> RestartScheduler {
    match options.restart {
        RestartChoice::None => RestartScheduler::none(),
        RestartChoice::InnerOuter => RestartScheduler::inner_outer(options.inner_outer),
        RestartChoice::Luby => RestartScheduler::luby(options.luby_multiplier),
        RestartChoice::Ema => RestartScheduler::ema(options.ema),
    }
}
