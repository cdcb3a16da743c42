//! lexalign command-line tool
//!
//! Aligns two ontology files, optionally writes the alignment and scores it
//! against a reference. `--pairs` runs a batch file of graph pairs instead,
//! and `--compare-sequential` checks a single-worker run against the pool.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use tracing::error;
use tracing_subscriber::EnvFilter;

use lexalign::{
    AlignConfig, AlignError, AlignmentBatch, AlignmentFormat, AlignmentOutcome, AlignmentTask,
    EvaluationResult, ParallelComparison, RunStatus,
};

const USAGE_EXIT: u8 = 2;

/// Parsed command line.
#[derive(Default)]
struct Args {
    source: Option<PathBuf>,
    target: Option<PathBuf>,
    output: Option<PathBuf>,
    format: Option<AlignmentFormat>,
    reference: Option<PathBuf>,
    pairs: Option<PathBuf>,
    compare_sequential: bool,
    config_file: Option<PathBuf>,
    threshold: Option<f64>,
    threads: Option<usize>,
    chunks_per_worker: Option<usize>,
    timeout_ms: Option<u64>,
}

fn usage_error(message: &str) -> ! {
    eprintln!("error: {message}");
    eprintln!("Run 'lexalign --help' for usage.");
    std::process::exit(i32::from(USAGE_EXIT));
}

fn print_help() {
    println!("lexalign - Parallel lexical ontology alignment");
    println!();
    println!("USAGE:");
    println!("    lexalign --source <FILE> --target <FILE> [OPTIONS]");
    println!("    lexalign --pairs <FILE> [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -s, --source <FILE>       First graph (.owl, .rdf, .ttl, .nt or .json)");
    println!("    -t, --target <FILE>       Second graph (.owl, .rdf, .ttl, .nt or .json)");
    println!("    -o, --output <FILE>       Write the alignment to FILE");
    println!("    -f, --format <FORMAT>     Output format: turtle | json [default: from extension]");
    println!("    -r, --reference <FILE>    Reference alignment to evaluate against");
    println!("    -p, --pairs <FILE>        JSON batch file: [{{\"source\", \"target\", \"output\"?, \"reference\"?}}]");
    println!("        --compare-sequential  Also run with one worker and check both results agree");
    println!("    -c, --config <FILE>       JSON config file");
    println!("        --threshold <FLOAT>   Similarity threshold [default: 0.8]");
    println!("    -j, --threads <N>         Worker threads [default: available cores]");
    println!("        --chunks-per-worker <N>  Chunks handed to each worker [default: 1]");
    println!("        --timeout-ms <MS>     Abort the run after MS milliseconds");
    println!("    -h, --help                Print help information");
    println!();
    println!("ENVIRONMENT:");
    println!("    LEXALIGN_THRESHOLD, LEXALIGN_THREADS, LEXALIGN_TIMEOUT_MS, RUST_LOG");
}

fn value<'a>(args: &'a [String], i: usize, flag: &str) -> &'a str {
    match args.get(i + 1) {
        Some(v) => v.as_str(),
        None => usage_error(&format!("{flag} requires a value")),
    }
}

fn parse<T: std::str::FromStr>(raw: &str, flag: &str) -> T {
    raw.parse()
        .unwrap_or_else(|_| usage_error(&format!("invalid value for {flag}: {raw}")))
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args::default();

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--compare-sequential" => {
                parsed.compare_sequential = true;
                i += 1;
                continue;
            }
            "--pairs" | "-p" => parsed.pairs = Some(PathBuf::from(value(&args, i, flag))),
            "--source" | "-s" => parsed.source = Some(PathBuf::from(value(&args, i, flag))),
            "--target" | "-t" => parsed.target = Some(PathBuf::from(value(&args, i, flag))),
            "--output" | "-o" => parsed.output = Some(PathBuf::from(value(&args, i, flag))),
            "--format" | "-f" => parsed.format = Some(parse(value(&args, i, flag), flag)),
            "--reference" | "-r" => parsed.reference = Some(PathBuf::from(value(&args, i, flag))),
            "--config" | "-c" => parsed.config_file = Some(PathBuf::from(value(&args, i, flag))),
            "--threshold" => parsed.threshold = Some(parse(value(&args, i, flag), flag)),
            "--threads" | "-j" => parsed.threads = Some(parse(value(&args, i, flag), flag)),
            "--chunks-per-worker" => {
                parsed.chunks_per_worker = Some(parse(value(&args, i, flag), flag));
            }
            "--timeout-ms" => parsed.timeout_ms = Some(parse(value(&args, i, flag), flag)),
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            arg => usage_error(&format!("unknown argument: {arg}")),
        }
        i += 2;
    }

    if parsed.pairs.is_some() {
        if parsed.source.is_some() || parsed.target.is_some() {
            usage_error("--pairs cannot be combined with --source or --target");
        }
        if parsed.output.is_some() || parsed.reference.is_some() {
            usage_error("--output and --reference are set per pair in the batch file");
        }
        if parsed.compare_sequential {
            usage_error("--compare-sequential needs a single --source/--target pair");
        }
    } else if parsed.source.is_none() || parsed.target.is_none() {
        usage_error("--source and --target are required");
    }
    parsed
}

fn build_config(args: &Args) -> Result<AlignConfig, AlignError> {
    let config = match &args.config_file {
        Some(path) => AlignConfig::from_json_file(path)?,
        None => AlignConfig::default(),
    };
    let mut config = config.with_env_overrides(|key| std::env::var(key).ok())?;

    if let Some(threshold) = args.threshold {
        config.threshold = threshold;
    }
    if let Some(threads) = args.threads {
        config.parallelism = threads;
    }
    if let Some(n) = args.chunks_per_worker {
        config.chunks_per_worker = n;
    }
    if let Some(ms) = args.timeout_ms {
        config = config.with_timeout(Duration::from_millis(ms));
    }
    config.validate()?;
    Ok(config)
}

fn run(args: Args) -> Result<(), AlignError> {
    let config = build_config(&args)?;

    if let Some(pairs) = &args.pairs {
        let outcomes = AlignmentBatch::from_json_file(pairs)?
            .with_config(config)
            .run()?;
        for (index, outcome) in outcomes.iter().enumerate() {
            if index > 0 {
                println!();
            }
            println!("pair:       {}", index + 1);
            print_outcome(outcome);
        }
        return Ok(());
    }

    let (Some(source), Some(target)) = (args.source, args.target) else {
        return Err(AlignError::internal("source and target checked by parse_args"));
    };
    let mut task = AlignmentTask::new(source, target).with_config(config);
    if let Some(output) = args.output {
        let format = args
            .format
            .unwrap_or_else(|| AlignmentFormat::from_path(&output));
        task = task.with_output(output, format);
    }
    if let Some(reference) = args.reference {
        task = task.with_reference(reference);
    }

    if args.compare_sequential {
        print_comparison(&task.compare_sequential()?);
    } else {
        print_outcome(&task.run()?);
    }
    Ok(())
}

fn print_outcome(outcome: &AlignmentOutcome) {
    let report = &outcome.report;

    println!("run:        {}", report.run_id);
    println!("status:     {}", report.status);
    println!(
        "entities:   {} x {} ({} pairs, {} workers)",
        outcome.source_entities, outcome.target_entities, report.pairs_total, report.workers
    );
    println!("matches:    {}", report.matches.len());
    println!("skipped:    {}", report.skipped_pairs);
    println!("fingerprint: {}", report.matches.fingerprint());
    println!(
        "time:       load {:.3}s, matching {:.3}s",
        outcome.timings.load.as_secs_f64(),
        outcome.timings.matching.as_secs_f64()
    );
    for data_error in &report.data_errors {
        println!("data error: {data_error}");
    }
    if let Some(evaluation) = &outcome.evaluation {
        print_evaluation(evaluation);
    }
    if report.status == RunStatus::Cancelled {
        println!(
            "warning: run cancelled after {} of {} chunks",
            report.chunks_completed, report.chunks_total
        );
    }
}

fn print_comparison(comparison: &ParallelComparison) {
    let parallel = &comparison.parallel;

    println!(
        "entities:   {} x {} ({} pairs)",
        comparison.source_entities, comparison.target_entities, parallel.pairs_total
    );
    println!("matches:    {}", parallel.matches.len());
    println!("skipped:    {}", parallel.skipped_pairs);
    println!("fingerprint: {}", parallel.matches.fingerprint());
    println!("sequential: {:.3}s", comparison.sequential.elapsed.as_secs_f64());
    println!(
        "parallel:   {:.3}s ({} workers, speedup {:.2}x)",
        parallel.elapsed.as_secs_f64(),
        parallel.workers,
        comparison.speedup()
    );
    println!("agree:      {}", comparison.results_agree());
    if let Some(evaluation) = &comparison.parallel_evaluation {
        print_evaluation(evaluation);
    }
}

fn print_evaluation(evaluation: &EvaluationResult) {
    println!("precision:  {:.3}", evaluation.precision);
    println!("recall:     {:.3}", evaluation.recall);
    println!("f-score:    {:.3}", evaluation.f_score);
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if err.is_validation() => {
            error!(error = %err, "invalid configuration");
            eprintln!("error: {err}");
            ExitCode::from(USAGE_EXIT)
        }
        Err(err) => {
            error!(error = %err, "alignment failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
