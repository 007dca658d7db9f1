use std::thread;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use log::{info, LevelFilter};

use regsynth::dsl::GrammarBuilder;
use regsynth::enumerator::EnumeratorKind;
use regsynth::oracle::InteractiveOracle;
use regsynth::synthesizer::{Examples, KillSwitch, Outcome, SynthConfig, Synthesizer};

/// Synthesizes a regex from valid and invalid examples.
#[derive(Parser, Debug)]
#[command(name = "regsynth", version)]
struct Args {
    /// A string the regex must accept
    #[arg(short, long = "valid", required = true)]
    valid: Vec<String>,

    /// A string the regex must reject
    #[arg(short, long = "invalid")]
    invalid: Vec<String>,

    /// Regex answering distinguishing questions in automatic mode
    #[arg(short, long)]
    ground_truth: Option<String>,

    /// Answer questions from the ground truth instead of asking
    #[arg(long)]
    auto: bool,

    #[arg(long, value_enum, default_value_t = EnumeratorKind::KTree)]
    method: EnumeratorKind,

    #[arg(long, default_value_t = 3)]
    min_depth: usize,

    #[arg(long, default_value_t = 6)]
    max_depth: usize,

    #[arg(long)]
    no_pruning: bool,

    /// Give up after this many seconds
    #[arg(long)]
    timeout: Option<u64>,

    #[arg(long)]
    debug: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    colog::default_builder()
        .filter_level(if args.debug { LevelFilter::Debug } else { LevelFilter::Info })
        .init();

    info!("Started");

    let grammar = GrammarBuilder::from_examples(&args.valid, &args.invalid)?
        .build()
        .context("Failed to derive a grammar from the examples")?;
    let examples = Examples::new(args.valid, args.invalid);
    let config = SynthConfig {
        min_depth: args.min_depth,
        max_depth: args.max_depth,
        pruning: !args.no_pruning,
        enumerator: args.method,
        ..SynthConfig::default()
    };

    let kill = KillSwitch::new();
    if let Some(secs) = args.timeout {
        let kill = kill.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_secs(secs));
            kill.kill();
        });
    }

    let mut synth = if args.auto {
        let truth = args.ground_truth.as_deref().unwrap_or_default();
        Synthesizer::with_ground_truth(grammar, examples, truth, config, kill)?
    } else {
        Synthesizer::new(grammar, examples, Box::new(InteractiveOracle::stdio()), config, kill)?
    };

    match synth.synthesize().context("Synthesis failed")? {
        Outcome::Found(sol) => println!("{sol} ({} capture groups)", sol.capture_groups()),
        Outcome::Killed { best: Some(sol) } => println!("killed, best so far: {sol}"),
        Outcome::Killed { best: None } => println!("killed, no solution"),
        Outcome::NoSolution => println!("no solution"),
    }

    Ok(())
}
