use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};

use crate::candidate::{Candidate, Solution};
use crate::capturer::{Capturer, Captures};
use crate::decider::{Analysis, Example, Predicate, RegexDecider};
use crate::distinguisher::{Distinguisher, DEFAULT_BUDGET, DEFAULT_MAX_LEN};
use crate::dsl::Grammar;
use crate::enumerator::{AnyEnumerator, Enumerator, EnumeratorKind};
use crate::error::{SynthError, SynthResult};
use crate::interpreter::Interpreter;
use crate::oracle::{GroundTruthOracle, Oracle};
use crate::program::Program;

pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct SynthConfig {
    pub min_depth: usize,
    pub max_depth: usize,
    /// Indistinguishable verdicts tolerated before a depth is settled.
    pub max_indistinguishable: usize,
    /// Forward the decider's predicates to the enumerator.
    pub pruning: bool,
    pub enumerator: EnumeratorKind,
    /// Keep programs whose capture groups couldn't be placed.
    pub captures_optional: bool,
    /// Ask the oracle to pick between candidates. Without it, the first
    /// accepted program wins.
    pub disambiguate: bool,
    pub distinguish_max_len: usize,
    pub distinguish_budget: usize,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            min_depth: 3,
            max_depth: 6,
            max_indistinguishable: 3,
            pruning: true,
            enumerator: EnumeratorKind::KTree,
            captures_optional: false,
            disambiguate: true,
            distinguish_max_len: DEFAULT_MAX_LEN,
            distinguish_budget: DEFAULT_BUDGET,
        }
    }
}

/// Cooperative cancellation flag. Clones share the flag, so it can be
/// handed to another thread.
#[derive(Debug, Clone, Default)]
pub struct KillSwitch(Arc<AtomicBool>);

impl KillSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kill(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_killed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The user's examples. `captures` has one row per valid example (or is
/// empty), `condition_invalid` lists invalid inputs that capture conditions
/// should reject.
#[derive(Debug, Clone, Default)]
pub struct Examples {
    pub valid: Vec<String>,
    pub invalid: Vec<String>,
    pub captures: Vec<Vec<String>>,
    pub condition_invalid: Vec<String>,
}

impl Examples {
    pub fn new<S: Into<String>>(
        valid: impl IntoIterator<Item = S>,
        invalid: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            valid: valid.into_iter().map(Into::into).collect(),
            invalid: invalid.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_captures(mut self, captures: Vec<Vec<String>>) -> Self {
        self.captures = captures;
        self
    }

    pub fn with_condition_invalid(mut self, condition_invalid: Vec<String>) -> Self {
        self.condition_invalid = condition_invalid;
        self
    }
}

/// Counters and timings of a run. Nothing here feeds back into the search.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    pub enumerated: usize,
    pub rejected: usize,
    pub accepted: usize,
    pub interactions: usize,
    pub indistinguishable: usize,
    pub regex_time: Duration,
    pub distinguish_time: Duration,
    pub capture_time: Duration,
    pub depth_times: Vec<(usize, Duration)>,
    pub elapsed: Duration,
}

impl Diagnostics {
    pub fn depths_tried(&self) -> Vec<usize> {
        self.depth_times.iter().map(|(depth, _)| *depth).collect()
    }
}

#[derive(Debug, Clone)]
pub enum Outcome {
    Found(Solution),
    Killed { best: Option<Solution> },
    NoSolution,
}

impl Outcome {
    pub fn solution(&self) -> Option<&Solution> {
        match self {
            Outcome::Found(sol) => Some(sol),
            Outcome::Killed { best } => best.as_ref(),
            Outcome::NoSolution => None,
        }
    }
}

#[derive(Clone, Debug)]
pub enum SearchStep {
    Rejected {
        program: Program,
        predicates: Vec<Predicate>,
    },
    Accepted {
        program: Program,
        /// Whether it made it into the candidate set.
        kept: bool,
    },
}

enum DepthEnd {
    Done,
    Killed,
}

pub struct Synthesizer {
    grammar: Rc<Grammar>,
    interpreter: Interpreter,
    decider: RegexDecider,
    distinguisher: Distinguisher,
    capturer: Capturer,
    oracle: Box<dyn Oracle>,
    ground_truth: Option<String>,
    config: SynthConfig,
    kill: KillSwitch,
    candidates: Vec<Candidate>,
    indistinguishable: usize,
    diagnostics: Diagnostics,
    start: Instant,
    waited: Duration,
    last_progress: Instant,
}

impl Synthesizer {
    pub fn new(
        grammar: Grammar,
        examples: Examples,
        oracle: Box<dyn Oracle>,
        config: SynthConfig,
        kill: KillSwitch,
    ) -> SynthResult<Self> {
        if config.min_depth > config.max_depth {
            return Err(SynthError::InvalidDepthRange {
                min: config.min_depth,
                max: config.max_depth,
            });
        }
        if examples.valid.is_empty() {
            return Err(SynthError::NoValidExamples);
        }

        let grammar = Rc::new(grammar);
        let interpreter = Interpreter::new(grammar.clone());
        let labeled: Vec<Example> = examples.valid.iter()
            .map(|s| Example::new(s.as_str(), true))
            .chain(examples.invalid.iter().map(|s| Example::new(s.as_str(), false)))
            .collect();
        let distinguisher = Distinguisher::with_limits(
            interpreter.clone(),
            &labeled,
            config.distinguish_max_len,
            config.distinguish_budget,
        );
        let capturer = Capturer::new(
            interpreter.clone(),
            examples.valid,
            examples.captures,
            examples.condition_invalid,
        )?;

        Ok(Self {
            decider: RegexDecider::new(interpreter.clone(), labeled),
            grammar,
            interpreter,
            distinguisher,
            capturer,
            oracle,
            ground_truth: None,
            config,
            kill,
            candidates: Vec::new(),
            indistinguishable: 0,
            diagnostics: Diagnostics::default(),
            start: Instant::now(),
            waited: Duration::ZERO,
            last_progress: Instant::now(),
        })
    }

    /// Automatic mode: the oracle full-matches against `ground_truth`.
    pub fn with_ground_truth(
        grammar: Grammar,
        examples: Examples,
        ground_truth: &str,
        config: SynthConfig,
        kill: KillSwitch,
    ) -> SynthResult<Self> {
        let oracle = GroundTruthOracle::new(ground_truth)?;
        let mut res = Self::new(grammar, examples, Box::new(oracle), config, kill)?;
        res.ground_truth = Some(ground_truth.to_string());

        Ok(res)
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn decider(&self) -> &RegexDecider {
        &self.decider
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn config(&self) -> &SynthConfig {
        &self.config
    }

    pub fn synthesize(&mut self) -> SynthResult<Outcome> {
        self.start = Instant::now();
        self.last_progress = self.start;

        let z3 = z3::Context::new(&z3::Config::new());

        info!(
            "Synthesizing with {} over depths {}..={}",
            self.config.enumerator,
            self.config.min_depth,
            self.config.max_depth,
        );

        for depth in self.config.min_depth..=self.config.max_depth {
            let depth_start = Instant::now();
            let waited_before = self.waited;
            let enumerator = AnyEnumerator::build(
                self.config.enumerator,
                &z3,
                self.grammar.clone(),
                depth,
            );

            let end = self.try_for_depth(enumerator, depth);
            let spent = depth_start.elapsed().saturating_sub(self.waited - waited_before);
            self.diagnostics.depth_times.push((depth, spent));
            debug!("Depth {depth} took {spent:?}");

            match end? {
                DepthEnd::Killed => {
                    info!("Killed at depth {depth}");
                    let best = self.best(depth)?;
                    return Ok(self.terminate(Outcome::Killed { best }));
                },
                DepthEnd::Done => {
                    if let Some(sol) = self.best(depth)? {
                        return Ok(self.terminate(Outcome::Found(sol)));
                    }
                },
            }
        }

        Ok(self.terminate(Outcome::NoSolution))
    }

    fn try_for_depth<E: Enumerator>(&mut self, mut enumerator: E, depth: usize) -> SynthResult<DepthEnd> {
        loop {
            if self.kill.is_killed() {
                return Ok(DepthEnd::Killed);
            }
            self.progress(depth);

            let t = Instant::now();
            let step = self.step(&mut enumerator);
            self.diagnostics.regex_time += t.elapsed();

            let Some(step) = step else { break };
            trace!("{step:?}");

            if !self.config.disambiguate {
                if self.candidates.is_empty() {
                    continue;
                }
                break;
            }

            while self.candidates.len() >= 2 {
                self.distinguish()?;

                if self.kill.is_killed() {
                    return Ok(DepthEnd::Killed);
                }
            }

            if self.indistinguishable >= self.config.max_indistinguishable {
                debug!("Too many indistinguishable candidates, settling depth {depth}");
                break;
            }
        }

        Ok(DepthEnd::Done)
    }

    /// Enumerates and checks one program.
    pub fn step<E: Enumerator>(&mut self, enumerator: &mut E) -> Option<SearchStep> {
        let program = enumerator.next_program()?;
        self.diagnostics.enumerated += 1;

        debug!("Try: {}", program.display(&self.grammar));

        match self.decider.analyze(&program) {
            Analysis::Bad(predicates) => {
                self.diagnostics.rejected += 1;
                if self.config.pruning {
                    enumerator.update(Some(predicates.as_slice()));
                } else {
                    enumerator.update(None);
                }

                Some(SearchStep::Rejected { program, predicates })
            },
            Analysis::Ok => {
                enumerator.update(None);
                self.diagnostics.accepted += 1;
                let kept = self.accept(program.clone());

                Some(SearchStep::Accepted { program, kept })
            },
        }
    }

    fn accept(&mut self, program: Program) -> bool {
        let t = Instant::now();
        let captures = match self.capturer.synthesize_capturing_groups(&program) {
            Some(captures) => captures,
            None if self.config.captures_optional => Captures::new(Vec::new()),
            None => {
                debug!("No capture groups fit {}, dropping it", program.display(&self.grammar));
                self.diagnostics.capture_time += t.elapsed();
                return false;
            },
        };
        let conditions = self.capturer.synthesize_capture_conditions(&program)
            .unwrap_or_default();
        self.diagnostics.capture_time += t.elapsed();

        match Candidate::new(&self.interpreter, program, captures, conditions) {
            Ok(cand) => {
                info!("Accepted: {}", cand.program.display(&self.grammar));
                self.candidates.push(cand);
                true
            },
            Err(e) => {
                warn!("Accepted program doesn't compile: {e}");
                false
            },
        }
    }

    /// Runs one distinguishing round over the candidate set, consulting the
    /// oracle if an input separates them.
    pub fn distinguish(&mut self) -> SynthResult<()> {
        let t = Instant::now();
        let res = self.distinguisher.distinguish(&self.candidates);
        self.diagnostics.distinguish_time += t.elapsed();

        let Some(input) = res.input else {
            self.indistinguishable += 1;
            self.diagnostics.indistinguishable += 1;
            if let Some(idx) = self.smallest() {
                let kept = self.candidates.swap_remove(idx);
                info!(
                    "{} candidates are indistinguishable, keeping {}",
                    self.candidates.len() + 1,
                    kept.program.display(&self.grammar),
                );
                self.candidates = vec![kept];
            }
            return Ok(());
        };

        let mut keep_if_valid = res.keep_if_valid;
        let mut keep_if_invalid = res.keep_if_invalid;
        for idx in res.undetermined {
            if self.candidates[idx].accepts(&input) {
                keep_if_valid.push(idx);
            } else {
                keep_if_invalid.push(idx);
            }
        }

        let asked = Instant::now();
        let answer = self.oracle.answer(&input)?;
        let waited = asked.elapsed();
        self.start += waited;
        self.last_progress += waited;
        self.waited += waited;
        self.diagnostics.interactions += 1;

        self.decider.add_example(input.as_str(), answer);

        let keep = if answer { keep_if_valid } else { keep_if_invalid };
        let before = self.candidates.len();
        self.candidates = std::mem::take(&mut self.candidates)
            .into_iter()
            .enumerate()
            .filter(|(idx, _)| keep.contains(idx))
            .map(|(_, cand)| cand)
            .collect();

        debug!("{input:?} answered {answer}: {before} -> {} candidates", self.candidates.len());

        Ok(())
    }

    /// Fewest nodes first, then the shortest rendering.
    fn smallest(&self) -> Option<usize> {
        self.candidates.iter()
            .enumerate()
            .min_by_key(|(_, cand)| {
                let rendered = self.interpreter.eval(&cand.program)
                    .map_or(usize::MAX, |s| s.len());
                (cand.size(), rendered)
            })
            .map(|(idx, _)| idx)
    }

    fn best(&self, depth: usize) -> SynthResult<Option<Solution>> {
        let Some(idx) = self.smallest() else { return Ok(None) };
        let cand = self.candidates[idx].clone();

        Ok(Some(Solution::new(&self.interpreter, cand, depth)?))
    }

    fn progress(&mut self, depth: usize) {
        if self.last_progress.elapsed() < PROGRESS_INTERVAL {
            return;
        }

        self.last_progress = Instant::now();
        info!(
            "Depth {depth}: {} enumerated, {} rejected, {} candidates, {:?} elapsed",
            self.diagnostics.enumerated,
            self.diagnostics.rejected,
            self.candidates.len(),
            self.start.elapsed(),
        );
    }

    fn terminate(&mut self, outcome: Outcome) -> Outcome {
        let diag = &mut self.diagnostics;
        diag.elapsed = self.start.elapsed();

        info!("Enumerator: {}", self.config.enumerator);
        info!(
            "Enumerated {}, rejected {}, accepted {}",
            diag.enumerated, diag.rejected, diag.accepted,
        );
        info!(
            "Interactions {}, indistinguishable {}",
            diag.interactions, diag.indistinguishable,
        );
        info!(
            "Regex synthesis {:?}, distinguishing {:?}, capture synthesis {:?}, total {:?}",
            diag.regex_time, diag.distinguish_time, diag.capture_time, diag.elapsed,
        );
        for (depth, time) in &diag.depth_times {
            info!("Depth {depth}: {time:?}");
        }

        match &outcome {
            Outcome::Found(sol) => info!(
                "Solution: {sol} ({} capture groups, {} nodes, depth {})",
                sol.capture_groups(),
                sol.nodes(),
                sol.depth,
            ),
            Outcome::Killed { best: Some(sol) } => info!("Killed, best so far: {sol}"),
            Outcome::Killed { best: None } => info!("Killed without a candidate"),
            Outcome::NoSolution => info!("No solution"),
        }
        if let Some(truth) = &self.ground_truth {
            info!("Ground truth: {truth}");
        }

        outcome
    }
}
