use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::Cursor;
use std::rc::Rc;
use std::thread;
use std::time::Duration;

use regsynth::dsl::{Grammar, ProdKind};
use regsynth::enumerator::EnumeratorKind;
use regsynth::error::{SynthError, SynthResult};
use regsynth::interpreter::full_match;
use regsynth::oracle::{InteractiveOracle, Oracle};
use regsynth::synthesizer::{Examples, KillSwitch, Outcome, SynthConfig, Synthesizer};

pub const ALL_METHODS: [EnumeratorKind; 2] = [EnumeratorKind::KTree, EnumeratorKind::Smt];

fn init_log() {
    let _ = colog::default_builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

fn config(method: EnumeratorKind, min_depth: usize, max_depth: usize) -> SynthConfig {
    SynthConfig {
        min_depth,
        max_depth,
        enumerator: method,
        ..SynthConfig::default()
    }
}

/// Answers from a script and remembers what it was asked.
struct Scripted {
    answers: VecDeque<bool>,
    asked: Rc<RefCell<Vec<String>>>,
}

impl Oracle for Scripted {
    fn answer(&mut self, input: &str) -> SynthResult<bool> {
        self.asked.borrow_mut().push(input.to_string());
        self.answers.pop_front().ok_or(SynthError::OracleClosed)
    }
}

/// Takes its time, trips the kill switch, then says no.
struct SlowKill {
    wait: Duration,
    kill: KillSwitch,
}

impl Oracle for SlowKill {
    fn answer(&mut self, _input: &str) -> SynthResult<bool> {
        thread::sleep(self.wait);
        self.kill.kill();
        Ok(false)
    }
}

// a, c, union
fn a_or_c_grammar() -> Grammar {
    Grammar::builder()
        .literal("a")
        .literal("c")
        .operator(ProdKind::Union)
        .build()
        .unwrap()
}

fn assert_language(regex: &str, accepts: &[&str], rejects: &[&str]) {
    let regex = full_match(regex).unwrap();

    for s in accepts {
        assert!(regex.is_match(s), "{regex} should accept {s:?}");
    }
    for s in rejects {
        assert!(!regex.is_match(s), "{regex} should reject {s:?}");
    }
}

#[test]
fn finds_smallest_depth_with_ground_truth() {
    init_log();

    for method in ALL_METHODS {
        let grammar = Grammar::builder()
            .literal("a")
            .literal("b")
            .literal("c")
            .literal("d")
            .operator(ProdKind::Concat)
            .operator(ProdKind::Union)
            .build()
            .unwrap();
        let mut synth = Synthesizer::with_ground_truth(
            grammar,
            Examples::new(["abc", "abd"], ["xyz"]),
            "ab[cd]",
            config(method, 1, 3),
            KillSwitch::new(),
        ).unwrap();

        let sol = match synth.synthesize().unwrap() {
            Outcome::Found(sol) => sol,
            other => panic!("{method}: expected a solution, got {other:?}"),
        };

        assert_eq!(sol.depth, 2, "{method}");
        assert_eq!(synth.diagnostics().depths_tried(), vec![1, 2], "{method}");
        assert_language(
            &sol.regex,
            &["abc", "abd"],
            &["xyz", "abe", "bbc", "ab", "abcd"],
        );
    }
}

#[test]
fn kill_during_oracle_wait_keeps_best() {
    init_log();

    let kill = KillSwitch::new();
    let oracle = SlowKill {
        wait: Duration::from_millis(400),
        kill: kill.clone(),
    };
    let mut synth = Synthesizer::new(
        a_or_c_grammar(),
        Examples::new(["a"], ["b"]),
        Box::new(oracle),
        config(EnumeratorKind::KTree, 1, 3),
        kill,
    ).unwrap();

    let outcome = synth.synthesize().unwrap();
    let diag = synth.diagnostics();

    match outcome {
        Outcome::Killed { best: Some(sol) } => assert_eq!(sol.regex, "a"),
        other => panic!("expected a kill with a candidate, got {other:?}"),
    }
    assert_eq!(diag.interactions, 1);
    assert_eq!(diag.depths_tried(), vec![1]);
    assert!(diag.elapsed < Duration::from_millis(400), "{:?}", diag.elapsed);
    assert!(diag.depth_times.iter().all(|(_, t)| *t < Duration::from_millis(400)));
}

#[test]
fn oracle_answer_collapses_candidates() {
    init_log();

    for method in ALL_METHODS {
        let asked = Rc::new(RefCell::new(Vec::new()));
        let oracle = Scripted {
            answers: VecDeque::from([false]),
            asked: asked.clone(),
        };
        let mut synth = Synthesizer::new(
            a_or_c_grammar(),
            Examples::new(["a"], ["b"]),
            Box::new(oracle),
            config(method, 1, 1),
            KillSwitch::new(),
        ).unwrap();

        let outcome = synth.synthesize().unwrap();

        assert_eq!(outcome.solution().map(|s| s.regex.as_str()), Some("a"), "{method}");
        assert_eq!(*asked.borrow(), vec!["c".to_string()]);
        assert_eq!(synth.diagnostics().interactions, 1);
        assert!(synth.decider().examples().iter().any(|ex| ex.input == "c" && !ex.label));
    }
}

#[test]
fn interactive_oracle_drives_the_search() {
    init_log();

    let oracle = InteractiveOracle::new(Cursor::new("what?\nno\n"), Vec::new());
    let mut synth = Synthesizer::new(
        a_or_c_grammar(),
        Examples::new(["a"], ["b"]),
        Box::new(oracle),
        config(EnumeratorKind::KTree, 1, 1),
        KillSwitch::new(),
    ).unwrap();

    let outcome = synth.synthesize().unwrap();

    assert_eq!(outcome.solution().map(|s| s.regex.as_str()), Some("a"));
}

#[test]
fn closed_oracle_is_an_error() {
    init_log();

    let oracle = InteractiveOracle::new(Cursor::new(""), Vec::new());
    let mut synth = Synthesizer::new(
        a_or_c_grammar(),
        Examples::new(["a"], ["b"]),
        Box::new(oracle),
        config(EnumeratorKind::KTree, 1, 1),
        KillSwitch::new(),
    ).unwrap();

    assert!(matches!(synth.synthesize(), Err(SynthError::OracleClosed)));
}

#[test]
fn indistinguishable_candidates_keep_the_smallest() {
    init_log();

    // union(a, a) and a agree on everything
    let grammar = Grammar::builder()
        .literal("a")
        .operator(ProdKind::Union)
        .build()
        .unwrap();
    let mut synth = Synthesizer::with_ground_truth(
        grammar,
        Examples::new(["a"], ["b"]),
        "a",
        config(EnumeratorKind::KTree, 1, 1),
        KillSwitch::new(),
    ).unwrap();

    let outcome = synth.synthesize().unwrap();
    let sol = outcome.solution().unwrap();

    assert_eq!(sol.regex, "a");
    assert_eq!(sol.nodes(), 1);
    assert_eq!(synth.diagnostics().interactions, 0);
    assert!(synth.diagnostics().indistinguishable >= 1);
}

#[test]
fn exhausts_every_depth_without_solution() {
    init_log();

    for method in ALL_METHODS {
        let grammar = Grammar::builder()
            .literal("a")
            .operator(ProdKind::Kleene)
            .build()
            .unwrap();
        let mut synth = Synthesizer::with_ground_truth(
            grammar,
            Examples::new(["b"], []),
            "b",
            config(method, 3, 6),
            KillSwitch::new(),
        ).unwrap();

        let outcome = synth.synthesize().unwrap();

        assert!(matches!(outcome, Outcome::NoSolution), "{method}: {outcome:?}");
        assert_eq!(synth.diagnostics().depths_tried(), vec![3, 4, 5, 6]);
        assert_eq!(synth.diagnostics().accepted, 0);
    }
}

#[test]
fn killed_before_start() {
    init_log();

    let kill = KillSwitch::new();
    let mut synth = Synthesizer::with_ground_truth(
        a_or_c_grammar(),
        Examples::new(["a"], ["b"]),
        "a",
        config(EnumeratorKind::KTree, 1, 3),
        kill.clone(),
    ).unwrap();

    kill.kill();
    let outcome = synth.synthesize().unwrap();

    assert!(matches!(outcome, Outcome::Killed { best: None }));
    assert_eq!(synth.diagnostics().enumerated, 0);
}

#[test]
fn first_candidate_without_disambiguation() {
    init_log();

    let cfg = SynthConfig {
        disambiguate: false,
        ..config(EnumeratorKind::KTree, 0, 2)
    };
    let mut synth = Synthesizer::with_ground_truth(
        a_or_c_grammar(),
        Examples::new(["a"], ["b"]),
        "a|c",
        cfg,
        KillSwitch::new(),
    ).unwrap();

    let outcome = synth.synthesize().unwrap();

    assert_eq!(outcome.solution().map(|s| s.regex.as_str()), Some("a"));
    assert_eq!(synth.diagnostics().depths_tried(), vec![0]);
    assert_eq!(synth.diagnostics().interactions, 0);
}

#[test]
fn solution_carries_capture_groups() {
    init_log();

    let grammar = Grammar::builder()
        .literal("a")
        .literal("b")
        .operator(ProdKind::Concat)
        .build()
        .unwrap();
    let examples = Examples::new(["ab"], ["ba"])
        .with_captures(vec![vec!["b".to_string()]]);
    let mut synth = Synthesizer::with_ground_truth(
        grammar,
        examples,
        "ab",
        config(EnumeratorKind::KTree, 0, 1),
        KillSwitch::new(),
    ).unwrap();

    let outcome = synth.synthesize().unwrap();
    let sol = outcome.solution().unwrap();

    assert_eq!(sol.regex, "a(b)");
    assert_eq!(sol.capture_groups(), 1);
}

#[test]
fn configuration_faults_surface_before_search() {
    init_log();

    let res = Synthesizer::with_ground_truth(
        a_or_c_grammar(),
        Examples::new(["a"], []).with_captures(vec![vec!["a".into()], vec!["b".into()]]),
        "a",
        SynthConfig::default(),
        KillSwitch::new(),
    );
    assert!(matches!(res, Err(SynthError::CaptureArity { .. })));

    let res = Synthesizer::with_ground_truth(
        a_or_c_grammar(),
        Examples::new(Vec::<String>::new(), vec!["b".to_string()]),
        "a",
        SynthConfig::default(),
        KillSwitch::new(),
    );
    assert!(matches!(res, Err(SynthError::NoValidExamples)));

    let res = Synthesizer::with_ground_truth(
        a_or_c_grammar(),
        Examples::new(["a"], []),
        "(a",
        SynthConfig::default(),
        KillSwitch::new(),
    );
    assert!(matches!(res, Err(SynthError::InvalidGroundTruth { .. })));
}
