use std::collections::BTreeSet;
use std::sync::atomic::Ordering;

use sym::{EnumeratingSolver, Evaluator};

use super::fixtures::{countdown, program, ORIGIN};
use crate::config::Config;
use crate::driver::*;
use crate::image::ProgramImage;
use crate::issue::IssueKind;
use crate::search::SearcherKind;
use crate::state::Status;

fn explorer(image: ProgramImage, config: Config) -> Result<Explorer<EnumeratingSolver>> {
    Explorer::new(image, EnumeratingSolver::new(), config)
}

#[test]
fn every_searcher_finds_every_path() -> Result<()> {
    let searchers = [
        SearcherKind::SimpleFifo,
        SearcherKind::SimpleFilo,
        SearcherKind::PrioritizedFilo,
        SearcherKind::RandomPicking,
    ];

    for searcher in searchers {
        let config = Config {
            searcher,
            ..Default::default()
        };
        let mut explorer = explorer(countdown(3), config)?;
        let summary = explorer.run()?;

        assert_eq!(summary.searcher, searcher);
        assert_eq!(summary.stop, StopReason::Exhausted);
        assert_eq!(summary.normal_states_left, 0);
        assert_eq!(summary.completed_states, 4);
        assert_eq!(summary.allocated_states, 4);
        assert_eq!(summary.issues, 0);
        assert_eq!(summary.coverage(), 1.0);

        // One test case per loop count
        let variable = explorer.image().inputs[0].variable;
        let mut counts = BTreeSet::new();
        for id in explorer.completed_states() {
            let state = explorer.state(id)?;
            assert_eq!(state.status(), Status::Halted);

            let model = explorer.test_case(id)?.expect("halted states are satisfiable");
            let evaluator = Evaluator::new(model.clone());
            for constraint in state.constraints().iter() {
                assert_eq!(evaluator.evaluate(constraint), Some(true));
            }
            counts.insert(model.get(variable).expect("assigned input"));
        }
        assert_eq!(counts, BTreeSet::from([0, 1, 2, 3]));
    }
    Ok(())
}

#[test]
fn pruning_covers_every_loop_segment() -> Result<()> {
    let config = Config {
        searcher: SearcherKind::Pruning,
        ..Default::default()
    };
    let mut explorer = explorer(countdown(20), config)?;
    assert_eq!(explorer.loops().map(|loops| loops.len()), Some(1));

    let summary = explorer.run()?;
    assert_eq!(summary.searcher, SearcherKind::Pruning);
    assert_eq!(summary.stop, StopReason::Exhausted);
    assert_eq!(summary.normal_states_left, 0);
    assert_eq!(summary.coverage(), 1.0);

    // Going around a covered loop again is not worth a separate test case
    assert!(summary.completed_states >= 2);
    assert!(summary.completed_states < 21);
    Ok(())
}

#[test]
fn pruning_falls_back_when_code_is_shared() -> Result<()> {
    let image = program(&[
        0x4802, // JSR A
        0x4802, // JSR B
        0xF025, // HALT
        0x0E01, // A BRnzp COMMON
        0x5020, // B AND R0, R0, #0
        0xC1C0, // COMMON RET
    ])
    .build(ORIGIN);
    let config = Config {
        searcher: SearcherKind::Pruning,
        ..Default::default()
    };
    let mut explorer = explorer(image, config)?;
    assert_eq!(explorer.searcher_kind(), SearcherKind::PrioritizedFilo);
    assert!(explorer.loops().is_none());
    assert!(explorer.issues().contains(IssueKind::ReuseCodeAcrossSubroutines));

    let summary = explorer.run()?;
    assert_eq!(summary.searcher, SearcherKind::PrioritizedFilo);
    assert_eq!(summary.completed_states, 1);
    Ok(())
}

#[test]
fn pruning_falls_back_on_too_many_segments() -> Result<()> {
    let config = Config {
        searcher: SearcherKind::Pruning,
        max_segments: Some(1),
        ..Default::default()
    };
    let explorer = explorer(countdown(3), config)?;
    assert_eq!(explorer.searcher_kind(), SearcherKind::PrioritizedFilo);
    assert!(explorer.loops().is_none());
    Ok(())
}

#[test]
fn cancelled_runs_stop_after_a_step() -> Result<()> {
    let mut explorer = explorer(countdown(3), Config::default())?;
    explorer.cancellation_token().store(true, Ordering::Relaxed);

    let summary = explorer.run()?;
    assert_eq!(summary.stop, StopReason::Cancelled);
    assert_eq!(summary.steps, 1);
    assert_eq!(summary.normal_states_left, 1);
    Ok(())
}

#[test]
fn completed_states_can_be_released() -> Result<()> {
    let config = Config {
        searcher: SearcherKind::SimpleFifo,
        release_completed: true,
        ..Default::default()
    };
    let mut explorer = explorer(countdown(3), config)?;
    let summary = explorer.run()?;

    assert_eq!(summary.allocated_states, 4);
    assert_eq!(summary.alive_states, 0);
    assert_eq!(summary.completed_states, 0);
    Ok(())
}

#[test]
fn step_limit_breaks_states() -> Result<()> {
    let mut config = Config::default();
    config.limits.max_steps = Some(8);
    let mut explorer = explorer(countdown(3), config)?;
    let summary = explorer.run()?;

    assert_eq!(summary.normal_states_left, 0);
    assert!(explorer.issues().contains(IssueKind::StepLimitReached));

    let broken = explorer
        .completed_states()
        .into_iter()
        .filter(|id| explorer.state(*id).is_ok_and(|s| s.status() == Status::Broken))
        .count();
    assert!(broken > 0);
    assert!(summary.max_state_steps <= 9);
    Ok(())
}

#[test]
fn comparing_two_inputs_twice() -> Result<()> {
    let mut builder = program(&[
        0x2009, // LD R0, X
        0x2209, // LD R1, Y
        0x927F, // NOT R1, R1
        0x1261, // ADD R1, R1, #1
        0x1401, // ADD R2, R0, R1
        0x0801, // BRn LESS
        0x0000, // NOP
        0x0801, // LESS BRn AGAIN
        0xF025, // HALT
        0xF025, // AGAIN HALT
    ]);
    builder.symbolic(ORIGIN + 10, "X");
    builder.symbolic(ORIGIN + 11, "Y");

    let mut explorer = explorer(builder.build(ORIGIN), Config::default())?;
    let summary = explorer.run()?;

    // The second branch is decided by the first on both paths
    assert_eq!(summary.stop, StopReason::Exhausted);
    assert_eq!(summary.allocated_states, 2);
    assert_eq!(summary.completed_states, 2);
    assert_eq!(summary.issues, 0);

    let mut halted_at = BTreeSet::new();
    for id in explorer.completed_states() {
        let state = explorer.state(id)?;
        assert_eq!(state.status(), Status::Halted);
        halted_at.insert(state.latest_program_instruction().map(|f| f.address));

        let model = explorer.test_case(id)?.expect("halted states are satisfiable");
        let evaluator = Evaluator::new(model);
        for constraint in state.constraints().iter() {
            assert_eq!(evaluator.evaluate(constraint), Some(true));
        }
    }
    assert_eq!(
        halted_at,
        BTreeSet::from([Some(ORIGIN + 8), Some(ORIGIN + 9)])
    );
    Ok(())
}
