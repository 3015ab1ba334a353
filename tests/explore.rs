mod common;

use sym::SymbolicWord;
use symbolic_lc3::config::Config;
use symbolic_lc3::driver::{self, StopReason};
use symbolic_lc3::image::ImageBuilder;
use symbolic_lc3::issue::IssueKind;
use symbolic_lc3::search::SearcherKind;
use symbolic_lc3::state::Status;

use common::ORIGIN;

/// Calls a subroutine once per iteration of a loop counting a symbolic input down.
///
/// ```text
///         LD  R1, N
/// LOOP    BRz DONE
///         JSR CLEAR
///         ADD R1, R1, #-1
///         BRnzp LOOP
/// DONE    HALT
/// CLEAR   AND R0, R0, #0
///         RET
/// N       .FILL ?
/// ```
fn loop_with_call(max: u16) -> symbolic_lc3::image::ProgramImage {
    let mut builder = common::program(&[
        0x2207, 0x0403, 0x4803, 0x127F, 0x0FFC, 0xF025, 0x5020, 0xC1C0,
    ]);
    common::bounded_input(&mut builder, ORIGIN + 8, "N", max);
    builder.build(ORIGIN)
}

#[test]
fn print_string_from_object_file() -> driver::Result<()> {
    common::initialize_logger();

    // LEA R0, MSG; PUTS; HALT
    let object = common::object_file(ORIGIN, &[0xE002, 0xF022, 0xF025]);
    let mut builder = ImageBuilder::new();
    builder.minimal_os().object(&object).expect("valid object file");
    for (address, c) in (ORIGIN + 3..).zip("Hi\0".bytes()) {
        builder.data(address, c as u16);
    }

    let (explorer, summary) = common::explore_enumerating(builder.build(ORIGIN), Config::default())?;
    assert_eq!(summary.stop, StopReason::Exhausted);
    assert_eq!(summary.completed_states, 1);
    assert_eq!(summary.issues, 0);
    assert_eq!(summary.coverage(), 1.0);

    let state = explorer.state(explorer.initial_state())?;
    assert_eq!(state.status(), Status::Halted);
    assert_eq!(
        state.output(),
        &[SymbolicWord::Literal(b'H' as u16), SymbolicWord::Literal(b'i' as u16)]
    );
    Ok(())
}

#[test]
fn pruning_runs_fewer_states_for_the_same_coverage() -> driver::Result<()> {
    common::initialize_logger();

    let (all, exhaustive) = common::explore_enumerating(loop_with_call(10), Config::default())?;
    assert_eq!(exhaustive.searcher, SearcherKind::PrioritizedFilo);
    assert_eq!(exhaustive.completed_states, 11);
    assert_eq!(exhaustive.coverage(), 1.0);
    assert_eq!(common::first_input_values(&all)?, (0..=10).collect());

    let config = Config {
        searcher: SearcherKind::Pruning,
        ..Default::default()
    };
    let (pruned, summary) = common::explore_enumerating(loop_with_call(10), config)?;
    assert_eq!(summary.searcher, SearcherKind::Pruning);
    assert_eq!(summary.stop, StopReason::Exhausted);
    assert_eq!(summary.coverage(), 1.0);
    assert_eq!(summary.issues, exhaustive.issues);
    assert!(summary.completed_states < exhaustive.completed_states);
    assert!(summary.steps < exhaustive.steps);

    // Skipping the loop and going around it are both kept
    let values = common::first_input_values(&pruned)?;
    assert!(values.contains(&0));
    assert!(values.len() >= 2);

    let loops = pruned.loops().expect("pruning analyzes loops");
    assert_eq!(loops.len(), 1);
    Ok(())
}

#[test]
fn stopping_instead_of_reactivating() -> driver::Result<()> {
    let config = Config {
        searcher: SearcherKind::Pruning,
        reactivation: symbolic_lc3::config::Reactivation::Stop,
        ..Default::default()
    };
    let (_, summary) = common::explore_enumerating(loop_with_call(10), config)?;
    assert_eq!(summary.stop, StopReason::Exhausted);
    assert_eq!(summary.normal_states_left, 0);
    assert_eq!(summary.coverage(), 1.0);
    Ok(())
}

#[test]
fn defects_are_reported() -> driver::Result<()> {
    common::initialize_logger();

    let image = common::program(&[
        0x4801, // JSR SUB
        0xF025, // HALT
        0x1060, // SUB ADD R0, R1, #0
        0xF025, // HALT
    ])
    .build(ORIGIN);
    let (explorer, summary) = common::explore_enumerating(image, Config::default())?;
    assert_eq!(summary.completed_states, 1);

    let issues = explorer.issues();
    let uninitialized = issues
        .issues()
        .iter()
        .find(|issue| issue.kind == IssueKind::UseUninitializedRegister)
        .expect("R1 is read before it is written");
    assert_eq!(uninitialized.location, Some(ORIGIN + 2));
    assert!(issues.contains(IssueKind::HaltInSubroutine));
    Ok(())
}

#[test]
fn object_files_must_have_an_origin() {
    let mut builder = ImageBuilder::new();
    assert!(builder.object(&[]).is_err());
    assert!(builder.object(&[0x30]).is_err());
}

#[cfg(feature = "z3")]
#[test]
fn z3_solver_agrees() -> driver::Result<()> {
    let (explorer, summary) =
        common::explore(loop_with_call(5), sym::Z3Solver::new(), Config::default())?;
    assert_eq!(summary.completed_states, 6);
    assert_eq!(common::first_input_values(&explorer)?, (0..=5).collect());
    Ok(())
}
