use super::fixtures::{program, Harness, ORIGIN};
use crate::driver::Result;
use crate::issue::{IssueDetail, IssueKind, IssuePackage};
use crate::state::Status;

fn run_to_end(harness: &mut Harness) -> Result<()> {
    let id = harness.initial;
    while harness.states.get(id)?.is_normal() {
        assert_eq!(harness.step(id)?, vec![id]);
    }

    let state = harness.states.get_mut(id)?;
    harness
        .subroutines
        .post_check_state(state, harness.executor.issues_mut());
    Ok(())
}

#[test]
fn static_coloring() -> Result<()> {
    let image = program(&[
        0x4802, // JSR SUB
        0x4801, // JSR SUB
        0xF025, // HALT
        0x5020, // SUB AND R0, R0, #0
        0xC1C0, // RET
    ])
    .build(ORIGIN);
    let harness = Harness::new(&image)?;
    let graph = &harness.graph;
    let node = |address| graph.node_by_address(address).expect("instruction");

    assert_eq!(harness.subroutines.main_color(), ORIGIN);
    let sub = harness.subroutines.subroutine(ORIGIN + 3).expect("SUB found");
    assert_eq!(sub.entry, node(ORIGIN + 3));
    assert_eq!(sub.exits.iter().copied().collect::<Vec<_>>(), vec![node(ORIGIN + 4)]);

    for address in ORIGIN..ORIGIN + 3 {
        assert_eq!(graph.node(node(address)).colors().len(), 1);
        assert!(graph.node(node(address)).colors().contains(&ORIGIN));
    }
    assert!(graph.node(node(ORIGIN + 4)).colors().contains(&(ORIGIN + 3)));

    // One return edge per call site
    let ret = node(ORIGIN + 4);
    assert!(graph.runtime_edge_between(ret, Some(node(ORIGIN + 1))).is_some());
    assert!(graph.runtime_edge_between(ret, Some(node(ORIGIN + 2))).is_some());
    assert!(graph.node(node(ORIGIN + 1)).is_possible_return_point());

    let subgraph = harness.subroutines.subgraph(graph, ORIGIN + 3);
    assert_eq!(subgraph.nodes.len(), 2);

    let mut issues = IssuePackage::default();
    assert!(!harness.subroutines.check_shared_code(graph, &mut issues));
    assert!(issues.is_empty());
    Ok(())
}

#[test]
fn calls_and_returns_track_colors() -> Result<()> {
    let image = program(&[
        0x4802, // JSR SUB
        0x4801, // JSR SUB
        0xF025, // HALT
        0x5020, // SUB AND R0, R0, #0
        0xC1C0, // RET
    ])
    .build(ORIGIN);
    let mut harness = Harness::new(&image)?;
    let id = harness.initial;

    harness.step(id)?;
    assert_eq!(harness.states.get(id)?.colors(), &[ORIGIN, ORIGIN + 3]);

    harness.step(id)?;
    harness.step(id)?;
    assert_eq!(harness.states.get(id)?.pc(), ORIGIN + 1);
    assert_eq!(harness.states.get(id)?.colors(), &[ORIGIN]);

    run_to_end(&mut harness)?;
    let state = harness.states.get(id)?;
    assert_eq!(state.status(), Status::Halted);
    assert!(!state.stack_messed_up());
    assert!(harness.executor.issues().is_empty());
    Ok(())
}

#[test]
fn improper_return() -> Result<()> {
    let image = program(&[
        0x4802, // JSR SUB
        0xF025, // HALT
        0xF025, // HALT
        0x1FE1, // SUB ADD R7, R7, #1
        0xC1C0, // RET
    ])
    .build(ORIGIN);
    let mut harness = Harness::new(&image)?;
    run_to_end(&mut harness)?;

    let issue = harness
        .executor
        .issues()
        .issues()
        .iter()
        .find(|issue| issue.kind == IssueKind::ImproperReturn)
        .expect("improper return is reported");
    assert_eq!(issue.location, Some(ORIGIN + 4));
    assert_eq!(
        issue.detail,
        IssueDetail::Return {
            call_site: ORIGIN,
            target: ORIGIN + 2
        }
    );

    let state = harness.states.get(harness.initial)?;
    assert!(state.stack_messed_up());
    assert_eq!(state.status(), Status::Halted);

    // The stack is no longer trusted, so halting inside the subroutine is not reported
    assert!(!harness.executor.issues().contains(IssueKind::HaltInSubroutine));

    let graph = &harness.graph;
    let ret = graph.node_by_address(ORIGIN + 4).expect("RET");
    let edge = graph
        .runtime_edge_between(ret, graph.node_by_address(ORIGIN + 2))
        .expect("edge discovered at runtime");
    assert!(graph.edge(edge).is_improper_return());
    Ok(())
}

#[test]
fn halt_in_subroutine() -> Result<()> {
    let image = program(&[
        0x4801, // JSR SUB
        0xF025, // HALT
        0xF025, // SUB HALT
    ])
    .build(ORIGIN);
    let mut harness = Harness::new(&image)?;
    run_to_end(&mut harness)?;

    let issues = harness.executor.issues();
    assert!(issues.contains(IssueKind::HaltInSubroutine));
    assert_eq!(
        issues.issues()[0].detail,
        IssueDetail::Subroutine { entry: ORIGIN + 2 }
    );
    Ok(())
}

#[test]
fn return_in_main_code() -> Result<()> {
    let image = program(&[
        0xC1C0, // RET
    ])
    .build(ORIGIN);
    let mut harness = Harness::new(&image)?;
    harness.step(harness.initial)?;

    assert_eq!(harness.states.get(harness.initial)?.status(), Status::Broken);
    assert!(harness.executor.issues().contains(IssueKind::ReturnInMainCode));
    Ok(())
}

#[test]
fn shared_code() -> Result<()> {
    let image = program(&[
        0x4802, // JSR A
        0x4802, // JSR B
        0xF025, // HALT
        0x0E01, // A BRnzp COMMON
        0x5020, // B AND R0, R0, #0
        0xC1C0, // COMMON RET
    ])
    .build(ORIGIN);
    let harness = Harness::new(&image)?;

    let mut issues = IssuePackage::default();
    assert!(harness.subroutines.check_shared_code(&harness.graph, &mut issues));
    let [issue] = issues.issues() else {
        panic!("one shared instruction");
    };
    assert_eq!(issue.kind, IssueKind::ReuseCodeAcrossSubroutines);
    assert_eq!(issue.location, Some(ORIGIN + 5));
    assert_eq!(issue.state, None);
    assert_eq!(
        issue.detail,
        IssueDetail::SharedCode {
            colors: vec![ORIGIN + 3, ORIGIN + 4]
        }
    );
    Ok(())
}
