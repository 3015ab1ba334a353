use sym::ConstraintSet;

use super::fixtures::{program, Harness, ORIGIN};
use crate::alloc::StateAllocator;
use crate::driver::Result;
use crate::flow::FlowGraph;
use crate::search::*;
use crate::state::{StateId, Status};

/// Three normal states and a halted one, in creation order.
fn states() -> Result<(StateAllocator, FlowGraph, Vec<StateId>)> {
    let image = program(&[0xF025]).build(ORIGIN);
    let graph = FlowGraph::build(&image);
    let mut states = StateAllocator::new();
    let first = states.create_initial(&image, ConstraintSet::new());
    let mut ids = vec![first];
    for _ in 0..3 {
        ids.push(states.fork(first)?);
    }
    states.get_mut(ids[3])?.status = Status::Halted;
    Ok((states, graph, ids))
}

fn drain(searcher: &mut impl Searcher, states: &mut StateAllocator) -> Result<Vec<StateId>> {
    let mut fetched = Vec::new();
    while let Some(id) = searcher.fetch(states)? {
        fetched.push(id);
    }
    Ok(fetched)
}

#[test]
fn fifo_and_filo_order() -> Result<()> {
    let (mut states, graph, ids) = states()?;

    let mut fifo = SimpleFifo::default();
    fifo.push(&mut states, &graph, &ids)?;
    assert_eq!(fifo.completed_states().iter().copied().collect::<Vec<_>>(), vec![ids[3]]);
    assert_eq!(drain(&mut fifo, &mut states)?, ids[..3].to_vec());

    let mut filo = SimpleFilo::default();
    filo.push(&mut states, &graph, &ids)?;
    assert_eq!(filo.normal_states(), ids[..3].to_vec());
    assert_eq!(drain(&mut filo, &mut states)?, vec![ids[2], ids[1], ids[0]]);

    filo.remove_completed(ids[3]);
    assert!(filo.completed_states().is_empty());
    Ok(())
}

#[test]
fn prioritized_filo_runs_fresh_states_first() -> Result<()> {
    let (mut states, graph, ids) = states()?;
    states.get_mut(ids[0])?.covered_new_edge = true;
    states.get_mut(ids[1])?.covered_new_segment = true;

    let mut searcher = PrioritizedFilo::default();
    searcher.push(&mut states, &graph, &ids)?;
    assert_eq!(searcher.normal_states(), vec![ids[2], ids[0], ids[1]]);
    assert_eq!(
        drain(&mut searcher, &mut states)?,
        vec![ids[1], ids[0], ids[2]]
    );
    Ok(())
}

#[test]
fn random_picking_follows_a_state() -> Result<()> {
    let (mut states, graph, ids) = states()?;
    let mut searcher = RandomPicking::new(7);
    searcher.push(&mut states, &graph, &ids)?;

    let picked = searcher.fetch(&mut states)?.expect("a normal state");
    assert_eq!(searcher.fetch(&mut states)?, Some(picked));

    // Pushing the picked state back keeps it picked
    searcher.push(&mut states, &graph, &[picked])?;
    assert_eq!(searcher.fetch(&mut states)?, Some(picked));

    // Once it completes, the others are picked in turn
    states.get_mut(picked)?.status = Status::Halted;
    searcher.push(&mut states, &graph, &[picked])?;
    let mut rest = Vec::new();
    for _ in 0..2 {
        let id = searcher.fetch(&mut states)?.expect("a normal state");
        rest.push(id);
        states.get_mut(id)?.status = Status::Halted;
        searcher.push(&mut states, &graph, &[id])?;
    }
    assert_eq!(searcher.fetch(&mut states)?, None);

    rest.push(picked);
    rest.sort();
    assert_eq!(rest, ids[..3].to_vec());
    assert_eq!(searcher.completed_states().len(), 4);
    Ok(())
}

#[test]
fn random_picking_is_seeded() -> Result<()> {
    let mut orders = Vec::new();
    for _ in 0..2 {
        let (mut states, graph, ids) = states()?;
        let mut searcher = RandomPicking::new(42);
        searcher.push(&mut states, &graph, &ids)?;

        let mut order = Vec::new();
        while let Some(id) = searcher.fetch(&mut states)? {
            order.push(id);
            states.get_mut(id)?.status = Status::Halted;
            searcher.push(&mut states, &graph, &[id])?;
        }
        orders.push(order);
    }
    assert_eq!(orders[0], orders[1]);
    Ok(())
}

#[test]
fn boxed_searcher_delegates() -> Result<()> {
    let (mut states, graph, ids) = states()?;
    let mut searcher: Box<dyn Searcher> = Box::new(SimpleFifo::default());
    searcher.push(&mut states, &graph, &ids)?;
    assert_eq!(searcher.normal_states().len(), 3);
    assert_eq!(searcher.fetch(&mut states)?, Some(ids[0]));
    Ok(())
}

#[test]
fn second_traversal_of_a_segment_is_not_new() -> Result<()> {
    let mut builder = program(&[
        0x2002, // LD R0, X
        0x05FF, // WAIT BRz WAIT
        0xF025, // HALT
    ]);
    builder.symbolic(ORIGIN + 3, "X");
    let mut harness = Harness::new(&builder.build(ORIGIN))?;
    let loops = harness.analyze_loops();
    let wait = loops.ids().next().expect("self loop");

    let mut searcher = PruningSearcher::new(PrioritizedFilo::default(), loops, 0);
    let first = harness.initial;
    searcher.push(&mut harness.states, &harness.graph, &[first])?;
    assert_eq!(searcher.fetch(&mut harness.states)?, Some(first));

    let stepped = harness.step(first)?;
    searcher.push(&mut harness.states, &harness.graph, &stepped)?;
    assert_eq!(harness.states.get(first)?.loop_layers().len(), 1);

    // An independent copy about to repeat the same steps
    let second = harness.states.fork(first)?;

    assert_eq!(searcher.fetch(&mut harness.states)?, Some(first));
    let first_successors = harness.step(first)?;
    assert_eq!(first_successors.len(), 2);
    searcher.push(&mut harness.states, &harness.graph, &first_successors)?;
    for id in &first_successors {
        assert!(harness.states.get(*id)?.covered_new_segment());
    }
    assert!(searcher.is_covered(wait));
    assert_eq!(searcher.uncovered_loop_count(), 0);

    let second_successors = harness.step(second)?;
    assert_eq!(second_successors.len(), 2);
    searcher.push(&mut harness.states, &harness.graph, &second_successors)?;
    for id in &second_successors {
        assert!(!harness.states.get(*id)?.covered_new_segment());
    }

    // Staying in the covered loop gets postponed, leaving it does not
    let (exit, stay) = (second_successors[0], second_successors[1]);
    assert_eq!(stay, second);
    assert_eq!(searcher.postponed(), &[stay]);
    assert_eq!(searcher.postpone_count(), 1);
    assert!(harness.states.get(exit)?.loop_layers().is_empty());

    // Nothing is left to cover, so the postponed state is never handed out
    let mut fetched = Vec::new();
    while let Some(id) = searcher.fetch(&mut harness.states)? {
        fetched.push(id);
    }
    fetched.sort();
    let mut expected = first_successors.clone();
    expected.push(exit);
    expected.sort();
    assert_eq!(fetched, expected);
    assert_eq!(searcher.reactivate_count(), 0);
    Ok(())
}

#[test]
fn postponed_states_are_reactivated() -> Result<()> {
    let mut builder = program(&[
        0x2004, // LD R0, N
        0x103F, // LOOP ADD R0, R0, #-1
        0x0401, // BRz DONE
        0x0FFD, // BRnzp LOOP
        0xF025, // DONE HALT
    ]);
    builder.symbolic(ORIGIN + 5, "N");
    let mut harness = Harness::new(&builder.build(ORIGIN))?;
    let loops = harness.analyze_loops();
    let mut searcher = PruningSearcher::new(PrioritizedFilo::default(), loops, 0);

    let id = harness.initial;
    searcher.push(&mut harness.states, &harness.graph, &[id])?;
    for _ in 0..2 {
        assert_eq!(searcher.fetch(&mut harness.states)?, Some(id));
        let stepped = harness.step(id)?;
        searcher.push(&mut harness.states, &harness.graph, &stepped)?;
    }

    assert_eq!(searcher.fetch(&mut harness.states)?, Some(id));
    let successors = harness.step(id)?;
    let (around, exit) = (successors[0], successors[1]);
    assert_eq!(harness.states.get(around)?.pc(), ORIGIN + 3);
    assert_eq!(harness.states.get(exit)?.pc(), ORIGIN + 4);

    // Hold back the exit, and a copy of the state going around the loop
    let copy = harness.states.fork(around)?;
    searcher.push(&mut harness.states, &harness.graph, &[around])?;
    assert_eq!(searcher.fetch(&mut harness.states)?, Some(around));
    let stepped = harness.step(around)?;
    searcher.push(&mut harness.states, &harness.graph, &stepped)?;
    assert!(harness.states.get(around)?.covered_new_segment());
    assert_eq!(searcher.fetch(&mut harness.states)?, Some(around));

    // Only the exit segment is left, which the copy cannot complete
    searcher.push(&mut harness.states, &harness.graph, &[copy])?;
    assert_eq!(searcher.postponed(), &[copy]);

    searcher.set_level(0);
    assert!(searcher.normal_states().is_empty());
    assert_eq!(searcher.fetch(&mut harness.states)?, None);

    searcher.set_level(1);
    assert_eq!(searcher.normal_states(), vec![copy]);
    assert_eq!(searcher.fetch(&mut harness.states)?, Some(copy));
    assert!(harness.states.get(copy)?.avoid_postpone());
    assert_eq!(searcher.reactivate_count(), 1);
    assert!(searcher.postponed().is_empty());

    // The exit completes the loop
    searcher.push(&mut harness.states, &harness.graph, &[exit])?;
    assert!(harness.states.get(exit)?.covered_new_segment());
    assert_eq!(searcher.uncovered_loop_count(), 0);
    Ok(())
}

/// Walk once around the countdown loop with an edge from outside the loop slipped into the
/// loop path.
fn go_around_with_foreign_edge() -> Result<()> {
    let mut builder = program(&[
        0x2004, // LD R0, N
        0x103F, // LOOP ADD R0, R0, #-1
        0x0401, // BRz DONE
        0x0FFD, // BRnzp LOOP
        0xF025, // DONE HALT
    ]);
    builder.symbolic(ORIGIN + 5, "N");
    let mut harness = Harness::new(&builder.build(ORIGIN))?;
    let loops = harness.analyze_loops();
    let mut searcher = PruningSearcher::new(PrioritizedFilo::default(), loops, 0);

    let id = harness.initial;
    searcher.push(&mut harness.states, &harness.graph, &[id])?;
    for _ in 0..2 {
        assert_eq!(searcher.fetch(&mut harness.states)?, Some(id));
        let stepped = harness.step(id)?;
        searcher.push(&mut harness.states, &harness.graph, &stepped)?;
    }

    assert_eq!(searcher.fetch(&mut harness.states)?, Some(id));
    let around = harness.step(id)?[0];
    let foreign = harness.graph.entry_edge().expect("program has an entry edge");
    let state = harness.states.get_mut(around)?;
    assert_eq!(state.loop_layers.len(), 1);
    state.loop_layers[0].path.push(foreign);

    searcher.push(&mut harness.states, &harness.graph, &[around])?;
    assert_eq!(searcher.fetch(&mut harness.states)?, Some(around));
    let stepped = harness.step(around)?;
    searcher.push(&mut harness.states, &harness.graph, &stepped)?;
    Ok(())
}

#[test]
#[should_panic(expected = "is not one of its segments")]
fn inconsistent_loop_path_aborts() {
    go_around_with_foreign_edge().expect("stepping succeeds");
}
