use std::cell::Cell;
use std::rc::Rc;

use super::fixtures::{countdown, program, ORIGIN};
use crate::flow::*;

fn node(graph: &FlowGraph, address: u16) -> NodeId {
    graph
        .node_by_address(address)
        .unwrap_or_else(|| panic!("no node at x{address:04X}"))
}

fn edge(graph: &FlowGraph, from: u16, to: u16) -> EdgeId {
    graph
        .runtime_edge_between(node(graph, from), Some(node(graph, to)))
        .unwrap_or_else(|| panic!("no edge x{from:04X} -> x{to:04X}"))
}

#[test]
fn static_edges() {
    let graph = FlowGraph::build(&countdown(3));

    // Operating system code and data words are not part of the graph
    assert_eq!(graph.node_count(), 5);
    assert_eq!(graph.edge_count(), 7);
    assert!(!graph.has_indirect_jumps());

    let entry = graph.entry_edge().expect("entry instruction exists");
    assert_eq!(graph.edge(entry).kind, EdgeKind::InitPcEntry);
    assert_eq!(graph.destination_address(entry), Some(ORIGIN));
    assert_eq!(graph.source_address(entry), None);

    let fallthrough = graph.edge(edge(&graph, 0x3001, 0x3002));
    assert!(fallthrough.flags.br_continue && !fallthrough.flags.br_branch);
    let taken = graph.edge(edge(&graph, 0x3001, 0x3004));
    assert!(taken.flags.br_branch && !taken.flags.br_continue);

    // An unconditional branch has a single edge carrying both flags
    let back = graph.edge(edge(&graph, 0x3003, 0x3001));
    assert!(back.flags.br_branch && back.flags.br_continue);

    let halt = graph.node(node(&graph, 0x3004));
    let [trap] = halt.runtime_out_edges() else {
        panic!("HALT has a single out edge");
    };
    assert_eq!(graph.edge(*trap).kind, EdgeKind::TrapVirtual);
    assert_eq!(graph.edge(*trap).to, None);

    assert!(graph.edges().all(|e| !graph.edge(e).flags.likely_uncoverable));
}

#[test]
fn guiding_edges() {
    let graph = FlowGraph::build(&countdown(3));

    assert!(graph.is_guiding(edge(&graph, 0x3001, 0x3002)));
    assert!(graph.is_guiding(edge(&graph, 0x3001, 0x3004)));
    assert!(!graph.is_guiding(edge(&graph, 0x3000, 0x3001)));
    assert!(!graph.is_guiding(edge(&graph, 0x3003, 0x3001)));

    let entry = graph.entry_edge().expect("entry edge");
    assert!(graph.is_guiding(entry));
}

#[test]
fn compressed_path_reconstructs() {
    let graph = FlowGraph::build(&countdown(3));
    let halt = graph.node(node(&graph, 0x3004)).runtime_out_edges()[0];
    let walk = vec![
        graph.entry_edge().expect("entry edge"),
        edge(&graph, 0x3000, 0x3001),
        edge(&graph, 0x3001, 0x3002),
        edge(&graph, 0x3002, 0x3003),
        edge(&graph, 0x3003, 0x3001),
        edge(&graph, 0x3001, 0x3004),
        halt,
    ];

    let mut path = Path::new();
    for (i, e) in walk.iter().enumerate() {
        path.append_compressed(&graph, *e, i + 1 == walk.len());
    }

    assert_eq!(
        path.edges(),
        &[walk[0], walk[2], walk[5], walk[6]],
        "only first, guiding and last edges are kept"
    );
    assert_eq!(path.reconstruct(&graph), walk);
    assert_eq!(path.source(&graph), None);
    assert_eq!(path.destination(&graph), None);

    let mut uncompressed = Path::new();
    for e in &walk {
        uncompressed.push(*e);
    }
    uncompressed.compress(&graph);
    assert_eq!(uncompressed, path);

    let mut prefix = path.clone();
    prefix.pop();
    assert!(prefix.is_prefix_of(&path));
    assert!(!path.is_prefix_of(&prefix));
}

#[test]
fn new_edges_notify_hooks() {
    let mut graph = FlowGraph::build(&countdown(3));
    let seen = Rc::new(Cell::new(0));
    let counter = seen.clone();
    graph.on_new_edge(move |_, edge| {
        if edge.kind.is_runtime() {
            counter.set(counter.get() + 1);
        }
    });

    let from = node(&graph, 0x3002);
    let to = node(&graph, 0x3000);
    let jmp = graph.new_edge(Some(from), Some(to), EdgeKind::Jmp);
    graph.new_edge(Some(from), Some(to), EdgeKind::LoopHeadToHead);

    assert_eq!(seen.get(), 1);
    assert_eq!(graph.runtime_edge_between(from, Some(to)), Some(jmp));
    assert_eq!(graph.node(from).runtime_out_edges().len(), 2);
    assert_eq!(graph.node(from).all_out_edges().len(), 3);

    // The node has more than one runtime successor now
    assert!(graph.is_guiding(edge(&graph, 0x3002, 0x3003)));
}

#[test]
fn contradicting_branches_are_trimmed() {
    let mut builder = program(&[
        0x2004, // LD R0, X
        0x0402, // BRz ZERO
        0x0401, // BRz ZERO
        0xF025, // HALT
        0xF025, // ZERO HALT
    ]);
    builder.symbolic(ORIGIN + 5, "X");
    let graph = FlowGraph::build(&builder.build(ORIGIN));

    assert!(graph.edge(edge(&graph, 0x3002, 0x3004)).flags.likely_uncoverable);
    assert!(!graph.edge(edge(&graph, 0x3002, 0x3003)).flags.likely_uncoverable);
    assert!(!graph.edge(edge(&graph, 0x3001, 0x3004)).flags.likely_uncoverable);
}

#[test]
fn indirect_jumps_disable_trimming() {
    let graph = FlowGraph::build(
        &program(&[
            0xE002, // LEA R0, TARGET
            0xC000, // JMP R0
            0xF025, // HALT
            0xF025, // TARGET HALT
        ])
        .build(ORIGIN),
    );

    assert!(graph.has_indirect_jumps());
    assert!(graph.node(node(&graph, 0x3001)).runtime_out_edges().is_empty());
}
