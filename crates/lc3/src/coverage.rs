use std::cell::Cell;
use std::rc::Rc;

use crate::flow::{EdgeId, EdgeKind, FlowGraph};
use crate::isa::Opcode;
use crate::state::{MachineState, Status};

/// Tracks which runtime edges of the flow graph have been traversed by any state.
#[derive(Debug)]
pub struct CoverageTracker {
    covered: usize,

    /// Shared with the graph's new-edge hook so dynamically discovered edges are counted.
    total: Rc<Cell<usize>>,
}

impl CoverageTracker {
    pub fn new(graph: &mut FlowGraph) -> Self {
        let runtime_edges = graph
            .edges()
            .filter(|edge| graph.edge(*edge).kind.is_runtime())
            .count();
        let total = Rc::new(Cell::new(runtime_edges));

        let counter = total.clone();
        graph.on_new_edge(move |_, edge| {
            if edge.kind.is_runtime() {
                counter.set(counter.get() + 1);
            }
        });

        Self { covered: 0, total }
    }

    /// Record the edge `state` just traversed and extend its path.
    pub fn update(&mut self, graph: &mut FlowGraph, state: &mut MachineState) {
        match state.status() {
            Status::Broken => (),
            Status::Halted => {
                if let Some(edge) = graph.just_covered_edge(state) {
                    self.append(graph, state, edge);
                }
            }
            Status::Normal => {
                if let Some(edge) = graph.just_covered_edge(state) {
                    self.append(graph, state, edge);
                }

                if !state.in_os_code() {
                    Self::prepare_edge_to_pc(graph, state);
                }
            }
        }
    }

    fn append(&mut self, graph: &mut FlowGraph, state: &mut MachineState, id: EdgeId) {
        let edge = graph.edge_mut(id);
        if !edge.covered {
            edge.covered = true;
            self.covered += 1;
            state.covered_new_edge = true;

            if edge.flags.likely_uncoverable {
                tracing::warn!(
                    from = ?graph.source_address(id),
                    to = ?graph.destination_address(id),
                    "covered an edge believed to be uncoverable"
                );
            }
        }

        let is_last = state.status() != Status::Normal;
        state.path.append_compressed(graph, id, is_last);
    }

    /// Create the edge for an indirect jump the first time its target is reached.
    fn prepare_edge_to_pc(graph: &mut FlowGraph, state: &MachineState) {
        let Some(last) = state.latest_program_instruction() else {
            return;
        };

        let Some(from) = graph.node_by_address(last.address) else {
            return;
        };

        let Some(to) = graph.node_by_address(state.pc()) else {
            if last.opcode() != Opcode::Trap {
                tracing::debug!(
                    from = last.address,
                    to = state.pc(),
                    "control transferred outside the program"
                );
            }
            return;
        };

        if graph.runtime_edge_between(from, Some(to)).is_some() {
            return;
        }

        let kind = match last.opcode() {
            Opcode::Jmp if last.instruction.is_ret() => EdgeKind::Ret,
            Opcode::Jmp => EdgeKind::Jmp,
            Opcode::Jsrr => EdgeKind::Jsrr,
            _ => {
                tracing::warn!(
                    from = last.address,
                    to = state.pc(),
                    instruction = %last.instruction,
                    "no edge for a direct control transfer"
                );
                return;
            }
        };

        tracing::debug!(from = last.address, to = state.pc(), ?kind, "discovered edge");
        graph.new_edge(Some(from), Some(to), kind);

        if kind == EdgeKind::Jsrr {
            let return_point = graph.node_by_address(last.address.wrapping_add(1));
            let has_virtual = graph.node(from).all_out_edges().iter().any(|edge| {
                graph.edge(*edge).kind == EdgeKind::SubroutineVirtual
            });
            if return_point.is_some() && !has_virtual {
                graph.new_edge(Some(from), return_point, EdgeKind::SubroutineVirtual);
            }
        }
    }

    pub fn covered_edges(&self) -> usize {
        self.covered
    }

    pub fn total_edges(&self) -> usize {
        self.total.get()
    }

    /// Fraction of runtime edges covered.
    pub fn coverage(&self) -> f64 {
        match self.total.get() {
            0 => 0.0,
            total => self.covered as f64 / total as f64,
        }
    }
}
