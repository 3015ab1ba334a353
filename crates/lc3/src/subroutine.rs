use std::collections::{BTreeMap, BTreeSet};

use crate::flow::{EdgeId, EdgeKind, FlowGraph, NodeId, Subgraph};
use crate::issue::{IssueDetail, IssueKind, IssuePackage};
use crate::state::{MachineState, Status};

/// A subroutine, identified by the address of its entry instruction. That address is also the
/// color of every node reachable from the entry without returning.
#[derive(Clone, Debug)]
pub struct Subroutine {
    pub entry: NodeId,
    pub color: u16,

    /// Return instructions of this subroutine.
    pub exits: BTreeSet<NodeId>,
}

/// Partitions the flow graph into subroutines and tracks the call stack of each state.
#[derive(Clone, Debug)]
pub struct SubroutineTracker {
    main_color: u16,
    subroutines: BTreeMap<u16, Subroutine>,
}

impl SubroutineTracker {
    /// Color the graph statically starting from its entry.
    pub fn new(graph: &mut FlowGraph) -> Self {
        let mut tracker = Self {
            main_color: graph.entry(),
            subroutines: BTreeMap::new(),
        };

        if let Some(entry) = graph.node_by_address(graph.entry()) {
            tracker.color_from(graph, entry, tracker.main_color);
        }

        let calls: Vec<(u16, EdgeId)> = tracker
            .subroutines
            .values()
            .flat_map(|subroutine| {
                graph
                    .node(subroutine.entry)
                    .runtime_in_edges()
                    .iter()
                    .filter(|edge| matches!(graph.edge(**edge).kind, EdgeKind::Jsr | EdgeKind::Jsrr))
                    .map(|edge| (subroutine.color, *edge))
                    .collect::<Vec<_>>()
            })
            .collect();

        for (color, call) in calls {
            tracker.set_up_return_edges(graph, color, call);
        }

        tracing::debug!(
            subroutines = tracker.subroutines.len(),
            "subroutines discovered"
        );
        tracker
    }

    /// Color of the code reached from the entry point without any call.
    pub fn main_color(&self) -> u16 {
        self.main_color
    }

    pub fn subroutines(&self) -> impl Iterator<Item = &Subroutine> {
        self.subroutines.values()
    }

    pub fn subroutine(&self, color: u16) -> Option<&Subroutine> {
        self.subroutines.get(&color)
    }

    /// Register a subroutine entered at `entry`. Returns false if it was already known.
    fn register(&mut self, graph: &mut FlowGraph, entry: NodeId, color: u16) -> bool {
        if self.subroutines.contains_key(&color) {
            return false;
        }

        self.subroutines.insert(
            color,
            Subroutine {
                entry,
                color,
                exits: BTreeSet::new(),
            },
        );
        self.color_from(graph, entry, color);
        true
    }

    fn color_from(&mut self, graph: &mut FlowGraph, start: NodeId, color: u16) {
        let mut pending = vec![start];
        while let Some(node) = pending.pop() {
            if !graph.node_mut(node).colors.insert(color) {
                continue;
            }

            let instruction = graph.node(node).instruction;
            let address = graph.node(node).address;
            let successors: Vec<(EdgeKind, Option<NodeId>)> = graph
                .node(node)
                .runtime_out_edges()
                .iter()
                .map(|edge| (graph.edge(*edge).kind, graph.edge(*edge).to))
                .collect();

            if instruction.is_subroutine_call() {
                for (kind, to) in successors {
                    if let (EdgeKind::Jsr | EdgeKind::Jsrr, Some(to)) = (kind, to) {
                        let entry = graph.node(to).address;
                        self.register(graph, to, entry);
                    }
                }

                if let Some(next) = graph.node_by_address(address.wrapping_add(1)) {
                    pending.push(next);
                }
            } else if instruction.is_ret() {
                if color != self.main_color
                    && let Some(subroutine) = self.subroutines.get_mut(&color)
                {
                    subroutine.exits.insert(node);
                }
            } else {
                pending.extend(successors.into_iter().filter_map(|(_, to)| to));
            }
        }
    }

    /// Connect every exit of subroutine `color` to the instruction after `call`.
    fn set_up_return_edges(&mut self, graph: &mut FlowGraph, color: u16, call: EdgeId) {
        let Some(call_site) = graph.edge(call).from else {
            return;
        };

        let Some(return_point) = graph.node_by_address(graph.node(call_site).address.wrapping_add(1))
        else {
            return;
        };

        let Some(subroutine) = self.subroutines.get(&color) else {
            return;
        };

        for exit in subroutine.exits.iter().copied() {
            if graph.runtime_edge_between(exit, Some(return_point)).is_none() {
                graph.new_edge(Some(exit), Some(return_point), EdgeKind::Ret);
            }
        }
    }

    /// Push the main color onto a fresh state.
    pub fn set_up_initial_state(&self, state: &mut MachineState) {
        state.colors.push(self.main_color);
    }

    /// Maintain the color and call-site stacks of `state` after a step.
    pub fn update_colors(
        &mut self,
        graph: &mut FlowGraph,
        state: &mut MachineState,
        issues: &mut IssuePackage,
    ) {
        if !state.is_normal() || state.in_os_code() {
            return;
        }

        let Some(last) = state.latest_program_instruction().copied() else {
            return;
        };

        let Some(node) = graph.node_by_address(last.address) else {
            return;
        };

        let Some(pc_node) = graph.node_by_address(state.pc()) else {
            return;
        };

        let instruction = last.instruction;
        if instruction.is_subroutine_call() {
            let color = state.pc();
            if self.register(graph, pc_node, color) {
                tracing::debug!(entry = color, "discovered subroutine at runtime");
            }

            if let Some(call) = graph.runtime_edge_between(node, Some(pc_node)) {
                self.set_up_return_edges(graph, color, call);
            }

            state.colors.push(color);
            state.call_sites.push(node);
        } else if instruction.is_ret() {
            if state.colors.len() >= 2 && !state.stack_messed_up {
                let call_site = state
                    .call_sites
                    .last()
                    .map(|site| graph.node(*site).address)
                    .unwrap_or_default();

                if call_site.wrapping_add(1) == state.pc() {
                    state.colors.pop();
                    state.call_sites.pop();
                } else {
                    issues.raise(
                        state,
                        IssueKind::ImproperReturn,
                        Some(last.address),
                        IssueDetail::Return {
                            call_site,
                            target: state.pc(),
                        },
                    );

                    if let Some(edge) = graph.runtime_edge_between(node, Some(pc_node)) {
                        graph.edge_mut(edge).improper_return = true;
                    }
                    state.stack_messed_up = true;
                }
            } else if !state.stack_messed_up {
                issues.raise(
                    state,
                    IssueKind::ReturnInMainCode,
                    Some(last.address),
                    IssueDetail::None,
                );
                state.stack_messed_up = true;
            }
        }

        if !state.stack_messed_up
            && let Some(color) = state.colors.last().copied()
        {
            self.color_from(graph, pc_node, color);
        }
    }

    /// Report a state that halted before returning from a subroutine.
    pub fn post_check_state(&self, state: &mut MachineState, issues: &mut IssuePackage) {
        if state.status() != Status::Halted || state.stack_messed_up {
            return;
        }

        if let Some(color) = state.colors.last().copied()
            && color != self.main_color
        {
            let location = state.latest_program_instruction().map(|f| f.address);
            issues.raise(
                state,
                IssueKind::HaltInSubroutine,
                location,
                IssueDetail::Subroutine { entry: color },
            );
        }
    }

    /// Report code reachable from more than one subroutine. Returns true if there is any.
    pub fn check_shared_code(&self, graph: &FlowGraph, issues: &mut IssuePackage) -> bool {
        let mut shared = false;
        for id in graph.nodes() {
            let node = graph.node(id);
            if node.colors().len() > 1 {
                shared = true;
                issues.raise_global(
                    IssueKind::ReuseCodeAcrossSubroutines,
                    Some(node.address),
                    IssueDetail::SharedCode {
                        colors: node.colors().iter().copied().collect(),
                    },
                );
            }
        }
        shared
    }

    /// Nodes colored by `color`.
    pub fn subgraph(&self, graph: &FlowGraph, color: u16) -> Subgraph {
        graph
            .nodes()
            .filter(|id| graph.node(*id).colors().contains(&color))
            .collect()
    }
}
