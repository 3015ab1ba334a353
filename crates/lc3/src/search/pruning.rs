use std::collections::{BTreeMap, BTreeSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::alloc::{Result, StateAllocator};
use crate::flow::{EdgeId, EdgeKind, FlowGraph, Path};
use crate::isa::Opcode;
use crate::loops::{LoopId, Loops};
use crate::search::{PrioritizedFilo, Searcher};
use crate::state::{LoopLayer, MachineState, StateId, Status};

/// Segments of one loop no state has traversed yet.
#[derive(Clone, Debug, Default)]
struct LoopCoverage {
    h2h: BTreeMap<Path, String>,
    h2x: BTreeMap<Path, String>,
}

impl LoopCoverage {
    fn is_complete(&self) -> bool {
        self.h2h.is_empty() && self.h2x.is_empty()
    }

    fn tags(segments: &BTreeMap<Path, String>) -> String {
        segments.values().cloned().collect::<Vec<_>>().join(" ")
    }
}

/// Bounds the path explosion caused by loops.
///
/// Each state tracks the loops it is inside of. A state at a branch that neither covered a new
/// edge nor a new loop segment, and cannot complete an uncovered segment from where it is, is
/// postponed. Postponed states are only handed out once the inner searcher runs dry, the fetch
/// level is at least 1, and some loop still has uncovered segments. A reactivated state is never
/// postponed again.
#[derive(Debug)]
pub struct PruningSearcher<S = PrioritizedFilo> {
    inner: S,
    loops: Loops,
    uncovered: BTreeMap<LoopId, LoopCoverage>,
    postponed: Vec<StateId>,
    level: u32,
    rng: StdRng,
    reactivating: bool,
    postpone_count: usize,
    reactivate_count: usize,
}

impl<S: Searcher> PruningSearcher<S> {
    pub fn new(inner: S, loops: Loops, seed: u64) -> Self {
        let uncovered = loops
            .iter()
            .map(|(id, found)| {
                let coverage = LoopCoverage {
                    h2h: found.h2h_segments().clone(),
                    h2x: found.h2x_segments().clone(),
                };
                (id, coverage)
            })
            .filter(|(_, coverage)| !coverage.is_complete())
            .collect();

        tracing::debug!(seed, loops = loops.len(), "pruning searcher");
        Self {
            inner,
            loops,
            uncovered,
            postponed: Vec::new(),
            level: 1,
            rng: StdRng::seed_from_u64(seed),
            reactivating: false,
            postpone_count: 0,
            reactivate_count: 0,
        }
    }

    pub fn loops(&self) -> &Loops {
        &self.loops
    }

    pub fn postponed(&self) -> &[StateId] {
        &self.postponed
    }

    /// Returns true once every segment of `id` has been traversed.
    pub fn is_covered(&self, id: LoopId) -> bool {
        !self.uncovered.contains_key(&id)
    }

    /// Number of loops with at least one uncovered segment.
    pub fn uncovered_loop_count(&self) -> usize {
        self.uncovered.len()
    }

    pub fn postpone_count(&self) -> usize {
        self.postpone_count
    }

    pub fn reactivate_count(&self) -> usize {
        self.reactivate_count
    }

    fn append_loop_path(&self, graph: &FlowGraph, state: &mut MachineState, on_edge: EdgeId) {
        let color = state.colors.last().copied();
        let Some(top) = state.loop_layers.last_mut() else {
            return;
        };

        // Steps inside a called subroutine are not part of the loop path
        if color != Some(top.color) {
            return;
        }

        let edge = graph.edge(on_edge);
        let appended = if edge.kind == EdgeKind::Ret {
            // Back from a call made inside the loop, so the call is summarized
            let virtual_edge = edge.to.and_then(|to| {
                graph
                    .node(to)
                    .all_in_edges()
                    .iter()
                    .copied()
                    .find(|edge| graph.edge(*edge).kind == EdgeKind::SubroutineVirtual)
            });

            match virtual_edge {
                Some(virtual_edge) => virtual_edge,
                None => panic!("return without a matching subroutine virtual edge"),
            }
        } else {
            on_edge
        };

        let is_last = self.loops[top.loop_id]
            .segment_last_edges()
            .contains(&appended);
        top.path.append_compressed(graph, appended, is_last);
    }

    fn inside_top_loop(&self, graph: &FlowGraph, state: &MachineState, on_edge: EdgeId) -> bool {
        let Some(top) = state.loop_layers.last() else {
            return false;
        };

        let edge = graph.edge(on_edge);
        if state.colors.last() != Some(&top.color) {
            // Returning out of the subroutine that owns the loop leaves it
            let from_loop_color = edge
                .from
                .and_then(|from| graph.node(from).colors().first().copied());
            return !(edge.kind == EdgeKind::Ret && from_loop_color == Some(top.color));
        }

        self.loops[top.loop_id].contains(edge.to)
    }

    fn test_loop_exit(&mut self, graph: &FlowGraph, state: &mut MachineState, on_edge: EdgeId) {
        let last_node = graph.edge(on_edge).to;
        while !state.loop_layers.is_empty() && !self.inside_top_loop(graph, state, on_edge) {
            let Some(layer) = state.loop_layers.pop() else {
                break;
            };

            let exited = &self.loops[layer.loop_id];
            assert!(
                exited.h2x_segments().contains_key(&layer.path),
                "path leaving loop {} is not one of its segments",
                exited.name()
            );

            if let Some(coverage) = self.uncovered.get_mut(&layer.loop_id) {
                if let Some(tag) = coverage.h2x.remove(&layer.path) {
                    tracing::info!(
                        state = %state.id,
                        segment = %tag,
                        loop_name = exited.name(),
                        left = %LoopCoverage::tags(&coverage.h2x),
                        "covered a head-to-exit segment"
                    );
                    state.covered_new_segment = true;
                }

                if coverage.is_complete() {
                    tracing::info!(loop_name = exited.name(), "loop is fully covered");
                    self.uncovered.remove(&layer.loop_id);
                }
            }

            // The parent loop sees the nested loop as one summary edge
            let color = state.colors.last().copied();
            if let Some(upper) = state.loop_layers.last_mut()
                && color == Some(upper.color)
            {
                assert!(!upper.path.is_empty(), "entered two loops at once");

                let exit_edge = exited
                    .h2x_edges()
                    .iter()
                    .copied()
                    .find(|edge| graph.edge(*edge).to == last_node);

                match exit_edge {
                    Some(exit_edge) => {
                        let is_last = self.loops[upper.loop_id]
                            .segment_last_edges()
                            .contains(&exit_edge);
                        upper.path.append_compressed(graph, exit_edge, is_last);
                    }
                    None => panic!("no exit edge for loop {}", exited.name()),
                }
            }
        }
    }

    fn enter_new_loop(&self, graph: &FlowGraph, state: &mut MachineState, on_edge: EdgeId) {
        let Some(color) = state.colors.last().copied() else {
            return;
        };

        let to = graph.edge(on_edge).to;
        let entering = match state.loop_layers.last() {
            Some(top) if top.color == color => {
                self.loops.find(self.loops[top.loop_id].subloops(), to)
            }
            _ => self.loops.find(self.loops.top_level(), to),
        };

        if let Some(loop_id) = entering {
            assert!(
                self.loops.find(self.loops[loop_id].subloops(), to).is_none(),
                "entered more than one loop level at once"
            );
            state.loop_layers.push(LoopLayer {
                loop_id,
                path: Path::new(),
                color,
            });
        }
    }

    fn test_head_to_head(&mut self, graph: &FlowGraph, state: &mut MachineState, on_edge: EdgeId) {
        let Some(top) = state.loop_layers.last_mut() else {
            return;
        };

        let head = &self.loops[top.loop_id];
        // An empty path means the loop was just entered
        if graph.edge(on_edge).to != Some(head.entry()) || top.path.is_empty() {
            return;
        }

        assert!(
            head.h2h_segments().contains_key(&top.path),
            "path around loop {} is not one of its segments",
            head.name()
        );

        if let Some(coverage) = self.uncovered.get_mut(&top.loop_id) {
            if let Some(tag) = coverage.h2h.remove(&top.path) {
                tracing::info!(
                    state = %state.id,
                    segment = %tag,
                    loop_name = head.name(),
                    left = %LoopCoverage::tags(&coverage.h2h),
                    "covered a head-to-head segment"
                );
                state.covered_new_segment = true;
            }

            if coverage.is_complete() {
                tracing::info!(loop_name = head.name(), "loop is fully covered");
                self.uncovered.remove(&top.loop_id);
            }
        }

        top.path.clear();
    }

    /// Returns true if the path of any loop the state is in may still become an uncovered
    /// segment.
    fn on_prefix_of_uncovered_segment(&self, state: &MachineState) -> bool {
        state.loop_layers.iter().any(|layer| {
            self.uncovered.get(&layer.loop_id).is_some_and(|coverage| {
                coverage
                    .h2h
                    .keys()
                    .chain(coverage.h2x.keys())
                    .any(|segment| layer.path.is_prefix_of(segment))
            })
        })
    }
}

impl<S: Searcher> Searcher for PruningSearcher<S> {
    fn fetch(&mut self, states: &mut StateAllocator) -> Result<Option<StateId>> {
        if let Some(id) = self.inner.fetch(states)? {
            return Ok(Some(id));
        }

        if self.postponed.is_empty() || self.uncovered.is_empty() || self.level < 1 {
            return Ok(None);
        }

        if !self.reactivating {
            tracing::info!(
                postponed = self.postponed.len(),
                "reactivating postponed states"
            );
            self.reactivating = true;
        }

        let index = self.rng.gen_range(0..self.postponed.len());
        let id = self.postponed.swap_remove(index);
        self.reactivate_count += 1;

        let state = states.get_mut(id)?;
        state.avoid_postpone = true;
        tracing::debug!(
            state = %id,
            at = ?state.latest_program_instruction().map(|f| f.address),
            "reactivated state"
        );
        Ok(Some(id))
    }

    fn push(
        &mut self,
        states: &mut StateAllocator,
        graph: &FlowGraph,
        pushed: &[StateId],
    ) -> Result<()> {
        let mut runnable = Vec::with_capacity(pushed.len());

        for id in pushed.iter().copied() {
            let state = states.get_mut(id)?;
            if state.status() == Status::Broken || state.stack_messed_up {
                runnable.push(id);
                continue;
            }

            // The initial state, or a state inside the operating system
            if graph.just_covered_edge(state).is_none() {
                runnable.push(id);
                continue;
            }

            // About to break on the next step
            let Some(on_edge) = graph.on_edge(state) else {
                runnable.push(id);
                continue;
            };

            if !state.loop_layers.is_empty() {
                self.append_loop_path(graph, state, on_edge);
            }
            self.test_loop_exit(graph, state, on_edge);
            self.enter_new_loop(graph, state, on_edge);
            self.test_head_to_head(graph, state, on_edge);

            if state.covered_new_edge || state.covered_new_segment || state.avoid_postpone {
                runnable.push(id);
                continue;
            }

            let at_branch = state
                .latest_program_instruction()
                .is_some_and(|f| f.opcode() == Opcode::Br);
            if !at_branch {
                state.avoid_postpone = true;
                runnable.push(id);
            } else if state.loop_layers.is_empty() || self.on_prefix_of_uncovered_segment(state) {
                state.avoid_postpone = true;
                runnable.push(id);
            } else {
                tracing::debug!(
                    state = %id,
                    at = ?graph.destination_address(on_edge),
                    "postponed state"
                );
                self.postponed.push(id);
                self.postpone_count += 1;
            }
        }

        if !runnable.is_empty() {
            self.inner.push(states, graph, &runnable)?;
        }
        Ok(())
    }

    fn normal_states(&self) -> Vec<StateId> {
        let mut normal = self.inner.normal_states();
        if self.level >= 1 {
            normal.extend_from_slice(&self.postponed);
        }
        normal
    }

    fn completed_states(&self) -> &BTreeSet<StateId> {
        self.inner.completed_states()
    }

    fn remove_completed(&mut self, id: StateId) {
        self.inner.remove_completed(id)
    }

    fn set_level(&mut self, level: u32) {
        self.level = level;
        self.inner.set_level(level);
    }

    /// Log the loops left uncovered and the postponement statistics.
    fn report(&self) {
        for (id, coverage) in &self.uncovered {
            tracing::info!(
                loop_name = self.loops[*id].name(),
                h2h = %LoopCoverage::tags(&coverage.h2h),
                h2x = %LoopCoverage::tags(&coverage.h2x),
                "loop left uncovered"
            );
        }

        tracing::info!(
            postponed = self.postponed.len(),
            postpones = self.postpone_count,
            reactivations = self.reactivate_count,
            "pruning searcher finished"
        );
    }
}
