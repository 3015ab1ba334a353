use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use crate::image::ProgramImage;
use crate::isa::{trap, ConditionMask, Instruction, Opcode};
use crate::mem::SourceInfo;
use crate::state::{MachineState, Status};

/// Index of a node in a [FlowGraph].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Index of an edge in a [FlowGraph].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(usize);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EdgeKind {
    Normal,
    Jmp,
    Jsrr,
    Jsr,
    Ret,
    TrapVirtual,
    InitPcEntry,

    /// From a subroutine call to the instruction after it.
    SubroutineVirtual,

    /// Summarizes a path from a loop head back to itself.
    LoopHeadToHead,

    /// Summarizes a path from a loop head out of the loop.
    LoopHeadToExit,
}

impl EdgeKind {
    /// Returns true if executing an instruction can traverse this edge.
    pub fn is_runtime(&self) -> bool {
        *self <= Self::InitPcEntry
    }

    pub fn is_loop_summary(&self) -> bool {
        matches!(self, Self::LoopHeadToHead | Self::LoopHeadToExit)
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct EdgeFlags {
    /// Taken when a branch is not.
    pub br_continue: bool,

    /// Taken when a branch is.
    pub br_branch: bool,

    /// No condition code reaching the branch takes this edge.
    pub likely_uncoverable: bool,
}

#[derive(Clone, Debug)]
pub struct Node {
    pub address: u16,
    pub instruction: Instruction,
    pub source: Option<Rc<SourceInfo>>,

    pub(crate) runtime_in: Vec<EdgeId>,
    pub(crate) runtime_out: Vec<EdgeId>,
    pub(crate) all_in: Vec<EdgeId>,
    pub(crate) all_out: Vec<EdgeId>,
    pub(crate) unique_runtime_out: Option<EdgeId>,

    /// Subroutines this node was reached from.
    pub(crate) colors: BTreeSet<u16>,

    /// The instruction after a subroutine call.
    pub(crate) possible_return_point: bool,
}

impl Node {
    pub fn runtime_in_edges(&self) -> &[EdgeId] {
        &self.runtime_in
    }

    pub fn runtime_out_edges(&self) -> &[EdgeId] {
        &self.runtime_out
    }

    pub fn all_in_edges(&self) -> &[EdgeId] {
        &self.all_in
    }

    pub fn all_out_edges(&self) -> &[EdgeId] {
        &self.all_out
    }

    /// The only runtime out-edge, if there is exactly one.
    pub fn unique_runtime_out_edge(&self) -> Option<EdgeId> {
        self.unique_runtime_out
    }

    pub fn colors(&self) -> &BTreeSet<u16> {
        &self.colors
    }

    pub fn is_possible_return_point(&self) -> bool {
        self.possible_return_point
    }
}

#[derive(Clone, Debug)]
pub struct Edge {
    pub kind: EdgeKind,

    /// `None` only for the entry edge.
    pub from: Option<NodeId>,

    /// `None` only for an edge into a non-returning trap.
    pub to: Option<NodeId>,
    pub flags: EdgeFlags,
    pub(crate) covered: bool,
    pub(crate) improper_return: bool,
}

impl Edge {
    pub fn is_covered(&self) -> bool {
        self.covered
    }

    pub fn is_improper_return(&self) -> bool {
        self.improper_return
    }
}

/// A set of nodes, such as the body of one subroutine.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Subgraph {
    pub nodes: BTreeSet<NodeId>,
}

impl Subgraph {
    pub fn contains(&self, node: Option<NodeId>) -> bool {
        node.is_some_and(|node| self.nodes.contains(&node))
    }
}

impl FromIterator<NodeId> for Subgraph {
    fn from_iter<T: IntoIterator<Item = NodeId>>(iter: T) -> Self {
        Self {
            nodes: iter.into_iter().collect(),
        }
    }
}

type NewEdgeHook = Box<dyn FnMut(EdgeId, &Edge)>;

/// Control flow graph of the program instructions. Operating system code is not part of the
/// graph; a trap is summarized by a virtual edge.
pub struct FlowGraph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    by_address: HashMap<u16, NodeId>,
    entry: u16,
    entry_edge: Option<EdgeId>,

    /// The program contains a JMP or JSRR that is not a return.
    indirect_jumps: bool,
    hooks: Vec<NewEdgeHook>,
}

impl std::fmt::Debug for FlowGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowGraph")
            .field("nodes", &self.nodes.len())
            .field("edges", &self.edges.len())
            .field("entry", &self.entry)
            .finish()
    }
}

const TRIM_DEPTH: usize = 10;

impl FlowGraph {
    /// Build the static graph of the non-OS instructions of `image`.
    pub fn build(image: &ProgramImage) -> Self {
        let mut graph = Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            by_address: HashMap::new(),
            entry: image.entry,
            entry_edge: None,
            indirect_jumps: false,
            hooks: Vec::new(),
        };

        for cell in image.cells.values() {
            if cell.os {
                continue;
            }

            if let Some(instruction) = cell.as_instruction() {
                graph.new_node(cell.address, *instruction, cell.source.clone());
            }
        }

        let nodes: Vec<NodeId> = (0..graph.nodes.len()).map(NodeId).collect();
        for node in nodes {
            graph.add_static_edges(node);
        }

        match graph.node_by_address(image.entry) {
            Some(entry) => {
                graph.entry_edge = Some(graph.new_edge(None, Some(entry), EdgeKind::InitPcEntry));
            }
            None => tracing::warn!(entry = image.entry, "no instruction at the entry point"),
        }

        if graph.indirect_jumps {
            tracing::info!("indirect jumps present, branch edges are not trimmed");
        } else {
            graph.trim_branch_edges();
        }

        graph
    }

    pub fn new_node(
        &mut self,
        address: u16,
        instruction: Instruction,
        source: Option<Rc<SourceInfo>>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            address,
            instruction,
            source,
            runtime_in: Vec::new(),
            runtime_out: Vec::new(),
            all_in: Vec::new(),
            all_out: Vec::new(),
            unique_runtime_out: None,
            colors: BTreeSet::new(),
            possible_return_point: false,
        });
        self.by_address.insert(address, id);
        id
    }

    /// Add an edge and notify every new-edge hook.
    pub fn new_edge(&mut self, from: Option<NodeId>, to: Option<NodeId>, kind: EdgeKind) -> EdgeId {
        let id = EdgeId(self.edges.len());
        self.edges.push(Edge {
            kind,
            from,
            to,
            flags: EdgeFlags::default(),
            covered: false,
            improper_return: false,
        });

        if let Some(from) = from {
            let node = &mut self.nodes[from.0];
            node.all_out.push(id);
            if kind.is_runtime() {
                node.runtime_out.push(id);
                node.unique_runtime_out = match node.runtime_out.as_slice() {
                    [only] => Some(*only),
                    _ => None,
                };
            }
        }

        if let Some(to) = to {
            let node = &mut self.nodes[to.0];
            node.all_in.push(id);
            if kind.is_runtime() {
                node.runtime_in.push(id);
            }
        }

        let edge = &self.edges[id.0];
        for hook in self.hooks.iter_mut() {
            hook(id, edge);
        }

        id
    }

    fn new_edge_to_address(&mut self, from: NodeId, address: u16, kind: EdgeKind) -> Option<EdgeId> {
        match self.node_by_address(address) {
            Some(to) => Some(self.new_edge(Some(from), Some(to), kind)),
            None => {
                tracing::warn!(
                    from = self.nodes[from.0].address,
                    to = address,
                    ?kind,
                    "edge target is not an instruction"
                );
                None
            }
        }
    }

    /// Register a callback invoked for every edge created from now on.
    pub fn on_new_edge(&mut self, hook: impl FnMut(EdgeId, &Edge) + 'static) {
        self.hooks.push(Box::new(hook));
    }

    fn add_static_edges(&mut self, id: NodeId) {
        let node = &self.nodes[id.0];
        let instruction = node.instruction;
        let pc = node.address.wrapping_add(1);
        match instruction.opcode() {
            Opcode::Br => {
                let condition = instruction.condition();
                let target = pc.wrapping_add(instruction.pc_offset9());
                let continues = condition != ConditionMask::NZP;
                let branches = condition != ConditionMask::NONE;

                if continues && branches && target != pc {
                    if let Some(edge) = self.new_edge_to_address(id, pc, EdgeKind::Normal) {
                        self.edges[edge.0].flags.br_continue = true;
                    }
                    if let Some(edge) = self.new_edge_to_address(id, target, EdgeKind::Normal) {
                        self.edges[edge.0].flags.br_branch = true;
                    }
                } else {
                    let address = if branches { target } else { pc };
                    if let Some(edge) = self.new_edge_to_address(id, address, EdgeKind::Normal) {
                        self.edges[edge.0].flags.br_continue = true;
                        self.edges[edge.0].flags.br_branch = true;
                    }
                }
            }
            Opcode::Jsr => {
                let target = pc.wrapping_add(instruction.pc_offset11());
                self.new_edge_to_address(id, target, EdgeKind::Jsr);
                self.new_edge_to_address(id, pc, EdgeKind::SubroutineVirtual);
                self.mark_return_point(pc);
            }
            Opcode::Jsrr => {
                self.indirect_jumps = true;
                self.mark_return_point(pc);
            }
            Opcode::Jmp => {
                if !instruction.is_ret() {
                    self.indirect_jumps = true;
                }
            }
            Opcode::Trap => {
                if trap::returns(instruction.trap_vector()) {
                    self.new_edge_to_address(id, pc, EdgeKind::TrapVirtual);
                } else {
                    self.new_edge(Some(id), None, EdgeKind::TrapVirtual);
                }
            }
            _ => {
                self.new_edge_to_address(id, pc, EdgeKind::Normal);
            }
        }
    }

    fn mark_return_point(&mut self, address: u16) {
        if let Some(node) = self.node_by_address(address) {
            self.nodes[node.0].possible_return_point = true;
        }
    }

    /// Flag branch edges that no condition code reaching the branch can take.
    fn trim_branch_edges(&mut self) {
        for index in 0..self.edges.len() {
            let id = EdgeId(index);
            let edge = &self.edges[index];
            if !edge.kind.is_runtime() {
                continue;
            }

            let is_branch = edge
                .from
                .is_some_and(|from| self.nodes[from.0].instruction.opcode() == Opcode::Br);
            if !is_branch || (edge.flags.br_continue && edge.flags.br_branch) {
                continue;
            }

            if self.edge_condition_coverage(id, TRIM_DEPTH) == ConditionMask::NONE {
                let address = edge.from.map(|from| self.nodes[from.0].address);
                tracing::info!(?address, "branch edge is likely uncoverable");
                self.edges[index].flags.likely_uncoverable = true;
            }
        }
    }

    /// Condition codes that may hold while traversing `edge`.
    fn edge_condition_coverage(&self, id: EdgeId, depth: usize) -> ConditionMask {
        if depth == 0 {
            tracing::debug!("condition code analysis reached its depth limit");
            return ConditionMask::NZP;
        }

        let edge = &self.edges[id.0];
        let Some(from) = edge.from else {
            return ConditionMask::NZP;
        };

        let node = &self.nodes[from.0];
        let instruction = node.instruction;
        match instruction.opcode() {
            Opcode::Jmp
            | Opcode::Jsr
            | Opcode::Jsrr
            | Opcode::St
            | Opcode::Sti
            | Opcode::Str
            | Opcode::Trap
            | Opcode::Rti
            | Opcode::Br => {
                let mut coverage = ConditionMask::NONE;
                for incoming in &node.all_in {
                    let incoming_edge = &self.edges[incoming.0];
                    coverage = match incoming_edge.kind {
                        EdgeKind::TrapVirtual | EdgeKind::SubroutineVirtual => ConditionMask::NZP,
                        kind if kind.is_runtime() => {
                            coverage.union(self.edge_condition_coverage(*incoming, depth - 1))
                        }
                        _ => coverage,
                    };
                }

                if instruction.opcode() == Opcode::Br {
                    let condition = instruction.condition();
                    let mask = match (edge.flags.br_continue, edge.flags.br_branch) {
                        (true, true) => ConditionMask::NZP,
                        (true, false) => condition.complement(),
                        _ => condition,
                    };
                    coverage = coverage.intersection(mask);
                }

                coverage
            }
            _ => ConditionMask::NZP,
        }
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id.0]
    }

    pub(crate) fn edge_mut(&mut self, id: EdgeId) -> &mut Edge {
        &mut self.edges[id.0]
    }

    pub fn node_by_address(&self, address: u16) -> Option<NodeId> {
        self.by_address.get(&address).copied()
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    pub fn edges(&self) -> impl Iterator<Item = EdgeId> {
        (0..self.edges.len()).map(EdgeId)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn entry(&self) -> u16 {
        self.entry
    }

    pub fn entry_edge(&self) -> Option<EdgeId> {
        self.entry_edge
    }

    pub fn has_indirect_jumps(&self) -> bool {
        self.indirect_jumps
    }

    /// Address of the node an edge starts from.
    pub fn source_address(&self, id: EdgeId) -> Option<u16> {
        self.edge(id).from.map(|from| self.node(from).address)
    }

    /// Address of the node an edge leads to.
    pub fn destination_address(&self, id: EdgeId) -> Option<u16> {
        self.edge(id).to.map(|to| self.node(to).address)
    }

    /// Find an out-edge of `from` reaching `to`, considering runtime edges only.
    pub fn runtime_edge_between(&self, from: NodeId, to: Option<NodeId>) -> Option<EdgeId> {
        self.node(from)
            .runtime_out
            .iter()
            .copied()
            .find(|edge| self.edge(*edge).to == to)
    }

    fn trap_virtual_edge(&self, from: NodeId) -> Option<EdgeId> {
        self.node(from)
            .runtime_out
            .iter()
            .copied()
            .find(|edge| self.edge(*edge).kind == EdgeKind::TrapVirtual)
    }

    /// The edge a state is about to traverse or is traversing within the operating system.
    pub fn on_edge(&self, state: &MachineState) -> Option<EdgeId> {
        let Some(last) = state.latest_program_instruction() else {
            return self.entry_edge;
        };

        let from = self.node_by_address(last.address)?;
        if let Some(edge) = self.trap_virtual_edge(from) {
            return Some(edge);
        }

        let to = self.node_by_address(state.pc)?;
        self.runtime_edge_between(from, Some(to))
    }

    /// The edge completed by the most recent step of `state`, if any.
    pub fn just_covered_edge(&self, state: &MachineState) -> Option<EdgeId> {
        match state.status {
            Status::Halted => {
                let last = state.latest_program_instruction()?;
                let from = self.node_by_address(last.address)?;
                self.trap_virtual_edge(from)
                    .filter(|edge| self.edge(*edge).to.is_none())
            }
            Status::Normal => {
                let last = state.latest_non_os[0]?;
                if state.in_os_code() {
                    return None;
                }

                let Some(previous) = state.latest_non_os[1] else {
                    return self.entry_edge;
                };

                let from = self.node_by_address(previous.address)?;
                let to = self.node_by_address(last.address)?;
                let edge = self.runtime_edge_between(from, Some(to));
                if edge.is_none() {
                    tracing::warn!(
                        from = previous.address,
                        to = last.address,
                        "no edge for executed control transfer"
                    );
                }
                edge
            }
            Status::Broken => None,
        }
    }

    /// Returns true if `edge` must be kept in a compressed path to reconstruct it.
    pub fn is_guiding(&self, id: EdgeId) -> bool {
        let edge = self.edge(id);
        if !edge.kind.is_runtime() {
            return true;
        }

        let Some(from) = edge.from else {
            return true;
        };

        let node = self.node(from);
        node.unique_runtime_out.is_none()
            || matches!(node.instruction.opcode(), Opcode::Jmp | Opcode::Jsrr)
    }
}

/// A sequence of edges that keeps only those needed to reconstruct it: the first, the last, and
/// every guiding edge.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path {
    edges: Vec<EdgeId>,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn edges(&self) -> &[EdgeId] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn first(&self) -> Option<EdgeId> {
        self.edges.first().copied()
    }

    pub fn last(&self) -> Option<EdgeId> {
        self.edges.last().copied()
    }

    pub fn push(&mut self, edge: EdgeId) {
        self.edges.push(edge);
    }

    pub fn pop(&mut self) -> Option<EdgeId> {
        self.edges.pop()
    }

    pub fn clear(&mut self) {
        self.edges.clear();
    }

    pub fn is_prefix_of(&self, other: &Path) -> bool {
        other.edges.starts_with(&self.edges)
    }

    /// Node the path starts from.
    pub fn source(&self, graph: &FlowGraph) -> Option<NodeId> {
        self.first().and_then(|edge| graph.edge(edge).from)
    }

    /// Node the path ends at.
    pub fn destination(&self, graph: &FlowGraph) -> Option<NodeId> {
        self.last().and_then(|edge| graph.edge(edge).to)
    }

    /// Drop every edge that is neither first, last nor guiding.
    pub fn compress(&mut self, graph: &FlowGraph) {
        let len = self.edges.len();
        let mut index = 0;
        self.edges.retain(|edge| {
            let keep = index == 0 || index + 1 == len || graph.is_guiding(*edge);
            index += 1;
            keep
        });
    }

    /// Append an edge to a compressed path. Returns true if the edge was kept.
    pub fn append_compressed(&mut self, graph: &FlowGraph, edge: EdgeId, is_last: bool) -> bool {
        if is_last || self.edges.is_empty() || graph.is_guiding(edge) {
            self.edges.push(edge);
            true
        } else {
            false
        }
    }

    /// Expand a compressed path into the full edge sequence it summarizes.
    ///
    /// # Panics
    ///
    /// Panics if the path does not describe a walk through `graph`.
    pub fn reconstruct(&self, graph: &FlowGraph) -> Vec<EdgeId> {
        let Some(first) = self.first() else {
            return Vec::new();
        };

        let mut full = vec![first];
        let mut next = 1;
        let mut current = graph.edge(first).to;
        while next < self.edges.len() {
            let Some(node) = current else {
                panic!("path continues past a terminal edge");
            };

            let wanted = self.edges[next];
            let edge = if graph.node(node).all_out.contains(&wanted) {
                next += 1;
                wanted
            } else {
                match graph.node(node).unique_runtime_out {
                    Some(edge) => edge,
                    None => panic!(
                        "cannot continue path at x{:04X}",
                        graph.node(node).address
                    ),
                }
            };

            full.push(edge);
            current = graph.edge(edge).to;
        }

        full
    }
}
