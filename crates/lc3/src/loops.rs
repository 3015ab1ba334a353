use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::flow::{EdgeId, EdgeKind, FlowGraph, NodeId, Path, Subgraph};

/// Index of a loop in [Loops].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoopId(usize);

/// A strongly connected region of the flow graph entered through one node.
///
/// Every execution through the loop is decomposed into segments. A head-to-head segment starts
/// at the entry and comes back to it without leaving the loop. A head-to-exit segment starts at
/// the entry and ends at a node outside the loop. Segments are compressed paths tagged `H-n` and
/// `X-n` in discovery order.
#[derive(Clone, Debug)]
pub struct Loop {
    name: String,
    entry: NodeId,
    nodes: BTreeSet<NodeId>,
    subloops: BTreeSet<LoopId>,

    h2h_segments: BTreeMap<Path, String>,
    h2h_edges: BTreeSet<EdgeId>,
    h2x_segments: BTreeMap<Path, String>,
    h2x_edges: BTreeSet<EdgeId>,

    /// Last edge of every segment. An edge in this set is always kept when extending a path
    /// tracked against this loop.
    segment_last_edges: BTreeSet<EdgeId>,
}

impl Loop {
    fn new(name: String, entry: NodeId, nodes: BTreeSet<NodeId>) -> Self {
        Self {
            name,
            entry,
            nodes,
            subloops: BTreeSet::new(),
            h2h_segments: BTreeMap::new(),
            h2h_edges: BTreeSet::new(),
            h2x_segments: BTreeMap::new(),
            h2x_edges: BTreeSet::new(),
            segment_last_edges: BTreeSet::new(),
        }
    }

    /// First label of the entry instruction, or its address.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry(&self) -> NodeId {
        self.entry
    }

    pub fn nodes(&self) -> &BTreeSet<NodeId> {
        &self.nodes
    }

    pub fn contains(&self, node: Option<NodeId>) -> bool {
        node.is_some_and(|node| self.nodes.contains(&node))
    }

    pub fn subloops(&self) -> &BTreeSet<LoopId> {
        &self.subloops
    }

    /// Head-to-head segments and their tags.
    pub fn h2h_segments(&self) -> &BTreeMap<Path, String> {
        &self.h2h_segments
    }

    pub fn h2h_edges(&self) -> &BTreeSet<EdgeId> {
        &self.h2h_edges
    }

    /// Head-to-exit segments and their tags.
    pub fn h2x_segments(&self) -> &BTreeMap<Path, String> {
        &self.h2x_segments
    }

    pub fn h2x_edges(&self) -> &BTreeSet<EdgeId> {
        &self.h2x_edges
    }

    pub fn segment_last_edges(&self) -> &BTreeSet<EdgeId> {
        &self.segment_last_edges
    }

    pub fn segment_count(&self) -> usize {
        self.h2h_segments.len() + self.h2x_segments.len()
    }
}

/// Every loop found by a [LoopAnalyzer].
#[derive(Clone, Debug, Default)]
pub struct Loops {
    loops: Vec<Loop>,
    by_entry: HashMap<NodeId, LoopId>,
    top_level: BTreeSet<LoopId>,
}

impl Loops {
    fn insert(&mut self, new_loop: Loop) -> LoopId {
        let id = LoopId(self.loops.len());
        self.by_entry.insert(new_loop.entry, id);
        self.loops.push(new_loop);
        id
    }

    pub fn get(&self, id: LoopId) -> &Loop {
        &self.loops[id.0]
    }

    pub fn ids(&self) -> impl Iterator<Item = LoopId> {
        (0..self.loops.len()).map(LoopId)
    }

    pub fn iter(&self) -> impl Iterator<Item = (LoopId, &Loop)> {
        self.loops
            .iter()
            .enumerate()
            .map(|(index, found)| (LoopId(index), found))
    }

    pub fn len(&self) -> usize {
        self.loops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    /// Loops not nested inside any other loop.
    pub fn top_level(&self) -> &BTreeSet<LoopId> {
        &self.top_level
    }

    /// The loop entered at `node`, if any.
    pub fn by_entry(&self, node: NodeId) -> Option<LoopId> {
        self.by_entry.get(&node).copied()
    }

    /// Find the loop of `candidates` entered at `node`.
    pub fn find<'a>(
        &self,
        candidates: impl IntoIterator<Item = &'a LoopId>,
        node: Option<NodeId>,
    ) -> Option<LoopId> {
        let node = node?;
        candidates
            .into_iter()
            .copied()
            .find(|candidate| self.get(*candidate).entry == node)
    }

    fn depth(&self, loops: &BTreeSet<LoopId>) -> usize {
        loops
            .iter()
            .map(|id| 1 + self.depth(&self.get(*id).subloops))
            .max()
            .unwrap_or_default()
    }

    /// Number of nesting levels.
    pub fn max_depth(&self) -> usize {
        self.depth(&self.top_level)
    }
}

impl std::ops::Index<LoopId> for Loops {
    type Output = Loop;

    fn index(&self, id: LoopId) -> &Self::Output {
        self.get(id)
    }
}

#[derive(Copy, Clone, Debug)]
struct DfsInfo {
    pre: usize,
    low: usize,
    root: Option<NodeId>,
}

/// Strongly connected components of a node set.
#[derive(Debug, Default)]
struct SccSubgraph {
    nodes: BTreeSet<NodeId>,
    info: HashMap<NodeId, DfsInfo>,

    /// Roots of components that contain a cycle.
    loop_roots: HashSet<NodeId>,
}

impl SccSubgraph {
    fn analyze(graph: &FlowGraph, nodes: BTreeSet<NodeId>) -> Self {
        let mut subgraph = Self {
            nodes,
            ..Default::default()
        };

        let mut tarjan = Tarjan::default();
        let nodes: Vec<NodeId> = subgraph.nodes.iter().copied().collect();
        for node in nodes {
            if !subgraph.info.contains_key(&node) {
                tarjan.visit(graph, node, &mut subgraph);
            }
        }

        subgraph
    }

    fn contains(&self, node: Option<NodeId>) -> bool {
        node.is_some_and(|node| self.nodes.contains(&node))
    }

    fn root(&self, node: NodeId) -> Option<NodeId> {
        self.info.get(&node).and_then(|info| info.root)
    }

    fn is_loop_block(&self, node: NodeId) -> bool {
        self.root(node)
            .is_some_and(|root| self.loop_roots.contains(&root))
    }

    /// Edges considered by the component analysis. Calls, loop summaries and likely
    /// uncoverable edges are ignored, so are edges that leave the node set.
    fn successors(&self, graph: &FlowGraph, node: NodeId) -> Vec<NodeId> {
        graph
            .node(node)
            .all_out_edges()
            .iter()
            .map(|edge| graph.edge(*edge))
            .filter(|edge| !matches!(edge.kind, EdgeKind::Jsr | EdgeKind::Jsrr))
            .filter(|edge| !edge.kind.is_loop_summary() && !edge.flags.likely_uncoverable)
            .filter_map(|edge| edge.to)
            .filter(|to| self.nodes.contains(to))
            .collect()
    }
}

#[derive(Debug, Default)]
struct Tarjan {
    clock: usize,
    stack: Vec<NodeId>,
}

impl Tarjan {
    fn visit(&mut self, graph: &FlowGraph, v: NodeId, subgraph: &mut SccSubgraph) {
        self.clock += 1;
        subgraph.info.insert(
            v,
            DfsInfo {
                pre: self.clock,
                low: self.clock,
                root: None,
            },
        );
        self.stack.push(v);

        let mut self_edge = false;
        for w in subgraph.successors(graph, v) {
            if w == v {
                self_edge = true;
            }

            let low = match subgraph.info.get(&w).copied() {
                None => {
                    self.visit(graph, w, subgraph);
                    subgraph.info[&w].low
                }
                Some(info) if info.root.is_none() => info.pre,
                Some(_) => continue,
            };

            if let Some(info) = subgraph.info.get_mut(&v) {
                info.low = info.low.min(low);
            }
        }

        let info = subgraph.info[&v];
        if info.low != info.pre {
            return;
        }

        let mut count = 0;
        while let Some(w) = self.stack.pop() {
            if let Some(info) = subgraph.info.get_mut(&w) {
                info.root = Some(v);
            }
            count += 1;
            if w == v {
                break;
            }
        }

        // A single instruction branching to itself is a loop too
        if count > 1 || self_edge {
            subgraph.loop_roots.insert(v);
        }
    }
}

/// The loop a depth-first walk is collecting segments for.
enum Outer<'a> {
    /// Collects the loops reachable from an entry point without being nested in any loop.
    TopLevel(&'a mut Loop),
    Nested(LoopId),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum SegmentKind {
    HeadToHead,
    HeadToExit,
}

/// Decomposes subroutine bodies into nested loops and their segments.
#[derive(Debug)]
pub struct LoopAnalyzer {
    loops: Loops,
    loop_heads: Vec<NodeId>,
    total_segments: usize,

    /// Analysis fails once more segments than this have been found.
    max_segments: Option<usize>,
}

impl LoopAnalyzer {
    pub fn new(max_segments: Option<usize>) -> Self {
        Self {
            loops: Loops::default(),
            loop_heads: Vec::new(),
            total_segments: 0,
            max_segments,
        }
    }

    /// Find the loops of `subgraph` reachable from `entry`. May be called once per subroutine;
    /// the results accumulate. Returns false if the maximum segment count was exceeded, in which
    /// case the results are incomplete.
    ///
    /// # Panics
    ///
    /// Panics if the loop bookkeeping becomes inconsistent.
    pub fn analyze_loops(&mut self, graph: &mut FlowGraph, entry: NodeId, subgraph: &Subgraph) -> bool {
        let components = SccSubgraph::analyze(graph, subgraph.nodes.clone());

        let mut top_level = Loop::new(String::from("(main)"), entry, BTreeSet::new());
        let mut path = Path::new();
        let analyzed = self.analyze_from(
            graph,
            entry,
            &components,
            &mut Outer::TopLevel(&mut top_level),
            &mut path,
        );

        if analyzed {
            self.loops.top_level.extend(top_level.subloops);
            tracing::debug!(
                entry = graph.node(entry).address,
                loops = self.loops.len(),
                depth = self.loops.max_depth(),
                segments = self.total_segments,
                "loop analysis finished"
            );
        } else {
            self.loop_heads.clear();
            tracing::info!(
                segments = self.total_segments,
                "loop analysis exceeded the segment limit"
            );
        }

        analyzed
    }

    fn outer_loop<'s>(&'s mut self, outer: &'s mut Outer<'_>) -> &'s mut Loop {
        match outer {
            Outer::TopLevel(top_level) => &mut **top_level,
            Outer::Nested(id) => &mut self.loops.loops[id.0],
        }
    }

    fn loop_name(graph: &FlowGraph, node: NodeId) -> String {
        let node = graph.node(node);
        node.source
            .as_ref()
            .and_then(|source| source.labels.first().cloned())
            .unwrap_or_else(|| format!("x{:04X}", node.address))
    }

    /// `components` holds every node of the outer loop except its entry.
    fn analyze_from(
        &mut self,
        graph: &mut FlowGraph,
        current: NodeId,
        components: &SccSubgraph,
        outer: &mut Outer<'_>,
        path: &mut Path,
    ) -> bool {
        // Loop entered at `current` that is nested in the outer loop
        let mut subloop = None;

        match self.loops.by_entry(current) {
            None if components.is_loop_block(current) => {
                let root = components.root(current);
                let nodes: BTreeSet<NodeId> = components
                    .nodes
                    .iter()
                    .copied()
                    .filter(|node| components.root(*node) == root)
                    .collect();

                let body: BTreeSet<NodeId> =
                    nodes.iter().copied().filter(|node| *node != current).collect();
                let id = self
                    .loops
                    .insert(Loop::new(Self::loop_name(graph, current), current, nodes));
                self.outer_loop(outer).subloops.insert(id);

                let inner = SccSubgraph::analyze(graph, body);
                self.loop_heads.push(current);
                let mut inner_path = Path::new();
                if !self.analyze_from(graph, current, &inner, &mut Outer::Nested(id), &mut inner_path)
                {
                    return false;
                }

                assert!(
                    !self.loops[id].h2h_segments.is_empty(),
                    "loop {} has no head-to-head segment",
                    self.loops[id].name
                );
                self.loop_heads.pop();
                subloop = Some(id);
            }
            None => (),
            Some(id) => {
                let existing = &self.loops[id];
                let fits = existing.nodes.len() <= components.nodes.len()
                    && existing.nodes.iter().all(|node| components.nodes.contains(node));
                let outer_loop = self.outer_loop(outer);
                if outer_loop.subloops.contains(&id) {
                    subloop = Some(id);
                } else if fits {
                    outer_loop.subloops.insert(id);
                    subloop = Some(id);
                }
            }
        }

        // Segment edges may be created while walking
        let out_edges = graph.node(current).all_out_edges().to_vec();
        for id in out_edges {
            let edge = graph.edge(id);
            if matches!(edge.kind, EdgeKind::Jsr | EdgeKind::Jsrr) || edge.flags.likely_uncoverable {
                continue;
            }

            match subloop {
                // Only the exits of the nested loop lead on
                Some(subloop) => {
                    if edge.kind != EdgeKind::LoopHeadToExit
                        || !self.loops[subloop].h2x_edges.contains(&id)
                    {
                        continue;
                    }
                }
                None => {
                    if edge.kind.is_loop_summary() {
                        continue;
                    }
                }
            }

            let to = edge.to;
            if let Some(next) = to.filter(|to| components.nodes.contains(to)) {
                let appended = path.append_compressed(graph, id, false);
                if !self.analyze_from(graph, next, components, outer, path) {
                    return false;
                }

                if appended {
                    path.pop();
                }
            } else if to.is_some() && to == self.loop_heads.last().copied() {
                let mut segment = path.clone();
                segment.append_compressed(graph, id, true);
                if !self.record_segment(graph, outer, segment, SegmentKind::HeadToHead) {
                    return false;
                }
            } else {
                let mut segment = path.clone();
                segment.append_compressed(graph, id, true);
                if !self.record_segment(graph, outer, segment, SegmentKind::HeadToExit) {
                    return false;
                }
            }
        }

        true
    }

    fn record_segment(
        &mut self,
        graph: &mut FlowGraph,
        outer: &mut Outer<'_>,
        segment: Path,
        kind: SegmentKind,
    ) -> bool {
        let source = segment.source(graph);
        let destination = segment.destination(graph);
        let last = segment.last();
        let materialize = matches!(outer, Outer::Nested(_));

        let target = self.outer_loop(outer);
        assert_eq!(
            source,
            Some(target.entry),
            "segment of loop {} does not start at its head",
            target.name
        );

        let (segments, prefix) = match kind {
            SegmentKind::HeadToHead => {
                assert_eq!(
                    destination,
                    Some(target.entry),
                    "head-to-head segment of loop {} does not return to its head",
                    target.name
                );
                (&mut target.h2h_segments, "H")
            }
            SegmentKind::HeadToExit => (&mut target.h2x_segments, "X"),
        };

        let tag = format!("{prefix}-{}", segments.len());
        let duplicate = segments.insert(segment, tag).is_some();
        assert!(!duplicate, "duplicated segment in loop {}", target.name);
        target.segment_last_edges.extend(last);

        self.total_segments += 1;
        if self
            .max_segments
            .is_some_and(|max| self.total_segments > max)
        {
            return false;
        }

        // Segments of the top level are only counted
        if !materialize {
            return true;
        }

        let (edge_kind, existing) = {
            let target = self.outer_loop(outer);
            match kind {
                SegmentKind::HeadToHead => (EdgeKind::LoopHeadToHead, target.h2h_edges.clone()),
                SegmentKind::HeadToExit => (EdgeKind::LoopHeadToExit, target.h2x_edges.clone()),
            }
        };

        let constructed = existing.iter().any(|edge| {
            let edge = graph.edge(*edge);
            edge.from == source && edge.to == destination
        });

        if !constructed {
            let edge = graph.new_edge(source, destination, edge_kind);
            let target = self.outer_loop(outer);
            match kind {
                SegmentKind::HeadToHead => target.h2h_edges.insert(edge),
                SegmentKind::HeadToExit => target.h2x_edges.insert(edge),
            };
        }

        true
    }

    pub fn loops(&self) -> &Loops {
        &self.loops
    }

    pub fn into_loops(self) -> Loops {
        self.loops
    }

    pub fn all_loops(&self) -> impl Iterator<Item = LoopId> {
        self.loops.ids()
    }

    pub fn top_level_loops(&self) -> &BTreeSet<LoopId> {
        &self.loops.top_level
    }

    /// Segments found so far, including those of code outside any loop.
    pub fn total_segment_count(&self) -> usize {
        self.total_segments
    }
}
