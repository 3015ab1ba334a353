use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use sym::{Solver, VariableAssignments};
use thiserror;

use crate::alloc::{self, StateAllocator};
use crate::config::{self, Config, Reactivation};
use crate::coverage::CoverageTracker;
use crate::executor::{self, Executor};
use crate::flow::FlowGraph;
use crate::image::ProgramImage;
use crate::issue::IssuePackage;
use crate::loops::{LoopAnalyzer, Loops};
use crate::search::{
    PrioritizedFilo, PruningSearcher, RandomPicking, Searcher, SearcherKind, SimpleFifo,
    SimpleFilo,
};
use crate::state::{MachineState, StateId, Status};
use crate::subroutine::SubroutineTracker;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Executor(#[from] executor::Error),

    #[error(transparent)]
    State(#[from] alloc::Error),

    #[error(transparent)]
    Config(#[from] config::Error),

    #[error(transparent)]
    Solver(#[from] sym::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Why a run ended.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// No eligible state was left.
    #[default]
    Exhausted,
    Cancelled,
    TimeLimit,
}

/// Statistics of a finished run.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Summary {
    /// The searcher actually used, after any fallback.
    pub searcher: SearcherKind,
    pub stop: StopReason,
    pub steps: u64,
    pub allocated_states: u64,
    pub alive_states: usize,
    pub normal_states_left: usize,
    pub completed_states: usize,
    pub max_state_steps: u64,
    pub max_state_queries: u64,
    pub covered_edges: usize,
    pub total_edges: usize,
    pub issues: usize,
    pub elapsed: Duration,
}

impl Summary {
    /// Fraction of runtime edges covered.
    pub fn coverage(&self) -> f64 {
        match self.total_edges {
            0 => 0.0,
            total => self.covered_edges as f64 / total as f64,
        }
    }
}

/// Explores every execution of a program image.
pub struct Explorer<S: Solver> {
    config: Config,
    image: ProgramImage,
    executor: Executor<S>,
    states: StateAllocator,
    graph: FlowGraph,
    coverage: CoverageTracker,
    subroutines: SubroutineTracker,
    loops: Option<Loops>,
    searcher: Box<dyn Searcher>,
    searcher_kind: SearcherKind,
    max_level: u32,
    initial: StateId,
    cancelled: Arc<AtomicBool>,
}

impl<S: Solver> Explorer<S> {
    /// Build the flow graph and the searcher, and create the initial state.
    pub fn new(image: ProgramImage, solver: S, config: Config) -> Result<Self> {
        let mut executor =
            Executor::new(solver, config.issue_package()?).with_cache_threshold(config.cache_threshold);

        let mut graph = FlowGraph::build(&image);
        let coverage = CoverageTracker::new(&mut graph);
        let subroutines = SubroutineTracker::new(&mut graph);
        let shared_code = subroutines.check_shared_code(&graph, executor.issues_mut());

        let mut searcher_kind = config.searcher;
        let mut loops = None;
        if searcher_kind == SearcherKind::Pruning {
            if shared_code {
                tracing::warn!("code is shared between subroutines, using a prioritized FILO searcher");
                searcher_kind = SearcherKind::PrioritizedFilo;
            } else {
                match Self::analyze_loops(&mut graph, &subroutines, config.max_segments) {
                    Some(found) => loops = Some(found),
                    None => searcher_kind = SearcherKind::PrioritizedFilo,
                }
            }
        }

        let mut searcher: Box<dyn Searcher> = match searcher_kind {
            SearcherKind::SimpleFifo => Box::new(SimpleFifo::default()),
            SearcherKind::SimpleFilo => Box::new(SimpleFilo::default()),
            SearcherKind::PrioritizedFilo => Box::new(PrioritizedFilo::default()),
            SearcherKind::RandomPicking => Box::new(RandomPicking::new(config.seed)),
            SearcherKind::Pruning => Box::new(PruningSearcher::new(
                PrioritizedFilo::default(),
                loops.clone().unwrap_or_default(),
                config.seed,
            )),
        };

        let max_level = match (searcher_kind, config.reactivation) {
            (SearcherKind::Pruning, Reactivation::Continue) => 1,
            _ => 0,
        };

        tracing::info!(
            searcher = ?searcher_kind,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "explorer ready"
        );

        let mut states = StateAllocator::new();
        let initial = executor.create_initial_state(&mut states, &image)?;
        subroutines.set_up_initial_state(states.get_mut(initial)?);
        searcher.push(&mut states, &graph, &[initial])?;

        Ok(Self {
            config,
            image,
            executor,
            states,
            graph,
            coverage,
            subroutines,
            loops,
            searcher,
            searcher_kind,
            max_level,
            initial,
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Analyze the loops of the main code and of every subroutine. Returns `None` if there are
    /// too many segments.
    fn analyze_loops(
        graph: &mut FlowGraph,
        subroutines: &SubroutineTracker,
        max_segments: Option<usize>,
    ) -> Option<Loops> {
        let mut analyzer = LoopAnalyzer::new(max_segments);
        let Some(main_entry) = graph.node_by_address(graph.entry()) else {
            return Some(analyzer.into_loops());
        };

        let entries: Vec<_> = std::iter::once((subroutines.main_color(), main_entry))
            .chain(subroutines.subroutines().map(|s| (s.color, s.entry)))
            .collect();

        for (color, entry) in entries {
            let subgraph = subroutines.subgraph(graph, color);
            if !analyzer.analyze_loops(graph, entry, &subgraph) {
                tracing::warn!(
                    segments = analyzer.total_segment_count(),
                    "too many loop segments, using a prioritized FILO searcher"
                );
                return None;
            }
        }

        tracing::info!(
            loops = analyzer.loops().len(),
            segments = analyzer.total_segment_count(),
            "loops analyzed"
        );
        Some(analyzer.into_loops())
    }

    /// Setting the token stops the run before the next step.
    pub fn cancellation_token(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    /// Step states until none is eligible, the run is cancelled or the time limit passes.
    pub fn run(&mut self) -> Result<Summary> {
        let start = Instant::now();
        let mut last_report = start;
        let time_limit = self.config.time_limit_secs.map(Duration::from_secs);
        let progress_interval = self.config.progress_interval_secs.map(Duration::from_secs);

        let mut summary = Summary {
            searcher: self.searcher_kind,
            ..Default::default()
        };

        'levels: for level in 0..=self.max_level {
            self.searcher.set_level(level);

            while let Some(id) = self.searcher.fetch(&mut self.states)? {
                let successors = self.executor.step(&mut self.states, id)?;
                summary.steps += 1;

                let stepped = self.states.get(id)?;
                summary.max_state_steps = summary.max_state_steps.max(stepped.step_count());
                summary.max_state_queries = summary.max_state_queries.max(stepped.query_count());

                // Coverage first, the subroutine tracker relies on the discovered edges
                for successor in successors.iter().copied() {
                    let state = self.states.get_mut(successor)?;
                    self.coverage.update(&mut self.graph, state);
                }

                for successor in successors.iter().copied() {
                    let state = self.states.get_mut(successor)?;
                    let issues = self.executor.issues_mut();
                    self.subroutines.update_colors(&mut self.graph, state, issues);

                    match state.status() {
                        Status::Normal => {
                            self.config.limits.check(state, issues);
                        }
                        Status::Halted => self.subroutines.post_check_state(state, issues),
                        Status::Broken => (),
                    }
                }

                self.searcher
                    .push(&mut self.states, &self.graph, &successors)?;

                if self.config.release_completed {
                    self.release_completed(&successors)?;
                }

                if self.cancelled.load(Ordering::Relaxed) {
                    tracing::warn!("run cancelled");
                    summary.stop = StopReason::Cancelled;
                    break 'levels;
                }

                if let Some(interval) = progress_interval
                    && last_report.elapsed() >= interval
                {
                    tracing::info!(
                        states = self.states.total_count(),
                        alive = self.states.alive_count(),
                        steps = summary.steps,
                        coverage = %format!("{:.2}%", self.coverage.coverage() * 100.0),
                        "progress"
                    );
                    last_report = Instant::now();
                }

                if let Some(limit) = time_limit
                    && start.elapsed() > limit
                {
                    tracing::warn!(seconds = limit.as_secs(), "time limit exceeded");
                    summary.stop = StopReason::TimeLimit;
                    break 'levels;
                }
            }
        }

        // Postponed states are not counted as left normal
        self.searcher.set_level(0);
        self.searcher.report();

        summary.allocated_states = self.states.total_count();
        summary.alive_states = self.states.alive_count();
        summary.normal_states_left = self.searcher.normal_states().len();
        summary.completed_states = self.searcher.completed_states().len();
        summary.covered_edges = self.coverage.covered_edges();
        summary.total_edges = self.coverage.total_edges();
        summary.issues = self.executor.issues().len();
        summary.elapsed = start.elapsed();

        tracing::info!(
            states = summary.allocated_states,
            alive = summary.alive_states,
            left_normal = summary.normal_states_left,
            steps = summary.steps,
            coverage = %format!("{:.2}%", summary.coverage() * 100.0),
            issues = summary.issues,
            "done"
        );

        Ok(summary)
    }

    /// Free terminal states nothing refers to anymore.
    fn release_completed(&mut self, successors: &[StateId]) -> Result<()> {
        for id in successors.iter().copied() {
            let state = self.states.get(id)?;
            if state.is_normal() || state.triggered_new_issue() || state.covered_new_segment() {
                continue;
            }

            self.searcher.remove_completed(id);
            self.states.release(id);
        }
        Ok(())
    }

    /// Concrete inputs that drive the program along the path of state `id`.
    pub fn test_case(&self, id: StateId) -> Result<Option<VariableAssignments>> {
        let state = self.states.get(id)?;
        let variables: Vec<usize> = self.image.inputs.iter().map(|input| input.variable).collect();
        Ok(self
            .executor
            .solver()
            .get_model(state.constraints(), &variables)?)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn image(&self) -> &ProgramImage {
        &self.image
    }

    pub fn initial_state(&self) -> StateId {
        self.initial
    }

    pub fn state(&self, id: StateId) -> Result<&MachineState> {
        Ok(self.states.get(id)?)
    }

    pub fn states(&self) -> &StateAllocator {
        &self.states
    }

    /// Halted and broken states kept by the searcher.
    pub fn completed_states(&self) -> Vec<StateId> {
        self.searcher.completed_states().iter().copied().collect()
    }

    pub fn graph(&self) -> &FlowGraph {
        &self.graph
    }

    pub fn coverage(&self) -> &CoverageTracker {
        &self.coverage
    }

    pub fn subroutines(&self) -> &SubroutineTracker {
        &self.subroutines
    }

    /// Loops found, when the pruning searcher is in use.
    pub fn loops(&self) -> Option<&Loops> {
        self.loops.as_ref()
    }

    pub fn searcher_kind(&self) -> SearcherKind {
        self.searcher_kind
    }

    pub fn issues(&self) -> &IssuePackage {
        self.executor.issues()
    }
}
