mod driver;
mod flow;
mod search;
mod subroutine;

/// Shared program fixtures. Words are hand assembled, the comment next to each word gives the
/// source.
pub(crate) mod fixtures {
    use sym::EnumeratingSolver;

    use crate::alloc::StateAllocator;
    use crate::coverage::CoverageTracker;
    use crate::driver::Result;
    use crate::executor::Executor;
    use crate::flow::FlowGraph;
    use crate::image::{ImageBuilder, ProgramImage};
    use crate::issue::IssuePackage;
    use crate::loops::{LoopAnalyzer, Loops};
    use crate::state::StateId;
    use crate::subroutine::SubroutineTracker;

    pub const ORIGIN: u16 = 0x3000;

    /// Image of `words` loaded at [ORIGIN] on top of the minimal operating system.
    pub fn program(words: &[u16]) -> ImageBuilder {
        let mut builder = ImageBuilder::new();
        builder.minimal_os().code(ORIGIN, words);
        builder
    }

    /// A loop that counts a symbolic input down to zero.
    ///
    /// ```text
    ///         LD  R0, N
    /// LOOP    BRz DONE
    ///         ADD R0, R0, #-1
    ///         BRnzp LOOP
    /// DONE    HALT
    /// N       .FILL ?
    /// ```
    pub fn countdown(max: u16) -> ProgramImage {
        let mut builder = program(&[
            0x2004, // LD R0, N
            0x0402, // BRz DONE
            0x103F, // ADD R0, R0, #-1
            0x0FFD, // BRnzp LOOP
            0xF025, // HALT
        ]);
        let n = builder.symbolic(ORIGIN + 5, "N");
        builder.constraint(n.unsigned_less_than_eq(sym::SymbolicWord::Literal(max)));
        builder.build(ORIGIN)
    }

    /// The pieces of an exploration, stepped by hand.
    pub struct Harness {
        pub executor: Executor<EnumeratingSolver>,
        pub states: StateAllocator,
        pub graph: FlowGraph,
        pub coverage: CoverageTracker,
        pub subroutines: SubroutineTracker,
        pub initial: StateId,
    }

    impl Harness {
        pub fn new(image: &ProgramImage) -> Result<Self> {
            let mut executor = Executor::new(EnumeratingSolver::new(), IssuePackage::new(false));
            let mut graph = FlowGraph::build(image);
            let coverage = CoverageTracker::new(&mut graph);
            let subroutines = SubroutineTracker::new(&mut graph);

            let mut states = StateAllocator::new();
            let initial = executor.create_initial_state(&mut states, image)?;
            subroutines.set_up_initial_state(states.get_mut(initial)?);

            Ok(Self {
                executor,
                states,
                graph,
                coverage,
                subroutines,
                initial,
            })
        }

        /// Find the loops of the main code and of every subroutine.
        pub fn analyze_loops(&mut self) -> Loops {
            let mut analyzer = LoopAnalyzer::new(None);
            let entries: Vec<_> = std::iter::once(self.subroutines.main_color())
                .chain(self.subroutines.subroutines().map(|s| s.color))
                .collect();

            for color in entries {
                let entry = match self.subroutines.subroutine(color) {
                    Some(subroutine) => subroutine.entry,
                    None => self
                        .graph
                        .node_by_address(self.graph.entry())
                        .expect("entry instruction exists"),
                };
                let subgraph = self.subroutines.subgraph(&self.graph, color);
                assert!(analyzer.analyze_loops(&mut self.graph, entry, &subgraph));
            }

            analyzer.into_loops()
        }

        /// Step `id` and bring coverage and colors up to date, the way the explorer does.
        pub fn step(&mut self, id: StateId) -> Result<Vec<StateId>> {
            let successors = self.executor.step(&mut self.states, id)?;
            for successor in &successors {
                let state = self.states.get_mut(*successor)?;
                self.coverage.update(&mut self.graph, state);
            }

            for successor in &successors {
                let state = self.states.get_mut(*successor)?;
                self.subroutines
                    .update_colors(&mut self.graph, state, self.executor.issues_mut());
            }

            Ok(successors)
        }
    }
}
