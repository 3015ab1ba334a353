use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use sym::{EnumeratingSolver, SymbolicWord};
use symbolic_lc3::config::Config;
use symbolic_lc3::driver::Explorer;
use symbolic_lc3::flow::FlowGraph;
use symbolic_lc3::image::{ImageBuilder, ProgramImage};
use symbolic_lc3::loops::LoopAnalyzer;
use symbolic_lc3::search::SearcherKind;
use symbolic_lc3::subroutine::SubroutineTracker;

const ORIGIN: u16 = 0x3000;

/// Two nested loops over symbolic bounds.
///
/// ```text
///         LD  R0, N
/// OUTER   LD  R1, M
/// INNER   ADD R1, R1, #-1
///         BRp INNER
///         ADD R0, R0, #-1
///         BRp OUTER
///         HALT
/// N       .FILL ?
/// M       .FILL ?
/// ```
fn nested_loops() -> ProgramImage {
    let mut builder = ImageBuilder::new();
    builder
        .minimal_os()
        .code(ORIGIN, &[0x2006, 0x2206, 0x127F, 0x03FE, 0x103F, 0x03FB, 0xF025]);

    let n = builder.symbolic(ORIGIN + 7, "N");
    let m = builder.symbolic(ORIGIN + 8, "M");
    builder
        .constraint(n.unsigned_less_than_eq(SymbolicWord::Literal(6)))
        .constraint(m.unsigned_less_than_eq(SymbolicWord::Literal(6)));
    builder.build(ORIGIN)
}

fn explore(image: ProgramImage, searcher: SearcherKind) {
    let config = Config {
        searcher,
        ..Default::default()
    };
    let mut explorer =
        Explorer::new(image, EnumeratingSolver::new(), config).expect("failed to set up explorer");
    explorer.run().expect("failed to explore");
}

fn exploration(c: &mut Criterion) {
    c.bench_function("explore_prioritized_filo", |b| {
        b.iter_batched(
            nested_loops,
            |image| explore(image, SearcherKind::PrioritizedFilo),
            BatchSize::SmallInput,
        )
    });

    c.bench_function("explore_pruning", |b| {
        b.iter_batched(
            nested_loops,
            |image| explore(image, SearcherKind::Pruning),
            BatchSize::SmallInput,
        )
    });
}

fn analysis(c: &mut Criterion) {
    let image = nested_loops();

    c.bench_function("analyze_loops", |b| {
        b.iter(|| {
            let mut graph = FlowGraph::build(&image);
            let subroutines = SubroutineTracker::new(&mut graph);
            let entry = graph.node_by_address(ORIGIN).expect("entry node");
            let subgraph = subroutines.subgraph(&graph, subroutines.main_color());

            let mut analyzer = LoopAnalyzer::new(None);
            assert!(analyzer.analyze_loops(&mut graph, entry, &subgraph));
            analyzer.total_segment_count()
        })
    });
}

criterion_group!(benches, exploration, analysis);
criterion_main!(benches);
