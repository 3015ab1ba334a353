use std::collections::BTreeSet;

use sym::{EnumeratingSolver, Solver, SymbolicWord};
use symbolic_lc3::config::Config;
use symbolic_lc3::driver::{self, Explorer, Summary};
use symbolic_lc3::image::{ImageBuilder, ProgramImage};

pub const ORIGIN: u16 = 0x3000;

/// Logs go to the test output. Set `RUST_LOG` to see them.
pub fn initialize_logger() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Object file bytes of `words` loaded at `origin`.
pub fn object_file(origin: u16, words: &[u16]) -> Vec<u8> {
    std::iter::once(origin)
        .chain(words.iter().copied())
        .flat_map(u16::to_be_bytes)
        .collect()
}

/// Builder with the minimal operating system and `words` loaded at [ORIGIN].
pub fn program(words: &[u16]) -> ImageBuilder {
    let mut builder = ImageBuilder::new();
    builder.minimal_os().code(ORIGIN, words);
    builder
}

/// Add a symbolic input at `address` that is at most `max`.
pub fn bounded_input(builder: &mut ImageBuilder, address: u16, name: &str, max: u16) {
    let input = builder.symbolic(address, name);
    builder.constraint(input.unsigned_less_than_eq(SymbolicWord::Literal(max)));
}

pub fn explore<S: Solver>(
    image: ProgramImage,
    solver: S,
    config: Config,
) -> driver::Result<(Explorer<S>, Summary)> {
    let mut explorer = Explorer::new(image, solver, config)?;
    let summary = explorer.run()?;
    Ok((explorer, summary))
}

pub fn explore_enumerating(
    image: ProgramImage,
    config: Config,
) -> driver::Result<(Explorer<EnumeratingSolver>, Summary)> {
    explore(image, EnumeratingSolver::new(), config)
}

/// Values of the first input across the test cases of every completed state.
pub fn first_input_values<S: Solver>(explorer: &Explorer<S>) -> driver::Result<BTreeSet<u16>> {
    let variable = explorer.image().inputs[0].variable;
    let mut values = BTreeSet::new();
    for id in explorer.completed_states() {
        if let Some(model) = explorer.test_case(id)?
            && let Some(value) = model.get(variable)
        {
            values.insert(value);
        }
    }
    Ok(values)
}
