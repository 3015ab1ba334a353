use std::collections::BTreeMap;

use sym::{ConstraintSet, Predicate, SymbolicWord};

use crate::flow::{NodeId, Path};
use crate::isa::{Instruction, Opcode};
use crate::loops::LoopId;
use crate::mem::Memory;

/// Identity of a state. Assigned in increasing order at creation and fork time.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(pub(crate) u64);

impl std::fmt::Display for StateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Status {
    Normal,

    /// Terminal. The program halted through the machine control register.
    Halted,

    /// Terminal. An error-level issue was raised.
    Broken,
}

/// A fetched instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Fetched {
    pub address: u16,
    pub instruction: Instruction,
    pub os: bool,
}

impl Fetched {
    pub fn opcode(&self) -> Opcode {
        self.instruction.opcode()
    }
}

/// One level of loop nesting a state is currently inside of.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoopLayer {
    pub loop_id: LoopId,

    /// Compressed path since the loop was entered or since the last return to its head.
    pub path: Path,

    /// Subroutine color the loop belongs to.
    pub color: u16,
}

/// The symbolic machine state of one execution path.
#[derive(Clone, Debug)]
pub struct MachineState {
    pub(crate) id: StateId,
    pub(crate) status: Status,
    pub(crate) constraints: ConstraintSet,

    pub(crate) registers: [Option<SymbolicWord>; 8],
    pub(crate) pc: u16,
    pub(crate) ir: u16,

    /// Register whose last write determines N, Z and P.
    pub(crate) cc_source: Option<usize>,

    pub(crate) memory: Memory,
    pub(crate) output: Vec<SymbolicWord>,

    /// Most recent fetches first.
    pub(crate) latest: [Option<Fetched>; 2],
    pub(crate) latest_non_os: [Option<Fetched>; 2],

    pub(crate) step_count: u64,
    pub(crate) query_count: u64,

    pub(crate) register_writers: [Option<u16>; 8],
    pub(crate) cc_writer: Option<u16>,

    /// Addresses holding the bits of an uninitialized register, with the register and the
    /// address of the storing instruction.
    pub(crate) uninitialized_stores: BTreeMap<u16, (usize, u16)>,

    pub(crate) path: Path,
    pub(crate) colors: Vec<u16>,
    pub(crate) call_sites: Vec<NodeId>,
    pub(crate) stack_messed_up: bool,
    pub(crate) loop_layers: Vec<LoopLayer>,

    pub(crate) triggered_new_issue: bool,
    pub(crate) covered_new_edge: bool,
    pub(crate) covered_new_segment: bool,
    pub(crate) avoid_postpone: bool,
}

impl MachineState {
    pub(crate) fn new(id: StateId, memory: Memory, pc: u16, constraints: ConstraintSet) -> Self {
        Self {
            id,
            status: Status::Normal,
            constraints,
            registers: Default::default(),
            pc,
            ir: 0,
            cc_source: None,
            memory,
            output: Vec::new(),
            latest: [None; 2],
            latest_non_os: [None; 2],
            step_count: 0,
            query_count: 0,
            register_writers: [None; 8],
            cc_writer: None,
            uninitialized_stores: BTreeMap::new(),
            path: Path::default(),
            colors: Vec::new(),
            call_sites: Vec::new(),
            stack_messed_up: false,
            loop_layers: Vec::new(),
            triggered_new_issue: false,
            covered_new_edge: false,
            covered_new_segment: false,
            avoid_postpone: false,
        }
    }

    /// Copy this state under a new identity. Flags describing the most recent step are cleared.
    pub(crate) fn fork(&self, id: StateId) -> Self {
        Self {
            id,
            triggered_new_issue: false,
            covered_new_edge: false,
            covered_new_segment: false,
            avoid_postpone: false,
            ..self.clone()
        }
    }

    pub fn id(&self) -> StateId {
        self.id
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_normal(&self) -> bool {
        self.status == Status::Normal
    }

    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    pub fn add_constraint(&mut self, predicate: Predicate) {
        self.constraints.push(predicate);
    }

    pub fn register(&self, index: usize) -> Option<&SymbolicWord> {
        self.registers.get(index).and_then(Option::as_ref)
    }

    pub fn set_register(&mut self, index: usize, value: Option<SymbolicWord>) {
        self.registers[index] = value;
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn set_pc(&mut self, pc: u16) {
        self.pc = pc;
    }

    pub fn ir(&self) -> u16 {
        self.ir
    }

    pub fn cc_source(&self) -> Option<usize> {
        self.cc_source
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn output(&self) -> &[SymbolicWord] {
        &self.output
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    pub fn query_count(&self) -> u64 {
        self.query_count
    }

    /// The most recently fetched instruction.
    pub fn latest_instruction(&self) -> Option<&Fetched> {
        self.latest[0].as_ref()
    }

    /// The most recently fetched instruction outside the operating system.
    pub fn latest_program_instruction(&self) -> Option<&Fetched> {
        self.latest_non_os[0].as_ref()
    }

    pub fn register_writer(&self, index: usize) -> Option<u16> {
        self.register_writers.get(index).copied().flatten()
    }

    pub fn cc_writer(&self) -> Option<u16> {
        self.cc_writer
    }

    /// Returns true while executing operating system code on behalf of the program.
    pub fn in_os_code(&self) -> bool {
        self.latest[0] != self.latest_non_os[0]
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn colors(&self) -> &[u16] {
        &self.colors
    }

    pub fn stack_messed_up(&self) -> bool {
        self.stack_messed_up
    }

    pub fn loop_layers(&self) -> &[LoopLayer] {
        &self.loop_layers
    }

    pub fn triggered_new_issue(&self) -> bool {
        self.triggered_new_issue
    }

    pub fn covered_new_edge(&self) -> bool {
        self.covered_new_edge
    }

    pub fn covered_new_segment(&self) -> bool {
        self.covered_new_segment
    }

    pub fn avoid_postpone(&self) -> bool {
        self.avoid_postpone
    }

    pub(crate) fn record_fetch(&mut self, fetched: Fetched) {
        self.latest[1] = self.latest[0];
        self.latest[0] = Some(fetched);
        if !fetched.os {
            self.latest_non_os[1] = self.latest_non_os[0];
            self.latest_non_os[0] = Some(fetched);
        }
        self.step_count += 1;
    }
}
