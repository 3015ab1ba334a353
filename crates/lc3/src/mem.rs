use std::collections::BTreeMap;
use std::rc::Rc;

use sym::SymbolicWord;

use crate::isa::Instruction;

/// Keyboard status register. Always reads 0 since no input is ever available.
pub const KBSR: u16 = 0xFE00;

/// Keyboard data register. Backed by ordinary memory.
pub const KBDR: u16 = 0xFE02;

/// Display status register. Always reads ready.
pub const DSR: u16 = 0xFE04;

/// Display data register. Writes are captured as output.
pub const DDR: u16 = 0xFE06;

/// Machine control register. Clearing bit 15 halts the machine.
pub const MCR: u16 = 0xFFFE;

/// Where a memory cell came from in the program source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceInfo {
    pub labels: Vec<String>,
    pub line: Option<u32>,
    pub text: String,
}

/// Extra checks attached to a data cell.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DataFlags {
    /// Writing this cell is reported.
    pub read_only: bool,

    /// Reading this cell before it is written is reported.
    pub uninitialized: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CellContent {
    Instruction(Instruction),

    /// A data word. `None` holds the bits of an uninitialized register that were stored here.
    Data {
        value: Option<SymbolicWord>,
        flags: DataFlags,
    },
}

/// The content of a single memory address. Cells are immutable once created; a write replaces
/// the cell.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryCell {
    pub address: u16,
    pub content: CellContent,

    /// Belongs to the operating system rather than the program under test.
    pub os: bool,
    pub source: Option<Rc<SourceInfo>>,
}

impl MemoryCell {
    pub fn instruction(address: u16, instruction: Instruction) -> Self {
        Self {
            address,
            content: CellContent::Instruction(instruction),
            os: false,
            source: None,
        }
    }

    pub fn data(address: u16, value: Option<SymbolicWord>, flags: DataFlags) -> Self {
        Self {
            address,
            content: CellContent::Data { value, flags },
            os: false,
            source: None,
        }
    }

    pub fn with_os(mut self, os: bool) -> Self {
        self.os = os;
        self
    }

    pub fn with_source(mut self, source: Option<Rc<SourceInfo>>) -> Self {
        self.source = source;
        self
    }

    pub fn as_instruction(&self) -> Option<&Instruction> {
        match &self.content {
            CellContent::Instruction(instruction) => Some(instruction),
            CellContent::Data { .. } => None,
        }
    }

    pub fn is_instruction(&self) -> bool {
        self.as_instruction().is_some()
    }

    pub fn flags(&self) -> DataFlags {
        match &self.content {
            CellContent::Instruction(_) => DataFlags::default(),
            CellContent::Data { flags, .. } => *flags,
        }
    }

    /// The value read from this cell. Instruction cells read as their encoding.
    pub fn value(&self) -> Option<SymbolicWord> {
        match &self.content {
            CellContent::Instruction(instruction) => {
                Some(SymbolicWord::Literal(instruction.word()))
            }
            CellContent::Data { value, .. } => value.clone(),
        }
    }
}

/// Side effect of a data write to a memory-mapped register.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteEffect {
    /// The write was stored or ignored.
    None,

    /// The value was written to the display.
    Output(Option<SymbolicWord>),

    /// The machine was halted.
    Halt,
}

/// The fixed initial contents of memory shared by every state.
pub type MemoryImage = BTreeMap<u16, Rc<MemoryCell>>;

/// Memory of a single state: a private overlay of written cells over the shared initial image.
/// Cloning copies only the overlay.
#[derive(Clone, Debug, Default)]
pub struct Memory {
    base: Rc<MemoryImage>,
    overlay: BTreeMap<u16, Rc<MemoryCell>>,
}

impl Memory {
    pub fn new(base: Rc<MemoryImage>) -> Self {
        Self {
            base,
            overlay: Default::default(),
        }
    }

    /// The cell at `address`, with memory-mapped registers synthesized. Returns `None` if
    /// nothing was ever placed at this address.
    pub fn read(&self, address: u16) -> Option<Rc<MemoryCell>> {
        let mmio = match address {
            KBSR => Some(0),
            DSR => Some(0x8000),
            DDR => Some(0),
            MCR => Some(0x8000),
            _ => None,
        };

        if let Some(value) = mmio {
            return Some(Rc::new(
                MemoryCell::data(address, Some(value.into()), DataFlags::default()).with_os(true),
            ));
        }

        self.overlay
            .get(&address)
            .or_else(|| self.base.get(&address))
            .cloned()
    }

    /// Write a data word. Writes to device registers never modify memory.
    pub fn write(&mut self, address: u16, value: Option<SymbolicWord>) -> WriteEffect {
        match address {
            KBSR | KBDR | DSR => WriteEffect::None,
            DDR => WriteEffect::Output(value),
            MCR => {
                let running = value
                    .as_ref()
                    .and_then(SymbolicWord::maybe_literal)
                    .is_some_and(|value| value & 0x8000 != 0);
                if running {
                    WriteEffect::None
                } else {
                    WriteEffect::Halt
                }
            }
            _ => {
                let cell = MemoryCell::data(address, value, DataFlags::default());
                self.overlay.insert(address, Rc::new(cell));
                WriteEffect::None
            }
        }
    }

    /// Number of cells written by this state.
    pub fn overlay_len(&self) -> usize {
        self.overlay.len()
    }
}
