use std::collections::BTreeMap;
use std::rc::Rc;

use sym::{Predicate, SymbolicWord};
use thiserror;

use crate::isa::Instruction;
use crate::mem::{DataFlags, MemoryCell, MemoryImage, SourceInfo};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Object files are a sequence of big-endian words.
    #[error("object file length {0} is not a whole number of words")]
    OddLength(usize),

    /// Object files start with the origin address.
    #[error("object file does not contain an origin")]
    MissingOrigin,

    /// The words following the origin do not fit below the end of memory.
    #[error("{len} words loaded at {origin:#06x} exceed the address space")]
    Overflow { origin: u16, len: usize },
}

pub type Result<T> = std::result::Result<T, Error>;

/// A symbolic input word placed in the initial memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SymbolicInput {
    pub variable: usize,
    pub address: u16,
    pub name: String,
}

/// The initial memory, entry point and input constraints of a program under test.
#[derive(Clone, Debug)]
pub struct ProgramImage {
    pub cells: Rc<MemoryImage>,
    pub entry: u16,
    pub constraints: Vec<Predicate>,
    pub inputs: Vec<SymbolicInput>,
}

impl ProgramImage {
    pub fn cell(&self, address: u16) -> Option<&Rc<MemoryCell>> {
        self.cells.get(&address)
    }
}

/// Parse an assembled object file: big-endian words where the first word is the load address.
pub fn parse_object(bytes: &[u8]) -> Result<(u16, Vec<u16>)> {
    if bytes.len() % 2 != 0 {
        return Err(Error::OddLength(bytes.len()));
    }

    let mut words = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
    let origin = words.next().ok_or(Error::MissingOrigin)?;
    let words: Vec<u16> = words.collect();

    if origin as usize + words.len() > 0x10000 {
        return Err(Error::Overflow {
            origin,
            len: words.len(),
        });
    }

    Ok((origin, words))
}

/// Incrementally assembles a [ProgramImage].
#[derive(Clone, Debug, Default)]
pub struct ImageBuilder {
    cells: BTreeMap<u16, MemoryCell>,
    constraints: Vec<Predicate>,
    inputs: Vec<SymbolicInput>,
    next_variable: usize,
}

impl ImageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a cell, replacing anything previously at its address.
    pub fn cell(&mut self, cell: MemoryCell) -> &mut Self {
        self.cells.insert(cell.address, cell);
        self
    }

    fn words(&mut self, origin: u16, words: &[u16], os: bool) -> &mut Self {
        for (address, word) in (origin..=u16::MAX).zip(words) {
            let cell = match Instruction::decode(*word) {
                Some(instruction) => MemoryCell::instruction(address, instruction),
                None => MemoryCell::data(address, Some((*word).into()), DataFlags::default()),
            };
            self.cell(cell.with_os(os));
        }
        self
    }

    /// Place program words starting at `origin`. Words that decode are instructions.
    pub fn code(&mut self, origin: u16, words: &[u16]) -> &mut Self {
        self.words(origin, words, false)
    }

    /// Place operating system words starting at `origin`. Words that decode are instructions.
    pub fn os_code(&mut self, origin: u16, words: &[u16]) -> &mut Self {
        self.words(origin, words, true)
    }

    pub fn data(&mut self, address: u16, value: u16) -> &mut Self {
        self.cell(MemoryCell::data(
            address,
            Some(value.into()),
            DataFlags::default(),
        ))
    }

    pub fn os_data(&mut self, address: u16, value: u16) -> &mut Self {
        self.cell(
            MemoryCell::data(address, Some(value.into()), DataFlags::default()).with_os(true),
        )
    }

    /// Place a data word that the program is not expected to overwrite.
    pub fn read_only(&mut self, address: u16, value: u16) -> &mut Self {
        let flags = DataFlags {
            read_only: true,
            ..Default::default()
        };
        self.cell(MemoryCell::data(address, Some(value.into()), flags))
    }

    /// Reserve `len` words that the program is expected to write before reading.
    pub fn uninitialized(&mut self, address: u16, len: u16) -> &mut Self {
        let flags = DataFlags {
            uninitialized: true,
            ..Default::default()
        };
        for address in (address..=u16::MAX).take(len as usize) {
            self.cell(MemoryCell::data(address, Some(0.into()), flags));
        }
        self
    }

    /// Place a fresh symbolic input word at `address` and return its expression.
    pub fn symbolic(&mut self, address: u16, name: impl Into<String>) -> SymbolicWord {
        let variable = self.next_variable;
        self.next_variable += 1;

        let word = SymbolicWord::Variable(variable);
        self.cell(MemoryCell::data(
            address,
            Some(word.clone()),
            DataFlags::default(),
        ));
        self.inputs.push(SymbolicInput {
            variable,
            address,
            name: name.into(),
        });
        word
    }

    /// Add a constraint every initial state must satisfy.
    pub fn constraint(&mut self, predicate: Predicate) -> &mut Self {
        self.constraints.push(predicate);
        self
    }

    /// Attach source information to the cell at `address`, if any.
    pub fn annotate(&mut self, address: u16, source: SourceInfo) -> &mut Self {
        if let Some(cell) = self.cells.get_mut(&address) {
            cell.source = Some(Rc::new(source));
        }
        self
    }

    /// Load an assembled object file as program code.
    pub fn object(&mut self, bytes: &[u8]) -> Result<&mut Self> {
        let (origin, words) = parse_object(bytes)?;
        Ok(self.code(origin, &words))
    }

    /// Install a small operating system providing the OUT, PUTS and HALT service routines.
    pub fn minimal_os(&mut self) -> &mut Self {
        for (vector, routine) in os::VECTORS {
            self.os_data(vector as u16, routine);
        }

        for (origin, words, data) in os::ROUTINES {
            self.os_code(origin, words);
            for offset in data {
                let address = origin + offset;
                let value = words[*offset as usize];
                self.os_data(address, value);
            }
        }

        self
    }

    pub fn build(&self, entry: u16) -> ProgramImage {
        ProgramImage {
            cells: Rc::new(
                self.cells
                    .iter()
                    .map(|(address, cell)| (*address, Rc::new(cell.clone())))
                    .collect(),
            ),
            entry,
            constraints: self.constraints.clone(),
            inputs: self.inputs.clone(),
        }
    }
}

mod os {
    use crate::isa::trap;

    pub const OUT: u16 = 0x0200;
    pub const PUTS: u16 = 0x0210;
    pub const HALT: u16 = 0x0230;

    pub const VECTORS: [(u8, u16); 3] = [(trap::OUT, OUT), (trap::PUTS, PUTS), (trap::HALT, HALT)];

    #[rustfmt::skip]
    const OUT_ROUTINE: [u16; 3] = [
        0xB001, // STI R0, DDR
        0xC1C0, // RET
        0xFE06, // DDR
    ];

    #[rustfmt::skip]
    const PUTS_ROUTINE: [u16; 13] = [
        0x3009, // ST R0, SAVE0
        0x3209, // ST R1, SAVE1
        0x6200, // LOOP: LDR R1, R0, #0
        0x0403, // BRz DONE
        0xB207, // STI R1, DDR
        0x1021, // ADD R0, R0, #1
        0x0FFB, // BRnzp LOOP
        0x2002, // DONE: LD R0, SAVE0
        0x2202, // LD R1, SAVE1
        0xC1C0, // RET
        0x0000, // SAVE0
        0x0000, // SAVE1
        0xFE06, // DDR
    ];

    #[rustfmt::skip]
    const HALT_ROUTINE: [u16; 4] = [
        0x5020, // AND R0, R0, #0
        0xB001, // STI R0, MCR
        0x0FFD, // BRnzp HALT
        0xFFFE, // MCR
    ];

    /// Routine origin, words, and offsets of words that are data.
    pub const ROUTINES: [(u16, &[u16], &[u16]); 3] = [
        (OUT, &OUT_ROUTINE, &[2]),
        (PUTS, &PUTS_ROUTINE, &[10, 11, 12]),
        (HALT, &HALT_ROUTINE, &[3]),
    ];
}
