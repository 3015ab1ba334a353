//! LC-3 instruction decoding.

/// Instruction opcodes. The immediate forms of ADD and AND are distinct opcodes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Opcode {
    Add,
    AddImmediate,
    And,
    AndImmediate,
    Br,
    Jmp,
    Jsr,
    Jsrr,
    Ld,
    Ldi,
    Ldr,
    Lea,
    Not,
    St,
    Sti,
    Str,
    Trap,
    Rti,
}

impl Opcode {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Self::Add | Self::AddImmediate => "ADD",
            Self::And | Self::AndImmediate => "AND",
            Self::Br => "BR",
            Self::Jmp => "JMP",
            Self::Jsr => "JSR",
            Self::Jsrr => "JSRR",
            Self::Ld => "LD",
            Self::Ldi => "LDI",
            Self::Ldr => "LDR",
            Self::Lea => "LEA",
            Self::Not => "NOT",
            Self::St => "ST",
            Self::Sti => "STI",
            Self::Str => "STR",
            Self::Trap => "TRAP",
            Self::Rti => "RTI",
        }
    }

    /// Returns true if executing this opcode writes a register used for the condition code.
    pub fn sets_condition_code(&self) -> bool {
        matches!(
            self,
            Self::Add
                | Self::AddImmediate
                | Self::And
                | Self::AndImmediate
                | Self::Ld
                | Self::Ldi
                | Self::Ldr
                | Self::Lea
                | Self::Not
        )
    }
}

/// Mask and pattern pairs tried in order. The first match wins. RTI is last since its pattern
/// only checks the top bit.
const DECODE_TABLE: [(u16, u16, Opcode); 18] = [
    (0xF038, 0x1000, Opcode::Add),
    (0xF020, 0x1020, Opcode::AddImmediate),
    (0xF038, 0x5000, Opcode::And),
    (0xF020, 0x5020, Opcode::AndImmediate),
    (0xF000, 0x0000, Opcode::Br),
    (0xFE3F, 0xC000, Opcode::Jmp),
    (0xF800, 0x4800, Opcode::Jsr),
    (0xFE3F, 0x4000, Opcode::Jsrr),
    (0xF000, 0x2000, Opcode::Ld),
    (0xF000, 0xA000, Opcode::Ldi),
    (0xF000, 0x6000, Opcode::Ldr),
    (0xF000, 0xE000, Opcode::Lea),
    (0xF03F, 0x903F, Opcode::Not),
    (0xF000, 0x3000, Opcode::St),
    (0xF000, 0xB000, Opcode::Sti),
    (0xF000, 0x7000, Opcode::Str),
    (0xFF00, 0xF000, Opcode::Trap),
    (0x8000, 0x8000, Opcode::Rti),
];

/// Branch condition mask from bits 11..9 of a BR instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConditionMask(u8);

impl ConditionMask {
    pub const NONE: Self = Self(0);
    pub const P: Self = Self(1);
    pub const Z: Self = Self(2);
    pub const ZP: Self = Self(3);
    pub const N: Self = Self(4);
    pub const NP: Self = Self(5);
    pub const NZ: Self = Self(6);
    pub const NZP: Self = Self(7);

    pub fn from_bits(bits: u8) -> Self {
        Self(bits & 7)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn complement(&self) -> Self {
        Self(self.0 ^ 7)
    }

    pub fn union(&self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn intersection(&self, other: Self) -> Self {
        Self(self.0 & other.0)
    }
}

impl std::fmt::Display for ConditionMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (bit, name) in [(4, 'n'), (2, 'z'), (1, 'p')] {
            if self.0 & bit != 0 {
                write!(f, "{name}")?;
            }
        }
        Ok(())
    }
}

/// Trap vectors serviced by the operating system.
pub mod trap {
    pub const GETC: u8 = 0x20;
    pub const OUT: u8 = 0x21;
    pub const PUTS: u8 = 0x22;
    pub const IN: u8 = 0x23;
    pub const PUTSP: u8 = 0x24;
    pub const HALT: u8 = 0x25;

    /// Non-standard trap that returns to the caller.
    pub const RETURNING_EXTENSION: u8 = 0xC3;

    /// Returns true if a trap through `vector` is expected to return to the instruction after
    /// the TRAP.
    pub fn returns(vector: u8) -> bool {
        matches!(vector, GETC | OUT | PUTS | IN | PUTSP | RETURNING_EXTENSION)
    }
}

/// A decoded instruction word.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Instruction {
    word: u16,
    opcode: Opcode,
}

fn sign_extend(value: u16, bits: u32) -> u16 {
    let shift = 16 - bits;
    (((value << shift) as i16) >> shift) as u16
}

impl Instruction {
    /// Decode a word. Words that do not match any instruction pattern are data.
    pub fn decode(word: u16) -> Option<Self> {
        DECODE_TABLE
            .iter()
            .find(|(mask, pattern, _)| word & mask == *pattern)
            .map(|(_, _, opcode)| Self {
                word,
                opcode: *opcode,
            })
    }

    pub fn word(&self) -> u16 {
        self.word
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Destination register, bits 11..9. Also the source register of stores.
    pub fn dr(&self) -> usize {
        ((self.word >> 9) & 7) as usize
    }

    /// Source register of stores, bits 11..9.
    pub fn sr(&self) -> usize {
        self.dr()
    }

    /// First source register, bits 8..6.
    pub fn sr1(&self) -> usize {
        ((self.word >> 6) & 7) as usize
    }

    /// Base register of LDR, STR, JMP and JSRR, bits 8..6.
    pub fn base_r(&self) -> usize {
        self.sr1()
    }

    /// Second source register, bits 2..0.
    pub fn sr2(&self) -> usize {
        (self.word & 7) as usize
    }

    pub fn condition(&self) -> ConditionMask {
        ConditionMask::from_bits(((self.word >> 9) & 7) as u8)
    }

    pub fn imm5(&self) -> u16 {
        sign_extend(self.word & 0x1F, 5)
    }

    pub fn offset6(&self) -> u16 {
        sign_extend(self.word & 0x3F, 6)
    }

    pub fn pc_offset9(&self) -> u16 {
        sign_extend(self.word & 0x1FF, 9)
    }

    pub fn pc_offset11(&self) -> u16 {
        sign_extend(self.word & 0x7FF, 11)
    }

    pub fn trap_vector(&self) -> u8 {
        (self.word & 0xFF) as u8
    }

    /// `JMP R7`
    pub fn is_ret(&self) -> bool {
        self.opcode == Opcode::Jmp && self.base_r() == 7
    }

    pub fn is_subroutine_call(&self) -> bool {
        matches!(self.opcode, Opcode::Jsr | Opcode::Jsrr)
    }

    pub fn is_store(&self) -> bool {
        matches!(self.opcode, Opcode::St | Opcode::Sti | Opcode::Str)
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let offset = |value: u16| value as i16;
        match self.opcode {
            Opcode::Add | Opcode::And => write!(
                f,
                "{} R{}, R{}, R{}",
                self.opcode.mnemonic(),
                self.dr(),
                self.sr1(),
                self.sr2()
            ),
            Opcode::AddImmediate | Opcode::AndImmediate => write!(
                f,
                "{} R{}, R{}, #{}",
                self.opcode.mnemonic(),
                self.dr(),
                self.sr1(),
                offset(self.imm5())
            ),
            Opcode::Br => write!(f, "BR{} #{}", self.condition(), offset(self.pc_offset9())),
            Opcode::Jmp if self.is_ret() => write!(f, "RET"),
            Opcode::Jmp | Opcode::Jsrr => {
                write!(f, "{} R{}", self.opcode.mnemonic(), self.base_r())
            }
            Opcode::Jsr => write!(f, "JSR #{}", offset(self.pc_offset11())),
            Opcode::Ld | Opcode::Ldi | Opcode::Lea | Opcode::St | Opcode::Sti => write!(
                f,
                "{} R{}, #{}",
                self.opcode.mnemonic(),
                self.dr(),
                offset(self.pc_offset9())
            ),
            Opcode::Ldr | Opcode::Str => write!(
                f,
                "{} R{}, R{}, #{}",
                self.opcode.mnemonic(),
                self.dr(),
                self.base_r(),
                offset(self.offset6())
            ),
            Opcode::Not => write!(f, "NOT R{}, R{}", self.dr(), self.sr1()),
            Opcode::Trap => write!(f, "TRAP x{:02X}", self.trap_vector()),
            Opcode::Rti => write!(f, "RTI"),
        }
    }
}
