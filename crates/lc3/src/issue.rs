use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror;

use crate::state::{MachineState, StateId, Status};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Some issues always break the state and cannot be lowered to a warning.
    #[error("issue {kind:?} cannot be reported at level {level:?}")]
    InvalidLevel { kind: IssueKind, level: IssueLevel },
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueLevel {
    /// The state is broken.
    Error,
    Warning,

    /// The issue is ignored.
    None,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    PossibleWildRead,
    ReadUninitializedMemory,
    PossibleWildWrite,
    WriteReadOnlyData,
    ReadInstructionAsData,
    UseUninitializedRegister,
    UseUninitializedConditionCode,
    ManualHalt,
    ImproperReturn,
    ReuseCodeAcrossSubroutines,
    HaltInSubroutine,

    InvalidInstruction,
    ExecuteDataAsInstruction,
    OverwriteInstruction,
    SymbolicPc,
    ExecuteUninitializedMemory,
    ReturnInMainCode,
    StepLimitReached,
    OutputLimitReached,
    QueryLimitReached,
}

impl IssueKind {
    pub fn default_level(&self) -> IssueLevel {
        match self {
            Self::PossibleWildRead
            | Self::ReadUninitializedMemory
            | Self::PossibleWildWrite
            | Self::WriteReadOnlyData
            | Self::ReadInstructionAsData
            | Self::UseUninitializedRegister
            | Self::UseUninitializedConditionCode
            | Self::ManualHalt
            | Self::ImproperReturn
            | Self::ReuseCodeAcrossSubroutines
            | Self::HaltInSubroutine => IssueLevel::Warning,
            _ => IssueLevel::Error,
        }
    }

    /// Returns true if this issue must always break the state.
    pub fn requires_error(&self) -> bool {
        self.default_level() == IssueLevel::Error && *self != Self::ReturnInMainCode
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::PossibleWildRead => "WARN_POSSIBLE_WILD_READ",
            Self::ReadUninitializedMemory => "WARN_READ_UNINITIALIZED_MEMORY",
            Self::PossibleWildWrite => "WARN_POSSIBLE_WILD_WRITE",
            Self::WriteReadOnlyData => "WARN_WRITE_READ_ONLY_DATA",
            Self::ReadInstructionAsData => "WARN_READ_INST_AS_DATA",
            Self::UseUninitializedRegister => "WARN_USE_UNINITIALIZED_REGISTER",
            Self::UseUninitializedConditionCode => "WARN_USE_UNINITIALIZED_CC",
            Self::ManualHalt => "WARN_MANUAL_HALT",
            Self::ImproperReturn => "WARN_IMPROPER_RET",
            Self::ReuseCodeAcrossSubroutines => "WARN_REUSE_CODE_ACROSS_SUBROUTINES",
            Self::HaltInSubroutine => "WARN_HALT_IN_SUBROUTINE",
            Self::InvalidInstruction => "ERR_INVALID_INST",
            Self::ExecuteDataAsInstruction => "ERR_EXECUTE_DATA_AS_INST",
            Self::OverwriteInstruction => "ERR_OVERWRITE_INST",
            Self::SymbolicPc => "ERR_SYMBOLIC_PC",
            Self::ExecuteUninitializedMemory => "ERR_EXECUTE_UNINITIALIZED_MEMORY",
            Self::ReturnInMainCode => "ERR_RET_IN_MAIN_CODE",
            Self::StepLimitReached => "ERR_STATE_REACH_STEP_LIMIT",
            Self::OutputLimitReached => "ERR_STATE_REACH_OUTPUT_LIMIT",
            Self::QueryLimitReached => "ERR_STATE_REACH_QUERY_LIMIT",
        }
    }
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Structured description of an issue occurrence. Rendering is left to [Issue]'s `Display`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IssueDetail {
    None,

    /// The memory address involved.
    Address(u16),

    /// An uninitialized register was read. `writer` is the last instruction that wrote it.
    Register { register: usize, writer: Option<u16> },

    /// The condition code was derived from an uninitialized register.
    ConditionCodeRegister { register: usize, writer: Option<u16> },

    /// The bits of an uninitialized register were stored at `address` and loaded elsewhere.
    StoredRegister {
        register: usize,
        stored_by: u16,
        address: u16,
    },

    /// A jump target that is not a single concrete value.
    Expression(String),

    /// A return whose target is not the instruction after the matching call.
    Return { call_site: u16, target: u16 },

    /// The subroutine the state is still inside of.
    Subroutine { entry: u16 },

    /// Code reached from several subroutines.
    SharedCode { colors: Vec<u16> },

    /// The limit that was exceeded.
    Limit(u64),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Issue {
    pub kind: IssueKind,
    pub level: IssueLevel,

    /// Address of the program instruction responsible, when there is one.
    pub location: Option<u16>,
    pub state: Option<StateId>,
    pub step: u64,
    pub detail: IssueDetail,
}

impl std::fmt::Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(location) = self.location {
            write!(f, " at x{location:04X}")?;
        }

        match &self.detail {
            IssueDetail::None => Ok(()),
            IssueDetail::Address(address) => write!(f, ": address x{address:04X}"),
            IssueDetail::Register { register, writer } => {
                write!(f, ": R{register} read before initialization")?;
                if let Some(writer) = writer {
                    write!(f, " (last written at x{writer:04X})")?;
                }
                Ok(())
            }
            IssueDetail::ConditionCodeRegister { register, writer } => {
                write!(f, ": condition code set by uninitialized R{register}")?;
                if let Some(writer) = writer {
                    write!(f, " at x{writer:04X}")?;
                }
                Ok(())
            }
            IssueDetail::StoredRegister {
                register,
                stored_by,
                address,
            } => write!(
                f,
                ": uninitialized R{register} stored at x{address:04X} by x{stored_by:04X}"
            ),
            IssueDetail::Expression(expression) => write!(f, ": {expression}"),
            IssueDetail::Return { call_site, target } => write!(
                f,
                ": returned to x{target:04X} instead of after call at x{call_site:04X}"
            ),
            IssueDetail::Subroutine { entry } => {
                write!(f, ": inside subroutine x{entry:04X}")
            }
            IssueDetail::SharedCode { colors } => {
                write!(f, ": shared by subroutines")?;
                for color in colors {
                    write!(f, " x{color:04X}")?;
                }
                Ok(())
            }
            IssueDetail::Limit(limit) => write!(f, ": limit {limit}"),
        }
    }
}

/// Collects issues raised during exploration.
#[derive(Clone, Debug)]
pub struct IssuePackage {
    issues: Vec<Issue>,
    levels: BTreeMap<IssueKind, IssueLevel>,
    seen: HashSet<(IssueKind, Option<u16>)>,

    /// Only the first occurrence of an issue kind at a location is reported.
    aggressive_filter: bool,
}

impl Default for IssuePackage {
    fn default() -> Self {
        Self::new(true)
    }
}

impl IssuePackage {
    pub fn new(aggressive_filter: bool) -> Self {
        Self {
            issues: Vec::new(),
            levels: BTreeMap::new(),
            seen: HashSet::new(),
            aggressive_filter,
        }
    }

    pub fn level(&self, kind: IssueKind) -> IssueLevel {
        self.levels
            .get(&kind)
            .copied()
            .unwrap_or_else(|| kind.default_level())
    }

    pub fn set_level(&mut self, kind: IssueKind, level: IssueLevel) -> Result<()> {
        if kind.requires_error() && level != IssueLevel::Error {
            return Err(Error::InvalidLevel { kind, level });
        }

        self.levels.insert(kind, level);
        Ok(())
    }

    /// Raise an issue against `state`. An error-level issue breaks the state even when the
    /// occurrence is filtered. Returns the index of the recorded issue.
    pub fn raise(
        &mut self,
        state: &mut MachineState,
        kind: IssueKind,
        location: Option<u16>,
        detail: IssueDetail,
    ) -> Option<usize> {
        let level = self.level(kind);
        if level == IssueLevel::None {
            return None;
        }

        if level == IssueLevel::Error {
            state.status = Status::Broken;
        }

        // Issues raised inside the operating system are attributed to the program instruction
        // that called into it
        let location = match location {
            Some(_) if state.in_os_code() => state.latest_program_instruction().map(|f| f.address),
            location => location,
        };

        let index = self.record(kind, level, location, Some(&*state), detail)?;
        state.triggered_new_issue = true;
        Some(index)
    }

    /// Raise an issue that does not belong to any single state.
    pub fn raise_global(
        &mut self,
        kind: IssueKind,
        location: Option<u16>,
        detail: IssueDetail,
    ) -> Option<usize> {
        let level = self.level(kind);
        if level == IssueLevel::None {
            return None;
        }

        self.record(kind, level, location, None, detail)
    }

    fn record(
        &mut self,
        kind: IssueKind,
        level: IssueLevel,
        location: Option<u16>,
        state: Option<&MachineState>,
        detail: IssueDetail,
    ) -> Option<usize> {
        if self.aggressive_filter && !self.seen.insert((kind, location)) {
            return None;
        }

        let issue = Issue {
            kind,
            level,
            location,
            state: state.map(MachineState::id),
            step: state.map(MachineState::step_count).unwrap_or_default(),
            detail,
        };

        match level {
            IssueLevel::Error => tracing::info!(state = ?issue.state, "{issue}"),
            _ => tracing::debug!(state = ?issue.state, "{issue}"),
        }

        self.issues.push(issue);
        Some(self.issues.len() - 1)
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn get(&self, index: usize) -> Option<&Issue> {
        self.issues.get(index)
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Returns true if an issue of `kind` has been recorded.
    pub fn contains(&self, kind: IssueKind) -> bool {
        self.issues.iter().any(|issue| issue.kind == kind)
    }
}
