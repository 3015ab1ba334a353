use std::collections::HashMap;

use sym::{ConstraintSet, Predicate, Solver, SymbolicWord, Validity, ZERO};
use thiserror;

use crate::alloc::{self, StateAllocator};
use crate::image::ProgramImage;
use crate::isa::{ConditionMask, Opcode};
use crate::issue::{IssueDetail, IssueKind, IssuePackage};
use crate::mem::{CellContent, WriteEffect};
use crate::state::{Fetched, MachineState, StateId, Status};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A solver query failed. The exploration cannot continue soundly.
    #[error(transparent)]
    Solver(#[from] sym::Error),

    #[error(transparent)]
    State(#[from] alloc::Error),

    /// The constraints of the program image admit no input.
    #[error("initial constraint {0} cannot be satisfied")]
    UnsatisfiableConstraint(Predicate),

    /// An internal error occurred. This is a fatal error that cannot be safely handled.
    #[error("internal error: {0}")]
    InternalError(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Result of enumerating the values an expression may take.
pub type PossibleValues = Vec<(u16, Predicate)>;

/// Steps states one instruction at a time, forking where the successor is not unique.
pub struct Executor<S: Solver> {
    solver: S,
    issues: IssuePackage,
    initial_constraints: ConstraintSet,

    /// Values each address expression may take under the initial constraints. An empty entry
    /// marks an expression with more values than the cache threshold.
    value_cache: HashMap<SymbolicWord, PossibleValues>,
    cache_threshold: Option<usize>,
}

impl<S: Solver> Executor<S> {
    pub fn new(solver: S, issues: IssuePackage) -> Self {
        Self {
            solver,
            issues,
            initial_constraints: ConstraintSet::new(),
            value_cache: HashMap::new(),
            cache_threshold: None,
        }
    }

    /// Cache possible address values for expressions with at most `threshold` values. `None`
    /// disables the cache.
    pub fn with_cache_threshold(mut self, threshold: Option<usize>) -> Self {
        self.cache_threshold = threshold.filter(|threshold| *threshold > 0);
        self
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    pub fn issues(&self) -> &IssuePackage {
        &self.issues
    }

    pub fn issues_mut(&mut self) -> &mut IssuePackage {
        &mut self.issues
    }

    pub fn initial_constraints(&self) -> &ConstraintSet {
        &self.initial_constraints
    }

    /// Create the initial state of `image` after checking each of its constraints is
    /// satisfiable.
    pub fn create_initial_state(
        &mut self,
        states: &mut StateAllocator,
        image: &ProgramImage,
    ) -> Result<StateId> {
        let mut constraints = ConstraintSet::new();
        for constraint in &image.constraints {
            if self.solver.must_be_false(&constraints, constraint)? {
                return Err(Error::UnsatisfiableConstraint(constraint.clone()));
            }

            constraints.push(constraint.clone());
        }

        self.initial_constraints = constraints.clone();
        Ok(states.create_initial(image, constraints))
    }

    /// Execute one instruction of a normal state. Returns every successor state, which always
    /// includes `id` itself.
    pub fn step(&mut self, states: &mut StateAllocator, id: StateId) -> Result<Vec<StateId>> {
        let state = states.get_mut(id)?;
        if !state.is_normal() {
            return Err(Error::InternalError(format!(
                "stepping state {id} with status {:?}",
                state.status()
            )));
        }

        let Some(fetched) = self.fetch(state) else {
            return Ok(vec![id]);
        };

        state.record_fetch(fetched);
        state.ir = fetched.instruction.word();
        state.pc = state.pc.wrapping_add(1);

        match fetched.opcode() {
            Opcode::Br => self.execute_br(states, id, &fetched),
            Opcode::Ldr | Opcode::Ldi | Opcode::Str | Opcode::Sti => {
                self.execute_indirect(states, id, &fetched)
            }
            _ => {
                self.execute_direct(state, &fetched);
                Ok(vec![id])
            }
        }
    }

    fn fetch(&mut self, state: &mut MachineState) -> Option<Fetched> {
        let pc = state.pc;
        let location = state.latest_program_instruction().map(|f| f.address);
        match state.memory.read(pc) {
            None => {
                self.issues.raise(
                    state,
                    IssueKind::ExecuteUninitializedMemory,
                    location,
                    IssueDetail::Address(pc),
                );
                None
            }
            Some(cell) => match &cell.content {
                CellContent::Instruction(instruction) => Some(Fetched {
                    address: pc,
                    instruction: *instruction,
                    os: cell.os,
                }),
                CellContent::Data { .. } => {
                    self.issues.raise(
                        state,
                        IssueKind::ExecuteDataAsInstruction,
                        location,
                        IssueDetail::Address(pc),
                    );
                    None
                }
            },
        }
    }

    fn raise(
        &mut self,
        state: &mut MachineState,
        kind: IssueKind,
        at: &Fetched,
        detail: IssueDetail,
    ) {
        self.issues.raise(state, kind, Some(at.address), detail);
    }

    /// Read a register, reporting and zeroing it if uninitialized.
    fn read_register(&mut self, state: &mut MachineState, index: usize, at: &Fetched) -> SymbolicWord {
        if let Some(value) = &state.registers[index] {
            return value.clone();
        }

        if !at.os {
            let writer = state.register_writers[index];
            self.raise(
                state,
                IssueKind::UseUninitializedRegister,
                at,
                IssueDetail::Register {
                    register: index,
                    writer,
                },
            );
        }

        state.registers[index] = Some(ZERO);
        ZERO
    }

    fn write_register(
        &mut self,
        state: &mut MachineState,
        index: usize,
        value: Option<SymbolicWord>,
        at: &Fetched,
    ) {
        state.registers[index] = value;
        state.register_writers[index] = Some(at.address);
    }

    fn set_cc(&mut self, state: &mut MachineState, index: usize, at: &Fetched) {
        state.cc_source = Some(index);
        state.cc_writer = Some(at.address);
    }

    /// The value of the register the condition code was derived from.
    fn read_cc(&mut self, state: &mut MachineState, at: &Fetched) -> SymbolicWord {
        let Some(index) = state.cc_source else {
            self.raise(
                state,
                IssueKind::UseUninitializedConditionCode,
                at,
                IssueDetail::None,
            );
            return ZERO;
        };

        if let Some(value) = &state.registers[index] {
            return value.clone();
        }

        let writer = state.cc_writer;
        self.raise(
            state,
            IssueKind::UseUninitializedRegister,
            at,
            IssueDetail::ConditionCodeRegister {
                register: index,
                writer,
            },
        );
        state.registers[index] = Some(ZERO);
        ZERO
    }

    /// Read a data word. `dest` is the register being loaded, if any: loading the bits of an
    /// uninitialized register back into the same register keeps it uninitialized.
    fn read_memory(
        &mut self,
        state: &mut MachineState,
        address: u16,
        at: &Fetched,
        dest: Option<usize>,
    ) -> Option<SymbolicWord> {
        let Some(cell) = state.memory.read(address) else {
            self.raise(state, IssueKind::PossibleWildRead, at, IssueDetail::Address(address));
            return Some(ZERO);
        };

        if cell.is_instruction() {
            self.raise(
                state,
                IssueKind::ReadInstructionAsData,
                at,
                IssueDetail::Address(address),
            );
        } else if cell.flags().uninitialized {
            self.raise(
                state,
                IssueKind::ReadUninitializedMemory,
                at,
                IssueDetail::Address(address),
            );
        }

        if let Some(value) = cell.value() {
            return Some(value);
        }

        match state.uninitialized_stores.get(&address).copied() {
            Some((register, _)) if Some(register) == dest => None,
            Some((register, stored_by)) => {
                self.raise(
                    state,
                    IssueKind::UseUninitializedRegister,
                    at,
                    IssueDetail::StoredRegister {
                        register,
                        stored_by,
                        address,
                    },
                );
                state.uninitialized_stores.remove(&address);
                Some(ZERO)
            }
            None => Some(ZERO),
        }
    }

    fn write_memory(
        &mut self,
        state: &mut MachineState,
        address: u16,
        value: Option<SymbolicWord>,
        at: &Fetched,
    ) {
        match state.memory.read(address) {
            None => self.raise(
                state,
                IssueKind::PossibleWildWrite,
                at,
                IssueDetail::Address(address),
            ),
            Some(cell) if cell.is_instruction() => {
                self.raise(
                    state,
                    IssueKind::OverwriteInstruction,
                    at,
                    IssueDetail::Address(address),
                );
                return;
            }
            Some(cell) if cell.flags().read_only => self.raise(
                state,
                IssueKind::WriteReadOnlyData,
                at,
                IssueDetail::Address(address),
            ),
            Some(_) => (),
        }

        if value.is_none() {
            state
                .uninitialized_stores
                .insert(address, (at.instruction.sr(), at.address));
        } else {
            state.uninitialized_stores.remove(&address);
        }

        match state.memory.write(address, value) {
            WriteEffect::None => (),
            WriteEffect::Output(Some(value)) => state.output.push(value),
            WriteEffect::Output(None) => {
                let register = at.instruction.sr();
                let writer = state.register_writers[register];
                self.raise(
                    state,
                    IssueKind::UseUninitializedRegister,
                    at,
                    IssueDetail::Register { register, writer },
                );
                state.output.push(ZERO);
            }
            WriteEffect::Halt => {
                state.status = Status::Halted;
                let last = state.latest_non_os[0];
                if last.is_some_and(|last| last.opcode() != Opcode::Trap) {
                    let location = last.map(|last| last.address);
                    self.issues
                        .raise(state, IssueKind::ManualHalt, location, IssueDetail::None);
                }
            }
        }
    }

    fn execute_direct(&mut self, state: &mut MachineState, at: &Fetched) {
        let instruction = at.instruction;
        match instruction.opcode() {
            Opcode::Add | Opcode::AddImmediate => {
                let lhs = self.read_register(state, instruction.sr1(), at);
                let rhs = if instruction.opcode() == Opcode::AddImmediate {
                    SymbolicWord::Literal(instruction.imm5())
                } else {
                    self.read_register(state, instruction.sr2(), at)
                };

                let sum = fold_add(lhs, rhs);
                self.write_register(state, instruction.dr(), Some(sum), at);
                self.set_cc(state, instruction.dr(), at);
            }
            Opcode::And | Opcode::AndImmediate => {
                let lhs = state.registers[instruction.sr1()].clone();
                let rhs = if instruction.opcode() == Opcode::AndImmediate {
                    Some(SymbolicWord::Literal(instruction.imm5()))
                } else {
                    state.registers[instruction.sr2()].clone()
                };

                // Masking with a known zero is the idiom for clearing a register
                self.check_and_operand(state, instruction.sr1(), lhs.as_ref(), rhs.as_ref(), at);
                self.check_and_operand(state, instruction.sr2(), rhs.as_ref(), lhs.as_ref(), at);

                let result = lhs.unwrap_or(ZERO) & rhs.unwrap_or(ZERO);
                self.write_register(state, instruction.dr(), Some(result), at);
                self.set_cc(state, instruction.dr(), at);
            }
            Opcode::Not => {
                let value = self.read_register(state, instruction.sr1(), at);
                self.write_register(state, instruction.dr(), Some(!value), at);
                self.set_cc(state, instruction.dr(), at);
            }
            Opcode::Lea => {
                let address = state.pc.wrapping_add(instruction.pc_offset9());
                self.write_register(state, instruction.dr(), Some(address.into()), at);
                self.set_cc(state, instruction.dr(), at);
            }
            Opcode::Jmp => {
                if instruction.is_ret()
                    && !at.os
                    && !state.stack_messed_up
                    && state.colors.len() < 2
                {
                    self.raise(state, IssueKind::ReturnInMainCode, at, IssueDetail::None);
                    state.stack_messed_up = true;
                }

                let target = self.read_register(state, instruction.base_r(), at);
                self.jump(state, target, at);
            }
            Opcode::Jsr => {
                let pc = state.pc;
                self.write_register(state, 7, Some(pc.into()), at);
                state.pc = pc.wrapping_add(instruction.pc_offset11());
            }
            Opcode::Jsrr => {
                let target = self.read_register(state, instruction.base_r(), at);
                let pc = state.pc;
                self.write_register(state, 7, Some(pc.into()), at);
                self.jump(state, target, at);
            }
            Opcode::Trap => {
                let pc = state.pc;
                self.write_register(state, 7, Some(pc.into()), at);
                let vector = instruction.trap_vector() as u16;
                let target = self.read_memory(state, vector, at, None).unwrap_or(ZERO);
                if state.is_normal() {
                    self.jump(state, target, at);
                }
            }
            Opcode::Ld => {
                let address = state.pc.wrapping_add(instruction.pc_offset9());
                self.load(state, address, at);
            }
            Opcode::St => {
                let address = state.pc.wrapping_add(instruction.pc_offset9());
                let value = state.registers[instruction.sr()].clone();
                self.write_memory(state, address, value, at);
            }
            Opcode::Rti => {
                self.raise(state, IssueKind::InvalidInstruction, at, IssueDetail::None);
            }
            Opcode::Br | Opcode::Ldr | Opcode::Ldi | Opcode::Str | Opcode::Sti => {
                unreachable!("{} forks and is not executed in place", instruction)
            }
        }
    }

    /// Report an uninitialized AND operand unless the other operand is known to be zero. The
    /// register is only zeroed once reported, so a silent clear leaves it uninitialized.
    fn check_and_operand(
        &mut self,
        state: &mut MachineState,
        index: usize,
        value: Option<&SymbolicWord>,
        other: Option<&SymbolicWord>,
        at: &Fetched,
    ) {
        // Both operands may name the same register, which is reported once
        if value.is_some() || other == Some(&ZERO) || at.os || state.registers[index].is_some() {
            return;
        }

        let writer = state.register_writers[index];
        self.raise(
            state,
            IssueKind::UseUninitializedRegister,
            at,
            IssueDetail::Register {
                register: index,
                writer,
            },
        );
        state.registers[index] = Some(ZERO);
    }

    fn jump(&mut self, state: &mut MachineState, target: SymbolicWord, at: &Fetched) {
        match target.maybe_literal() {
            Some(target) => state.pc = target,
            None => self.raise(
                state,
                IssueKind::SymbolicPc,
                at,
                IssueDetail::Expression(target.to_string()),
            ),
        }
    }

    fn load(&mut self, state: &mut MachineState, address: u16, at: &Fetched) {
        let dest = at.instruction.dr();
        let value = self.read_memory(state, address, at, Some(dest));
        if state.is_normal() {
            self.write_register(state, dest, value, at);
            self.set_cc(state, dest, at);
        }
    }

    fn branch_condition(&mut self, state: &mut MachineState, at: &Fetched) -> Predicate {
        let mask = at.instruction.condition();
        if mask == ConditionMask::NONE {
            return Predicate::Literal(false);
        }

        if mask == ConditionMask::NZP {
            return Predicate::Literal(true);
        }

        let cc = self.read_cc(state, at);
        match mask {
            ConditionMask::N => cc.signed_less_than(ZERO),
            ConditionMask::Z => cc.equals(ZERO),
            ConditionMask::P => ZERO.signed_less_than(cc),
            ConditionMask::NP => !cc.equals(ZERO),
            ConditionMask::NZ => cc.signed_less_than_eq(ZERO),
            _ => ZERO.signed_less_than_eq(cc),
        }
    }

    fn execute_br(
        &mut self,
        states: &mut StateAllocator,
        id: StateId,
        at: &Fetched,
    ) -> Result<Vec<StateId>> {
        let state = states.get_mut(id)?;
        let condition = self.branch_condition(state, at);
        if !state.is_normal() {
            return Ok(vec![id]);
        }

        let target = state.pc.wrapping_add(at.instruction.pc_offset9());
        let validity = match condition.maybe_literal() {
            Some(true) => Validity::True,
            Some(false) => Validity::False,
            None => {
                state.query_count += 1;
                self.solver.evaluate(&state.constraints, &condition)?
            }
        };

        match validity {
            Validity::True => {
                state.pc = target;
                Ok(vec![id])
            }
            Validity::False => Ok(vec![id]),
            Validity::Unknown => {
                let fork = states.fork(id)?;
                states.get_mut(fork)?.add_constraint(!condition.clone());

                let state = states.get_mut(id)?;
                state.add_constraint(condition);
                state.pc = target;
                Ok(vec![fork, id])
            }
        }
    }

    fn execute_indirect(
        &mut self,
        states: &mut StateAllocator,
        id: StateId,
        at: &Fetched,
    ) -> Result<Vec<StateId>> {
        let instruction = at.instruction;
        let state = states.get_mut(id)?;
        let address = match instruction.opcode() {
            Opcode::Ldr | Opcode::Str => {
                let base = self.read_register(state, instruction.base_r(), at);
                base + SymbolicWord::Literal(instruction.offset6())
            }
            _ => {
                let pointer = state.pc.wrapping_add(instruction.pc_offset9());
                self.read_memory(state, pointer, at, None).unwrap_or(ZERO)
            }
        };

        if !state.is_normal() {
            return Ok(vec![id]);
        }

        let targets = match address.maybe_literal() {
            Some(address) => vec![(address, id)],
            None => self.fork_on_range(states, id, &address)?,
        };

        let mut successors = Vec::with_capacity(targets.len());
        for (address, target) in targets {
            let state = states.get_mut(target)?;
            match instruction.opcode() {
                Opcode::Ldr | Opcode::Ldi => self.load(state, address, at),
                _ => {
                    let value = state.registers[instruction.sr()].clone();
                    self.write_memory(state, address, value, at);
                }
            }
            successors.push(target);
        }

        Ok(successors)
    }

    /// Fork `id` once per feasible value of `expression`. The last value is realized by `id`
    /// itself. Equality constraints are only added when there is more than one value.
    pub fn fork_on_range(
        &mut self,
        states: &mut StateAllocator,
        id: StateId,
        expression: &SymbolicWord,
    ) -> Result<Vec<(u16, StateId)>> {
        let values = {
            let state = states.get_mut(id)?;
            let MachineState {
                constraints,
                query_count,
                ..
            } = state;
            self.cached_possible_values(expression, constraints, query_count)?
        };

        if values.is_empty() {
            return Err(Error::InternalError(format!(
                "expression {expression} has no feasible value"
            )));
        }

        let forking = values.len() > 1;
        let last = values.len() - 1;
        let mut result = Vec::with_capacity(values.len());
        for (i, (value, constraint)) in values.into_iter().enumerate() {
            let target = if i == last { id } else { states.fork(id)? };
            if forking {
                states.get_mut(target)?.add_constraint(constraint);
            }
            result.push((value, target));
        }

        Ok(result)
    }

    fn cached_possible_values(
        &mut self,
        expression: &SymbolicWord,
        constraints: &ConstraintSet,
        query_count: &mut u64,
    ) -> Result<PossibleValues> {
        let Some(threshold) = self.cache_threshold else {
            return Ok(self
                .possible_values(expression, constraints, query_count, None)?
                .unwrap_or_default());
        };

        if !self.value_cache.contains_key(expression) {
            let mut probe_count = 0;
            let values = self
                .possible_values(
                    expression,
                    &self.initial_constraints,
                    &mut probe_count,
                    Some(threshold),
                )?
                .unwrap_or_else(|| {
                    tracing::debug!(%expression, threshold, "too many possible values to cache");
                    Vec::new()
                });
            self.value_cache.insert(expression.clone(), values);
        }

        let cached = self
            .value_cache
            .get(expression)
            .cloned()
            .unwrap_or_default();

        if cached.is_empty() {
            return Ok(self
                .possible_values(expression, constraints, query_count, None)?
                .unwrap_or_default());
        }

        let mut values = Vec::with_capacity(cached.len());
        for (value, constraint) in cached {
            *query_count += 1;
            if self.solver.may_be_true(constraints, &constraint)? {
                values.push((value, constraint));
            }
        }

        Ok(values)
    }

    /// Enumerate every value `expression` may take under `constraints`, in increasing order,
    /// each with its equality constraint. Returns `None` if there are more than `limit` values.
    pub fn possible_values(
        &self,
        expression: &SymbolicWord,
        constraints: &ConstraintSet,
        query_count: &mut u64,
        limit: Option<usize>,
    ) -> Result<Option<PossibleValues>> {
        let mut query = Query {
            solver: &self.solver,
            constraints,
            expression,
            query_count,
            values: Vec::new(),
            limit,
        };

        query.enumerate().map(|found| found.then_some(query.values))
    }
}

/// Fold `lhs + rhs` when both sides scale the same expression.
pub fn fold_add(lhs: SymbolicWord, rhs: SymbolicWord) -> SymbolicWord {
    if lhs == rhs {
        return match lhs.as_scaled() {
            Some((factor, x)) => SymbolicWord::scaled(factor.wrapping_mul(2), x.clone()),
            None => SymbolicWord::scaled(2, lhs),
        };
    }

    match (lhs.as_scaled(), rhs.as_scaled()) {
        (Some((factor, x)), _) if *x == rhs => {
            return SymbolicWord::scaled(factor.wrapping_add(1), x.clone());
        }
        (_, Some((factor, x))) if *x == lhs => {
            return SymbolicWord::scaled(factor.wrapping_add(1), x.clone());
        }
        (Some((lhs_factor, x)), Some((rhs_factor, y))) if x == y => {
            return SymbolicWord::scaled(lhs_factor.wrapping_add(rhs_factor), x.clone());
        }
        _ => (),
    }

    lhs + rhs
}

/// Range enumeration of a single expression by bisection over its value range.
struct Query<'a, S: Solver> {
    solver: &'a S,
    constraints: &'a ConstraintSet,
    expression: &'a SymbolicWord,
    query_count: &'a mut u64,
    values: PossibleValues,
    limit: Option<usize>,
}

impl<S: Solver> Query<'_, S> {
    fn may_be_true(&mut self, predicate: &Predicate) -> Result<bool> {
        *self.query_count += 1;
        Ok(self.solver.may_be_true(self.constraints, predicate)?)
    }

    fn must_be_true(&mut self, predicate: &Predicate) -> Result<bool> {
        *self.query_count += 1;
        Ok(self.solver.must_be_true(self.constraints, predicate)?)
    }

    fn word(&self) -> SymbolicWord {
        self.expression.clone()
    }

    fn equals(&self, value: u32) -> Predicate {
        self.word().equals(SymbolicWord::Literal(value as u16))
    }

    fn at_most(&self, value: u32) -> Predicate {
        self.word()
            .unsigned_less_than_eq(SymbolicWord::Literal(value as u16))
    }

    fn within(&self, lo: u32, hi: u32) -> Predicate {
        SymbolicWord::Literal(lo as u16).unsigned_less_than_eq(self.word()) & self.at_most(hi)
    }

    /// Record a value. Returns false once the limit is exceeded.
    fn found(&mut self, value: u32) -> bool {
        let predicate = self.equals(value);
        self.values.push((value as u16, predicate));
        self.limit.is_none_or(|limit| self.values.len() <= limit)
    }

    fn enumerate(&mut self) -> Result<bool> {
        // Number of significant bits
        let (mut lo, mut hi) = (0u32, 16u32);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let shifted = self.word() >> mid;
            if self.must_be_true(&shifted.equals(ZERO))? {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        let max_of_bits = (1u32 << lo) - 1;

        let (mut lo, mut hi) = (0u32, max_of_bits);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.may_be_true(&self.at_most(mid))? {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        let min = lo;

        if self.must_be_true(&self.equals(min))? {
            return Ok(self.found(min));
        }

        let (mut lo, mut hi) = (min, max_of_bits);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.must_be_true(&self.at_most(mid))? {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        let max = lo;

        self.range(min, max)
    }

    /// Find every value in `[lo, hi]`, which is known to contain at least one.
    fn range(&mut self, lo: u32, hi: u32) -> Result<bool> {
        if hi - lo <= 3 {
            for value in lo..=hi {
                if self.may_be_true(&self.equals(value))? && !self.found(value) {
                    return Ok(false);
                }
            }
            return Ok(true);
        }

        let mid = lo + (hi - lo) / 2;
        let lower_possible = self.may_be_true(&self.within(lo, mid))?;
        if lower_possible && !self.range(lo, mid)? {
            return Ok(false);
        }

        // The range holds a value, so the upper half must when the lower half does not
        if !lower_possible || self.may_be_true(&self.within(mid + 1, hi))? {
            return self.range(mid + 1, hi);
        }

        Ok(true)
    }
}
