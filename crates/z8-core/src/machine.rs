//! The machine: one Z8 bound to host memory and IO, advanced one
//! instruction boundary at a time.
//!
//! [`Z8::step`] is the whole scheduler. Each call services a pending reset,
//! takes at most one debugger action, then either parks, idles (`HALT`) or
//! retires one instruction followed by interrupt entry, timer update and
//! port write-back. [`Z8::run`] loops over `step` with wall-clock pacing and
//! blocks while parked.

use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::api::{
    IoPort, MemoryPort, RegisterInit, RunOutcome, Snapshot, StackMode, StepOutcome, Z8Config,
};
use crate::cpu::{Bus, Cpu};
use crate::debug::breakpoints::BreakpointSet;
use crate::debug::{DebugHandle, DebugShared, PendingWrites};
use crate::encoding::{opcode_info, InstructionClass};
use crate::execute::{execute_instruction, Retire};
use crate::interrupt::pending_source;
use crate::listeners::{ListenerId, PcListener, PcListeners, Scope};
use crate::state::registers::REGISTER_COUNT;
use crate::timing::HALT_IDLE_CYCLES;
use crate::{DebugAction, ResetKind, RunMode};

/// Program counter after every reset.
pub const RESET_VECTOR: u16 = 0x000C;

const CALL_OPCODES: [u8; 2] = [0xD4, 0xD6];
const PARK_POLL: Duration = Duration::from_millis(50);
const PACING_SLICE_CYCLES: u64 = 10_000;
const PACING_SLACK: Duration = Duration::from_millis(10);
const PACING_MAX_SLEEP: Duration = Duration::from_millis(50);
const PACING_MAX_LAG: Duration = Duration::from_secs(1);
const SPEED_WINDOW: Duration = Duration::from_millis(100);
const SPEED_MIN_CYCLES: u64 = 1_000;

/// Called before a reset is applied, with mutable access to host memory.
pub type ResetListener<M> = Box<dyn FnMut(ResetKind, &mut M) + Send>;

/// Called before each instruction with the PC, the cycle counter and the IO port.
pub type PreExecListener<I> = Box<dyn FnMut(u16, u64, &mut I) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stepping {
    Free,
    Into,
    Over { depth: u16 },
    ToReturn { depth: u16 },
}

/// A Z8 session: processor state, host devices, listeners and the
/// execution side of the debug controller.
pub struct Z8<M: MemoryPort, I: IoPort> {
    cpu: Cpu,
    memory: M,
    io: I,
    config: Z8Config,
    mode: RunMode,
    stepping: Stepping,
    skip_breakpoint: bool,
    breakpoints: BreakpointSet,
    breakpoint_generation: u64,
    last_snapshot_cycles: u64,
    pc_listeners: PcListeners,
    reset_listener: Option<ResetListener<M>>,
    pre_exec_listener: Option<PreExecListener<I>>,
    shared: Arc<DebugShared>,
}

impl<M: MemoryPort, I: IoPort> fmt::Debug for Z8<M, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Z8")
            .field("pc", &self.cpu.pc())
            .field("cycles", &self.cpu.cycles())
            .field("mode", &self.mode)
            .field("stepping", &self.stepping)
            .field("breakpoints", &self.breakpoints.len())
            .field("pc_listeners", &self.pc_listeners)
            .finish_non_exhaustive()
    }
}

impl<M: MemoryPort, I: IoPort> Z8<M, I> {
    /// Builds a machine and applies a power-on reset.
    pub fn new(config: Z8Config, memory: M, io: I) -> Self {
        let shared = Arc::new(DebugShared::new(config.cycles_per_second));
        let mut machine = Self {
            cpu: Cpu::new(config.extended_registers, config.interrupt_frame),
            memory,
            io,
            config,
            mode: RunMode::Running,
            stepping: Stepping::Free,
            skip_breakpoint: false,
            breakpoints: BreakpointSet::new(),
            breakpoint_generation: 0,
            last_snapshot_cycles: 0,
            pc_listeners: PcListeners::new(),
            reset_listener: None,
            pre_exec_listener: None,
            shared,
        };
        machine.reset(true);
        machine
    }

    /// A handle for controlling this machine from other threads.
    #[must_use]
    pub fn debug_handle(&self) -> DebugHandle {
        DebugHandle::new(Arc::clone(&self.shared))
    }

    /// Construction-time configuration.
    #[must_use]
    pub const fn config(&self) -> &Z8Config {
        &self.config
    }

    /// Processor state.
    #[must_use]
    pub const fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    /// Mutable processor state. Edits bypass the debugger buffer and take
    /// effect immediately.
    pub fn cpu_mut(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    /// Host memory.
    #[must_use]
    pub const fn memory(&self) -> &M {
        &self.memory
    }

    /// Mutable host memory.
    pub fn memory_mut(&mut self) -> &mut M {
        &mut self.memory
    }

    /// Host IO.
    #[must_use]
    pub const fn io(&self) -> &I {
        &self.io
    }

    /// Mutable host IO.
    pub fn io_mut(&mut self) -> &mut I {
        &mut self.io
    }

    /// Current run mode.
    #[must_use]
    pub const fn run_mode(&self) -> RunMode {
        self.mode
    }

    /// Program counter.
    #[must_use]
    pub const fn pc(&self) -> u16 {
        self.cpu.pc()
    }

    /// Cycle counter.
    #[must_use]
    pub const fn cycles(&self) -> u64 {
        self.cpu.cycles()
    }

    /// Register value with no side effects; port registers show the last
    /// transferred value.
    #[must_use]
    pub const fn view_register(&self, addr: u8) -> u8 {
        self.cpu.view_register(addr)
    }

    /// Registers a PC listener.
    pub fn add_pc_listener(&mut self, scope: Scope, listener: PcListener) -> ListenerId {
        self.pc_listeners.add(scope, listener)
    }

    /// Removes a PC listener; returns false when `id` is unknown.
    pub fn remove_pc_listener(&mut self, id: ListenerId) -> bool {
        self.pc_listeners.remove(id)
    }

    /// Installs or clears the reset listener.
    pub fn set_reset_listener(&mut self, listener: Option<ResetListener<M>>) {
        self.reset_listener = listener;
    }

    /// Installs or clears the pre-instruction listener.
    pub fn set_pre_exec_listener(&mut self, listener: Option<PreExecListener<I>>) {
        self.pre_exec_listener = listener;
    }

    /// Resets the machine; `power_on` also reinitializes register contents.
    ///
    /// The reset listener runs first. Afterwards the machine is `Running` at
    /// the reset vector with no pending action, edits or stepping.
    pub fn reset(&mut self, power_on: bool) {
        let kind = if power_on {
            ResetKind::PowerOn
        } else {
            ResetKind::Reset
        };
        if let Some(listener) = self.reset_listener.as_mut() {
            listener(kind, &mut self.memory);
        }

        let regs = self.cpu.regs_mut();
        if power_on {
            regs.clear_control();
            match self.config.register_init {
                RegisterInit::Zero => regs.clear_general(),
                RegisterInit::Random { seed } => {
                    regs.randomize_general(&mut StdRng::seed_from_u64(seed));
                }
            }
        }
        regs.reset_control(self.config.stack_mode == StackMode::Internal);
        self.cpu.set_cycles(0);
        self.cpu.reset_ports();
        let mut bus = Bus::new(&mut self.memory, &mut self.io);
        self.cpu.write_reg(3, 0xFF);
        self.cpu.finish_ports(&mut bus);
        self.cpu.set_pc(RESET_VECTOR);

        let shared = Arc::clone(&self.shared);
        {
            let mut pending = shared.lock_pending();
            shared.clear_action();
            *pending = PendingWrites::default();
            shared.store_mode(RunMode::Running);
        }
        self.stepping = Stepping::Free;
        self.skip_breakpoint = false;
        log::debug!("{kind:?} reset");

        let previous = std::mem::replace(&mut self.mode, RunMode::Running);
        self.publish_snapshot();
        if previous != RunMode::Running {
            shared.publish_mode(RunMode::Running, RESET_VECTOR);
        }
        self.pc_listeners.notify(RESET_VECTOR);
    }

    /// Advances the machine by one boundary.
    pub fn step(&mut self) -> StepOutcome {
        if let Some(power_on) = self.shared.take_reset() {
            self.reset(power_on);
        }
        self.refresh_breakpoints();
        let action = self.shared.take_action();

        match self.mode {
            RunMode::DebugStop => match action {
                None | Some(DebugAction::Stop) => {
                    return StepOutcome::Parked(RunMode::DebugStop)
                }
                Some(action) => self.accept(action),
            },
            RunMode::InstStop | RunMode::InstHalt => match action {
                None if self.mode == RunMode::InstStop => {
                    return StepOutcome::Parked(RunMode::InstStop)
                }
                None => return self.idle(),
                Some(action) => {
                    self.cpu.set_pc(self.cpu.pc().wrapping_add(1));
                    if action == DebugAction::Stop {
                        self.debug_stop();
                        return StepOutcome::Parked(RunMode::DebugStop);
                    }
                    self.accept(action);
                }
            },
            RunMode::Running => {
                match action {
                    Some(DebugAction::Stop | DebugAction::StepInto | DebugAction::StepOver) => {
                        self.debug_stop();
                        return StepOutcome::Parked(RunMode::DebugStop);
                    }
                    Some(DebugAction::RunToRet) => {
                        self.stepping = Stepping::ToReturn {
                            depth: self.cpu.regs().sp(),
                        };
                    }
                    Some(DebugAction::Run) => self.stepping = Stepping::Free,
                    None => {}
                }
                if !self.skip_breakpoint && self.breakpoints.is_hit(self.cpu.pc()) {
                    log::debug!("breakpoint hit at {:#06x}", self.cpu.pc());
                    self.debug_stop();
                    return StepOutcome::Parked(RunMode::DebugStop);
                }
            }
        }

        self.execute_one()
    }

    /// Steps until the machine enters a parked mode or `max_steps` steps
    /// made progress.
    ///
    /// The step that parks (a breakpoint, a completed debugger step, `HALT`
    /// or `STOP`) is counted when it retired an instruction.
    pub fn run_until_parked(&mut self, max_steps: u32) -> RunOutcome {
        let mut steps = 0;
        let mut final_step = StepOutcome::Idle { cycles: 0 };
        while steps < max_steps {
            final_step = self.step();
            if matches!(final_step, StepOutcome::Parked(_)) {
                break;
            }
            steps += 1;
            if self.mode.is_parked() {
                break;
            }
        }
        RunOutcome { steps, final_step }
    }

    /// Runs until [`DebugHandle::request_quit`] is called.
    ///
    /// Paced to the configured clock rate; blocks while parked until an
    /// action or reset arrives.
    pub fn run(&mut self) {
        let mut pacer = Pacer::new(self.cpu.cycles());
        while !self.shared.quit_requested() {
            if let StepOutcome::Parked(_) = self.step() {
                pacer.park(self.cpu.cycles(), &self.shared);
                self.shared.wait_for_wake(PARK_POLL);
                pacer.restart(self.cpu.cycles());
            } else {
                pacer.pace(self.cpu.cycles(), &self.shared);
            }
        }
        self.publish_snapshot();
        log::debug!("run loop exits at {:#06x}", self.cpu.pc());
    }

    fn accept(&mut self, action: DebugAction) {
        let shared = Arc::clone(&self.shared);
        let edits = {
            let mut pending = shared.lock_pending();
            shared.store_mode(RunMode::Running);
            std::mem::take(&mut *pending)
        };
        for (addr, value) in edits.registers {
            self.cpu.write_reg(addr, value);
        }
        for (mask, value) in edits.flags {
            self.cpu.regs_mut().write_flag(mask, value);
        }
        if let Some(pc) = edits.pc {
            self.cpu.set_pc(pc);
        }

        let sp = self.cpu.regs().sp();
        self.stepping = match action {
            DebugAction::StepInto => Stepping::Into,
            DebugAction::StepOver => {
                let opcode = self.memory.read_byte(self.cpu.pc(), false);
                if CALL_OPCODES.contains(&opcode) {
                    Stepping::Over { depth: sp }
                } else {
                    Stepping::Into
                }
            }
            DebugAction::RunToRet => Stepping::ToReturn { depth: sp },
            DebugAction::Run | DebugAction::Stop => Stepping::Free,
        };
        self.skip_breakpoint = true;
        log::debug!("accepted {action:?} at {:#06x}", self.cpu.pc());
        self.enter(RunMode::Running);
        if let Some(pc) = edits.pc {
            self.pc_listeners.notify(pc);
        }
    }

    fn execute_one(&mut self) -> StepOutcome {
        let pc = self.cpu.pc();
        if let Some(listener) = self.pre_exec_listener.as_mut() {
            listener(pc, self.cpu.cycles(), &mut self.io);
        }
        let sp_before = self.cpu.regs().sp();

        let mut bus = Bus::new(&mut self.memory, &mut self.io);
        let executed = execute_instruction(&mut self.cpu, &mut bus);
        let pins = self.cpu.latch_port_edges(&mut bus);
        let parks = match executed.retire {
            Retire::Halt => Some(RunMode::InstHalt),
            Retire::Stop => Some(RunMode::InstStop),
            Retire::Base | Retire::Alt => None,
        };
        let mut cycles = executed.cycles;
        self.pc_listeners.notify(self.cpu.pc());
        if parks.is_none() {
            let entry = self.cpu.service_interrupts(&mut bus);
            if entry > 0 {
                cycles += entry;
                self.pc_listeners.notify(self.cpu.pc());
            }
        }
        if executed.retire != Retire::Stop {
            self.cpu.tick_timers(cycles, pins);
        }
        self.cpu.finish_ports(&mut bus);

        self.skip_breakpoint = false;
        if let Some(mode) = parks {
            self.stepping = Stepping::Free;
            self.enter(mode);
        } else if self.step_complete(executed.opcode, sp_before) {
            self.debug_stop();
        }
        self.publish_periodically();

        StepOutcome::Retired {
            opcode: executed.opcode,
            cycles,
        }
    }

    fn idle(&mut self) -> StepOutcome {
        let mut bus = Bus::new(&mut self.memory, &mut self.io);
        let pins = self.cpu.latch_port_edges(&mut bus);
        self.cpu.add_cycles(HALT_IDLE_CYCLES);
        self.cpu.tick_timers(HALT_IDLE_CYCLES, pins);
        let mut cycles = HALT_IDLE_CYCLES;

        let woke = pending_source(self.cpu.regs()).is_some();
        if woke {
            self.cpu.set_pc(self.cpu.pc().wrapping_add(1));
            cycles += self.cpu.service_interrupts(&mut bus);
        }
        self.cpu.finish_ports(&mut bus);

        if woke {
            self.enter(RunMode::Running);
            self.pc_listeners.notify(self.cpu.pc());
        }
        self.publish_periodically();
        StepOutcome::Idle { cycles }
    }

    fn step_complete(&self, opcode: u8, sp_before: u16) -> bool {
        match self.stepping {
            Stepping::Free => false,
            Stepping::Into => true,
            Stepping::Over { depth } => self.cpu.regs().sp() >= depth,
            Stepping::ToReturn { depth } => {
                opcode_info(opcode).class() == InstructionClass::Return && sp_before >= depth
            }
        }
    }

    fn debug_stop(&mut self) {
        self.stepping = Stepping::Free;
        self.enter(RunMode::DebugStop);
    }

    /// Parked modes publish their snapshot before the mode becomes visible,
    /// so a front end that sees the mode also sees the matching state.
    fn enter(&mut self, mode: RunMode) {
        if self.mode == mode {
            return;
        }
        self.mode = mode;
        if mode.is_parked() {
            self.publish_snapshot();
        }
        self.shared.publish_mode(mode, self.cpu.pc());
    }

    fn refresh_breakpoints(&mut self) {
        let generation = self.shared.breakpoint_generation();
        if generation != self.breakpoint_generation {
            self.breakpoints = self.shared.copy_breakpoints();
            self.breakpoint_generation = generation;
        }
    }

    fn publish_periodically(&mut self) {
        let cycles = self.cpu.cycles();
        if cycles.saturating_sub(self.last_snapshot_cycles) >= self.config.snapshot_interval_cycles
        {
            self.publish_snapshot();
        }
    }

    fn publish_snapshot(&mut self) {
        let mut registers = [0; REGISTER_COUNT];
        self.cpu.regs().copy_view(&mut registers);
        self.last_snapshot_cycles = self.cpu.cycles();
        self.shared.publish_snapshot(Snapshot {
            pc: self.cpu.pc(),
            cycles: self.cpu.cycles(),
            run_mode: self.mode,
            registers: Box::new(registers),
        });
    }
}

/// Keeps emulated time within a few milliseconds of wall-clock time and
/// measures the clock rate actually achieved.
struct Pacer {
    origin: Instant,
    origin_cycles: u64,
    last_cycles: u64,
    unlimited: u64,
    cycles_per_second: Option<u32>,
    speed_origin: Instant,
    speed_cycles: u64,
}

impl Pacer {
    fn new(cycles: u64) -> Self {
        let now = Instant::now();
        Self {
            origin: now,
            origin_cycles: cycles,
            last_cycles: cycles,
            unlimited: 0,
            cycles_per_second: None,
            speed_origin: now,
            speed_cycles: 0,
        }
    }

    fn restart(&mut self, cycles: u64) {
        self.origin = Instant::now();
        self.origin_cycles = cycles;
        self.last_cycles = cycles;
    }

    fn restart_speed(&mut self) {
        self.speed_origin = Instant::now();
        self.speed_cycles = 0;
    }

    /// The machine stopped executing; nothing is emulated until it resumes.
    fn park(&mut self, cycles: u64, shared: &DebugShared) {
        self.restart(cycles);
        self.restart_speed();
        shared.store_emulated_hz(0);
    }

    fn pace(&mut self, cycles: u64, shared: &DebugShared) {
        if cycles < self.last_cycles {
            self.restart(cycles);
            self.restart_speed();
            return;
        }
        let delta = cycles - self.last_cycles;
        self.last_cycles = cycles;
        self.unlimited += shared.take_unlimited_cycles();

        let cycles_per_second = shared.cycles_per_second();
        if self.cycles_per_second.replace(cycles_per_second) != Some(cycles_per_second) {
            self.restart(cycles);
            self.restart_speed();
            return;
        }
        self.measure(delta, shared);

        if cycles_per_second == 0 || self.unlimited > 0 {
            self.unlimited = self.unlimited.saturating_sub(delta);
            self.restart(cycles);
            return;
        }

        let emulated = cycles - self.origin_cycles;
        if emulated < PACING_SLICE_CYCLES {
            return;
        }
        let planned = Duration::from_nanos(
            emulated.saturating_mul(1_000_000_000) / u64::from(cycles_per_second),
        );
        let actual = self.origin.elapsed();
        match planned.checked_sub(actual) {
            Some(ahead) if ahead > PACING_SLACK => thread::sleep(ahead.min(PACING_MAX_SLEEP)),
            Some(_) => {}
            None if actual - planned > PACING_MAX_LAG => self.restart(cycles),
            None => {}
        }
    }

    fn measure(&mut self, delta: u64, shared: &DebugShared) {
        self.speed_cycles += delta;
        if self.speed_cycles < SPEED_MIN_CYCLES {
            return;
        }
        let elapsed = self.speed_origin.elapsed();
        if elapsed < SPEED_WINDOW {
            return;
        }
        let hz = u128::from(self.speed_cycles) * 1_000_000_000 / elapsed.as_nanos().max(1);
        shared.store_emulated_hz(u64::try_from(hz).unwrap_or(u64::MAX));
        self.restart_speed();
    }
}
