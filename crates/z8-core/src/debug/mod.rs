//! Debug controller: the state shared between the execution thread and
//! debugger front ends, and the [`DebugHandle`] that front ends hold.
//!
//! The execution thread is the only mutator of machine state. Everything a
//! front end submits is parked here until the next instruction boundary:
//!
//! - one pending [`DebugAction`] in an atomic, taken with `swap`;
//! - buffered register/PC/flag edits, accepted only in `DebugStop` and
//!   applied together when the next action is accepted;
//! - the breakpoint set behind a `RwLock`, with a generation counter so the
//!   execution thread copies it only after a change;
//! - a published [`Snapshot`] for inspection from other threads.

pub mod breakpoints;

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use crate::api::Snapshot;
use crate::error::DebugError;
use crate::state::registers::{P01M, P01M_INTERNAL_STACK};
use crate::{DebugAction, RunMode};

use self::breakpoints::{Breakpoint, BreakpointSet};

/// Receives run-mode changes on the execution thread.
///
/// Called with the shared observer slot locked: an implementation must not
/// call [`DebugHandle::attach_debugger`] from inside the callback.
pub trait DebugObserver: Send {
    /// The machine entered `mode` with the program counter at `pc`.
    fn run_mode_changed(&mut self, mode: RunMode, pc: u16);

    /// The pacing target changed through
    /// [`DebugHandle::set_cycles_per_second`]. Runs on the caller's thread.
    fn cycles_per_second_changed(&mut self, _cycles_per_second: u32) {}
}

const RESET_NONE: u8 = 0;
const RESET_WARM: u8 = 1;
const RESET_POWER_ON: u8 = 2;

/// Edits buffered while the machine is in `DebugStop`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct PendingWrites {
    pub(crate) pc: Option<u16>,
    pub(crate) registers: Vec<(u8, u8)>,
    pub(crate) flags: Vec<(u8, bool)>,
}

impl PendingWrites {
    fn is_empty(&self) -> bool {
        self.pc.is_none() && self.registers.is_empty() && self.flags.is_empty()
    }
}

pub(crate) struct DebugShared {
    action: AtomicU8,
    run_mode: AtomicU8,
    quit: AtomicBool,
    reset: AtomicU8,
    cycles_per_second: AtomicU32,
    unlimited_cycles: AtomicU64,
    emulated_hz: AtomicU64,
    breakpoints: RwLock<BreakpointSet>,
    generation: AtomicU64,
    pending: Mutex<PendingWrites>,
    snapshot: Mutex<Snapshot>,
    observer: Mutex<Option<Box<dyn DebugObserver>>>,
    wake_lock: Mutex<()>,
    wake: Condvar,
}

fn relock<T>(result: Result<T, PoisonError<T>>) -> T {
    result.unwrap_or_else(PoisonError::into_inner)
}

impl DebugShared {
    pub(crate) fn new(cycles_per_second: u32) -> Self {
        Self {
            action: AtomicU8::new(0),
            run_mode: AtomicU8::new(RunMode::Running.as_u8()),
            quit: AtomicBool::new(false),
            reset: AtomicU8::new(RESET_NONE),
            cycles_per_second: AtomicU32::new(cycles_per_second),
            unlimited_cycles: AtomicU64::new(0),
            emulated_hz: AtomicU64::new(0),
            breakpoints: RwLock::new(BreakpointSet::new()),
            generation: AtomicU64::new(0),
            pending: Mutex::new(PendingWrites::default()),
            snapshot: Mutex::new(Snapshot::default()),
            observer: Mutex::new(None),
            wake_lock: Mutex::new(()),
            wake: Condvar::new(),
        }
    }

    fn notify(&self) {
        let _guard = relock(self.wake_lock.lock());
        self.wake.notify_all();
    }

    /// Blocks until something is submitted or `timeout` elapses.
    pub(crate) fn wait_for_wake(&self, timeout: Duration) {
        let guard = relock(self.wake_lock.lock());
        if self.has_work() {
            return;
        }
        drop(relock(self.wake.wait_timeout(guard, timeout)));
    }

    fn has_work(&self) -> bool {
        self.action.load(Ordering::Acquire) != 0
            || self.reset.load(Ordering::Acquire) != RESET_NONE
            || self.quit.load(Ordering::Acquire)
    }

    pub(crate) fn take_action(&self) -> Option<DebugAction> {
        DebugAction::from_u8(self.action.swap(0, Ordering::AcqRel))
    }

    pub(crate) fn clear_action(&self) {
        self.action.store(0, Ordering::Release);
    }

    /// Takes a pending reset request: `Some(true)` for power-on.
    pub(crate) fn take_reset(&self) -> Option<bool> {
        match self.reset.swap(RESET_NONE, Ordering::AcqRel) {
            RESET_POWER_ON => Some(true),
            RESET_WARM => Some(false),
            _ => None,
        }
    }

    pub(crate) fn quit_requested(&self) -> bool {
        self.quit.load(Ordering::Acquire)
    }

    pub(crate) fn cycles_per_second(&self) -> u32 {
        self.cycles_per_second.load(Ordering::Relaxed)
    }

    pub(crate) fn take_unlimited_cycles(&self) -> u64 {
        self.unlimited_cycles.swap(0, Ordering::AcqRel)
    }

    pub(crate) fn store_emulated_hz(&self, hz: u64) {
        self.emulated_hz.store(hz, Ordering::Relaxed);
    }

    pub(crate) fn breakpoint_generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub(crate) fn copy_breakpoints(&self) -> BreakpointSet {
        relock(self.breakpoints.read()).clone()
    }

    pub(crate) fn lock_pending(&self) -> MutexGuard<'_, PendingWrites> {
        relock(self.pending.lock())
    }

    /// Stores the new mode and tells the observer.
    pub(crate) fn publish_mode(&self, mode: RunMode, pc: u16) {
        self.run_mode.store(mode.as_u8(), Ordering::Release);
        log::debug!("run mode {mode:?} at {pc:#06x}");
        if let Some(observer) = relock(self.observer.lock()).as_mut() {
            observer.run_mode_changed(mode, pc);
        }
    }

    /// Same as [`Self::publish_mode`] for callers already holding the pending lock.
    pub(crate) fn store_mode(&self, mode: RunMode) {
        self.run_mode.store(mode.as_u8(), Ordering::Release);
    }

    pub(crate) fn run_mode(&self) -> RunMode {
        RunMode::from_u8(self.run_mode.load(Ordering::Acquire)).unwrap_or_default()
    }

    pub(crate) fn publish_snapshot(&self, snapshot: Snapshot) {
        *relock(self.snapshot.lock()) = snapshot;
    }

    fn mutate_breakpoints<R>(
        &self,
        apply: impl FnOnce(&mut BreakpointSet) -> R,
    ) -> Result<R, DebugError> {
        let mut set = self.breakpoints.write().map_err(|_| DebugError::Poisoned)?;
        let result = apply(&mut set);
        self.generation.fetch_add(1, Ordering::AcqRel);
        Ok(result)
    }
}

/// Cloneable, thread-safe handle for driving a machine from a debugger.
#[derive(Clone)]
pub struct DebugHandle {
    shared: Arc<DebugShared>,
}

impl std::fmt::Debug for DebugHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugHandle")
            .field("run_mode", &self.run_mode())
            .field("quit", &self.quit_was_requested())
            .finish_non_exhaustive()
    }
}

impl DebugHandle {
    pub(crate) const fn new(shared: Arc<DebugShared>) -> Self {
        Self { shared }
    }

    /// Installs or removes the debugger.
    ///
    /// Detaching clears every breakpoint and resumes with
    /// [`DebugAction::Run`].
    ///
    /// # Errors
    ///
    /// Returns [`DebugError::Poisoned`] if the breakpoint lock was poisoned.
    pub fn attach_debugger(
        &self,
        observer: Option<Box<dyn DebugObserver>>,
    ) -> Result<(), DebugError> {
        let detach = observer.is_none();
        *relock(self.shared.observer.lock()) = observer;
        if detach {
            log::debug!("debugger detached");
            self.shared.mutate_breakpoints(BreakpointSet::clear)?;
            self.submit_action(DebugAction::Run);
        } else {
            log::debug!("debugger attached");
        }
        Ok(())
    }

    /// Submits an action; it replaces any action not yet taken.
    pub fn submit_action(&self, action: DebugAction) {
        self.shared.action.store(action.as_u8(), Ordering::Release);
        self.shared.notify();
    }

    /// Replaces the breakpoint set.
    ///
    /// # Errors
    ///
    /// Returns [`DebugError::Poisoned`] if the breakpoint lock was poisoned.
    pub fn set_breakpoints(
        &self,
        breakpoints: impl IntoIterator<Item = Breakpoint>,
    ) -> Result<(), DebugError> {
        let replacement: BreakpointSet = breakpoints.into_iter().collect();
        self.shared.mutate_breakpoints(|set| *set = replacement)
    }

    /// Adds an enabled breakpoint; adding an existing address is a no-op
    /// apart from re-enabling it.
    ///
    /// # Errors
    ///
    /// Returns [`DebugError::Poisoned`] if the breakpoint lock was poisoned.
    pub fn add_breakpoint(&self, address: u16) -> Result<(), DebugError> {
        self.shared
            .mutate_breakpoints(|set| set.insert(Breakpoint::at(address)))
    }

    /// Removes a breakpoint; returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns [`DebugError::Poisoned`] if the breakpoint lock was poisoned.
    pub fn remove_breakpoint(&self, address: u16) -> Result<bool, DebugError> {
        self.shared.mutate_breakpoints(|set| set.remove(address))
    }

    /// Enables or disables a breakpoint; returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns [`DebugError::Poisoned`] if the breakpoint lock was poisoned.
    pub fn set_breakpoint_enabled(&self, address: u16, enabled: bool) -> Result<bool, DebugError> {
        self.shared
            .mutate_breakpoints(|set| set.set_enabled(address, enabled))
    }

    /// Current breakpoints in ascending address order.
    #[must_use]
    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        relock(self.shared.breakpoints.read()).iter().collect()
    }

    fn buffer_edit(&self, edit: impl FnOnce(&mut PendingWrites)) -> Result<(), DebugError> {
        let mut pending = self
            .shared
            .pending
            .lock()
            .map_err(|_| DebugError::Poisoned)?;
        let mode = self.shared.run_mode();
        if mode != RunMode::DebugStop {
            log::warn!("debug edit rejected while {mode:?}");
            return Err(DebugError::NotStopped { mode });
        }
        edit(&mut pending);
        Ok(())
    }

    /// Buffers a program counter change.
    ///
    /// # Errors
    ///
    /// [`DebugError::NotStopped`] unless the machine is in `DebugStop`.
    pub fn request_pc(&self, pc: u16) -> Result<(), DebugError> {
        self.buffer_edit(|pending| pending.pc = Some(pc))
    }

    /// Buffers a register write.
    ///
    /// # Errors
    ///
    /// [`DebugError::NotStopped`] unless the machine is in `DebugStop`.
    pub fn request_register(&self, addr: u8, value: u8) -> Result<(), DebugError> {
        self.buffer_edit(|pending| pending.registers.push((addr, value)))
    }

    /// Buffers a change to the `FLAGS` bits in `mask`.
    ///
    /// # Errors
    ///
    /// [`DebugError::NotStopped`] unless the machine is in `DebugStop`.
    pub fn request_flag(&self, mask: u8, value: bool) -> Result<(), DebugError> {
        self.buffer_edit(|pending| pending.flags.push((mask, value)))
    }

    /// Returns true when edits are buffered and not yet applied.
    #[must_use]
    pub fn has_pending_edits(&self) -> bool {
        !relock(self.shared.pending.lock()).is_empty()
    }

    /// Register value from the last published snapshot.
    #[must_use]
    pub fn view_register(&self, addr: u8) -> u8 {
        relock(self.shared.snapshot.lock()).register(addr)
    }

    /// Current run mode.
    #[must_use]
    pub fn run_mode(&self) -> RunMode {
        self.shared.run_mode()
    }

    /// Whether the last published `P01M` selects the register-file stack.
    #[must_use]
    pub fn is_internal_stack(&self) -> bool {
        self.view_register(P01M) & P01M_INTERNAL_STACK != 0
    }

    /// Last published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        relock(self.shared.snapshot.lock()).clone()
    }

    /// Asks `run` to return at the next boundary.
    pub fn request_quit(&self) {
        self.shared.quit.store(true, Ordering::Release);
        self.shared.notify();
    }

    /// Returns true once [`Self::request_quit`] was called.
    #[must_use]
    pub fn quit_was_requested(&self) -> bool {
        self.shared.quit_requested()
    }

    /// Requests a reset at the next boundary; `init_ram` selects power-on.
    pub fn fire_reset(&self, init_ram: bool) {
        let kind = if init_ram { RESET_POWER_ON } else { RESET_WARM };
        self.shared.reset.store(kind, Ordering::Release);
        self.shared.notify();
    }

    /// Changes the pacing target; zero runs unthrottled.
    ///
    /// An attached observer is told when the value actually changes.
    pub fn set_cycles_per_second(&self, cycles_per_second: u32) {
        let previous = self
            .shared
            .cycles_per_second
            .swap(cycles_per_second, Ordering::Relaxed);
        if previous == cycles_per_second {
            return;
        }
        log::debug!("clock target {cycles_per_second} Hz");
        if let Some(observer) = relock(self.shared.observer.lock()).as_mut() {
            observer.cycles_per_second_changed(cycles_per_second);
        }
    }

    /// Clock rate `run` achieved over its last measurement window.
    ///
    /// Zero before the first window completes and while the machine is
    /// parked.
    #[must_use]
    pub fn emulated_hz(&self) -> u64 {
        self.shared.emulated_hz.load(Ordering::Relaxed)
    }

    /// Runs unthrottled for the next `cycles` clock cycles.
    pub fn set_speed_unlimited_for(&self, cycles: u64) {
        self.shared.unlimited_cycles.fetch_add(cycles, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::{DebugHandle, DebugObserver, DebugShared};
    use crate::error::DebugError;
    use crate::{DebugAction, RunMode};

    fn handle() -> (Arc<DebugShared>, DebugHandle) {
        let shared = Arc::new(DebugShared::new(0));
        (Arc::clone(&shared), DebugHandle::new(shared))
    }

    struct Recorder(Arc<Mutex<Vec<RunMode>>>);

    impl DebugObserver for Recorder {
        fn run_mode_changed(&mut self, mode: RunMode, _pc: u16) {
            self.0.lock().unwrap().push(mode);
        }
    }

    #[test]
    fn actions_are_taken_exactly_once() {
        let (shared, handle) = handle();
        handle.submit_action(DebugAction::StepInto);
        handle.submit_action(DebugAction::Run);
        assert_eq!(shared.take_action(), Some(DebugAction::Run));
        assert_eq!(shared.take_action(), None);
    }

    #[test]
    fn edits_require_debug_stop() {
        let (shared, handle) = handle();
        assert_eq!(
            handle.request_pc(0x1234),
            Err(DebugError::NotStopped {
                mode: RunMode::Running
            })
        );
        assert!(!handle.has_pending_edits());

        shared.store_mode(RunMode::DebugStop);
        handle.request_pc(0x1234).unwrap();
        handle.request_register(0x20, 0x55).unwrap();
        handle.request_flag(0x80, true).unwrap();
        let pending = shared.lock_pending();
        assert_eq!(pending.pc, Some(0x1234));
        assert_eq!(pending.registers, vec![(0x20, 0x55)]);
        assert_eq!(pending.flags, vec![(0x80, true)]);
    }

    #[test]
    fn breakpoint_changes_bump_generation() {
        let (shared, handle) = handle();
        let before = shared.breakpoint_generation();
        handle.add_breakpoint(0x0100).unwrap();
        assert!(shared.breakpoint_generation() > before);
        assert!(shared.copy_breakpoints().is_hit(0x0100));
        assert_eq!(handle.remove_breakpoint(0x0100), Ok(true));
        assert_eq!(handle.remove_breakpoint(0x0100), Ok(false));
    }

    #[test]
    fn detach_clears_breakpoints_and_resumes() {
        let (shared, handle) = handle();
        let modes = Arc::new(Mutex::new(Vec::new()));
        handle
            .attach_debugger(Some(Box::new(Recorder(Arc::clone(&modes)))))
            .unwrap();
        shared.publish_mode(RunMode::DebugStop, 0);
        assert_eq!(*modes.lock().unwrap(), vec![RunMode::DebugStop]);

        handle.add_breakpoint(0x0010).unwrap();
        handle.attach_debugger(None).unwrap();
        assert!(handle.breakpoints().is_empty());
        assert_eq!(shared.take_action(), Some(DebugAction::Run));
    }

    struct ClockWatcher(Arc<Mutex<Vec<u32>>>);

    impl DebugObserver for ClockWatcher {
        fn run_mode_changed(&mut self, _mode: RunMode, _pc: u16) {}

        fn cycles_per_second_changed(&mut self, cycles_per_second: u32) {
            self.0.lock().unwrap().push(cycles_per_second);
        }
    }

    #[test]
    fn clock_target_changes_reach_the_observer_once() {
        let (shared, handle) = handle();
        let targets = Arc::new(Mutex::new(Vec::new()));
        handle
            .attach_debugger(Some(Box::new(ClockWatcher(Arc::clone(&targets)))))
            .unwrap();

        handle.set_cycles_per_second(8_000_000);
        handle.set_cycles_per_second(8_000_000);
        handle.set_cycles_per_second(0);
        assert_eq!(*targets.lock().unwrap(), vec![8_000_000, 0]);
        assert_eq!(shared.cycles_per_second(), 0);
        assert_eq!(handle.emulated_hz(), 0);
    }

    #[test]
    fn reset_requests_carry_their_kind() {
        let (shared, handle) = handle();
        handle.fire_reset(true);
        assert_eq!(shared.take_reset(), Some(true));
        assert_eq!(shared.take_reset(), None);
        handle.fire_reset(false);
        assert_eq!(shared.take_reset(), Some(false));
    }
}
