//! Simulation context.
//!
//! `Simulation` owns every stage of every pipe and is the boundary the driver
//! talks to. It provides:
//! 1. **Bus entry points:** register, indirect memory, TCAM writereg/copy and
//!    instruction calls routed to the addressed stage.
//! 2. **Fault latch:** a fatal `ModelError` is logged, recorded, handed to the
//!    fatal hook and latched; every later call returns `BfStatus::NotReady`.
//! 3. **Time:** `time_increment` advances model time and runs due sweep tasks.
//! 4. **Atomic batches:** instructions issued between `atomic_begin` and
//!    `atomic_commit` are queued and applied together.
//!
//! Each stage sits behind its own `Mutex`, so all mutation of a stage happens
//! while its guard is held.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::common::{Address, AddressKind, BfStatus, ModelError, make_instr_address};
use crate::config::{ChipDescriptor, Config, ConfigError, ModelFlags, SweepConfig};
use crate::mau::addr_dist::Eviction;
use crate::mau::instr::Instr;
use crate::mau::sram_column::ColumnHit;
use crate::mau::{InstrEffect, Mau, Notification};
use crate::sim::event_log::{Event, EventLog};
use crate::sim::scheduler::{Scheduler, Task};
use crate::stats::ModelStats;

/// Callback run once when the simulation latches a fatal error.
pub type FatalHook = Box<dyn Fn(&ModelError) + Send + Sync>;

/// Failure of one call before it reaches the boundary.
#[derive(Debug)]
enum CallError {
    Status(BfStatus),
    Model(ModelError),
}

impl From<BfStatus> for CallError {
    fn from(status: BfStatus) -> Self {
        Self::Status(status)
    }
}

impl From<ModelError> for CallError {
    fn from(err: ModelError) -> Self {
        Self::Model(err)
    }
}

type CallResult<T> = Result<T, CallError>;

#[derive(Clone, Copy, Debug)]
struct QueuedInstr {
    pipe: u8,
    stage: u8,
    instr: u32,
    data0: u64,
    data1: u64,
}

/// The whole modelled chip.
pub struct Simulation {
    chip: Arc<ChipDescriptor>,
    flags: ModelFlags,
    sweep: SweepConfig,
    pipes: Vec<Vec<Mutex<Mau>>>,
    time: AtomicU64,
    scheduler: Mutex<Scheduler>,
    atomic_queue: Mutex<Vec<QueuedInstr>>,
    log: Mutex<EventLog>,
    faulted: AtomicBool,
    shut_down: AtomicBool,
    fatal_hook: Option<FatalHook>,
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("chip", &self.chip.family)
            .field("pipes", &self.pipes.len())
            .field("time", &self.time.load(Ordering::Relaxed))
            .field("faulted", &self.faulted.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Simulation {
    /// Builds every stage of the configured chip.
    ///
    /// Fails when the chip overrides cannot be represented.
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let chip = Arc::new(config.chip_descriptor()?);
        let pipes = (0..chip.pipes)
            .map(|pipe| {
                (0..chip.stages)
                    .map(|stage| Mutex::new(Mau::new(pipe as u8, stage as u8, Arc::clone(&chip), config.flags)))
                    .collect()
            })
            .collect();
        tracing::info!(
            family = ?chip.family,
            pipes = chip.pipes,
            stages = chip.stages,
            "simulation created"
        );
        let sim = Self {
            chip,
            flags: config.flags,
            sweep: config.sweep,
            pipes,
            time: AtomicU64::new(0),
            scheduler: Mutex::new(Scheduler::new()),
            atomic_queue: Mutex::new(Vec::new()),
            log: Mutex::new(EventLog::new(config.log.event_log)),
            faulted: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
            fatal_hook: None,
        };
        sim.seed_sweeps();
        Ok(sim)
    }

    fn seed_sweeps(&self) {
        let mut sched = lock(&self.scheduler);
        let now = self.time();
        if let Some(period) = self.sweep.meter_interval {
            sched.schedule_periodic(now.saturating_add(period), period, Task::MeterSweep);
        }
        if let Some(period) = self.sweep.idle_interval {
            sched.schedule_periodic(now.saturating_add(period), period, Task::IdleSweep);
        }
    }

    /// Installs the callback run when a fatal error latches.
    pub fn set_fatal_hook(&mut self, hook: FatalHook) {
        self.fatal_hook = Some(hook);
    }

    /// Chip descriptor.
    pub fn chip(&self) -> &ChipDescriptor {
        &self.chip
    }

    /// Policy flags.
    pub const fn flags(&self) -> &ModelFlags {
        &self.flags
    }

    /// Current model time in cycles.
    pub fn time(&self) -> u64 {
        self.time.load(Ordering::Acquire)
    }

    /// Returns `true` once a fatal error has latched.
    pub fn is_faulted(&self) -> bool {
        self.faulted.load(Ordering::Acquire)
    }

    /// Locks one stage.
    ///
    /// # Returns
    ///
    /// `None` when the pipe or stage does not exist.
    pub fn lock_resources(&self, pipe: u8, stage: u8) -> Option<MutexGuard<'_, Mau>> {
        let m = self.pipes.get(usize::from(pipe))?.get(usize::from(stage))?;
        Some(lock(m))
    }

    /// Event log guard.
    pub fn event_log(&self) -> MutexGuard<'_, EventLog> {
        lock(&self.log)
    }

    fn stage(&self, pipe: u8, stage: u8) -> CallResult<MutexGuard<'_, Mau>> {
        self.lock_resources(pipe, stage).ok_or_else(|| {
            tracing::error!(pipe, stage, "no such stage");
            CallError::Status(BfStatus::InvalidArg)
        })
    }

    fn call<T>(&self, op: &'static str, f: impl FnOnce() -> CallResult<T>) -> Result<T, BfStatus> {
        if self.shut_down.load(Ordering::Acquire) || self.is_faulted() {
            return Err(BfStatus::NotReady);
        }
        match f() {
            Ok(v) => Ok(v),
            Err(CallError::Status(status)) => Err(status),
            Err(CallError::Model(err)) => Err(self.latch(op, &err)),
        }
    }

    fn latch(&self, op: &'static str, err: &ModelError) -> BfStatus {
        let status = BfStatus::Unexpected;
        tracing::error!(op, %err, "fatal model error; simulation halted");
        self.faulted.store(true, Ordering::Release);
        self.event_log()
            .record(&Event::fatal(op, err.to_string(), status));
        if let Some(hook) = &self.fatal_hook {
            hook(err);
        }
        status
    }

    /// Reads a configuration register.
    pub fn model_reg_read(&self, addr: Address) -> Result<u64, BfStatus> {
        self.call("model_reg_read", || {
            let (pipe, stage) = Self::route(addr, true)?;
            Ok(self.stage(pipe, stage)?.read(addr, self.time()).0)
        })
    }

    /// Writes a configuration register.
    pub fn model_reg_write(&self, addr: Address, value: u64) -> Result<(), BfStatus> {
        self.call("model_reg_write", || {
            let (pipe, stage) = Self::route(addr, true)?;
            let ok = self.stage(pipe, stage)?.write(addr, value, 0, self.time())?;
            ok.then_some(()).ok_or(CallError::Status(BfStatus::InvalidArg))
        })
    }

    /// Reads a memory word through the indirect bus.
    pub fn model_ind_read(&self, addr: Address) -> Result<(u64, u64), BfStatus> {
        self.call("model_ind_read", || {
            let (pipe, stage) = Self::route(addr, false)?;
            Ok(self.stage(pipe, stage)?.read(addr, self.time()))
        })
    }

    /// Writes a memory word (or issues an instruction) through the indirect bus.
    pub fn model_ind_write(&self, addr: Address, data0: u64, data1: u64) -> Result<(), BfStatus> {
        if let Ok(decoded) = addr.decode()
            && let AddressKind::Instruction { instr } = decoded.kind
        {
            return self
                .instr_handle(decoded.pipe, decoded.stage, instr, data0, data1)
                .and_then(Self::effect_status);
        }
        self.call("model_ind_write", || {
            let (pipe, stage) = Self::route(addr, false)?;
            let ok = self.stage(pipe, stage)?.write(addr, data0, data1, self.time())?;
            ok.then_some(()).ok_or(CallError::Status(BfStatus::InvalidArg))
        })
    }

    /// Stages a TCAM write for the next `flush_all_tcam_writeregs`.
    pub fn model_set_tcam_writereg(
        &self,
        pipe: u8,
        stage: u8,
        row: u8,
        col: u8,
        index: u32,
        word0: u64,
        word1: u64,
    ) -> Result<(), BfStatus> {
        let instr = Instr::SetTcamWritereg { row, col, index }.encode();
        self.instr_handle(pipe, stage, instr, word0, word1)
            .and_then(Self::effect_status)
    }

    /// Copies `n` TCAM entries from `src` to `dst`.
    pub fn model_tcam_copy_word(
        &self,
        pipe: u8,
        stage: u8,
        row: u8,
        col: u8,
        src: u32,
        dst: u32,
        n: u32,
        top_to_bottom: bool,
    ) -> Result<(), BfStatus> {
        let instr = Instr::TcamCopyWord {
            row,
            col,
            n,
            top_to_bottom,
        }
        .encode();
        let data0 = u64::from(src & 0xffff) | (u64::from(dst & 0xffff) << 16);
        self.instr_handle(pipe, stage, instr, data0, 0)
            .and_then(Self::effect_status)
    }

    fn effect_status(effect: InstrEffect) -> Result<(), BfStatus> {
        match effect {
            InstrEffect::Refused => Err(BfStatus::InvalidArg),
            _ => Ok(()),
        }
    }

    fn route(addr: Address, register: bool) -> CallResult<(u8, u8)> {
        if register
            && let Ok(decoded) = addr.decode()
            && !matches!(decoded.kind, AddressKind::Register { .. })
        {
            tracing::error!(addr = addr.val(), "not a register address");
            return Err(CallError::Status(BfStatus::InvalidArg));
        }
        Ok((addr.pipe(), addr.stage()))
    }

    /// Runs one instruction on one stage.
    ///
    /// A meter-time regression flushes the color queues of every stage in the pipe.
    pub fn instr_handle(
        &self,
        pipe: u8,
        stage: u8,
        instr: u32,
        data0: u64,
        data1: u64,
    ) -> Result<InstrEffect, BfStatus> {
        self.call("instr_handle", || self.dispatch(pipe, stage, instr, data0, data1))
    }

    fn dispatch(&self, pipe: u8, stage: u8, instr: u32, data0: u64, data1: u64) -> CallResult<InstrEffect> {
        let now = self.time();
        let effect = {
            let mut mau = self.stage(pipe, stage)?;
            if mau.atomic_in_progress() {
                lock(&self.atomic_queue).push(QueuedInstr {
                    pipe,
                    stage,
                    instr,
                    data0,
                    data1,
                });
                return Ok(InstrEffect::Done);
            }
            mau.instr_handle(instr, data0, data1, now)?
        };
        self.event_log().record(&Event::Instr {
            time: now,
            pipe,
            stage,
            instr,
        });
        if effect == InstrEffect::FlushPipeColors {
            self.flush_pipe_colors(pipe);
        }
        Ok(effect)
    }

    fn flush_pipe_colors(&self, pipe: u8) {
        let Some(stages) = self.pipes.get(usize::from(pipe)) else {
            return;
        };
        let flushed: usize = stages.iter().map(|m| lock(m).flush_color_queue()).sum();
        tracing::debug!(pipe, flushed, "pipe color queues flushed");
    }

    /// Opens an atomic batch on a stage; its instructions queue until commit.
    pub fn atomic_begin(&self, pipe: u8, stage: u8) -> Result<(), BfStatus> {
        self.call("atomic_begin", || {
            self.stage(pipe, stage)?.set_atomic_in_progress(true);
            Ok(())
        })
    }

    /// Queues an instruction on a stage with an open batch, or runs it directly.
    pub fn atomic_instr(&self, pipe: u8, stage: u8, instr: u32, data0: u64, data1: u64) -> Result<(), BfStatus> {
        self.instr_handle(pipe, stage, instr, data0, data1).map(|_| ())
    }

    /// Closes the batch on a stage and applies its queued instructions in order.
    ///
    /// # Returns
    ///
    /// The number of instructions applied.
    pub fn atomic_commit(&self, pipe: u8, stage: u8) -> Result<usize, BfStatus> {
        self.call("atomic_commit", || {
            self.stage(pipe, stage)?.set_atomic_in_progress(false);
            let batch: Vec<QueuedInstr> = {
                let mut queue = lock(&self.atomic_queue);
                let (mine, rest): (Vec<_>, Vec<_>) =
                    queue.drain(..).partition(|q| q.pipe == pipe && q.stage == stage);
                *queue = rest;
                mine
            };
            let mut applied = 0;
            for q in batch {
                let _ = self.dispatch(q.pipe, q.stage, q.instr, q.data0, q.data1)?;
                applied += 1;
            }
            Ok(applied)
        })
    }

    /// Runs an exact-match lookup on one stage.
    ///
    /// # Returns
    ///
    /// The hit and its immediate data, or `None` on a miss.
    pub fn exact_match_lookup(
        &self,
        pipe: u8,
        stage: u8,
        lt: u8,
        index: u32,
        key: u128,
    ) -> Result<Option<(ColumnHit, Option<u64>)>, BfStatus> {
        self.call("exact_match_lookup", || {
            let mut mau = self.stage(pipe, stage)?;
            let hit = mau.sram_lookup(lt, index, key)?;
            Ok(hit.map(|h| (h, mau.hit_imm_data(&h))))
        })
    }

    /// Applies the staged TCAM writes of every stage.
    pub fn flush_all_tcam_writeregs(&self) -> Result<usize, BfStatus> {
        self.call("flush_all_tcam_writeregs", || {
            Ok(self.stages().map(|m| lock(m).flush_all_tcam_writeregs()).sum())
        })
    }

    fn stages(&self) -> impl Iterator<Item = &Mutex<Mau>> {
        self.pipes.iter().flatten()
    }

    /// Advances model time, saturating at `u64::MAX`, and runs every task that falls due.
    pub fn time_increment(&self, cycles: u64) -> Result<(), BfStatus> {
        self.call("time_increment", || {
            let prev = self
                .time
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |t| Some(t.saturating_add(cycles)))
                .unwrap_or_else(|t| t);
            let now = prev.saturating_add(cycles);
            loop {
                let Some((due, task)) = lock(&self.scheduler).pop_due(now) else {
                    break;
                };
                self.run_task(due, task)?;
            }
            Ok(())
        })
    }

    fn run_task(&self, due: u64, task: Task) -> CallResult<()> {
        tracing::debug!(due, ?task, "running task");
        let name = match task {
            Task::MeterSweep => {
                for m in self.stages() {
                    lock(m).meter_sweep(due)?;
                }
                "meter_sweep"
            }
            Task::IdleSweep => {
                for m in self.stages() {
                    lock(m).idle_sweep(None);
                }
                "idle_sweep"
            }
        };
        self.event_log().record(&Event::Task { time: due, task: name });
        Ok(())
    }

    /// Queues a one-shot task.
    pub fn schedule(&self, time: u64, task: Task) {
        lock(&self.scheduler).schedule(time, task);
    }

    /// Collects the notifications of every stage as `(pipe, stage, record)`.
    pub fn drain_notifications(&self) -> Vec<(u8, u8, Notification)> {
        let mut out = Vec::new();
        for m in self.stages() {
            let mut mau = lock(m);
            let (pipe, stage) = (mau.pipe(), mau.stage());
            for record in mau.take_notifications() {
                self.event_log().record(&Event::Notification { pipe, stage, record });
                out.push((pipe, stage, record));
            }
        }
        out
    }

    /// Collects the queued idle evictions of every stage.
    pub fn take_evictions(&self) -> Vec<(u8, u8, Eviction)> {
        let mut out = Vec::new();
        for m in self.stages() {
            let mut mau = lock(m);
            let (pipe, stage) = (mau.pipe(), mau.stage());
            out.extend(mau.take_evictions().into_iter().map(|e| (pipe, stage, e)));
        }
        out
    }

    /// Activity counters summed over every stage.
    pub fn stats(&self) -> ModelStats {
        let mut total = ModelStats::default();
        for m in self.stages() {
            total += *lock(m).stats();
        }
        total
    }

    /// Returns every stage to reset state and clears the fault latch.
    pub fn reset(&self) {
        for m in self.stages() {
            lock(m).reset();
        }
        self.time.store(0, Ordering::Release);
        lock(&self.scheduler).clear();
        lock(&self.atomic_queue).clear();
        self.event_log().clear();
        self.faulted.store(false, Ordering::Release);
        self.shut_down.store(false, Ordering::Release);
        self.seed_sweeps();
        tracing::info!("simulation reset");
    }

    /// Stops serving calls; every later call returns `BfStatus::NotReady`.
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
        lock(&self.scheduler).clear();
        tracing::info!("simulation shut down");
    }

    /// Encodes an instruction address for `instr` on a stage.
    pub const fn instr_address(pipe: u8, stage: u8, instr: Instr) -> Address {
        make_instr_address(pipe, stage, instr.encode())
    }
}
