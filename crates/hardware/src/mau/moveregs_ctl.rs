//! Table-move controller.
//!
//! Drives the per-table move pipelines. Every push and pop runs the same
//! sequence:
//! 1. **Check:** refuse while the table's end-of-packet bus is busy, validate the
//!    address against the configured widths and the table's MISS address.
//! 2. **Settle:** finish the copy the previous push or pop left pending.
//! 3. **Shift:** load the pipeline.
//! 4. **Inhibit:** stop the newly loaded `S` from hitting while its entry is
//!    being written, and let the previous one, now `D`, hit again.
//! 5. **Vacate:** when `D` emptied out, zero-initialize `oldD`.
//! 6. **Update:** tell address distribution which addresses moved.
//!
//! A copy from `D` to `oldD` stays pending after the shift. It is carried out by
//! the first lookup hitting `S` or `D` (`maybe_commit`) or by the next push or
//! pop, whichever comes first. Commits and updates remember the last pair they
//! handled, so the second of those finds nothing left to do.

use crate::common::constants::LOGICAL_TABLES;
use crate::common::{ModelResult, config_check, mask64};
use crate::mau::moveregs::{MauMoveregs, MoveResource, MoveregsConfig};

/// Services the move controller needs from its stage.
pub trait MoveregsHost {
    /// Returns `true` while the table has end-of-packet work in flight.
    fn teop_busy(&self, lt: u8) -> bool;
    /// Returns `true` when `addr` is the table's MISS address.
    fn is_miss_address(&self, lt: u8, addr: u32) -> bool;
    /// Address transforms of the table.
    fn moveregs_config(&self, lt: u8) -> MoveregsConfig;
    /// Suppresses or re-enables hits on a match address.
    fn set_inhibit(&mut self, lt: u8, addr: u32, inhibit: bool);
    /// Copies one resource word between virtual addresses.
    fn copy_resource(&mut self, lt: u8, res: MoveResource, from: u32, to: u32);
    /// Zeroes one resource word.
    fn zero_resource(&mut self, lt: u8, res: MoveResource, addr: u32);
    /// Reports the current `(D, oldD)` pair to address distribution.
    fn update_addresses(&mut self, lt: u8, d_addr: Option<u32>, old_d_addr: Option<u32>);
}

/// Move controller for every table of a stage.
#[derive(Debug, Clone)]
pub struct MauMoveregsCtl {
    regs: [MauMoveregs; LOGICAL_TABLES],
    relax_check: bool,
}

impl MauMoveregsCtl {
    /// Creates idle pipelines.
    ///
    /// # Arguments
    ///
    /// * `relax_check` - A MISS-address collision only warns.
    pub fn new(relax_check: bool) -> Self {
        Self {
            regs: [MauMoveregs::default(); LOGICAL_TABLES],
            relax_check,
        }
    }

    /// Pipeline state of `lt`.
    pub fn regs(&self, lt: u8) -> Option<&MauMoveregs> {
        self.regs.get(usize::from(lt))
    }

    fn reg_index(lt: u8) -> ModelResult<usize> {
        let idx = usize::from(lt);
        crate::model_assert!(idx < LOGICAL_TABLES, "mau::moveregs", "logical table {lt} out of range");
        Ok(idx)
    }

    fn move_ok(lt: u8, host: &dyn MoveregsHost) -> bool {
        if host.teop_busy(lt) {
            tracing::warn!(lt, "table move refused: end-of-packet bus busy");
            return false;
        }
        true
    }

    fn check_addr(&self, lt: u8, addr: u32, cfg: &MoveregsConfig, host: &dyn MoveregsHost) -> ModelResult<()> {
        let width = cfg.effective_addr_width();
        if width < 32 && addr >> width != 0 {
            tracing::warn!(lt, addr, width, "move address wider than the table address");
        }
        for (res, xf) in cfg.resources() {
            if xf.overflows(addr) {
                tracing::warn!(lt, addr, ?res, width = xf.width, "move address exceeds resource width");
            }
        }
        if host.is_miss_address(lt, addr) {
            config_check(
                self.relax_check,
                "mau::moveregs",
                format!("lt {lt} move address {addr:#x} is the MISS address"),
            )?;
        }
        Ok(())
    }

    /// Pushes the next address of a move chain.
    ///
    /// # Returns
    ///
    /// `Ok(false)` when the move was refused because the table is busy.
    pub fn push_table_move_addr(&mut self, lt: u8, addr: u32, host: &mut dyn MoveregsHost) -> ModelResult<bool> {
        let idx = Self::reg_index(lt)?;
        if !Self::move_ok(lt, host) {
            return Ok(false);
        }
        let cfg = host.moveregs_config(lt);
        self.check_addr(lt, addr, &cfg, host)?;
        let addr = (u64::from(addr) & mask64(cfg.effective_addr_width())) as u32;

        self.commit(lt, host, false, false);
        let reg = &mut self.regs[idx];
        reg.load(Some(addr));
        reg.pushes += 1;
        tracing::debug!(lt, addr, d = ?reg.d_addr, old_d = ?reg.old_d_addr, "table move push");

        self.inhibit(lt, host);
        self.vacate(lt, host, false, false);
        self.update_addresses(lt, host);
        Ok(true)
    }

    /// Ends a move chain by shifting in an empty source.
    ///
    /// # Arguments
    ///
    /// * `stats_init` - Zero the stats of the slot the chain vacates.
    /// * `idle_init` - Zero the idletime of the slot the chain vacates.
    pub fn pop_table_move_addr(
        &mut self,
        lt: u8,
        stats_init: bool,
        idle_init: bool,
        host: &mut dyn MoveregsHost,
    ) -> ModelResult<bool> {
        let idx = Self::reg_index(lt)?;
        if !Self::move_ok(lt, host) {
            return Ok(false);
        }
        self.commit(lt, host, false, false);
        let reg = &mut self.regs[idx];
        reg.load(None);
        reg.pops += 1;
        tracing::debug!(lt, d = ?reg.d_addr, old_d = ?reg.old_d_addr, "table move pop");

        self.inhibit(lt, host);
        self.vacate(lt, host, stats_init, idle_init);
        self.update_addresses(lt, host);
        if self.regs[idx].is_idle() {
            self.regs[idx].clear_history();
        }
        Ok(true)
    }

    /// Commits a pending move when a lookup touches `S` or `D`.
    pub fn maybe_commit(&mut self, lt: u8, addr: u32, host: &mut dyn MoveregsHost) {
        let Some(reg) = self.regs.get(usize::from(lt)) else {
            return;
        };
        if reg.s_addr == Some(addr) || reg.d_addr == Some(addr) {
            tracing::debug!(lt, addr, "lookup hit a moving address");
            self.commit(lt, host, false, false);
        }
    }

    /// Returns `true` while a copy from `D` to `oldD` has not been carried out.
    pub fn commit_pending(&self, lt: u8) -> bool {
        self.regs.get(usize::from(lt)).is_some_and(|reg| match (reg.d_addr, reg.old_d_addr) {
            (Some(d), Some(old_d)) => reg.last_commit != Some((d, old_d)),
            _ => false,
        })
    }

    fn inhibit(&self, lt: u8, host: &mut dyn MoveregsHost) {
        let Some(reg) = self.regs.get(usize::from(lt)) else {
            return;
        };
        if let Some(s) = reg.s_addr {
            host.set_inhibit(lt, s, true);
        }
        if let Some(d) = reg.d_addr {
            host.set_inhibit(lt, d, false);
        }
    }

    fn vacate(&mut self, lt: u8, host: &mut dyn MoveregsHost, stats_init: bool, idle_init: bool) {
        if self.regs.get(usize::from(lt)).is_some_and(|reg| reg.d_addr.is_none()) {
            self.commit(lt, host, stats_init, idle_init);
        }
    }

    /// Copies `D` to `oldD`, or zero-initializes a vacated `oldD`.
    ///
    /// Repeating a commit for the pair last committed does nothing.
    pub fn commit(&mut self, lt: u8, host: &mut dyn MoveregsHost, stats_init: bool, idle_init: bool) {
        let Some(reg) = self.regs.get_mut(usize::from(lt)) else {
            return;
        };
        let cfg = host.moveregs_config(lt);
        match (reg.d_addr, reg.old_d_addr) {
            (Some(d), Some(old_d)) => {
                if reg.last_commit == Some((d, old_d)) {
                    return;
                }
                for (res, xf) in cfg.resources() {
                    host.copy_resource(lt, res, xf.apply(d), xf.apply(old_d));
                }
                tracing::debug!(lt, d, old_d, "table move committed");
                reg.last_commit = Some((d, old_d));
                reg.commits += 1;
            }
            (None, Some(old_d)) => {
                if reg.last_zero == Some(old_d) {
                    return;
                }
                if stats_init && let Some(xf) = cfg.stats {
                    host.zero_resource(lt, MoveResource::Stats, xf.apply(old_d));
                }
                if idle_init && let Some(xf) = cfg.idle {
                    host.zero_resource(lt, MoveResource::Idletime, xf.apply(old_d));
                }
                reg.last_zero = Some(old_d);
            }
            _ => {}
        }
    }

    /// Reports `(D, oldD)` to address distribution unless nothing changed.
    pub fn update_addresses(&mut self, lt: u8, host: &mut dyn MoveregsHost) {
        let Some(reg) = self.regs.get_mut(usize::from(lt)) else {
            return;
        };
        let pair = (reg.d_addr, reg.old_d_addr);
        if pair == (None, None) || reg.last_update == Some(pair) {
            return;
        }
        host.update_addresses(lt, pair.0, pair.1);
        reg.last_update = Some(pair);
    }

    /// Returns every pipeline to idle.
    pub fn reset(&mut self) {
        self.regs = [MauMoveregs::default(); LOGICAL_TABLES];
    }
}
