//! Table-move registers of one logical table.
//!
//! A table move relocates an entry (and the stats, meter and idletime state that
//! belongs to it) while traffic keeps flowing. The driver pushes the addresses of
//! a move chain one at a time; each push shifts a three-deep pipeline:
//!
//! ```text
//! push(addr):  oldD <- D,  D <- S,  S <- addr
//! pop():       oldD <- D,  D <- S,  S <- none
//! ```
//!
//! Whenever both `D` and `oldD` are valid, the resources at `D` are copied to
//! `oldD`.

use serde::Serialize;

use crate::common::mask64;

/// Direct resources a move carries along.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum MoveResource {
    /// Stats counters.
    Stats,
    /// Meter state.
    Meter,
    /// Idletime counter.
    Idletime,
}

/// Conversion from a match address to a resource virtual address.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AddrXform {
    /// Right shift applied to the match address.
    pub shift: u32,
    /// Width of the resulting virtual address.
    pub width: u32,
}

impl AddrXform {
    /// Converts a match address.
    pub const fn apply(&self, addr: u32) -> u32 {
        if self.shift >= 32 {
            return 0;
        }
        ((addr >> self.shift) as u64 & mask64(self.width)) as u32
    }

    /// Returns `true` when `addr` has bits the transform discards above `width`.
    pub const fn overflows(&self, addr: u32) -> bool {
        self.shift < 32 && self.width < 32 && (addr >> self.shift) >> self.width != 0
    }
}

/// Decoded `MoveregsConfig` register of one table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MoveregsConfig {
    /// Width of match addresses (0 means 32).
    pub addr_width: u32,
    /// Stats transform, when the table has direct stats.
    pub stats: Option<AddrXform>,
    /// Meter transform, when the table has direct meters.
    pub meter: Option<AddrXform>,
    /// Idletime transform, when the table tracks idletime.
    pub idle: Option<AddrXform>,
}

impl MoveregsConfig {
    const fn pack_xform(xf: Option<AddrXform>) -> u64 {
        match xf {
            Some(xf) => (xf.shift as u64 & 0x1f) | ((xf.width as u64 & 0x1f) << 5) | (1 << 10),
            None => 0,
        }
    }

    const fn unpack_xform(bits: u64) -> Option<AddrXform> {
        if bits & (1 << 10) == 0 {
            return None;
        }
        Some(AddrXform {
            shift: (bits & 0x1f) as u32,
            width: ((bits >> 5) & 0x1f) as u32,
        })
    }

    /// Packs the register: stats `[10:0]`, meter `[21:11]`, idle `[32:22]`, width `[37:33]`.
    pub const fn pack(&self) -> u64 {
        Self::pack_xform(self.stats)
            | (Self::pack_xform(self.meter) << 11)
            | (Self::pack_xform(self.idle) << 22)
            | ((self.addr_width as u64 & 0x1f) << 33)
    }

    /// Unpacks the register.
    pub const fn unpack(value: u64) -> Self {
        Self {
            stats: Self::unpack_xform(value & 0x7ff),
            meter: Self::unpack_xform((value >> 11) & 0x7ff),
            idle: Self::unpack_xform((value >> 22) & 0x7ff),
            addr_width: ((value >> 33) & 0x1f) as u32,
        }
    }

    /// Effective match-address width.
    pub const fn effective_addr_width(&self) -> u32 {
        if self.addr_width == 0 { 32 } else { self.addr_width }
    }

    /// Configured resources with their transforms.
    pub fn resources(&self) -> impl Iterator<Item = (MoveResource, AddrXform)> {
        [
            (MoveResource::Stats, self.stats),
            (MoveResource::Meter, self.meter),
            (MoveResource::Idletime, self.idle),
        ]
        .into_iter()
        .filter_map(|(res, xf)| xf.map(|xf| (res, xf)))
    }

    /// Transform for one resource.
    pub const fn xform(&self, res: MoveResource) -> Option<AddrXform> {
        match res {
            MoveResource::Stats => self.stats,
            MoveResource::Meter => self.meter,
            MoveResource::Idletime => self.idle,
        }
    }
}

/// Move pipeline of one logical table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MauMoveregs {
    /// Source address (most recently pushed).
    pub s_addr: Option<u32>,
    /// Destination-side address whose resources are being moved.
    pub d_addr: Option<u32>,
    /// Address the resources of `d_addr` are copied to.
    pub old_d_addr: Option<u32>,
    pub(crate) last_commit: Option<(u32, u32)>,
    pub(crate) last_zero: Option<u32>,
    pub(crate) last_update: Option<(Option<u32>, Option<u32>)>,
    /// Pushes accepted.
    pub pushes: u64,
    /// Pops accepted.
    pub pops: u64,
    /// Copies performed.
    pub commits: u64,
}

impl MauMoveregs {
    /// Shifts the pipeline and loads `addr` into `S`.
    pub const fn load(&mut self, addr: Option<u32>) {
        self.old_d_addr = self.d_addr;
        self.d_addr = self.s_addr;
        self.s_addr = addr;
    }

    /// Returns `true` when no address is held.
    pub const fn is_idle(&self) -> bool {
        self.s_addr.is_none() && self.d_addr.is_none() && self.old_d_addr.is_none()
    }

    /// Forgets the commit and update history.
    pub const fn clear_history(&mut self) {
        self.last_commit = None;
        self.last_zero = None;
        self.last_update = None;
    }
}
