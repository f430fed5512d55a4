//! Address distribution bookkeeping.
//!
//! Resource updates triggered by a packet are not applied at lookup time: stats
//! and meter writes wait for the packet's end-of-packet (EOP), meter colors go
//! through a write queue, and idle timeouts queue evictions for the driver. All of
//! these hold match addresses, so when a table move relocates an entry they must
//! follow it; `update_addresses` does that.

use std::collections::VecDeque;

use serde::Serialize;

use crate::common::constants::LOGICAL_TABLES;
use crate::mau::meter::Color;

/// What a deferred write does once its EOP arrives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum DeferredKind {
    /// Count one packet of `bytes` bytes.
    Stats {
        /// Packet length.
        bytes: u64,
    },
    /// Run the meter ALU.
    Meter {
        /// Packet length.
        bytes: u64,
        /// Pre-color carried by the packet.
        color_in: Color,
    },
}

/// A resource update waiting for end-of-packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct DeferredWrite {
    /// Logical table.
    pub lt: u8,
    /// Match address.
    pub addr: u32,
    /// EOP number that releases the write.
    pub eop: u32,
    /// Update to apply.
    pub kind: DeferredKind,
}

/// A meter color waiting to be written to the color mapram.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ColorWrite {
    /// Logical table.
    pub lt: u8,
    /// Match address.
    pub addr: u32,
    /// Color to store.
    pub color: Color,
}

/// An idle timeout reported to the driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Eviction {
    /// Logical table.
    pub lt: u8,
    /// Match address.
    pub addr: u32,
}

/// Per-stage address distribution state.
#[derive(Debug, Clone)]
pub struct MauAddrDist {
    deferred: Vec<DeferredWrite>,
    color_writes: VecDeque<ColorWrite>,
    evictions: VecDeque<Eviction>,
    in_flight: [Option<u32>; LOGICAL_TABLES],
}

impl Default for MauAddrDist {
    fn default() -> Self {
        Self::new()
    }
}

impl MauAddrDist {
    /// Creates empty bookkeeping.
    pub const fn new() -> Self {
        Self {
            deferred: Vec::new(),
            color_writes: VecDeque::new(),
            evictions: VecDeque::new(),
            in_flight: [None; LOGICAL_TABLES],
        }
    }

    /// Queues an update until `write.eop`.
    pub fn defer(&mut self, write: DeferredWrite) {
        self.deferred.push(write);
    }

    /// Returns `true` when `lt` has updates waiting for EOP.
    pub fn has_pending(&self, lt: u8) -> bool {
        self.deferred.iter().any(|w| w.lt == lt)
    }

    /// Number of updates waiting for EOP.
    pub fn pending(&self) -> usize {
        self.deferred.len()
    }

    /// Removes and returns the updates released by `eop`, in arrival order.
    pub fn take_eop(&mut self, eop: u32) -> Vec<DeferredWrite> {
        let (released, kept): (Vec<_>, Vec<_>) = self.deferred.drain(..).partition(|w| w.eop == eop);
        self.deferred = kept;
        released
    }

    /// Queues a color write.
    pub fn queue_color(&mut self, write: ColorWrite) {
        self.color_writes.push_back(write);
    }

    /// Number of queued color writes.
    pub fn queued_colors(&self) -> usize {
        self.color_writes.len()
    }

    /// Drains the color write queue.
    pub fn flush_colors(&mut self) -> Vec<ColorWrite> {
        self.color_writes.drain(..).collect()
    }

    /// Queues an eviction.
    pub fn queue_eviction(&mut self, eviction: Eviction) {
        self.evictions.push_back(eviction);
    }

    /// Drains the eviction queue.
    pub fn take_evictions(&mut self) -> Vec<Eviction> {
        self.evictions.drain(..).collect()
    }

    /// Entry address of a move currently in flight on `lt`.
    pub fn in_flight(&self, lt: u8) -> Option<u32> {
        self.in_flight.get(usize::from(lt)).copied().flatten()
    }

    /// Follows a table move: queued work for `d_addr` now targets `old_d_addr`.
    ///
    /// With no `old_d_addr` the queued work stays where it is. The in-flight
    /// address of the table becomes `d_addr`.
    pub fn update_addresses(&mut self, lt: u8, d_addr: Option<u32>, old_d_addr: Option<u32>) {
        if let Some(slot) = self.in_flight.get_mut(usize::from(lt)) {
            *slot = d_addr;
        }
        let (Some(from), Some(to)) = (d_addr, old_d_addr) else {
            return;
        };
        let mut moved = 0usize;
        for w in self.deferred.iter_mut().filter(|w| w.lt == lt && w.addr == from) {
            w.addr = to;
            moved += 1;
        }
        for w in self.color_writes.iter_mut().filter(|w| w.lt == lt && w.addr == from) {
            w.addr = to;
            moved += 1;
        }
        for e in self.evictions.iter_mut().filter(|e| e.lt == lt && e.addr == from) {
            e.addr = to;
            moved += 1;
        }
        if moved > 0 {
            tracing::debug!(lt, from, to, moved, "queued work follows table move");
        }
    }

    /// Drops all queued work.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
