//! Low-pass filter and RED meter.
//!
//! The LPF variant of the meter ALU smooths an input sample with separate rise and
//! decay time constants:
//!
//! ```text
//! v_new = v_old + (v_in - v_old) * dt / (dt + tc)
//! ```
//!
//! In RED mode the scaled filter output is compared with two thresholds: below
//! `red_level_0` nothing is dropped, at or above `red_level_100` everything is,
//! and in between the drop probability rises linearly.
//!
//! # Word layout
//!
//! | Field | LSB | Width |
//! |-------|-----|-------|
//! | v_old | 0 | 32 |
//! | timestamp | 32 | 28 |
//! | rise mant/exp | 60 / 69 | 9 / 5 |
//! | decay mant/exp | 74 / 83 | 9 / 5 |
//! | red level 0 / 100 | 88 / 104 | 16 / 16 |
//! | output scale exp | 120 | 5 |

use serde::Serialize;

use crate::common::{SramWord, mask64};
use crate::mau::meter::{Color, ForwardCache};

/// Bit positions of the LPF word fields.
pub mod layout {
    /// Filter state.
    pub const V_OLD: (u32, u32) = (0, 32);
    /// Last update timestamp.
    pub const TIMESTAMP: (u32, u32) = (32, 28);
    /// Rise time constant mantissa.
    pub const RISE_MANT: (u32, u32) = (60, 9);
    /// Rise time constant exponent.
    pub const RISE_EXP: (u32, u32) = (69, 5);
    /// Decay time constant mantissa.
    pub const DECAY_MANT: (u32, u32) = (74, 9);
    /// Decay time constant exponent.
    pub const DECAY_EXP: (u32, u32) = (83, 5);
    /// Scaled level where dropping starts.
    pub const RED_LEVEL_0: (u32, u32) = (88, 16);
    /// Scaled level where everything is dropped.
    pub const RED_LEVEL_100: (u32, u32) = (104, 16);
    /// Right shift applied to the filter output.
    pub const OUT_SCALE_EXP: (u32, u32) = (120, 5);
}

/// Decoded LPF word.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LpfState {
    /// Filter state.
    pub v_old: u64,
    /// Last update timestamp.
    pub timestamp: u64,
    /// Rise time constant `(mant, exp)`.
    pub rise: (u64, u32),
    /// Decay time constant `(mant, exp)`.
    pub decay: (u64, u32),
    /// RED lower threshold.
    pub red_level_0: u64,
    /// RED upper threshold.
    pub red_level_100: u64,
    /// Output scale shift.
    pub out_scale_exp: u32,
}

impl LpfState {
    /// Decodes an LPF word.
    pub fn unpack(word: &SramWord) -> Self {
        let f = |(lsb, width): (u32, u32)| word.get(lsb, width);
        Self {
            v_old: f(layout::V_OLD),
            timestamp: f(layout::TIMESTAMP),
            rise: (f(layout::RISE_MANT), f(layout::RISE_EXP) as u32),
            decay: (f(layout::DECAY_MANT), f(layout::DECAY_EXP) as u32),
            red_level_0: f(layout::RED_LEVEL_0),
            red_level_100: f(layout::RED_LEVEL_100),
            out_scale_exp: f(layout::OUT_SCALE_EXP) as u32,
        }
    }

    /// Encodes the state.
    pub fn pack(&self) -> SramWord {
        let mut word = SramWord::ZERO;
        let mut put = |(lsb, width): (u32, u32), value: u64| word.set(lsb, width, value);
        put(layout::V_OLD, self.v_old);
        put(layout::TIMESTAMP, self.timestamp);
        put(layout::RISE_MANT, self.rise.0);
        put(layout::RISE_EXP, u64::from(self.rise.1));
        put(layout::DECAY_MANT, self.decay.0);
        put(layout::DECAY_EXP, u64::from(self.decay.1));
        put(layout::RED_LEVEL_0, self.red_level_0);
        put(layout::RED_LEVEL_100, self.red_level_100);
        put(layout::OUT_SCALE_EXP, u64::from(self.out_scale_exp));
        word
    }
}

/// Inputs of one LPF access.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LpfInput {
    /// Meter virtual address.
    pub vaddr: u32,
    /// LPF word read from RAM (after cache replay).
    pub data_in: SramWord,
    /// Stage time base.
    pub present_time: u64,
    /// Per-packet time offset.
    pub relative_time: u64,
    /// Input sample.
    pub sample: u64,
    /// Random value for the RED drop decision.
    pub random: u64,
    /// Background sweep: no update, no output.
    pub meter_sweep: bool,
}

/// Outputs of one LPF access.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LpfOutput {
    /// Word to write back.
    pub data_out: SramWord,
    /// Scaled filter output.
    pub value_out: u64,
    /// RED decision: `Red` drops, `Green` passes, `Inhibit` on sweep.
    pub color_out: Color,
}

/// LPF / RED ALU state.
#[derive(Debug, Clone)]
pub struct MauLpfMeter {
    ts_width: u32,
    red: bool,
    cache: ForwardCache,
}

impl MauLpfMeter {
    /// Creates an LPF ALU.
    pub fn new(ts_width: u32) -> Self {
        Self {
            ts_width,
            red: false,
            cache: ForwardCache::default(),
        }
    }

    /// Switches between plain LPF and RED output.
    pub const fn set_red(&mut self, red: bool) {
        self.red = red;
    }

    /// Returns `true` in RED mode.
    pub const fn red(&self) -> bool {
        self.red
    }

    /// Records the data `vaddr` held before a driver write.
    pub fn cache_v(&mut self, vaddr: u32, pre_write: SramWord) {
        self.cache.store(vaddr, pre_write);
    }

    /// Applies the forward cache to a RAM read for `vaddr`.
    pub fn maybe_use_cache_v(&mut self, vaddr: u32, ram: SramWord) -> SramWord {
        self.cache.take_for(vaddr, ram)
    }

    /// Follows a table move.
    pub fn update_addresses(&mut self, d_vaddr: Option<u32>, old_d_vaddr: Option<u32>) {
        if let Some(from) = d_vaddr {
            self.cache.retarget(from, old_d_vaddr);
        }
    }

    /// Runs one filter update.
    pub fn calculate_output(&self, input: &LpfInput) -> LpfOutput {
        let mut st = LpfState::unpack(&input.data_in);
        if input.meter_sweep {
            return LpfOutput {
                data_out: input.data_in,
                value_out: st.v_old >> st.out_scale_exp,
                color_out: Color::Inhibit,
            };
        }
        let ts_mask = mask64(self.ts_width);
        let now = input.present_time.wrapping_add(input.relative_time) & ts_mask;
        let dt = i128::from(now.wrapping_sub(st.timestamp) & ts_mask);
        let v_in = input.sample & mask64(layout::V_OLD.1);
        let (mant, exp) = if v_in > st.v_old { st.rise } else { st.decay };
        let tc = i128::from(mant) << exp.min(63);
        let v_old = i128::from(st.v_old);
        let v_new = if dt + tc == 0 {
            i128::from(v_in)
        } else {
            v_old + (i128::from(v_in) - v_old) * dt / (dt + tc)
        };
        st.v_old = v_new.clamp(0, i128::from(mask64(layout::V_OLD.1))) as u64;
        st.timestamp = now;

        let value_out = st.v_old >> st.out_scale_exp.min(63);
        let color_out = if self.red { Self::red_decision(&st, value_out, input.random) } else { Color::Green };
        LpfOutput {
            data_out: st.pack(),
            value_out,
            color_out,
        }
    }

    fn red_decision(st: &LpfState, level: u64, random: u64) -> Color {
        if level <= st.red_level_0 {
            return Color::Green;
        }
        if level >= st.red_level_100 || st.red_level_100 <= st.red_level_0 {
            return Color::Red;
        }
        let span = st.red_level_100 - st.red_level_0;
        let probability = (level - st.red_level_0) * 256 / span;
        if random & 0xff < probability { Color::Red } else { Color::Green }
    }

    /// Clears cached state.
    pub fn reset(&mut self) {
        self.cache = ForwardCache::default();
    }
}
