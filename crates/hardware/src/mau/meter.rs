//! Two-rate three-color token-bucket meter.
//!
//! Meter state lives in one 128-bit SRAM word per meter. On every access the ALU:
//! 1. **Credits** both buckets for the time elapsed since the stored timestamp,
//!    clamping each at its burst size.
//! 2. **Colors** the packet by the worse of the incoming color and the color the
//!    bucket levels imply.
//! 3. **Debits** the buckets that color consumes and writes the word back.
//!
//! # Timing modes
//!
//! * **Coupled** (legacy): both buckets share the coarser of the two rate
//!   exponents, the timestamp advances only by whole ticks, and when both
//!   buckets saturate the timestamp snaps to *now*.
//! * **Decoupled**: each bucket counts ticks with its own exponent and the
//!   timestamp is always set to *now*.
//!
//! # Word layout
//!
//! | Field | LSB | Width |
//! |-------|-----|-------|
//! | peak burst exp/mant | 0 / 5 | 5 / 8 |
//! | peak rate exp/mant | 13 / 18 | 5 / 9 |
//! | committed burst exp/mant | 27 / 32 | 5 / 8 |
//! | committed rate exp/mant | 40 / 45 | 5 / 9 |
//! | peak level | 54 | 23 (signed) |
//! | committed level | 77 | 23 (signed) |
//! | timestamp | 100 | 28 |

use serde::Serialize;

use crate::common::bits::{mask128, signed_max, signed_min};
use crate::common::{ModelResult, SramWord, mask64};
use crate::mau::lpf_meter::MauLpfMeter;
use crate::mau::registers::{ConfigEvent, FieldId, RegBlock, RegisterObserver};

/// Bit positions of the meter word fields.
pub mod layout {
    /// Peak burst exponent.
    pub const PEAK_BURST_EXP: (u32, u32) = (0, 5);
    /// Peak burst mantissa.
    pub const PEAK_BURST_MANT: (u32, u32) = (5, 8);
    /// Peak rate exponent.
    pub const PEAK_RATE_EXP: (u32, u32) = (13, 5);
    /// Peak rate mantissa.
    pub const PEAK_RATE_MANT: (u32, u32) = (18, 9);
    /// Committed burst exponent.
    pub const COMMITTED_BURST_EXP: (u32, u32) = (27, 5);
    /// Committed burst mantissa.
    pub const COMMITTED_BURST_MANT: (u32, u32) = (32, 8);
    /// Committed rate exponent.
    pub const COMMITTED_RATE_EXP: (u32, u32) = (40, 5);
    /// Committed rate mantissa.
    pub const COMMITTED_RATE_MANT: (u32, u32) = (45, 9);
    /// Width of each signed bucket level field.
    pub const LEVEL_WIDTH: u32 = 23;
    /// Peak bucket level (signed).
    pub const PEAK_LEVEL: (u32, u32) = (54, LEVEL_WIDTH);
    /// Committed bucket level (signed).
    pub const COMMITTED_LEVEL: (u32, u32) = (77, LEVEL_WIDTH);
    /// Last update timestamp.
    pub const TIMESTAMP: (u32, u32) = (100, 28);
}

/// Packet color.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum Color {
    /// Conforms to both rates.
    #[default]
    Green,
    /// Exceeds the committed rate only.
    Yellow,
    /// Exceeds the peak rate.
    Red,
    /// No color produced (sweep cycles).
    Inhibit,
}

impl Color {
    const fn rank(self) -> u8 {
        match self {
            Self::Green | Self::Inhibit => 0,
            Self::Yellow => 1,
            Self::Red => 2,
        }
    }

    /// The worse of two colors.
    pub const fn worse(self, other: Self) -> Self {
        if other.rank() > self.rank() { other } else { self }
    }

    /// Two-bit hardware encoding; `Inhibit` has none.
    pub const fn code(self) -> Option<u8> {
        match self {
            Self::Green => Some(0),
            Self::Yellow => Some(1),
            Self::Red => Some(3),
            Self::Inhibit => None,
        }
    }

    /// Decodes a two-bit color.
    pub const fn from_code(code: u8) -> Self {
        match code & 3 {
            0 => Self::Green,
            1 => Self::Yellow,
            _ => Self::Red,
        }
    }

    /// Color implied by bucket levels: red if peak is negative, else yellow if
    /// committed is negative, else green.
    pub const fn from_levels(committed: i64, peak: i64) -> Self {
        if peak < 0 {
            Self::Red
        } else if committed < 0 {
            Self::Yellow
        } else {
            Self::Green
        }
    }
}

/// Rate and burst of one bucket, as mantissa/exponent pairs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BucketConfig {
    /// Rate mantissa (credit per tick).
    pub rate_mant: u64,
    /// Rate exponent (tick is `2^rate_exp` cycles).
    pub rate_exp: u32,
    /// Burst mantissa.
    pub burst_mant: u64,
    /// Burst exponent.
    pub burst_exp: u32,
}

impl BucketConfig {
    /// Burst size `burst_mant << burst_exp`, clamped to the level range.
    pub fn burst_size(&self, level_width: u32) -> i64 {
        let max = signed_max(clamp_level_width(level_width));
        if self.burst_exp >= 64 {
            return max;
        }
        let burst = i128::from(self.burst_mant) << self.burst_exp;
        burst.min(i128::from(max)) as i64
    }
}

/// One bucket: configuration plus current level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Bucket {
    /// Signed token level.
    pub level: i64,
    /// Rate and burst.
    pub cfg: BucketConfig,
}

/// Decoded meter word.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MeterState {
    /// Committed bucket.
    pub committed: Bucket,
    /// Peak bucket.
    pub peak: Bucket,
    /// Timestamp of the last update.
    pub timestamp: u64,
}

impl MeterState {
    /// Decodes a meter word.
    pub fn unpack(word: &SramWord) -> Self {
        let f = |(lsb, width): (u32, u32)| word.get(lsb, width);
        Self {
            committed: Bucket {
                level: word.get_signed(layout::COMMITTED_LEVEL.0, layout::COMMITTED_LEVEL.1),
                cfg: BucketConfig {
                    rate_mant: f(layout::COMMITTED_RATE_MANT),
                    rate_exp: f(layout::COMMITTED_RATE_EXP) as u32,
                    burst_mant: f(layout::COMMITTED_BURST_MANT),
                    burst_exp: f(layout::COMMITTED_BURST_EXP) as u32,
                },
            },
            peak: Bucket {
                level: word.get_signed(layout::PEAK_LEVEL.0, layout::PEAK_LEVEL.1),
                cfg: BucketConfig {
                    rate_mant: f(layout::PEAK_RATE_MANT),
                    rate_exp: f(layout::PEAK_RATE_EXP) as u32,
                    burst_mant: f(layout::PEAK_BURST_MANT),
                    burst_exp: f(layout::PEAK_BURST_EXP) as u32,
                },
            },
            timestamp: f(layout::TIMESTAMP),
        }
    }

    /// Encodes the state into a meter word.
    pub fn pack(&self) -> SramWord {
        let mut word = SramWord::ZERO;
        let mut put = |(lsb, width): (u32, u32), value: u64| word.set(lsb, width, value);
        put(layout::PEAK_BURST_EXP, u64::from(self.peak.cfg.burst_exp));
        put(layout::PEAK_BURST_MANT, self.peak.cfg.burst_mant);
        put(layout::PEAK_RATE_EXP, u64::from(self.peak.cfg.rate_exp));
        put(layout::PEAK_RATE_MANT, self.peak.cfg.rate_mant);
        put(layout::COMMITTED_BURST_EXP, u64::from(self.committed.cfg.burst_exp));
        put(layout::COMMITTED_BURST_MANT, self.committed.cfg.burst_mant);
        put(layout::COMMITTED_RATE_EXP, u64::from(self.committed.cfg.rate_exp));
        put(layout::COMMITTED_RATE_MANT, self.committed.cfg.rate_mant);
        put(layout::TIMESTAMP, self.timestamp);
        word.set_signed(layout::PEAK_LEVEL.0, layout::PEAK_LEVEL.1, self.peak.level);
        word.set_signed(layout::COMMITTED_LEVEL.0, layout::COMMITTED_LEVEL.1, self.committed.level);
        word
    }
}

/// Single-entry cache of RAM data a configuration write overwrote.
///
/// The hardware read for a meter access issued in the clock after a driver write
/// still sees the old word; the model replays it for exactly one access.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ForwardCache {
    entry: Option<(u32, SramWord)>,
}

impl ForwardCache {
    /// Remembers the data `vaddr` held before a write.
    pub fn store(&mut self, vaddr: u32, pre_write: SramWord) {
        self.entry = Some((vaddr, pre_write));
    }

    /// Consumes the cache: returns the cached word when it is for `vaddr`, else `ram`.
    pub fn take_for(&mut self, vaddr: u32, ram: SramWord) -> SramWord {
        match self.entry.take() {
            Some((cached, word)) if cached == vaddr => word,
            _ => ram,
        }
    }

    /// Cached virtual address, if any.
    pub fn vaddr(&self) -> Option<u32> {
        self.entry.map(|(v, _)| v)
    }

    /// Moves a cached entry for `from` to `to`, dropping it when `to` is `None`.
    pub fn retarget(&mut self, from: u32, to: Option<u32>) {
        if let Some((vaddr, word)) = self.entry
            && vaddr == from
        {
            self.entry = to.map(|to| (to, word));
        }
    }
}

/// Inputs of one meter access.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MeterInput {
    /// Meter virtual address.
    pub vaddr: u32,
    /// Meter word read from RAM (after cache replay).
    pub data_in: SramWord,
    /// Stage time base.
    pub present_time: u64,
    /// Per-packet offset added to the time base.
    pub relative_time: u64,
    /// Color the packet arrived with.
    pub color_in: Color,
    /// Amount to debit (bytes or packets).
    pub decrement: u64,
    /// Random value for fractional-credit rounding.
    pub random: u64,
    /// Enable fractional-credit rounding.
    pub rng_enable: bool,
    /// Background sweep: credit only, no debit, no color.
    pub meter_sweep: bool,
}

/// Outputs of one meter access.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MeterOutput {
    /// Meter word to write back.
    pub data_out: SramWord,
    /// Color assigned to the packet.
    pub color_out: Color,
    /// Committed bucket reached its burst size.
    pub committed_saturated: bool,
    /// Peak bucket reached its burst size.
    pub peak_saturated: bool,
    /// The timestamp was snapped to now.
    pub snapped: bool,
    /// Crediting was skipped because the previous access snapped this meter.
    pub credit_skipped: bool,
}

const fn clamp_level_width(width: u32) -> u32 {
    if width == 0 {
        1
    } else if width > layout::LEVEL_WIDTH {
        layout::LEVEL_WIDTH
    } else {
        width
    }
}

/// One meter ALU.
#[derive(Debug, Clone)]
pub struct MauMeter {
    level_width: u32,
    ts_width: u32,
    coupled: bool,
    fractional_bits: u32,
    snap_cache: Option<u32>,
    cache: ForwardCache,
}

impl MauMeter {
    /// Creates a meter ALU.
    ///
    /// # Arguments
    ///
    /// * `level_width` - Width of the signed bucket levels.
    /// * `ts_width` - Width of the timestamp.
    /// * `coupled` - Use legacy coupled bucket timing.
    ///
    /// `level_width` is clamped to `1..=layout::LEVEL_WIDTH` and `ts_width` to the
    /// timestamp field, so stored values never wrap.
    pub const fn new(level_width: u32, ts_width: u32, coupled: bool) -> Self {
        Self {
            level_width: clamp_level_width(level_width),
            ts_width: if ts_width > layout::TIMESTAMP.1 { layout::TIMESTAMP.1 } else { ts_width },
            coupled,
            fractional_bits: 0,
            snap_cache: None,
            cache: ForwardCache { entry: None },
        }
    }

    /// Returns `true` in coupled timing mode.
    pub const fn coupled(&self) -> bool {
        self.coupled
    }

    /// Sets the number of fractional credit bits.
    pub const fn set_fractional_bits(&mut self, bits: u32) {
        self.fractional_bits = if bits > 16 { 16 } else { bits };
    }

    /// Meter last snapped, if the snap has not been consumed yet.
    pub const fn snap_vaddr(&self) -> Option<u32> {
        self.snap_cache
    }

    /// Records the data `vaddr` held before a driver write.
    pub fn cache_v(&mut self, vaddr: u32, pre_write: SramWord) {
        self.cache.store(vaddr, pre_write);
    }

    /// Applies the forward cache to a RAM read for `vaddr`.
    pub fn maybe_use_cache_v(&mut self, vaddr: u32, ram: SramWord) -> SramWord {
        self.cache.take_for(vaddr, ram)
    }

    /// Follows a table move: state cached for `d_vaddr` now belongs to `old_d_vaddr`.
    pub fn update_addresses(&mut self, d_vaddr: Option<u32>, old_d_vaddr: Option<u32>) {
        let Some(from) = d_vaddr else {
            return;
        };
        self.cache.retarget(from, old_d_vaddr);
        if self.snap_cache == Some(from) {
            self.snap_cache = old_d_vaddr;
        }
    }

    /// Credit for `ticks` at `mant` scaled by `2^shift`, with fractional rounding.
    fn credit(&self, ticks: u64, mant: u64, shift: u32, random: u64, rng_enable: bool) -> i64 {
        let raw = (u128::from(ticks) * u128::from(mant)) << shift.min(64);
        let frac_bits = self.fractional_bits;
        let mut whole = raw >> frac_bits;
        if frac_bits > 0 && rng_enable {
            let remainder = (raw & mask128(frac_bits)) as u64;
            if random & mask64(frac_bits) < remainder {
                whole += 1;
            }
        }
        whole.min(i64::MAX as u128) as i64
    }

    /// Adds credit to a bucket, clamping at the burst size.
    fn fill(&self, bucket: &mut Bucket, credit: i64) -> bool {
        let burst = bucket.cfg.burst_size(self.level_width);
        let level = bucket.level.saturating_add(credit);
        if level >= burst {
            bucket.level = burst;
            true
        } else {
            bucket.level = level;
            false
        }
    }

    /// Ticks of `2^exp` cycles between `ts` and `now`, modulo the timestamp width.
    const fn ticks(&self, now: u64, ts: u64, exp: u32) -> u64 {
        if exp >= self.ts_width {
            return 0;
        }
        (now >> exp).wrapping_sub(ts >> exp) & mask64(self.ts_width - exp)
    }

    /// Runs one meter access.
    ///
    /// # Returns
    ///
    /// The word to write back and the packet color, or an invariant failure when a
    /// bucket level leaves the configured range.
    pub fn calculate_output(&mut self, input: &MeterInput) -> ModelResult<MeterOutput> {
        let ts_mask = mask64(self.ts_width);
        let now = input.present_time.wrapping_add(input.relative_time) & ts_mask;
        let mut st = MeterState::unpack(&input.data_in);
        let mut out = MeterOutput::default();

        let skip_credit = self.snap_cache.take() == Some(input.vaddr);
        if skip_credit {
            out.credit_skipped = true;
            tracing::trace!(vaddr = input.vaddr, "meter credit skipped after snap");
        } else if self.coupled {
            let exp = st.committed.cfg.rate_exp.max(st.peak.cfg.rate_exp);
            let ticks = self.ticks(now, st.timestamp, exp);
            let c_credit = self.credit(
                ticks,
                st.committed.cfg.rate_mant,
                exp - st.committed.cfg.rate_exp,
                input.random,
                input.rng_enable,
            );
            let p_credit = self.credit(
                ticks,
                st.peak.cfg.rate_mant,
                exp - st.peak.cfg.rate_exp,
                input.random,
                input.rng_enable,
            );
            out.committed_saturated = self.fill(&mut st.committed, c_credit);
            out.peak_saturated = self.fill(&mut st.peak, p_credit);
            st.timestamp = if exp < 64 {
                st.timestamp.wrapping_add(ticks << exp) & ts_mask
            } else {
                st.timestamp
            };
            if out.committed_saturated && out.peak_saturated {
                st.timestamp = now;
                self.snap_cache = Some(input.vaddr);
                out.snapped = true;
            }
        } else {
            let c_ticks = self.ticks(now, st.timestamp, st.committed.cfg.rate_exp);
            let p_ticks = self.ticks(now, st.timestamp, st.peak.cfg.rate_exp);
            let c_credit = self.credit(c_ticks, st.committed.cfg.rate_mant, 0, input.random, input.rng_enable);
            let p_credit = self.credit(p_ticks, st.peak.cfg.rate_mant, 0, input.random, input.rng_enable);
            out.committed_saturated = self.fill(&mut st.committed, c_credit);
            out.peak_saturated = self.fill(&mut st.peak, p_credit);
            st.timestamp = now;
        }

        if input.meter_sweep {
            out.color_out = Color::Inhibit;
        } else {
            let color = input
                .color_in
                .worse(Color::from_levels(st.committed.level, st.peak.level));
            let dec = input.decrement.min(signed_max(self.level_width) as u64) as i64;
            match color {
                Color::Green => {
                    st.committed.level -= dec;
                    st.peak.level -= dec;
                }
                Color::Yellow => st.peak.level -= dec,
                Color::Red | Color::Inhibit => {}
            }
            out.color_out = color;
        }

        let floor = signed_min(self.level_width);
        crate::model_assert!(
            st.committed.level >= floor && st.peak.level >= floor,
            "mau::meter",
            "vaddr {:#x}: levels committed={} peak={} below {}",
            input.vaddr,
            st.committed.level,
            st.peak.level,
            floor
        );
        out.data_out = st.pack();
        Ok(out)
    }

    /// Clears cached state.
    pub fn reset(&mut self) {
        self.snap_cache = None;
        self.cache = ForwardCache::default();
    }
}

/// Operating mode of a meter ALU.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum MeterKind {
    /// Two-rate token bucket.
    #[default]
    Bucket,
    /// Low-pass filter.
    Lpf,
    /// Low-pass filter with RED drop output.
    Red,
}

/// Decoded `MeterAluConfig` register.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MeterAluConfig {
    /// Logical table the ALU serves.
    pub lt: Option<u8>,
    /// Mode.
    pub kind: MeterKind,
    /// Fractional credit bits.
    pub fractional_bits: u32,
    /// Debit by bytes instead of packets.
    pub byte_mode: bool,
}

impl MeterAluConfig {
    /// Packs the register: `lt[3:0] valid[4] kind[6:5] frac[11:7] bytes[12]`.
    pub const fn pack(&self) -> u64 {
        let lt = match self.lt {
            Some(lt) => (1 << 4) | (lt as u64 & 0xf),
            None => 0,
        };
        let kind = match self.kind {
            MeterKind::Bucket => 0,
            MeterKind::Lpf => 1,
            MeterKind::Red => 2,
        };
        lt | (kind << 5) | ((self.fractional_bits as u64 & 0x1f) << 7) | ((self.byte_mode as u64) << 12)
    }

    /// Unpacks the register.
    pub const fn unpack(value: u64) -> Self {
        Self {
            lt: if value & (1 << 4) != 0 { Some((value & 0xf) as u8) } else { None },
            kind: match (value >> 5) & 3 {
                1 => MeterKind::Lpf,
                2 => MeterKind::Red,
                _ => MeterKind::Bucket,
            },
            fractional_bits: ((value >> 7) & 0x1f) as u32,
            byte_mode: (value >> 12) & 1 == 1,
        }
    }
}

/// One meter ALU: a bucket meter and an LPF sharing the table binding.
#[derive(Debug, Clone)]
pub struct MauMeterAlu {
    index: usize,
    cfg: MeterAluConfig,
    /// Token bucket datapath.
    pub meter: MauMeter,
    /// LPF / RED datapath.
    pub lpf: MauLpfMeter,
}

impl MauMeterAlu {
    /// Creates an unbound ALU.
    pub fn new(index: usize, level_width: u32, ts_width: u32, coupled: bool) -> Self {
        Self {
            index,
            cfg: MeterAluConfig::default(),
            meter: MauMeter::new(level_width, ts_width, coupled),
            lpf: MauLpfMeter::new(ts_width),
        }
    }

    /// ALU index within the stage.
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Current configuration.
    pub const fn config(&self) -> MeterAluConfig {
        self.cfg
    }

    /// Records pre-write data in the cache of the active datapath.
    pub fn cache_v(&mut self, vaddr: u32, pre_write: SramWord) {
        match self.cfg.kind {
            MeterKind::Bucket => self.meter.cache_v(vaddr, pre_write),
            MeterKind::Lpf | MeterKind::Red => self.lpf.cache_v(vaddr, pre_write),
        }
    }

    /// Follows a table move on both datapaths.
    pub fn update_addresses(&mut self, d_vaddr: Option<u32>, old_d_vaddr: Option<u32>) {
        self.meter.update_addresses(d_vaddr, old_d_vaddr);
        self.lpf.update_addresses(d_vaddr, old_d_vaddr);
    }

    /// Clears cached state and the table binding.
    pub fn reset(&mut self) {
        self.cfg = MeterAluConfig::default();
        self.meter.reset();
        self.lpf.reset();
    }
}

impl RegisterObserver for MauMeterAlu {
    fn register_written(&mut self, field: FieldId, value: u64) -> Vec<ConfigEvent> {
        if field.block == RegBlock::MeterAluConfig {
            self.cfg = MeterAluConfig::unpack(value);
            self.meter.set_fractional_bits(self.cfg.fractional_bits);
            self.lpf.set_red(self.cfg.kind == MeterKind::Red);
            tracing::debug!(alu = self.index, cfg = ?self.cfg, "meter ALU configured");
        }
        Vec::new()
    }
}
