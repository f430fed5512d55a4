//! Column match engine.
//!
//! A column combines the per-row lookups of every SRAM it holds for a logical
//! table into at most one hit. It provides:
//! 1. **Inner resolution:** Priorities 4 down to 2, first hit wins. With
//!    `evaluate_all` every remaining row is still examined so multi-row hits can
//!    be reported.
//! 2. **Outer resolution:** Priority 0/1 hits go through a crossbar. Each
//!    `(row, priority)` input maps to an output priority; an output fires only
//!    when the set of inputs that reached it equals its expected set exactly.
//!    This is how a wide entry spanning several rows is recognized. An input
//!    reaching an output whose expected set does not contain it is a crossbar
//!    misconfiguration (fatal unless `relax_hitmap_check`).
//! 3. **Next-table check:** The accepted hit's row bus must serve the table;
//!    otherwise the hit is suppressed.

use serde::Serialize;

use crate::common::constants::{HIT_PRIORITIES, INNER_PRIORITY_MIN};
use crate::common::{ModelResult, config_check};
use crate::config::ModelFlags;
use crate::mau::sram::{MauSram, RowLookup};
use crate::mau::sram_row::MauSramRowReg;

/// Number of outer priorities feeding the crossbar.
const OUTER_PRIORITIES: usize = INNER_PRIORITY_MIN as usize;

/// Per-table column configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ColumnLtConfig {
    /// Bit `r` set when row `r` participates.
    pub rows: u16,
    /// Keep evaluating after the first inner hit.
    pub evaluate_all: bool,
    /// Crossbar: `hitmap[row][p]` is the output priority outer input `(row, p)` drives.
    pub hitmap: Vec<[Option<u8>; OUTER_PRIORITIES]>,
    /// Input set each output priority must see exactly to fire.
    pub expected: [u32; HIT_PRIORITIES],
}

impl ColumnLtConfig {
    /// Creates a configuration over the rows in `rows` with an empty crossbar.
    pub fn new(rows: u16, row_count: usize) -> Self {
        Self {
            rows,
            evaluate_all: false,
            hitmap: vec![[None; OUTER_PRIORITIES]; row_count],
            expected: [0; HIT_PRIORITIES],
        }
    }

    /// Routes outer input `(row, priority)` to `output` and adds it to the expected set.
    pub fn with_outer(mut self, row: usize, priority: usize, output: u8) -> Self {
        if let Some(entry) = self.hitmap.get_mut(row)
            && priority < OUTER_PRIORITIES
            && usize::from(output) < HIT_PRIORITIES
        {
            entry[priority] = Some(output);
            self.expected[usize::from(output)] |= input_bit(row, priority);
        }
        self
    }

    /// Enables or disables evaluate-all mode.
    pub const fn with_evaluate_all(mut self, evaluate_all: bool) -> Self {
        self.evaluate_all = evaluate_all;
        self
    }

    fn has_row(&self, row: usize) -> bool {
        row < 16 && self.rows & (1 << row) != 0
    }
}

/// Crossbar input bit for `(row, priority)`.
const fn input_bit(row: usize, priority: usize) -> u32 {
    1 << (row * OUTER_PRIORITIES + priority)
}

/// A hit accepted by a column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ColumnHit {
    /// Logical table.
    pub lt: u8,
    /// Row of the winning SRAM.
    pub row: usize,
    /// Column.
    pub col: usize,
    /// Word index.
    pub hit_index: u32,
    /// Sub-entry within the word.
    pub slot: u8,
    /// Resolved priority (the output priority for outer hits).
    pub priority: u8,
    /// Next table of the entry.
    pub next_table: u8,
    /// Resolved through the outer crossbar.
    pub outer: bool,
}

/// Counters kept by every column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ColumnStats {
    /// Lookups performed.
    pub lookups: u64,
    /// Hits delivered.
    pub hits: u64,
    /// Redundant same-row hits seen.
    pub redundant: u64,
    /// Multi-row hits seen.
    pub multi_row: u64,
    /// Hits discarded because the next table could not be read.
    pub discarded: u64,
    /// Hits suppressed by the next-table bus check.
    pub suppressed: u64,
}

/// One SRAM column.
#[derive(Debug, Clone)]
pub struct MauSramColumn {
    col: usize,
    lt_cfg: Vec<Option<ColumnLtConfig>>,
    reverse_hitmap: [u32; HIT_PRIORITIES],
    outer_evaluations: u64,
    stats: ColumnStats,
}

impl MauSramColumn {
    /// Creates an unconfigured column.
    pub fn new(col: usize, logical_tables: usize) -> Self {
        Self {
            col,
            lt_cfg: vec![None; logical_tables],
            reverse_hitmap: [0; HIT_PRIORITIES],
            outer_evaluations: 0,
            stats: ColumnStats::default(),
        }
    }

    /// Column index.
    pub const fn col(&self) -> usize {
        self.col
    }

    /// Installs (or removes) the configuration for `lt`.
    pub fn configure_lt(&mut self, lt: u8, cfg: Option<ColumnLtConfig>) {
        if let Some(slot) = self.lt_cfg.get_mut(usize::from(lt)) {
            *slot = cfg;
        }
    }

    /// Configuration for `lt`, if any.
    pub fn lt_config(&self, lt: u8) -> Option<&ColumnLtConfig> {
        self.lt_cfg.get(usize::from(lt)).and_then(Option::as_ref)
    }

    /// Number of times the outer crossbar was evaluated.
    pub const fn outer_evaluations(&self) -> u64 {
        self.outer_evaluations
    }

    /// Input sets seen by each output priority at the last outer evaluation.
    pub const fn reverse_hitmap(&self) -> &[u32; HIT_PRIORITIES] {
        &self.reverse_hitmap
    }

    /// Column counters.
    pub const fn stats(&self) -> &ColumnStats {
        &self.stats
    }

    /// Looks `key` up at `index` in every participating row.
    ///
    /// # Arguments
    ///
    /// * `lt` - Requesting logical table.
    /// * `index` - Word index derived from the hash of the key.
    /// * `key` - Search key.
    /// * `rams` - The stage SRAM grid, indexed `[row][col]`.
    /// * `row_regs` - Per-row next-table bus wiring.
    /// * `flags` - Relax flags.
    ///
    /// # Returns
    ///
    /// The accepted hit, `None` on miss or suppression, or an error when a strict
    /// multi-row check fails.
    pub fn lookup(
        &mut self,
        lt: u8,
        index: u32,
        key: u128,
        rams: &[Vec<MauSram>],
        row_regs: &[MauSramRowReg],
        flags: &ModelFlags,
    ) -> ModelResult<Option<ColumnHit>> {
        let Some(cfg) = self.lt_cfg.get(usize::from(lt)).and_then(Option::as_ref) else {
            return Ok(None);
        };
        let cfg = cfg.clone();
        self.stats.lookups += 1;

        let mut rows: Vec<(usize, RowLookup)> = Vec::new();
        for (row, ram_row) in rams.iter().enumerate() {
            let Some(sram) = ram_row.get(self.col) else {
                continue;
            };
            if !cfg.has_row(row) || sram.match_lt() != Some(lt) {
                continue;
            }
            let result = sram.lookup(index, key);
            if result.redundant {
                self.stats.redundant += 1;
                tracing::warn!(lt, row, col = self.col, index, "multiple entries hit in the same word");
            }
            if result.mask != 0 {
                rows.push((row, result));
            }
        }

        let mut accepted = self.resolve_inner(lt, &cfg, &rows, rams, flags)?;
        if accepted.is_none() && rows.iter().any(|(_, r)| r.has_outer()) {
            accepted = self.handle_outer_hits(lt, &cfg, &rows, rams, flags)?;
        }

        let Some(hit) = accepted else {
            return Ok(None);
        };
        let bus = rams[hit.row][self.col].nxtab_bus();
        let served = row_regs.get(hit.row).is_some_and(|r| r.bus_serves(bus, lt));
        if !served {
            self.stats.suppressed += 1;
            if flags.relax_nxtab_bus_check {
                tracing::warn!(lt, row = hit.row, col = self.col, bus, "next-table bus does not serve table, hit suppressed");
            } else {
                tracing::error!(
                    lt,
                    row = hit.row,
                    col = self.col,
                    bus,
                    "next-table bus does not serve table, hit suppressed"
                );
            }
            return Ok(None);
        }
        self.stats.hits += 1;
        Ok(Some(hit))
    }

    fn resolve_inner(
        &mut self,
        lt: u8,
        cfg: &ColumnLtConfig,
        rows: &[(usize, RowLookup)],
        rams: &[Vec<MauSram>],
        flags: &ModelFlags,
    ) -> ModelResult<Option<ColumnHit>> {
        let mut accepted: Option<ColumnHit> = None;
        for pri in (usize::from(INNER_PRIORITY_MIN)..HIT_PRIORITIES).rev() {
            for (row, result) in rows {
                if !result.has(pri) {
                    continue;
                }
                if let Some(first) = accepted {
                    if first.row == *row {
                        self.stats.redundant += 1;
                        tracing::warn!(lt, row, col = self.col, "redundant hit in the same row");
                    } else {
                        self.stats.multi_row += 1;
                        config_check(
                            flags.relax_multi_row_hit_check,
                            "mau::sram_column",
                            format!(
                                "lt {lt} hit in rows {} and {row} of column {}",
                                first.row, self.col
                            ),
                        )?;
                    }
                    continue;
                }
                let Some(slot) = result.matched[pri] else {
                    continue;
                };
                let Some(next_table) = rams[*row][self.col].get_next_table(result.hit_index, slot) else {
                    self.stats.discarded += 1;
                    tracing::warn!(lt, row, col = self.col, index = result.hit_index, "cannot read next table, hit discarded");
                    continue;
                };
                accepted = Some(ColumnHit {
                    lt,
                    row: *row,
                    col: self.col,
                    hit_index: result.hit_index,
                    slot,
                    priority: pri as u8,
                    next_table,
                    outer: false,
                });
                if !cfg.evaluate_all {
                    return Ok(accepted);
                }
            }
        }
        Ok(accepted)
    }

    /// Combines outer hits through the crossbar.
    fn handle_outer_hits(
        &mut self,
        lt: u8,
        cfg: &ColumnLtConfig,
        rows: &[(usize, RowLookup)],
        rams: &[Vec<MauSram>],
        flags: &ModelFlags,
    ) -> ModelResult<Option<ColumnHit>> {
        self.outer_evaluations += 1;
        self.reverse_hitmap = [0; HIT_PRIORITIES];
        for (row, result) in rows {
            for pri in 0..OUTER_PRIORITIES {
                if !result.has(pri) {
                    continue;
                }
                if let Some(output) = cfg.hitmap.get(*row).and_then(|m| m[pri]) {
                    self.reverse_hitmap[usize::from(output)] |= input_bit(*row, pri);
                }
            }
        }
        for (output, (&seen, &expected)) in self.reverse_hitmap.iter().zip(&cfg.expected).enumerate() {
            let stray = seen & !expected;
            if stray != 0 {
                config_check(
                    flags.relax_hitmap_check,
                    "mau::sram_column",
                    format!(
                        "lt {lt} column {} output {output} reached by unexpected inputs {stray:#x}",
                        self.col
                    ),
                )?;
            }
        }
        for output in (0..HIT_PRIORITIES).rev() {
            let expected = cfg.expected[output];
            if expected == 0 || self.reverse_hitmap[output] != expected {
                continue;
            }
            let top = 31 - expected.leading_zeros() as usize;
            let (row, pri) = (top / OUTER_PRIORITIES, top % OUTER_PRIORITIES);
            let Some((_, result)) = rows.iter().find(|(r, _)| *r == row) else {
                continue;
            };
            let Some(slot) = result.matched[pri] else {
                continue;
            };
            let Some(next_table) = rams[row][self.col].get_next_table(result.hit_index, slot) else {
                self.stats.discarded += 1;
                tracing::warn!(lt, row, col = self.col, "cannot read next table for outer hit");
                continue;
            };
            return Ok(Some(ColumnHit {
                lt,
                row,
                col: self.col,
                hit_index: result.hit_index,
                slot,
                priority: output as u8,
                next_table,
                outer: true,
            }));
        }
        Ok(None)
    }

    /// Drops every table configuration and counter.
    pub fn reset(&mut self) {
        self.lt_cfg.fill(None);
        self.reverse_hitmap = [0; HIT_PRIORITIES];
        self.outer_evaluations = 0;
        self.stats = ColumnStats::default();
    }
}
