//! Model activity statistics.
//!
//! Every stage keeps a `ModelStats` block; `sim::Simulation::stats` sums them.
//! It provides:
//! 1. **Match:** SRAM and TCAM lookups and hits.
//! 2. **Resources:** Stats, meter and idletime updates.
//! 3. **Control:** Instructions, table moves and notifications.
//! 4. **Errors:** Rejected accesses and suppressed hits.

use std::fmt::Write as _;
use std::ops::AddAssign;

use serde::Serialize;

/// Activity counters of one stage (or of a whole simulation when summed).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ModelStats {
    /// SRAM exact-match lookups.
    pub sram_lookups: u64,
    /// SRAM exact-match hits.
    pub sram_hits: u64,
    /// TCAM lookups.
    pub tcam_lookups: u64,
    /// TCAM hits.
    pub tcam_hits: u64,

    /// Stats counter updates applied at EOP.
    pub stats_updates: u64,
    /// Meter ALU accesses (including sweeps).
    pub meter_updates: u64,
    /// Meter accesses that produced red.
    pub meter_red: u64,
    /// Idletime entries that timed out.
    pub idle_timeouts: u64,

    /// Instruction-bus words handled.
    pub instrs: u64,
    /// Table-move pushes and pops accepted.
    pub moves: u64,
    /// Notifications produced.
    pub notifications: u64,

    /// Register reads and writes.
    pub reg_accesses: u64,
    /// Indirect memory reads and writes.
    pub mem_accesses: u64,
    /// Accesses rejected by the allow-bad policy.
    pub bad_accesses: u64,
}

impl AddAssign for ModelStats {
    fn add_assign(&mut self, rhs: Self) {
        self.sram_lookups += rhs.sram_lookups;
        self.sram_hits += rhs.sram_hits;
        self.tcam_lookups += rhs.tcam_lookups;
        self.tcam_hits += rhs.tcam_hits;
        self.stats_updates += rhs.stats_updates;
        self.meter_updates += rhs.meter_updates;
        self.meter_red += rhs.meter_red;
        self.idle_timeouts += rhs.idle_timeouts;
        self.instrs += rhs.instrs;
        self.moves += rhs.moves;
        self.notifications += rhs.notifications;
        self.reg_accesses += rhs.reg_accesses;
        self.mem_accesses += rhs.mem_accesses;
        self.bad_accesses += rhs.bad_accesses;
    }
}

/// Section names for selective stats output.
///
/// Valid section identifiers: `"match"`, `"resources"`, `"control"`, `"errors"`.
/// Pass an empty slice to `render_sections` to render all sections.
pub const STATS_SECTIONS: &[&str] = &["match", "resources", "control", "errors"];

impl ModelStats {
    /// Renders the requested sections as a text report.
    ///
    /// # Arguments
    ///
    /// * `sections` - Section names to include, or empty for all.
    pub fn render_sections(&self, sections: &[String]) -> String {
        let want = |s: &str| sections.is_empty() || sections.iter().any(|x| x == s);
        let rate = |hits: u64, total: u64| {
            if total > 0 {
                (hits as f64 / total as f64) * 100.0
            } else {
                0.0
            }
        };
        let mut out = String::new();
        let _ = writeln!(out, "==========================================================");
        let _ = writeln!(out, "MAU MODEL STATISTICS");
        let _ = writeln!(out, "==========================================================");
        if want("match") {
            let _ = writeln!(out, "MATCH");
            let _ = writeln!(
                out,
                "  sram.lookups           {} (hit rate {:.2}%)",
                self.sram_lookups,
                rate(self.sram_hits, self.sram_lookups)
            );
            let _ = writeln!(
                out,
                "  tcam.lookups           {} (hit rate {:.2}%)",
                self.tcam_lookups,
                rate(self.tcam_hits, self.tcam_lookups)
            );
            let _ = writeln!(out, "----------------------------------------------------------");
        }
        if want("resources") {
            let _ = writeln!(out, "RESOURCES");
            let _ = writeln!(out, "  stats.updates          {}", self.stats_updates);
            let _ = writeln!(
                out,
                "  meter.updates          {} (red {:.2}%)",
                self.meter_updates,
                rate(self.meter_red, self.meter_updates)
            );
            let _ = writeln!(out, "  idle.timeouts          {}", self.idle_timeouts);
            let _ = writeln!(out, "----------------------------------------------------------");
        }
        if want("control") {
            let _ = writeln!(out, "CONTROL");
            let _ = writeln!(out, "  instrs                 {}", self.instrs);
            let _ = writeln!(out, "  moves                  {}", self.moves);
            let _ = writeln!(out, "  notifications          {}", self.notifications);
            let _ = writeln!(out, "----------------------------------------------------------");
        }
        if want("errors") {
            let _ = writeln!(out, "ACCESSES");
            let _ = writeln!(out, "  reg.accesses           {}", self.reg_accesses);
            let _ = writeln!(out, "  mem.accesses           {}", self.mem_accesses);
            let _ = writeln!(out, "  bad.accesses           {}", self.bad_accesses);
        }
        let _ = writeln!(out, "==========================================================");
        out
    }

    /// Renders all sections.
    pub fn render(&self) -> String {
        self.render_sections(&[])
    }
}
