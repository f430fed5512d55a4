//! Configuration system for the switch pipeline model.
//!
//! This module defines all configuration structures used to parameterize the model.
//! It provides:
//! 1. **Defaults:** Baseline chip geometry (pipes, stages, RAM grids, ALU counts).
//! 2. **Chip descriptor:** A capability descriptor selected by chip family and
//!    injected into every stage at construction, replacing per-chip recompilation.
//! 3. **Policy flags:** The `allow_bad_*` and `relax_*` switches that decide whether
//!    an inconsistency is tolerated, warned about, or fatal.
//! 4. **Loading:** JSON via `Config::from_json_str` / `Config::from_file`.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::common::constants::{PIPE_WIDTH, STAGE_WIDTH};
use crate::mau::meter::layout as meter_layout;

/// Default configuration constants for the model.
///
/// These values describe the baseline (Tofino) chip when a configuration does not
/// override them.
mod defaults {
    /// Pipes per chip.
    pub const PIPES: usize = 4;

    /// MAU stages per pipe.
    pub const STAGES: usize = 12;

    /// MAU stages per pipe on second-generation chips.
    pub const STAGES_GEN2: usize = 20;

    /// SRAM rows per stage.
    pub const SRAM_ROWS: usize = 8;

    /// SRAM columns per row.
    pub const SRAM_COLS: usize = 12;

    /// Words per SRAM (and per mapram).
    pub const SRAM_ENTRIES: usize = 1024;

    /// TCAM rows per stage.
    pub const TCAM_ROWS: usize = 12;

    /// TCAM columns per stage.
    pub const TCAM_COLS: usize = 2;

    /// Entries per TCAM.
    pub const TCAM_ENTRIES: usize = 512;

    /// Logical tables per stage.
    pub const LOGICAL_TABLES: usize = 16;

    /// Meter ALUs per stage (one per SRAM row pair).
    pub const METER_ALUS: usize = 4;

    /// Width of a signed meter bucket level.
    pub const METER_LEVEL_WIDTH: u32 = 23;

    /// Width of a meter timestamp.
    pub const METER_TIMESTAMP_WIDTH: u32 = 28;
}

/// Chip families the descriptor presets cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub enum ChipFamily {
    /// First-generation chip, A0 silicon: coupled meter bucket timing.
    #[default]
    Tofino,
    /// First-generation chip, B0 silicon: decoupled meter bucket timing.
    #[serde(alias = "TofinoB")]
    TofinoB0,
    /// Second-generation chip.
    Tofino2,
}

/// Optional capability features that differ across families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct ChipFeatures {
    /// The chip-specific instruction space carries an idletime sweep instruction.
    #[serde(default)]
    pub idle_sweep_instr: bool,

    /// Meter buckets credit with independent exponents unless the legacy mode is forced.
    #[serde(default)]
    pub decoupled_meter_timing: bool,
}

/// Chip capability descriptor: bit-widths, table counts and feature flags.
///
/// Built once from `ChipConfig` and shared (by reference) with every stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChipDescriptor {
    /// Family the descriptor was derived from.
    pub family: ChipFamily,
    /// Pipes per chip.
    pub pipes: usize,
    /// MAU stages per pipe.
    pub stages: usize,
    /// SRAM rows per stage.
    pub sram_rows: usize,
    /// SRAM columns per row.
    pub sram_cols: usize,
    /// Words per SRAM and per mapram.
    pub sram_entries: usize,
    /// TCAM rows per stage.
    pub tcam_rows: usize,
    /// TCAM columns per stage.
    pub tcam_cols: usize,
    /// Entries per TCAM.
    pub tcam_entries: usize,
    /// Logical tables per stage.
    pub logical_tables: usize,
    /// Meter ALUs per stage.
    pub meter_alus: usize,
    /// Width of a signed meter bucket level.
    pub meter_level_width: u32,
    /// Width of a meter timestamp.
    pub meter_timestamp_width: u32,
    /// Feature switches.
    pub features: ChipFeatures,
}

impl ChipDescriptor {
    /// Returns the preset descriptor for a chip family.
    pub fn for_family(family: ChipFamily) -> Self {
        let base = Self {
            family,
            pipes: defaults::PIPES,
            stages: defaults::STAGES,
            sram_rows: defaults::SRAM_ROWS,
            sram_cols: defaults::SRAM_COLS,
            sram_entries: defaults::SRAM_ENTRIES,
            tcam_rows: defaults::TCAM_ROWS,
            tcam_cols: defaults::TCAM_COLS,
            tcam_entries: defaults::TCAM_ENTRIES,
            logical_tables: defaults::LOGICAL_TABLES,
            meter_alus: defaults::METER_ALUS,
            meter_level_width: defaults::METER_LEVEL_WIDTH,
            meter_timestamp_width: defaults::METER_TIMESTAMP_WIDTH,
            features: ChipFeatures::default(),
        };
        match family {
            ChipFamily::Tofino => base,
            ChipFamily::TofinoB0 => Self {
                features: ChipFeatures {
                    decoupled_meter_timing: true,
                    ..base.features
                },
                ..base
            },
            ChipFamily::Tofino2 => Self {
                stages: defaults::STAGES_GEN2,
                features: ChipFeatures {
                    idle_sweep_instr: true,
                    decoupled_meter_timing: true,
                },
                ..base
            },
        }
    }

    /// Builds the descriptor for a configuration: the family preset plus overrides.
    ///
    /// Overrides are checked against what the PBUS address and the meter word
    /// can represent: pipes and stages must be addressable and bucket levels
    /// must fit their word fields.
    pub fn from_config(cfg: &ChipConfig) -> Result<Self, ConfigError> {
        let mut chip = Self::for_family(cfg.family);
        if let Some(pipes) = cfg.pipes {
            chip.pipes = pipes;
        }
        if let Some(stages) = cfg.stages {
            chip.stages = stages;
        }
        if let Some(level_width) = cfg.meter_level_width {
            chip.meter_level_width = level_width;
        }
        if let Some(features) = cfg.features {
            chip.features = features;
        }
        chip.validate()?;
        Ok(chip)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let max_pipes = 1usize << PIPE_WIDTH;
        if self.pipes == 0 || self.pipes > max_pipes {
            return Err(ConfigError::Invalid {
                field: "chip.pipes",
                detail: format!("{} not in 1..={max_pipes}", self.pipes),
            });
        }
        let max_stages = 1usize << STAGE_WIDTH;
        if self.stages == 0 || self.stages > max_stages {
            return Err(ConfigError::Invalid {
                field: "chip.stages",
                detail: format!("{} not in 1..={max_stages}", self.stages),
            });
        }
        if self.meter_level_width == 0 || self.meter_level_width > meter_layout::LEVEL_WIDTH {
            return Err(ConfigError::Invalid {
                field: "chip.meter_level_width",
                detail: format!("{} not in 1..={}", self.meter_level_width, meter_layout::LEVEL_WIDTH),
            });
        }
        Ok(())
    }
}

/// Chip section of the configuration: a family and optional overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChipConfig {
    /// Chip family preset.
    #[serde(default)]
    pub family: ChipFamily,
    /// Override for the number of pipes.
    #[serde(default)]
    pub pipes: Option<usize>,
    /// Override for the number of stages per pipe.
    #[serde(default)]
    pub stages: Option<usize>,
    /// Override for the meter bucket level width.
    #[serde(default)]
    pub meter_level_width: Option<u32>,
    /// Override for the whole feature block.
    #[serde(default)]
    pub features: Option<ChipFeatures>,
}

/// Allow/relax policy flags.
///
/// `allow_bad_*` flags tolerate accesses that fail address decode (used when
/// calibrating against permissive hardware configurations). `relax_*` flags demote
/// consistency checks that are fatal by default to warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct ModelFlags {
    /// Tolerate addresses whose top-level fields (type, pipe, stage) do not decode.
    #[serde(default)]
    pub allow_bad_type: bool,
    /// Tolerate undecodable instruction-bus words.
    #[serde(default)]
    pub allow_bad_instr: bool,
    /// Tolerate reads of unknown registers.
    #[serde(default)]
    pub allow_bad_reg_read: bool,
    /// Tolerate writes of unknown registers.
    #[serde(default)]
    pub allow_bad_reg_write: bool,
    /// Tolerate bad physical memory reads.
    #[serde(default)]
    pub allow_bad_phys_read: bool,
    /// Tolerate bad physical memory writes.
    #[serde(default)]
    pub allow_bad_phys_write: bool,
    /// Tolerate bad virtual memory reads.
    #[serde(default)]
    pub allow_bad_virt_read: bool,
    /// Tolerate bad virtual memory writes.
    #[serde(default)]
    pub allow_bad_virt_write: bool,
    /// Hits on several rows of one column are a warning instead of fatal.
    #[serde(default)]
    pub relax_multi_row_hit_check: bool,
    /// Hits in several columns for one logical table are a warning instead of fatal.
    #[serde(default)]
    pub relax_multi_col_hit_check: bool,
    /// Log unwired next-table bus hits at `warn` instead of `error`. The hit is dropped either way.
    #[serde(default)]
    pub relax_nxtab_bus_check: bool,
    /// Outer-hit crossbar inputs outside an output's expected set are a warning
    /// instead of fatal.
    #[serde(default)]
    pub relax_hitmap_check: bool,
    /// Move-register MISS-address collisions are a warning instead of fatal.
    #[serde(default)]
    pub relax_moveregs_check: bool,
    /// Force (`Some(true)`) or disable (`Some(false)`) the legacy coupled meter
    /// bucket timing; `None` follows the chip family.
    #[serde(default)]
    pub meter_sat_coupled: Option<bool>,
}

impl ModelFlags {
    /// Resolves the coupled meter timing switch against the chip features.
    pub fn meter_coupled(&self, chip: &ChipDescriptor) -> bool {
        self.meter_sat_coupled
            .unwrap_or(!chip.features.decoupled_meter_timing)
    }
}

/// Periodic background sweeps run by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct SweepConfig {
    /// Cycles between meter sweeps; `None` disables the sweep task.
    #[serde(default)]
    pub meter_interval: Option<u64>,
    /// Cycles between idletime sweeps; `None` disables the sweep task.
    #[serde(default)]
    pub idle_interval: Option<u64>,
}

/// Diagnostic output settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct LogConfig {
    /// Record notable events as JSON lines in the simulation's event log.
    #[serde(default)]
    pub event_log: bool,
}

/// Errors raised while loading a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read configuration {path}: {source}")]
    Io {
        /// Path that failed.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The configuration text is not valid JSON for `Config`.
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
    /// A value parsed but the model cannot represent it.
    #[error("invalid {field}: {detail}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        detail: String,
    },
}

/// Root configuration structure containing all model settings.
///
/// # Examples
///
/// ```
/// use rmt_model::config::{ChipFamily, Config};
///
/// let config = Config::default();
/// assert_eq!(config.chip.family, ChipFamily::Tofino);
/// assert!(!config.flags.allow_bad_phys_read);
/// ```
///
/// Deserializing from JSON:
///
/// ```
/// use rmt_model::config::{ChipFamily, Config};
///
/// let json = r#"{
///     "chip": { "family": "Tofino2", "pipes": 2 },
///     "flags": { "relax_multi_row_hit_check": true, "meter_sat_coupled": true },
///     "sweep": { "meter_interval": 1000 }
/// }"#;
///
/// let config = Config::from_json_str(json).unwrap();
/// assert_eq!(config.chip.family, ChipFamily::Tofino2);
/// assert_eq!(config.chip.pipes, Some(2));
/// assert!(config.flags.relax_multi_row_hit_check);
/// assert_eq!(config.sweep.meter_interval, Some(1000));
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Chip family and geometry overrides.
    #[serde(default)]
    pub chip: ChipConfig,
    /// Allow/relax policy flags.
    #[serde(default)]
    pub flags: ModelFlags,
    /// Background sweep tasks.
    #[serde(default)]
    pub sweep: SweepConfig,
    /// Diagnostic output.
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Parses a configuration from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        let _ = config.chip_descriptor()?;
        Ok(config)
    }

    /// Reads and parses a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Returns the chip descriptor this configuration resolves to.
    pub fn chip_descriptor(&self) -> Result<ChipDescriptor, ConfigError> {
        ChipDescriptor::from_config(&self.chip)
    }
}
