//! Packet header vector.

use std::collections::BTreeMap;

use serde::Serialize;

/// Header and metadata fields carried through the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum PhvField {
    /// Port the packet arrived on.
    IngressPort,
    /// Port chosen by the match-action pipeline.
    EgressPort,
    /// Ethernet destination MAC (48 bits).
    EthDst,
    /// Ethernet source MAC (48 bits).
    EthSrc,
    /// Ethertype.
    EthType,
}

impl PhvField {
    /// Width of the field in bits.
    pub const fn width(self) -> u32 {
        match self {
            Self::IngressPort | Self::EgressPort => 9,
            Self::EthDst | Self::EthSrc => 48,
            Self::EthType => 16,
        }
    }
}

/// Field values of one packet.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Phv {
    fields: BTreeMap<PhvField, u64>,
}

impl Phv {
    /// Creates an empty PHV.
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of `field`, if set.
    pub fn get(&self, field: PhvField) -> Option<u64> {
        self.fields.get(&field).copied()
    }

    /// Sets `field`, truncated to its width.
    pub fn set(&mut self, field: PhvField, value: u64) {
        let _ = self
            .fields
            .insert(field, value & crate::common::mask64(field.width()));
    }

    /// Removes `field`.
    pub fn remove(&mut self, field: PhvField) -> Option<u64> {
        self.fields.remove(&field)
    }

    /// Returns `true` when `field` is set.
    pub fn contains(&self, field: PhvField) -> bool {
        self.fields.contains_key(&field)
    }

    /// Iterates over the set fields in field order.
    pub fn iter(&self) -> impl Iterator<Item = (PhvField, u64)> + '_ {
        self.fields.iter().map(|(f, v)| (*f, *v))
    }
}
