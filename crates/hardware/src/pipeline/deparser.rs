//! Packet deparsers.

use thiserror::Error;

use crate::pipeline::phv::{Phv, PhvField};

/// Reasons a PHV fails to deparse.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum DeparseError {
    /// A header field the deparser emits is not set.
    #[error("PHV field {0:?} not set")]
    MissingField(PhvField),
}

/// Rebuilds a packet from a PHV and the original payload.
pub trait Deparser {
    /// Emits headers from `phv` followed by `payload`.
    fn deparse(&self, phv: &Phv, payload: &[u8]) -> Result<Vec<u8>, DeparseError>;
}

/// Deparser for untagged Ethernet frames.
#[derive(Clone, Copy, Debug, Default)]
pub struct EthernetDeparser;

impl Deparser for EthernetDeparser {
    fn deparse(&self, phv: &Phv, payload: &[u8]) -> Result<Vec<u8>, DeparseError> {
        let field = |f| phv.get(f).ok_or(DeparseError::MissingField(f));
        let mut out = Vec::with_capacity(14 + payload.len());
        out.extend_from_slice(&field(PhvField::EthDst)?.to_be_bytes()[2..]);
        out.extend_from_slice(&field(PhvField::EthSrc)?.to_be_bytes()[2..]);
        out.extend_from_slice(&field(PhvField::EthType)?.to_be_bytes()[6..]);
        out.extend_from_slice(payload);
        Ok(out)
    }
}
