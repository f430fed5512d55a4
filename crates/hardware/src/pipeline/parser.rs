//! Packet parsers.

use thiserror::Error;

use crate::pipeline::phv::{Phv, PhvField};

/// Length of an untagged Ethernet header.
pub const ETH_HEADER_LEN: usize = 14;

/// Reasons a packet fails to parse.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The packet ends inside a header.
    #[error("packet truncated: need {need} bytes, got {got}")]
    Truncated {
        /// Bytes the header needs.
        need: usize,
        /// Bytes available.
        got: usize,
    },
}

/// Extracts header fields from a packet into a PHV.
pub trait Parser {
    /// Parses `packet` received on `ingress_port`.
    ///
    /// # Returns
    ///
    /// The PHV and the offset where the payload starts.
    fn parse(&self, packet: &[u8], ingress_port: u16) -> Result<(Phv, usize), ParseError>;
}

fn be(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0, |acc, b| (acc << 8) | u64::from(*b))
}

/// Parser for untagged Ethernet frames.
#[derive(Clone, Copy, Debug, Default)]
pub struct EthernetParser;

impl Parser for EthernetParser {
    fn parse(&self, packet: &[u8], ingress_port: u16) -> Result<(Phv, usize), ParseError> {
        if packet.len() < ETH_HEADER_LEN {
            return Err(ParseError::Truncated {
                need: ETH_HEADER_LEN,
                got: packet.len(),
            });
        }
        let mut phv = Phv::new();
        phv.set(PhvField::IngressPort, u64::from(ingress_port));
        phv.set(PhvField::EthDst, be(&packet[0..6]));
        phv.set(PhvField::EthSrc, be(&packet[6..12]));
        phv.set(PhvField::EthType, be(&packet[12..14]));
        tracing::trace!(ingress_port, len = packet.len(), "parsed ethernet header");
        Ok((phv, ETH_HEADER_LEN))
    }
}
