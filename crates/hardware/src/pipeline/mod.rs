//! Packet parsing and deparsing at the interface level.
//!
//! Parsers turn a packet into a `Phv`; deparsers rebuild the packet after the
//! match-action stages have updated it. Only untagged Ethernet is modelled.

/// Deparser trait and the Ethernet deparser.
pub mod deparser;

/// Parser trait and the Ethernet parser.
pub mod parser;

/// Packet header vector.
pub mod phv;

pub use deparser::{DeparseError, Deparser, EthernetDeparser};
pub use parser::{EthernetParser, ParseError, Parser};
pub use phv::{Phv, PhvField};
