//! # Packet Interface Tests
