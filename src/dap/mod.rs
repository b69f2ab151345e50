//! DAP wire surface: message envelopes and the framed transport.

pub mod protocol;
pub mod transport;
