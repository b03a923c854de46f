//! Reliable-UDP protocol primitives.
//!
//! This module houses constants, the bit-level encoding helpers, delivery
//! modes and connection state values used by the higher-level session and
//! transport layers.

pub mod constants;
pub mod packet;
pub mod reliability;
pub mod state;
pub mod types;
