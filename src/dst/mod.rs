//! DST - Deterministic Simulation Testing primitives
//!
//! `TigerStyle`: Single seed controls all randomness; time only moves when
//! a test advances it. Every time-dependent or random decision in the crate
//! goes through these two types so that the same seed and the same clock
//! script reproduce the same behavior bit-for-bit.

mod clock;
mod rng;

pub use clock::SimClock;
pub use rng::DeterministicRng;
