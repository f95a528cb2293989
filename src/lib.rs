//! Audio impulse analysis for driving a networked light.
//!
//! Decoded audio is turned into per-band impulse series
//! ([`analysis`]) or onset events from a pluggable engine ([`detect`]).
//! Long computations run on per-kind background workers ([`jobs`]), and a
//! playhead-driven dispatcher turns impulses into debounced brightness
//! pulses ([`dispatch`]).

pub mod analysis;
pub mod audio;
pub mod detect;
pub mod dispatch;
pub mod error;
pub mod jobs;
pub mod progress;
