//! Spectral analysis and band decomposition.
//!
//! Samples become a [`SpectralSequence`] (one magnitude spectrum per hop),
//! which [`decompose`] splits into per-band magnitude, derivative and
//! impulse-strength series.

pub mod bands;
pub mod derivative;
pub mod impulse;
pub mod level;
pub mod spectrum;

pub use bands::{decompose, default_catalog, BandDescriptor, BandSeries, DecomposeConfig};
pub use derivative::DerivativeMode;
pub use impulse::{Impulse, ImpulseConfig};
pub use level::{to_db, NoiseGate, DB_FLOOR};
pub use spectrum::{analyze, frame_count, SpectralSequence, SpectrumConfig, WindowFunction};
