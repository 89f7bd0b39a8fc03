//! Built-in unit generators.
//!
//! The scheduler itself depends only on [`Constant`] (for silent graphs) and
//! [`OutMix`] (for sinks). The rest are ordinary UGens that the registry
//! exposes by name.

mod math;
mod misc;
mod osc;
mod out_mix;

pub use math::{Constant, Product, Sum};
pub use misc::{KnobReader, Noise, Zap, zap_gremlins};
pub use osc::{DEFAULT_FREQUENCY, Oscillator, Shape};
pub use out_mix::OutMix;
