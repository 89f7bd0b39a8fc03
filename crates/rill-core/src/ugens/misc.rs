//! Noise, knob readers and gremlin zapping.

use std::sync::Arc;

use crate::arg::Arg;
use crate::control::Knob;
use crate::ugen::{Context, SampleConfig, UGen, UGenError};

const DEFAULT_SEED: u64 = 0x9E37_79B9_7F4A_7C15;

/// Deterministic white noise in `[-1, 1)` (xorshift64*).
#[derive(Debug, Clone)]
pub struct Noise {
    state: u64,
}

impl Noise {
    /// Creates a generator; a zero seed is replaced by a fixed non-zero one.
    pub fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { DEFAULT_SEED } else { seed },
        }
    }

    /// Builds from `[seed?]`.
    pub fn from_args(args: &[Arg]) -> Result<Self, UGenError> {
        match args.first() {
            None => Ok(Self::new(DEFAULT_SEED)),
            Some(Arg::Int(seed)) => Ok(Self::new(*seed as u64)),
            Some(other) => Err(UGenError::InvalidArgument(format!(
                "noise seed must be an integer, got {other}"
            ))),
        }
    }

    #[inline]
    fn next(&mut self) -> f64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        let bits = x.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 11;
        (bits as f64 / (1u64 << 53) as f64) * 2.0 - 1.0
    }
}

impl UGen for Noise {
    fn generate(&mut self, _ctx: &Context, _cfg: &SampleConfig<'_>, out: &mut [f64]) {
        for o in out.iter_mut() {
            *o = self.next();
        }
    }
}

/// Emits the current value of a [`Knob`] for the whole block.
#[derive(Debug, Clone)]
pub struct KnobReader {
    knob: Arc<Knob>,
}

impl KnobReader {
    /// Reads from `knob`.
    pub fn new(knob: Arc<Knob>) -> Self {
        Self { knob }
    }
}

impl UGen for KnobReader {
    fn generate(&mut self, _ctx: &Context, _cfg: &SampleConfig<'_>, out: &mut [f64]) {
        out.fill(self.knob.get());
    }
}

/// Replaces denormal-range, huge and non-finite values with zero.
#[inline]
pub fn zap_gremlins(x: f64) -> f64 {
    let a = x.abs();
    if a > 1e-15 && a < 1e15 { x } else { 0.0 }
}

/// Passes `in` (or `$0`) through [`zap_gremlins`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Zap;

impl UGen for Zap {
    fn generate(&mut self, _ctx: &Context, cfg: &SampleConfig<'_>, out: &mut [f64]) {
        let input = cfg.inputs.get("in").or_else(|| cfg.inputs.get("$0"));
        match input {
            Some(input) => {
                for (o, &x) in out.iter_mut().zip(input) {
                    *o = zap_gremlins(x);
                }
            }
            None => out.fill(0.0),
        }
    }
}
