//! Phase-accumulator oscillators.
//!
//! All shapes share one accumulator `φ ∈ [0, 1)` advanced by `w / sample_rate`
//! per sample.
//!
//! | Port     | Meaning                                             |
//! |----------|-----------------------------------------------------|
//! | `w`      | Frequency in Hz, per sample. Defaults to first arg. |
//! | `iphase` | Initial phase, read once on the first block.        |
//! | `sync`   | Phase resets to 0 on a falling edge.                |
//! | `dc`     | Duty cycle for [`Shape::Square`] (default 0.5).     |

use std::f64::consts::TAU;

use crate::arg::{Arg, number_or};
use crate::ugen::{Context, SampleConfig, UGen, UGenError};

/// Frequency used when neither the `w` port nor an argument supplies one.
pub const DEFAULT_FREQUENCY: f64 = 440.0;

/// Waveform produced by an [`Oscillator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// `sin(2πφ)`
    Sine,
    /// `2φ - 1`
    Saw,
    /// `+1` while `φ < duty`, else `-1`
    Square,
    /// `φ`
    Phasor,
}

impl Shape {
    #[inline]
    fn sample(self, phase: f64, duty: f64) -> f64 {
        match self {
            Shape::Sine => (TAU * phase).sin(),
            Shape::Saw => 2.0 * phase - 1.0,
            Shape::Square => {
                if phase < duty {
                    1.0
                } else {
                    -1.0
                }
            }
            Shape::Phasor => phase,
        }
    }
}

/// Band-unlimited oscillator with sync and phase inputs.
#[derive(Debug, Clone)]
pub struct Oscillator {
    shape: Shape,
    frequency: f64,
    phase: f64,
    last_sync: f64,
    primed: bool,
}

impl Oscillator {
    /// Creates an oscillator with a fixed default frequency.
    pub fn new(shape: Shape, frequency: f64) -> Self {
        Self {
            shape,
            frequency,
            phase: 0.0,
            last_sync: 0.0,
            primed: false,
        }
    }

    /// Builds from `[frequency?]`.
    pub fn from_args(shape: Shape, args: &[Arg]) -> Result<Self, UGenError> {
        if let Some(arg) = args.first()
            && arg.as_f64().is_none()
        {
            return Err(UGenError::InvalidArgument(format!(
                "oscillator frequency must be numeric, got {arg}"
            )));
        }
        Ok(Self::new(shape, number_or(args, 0, DEFAULT_FREQUENCY)))
    }

    /// Current accumulator value.
    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Waveform.
    pub fn shape(&self) -> Shape {
        self.shape
    }
}

impl UGen for Oscillator {
    fn generate(&mut self, _ctx: &Context, cfg: &SampleConfig<'_>, out: &mut [f64]) {
        let ws = cfg.inputs.get("w");
        let syncs = cfg.inputs.get("sync");
        let duties = cfg.inputs.get("dc");

        if !self.primed {
            self.primed = true;
            if let Some(&initial) = cfg.inputs.get("iphase").and_then(|p| p.first()) {
                self.phase = initial - initial.floor();
            }
        }

        let sample_rate = f64::from(cfg.sample_rate.max(1));
        for (i, o) in out.iter_mut().enumerate() {
            let duty = duties.and_then(|d| d.get(i)).copied().unwrap_or(0.5);
            *o = self.shape.sample(self.phase, duty);

            let w = ws.and_then(|w| w.get(i)).copied().unwrap_or(self.frequency);
            self.phase += w / sample_rate;
            self.phase -= self.phase.floor();

            if let Some(&s) = syncs.and_then(|s| s.get(i)) {
                if s < self.last_sync {
                    self.phase = 0.0;
                }
                self.last_sync = s;
            }
        }
    }
}
