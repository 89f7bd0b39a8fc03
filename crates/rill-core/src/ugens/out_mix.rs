//! Sink mixer injected for `out` nodes.

use crate::ugen::{Context, SampleConfig, UGen};

/// Sums every connected input into one channel of the tick's output.
///
/// `out` nodes never run a user constructor; the scheduler installs one of
/// these with the node's channel index instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutMix {
    channel: usize,
}

impl OutMix {
    /// Creates a mixer for `channel`.
    pub fn new(channel: usize) -> Self {
        Self { channel }
    }

    /// Output channel this mixer feeds.
    pub fn channel(&self) -> usize {
        self.channel
    }
}

impl UGen for OutMix {
    fn generate(&mut self, _ctx: &Context, cfg: &SampleConfig<'_>, out: &mut [f64]) {
        out.fill(0.0);
        for (_, input) in cfg.inputs.iter() {
            for (o, &x) in out.iter_mut().zip(input) {
                *o += x;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ugen::Inputs;

    #[test]
    fn test_single_input_passes_through() {
        let a = [0.5; 8];
        let inputs: Inputs<'_> = [("in", &a[..])].into_iter().collect();
        let mut out = [9.0; 8];
        OutMix::new(0).generate(&Context::default(), &SampleConfig::new(48000, inputs), &mut out);
        assert_eq!(out, [0.5; 8]);
    }

    #[test]
    fn test_mixes_all_ports() {
        let a = [0.5; 4];
        let b = [0.25; 4];
        let inputs: Inputs<'_> = [("in", &a[..]), ("$0", &b[..])].into_iter().collect();
        let mut out = [0.0; 4];
        OutMix::new(1).generate(&Context::default(), &SampleConfig::new(48000, inputs), &mut out);
        assert_eq!(out, [0.75; 4]);
    }

    #[test]
    fn test_no_inputs_is_silence() {
        let mut out = [1.0; 4];
        OutMix::new(0).generate(
            &Context::default(),
            &SampleConfig::new(48000, Inputs::new()),
            &mut out,
        );
        assert_eq!(out, [0.0; 4]);
    }
}
