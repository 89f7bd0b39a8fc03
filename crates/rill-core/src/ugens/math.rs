//! Constant, sum and product generators.

use crate::arg::Arg;
use crate::ugen::{Context, SampleConfig, UGen, UGenError};

/// Fills every block with a fixed value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Constant {
    value: f64,
}

impl Constant {
    /// Creates a constant generator.
    pub fn new(value: f64) -> Self {
        Self { value }
    }

    /// Builds from `[value]`.
    pub fn from_args(args: &[Arg]) -> Result<Self, UGenError> {
        args.first()
            .and_then(Arg::as_f64)
            .map(Self::new)
            .ok_or_else(|| UGenError::InvalidArgument("const expects a numeric value".into()))
    }

    /// The emitted value.
    pub fn value(&self) -> f64 {
        self.value
    }
}

impl UGen for Constant {
    fn generate(&mut self, _ctx: &Context, _cfg: &SampleConfig<'_>, out: &mut [f64]) {
        out.fill(self.value);
    }
}

/// Per-sample sum of every `$k` input; zeros when none are connected.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sum;

impl UGen for Sum {
    fn generate(&mut self, _ctx: &Context, cfg: &SampleConfig<'_>, out: &mut [f64]) {
        out.fill(0.0);
        for (_, input) in cfg.inputs.indexed() {
            for (o, &x) in out.iter_mut().zip(input) {
                *o += x;
            }
        }
    }
}

/// Per-sample product of every `$k` input; ones when none are connected.
#[derive(Debug, Clone, Copy, Default)]
pub struct Product;

impl UGen for Product {
    fn generate(&mut self, _ctx: &Context, cfg: &SampleConfig<'_>, out: &mut [f64]) {
        out.fill(1.0);
        for (_, input) in cfg.inputs.indexed() {
            for (o, &x) in out.iter_mut().zip(input) {
                *o *= x;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ugen::Inputs;

    fn run(ugen: &mut dyn UGen, inputs: Inputs<'_>) -> Vec<f64> {
        let mut out = vec![f64::NAN; 4];
        ugen.generate(&Context::default(), &SampleConfig::new(48000, inputs), &mut out);
        out
    }

    #[test]
    fn test_constant_fills() {
        assert_eq!(run(&mut Constant::new(0.5), Inputs::new()), vec![0.5; 4]);
    }

    #[test]
    fn test_constant_from_args() {
        assert_eq!(Constant::from_args(&[Arg::Int(2)]).unwrap().value(), 2.0);
        assert!(matches!(
            Constant::from_args(&[Arg::from("x")]),
            Err(UGenError::InvalidArgument(_))
        ));
        assert!(Constant::from_args(&[]).is_err());
    }

    #[test]
    fn test_sum_and_product_of_nothing() {
        assert_eq!(run(&mut Sum, Inputs::new()), vec![0.0; 4]);
        assert_eq!(run(&mut Product, Inputs::new()), vec![1.0; 4]);
    }

    #[test]
    fn test_sum_ignores_named_ports() {
        let a = [0.25; 4];
        let b = [-0.1; 4];
        let c = [100.0; 4];
        let inputs: Inputs<'_> = [("$0", &a[..]), ("$1", &b[..]), ("in", &c[..])]
            .into_iter()
            .collect();
        let out = run(&mut Sum, inputs);
        for s in out {
            assert!((s - 0.15).abs() < 1e-12);
        }
    }

    #[test]
    fn test_product() {
        let a = [0.5, 1.0, 2.0, 0.0];
        let b = [4.0, 3.0, 2.0, 1.0];
        let inputs: Inputs<'_> = [("$0", &a[..]), ("$3", &b[..])].into_iter().collect();
        assert_eq!(run(&mut Product, inputs), vec![2.0, 3.0, 4.0, 0.0]);
    }
}
