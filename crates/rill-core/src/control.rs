//! Lock-free controls shared between host threads and the audio path.
//!
//! Hosts write; workers and the output stage read with a single atomic load.
//! Values are `f64` bit-cast into an `AtomicU64`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;

/// Master output gain, clamped to `[0, 1]`.
///
/// The runner hands out clones; the output stage ramps towards the latest
/// value once per block.
#[derive(Debug, Clone)]
pub struct GainControl {
    bits: Arc<AtomicU64>,
}

impl GainControl {
    /// Creates a control holding `initial` (clamped).
    pub fn new(initial: f64) -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(clamp_unit(initial).to_bits())),
        }
    }

    /// Sets the target gain. Values outside `[0, 1]` are clamped; NaN maps to 0.
    #[inline]
    pub fn set(&self, gain: f64) {
        self.bits
            .store(clamp_unit(gain).to_bits(), Ordering::Release);
    }

    /// Current target gain.
    #[inline]
    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
}

/// A named, range-limited control value.
#[derive(Debug)]
pub struct Knob {
    name: String,
    value: AtomicU64,
    min: f64,
    max: f64,
    default: f64,
}

impl Knob {
    fn new(name: &str, default: f64, min: f64, max: f64) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        let default = default.clamp(min, max);
        Self {
            name: name.to_string(),
            value: AtomicU64::new(default.to_bits()),
            min,
            max,
            default,
        }
    }

    /// Knob name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets the value, clamped to the knob's range.
    #[inline]
    pub fn set(&self, v: f64) {
        if v.is_nan() {
            return;
        }
        self.value
            .store(v.clamp(self.min, self.max).to_bits(), Ordering::Release);
    }

    /// Current value. Wait-free.
    #[inline]
    pub fn get(&self) -> f64 {
        f64::from_bits(self.value.load(Ordering::Acquire))
    }

    /// Lower bound.
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Upper bound.
    pub fn max(&self) -> f64 {
        self.max
    }

    /// Value the knob was declared with.
    pub fn default_value(&self) -> f64 {
        self.default
    }

    /// Restores the declared default.
    pub fn reset(&self) {
        self.set(self.default);
    }
}

/// Name-keyed set of knobs.
///
/// The map itself is published through [`ArcSwap`], so declaring a knob never
/// blocks a reader. UGens keep an `Arc<Knob>` and read it directly.
#[derive(Debug, Clone, Default)]
pub struct KnobBus {
    knobs: Arc<ArcSwap<HashMap<String, Arc<Knob>>>>,
}

impl KnobBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the knob called `name`, creating it if needed.
    ///
    /// Redeclaring an existing knob keeps its current value so that a graph
    /// swap does not reset a control the user has turned.
    pub fn declare(&self, name: &str, default: f64, min: f64, max: f64) -> Arc<Knob> {
        if let Some(existing) = self.get(name) {
            return existing;
        }
        let fresh = Arc::new(Knob::new(name, default, min, max));
        let mut winner = fresh.clone();
        self.knobs.rcu(|current| {
            let mut next = HashMap::clone(current);
            winner = next
                .entry(name.to_string())
                .or_insert_with(|| fresh.clone())
                .clone();
            next
        });
        winner
    }

    /// Looks up a knob by name.
    pub fn get(&self, name: &str) -> Option<Arc<Knob>> {
        self.knobs.load().get(name).cloned()
    }

    /// Sets a knob's value. Returns `false` if no such knob exists.
    pub fn set(&self, name: &str, value: f64) -> bool {
        match self.get(name) {
            Some(knob) => {
                knob.set(value);
                true
            }
            None => false,
        }
    }

    /// Names of all declared knobs, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.knobs.load().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of declared knobs.
    pub fn len(&self) -> usize {
        self.knobs.load().len()
    }

    /// Returns `true` if no knobs are declared.
    pub fn is_empty(&self) -> bool {
        self.knobs.load().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gain_clamps() {
        let gain = GainControl::new(2.0);
        assert_eq!(gain.get(), 1.0);
        gain.set(-0.5);
        assert_eq!(gain.get(), 0.0);
        gain.set(f64::NAN);
        assert_eq!(gain.get(), 0.0);
        gain.set(0.3);
        assert_eq!(gain.get(), 0.3);
    }

    #[test]
    fn test_gain_clones_share_state() {
        let gain = GainControl::new(0.25);
        let reader = gain.clone();
        gain.set(0.5);
        assert_eq!(reader.get(), 0.5);
    }

    #[test]
    fn test_knob_range() {
        let bus = KnobBus::new();
        let knob = bus.declare("cutoff", 1000.0, 20.0, 20000.0);
        knob.set(50000.0);
        assert_eq!(knob.get(), 20000.0);
        knob.reset();
        assert_eq!(knob.get(), 1000.0);
    }

    #[test]
    fn test_redeclare_keeps_value() {
        let bus = KnobBus::new();
        bus.declare("mix", 0.5, 0.0, 1.0);
        assert!(bus.set("mix", 0.9));
        let again = bus.declare("mix", 0.1, 0.0, 1.0);
        assert_eq!(again.get(), 0.9);
        assert_eq!(bus.len(), 1);
    }

    #[test]
    fn test_set_unknown_knob() {
        let bus = KnobBus::new();
        assert!(!bus.set("nope", 1.0));
        assert!(bus.is_empty());
    }

    #[test]
    fn test_names_sorted() {
        let bus = KnobBus::new();
        bus.declare("b", 0.0, 0.0, 1.0);
        bus.declare("a", 0.0, 0.0, 1.0);
        assert_eq!(bus.names(), vec!["a".to_string(), "b".to_string()]);
    }
}
