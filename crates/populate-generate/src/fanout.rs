use std::fmt;
use std::str::FromStr;

use rand::Rng;
use rand_distr::{Distribution, Poisson};
use serde::{Deserialize, Serialize};

use crate::errors::GenerationError;

/// Shape of the "children per parent" distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanOutShape {
    /// Every parent gets `round(mean)` children.
    Fixed,
    /// Bounded range around the mean, stochastically rounded.
    Uniform,
    /// Poisson(mean); equivalent to assigning each child to a random parent.
    #[default]
    Poisson,
}

impl FanOutShape {
    pub fn as_str(self) -> &'static str {
        match self {
            FanOutShape::Fixed => "fixed",
            FanOutShape::Uniform => "uniform",
            FanOutShape::Poisson => "poisson",
        }
    }
}

impl fmt::Display for FanOutShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FanOutShape {
    type Err = GenerationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "fixed" => Ok(FanOutShape::Fixed),
            "uniform" => Ok(FanOutShape::Uniform),
            "poisson" => Ok(FanOutShape::Poisson),
            other => Err(GenerationError::Configuration(format!(
                "unknown fan-out shape '{other}' (expected fixed, uniform or poisson)"
            ))),
        }
    }
}

/// Sampler for the number of children generated under one parent.
#[derive(Debug, Clone)]
pub enum FanOut {
    Fixed(u64),
    Uniform { low: f64, high: f64 },
    Poisson(Poisson<f64>),
}

impl FanOut {
    /// Build a sampler whose expectation is `mean`.
    pub fn new(shape: FanOutShape, mean: f64) -> Result<Self, GenerationError> {
        if !mean.is_finite() || mean < 0.0 {
            return Err(GenerationError::Configuration(format!(
                "fan-out mean must be a non-negative number, got {mean}"
            )));
        }
        if mean == 0.0 {
            return Ok(FanOut::Fixed(0));
        }

        match shape {
            FanOutShape::Fixed => Ok(FanOut::Fixed(mean.round() as u64)),
            FanOutShape::Uniform => {
                let low = if mean >= 1.0 { 1.0 } else { 0.0 };
                Ok(FanOut::Uniform {
                    low,
                    high: 2.0 * mean - low,
                })
            }
            FanOutShape::Poisson => Poisson::new(mean).map(FanOut::Poisson).map_err(|err| {
                GenerationError::Configuration(format!("invalid poisson mean {mean}: {err}"))
            }),
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u64 {
        match self {
            FanOut::Fixed(count) => *count,
            FanOut::Uniform { low, high } => {
                let value = if high > low {
                    rng.random_range(*low..=*high)
                } else {
                    *low
                };
                let whole = value.floor();
                let fraction = value - whole;
                whole as u64 + u64::from(fraction > 0.0 && rng.random_bool(fraction))
            }
            FanOut::Poisson(poisson) => poisson.sample(rng) as u64,
        }
    }

    /// Upper bound of a single draw, if the distribution is bounded.
    pub fn max(&self) -> Option<u64> {
        match self {
            FanOut::Fixed(count) => Some(*count),
            FanOut::Uniform { high, .. } => Some(high.ceil() as u64),
            FanOut::Poisson(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    fn empirical_mean(fan_out: &FanOut, draws: u64) -> f64 {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let total: u64 = (0..draws).map(|_| fan_out.sample(&mut rng)).sum();
        total as f64 / draws as f64
    }

    #[test]
    fn uniform_stays_within_bounds() {
        let fan_out = FanOut::new(FanOutShape::Uniform, 3.0).expect("fan out");
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for _ in 0..10_000 {
            let count = fan_out.sample(&mut rng);
            assert!((1..=5).contains(&count), "count {count} out of range");
        }
        assert_eq!(fan_out.max(), Some(5));
    }

    #[test]
    fn uniform_matches_fractional_mean() {
        let mean = 150_000.0 / 70_000.0;
        let fan_out = FanOut::new(FanOutShape::Uniform, mean).expect("fan out");
        let observed = empirical_mean(&fan_out, 200_000);
        assert!((observed - mean).abs() < 0.02, "observed {observed}");
    }

    #[test]
    fn poisson_matches_mean_and_has_a_tail() {
        let mean = 1_000_000.0 / 150_000.0;
        let fan_out = FanOut::new(FanOutShape::Poisson, mean).expect("fan out");
        let observed = empirical_mean(&fan_out, 200_000);
        assert!((observed - mean).abs() < 0.05, "observed {observed}");

        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let heavy = (0..200_000)
            .filter(|_| fan_out.sample(&mut rng) > 16)
            .count();
        assert!(heavy > 0, "expected some parents above 16 children");
    }

    #[test]
    fn zero_mean_always_yields_zero() {
        for shape in [FanOutShape::Fixed, FanOutShape::Uniform, FanOutShape::Poisson] {
            let fan_out = FanOut::new(shape, 0.0).expect("fan out");
            let mut rng = ChaCha8Rng::seed_from_u64(9);
            assert_eq!(fan_out.sample(&mut rng), 0);
        }
    }

    #[test]
    fn rejects_negative_mean() {
        assert!(FanOut::new(FanOutShape::Fixed, -1.0).is_err());
        assert!(FanOut::new(FanOutShape::Poisson, f64::NAN).is_err());
    }

    #[test]
    fn parses_shape_names() {
        assert_eq!("uniform".parse::<FanOutShape>().ok(), Some(FanOutShape::Uniform));
        assert!("normal".parse::<FanOutShape>().is_err());
    }
}
