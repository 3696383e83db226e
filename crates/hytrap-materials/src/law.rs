//! Scalar laws of temperature.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Boltzmann constant in eV/K.
pub const K_B: f64 = 8.617e-5;

/// `pre_factor * exp(-activation_energy / (K_B * t))`.
pub fn arrhenius(pre_factor: f64, activation_energy: f64, t: f64) -> f64 {
    pre_factor * (-activation_energy / (K_B * t)).exp()
}

type LawFn = dyn Fn(f64) -> f64 + Send + Sync;

/// A material property as a function of temperature.
///
/// Deserializes from a bare number (constant), an
/// `{"pre_factor", "activation_energy"}` object (Arrhenius), or a
/// `{"coefficients": [...]}` object (polynomial in `T`, lowest order
/// first). Closure-backed laws are built in code only.
#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyLaw {
    /// Temperature-independent value.
    Constant(f64),
    /// `pre_factor * exp(-activation_energy / (k_B T))`.
    Arrhenius {
        /// Value in the high-temperature limit.
        pre_factor: f64,
        /// Activation energy in eV.
        activation_energy: f64,
    },
    /// `sum_i coefficients[i] * T^i`.
    Polynomial {
        /// Coefficients, lowest order first.
        coefficients: Vec<f64>,
    },
    /// Arbitrary closure. Its derivative is taken numerically.
    #[serde(skip)]
    Custom(Arc<LawFn>),
}

impl PropertyLaw {
    /// Wrap a closure.
    pub fn custom(f: impl Fn(f64) -> f64 + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }

    /// Value at temperature `t`.
    pub fn value(&self, t: f64) -> f64 {
        match self {
            Self::Constant(v) => *v,
            Self::Arrhenius {
                pre_factor,
                activation_energy,
            } => arrhenius(*pre_factor, *activation_energy, t),
            Self::Polynomial { coefficients } => {
                coefficients.iter().rev().fold(0.0, |acc, c| acc * t + c)
            }
            Self::Custom(f) => f(t),
        }
    }

    /// Derivative with respect to temperature at `t`.
    pub fn derivative(&self, t: f64) -> f64 {
        match self {
            Self::Constant(_) => 0.0,
            Self::Arrhenius {
                activation_energy, ..
            } => self.value(t) * activation_energy / (K_B * t * t),
            Self::Polynomial { coefficients } => coefficients
                .iter()
                .enumerate()
                .skip(1)
                .rev()
                .fold(0.0, |acc, (i, c)| acc * t + i as f64 * c),
            Self::Custom(f) => {
                let h = 1e-6 * t.abs().max(1.0);
                (f(t + h) - f(t - h)) / (2.0 * h)
            }
        }
    }
}

impl From<f64> for PropertyLaw {
    fn from(v: f64) -> Self {
        Self::Constant(v)
    }
}

impl fmt::Debug for PropertyLaw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(v) => write!(f, "Constant({v})"),
            Self::Arrhenius {
                pre_factor,
                activation_energy,
            } => f
                .debug_struct("Arrhenius")
                .field("pre_factor", pre_factor)
                .field("activation_energy", activation_energy)
                .finish(),
            Self::Polynomial { coefficients } => f
                .debug_struct("Polynomial")
                .field("coefficients", coefficients)
                .finish(),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn deserializes_all_forms() {
        let c: PropertyLaw = serde_json::from_str("2.5").unwrap();
        assert_relative_eq!(c.value(1000.0), 2.5);

        let a: PropertyLaw =
            serde_json::from_str(r#"{"pre_factor": 1e-7, "activation_energy": 0.2}"#).unwrap();
        assert!(matches!(a, PropertyLaw::Arrhenius { .. }));

        let p: PropertyLaw = serde_json::from_str(r#"{"coefficients": [1.0, 2.0, 3.0]}"#).unwrap();
        assert_relative_eq!(p.value(2.0), 17.0);
    }

    #[test]
    fn polynomial_derivative() {
        let p = PropertyLaw::Polynomial {
            coefficients: vec![1.0, 2.0, 3.0],
        };
        // d/dT (1 + 2T + 3T^2) = 2 + 6T
        assert_relative_eq!(p.derivative(2.0), 14.0);
    }

    #[test]
    fn arrhenius_derivative_matches_finite_difference() {
        let a = PropertyLaw::Arrhenius {
            pre_factor: 4.1e-7,
            activation_energy: 0.39,
        };
        let t = 600.0;
        let h = 1e-3;
        let fd = (a.value(t + h) - a.value(t - h)) / (2.0 * h);
        assert_relative_eq!(a.derivative(t), fd, max_relative = 1e-6);
    }

    #[test]
    fn custom_law_uses_numeric_derivative() {
        let law = PropertyLaw::custom(|t| 2.0 * t);
        assert_relative_eq!(law.value(300.0), 600.0);
        assert_relative_eq!(law.derivative(300.0), 2.0, max_relative = 1e-6);
        assert!(serde_json::to_string(&law).is_err());
    }

    #[test]
    fn zero_activation_energy_is_constant() {
        assert_relative_eq!(arrhenius(3.0, 0.0, 500.0), 3.0);
    }
}
