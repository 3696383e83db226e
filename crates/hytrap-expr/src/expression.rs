//! The [`Expression`] type.

use std::fmt;
use std::sync::Arc;

use hytrap_core::Point;
use serde::de::{self, Deserializer, Visitor};
use serde::ser::{self, Serializer};
use serde::{Deserialize, Serialize};

type ExprFn = dyn Fn(&Point, f64) -> f64 + Send + Sync;

/// A scalar input that may vary in space and time.
///
/// Constants round-trip through serde as plain numbers. Closure-backed
/// expressions cannot be serialized; serializing one fails with a
/// descriptive error, which callers exporting parameters treat as
/// non-fatal.
///
/// # Examples
///
/// ```
/// use hytrap_expr::Expression;
///
/// let ramp = Expression::transient(|p, t| 300.0 + 10.0 * t + p[0]);
/// assert_eq!(ramp.evaluate(&[1.0, 0.0, 0.0], 2.0), 321.0);
/// assert!(ramp.is_time_dependent());
///
/// let c = Expression::constant(5.0);
/// assert_eq!(c.evaluate(&[0.0; 3], 100.0), 5.0);
/// ```
#[derive(Clone)]
pub enum Expression {
    /// The same value everywhere, at all times.
    Constant(f64),
    /// A closure of position and time.
    Function {
        /// The closure.
        f: Arc<ExprFn>,
        /// Whether the closure reads its time argument.
        time_dependent: bool,
        /// Optional name used in logs and serialization errors.
        label: Option<String>,
    },
}

impl Expression {
    /// A constant expression.
    pub fn constant(value: f64) -> Self {
        Self::Constant(value)
    }

    /// A closure of position only.
    pub fn spatial(f: impl Fn(&Point) -> f64 + Send + Sync + 'static) -> Self {
        Self::Function {
            f: Arc::new(move |p, _t| f(p)),
            time_dependent: false,
            label: None,
        }
    }

    /// A closure of position and time.
    pub fn transient(f: impl Fn(&Point, f64) -> f64 + Send + Sync + 'static) -> Self {
        Self::Function {
            f: Arc::new(f),
            time_dependent: true,
            label: None,
        }
    }

    /// Attach a label to a closure-backed expression. No-op for constants.
    pub fn with_label(mut self, name: impl Into<String>) -> Self {
        if let Self::Function { label, .. } = &mut self {
            *label = Some(name.into());
        }
        self
    }

    /// Evaluate at a point and time.
    pub fn evaluate(&self, point: &Point, t: f64) -> f64 {
        match self {
            Self::Constant(v) => *v,
            Self::Function { f, .. } => f(point, t),
        }
    }

    /// Whether the value can change with time.
    pub fn is_time_dependent(&self) -> bool {
        matches!(
            self,
            Self::Function {
                time_dependent: true,
                ..
            }
        )
    }

    /// The value if this is a constant.
    pub fn as_constant(&self) -> Option<f64> {
        match self {
            Self::Constant(v) => Some(*v),
            Self::Function { .. } => None,
        }
    }
}

impl Default for Expression {
    fn default() -> Self {
        Self::Constant(0.0)
    }
}

impl From<f64> for Expression {
    fn from(v: f64) -> Self {
        Self::Constant(v)
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(v) => write!(f, "Constant({v})"),
            Self::Function {
                time_dependent,
                label,
                ..
            } => f
                .debug_struct("Function")
                .field("time_dependent", time_dependent)
                .field("label", label)
                .finish(),
        }
    }
}

impl Serialize for Expression {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Constant(v) => serializer.serialize_f64(*v),
            Self::Function { label, .. } => Err(ser::Error::custom(format!(
                "expression {} is a closure and cannot be serialized",
                label.as_deref().unwrap_or("<unnamed>")
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for Expression {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct NumberVisitor;

        impl Visitor<'_> for NumberVisitor {
            type Value = Expression;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "a number")
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Expression, E> {
                Ok(Expression::Constant(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Expression, E> {
                Ok(Expression::Constant(v as f64))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Expression, E> {
                Ok(Expression::Constant(v as f64))
            }
        }

        deserializer.deserialize_any(NumberVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_round_trip_through_json() {
        let e: Expression = serde_json::from_str("3").unwrap();
        assert_eq!(e.as_constant(), Some(3.0));
        assert_eq!(serde_json::to_string(&Expression::constant(2.5)).unwrap(), "2.5");
    }

    #[test]
    fn closures_refuse_to_serialize() {
        let e = Expression::spatial(|p| p[0]).with_label("profile");
        let err = serde_json::to_string(&e).unwrap_err();
        assert!(err.to_string().contains("profile"));
    }

    #[test]
    fn strings_are_not_expressions() {
        assert!(serde_json::from_str::<Expression>("\"1 + x\"").is_err());
    }

    #[test]
    fn spatial_closures_ignore_time() {
        let e = Expression::spatial(|p| 2.0 * p[1]);
        assert!(!e.is_time_dependent());
        assert_eq!(e.evaluate(&[0.0, 3.0, 0.0], 1e6), 6.0);
    }
}
