//! Typed quantities carried by network equipment.
//!
//! Interchange records hand out every attribute as a bare number. Once a value
//! lands on a network object it is wrapped in one of these newtypes so that a
//! voltage target can never be assigned from a reactive power setpoint, and a
//! current limit cannot be confused with an impedance.
//!
//! All types are `#[repr(transparent)]` over `f64`.
//!
//! ```
//! use gat_core::units::{Kilovolts, Megavars};
//!
//! let nominal = Kilovolts(400.0);
//! let target = nominal * 1.02;
//! assert!(target > nominal);
//!
//! let q = Megavars(-12.5);
//! assert_eq!(q.abs(), Megavars(12.5));
//! ```

use serde::{Deserialize, Serialize};
use std::ops::{Add, Div, Mul, Neg, Sub};

macro_rules! quantity {
    ($(#[$meta:meta])* $name:ident, $symbol:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
        #[repr(transparent)]
        pub struct $name(pub f64);

        impl $name {
            /// Wrap a raw value.
            #[inline]
            pub const fn new(value: f64) -> Self {
                Self(value)
            }

            /// Raw numeric value.
            #[inline]
            pub const fn value(self) -> f64 {
                self.0
            }

            #[inline]
            pub fn abs(self) -> Self {
                Self(self.0.abs())
            }

            #[inline]
            pub fn is_nan(self) -> bool {
                self.0.is_nan()
            }

            #[inline]
            pub fn is_finite(self) -> bool {
                self.0.is_finite()
            }

            /// True for a finite, strictly positive value.
            #[inline]
            pub fn is_positive(self) -> bool {
                self.0.is_finite() && self.0 > 0.0
            }
        }

        impl Add for $name {
            type Output = Self;
            fn add(self, rhs: Self) -> Self {
                Self(self.0 + rhs.0)
            }
        }

        impl Sub for $name {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self {
                Self(self.0 - rhs.0)
            }
        }

        impl Neg for $name {
            type Output = Self;
            fn neg(self) -> Self {
                Self(-self.0)
            }
        }

        impl Mul<f64> for $name {
            type Output = Self;
            fn mul(self, rhs: f64) -> Self {
                Self(self.0 * rhs)
            }
        }

        impl Div<f64> for $name {
            type Output = Self;
            fn div(self, rhs: f64) -> Self {
                Self(self.0 / rhs)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{} {}", self.0, $symbol)
            }
        }
    };
}

// =============================================================================
// Voltage and power
// =============================================================================

quantity!(
    /// Voltage magnitude in kilovolts (kV). Nominal voltages, targets and
    /// voltage limits of voltage levels all use this unit.
    Kilovolts,
    "kV"
);

quantity!(
    /// Active power in megawatts (MW).
    Megawatts,
    "MW"
);

quantity!(
    /// Reactive power in megavolt-amperes reactive (Mvar).
    Megavars,
    "Mvar"
);

quantity!(
    /// Apparent power rating in megavolt-amperes (MVA).
    MegavoltAmperes,
    "MVA"
);

// =============================================================================
// Current and impedance
// =============================================================================

quantity!(
    /// Current in amperes (A), used by operational current limits.
    Amperes,
    "A"
);

quantity!(
    /// Resistance or reactance in ohms.
    Ohms,
    "Ω"
);

quantity!(
    /// Conductance or susceptance in siemens.
    Siemens,
    "S"
);

quantity!(
    /// Phase shift angle in degrees.
    Degrees,
    "°"
);

impl Siemens {
    /// Susceptance of a reactive rating given in ohms; zero ratings map to zero.
    pub fn from_reactance(x: Ohms) -> Self {
        if x.0 == 0.0 {
            Siemens(0.0)
        } else {
            Siemens(1.0 / x.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic_keeps_unit() {
        let v = Kilovolts(220.0) + Kilovolts(5.0);
        assert_eq!(v, Kilovolts(225.0));
        assert_eq!(-Megavars(3.0), Megavars(-3.0));
        assert_eq!(Megawatts(10.0) / 4.0, Megawatts(2.5));
    }

    #[test]
    fn test_is_positive_rejects_nan_and_zero() {
        assert!(Kilovolts(1.0).is_positive());
        assert!(!Kilovolts(0.0).is_positive());
        assert!(!Kilovolts(-5.0).is_positive());
        assert!(!Kilovolts(f64::NAN).is_positive());
    }

    #[test]
    fn test_susceptance_from_reactance() {
        assert_eq!(Siemens::from_reactance(Ohms(0.0)), Siemens(0.0));
        assert!((Siemens::from_reactance(Ohms(50.0)).value() - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_display() {
        assert_eq!(Kilovolts(400.0).to_string(), "400 kV");
        assert_eq!(Amperes(1500.0).to_string(), "1500 A");
    }
}
