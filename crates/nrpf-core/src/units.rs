//! Unit newtypes for reported power-flow quantities.
//!
//! The solver works internally in raw `f64` rectangular coordinates; results
//! leave the solver wrapped in these types so that MW are never added to
//! Mvar and angles are never mixed between radians and degrees.
//!
//! ```
//! use nrpf_core::units::{Degrees, Megawatts, Radians};
//!
//! let p = Megawatts(40.0) + Megawatts(10.0);
//! assert_eq!(p.value(), 50.0);
//!
//! let angle = Radians(std::f64::consts::PI).to_degrees();
//! assert!((angle.value() - 180.0).abs() < 1e-12);
//! ```

use serde::{Deserialize, Serialize};
use std::ops::{Add, Div, Mul, Neg, Sub};

macro_rules! impl_unit_ops {
    ($type:ty, $unit_name:literal) => {
        impl Add for $type {
            type Output = Self;
            fn add(self, rhs: Self) -> Self::Output {
                Self(self.0 + rhs.0)
            }
        }

        impl Sub for $type {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self::Output {
                Self(self.0 - rhs.0)
            }
        }

        impl Neg for $type {
            type Output = Self;
            fn neg(self) -> Self::Output {
                Self(-self.0)
            }
        }

        impl Mul<f64> for $type {
            type Output = Self;
            fn mul(self, rhs: f64) -> Self::Output {
                Self(self.0 * rhs)
            }
        }

        impl Div<f64> for $type {
            type Output = Self;
            fn div(self, rhs: f64) -> Self::Output {
                Self(self.0 / rhs)
            }
        }

        impl std::fmt::Display for $type {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{:.4} {}", self.0, $unit_name)
            }
        }

        impl $type {
            #[inline]
            pub const fn new(value: f64) -> Self {
                Self(value)
            }

            /// Get the raw numeric value
            #[inline]
            pub const fn value(self) -> f64 {
                self.0
            }

            #[inline]
            pub fn abs(self) -> Self {
                Self(self.0.abs())
            }
        }

        impl std::iter::Sum for $type {
            fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
                Self(iter.map(|x| x.0).sum())
            }
        }
    };
}

/// Active power in megawatts (MW)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Megawatts(pub f64);

impl_unit_ops!(Megawatts, "MW");

/// Reactive power in megavars (Mvar)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Megavars(pub f64);

impl_unit_ops!(Megavars, "Mvar");

/// Angle in radians
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Radians(pub f64);

impl_unit_ops!(Radians, "rad");

/// Angle in degrees
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Degrees(pub f64);

impl_unit_ops!(Degrees, "°");

impl Radians {
    #[inline]
    pub fn to_degrees(self) -> Degrees {
        Degrees(self.0.to_degrees())
    }

    pub const ZERO: Self = Self(0.0);
}

impl Degrees {
    #[inline]
    pub fn to_radians(self) -> Radians {
        Radians(self.0.to_radians())
    }
}

/// Per-unit power expressed on an MVA base.
///
/// Transmission models solve with injections in per-unit; results are
/// reported in MW / Mvar after scaling by the system base.
pub fn to_mw(p_pu: f64, base_mva: f64) -> Megawatts {
    Megawatts(p_pu * base_mva)
}

pub fn to_mvar(q_pu: f64, base_mva: f64) -> Megavars {
    Megavars(q_pu * base_mva)
}
