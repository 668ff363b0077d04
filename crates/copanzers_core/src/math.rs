//! Fixed-point math utilities for deterministic simulation.
//!
//! All simulation state uses fixed-point arithmetic so that replays and
//! rollback peers produce bit-identical results on every platform.
//! Floating-point values only appear when configuration files are loaded
//! (see [`decimal_serde`]).

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point number type for all simulation math.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
/// Range: approximately -2,147,483,648 to 2,147,483,647
/// Precision: approximately 0.00000000023
pub type Fixed = I32F32;

/// π in [`Fixed`] precision.
pub const PI: Fixed = Fixed::from_bits(13_493_037_705);

/// π / 2 in [`Fixed`] precision.
pub const FRAC_PI_2: Fixed = Fixed::from_bits(6_746_518_852);

/// 2π in [`Fixed`] precision.
pub const TAU: Fixed = Fixed::from_bits(26_986_075_409);

/// Fixed-point 2D vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec2Fixed {
    /// X coordinate.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Y coordinate.
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
}

/// Serde support for fixed-point numbers.
///
/// Serializes fixed-point numbers as their raw bit representation (i64)
/// to preserve exact precision across serialization boundaries.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bit representation.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bit representation.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}

/// Serde support for `Option<Fixed>` as raw bits.
pub mod option_fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize an optional fixed-point number.
    pub fn serialize<S>(value: &Option<Fixed>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.map(Fixed::to_bits).serialize(serializer)
    }

    /// Deserialize an optional fixed-point number.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Fixed>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt = Option::<i64>::deserialize(deserializer)?;
        Ok(opt.map(Fixed::from_bits))
    }
}

/// Human-readable serde for fixed-point numbers in configuration files.
///
/// Config and scenario files are edited by hand, so values are written as
/// decimals (`tick_duration: 0.016666`) and converted exactly once on load.
/// Non-finite or out-of-range values are rejected.
pub mod decimal_serde {
    use super::Fixed;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize as a decimal number.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(value.to_num::<f64>())
    }

    /// Deserialize from a decimal number.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = f64::deserialize(deserializer)?;
        Fixed::checked_from_num(raw)
            .ok_or_else(|| D::Error::custom(format!("value {raw} is not representable")))
    }
}

/// Human-readable serde for `Option<Fixed>` in configuration files.
pub mod option_decimal_serde {
    use super::Fixed;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize as an optional decimal number.
    pub fn serialize<S>(value: &Option<Fixed>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.map(|v| v.to_num::<f64>()).serialize(serializer)
    }

    /// Deserialize from an optional decimal number.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Fixed>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<f64>::deserialize(deserializer)? {
            Some(raw) => Fixed::checked_from_num(raw)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("value {raw} is not representable"))),
            None => Ok(None),
        }
    }
}

/// Human-readable serde for [`Vec2Fixed`] in scenario files, as an `(x, y)` pair.
pub mod vec2_decimal_serde {
    use super::{Fixed, Vec2Fixed};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize as a pair of decimal numbers.
    pub fn serialize<S>(value: &Vec2Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (value.x.to_num::<f64>(), value.y.to_num::<f64>()).serialize(serializer)
    }

    /// Deserialize from a pair of decimal numbers.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec2Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (x, y) = <(f64, f64)>::deserialize(deserializer)?;
        let convert = |raw: f64| {
            Fixed::checked_from_num(raw)
                .ok_or_else(|| D::Error::custom(format!("value {raw} is not representable")))
        };
        Ok(Vec2Fixed::new(convert(x)?, convert(y)?))
    }
}

impl Vec2Fixed {
    /// Create a new fixed-point vector.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Create a vector from integer components.
    #[must_use]
    pub fn from_ints(x: i32, y: i32) -> Self {
        Self::new(Fixed::from_num(x), Fixed::from_num(y))
    }

    /// Zero vector.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
    };

    /// Unit vector pointing in the direction of `angle` (radians, CCW from +x).
    #[must_use]
    pub fn from_angle(angle: Fixed) -> Self {
        Self::new(cos(angle), sin(angle))
    }

    /// Calculate squared distance (avoids sqrt for comparisons).
    #[must_use]
    pub fn distance_squared(self, other: Self) -> Fixed {
        (self - other).length_squared()
    }

    /// Euclidean distance.
    #[must_use]
    pub fn distance(self, other: Self) -> Fixed {
        fixed_sqrt(self.distance_squared(other))
    }

    /// Squared length. Saturates instead of overflowing for huge vectors.
    #[must_use]
    pub fn length_squared(self) -> Fixed {
        self.x
            .saturating_mul(self.x)
            .saturating_add(self.y.saturating_mul(self.y))
    }

    /// Euclidean length.
    #[must_use]
    pub fn length(self) -> Fixed {
        fixed_sqrt(self.length_squared())
    }

    /// Dot product of two vectors.
    #[must_use]
    pub fn dot(self, other: Self) -> Fixed {
        self.x * other.x + self.y * other.y
    }

    /// 2D cross product (z component of the 3D cross product).
    #[must_use]
    pub fn cross(self, other: Self) -> Fixed {
        self.x * other.y - self.y * other.x
    }

    /// Multiply both components by a scalar.
    #[must_use]
    pub fn scale(self, factor: Fixed) -> Self {
        Self::new(self.x * factor, self.y * factor)
    }

    /// Counter-clockwise perpendicular.
    #[must_use]
    pub fn perp(self) -> Self {
        Self::new(-self.y, self.x)
    }

    /// Rotate by an angle given as its precomputed unit direction `(cos, sin)`.
    #[must_use]
    pub fn rotate(self, direction: Self) -> Self {
        Self::new(
            self.x * direction.x - self.y * direction.y,
            self.x * direction.y + self.y * direction.x,
        )
    }

    /// Inverse of [`rotate`](Self::rotate).
    #[must_use]
    pub fn unrotate(self, direction: Self) -> Self {
        Self::new(
            self.x * direction.x + self.y * direction.y,
            -self.x * direction.y + self.y * direction.x,
        )
    }

    /// Linearly interpolate between two vectors.
    #[must_use]
    pub fn lerp(self, other: Self, t: Fixed) -> Self {
        Self {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }

    /// Normalize vector using fixed-point math. Zero stays zero.
    #[must_use]
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len == Fixed::ZERO {
            return Self::ZERO;
        }
        Self::new(self.x / len, self.y / len)
    }

    /// Shorten the vector to at most `max` length, keeping its direction.
    #[must_use]
    pub fn clamp_length(self, max: Fixed) -> Self {
        if max <= Fixed::ZERO {
            return Self::ZERO;
        }
        if self.length_squared() <= max.saturating_mul(max) {
            return self;
        }
        self.normalize().scale(max)
    }

    /// Componentwise minimum.
    #[must_use]
    pub fn min(self, other: Self) -> Self {
        Self::new(self.x.min(other.x), self.y.min(other.y))
    }

    /// Componentwise maximum.
    #[must_use]
    pub fn max(self, other: Self) -> Self {
        Self::new(self.x.max(other.x), self.y.max(other.y))
    }
}

/// Computes the square root of a fixed-point number.
///
/// Works on the raw bits with an integer Newton iteration, so the result is
/// the exact floor of the true root at `I32F32` precision. Negative inputs
/// yield zero.
#[must_use]
pub fn fixed_sqrt(value: Fixed) -> Fixed {
    if value <= Fixed::ZERO {
        return Fixed::ZERO;
    }
    // sqrt(b / 2^32) = sqrt(b * 2^32) / 2^32
    let scaled = (value.to_bits() as u128) << 32;
    Fixed::from_bits(isqrt_u128(scaled) as i64)
}

fn isqrt_u128(n: u128) -> u128 {
    if n < 2 {
        return n;
    }
    let mut x = n;
    let mut y = (x + 1) / 2;
    while y < x {
        x = y;
        y = (x + n / x) / 2;
    }
    x
}

/// Wrap an angle into `[-π, π)`.
#[must_use]
pub fn normalize_angle(angle: Fixed) -> Fixed {
    let wrapped = (angle + PI).rem_euclid(TAU);
    wrapped - PI
}

/// Fixed-point sine.
///
/// Range-reduces into `[-π/2, π/2]` and evaluates a 9th-order Taylor
/// polynomial; absolute error stays below 1e-5.
#[must_use]
pub fn sin(angle: Fixed) -> Fixed {
    let mut x = normalize_angle(angle);
    if x > FRAC_PI_2 {
        x = PI - x;
    } else if x < -FRAC_PI_2 {
        x = -PI - x;
    }

    let x2 = x * x;
    // Horner form of x - x³/3! + x⁵/5! - x⁷/7! + x⁹/9!
    let mut term = Fixed::ONE / Fixed::from_num(362_880);
    term = Fixed::ONE / Fixed::from_num(5_040) - x2 * term;
    term = Fixed::ONE / Fixed::from_num(120) - x2 * term;
    term = Fixed::ONE / Fixed::from_num(6) - x2 * term;
    term = Fixed::ONE - x2 * term;
    x * term
}

/// Fixed-point cosine.
///
/// Evaluated with its own polynomial so that `cos(0)` is exactly one and
/// axis-aligned headings stay exact.
#[must_use]
pub fn cos(angle: Fixed) -> Fixed {
    let x = normalize_angle(angle).abs();
    let (x, sign) = if x > FRAC_PI_2 {
        (PI - x, -Fixed::ONE)
    } else {
        (x, Fixed::ONE)
    };

    let x2 = x * x;
    // Horner form of 1 - x²/2! + x⁴/4! - x⁶/6! + x⁸/8! - x¹⁰/10!
    let mut term = Fixed::ONE / Fixed::from_num(3_628_800);
    term = Fixed::ONE / Fixed::from_num(40_320) - x2 * term;
    term = Fixed::ONE / Fixed::from_num(720) - x2 * term;
    term = Fixed::ONE / Fixed::from_num(24) - x2 * term;
    term = Fixed::ONE / Fixed::from_num(2) - x2 * term;
    term = Fixed::ONE - x2 * term;
    sign * term
}

impl std::ops::Add for Vec2Fixed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl std::ops::Sub for Vec2Fixed {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl std::ops::Neg for Vec2Fixed {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self::new(-self.x, -self.y)
    }
}

impl std::ops::AddAssign for Vec2Fixed {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl std::ops::SubAssign for Vec2Fixed {
    fn sub_assign(&mut self, rhs: Self) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}
