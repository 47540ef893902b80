//! Typed conversion between native values and script values.
//!
//! Every native type that crosses the boundary implements [`ToScript`],
//! [`FromScript`] or both. Conversions are pure: they hold no state and never
//! call back into the engine.
//!
//! # Numeric policy
//!
//! - Integer targets accept script integers only. A value outside the target
//!   range fails with [`ConversionError::OutOfRange`]; floats are rejected
//!   rather than truncated.
//! - `u64`, `usize` and `isize` values above the script integer range
//!   saturate at `INT::MAX` (or `INT::MIN`) when sent to a script.
//! - Float targets accept floats and integers. Integers widen; a finite
//!   value beyond `f32` range fails for `f32` targets. NaN and infinities
//!   pass through unchanged.

use crate::binding::CallSite;
use crate::error::ConversionError;
use rhai::{Array, Dynamic, FLOAT, INT};

/// Conversion of a native value into a script value.
pub trait ToScript {
    /// Converts `self` into a script value.
    fn to_script(self) -> Dynamic;
}

/// Conversion of a script value into a native value.
///
/// The [`CallSite`] describes where the value came from; most converters
/// ignore it, but converters for script functions use it to retain the
/// function in its owning context.
pub trait FromScript: Sized {
    /// Converts a script value, failing with a [`ConversionError`] if it has
    /// the wrong shape.
    fn from_script(value: Dynamic, site: &CallSite<'_>) -> Result<Self, ConversionError>;
}

macro_rules! lossless_int_converter {
    ($($ty:ty),*) => {
        $(
            impl ToScript for $ty {
                fn to_script(self) -> Dynamic {
                    Dynamic::from_int(INT::from(self))
                }
            }
        )*
    };
}

macro_rules! saturating_int_converter {
    ($($ty:ty),*) => {
        $(
            impl ToScript for $ty {
                fn to_script(self) -> Dynamic {
                    let saturated = if self > 0 as $ty { INT::MAX } else { INT::MIN };
                    Dynamic::from_int(INT::try_from(self).unwrap_or(saturated))
                }
            }
        )*
    };
}

macro_rules! int_from_script {
    ($($ty:ty),*) => {
        $(
            impl FromScript for $ty {
                fn from_script(
                    value: Dynamic,
                    _site: &CallSite<'_>,
                ) -> Result<Self, ConversionError> {
                    let n = value
                        .as_int()
                        .map_err(|_| ConversionError::mismatch(stringify!($ty), &value))?;
                    <$ty>::try_from(n).map_err(|_| ConversionError::OutOfRange {
                        target: stringify!($ty),
                        value: n.to_string(),
                    })
                }
            }
        )*
    };
}

lossless_int_converter!(i8, i16, i32, i64, u8, u16, u32);
saturating_int_converter!(u64, usize, isize);
int_from_script!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

fn float_from_script(value: &Dynamic, expected: &'static str) -> Result<FLOAT, ConversionError> {
    if let Ok(f) = value.as_float() {
        return Ok(f);
    }
    value
        .as_int()
        .map(|n| n as FLOAT)
        .map_err(|_| ConversionError::mismatch(expected, value))
}

impl ToScript for f64 {
    fn to_script(self) -> Dynamic {
        Dynamic::from_float(self)
    }
}

impl FromScript for f64 {
    fn from_script(value: Dynamic, _site: &CallSite<'_>) -> Result<Self, ConversionError> {
        float_from_script(&value, "f64")
    }
}

impl ToScript for f32 {
    fn to_script(self) -> Dynamic {
        Dynamic::from_float(FLOAT::from(self))
    }
}

impl FromScript for f32 {
    fn from_script(value: Dynamic, _site: &CallSite<'_>) -> Result<Self, ConversionError> {
        let f = float_from_script(&value, "f32")?;
        if f.is_finite() && f.abs() > FLOAT::from(f32::MAX) {
            return Err(ConversionError::OutOfRange {
                target: "f32",
                value: f.to_string(),
            });
        }
        Ok(f as f32)
    }
}

impl ToScript for bool {
    fn to_script(self) -> Dynamic {
        Dynamic::from_bool(self)
    }
}

impl FromScript for bool {
    fn from_script(value: Dynamic, _site: &CallSite<'_>) -> Result<Self, ConversionError> {
        value
            .as_bool()
            .map_err(|_| ConversionError::mismatch("bool", &value))
    }
}

impl ToScript for String {
    fn to_script(self) -> Dynamic {
        Dynamic::from(self)
    }
}

impl ToScript for &str {
    fn to_script(self) -> Dynamic {
        Dynamic::from(self.to_string())
    }
}

impl FromScript for String {
    fn from_script(value: Dynamic, _site: &CallSite<'_>) -> Result<Self, ConversionError> {
        if let Ok(c) = value.as_char() {
            return Ok(c.to_string());
        }
        let found = value.type_name();
        value
            .into_string()
            .map_err(|_| ConversionError::TypeMismatch {
                expected: "string",
                found: found.to_string(),
            })
    }
}

impl ToScript for () {
    fn to_script(self) -> Dynamic {
        Dynamic::UNIT
    }
}

impl FromScript for () {
    fn from_script(value: Dynamic, _site: &CallSite<'_>) -> Result<Self, ConversionError> {
        if value.is_unit() {
            Ok(())
        } else {
            Err(ConversionError::mismatch("()", &value))
        }
    }
}

impl ToScript for Dynamic {
    fn to_script(self) -> Dynamic {
        self
    }
}

impl FromScript for Dynamic {
    fn from_script(value: Dynamic, _site: &CallSite<'_>) -> Result<Self, ConversionError> {
        Ok(value)
    }
}

impl<T: ToScript> ToScript for Option<T> {
    fn to_script(self) -> Dynamic {
        match self {
            Some(value) => value.to_script(),
            None => Dynamic::UNIT,
        }
    }
}

impl<T: FromScript> FromScript for Option<T> {
    fn from_script(value: Dynamic, site: &CallSite<'_>) -> Result<Self, ConversionError> {
        if value.is_unit() {
            Ok(None)
        } else {
            T::from_script(value, site).map(Some)
        }
    }
}

impl<T: ToScript> ToScript for Vec<T> {
    fn to_script(self) -> Dynamic {
        let items: Array = self.into_iter().map(ToScript::to_script).collect();
        Dynamic::from_array(items)
    }
}

impl<T: FromScript> FromScript for Vec<T> {
    fn from_script(value: Dynamic, site: &CallSite<'_>) -> Result<Self, ConversionError> {
        let found = value.type_name();
        let items = value
            .into_array()
            .map_err(|_| ConversionError::TypeMismatch {
                expected: "array",
                found: found.to_string(),
            })?;
        items
            .into_iter()
            .map(|item| T::from_script(item, site))
            .collect()
    }
}
