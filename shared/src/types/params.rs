//! Transform parameters driven by the filter controls

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use thiserror::Error;

pub const BRIGHTNESS_RANGE: RangeInclusive<i32> = -100..=100;
pub const CONTRAST_RANGE: RangeInclusive<i32> = -100..=100;
pub const GRAYSCALE_RANGE: RangeInclusive<i32> = 0..=100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParamError {
    #[error("{name} must be within {min}..={max}, got {value}")]
    OutOfRange {
        name: &'static str,
        value: i32,
        min: i32,
        max: i32,
    },

    #[error("unknown parameter: {0}")]
    UnknownParam(String),

    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

fn check(name: &'static str, value: i32, range: RangeInclusive<i32>) -> Result<i32, ParamError> {
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(ParamError::OutOfRange {
            name,
            value,
            min: *range.start(),
            max: *range.end(),
        })
    }
}

/// Current slider values.
///
/// The default value of every field is its no-op value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformParams {
    /// Additive brightness offset, -100..=100
    brightness: i32,
    /// Contrast input, -100..=100, applied as factor `1 + contrast / 100`
    contrast: i32,
    /// Grayscale intensity, 0..=100
    grayscale: i32,
    /// Sepia toning
    sepia: bool,
    /// Color inversion
    invert: bool,
}

impl TransformParams {
    pub fn new(brightness: i32, contrast: i32, grayscale: i32) -> Result<Self, ParamError> {
        Ok(Self {
            brightness: check("brightness", brightness, BRIGHTNESS_RANGE)?,
            contrast: check("contrast", contrast, CONTRAST_RANGE)?,
            grayscale: check("grayscale", grayscale, GRAYSCALE_RANGE)?,
            sepia: false,
            invert: false,
        })
    }

    pub fn brightness(&self) -> i32 {
        self.brightness
    }

    pub fn contrast(&self) -> i32 {
        self.contrast
    }

    pub fn grayscale(&self) -> i32 {
        self.grayscale
    }

    pub fn sepia(&self) -> bool {
        self.sepia
    }

    pub fn invert(&self) -> bool {
        self.invert
    }

    /// Multiplicative contrast factor passed to the filter module.
    pub fn contrast_factor(&self) -> f32 {
        1.0 + self.contrast as f32 / 100.0
    }

    /// True when applying these parameters cannot change any pixel.
    pub fn is_neutral(&self) -> bool {
        *self == Self::default()
    }

    /// Apply a single change, validating its range.
    pub fn apply(&self, change: ParamChange) -> Result<Self, ParamError> {
        let mut next = *self;
        match change {
            ParamChange::Brightness(v) => next.brightness = check("brightness", v, BRIGHTNESS_RANGE)?,
            ParamChange::Contrast(v) => next.contrast = check("contrast", v, CONTRAST_RANGE)?,
            ParamChange::Grayscale(v) => next.grayscale = check("grayscale", v, GRAYSCALE_RANGE)?,
            ParamChange::Sepia(on) => next.sepia = on,
            ParamChange::Invert(on) => next.invert = on,
        }
        Ok(next)
    }

    /// Validate values that did not go through a constructor (e.g. deserialized).
    pub fn validate(&self) -> Result<(), ParamError> {
        check("brightness", self.brightness, BRIGHTNESS_RANGE)?;
        check("contrast", self.contrast, CONTRAST_RANGE)?;
        check("grayscale", self.grayscale, GRAYSCALE_RANGE)?;
        Ok(())
    }

    pub fn with_sepia(mut self, on: bool) -> Self {
        self.sepia = on;
        self
    }

    pub fn with_invert(mut self, on: bool) -> Self {
        self.invert = on;
        self
    }
}

/// One control movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamChange {
    Brightness(i32),
    Contrast(i32),
    Grayscale(i32),
    Sepia(bool),
    Invert(bool),
}

impl std::str::FromStr for ParamChange {
    type Err = ParamError;

    /// Parse `name=value`, e.g. `brightness=-20` or `sepia=true`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, value) = s
            .split_once('=')
            .ok_or_else(|| ParamError::UnknownParam(s.to_string()))?;
        let value = value.trim();

        let int = |name: &'static str| {
            value.parse::<i32>().map_err(|_| ParamError::InvalidValue {
                name,
                value: value.to_string(),
            })
        };
        let flag = |name: &'static str| {
            value.parse::<bool>().map_err(|_| ParamError::InvalidValue {
                name,
                value: value.to_string(),
            })
        };

        match name.trim().to_lowercase().as_str() {
            "brightness" => Ok(ParamChange::Brightness(int("brightness")?)),
            "contrast" => Ok(ParamChange::Contrast(int("contrast")?)),
            "grayscale" => Ok(ParamChange::Grayscale(int("grayscale")?)),
            "sepia" => Ok(ParamChange::Sepia(flag("sepia")?)),
            "invert" => Ok(ParamChange::Invert(flag("invert")?)),
            other => Err(ParamError::UnknownParam(other.to_string())),
        }
    }
}
