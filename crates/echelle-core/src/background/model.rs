use std::fmt;
use std::path::Path;

use chrono::NaiveDateTime;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::frame::Fiber;
use crate::io::bkg;

use super::profile::BrightnessProfile;

/// Illumination source of a fiber.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    Star,
    Comb,
    #[serde(rename = "fp")]
    FabryPerot,
    Flat,
}

impl ObjectType {
    /// Classify an object name: `comb`, `fp`, `flat*`, anything else is a
    /// star.
    pub fn classify(object: &str) -> Self {
        let name = object.trim().to_ascii_lowercase();
        match name.as_str() {
            "comb" => Self::Comb,
            "fp" => Self::FabryPerot,
            _ if name.starts_with("flat") => Self::Flat,
            _ => Self::Star,
        }
    }

    /// Calibration lamps whose backgrounds are only interchangeable with the
    /// same lamp.
    pub fn is_lamp(self) -> bool {
        matches!(self, Self::Comb | Self::FabryPerot)
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Star => write!(f, "star"),
            Self::Comb => write!(f, "comb"),
            Self::FabryPerot => write!(f, "fp"),
            Self::Flat => write!(f, "flat"),
        }
    }
}

/// Metadata of a measured background.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BackgroundInfo {
    pub file_id: String,
    pub fiber: Fiber,
    pub object: String,
    pub object_type: ObjectType,
    /// Exposure time in seconds.
    pub exptime: f64,
    pub obs_date: Option<NaiveDateTime>,
}

impl BackgroundInfo {
    pub fn new(file_id: &str, fiber: Fiber, object: &str) -> Self {
        Self {
            file_id: file_id.to_string(),
            fiber,
            object: object.trim().to_string(),
            object_type: ObjectType::classify(object),
            exptime: 0.0,
            obs_date: None,
        }
    }

    /// Same object name, ignoring case and surrounding whitespace.
    pub fn same_object(&self, object: &str) -> bool {
        self.object.trim().eq_ignore_ascii_case(object.trim())
    }
}

/// A background-light map measured on one exposure, with its brightness
/// profile. Immutable once built; rescaling produces a new array.
#[derive(Clone, Debug, PartialEq)]
pub struct BackgroundLightModel {
    pub info: BackgroundInfo,
    surface: Array2<f32>,
    profile: BrightnessProfile,
}

impl BackgroundLightModel {
    pub fn new(info: BackgroundInfo, surface: Array2<f32>, profile: BrightnessProfile) -> Self {
        Self {
            info,
            surface,
            profile,
        }
    }

    pub fn surface(&self) -> &Array2<f32> {
        &self.surface
    }

    pub fn profile(&self) -> &BrightnessProfile {
        &self.profile
    }

    pub fn shape(&self) -> (usize, usize) {
        self.surface.dim()
    }

    /// Surface multiplied by `scale`.
    pub fn scaled_surface(&self, scale: f64) -> Array2<f32> {
        let s = scale as f32;
        self.surface.mapv(|v| v * s)
    }

    /// Encode to the `.bkg` byte layout.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        bkg::encode(&mut buf, self)?;
        Ok(buf)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bkg::decode(bytes)
    }

    /// Write atomically to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        bkg::write_bkg(path, self)
    }

    pub fn load(path: &Path) -> Result<Self> {
        bkg::read_bkg(path)
    }
}
