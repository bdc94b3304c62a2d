//! Raw signal sources (orientation sensor or pointer)
//!
//! Samples arrive as newline-delimited JSON on a feed (see [`feed`]) at
//! whatever rate the producing device chooses. A session selects exactly one
//! input variant; events of the other variant are ignored.

pub mod feed;
pub mod pointer;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::FeedError;

pub use feed::FeedReader;
pub use pointer::normalize_pointer;

/// Input variant selected for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    #[default]
    Orientation,
    Pointer,
}

/// One orientation reading. Any field may be absent while the sensor settles.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
pub struct OrientationSample {
    pub alpha: Option<f64>,
    pub beta: Option<f64>,
    pub gamma: Option<f64>,
}

/// A validated orientation reading, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Angles {
    /// Compass heading (alpha)
    pub heading: f64,
    /// Front-back tilt (beta)
    pub front_back: f64,
    /// Left-right tilt (gamma)
    pub left_right: f64,
}

impl OrientationSample {
    pub fn new(alpha: f64, beta: f64, gamma: f64) -> Self {
        Self {
            alpha: Some(alpha),
            beta: Some(beta),
            gamma: Some(gamma),
        }
    }

    /// Returns the angles only when all three are present and finite.
    pub fn validate(&self) -> Option<Angles> {
        let heading = self.alpha.filter(|v| v.is_finite())?;
        let front_back = self.beta.filter(|v| v.is_finite())?;
        let left_right = self.gamma.filter(|v| v.is_finite())?;
        Some(Angles {
            heading,
            front_back,
            left_right,
        })
    }
}

/// Pointer position in viewport pixels
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct PointerSample {
    #[serde(rename = "clientX")]
    pub client_x: f64,
    #[serde(rename = "clientY")]
    pub client_y: f64,
}

/// Viewport size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920.0,
            height: 1080.0,
        }
    }
}

impl Viewport {
    pub fn has_area(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

/// One reading from the selected input source
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawSample {
    Orientation(OrientationSample),
    Pointer(PointerSample),
}

impl RawSample {
    pub fn kind(&self) -> InputKind {
        match self {
            RawSample::Orientation(_) => InputKind::Orientation,
            RawSample::Pointer(_) => InputKind::Pointer,
        }
    }
}

/// A decoded feed line
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeedEvent {
    Sample(RawSample),
    Resize(Viewport),
}

/// Wire shapes accepted on the feed. Order matters for untagged matching:
/// the orientation shape accepts any object, so it goes last.
#[derive(Deserialize)]
#[serde(untagged)]
enum FeedLine {
    Resize { viewport: Viewport },
    Pointer(PointerSample),
    Orientation(OrientationSample),
}

impl FeedEvent {
    /// Parse one JSON feed line.
    pub fn parse(line: &str) -> Result<Self, FeedError> {
        let event = match serde_json::from_str::<FeedLine>(line)? {
            FeedLine::Resize { viewport } => FeedEvent::Resize(viewport),
            FeedLine::Pointer(p) => FeedEvent::Sample(RawSample::Pointer(p)),
            FeedLine::Orientation(o) => FeedEvent::Sample(RawSample::Orientation(o)),
        };
        Ok(event)
    }
}
