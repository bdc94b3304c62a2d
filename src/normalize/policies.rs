//! Orientation-to-position mapping strategies.
//!
//! Each strategy maps validated [`Angles`] (plus the session baseline, when
//! it uses one) to a [`Position`] in the unit square. Heading is the compass
//! angle (alpha) and tilt is the front-back angle (beta).
//!
//! # Strategies
//!
//! - [`DeltaFromBaseline`]: motion relative to the first reading, resting pose at the centre
//! - [`AbsoluteRange`]: calibration-free linear mapping of the full sensor range
//! - [`ClampedTilt`]: restricted hand-tilt envelope, no wrap-around near the edges
//! - [`InvertedClamped`]: mirrored control scheme
//!
//! Orientation convention: increasing heading moves right and increasing tilt
//! moves down for every strategy except [`InvertedClamped`], which mirrors both.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::Baseline;
use crate::input::Angles;
use crate::position::Position;

/// Mapping contract shared by all strategies.
///
/// Implementations are pure: the output depends only on the angles and the
/// baseline passed in, and always lies in the unit square.
pub trait NormalizeStrategy: fmt::Debug + Send + Sync {
    /// Config name of the strategy
    fn name(&self) -> &'static str;

    fn map(&self, angles: &Angles, baseline: Option<&Baseline>) -> Position;
}

/// Strategy selection as written in the config file.
///
/// The mapping constants are part of the selection so they can be tuned
/// without a rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum NormalizationPolicy {
    DeltaFromBaseline {
        /// Degrees of motion that sweep the whole screen
        #[serde(default = "default_span")]
        span_deg: f64,
    },
    AbsoluteRange,
    ClampedTilt {
        #[serde(default = "default_tilt_limit")]
        tilt_limit_deg: f64,
        #[serde(default = "default_heading_limit")]
        heading_limit_deg: f64,
    },
    InvertedClamped {
        #[serde(default = "default_heading_limit")]
        limit_deg: f64,
    },
}

impl Default for NormalizationPolicy {
    fn default() -> Self {
        NormalizationPolicy::DeltaFromBaseline {
            span_deg: default_span(),
        }
    }
}

impl NormalizationPolicy {
    /// Names accepted by `--policy`.
    pub const NAMES: [&'static str; 4] = [
        "delta_from_baseline",
        "absolute_range",
        "clamped_tilt",
        "inverted_clamped",
    ];

    /// Policy with its default constants, looked up by config name.
    pub fn from_name(name: &str) -> Option<Self> {
        let policy = match name {
            "delta_from_baseline" => Self::default(),
            "absolute_range" => Self::AbsoluteRange,
            "clamped_tilt" => Self::ClampedTilt {
                tilt_limit_deg: default_tilt_limit(),
                heading_limit_deg: default_heading_limit(),
            },
            "inverted_clamped" => Self::InvertedClamped {
                limit_deg: default_heading_limit(),
            },
            _ => return None,
        };
        Some(policy)
    }

    /// The constants that must be positive and finite.
    pub fn constants(&self) -> Vec<(&'static str, f64)> {
        match *self {
            Self::DeltaFromBaseline { span_deg } => vec![("span_deg", span_deg)],
            Self::AbsoluteRange => Vec::new(),
            Self::ClampedTilt {
                tilt_limit_deg,
                heading_limit_deg,
            } => vec![
                ("tilt_limit_deg", tilt_limit_deg),
                ("heading_limit_deg", heading_limit_deg),
            ],
            Self::InvertedClamped { limit_deg } => vec![("limit_deg", limit_deg)],
        }
    }

    pub fn build(&self) -> Box<dyn NormalizeStrategy> {
        match *self {
            Self::DeltaFromBaseline { span_deg } => Box::new(DeltaFromBaseline { span_deg }),
            Self::AbsoluteRange => Box::new(AbsoluteRange),
            Self::ClampedTilt {
                tilt_limit_deg,
                heading_limit_deg,
            } => Box::new(ClampedTilt {
                tilt_limit_deg,
                heading_limit_deg,
            }),
            Self::InvertedClamped { limit_deg } => Box::new(InvertedClamped { limit_deg }),
        }
    }
}

/// Offset from the first reading: `0.5 + delta / span`, clamped.
#[derive(Debug, Clone, Copy)]
pub struct DeltaFromBaseline {
    pub span_deg: f64,
}

impl NormalizeStrategy for DeltaFromBaseline {
    fn name(&self) -> &'static str {
        "delta_from_baseline"
    }

    fn map(&self, angles: &Angles, baseline: Option<&Baseline>) -> Position {
        // Without a baseline the reading is its own reference.
        let (heading0, tilt0) = baseline
            .map(|b| (b.heading, b.front_back))
            .unwrap_or((angles.heading, angles.front_back));

        let delta_heading = angles.heading - heading0;
        let delta_tilt = angles.front_back - tilt0;

        Position::clamped(
            0.5 + delta_heading / self.span_deg,
            0.5 + delta_tilt / self.span_deg,
        )
    }
}

/// `x = heading / 360`, `y = (tilt + 180) / 360`.
#[derive(Debug, Clone, Copy)]
pub struct AbsoluteRange;

impl NormalizeStrategy for AbsoluteRange {
    fn name(&self) -> &'static str {
        "absolute_range"
    }

    fn map(&self, angles: &Angles, _baseline: Option<&Baseline>) -> Position {
        let heading = wrap_heading(angles.heading);
        let tilt = angles.front_back.clamp(-180.0, 180.0);
        Position::clamped(heading / 360.0, (tilt + 180.0) / 360.0)
    }
}

/// Tilt clamped to `±tilt_limit`, heading clamped to `±heading_limit`.
///
/// With the default limits: `y = (tilt + 45) / 90`, `x = (270 - heading) / 360`.
#[derive(Debug, Clone, Copy)]
pub struct ClampedTilt {
    pub tilt_limit_deg: f64,
    pub heading_limit_deg: f64,
}

impl NormalizeStrategy for ClampedTilt {
    fn name(&self) -> &'static str {
        "clamped_tilt"
    }

    fn map(&self, angles: &Angles, _baseline: Option<&Baseline>) -> Position {
        let tilt = angles
            .front_back
            .clamp(-self.tilt_limit_deg, self.tilt_limit_deg);
        let heading = angles
            .heading
            .clamp(-self.heading_limit_deg, self.heading_limit_deg);

        Position::clamped(
            (180.0 + self.heading_limit_deg - heading) / 360.0,
            (tilt + self.tilt_limit_deg) / (2.0 * self.tilt_limit_deg),
        )
    }
}

/// Both angles negated, clamped to `±limit`, then `(a + limit) / (2 * limit)`.
#[derive(Debug, Clone, Copy)]
pub struct InvertedClamped {
    pub limit_deg: f64,
}

impl NormalizeStrategy for InvertedClamped {
    fn name(&self) -> &'static str {
        "inverted_clamped"
    }

    fn map(&self, angles: &Angles, _baseline: Option<&Baseline>) -> Position {
        let span = 2.0 * self.limit_deg;
        let heading = (-angles.heading).clamp(-self.limit_deg, self.limit_deg);
        let tilt = (-angles.front_back).clamp(-self.limit_deg, self.limit_deg);
        Position::clamped(
            (heading + self.limit_deg) / span,
            (tilt + self.limit_deg) / span,
        )
    }
}

/// Headings in `[0, 360]` pass through; anything else wraps into `[0, 360)`.
fn wrap_heading(heading: f64) -> f64 {
    if (0.0..=360.0).contains(&heading) {
        heading
    } else {
        heading.rem_euclid(360.0)
    }
}

fn default_span() -> f64 {
    360.0
}
fn default_tilt_limit() -> f64 {
    45.0
}
fn default_heading_limit() -> f64 {
    90.0
}
