//! Normalizer: raw samples to unit-square positions
//!
//! Wraps the configured [`NormalizeStrategy`], owns the session baseline and
//! applies the rounding policy. The baseline is captured from the first valid
//! orientation sample and is never replaced for the lifetime of the
//! normalizer, including across [`Normalizer::reconfigure`].

pub mod policies;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Rejection;
use crate::input::{normalize_pointer, Angles, OrientationSample, PointerSample, Viewport};
use crate::position::Position;

pub use policies::{NormalizationPolicy, NormalizeStrategy};

/// Reference reading for delta-based strategies
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Baseline {
    pub heading: f64,
    pub front_back: f64,
}

impl From<&Angles> for Baseline {
    fn from(angles: &Angles) -> Self {
        Self {
            heading: angles.heading,
            front_back: angles.front_back,
        }
    }
}

/// Normalizer section of the config file
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct NormalizerConfig {
    #[serde(flatten)]
    pub policy: NormalizationPolicy,
    /// Decimal places kept in published positions (`null` disables rounding)
    #[serde(default = "default_precision")]
    pub precision: Option<u32>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            policy: NormalizationPolicy::default(),
            precision: default_precision(),
        }
    }
}

fn default_precision() -> Option<u32> {
    Some(3)
}

pub struct Normalizer {
    strategy: Box<dyn NormalizeStrategy>,
    precision: Option<u32>,
    baseline: Option<Baseline>,
}

impl Normalizer {
    pub fn new(config: &NormalizerConfig) -> Self {
        Self {
            strategy: config.policy.build(),
            precision: config.precision,
            baseline: None,
        }
    }

    /// Swap strategy and rounding. A captured baseline is kept.
    pub fn reconfigure(&mut self, config: &NormalizerConfig) {
        self.strategy = config.policy.build();
        self.precision = config.precision;
        info!(
            "🎯 Normalizer now using '{}' (precision: {:?})",
            self.strategy.name(),
            self.precision
        );
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn baseline(&self) -> Option<&Baseline> {
        self.baseline.as_ref()
    }

    /// Map an orientation sample, capturing the baseline on first use.
    pub fn normalize(&mut self, sample: &OrientationSample) -> Result<Position, Rejection> {
        let angles = sample.validate().ok_or(Rejection::InvalidSample)?;

        let baseline = *self.baseline.get_or_insert_with(|| {
            let baseline = Baseline::from(&angles);
            debug!(
                "Baseline captured: heading={:.2} tilt={:.2}",
                baseline.heading, baseline.front_back
            );
            baseline
        });

        let position = self.strategy.map(&angles, Some(&baseline));
        Ok(self.finish(position))
    }

    /// Map a pointer event. No calibration is involved.
    pub fn normalize_pointer(
        &self,
        sample: &PointerSample,
        viewport: &Viewport,
    ) -> Result<Position, Rejection> {
        let position = normalize_pointer(sample, viewport).ok_or(Rejection::EmptyViewport)?;
        Ok(self.finish(position))
    }

    fn finish(&self, position: Position) -> Position {
        // Clamp again: strategies already do, but nothing out of range may leave here.
        let position = Position::clamped(position.x, position.y);
        match self.precision {
            Some(decimals) => position.rounded(decimals),
            None => position,
        }
    }
}

impl std::fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Normalizer")
            .field("strategy", &self.strategy.name())
            .field("precision", &self.precision)
            .field("baseline", &self.baseline)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta_config() -> NormalizerConfig {
        NormalizerConfig::default()
    }

    #[test]
    fn test_same_sample_twice_is_centre() {
        let mut normalizer = Normalizer::new(&delta_config());
        let sample = OrientationSample::new(211.37, 12.9, -3.0);

        let first = normalizer.normalize(&sample).unwrap();
        let second = normalizer.normalize(&sample).unwrap();
        assert_eq!(first, Position { x: 0.5, y: 0.5 });
        assert_eq!(second, Position { x: 0.5, y: 0.5 });
    }

    #[test]
    fn test_baseline_set_once() {
        let mut normalizer = Normalizer::new(&delta_config());
        normalizer
            .normalize(&OrientationSample::new(10.0, 20.0, 0.0))
            .unwrap();
        normalizer
            .normalize(&OrientationSample::new(50.0, 60.0, 0.0))
            .unwrap();

        assert_eq!(
            normalizer.baseline(),
            Some(&Baseline {
                heading: 10.0,
                front_back: 20.0
            })
        );
    }

    #[test]
    fn test_invalid_sample_does_not_capture_baseline() {
        let mut normalizer = Normalizer::new(&delta_config());
        let invalid = OrientationSample {
            alpha: Some(1.0),
            beta: None,
            gamma: Some(2.0),
        };
        assert_eq!(normalizer.normalize(&invalid), Err(Rejection::InvalidSample));
        assert!(normalizer.baseline().is_none());
    }

    #[test]
    fn test_rounding_to_precision() {
        let mut normalizer = Normalizer::new(&delta_config());
        normalizer
            .normalize(&OrientationSample::new(0.0, 0.0, 0.0))
            .unwrap();
        // 0.5 + 1/360 = 0.502777...
        let pos = normalizer
            .normalize(&OrientationSample::new(1.0, 0.0, 0.0))
            .unwrap();
        assert_eq!(pos.x, 0.503);

        let mut unrounded = Normalizer::new(&NormalizerConfig {
            precision: None,
            ..delta_config()
        });
        unrounded
            .normalize(&OrientationSample::new(0.0, 0.0, 0.0))
            .unwrap();
        let pos = unrounded
            .normalize(&OrientationSample::new(1.0, 0.0, 0.0))
            .unwrap();
        assert!((pos.x - (0.5 + 1.0 / 360.0)).abs() < 1e-12);
    }

    #[test]
    fn test_reconfigure_keeps_baseline() {
        let mut normalizer = Normalizer::new(&delta_config());
        normalizer
            .normalize(&OrientationSample::new(30.0, 5.0, 0.0))
            .unwrap();

        normalizer.reconfigure(&NormalizerConfig {
            policy: NormalizationPolicy::AbsoluteRange,
            precision: Some(2),
        });
        assert_eq!(normalizer.strategy_name(), "absolute_range");
        assert_eq!(
            normalizer.baseline(),
            Some(&Baseline {
                heading: 30.0,
                front_back: 5.0
            })
        );

        let pos = normalizer
            .normalize(&OrientationSample::new(0.0, -180.0, 0.0))
            .unwrap();
        assert_eq!(pos, Position::ORIGIN);
    }

    #[test]
    fn test_pointer_uses_viewport() {
        let normalizer = Normalizer::new(&delta_config());
        let viewport = Viewport {
            width: 300.0,
            height: 200.0,
        };
        let pos = normalizer
            .normalize_pointer(
                &PointerSample {
                    client_x: 100.0,
                    client_y: 50.0,
                },
                &viewport,
            )
            .unwrap();
        assert_eq!(pos, Position { x: 0.333, y: 0.25 });
    }

    #[test]
    fn test_config_yaml_shape() {
        let config: NormalizerConfig =
            serde_yaml::from_str("policy: inverted_clamped\nlimit_deg: 60\nprecision: 4\n").unwrap();
        assert_eq!(
            config.policy,
            NormalizationPolicy::InvertedClamped { limit_deg: 60.0 }
        );
        assert_eq!(config.precision, Some(4));

        let config: NormalizerConfig = serde_yaml::from_str("policy: absolute_range\n").unwrap();
        assert_eq!(config.precision, Some(3));
    }
}
