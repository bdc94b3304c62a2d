//! Normalized cursor position and the latest-value cell shared between the
//! signal pipeline and the publish loop.
//!
//! The cell is a `tokio::sync::watch` channel: the pipeline overwrites the
//! value on every accepted sample and the publish loop reads whatever is
//! current at each frame tick. Nothing is queued.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// A coordinate in the unit square, independent of any screen resolution.
///
/// Both components are always within `[0.0, 1.0]`; the constructor clamps.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    /// "No input yet" value published before the first sample arrives.
    pub const ORIGIN: Position = Position { x: 0.0, y: 0.0 };

    /// Build a position, clamping both components into `[0, 1]`.
    ///
    /// `NaN` collapses to `0.0`.
    pub fn clamped(x: f64, y: f64) -> Self {
        Self {
            x: clamp_unit(x),
            y: clamp_unit(y),
        }
    }

    /// Round both components to `decimals` places.
    ///
    /// Rounding a value in `[0, 1]` cannot leave the unit square.
    pub fn rounded(self, decimals: u32) -> Self {
        let factor = 10f64.powi(decimals as i32);
        Self {
            x: (self.x * factor).round() / factor,
            y: (self.y * factor).round() / factor,
        }
    }

    pub fn in_unit_square(&self) -> bool {
        (0.0..=1.0).contains(&self.x) && (0.0..=1.0).contains(&self.y)
    }
}

pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// Write half of the position cell, owned by the signal pipeline.
#[derive(Debug)]
pub struct PositionWriter {
    tx: watch::Sender<Position>,
}

/// Read half of the position cell, owned by the publish loop.
#[derive(Debug, Clone)]
pub struct PositionReader {
    rx: watch::Receiver<Position>,
}

/// Create the shared cell, initialised to [`Position::ORIGIN`].
pub fn position_cell() -> (PositionWriter, PositionReader) {
    let (tx, rx) = watch::channel(Position::ORIGIN);
    (PositionWriter { tx }, PositionReader { rx })
}

impl PositionWriter {
    /// Overwrite the current value. Last write wins.
    pub fn set(&self, position: Position) {
        self.tx.send_replace(position);
    }
}

impl PositionReader {
    /// The latest value written, or the origin if nothing was written yet.
    pub fn current(&self) -> Position {
        *self.rx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamped_bounds() {
        assert_eq!(Position::clamped(-0.2, 1.7), Position { x: 0.0, y: 1.0 });
        assert_eq!(Position::clamped(0.25, 0.75), Position { x: 0.25, y: 0.75 });
        assert_eq!(Position::clamped(f64::NAN, f64::INFINITY), Position { x: 0.0, y: 1.0 });
    }

    #[test]
    fn test_rounded_three_decimals() {
        let p = Position::clamped(0.123456, 0.9999).rounded(3);
        assert_eq!(p, Position { x: 0.123, y: 1.0 });
        assert!(p.in_unit_square());
    }

    #[test]
    fn test_cell_starts_at_origin_and_last_write_wins() {
        let (writer, reader) = position_cell();
        assert_eq!(reader.current(), Position::ORIGIN);

        writer.set(Position::clamped(0.1, 0.2));
        writer.set(Position::clamped(0.3, 0.4));
        assert_eq!(reader.current(), Position { x: 0.3, y: 0.4 });
        assert_eq!(reader.clone().current(), Position { x: 0.3, y: 0.4 });
    }

    #[test]
    fn test_position_wire_shape() {
        let json = serde_json::to_value(Position { x: 0.5, y: 0.25 }).unwrap();
        assert_eq!(json, serde_json::json!({ "x": 0.5, "y": 0.25 }));
    }
}
