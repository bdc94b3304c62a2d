//! Pointer variant: viewport pixels to unit square, no calibration.

use super::{PointerSample, Viewport};
use crate::position::Position;

/// Map a pointer event to a normalized position.
///
/// Returns `None` when the viewport has no area.
///
/// # Example
/// ```
/// use remote_pointer::input::{normalize_pointer, PointerSample, Viewport};
///
/// let viewport = Viewport { width: 800.0, height: 600.0 };
/// let pos = normalize_pointer(&PointerSample { client_x: 400.0, client_y: 150.0 }, &viewport).unwrap();
/// assert_eq!((pos.x, pos.y), (0.5, 0.25));
/// ```
pub fn normalize_pointer(sample: &PointerSample, viewport: &Viewport) -> Option<Position> {
    if !viewport.has_area() {
        return None;
    }
    Some(Position::clamped(
        sample.client_x / viewport.width,
        sample.client_y / viewport.height,
    ))
}
