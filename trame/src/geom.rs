//! Matrix helpers for the Lottie transform model.
//!
//! All geometry is `kurbo`; this module only pins down the composition
//! order and the rotation convention.

use kurbo::{Affine, Vec2};

/// Rotation matrix for Lottie's clockwise screen-space convention.
///
/// A 90 degree rotation maps (x, y) to (y, -x).
pub fn rotation(degrees: f64) -> Affine {
    Affine::rotate(-degrees.to_radians())
}

/// Transform for one set of TRS properties:
/// `T(position) * R(rotation) * S(scale) * T(-anchor)`.
///
/// `scale` is in Lottie percent (100 = identity).
pub fn trs_matrix(position: Vec2, anchor: Vec2, scale_pct: Vec2, rotation_deg: f64) -> Affine {
    Affine::translate(position)
        * rotation(rotation_deg)
        * Affine::scale_non_uniform(scale_pct.x / 100.0, scale_pct.y / 100.0)
        * Affine::translate(-anchor)
}
