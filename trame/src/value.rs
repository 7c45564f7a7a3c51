//! Animatable values: keyframes, tracks, transforms, stroke style.

use kurbo::{Affine, Vec2};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::error::CompileError;
use crate::geom;

/// Borrowed-or-owned result of sampling a track, so static tracks do not
/// clone on the hot path.
#[derive(Debug)]
pub enum ValueRef<'a, T> {
    Borrowed(&'a T),
    Owned(T),
}

impl<T> std::ops::Deref for ValueRef<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self {
            Self::Borrowed(v) => v,
            Self::Owned(v) => v,
        }
    }
}

impl<T: Clone> ValueRef<'_, T> {
    pub fn into_owned(self) -> T {
        match self {
            Self::Borrowed(v) => v.clone(),
            Self::Owned(v) => v,
        }
    }
}

/// Linear interpolation between two values of the same type.
pub trait Lerp: Clone {
    fn lerp(&self, other: &Self, t: f64) -> Self;
}

impl Lerp for f64 {
    fn lerp(&self, other: &Self, t: f64) -> Self {
        self + (other - self) * t
    }
}

impl Lerp for Vec2 {
    fn lerp(&self, other: &Self, t: f64) -> Self {
        Vec2::new(self.x.lerp(&other.x, t), self.y.lerp(&other.y, t))
    }
}

impl Lerp for [f64; 3] {
    fn lerp(&self, other: &Self, t: f64) -> Self {
        [
            self[0].lerp(&other[0], t),
            self[1].lerp(&other[1], t),
            self[2].lerp(&other[2], t),
        ]
    }
}

/// One keyframe of an animated property.
///
/// `end` is the outgoing value toward the next keyframe; when absent the
/// next keyframe's `start` is used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keyframe<T> {
    pub time: f64,
    pub start: T,
    pub end: Option<T>,
}

/// A property that is either fixed or keyframed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AnimTrack<T> {
    Static(T),
    Keyframed(Vec<Keyframe<T>>),
}

impl<T> AnimTrack<T> {
    /// Builds a keyframed track, sorting by time and rejecting empty or
    /// duplicate-time keyframe lists.
    pub fn keyframed(mut keyframes: Vec<Keyframe<T>>, path: &str) -> Result<Self, CompileError> {
        if keyframes.is_empty() {
            return Err(CompileError::InvalidKeyframe {
                reason: "no keyframes".into(),
                path: path.into(),
            });
        }
        keyframes.sort_by_key(|k| OrderedFloat(k.time));
        for pair in keyframes.windows(2) {
            if pair[0].time == pair[1].time {
                return Err(CompileError::InvalidKeyframe {
                    reason: format!("duplicate keyframe time {}", pair[0].time),
                    path: path.into(),
                });
            }
        }
        Ok(Self::Keyframed(keyframes))
    }

    pub fn is_animated(&self) -> bool {
        matches!(self, Self::Keyframed(_))
    }
}

impl<T: Lerp> AnimTrack<T> {
    /// Samples the track at `frame`, clamping outside the keyframe range and
    /// interpolating linearly within it.
    pub fn sample(&self, frame: f64) -> ValueRef<'_, T> {
        match self {
            Self::Static(v) => ValueRef::Borrowed(v),
            Self::Keyframed(keys) => {
                let first = &keys[0];
                if frame <= first.time {
                    return ValueRef::Borrowed(&first.start);
                }
                let last = &keys[keys.len() - 1];
                if frame >= last.time {
                    return ValueRef::Borrowed(&last.start);
                }
                for pair in keys.windows(2) {
                    let (a, b) = (&pair[0], &pair[1]);
                    if frame < b.time {
                        let t = (frame - a.time) / (b.time - a.time);
                        let to = a.end.as_ref().unwrap_or(&b.start);
                        return ValueRef::Owned(a.start.lerp(to, t));
                    }
                }
                unreachable!("frame within keyframe range but no segment matched")
            }
        }
    }
}

/// Animatable TRS + opacity, used both as the layer-level transform and as
/// a shape-group transform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformTrack {
    pub position: AnimTrack<Vec2>,
    pub anchor: AnimTrack<Vec2>,
    /// Percent, 100 = identity.
    pub scale: AnimTrack<Vec2>,
    /// Degrees, clockwise in screen coordinates.
    pub rotation: AnimTrack<f64>,
    /// Lottie range 0..100.
    pub opacity: AnimTrack<f64>,
}

/// Transform attached to a shape group; same shape as the layer transform.
pub type GroupTransform = TransformTrack;

impl Default for TransformTrack {
    fn default() -> Self {
        Self {
            position: AnimTrack::Static(Vec2::ZERO),
            anchor: AnimTrack::Static(Vec2::ZERO),
            scale: AnimTrack::Static(Vec2::new(100.0, 100.0)),
            rotation: AnimTrack::Static(0.0),
            opacity: AnimTrack::Static(100.0),
        }
    }
}

impl TransformTrack {
    pub fn matrix(&self, frame: f64) -> Affine {
        geom::trs_matrix(
            *self.position.sample(frame),
            *self.anchor.sample(frame),
            *self.scale.sample(frame),
            *self.rotation.sample(frame),
        )
    }

    /// Opacity normalized to [0, 1].
    pub fn opacity_at(&self, frame: f64) -> f64 {
        (*self.opacity.sample(frame) / 100.0).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineCap {
    Butt = 1,
    Round = 2,
    Square = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineJoin {
    Miter = 1,
    Round = 2,
    Bevel = 3,
}

impl LineCap {
    pub fn from_lottie(raw: i64) -> Option<Self> {
        match raw {
            1 => Some(Self::Butt),
            2 => Some(Self::Round),
            3 => Some(Self::Square),
            _ => None,
        }
    }
}

impl LineJoin {
    pub fn from_lottie(raw: i64) -> Option<Self> {
        match raw {
            1 => Some(Self::Miter),
            2 => Some(Self::Round),
            3 => Some(Self::Bevel),
            _ => None,
        }
    }
}

/// Largest stroke width the pipeline accepts.
pub const MAX_STROKE_WIDTH: f64 = 2048.0;

/// Stroke styling for a shape layer. Color and opacity are static; width
/// may animate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrokeStyle {
    /// RGB in 0..1.
    pub color: [f64; 3],
    /// 0..1.
    pub opacity: f64,
    pub width: AnimTrack<f64>,
    pub line_cap: LineCap,
    pub line_join: LineJoin,
    pub miter_limit: f64,
}

impl StrokeStyle {
    /// Sampled width, clamped to (0, MAX_STROKE_WIDTH].
    pub fn width_at(&self, frame: f64) -> f64 {
        let w = *self.width.sample(frame);
        w.clamp(f64::MIN_POSITIVE, MAX_STROKE_WIDTH)
    }
}
