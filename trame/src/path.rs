//! Bezier paths, animatable paths, and the scene-wide path registry.

use std::collections::HashMap;

use kurbo::{Affine, BezPath, Point, Rect, Shape as _, Vec2};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::error::CompileError;
use crate::value::Lerp;

/// Dense identifier assigned by a [`PathRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PathId(pub u32);

/// A cubic Bezier contour in Lottie vertex form: positions plus relative
/// in/out tangents, one of each per vertex.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BezierPath {
    vertices: Vec<Point>,
    in_tangents: Vec<Vec2>,
    out_tangents: Vec<Vec2>,
    closed: bool,
    bbox: Rect,
}

impl BezierPath {
    pub fn new(
        vertices: Vec<Point>,
        in_tangents: Vec<Vec2>,
        out_tangents: Vec<Vec2>,
        closed: bool,
    ) -> Self {
        debug_assert!(
            vertices.len() == in_tangents.len() && vertices.len() == out_tangents.len(),
            "tangent arrays must match vertex count"
        );
        let mut path = Self {
            vertices,
            in_tangents,
            out_tangents,
            closed,
            bbox: Rect::ZERO,
        };
        path.bbox = if path.vertices.is_empty() {
            Rect::ZERO
        } else {
            path.to_bez_path().bounding_box()
        };
        path
    }

    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    pub fn in_tangents(&self) -> &[Vec2] {
        &self.in_tangents
    }

    pub fn out_tangents(&self) -> &[Vec2] {
        &self.out_tangents
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Cached axis-aligned bounding box (includes curve extrema).
    pub fn bounding_box(&self) -> Rect {
        self.bbox
    }

    /// Expands the contour into an absolute-coordinate [`BezPath`].
    pub fn to_bez_path(&self) -> BezPath {
        let mut path = BezPath::new();
        let n = self.vertices.len();
        if n == 0 {
            return path;
        }
        path.move_to(self.vertices[0]);
        for i in 0..n {
            let next = if i + 1 < n {
                i + 1
            } else if self.closed {
                0
            } else {
                break;
            };
            let start = self.vertices[i];
            let end = self.vertices[next];
            let c0 = start + self.out_tangents[i];
            let c1 = end + self.in_tangents[next];
            path.curve_to(c0, c1, end);
        }
        if self.closed {
            path.close_path();
        }
        path
    }

    /// Applies an affine map to vertices and (linearly) to tangents.
    pub fn transformed(&self, affine: Affine) -> Self {
        let linear = {
            let c = affine.as_coeffs();
            move |v: Vec2| Vec2::new(c[0] * v.x + c[2] * v.y, c[1] * v.x + c[3] * v.y)
        };
        Self::new(
            self.vertices.iter().map(|&p| affine * p).collect(),
            self.in_tangents.iter().copied().map(linear).collect(),
            self.out_tangents.iter().copied().map(linear).collect(),
            self.closed,
        )
    }

    /// Winding-based containment test against the expanded contour.
    pub fn contains(&self, point: Point) -> bool {
        self.to_bez_path().contains(point)
    }
}

impl Lerp for BezierPath {
    fn lerp(&self, other: &Self, t: f64) -> Self {
        debug_assert_eq!(self.len(), other.len(), "lerp requires equal vertex counts");
        let lerp_points = |a: &[Point], b: &[Point]| -> Vec<Point> {
            a.iter()
                .zip(b)
                .map(|(p, q)| Point::new(p.x.lerp(&q.x, t), p.y.lerp(&q.y, t)))
                .collect()
        };
        let lerp_vecs = |a: &[Vec2], b: &[Vec2]| -> Vec<Vec2> {
            a.iter().zip(b).map(|(p, q)| p.lerp(q, t)).collect()
        };
        Self::new(
            lerp_points(&self.vertices, &other.vertices),
            lerp_vecs(&self.in_tangents, &other.in_tangents),
            lerp_vecs(&self.out_tangents, &other.out_tangents),
            self.closed,
        )
    }
}

/// One keyframe of an animated path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathKeyframe {
    pub time: f64,
    pub path: BezierPath,
}

/// A path that is fixed or shape-keyframed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AnimPath {
    Static(BezierPath),
    Keyframed(Vec<PathKeyframe>),
}

impl AnimPath {
    /// Builds a keyframed path, enforcing strictly increasing times and a
    /// uniform vertex count / closed flag across keyframes.
    pub fn keyframed(mut keys: Vec<PathKeyframe>, path: &str) -> Result<Self, CompileError> {
        if keys.is_empty() {
            return Err(CompileError::InvalidKeyframe {
                reason: "no path keyframes".into(),
                path: path.into(),
            });
        }
        keys.sort_by_key(|k| OrderedFloat(k.time));
        for pair in keys.windows(2) {
            if pair[0].time == pair[1].time {
                return Err(CompileError::InvalidKeyframe {
                    reason: format!("duplicate path keyframe time {}", pair[0].time),
                    path: path.into(),
                });
            }
        }
        let first = &keys[0].path;
        for key in &keys[1..] {
            if key.path.len() != first.len() || key.path.is_closed() != first.is_closed() {
                return Err(CompileError::UnsupportedShapeFeature {
                    feature: "path keyframes with differing topology".into(),
                    path: path.into(),
                });
            }
        }
        Ok(Self::Keyframed(keys))
    }

    pub fn is_animated(&self) -> bool {
        matches!(self, Self::Keyframed(_))
    }

    /// Samples at `frame`: clamps outside the range, lerps vertices and
    /// tangents within it.
    pub fn sample(&self, frame: f64) -> BezierPath {
        match self {
            Self::Static(p) => p.clone(),
            Self::Keyframed(keys) => {
                let first = &keys[0];
                if frame <= first.time {
                    return first.path.clone();
                }
                let last = &keys[keys.len() - 1];
                if frame >= last.time {
                    return last.path.clone();
                }
                for pair in keys.windows(2) {
                    let (a, b) = (&pair[0], &pair[1]);
                    if frame < b.time {
                        let t = (frame - a.time) / (b.time - a.time);
                        return a.path.lerp(&b.path, t);
                    }
                }
                unreachable!("frame within path keyframe range but no segment matched")
            }
        }
    }

    /// Bounding box of the first keyframe (or the static path).
    pub fn initial_bounding_box(&self) -> Rect {
        match self {
            Self::Static(p) => p.bounding_box(),
            Self::Keyframed(keys) => keys[0].path.bounding_box(),
        }
    }
}

/// Coordinate quantum for structural path equivalence.
const PATH_KEY_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PathKey(Vec<i64>);

fn quantize(value: f64) -> i64 {
    (value / PATH_KEY_TOLERANCE).round() as i64
}

fn push_contour(words: &mut Vec<i64>, p: &BezierPath) {
    words.push(p.is_closed() as i64);
    words.push(p.len() as i64);
    for ((v, i), o) in p
        .vertices()
        .iter()
        .zip(p.in_tangents())
        .zip(p.out_tangents())
    {
        words.extend([
            quantize(v.x),
            quantize(v.y),
            quantize(i.x),
            quantize(i.y),
            quantize(o.x),
            quantize(o.y),
        ]);
    }
}

fn key_of(path: &AnimPath) -> PathKey {
    let mut words = Vec::new();
    match path {
        AnimPath::Static(p) => {
            words.push(0);
            push_contour(&mut words, p);
        }
        AnimPath::Keyframed(keys) => {
            words.push(keys.len() as i64);
            for key in keys {
                words.push(quantize(key.time));
                push_contour(&mut words, &key.path);
            }
        }
    }
    PathKey(words)
}

/// Interns vector paths, assigning dense ids in first-registration order.
///
/// Shared across one whole scene compilation so identical subpaths
/// deduplicate; identical compilations over the same registry instance
/// produce identical id sequences.
#[derive(Debug, Default)]
pub struct PathRegistry {
    entries: Vec<AnimPath>,
    index: HashMap<PathKey, PathId>,
}

impl PathRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a static path. Equivalent paths (within tolerance) share
    /// one id.
    pub fn register(&mut self, path: &BezierPath) -> PathId {
        self.register_anim(&AnimPath::Static(path.clone()))
    }

    /// Registers an animatable path.
    pub fn register_anim(&mut self, path: &AnimPath) -> PathId {
        let key = key_of(path);
        if let Some(&id) = self.index.get(&key) {
            return id;
        }
        let id = PathId(self.entries.len() as u32);
        self.entries.push(path.clone());
        self.index.insert(key, id);
        id
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn lookup(&self, id: PathId) -> Option<&AnimPath> {
        self.entries.get(id.0 as usize)
    }

    /// Resolves `drawShape(pathId, frame)` for a backend.
    pub fn sample(&self, id: PathId, frame: f64) -> Option<BezierPath> {
        self.lookup(id).map(|p| p.sample(frame))
    }
}
