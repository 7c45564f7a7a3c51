//! Serde model of the Lottie-subset documents the compiler reads, plus
//! property decoding into [`AnimTrack`]s and [`AnimPath`]s.
//!
//! Only the fields the compiler actually consumes are modeled; everything
//! else passes through `serde_json::Value` or is ignored. Property payloads
//! (`k`) stay raw until decode so errors can point at the offending node.

use kurbo::{Point, Vec2};
use serde::Deserialize;
use serde_json::Value;

use crate::error::CompileError;
use crate::path::{AnimPath, BezierPath, PathKeyframe};
use crate::value::{AnimTrack, Keyframe};

/// Lottie layer `ty` discriminants (the supported subset).
pub mod layer_type {
    pub const PRECOMP: i64 = 0;
    pub const IMAGE: i64 = 2;
    pub const NULL: i64 = 3;
    pub const SHAPE: i64 = 4;
    pub const TEXT: i64 = 5;
}

#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub v: Option<String>,
    pub fr: f64,
    pub ip: f64,
    pub op: f64,
    pub w: f64,
    pub h: f64,
    #[serde(default)]
    pub assets: Vec<Asset>,
    #[serde(default)]
    pub layers: Vec<Layer>,
    #[serde(default)]
    pub markers: Vec<Value>,
}

impl Document {
    pub fn from_str(json: &str) -> Result<Self, CompileError> {
        serde_json::from_str(json).map_err(|e| CompileError::MalformedDocument {
            reason: e.to_string(),
            path: "$".into(),
        })
    }

    pub fn from_value(json: Value) -> Result<Self, CompileError> {
        serde_json::from_value(json).map_err(|e| CompileError::MalformedDocument {
            reason: e.to_string(),
            path: "$".into(),
        })
    }
}

/// Image or precomp asset. Precomps carry a layer list.
#[derive(Debug, Clone, Deserialize)]
pub struct Asset {
    pub id: String,
    #[serde(default)]
    pub nm: Option<String>,
    #[serde(default)]
    pub w: Option<f64>,
    #[serde(default)]
    pub h: Option<f64>,
    #[serde(default)]
    pub u: Option<String>,
    #[serde(default)]
    pub p: Option<String>,
    #[serde(default)]
    pub e: Option<i64>,
    #[serde(default)]
    pub fr: Option<f64>,
    #[serde(default)]
    pub layers: Option<Vec<Layer>>,
}

impl Asset {
    pub fn is_precomp(&self) -> bool {
        self.layers.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Layer {
    #[serde(default)]
    pub ind: Option<i64>,
    pub ty: i64,
    #[serde(default)]
    pub nm: Option<String>,
    #[serde(default, rename = "refId")]
    pub ref_id: Option<String>,
    #[serde(default)]
    pub ks: Option<TransformSpec>,
    #[serde(default, rename = "hasMask")]
    pub has_mask: Option<bool>,
    #[serde(default, rename = "masksProperties")]
    pub masks_properties: Vec<MaskSpec>,
    #[serde(default)]
    pub ip: Option<f64>,
    #[serde(default)]
    pub op: Option<f64>,
    #[serde(default)]
    pub st: Option<f64>,
    #[serde(default)]
    pub parent: Option<i64>,
    #[serde(default)]
    pub hd: Option<bool>,
    #[serde(default)]
    pub td: Option<i64>,
    #[serde(default)]
    pub tt: Option<i64>,
    #[serde(default)]
    pub tp: Option<i64>,
    #[serde(default)]
    pub shapes: Vec<ShapeItem>,
    #[serde(default)]
    pub w: Option<f64>,
    #[serde(default)]
    pub h: Option<f64>,
}

impl Layer {
    pub fn name(&self) -> &str {
        self.nm.as_deref().unwrap_or("")
    }

    pub fn is_hidden(&self) -> bool {
        self.hd.unwrap_or(false)
    }

    pub fn is_matte_source_flagged(&self) -> bool {
        self.td.unwrap_or(0) == 1
    }
}

/// The `ks` block: opacity, rotation, position, anchor, scale.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransformSpec {
    #[serde(default)]
    pub o: Option<Property>,
    #[serde(default)]
    pub r: Option<Property>,
    #[serde(default)]
    pub p: Option<Property>,
    #[serde(default)]
    pub a: Option<Property>,
    #[serde(default)]
    pub s: Option<Property>,
}

/// An animatable property: `a` flag plus raw `k` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct Property {
    #[serde(default)]
    pub a: Option<i64>,
    #[serde(default)]
    pub k: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MaskSpec {
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub inv: Option<bool>,
    #[serde(default)]
    pub pt: Option<Property>,
    #[serde(default)]
    pub o: Option<Property>,
    #[serde(default)]
    pub nm: Option<String>,
}

/// Shape-tree items, tagged by `ty` like bodymovin's `AnyShape`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "ty")]
pub enum ShapeItem {
    #[serde(rename = "gr")]
    Group(GroupShape),
    #[serde(rename = "sh")]
    Path(PathShape),
    #[serde(rename = "fl")]
    Fill(FillShape),
    #[serde(rename = "st")]
    Stroke(StrokeShape),
    #[serde(rename = "tr")]
    Transform(TransformShape),
    #[serde(rename = "rc")]
    Rect(RectShape),
    #[serde(rename = "el")]
    Ellipse(EllipseShape),
    #[serde(rename = "sr")]
    Polystar(PolystarShape),
    #[serde(rename = "tm")]
    Trim(ModifierShape),
    #[serde(rename = "mm")]
    Merge(ModifierShape),
    #[serde(rename = "rp")]
    Repeater(ModifierShape),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupShape {
    #[serde(default)]
    pub nm: Option<String>,
    #[serde(default)]
    pub it: Vec<ShapeItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathShape {
    #[serde(default)]
    pub nm: Option<String>,
    pub ks: Property,
    #[serde(default)]
    pub d: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FillShape {
    #[serde(default)]
    pub nm: Option<String>,
    #[serde(default)]
    pub c: Option<Property>,
    #[serde(default)]
    pub o: Option<Property>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StrokeShape {
    #[serde(default)]
    pub nm: Option<String>,
    #[serde(default)]
    pub c: Option<Property>,
    #[serde(default)]
    pub o: Option<Property>,
    #[serde(default)]
    pub w: Option<Property>,
    #[serde(default)]
    pub lc: Option<i64>,
    #[serde(default)]
    pub lj: Option<i64>,
    #[serde(default)]
    pub ml: Option<f64>,
    /// Dash array; any presence is rejected.
    #[serde(default)]
    pub d: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransformShape {
    #[serde(default)]
    pub nm: Option<String>,
    #[serde(default)]
    pub p: Option<Property>,
    #[serde(default)]
    pub a: Option<Property>,
    #[serde(default)]
    pub s: Option<Property>,
    #[serde(default)]
    pub r: Option<Property>,
    #[serde(default)]
    pub o: Option<Property>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RectShape {
    #[serde(default)]
    pub nm: Option<String>,
    pub p: Property,
    pub s: Property,
    #[serde(default)]
    pub r: Option<Property>,
    #[serde(default)]
    pub d: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EllipseShape {
    #[serde(default)]
    pub nm: Option<String>,
    pub p: Property,
    pub s: Property,
    #[serde(default)]
    pub d: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PolystarShape {
    #[serde(default)]
    pub nm: Option<String>,
    pub p: Property,
    pub pt: Property,
    #[serde(default)]
    pub r: Option<Property>,
    #[serde(default)]
    pub or: Option<Property>,
    #[serde(default)]
    pub ir: Option<Property>,
    #[serde(default)]
    pub os: Option<Property>,
    #[serde(default)]
    pub is: Option<Property>,
    /// 1 = star, 2 = polygon.
    #[serde(default)]
    pub sy: Option<i64>,
    #[serde(default)]
    pub d: Option<i64>,
}

/// Trim / merge / repeater; only their presence matters.
#[derive(Debug, Clone, Deserialize)]
pub struct ModifierShape {
    #[serde(default)]
    pub nm: Option<String>,
}

// ---------------------------------------------------------------------------
// Property decoding
// ---------------------------------------------------------------------------

fn number_of(v: &Value) -> Option<f64> {
    v.as_f64()
}

/// Scalars arrive either bare or as a one-element array.
fn scalar_of(v: &Value) -> Option<f64> {
    match v {
        Value::Number(_) => v.as_f64(),
        Value::Array(items) => items.first().and_then(number_of),
        _ => None,
    }
}

fn vec2_of(v: &Value) -> Option<Vec2> {
    let items = v.as_array()?;
    Some(Vec2::new(
        number_of(items.first()?)?,
        number_of(items.get(1)?)?,
    ))
}

fn color_of(v: &Value) -> Option<[f64; 3]> {
    let items = v.as_array()?;
    Some([
        number_of(items.first()?)?,
        number_of(items.get(1)?)?,
        number_of(items.get(2)?)?,
    ])
}

fn point_list_of(v: &Value) -> Option<Vec<Point>> {
    v.as_array()?
        .iter()
        .map(|p| vec2_of(p).map(|v| Point::new(v.x, v.y)))
        .collect()
}

fn vec_list_of(v: &Value) -> Option<Vec<Vec2>> {
    v.as_array()?.iter().map(vec2_of).collect()
}

/// Decodes a `{v, i, o, c}` shape object into a [`BezierPath`].
fn bezier_of(v: &Value, path: &str) -> Result<BezierPath, CompileError> {
    let malformed = |reason: &str| CompileError::MalformedDocument {
        reason: reason.into(),
        path: path.into(),
    };
    let obj = v.as_object().ok_or_else(|| malformed("shape value is not an object"))?;
    let vertices = obj
        .get("v")
        .and_then(point_list_of)
        .ok_or_else(|| malformed("shape value has no vertex list"))?;
    let in_tangents = obj
        .get("i")
        .and_then(vec_list_of)
        .ok_or_else(|| malformed("shape value has no in-tangent list"))?;
    let out_tangents = obj
        .get("o")
        .and_then(vec_list_of)
        .ok_or_else(|| malformed("shape value has no out-tangent list"))?;
    if vertices.len() != in_tangents.len() || vertices.len() != out_tangents.len() {
        return Err(malformed("tangent list length differs from vertex count"));
    }
    let closed = obj.get("c").and_then(Value::as_bool).unwrap_or(false);
    Ok(BezierPath::new(vertices, in_tangents, out_tangents, closed))
}

/// A keyframed shape `s` payload is usually a one-element array of shape
/// objects; a bare object also occurs.
fn keyframe_bezier_of(v: &Value, path: &str) -> Result<BezierPath, CompileError> {
    match v {
        Value::Array(items) if !items.is_empty() => bezier_of(&items[0], path),
        other => bezier_of(other, path),
    }
}

fn is_keyframe_list(k: &Value) -> bool {
    matches!(k, Value::Array(items) if items.first().is_some_and(Value::is_object))
}

fn is_animated(prop: &Property) -> bool {
    match prop.a {
        Some(1) => true,
        Some(_) => false,
        None => is_keyframe_list(&prop.k),
    }
}

/// Pulls `(t, s, e?)` out of one raw keyframe object; missing `t` or `s`
/// is fatal.
fn keyframe_parts<'a>(
    raw: &'a Value,
    index: usize,
    path: &str,
) -> Result<(f64, &'a Value, Option<&'a Value>), CompileError> {
    let obj = raw.as_object().ok_or_else(|| CompileError::InvalidKeyframe {
        reason: format!("keyframe {index} is not an object"),
        path: path.into(),
    })?;
    let time = obj
        .get("t")
        .and_then(Value::as_f64)
        .ok_or_else(|| CompileError::InvalidKeyframe {
            reason: format!("keyframe {index} has no time"),
            path: path.into(),
        })?;
    let start = obj.get("s").ok_or_else(|| CompileError::InvalidKeyframe {
        reason: format!("keyframe {index} has no start value"),
        path: path.into(),
    })?;
    Ok((time, start, obj.get("e")))
}

fn decode_track<T, F>(
    prop: Option<&Property>,
    default: T,
    path: &str,
    decode_one: F,
) -> Result<AnimTrack<T>, CompileError>
where
    T: Clone,
    F: Fn(&Value) -> Option<T>,
{
    let Some(prop) = prop else {
        return Ok(AnimTrack::Static(default));
    };
    if !is_animated(prop) {
        let value = decode_one(&prop.k).ok_or_else(|| CompileError::MalformedDocument {
            reason: "static property value has unexpected shape".into(),
            path: path.into(),
        })?;
        return Ok(AnimTrack::Static(value));
    }
    let raw_keys = prop.k.as_array().ok_or_else(|| CompileError::InvalidKeyframe {
        reason: "animated property is not a keyframe list".into(),
        path: path.into(),
    })?;
    let mut keys = Vec::with_capacity(raw_keys.len());
    for (index, raw) in raw_keys.iter().enumerate() {
        let (time, start, end) = keyframe_parts(raw, index, path)?;
        let start = decode_one(start).ok_or_else(|| CompileError::InvalidKeyframe {
            reason: format!("keyframe {index} start value has unexpected shape"),
            path: path.into(),
        })?;
        let end = end.and_then(|e| decode_one(e));
        keys.push(Keyframe { time, start, end });
    }
    AnimTrack::keyframed(keys, path)
}

pub fn decode_scalar_track(
    prop: Option<&Property>,
    default: f64,
    path: &str,
) -> Result<AnimTrack<f64>, CompileError> {
    decode_track(prop, default, path, scalar_of)
}

pub fn decode_vec2_track(
    prop: Option<&Property>,
    default: Vec2,
    path: &str,
) -> Result<AnimTrack<Vec2>, CompileError> {
    decode_track(prop, default, path, vec2_of)
}

/// Static color; when the document animates it, the first keyframe's value
/// is used if `lenient`, otherwise the feature is rejected.
pub fn decode_color_static(
    prop: Option<&Property>,
    lenient: bool,
    path: &str,
) -> Result<[f64; 3], CompileError> {
    let Some(prop) = prop else {
        return Ok([0.0, 0.0, 0.0]);
    };
    if !is_animated(prop) {
        return color_of(&prop.k).ok_or_else(|| CompileError::MalformedDocument {
            reason: "color value has unexpected shape".into(),
            path: path.into(),
        });
    }
    if !lenient {
        return Err(CompileError::UnsupportedShapeFeature {
            feature: "animated color".into(),
            path: path.into(),
        });
    }
    let first = prop
        .k
        .as_array()
        .and_then(|keys| keys.first())
        .and_then(|k| k.get("s"))
        .and_then(color_of);
    first.ok_or_else(|| CompileError::MalformedDocument {
        reason: "animated color has no usable first keyframe".into(),
        path: path.into(),
    })
}

/// Static scalar with the same leniency rule as [`decode_color_static`].
pub fn decode_scalar_static(
    prop: Option<&Property>,
    default: f64,
    lenient: bool,
    path: &str,
) -> Result<f64, CompileError> {
    let Some(prop) = prop else {
        return Ok(default);
    };
    if !is_animated(prop) {
        return scalar_of(&prop.k).ok_or_else(|| CompileError::MalformedDocument {
            reason: "scalar value has unexpected shape".into(),
            path: path.into(),
        });
    }
    if !lenient {
        return Err(CompileError::UnsupportedShapeFeature {
            feature: "animated scalar".into(),
            path: path.into(),
        });
    }
    let first = prop
        .k
        .as_array()
        .and_then(|keys| keys.first())
        .and_then(|k| k.get("s"))
        .and_then(scalar_of);
    first.ok_or_else(|| CompileError::MalformedDocument {
        reason: "animated scalar has no usable first keyframe".into(),
        path: path.into(),
    })
}

/// Decodes a `sh`/mask path property into an [`AnimPath`].
pub fn decode_anim_path(prop: &Property, path: &str) -> Result<AnimPath, CompileError> {
    if !is_animated(prop) {
        return Ok(AnimPath::Static(bezier_of(&prop.k, path)?));
    }
    let raw_keys = prop.k.as_array().ok_or_else(|| CompileError::InvalidKeyframe {
        reason: "animated path is not a keyframe list".into(),
        path: path.into(),
    })?;
    let mut keys = Vec::with_capacity(raw_keys.len());
    for (index, raw) in raw_keys.iter().enumerate() {
        let (time, start, _end) = keyframe_parts(raw, index, path)?;
        keys.push(PathKeyframe {
            time,
            path: keyframe_bezier_of(start, path)?,
        });
    }
    AnimPath::keyframed(keys, path)
}

/// Keyframe time set of an animated property; `None` for static ones.
/// Used to enforce matching time sets on synthesized shapes.
pub fn keyframe_times(prop: &Property, path: &str) -> Result<Option<Vec<f64>>, CompileError> {
    if !is_animated(prop) {
        return Ok(None);
    }
    let raw_keys = prop.k.as_array().ok_or_else(|| CompileError::InvalidKeyframe {
        reason: "animated property is not a keyframe list".into(),
        path: path.into(),
    })?;
    let mut times = Vec::with_capacity(raw_keys.len());
    for (index, raw) in raw_keys.iter().enumerate() {
        let (time, _, _) = keyframe_parts(raw, index, path)?;
        times.push(time);
    }
    Ok(Some(times))
}
