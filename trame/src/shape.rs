//! Shape-tree extraction: finds the animation's bound path, the group
//! transforms above it, and the stroke/fill styling.
//!
//! Paths are returned in local coordinates; transforms are never baked
//! into vertices. Rectangle, ellipse and polystar primitives are
//! synthesized into Bezier form.

use kurbo::{Point, Vec2};

use crate::error::CompileError;
use crate::lottie::{
    self, EllipseShape, PathShape, PolystarShape, Property, RectShape, ShapeItem, StrokeShape,
    TransformShape,
};
use crate::path::{AnimPath, BezierPath, PathKeyframe};
use crate::value::{AnimTrack, GroupTransform, LineCap, LineJoin, StrokeStyle, MAX_STROKE_WIDTH};

/// Cubic control distance for a quarter circle, as a fraction of radius.
const CIRCLE_CONTROL: f64 = 0.551_915_024_493_510_6;

enum Primitive<'a> {
    Bezier(&'a PathShape),
    Rect(&'a RectShape),
    Ellipse(&'a EllipseShape),
    Polystar(&'a PolystarShape),
}

struct Found<'a> {
    primitive: Primitive<'a>,
    /// Transforms of the ancestor groups, outermost first.
    chain: Vec<&'a TransformShape>,
    json_path: String,
}

fn find_first_primitive<'a>(items: &'a [ShapeItem], base: &str) -> Option<Found<'a>> {
    fn walk<'a>(
        items: &'a [ShapeItem],
        base: &str,
        chain: &mut Vec<&'a TransformShape>,
    ) -> Option<Found<'a>> {
        for (i, item) in items.iter().enumerate() {
            let json_path = format!("{base}[{i}]");
            let primitive = match item {
                ShapeItem::Path(s) => Some(Primitive::Bezier(s)),
                ShapeItem::Rect(s) => Some(Primitive::Rect(s)),
                ShapeItem::Ellipse(s) => Some(Primitive::Ellipse(s)),
                ShapeItem::Polystar(s) => Some(Primitive::Polystar(s)),
                _ => None,
            };
            if let Some(primitive) = primitive {
                return Some(Found {
                    primitive,
                    chain: chain.clone(),
                    json_path,
                });
            }
            if let ShapeItem::Group(group) = item {
                let transform = group.it.iter().find_map(|it| match it {
                    ShapeItem::Transform(t) => Some(t),
                    _ => None,
                });
                if let Some(t) = transform {
                    chain.push(t);
                }
                if let Some(found) = walk(&group.it, &format!("{json_path}.it"), chain) {
                    return Some(found);
                }
                if transform.is_some() {
                    chain.pop();
                }
            }
        }
        None
    }
    walk(items, base, &mut Vec::new())
}

/// Number of concrete path primitives in the whole tree.
pub fn path_primitive_count(items: &[ShapeItem]) -> usize {
    items
        .iter()
        .map(|item| match item {
            ShapeItem::Path(_) | ShapeItem::Rect(_) | ShapeItem::Ellipse(_)
            | ShapeItem::Polystar(_) => 1,
            ShapeItem::Group(g) => path_primitive_count(&g.it),
            _ => 0,
        })
        .sum()
}

/// First trim/merge/repeater modifier in the tree, if any.
pub fn forbidden_modifier(items: &[ShapeItem]) -> Option<&'static str> {
    items.iter().find_map(|item| match item {
        ShapeItem::Trim(_) => Some("trim"),
        ShapeItem::Merge(_) => Some("merge"),
        ShapeItem::Repeater(_) => Some("repeater"),
        ShapeItem::Group(g) => forbidden_modifier(&g.it),
        _ => None,
    })
}

/// First concrete path in depth-first order, as an [`AnimPath`], or `None`
/// when the tree has no path primitive.
pub fn extract_anim_path(
    items: &[ShapeItem],
    base: &str,
) -> Result<Option<AnimPath>, CompileError> {
    let Some(found) = find_first_primitive(items, base) else {
        return Ok(None);
    };
    let path = match found.primitive {
        Primitive::Bezier(shape) => {
            lottie::decode_anim_path(&shape.ks, &format!("{}.ks", found.json_path))?
        }
        Primitive::Rect(shape) => synthesize_rect(shape, &found.json_path)?,
        Primitive::Ellipse(shape) => synthesize_ellipse(shape, &found.json_path)?,
        Primitive::Polystar(shape) => synthesize_polystar(shape, &found.json_path)?,
    };
    Ok(Some(path))
}

/// Group transforms on the ancestor chain of the extracted path, outermost
/// first. Sibling groups contribute nothing; empty means identity.
pub fn extract_group_transforms(
    items: &[ShapeItem],
    base: &str,
) -> Result<Vec<GroupTransform>, CompileError> {
    let Some(found) = find_first_primitive(items, base) else {
        return Ok(Vec::new());
    };
    found
        .chain
        .iter()
        .map(|t| decode_group_transform(t, base))
        .collect()
}

fn decode_group_transform(
    spec: &TransformShape,
    base: &str,
) -> Result<GroupTransform, CompileError> {
    Ok(GroupTransform {
        position: lottie::decode_vec2_track(spec.p.as_ref(), Vec2::ZERO, &format!("{base}.tr.p"))?,
        anchor: lottie::decode_vec2_track(spec.a.as_ref(), Vec2::ZERO, &format!("{base}.tr.a"))?,
        scale: lottie::decode_vec2_track(
            spec.s.as_ref(),
            Vec2::new(100.0, 100.0),
            &format!("{base}.tr.s"),
        )?,
        rotation: lottie::decode_scalar_track(spec.r.as_ref(), 0.0, &format!("{base}.tr.r"))?,
        opacity: lottie::decode_scalar_track(spec.o.as_ref(), 100.0, &format!("{base}.tr.o"))?,
    })
}

/// Nested search for stroke styling. Dashes, animated color and animated
/// opacity are rejected.
pub fn extract_stroke_style(
    items: &[ShapeItem],
    base: &str,
) -> Result<Option<StrokeStyle>, CompileError> {
    fn find_stroke<'a>(items: &'a [ShapeItem], base: &str) -> Option<(&'a StrokeShape, String)> {
        for (i, item) in items.iter().enumerate() {
            match item {
                ShapeItem::Stroke(s) => return Some((s, format!("{base}[{i}]"))),
                ShapeItem::Group(g) => {
                    if let Some(found) = find_stroke(&g.it, &format!("{base}[{i}].it")) {
                        return Some(found);
                    }
                }
                _ => {}
            }
        }
        None
    }

    let Some((stroke, json_path)) = find_stroke(items, base) else {
        return Ok(None);
    };
    let dashed = match &stroke.d {
        None | Some(serde_json::Value::Null) => false,
        Some(serde_json::Value::Array(items)) => !items.is_empty(),
        Some(_) => true,
    };
    if dashed {
        return Err(CompileError::UnsupportedShapeFeature {
            feature: "dashed stroke".into(),
            path: format!("{json_path}.d"),
        });
    }
    let color = lottie::decode_color_static(stroke.c.as_ref(), false, &format!("{json_path}.c"))?;
    let opacity =
        lottie::decode_scalar_static(stroke.o.as_ref(), 100.0, false, &format!("{json_path}.o"))?
            / 100.0;
    let width = lottie::decode_scalar_track(stroke.w.as_ref(), 1.0, &format!("{json_path}.w"))?;
    if let AnimTrack::Static(w) = &width {
        if *w <= 0.0 || *w > MAX_STROKE_WIDTH {
            return Err(CompileError::UnsupportedShapeFeature {
                feature: format!("stroke width {w} outside (0, {MAX_STROKE_WIDTH}]"),
                path: format!("{json_path}.w"),
            });
        }
    }
    let line_cap = LineCap::from_lottie(stroke.lc.unwrap_or(1)).ok_or_else(|| {
        CompileError::UnsupportedShapeFeature {
            feature: format!("line cap {:?}", stroke.lc),
            path: format!("{json_path}.lc"),
        }
    })?;
    let line_join = LineJoin::from_lottie(stroke.lj.unwrap_or(1)).ok_or_else(|| {
        CompileError::UnsupportedShapeFeature {
            feature: format!("line join {:?}", stroke.lj),
            path: format!("{json_path}.lj"),
        }
    })?;
    let miter_limit = stroke.ml.unwrap_or(4.0);
    if miter_limit < 0.0 {
        return Err(CompileError::UnsupportedShapeFeature {
            feature: format!("miter limit {miter_limit}"),
            path: format!("{json_path}.ml"),
        });
    }
    Ok(Some(StrokeStyle {
        color,
        opacity: opacity.clamp(0.0, 1.0),
        width,
        line_cap,
        line_join,
        miter_limit,
    }))
}

/// Nested search for fill styling: static color plus 0..100 opacity.
pub fn extract_fill(
    items: &[ShapeItem],
    base: &str,
) -> Result<Option<([f64; 3], f64)>, CompileError> {
    for (i, item) in items.iter().enumerate() {
        match item {
            ShapeItem::Fill(fill) => {
                let json_path = format!("{base}[{i}]");
                let color =
                    lottie::decode_color_static(fill.c.as_ref(), true, &format!("{json_path}.c"))?;
                let opacity = lottie::decode_scalar_static(
                    fill.o.as_ref(),
                    100.0,
                    true,
                    &format!("{json_path}.o"),
                )?;
                return Ok(Some((color, opacity)));
            }
            ShapeItem::Group(g) => {
                if let Some(found) = extract_fill(&g.it, &format!("{base}[{i}].it"))? {
                    return Ok(Some(found));
                }
            }
            _ => {}
        }
    }
    Ok(None)
}

// ---------------------------------------------------------------------------
// Primitive synthesis
// ---------------------------------------------------------------------------

fn reversed(path: BezierPath) -> BezierPath {
    let n = path.len();
    let vertices = (0..n).map(|i| path.vertices()[n - 1 - i]).collect();
    let in_tangents = (0..n).map(|i| path.out_tangents()[n - 1 - i]).collect();
    let out_tangents = (0..n).map(|i| path.in_tangents()[n - 1 - i]).collect();
    BezierPath::new(vertices, in_tangents, out_tangents, path.is_closed())
}

fn oriented(path: BezierPath, direction: Option<i64>) -> BezierPath {
    if direction == Some(3) {
        reversed(path)
    } else {
        path
    }
}

/// Checks that every animated property among `props` carries the same
/// keyframe time set, and returns it (`None` when all are static).
fn shared_times(
    props: &[(&str, Option<&Property>)],
    json_path: &str,
) -> Result<Option<Vec<f64>>, CompileError> {
    let mut shared: Option<Vec<f64>> = None;
    for (name, prop) in props {
        let Some(prop) = prop else { continue };
        let Some(times) = lottie::keyframe_times(prop, &format!("{json_path}.{name}"))? else {
            continue;
        };
        match &shared {
            None => shared = Some(times),
            Some(existing) if *existing == times => {}
            Some(_) => {
                return Err(CompileError::UnsupportedShapeFeature {
                    feature: "animated properties with mismatched keyframe times".into(),
                    path: json_path.into(),
                });
            }
        }
    }
    Ok(shared)
}

fn build_anim_path<F>(
    times: Option<Vec<f64>>,
    json_path: &str,
    synthesize: F,
) -> Result<AnimPath, CompileError>
where
    F: Fn(f64) -> Result<BezierPath, CompileError>,
{
    match times {
        None => Ok(AnimPath::Static(synthesize(0.0)?)),
        Some(times) => {
            let keys = times
                .into_iter()
                .map(|time| {
                    Ok(PathKeyframe {
                        time,
                        path: synthesize(time)?,
                    })
                })
                .collect::<Result<Vec<_>, CompileError>>()?;
            AnimPath::keyframed(keys, json_path)
        }
    }
}

fn synthesize_rect(shape: &RectShape, json_path: &str) -> Result<AnimPath, CompileError> {
    let position =
        lottie::decode_vec2_track(Some(&shape.p), Vec2::ZERO, &format!("{json_path}.p"))?;
    let size = lottie::decode_vec2_track(Some(&shape.s), Vec2::ZERO, &format!("{json_path}.s"))?;
    let roundness = lottie::decode_scalar_track(shape.r.as_ref(), 0.0, &format!("{json_path}.r"))?;
    let times = shared_times(
        &[
            ("p", Some(&shape.p)),
            ("s", Some(&shape.s)),
            ("r", shape.r.as_ref()),
        ],
        json_path,
    )?;
    let direction = shape.d;
    build_anim_path(times, json_path, |time| {
        let center = *position.sample(time);
        let dims = *size.sample(time);
        if dims.x <= 0.0 || dims.y <= 0.0 {
            return Err(CompileError::UnsupportedShapeFeature {
                feature: format!("rectangle with non-positive size {}x{}", dims.x, dims.y),
                path: format!("{json_path}.s"),
            });
        }
        let r = roundness.sample(time).max(0.0);
        Ok(oriented(rect_contour(center, dims, r), direction))
    })
}

fn rect_contour(center: Vec2, size: Vec2, roundness: f64) -> BezierPath {
    let (hw, hh) = (size.x / 2.0, size.y / 2.0);
    let (cx, cy) = (center.x, center.y);
    if roundness <= 0.0 {
        // Clockwise from the top-right corner.
        let vertices = vec![
            Point::new(cx + hw, cy - hh),
            Point::new(cx + hw, cy + hh),
            Point::new(cx - hw, cy + hh),
            Point::new(cx - hw, cy - hh),
        ];
        return BezierPath::new(vertices, vec![Vec2::ZERO; 4], vec![Vec2::ZERO; 4], true);
    }
    let r = roundness.min(hw).min(hh);
    let k = CIRCLE_CONTROL * r;
    // Two vertices per corner, clockwise starting on the right edge.
    let vertices = vec![
        Point::new(cx + hw, cy - hh + r),
        Point::new(cx + hw, cy + hh - r),
        Point::new(cx + hw - r, cy + hh),
        Point::new(cx - hw + r, cy + hh),
        Point::new(cx - hw, cy + hh - r),
        Point::new(cx - hw, cy - hh + r),
        Point::new(cx - hw + r, cy - hh),
        Point::new(cx + hw - r, cy - hh),
    ];
    let in_tangents = vec![
        Vec2::new(0.0, -k),
        Vec2::ZERO,
        Vec2::new(k, 0.0),
        Vec2::ZERO,
        Vec2::new(0.0, k),
        Vec2::ZERO,
        Vec2::new(-k, 0.0),
        Vec2::ZERO,
    ];
    let out_tangents = vec![
        Vec2::ZERO,
        Vec2::new(0.0, k),
        Vec2::ZERO,
        Vec2::new(-k, 0.0),
        Vec2::ZERO,
        Vec2::new(0.0, -k),
        Vec2::ZERO,
        Vec2::new(k, 0.0),
    ];
    BezierPath::new(vertices, in_tangents, out_tangents, true)
}

fn synthesize_ellipse(shape: &EllipseShape, json_path: &str) -> Result<AnimPath, CompileError> {
    let position =
        lottie::decode_vec2_track(Some(&shape.p), Vec2::ZERO, &format!("{json_path}.p"))?;
    let size = lottie::decode_vec2_track(Some(&shape.s), Vec2::ZERO, &format!("{json_path}.s"))?;
    let times = shared_times(&[("p", Some(&shape.p)), ("s", Some(&shape.s))], json_path)?;
    let direction = shape.d;
    build_anim_path(times, json_path, |time| {
        let center = *position.sample(time);
        let dims = *size.sample(time);
        if dims.x <= 0.0 || dims.y <= 0.0 {
            return Err(CompileError::UnsupportedShapeFeature {
                feature: format!("ellipse with non-positive size {}x{}", dims.x, dims.y),
                path: format!("{json_path}.s"),
            });
        }
        Ok(oriented(ellipse_contour(center, dims), direction))
    })
}

fn ellipse_contour(center: Vec2, size: Vec2) -> BezierPath {
    let (rx, ry) = (size.x / 2.0, size.y / 2.0);
    let (cx, cy) = (center.x, center.y);
    let (kx, ky) = (CIRCLE_CONTROL * rx, CIRCLE_CONTROL * ry);
    // Clockwise from the top: top, right, bottom, left.
    let vertices = vec![
        Point::new(cx, cy - ry),
        Point::new(cx + rx, cy),
        Point::new(cx, cy + ry),
        Point::new(cx - rx, cy),
    ];
    let in_tangents = vec![
        Vec2::new(-kx, 0.0),
        Vec2::new(0.0, -ky),
        Vec2::new(kx, 0.0),
        Vec2::new(0.0, ky),
    ];
    let out_tangents = vec![
        Vec2::new(kx, 0.0),
        Vec2::new(0.0, ky),
        Vec2::new(-kx, 0.0),
        Vec2::new(0.0, -ky),
    ];
    BezierPath::new(vertices, in_tangents, out_tangents, true)
}

const STAR: i64 = 1;

fn synthesize_polystar(shape: &PolystarShape, json_path: &str) -> Result<AnimPath, CompileError> {
    if lottie::keyframe_times(&shape.pt, &format!("{json_path}.pt"))?.is_some() {
        return Err(CompileError::UnsupportedShapeFeature {
            feature: "animated polystar point count".into(),
            path: format!("{json_path}.pt"),
        });
    }
    for (name, prop) in [("os", shape.os.as_ref()), ("is", shape.is.as_ref())] {
        let round =
            lottie::decode_scalar_static(prop, 0.0, true, &format!("{json_path}.{name}"))?;
        if round != 0.0 {
            return Err(CompileError::UnsupportedShapeFeature {
                feature: "polystar roundness".into(),
                path: format!("{json_path}.{name}"),
            });
        }
    }
    let points =
        lottie::decode_scalar_static(Some(&shape.pt), 5.0, false, &format!("{json_path}.pt"))?;
    if !(3.0..=100.0).contains(&points) {
        return Err(CompileError::UnsupportedShapeFeature {
            feature: format!("polystar with {points} points"),
            path: format!("{json_path}.pt"),
        });
    }
    let points = points.round() as usize;
    let is_star = shape.sy.unwrap_or(STAR) == STAR;

    let position =
        lottie::decode_vec2_track(Some(&shape.p), Vec2::ZERO, &format!("{json_path}.p"))?;
    let rotation = lottie::decode_scalar_track(shape.r.as_ref(), 0.0, &format!("{json_path}.r"))?;
    let outer = lottie::decode_scalar_track(shape.or.as_ref(), 0.0, &format!("{json_path}.or"))?;
    let inner = lottie::decode_scalar_track(shape.ir.as_ref(), 0.0, &format!("{json_path}.ir"))?;
    let times = shared_times(
        &[
            ("p", Some(&shape.p)),
            ("r", shape.r.as_ref()),
            ("or", shape.or.as_ref()),
            ("ir", shape.ir.as_ref()),
        ],
        json_path,
    )?;
    let direction = shape.d;
    build_anim_path(times, json_path, |time| {
        let center = *position.sample(time);
        let rot = *rotation.sample(time);
        let outer_r = *outer.sample(time);
        if outer_r <= 0.0 {
            return Err(CompileError::UnsupportedShapeFeature {
                feature: format!("polystar outer radius {outer_r}"),
                path: format!("{json_path}.or"),
            });
        }
        let inner_r = if is_star {
            let r = *inner.sample(time);
            if r <= 0.0 || r >= outer_r {
                return Err(CompileError::UnsupportedShapeFeature {
                    feature: format!("polystar inner radius {r} (outer {outer_r})"),
                    path: format!("{json_path}.ir"),
                });
            }
            Some(r)
        } else {
            None
        };
        Ok(oriented(
            polystar_contour(center, points, outer_r, inner_r, rot),
            direction,
        ))
    })
}

/// Vertex at clockwise angle `deg` from straight up.
fn star_point(center: Vec2, radius: f64, deg: f64) -> Point {
    let rad = deg.to_radians();
    Point::new(center.x + radius * rad.sin(), center.y - radius * rad.cos())
}

fn polystar_contour(
    center: Vec2,
    points: usize,
    outer_r: f64,
    inner_r: Option<f64>,
    rotation_deg: f64,
) -> BezierPath {
    let step = 360.0 / points as f64;
    let mut vertices = Vec::new();
    for i in 0..points {
        let angle = rotation_deg + i as f64 * step;
        vertices.push(star_point(center, outer_r, angle));
        if let Some(inner_r) = inner_r {
            vertices.push(star_point(center, inner_r, angle + step / 2.0));
        }
    }
    let n = vertices.len();
    BezierPath::new(vertices, vec![Vec2::ZERO; n], vec![Vec2::ZERO; n], true)
}
