//! Lottie document to [`AnimIR`] compilation.
//!
//! Compilation is fail-fast: the first structural problem aborts with a
//! [`CompileError`] carrying a JSONPath-like locator. Runtime leniency
//! (skipped subtrees, warnings) lives in the evaluator, not here.

use std::collections::BTreeMap;

use kurbo::{Size, Vec2};
use log::debug;

use crate::assets::{AssetIndex, AssetMeta};
use crate::error::CompileError;
use crate::ir::{
    AnimIR, AnimMeta, BindingInfo, CompRef, Composition, Fill, InputGeometry, Layer,
    LayerContent, LayerKind, LayerTiming, Mask, MaskMode, MatteInfo, MatteMode, ShapeContent,
};
use crate::lottie::{self, layer_type, Document};
use crate::path::PathRegistry;
use crate::shape;
use crate::value::TransformTrack;

/// Name of the hidden shape layer describing the media window.
pub const MEDIA_INPUT_LAYER_NAME: &str = "mediaInput";

/// Compiles one animation document into an [`AnimIR`].
///
/// `registry` is shared across a whole scene compilation so identical
/// subpaths intern to identical ids.
pub fn compile_anim(
    doc: &Document,
    anim_ref: &str,
    binding_key: &str,
    asset_index: &AssetIndex,
    registry: &mut PathRegistry,
) -> Result<AnimIR, CompileError> {
    debug!("compiling '{anim_ref}' (binding key '{binding_key}')");

    // Composition table: root from the top-level layers, one sub-comp per
    // asset with a layer list.
    let root_size = Size::new(doc.w, doc.h);
    let root = Composition {
        size: root_size,
        layers: compile_comp(&doc.layers, "$.layers", doc, anim_ref, registry)?,
    };

    let mut comp_order = Vec::new();
    let mut comps = BTreeMap::new();
    for (i, asset) in doc.assets.iter().enumerate() {
        let Some(layers) = &asset.layers else { continue };
        let base = format!("$.assets[{i}].layers");
        let size = match (asset.w, asset.h) {
            (Some(w), Some(h)) => Size::new(w, h),
            _ => root_size,
        };
        let compiled = Composition {
            size,
            layers: compile_comp(layers, &base, doc, anim_ref, registry)?,
        };
        comp_order.push(asset.id.clone());
        comps.insert(asset.id.clone(), compiled);
    }

    let binding = resolve_binding(&root, &comp_order, &comps, binding_key);
    let input_geometry = resolve_media_input(doc, &root, &comps, binding.as_ref(), registry)?;

    // A shape-content binding layer draws vector paths; without the
    // mediaInput window there is no clip scope to contain them.
    if let Some(binding) = &binding {
        if input_geometry.is_none() {
            let bound_layer = match &binding.comp {
                CompRef::Root => root.layer(binding.layer_id),
                CompRef::Asset(id) => comps.get(id).and_then(|c| c.layer(binding.layer_id)),
            };
            if bound_layer.is_some_and(|l| matches!(l.content, LayerContent::Shape(_))) {
                return Err(CompileError::BindingShapeWithoutMediaInput {
                    path: binding_json_path(doc, binding_key),
                });
            }
        }
    }

    let mut assets = AssetIndex::new();
    for asset in &doc.assets {
        if asset.is_precomp() {
            continue;
        }
        let meta = match asset_index.get(&asset.id) {
            Some(meta) => meta.clone(),
            None => AssetMeta {
                width: asset.w.unwrap_or(0.0),
                height: asset.h.unwrap_or(0.0),
                uri: match (&asset.u, &asset.p) {
                    (Some(u), Some(p)) => Some(format!("{u}{p}")),
                    (None, Some(p)) => Some(p.clone()),
                    _ => None,
                },
            },
        };
        assets.insert(namespaced_asset_id(anim_ref, &asset.id), meta);
    }

    Ok(AnimIR {
        meta: AnimMeta {
            anim_ref: anim_ref.to_string(),
            size: root_size,
            fps: doc.fr,
            in_point: doc.ip,
            out_point: doc.op,
        },
        root,
        comps,
        assets,
        binding,
        input_geometry,
        last_render_issues: Vec::new(),
    })
}

/// All emitted image asset ids carry the animation prefix so multiple
/// animations in one scene cannot collide.
pub fn namespaced_asset_id(anim_ref: &str, ref_id: &str) -> String {
    format!("{anim_ref}|{ref_id}")
}

/// JSONPath of the first layer matching the binding key, for error reports.
fn binding_json_path(doc: &Document, binding_key: &str) -> String {
    for (i, raw) in doc.layers.iter().enumerate() {
        if raw.name() == binding_key {
            return format!("$.layers[{i}]");
        }
    }
    for (ai, asset) in doc.assets.iter().enumerate() {
        let Some(layers) = &asset.layers else { continue };
        for (i, raw) in layers.iter().enumerate() {
            if raw.name() == binding_key {
                return format!("$.assets[{ai}].layers[{i}]");
            }
        }
    }
    "$".into()
}

fn compile_comp(
    raw_layers: &[lottie::Layer],
    base: &str,
    doc: &Document,
    anim_ref: &str,
    registry: &mut PathRegistry,
) -> Result<Vec<Layer>, CompileError> {
    let mut layers = Vec::with_capacity(raw_layers.len());
    for (i, raw) in raw_layers.iter().enumerate() {
        layers.push(compile_layer(raw, &format!("{base}[{i}]"), doc, anim_ref, registry)?);
    }
    resolve_mattes(raw_layers, &mut layers, base)?;
    Ok(layers)
}

fn compile_layer(
    raw: &lottie::Layer,
    json_path: &str,
    doc: &Document,
    anim_ref: &str,
    registry: &mut PathRegistry,
) -> Result<Layer, CompileError> {
    let id = raw.ind.ok_or_else(|| CompileError::MalformedDocument {
        reason: "layer has no ind".into(),
        path: json_path.into(),
    })?;

    let kind = match raw.ty {
        layer_type::PRECOMP => LayerKind::Precomp,
        layer_type::IMAGE => LayerKind::Image,
        layer_type::NULL => LayerKind::Null,
        layer_type::SHAPE => LayerKind::Shape,
        layer_type::TEXT => LayerKind::Text,
        other => {
            return Err(CompileError::MalformedDocument {
                reason: format!("unsupported layer type {other}"),
                path: format!("{json_path}.ty"),
            })
        }
    };

    let timing = LayerTiming {
        in_point: raw.ip.unwrap_or(doc.ip),
        out_point: raw.op.unwrap_or(doc.op),
        start_time: raw.st.unwrap_or(0.0),
    };

    let transform = decode_transform(raw.ks.as_ref(), &format!("{json_path}.ks"))?;
    let masks = decode_masks(raw, json_path, registry)?;

    let content = match kind {
        LayerKind::Image => {
            let ref_id = raw.ref_id.as_ref().ok_or_else(|| CompileError::MalformedDocument {
                reason: "image layer has no refId".into(),
                path: json_path.into(),
            })?;
            LayerContent::Image {
                asset_id: namespaced_asset_id(anim_ref, ref_id),
            }
        }
        LayerKind::Precomp => {
            let ref_id = raw.ref_id.as_ref().ok_or_else(|| CompileError::MalformedDocument {
                reason: "precomp layer has no refId".into(),
                path: json_path.into(),
            })?;
            LayerContent::Precomp {
                comp_id: ref_id.clone(),
            }
        }
        LayerKind::Shape => compile_shape_content(raw, json_path, registry)?,
        LayerKind::Null | LayerKind::Text => LayerContent::None,
    };

    Ok(Layer {
        id,
        name: raw.name().to_string(),
        kind,
        timing,
        parent_id: raw.parent,
        transform,
        masks,
        matte: None,
        content,
        is_matte_source: raw.is_matte_source_flagged(),
        is_hidden: raw.is_hidden(),
    })
}

fn decode_transform(
    ks: Option<&lottie::TransformSpec>,
    base: &str,
) -> Result<TransformTrack, CompileError> {
    let Some(ks) = ks else {
        return Ok(TransformTrack::default());
    };
    Ok(TransformTrack {
        position: lottie::decode_vec2_track(ks.p.as_ref(), Vec2::ZERO, &format!("{base}.p"))?,
        anchor: lottie::decode_vec2_track(ks.a.as_ref(), Vec2::ZERO, &format!("{base}.a"))?,
        scale: lottie::decode_vec2_track(
            ks.s.as_ref(),
            Vec2::new(100.0, 100.0),
            &format!("{base}.s"),
        )?,
        rotation: lottie::decode_scalar_track(ks.r.as_ref(), 0.0, &format!("{base}.r"))?,
        opacity: lottie::decode_scalar_track(ks.o.as_ref(), 100.0, &format!("{base}.o"))?,
    })
}

fn decode_masks(
    raw: &lottie::Layer,
    json_path: &str,
    registry: &mut PathRegistry,
) -> Result<Vec<Mask>, CompileError> {
    let mut masks = Vec::with_capacity(raw.masks_properties.len());
    for (i, spec) in raw.masks_properties.iter().enumerate() {
        let base = format!("{json_path}.masksProperties[{i}]");
        let mode_str = spec.mode.as_deref().unwrap_or("a");
        let mode = MaskMode::from_lottie(mode_str).ok_or_else(|| {
            CompileError::UnsupportedMaskMode {
                mode: mode_str.to_string(),
                path: format!("{base}.mode"),
            }
        })?;
        let pt = spec.pt.as_ref().ok_or_else(|| CompileError::MalformedDocument {
            reason: "mask has no path".into(),
            path: format!("{base}.pt"),
        })?;
        let path = lottie::decode_anim_path(pt, &format!("{base}.pt"))?;
        masks.push(Mask {
            mode,
            inverted: spec.inv.unwrap_or(false),
            path_id: registry.register_anim(&path),
            opacity: lottie::decode_scalar_track(spec.o.as_ref(), 100.0, &format!("{base}.o"))?,
        });
    }
    Ok(masks)
}

fn compile_shape_content(
    raw: &lottie::Layer,
    json_path: &str,
    registry: &mut PathRegistry,
) -> Result<LayerContent, CompileError> {
    let base = format!("{json_path}.shapes");
    let Some(path) = shape::extract_anim_path(&raw.shapes, &base)? else {
        return Ok(LayerContent::None);
    };
    let group_transforms = shape::extract_group_transforms(&raw.shapes, &base)?;
    let fill = shape::extract_fill(&raw.shapes, &base)?.map(|(color, opacity)| Fill {
        color,
        opacity,
    });
    let stroke = shape::extract_stroke_style(&raw.shapes, &base)?;
    Ok(LayerContent::Shape(ShapeContent {
        path_id: registry.register_anim(&path),
        group_transforms,
        fill,
        stroke,
    }))
}

/// Matte linking. Pass A resolves `tp`-based (shared) mattes, pass B the
/// legacy immediate-adjacency form. Any referenced or `td=1` layer becomes
/// a matte source and is never drawn at the top level.
fn resolve_mattes(
    raw_layers: &[lottie::Layer],
    layers: &mut [Layer],
    base: &str,
) -> Result<(), CompileError> {
    for (i, raw) in raw_layers.iter().enumerate() {
        let Some(tt) = raw.tt.filter(|&t| t != 0) else {
            continue;
        };
        let mode = MatteMode::from_lottie(tt).ok_or_else(|| CompileError::MalformedDocument {
            reason: format!("unknown track matte type {tt}"),
            path: format!("{base}[{i}].tt"),
        })?;
        let consumer = layers[i].id;

        if let Some(tp) = raw.tp {
            // Pass A: shared matte via explicit target index.
            let Some(j) = raw_layers.iter().position(|l| l.ind == Some(tp)) else {
                return Err(CompileError::MatteTargetNotFound {
                    target: tp,
                    consumer,
                    path: format!("{base}[{i}].tp"),
                });
            };
            if j >= i {
                return Err(CompileError::MatteTargetInvalidOrder {
                    target: tp,
                    consumer,
                    path: format!("{base}[{i}].tp"),
                });
            }
            if !raw_layers[j].is_matte_source_flagged() {
                debug!("layer {tp} used as implicit matte source");
            }
            layers[j].is_matte_source = true;
            layers[i].matte = Some(MatteInfo {
                mode,
                source_layer_id: layers[j].id,
            });
        } else if i > 0 && raw_layers[i - 1].is_matte_source_flagged() {
            // Pass B: legacy adjacency; only the immediately preceding
            // td=1 layer links.
            layers[i].matte = Some(MatteInfo {
                mode,
                source_layer_id: layers[i - 1].id,
            });
        }
    }
    Ok(())
}

fn resolve_binding(
    root: &Composition,
    comp_order: &[String],
    comps: &BTreeMap<String, Composition>,
    binding_key: &str,
) -> Option<BindingInfo> {
    // Unnamed layers report an empty name; an empty key must not bind them.
    if binding_key.is_empty() {
        return None;
    }
    let found = std::iter::once((CompRef::Root, root))
        .chain(
            comp_order
                .iter()
                .filter_map(|id| comps.get(id).map(|c| (CompRef::Asset(id.clone()), c))),
        )
        .find_map(|(comp_ref, comp)| {
            comp.layers
                .iter()
                .find(|l| l.name == binding_key)
                .map(|l| (comp_ref, l))
        });
    let (comp, layer) = found?;
    let asset_id = match &layer.content {
        LayerContent::Image { asset_id } => Some(asset_id.clone()),
        _ => None,
    };
    Some(BindingInfo {
        binding_key: binding_key.to_string(),
        layer_id: layer.id,
        asset_id,
        comp,
    })
}

fn resolve_media_input(
    doc: &Document,
    root: &Composition,
    comps: &BTreeMap<String, Composition>,
    binding: Option<&BindingInfo>,
    registry: &mut PathRegistry,
) -> Result<Option<InputGeometry>, CompileError> {
    // Locate the raw layer so its shape tree can be re-walked.
    let mut found: Option<(CompRef, &lottie::Layer, String)> = None;
    for (i, raw) in doc.layers.iter().enumerate() {
        if raw.name() == MEDIA_INPUT_LAYER_NAME {
            found = Some((CompRef::Root, raw, format!("$.layers[{i}]")));
            break;
        }
    }
    if found.is_none() {
        'outer: for (ai, asset) in doc.assets.iter().enumerate() {
            let Some(layers) = &asset.layers else { continue };
            for (i, raw) in layers.iter().enumerate() {
                if raw.name() == MEDIA_INPUT_LAYER_NAME {
                    found = Some((
                        CompRef::Asset(asset.id.clone()),
                        raw,
                        format!("$.assets[{ai}].layers[{i}]"),
                    ));
                    break 'outer;
                }
            }
        }
    }
    let Some((comp_ref, raw, json_path)) = found else {
        return Ok(None);
    };
    // Without a binding layer there is nothing to clip; the validator
    // reports the mismatch.
    let Some(binding) = binding else {
        return Ok(None);
    };

    if raw.ty != layer_type::SHAPE {
        return Err(CompileError::MalformedDocument {
            reason: "mediaInput layer is not a shape layer".into(),
            path: format!("{json_path}.ty"),
        });
    }
    if !raw.is_hidden() {
        return Err(CompileError::MalformedDocument {
            reason: "mediaInput layer must be hidden".into(),
            path: format!("{json_path}.hd"),
        });
    }
    if comp_ref != binding.comp {
        return Err(CompileError::MediaInputNotInSameComp {
            path: json_path.clone(),
        });
    }

    let base = format!("{json_path}.shapes");
    let Some(path) = shape::extract_anim_path(&raw.shapes, &base)? else {
        return Err(CompileError::MalformedDocument {
            reason: "mediaInput layer has no path".into(),
            path: base,
        });
    };
    let group_transforms = shape::extract_group_transforms(&raw.shapes, &base)?;
    let layer_id = raw.ind.ok_or_else(|| CompileError::MalformedDocument {
        reason: "mediaInput layer has no ind".into(),
        path: json_path.clone(),
    })?;
    let chain = crate::ir::find_comp_chain(root, comps, &comp_ref);

    Ok(Some(InputGeometry {
        layer_id,
        comp: comp_ref,
        path_id: registry.register_anim(&path),
        bounding_rect: path.initial_bounding_box(),
        path,
        group_transforms,
        chain,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: serde_json::Value) -> Document {
        Document::from_value(v).unwrap()
    }

    fn image_layer(ind: i64, name: &str) -> serde_json::Value {
        json!({
            "ind": ind, "ty": 2, "nm": name, "refId": "image_0",
            "ks": {
                "o": {"a": 0, "k": 100},
                "p": {"a": 0, "k": [270.0, 480.0]},
                "a": {"a": 0, "k": [270.0, 480.0]},
                "s": {"a": 0, "k": [100.0, 100.0]},
            },
            "ip": 0, "op": 300, "st": 0,
        })
    }

    fn base_doc(layers: serde_json::Value) -> serde_json::Value {
        json!({
            "v": "5.7", "fr": 30, "ip": 0, "op": 300, "w": 540, "h": 960,
            "assets": [{"id": "image_0", "w": 540, "h": 960, "u": "images/", "p": "img_0.png"}],
            "layers": layers,
        })
    }

    fn compile(v: serde_json::Value) -> Result<AnimIR, CompileError> {
        let mut registry = PathRegistry::new();
        compile_anim(&doc(v), "anim", "media", &AssetIndex::new(), &mut registry)
    }

    #[test]
    fn image_layer_compiles_with_namespaced_asset() {
        let ir = compile(base_doc(json!([image_layer(1, "photo")]))).unwrap();
        assert_eq!(ir.root.layers.len(), 1);
        let layer = &ir.root.layers[0];
        assert_eq!(layer.kind, LayerKind::Image);
        match &layer.content {
            LayerContent::Image { asset_id } => assert_eq!(asset_id, "anim|image_0"),
            other => panic!("expected image content, got {other:?}"),
        }
        assert!(ir.assets.contains("anim|image_0"));
    }

    #[test]
    fn precomp_assets_become_sub_compositions() {
        let raw = json!({
            "v": "5.7", "fr": 30, "ip": 0, "op": 300, "w": 540, "h": 960,
            "assets": [
                {"id": "comp_0", "nm": "inner", "fr": 30, "layers": [image_layer(1, "inner_img")]},
                {"id": "image_0", "w": 100, "h": 100, "u": "", "p": "img.png"},
            ],
            "layers": [{
                "ind": 1, "ty": 0, "nm": "container", "refId": "comp_0",
                "ks": {}, "ip": 0, "op": 300, "st": 0,
            }],
        });
        let ir = compile(raw).unwrap();
        assert!(ir.comps.contains_key("comp_0"));
        match &ir.root.layers[0].content {
            LayerContent::Precomp { comp_id } => assert_eq!(comp_id, "comp_0"),
            other => panic!("expected precomp content, got {other:?}"),
        }
    }

    #[test]
    fn matte_target_resolves_and_marks_source() {
        let raw = base_doc(json!([
            {"ind": 1, "ty": 4, "nm": "matte shape", "td": 0, "ks": {}, "ip": 0, "op": 300,
             "shapes": [{"ty": "rc", "p": {"a": 0, "k": [0, 0]}, "s": {"a": 0, "k": [10, 10]}}]},
            {"ind": 2, "ty": 2, "nm": "consumer", "refId": "image_0", "tt": 1, "tp": 1,
             "ks": {}, "ip": 0, "op": 300},
        ]));
        let ir = compile(raw).unwrap();
        // Target lacking td=1 is accepted as an implicit source.
        assert!(ir.root.layers[0].is_matte_source);
        let matte = ir.root.layers[1].matte.as_ref().unwrap();
        assert_eq!(matte.mode, MatteMode::Alpha);
        assert_eq!(matte.source_layer_id, 1);
    }

    #[test]
    fn matte_target_not_found_is_fatal() {
        let raw = base_doc(json!([
            {"ind": 2, "ty": 2, "nm": "consumer", "refId": "image_0", "tt": 1, "tp": 9,
             "ks": {}, "ip": 0, "op": 300},
        ]));
        let err = compile(raw).unwrap_err();
        assert_eq!(err.code(), "MATTE_TARGET_NOT_FOUND");
    }

    #[test]
    fn matte_target_after_consumer_is_fatal() {
        let raw = base_doc(json!([
            {"ind": 2, "ty": 2, "nm": "consumer", "refId": "image_0", "tt": 1, "tp": 1,
             "ks": {}, "ip": 0, "op": 300},
            {"ind": 1, "ty": 2, "nm": "late source", "refId": "image_0", "td": 1,
             "ks": {}, "ip": 0, "op": 300},
        ]));
        let err = compile(raw).unwrap_err();
        assert_eq!(err.code(), "MATTE_TARGET_INVALID_ORDER");
    }

    #[test]
    fn legacy_adjacency_links_only_the_adjacent_consumer() {
        let raw = base_doc(json!([
            {"ind": 1, "ty": 2, "nm": "source", "refId": "image_0", "td": 1,
             "ks": {}, "ip": 0, "op": 300},
            {"ind": 2, "ty": 2, "nm": "first", "refId": "image_0", "tt": 3,
             "ks": {}, "ip": 0, "op": 300},
            {"ind": 3, "ty": 2, "nm": "second", "refId": "image_0", "tt": 3,
             "ks": {}, "ip": 0, "op": 300},
        ]));
        let ir = compile(raw).unwrap();
        assert!(ir.root.layers[0].is_matte_source);
        let matte = ir.root.layers[1].matte.as_ref().unwrap();
        assert_eq!(matte.mode, MatteMode::Luma);
        assert_eq!(matte.source_layer_id, 1);
        // The second tp-less consumer gets no matte.
        assert!(ir.root.layers[2].matte.is_none());
    }

    #[test]
    fn unsupported_mask_mode_is_fatal() {
        let raw = base_doc(json!([
            {"ind": 1, "ty": 2, "nm": "masked", "refId": "image_0", "ks": {},
             "ip": 0, "op": 300, "hasMask": true,
             "masksProperties": [{"mode": "f", "pt": {"a": 0, "k": {
                 "v": [[0, 0], [10, 0], [10, 10]],
                 "i": [[0, 0], [0, 0], [0, 0]],
                 "o": [[0, 0], [0, 0], [0, 0]],
                 "c": true}}}]},
        ]));
        let err = compile(raw).unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED_MASK_MODE");
    }

    #[test]
    fn binding_layer_is_found_in_sub_comp() {
        let raw = json!({
            "v": "5.7", "fr": 30, "ip": 0, "op": 300, "w": 540, "h": 960,
            "assets": [
                {"id": "image_0", "w": 100, "h": 100, "u": "", "p": "img.png"},
                {"id": "comp_0", "fr": 30, "layers": [image_layer(7, "media")]},
            ],
            "layers": [{
                "ind": 1, "ty": 0, "nm": "container", "refId": "comp_0",
                "ks": {}, "ip": 0, "op": 300, "st": 0,
            }],
        });
        let ir = compile(raw).unwrap();
        let binding = ir.binding.as_ref().unwrap();
        assert_eq!(binding.layer_id, 7);
        assert_eq!(binding.comp, CompRef::Asset("comp_0".into()));
        assert_eq!(binding.asset_id.as_deref(), Some("anim|image_0"));
    }

    fn media_input_layer(ind: i64, hidden: bool) -> serde_json::Value {
        json!({
            "ind": ind, "ty": 4, "nm": "mediaInput", "hd": hidden,
            "ks": {}, "ip": 0, "op": 300,
            "shapes": [{"ty": "sh", "ks": {"a": 0, "k": {
                "v": [[0, 0], [100, 0], [100, 100], [0, 100]],
                "i": [[0, 0], [0, 0], [0, 0], [0, 0]],
                "o": [[0, 0], [0, 0], [0, 0], [0, 0]],
                "c": true}}}],
        })
    }

    #[test]
    fn media_input_in_same_comp_builds_input_geometry() {
        let raw = base_doc(json!([
            image_layer(1, "media"),
            media_input_layer(2, true),
        ]));
        let ir = compile(raw).unwrap();
        let geometry = ir.input_geometry.as_ref().unwrap();
        assert_eq!(geometry.layer_id, 2);
        assert_eq!(geometry.comp, CompRef::Root);
        assert!(geometry.chain.is_empty());
        assert_eq!(geometry.bounding_rect.width(), 100.0);
    }

    #[test]
    fn media_input_in_other_comp_is_fatal() {
        let raw = json!({
            "v": "5.7", "fr": 30, "ip": 0, "op": 300, "w": 540, "h": 960,
            "assets": [
                {"id": "image_0", "w": 100, "h": 100, "u": "", "p": "img.png"},
                {"id": "comp_0", "fr": 30, "layers": [media_input_layer(3, true)]},
            ],
            "layers": [
                image_layer(1, "media"),
                {"ind": 2, "ty": 0, "nm": "container", "refId": "comp_0",
                 "ks": {}, "ip": 0, "op": 300, "st": 0},
            ],
        });
        let err = compile(raw).unwrap_err();
        assert_eq!(err.code(), "MEDIA_INPUT_NOT_IN_SAME_COMP");
    }

    #[test]
    fn visible_media_input_is_rejected() {
        let raw = base_doc(json!([
            image_layer(1, "media"),
            media_input_layer(2, false),
        ]));
        let err = compile(raw).unwrap_err();
        assert_eq!(err.code(), "MALFORMED_DOCUMENT");
    }

    #[test]
    fn media_input_chain_tracks_precomp_containers() {
        let raw = json!({
            "v": "5.7", "fr": 30, "ip": 0, "op": 300, "w": 540, "h": 960,
            "assets": [
                {"id": "image_0", "w": 100, "h": 100, "u": "", "p": "img.png"},
                {"id": "comp_0", "fr": 30, "layers": [
                    image_layer(1, "media"),
                    media_input_layer(2, true),
                ]},
            ],
            "layers": [{
                "ind": 5, "ty": 0, "nm": "container", "refId": "comp_0",
                "ks": {"p": {"a": 0, "k": [540.0, 0.0]}}, "ip": 0, "op": 300, "st": 0,
            }],
        });
        let ir = compile(raw).unwrap();
        let geometry = ir.input_geometry.as_ref().unwrap();
        assert_eq!(geometry.chain.len(), 1);
        assert_eq!(geometry.chain[0].comp, CompRef::Root);
        assert_eq!(geometry.chain[0].layer_id, 5);
    }

    #[test]
    fn identical_compilations_share_path_ids() {
        let raw = base_doc(json!([
            image_layer(1, "media"),
            media_input_layer(2, true),
        ]));
        let mut registry = PathRegistry::new();
        let a = compile_anim(&doc(raw.clone()), "anim", "media", &AssetIndex::new(), &mut registry)
            .unwrap();
        let b = compile_anim(&doc(raw), "anim", "media", &AssetIndex::new(), &mut registry)
            .unwrap();
        assert_eq!(
            a.input_geometry.unwrap().path_id,
            b.input_geometry.unwrap().path_id
        );
        assert_eq!(registry.count(), 1);
    }

    fn shape_binding_layer(ind: i64) -> serde_json::Value {
        json!({
            "ind": ind, "ty": 4, "nm": "media", "ks": {}, "ip": 0, "op": 300,
            "shapes": [
                {"ty": "rc", "p": {"a": 0, "k": [0, 0]}, "s": {"a": 0, "k": [10, 10]}},
                {"ty": "fl", "c": {"a": 0, "k": [1, 1, 1]}, "o": {"a": 0, "k": 100}},
            ],
        })
    }

    #[test]
    fn shape_binding_without_media_input_is_fatal() {
        let err = compile(base_doc(json!([shape_binding_layer(1)]))).unwrap_err();
        assert_eq!(err.code(), "BINDING_SHAPE_WITHOUT_MEDIA_INPUT");
        assert!(err.to_string().contains("$.layers[0]"));
    }

    #[test]
    fn shape_binding_with_media_input_compiles() {
        let raw = base_doc(json!([
            shape_binding_layer(1),
            media_input_layer(2, true),
        ]));
        let ir = compile(raw).unwrap();
        assert!(ir.input_geometry.is_some());
        assert_eq!(ir.binding.as_ref().unwrap().layer_id, 1);
    }

    #[test]
    fn unknown_layer_type_is_fatal() {
        let raw = base_doc(json!([
            {"ind": 1, "ty": 1, "nm": "solid", "ks": {}, "ip": 0, "op": 300},
        ]));
        let err = compile(raw).unwrap_err();
        assert_eq!(err.code(), "MALFORMED_DOCUMENT");
    }
}
