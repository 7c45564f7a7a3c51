//! The render-command alphabet and the per-frame runtime evaluator.
//!
//! `AnimIR::render_commands_with_issues` is a pure function of the IR
//! snapshot and its parameters; command order is fully determined by layer
//! order, reversed mask order and precomp recursion. Streams stay balanced
//! on every non-fatal error path: a skipped layer opens no scopes.

use std::collections::HashSet;

use kurbo::{Affine, Rect};
use log::trace;
use serde::{Deserialize, Serialize};

use crate::error::{RenderIssue, RenderIssueCode};
use crate::ir::{
    find_comp_chain, AnimIR, CompRef, Composition, Layer, LayerContent, LayerId, LayerKind,
    MaskMode, MatteMode,
};
use crate::path::{BezierPath, PathId};
use crate::value::{GroupTransform, LineCap, LineJoin};

/// Frame at which edit mode renders, regardless of the requested frame.
pub const EDIT_FRAME_INDEX: f64 = 0.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    #[default]
    Preview,
    Edit,
}

/// One element of the language-neutral command stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "camelCase")]
pub enum RenderCommand {
    BeginGroup {
        name: String,
    },
    EndGroup,
    PushTransform {
        matrix: Affine,
    },
    PopTransform,
    PushClipRect {
        rect: Rect,
    },
    PopClipRect,
    BeginMask {
        mode: MaskMode,
        inverted: bool,
        path_id: PathId,
        opacity: f64,
        frame: f64,
    },
    EndMask,
    BeginMatte {
        mode: MatteMode,
    },
    EndMatte,
    DrawImage {
        asset_id: String,
        opacity: f64,
    },
    DrawShape {
        path_id: PathId,
        fill_color: [f64; 3],
        /// Lottie range 0..100.
        fill_opacity: f64,
        layer_opacity: f64,
        frame: f64,
    },
    DrawStroke {
        path_id: PathId,
        stroke_color: [f64; 3],
        stroke_opacity: f64,
        stroke_width: f64,
        line_cap: LineCap,
        line_join: LineJoin,
        miter_limit: f64,
        layer_opacity: f64,
        frame: f64,
    },
}

impl RenderCommand {
    /// Stable discriminant name, as used in dumps and metrics reports.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::BeginGroup { .. } => "beginGroup",
            Self::EndGroup => "endGroup",
            Self::PushTransform { .. } => "pushTransform",
            Self::PopTransform => "popTransform",
            Self::PushClipRect { .. } => "pushClipRect",
            Self::PopClipRect => "popClipRect",
            Self::BeginMask { .. } => "beginMask",
            Self::EndMask => "endMask",
            Self::BeginMatte { .. } => "beginMatte",
            Self::EndMatte => "endMatte",
            Self::DrawImage { .. } => "drawImage",
            Self::DrawShape { .. } => "drawShape",
            Self::DrawStroke { .. } => "drawStroke",
        }
    }
}

impl AnimIR {
    /// Emits the command stream for one frame, storing issues on
    /// `last_render_issues`.
    pub fn render_commands(
        &mut self,
        frame: f64,
        user_transform: Affine,
        binding_layer_visible: bool,
        mode: RenderMode,
    ) -> Vec<RenderCommand> {
        let (commands, issues) =
            self.render_commands_with_issues(frame, user_transform, binding_layer_visible, mode);
        self.last_render_issues = issues;
        commands
    }

    /// Re-entrant variant: returns the stream together with the issues it
    /// produced, without touching the IR.
    pub fn render_commands_with_issues(
        &self,
        frame: f64,
        user_transform: Affine,
        binding_layer_visible: bool,
        mode: RenderMode,
    ) -> (Vec<RenderCommand>, Vec<RenderIssue>) {
        Evaluator::new(self, user_transform, binding_layer_visible, mode).run(frame)
    }

    /// World-space mediaInput path at `frame` (hit-test geometry).
    ///
    /// Includes every precomp container on the way to the mediaInput layer
    /// and the group transforms inside its shape tree; never the user
    /// transform.
    pub fn media_input_path(&self, frame: f64) -> Option<BezierPath> {
        let geometry = self.input_geometry.as_ref()?;
        let world = self.media_input_world_matrix(frame)?;
        let local = self.local_frame_index(frame);
        Some(geometry.path.sample(local).transformed(world))
    }

    /// World matrix of the mediaInput layer at `frame`.
    pub fn media_input_world_matrix(&self, frame: f64) -> Option<Affine> {
        let geometry = self.input_geometry.as_ref()?;
        let mut local = self.local_frame_index(frame);
        let mut world = Affine::IDENTITY;
        for link in &geometry.chain {
            let comp = self.comp(&link.comp)?;
            let layer = comp.layer(link.layer_id)?;
            world = world * resolve_world(comp, layer, local).ok()?;
            local -= layer.timing.start_time;
        }
        let comp = self.comp(&geometry.comp)?;
        let layer = comp.layer(geometry.layer_id)?;
        world = world * resolve_world(comp, layer, local).ok()?;
        let (group_matrix, _) = group_product(&geometry.group_transforms, local);
        Some(world * group_matrix)
    }

    /// Whether a world-space point falls inside the mediaInput window.
    pub fn media_input_hit_test(&self, point: kurbo::Point, frame: f64) -> bool {
        self.media_input_path(frame)
            .is_some_and(|path| path.contains(point))
    }
}

/// Combined matrix and opacity of a group-transform chain, outermost first.
fn group_product(groups: &[GroupTransform], frame: f64) -> (Affine, f64) {
    let mut matrix = Affine::IDENTITY;
    let mut opacity = 1.0;
    for group in groups {
        matrix = matrix * group.matrix(frame);
        opacity *= group.opacity_at(frame);
    }
    (matrix, opacity)
}

/// World matrix of a layer within its composition: the layer's own TRS
/// composed up the parent chain. Parent opacity is deliberately not
/// accumulated here.
fn resolve_world(comp: &Composition, layer: &Layer, frame: f64) -> Result<Affine, RenderIssue> {
    let mut world = layer.transform.matrix(frame);
    let mut visited: HashSet<LayerId> = HashSet::from([layer.id]);
    let mut current = layer.parent_id;
    while let Some(parent_id) = current {
        let Some(parent) = comp.layer(parent_id) else {
            return Err(RenderIssue::new(
                RenderIssueCode::ParentNotFound,
                format!("layer {} references missing parent {}", layer.id, parent_id),
            ));
        };
        if !visited.insert(parent_id) {
            return Err(RenderIssue::new(
                RenderIssueCode::ParentCycle,
                format!("parent chain of layer {} revisits layer {}", layer.id, parent_id),
            ));
        }
        world = parent.transform.matrix(frame) * world;
        current = parent.parent_id;
    }
    Ok(world)
}

/// Precomp layers the edit mode may descend through, plus the binding
/// layer itself.
struct EditDeps {
    binding_comp: CompRef,
    binding_layer: LayerId,
    chain_links: HashSet<(CompRef, LayerId)>,
}

struct Evaluator<'a> {
    ir: &'a AnimIR,
    user_transform: Affine,
    binding_visible: bool,
    mode: RenderMode,
    out: Vec<RenderCommand>,
    issues: Vec<RenderIssue>,
    /// Asset comp ids currently being expanded, for cycle detection.
    comp_stack: Vec<String>,
    masks_warning_emitted: bool,
    matte_warning_emitted: bool,
    edit_deps: Option<EditDeps>,
}

impl<'a> Evaluator<'a> {
    fn new(
        ir: &'a AnimIR,
        user_transform: Affine,
        binding_visible: bool,
        mode: RenderMode,
    ) -> Self {
        let edit_deps = (mode == RenderMode::Edit)
            .then(|| {
                let binding = ir.binding.as_ref()?;
                let chain = find_comp_chain(&ir.root, &ir.comps, &binding.comp);
                Some(EditDeps {
                    binding_comp: binding.comp.clone(),
                    binding_layer: binding.layer_id,
                    chain_links: chain
                        .into_iter()
                        .map(|link| (link.comp, link.layer_id))
                        .collect(),
                })
            })
            .flatten();
        Self {
            ir,
            user_transform,
            binding_visible,
            mode,
            out: Vec::new(),
            issues: Vec::new(),
            comp_stack: Vec::new(),
            masks_warning_emitted: false,
            matte_warning_emitted: false,
            edit_deps,
        }
    }

    fn run(mut self, scene_frame: f64) -> (Vec<RenderCommand>, Vec<RenderIssue>) {
        let frame = match self.mode {
            RenderMode::Preview => self.ir.local_frame_index(scene_frame),
            RenderMode::Edit => EDIT_FRAME_INDEX,
        };
        trace!(
            "render '{}' frame {frame} ({:?})",
            self.ir.meta.anim_ref,
            self.mode
        );
        self.render_comp(&CompRef::Root, frame, 1.0);
        (self.out, self.issues)
    }

    /// Emits a composition's layers bottom-to-top (painter's order).
    fn render_comp(&mut self, comp_ref: &CompRef, frame: f64, inherited_opacity: f64) {
        let ir = self.ir;
        let Some(comp) = ir.comp(comp_ref) else {
            return;
        };
        for layer in comp.layers.iter().rev() {
            self.render_layer(comp_ref, comp, layer, frame, inherited_opacity, false);
        }
    }

    fn edit_includes(&self, comp_ref: &CompRef, layer: &Layer) -> bool {
        let Some(deps) = &self.edit_deps else {
            // Edit mode without a binding layer renders nothing.
            return self.mode != RenderMode::Edit;
        };
        if deps.binding_comp == *comp_ref && deps.binding_layer == layer.id {
            return true;
        }
        deps.chain_links.contains(&(comp_ref.clone(), layer.id))
    }

    fn is_binding(&self, comp_ref: &CompRef, layer: &Layer) -> bool {
        self.ir
            .binding
            .as_ref()
            .is_some_and(|b| b.comp == *comp_ref && b.layer_id == layer.id)
    }

    fn render_layer(
        &mut self,
        comp_ref: &CompRef,
        comp: &'a Composition,
        layer: &'a Layer,
        frame: f64,
        inherited_opacity: f64,
        as_matte_source: bool,
    ) {
        if layer.kind == LayerKind::Text {
            return;
        }
        if !as_matte_source && (layer.is_hidden || layer.is_matte_source) {
            return;
        }
        if !(layer.timing.in_point <= frame && frame < layer.timing.out_point) {
            return;
        }
        if self.mode == RenderMode::Edit && !as_matte_source && !self.edit_includes(comp_ref, layer)
        {
            return;
        }

        // Precomp problems are detected before any scope opens so the
        // stream stays balanced with the subtree skipped.
        if let LayerContent::Precomp { comp_id } = &layer.content {
            if self.ir.comps.get(comp_id).is_none() {
                self.issues.push(RenderIssue::new(
                    RenderIssueCode::PrecompAssetNotFound,
                    format!("layer {} references missing composition '{comp_id}'", layer.id),
                ));
                return;
            }
            if self.comp_stack.iter().any(|c| c == comp_id) {
                self.issues.push(RenderIssue::new(
                    RenderIssueCode::PrecompCycle,
                    format!("composition '{comp_id}' re-enters its own expansion"),
                ));
                return;
            }
        }

        let world = match resolve_world(comp, layer, frame) {
            Ok(world) => world,
            Err(issue) => {
                self.issues.push(issue);
                return;
            }
        };
        let opacity = inherited_opacity * layer.transform.opacity_at(frame);

        if !as_matte_source && self.is_binding(comp_ref, layer) {
            self.render_binding_layer(comp, layer, frame, world, opacity);
            return;
        }

        if !as_matte_source {
            if let Some(matte) = &layer.matte {
                self.out.push(RenderCommand::BeginMatte { mode: matte.mode });
                self.out.push(RenderCommand::BeginGroup {
                    name: "matteSource".into(),
                });
                if let Some(source) = comp.layer(matte.source_layer_id) {
                    self.render_layer(comp_ref, comp, source, frame, inherited_opacity, true);
                }
                self.out.push(RenderCommand::EndGroup);
                self.out.push(RenderCommand::BeginGroup {
                    name: "matteConsumer".into(),
                });
                self.emit_layer_body(layer, frame, world, opacity);
                self.out.push(RenderCommand::EndGroup);
                self.out.push(RenderCommand::EndMatte);
                return;
            }
        }

        self.emit_layer_body(layer, frame, world, opacity);
    }

    /// Group, transform, reversed masks, content. Masks sit inside the
    /// layer transform so their paths follow the layer.
    fn emit_layer_body(&mut self, layer: &'a Layer, frame: f64, world: Affine, opacity: f64) {
        self.out.push(RenderCommand::BeginGroup {
            name: format!("Layer:{}", layer.name),
        });
        self.out.push(RenderCommand::PushTransform { matrix: world });
        // Reversed so the first mask in document order is innermost.
        for mask in layer.masks.iter().rev() {
            self.out.push(RenderCommand::BeginMask {
                mode: mask.mode,
                inverted: mask.inverted,
                path_id: mask.path_id,
                opacity: (*mask.opacity.sample(frame) / 100.0).clamp(0.0, 1.0),
                frame,
            });
        }
        self.emit_content(layer, frame, opacity, false);
        for _ in &layer.masks {
            self.out.push(RenderCommand::EndMask);
        }
        self.out.push(RenderCommand::PopTransform);
        self.out.push(RenderCommand::EndGroup);
    }

    fn emit_content(&mut self, layer: &'a Layer, frame: f64, opacity: f64, suppress_images: bool) {
        match &layer.content {
            LayerContent::None => {}
            LayerContent::Image { asset_id } => {
                if !suppress_images {
                    self.out.push(RenderCommand::DrawImage {
                        asset_id: asset_id.clone(),
                        opacity,
                    });
                }
            }
            LayerContent::Shape(shape) => {
                let (group_matrix, group_opacity) =
                    group_product(&shape.group_transforms, frame);
                let pushed = !shape.group_transforms.is_empty();
                if pushed {
                    self.out.push(RenderCommand::PushTransform {
                        matrix: group_matrix,
                    });
                }
                let effective = opacity * group_opacity;
                if let Some(fill) = &shape.fill {
                    self.out.push(RenderCommand::DrawShape {
                        path_id: shape.path_id,
                        fill_color: fill.color,
                        fill_opacity: fill.opacity,
                        layer_opacity: effective,
                        frame,
                    });
                }
                if let Some(stroke) = &shape.stroke {
                    self.out.push(RenderCommand::DrawStroke {
                        path_id: shape.path_id,
                        stroke_color: stroke.color,
                        stroke_opacity: stroke.opacity,
                        stroke_width: stroke.width_at(frame),
                        line_cap: stroke.line_cap,
                        line_join: stroke.line_join,
                        miter_limit: stroke.miter_limit,
                        layer_opacity: effective,
                        frame,
                    });
                }
                if pushed {
                    self.out.push(RenderCommand::PopTransform);
                }
            }
            LayerContent::Precomp { comp_id } => {
                // Existence and cycles were checked before scopes opened.
                let child_frame = frame - layer.timing.start_time;
                self.comp_stack.push(comp_id.clone());
                let child_ref = CompRef::Asset(comp_id.clone());
                self.render_comp(&child_ref, child_frame, opacity);
                self.comp_stack.pop();
            }
        }
    }

    /// The inputClip pipeline. The clip window is sampled independently of
    /// the user transform; the user transform is composed after the
    /// binding transform; the layer's own masks and matte are ignored.
    fn render_binding_layer(
        &mut self,
        comp: &'a Composition,
        layer: &'a Layer,
        frame: f64,
        world: Affine,
        opacity: f64,
    ) {
        if !layer.masks.is_empty() && !self.masks_warning_emitted {
            self.masks_warning_emitted = true;
            self.issues.push(RenderIssue::new(
                RenderIssueCode::BindingLayerMasksIgnored,
                format!("masks on binding layer '{}' are ignored", layer.name),
            ));
        }
        if layer.matte.is_some() && !self.matte_warning_emitted {
            self.matte_warning_emitted = true;
            self.issues.push(RenderIssue::new(
                RenderIssueCode::BindingLayerMatteIgnored,
                format!("track matte on binding layer '{}' is ignored", layer.name),
            ));
        }

        self.out.push(RenderCommand::BeginGroup {
            name: format!("Layer:{}", layer.name),
        });

        let ir = self.ir;
        let clip = ir.input_geometry.as_ref();
        if let Some(geometry) = clip {
            let input_world = match comp.layer(geometry.layer_id) {
                Some(input_layer) => match resolve_world(comp, input_layer, frame) {
                    Ok(world) => {
                        let (group_matrix, _) =
                            group_product(&geometry.group_transforms, frame);
                        world * group_matrix
                    }
                    Err(issue) => {
                        self.issues.push(issue);
                        Affine::IDENTITY
                    }
                },
                None => Affine::IDENTITY,
            };
            self.out.push(RenderCommand::PushTransform {
                matrix: input_world,
            });
            self.out.push(RenderCommand::BeginMask {
                mode: MaskMode::Intersect,
                inverted: false,
                path_id: geometry.path_id,
                opacity: 1.0,
                frame,
            });
            self.out.push(RenderCommand::PopTransform);
        }

        self.out.push(RenderCommand::PushTransform {
            matrix: world * self.user_transform,
        });
        self.emit_content(layer, frame, opacity, !self.binding_visible);
        self.out.push(RenderCommand::PopTransform);

        if clip.is_some() {
            self.out.push(RenderCommand::EndMask);
        }
        self.out.push(RenderCommand::EndGroup);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::AssetIndex;
    use crate::compiler::compile_anim;
    use crate::error::Severity;
    use crate::lottie::Document;
    use crate::path::PathRegistry;
    use crate::validate::is_balanced;
    use kurbo::Point;
    use serde_json::json;

    fn compile(raw: serde_json::Value) -> AnimIR {
        let doc = Document::from_value(raw).unwrap();
        let mut registry = PathRegistry::new();
        compile_anim(&doc, "anim", "media", &AssetIndex::new(), &mut registry).unwrap()
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

    fn media_input_layer(ind: i64) -> serde_json::Value {
        json!({
            "ind": ind, "ty": 4, "nm": "mediaInput", "hd": true,
            "ks": {}, "ip": 0, "op": 300,
            "shapes": [{"ty": "sh", "ks": {"a": 0, "k": {
                "v": [[0, 0], [100, 0], [100, 100], [0, 100]],
                "i": [[0, 0], [0, 0], [0, 0], [0, 0]],
                "o": [[0, 0], [0, 0], [0, 0], [0, 0]],
                "c": true}}}],
        })
    }

    fn draw_images(commands: &[RenderCommand]) -> Vec<(&str, f64)> {
        commands
            .iter()
            .filter_map(|c| match c {
                RenderCommand::DrawImage { asset_id, opacity } => {
                    Some((asset_id.as_str(), *opacity))
                }
                _ => None,
            })
            .collect()
    }

    fn count<F: Fn(&RenderCommand) -> bool>(commands: &[RenderCommand], f: F) -> usize {
        commands.iter().filter(|c| f(c)).count()
    }

    fn render(ir: &AnimIR, frame: f64) -> Vec<RenderCommand> {
        let (commands, issues) = ir.render_commands_with_issues(
            frame,
            Affine::IDENTITY,
            true,
            RenderMode::Preview,
        );
        assert!(issues.iter().all(|i| i.severity != Severity::Error), "{issues:?}");
        commands
    }

    #[test]
    fn single_image_layer_emits_one_wrapped_draw() {
        // Anchor equals position, so the transform is an identity product.
        let ir = compile(base_doc(json!([image_layer(1, "photo")])));
        let commands = render(&ir, 0.0);
        let draws = draw_images(&commands);
        assert_eq!(draws, vec![("anim|image_0", 1.0)]);
        assert_eq!(count(&commands, |c| matches!(c, RenderCommand::BeginGroup { .. })), 1);
        assert_eq!(count(&commands, |c| matches!(c, RenderCommand::EndGroup)), 1);
        assert!(is_balanced(&commands));
    }

    #[test]
    fn layer_outside_its_window_is_not_drawn() {
        let mut raw = base_doc(json!([image_layer(1, "photo")]));
        raw["layers"][0]["ip"] = json!(10);
        raw["layers"][0]["op"] = json!(20);
        let ir = compile(raw);
        assert!(draw_images(&render(&ir, 9.0)).is_empty());
        assert_eq!(draw_images(&render(&ir, 10.0)).len(), 1);
        assert_eq!(draw_images(&render(&ir, 19.0)).len(), 1);
        // Exclusive out point.
        assert!(draw_images(&render(&ir, 20.0)).is_empty());
    }

    #[test]
    fn layers_emit_bottom_to_top() {
        let ir = compile(base_doc(json!([
            image_layer(1, "top"),
            image_layer(2, "bottom"),
        ])));
        let commands = render(&ir, 0.0);
        let groups: Vec<_> = commands
            .iter()
            .filter_map(|c| match c {
                RenderCommand::BeginGroup { name } => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(groups, ["Layer:bottom", "Layer:top"]);
    }

    #[test]
    fn missing_parent_skips_layer_and_stays_balanced() {
        let mut raw = base_doc(json!([image_layer(1, "orphan")]));
        raw["layers"][0]["parent"] = json!(99);
        let ir = compile(raw);
        let (commands, issues) =
            ir.render_commands_with_issues(0.0, Affine::IDENTITY, true, RenderMode::Preview);
        assert!(draw_images(&commands).is_empty());
        assert!(is_balanced(&commands));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, RenderIssueCode::ParentNotFound);
        assert_eq!(issues[0].severity, Severity::Error);
        assert!(issues[0].message.contains("99"));
    }

    #[test]
    fn parent_cycle_skips_layer() {
        let mut raw = base_doc(json!([
            image_layer(1, "a"),
            image_layer(2, "b"),
        ]));
        raw["layers"][0]["parent"] = json!(2);
        raw["layers"][1]["parent"] = json!(1);
        let ir = compile(raw);
        let (commands, issues) =
            ir.render_commands_with_issues(0.0, Affine::IDENTITY, true, RenderMode::Preview);
        assert!(is_balanced(&commands));
        assert!(issues.iter().all(|i| i.code == RenderIssueCode::ParentCycle));
        assert_eq!(issues.len(), 2);
    }

    #[test]
    fn null_parent_opacity_does_not_dim_children() {
        let raw = base_doc(json!([
            image_layer(1, "child"),
            {"ind": 5, "ty": 3, "nm": "rig",
             "ks": {"o": {"a": 0, "k": 0}}, "ip": 0, "op": 300},
        ]));
        let mut raw = raw;
        raw["layers"][0]["parent"] = json!(5);
        let ir = compile(raw);
        let rendered = render(&ir, 0.0);
        let draws = draw_images(&rendered);
        assert_eq!(draws, vec![("anim|image_0", 1.0)]);
    }

    fn precomp_doc(container_opacity: f64) -> serde_json::Value {
        json!({
            "v": "5.7", "fr": 30, "ip": 0, "op": 300, "w": 540, "h": 960,
            "assets": [
                {"id": "image_0", "w": 100, "h": 100, "u": "", "p": "img.png"},
                {"id": "comp_0", "fr": 30, "layers": [image_layer(1, "inner")]},
            ],
            "layers": [{
                "ind": 1, "ty": 0, "nm": "container", "refId": "comp_0",
                "ks": {"o": {"a": 0, "k": container_opacity}},
                "ip": 0, "op": 300, "st": 0,
            }],
        })
    }

    #[test]
    fn precomp_container_opacity_multiplies_children() {
        let baseline = compile(precomp_doc(100.0));
        let dimmed = compile(precomp_doc(50.0));
        let baseline_rendered = render(&baseline, 0.0);
        let base_draws = draw_images(&baseline_rendered);
        let dimmed_rendered = render(&dimmed, 0.0);
        let dim_draws = draw_images(&dimmed_rendered);
        assert_eq!(base_draws[0].1, 1.0);
        assert_eq!(dim_draws[0].1, 0.5);
    }

    #[test]
    fn precomp_start_time_offsets_child_frames() {
        let mut raw = precomp_doc(100.0);
        raw["layers"][0]["st"] = json!(40.0);
        // Inner layer only exists for frames 0..10 of its own comp.
        raw["assets"][1]["layers"][0]["ip"] = json!(0);
        raw["assets"][1]["layers"][0]["op"] = json!(10);
        let ir = compile(raw);
        assert!(draw_images(&render(&ir, 39.0)).is_empty());
        assert_eq!(draw_images(&render(&ir, 45.0)).len(), 1);
        assert!(draw_images(&render(&ir, 50.0)).is_empty());
    }

    #[test]
    fn missing_precomp_asset_is_an_issue_not_a_panic() {
        let raw = base_doc(json!([{
            "ind": 1, "ty": 0, "nm": "container", "refId": "comp_gone",
            "ks": {}, "ip": 0, "op": 300, "st": 0,
        }]));
        let ir = compile(raw);
        let (commands, issues) =
            ir.render_commands_with_issues(0.0, Affine::IDENTITY, true, RenderMode::Preview);
        assert!(is_balanced(&commands));
        assert_eq!(issues[0].code, RenderIssueCode::PrecompAssetNotFound);
    }

    #[test]
    fn precomp_cycle_renders_pre_cycle_content_once() {
        // root -> A -> B -> A, where A also holds a direct image layer.
        let raw = json!({
            "v": "5.7", "fr": 30, "ip": 0, "op": 300, "w": 540, "h": 960,
            "assets": [
                {"id": "image_0", "w": 100, "h": 100, "u": "", "p": "img.png"},
                {"id": "A", "fr": 30, "layers": [
                    image_layer(1, "direct"),
                    {"ind": 2, "ty": 0, "nm": "to_b", "refId": "B",
                     "ks": {}, "ip": 0, "op": 300, "st": 0},
                ]},
                {"id": "B", "fr": 30, "layers": [
                    {"ind": 1, "ty": 0, "nm": "to_a", "refId": "A",
                     "ks": {}, "ip": 0, "op": 300, "st": 0},
                ]},
            ],
            "layers": [{
                "ind": 1, "ty": 0, "nm": "root_to_a", "refId": "A",
                "ks": {}, "ip": 0, "op": 300, "st": 0,
            }],
        });
        let ir = compile(raw);
        let (commands, issues) =
            ir.render_commands_with_issues(0.0, Affine::IDENTITY, true, RenderMode::Preview);
        assert_eq!(draw_images(&commands).len(), 1);
        assert!(is_balanced(&commands));
        let cycles: Vec<_> = issues
            .iter()
            .filter(|i| i.code == RenderIssueCode::PrecompCycle)
            .collect();
        assert_eq!(cycles.len(), 1);
    }

    fn masked_layer(ind: i64, modes: &[&str]) -> serde_json::Value {
        let masks: Vec<_> = modes
            .iter()
            .map(|m| {
                json!({"mode": m, "pt": {"a": 0, "k": {
                    "v": [[0, 0], [10, 0], [10, 10]],
                    "i": [[0, 0], [0, 0], [0, 0]],
                    "o": [[0, 0], [0, 0], [0, 0]],
                    "c": true}}, "o": {"a": 0, "k": 100}})
            })
            .collect();
        let mut layer = image_layer(ind, "masked");
        layer["hasMask"] = json!(true);
        layer["masksProperties"] = json!(masks);
        layer
    }

    #[test]
    fn masks_emit_in_reverse_document_order() {
        let ir = compile(base_doc(json!([masked_layer(1, &["a", "s", "i"])])));
        let commands = render(&ir, 0.0);
        let mask_modes: Vec<_> = commands
            .iter()
            .filter_map(|c| match c {
                RenderCommand::BeginMask { mode, .. } => Some(*mode),
                _ => None,
            })
            .collect();
        // Document order a, s, i reversed: i, s, a.
        assert_eq!(
            mask_modes,
            [MaskMode::Intersect, MaskMode::Subtract, MaskMode::Add]
        );
        assert_eq!(count(&commands, |c| matches!(c, RenderCommand::EndMask)), 3);
        assert!(is_balanced(&commands));
    }

    #[test]
    fn matte_scope_contains_source_then_consumer() {
        let raw = base_doc(json!([
            {"ind": 1, "ty": 4, "nm": "matte shape", "td": 1, "ks": {}, "ip": 0, "op": 300,
             "shapes": [
                 {"ty": "rc", "p": {"a": 0, "k": [0, 0]}, "s": {"a": 0, "k": [10, 10]}},
                 {"ty": "fl", "c": {"a": 0, "k": [1, 1, 1]}, "o": {"a": 0, "k": 100}},
             ]},
            {"ind": 2, "ty": 2, "nm": "consumer", "refId": "image_0", "tt": 1, "tp": 1,
             "ks": {}, "ip": 0, "op": 300},
        ]));
        let ir = compile(raw);
        let commands = render(&ir, 0.0);
        assert!(is_balanced(&commands));
        let names: Vec<_> = commands
            .iter()
            .filter_map(|c| match c {
                RenderCommand::BeginGroup { name } => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(
            names,
            ["matteSource", "Layer:matte shape", "matteConsumer", "Layer:consumer"]
        );
        assert_eq!(count(&commands, |c| matches!(c, RenderCommand::BeginMatte { .. })), 1);
        // The matte source draws its shape inside the matte scope.
        assert_eq!(count(&commands, |c| matches!(c, RenderCommand::DrawShape { .. })), 1);
        assert_eq!(draw_images(&commands).len(), 1);
    }

    #[test]
    fn shared_matte_source_re_emits_per_consumer() {
        let raw = base_doc(json!([
            {"ind": 1, "ty": 4, "nm": "shared", "td": 1, "ks": {}, "ip": 0, "op": 300,
             "shapes": [
                 {"ty": "rc", "p": {"a": 0, "k": [0, 0]}, "s": {"a": 0, "k": [10, 10]}},
                 {"ty": "fl", "c": {"a": 0, "k": [1, 1, 1]}, "o": {"a": 0, "k": 100}},
             ]},
            {"ind": 2, "ty": 2, "nm": "first", "refId": "image_0", "tt": 1, "tp": 1,
             "ks": {}, "ip": 0, "op": 300},
            {"ind": 3, "ty": 2, "nm": "second", "refId": "image_0", "tt": 3, "tp": 1,
             "ks": {}, "ip": 0, "op": 300},
        ]));
        let ir = compile(raw);
        let commands = render(&ir, 0.0);
        assert_eq!(count(&commands, |c| matches!(c, RenderCommand::BeginMatte { .. })), 2);
        assert_eq!(count(&commands, |c| matches!(c, RenderCommand::DrawShape { .. })), 2);
        assert!(is_balanced(&commands));
    }

    fn binding_doc() -> serde_json::Value {
        base_doc(json!([
            image_layer(1, "media"),
            media_input_layer(2),
        ]))
    }

    #[test]
    fn media_input_accessors_report_world_geometry() {
        let ir = compile(binding_doc());
        let path = ir.media_input_path(0.0).unwrap();
        assert_eq!(
            path.vertices(),
            &[
                Point::new(0.0, 0.0),
                Point::new(100.0, 0.0),
                Point::new(100.0, 100.0),
                Point::new(0.0, 100.0),
            ]
        );
        assert_eq!(ir.media_input_world_matrix(0.0).unwrap(), Affine::IDENTITY);
        assert!(ir.media_input_hit_test(Point::new(50.0, 50.0), 0.0));
        assert!(!ir.media_input_hit_test(Point::new(150.0, 50.0), 0.0));
    }

    #[test]
    fn media_input_geometry_follows_precomp_containers() {
        let raw = json!({
            "v": "5.7", "fr": 30, "ip": 0, "op": 300, "w": 1080, "h": 960,
            "assets": [
                {"id": "image_0", "w": 100, "h": 100, "u": "", "p": "img.png"},
                {"id": "comp_0", "fr": 30, "layers": [
                    image_layer(1, "media"),
                    media_input_layer(2),
                ]},
            ],
            "layers": [{
                "ind": 5, "ty": 0, "nm": "container", "refId": "comp_0",
                "ks": {"p": {"a": 0, "k": [540.0, 0.0]}}, "ip": 0, "op": 300, "st": 0,
            }],
        });
        let ir = compile(raw);
        let path = ir.media_input_path(0.0).unwrap();
        assert_eq!(
            path.vertices(),
            &[
                Point::new(540.0, 0.0),
                Point::new(640.0, 0.0),
                Point::new(640.0, 100.0),
                Point::new(540.0, 100.0),
            ]
        );
    }

    #[test]
    fn input_clip_pipeline_has_fixed_window_and_user_transform_after_binding() {
        let ir = compile(binding_doc());
        let user = Affine::translate((50.0, -30.0));
        let (commands, _) =
            ir.render_commands_with_issues(0.0, user, true, RenderMode::Preview);
        assert!(is_balanced(&commands));

        // Window transform (immediately before the intersect mask) must not
        // depend on the user transform.
        let window_of = |commands: &[RenderCommand]| -> Affine {
            commands
                .iter()
                .zip(commands.iter().skip(1))
                .find_map(|(a, b)| match (a, b) {
                    (
                        RenderCommand::PushTransform { matrix },
                        RenderCommand::BeginMask {
                            mode: MaskMode::Intersect,
                            ..
                        },
                    ) => Some(*matrix),
                    _ => None,
                })
                .unwrap()
        };
        let with_user = window_of(&commands);
        let (baseline, _) = ir.render_commands_with_issues(
            0.0,
            Affine::IDENTITY,
            true,
            RenderMode::Preview,
        );
        assert_eq!(with_user, window_of(&baseline));

        // Mask count does not vary with the user transform either.
        assert_eq!(
            count(&commands, |c| matches!(c, RenderCommand::BeginMask { .. })),
            count(&baseline, |c| matches!(c, RenderCommand::BeginMask { .. })),
        );

        // The draw transform composes the user transform after the binding
        // transform: effective = A(t) * U.
        let draw_transform = commands
            .iter()
            .zip(commands.iter().skip(1))
            .find_map(|(a, b)| match (a, b) {
                (RenderCommand::PushTransform { matrix }, RenderCommand::DrawImage { .. }) => {
                    Some(*matrix)
                }
                _ => None,
            })
            .unwrap();
        let binding_world = Affine::translate((270.0, 480.0))
            * Affine::translate((-270.0, -480.0));
        assert_eq!(draw_transform, binding_world * user);
    }

    #[test]
    fn identity_user_transform_is_a_no_op() {
        let ir = compile(binding_doc());
        let (a, _) = ir.render_commands_with_issues(
            3.0,
            Affine::IDENTITY,
            true,
            RenderMode::Preview,
        );
        let (b, _) = ir.render_commands_with_issues(
            3.0,
            Affine::IDENTITY,
            true,
            RenderMode::Preview,
        );
        assert_eq!(a, b);
    }

    #[test]
    fn binding_layer_masks_are_ignored_with_one_warning() {
        let mut raw = binding_doc();
        raw["layers"][0]["hasMask"] = json!(true);
        raw["layers"][0]["masksProperties"] = json!([
            {"mode": "a", "pt": {"a": 0, "k": {
                "v": [[0, 0], [10, 0], [10, 10]],
                "i": [[0, 0], [0, 0], [0, 0]],
                "o": [[0, 0], [0, 0], [0, 0]],
                "c": true}}},
        ]);
        let ir = compile(raw);
        let (commands, issues) = ir.render_commands_with_issues(
            0.0,
            Affine::translate((50.0, -30.0)),
            true,
            RenderMode::Preview,
        );
        let intersects = count(&commands, |c| {
            matches!(c, RenderCommand::BeginMask { mode: MaskMode::Intersect, .. })
        });
        let adds = count(&commands, |c| {
            matches!(c, RenderCommand::BeginMask { mode: MaskMode::Add, .. })
        });
        assert_eq!(intersects, 1);
        assert_eq!(adds, 0);
        let warnings: Vec<_> = issues
            .iter()
            .filter(|i| i.code == RenderIssueCode::BindingLayerMasksIgnored)
            .collect();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].severity, Severity::Warning);
        assert!(is_balanced(&commands));
    }

    #[test]
    fn binding_layer_matte_is_ignored_with_one_warning() {
        let raw = base_doc(json!([
            {"ind": 3, "ty": 4, "nm": "matte shape", "td": 1, "ks": {}, "ip": 0, "op": 300,
             "shapes": [
                 {"ty": "rc", "p": {"a": 0, "k": [0, 0]}, "s": {"a": 0, "k": [10, 10]}},
                 {"ty": "fl", "c": {"a": 0, "k": [1, 1, 1]}, "o": {"a": 0, "k": 100}},
             ]},
            {"ind": 1, "ty": 2, "nm": "media", "refId": "image_0", "tt": 1, "tp": 3,
             "ks": {}, "ip": 0, "op": 300},
            media_input_layer(2),
        ]));
        let ir = compile(raw);
        let (commands, issues) = ir.render_commands_with_issues(
            0.0,
            Affine::IDENTITY,
            true,
            RenderMode::Preview,
        );
        // The inputClip pipeline replaces the document matte entirely.
        assert_eq!(count(&commands, |c| matches!(c, RenderCommand::BeginMatte { .. })), 0);
        assert_eq!(count(&commands, |c| matches!(c, RenderCommand::DrawShape { .. })), 0);
        assert_eq!(draw_images(&commands).len(), 1);
        assert!(is_balanced(&commands));
        let warnings: Vec<_> = issues
            .iter()
            .filter(|i| i.code == RenderIssueCode::BindingLayerMatteIgnored)
            .collect();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].severity, Severity::Warning);
    }

    #[test]
    fn hidden_binding_media_keeps_scopes_but_suppresses_the_draw() {
        let ir = compile(binding_doc());
        let (visible, _) = ir.render_commands_with_issues(
            0.0,
            Affine::IDENTITY,
            true,
            RenderMode::Preview,
        );
        let (hidden, _) = ir.render_commands_with_issues(
            0.0,
            Affine::IDENTITY,
            false,
            RenderMode::Preview,
        );
        assert_eq!(draw_images(&visible).len(), 1);
        assert!(draw_images(&hidden).is_empty());
        // Only the drawImage differs; every scope is still emitted.
        assert_eq!(visible.len(), hidden.len() + 1);
        assert!(is_balanced(&hidden));
    }

    #[test]
    fn edit_mode_renders_binding_only_at_frame_zero() {
        let raw = base_doc(json!([
            image_layer(1, "media"),
            media_input_layer(2),
            {"ind": 3, "ty": 4, "nm": "decoration", "ks": {}, "ip": 0, "op": 300,
             "shapes": [
                 {"ty": "el", "p": {"a": 0, "k": [0, 0]}, "s": {"a": 0, "k": [50, 50]}},
                 {"ty": "fl", "c": {"a": 0, "k": [1, 0, 0]}, "o": {"a": 0, "k": 100}},
             ]},
        ]));
        let ir = compile(raw);
        let (preview, _) = ir.render_commands_with_issues(
            120.0,
            Affine::IDENTITY,
            true,
            RenderMode::Preview,
        );
        let (edit, _) = ir.render_commands_with_issues(
            120.0,
            Affine::IDENTITY,
            true,
            RenderMode::Edit,
        );
        assert!(is_balanced(&edit));
        assert!(edit.len() <= preview.len());
        // Decorative shapes are gone in edit mode.
        assert_eq!(count(&edit, |c| matches!(c, RenderCommand::DrawShape { .. })), 0);
        // Edit asset ids are a subset of preview asset ids.
        let preview_assets: HashSet<_> =
            draw_images(&preview).into_iter().map(|(id, _)| id.to_string()).collect();
        for (id, _) in draw_images(&edit) {
            assert!(preview_assets.contains(id));
        }
        // Edit renders at the canonical frame: frames sampled are 0.
        let frames: Vec<_> = edit
            .iter()
            .filter_map(|c| match c {
                RenderCommand::BeginMask { frame, .. } => Some(*frame),
                _ => None,
            })
            .collect();
        assert!(frames.iter().all(|&f| f == EDIT_FRAME_INDEX));
    }

    #[test]
    fn edit_mode_descends_precomp_chain_to_binding() {
        let raw = json!({
            "v": "5.7", "fr": 30, "ip": 0, "op": 300, "w": 540, "h": 960,
            "assets": [
                {"id": "image_0", "w": 100, "h": 100, "u": "", "p": "img.png"},
                {"id": "comp_0", "fr": 30, "layers": [
                    image_layer(1, "media"),
                    media_input_layer(2),
                ]},
            ],
            "layers": [
                {"ind": 1, "ty": 0, "nm": "container", "refId": "comp_0",
                 "ks": {}, "ip": 0, "op": 300, "st": 0},
                image_layer(9, "decor"),
            ],
        });
        let ir = compile(raw);
        let (edit, _) = ir.render_commands_with_issues(
            0.0,
            Affine::IDENTITY,
            true,
            RenderMode::Edit,
        );
        let draws = draw_images(&edit);
        assert_eq!(draws.len(), 1);
        assert!(is_balanced(&edit));
    }

    #[test]
    fn render_commands_records_last_issues() {
        let mut raw = base_doc(json!([image_layer(1, "orphan")]));
        raw["layers"][0]["parent"] = json!(99);
        let mut ir = compile(raw);
        assert!(ir.last_render_issues.is_empty());
        let _ = ir.render_commands(0.0, Affine::IDENTITY, true, RenderMode::Preview);
        assert_eq!(ir.last_render_issues.len(), 1);
        assert_eq!(ir.last_render_issues[0].code, RenderIssueCode::ParentNotFound);
    }

    #[test]
    fn determinism_across_fresh_compilations() {
        let raw = binding_doc();
        let ir_a = compile(raw.clone());
        let ir_b = compile(raw);
        let (a, _) = ir_a.render_commands_with_issues(
            7.0,
            Affine::IDENTITY,
            true,
            RenderMode::Preview,
        );
        let (b, _) = ir_b.render_commands_with_issues(
            7.0,
            Affine::IDENTITY,
            true,
            RenderMode::Preview,
        );
        assert_eq!(a, b);
    }

    #[test]
    fn group_transforms_wrap_shape_draws() {
        let raw = base_doc(json!([
            {"ind": 1, "ty": 4, "nm": "grouped", "ks": {}, "ip": 0, "op": 300,
             "shapes": [{"ty": "gr", "it": [
                 {"ty": "tr", "p": {"a": 0, "k": [30.0, 0.0]}, "o": {"a": 0, "k": 50}},
                 {"ty": "rc", "p": {"a": 0, "k": [0, 0]}, "s": {"a": 0, "k": [10, 10]}},
                 {"ty": "fl", "c": {"a": 0, "k": [0, 0, 1]}, "o": {"a": 0, "k": 100}},
             ]}]},
        ]));
        let ir = compile(raw);
        let commands = render(&ir, 0.0);
        // Layer world + group transform.
        assert_eq!(count(&commands, |c| matches!(c, RenderCommand::PushTransform { .. })), 2);
        let shape = commands
            .iter()
            .find_map(|c| match c {
                RenderCommand::DrawShape { layer_opacity, .. } => Some(*layer_opacity),
                _ => None,
            })
            .unwrap();
        // Group opacity 50% multiplies into the layer opacity.
        assert_eq!(shape, 0.5);
        assert!(is_balanced(&commands));
    }
}
