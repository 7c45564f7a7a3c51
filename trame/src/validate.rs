//! Pre-compile animation validation and post-emission stream validation.

use crate::compiler::MEDIA_INPUT_LAYER_NAME;
use crate::error::ValidationIssue;
use crate::lottie::{layer_type, Document, Layer};
use crate::render::RenderCommand;
use crate::shape;

/// Structural checks over one animation document, prior to (or instead of)
/// compilation. Issues never abort; callers decide whether to proceed.
pub struct AnimValidator;

impl AnimValidator {
    pub fn validate(doc: &Document, binding_key: &str) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        Self::check_mattes(&doc.layers, "$.layers", &mut issues);
        for (i, asset) in doc.assets.iter().enumerate() {
            if let Some(layers) = &asset.layers {
                Self::check_mattes(layers, &format!("$.assets[{i}].layers"), &mut issues);
            }
        }

        Self::check_media_input(doc, binding_key, &mut issues);
        issues
    }

    /// Matte pairing, with the same tp + adjacency rules as the compiler.
    fn check_mattes(layers: &[Layer], base: &str, issues: &mut Vec<ValidationIssue>) {
        for (i, layer) in layers.iter().enumerate() {
            if layer.tt.filter(|&t| t != 0).is_none() {
                continue;
            }
            let Some(tp) = layer.tp else {
                continue;
            };
            match layers.iter().position(|l| l.ind == Some(tp)) {
                None => issues.push(ValidationIssue::error(
                    "MATTE_TARGET_NOT_FOUND",
                    format!("{base}[{i}].tp"),
                    format!("matte target {tp} does not exist"),
                )),
                Some(j) if j >= i => issues.push(ValidationIssue::error(
                    "MATTE_TARGET_INVALID_ORDER",
                    format!("{base}[{i}].tp"),
                    format!("matte target {tp} appears after its consumer"),
                )),
                Some(_) => {}
            }
        }
    }

    fn check_media_input(doc: &Document, binding_key: &str, issues: &mut Vec<ValidationIssue>) {
        // Comp index paired with each layer list: None = root.
        let comps: Vec<(Option<usize>, &Vec<Layer>)> = std::iter::once((None, &doc.layers))
            .chain(
                doc.assets
                    .iter()
                    .enumerate()
                    .filter_map(|(i, a)| a.layers.as_ref().map(|l| (Some(i), l))),
            )
            .collect();

        let binding_comp = comps
            .iter()
            .find(|(_, layers)| layers.iter().any(|l| l.name() == binding_key))
            .map(|(comp, _)| *comp);

        let media_input = comps.iter().find_map(|(comp, layers)| {
            layers
                .iter()
                .enumerate()
                .find(|(_, l)| l.name() == MEDIA_INPUT_LAYER_NAME)
                .map(|(i, l)| (*comp, i, l))
        });

        let Some((comp, index, layer)) = media_input else {
            issues.push(ValidationIssue::error(
                "MEDIA_INPUT_MISSING",
                "$",
                format!("no layer named '{MEDIA_INPUT_LAYER_NAME}'"),
            ));
            return;
        };
        let base = match comp {
            None => format!("$.layers[{index}]"),
            Some(a) => format!("$.assets[{a}].layers[{index}]"),
        };

        if layer.ty != layer_type::SHAPE {
            issues.push(ValidationIssue::error(
                "MEDIA_INPUT_NOT_SHAPE",
                format!("{base}.ty"),
                format!("mediaInput layer has type {}, expected shape", layer.ty),
            ));
            return;
        }

        match shape::path_primitive_count(&layer.shapes) {
            0 => issues.push(ValidationIssue::error(
                "MEDIA_INPUT_NO_PATH",
                format!("{base}.shapes"),
                "mediaInput shape tree contains no path",
            )),
            1 => {}
            n => issues.push(ValidationIssue::error(
                "MEDIA_INPUT_MULTIPLE_PATHS",
                format!("{base}.shapes"),
                format!("mediaInput shape tree contains {n} paths"),
            )),
        }

        if let Some(modifier) = shape::forbidden_modifier(&layer.shapes) {
            issues.push(ValidationIssue::error(
                "MEDIA_INPUT_FORBIDDEN_MODIFIER",
                format!("{base}.shapes"),
                format!("mediaInput shape tree uses a {modifier} modifier"),
            ));
        }

        if binding_comp.is_some_and(|b| b != comp) {
            issues.push(ValidationIssue::error(
                "MEDIA_INPUT_NOT_IN_SAME_COMP",
                base,
                "mediaInput is not in the binding layer's composition",
            ));
        }
    }
}

/// Simulates the per-kind scope stacks of an emitted stream and reports
/// stray terminators, unbalanced scopes, and malformed matte structure.
///
/// Transform and mask scopes may interleave (the inputClip pipeline closes
/// a transform inside an open mask), so balance is tracked per kind.
pub struct RenderCommandValidator;

struct MatteFrame {
    group_depth_at_open: usize,
    child_groups: Vec<String>,
}

impl RenderCommandValidator {
    pub fn validate(commands: &[RenderCommand]) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        let mut groups = 0usize;
        let mut transforms = 0usize;
        let mut clips = 0usize;
        let mut masks = 0usize;
        let mut mattes: Vec<MatteFrame> = Vec::new();

        let mut stray = |kind: &str, i: usize, issues: &mut Vec<ValidationIssue>| {
            issues.push(ValidationIssue::error(
                "STREAM_STRAY_END",
                format!("$.commands[{i}]"),
                format!("{kind} terminator without a matching open scope"),
            ));
        };

        for (i, command) in commands.iter().enumerate() {
            match command {
                RenderCommand::BeginGroup { name } => {
                    if let Some(frame) = mattes.last_mut() {
                        if groups == frame.group_depth_at_open {
                            frame.child_groups.push(name.clone());
                        }
                    }
                    groups += 1;
                }
                RenderCommand::EndGroup => {
                    if groups == 0 {
                        stray("group", i, &mut issues);
                    } else {
                        groups -= 1;
                    }
                }
                RenderCommand::PushTransform { .. } => transforms += 1,
                RenderCommand::PopTransform => {
                    if transforms == 0 {
                        stray("transform", i, &mut issues);
                    } else {
                        transforms -= 1;
                    }
                }
                RenderCommand::PushClipRect { .. } => clips += 1,
                RenderCommand::PopClipRect => {
                    if clips == 0 {
                        stray("clip", i, &mut issues);
                    } else {
                        clips -= 1;
                    }
                }
                RenderCommand::BeginMask { .. } => masks += 1,
                RenderCommand::EndMask => {
                    if masks == 0 {
                        stray("mask", i, &mut issues);
                    } else {
                        masks -= 1;
                    }
                }
                RenderCommand::BeginMatte { .. } => mattes.push(MatteFrame {
                    group_depth_at_open: groups,
                    child_groups: Vec::new(),
                }),
                RenderCommand::EndMatte => match mattes.pop() {
                    None => stray("matte", i, &mut issues),
                    Some(frame) => {
                        if frame.child_groups != ["matteSource", "matteConsumer"] {
                            issues.push(ValidationIssue::error(
                                "MATTE_STRUCTURE_INVALID",
                                format!("$.commands[{i}]"),
                                format!(
                                    "matte scope contains groups {:?}, expected \
                                     [\"matteSource\", \"matteConsumer\"]",
                                    frame.child_groups
                                ),
                            ));
                        }
                    }
                },
                RenderCommand::DrawImage { .. }
                | RenderCommand::DrawShape { .. }
                | RenderCommand::DrawStroke { .. } => {}
            }
        }

        let end = commands.len();
        for (kind, open) in [
            ("group", groups),
            ("transform", transforms),
            ("clip", clips),
            ("mask", masks),
            ("matte", mattes.len()),
        ] {
            if open != 0 {
                issues.push(ValidationIssue::error(
                    "STREAM_UNBALANCED",
                    format!("$.commands[{end}]"),
                    format!("{open} {kind} scope(s) left open at end of stream"),
                ));
            }
        }

        issues
    }
}

/// True when every scope kind of the stream is balanced and well formed.
pub fn is_balanced(commands: &[RenderCommand]) -> bool {
    RenderCommandValidator::validate(commands).is_empty()
}
