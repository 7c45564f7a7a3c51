//! Scene-template descriptor model and its structural validator.

use std::collections::HashSet;

use kurbo::Rect;
use serde::{Deserialize, Serialize};

use crate::error::{CompileError, ValidationIssue};

pub const ALLOWED_MEDIA_KINDS: [&str; 3] = ["photo", "video", "color"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub schema_version: i64,
    pub scene_id: String,
    pub canvas: Canvas,
    #[serde(default)]
    pub media_blocks: Vec<MediaBlock>,
}

impl Scene {
    pub fn from_str(json: &str) -> Result<Self, CompileError> {
        serde_json::from_str(json).map_err(|e| CompileError::MalformedDocument {
            reason: e.to_string(),
            path: "$".into(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Canvas {
    pub width: f64,
    pub height: f64,
    pub fps: f64,
    pub duration_frames: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaBlock {
    pub block_id: String,
    #[serde(default)]
    pub z_index: i64,
    pub rect: RectSpec,
    #[serde(default)]
    pub container_clip: ContainerClip,
    #[serde(default)]
    pub timing: Option<BlockTiming>,
    #[serde(default)]
    pub input: Option<MediaInputSpec>,
    #[serde(default)]
    pub variants: Vec<Variant>,
    #[serde(default)]
    pub selected_variant: Option<usize>,
}

impl MediaBlock {
    /// Index of the variant this block plays.
    pub fn selected_variant_index(&self) -> usize {
        self.selected_variant.unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RectSpec {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl RectSpec {
    pub fn to_rect(self) -> Rect {
        Rect::new(self.x, self.y, self.x + self.width, self.y + self.height)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum ContainerClip {
    #[default]
    #[serde(rename = "slotRect")]
    SlotRect,
    Unsupported,
}

// Unknown clip kinds must survive deserialization so the validator can
// report them, which rules out a plain derive.
impl<'de> serde::Deserialize<'de> for ContainerClip {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "slotRect" => Self::SlotRect,
            _ => Self::Unsupported,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockTiming {
    #[serde(default)]
    pub start_frame: f64,
    #[serde(default)]
    pub duration_frames: Option<f64>,
    #[serde(default)]
    pub loop_range: Option<LoopRange>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LoopRange {
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaInputSpec {
    #[serde(default)]
    pub rect: Option<RectSpec>,
    pub binding_key: String,
    #[serde(default)]
    pub allowed_media: Vec<String>,
    #[serde(default)]
    pub mask_ref: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    #[serde(default)]
    pub variant_id: Option<String>,
    pub anim_ref: String,
    #[serde(default)]
    pub duration_frames: Option<f64>,
}

/// Structural checks over a scene descriptor. Issues never abort; callers
/// decide whether to proceed.
pub struct SceneValidator;

impl SceneValidator {
    pub fn validate(scene: &Scene, mask_catalog: Option<&HashSet<String>>) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        let canvas = &scene.canvas;
        if canvas.width <= 0.0 || canvas.height <= 0.0 {
            issues.push(ValidationIssue::error(
                "CANVAS_INVALID",
                "$.canvas",
                format!("canvas must be positive, got {}x{}", canvas.width, canvas.height),
            ));
        }
        if canvas.fps <= 0.0 {
            issues.push(ValidationIssue::error(
                "CANVAS_INVALID",
                "$.canvas.fps",
                format!("fps must be positive, got {}", canvas.fps),
            ));
        }
        if canvas.duration_frames <= 0.0 {
            issues.push(ValidationIssue::error(
                "CANVAS_INVALID",
                "$.canvas.durationFrames",
                format!("duration must be positive, got {}", canvas.duration_frames),
            ));
        }

        if scene.media_blocks.is_empty() {
            issues.push(ValidationIssue::error(
                "BLOCKS_EMPTY",
                "$.mediaBlocks",
                "scene has no media blocks",
            ));
        }

        let mut seen_ids = HashSet::new();
        for (i, block) in scene.media_blocks.iter().enumerate() {
            let base = format!("$.mediaBlocks[{i}]");
            if !seen_ids.insert(block.block_id.clone()) {
                issues.push(ValidationIssue::error(
                    "BLOCK_ID_DUPLICATE",
                    format!("{base}.blockId"),
                    format!("duplicate block id '{}'", block.block_id),
                ));
            }
            let rect = block.rect;
            if rect.width <= 0.0 || rect.height <= 0.0 {
                issues.push(ValidationIssue::error(
                    "BLOCK_RECT_INVALID",
                    format!("{base}.rect"),
                    format!("block rect must be positive, got {}x{}", rect.width, rect.height),
                ));
            } else if rect.x < 0.0
                || rect.y < 0.0
                || rect.x + rect.width > canvas.width
                || rect.y + rect.height > canvas.height
            {
                issues.push(ValidationIssue::warning(
                    "BLOCK_OUT_OF_CANVAS",
                    format!("{base}.rect"),
                    format!("block '{}' extends outside the canvas", block.block_id),
                ));
            }
            if block.container_clip == ContainerClip::Unsupported {
                issues.push(ValidationIssue::error(
                    "CONTAINER_CLIP_UNSUPPORTED",
                    format!("{base}.containerClip"),
                    "only 'slotRect' container clipping is supported",
                ));
            }

            if let Some(timing) = &block.timing {
                if timing.start_frame < 0.0
                    || timing.duration_frames.is_some_and(|d| d <= 0.0)
                    || timing.start_frame >= canvas.duration_frames
                {
                    issues.push(ValidationIssue::error(
                        "TIMING_INVALID",
                        format!("{base}.timing"),
                        format!("timing window is outside 0..{}", canvas.duration_frames),
                    ));
                }
                if let Some(range) = &timing.loop_range {
                    if range.start > range.end {
                        issues.push(ValidationIssue::error(
                            "LOOP_RANGE_INVALID",
                            format!("{base}.timing.loopRange"),
                            format!("loop range start {} > end {}", range.start, range.end),
                        ));
                    }
                }
            }

            if let Some(input) = &block.input {
                let input_base = format!("{base}.input");
                if input.allowed_media.is_empty() {
                    issues.push(ValidationIssue::error(
                        "ALLOWED_MEDIA_EMPTY",
                        format!("{input_base}.allowedMedia"),
                        "input accepts no media kinds",
                    ));
                }
                for (j, kind) in input.allowed_media.iter().enumerate() {
                    if !ALLOWED_MEDIA_KINDS.contains(&kind.as_str()) {
                        issues.push(ValidationIssue::error(
                            "ALLOWED_MEDIA_UNKNOWN",
                            format!("{input_base}.allowedMedia[{j}]"),
                            format!("unknown media kind '{kind}'"),
                        ));
                    }
                }
                if let (Some(mask_ref), Some(catalog)) = (&input.mask_ref, mask_catalog) {
                    if !catalog.contains(mask_ref) {
                        issues.push(ValidationIssue::error(
                            "MASK_REF_UNKNOWN",
                            format!("{input_base}.maskRef"),
                            format!("mask '{mask_ref}' is not in the catalog"),
                        ));
                    }
                }
            }

            if block.variants.is_empty() {
                issues.push(ValidationIssue::error(
                    "VARIANTS_EMPTY",
                    format!("{base}.variants"),
                    format!("block '{}' has no variants", block.block_id),
                ));
            }
            for (j, variant) in block.variants.iter().enumerate() {
                let vbase = format!("{base}.variants[{j}]");
                if variant.anim_ref.is_empty() {
                    issues.push(ValidationIssue::error(
                        "ANIM_REF_EMPTY",
                        format!("{vbase}.animRef"),
                        "variant has an empty animRef",
                    ));
                }
                if variant.duration_frames.is_some_and(|d| d <= 0.0) {
                    issues.push(ValidationIssue::error(
                        "VARIANT_DURATION_INVALID",
                        format!("{vbase}.durationFrames"),
                        "variant duration must be positive",
                    ));
                }
            }
        }

        issues
    }
}
