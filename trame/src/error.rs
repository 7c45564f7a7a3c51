//! Error and issue types.
//!
//! Compile errors are fatal and abort the compilation of one animation.
//! Render issues are collected per call and never abort command emission.

use serde::Serialize;
use thiserror::Error;

/// Fatal error raised while compiling one animation document.
///
/// Each variant carries a JSONPath-like `path` pointing at the offending
/// node of the source document.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("matte target {target} not found for layer {consumer} at {path}")]
    MatteTargetNotFound {
        target: i64,
        consumer: i64,
        path: String,
    },
    #[error("matte target {target} appears after consumer {consumer} at {path}")]
    MatteTargetInvalidOrder {
        target: i64,
        consumer: i64,
        path: String,
    },
    #[error("mediaInput layer is not in the binding layer's composition at {path}")]
    MediaInputNotInSameComp { path: String },
    #[error("binding layer has shape content but no mediaInput window at {path}")]
    BindingShapeWithoutMediaInput { path: String },
    #[error("unsupported mask mode '{mode}' at {path}")]
    UnsupportedMaskMode { mode: String, path: String },
    #[error("unsupported shape feature: {feature} at {path}")]
    UnsupportedShapeFeature { feature: String, path: String },
    #[error("invalid keyframe ({reason}) at {path}")]
    InvalidKeyframe { reason: String, path: String },
    #[error("malformed document ({reason}) at {path}")]
    MalformedDocument { reason: String, path: String },
    #[error("no animation loaded for animRef '{anim_ref}'")]
    MissingAnimation { anim_ref: String },
    #[error("block '{block_id}' selects variant {index} but only {len} exist")]
    VariantOutOfRange {
        block_id: String,
        index: usize,
        len: usize,
    },
}

impl CompileError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MatteTargetNotFound { .. } => "MATTE_TARGET_NOT_FOUND",
            Self::MatteTargetInvalidOrder { .. } => "MATTE_TARGET_INVALID_ORDER",
            Self::MediaInputNotInSameComp { .. } => "MEDIA_INPUT_NOT_IN_SAME_COMP",
            Self::BindingShapeWithoutMediaInput { .. } => "BINDING_SHAPE_WITHOUT_MEDIA_INPUT",
            Self::UnsupportedMaskMode { .. } => "UNSUPPORTED_MASK_MODE",
            Self::UnsupportedShapeFeature { .. } => "UNSUPPORTED_SHAPE_FEATURE",
            Self::InvalidKeyframe { .. } => "INVALID_KEYFRAME",
            Self::MalformedDocument { .. } => "MALFORMED_DOCUMENT",
            Self::MissingAnimation { .. } => "MISSING_ANIMATION",
            Self::VariantOutOfRange { .. } => "VARIANT_OUT_OF_RANGE",
        }
    }
}

/// Severity shared by render issues and validator issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// Codes for issues surfaced (not thrown) while emitting render commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RenderIssueCode {
    #[serde(rename = "PARENT_NOT_FOUND")]
    ParentNotFound,
    #[serde(rename = "PARENT_CYCLE")]
    ParentCycle,
    #[serde(rename = "PRECOMP_ASSET_NOT_FOUND")]
    PrecompAssetNotFound,
    #[serde(rename = "PRECOMP_CYCLE")]
    PrecompCycle,
    #[serde(rename = "BINDING_LAYER_MASKS_IGNORED")]
    BindingLayerMasksIgnored,
    #[serde(rename = "BINDING_LAYER_MATTE_IGNORED")]
    BindingLayerMatteIgnored,
}

impl RenderIssueCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ParentNotFound => "PARENT_NOT_FOUND",
            Self::ParentCycle => "PARENT_CYCLE",
            Self::PrecompAssetNotFound => "PRECOMP_ASSET_NOT_FOUND",
            Self::PrecompCycle => "PRECOMP_CYCLE",
            Self::BindingLayerMasksIgnored => "BINDING_LAYER_MASKS_IGNORED",
            Self::BindingLayerMatteIgnored => "BINDING_LAYER_MATTE_IGNORED",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::BindingLayerMasksIgnored | Self::BindingLayerMatteIgnored => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

/// One issue observed during a `render_commands` call.
#[derive(Debug, Clone, Serialize)]
pub struct RenderIssue {
    pub code: RenderIssueCode,
    pub severity: Severity,
    pub message: String,
}

impl RenderIssue {
    pub fn new(code: RenderIssueCode, message: impl Into<String>) -> Self {
        Self {
            code,
            severity: code.severity(),
            message: message.into(),
        }
    }
}

/// One issue reported by a document or scene validator.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub code: &'static str,
    /// JSONPath-like locator into the validated document.
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn error(code: &'static str, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn warning(code: &'static str, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            path: path.into(),
            message: message.into(),
        }
    }
}
