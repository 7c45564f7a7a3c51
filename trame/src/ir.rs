//! The frame-addressable intermediate representation of one animation.

use std::collections::BTreeMap;

use kurbo::{Rect, Size};
use serde::{Deserialize, Serialize};

use crate::assets::AssetIndex;
use crate::error::RenderIssue;
use crate::path::{AnimPath, PathId};
use crate::value::{AnimTrack, GroupTransform, StrokeStyle, TransformTrack};

/// Layer identifier, unique within one composition (Lottie `ind`).
pub type LayerId = i64;

/// Reference to a composition within one [`AnimIR`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompRef {
    Root,
    Asset(String),
}

impl std::fmt::Display for CompRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Root => f.write_str("root"),
            Self::Asset(id) => f.write_str(id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerKind {
    Image,
    Shape,
    Null,
    Precomp,
    /// Parsed but never rendered.
    Text,
}

/// Mask blend mode; anything else in the document is a compile error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskMode {
    Add,
    Subtract,
    Intersect,
}

impl MaskMode {
    pub fn from_lottie(raw: &str) -> Option<Self> {
        match raw {
            "a" => Some(Self::Add),
            "s" => Some(Self::Subtract),
            "i" => Some(Self::Intersect),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatteMode {
    Alpha,
    AlphaInverted,
    Luma,
    LumaInverted,
}

impl MatteMode {
    /// Decodes the Lottie `tt` field.
    pub fn from_lottie(raw: i64) -> Option<Self> {
        match raw {
            1 => Some(Self::Alpha),
            2 => Some(Self::AlphaInverted),
            3 => Some(Self::Luma),
            4 => Some(Self::LumaInverted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mask {
    pub mode: MaskMode,
    pub inverted: bool,
    pub path_id: PathId,
    pub opacity: AnimTrack<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatteInfo {
    pub mode: MatteMode,
    pub source_layer_id: LayerId,
}

/// `(inPoint, outPoint, startTime)`; a layer is visible exactly when
/// `in_point <= local_frame < out_point`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LayerTiming {
    pub in_point: f64,
    pub out_point: f64,
    pub start_time: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    /// RGB in 0..1.
    pub color: [f64; 3],
    /// Lottie range 0..100.
    pub opacity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapeContent {
    pub path_id: PathId,
    /// Ancestor-chain group transforms, outermost first.
    pub group_transforms: Vec<GroupTransform>,
    pub fill: Option<Fill>,
    pub stroke: Option<StrokeStyle>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LayerContent {
    None,
    Image { asset_id: String },
    Shape(ShapeContent),
    Precomp { comp_id: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    pub kind: LayerKind,
    pub timing: LayerTiming,
    pub parent_id: Option<LayerId>,
    pub transform: TransformTrack,
    pub masks: Vec<Mask>,
    pub matte: Option<MatteInfo>,
    pub content: LayerContent,
    /// Matte sources are only drawn inside a `matteSource` scope.
    pub is_matte_source: bool,
    pub is_hidden: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Composition {
    pub size: Size,
    pub layers: Vec<Layer>,
}

impl Composition {
    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }
}

/// The single layer that receives user media, identified by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingInfo {
    pub binding_key: String,
    pub layer_id: LayerId,
    pub asset_id: Option<String>,
    pub comp: CompRef,
}

/// One precomp hop on the instancing path from the root composition down
/// to a target composition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainLink {
    /// Composition containing the precomp layer.
    pub comp: CompRef,
    pub layer_id: LayerId,
}

/// The hidden `mediaInput` window: the fixed geometry through which bound
/// media is clipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputGeometry {
    pub layer_id: LayerId,
    pub comp: CompRef,
    pub path_id: PathId,
    pub path: AnimPath,
    /// Group transforms above the path inside the mediaInput shape tree.
    pub group_transforms: Vec<GroupTransform>,
    pub bounding_rect: Rect,
    /// Precomp layers from the root down to `comp` (empty when `comp` is
    /// the root).
    pub chain: Vec<ChainLink>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnimMeta {
    pub anim_ref: String,
    pub size: Size,
    pub fps: f64,
    pub in_point: f64,
    pub out_point: f64,
}

/// Compiled, frame-addressable representation of one animation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnimIR {
    pub meta: AnimMeta,
    pub root: Composition,
    pub comps: BTreeMap<String, Composition>,
    /// Image assets, keyed by namespaced id (`"{animRef}|{refId}"`).
    pub assets: AssetIndex,
    pub binding: Option<BindingInfo>,
    pub input_geometry: Option<InputGeometry>,
    /// Issues recorded by the most recent `render_commands` call.
    #[serde(skip)]
    pub last_render_issues: Vec<RenderIssue>,
}

impl AnimIR {
    pub fn comp(&self, comp: &CompRef) -> Option<&Composition> {
        match comp {
            CompRef::Root => Some(&self.root),
            CompRef::Asset(id) => self.comps.get(id),
        }
    }

    /// Clamps a scene frame into this animation's addressable range.
    pub fn local_frame_index(&self, scene_frame: f64) -> f64 {
        scene_frame.clamp(0.0, (self.meta.out_point - 1.0).max(0.0))
    }
}

/// First instancing path (in layer order) from the root composition down to
/// `target`; empty when the target is the root itself or unreachable.
pub(crate) fn find_comp_chain(
    root: &Composition,
    comps: &BTreeMap<String, Composition>,
    target: &CompRef,
) -> Vec<ChainLink> {
    let CompRef::Asset(target_id) = target else {
        return Vec::new();
    };

    fn dfs(
        comp_ref: &CompRef,
        comp: &Composition,
        comps: &BTreeMap<String, Composition>,
        target_id: &str,
        visited: &mut std::collections::HashSet<String>,
        chain: &mut Vec<ChainLink>,
    ) -> bool {
        for layer in &comp.layers {
            let LayerContent::Precomp { comp_id } = &layer.content else {
                continue;
            };
            chain.push(ChainLink {
                comp: comp_ref.clone(),
                layer_id: layer.id,
            });
            if comp_id == target_id {
                return true;
            }
            if visited.insert(comp_id.clone()) {
                if let Some(child) = comps.get(comp_id) {
                    let child_ref = CompRef::Asset(comp_id.clone());
                    if dfs(&child_ref, child, comps, target_id, visited, chain) {
                        return true;
                    }
                }
            }
            chain.pop();
        }
        false
    }

    let mut chain = Vec::new();
    let mut visited = std::collections::HashSet::new();
    if dfs(&CompRef::Root, root, comps, target_id, &mut visited, &mut chain) {
        chain
    } else {
        Vec::new()
    }
}
