//! Scene composition: per-block compilation into a [`CompiledScene`] and
//! the scene-wide, frame-indexed command stream.

use std::collections::HashMap;

use kurbo::{Affine, Rect};
use log::debug;

use crate::assets::{CompiledPackage, LoadedAnimations};
use crate::compiler::compile_anim;
use crate::error::{CompileError, RenderIssue};
use crate::ir::AnimIR;
use crate::path::PathRegistry;
use crate::render::{RenderCommand, RenderMode};
use crate::scene::{Canvas, ContainerClip};

/// One media block, compiled and ready to render.
#[derive(Debug)]
pub struct CompiledBlock {
    pub block_id: String,
    pub rect: Rect,
    pub clip: ContainerClip,
    pub start_frame: f64,
    pub duration_frames: f64,
    pub z_index: i64,
    pub anim: AnimIR,
}

impl CompiledBlock {
    /// Whether the block's timing window covers a scene frame.
    pub fn covers(&self, scene_frame: f64) -> bool {
        self.start_frame <= scene_frame && scene_frame < self.start_frame + self.duration_frames
    }
}

/// A compiled scene: the runtime block list in render order plus the shared
/// path registry.
#[derive(Debug)]
pub struct CompiledScene {
    pub scene_id: String,
    pub canvas: Canvas,
    /// Sorted by `(z_index, descriptor index)`.
    pub blocks: Vec<CompiledBlock>,
    pub registry: PathRegistry,
}

impl CompiledScene {
    pub fn block(&self, block_id: &str) -> Option<&CompiledBlock> {
        self.blocks.iter().find(|b| b.block_id == block_id)
    }

    /// Namespaced image asset ids a backend must provide, sorted.
    pub fn asset_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .blocks
            .iter()
            .flat_map(|b| b.anim.assets.ids().map(str::to_string))
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Emits the scene-wide stream for one frame. Block scopes are
    /// emitted strictly one after another, never interleaved.
    pub fn render_commands_with_issues(
        &self,
        scene_frame: f64,
        user_transforms: &HashMap<String, Affine>,
        user_media_present: &HashMap<String, bool>,
        mode: RenderMode,
    ) -> (Vec<RenderCommand>, Vec<RenderIssue>) {
        let mut commands = Vec::new();
        let mut issues = Vec::new();
        for block in &self.blocks {
            if mode == RenderMode::Preview && !block.covers(scene_frame) {
                continue;
            }
            let name = match mode {
                RenderMode::Preview => format!("Block:{}", block.block_id),
                RenderMode::Edit => format!("Block:{} (edit)", block.block_id),
            };
            commands.push(RenderCommand::BeginGroup { name });
            let clipped = block.clip == ContainerClip::SlotRect;
            if clipped {
                commands.push(RenderCommand::PushClipRect { rect: block.rect });
            }

            let user_transform = user_transforms
                .get(&block.block_id)
                .copied()
                .unwrap_or(Affine::IDENTITY);
            // No user media means no placeholder.
            let media_present = user_media_present
                .get(&block.block_id)
                .copied()
                .unwrap_or(false);
            let local_frame = scene_frame - block.start_frame;
            let (block_commands, block_issues) = block.anim.render_commands_with_issues(
                local_frame,
                user_transform,
                media_present,
                mode,
            );
            commands.extend(block_commands);
            issues.extend(block_issues);

            if clipped {
                commands.push(RenderCommand::PopClipRect);
            }
            commands.push(RenderCommand::EndGroup);
        }
        (commands, issues)
    }
}

/// Owns per-block user state and the compiled scene; the compiled IR is
/// never mutated at render time.
#[derive(Debug, Default)]
pub struct ScenePlayer {
    user_transforms: HashMap<String, Affine>,
    user_media_present: HashMap<String, bool>,
    compiled: Option<CompiledScene>,
    pub last_render_issues: Vec<RenderIssue>,
}

impl ScenePlayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles every block's selected variant into one [`CompiledScene`],
    /// sharing a single path registry across the whole scene.
    pub fn compile(
        &mut self,
        package: &CompiledPackage,
        animations: &LoadedAnimations,
    ) -> Result<&CompiledScene, CompileError> {
        let scene = &package.scene;
        let mut registry = PathRegistry::new();
        let mut blocks = Vec::with_capacity(scene.media_blocks.len());

        for block in &scene.media_blocks {
            let index = block.selected_variant_index();
            let Some(variant) = block.variants.get(index) else {
                return Err(CompileError::VariantOutOfRange {
                    block_id: block.block_id.clone(),
                    index,
                    len: block.variants.len(),
                });
            };
            let doc = animations.get(&variant.anim_ref).ok_or_else(|| {
                CompileError::MissingAnimation {
                    anim_ref: variant.anim_ref.clone(),
                }
            })?;
            let binding_key = block
                .input
                .as_ref()
                .map(|input| input.binding_key.as_str())
                .unwrap_or("");
            let anim = compile_anim(
                doc,
                &variant.anim_ref,
                binding_key,
                &package.assets,
                &mut registry,
            )?;

            let start_frame = block.timing.as_ref().map_or(0.0, |t| t.start_frame);
            let duration_frames = block
                .timing
                .as_ref()
                .and_then(|t| t.duration_frames)
                .or(variant.duration_frames)
                .unwrap_or(scene.canvas.duration_frames - start_frame);

            debug!(
                "block '{}' uses '{}' ({} frames from {})",
                block.block_id, variant.anim_ref, duration_frames, start_frame
            );
            blocks.push(CompiledBlock {
                block_id: block.block_id.clone(),
                rect: block.rect.to_rect(),
                clip: block.container_clip,
                start_frame,
                duration_frames,
                z_index: block.z_index,
                anim,
            });
        }

        // Stable sort keeps descriptor order within equal z.
        blocks.sort_by_key(|b| b.z_index);

        self.compiled = Some(CompiledScene {
            scene_id: scene.scene_id.clone(),
            canvas: scene.canvas.clone(),
            blocks,
            registry,
        });
        Ok(self.compiled.as_ref().expect("compiled scene just stored"))
    }

    pub fn compiled(&self) -> Option<&CompiledScene> {
        self.compiled.as_ref()
    }

    pub fn set_user_transform(&mut self, block_id: impl Into<String>, transform: Affine) {
        self.user_transforms.insert(block_id.into(), transform);
    }

    /// Per-block user transform; identity when unset.
    pub fn user_transform(&self, block_id: &str) -> Affine {
        self.user_transforms
            .get(block_id)
            .copied()
            .unwrap_or(Affine::IDENTITY)
    }

    pub fn reset_all_user_transforms(&mut self) {
        self.user_transforms.clear();
    }

    pub fn set_user_media_present(&mut self, block_id: impl Into<String>, present: bool) {
        self.user_media_present.insert(block_id.into(), present);
    }

    /// Per-block media presence; false when unset.
    pub fn is_user_media_present(&self, block_id: &str) -> bool {
        self.user_media_present
            .get(block_id)
            .copied()
            .unwrap_or(false)
    }

    /// Emits the stream for one frame, storing issues on
    /// `last_render_issues`. Renders nothing before `compile`.
    pub fn render_commands(&mut self, mode: RenderMode, scene_frame: f64) -> Vec<RenderCommand> {
        let (commands, issues) = self.render_commands_with_issues(mode, scene_frame);
        self.last_render_issues = issues;
        commands
    }

    pub fn render_commands_with_issues(
        &self,
        mode: RenderMode,
        scene_frame: f64,
    ) -> (Vec<RenderCommand>, Vec<RenderIssue>) {
        let Some(compiled) = &self.compiled else {
            return (Vec::new(), Vec::new());
        };
        compiled.render_commands_with_issues(
            scene_frame,
            &self.user_transforms,
            &self.user_media_present,
            mode,
        )
    }
}
