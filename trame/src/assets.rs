//! Pure data containers shared between loading, compilation and playback.

use std::collections::{btree_map, BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::lottie::Document;
use crate::scene::Scene;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetMeta {
    pub width: f64,
    pub height: f64,
    pub uri: Option<String>,
}

/// Asset id to metadata map. Iteration order is sorted, so merged indices
/// serialize deterministically.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetIndex {
    entries: BTreeMap<String, AssetMeta>,
}

impl AssetIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, meta: AssetMeta) {
        self.entries.insert(id.into(), meta);
    }

    pub fn get(&self, id: &str) -> Option<&AssetMeta> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copies every entry of `other` into `self`, overwriting collisions.
    pub fn merge(&mut self, other: &AssetIndex) {
        for (id, meta) in &other.entries {
            self.entries.insert(id.clone(), meta.clone());
        }
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, AssetMeta> {
        self.entries.iter()
    }
}

/// Parsed Lottie documents keyed by `animRef`.
#[derive(Debug, Clone, Default)]
pub struct LoadedAnimations {
    docs: HashMap<String, Document>,
}

impl LoadedAnimations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, anim_ref: impl Into<String>, doc: Document) {
        self.docs.insert(anim_ref.into(), doc);
    }

    pub fn get(&self, anim_ref: &str) -> Option<&Document> {
        self.docs.get(anim_ref)
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

/// A loaded template package: the scene descriptor plus its asset index.
#[derive(Debug, Clone)]
pub struct CompiledPackage {
    pub scene: Scene,
    pub assets: AssetIndex,
}

impl CompiledPackage {
    pub fn new(scene: Scene, assets: AssetIndex) -> Self {
        Self { scene, assets }
    }
}
