//! Partial updates to a `TemplateConfig`.
//!
//! A patch names only what changes. Layer patches must target an existing
//! layer and, when they touch kind-specific fields, use the layer's own kind.
//! Merging never mutates the input: it produces a new config and validates it.

use serde::{Deserialize, Deserializer};

use super::model::{
    AudioLayer, Effect, ImageLayer, Layer, LayerKind, MusicConfig, Position, TemplateConfig,
    TextLayer, ThumbnailRule, VideoLayer,
};
use crate::error::InputError;

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("no layer with id {0:?}")]
    UnknownLayer(String),

    #[error("layer {0:?} already exists")]
    DuplicateLayer(String),

    #[error("layer {layer:?} is a {expected} layer, patch is for {found}")]
    VariantMismatch {
        layer: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error(transparent)]
    Invalid(#[from] InputError),
}

/// Distinguishes a missing field (`None`) from an explicit `null` (`Some(None)`).
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TemplatePatch {
    pub name: Option<String>,
    pub resolution: Option<ResolutionPatch>,
    pub fps: Option<u32>,
    /// Updates to existing layers, matched by id.
    pub layers: Vec<LayerPatch>,
    /// New layers, appended in order.
    pub add_layers: Vec<Layer>,
    pub remove_layers: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub music: Option<Option<MusicPatch>>,
    #[serde(deserialize_with = "nullable")]
    pub thumbnail: Option<Option<ThumbnailRule>>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct ResolutionPatch {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LayerPatch {
    pub id: String,
    #[serde(default)]
    pub start_secs: Option<f64>,
    #[serde(default, deserialize_with = "nullable")]
    pub end_secs: Option<Option<f64>>,
    #[serde(default)]
    pub opacity: Option<f64>,
    /// Replaces the whole effect list when present.
    #[serde(default)]
    pub effects: Option<Vec<Effect>>,
    #[serde(default)]
    pub content: Option<LayerKindPatch>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerKindPatch {
    Text(TextLayerPatch),
    Image(ImageLayerPatch),
    Video(VideoLayerPatch),
    Audio(AudioLayerPatch),
}

impl LayerKindPatch {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Image(_) => "image",
            Self::Video(_) => "video",
            Self::Audio(_) => "audio",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TextLayerPatch {
    pub text: Option<String>,
    pub font_size: Option<u32>,
    pub color: Option<String>,
    pub position: Option<Position>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ImageLayerPatch {
    pub source: Option<String>,
    pub position: Option<Position>,
    pub scale: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VideoLayerPatch {
    pub source: Option<String>,
    pub muted: Option<bool>,
    #[serde(rename = "loop")]
    pub loop_playback: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AudioLayerPatch {
    pub source: Option<String>,
    pub volume: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MusicPatch {
    pub source: Option<String>,
    pub volume: Option<f64>,
    #[serde(deserialize_with = "nullable")]
    pub fade_out_secs: Option<Option<f64>>,
}

fn set<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

impl TemplateConfig {
    /// Apply `patch`, returning the merged and validated config.
    ///
    /// Order: removals, then layer updates, then additions, then top-level fields.
    pub fn merge(&self, patch: TemplatePatch) -> Result<TemplateConfig, MergeError> {
        let mut merged = self.clone();

        // Removing an id that does not exist is rejected like patching one.
        for id in &patch.remove_layers {
            let before = merged.layers.len();
            merged.layers.retain(|layer| &layer.id != id);
            if merged.layers.len() == before {
                return Err(MergeError::UnknownLayer(id.clone()));
            }
        }

        for layer_patch in patch.layers {
            let layer = merged
                .layers
                .iter_mut()
                .find(|layer| layer.id == layer_patch.id)
                .ok_or_else(|| MergeError::UnknownLayer(layer_patch.id.clone()))?;
            layer.apply(layer_patch)?;
        }

        for layer in patch.add_layers {
            if merged.layer(&layer.id).is_some() {
                return Err(MergeError::DuplicateLayer(layer.id));
            }
            merged.layers.push(layer);
        }

        set(&mut merged.name, patch.name);
        set(&mut merged.fps, patch.fps);
        if let Some(resolution) = patch.resolution {
            set(&mut merged.resolution.width, resolution.width);
            set(&mut merged.resolution.height, resolution.height);
        }

        match patch.music {
            None => {}
            Some(None) => merged.music = None,
            Some(Some(music)) => merged.music = Some(merge_music(merged.music.take(), music)?),
        }
        if let Some(thumbnail) = patch.thumbnail {
            merged.thumbnail = thumbnail;
        }

        merged.validate()?;
        Ok(merged)
    }
}

impl Layer {
    fn apply(&mut self, patch: LayerPatch) -> Result<(), MergeError> {
        set(&mut self.start_secs, patch.start_secs);
        set(&mut self.end_secs, patch.end_secs);
        set(&mut self.opacity, patch.opacity);
        set(&mut self.effects, patch.effects);

        let Some(content) = patch.content else {
            return Ok(());
        };

        match (&mut self.kind, content) {
            (LayerKind::Text(layer), LayerKindPatch::Text(patch)) => layer.apply(patch),
            (LayerKind::Image(layer), LayerKindPatch::Image(patch)) => layer.apply(patch),
            (LayerKind::Video(layer), LayerKindPatch::Video(patch)) => layer.apply(patch),
            (LayerKind::Audio(layer), LayerKindPatch::Audio(patch)) => layer.apply(patch),
            (kind, patch) => {
                return Err(MergeError::VariantMismatch {
                    layer: self.id.clone(),
                    expected: kind.type_name(),
                    found: patch.type_name(),
                });
            }
        }
        Ok(())
    }
}

impl TextLayer {
    fn apply(&mut self, patch: TextLayerPatch) {
        set(&mut self.text, patch.text);
        set(&mut self.font_size, patch.font_size);
        set(&mut self.color, patch.color);
        set(&mut self.position, patch.position);
    }
}

impl ImageLayer {
    fn apply(&mut self, patch: ImageLayerPatch) {
        set(&mut self.source, patch.source);
        set(&mut self.position, patch.position);
        set(&mut self.scale, patch.scale);
    }
}

impl VideoLayer {
    fn apply(&mut self, patch: VideoLayerPatch) {
        set(&mut self.source, patch.source);
        set(&mut self.muted, patch.muted);
        set(&mut self.loop_playback, patch.loop_playback);
    }
}

impl AudioLayer {
    fn apply(&mut self, patch: AudioLayerPatch) {
        set(&mut self.source, patch.source);
        set(&mut self.volume, patch.volume);
    }
}

/// Music can be patched into existence only if the patch names a source.
fn merge_music(current: Option<MusicConfig>, patch: MusicPatch) -> Result<MusicConfig, MergeError> {
    let mut music = match (current, patch.source.clone()) {
        (Some(music), _) => music,
        (None, Some(source)) => MusicConfig {
            source,
            volume: 1.0,
            fade_out_secs: None,
        },
        (None, None) => return Err(InputError::Empty { field: "music.source" }.into()),
    };

    set(&mut music.source, patch.source);
    set(&mut music.volume, patch.volume);
    set(&mut music.fade_out_secs, patch.fade_out_secs);
    Ok(music)
}
