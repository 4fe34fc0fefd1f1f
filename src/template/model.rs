//! Typed video template configuration.
//!
//! Layer and effect kinds are closed enums discriminated by their `"type"` tag,
//! so every consumer handles each kind explicitly.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::InputError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateConfig {
    pub name: String,
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default)]
    pub layers: Vec<Layer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub music: Option<MusicConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<ThumbnailRule>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub id: String,
    #[serde(default)]
    pub start_secs: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_secs: Option<f64>,
    #[serde(default = "full_opacity")]
    pub opacity: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub effects: Vec<Effect>,
    #[serde(flatten)]
    pub kind: LayerKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerKind {
    Text(TextLayer),
    Image(ImageLayer),
    Video(VideoLayer),
    Audio(AudioLayer),
}

impl LayerKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Image(_) => "image",
            Self::Video(_) => "video",
            Self::Audio(_) => "audio",
        }
    }
}

/// Normalised position of a layer's anchor, 0.0..=1.0 on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Default for Position {
    fn default() -> Self {
        Self { x: 0.5, y: 0.5 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLayer {
    pub text: String,
    #[serde(default = "default_font_size")]
    pub font_size: u32,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageLayer {
    pub source: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default = "unit_scale")]
    pub scale: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoLayer {
    pub source: String,
    #[serde(default)]
    pub muted: bool,
    #[serde(default, rename = "loop")]
    pub loop_playback: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioLayer {
    pub source: String,
    #[serde(default = "full_volume")]
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Effect {
    FadeIn { duration_secs: f64 },
    FadeOut { duration_secs: f64 },
    Zoom { from: f64, to: f64 },
    Blur { radius: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicConfig {
    pub source: String,
    #[serde(default = "full_volume")]
    pub volume: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fade_out_secs: Option<f64>,
}

/// How the thumbnail is chosen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ThumbnailRule {
    FirstFrame,
    AtSecond { at_secs: f64 },
    Image { source: String },
}

fn default_fps() -> u32 {
    30
}

fn default_font_size() -> u32 {
    48
}

fn default_color() -> String {
    "#FFFFFF".to_string()
}

fn full_opacity() -> f64 {
    1.0
}

fn full_volume() -> f64 {
    1.0
}

fn unit_scale() -> f64 {
    1.0
}

impl TemplateConfig {
    pub fn layer(&self, id: &str) -> Option<&Layer> {
        self.layers.iter().find(|layer| layer.id == id)
    }

    pub fn validate(&self) -> Result<(), InputError> {
        if self.name.trim().is_empty() {
            return Err(InputError::Empty { field: "name" });
        }
        range_u32("resolution.width", self.resolution.width, 16, 7680)?;
        range_u32("resolution.height", self.resolution.height, 16, 7680)?;
        range_u32("fps", self.fps, 1, 120)?;

        let mut seen = HashSet::new();
        for layer in &self.layers {
            if !seen.insert(layer.id.as_str()) {
                return Err(InputError::Invalid {
                    field: "layers",
                    reason: format!("duplicate layer id {:?}", layer.id),
                });
            }
            layer.validate()?;
        }

        if let Some(music) = &self.music {
            non_empty("music.source", &music.source)?;
            range_f64("music.volume", music.volume, 0.0, 1.0)?;
            if let Some(fade) = music.fade_out_secs {
                range_f64("music.fade_out_secs", fade, 0.0, 60.0)?;
            }
        }

        match &self.thumbnail {
            Some(ThumbnailRule::AtSecond { at_secs }) if *at_secs < 0.0 || !at_secs.is_finite() => {
                Err(InputError::Invalid {
                    field: "thumbnail.at_secs",
                    reason: "must be a non-negative number".to_string(),
                })
            }
            Some(ThumbnailRule::Image { source }) => non_empty("thumbnail.source", source),
            _ => Ok(()),
        }
    }
}

impl Layer {
    pub fn validate(&self) -> Result<(), InputError> {
        non_empty("layer.id", &self.id)?;
        range_f64("layer.opacity", self.opacity, 0.0, 1.0)?;
        if !self.start_secs.is_finite() || self.start_secs < 0.0 {
            return Err(InputError::Invalid {
                field: "layer.start_secs",
                reason: format!("layer {:?} starts at {}", self.id, self.start_secs),
            });
        }
        if let Some(end) = self.end_secs {
            if !(end > self.start_secs) {
                return Err(InputError::Invalid {
                    field: "layer.end_secs",
                    reason: format!(
                        "layer {:?} ends at {} but starts at {}",
                        self.id, end, self.start_secs
                    ),
                });
            }
        }

        for effect in &self.effects {
            match effect {
                Effect::FadeIn { duration_secs } | Effect::FadeOut { duration_secs } => {
                    range_f64("effect.duration_secs", *duration_secs, 0.01, 60.0)?
                }
                Effect::Zoom { from, to } => {
                    range_f64("effect.from", *from, 0.1, 10.0)?;
                    range_f64("effect.to", *to, 0.1, 10.0)?;
                }
                Effect::Blur { radius } => range_f64("effect.radius", *radius, 0.0, 100.0)?,
            }
        }

        match &self.kind {
            LayerKind::Text(text) => {
                non_empty("text.text", &text.text)?;
                range_u32("text.font_size", text.font_size, 1, 512)?;
                position("text.position", text.position)
            }
            LayerKind::Image(image) => {
                non_empty("image.source", &image.source)?;
                range_f64("image.scale", image.scale, 0.01, 10.0)?;
                position("image.position", image.position)
            }
            LayerKind::Video(video) => non_empty("video.source", &video.source),
            LayerKind::Audio(audio) => {
                non_empty("audio.source", &audio.source)?;
                range_f64("audio.volume", audio.volume, 0.0, 1.0)
            }
        }
    }
}

fn non_empty(field: &'static str, value: &str) -> Result<(), InputError> {
    if value.trim().is_empty() {
        Err(InputError::Empty { field })
    } else {
        Ok(())
    }
}

fn range_u32(field: &'static str, value: u32, min: u32, max: u32) -> Result<(), InputError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(InputError::out_of_range(field, min, max, value))
    }
}

fn range_f64(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), InputError> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(InputError::out_of_range(field, min, max, value))
    }
}

fn position(field: &'static str, pos: Position) -> Result<(), InputError> {
    range_f64(field, pos.x, 0.0, 1.0)?;
    range_f64(field, pos.y, 0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TemplateConfig {
        serde_json::from_value(serde_json::json!({
            "name": "Weekly recap",
            "layers": [
                {"id": "title", "type": "text", "text": "Week 42", "effects": [{"type": "fade_in", "duration_secs": 0.5}]},
                {"id": "bg", "type": "video", "source": "s3://clips/bg.mp4", "loop": true},
                {"id": "voice", "type": "audio", "source": "tts://voice-1", "volume": 0.8}
            ],
            "thumbnail": {"mode": "at_second", "at_secs": 2.0}
        }))
        .unwrap()
    }

    #[test]
    fn parses_tagged_layers_with_defaults() {
        let config = sample();

        assert_eq!(config.fps, 30);
        assert_eq!(config.resolution, Resolution::default());
        assert_eq!(config.layers.len(), 3);

        let title = config.layer("title").unwrap();
        assert_eq!(title.opacity, 1.0);
        match &title.kind {
            LayerKind::Text(text) => {
                assert_eq!(text.font_size, 48);
                assert_eq!(text.position, Position::default());
            }
            other => panic!("expected text layer, got {}", other.type_name()),
        }

        match &config.layer("bg").unwrap().kind {
            LayerKind::Video(video) => assert!(video.loop_playback),
            other => panic!("expected video layer, got {}", other.type_name()),
        }
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_layer_type_is_rejected() {
        let result: Result<TemplateConfig, _> = serde_json::from_value(serde_json::json!({
            "name": "x",
            "layers": [{"id": "a", "type": "hologram"}]
        }));
        assert!(result.is_err());
    }

    #[test]
    fn validation_catches_bad_ranges() {
        let mut config = sample();
        config.fps = 0;
        assert!(matches!(
            config.validate(),
            Err(InputError::OutOfRange { field: "fps", .. })
        ));

        let mut config = sample();
        config.layers[0].opacity = 1.5;
        assert!(matches!(
            config.validate(),
            Err(InputError::OutOfRange {
                field: "layer.opacity",
                ..
            })
        ));

        let mut config = sample();
        config.layers[1].start_secs = 5.0;
        config.layers[1].end_secs = Some(5.0);
        assert!(matches!(
            config.validate(),
            Err(InputError::Invalid {
                field: "layer.end_secs",
                ..
            })
        ));

        let mut config = sample();
        config.layers[2].id = "title".to_string();
        assert!(matches!(
            config.validate(),
            Err(InputError::Invalid { field: "layers", .. })
        ));
    }
}
