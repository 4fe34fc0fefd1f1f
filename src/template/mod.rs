//! Video template configuration and its partial-update merge.

mod merge;
mod model;

pub use merge::{
    AudioLayerPatch, ImageLayerPatch, LayerKindPatch, LayerPatch, MergeError, MusicPatch,
    ResolutionPatch, TemplatePatch, TextLayerPatch, VideoLayerPatch,
};
pub use model::{
    AudioLayer, Effect, ImageLayer, Layer, LayerKind, MusicConfig, Position, Resolution,
    TemplateConfig, TextLayer, ThumbnailRule, VideoLayer,
};
