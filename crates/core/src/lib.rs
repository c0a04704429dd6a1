//! Core library for the Story Sphere experience.
//!
//! A 360° video plays inside a sphere while a fixed chain of scenes advances
//! on wall-clock time. The final scene drops a row of pillars that turn into
//! pedestals carrying chapter illustrations, and a generated story narrates
//! over them. Rendering, decoding and the generation service sit behind the
//! seams defined here ([`MediaSource`], [`AssetLoader`], [`GenerativeApi`]),
//! so every sequencer can be driven deterministically from a plain time value.

pub mod assets;
pub mod config;
pub mod error;
pub mod experience;
pub mod pillars;
pub mod playback;
pub mod render;
pub mod scene;
pub mod story;
pub mod timeline;

pub use assets::{AssetLoader, AssetRef, AssetStore, FsAssetLoader, HistoryEntry, LoadedAsset};
pub use config::{AppConfig, PillarConfig, PlaybackConfig, StoryConfig};
pub use error::{Result, SphereError};
pub use experience::Experience;
pub use pillars::{BillboardPose, PillarEvent, PillarPhase, PillarSequencer};
pub use playback::{format_time, MediaSource, PlaybackController, VirtualMedia};
pub use render::{FrameSummary, RenderGraph};
pub use scene::{LoopWindow, SceneDescriptor, SceneId, SceneKind, SceneRegistry};
pub use story::{
    ChapterCursor, ChapterRecord, GenerativeApi, OpenAiClient, Story, StoryGenerator,
};
pub use timeline::{ColorFade, PlaybackClock, SceneSequencer, SceneTransition};
