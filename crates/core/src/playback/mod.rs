use std::{collections::HashSet, time::Duration};

use crate::{
    scene::{LoopWindow, SceneDescriptor, SceneId},
    Result, SphereError,
};

/// The single video element the experience plays through. Implemented by the
/// host (browser video, native decoder) or by [`VirtualMedia`] headless.
pub trait MediaSource {
    /// Replaces the current source. Fails when the asset is unreachable.
    fn set_source(&mut self, src: &str) -> Result<()>;
    /// Drops the current source entirely.
    fn clear_source(&mut self);
    fn seek(&mut self, seconds: f64);
    /// Starts playback. Hosts may refuse, e.g. without a user gesture.
    fn play(&mut self) -> Result<()>;
    fn pause(&mut self);
    fn is_paused(&self) -> bool;
    fn position(&self) -> f64;
}

/// Clock-driven stand-in for a video element.
#[derive(Debug, Clone)]
pub struct VirtualMedia {
    source: Option<String>,
    position: f64,
    paused: bool,
    unreachable: HashSet<String>,
    block_autoplay: bool,
}

impl Default for VirtualMedia {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualMedia {
    pub fn new() -> Self {
        Self {
            source: None,
            position: 0.0,
            paused: true,
            unreachable: HashSet::new(),
            block_autoplay: false,
        }
    }

    /// Makes `set_source` fail for this path.
    pub fn mark_unreachable(&mut self, src: impl Into<String>) {
        self.unreachable.insert(src.into());
    }

    /// Makes `play` fail until cleared, like a browser without a user gesture.
    pub fn set_block_autoplay(&mut self, block: bool) {
        self.block_autoplay = block;
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Moves the playhead forward by `delta` while playing.
    pub fn advance(&mut self, delta: Duration) {
        if !self.paused && self.source.is_some() {
            self.position += delta.as_secs_f64();
        }
    }
}

impl MediaSource for VirtualMedia {
    fn set_source(&mut self, src: &str) -> Result<()> {
        if self.unreachable.contains(src) {
            return Err(SphereError::asset_load(src, "source unreachable"));
        }
        self.source = Some(src.to_string());
        self.position = 0.0;
        self.paused = true;
        Ok(())
    }

    fn clear_source(&mut self) {
        self.source = None;
        self.position = 0.0;
        self.paused = true;
    }

    fn seek(&mut self, seconds: f64) {
        self.position = seconds.max(0.0);
    }

    fn play(&mut self) -> Result<()> {
        if self.source.is_none() {
            return Err(SphereError::msg("no media source attached"));
        }
        if self.block_autoplay {
            return Err(SphereError::msg("playback requires a user gesture"));
        }
        self.paused = false;
        Ok(())
    }

    fn pause(&mut self) {
        self.paused = true;
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn position(&self) -> f64 {
        self.position
    }
}

/// Segment currently attached to the media source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveSegment {
    pub scene: SceneId,
    pub window: LoopWindow,
}

/// Owns the media source, keeps playback inside the active loop window and
/// tracks whether autoplay has been armed by the user.
#[derive(Debug)]
pub struct PlaybackController<M> {
    media: M,
    segment: Option<ActiveSegment>,
    autoplay: bool,
}

impl<M: MediaSource> PlaybackController<M> {
    pub fn new(media: M) -> Self {
        Self {
            media,
            segment: None,
            autoplay: false,
        }
    }

    /// Attaches the scene's video, seeks to the window start and plays when
    /// autoplay is armed. An unreachable source abandons the load.
    pub fn load(&mut self, scene: &SceneDescriptor) -> Result<()> {
        if let Err(err) = self.media.set_source(&scene.video_src) {
            tracing::error!(scene = %scene.id, src = %scene.video_src, %err, "video load abandoned");
            self.segment = None;
            self.media.clear_source();
            return Err(err);
        }

        self.segment = Some(ActiveSegment {
            scene: scene.id,
            window: scene.window,
        });
        self.media.seek(scene.window.start);
        tracing::info!(scene = %scene.id, name = %scene.name, start = scene.window.start, "video loaded");

        if self.autoplay {
            if let Err(err) = self.media.play() {
                tracing::warn!(scene = %scene.id, %err, "autoplay prevented; waiting for a click");
            }
        }
        Ok(())
    }

    /// Enforces the loop invariant. Returns the position that was wrapped,
    /// if any.
    pub fn on_time_update(&mut self) -> Option<f64> {
        let window = self.segment?.window;
        let position = self.media.position();
        if position >= window.end {
            self.media.seek(window.start);
            tracing::debug!(position, start = window.start, "looped segment");
            Some(position)
        } else {
            None
        }
    }

    /// Plays when paused (arming autoplay), pauses and disarms otherwise.
    /// Returns whether the media is playing afterwards.
    pub fn toggle(&mut self) -> Result<bool> {
        if self.media.is_paused() {
            self.media.play()?;
            self.autoplay = true;
            tracing::info!("video playing");
            Ok(true)
        } else {
            self.media.pause();
            self.autoplay = false;
            tracing::info!("video paused");
            Ok(false)
        }
    }

    /// Arms autoplay and starts the attached segment.
    pub fn arm_autoplay(&mut self) {
        self.autoplay = true;
        if self.segment.is_some() && self.media.is_paused() {
            if let Err(err) = self.media.play() {
                tracing::warn!(%err, "autoplay prevented; waiting for a click");
            }
        }
    }

    pub fn autoplay_armed(&self) -> bool {
        self.autoplay
    }

    /// Replaces the loop window of the active segment and seeks to its start.
    pub fn update_segment(&mut self, start: f64, end: f64) -> Result<()> {
        let window = LoopWindow::new(start, end)?;
        let segment = self
            .segment
            .as_mut()
            .ok_or(SphereError::InvalidInput("no segment is loaded"))?;
        segment.window = window;
        self.media.seek(start);
        Ok(())
    }

    /// Pauses and detaches the source.
    pub fn stop(&mut self) {
        self.media.pause();
        self.media.clear_source();
        self.segment = None;
    }

    pub fn segment(&self) -> Option<&ActiveSegment> {
        self.segment.as_ref()
    }

    pub fn is_playing(&self) -> bool {
        !self.media.is_paused()
    }

    pub fn position(&self) -> f64 {
        self.media.position()
    }

    pub fn media(&self) -> &M {
        &self.media
    }

    pub fn media_mut(&mut self) -> &mut M {
        &mut self.media
    }
}

/// Formats media seconds as `m:ss`.
pub fn format_time(seconds: f64) -> String {
    let total = seconds.max(0.0).floor() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}
