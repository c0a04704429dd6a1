//! Wiring of the whole experience: the entry form arms playback, scenes
//! advance on wall-clock time, the last scene mounts the falling pillars and
//! narration drives the chapter images.

use std::time::Duration;

use glam::Vec3;

use crate::{
    assets::AssetLoader,
    config::AppConfig,
    pillars::PillarSequencer,
    playback::{format_time, MediaSource, PlaybackController},
    render::{FrameSummary, RenderGraph},
    scene::{SceneId, SceneKind, SceneRegistry},
    story::{ChapterCursor, ChapterRecord, Story},
    timeline::{ColorFade, SceneSequencer},
    Result, SphereError,
};

pub struct Experience<M, L> {
    config: AppConfig,
    registry: SceneRegistry,
    playback: PlaybackController<M>,
    loader: L,
    sequencer: SceneSequencer,
    render: RenderGraph,
    pillars: Option<PillarSequencer>,
    chapters: Option<ChapterCursor>,
    fade: Option<ColorFade>,
    time_label: String,
    label_updated_at: Option<Duration>,
    torn_down: bool,
}

impl<M: MediaSource, L: AssetLoader> Experience<M, L> {
    /// Builds the experience and preloads the first scene's segment, paused
    /// until the entry form is submitted.
    pub fn new(config: AppConfig, registry: SceneRegistry, media: M, loader: L) -> Self {
        let sequencer = SceneSequencer::new(&registry);
        let mut playback = PlaybackController::new(media);
        if playback.load(registry.first()).is_err() {
            tracing::warn!(scene = %registry.first().id, "first scene not preloaded; retrying on entry");
        }
        Self {
            config,
            registry,
            playback,
            loader,
            sequencer,
            render: RenderGraph::new(),
            pillars: None,
            chapters: None,
            fade: None,
            time_label: format_time(0.0),
            label_updated_at: None,
            torn_down: false,
        }
    }

    /// Handles the entry form: arms autoplay and enters the first scene.
    pub fn submit_entry(&mut self, now: Duration) -> Result<()> {
        if self.torn_down {
            return Err(SphereError::TornDown);
        }
        let first = self.sequencer.start(now)?;
        self.playback.arm_autoplay();
        self.enter_scene(first, now);
        Ok(())
    }

    /// One animation frame. `camera` is the viewer position used to orient
    /// the floating images.
    pub fn tick(&mut self, now: Duration, camera: Vec3) -> Result<FrameSummary> {
        if self.torn_down {
            return Ok(FrameSummary::default());
        }

        self.playback.on_time_update();

        if let Some(transition) = self.sequencer.tick(now) {
            self.enter_scene(transition.to, now);
        }

        if let Some(pillars) = self.pillars.as_mut() {
            let events = pillars.tick(now, &mut self.loader);
            self.render.apply_pillar_events(&events)?;
            for pillar in pillars.pillars() {
                self.render.set_pillar_opacity(pillar.index(), pillar.opacity());
            }
            self.render.apply_poses(&pillars.image_poses(now, camera));
        }

        if let Some(fade) = self.fade.as_mut() {
            let sample = fade.sample(now);
            if sample.just_completed {
                tracing::debug!("colour fade complete");
            }
            self.render.set_overlay(Some(sample));
        }

        self.refresh_time_label(now);
        Ok(self.render.draw())
    }

    /// Installs a generated story. Mounted pillars switch to the first
    /// chapter's images right away.
    pub fn attach_story(&mut self, story: Story, now: Duration) -> Result<()> {
        if self.torn_down {
            return Err(SphereError::TornDown);
        }
        let cursor = ChapterCursor::new(story)?;
        let images = cursor.current().images.clone();
        tracing::info!(chapters = cursor.story().chapters.len(), "story attached");
        self.chapters = Some(cursor);

        if let Some(pillars) = self.pillars.as_mut() {
            let events = pillars.set_image_sources(images, now, &mut self.loader);
            self.render.apply_pillar_events(&events)?;
        }
        Ok(())
    }

    /// Narration of the current chapter finished. Returns the new chapter
    /// index, or `None` when the story is over or no story is attached.
    pub fn on_audio_ended(&mut self, now: Duration) -> Result<Option<usize>> {
        if self.torn_down {
            return Err(SphereError::TornDown);
        }
        let Some(cursor) = self.chapters.as_mut() else {
            return Ok(None);
        };
        let Some(chapter) = cursor.on_audio_ended() else {
            return Ok(None);
        };
        let images = chapter.images.clone();
        let index = cursor.index();

        if let Some(pillars) = self.pillars.as_mut() {
            let events = pillars.set_image_sources(images, now, &mut self.loader);
            self.render.apply_pillar_events(&events)?;
        }
        Ok(Some(index))
    }

    /// Click on the view: toggles playback.
    pub fn toggle_playback(&mut self) -> Result<bool> {
        if self.torn_down {
            return Err(SphereError::TornDown);
        }
        self.playback.toggle()
    }

    pub fn update_segment(&mut self, start: f64, end: f64) -> Result<()> {
        self.playback.update_segment(start, end)
    }

    /// Cancels pending transitions, detaches the pillars and releases the
    /// media source and scene graph.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.sequencer.teardown();
        self.pillars = None;
        self.fade = None;
        self.playback.stop();
        self.render.dispose();
        self.torn_down = true;
        tracing::info!("experience torn down");
    }

    pub fn current_scene(&self) -> Option<SceneId> {
        self.sequencer.current()
    }

    pub fn current_chapter(&self) -> Option<&ChapterRecord> {
        self.chapters.as_ref().map(ChapterCursor::current)
    }

    pub fn chapters(&self) -> Option<&ChapterCursor> {
        self.chapters.as_ref()
    }

    pub fn pillars(&self) -> Option<&PillarSequencer> {
        self.pillars.as_ref()
    }

    pub fn render(&self) -> &RenderGraph {
        &self.render
    }

    pub fn playback(&self) -> &PlaybackController<M> {
        &self.playback
    }

    pub fn playback_mut(&mut self) -> &mut PlaybackController<M> {
        &mut self.playback
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    pub fn registry(&self) -> &SceneRegistry {
        &self.registry
    }

    pub fn time_label(&self) -> &str {
        &self.time_label
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    fn enter_scene(&mut self, id: SceneId, now: Duration) {
        let Some(scene) = self.registry.get(id).cloned() else {
            tracing::error!(scene = %id, "scene missing from registry");
            return;
        };

        self.render.switch_scene(id);
        self.pillars = None;
        self.fade = None;
        let preloaded = self.playback.segment().is_some_and(|segment| segment.scene == id);
        if !preloaded {
            // failure already logged; the scene stays up without video
            let _ = self.playback.load(&scene);
        }

        match scene.kind {
            SceneKind::Panorama => {}
            SceneKind::Transition => {
                let playback = &self.config.playback;
                match ColorFade::new(
                    playback.color_fade(),
                    &playback.color_fade_start,
                    &playback.color_fade_end,
                    now,
                ) {
                    Ok(fade) => self.fade = Some(fade),
                    Err(err) => tracing::warn!(%err, "colour fade disabled"),
                }
            }
            SceneKind::Pillars => self.mount_pillars(now),
        }

        self.sequencer.complete_transition(now);
        tracing::info!(scene = %id, name = %scene.name, "scene entered");
    }

    fn mount_pillars(&mut self, now: Duration) {
        let mut pillars = PillarSequencer::new(self.config.pillars.clone(), now);
        if let Err(err) = pillars.preload_model(&mut self.loader) {
            tracing::error!(%err, "pedestal model unavailable; pillars fade without pedestals");
        }
        if let Err(err) = self
            .render
            .mount_pillars(pillars.pillars().len(), self.config.pillars.light_resting_intensity)
        {
            tracing::error!(%err, "could not mount pillars");
            return;
        }
        if let Some(cursor) = self.chapters.as_ref() {
            let images = cursor.current().images.clone();
            let events = pillars.set_image_sources(images, now, &mut self.loader);
            if let Err(err) = self.render.apply_pillar_events(&events) {
                tracing::error!(%err, "could not apply chapter images");
            }
        }
        self.pillars = Some(pillars);
    }

    fn refresh_time_label(&mut self, now: Duration) {
        if !self.playback.is_playing() {
            return;
        }
        let interval = self.config.playback.time_label_interval();
        let due = self
            .label_updated_at
            .map_or(true, |at| now.saturating_sub(at) >= interval);
        if due {
            self.time_label = format_time(self.playback.position());
            self.label_updated_at = Some(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::{
        assets::{AssetRef, LoadedAsset},
        pillars::PillarPhase,
        playback::VirtualMedia,
    };

    /// Serves every asset except the ones listed in `failing`, counting calls.
    #[derive(Default)]
    struct MemoryLoader {
        failing: Vec<String>,
        calls: HashMap<String, u32>,
    }

    impl AssetLoader for MemoryLoader {
        fn load(&mut self, asset: &AssetRef) -> Result<LoadedAsset> {
            *self.calls.entry(asset.as_str().to_string()).or_default() += 1;
            if self.failing.iter().any(|f| f == asset.as_str()) {
                return Err(SphereError::asset_load(asset.as_str(), "404"));
            }
            Ok(LoadedAsset {
                source: asset.clone(),
                mime: None,
                bytes: Vec::new(),
            })
        }
    }

    const FRAME: Duration = Duration::from_millis(16);

    fn experience() -> Experience<VirtualMedia, MemoryLoader> {
        Experience::new(
            AppConfig::default(),
            SceneRegistry::standard(),
            VirtualMedia::new(),
            MemoryLoader::default(),
        )
    }

    /// Ticks at 60 fps over `[from, to)`, advancing the media with the clock.
    fn run(exp: &mut Experience<VirtualMedia, MemoryLoader>, from: Duration, to: Duration) {
        let mut now = from;
        while now < to {
            exp.playback_mut().media_mut().advance(FRAME);
            exp.tick(now, Vec3::new(1.0, 0.0, 1.0)).unwrap();
            now += FRAME;
        }
    }

    fn two_chapter_story() -> Story {
        let chapter = |n: usize| ChapterRecord {
            title: format!("Chapitre {n}"),
            audio: AssetRef::new(format!("/audio/{n}.mp3")),
            images: vec![
                AssetRef::new(format!("/img/{n}a.png")),
                AssetRef::new(format!("/img/{n}b.png")),
            ],
        };
        Story {
            chapters: vec![chapter(0), chapter(1)],
        }
    }

    #[test]
    fn first_scene_is_preloaded_but_paused() {
        let exp = experience();
        assert_eq!(exp.playback().media().source(), Some("/NY.mp4"));
        assert_eq!(exp.playback().segment().unwrap().scene, SceneId(1));
        assert_eq!(exp.playback().position(), 150.0);
        assert!(!exp.playback().is_playing());
        assert!(exp.current_scene().is_none());
    }

    #[test]
    fn entry_plays_the_preloaded_scene_without_reloading() {
        let mut exp = experience();
        exp.playback_mut().media_mut().seek(152.0);
        exp.submit_entry(Duration::ZERO).unwrap();
        assert!(exp.playback().is_playing());
        assert_eq!(exp.playback().position(), 152.0);
        assert_eq!(exp.current_scene(), Some(SceneId(1)));
    }

    #[test]
    fn unreachable_first_video_does_not_block_entry() {
        let mut media = VirtualMedia::new();
        media.mark_unreachable("/NY.mp4");
        let mut exp = Experience::new(
            AppConfig::default(),
            SceneRegistry::standard(),
            media,
            MemoryLoader::default(),
        );
        assert!(exp.playback().segment().is_none());

        exp.submit_entry(Duration::ZERO).unwrap();
        assert_eq!(exp.current_scene(), Some(SceneId(1)));
        assert!(exp.playback().segment().is_none());
    }

    #[test]
    fn nothing_happens_before_the_entry_form() {
        let mut exp = experience();
        run(&mut exp, Duration::ZERO, Duration::from_secs(20));

        assert!(exp.current_scene().is_none());
        assert!(!exp.playback().is_playing());
        assert!(exp.render().active().is_none());
    }

    #[test]
    fn scenes_advance_one_two_three() {
        let mut exp = experience();
        exp.submit_entry(Duration::ZERO).unwrap();

        let mut now = Duration::ZERO;
        let mut seen = Vec::new();
        while now < Duration::from_secs(14) {
            exp.playback_mut().media_mut().advance(FRAME);
            let frame = exp.tick(now, Vec3::ZERO).unwrap();
            let id = frame.scene.unwrap().0;
            if seen.last() != Some(&id) {
                seen.push(id);
            }
            let expected = if now < Duration::from_secs(5) {
                1
            } else if now < Duration::from_millis(10_016) {
                // scene two starts on the first frame past 5 s
                2
            } else {
                3
            };
            assert!(id == expected || id == expected - 1, "t={now:?} id={id}");
            now += FRAME;
        }

        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(exp.render().disposed(), &[SceneId(1), SceneId(2)]);
        assert_eq!(exp.playback().media().source(), Some("/romev2.mp4"));
        assert!(exp.playback().is_playing());
    }

    #[test]
    fn playback_stays_inside_each_window() {
        let mut exp = experience();
        exp.submit_entry(Duration::ZERO).unwrap();

        let mut now = Duration::ZERO;
        while now < Duration::from_secs(12) {
            exp.playback_mut().media_mut().advance(FRAME);
            exp.tick(now, Vec3::ZERO).unwrap();
            let segment = *exp.playback().segment().unwrap();
            assert!(exp.playback().position() < segment.window.end);
            assert!(exp.playback().position() >= segment.window.start);
            now += FRAME;
        }
    }

    #[test]
    fn transition_scene_shows_the_colour_fade() {
        let mut exp = experience();
        exp.submit_entry(Duration::ZERO).unwrap();
        run(&mut exp, Duration::ZERO, Duration::from_secs(7));

        assert_eq!(exp.current_scene(), Some(SceneId(2)));
        let overlay = exp.render().overlay().unwrap();
        assert!(overlay.alpha > 0.9);
    }

    #[test]
    fn rome_mounts_pillars_that_settle() {
        let mut exp = experience();
        exp.submit_entry(Duration::ZERO).unwrap();
        run(&mut exp, Duration::ZERO, Duration::from_secs(20));

        let pillars = exp.pillars().unwrap();
        assert!(pillars.is_settled());
        let frame = exp.render().draw();
        assert_eq!(frame.pedestals, 2);
        assert_eq!(frame.images, 2);
        assert_eq!(frame.visible_pillars, 0);
        assert!(exp.render().overlay().is_none());
    }

    #[test]
    fn missing_pedestal_model_still_reveals_images() {
        let loader = MemoryLoader {
            failing: vec!["/pedestal/roman_pedestal.obj".to_string()],
            ..Default::default()
        };
        let mut exp = Experience::new(
            AppConfig::default(),
            SceneRegistry::standard(),
            VirtualMedia::new(),
            loader,
        );
        exp.submit_entry(Duration::ZERO).unwrap();
        run(&mut exp, Duration::ZERO, Duration::from_secs(20));

        assert_eq!(exp.loader().calls["/pedestal/roman_pedestal.obj"], 1);
        let pillars = exp.pillars().unwrap();
        assert!(pillars.pedestal_model().is_none());
        assert!(pillars.is_settled());
        let frame = exp.render().draw();
        assert_eq!(frame.pedestals, 0);
        assert_eq!(frame.images, 2);
        assert_eq!(frame.visible_pillars, 0);
    }

    #[test]
    fn audio_end_moves_both_images_to_the_next_chapter() {
        let mut exp = experience();
        exp.attach_story(two_chapter_story(), Duration::ZERO).unwrap();
        exp.submit_entry(Duration::ZERO).unwrap();
        run(&mut exp, Duration::ZERO, Duration::from_secs(20));

        let sources = |exp: &Experience<VirtualMedia, MemoryLoader>| -> Vec<String> {
            exp.pillars()
                .unwrap()
                .pillars()
                .iter()
                .map(|p| p.image().unwrap().source.as_str().to_string())
                .collect()
        };
        assert_eq!(sources(&exp), vec!["/img/0a.png", "/img/0b.png"]);

        assert_eq!(exp.on_audio_ended(Duration::from_secs(20)).unwrap(), Some(1));
        assert_eq!(sources(&exp), vec!["/img/1a.png", "/img/1b.png"]);
        let graph = exp.render().active().unwrap();
        assert_eq!(graph.images[&1].source.as_str(), "/img/1b.png");

        assert_eq!(exp.on_audio_ended(Duration::from_secs(30)).unwrap(), None);
        assert_eq!(exp.chapters().unwrap().index(), 1);
        assert_eq!(sources(&exp), vec!["/img/1a.png", "/img/1b.png"]);
    }

    #[test]
    fn story_attached_late_replaces_fallback_images() {
        let mut exp = experience();
        exp.submit_entry(Duration::ZERO).unwrap();
        run(&mut exp, Duration::ZERO, Duration::from_secs(20));
        assert_eq!(
            exp.pillars().unwrap().pillar(0).unwrap().image().unwrap().source,
            AssetRef::new("/globe.svg")
        );

        exp.attach_story(two_chapter_story(), Duration::from_secs(20))
            .unwrap();
        let pillar = exp.pillars().unwrap().pillar(0).unwrap();
        assert_eq!(pillar.phase(), PillarPhase::ImageRevealed);
        assert_eq!(pillar.image().unwrap().source, AssetRef::new("/img/0a.png"));
    }

    #[test]
    fn teardown_stops_everything() {
        let mut exp = experience();
        exp.submit_entry(Duration::ZERO).unwrap();
        run(&mut exp, Duration::ZERO, Duration::from_secs(3));
        exp.teardown();

        run(&mut exp, Duration::from_secs(3), Duration::from_secs(15));
        assert!(exp.current_scene().is_none());
        assert!(exp.render().active().is_none());
        assert!(exp.pillars().is_none());
        assert!(!exp.playback().is_playing());
        assert!(matches!(exp.submit_entry(Duration::ZERO), Err(SphereError::TornDown)));
        assert!(matches!(exp.toggle_playback(), Err(SphereError::TornDown)));
    }

    #[test]
    fn unreachable_video_keeps_the_sequence_running() {
        let mut media = VirtualMedia::new();
        media.mark_unreachable("/transition3.mp4");
        let mut exp = Experience::new(
            AppConfig::default(),
            SceneRegistry::standard(),
            media,
            MemoryLoader::default(),
        );
        exp.submit_entry(Duration::ZERO).unwrap();
        run(&mut exp, Duration::ZERO, Duration::from_secs(7));
        assert_eq!(exp.current_scene(), Some(SceneId(2)));
        assert!(exp.playback().segment().is_none());

        run(&mut exp, Duration::from_secs(7), Duration::from_secs(11));
        assert_eq!(exp.current_scene(), Some(SceneId(3)));
        assert!(exp.playback().segment().is_some());
    }

    #[test]
    fn time_label_tracks_the_playhead() {
        let mut exp = experience();
        exp.submit_entry(Duration::ZERO).unwrap();
        run(&mut exp, Duration::ZERO, Duration::from_secs(2));
        assert!(exp.time_label().starts_with("2:3"));
    }
}
