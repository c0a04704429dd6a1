use std::time::Duration;

use glam::Vec3;

use crate::{
    scene::{SceneId, SceneRegistry},
    Result, SphereError,
};

/// Monotonic time source handed to every sequencer tick.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaybackClock {
    elapsed: Duration,
}

impl PlaybackClock {
    pub fn start() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.elapsed = Duration::ZERO;
    }

    pub fn advance(&mut self, delta: Duration) -> Duration {
        self.elapsed += delta;
        self.elapsed
    }

    pub fn now(&self) -> Duration {
        self.elapsed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    /// Waiting for the entry form to be submitted.
    Idle,
    Playing { scene: SceneId, entered_at: Duration },
    /// A transition fired and the new scene is being attached.
    Transitioning { from: SceneId, to: SceneId },
    TornDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneTransition {
    pub from: SceneId,
    pub to: SceneId,
    pub at: Duration,
}

/// Linear chain of scenes advanced purely by elapsed time.
#[derive(Debug, Clone)]
pub struct SceneSequencer {
    schedule: Vec<(SceneId, Option<Duration>)>,
    state: SequencerState,
}

impl SceneSequencer {
    pub fn new(registry: &SceneRegistry) -> Self {
        Self {
            schedule: registry
                .scenes()
                .iter()
                .map(|scene| (scene.id, scene.duration))
                .collect(),
            state: SequencerState::Idle,
        }
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    /// Scene that should be on screen. During a transition this is already
    /// the incoming scene.
    pub fn current(&self) -> Option<SceneId> {
        match self.state {
            SequencerState::Playing { scene, .. } => Some(scene),
            SequencerState::Transitioning { to, .. } => Some(to),
            SequencerState::Idle | SequencerState::TornDown => None,
        }
    }

    /// Enters the first scene. Only valid once, from `Idle`.
    pub fn start(&mut self, now: Duration) -> Result<SceneId> {
        match self.state {
            SequencerState::Idle => {
                let (first, _) = *self
                    .schedule
                    .first()
                    .ok_or(SphereError::InvalidInput("no scenes to play"))?;
                self.state = SequencerState::Playing {
                    scene: first,
                    entered_at: now,
                };
                tracing::info!(scene = %first, "scene sequence started");
                Ok(first)
            }
            SequencerState::TornDown => Err(SphereError::TornDown),
            _ => Err(SphereError::InvalidInput("scene sequence already started")),
        }
    }

    /// Fires the next transition once the active scene's duration has
    /// elapsed. The caller attaches the new scene and then calls
    /// [`Self::complete_transition`].
    pub fn tick(&mut self, now: Duration) -> Option<SceneTransition> {
        let SequencerState::Playing { scene, entered_at } = self.state else {
            return None;
        };
        let index = self.schedule.iter().position(|(id, _)| *id == scene)?;
        let duration = self.schedule[index].1?;
        let (next, _) = *self.schedule.get(index + 1)?;

        if now.saturating_sub(entered_at) < duration {
            return None;
        }

        self.state = SequencerState::Transitioning {
            from: scene,
            to: next,
        };
        tracing::info!(from = %scene, to = %next, at_ms = now.as_millis() as u64, "scene transition");
        Some(SceneTransition {
            from: scene,
            to: next,
            at: now,
        })
    }

    /// Settles a pending transition; the new scene's timer starts at `now`.
    pub fn complete_transition(&mut self, now: Duration) {
        if let SequencerState::Transitioning { to, .. } = self.state {
            self.state = SequencerState::Playing {
                scene: to,
                entered_at: now,
            };
        }
    }

    /// True once the active scene has no successor or no duration.
    pub fn is_terminal(&self) -> bool {
        let SequencerState::Playing { scene, .. } = self.state else {
            return false;
        };
        match self.schedule.iter().position(|(id, _)| *id == scene) {
            Some(index) => self.schedule[index].1.is_none() || index + 1 >= self.schedule.len(),
            None => true,
        }
    }

    /// Drops every pending transition. Later ticks never fire.
    pub fn teardown(&mut self) {
        self.state = SequencerState::TornDown;
    }
}

/// Full-screen colour overlay blending between two colours.
#[derive(Debug, Clone)]
pub struct ColorFade {
    duration: Duration,
    start: Vec3,
    end: Vec3,
    started_at: Duration,
    completed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeSample {
    pub color: Vec3,
    pub alpha: f32,
    pub progress: f32,
    /// Set on the first sample that reaches full progress.
    pub just_completed: bool,
}

impl ColorFade {
    pub fn new(duration: Duration, start: &str, end: &str, started_at: Duration) -> Result<Self> {
        Ok(Self {
            duration,
            start: parse_hex_color(start)?,
            end: parse_hex_color(end)?,
            started_at,
            completed: false,
        })
    }

    pub fn sample(&mut self, now: Duration) -> FadeSample {
        let elapsed = now.saturating_sub(self.started_at);
        let progress = if self.duration.is_zero() {
            1.0
        } else {
            (elapsed.as_secs_f32() / self.duration.as_secs_f32()).min(1.0)
        };
        let just_completed = progress >= 1.0 && !self.completed;
        if just_completed {
            self.completed = true;
        }
        FadeSample {
            color: self.start.lerp(self.end, progress),
            alpha: progress,
            progress,
            just_completed,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed
    }
}

/// Parses `#rrggbb` into linear 0..1 components.
pub fn parse_hex_color(value: &str) -> Result<Vec3> {
    let hex = value.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return Err(SphereError::msg(format!("invalid colour `{value}`")));
    }
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&hex[range], 16)
            .map(|c| c as f32 / 255.0)
            .map_err(|_| SphereError::msg(format!("invalid colour `{value}`")))
    };
    Ok(Vec3::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{LoopWindow, SceneDescriptor, SceneKind};

    fn two_scene_registry() -> SceneRegistry {
        let window = LoopWindow::new(0.0, 5.0).unwrap();
        let scene = |id: u32, duration: Option<Duration>| {
            SceneDescriptor::new(id, format!("s{id}"), SceneKind::Panorama, "/v.mp4", window, duration)
        };
        SceneRegistry::new(vec![
            scene(1, Some(Duration::from_secs(5))),
            scene(2, Some(Duration::from_secs(5))),
            scene(3, None),
        ])
        .unwrap()
    }

    fn observe(sequencer: &mut SceneSequencer, until_ms: u64, step_ms: u64) -> Vec<(u64, u32)> {
        let mut seen = Vec::new();
        let mut t = 0;
        while t <= until_ms {
            let now = Duration::from_millis(t);
            if sequencer.tick(now).is_some() {
                sequencer.complete_transition(now);
            }
            seen.push((t, sequencer.current().unwrap().0));
            t += step_ms;
        }
        seen
    }

    #[test]
    fn scenes_follow_wall_clock_durations() {
        let mut sequencer = SceneSequencer::new(&two_scene_registry());
        sequencer.start(Duration::ZERO).unwrap();

        for (t, id) in observe(&mut sequencer, 14_000, 100) {
            let expected = match t {
                0..=4_999 => 1,
                5_000..=9_999 => 2,
                _ => 3,
            };
            assert_eq!(id, expected, "scene at t={t}ms");
        }
        assert!(sequencer.is_terminal());
    }

    #[test]
    fn idle_sequencer_never_fires() {
        let mut sequencer = SceneSequencer::new(&two_scene_registry());
        assert!(sequencer.tick(Duration::from_secs(60)).is_none());
        assert!(sequencer.current().is_none());
    }

    #[test]
    fn teardown_cancels_pending_transitions() {
        let mut sequencer = SceneSequencer::new(&two_scene_registry());
        sequencer.start(Duration::ZERO).unwrap();
        sequencer.teardown();

        assert!(sequencer.tick(Duration::from_secs(30)).is_none());
        assert!(matches!(sequencer.start(Duration::ZERO), Err(SphereError::TornDown)));
    }

    #[test]
    fn start_is_one_shot() {
        let mut sequencer = SceneSequencer::new(&two_scene_registry());
        sequencer.start(Duration::ZERO).unwrap();
        assert!(sequencer.start(Duration::from_secs(1)).is_err());
    }

    #[test]
    fn transition_waits_for_completion() {
        let mut sequencer = SceneSequencer::new(&two_scene_registry());
        sequencer.start(Duration::ZERO).unwrap();
        let transition = sequencer.tick(Duration::from_secs(5)).unwrap();
        assert_eq!((transition.from, transition.to), (SceneId(1), SceneId(2)));

        // no double fire while the new scene is still attaching
        assert!(sequencer.tick(Duration::from_secs(20)).is_none());
        sequencer.complete_transition(Duration::from_secs(20));
        assert!(sequencer.tick(Duration::from_millis(24_999)).is_none());
        assert!(sequencer.tick(Duration::from_secs(25)).is_some());
    }

    #[test]
    fn color_fade_blends_and_completes_once() {
        let mut fade =
            ColorFade::new(Duration::from_secs(2), "#ffffff", "#8B4513", Duration::ZERO).unwrap();

        let half = fade.sample(Duration::from_secs(1));
        assert!((half.alpha - 0.5).abs() < 1e-6);
        assert!(!half.just_completed);

        let done = fade.sample(Duration::from_secs(3));
        assert_eq!(done.progress, 1.0);
        assert!(done.just_completed);
        assert!((done.color.x - 139.0 / 255.0).abs() < 1e-6);

        assert!(!fade.sample(Duration::from_secs(4)).just_completed);
        assert!(fade.is_complete());
    }

    #[test]
    fn rejects_bad_colours() {
        assert!(parse_hex_color("#fff").is_err());
        assert!(parse_hex_color("#gg0000").is_err());
    }

    #[test]
    fn clock_accumulates() {
        let mut clock = PlaybackClock::start();
        clock.advance(Duration::from_millis(16));
        assert_eq!(clock.advance(Duration::from_millis(16)), Duration::from_millis(32));
        clock.reset();
        assert_eq!(clock.now(), Duration::ZERO);
    }
}
