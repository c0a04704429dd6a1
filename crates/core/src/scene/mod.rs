use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{Result, SphereError};

/// Stable identifier of a scene within the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SceneId(pub u32);

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the experience layers on top of the video for a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SceneKind {
    /// Plain 360° video.
    Panorama,
    /// Bridging clip, covered by the colour fade overlay.
    Transition,
    /// Video plus the falling pillars and chapter images.
    Pillars,
}

/// Half-open playback window `[start, end)` in media seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoopWindow {
    pub start: f64,
    pub end: f64,
}

impl LoopWindow {
    pub fn new(start: f64, end: f64) -> Result<Self> {
        if !(start.is_finite() && end.is_finite()) || start < 0.0 {
            return Err(SphereError::InvalidInput(
                "loop window bounds must be finite and non-negative",
            ));
        }
        if end <= start {
            return Err(SphereError::InvalidInput(
                "loop window end must be after its start",
            ));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, position: f64) -> bool {
        position >= self.start && position < self.end
    }

    pub fn length(&self) -> f64 {
        self.end - self.start
    }
}

/// Immutable description of one video segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDescriptor {
    pub id: SceneId,
    pub name: String,
    pub kind: SceneKind,
    pub video_src: String,
    pub window: LoopWindow,
    /// Time the scene stays active before the next one takes over. `None`
    /// makes the scene terminal.
    pub duration: Option<Duration>,
}

impl SceneDescriptor {
    pub fn new(
        id: u32,
        name: impl Into<String>,
        kind: SceneKind,
        video_src: impl Into<String>,
        window: LoopWindow,
        duration: Option<Duration>,
    ) -> Self {
        Self {
            id: SceneId(id),
            name: name.into(),
            kind,
            video_src: video_src.into(),
            window,
            duration,
        }
    }
}

/// Ordered, immutable list of scenes.
#[derive(Debug, Clone, Serialize)]
pub struct SceneRegistry {
    scenes: Vec<SceneDescriptor>,
}

impl SceneRegistry {
    pub fn new(scenes: Vec<SceneDescriptor>) -> Result<Self> {
        if scenes.is_empty() {
            return Err(SphereError::InvalidInput(
                "scene registry needs at least one scene",
            ));
        }
        for (i, scene) in scenes.iter().enumerate() {
            if scenes[..i].iter().any(|other| other.id == scene.id) {
                return Err(SphereError::msg(format!(
                    "scene id {} is registered twice",
                    scene.id
                )));
            }
        }
        Ok(Self { scenes })
    }

    /// New York establishing shot, the transition clip, then Rome.
    pub fn standard() -> Self {
        Self {
            scenes: vec![
                SceneDescriptor::new(
                    1,
                    "New-York",
                    SceneKind::Panorama,
                    "/NY.mp4",
                    LoopWindow {
                        start: 150.0,
                        end: 155.0,
                    },
                    Some(Duration::from_secs(5)),
                ),
                SceneDescriptor::new(
                    2,
                    "Transition",
                    SceneKind::Transition,
                    "/transition3.mp4",
                    LoopWindow {
                        start: 9.0,
                        end: 14.0,
                    },
                    Some(Duration::from_secs(5)),
                ),
                SceneDescriptor::new(
                    3,
                    "Rome",
                    SceneKind::Pillars,
                    "/romev2.mp4",
                    LoopWindow {
                        start: 215.0,
                        end: 420.0,
                    },
                    None,
                ),
            ],
        }
    }

    pub fn first(&self) -> &SceneDescriptor {
        &self.scenes[0]
    }

    pub fn get(&self, id: SceneId) -> Option<&SceneDescriptor> {
        self.scenes.iter().find(|scene| scene.id == id)
    }

    pub fn position(&self, id: SceneId) -> Option<usize> {
        self.scenes.iter().position(|scene| scene.id == id)
    }

    /// Scene that follows `id` in registry order.
    pub fn next_after(&self, id: SceneId) -> Option<&SceneDescriptor> {
        self.position(id).and_then(|index| self.scenes.get(index + 1))
    }

    pub fn scenes(&self) -> &[SceneDescriptor] {
        &self.scenes
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }
}

impl Default for SceneRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_is_ordered() {
        let registry = SceneRegistry::standard();
        let ids: Vec<u32> = registry.scenes().iter().map(|s| s.id.0).collect();

        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(registry.first().name, "New-York");
        assert_eq!(registry.next_after(SceneId(1)).unwrap().id, SceneId(2));
        assert!(registry.next_after(SceneId(3)).is_none());
        assert!(registry.get(SceneId(3)).unwrap().duration.is_none());
    }

    #[test]
    fn rejects_duplicate_ids() {
        let window = LoopWindow::new(0.0, 1.0).unwrap();
        let scene = SceneDescriptor::new(1, "a", SceneKind::Panorama, "/a.mp4", window, None);
        let err = SceneRegistry::new(vec![scene.clone(), scene]).unwrap_err();
        assert!(format!("{err}").contains("twice"));
    }

    #[test]
    fn loop_window_is_half_open() {
        let window = LoopWindow::new(9.0, 14.0).unwrap();
        assert!(window.contains(9.0));
        assert!(window.contains(13.99));
        assert!(!window.contains(14.0));
        assert!(LoopWindow::new(5.0, 5.0).is_err());
    }
}
