use std::collections::BTreeMap;

use crate::{
    assets::AssetRef,
    pillars::{BillboardPose, Pedestal, PillarEvent},
    scene::SceneId,
    timeline::FadeSample,
    Result, SphereError,
};

/// Node bookkeeping for one pillar mesh and its spot light.
#[derive(Debug, Clone, PartialEq)]
pub struct PillarNode {
    pub visible: bool,
    pub opacity: f32,
    pub light_intensity: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageNode {
    pub source: AssetRef,
    pub pose: Option<BillboardPose>,
}

/// The 3D graph of the active scene. Dropping it releases every node.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneGraph {
    pub scene: SceneId,
    pub pillars: BTreeMap<usize, PillarNode>,
    pub pedestals: BTreeMap<usize, Pedestal>,
    pub images: BTreeMap<usize, ImageNode>,
}

impl SceneGraph {
    fn new(scene: SceneId) -> Self {
        Self {
            scene,
            pillars: BTreeMap::new(),
            pedestals: BTreeMap::new(),
            images: BTreeMap::new(),
        }
    }

    pub fn node_count(&self) -> usize {
        // the video sphere is always present
        1 + self.pillars.len() + self.pedestals.len() + self.images.len()
    }
}

/// Counts describing what would be drawn this frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameSummary {
    pub scene: Option<SceneId>,
    pub nodes: usize,
    pub visible_pillars: usize,
    pub pedestals: usize,
    pub images: usize,
    pub overlay_alpha: f32,
}

/// Render context handed to the experience. Actual drawing is the host's
/// job; this keeps the single active scene graph and mirrors the animation
/// state into it.
#[derive(Debug, Default)]
pub struct RenderGraph {
    active: Option<SceneGraph>,
    overlay: Option<FadeSample>,
    disposed: Vec<SceneId>,
}

impl RenderGraph {
    pub fn new() -> Self {
        Self {
            active: None,
            overlay: None,
            disposed: Vec::new(),
        }
    }

    /// Disposes the current graph, then attaches an empty one for `scene`.
    pub fn switch_scene(&mut self, scene: SceneId) {
        self.dispose();
        self.active = Some(SceneGraph::new(scene));
        tracing::debug!(%scene, "scene graph attached");
    }

    /// Releases the active graph, if any.
    pub fn dispose(&mut self) {
        if let Some(graph) = self.active.take() {
            tracing::debug!(scene = %graph.scene, nodes = graph.node_count(), "scene graph disposed");
            self.disposed.push(graph.scene);
        }
        self.overlay = None;
    }

    pub fn active(&self) -> Option<&SceneGraph> {
        self.active.as_ref()
    }

    /// Scenes whose graphs were released, oldest first.
    pub fn disposed(&self) -> &[SceneId] {
        &self.disposed
    }

    /// Adds pillar nodes for a freshly mounted pillar sequencer.
    pub fn mount_pillars(&mut self, count: usize, light_intensity: f32) -> Result<()> {
        let graph = self.graph_mut()?;
        for index in 0..count {
            graph.pillars.insert(
                index,
                PillarNode {
                    visible: true,
                    opacity: 1.0,
                    light_intensity,
                },
            );
        }
        Ok(())
    }

    pub fn apply_pillar_events(&mut self, events: &[PillarEvent]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        let graph = self.graph_mut()?;
        for event in events {
            match event {
                PillarEvent::LightChanged { pillar, intensity } => {
                    if let Some(node) = graph.pillars.get_mut(pillar) {
                        node.light_intensity = *intensity;
                    }
                }
                PillarEvent::PedestalPlaced { pillar, pedestal } => {
                    graph.pedestals.insert(*pillar, *pedestal);
                }
                PillarEvent::PillarHidden { pillar } => {
                    if let Some(node) = graph.pillars.get_mut(pillar) {
                        node.visible = false;
                        node.opacity = 0.0;
                    }
                }
                PillarEvent::ImageRevealed { pillar, source }
                | PillarEvent::ImageReplaced { pillar, source } => {
                    graph.images.insert(
                        *pillar,
                        ImageNode {
                            source: source.clone(),
                            pose: None,
                        },
                    );
                }
                PillarEvent::FallStarted { .. }
                | PillarEvent::Landed { .. }
                | PillarEvent::RevealFailed { .. }
                | PillarEvent::RevealAbandoned { .. } => {}
            }
        }
        Ok(())
    }

    /// Updates the fading opacity of a pillar mesh.
    pub fn set_pillar_opacity(&mut self, pillar: usize, opacity: f32) {
        if let Some(node) = self
            .active
            .as_mut()
            .and_then(|graph| graph.pillars.get_mut(&pillar))
        {
            if node.visible {
                node.opacity = opacity;
            }
        }
    }

    pub fn apply_poses(&mut self, poses: &[(usize, BillboardPose)]) {
        let Some(graph) = self.active.as_mut() else {
            return;
        };
        for (pillar, pose) in poses {
            if let Some(node) = graph.images.get_mut(pillar) {
                node.pose = Some(*pose);
            }
        }
    }

    pub fn set_overlay(&mut self, overlay: Option<FadeSample>) {
        self.overlay = overlay;
    }

    pub fn overlay(&self) -> Option<&FadeSample> {
        self.overlay.as_ref()
    }

    pub fn draw(&self) -> FrameSummary {
        let Some(graph) = self.active.as_ref() else {
            return FrameSummary::default();
        };
        FrameSummary {
            scene: Some(graph.scene),
            nodes: graph.node_count(),
            visible_pillars: graph.pillars.values().filter(|node| node.visible).count(),
            pedestals: graph.pedestals.len(),
            images: graph.images.len(),
            overlay_alpha: self.overlay.map(|fade| fade.alpha).unwrap_or(0.0),
        }
    }

    fn graph_mut(&mut self) -> Result<&mut SceneGraph> {
        self.active
            .as_mut()
            .ok_or_else(|| SphereError::msg("no scene graph is attached"))
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;

    #[test]
    fn switching_disposes_the_previous_graph_first() {
        let mut render = RenderGraph::new();
        render.switch_scene(SceneId(1));
        render.switch_scene(SceneId(2));
        render.switch_scene(SceneId(3));

        assert_eq!(render.disposed(), &[SceneId(1), SceneId(2)]);
        assert_eq!(render.active().unwrap().scene, SceneId(3));
        assert_eq!(render.draw().nodes, 1);
    }

    #[test]
    fn mirrors_pillar_events() {
        let mut render = RenderGraph::new();
        render.switch_scene(SceneId(3));
        render.mount_pillars(2, 8.0).unwrap();

        let pedestal = Pedestal {
            position: Vec3::ZERO,
            scale: 0.5,
        };
        render
            .apply_pillar_events(&[
                PillarEvent::LightChanged {
                    pillar: 0,
                    intensity: 15.0,
                },
                PillarEvent::PedestalPlaced { pillar: 0, pedestal },
                PillarEvent::PedestalPlaced { pillar: 0, pedestal },
                PillarEvent::PillarHidden { pillar: 0 },
                PillarEvent::ImageRevealed {
                    pillar: 0,
                    source: AssetRef::new("/globe.svg"),
                },
            ])
            .unwrap();

        let graph = render.active().unwrap();
        assert_eq!(graph.pillars[&0].light_intensity, 15.0);
        assert_eq!(graph.pedestals.len(), 1);
        let frame = render.draw();
        assert_eq!(frame.visible_pillars, 1);
        assert_eq!(frame.images, 1);
    }

    #[test]
    fn events_without_a_graph_are_rejected() {
        let mut render = RenderGraph::new();
        assert!(render.mount_pillars(2, 8.0).is_err());
        assert!(render
            .apply_pillar_events(&[PillarEvent::Landed { pillar: 0 }])
            .is_err());
        assert_eq!(render.draw(), FrameSummary::default());
    }
}
