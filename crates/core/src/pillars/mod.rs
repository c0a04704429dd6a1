//! Falling pillars shown in the final scene.
//!
//! Every pillar walks through [`PillarPhase`] in order: it waits for its turn,
//! falls one step per tick until it hits the floor, lands with a light flash,
//! is swapped for a pedestal while it fades out, and finally gets a floating
//! image above it. All timing comes from the `now` argument of
//! [`PillarSequencer::tick`], so the chain is deterministic under test.

use std::time::Duration;

use glam::{EulerRot, Quat, Vec3};

use crate::{
    assets::{AssetLoader, AssetRef},
    config::PillarConfig,
    Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PillarPhase {
    Pending,
    Falling,
    Landed,
    /// Swap point passed. The pedestal itself is missing when its model
    /// never loaded.
    PedestalPlaced,
    ImageRevealed,
    /// Every allowed image load failed; nothing more happens to this pillar.
    RevealAbandoned,
}

/// Pedestal model instance that replaces a landed pillar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pedestal {
    pub position: Vec3,
    pub scale: f32,
}

/// Image billboard hovering above a pedestal.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatingImage {
    pub source: AssetRef,
    pub anchor: Vec3,
    pub revealed_at: Duration,
}

/// Placement of a floating image for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BillboardPose {
    pub position: Vec3,
    pub rotation: Quat,
    pub halo_opacity: f32,
}

#[derive(Debug, Clone)]
pub struct Pillar {
    index: usize,
    position: Vec3,
    phase: PillarPhase,
    fall_triggered_at: Option<Duration>,
    light_intensity: f32,
    light_off_at: Option<Duration>,
    opacity: f32,
    visible: bool,
    fade_started_at: Option<Duration>,
    reveal_attempts: u32,
    pedestal: Option<Pedestal>,
    image: Option<FloatingImage>,
}

impl Pillar {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn phase(&self) -> PillarPhase {
        self.phase
    }

    pub fn light_intensity(&self) -> f32 {
        self.light_intensity
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn pedestal(&self) -> Option<&Pedestal> {
        self.pedestal.as_ref()
    }

    pub fn image(&self) -> Option<&FloatingImage> {
        self.image.as_ref()
    }

    pub fn reveal_attempts(&self) -> u32 {
        self.reveal_attempts
    }

    fn footprint(&self, floor: f32) -> Vec3 {
        Vec3::new(self.position.x, floor, self.position.z)
    }
}

/// Side effects produced by a tick, for the render context to mirror.
#[derive(Debug, Clone, PartialEq)]
pub enum PillarEvent {
    FallStarted { pillar: usize },
    Landed { pillar: usize },
    LightChanged { pillar: usize, intensity: f32 },
    PedestalPlaced { pillar: usize, pedestal: Pedestal },
    PillarHidden { pillar: usize },
    ImageRevealed { pillar: usize, source: AssetRef },
    ImageReplaced { pillar: usize, source: AssetRef },
    RevealFailed { pillar: usize, attempt: u32, reason: String },
    RevealAbandoned { pillar: usize },
}

#[derive(Debug, Clone)]
pub struct PillarSequencer {
    config: PillarConfig,
    pillars: Vec<Pillar>,
    image_sources: Vec<AssetRef>,
    pedestal_model: Option<AssetRef>,
    last_fall_at: Duration,
    next_to_fall: usize,
}

impl PillarSequencer {
    /// Spawns the pillars on their arc. The first fall may trigger once the
    /// initial hold plus one fall delay has passed since `mounted_at`.
    pub fn new(config: PillarConfig, mounted_at: Duration) -> Self {
        let count = config.count;
        let step = if count > 1 {
            config.arc_span / (count - 1) as f32
        } else {
            0.0
        };
        let pillars = (0..count)
            .map(|index| {
                let angle = config.arc_start + index as f32 * step;
                Pillar {
                    index,
                    position: Vec3::new(
                        config.ring_radius * angle.cos(),
                        config.spawn_height,
                        config.ring_radius * angle.sin(),
                    ),
                    phase: PillarPhase::Pending,
                    fall_triggered_at: None,
                    light_intensity: config.light_resting_intensity,
                    light_off_at: None,
                    opacity: 1.0,
                    visible: true,
                    fade_started_at: None,
                    reveal_attempts: 0,
                    pedestal: None,
                    image: None,
                }
            })
            .collect();
        let image_sources = config
            .fallback_images
            .iter()
            .map(|path| AssetRef::new(path.as_str()))
            .collect();

        Self {
            last_fall_at: mounted_at + config.initial_hold(),
            config,
            pillars,
            image_sources,
            pedestal_model: None,
            next_to_fall: 0,
        }
    }

    /// Loads the pedestal model once. Without it, landed pillars still fade
    /// out and get their image, but no pedestal is placed.
    pub fn preload_model(&mut self, loader: &mut dyn AssetLoader) -> Result<()> {
        let model = AssetRef::new(self.config.pedestal_model.as_str());
        loader.load(&model)?;
        tracing::info!(asset = %model, "pedestal model loaded");
        self.pedestal_model = Some(model);
        Ok(())
    }

    pub fn pedestal_model(&self) -> Option<&AssetRef> {
        self.pedestal_model.as_ref()
    }

    pub fn pillars(&self) -> &[Pillar] {
        &self.pillars
    }

    pub fn pillar(&self, index: usize) -> Option<&Pillar> {
        self.pillars.get(index)
    }

    pub fn image_sources(&self) -> &[AssetRef] {
        &self.image_sources
    }

    /// True once every pillar reached a terminal phase and faded out.
    pub fn is_settled(&self) -> bool {
        self.pillars.iter().all(|pillar| {
            matches!(
                pillar.phase,
                PillarPhase::ImageRevealed | PillarPhase::RevealAbandoned
            ) && !pillar.visible
        })
    }

    /// Advances every pillar by one animation tick.
    pub fn tick(&mut self, now: Duration, loader: &mut dyn AssetLoader) -> Vec<PillarEvent> {
        let mut events = Vec::new();

        if self.next_to_fall < self.pillars.len() && now > self.last_fall_at + self.config.fall_delay()
        {
            let pillar = &mut self.pillars[self.next_to_fall];
            pillar.phase = PillarPhase::Falling;
            pillar.fall_triggered_at = Some(now);
            tracing::info!(pillar = pillar.index, "pillar falling");
            events.push(PillarEvent::FallStarted {
                pillar: pillar.index,
            });
            self.last_fall_at = now;
            self.next_to_fall += 1;
        }

        for index in 0..self.pillars.len() {
            self.step_pillar(index, now, &mut events);

            let due = self.pillars[index]
                .fall_triggered_at
                .is_some_and(|at| now >= at + self.config.reveal_delay());
            if due {
                self.advance_reveal(index, now, loader, &mut events);
            }

            self.step_fade(index, now, &mut events);
        }

        events
    }

    /// Places the pedestal and reveals the image for a landed pillar without
    /// waiting for the reveal delay. Repeated calls never duplicate either.
    pub fn reveal(
        &mut self,
        index: usize,
        now: Duration,
        loader: &mut dyn AssetLoader,
    ) -> Vec<PillarEvent> {
        let mut events = Vec::new();
        if index < self.pillars.len() {
            self.advance_reveal(index, now, loader, &mut events);
        }
        events
    }

    /// Points the pillars at a new set of images, one per pillar. Images
    /// already on screen are reloaded; abandoned pillars get a fresh budget.
    pub fn set_image_sources(
        &mut self,
        sources: Vec<AssetRef>,
        now: Duration,
        loader: &mut dyn AssetLoader,
    ) -> Vec<PillarEvent> {
        self.image_sources = sources;
        let mut events = Vec::new();

        for pillar in &mut self.pillars {
            let Some(source) = self.image_sources.get(pillar.index) else {
                continue;
            };
            match pillar.phase {
                PillarPhase::ImageRevealed => match loader.load(source) {
                    Ok(_) => {
                        if let Some(image) = pillar.image.as_mut() {
                            image.source = source.clone();
                            image.revealed_at = now;
                        }
                        events.push(PillarEvent::ImageReplaced {
                            pillar: pillar.index,
                            source: source.clone(),
                        });
                    }
                    Err(err) => {
                        tracing::warn!(pillar = pillar.index, asset = %source, %err, "image swap failed; keeping previous image");
                    }
                },
                PillarPhase::RevealAbandoned => {
                    pillar.phase = PillarPhase::PedestalPlaced;
                    pillar.reveal_attempts = 0;
                }
                _ => {}
            }
        }

        events
    }

    /// Poses of every revealed image for this frame, facing `camera`.
    pub fn image_poses(&self, now: Duration, camera: Vec3) -> Vec<(usize, BillboardPose)> {
        let t_ms = now.as_secs_f32() * 1_000.0;
        let height =
            self.config.image_height + (t_ms * 0.001).sin() * self.config.image_float_amplitude;
        let halo_opacity =
            self.config.halo_base_opacity + (t_ms * 0.002).sin() * self.config.halo_pulse_amplitude;

        self.pillars
            .iter()
            .filter_map(|pillar| {
                let image = pillar.image.as_ref()?;
                let position = Vec3::new(image.anchor.x, height, image.anchor.z);
                Some((
                    pillar.index,
                    BillboardPose {
                        position,
                        rotation: look_at_rotation(position, camera),
                        halo_opacity,
                    },
                ))
            })
            .collect()
    }

    fn step_pillar(&mut self, index: usize, now: Duration, events: &mut Vec<PillarEvent>) {
        let floor = self.config.floor;
        let pillar = &mut self.pillars[index];

        if pillar.phase == PillarPhase::Falling {
            pillar.position.y -= self.config.fall_speed;
            if pillar.position.y <= floor {
                pillar.position.y = floor;
                pillar.phase = PillarPhase::Landed;
                pillar.light_intensity = self.config.light_flash_intensity;
                pillar.light_off_at = Some(now + self.config.light_flash());
                tracing::info!(pillar = index, "pillar landed");
                events.push(PillarEvent::Landed { pillar: index });
                events.push(PillarEvent::LightChanged {
                    pillar: index,
                    intensity: pillar.light_intensity,
                });
            }
        }

        if pillar.light_off_at.is_some_and(|off_at| now >= off_at) {
            pillar.light_off_at = None;
            pillar.light_intensity = 0.0;
            events.push(PillarEvent::LightChanged {
                pillar: index,
                intensity: 0.0,
            });
        }
    }

    fn advance_reveal(
        &mut self,
        index: usize,
        now: Duration,
        loader: &mut dyn AssetLoader,
        events: &mut Vec<PillarEvent>,
    ) {
        let floor = self.config.floor;
        let max_attempts = self.config.max_reveal_attempts.max(1);
        let pillar = &mut self.pillars[index];

        if pillar.phase == PillarPhase::Landed {
            if self.pedestal_model.is_some() {
                let pedestal = Pedestal {
                    position: pillar.footprint(floor),
                    scale: self.config.pedestal_scale,
                };
                pillar.pedestal = Some(pedestal);
                tracing::info!(pillar = index, "pedestal placed");
                events.push(PillarEvent::PedestalPlaced {
                    pillar: index,
                    pedestal,
                });
            } else {
                tracing::debug!(pillar = index, "no pedestal model; pillar fades without one");
            }
            pillar.fade_started_at = Some(now);
            pillar.phase = PillarPhase::PedestalPlaced;
        }

        if pillar.phase != PillarPhase::PedestalPlaced {
            return;
        }
        let Some(source) = self.image_sources.get(index) else {
            return;
        };

        pillar.reveal_attempts += 1;
        match loader.load(source) {
            Ok(_) => {
                pillar.image = Some(FloatingImage {
                    source: source.clone(),
                    anchor: pillar.footprint(floor),
                    revealed_at: now,
                });
                pillar.phase = PillarPhase::ImageRevealed;
                tracing::info!(pillar = index, asset = %source, "image revealed");
                events.push(PillarEvent::ImageRevealed {
                    pillar: index,
                    source: source.clone(),
                });
            }
            Err(err) => {
                let attempt = pillar.reveal_attempts;
                events.push(PillarEvent::RevealFailed {
                    pillar: index,
                    attempt,
                    reason: err.to_string(),
                });
                if attempt >= max_attempts {
                    pillar.phase = PillarPhase::RevealAbandoned;
                    tracing::warn!(pillar = index, asset = %source, attempt, %err, "giving up on image");
                    events.push(PillarEvent::RevealAbandoned { pillar: index });
                } else {
                    tracing::warn!(pillar = index, asset = %source, attempt, %err, "image load failed; retrying next tick");
                }
            }
        }
    }

    fn step_fade(&mut self, index: usize, now: Duration, events: &mut Vec<PillarEvent>) {
        let fade = self.config.pedestal_fade();
        let pillar = &mut self.pillars[index];
        let Some(started) = pillar.fade_started_at else {
            return;
        };
        if !pillar.visible {
            return;
        }

        let elapsed = now.saturating_sub(started);
        if fade.is_zero() || elapsed >= fade {
            pillar.opacity = 0.0;
            pillar.visible = false;
            events.push(PillarEvent::PillarHidden { pillar: index });
        } else {
            pillar.opacity = 1.0 - elapsed.as_secs_f32() / fade.as_secs_f32();
        }
    }
}

/// Rotation that turns the local +Z axis from `from` towards `target`.
pub fn look_at_rotation(from: Vec3, target: Vec3) -> Quat {
    let direction = target - from;
    if direction.length_squared() <= f32::EPSILON {
        return Quat::IDENTITY;
    }
    let yaw = direction.x.atan2(direction.z);
    let horizontal = (direction.x * direction.x + direction.z * direction.z).sqrt();
    let pitch = direction.y.atan2(horizontal);
    Quat::from_euler(EulerRot::YXZ, yaw, -pitch, 0.0)
}
