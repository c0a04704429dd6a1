use std::{f32::consts::PI, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::Result;

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub playback: PlaybackConfig,
    pub pillars: PillarConfig,
    pub story: StoryConfig,
}

impl AppConfig {
    /// Reads a JSON configuration file. Fields missing from the file keep
    /// their default values.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config = serde_json::from_str(&raw)?;
        Ok(config)
    }
}

/// Configuration for the media side of the experience.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Directory that public asset paths such as `/NY.mp4` resolve against.
    pub assets_root: String,
    /// How often the elapsed-time label is refreshed while playing.
    pub time_label_interval_ms: u64,
    /// Duration of the colour overlay shown while a transition scene plays.
    pub color_fade_ms: u64,
    pub color_fade_start: String,
    pub color_fade_end: String,
    /// Optional history file shown in the overlay panel.
    pub history_path: Option<String>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            assets_root: "public".to_string(),
            time_label_interval_ms: 1_000,
            color_fade_ms: 2_000,
            color_fade_start: "#ffffff".to_string(),
            color_fade_end: "#8B4513".to_string(),
            history_path: None,
        }
    }
}

impl PlaybackConfig {
    pub fn time_label_interval(&self) -> Duration {
        Duration::from_millis(self.time_label_interval_ms)
    }

    pub fn color_fade(&self) -> Duration {
        Duration::from_millis(self.color_fade_ms)
    }
}

/// Layout and timing of the falling pillars.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PillarConfig {
    pub count: usize,
    pub ring_radius: f32,
    /// Angle of the first pillar on the ring, in radians.
    pub arc_start: f32,
    /// Angle spanned by the whole row of pillars, in radians.
    pub arc_span: f32,
    pub spawn_height: f32,
    pub floor: f32,
    /// Units the pillar drops per animation tick.
    pub fall_speed: f32,
    /// Hold before the first fall may trigger.
    pub initial_hold_ms: u64,
    /// Minimum gap between two consecutive fall triggers.
    pub fall_delay_ms: u64,
    /// Delay after a fall trigger before the pedestal swap and image reveal.
    pub reveal_delay_ms: u64,
    pub light_resting_intensity: f32,
    pub light_flash_intensity: f32,
    pub light_flash_ms: u64,
    pub pedestal_fade_ms: u64,
    pub pedestal_model: String,
    pub pedestal_scale: f32,
    pub image_height: f32,
    pub image_float_amplitude: f32,
    pub halo_base_opacity: f32,
    pub halo_pulse_amplitude: f32,
    /// Images shown above the pillars when no story is attached.
    pub fallback_images: Vec<String>,
    /// Total number of load attempts for one image before giving up.
    pub max_reveal_attempts: u32,
}

impl Default for PillarConfig {
    fn default() -> Self {
        Self {
            count: 2,
            ring_radius: 8.0,
            arc_start: -PI / 6.0,
            arc_span: PI / 3.0,
            spawn_height: 20.0,
            floor: 0.0,
            fall_speed: 1.0,
            initial_hold_ms: 2_000,
            fall_delay_ms: 1_000,
            reveal_delay_ms: 1_000,
            light_resting_intensity: 8.0,
            light_flash_intensity: 15.0,
            light_flash_ms: 200,
            pedestal_fade_ms: 1_000,
            pedestal_model: "/pedestal/roman_pedestal.obj".to_string(),
            pedestal_scale: 0.5,
            image_height: 2.0,
            image_float_amplitude: 0.2,
            halo_base_opacity: 0.3,
            halo_pulse_amplitude: 0.2,
            fallback_images: vec!["/globe.svg".to_string(), "/window.svg".to_string()],
            max_reveal_attempts: 3,
        }
    }
}

impl PillarConfig {
    pub fn initial_hold(&self) -> Duration {
        Duration::from_millis(self.initial_hold_ms)
    }

    pub fn fall_delay(&self) -> Duration {
        Duration::from_millis(self.fall_delay_ms)
    }

    pub fn reveal_delay(&self) -> Duration {
        Duration::from_millis(self.reveal_delay_ms)
    }

    pub fn light_flash(&self) -> Duration {
        Duration::from_millis(self.light_flash_ms)
    }

    pub fn pedestal_fade(&self) -> Duration {
        Duration::from_millis(self.pedestal_fade_ms)
    }
}

/// Settings for the hosted story, speech and image generation API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoryConfig {
    pub api_base: String,
    pub api_key: String,
    pub chat_model: String,
    pub speech_model: String,
    pub voice: String,
    pub narration_instructions: String,
    pub image_model: String,
    pub image_size: String,
    /// No timeout is applied unless this is set.
    pub timeout_secs: Option<u64>,
}

impl Default for StoryConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            chat_model: "gpt-4o".to_string(),
            speech_model: "tts-1-hd".to_string(),
            voice: "ash".to_string(),
            narration_instructions: "Generate an audio file of the text in French, with a clear \
                and engaging voice as a passionate historian."
                .to_string(),
            image_model: "dall-e-3".to_string(),
            image_size: "1024x1024".to_string(),
            timeout_secs: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{ "pillars": { "count": 4 }, "story": { "api_key": "k" } }"#)
                .unwrap();

        assert_eq!(config.pillars.count, 4);
        assert_eq!(config.pillars.fall_delay(), Duration::from_secs(1));
        assert_eq!(config.story.api_key, "k");
        assert_eq!(config.story.chat_model, "gpt-4o");
        assert_eq!(config.playback.assets_root, "public");
    }

    #[test]
    fn reads_config_from_disk() {
        let path = std::env::temp_dir().join(format!(
            "story-sphere-config-{}.json",
            std::process::id()
        ));
        std::fs::write(&path, r#"{ "playback": { "assets_root": "/srv/media" } }"#).unwrap();

        let config = AppConfig::from_json_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.playback.assets_root, "/srv/media");
        assert_eq!(config.pillars.max_reveal_attempts, 3);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = AppConfig::from_json_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, crate::SphereError::Io(_)));
    }
}
