use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use clap::{Parser, Subcommand};
use glam::Vec3;
use story_sphere_core::{
    assets::{self, AssetKind},
    AppConfig, AssetStore, Experience, FsAssetLoader, OpenAiClient, PlaybackClock,
    SceneId, SceneKind, SceneRegistry, Story, StoryGenerator, VirtualMedia,
};
use tracing_subscriber::EnvFilter;

fn main() -> story_sphere_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            seconds,
            fps,
            story,
            chapter_seconds,
        } => {
            let config = load_config(config.as_deref())?;
            run_simulation(config, seconds, fps, story.as_deref(), chapter_seconds)
        }
        Commands::Generate {
            config,
            prompt,
            output,
            api_key,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(key) = api_key {
                config.story.api_key = key;
            }
            run_generate(config, &prompt, output.as_deref())
        }
        Commands::Scenes { config } => {
            let config = load_config(config.as_deref())?;
            list_scenes(&config);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> story_sphere_core::Result<AppConfig> {
    match path {
        Some(path) => {
            tracing::info!(?path, "loading configuration");
            AppConfig::from_json_file(path)
        }
        None => Ok(AppConfig::default()),
    }
}

fn run_simulation(
    config: AppConfig,
    seconds: f32,
    fps: u32,
    story: Option<&Path>,
    chapter_seconds: f32,
) -> story_sphere_core::Result<()> {
    validate_run_args(seconds, fps, chapter_seconds)?;
    tracing::info!(seconds, fps, "starting headless run");

    let registry = SceneRegistry::standard();
    let loader = FsAssetLoader::new(&config.playback.assets_root);
    let missing = AssetStore::for_experience(&registry, &config.pillars).missing_on_disk(&loader);
    if !missing.is_empty() {
        tracing::warn!(?missing, root = %loader.root().display(), "assets missing on disk");
    }
    if let Some(path) = config.playback.history_path.as_deref() {
        for (index, entry) in assets::load_history(path).iter().enumerate() {
            tracing::info!(title = %entry.display_title(index), text = ?entry.text, "history");
        }
    }

    let mut experience = Experience::new(config, registry, VirtualMedia::new(), loader);
    let mut clock = PlaybackClock::start();
    let frame = Duration::from_secs_f64(1.0 / fps as f64);
    let end = Duration::from_secs_f32(seconds);
    let chapter_length = Duration::from_secs_f32(chapter_seconds);

    experience.submit_entry(clock.now())?;
    if let Some(path) = story {
        let raw = std::fs::read_to_string(path)?;
        experience.attach_story(Story::from_json(&raw)?, clock.now())?;
    }

    let mut last_scene = None;
    let mut last_report = Duration::ZERO;
    let mut chapter_started = Duration::ZERO;
    while clock.now() < end {
        let now = clock.advance(frame);
        experience.playback_mut().media_mut().advance(frame);

        let camera = camera_for(experience.current_scene(), experience.registry());
        let summary = experience.tick(now, camera)?;

        if summary.scene != last_scene {
            tracing::info!(scene = ?summary.scene.map(|id| id.0), at = ?now, "now showing");
            last_scene = summary.scene;
        }
        if experience.current_chapter().is_some() && now - chapter_started >= chapter_length {
            chapter_started = now;
            if let Some(index) = experience.on_audio_ended(now)? {
                tracing::info!(chapter = index, "narration moved on");
            }
        }
        if now - last_report >= Duration::from_secs(1) {
            last_report = now;
            tracing::info!(
                time = experience.time_label(),
                nodes = summary.nodes,
                pillars = summary.visible_pillars,
                pedestals = summary.pedestals,
                images = summary.images,
                overlay = summary.overlay_alpha,
                "frame"
            );
        }
    }

    experience.teardown();
    Ok(())
}

/// Rejects frame rates and lengths that `Duration` cannot represent.
fn validate_run_args(seconds: f32, fps: u32, chapter_seconds: f32) -> story_sphere_core::Result<()> {
    let positive = |value: f32| value.is_finite() && value > 0.0;
    if fps == 0 || !positive(seconds) || !positive(chapter_seconds) {
        return Err("fps, --seconds and --chapter-seconds must be positive and finite".into());
    }
    Ok(())
}

/// Viewer position per scene: offset for the city shots, mirrored for Rome.
fn camera_for(scene: Option<SceneId>, registry: &SceneRegistry) -> Vec3 {
    match scene.and_then(|id| registry.get(id)).map(|scene| scene.kind) {
        Some(SceneKind::Pillars) => Vec3::new(-1.0, 0.0, 0.0),
        _ => Vec3::new(1.0, 0.0, 1.0),
    }
}

fn run_generate(
    config: AppConfig,
    prompt: &str,
    output: Option<&Path>,
) -> story_sphere_core::Result<()> {
    tracing::info!(prompt, "generating story");
    let client = OpenAiClient::new(&config.story)?;
    let mut generator = StoryGenerator::new(client, config.story);
    let story = generator.generate(prompt)?;
    let json = story.to_json_pretty()?;

    match output {
        Some(path) => {
            std::fs::write(path, json)?;
            tracing::info!(?path, chapters = story.chapters.len(), "story written");
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn list_scenes(config: &AppConfig) {
    let registry = SceneRegistry::standard();
    let loader = FsAssetLoader::new(&config.playback.assets_root);
    let store = AssetStore::for_experience(&registry, &config.pillars);
    let missing = store.missing_on_disk(&loader);

    for scene in registry.scenes() {
        let duration = scene
            .duration
            .map(|d| format!("{}s", d.as_secs_f32()))
            .unwrap_or_else(|| "terminal".to_string());
        let status = if missing.contains(&scene.video_src) {
            "missing"
        } else {
            "ok"
        };
        println!(
            "{:>2}  {:<12} {:<20} [{:>6.1}, {:>6.1})  {:<9} {:?} {}",
            scene.id.0,
            scene.name,
            scene.video_src,
            scene.window.start,
            scene.window.end,
            duration,
            scene.kind,
            status
        );
    }
    for path in &missing {
        match store.kind(path) {
            Some(AssetKind::Video) | None => {}
            Some(kind) => println!("    {kind:?} {path} missing"),
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "360° story experience", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play the scene sequence headless and log what would be shown.
    Run {
        /// JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Length of the simulated session.
        #[arg(long, default_value_t = 30.0)]
        seconds: f32,
        /// Simulated animation frame rate.
        #[arg(long, default_value_t = 60)]
        fps: u32,
        /// Story JSON produced by `generate`.
        #[arg(long)]
        story: Option<PathBuf>,
        /// Simulated narration length per chapter.
        #[arg(long, default_value_t = 8.0)]
        chapter_seconds: f32,
    },
    /// Generate a narrated, illustrated story from a prompt.
    Generate {
        /// JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Title or description of the story.
        #[arg(short, long)]
        prompt: String,
        /// Where to write the story JSON; printed to stdout otherwise.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// API key, overriding the configuration file.
        #[arg(long)]
        api_key: Option<String>,
    },
    /// List the scene registry and whether each video is on disk.
    Scenes {
        /// JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}
