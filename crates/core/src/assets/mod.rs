use std::{
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{config::PillarConfig, Result, SceneRegistry, SphereError};

/// Reference to a static asset: either a public path such as `/NY.mp4` or an
/// inline `data:` URI produced by the story generator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetRef(String);

impl AssetRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Builds a base64 `data:` URI for the given payload.
    pub fn data_uri(mime: &str, bytes: &[u8]) -> Self {
        Self(format!("data:{mime};base64,{}", BASE64.encode(bytes)))
    }

    /// Wraps an already base64-encoded payload without re-encoding it.
    pub fn from_base64(mime: &str, encoded: &str) -> Self {
        Self(format!("data:{mime};base64,{encoded}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_data_uri(&self) -> bool {
        self.0.starts_with("data:")
    }

    /// Decodes an inline asset into its MIME type and raw bytes.
    pub fn decode_data_uri(&self) -> Result<(String, Vec<u8>)> {
        let rest = self
            .0
            .strip_prefix("data:")
            .ok_or_else(|| SphereError::asset_load(self.short(), "not a data URI"))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| SphereError::asset_load(self.short(), "data URI has no payload"))?;
        let mime = header
            .strip_suffix(";base64")
            .ok_or_else(|| SphereError::asset_load(self.short(), "only base64 data URIs are supported"))?;
        let bytes = BASE64
            .decode(payload)
            .map_err(|err| SphereError::asset_load(self.short(), err))?;
        Ok((mime.to_string(), bytes))
    }

    /// Shortened form for logs; data URIs can be megabytes long.
    pub fn short(&self) -> String {
        if self.is_data_uri() {
            let header = self.0.split(',').next().unwrap_or("data:");
            format!("{header},<{} bytes>", self.0.len())
        } else {
            self.0.clone()
        }
    }
}

impl fmt::Display for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short())
    }
}

impl From<&str> for AssetRef {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for AssetRef {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Raw content of a loaded asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedAsset {
    pub source: AssetRef,
    pub mime: Option<String>,
    pub bytes: Vec<u8>,
}

/// Seam for anything that fetches image, audio or model data.
pub trait AssetLoader {
    fn load(&mut self, asset: &AssetRef) -> Result<LoadedAsset>;
}

/// Resolves public paths against a directory on disk and decodes data URIs
/// in memory.
#[derive(Debug, Clone)]
pub struct FsAssetLoader {
    root: PathBuf,
}

impl FsAssetLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, public_path: &str) -> PathBuf {
        self.root.join(public_path.trim_start_matches('/'))
    }
}

impl AssetLoader for FsAssetLoader {
    fn load(&mut self, asset: &AssetRef) -> Result<LoadedAsset> {
        if asset.is_data_uri() {
            let (mime, bytes) = asset.decode_data_uri()?;
            return Ok(LoadedAsset {
                source: asset.clone(),
                mime: Some(mime),
                bytes,
            });
        }

        let path = self.resolve(asset.as_str());
        let bytes =
            std::fs::read(&path).map_err(|err| SphereError::asset_load(asset.as_str(), err))?;
        tracing::debug!(asset = %asset, bytes = bytes.len(), "loaded asset from disk");
        Ok(LoadedAsset {
            source: asset.clone(),
            mime: None,
            bytes,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetKind {
    Video,
    Image,
    Model,
}

/// Registry of the public assets the experience references.
#[derive(Debug, Default)]
pub struct AssetStore {
    assets: HashMap<String, AssetKind>,
}

impl AssetStore {
    pub fn new() -> Self {
        Self {
            assets: HashMap::new(),
        }
    }

    /// Registers every video, the pedestal model and the fallback images.
    pub fn for_experience(registry: &SceneRegistry, pillars: &PillarConfig) -> Self {
        let mut store = Self::new();
        for scene in registry.scenes() {
            store.register(AssetKind::Video, &scene.video_src);
        }
        store.register(AssetKind::Model, &pillars.pedestal_model);
        for image in &pillars.fallback_images {
            store.register(AssetKind::Image, image);
        }
        store
    }

    pub fn register(&mut self, kind: AssetKind, path: &str) {
        self.assets.insert(path.to_string(), kind);
    }

    pub fn kind(&self, path: &str) -> Option<AssetKind> {
        self.assets.get(path).copied()
    }

    /// Registered assets that are missing under `loader`'s root, sorted.
    pub fn missing_on_disk(&self, loader: &FsAssetLoader) -> Vec<String> {
        let mut missing: Vec<String> = self
            .assets
            .keys()
            .filter(|path| !loader.resolve(path).is_file())
            .cloned()
            .collect();
        missing.sort();
        missing
    }
}

/// One entry of the history panel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub title: Option<String>,
    pub text: Option<String>,
    pub timestamp: Option<String>,
}

impl HistoryEntry {
    fn from_value(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            return Self {
                text: Some(value.to_string()),
                ..Default::default()
            };
        };
        let string = |key: &str| {
            object.get(key).and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
        };
        Self {
            title: string("title"),
            text: string("description").or_else(|| string("text")),
            timestamp: string("timestamp"),
        }
    }

    /// Title shown in the panel, numbered from one when absent.
    pub fn display_title(&self, index: usize) -> String {
        self.title
            .clone()
            .unwrap_or_else(|| format!("Story {}", index + 1))
    }
}

/// Parses history content: a JSON array, a single JSON object, or free text.
pub fn parse_history(raw: &str) -> Vec<HistoryEntry> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Array(items)) => items.iter().map(HistoryEntry::from_value).collect(),
        Ok(value @ Value::Object(_)) => vec![HistoryEntry::from_value(&value)],
        _ => vec![HistoryEntry {
            text: Some(trimmed.to_string()),
            ..Default::default()
        }],
    }
}

/// Loads the history panel file. Read failures are logged and yield an
/// empty panel.
pub fn load_history(path: impl AsRef<Path>) -> Vec<HistoryEntry> {
    let path = path.as_ref();
    match std::fs::read_to_string(path) {
        Ok(raw) => parse_history(&raw),
        Err(err) => {
            tracing::warn!(?path, %err, "could not read history file");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_uri_decodes_back_to_bytes() {
        let asset = AssetRef::data_uri("audio/mp3", b"ID3 narration");
        assert!(asset.as_str().starts_with("data:audio/mp3;base64,"));

        let (mime, bytes) = asset.decode_data_uri().unwrap();
        assert_eq!(mime, "audio/mp3");
        assert_eq!(bytes, b"ID3 narration");
        assert!(asset.short().contains("bytes"));
    }

    #[test]
    fn rejects_non_base64_data_uri() {
        let asset = AssetRef::new("data:text/plain,hello");
        assert!(asset.decode_data_uri().is_err());
    }

    #[test]
    fn fs_loader_resolves_public_paths() {
        let root = std::env::temp_dir().join(format!("story-sphere-assets-{}", std::process::id()));
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("globe.svg"), b"<svg/>").unwrap();

        let mut loader = FsAssetLoader::new(&root);
        let loaded = loader.load(&AssetRef::new("/globe.svg")).unwrap();
        assert_eq!(loaded.bytes, b"<svg/>");

        let err = loader.load(&AssetRef::new("/missing.svg")).unwrap_err();
        assert!(format!("{err}").contains("/missing.svg"));

        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn store_knows_experience_assets() {
        let registry = SceneRegistry::standard();
        let store = AssetStore::for_experience(&registry, &PillarConfig::default());

        assert_eq!(store.kind("/romev2.mp4"), Some(AssetKind::Video));
        assert_eq!(store.kind("/globe.svg"), Some(AssetKind::Image));
        assert_eq!(
            store.kind("/pedestal/roman_pedestal.obj"),
            Some(AssetKind::Model)
        );
        assert_eq!(store.kind("/unknown.mp4"), None);
    }

    #[test]
    fn history_accepts_arrays_objects_and_text() {
        let entries = parse_history(
            r#"[{"title":"Caesar","description":"Crossing","timestamp":1700000000}, {"text":"t"}]"#,
        );
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].title.as_deref(), Some("Caesar"));
        assert_eq!(entries[0].timestamp.as_deref(), Some("1700000000"));
        assert_eq!(entries[1].display_title(1), "Story 2");

        let single = parse_history(r#"{"title":"Rome"}"#);
        assert_eq!(single.len(), 1);

        let text = parse_history("plain notes");
        assert_eq!(text[0].text.as_deref(), Some("plain notes"));

        assert!(parse_history("  ").is_empty());
        assert!(load_history("/no/such/history.txt").is_empty());
    }
}
