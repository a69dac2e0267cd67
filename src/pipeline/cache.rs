// src/pipeline/cache.rs

//! Transient artifact cache and the permanent artifact store.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::Result;

/// Hex content hash used to key artifacts.
pub fn content_hash(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// A fetched artifact after normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedImage {
    pub png: Vec<u8>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Converts fetched bytes into the form that is cached and classified.
pub trait ArtifactNormalizer: Send + Sync {
    fn normalize(&self, bytes: Vec<u8>) -> anyhow::Result<NormalizedImage>;
}

/// Keeps bytes as fetched. Dimensions are filled in for PNG input.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughNormalizer;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

impl ArtifactNormalizer for PassthroughNormalizer {
    fn normalize(&self, bytes: Vec<u8>) -> anyhow::Result<NormalizedImage> {
        anyhow::ensure!(!bytes.is_empty(), "empty image body");
        let (width, height) = png_dimensions(&bytes).unzip();
        Ok(NormalizedImage {
            png: bytes,
            width,
            height,
        })
    }
}

/// Width and height from a PNG's IHDR chunk.
pub fn png_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    if bytes.len() < 24 || bytes[..8] != PNG_SIGNATURE || &bytes[12..16] != b"IHDR" {
        return None;
    }
    let width = u32::from_be_bytes(bytes[16..20].try_into().ok()?);
    let height = u32::from_be_bytes(bytes[20..24].try_into().ok()?);
    Some((width, height))
}

/// Normalized artifacts keyed by the content hash of their source URL.
#[derive(Debug, Clone)]
pub struct ImageCache {
    dir: PathBuf,
}

impl ImageCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, url: &str) -> PathBuf {
        self.dir.join(format!("{}.png", content_hash(url.as_bytes())))
    }

    pub fn contains(&self, url: &str) -> bool {
        self.path_for(url).is_file()
    }

    pub fn store(&self, url: &str, png: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.path_for(url), png)?;
        Ok(())
    }

    pub fn read(&self, url: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.path_for(url))?)
    }

    /// Remove the whole cache directory. A missing directory is fine.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => {
                debug!(dir = %self.dir.display(), "image cache removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Metadata written next to every materialized artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Content hash of the stored image; also its directory name.
    pub hash: String,
}

/// Permanent store: `<dir>/<hash>/image.png` plus `<dir>/<hash>/meta.json`.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save(&self, url: &str, png: &[u8]) -> Result<ArtifactMeta> {
        let hash = content_hash(png);
        let (width, height) = png_dimensions(png).unzip();
        let dir = self.dir.join(&hash);
        fs::create_dir_all(&dir)?;

        let meta = ArtifactMeta {
            url: url.to_string(),
            width,
            height,
            hash,
        };

        fs::write(dir.join("image.png"), png)?;
        fs::write(dir.join("meta.json"), serde_json::to_string_pretty(&meta)?)?;

        debug!(url = %url, hash = %&meta.hash[..12], "artifact saved");
        Ok(meta)
    }

    pub fn load_meta(&self, hash: &str) -> Result<ArtifactMeta> {
        let raw = fs::read_to_string(self.dir.join(hash).join("meta.json"))?;
        Ok(serde_json::from_str(&raw)?)
    }
}
