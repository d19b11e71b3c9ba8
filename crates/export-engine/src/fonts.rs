//! Font resolution for text stages.
//!
//! A family name resolves to a font file the engine can load. Resolved fonts
//! are cached by normalized family name and written into the engine's input
//! space by the export service.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use framecut_common::config::FontConfig;
use framecut_common::error::{FramecutError, FramecutResult};
use framecut_common::ExportLogger;
use framecut_timeline::safe_file_stem;

/// Where font bytes come from.
#[async_trait::async_trait]
pub trait FontSource: Send + Sync {
    /// Fetch the font file for a logical family name.
    async fn fetch(&self, family: &str) -> FramecutResult<Vec<u8>>;
}

/// Fonts stored as `.ttf` files in one directory.
#[derive(Debug, Clone)]
pub struct DirectoryFontSource {
    root: PathBuf,
    files: HashMap<String, String>,
}

impl DirectoryFontSource {
    /// Source with the editor's stock family-to-file table.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let files = [
            ("Inter", "inter.ttf"),
            ("Roboto", "roboto.ttf"),
            ("Open Sans", "opensans.ttf"),
            ("Playfair Display", "playfair.ttf"),
            ("Comic Neue", "comicneue.ttf"),
            ("Arial", "arial.ttf"),
            ("Helvetica", "helvetica.ttf"),
            ("Times New Roman", "times.ttf"),
            ("Georgia", "georgia.ttf"),
        ]
        .into_iter()
        .map(|(family, file)| (family.to_string(), file.to_string()))
        .collect();

        Self {
            root: root.into(),
            files,
        }
    }

    pub fn from_config(config: &FontConfig) -> Self {
        Self::new(&config.dir)
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    /// File for `family`: the stock table first, then `<stem>.ttf`.
    fn file_for(&self, family: &str) -> String {
        self.files
            .get(family)
            .cloned()
            .unwrap_or_else(|| font_file_name(family))
    }
}

#[async_trait::async_trait]
impl FontSource for DirectoryFontSource {
    async fn fetch(&self, family: &str) -> FramecutResult<Vec<u8>> {
        let path = self.root.join(self.file_for(family));
        tokio::fs::read(&path).await.map_err(|e| {
            FramecutError::font(family, format!("failed to read {}: {e}", path.display()))
        })
    }
}

/// Fonts held in memory, keyed by family name.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFontSource {
    fonts: HashMap<String, Vec<u8>>,
}

impl InMemoryFontSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_font(mut self, family: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.fonts.insert(family.into(), bytes.into());
        self
    }
}

#[async_trait::async_trait]
impl FontSource for InMemoryFontSource {
    async fn fetch(&self, family: &str) -> FramecutResult<Vec<u8>> {
        self.fonts
            .get(family)
            .cloned()
            .ok_or_else(|| FramecutError::font(family, "not present in font set"))
    }
}

/// An engine-loadable font resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontHandle {
    /// Family that was actually loaded (the default after a fallback).
    pub family: String,
    /// File name inside the engine's input space.
    pub file_name: String,
}

/// Resolves family names to cached font resources.
pub struct FontManager {
    source: Arc<dyn FontSource>,
    default_family: String,
    logger: ExportLogger,
    loaded: BTreeMap<String, (FontHandle, Arc<[u8]>)>,
    /// Families that failed to load, mapped to the default they fell back to.
    fallbacks: HashMap<String, FontHandle>,
}

impl FontManager {
    pub fn new(
        source: Arc<dyn FontSource>,
        default_family: impl Into<String>,
        logger: ExportLogger,
    ) -> Self {
        Self {
            source,
            default_family: default_family.into(),
            logger,
            loaded: BTreeMap::new(),
            fallbacks: HashMap::new(),
        }
    }

    pub fn default_family(&self) -> &str {
        &self.default_family
    }

    /// Resolve `family`, falling back to the default family on failure.
    ///
    /// A failure of the default family itself is returned to the caller.
    pub async fn resolve(&mut self, family: &str) -> FramecutResult<FontHandle> {
        let key = normalize_family(family);
        if let Some(handle) = self.fallbacks.get(&key) {
            return Ok(handle.clone());
        }

        match self.load(family).await {
            Ok(handle) => Ok(handle),
            Err(err) if key != normalize_family(&self.default_family) => {
                self.logger
                    .warn(format!("Failed to load font {family}: {err}"));
                let fallback = self.default_family.clone();
                let handle = self.load(&fallback).await?;
                self.fallbacks.insert(key, handle.clone());
                Ok(handle)
            }
            Err(err) => {
                self.logger
                    .error(format!("Failed to load default font {family}: {err}"));
                Err(err)
            }
        }
    }

    /// Whether at least one font has ever been loaded.
    pub fn is_ready(&self) -> bool {
        !self.loaded.is_empty()
    }

    /// Every loaded font as `(file name, bytes)`, for writing into the engine.
    pub fn resources(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.loaded
            .values()
            .map(|(handle, bytes)| (handle.file_name.as_str(), &bytes[..]))
    }

    /// Forget every loaded font.
    pub fn clear(&mut self) {
        self.loaded.clear();
        self.fallbacks.clear();
    }

    async fn load(&mut self, family: &str) -> FramecutResult<FontHandle> {
        let key = normalize_family(family);
        if let Some((handle, _)) = self.loaded.get(&key) {
            return Ok(handle.clone());
        }

        self.logger.log(format!("Loading font: {family}"));
        let bytes = self.source.fetch(family).await?;
        if bytes.is_empty() {
            return Err(FramecutError::font(family, "font file is empty"));
        }

        let handle = FontHandle {
            family: family.to_string(),
            file_name: font_file_name(family),
        };
        self.loaded
            .insert(key, (handle.clone(), Arc::from(bytes)));
        self.logger
            .log(format!("Successfully loaded font: {family}"));
        Ok(handle)
    }
}

/// Cache key for a family name: `Open Sans` -> `open-sans`.
pub fn normalize_family(family: &str) -> String {
    family
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}

/// Engine-side file name for a family. Safe inside a `drawtext` argument and
/// as a plain file name.
pub fn font_file_name(family: &str) -> String {
    format!("{}.ttf", safe_file_stem(&normalize_family(family)))
}
