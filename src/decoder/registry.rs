//! Format registry: maps a source to the plugin that can open it

use std::collections::HashMap;
use std::sync::Arc;

use super::{Reader, ReaderPlugin};
use crate::error::{Error, Result};
use crate::options::OptionsMap;
use crate::path::MediaPath;

/// Registered reader plugins, looked up by extension then by content sniff
#[derive(Clone, Default)]
pub struct FormatRegistry {
    plugins: Vec<Arc<dyn ReaderPlugin>>,
    by_extension: HashMap<String, usize>,
}

impl FormatRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every plugin compiled into this build
    pub fn with_default_plugins() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();
        #[cfg(feature = "ffmpeg")]
        registry.register(Arc::new(super::FFmpegPlugin::new()));
        log::debug!("Registered {} reader plugins", registry.len());
        registry
    }

    /// Register a plugin. Later registrations win on extension conflicts.
    pub fn register(&mut self, plugin: Arc<dyn ReaderPlugin>) {
        let index = self.plugins.len();
        for ext in plugin.extensions() {
            self.by_extension.insert(ext.to_ascii_lowercase(), index);
        }
        log::debug!(
            "Registered reader plugin {} ({})",
            plugin.name(),
            plugin.extensions().join(", ")
        );
        self.plugins.push(plugin);
    }

    /// Plugin that would open `path`
    pub fn plugin_for(&self, path: &MediaPath) -> Option<Arc<dyn ReaderPlugin>> {
        let by_ext = path
            .extension()
            .and_then(|ext| self.by_extension.get(&ext))
            .map(|&i| self.plugins[i].clone());
        by_ext.or_else(|| self.plugins.iter().find(|p| p.can_read(path)).cloned())
    }

    /// Open a reader for `path`.
    ///
    /// File sources are checked for existence and access first, so a
    /// missing file reports `FileNotFound` rather than `UnsupportedFormat`.
    pub fn open(&self, path: &MediaPath, init_options: &OptionsMap) -> Result<Box<dyn Reader>> {
        if let Some(file) = path.as_path() {
            std::fs::metadata(file).map_err(|e| Error::from_io(file, e))?;
        }
        let plugin = self
            .plugin_for(path)
            .ok_or_else(|| Error::UnsupportedFormat(path.to_string()))?;
        log::debug!("Opening {} with {}", path, plugin.name());
        plugin.open(path, init_options)
    }

    /// All registered extensions, sorted
    pub fn extensions(&self) -> Vec<String> {
        let mut exts: Vec<String> = self.by_extension.keys().cloned().collect();
        exts.sort();
        exts
    }

    /// Number of registered plugins
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Whether no plugin is registered
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}
