// Extension Registry
//
// Host-side ownership of loaded content sources. Loading assigns an opaque
// handle (a UUID) that the host uses for every later call; unloading drops the
// source. Sources themselves never see their handle.

use super::allanime::{AllAnimeConfig, AllAnimeSource, AllMangaSource};
use super::fetch::FetchBridge;
use super::graphql::QueryRegistry;
use super::runtime::ScriptSource;
use super::source::ContentSource;
use super::types::ExtensionMetadata;
use std::sync::{Arc, Mutex};

struct LoadedExtension {
    metadata: ExtensionMetadata,
    source: Arc<dyn ContentSource>,
}

/// Loaded extensions, keyed by handle
pub struct ExtensionRegistry {
    extensions: Mutex<Vec<LoadedExtension>>,
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self {
            extensions: Mutex::new(Vec::new()),
        }
    }

    /// Register a source and return its metadata with a fresh handle
    pub fn register(&self, source: Arc<dyn ContentSource>) -> Result<ExtensionMetadata, String> {
        let handle = uuid::Uuid::new_v4().to_string();
        let metadata = ExtensionMetadata::from_descriptor(handle, &source.descriptor());

        let mut extensions = self
            .extensions
            .lock()
            .map_err(|e| format!("Failed to lock extensions: {}", e))?;

        log::info!(
            "Loaded extension {} v{} ({}) as {}",
            metadata.name,
            metadata.version,
            metadata.extension_type,
            metadata.id
        );

        extensions.push(LoadedExtension {
            metadata: metadata.clone(),
            source,
        });

        Ok(metadata)
    }

    /// Register the built-in AllAnime anime and manga sources
    pub fn register_builtin(
        &self,
        bridge: Arc<dyn FetchBridge>,
        config: AllAnimeConfig,
        queries: QueryRegistry,
    ) -> Result<Vec<ExtensionMetadata>, String> {
        let anime = AllAnimeSource::with_config(bridge.clone(), config.clone(), queries.clone());
        let manga = AllMangaSource::with_config(bridge, config, queries);

        Ok(vec![self.register(Arc::new(anime))?, self.register(Arc::new(manga))?])
    }

    /// Load a JavaScript extension from source
    pub fn load_script(&self, code: &str, bridge: Arc<dyn FetchBridge>) -> Result<ExtensionMetadata, String> {
        let source =
            ScriptSource::from_code(code, bridge).map_err(|e| format!("Failed to parse extension: {}", e))?;
        self.register(Arc::new(source))
    }

    /// Drop a loaded extension. Returns false when the handle is unknown.
    pub fn unload(&self, extension_id: &str) -> Result<bool, String> {
        let mut extensions = self
            .extensions
            .lock()
            .map_err(|e| format!("Failed to lock extensions: {}", e))?;

        let before = extensions.len();
        extensions.retain(|ext| ext.metadata.id != extension_id);
        let removed = extensions.len() != before;

        if removed {
            log::info!("Unloaded extension {}", extension_id);
        }
        Ok(removed)
    }

    /// Source for a handle
    pub fn get(&self, extension_id: &str) -> Result<Arc<dyn ContentSource>, String> {
        let extensions = self
            .extensions
            .lock()
            .map_err(|e| format!("Failed to lock extensions: {}", e))?;

        extensions
            .iter()
            .find(|ext| ext.metadata.id == extension_id)
            .map(|ext| ext.source.clone())
            .ok_or_else(|| format!("Extension not found: {}", extension_id))
    }

    /// List all loaded extensions
    pub fn list(&self) -> Result<Vec<ExtensionMetadata>, String> {
        let extensions = self
            .extensions
            .lock()
            .map_err(|e| format!("Failed to lock extensions: {}", e))?;

        Ok(extensions.iter().map(|ext| ext.metadata.clone()).collect())
    }
}
