// ID resolver
//
// Maps a canonical catalog id onto a content source in two strictly
// sequential tiers: bridged lookup, then a plain `search(title, 1)` fallback.
// A stale mapping (no playable sources) is invalidated and re-resolved once.

use super::cache::{CacheError, IdMapping, MappingCache};
use super::matching::{best_match, dedup_candidates, normalize_media_type, MatchTarget};
use crate::extensions::source::ContentSource;
use crate::extensions::types::{CallOptions, SearchResult, VideoSources};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

/// Everything known about the item being resolved
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingRequest {
    pub canonical_id: String,
    pub title: String,
    pub english_title: Option<String>,
    pub year: Option<u32>,
    /// "anime" or "manga"
    pub media_type: String,
    /// Format hint such as "TV", "Movie", "Manhwa"
    pub format: Option<String>,
    #[serde(default)]
    pub alt_titles: Vec<String>,
    /// Total episodes or chapters according to the canonical catalog
    pub total_count: Option<u32>,
}

impl MappingRequest {
    pub fn new(canonical_id: &str, title: &str, media_type: &str) -> Self {
        Self {
            canonical_id: canonical_id.to_string(),
            title: title.to_string(),
            media_type: media_type.to_string(),
            ..Default::default()
        }
    }

    pub fn match_target(&self) -> MatchTarget<'_> {
        MatchTarget {
            title: &self.title,
            english_title: self.english_title.as_deref(),
            alt_titles: &self.alt_titles,
            year: self.year,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Outcome of a resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Found through the bridge
    Bridged(String),
    /// Found by the fallback search
    Searched(String),
    Unresolved,
}

impl Resolution {
    pub fn content_source_id(&self) -> Option<&str> {
        match self {
            Resolution::Bridged(id) | Resolution::Searched(id) => Some(id),
            Resolution::Unresolved => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, Resolution::Unresolved)
    }
}

/// The bridged-lookup tier
pub trait BridgeLookup: Send + Sync {
    fn lookup(&self, request: &MappingRequest) -> impl Future<Output = Result<Option<String>, ResolveError>> + Send;

    /// Record a mapping found outside the bridge
    fn remember(
        &self,
        request: &MappingRequest,
        content_source_id: &str,
    ) -> impl Future<Output = Result<(), ResolveError>> + Send;

    fn invalidate(&self, request: &MappingRequest) -> impl Future<Output = Result<(), ResolveError>> + Send;
}

/// Cache-backed bridge, optionally with title matching on cache miss
pub struct CachedBridge<C: MappingCache> {
    cache: C,
    matcher: Option<(Arc<dyn ContentSource>, CallOptions)>,
}

impl<C: MappingCache> CachedBridge<C> {
    /// Only answer from the cache
    pub fn cache_only(cache: C) -> Self {
        Self { cache, matcher: None }
    }

    /// On cache miss, search `source` for every known title and pick the best match
    pub fn with_matching(cache: C, source: Arc<dyn ContentSource>, opts: CallOptions) -> Self {
        Self {
            cache,
            matcher: Some((source, opts)),
        }
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }
}

/// Search every title variant and pick a candidate
fn match_candidates(source: &dyn ContentSource, request: &MappingRequest, opts: CallOptions) -> Option<(String, f64)> {
    let target = request.match_target();
    log::info!(
        "BRIDGE SEARCH for title='{}' | year={:?} | format={:?} | total={:?}",
        request.title,
        request.year,
        request.format,
        request.total_count
    );

    let mut candidates: Vec<SearchResult> = Vec::new();
    for query in target.search_queries() {
        let results = source.search(query, 1, opts).results;
        log::info!("BRIDGE QUERY '{}': got {} candidates", query, results.len());
        candidates.extend(results);
    }
    dedup_candidates(&mut candidates);

    // Prefer candidates of the same format, unless that leaves nothing
    if let Some(format) = request.format.as_deref().map(normalize_media_type).filter(|f| *f != "UNKNOWN") {
        let same_format: Vec<SearchResult> = candidates
            .iter()
            .filter(|c| {
                c.media_type
                    .as_deref()
                    .map(normalize_media_type)
                    .map_or(true, |m| m == "UNKNOWN" || m == format)
            })
            .cloned()
            .collect();
        if !same_format.is_empty() {
            candidates = same_format;
        }
    }

    log::info!("BRIDGE: {} unique candidates", candidates.len());
    best_match(&target, &candidates)
}

impl<C: MappingCache> BridgeLookup for CachedBridge<C> {
    async fn lookup(&self, request: &MappingRequest) -> Result<Option<String>, ResolveError> {
        if let Some(mapping) = self.cache.get(&request.canonical_id, &request.media_type).await? {
            return Ok(Some(mapping.content_source_id));
        }

        let (source, opts) = match &self.matcher {
            Some((source, opts)) => (source.clone(), *opts),
            None => return Ok(None),
        };

        let owned = request.clone();
        let matched = tokio::task::spawn_blocking(move || match_candidates(source.as_ref(), &owned, opts)).await?;

        match matched {
            Some((id, score)) => {
                let mapping = IdMapping::new(&request.canonical_id, &id, &request.media_type)
                    .with_match(&request.title, Some(score));
                self.cache.save(&mapping).await?;
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    async fn remember(&self, request: &MappingRequest, content_source_id: &str) -> Result<(), ResolveError> {
        let mapping = IdMapping::new(&request.canonical_id, content_source_id, &request.media_type)
            .with_match(&request.title, None);
        self.cache.save(&mapping).await?;
        Ok(())
    }

    async fn invalidate(&self, request: &MappingRequest) -> Result<(), ResolveError> {
        self.cache.delete(&request.canonical_id, &request.media_type).await?;
        Ok(())
    }
}

/// Sources fetched for a resolved item
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSources {
    pub resolution: Resolution,
    pub sources: VideoSources,
}

/// Canonical id -> content-source id, against one source
pub struct IdResolver<B: BridgeLookup> {
    bridge: B,
    source: Arc<dyn ContentSource>,
    opts: CallOptions,
}

impl<B: BridgeLookup> IdResolver<B> {
    pub fn new(bridge: B, source: Arc<dyn ContentSource>, opts: CallOptions) -> Self {
        Self { bridge, source, opts }
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    /// Bridged lookup first; only when it misses or fails, search by title.
    /// A legitimate no-match is `Resolution::Unresolved`, never an error.
    pub async fn resolve(&self, request: &MappingRequest) -> Result<Resolution, ResolveError> {
        match self.bridge.lookup(request).await {
            Ok(Some(id)) => {
                log::debug!("Bridged {} -> {}", request.canonical_id, id);
                return Ok(Resolution::Bridged(id));
            }
            Ok(None) => log::debug!("No bridged mapping for {}", request.canonical_id),
            Err(e) => log::warn!("Bridge lookup for {} failed, falling back to search: {}", request.canonical_id, e),
        }

        let found = self.search_first(&request.title).await?;

        match found {
            Some(id) => {
                log::info!("Resolved '{}' ({}) by search -> {}", request.title, request.canonical_id, id);
                if let Err(e) = self.bridge.remember(request, &id).await {
                    log::warn!("Failed to save mapping for {}: {}", request.canonical_id, e);
                }
                Ok(Resolution::Searched(id))
            }
            None => {
                log::warn!("Could not resolve '{}' ({})", request.title, request.canonical_id);
                Ok(Resolution::Unresolved)
            }
        }
    }

    async fn search_first(&self, title: &str) -> Result<Option<String>, ResolveError> {
        let source = self.source.clone();
        let title = title.to_string();
        let opts = self.opts;

        let results = tokio::task::spawn_blocking(move || source.search(&title, 1, opts)).await?;
        Ok(results.results.into_iter().next().map(|r| r.id))
    }

    async fn sources_for(&self, content_source_id: &str, number: &str) -> Result<VideoSources, ResolveError> {
        let source = self.source.clone();
        let episode_id = source.item_id(content_source_id, number);
        let opts = self.opts;

        Ok(tokio::task::spawn_blocking(move || source.get_sources(&episode_id, opts)).await?)
    }

    /// Resolve and fetch sources for episode `number`. When the mapping yields
    /// nothing playable it is invalidated and resolution runs exactly once more.
    ///
    /// Region-blocked or temporarily down episodes look the same as a stale
    /// mapping here, so they also cost one extra resolution.
    pub async fn fetch_sources(&self, request: &MappingRequest, number: &str) -> Result<ResolvedSources, ResolveError> {
        let resolution = self.resolve(request).await?;
        let id = match resolution.content_source_id() {
            Some(id) => id.to_string(),
            None => {
                return Ok(ResolvedSources {
                    resolution,
                    sources: VideoSources::none_found(),
                })
            }
        };

        let sources = self.sources_for(&id, number).await?;
        if sources.has_playable() {
            return Ok(ResolvedSources { resolution, sources });
        }

        log::warn!(
            "No playable sources for {} -> {}, invalidating mapping and retrying once",
            request.canonical_id,
            id
        );
        if let Err(e) = self.bridge.invalidate(request).await {
            log::warn!("Failed to invalidate mapping for {}: {}", request.canonical_id, e);
        }

        let retry = self.resolve(request).await?;
        match retry.content_source_id() {
            Some(retry_id) => {
                let retry_id = retry_id.to_string();
                let sources = self.sources_for(&retry_id, number).await?;
                Ok(ResolvedSources {
                    resolution: retry,
                    sources,
                })
            }
            None => Ok(ResolvedSources {
                resolution: retry,
                sources,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::cache::MemoryMappingCache;
    use crate::extensions::error::{ExtensionError, ExtensionResult};
    use crate::extensions::types::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Search returns `search_hits` in order; only ids in `playable` have streams
    struct CountingSource {
        search_hits: Vec<SearchResult>,
        playable: Vec<String>,
        searches: AtomicUsize,
        source_calls: AtomicUsize,
    }

    impl CountingSource {
        fn new(search_ids: &[&str], playable: &[&str]) -> Self {
            Self {
                search_hits: search_ids.iter().map(|id| hit(id, id, None)).collect(),
                playable: playable.iter().map(|s| s.to_string()).collect(),
                searches: AtomicUsize::new(0),
                source_calls: AtomicUsize::new(0),
            }
        }

        fn with_hits(hits: Vec<SearchResult>) -> Self {
            Self {
                search_hits: hits,
                playable: vec![],
                searches: AtomicUsize::new(0),
                source_calls: AtomicUsize::new(0),
            }
        }

        fn searches(&self) -> usize {
            self.searches.load(Ordering::SeqCst)
        }
    }

    fn hit(id: &str, title: &str, media_type: Option<&str>) -> SearchResult {
        SearchResult {
            id: id.to_string(),
            title: title.to_string(),
            cover_url: None,
            description: None,
            year: None,
            status: "Unknown".to_string(),
            rating: None,
            genres: vec![],
            latest_episode: None,
            latest_episode_date: None,
            available_episodes: None,
            media_type: media_type.map(str::to_string),
            alt_titles: vec![],
        }
    }

    impl ContentSource for CountingSource {
        fn descriptor(&self) -> SourceDescriptor {
            SourceDescriptor {
                name: "Counting".to_string(),
                version: "1.0.0".to_string(),
                extension_type: ExtensionType::Anime,
                language: "en".to_string(),
                base_url: "https://example.com".to_string(),
            }
        }

        fn search(&self, _query: &str, _page: u32, _opts: CallOptions) -> SearchResults {
            self.searches.fetch_add(1, Ordering::SeqCst);
            SearchResults {
                results: self.search_hits.clone(),
                has_next_page: false,
            }
        }

        fn discover(&self, _page: u32, _sort_type: &str, _genres: &[String], _opts: CallOptions) -> SearchResults {
            SearchResults::empty()
        }

        fn get_details(&self, id: &str, _opts: CallOptions) -> ExtensionResult<Details> {
            Err(ExtensionError::NotFound {
                id: id.to_string(),
                message: "no details".to_string(),
            })
        }

        fn get_sources(&self, episode_id: &str, _opts: CallOptions) -> VideoSources {
            self.source_calls.fetch_add(1, Ordering::SeqCst);
            let playable = self
                .playable
                .iter()
                .any(|id| episode_id.starts_with(&format!("{}::", id)));
            if !playable {
                return VideoSources::none_found();
            }
            VideoSources::from_sources(
                vec![VideoSource {
                    url: format!("https://cdn.example.com/{}.m3u8", episode_id),
                    quality: "1080p".to_string(),
                    source_type: "hls".to_string(),
                    server: "Default".to_string(),
                }],
                vec![],
            )
        }

        fn get_tags(&self, _page: u32, _opts: CallOptions) -> TagsResult {
            TagsResult::empty()
        }

        fn get_recommendations(&self, _opts: CallOptions) -> SearchResults {
            SearchResults::empty()
        }
    }

    fn request() -> MappingRequest {
        MappingRequest::new("38000", "Kimetsu no Yaiba", "anime")
    }

    fn seeded(id: &str) -> MemoryMappingCache {
        MemoryMappingCache::with_mappings([IdMapping::new("38000", id, "anime")])
    }

    /// Lookup that always fails
    struct BrokenBridge;

    impl BridgeLookup for BrokenBridge {
        async fn lookup(&self, _request: &MappingRequest) -> Result<Option<String>, ResolveError> {
            Err(ResolveError::Cache(CacheError::Poisoned))
        }

        async fn remember(&self, _request: &MappingRequest, _id: &str) -> Result<(), ResolveError> {
            Err(ResolveError::Cache(CacheError::Poisoned))
        }

        async fn invalidate(&self, _request: &MappingRequest) -> Result<(), ResolveError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_cache_hit_never_searches() {
        let source = Arc::new(CountingSource::new(&["other"], &[]));
        let resolver = IdResolver::new(CachedBridge::cache_only(seeded("cached")), source.clone(), CallOptions::default());

        let resolution = resolver.resolve(&request()).await.unwrap();

        assert_eq!(resolution, Resolution::Bridged("cached".to_string()));
        assert_eq!(source.searches(), 0);
    }

    #[tokio::test]
    async fn test_cache_miss_searches_once_and_remembers() {
        let source = Arc::new(CountingSource::new(&["first", "second"], &[]));
        let resolver = IdResolver::new(
            CachedBridge::cache_only(MemoryMappingCache::new()),
            source.clone(),
            CallOptions::default(),
        );

        let resolution = resolver.resolve(&request()).await.unwrap();

        assert_eq!(resolution, Resolution::Searched("first".to_string()));
        assert_eq!(source.searches(), 1);

        // Lazily created mapping answers the next call
        let again = resolver.resolve(&request()).await.unwrap();
        assert_eq!(again, Resolution::Bridged("first".to_string()));
        assert_eq!(source.searches(), 1);
    }

    #[tokio::test]
    async fn test_no_match_is_unresolved() {
        let source = Arc::new(CountingSource::new(&[], &[]));
        let resolver = IdResolver::new(
            CachedBridge::cache_only(MemoryMappingCache::new()),
            source.clone(),
            CallOptions::default(),
        );

        let resolution = resolver.resolve(&request()).await.unwrap();
        assert_eq!(resolution, Resolution::Unresolved);
        assert_eq!(source.searches(), 1);

        let fetched = resolver.fetch_sources(&request(), "1").await.unwrap();
        assert!(!fetched.resolution.is_resolved());
        assert!(!fetched.sources.has_playable());
    }

    #[tokio::test]
    async fn test_lookup_failure_falls_back_to_search() {
        let source = Arc::new(CountingSource::new(&["found"], &[]));
        let resolver = IdResolver::new(BrokenBridge, source.clone(), CallOptions::default());

        let resolution = resolver.resolve(&request()).await.unwrap();
        assert_eq!(resolution, Resolution::Searched("found".to_string()));
        assert_eq!(source.searches(), 1);
    }

    #[tokio::test]
    async fn test_stale_mapping_is_replaced() {
        let source = Arc::new(CountingSource::new(&["fresh"], &["fresh"]));
        let resolver = IdResolver::new(CachedBridge::cache_only(seeded("stale")), source.clone(), CallOptions::default());

        let fetched = resolver.fetch_sources(&request(), "3").await.unwrap();

        assert_eq!(fetched.resolution, Resolution::Searched("fresh".to_string()));
        assert!(fetched.sources.has_playable());
        assert_eq!(source.searches(), 1);

        let cached = resolver.bridge().cache().get("38000", "anime").await.unwrap().unwrap();
        assert_eq!(cached.content_source_id, "fresh");
    }

    #[tokio::test]
    async fn test_stale_retry_is_bounded() {
        // Search keeps returning the same dead id
        let source = Arc::new(CountingSource::new(&["dead"], &[]));
        let resolver = IdResolver::new(CachedBridge::cache_only(seeded("dead")), source.clone(), CallOptions::default());

        let fetched = resolver.fetch_sources(&request(), "1").await.unwrap();

        assert!(!fetched.sources.has_playable());
        assert_eq!(fetched.sources.sources[0].quality, VideoSources::NO_SOURCES);
        assert_eq!(source.searches(), 1);
        assert_eq!(source.source_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_playable_mapping_is_kept() {
        let source = Arc::new(CountingSource::new(&["other"], &["good"]));
        let resolver = IdResolver::new(CachedBridge::cache_only(seeded("good")), source.clone(), CallOptions::default());

        let fetched = resolver.fetch_sources(&request(), "1").await.unwrap();

        assert_eq!(fetched.resolution, Resolution::Bridged("good".to_string()));
        assert_eq!(source.searches(), 0);
    }

    #[tokio::test]
    async fn test_matching_bridge_saves_scored_mapping() {
        let source = Arc::new(CountingSource::with_hits(vec![
            hit("movie", "Demon Slayer", Some("Movie")),
            hit("tv", "Demon Slayer", Some("TV")),
        ]));
        let bridge = CachedBridge::with_matching(MemoryMappingCache::new(), source.clone(), CallOptions::default());

        let mut req = request();
        req.english_title = Some("Demon Slayer".to_string());
        req.format = Some("TV".to_string());

        assert_eq!(bridge.lookup(&req).await.unwrap(), Some("tv".to_string()));
        // English title and title are both searched
        assert_eq!(source.searches(), 2);

        let saved = bridge.cache().get("38000", "anime").await.unwrap().unwrap();
        assert_eq!(saved.match_score, Some(50.0));
        assert_eq!(saved.title.as_deref(), Some("Kimetsu no Yaiba"));
    }
}
