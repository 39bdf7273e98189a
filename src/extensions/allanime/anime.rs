// AllAnime anime source

use super::{AllAnimeClient, AllAnimeConfig};
use crate::extensions::cipher;
use crate::extensions::error::{ExtensionError, ExtensionResult};
use crate::extensions::fetch::FetchBridge;
use crate::extensions::graphql::{queries, QueryRegistry};
use crate::extensions::normalize::{
    coerce_u32, coerce_u64, first_non_empty, normalize_timestamp, parse_number,
    sort_ascending_by, split_composite_id, status_or_unknown,
};
use crate::extensions::schema::{CatalogRecord, EpisodeData, ShowData, ShowsData, SourceUrl};
use crate::extensions::source::ContentSource;
use crate::extensions::types::*;
use std::sync::Arc;

/// Anime catalog and stream resolution backed by AllAnime
pub struct AllAnimeSource {
    client: AllAnimeClient,
}

impl AllAnimeSource {
    pub fn new(bridge: Arc<dyn FetchBridge>) -> Self {
        Self::with_config(bridge, AllAnimeConfig::default(), QueryRegistry::default())
    }

    pub fn with_config(bridge: Arc<dyn FetchBridge>, config: AllAnimeConfig, registry: QueryRegistry) -> Self {
        Self {
            client: AllAnimeClient::new(bridge, config, registry),
        }
    }

    pub fn config(&self) -> &AllAnimeConfig {
        &self.client.config
    }

    fn search_shows(&self, search: serde_json::Value, page: u32) -> ExtensionResult<SearchResults> {
        let config = &self.client.config;
        let variables = serde_json::json!({
            "search": search,
            "limit": config.search_page_size,
            "page": page.max(1),
            "translationType": config.translation_type,
            "countryOrigin": config.country_origin
        });

        let data: Option<ShowsData> = self.client.graphql().execute(queries::SHOWS_SEARCH, variables)?;
        let edges: Vec<CatalogRecord> = data.and_then(|d| d.shows).map(|s| s.edges).unwrap_or_default();

        Ok(self
            .client
            .to_search_results(&edges, ExtensionType::Anime, config.search_page_size))
    }

    fn try_search(&self, query: &str, page: u32, opts: CallOptions) -> ExtensionResult<SearchResults> {
        self.search_shows(
            serde_json::json!({
                "allowAdult": opts.allow_adult,
                "allowUnknown": false,
                "query": query
            }),
            page,
        )
    }

    fn try_discover(
        &self,
        page: u32,
        sort_type: &str,
        genres: &[String],
        opts: CallOptions,
    ) -> ExtensionResult<SearchResults> {
        if !genres.is_empty() {
            return self.search_shows(
                serde_json::json!({
                    "allowAdult": opts.allow_adult,
                    "allowUnknown": false,
                    "genres": genres
                }),
                page,
            );
        }

        match sort_type {
            "latest" | "recent" | "update" => self.search_shows(
                serde_json::json!({
                    "allowAdult": opts.allow_adult,
                    "allowUnknown": false,
                    "sortBy": "Recent"
                }),
                page,
            ),
            _ => self
                .client
                .discover_popular(ExtensionType::Anime, page, sort_type, opts),
        }
    }

    fn try_details(&self, id: &str, opts: CallOptions) -> ExtensionResult<MediaDetails> {
        let data: Option<ShowData> = self
            .client
            .graphql()
            .execute(queries::SHOW_DETAILS, serde_json::json!({ "showId": id }))?;

        // Upstream answers null both for unknown ids and for adult-gated shows
        let show = data.and_then(|d| d.show).ok_or_else(|| ExtensionError::NotFound {
            id: id.to_string(),
            message: if opts.allow_adult {
                format!("Anime not found: {}", id)
            } else {
                format!(
                    "Anime not found: {}. It may be adult content; enable adult content to view it.",
                    id
                )
            },
        })?;

        Ok(self.to_details(id, &show))
    }

    fn to_details(&self, id: &str, show: &CatalogRecord) -> MediaDetails {
        let tt = self.client.config.translation_type.as_str();
        let cover_url = self.client.thumbnail(show.thumbnail.as_deref());

        let mut episodes: Vec<Episode> = show
            .episode_labels(tt)
            .into_iter()
            .filter_map(|label| {
                let number = parse_number(&label)?;
                Some(Episode {
                    id: self.item_id(id, &label),
                    number,
                    title: Some(format!("Episode {}", label)),
                    thumbnail: cover_url.clone(),
                })
            })
            .collect();
        sort_ascending_by(&mut episodes, |e| e.number);

        let episode_count = coerce_u32(&show.episode_count)
            .or_else(|| show.available_episode_count(tt))
            .or_else(|| u32::try_from(episodes.len()).ok().filter(|n| *n > 0));

        MediaDetails {
            id: id.to_string(),
            title: show.display_title(),
            english_name: first_non_empty(&[show.english_name.as_deref()]).map(str::to_string),
            native_name: first_non_empty(&[show.native_name.as_deref()]).map(str::to_string),
            cover_url,
            description: first_non_empty(&[show.description.as_deref()]).map(str::to_string),
            genres: show.genre_names(),
            status: status_or_unknown(show.status.as_deref()),
            year: show.year(),
            rating: show.rating(),
            episodes,
            media_type: show.kind.clone(),
            season: show.season(),
            episode_duration: coerce_u64(&show.episode_duration),
            episode_count,
            aired_start: show.aired_start(),
            last_update_end: normalize_timestamp(&show.last_update_end),
            broadcast_interval: coerce_u64(&show.broadcast_interval),
        }
    }

    fn try_sources(&self, episode_id: &str) -> ExtensionResult<VideoSources> {
        let composite =
            split_composite_id(episode_id).ok_or_else(|| ExtensionError::InvalidId(episode_id.to_string()))?;
        let config = &self.client.config;
        let translation = composite
            .translation
            .as_deref()
            .unwrap_or(config.translation_type.as_str());

        let data: Option<EpisodeData> = self.client.graphql().execute(
            queries::EPISODE_SOURCES,
            serde_json::json!({
                "showId": composite.parent_id,
                "translationType": translation,
                "episodeString": composite.number
            }),
        )?;

        let source_urls = data.and_then(|d| d.episode).map(|e| e.source_urls).unwrap_or_default();
        let sources = select_sources(source_urls, &config.base_origin, &config.dead_endpoints);

        log::info!("Episode {}: {} playable sources", episode_id, sources.len());

        Ok(VideoSources::from_sources(sources, Vec::new()))
    }
}

/// Order by priority (highest first), then drop iframe embeds, empty URLs and
/// dead endpoints. Obfuscated URLs are decoded along the way.
pub(crate) fn select_sources(mut source_urls: Vec<SourceUrl>, base_origin: &str, dead_endpoints: &[String]) -> Vec<VideoSource> {
    source_urls.sort_by(|a, b| b.priority().total_cmp(&a.priority()));

    source_urls
        .into_iter()
        .filter(|s| !s.is_iframe())
        .filter_map(|s| {
            let raw = first_non_empty(&[s.source_url.as_deref()])?;
            let url = cipher::resolve_source_url(raw, base_origin);
            if cipher::is_dead_endpoint(&url, dead_endpoints) {
                log::debug!("Dropping dead endpoint: {}", url);
                return None;
            }

            let name = first_non_empty(&[s.source_name.as_deref()]).unwrap_or("Default").to_string();
            let source_type = if url.contains(".m3u8") { "hls" } else { "mp4" };

            Some(VideoSource {
                url,
                quality: name.clone(),
                source_type: source_type.to_string(),
                server: name,
            })
        })
        .collect()
}

impl ContentSource for AllAnimeSource {
    fn descriptor(&self) -> SourceDescriptor {
        SourceDescriptor {
            name: "AllAnime".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            extension_type: ExtensionType::Anime,
            language: "en".to_string(),
            base_url: self.client.config.base_origin.clone(),
        }
    }

    fn search(&self, query: &str, page: u32, opts: CallOptions) -> SearchResults {
        self.try_search(query, page, opts).unwrap_or_else(|e| {
            log::error!("AllAnime search '{}' failed: {}", query, e);
            SearchResults::empty()
        })
    }

    fn discover(&self, page: u32, sort_type: &str, genres: &[String], opts: CallOptions) -> SearchResults {
        log::info!("Discover called: page={}, sort_type={}, genres={:?}", page, sort_type, genres);

        self.try_discover(page, sort_type, genres, opts).unwrap_or_else(|e| {
            log::error!("AllAnime discover failed: {}", e);
            SearchResults::empty()
        })
    }

    fn get_details(&self, id: &str, opts: CallOptions) -> ExtensionResult<Details> {
        self.try_details(id, opts).map(Details::Anime).map_err(|e| {
            log::error!("AllAnime details for {} failed: {}", id, e);
            e
        })
    }

    fn get_sources(&self, episode_id: &str, _opts: CallOptions) -> VideoSources {
        self.try_sources(episode_id).unwrap_or_else(|e| {
            log::error!("AllAnime sources for {} failed: {}", episode_id, e);
            VideoSources::error()
        })
    }

    fn get_tags(&self, page: u32, opts: CallOptions) -> TagsResult {
        self.client.tags(ExtensionType::Anime, page, opts).unwrap_or_else(|e| {
            log::error!("AllAnime tags failed: {}", e);
            TagsResult::empty()
        })
    }

    fn get_recommendations(&self, opts: CallOptions) -> SearchResults {
        self.client
            .recommendations(ExtensionType::Anime, opts)
            .unwrap_or_else(|e| {
                log::error!("AllAnime recommendations failed: {}", e);
                SearchResults::empty()
            })
    }
}
