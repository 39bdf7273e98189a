// AllAnime Sources
//
// Built-in content sources for AllAnime's GraphQL API: one for anime, one for
// manga. Both share the connection settings, the query registry and the
// record/tag normalization below.

pub mod anime;
pub mod manga;

pub use anime::AllAnimeSource;
pub use manga::AllMangaSource;

use super::error::ExtensionResult;
use super::fetch::FetchBridge;
use super::graphql::{queries, Endpoint, GraphQlClient, QueryRegistry};
use super::normalize::{
    coerce_u32, first_non_empty, has_next_page, normalize_thumbnail, sort_by_rating_desc,
    status_or_unknown,
};
use super::schema::{CatalogRecord, PopularData, TagRecord, TagsData};
use super::types::{CallOptions, ExtensionType, SearchResult, SearchResults, Tag, TagsResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Sort key that switches discover to the widened, client-sorted popular feed
pub const SORT_BY_SCORE: &str = "score";

/// Connection and paging settings for the AllAnime sources
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AllAnimeConfig {
    pub api_url: String,
    pub referer: String,
    pub origin: String,
    pub user_agent: String,
    /// Origin prepended to decoded source paths
    pub base_origin: String,
    /// Origin prepended to relative thumbnails
    pub thumbnail_cdn: String,
    /// Origin prepended to relative manga pages without their own head
    pub page_cdn: String,
    pub search_page_size: u32,
    pub popular_page_size: u32,
    pub tags_page_size: u32,
    pub recommendations_size: u32,
    /// Popular window in days for the default discover feed
    pub trending_days: u32,
    /// Popular window in days when sorting by score
    pub score_days: u32,
    pub translation_type: String,
    pub country_origin: String,
    /// Source URLs containing any of these are dropped
    pub dead_endpoints: Vec<String>,
}

impl Default for AllAnimeConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.allanime.day/api".to_string(),
            referer: "https://allanime.to".to_string(),
            origin: "https://allanime.to".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/121.0"
                .to_string(),
            base_origin: "https://allanime.day".to_string(),
            thumbnail_cdn: "https://wp.youtube-anime.com/aln.youtube-anime.com".to_string(),
            page_cdn: "https://ytimgf.youtube-anime.com".to_string(),
            search_page_size: 26,
            popular_page_size: 26,
            tags_page_size: 30,
            recommendations_size: 20,
            trending_days: 1,
            score_days: 30,
            translation_type: "sub".to_string(),
            country_origin: "ALL".to_string(),
            dead_endpoints: vec!["/apivtwo/clock".to_string()],
        }
    }
}

impl AllAnimeConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Domains the sources need to reach, for a fetch allow-list
    pub fn domains(&self) -> Vec<String> {
        [&self.api_url, &self.base_origin]
            .iter()
            .filter_map(|u| url::Url::parse(u).ok())
            .filter_map(|u| u.host_str().map(str::to_string))
            .collect()
    }
}

/// Shared plumbing for both AllAnime sources
pub(crate) struct AllAnimeClient {
    bridge: Arc<dyn FetchBridge>,
    pub(crate) config: AllAnimeConfig,
    registry: QueryRegistry,
}

impl AllAnimeClient {
    pub(crate) fn new(bridge: Arc<dyn FetchBridge>, config: AllAnimeConfig, registry: QueryRegistry) -> Self {
        Self {
            bridge,
            config,
            registry,
        }
    }

    pub(crate) fn graphql(&self) -> GraphQlClient<'_> {
        GraphQlClient::new(
            self.bridge.as_ref(),
            &self.registry,
            Endpoint {
                url: &self.config.api_url,
                referer: &self.config.referer,
                origin: &self.config.origin,
                user_agent: &self.config.user_agent,
            },
        )
    }

    pub(crate) fn thumbnail(&self, raw: Option<&str>) -> Option<String> {
        normalize_thumbnail(raw, &self.config.thumbnail_cdn)
    }

    /// Normalize one catalog record; records without an id are dropped
    pub(crate) fn to_search_result(&self, record: &CatalogRecord, kind: ExtensionType) -> Option<SearchResult> {
        let id = record.record_id()?;
        let tt = self.config.translation_type.as_str();

        let (latest_episode, latest_episode_date, available) = match kind {
            ExtensionType::Anime => (
                record.latest_episode(tt),
                record.latest_episode_date(tt),
                record.available_episode_count(tt),
            ),
            ExtensionType::Manga => (None, None, record.available_chapter_count(tt)),
        };

        Some(SearchResult {
            id: id.to_string(),
            title: record.display_title(),
            cover_url: self.thumbnail(record.thumbnail.as_deref()),
            description: first_non_empty(&[record.description.as_deref()]).map(str::to_string),
            year: record.year(),
            status: status_or_unknown(record.status.as_deref()),
            rating: record.rating(),
            genres: record.genre_names(),
            latest_episode,
            latest_episode_date,
            available_episodes: available,
            media_type: record.kind.clone(),
            alt_titles: record.alt_titles(),
        })
    }

    pub(crate) fn to_search_results(&self, records: &[CatalogRecord], kind: ExtensionType, page_size: u32) -> SearchResults {
        let results: Vec<SearchResult> = records
            .iter()
            .filter_map(|r| self.to_search_result(r, kind))
            .collect();

        SearchResults {
            has_next_page: has_next_page(records.len(), page_size as usize),
            results,
        }
    }

    /// Upstream popular feed over the last `date_range` days
    pub(crate) fn popular(
        &self,
        kind: ExtensionType,
        page: u32,
        size: u32,
        date_range: u32,
        opts: CallOptions,
    ) -> ExtensionResult<Vec<CatalogRecord>> {
        let variables = serde_json::json!({
            "type": kind.as_str(),
            "size": size,
            "dateRange": date_range,
            "page": page.max(1),
            "allowAdult": opts.allow_adult,
            "allowUnknown": false
        });

        let data: Option<PopularData> = self.graphql().execute(queries::POPULAR, variables)?;

        Ok(data
            .and_then(|d| d.query_popular)
            .map(|p| p.recommendations)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|r| r.any_card)
            .collect())
    }

    /// Popular-feed discover. `score` widens the window and re-sorts by rating,
    /// since upstream does not sort by score itself.
    pub(crate) fn discover_popular(
        &self,
        kind: ExtensionType,
        page: u32,
        sort_type: &str,
        opts: CallOptions,
    ) -> ExtensionResult<SearchResults> {
        let by_score = sort_type == SORT_BY_SCORE;
        let days = if by_score {
            self.config.score_days
        } else {
            self.config.trending_days
        };
        let size = self.config.popular_page_size;

        let records = self.popular(kind, page, size, days, opts)?;
        let mut results = self.to_search_results(&records, kind, size);

        if by_score {
            sort_by_rating_desc(&mut results.results, |r| r.rating);
        }

        Ok(results)
    }

    pub(crate) fn recommendations(&self, kind: ExtensionType, opts: CallOptions) -> ExtensionResult<SearchResults> {
        let size = self.config.recommendations_size;
        let records = self.popular(kind, 1, size, 7, opts)?;
        let mut results = self.to_search_results(&records, kind, size);
        results.has_next_page = false;
        Ok(results)
    }

    /// One upstream tag list, split into genres and studios
    pub(crate) fn tags(&self, kind: ExtensionType, page: u32, opts: CallOptions) -> ExtensionResult<TagsResult> {
        let limit = self.config.tags_page_size;
        let variables = serde_json::json!({
            "search": {
                "allowAdult": opts.allow_adult,
                "isManga": kind == ExtensionType::Manga
            },
            "page": page.max(1),
            "limit": limit
        });

        let data: Option<TagsData> = self.graphql().execute(queries::TAGS, variables)?;
        let edges = data.and_then(|d| d.query_tags).map(|t| t.edges).unwrap_or_default();

        let (genres, studios) = partition_tags(&edges, kind, &self.config.thumbnail_cdn);

        Ok(TagsResult {
            genres,
            studios,
            has_next_page: has_next_page(edges.len(), limit as usize),
        })
    }
}

fn slugify(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Split tags by `tagType` and order each list by count, most popular first
pub(crate) fn partition_tags(edges: &[TagRecord], kind: ExtensionType, cdn: &str) -> (Vec<Tag>, Vec<Tag>) {
    let mut genres = Vec::new();
    let mut studios = Vec::new();

    for edge in edges {
        let name = match first_non_empty(&[edge.name.as_deref()]) {
            Some(n) => n,
            None => continue,
        };
        let count = match kind {
            ExtensionType::Anime => coerce_u32(&edge.anime_count),
            ExtensionType::Manga => coerce_u32(&edge.manga_count),
        }
        .unwrap_or(0);

        let tag = Tag {
            name: name.to_string(),
            slug: first_non_empty(&[edge.slug.as_deref()])
                .map(str::to_string)
                .unwrap_or_else(|| slugify(name)),
            count,
            thumbnail: normalize_thumbnail(edge.thumbnail.as_deref(), cdn),
        };

        match edge.tag_type.as_deref().map(str::to_lowercase).as_deref() {
            Some("genre") => genres.push(tag),
            Some("studio") => studios.push(tag),
            other => log::debug!("Skipping tag '{}' with type {:?}", name, other),
        }
    }

    genres.sort_by(|a, b| b.count.cmp(&a.count));
    studios.sort_by(|a, b| b.count.cmp(&a.count));

    (genres, studios)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_partition_tags_by_type_and_count() {
        let edges: Vec<TagRecord> = serde_json::from_value(json!([
            {"name": "Action", "tagType": "genre", "animeCount": 10, "mangaCount": 50},
            {"name": "MAPPA", "slug": "mappa", "tagType": "studio", "animeCount": 3},
            {"name": "Slice of Life", "tagType": "Genre", "animeCount": "42"},
            {"name": "Ufotable", "tagType": "studio", "animeCount": 7, "thumbnail": "studios/ufo.png"},
            {"name": "Mystery Tag", "tagType": "theme", "animeCount": 99},
            {"name": null, "tagType": "genre"}
        ]))
        .unwrap();

        let (genres, studios) = partition_tags(&edges, ExtensionType::Anime, "https://cdn.example");
        let genre_names: Vec<&str> = genres.iter().map(|t| t.name.as_str()).collect();
        let studio_names: Vec<&str> = studios.iter().map(|t| t.name.as_str()).collect();

        assert_eq!(genre_names, vec!["Slice of Life", "Action"]);
        assert_eq!(studio_names, vec!["Ufotable", "MAPPA"]);
        assert_eq!(genres[0].slug, "slice-of-life");
        assert_eq!(studios[0].thumbnail.as_deref(), Some("https://cdn.example/studios/ufo.png"));

        let (manga_genres, _) = partition_tags(&edges, ExtensionType::Manga, "https://cdn.example");
        assert_eq!(manga_genres[0].name, "Action");
    }

    #[test]
    fn test_config_partial_json_keeps_defaults() {
        let config = AllAnimeConfig::from_json(r#"{"search_page_size": 40, "translation_type": "dub"}"#).unwrap();
        assert_eq!(config.search_page_size, 40);
        assert_eq!(config.translation_type, "dub");
        assert_eq!(config.api_url, AllAnimeConfig::default().api_url);
        assert_eq!(config.domains(), vec!["api.allanime.day".to_string(), "allanime.day".to_string()]);
    }
}
