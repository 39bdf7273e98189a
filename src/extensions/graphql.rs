// GraphQL Query Registry and Client
//
// Every upstream query is a named, versioned entry. Inline queries carry their
// full text; persisted queries carry only the SHA-256 hash the upstream knows
// them by. Rotating a hash is a registry update (see `QueryRegistry::merge_json`),
// not a code change.

use super::error::{ExtensionError, FetchError};
use super::fetch::{FetchBridge, FetchOptions};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Well-known query names
pub mod queries {
    pub const SHOWS_SEARCH: &str = "shows.search";
    pub const SHOW_DETAILS: &str = "show.details";
    pub const EPISODE_SOURCES: &str = "episode.sources";
    pub const POPULAR: &str = "popular";
    pub const TAGS: &str = "tags";
    pub const MANGAS_SEARCH: &str = "mangas.search";
    pub const MANGA_DETAILS: &str = "manga.details";
    pub const CHAPTER_PAGES: &str = "chapter.pages";
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
}

/// How a query is sent upstream
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum QueryKind {
    Inline {
        text: String,
        #[serde(default)]
        method: HttpMethod,
    },
    Persisted {
        #[serde(alias = "sha256Hash")]
        sha256_hash: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryDef {
    pub name: String,
    pub version: u32,
    #[serde(flatten)]
    pub kind: QueryKind,
}

impl QueryDef {
    pub fn inline(name: &str, method: HttpMethod, text: &str) -> Self {
        Self {
            name: name.to_string(),
            version: 1,
            kind: QueryKind::Inline {
                text: text.to_string(),
                method,
            },
        }
    }

    pub fn persisted(name: &str, sha256_hash: &str) -> Self {
        Self {
            name: name.to_string(),
            version: 1,
            kind: QueryKind::Persisted {
                sha256_hash: sha256_hash.to_string(),
            },
        }
    }
}

const SHOWS_SEARCH_GQL: &str = r#"query($search: SearchInput, $limit: Int, $page: Int, $translationType: VaildTranslationTypeEnumType, $countryOrigin: VaildCountryOriginEnumType) {
    shows(search: $search, limit: $limit, page: $page, translationType: $translationType, countryOrigin: $countryOrigin) {
        edges {
            _id
            name
            englishName
            nativeName
            thumbnail
            description
            availableEpisodes
            lastEpisodeInfo
            lastEpisodeDate
            airedStart
            type
            status
            score
            genres
            __typename
        }
    }
}"#;

const SHOW_DETAILS_GQL: &str = r#"query($showId: String!) {
    show(_id: $showId) {
        _id
        name
        englishName
        nativeName
        thumbnail
        description
        genres
        status
        score
        type
        season
        airedStart
        episodeDuration
        episodeCount
        availableEpisodesDetail
        lastUpdateEnd
        broadcastInterval
    }
}"#;

const EPISODE_SOURCES_GQL: &str = r#"query($showId: String!, $translationType: VaildTranslationTypeEnumType!, $episodeString: String!) {
    episode(showId: $showId, translationType: $translationType, episodeString: $episodeString) {
        episodeString
        sourceUrls
    }
}"#;

const POPULAR_GQL: &str = r#"query($type: VaildPopularTypeEnumType!, $size: Int!, $dateRange: Int, $page: Int, $allowAdult: Boolean, $allowUnknown: Boolean) {
    queryPopular(type: $type, size: $size, dateRange: $dateRange, page: $page, allowAdult: $allowAdult, allowUnknown: $allowUnknown) {
        total
        recommendations {
            anyCard {
                _id
                name
                englishName
                nativeName
                thumbnail
                description
                availableEpisodes
                availableChapters
                airedStart
                type
                status
                score
                genres
            }
        }
    }
}"#;

const TAGS_GQL: &str = r#"query($search: SearchInput, $page: Int, $limit: Int) {
    queryTags(search: $search, page: $page, limit: $limit) {
        edges {
            _id
            name
            slug
            tagType
            animeCount
            mangaCount
            thumbnail
        }
    }
}"#;

const MANGA_DETAILS_GQL: &str = r#"query($id: String!) {
    manga(_id: $id) {
        _id
        name
        englishName
        nativeName
        thumbnail
        description
        genres
        status
        score
        type
        airedStart
        availableChaptersDetail
    }
}"#;

const CHAPTER_PAGES_GQL: &str = r#"query($mangaId: String!, $translationType: VaildTranslationTypeEnumType!, $chapterString: String!) {
    chapterPages(mangaId: $mangaId, translationType: $translationType, chapterString: $chapterString) {
        edges {
            pictureUrls
            pictureUrlHead
            chapterString
        }
    }
}"#;

/// Persisted query hash for AllAnime manga search.
/// The `mangas` query does NOT accept inline GraphQL (returns 400).
/// If manga search breaks, update this hash from AllAnime's frontend JS.
const MANGAS_SEARCH_HASH: &str = "3a4b7e9ef62953484a05dd40f35b35b118ad2ff3d5e72d2add79bcaa663271e7";

/// Named, versioned GraphQL queries
#[derive(Debug, Clone)]
pub struct QueryRegistry {
    queries: HashMap<String, QueryDef>,
}

impl Default for QueryRegistry {
    fn default() -> Self {
        DEFAULT_REGISTRY.clone()
    }
}

lazy_static::lazy_static! {
    static ref DEFAULT_REGISTRY: QueryRegistry = QueryRegistry::builtin();
}

impl QueryRegistry {
    pub fn empty() -> Self {
        Self {
            queries: HashMap::new(),
        }
    }

    fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.insert(QueryDef::inline(queries::SHOWS_SEARCH, HttpMethod::Get, SHOWS_SEARCH_GQL));
        registry.insert(QueryDef::inline(queries::SHOW_DETAILS, HttpMethod::Post, SHOW_DETAILS_GQL));
        registry.insert(QueryDef::inline(
            queries::EPISODE_SOURCES,
            HttpMethod::Post,
            EPISODE_SOURCES_GQL,
        ));
        registry.insert(QueryDef::inline(queries::POPULAR, HttpMethod::Post, POPULAR_GQL));
        registry.insert(QueryDef::inline(queries::TAGS, HttpMethod::Post, TAGS_GQL));
        registry.insert(QueryDef::persisted(queries::MANGAS_SEARCH, MANGAS_SEARCH_HASH));
        registry.insert(QueryDef::inline(queries::MANGA_DETAILS, HttpMethod::Post, MANGA_DETAILS_GQL));
        registry.insert(QueryDef::inline(queries::CHAPTER_PAGES, HttpMethod::Post, CHAPTER_PAGES_GQL));
        registry
    }

    /// Insert a query, replacing any entry with the same name
    pub fn insert(&mut self, def: QueryDef) {
        self.queries.insert(def.name.clone(), def);
    }

    pub fn get(&self, name: &str) -> Option<&QueryDef> {
        self.queries.get(name)
    }

    /// Merge a JSON array of query definitions. An entry only replaces an
    /// existing one when its version is at least as new. Returns how many
    /// entries were applied.
    pub fn merge_json(&mut self, json: &str) -> Result<usize, serde_json::Error> {
        let defs: Vec<QueryDef> = serde_json::from_str(json)?;
        let mut applied = 0;
        for def in defs {
            let newer = self
                .queries
                .get(&def.name)
                .map_or(true, |existing| def.version >= existing.version);
            if newer {
                log::info!("Query registry: {} -> v{}", def.name, def.version);
                self.insert(def);
                applied += 1;
            } else {
                log::warn!("Query registry: ignoring stale {} v{}", def.name, def.version);
            }
        }
        Ok(applied)
    }
}

/// Standard GraphQL-over-HTTP response envelope
#[derive(Debug, Deserialize)]
pub struct GraphQlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
pub struct GraphQlError {
    #[serde(default)]
    pub message: String,
}

/// Upstream endpoint and the headers it expects on every request
#[derive(Debug, Clone)]
pub struct Endpoint<'a> {
    pub url: &'a str,
    pub referer: &'a str,
    pub origin: &'a str,
    pub user_agent: &'a str,
}

/// Builds and sends registry queries through a fetch bridge
pub struct GraphQlClient<'a> {
    bridge: &'a dyn FetchBridge,
    registry: &'a QueryRegistry,
    endpoint: Endpoint<'a>,
}

impl<'a> GraphQlClient<'a> {
    pub fn new(bridge: &'a dyn FetchBridge, registry: &'a QueryRegistry, endpoint: Endpoint<'a>) -> Self {
        Self {
            bridge,
            registry,
            endpoint,
        }
    }

    fn base_options(&self) -> FetchOptions {
        FetchOptions::get()
            .header("Referer", self.endpoint.referer)
            .header("Origin", self.endpoint.origin)
            .header("User-Agent", self.endpoint.user_agent)
    }

    /// URL and options for running `def` with `variables`
    pub fn build_request(&self, def: &QueryDef, variables: &Value) -> Result<(String, FetchOptions), ExtensionError> {
        let variables_str = serde_json::to_string(variables)?;

        match def.kind {
            QueryKind::Persisted { ref sha256_hash } => {
                let extensions = serde_json::json!({
                    "persistedQuery": {
                        "version": 1,
                        "sha256Hash": sha256_hash
                    }
                });
                let extensions_str = serde_json::to_string(&extensions)?;
                let url = format!(
                    "{}?variables={}&extensions={}",
                    self.endpoint.url,
                    urlencoding::encode(&variables_str),
                    urlencoding::encode(&extensions_str)
                );
                Ok((url, self.base_options()))
            }
            QueryKind::Inline {
                ref text,
                method: HttpMethod::Get,
            } => {
                let url = format!(
                    "{}?variables={}&query={}",
                    self.endpoint.url,
                    urlencoding::encode(&variables_str),
                    urlencoding::encode(text)
                );
                Ok((url, self.base_options()))
            }
            QueryKind::Inline {
                ref text,
                method: HttpMethod::Post,
            } => {
                let body = serde_json::to_string(&serde_json::json!({
                    "query": text,
                    "variables": variables,
                }))?;
                let mut options = self.base_options().header("Content-Type", "application/json");
                options.method = Some("POST".to_string());
                options.body = Some(body);
                Ok((self.endpoint.url.to_string(), options))
            }
        }
    }

    /// Run a named query and return its `data` payload, if any
    pub fn execute<T: DeserializeOwned>(&self, name: &str, variables: Value) -> Result<Option<T>, ExtensionError> {
        let def = self
            .registry
            .get(name)
            .ok_or_else(|| ExtensionError::MalformedResponse(format!("Unknown query '{}'", name)))?;

        let (url, options) = self.build_request(def, &variables)?;
        let response = self.bridge.fetch(&url, &options)?;
        if !(200..300).contains(&response.status) {
            log::error!("{} returned HTTP {}", def.name, response.status);
            return Err(FetchError::Status {
                status: response.status,
                url,
            }
            .into());
        }

        let parsed: GraphQlResponse<T> = serde_json::from_str(&response.body)?;
        for error in &parsed.errors {
            log::warn!("GraphQL error from {} (v{}): {}", def.name, def.version, error.message);
        }

        Ok(parsed.data)
    }
}
