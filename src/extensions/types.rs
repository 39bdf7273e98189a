// Extension System Data Types
//
// Normalized shapes every content source returns, plus the metadata the host
// keeps about a loaded source. Field names serialize in snake_case; the
// camelCase names used by JavaScript extensions are accepted as aliases.

use serde::{Deserialize, Serialize};

/// Type of content the extension provides
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ExtensionType {
    Anime,
    Manga,
}

impl ExtensionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtensionType::Anime => "anime",
            ExtensionType::Manga => "manga",
        }
    }
}

impl std::fmt::Display for ExtensionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a content source describes itself. Carries no handle: the host assigns
/// one on load and the source never sees it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceDescriptor {
    pub name: String,
    pub version: String,
    #[serde(rename = "type")]
    pub extension_type: ExtensionType,
    pub language: String,
    #[serde(alias = "baseUrl")]
    pub base_url: String,
}

/// Extension metadata, as held by the host for a loaded source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtensionMetadata {
    /// Opaque handle assigned on load
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(rename = "type")]
    pub extension_type: ExtensionType,
    pub language: String,
    #[serde(alias = "baseUrl")]
    pub base_url: String,
}

impl ExtensionMetadata {
    pub fn from_descriptor(id: String, descriptor: &SourceDescriptor) -> Self {
        Self {
            id,
            name: descriptor.name.clone(),
            version: descriptor.version.clone(),
            extension_type: descriptor.extension_type,
            language: descriptor.language.clone(),
            base_url: descriptor.base_url.clone(),
        }
    }
}

/// Per-call options supplied by the host.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallOptions {
    /// Request adult-gated content from upstream
    #[serde(alias = "allowAdult")]
    pub allow_adult: bool,
}

impl CallOptions {
    pub fn adult(allow_adult: bool) -> Self {
        Self { allow_adult }
    }
}

fn unknown_status() -> String {
    "Unknown".to_string()
}

/// Episode date information
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EpisodeDate {
    pub year: u32,
    pub month: u32, // 0-indexed (0 = January)
    pub date: u32,
}

/// Search result item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub id: String,
    pub title: String,
    #[serde(alias = "coverUrl")]
    pub cover_url: Option<String>,
    pub description: Option<String>,
    pub year: Option<u32>,
    #[serde(default = "unknown_status")]
    pub status: String,
    pub rating: Option<f32>,
    #[serde(default)]
    pub genres: Vec<String>,
    /// Latest episode number (for currently airing)
    #[serde(default, alias = "latestEpisode")]
    pub latest_episode: Option<u32>,
    /// Date of the latest episode release
    #[serde(default, alias = "latestEpisodeDate")]
    pub latest_episode_date: Option<EpisodeDate>,
    /// Total available episodes (sub)
    #[serde(default, alias = "availableEpisodes")]
    pub available_episodes: Option<u32>,
    /// Media type: TV, Movie, OVA, ONA, Special, Manga, ...
    #[serde(default, alias = "mediaType")]
    pub media_type: Option<String>,
    /// Romaji / native names besides `title`, used for ID matching
    #[serde(default, alias = "altTitles", skip_serializing_if = "Vec::is_empty")]
    pub alt_titles: Vec<String>,
}

/// Paginated search results
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchResults {
    pub results: Vec<SearchResult>,
    #[serde(alias = "hasNextPage")]
    pub has_next_page: bool,
}

impl SearchResults {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Episode information
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Episode {
    pub id: String,
    pub number: f32,
    pub title: Option<String>,
    pub thumbnail: Option<String>,
}

/// Season information
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Season {
    pub quarter: Option<String>,
    pub year: Option<u32>,
}

/// Aired start date
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AiredStart {
    pub year: u32,
    pub month: Option<u32>,
    pub date: Option<u32>,
}

/// Detailed media information
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaDetails {
    pub id: String,
    pub title: String,
    #[serde(alias = "englishName")]
    pub english_name: Option<String>,
    #[serde(alias = "nativeName")]
    pub native_name: Option<String>,
    #[serde(alias = "coverUrl")]
    pub cover_url: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default = "unknown_status")]
    pub status: String,
    pub year: Option<u32>,
    pub rating: Option<f32>,
    pub episodes: Vec<Episode>,
    #[serde(rename = "type")]
    pub media_type: Option<String>,
    pub season: Option<Season>,
    /// Episode duration in milliseconds
    #[serde(default, alias = "episodeDuration")]
    pub episode_duration: Option<u64>,
    #[serde(default, alias = "episodeCount")]
    pub episode_count: Option<u32>,
    #[serde(default, alias = "airedStart")]
    pub aired_start: Option<AiredStart>,
    /// RFC 3339 timestamp of last episode release
    #[serde(default, alias = "lastUpdateEnd")]
    pub last_update_end: Option<String>,
    /// Interval between episodes in milliseconds
    #[serde(default, alias = "broadcastInterval")]
    pub broadcast_interval: Option<u64>,
}

/// A playable stream
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoSource {
    pub url: String,
    pub quality: String,
    #[serde(rename = "type")]
    pub source_type: String, // "hls", "mp4", ...
    pub server: String,      // Server name (e.g., 'Wixmp', 'Default', etc.)
}

/// Subtitle track
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subtitle {
    pub url: String,
    pub language: String,
    pub label: String,
}

/// Video sources with subtitles.
///
/// `sources` is never empty: when nothing playable was found it holds one
/// sentinel entry with an empty `url`. Check [`VideoSources::has_playable`]
/// rather than the list length.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoSources {
    pub sources: Vec<VideoSource>,
    #[serde(default)]
    pub subtitles: Vec<Subtitle>,
}

impl VideoSources {
    pub const NO_SOURCES: &'static str = "No sources";
    pub const ERROR: &'static str = "Error";

    /// Single sentinel entry labelled `quality`
    pub fn sentinel(quality: &str) -> Self {
        Self {
            sources: vec![VideoSource {
                url: String::new(),
                quality: quality.to_string(),
                source_type: "hls".to_string(),
                server: "None".to_string(),
            }],
            subtitles: Vec::new(),
        }
    }

    pub fn none_found() -> Self {
        Self::sentinel(Self::NO_SOURCES)
    }

    pub fn error() -> Self {
        Self::sentinel(Self::ERROR)
    }

    /// Wrap real sources, falling back to the "No sources" sentinel when empty
    pub fn from_sources(sources: Vec<VideoSource>, subtitles: Vec<Subtitle>) -> Self {
        if sources.is_empty() {
            return Self::none_found();
        }
        Self { sources, subtitles }
    }

    pub fn has_playable(&self) -> bool {
        self.sources.iter().any(|s| !s.url.is_empty())
    }
}

/// Tag/Genre information
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tag {
    pub name: String,
    pub slug: String,
    pub count: u32,
    pub thumbnail: Option<String>,
}

/// Tags result containing genres and studios
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TagsResult {
    pub genres: Vec<Tag>,
    pub studios: Vec<Tag>,
    #[serde(alias = "hasNextPage")]
    pub has_next_page: bool,
}

impl TagsResult {
    pub fn empty() -> Self {
        Self::default()
    }
}

// ==================== Manga Types ====================

/// Chapter information for manga
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chapter {
    pub id: String,
    pub number: f32,
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    #[serde(default, alias = "releaseDate")]
    pub release_date: Option<String>,
}

/// Single page/image in a chapter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChapterImage {
    pub url: String,
    /// 1-based page number
    pub page: u32,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Collection of images for a chapter
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChapterImages {
    pub images: Vec<ChapterImage>,
    #[serde(alias = "totalPages")]
    pub total_pages: u32,
    pub title: Option<String>,
}

impl ChapterImages {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Manga details with chapters instead of episodes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MangaDetails {
    pub id: String,
    pub title: String,
    #[serde(alias = "englishName")]
    pub english_name: Option<String>,
    #[serde(alias = "nativeName")]
    pub native_name: Option<String>,
    #[serde(alias = "coverUrl")]
    pub cover_url: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default = "unknown_status")]
    pub status: String,
    pub year: Option<u32>,
    pub rating: Option<f32>,
    pub chapters: Vec<Chapter>,
    #[serde(rename = "type")]
    pub media_type: Option<String>,
    #[serde(default, alias = "totalChapters")]
    pub total_chapters: Option<u32>,
}

/// Result of `get_details`, shaped by the source type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Details {
    Anime(MediaDetails),
    Manga(MangaDetails),
}

impl Details {
    pub fn id(&self) -> &str {
        match self {
            Details::Anime(d) => &d.id,
            Details::Manga(d) => &d.id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Details::Anime(d) => &d.title,
            Details::Manga(d) => &d.title,
        }
    }

    pub fn into_anime(self) -> Option<MediaDetails> {
        match self {
            Details::Anime(d) => Some(d),
            Details::Manga(_) => None,
        }
    }

    pub fn into_manga(self) -> Option<MangaDetails> {
        match self {
            Details::Manga(d) => Some(d),
            Details::Anime(_) => None,
        }
    }
}
