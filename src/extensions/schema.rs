// Upstream Response Schemas
//
// AllAnime's GraphQL schema is not contractually stable, so every field here is
// optional. Volatile scalars (scores, counts, dates, episode maps) stay as raw
// `Value`s and are coerced through `normalize` when read. Explicit `null`s on
// list fields deserialize as empty lists. A mistyped string scalar reads as
// `None` and a malformed list element is skipped, so one bad record never
// rejects the whole response.

use super::normalize::{coerce_f32, coerce_u32, first_non_empty, string_list};
use super::types::{AiredStart, EpisodeDate, Season};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Any non-string reads as `None`
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

/// Ids and episode labels: numbers are stringified, anything else is `None`
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Elements that fail to deserialize are dropped; a non-array is empty
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let items = match Value::deserialize(deserializer)? {
        Value::Array(items) => items,
        _ => return Ok(Vec::new()),
    };
    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                log::debug!("Skipping malformed list element: {}", e);
                None
            }
        })
        .collect())
}

/// `{ edges: [...] }`
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
pub struct EdgeList<T> {
    #[serde(default = "Vec::new", deserialize_with = "lenient_list")]
    pub edges: Vec<T>,
}

impl<T> Default for EdgeList<T> {
    fn default() -> Self {
        Self { edges: Vec::new() }
    }
}

/// A show, manga or popular card. One shape serves every query since they
/// share field names.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CatalogRecord {
    #[serde(rename = "_id", deserialize_with = "string_or_number")]
    pub id: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub english_name: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub native_name: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub thumbnail: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub description: Option<String>,
    #[serde(rename = "type", deserialize_with = "lenient_string")]
    pub kind: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub status: Option<String>,
    pub score: Value,
    pub genres: Value,
    pub season: Value,
    pub aired_start: Value,
    pub available_episodes: Value,
    pub available_chapters: Value,
    pub available_episodes_detail: Value,
    pub available_chapters_detail: Value,
    pub last_episode_info: Value,
    pub last_episode_date: Value,
    pub episode_duration: Value,
    pub episode_count: Value,
    pub last_update_end: Value,
    pub broadcast_interval: Value,
}

impl CatalogRecord {
    /// Non-empty upstream id
    pub fn record_id(&self) -> Option<&str> {
        first_non_empty(&[self.id.as_deref()])
    }

    /// English name when present, otherwise the romaji name
    pub fn display_title(&self) -> String {
        first_non_empty(&[self.english_name.as_deref(), self.name.as_deref()])
            .unwrap_or("Unknown")
            .to_string()
    }

    /// Every other name the record is known by, deduplicated
    pub fn alt_titles(&self) -> Vec<String> {
        let title = self.display_title();
        let mut titles: Vec<String> = Vec::new();
        for candidate in [self.name.as_deref(), self.english_name.as_deref(), self.native_name.as_deref()] {
            if let Some(c) = first_non_empty(&[candidate]) {
                if c != title && !titles.iter().any(|t| t == c) {
                    titles.push(c.to_string());
                }
            }
        }
        titles
    }

    pub fn rating(&self) -> Option<f32> {
        coerce_f32(&self.score)
    }

    pub fn genre_names(&self) -> Vec<String> {
        string_list(&self.genres)
    }

    pub fn year(&self) -> Option<u32> {
        coerce_u32(&self.aired_start["year"]).filter(|y| *y > 0)
    }

    pub fn aired_start(&self) -> Option<AiredStart> {
        let year = self.year()?;
        Some(AiredStart {
            year,
            month: coerce_u32(&self.aired_start["month"]),
            date: coerce_u32(&self.aired_start["date"]),
        })
    }

    pub fn season(&self) -> Option<Season> {
        let quarter = self.season["quarter"].as_str().map(str::to_string);
        let year = coerce_u32(&self.season["year"]);
        if quarter.is_none() && year.is_none() {
            return None;
        }
        Some(Season { quarter, year })
    }

    /// Episode count for one translation, e.g. `available_count("sub")`
    pub fn available_episode_count(&self, translation: &str) -> Option<u32> {
        coerce_u32(&self.available_episodes[translation])
    }

    pub fn available_chapter_count(&self, translation: &str) -> Option<u32> {
        coerce_u32(&self.available_chapters[translation])
    }

    /// Episode labels (e.g. "12", "12.5") for one translation, unsorted
    pub fn episode_labels(&self, translation: &str) -> Vec<String> {
        string_list(&self.available_episodes_detail[translation])
    }

    pub fn chapter_labels(&self, translation: &str) -> Vec<String> {
        string_list(&self.available_chapters_detail[translation])
    }

    /// Latest released episode for one translation
    pub fn latest_episode(&self, translation: &str) -> Option<u32> {
        let label = &self.last_episode_info[translation]["episodeString"];
        coerce_u32(label)
    }

    pub fn latest_episode_date(&self, translation: &str) -> Option<EpisodeDate> {
        let date = &self.last_episode_date[translation];
        Some(EpisodeDate {
            year: coerce_u32(&date["year"]).filter(|y| *y > 0)?,
            month: coerce_u32(&date["month"])?,
            date: coerce_u32(&date["date"])?,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ShowsData {
    pub shows: Option<EdgeList<CatalogRecord>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MangasData {
    pub mangas: Option<EdgeList<CatalogRecord>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ShowData {
    pub show: Option<CatalogRecord>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MangaData {
    pub manga: Option<CatalogRecord>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PopularData {
    pub query_popular: Option<PopularPayload>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PopularPayload {
    pub total: Value,
    #[serde(deserialize_with = "lenient_list")]
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Recommendation {
    pub any_card: Option<CatalogRecord>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EpisodeData {
    pub episode: Option<EpisodePayload>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EpisodePayload {
    #[serde(deserialize_with = "string_or_number")]
    pub episode_string: Option<String>,
    #[serde(deserialize_with = "lenient_list")]
    pub source_urls: Vec<SourceUrl>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SourceUrl {
    #[serde(deserialize_with = "lenient_string")]
    pub source_url: Option<String>,
    pub priority: Value,
    #[serde(deserialize_with = "lenient_string")]
    pub source_name: Option<String>,
    #[serde(rename = "type", deserialize_with = "lenient_string")]
    pub kind: Option<String>,
}

impl SourceUrl {
    pub fn priority(&self) -> f32 {
        coerce_f32(&self.priority).unwrap_or(0.0)
    }

    pub fn is_iframe(&self) -> bool {
        self.kind
            .as_deref()
            .map_or(false, |k| k.eq_ignore_ascii_case("iframe"))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TagsData {
    pub query_tags: Option<EdgeList<TagRecord>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TagRecord {
    #[serde(deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub slug: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub tag_type: Option<String>,
    pub anime_count: Value,
    pub manga_count: Value,
    #[serde(deserialize_with = "lenient_string")]
    pub thumbnail: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChapterPagesData {
    pub chapter_pages: Option<EdgeList<PageEdge>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PageEdge {
    #[serde(deserialize_with = "lenient_list")]
    pub picture_urls: Vec<PictureUrl>,
    #[serde(deserialize_with = "lenient_string")]
    pub picture_url_head: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    pub chapter_string: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PictureUrl {
    #[serde(deserialize_with = "lenient_string")]
    pub url: Option<String>,
    pub num: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_catalog_record_tolerates_missing_and_null_fields() {
        let record: CatalogRecord = serde_json::from_value(json!({
            "_id": "abc",
            "name": "Kimetsu no Yaiba",
            "englishName": null,
            "genres": null,
            "score": "8.4",
            "airedStart": {"year": 2019, "month": 3, "date": 6},
            "availableEpisodes": {"sub": 26, "dub": null},
            "unknownField": {"whatever": true}
        }))
        .unwrap();

        assert_eq!(record.record_id(), Some("abc"));
        assert_eq!(record.display_title(), "Kimetsu no Yaiba");
        assert!(record.genre_names().is_empty());
        assert_eq!(record.rating(), Some(8.4));
        assert_eq!(record.year(), Some(2019));
        assert_eq!(record.available_episode_count("sub"), Some(26));
        assert_eq!(record.available_episode_count("dub"), None);
        assert_eq!(record.latest_episode_date("sub"), None);
        assert_eq!(record.season(), None);
    }

    #[test]
    fn test_alt_titles_exclude_display_title() {
        let record: CatalogRecord = serde_json::from_value(json!({
            "name": "Kimetsu no Yaiba",
            "englishName": "Demon Slayer",
            "nativeName": "鬼滅の刃"
        }))
        .unwrap();
        assert_eq!(record.display_title(), "Demon Slayer");
        assert_eq!(record.alt_titles(), vec!["Kimetsu no Yaiba".to_string(), "鬼滅の刃".to_string()]);
    }

    #[test]
    fn test_null_lists_become_empty() {
        let data: EpisodeData = serde_json::from_value(json!({
            "episode": {"episodeString": "1", "sourceUrls": null}
        }))
        .unwrap();
        assert!(data.episode.unwrap().source_urls.is_empty());

        let shows: ShowsData = serde_json::from_value(json!({"shows": {"edges": null}})).unwrap();
        assert!(shows.shows.unwrap().edges.is_empty());
    }

    #[test]
    fn test_mistyped_scalar_only_loses_that_field() {
        let shows: ShowsData = serde_json::from_value(json!({
            "shows": {
                "edges": [
                    {"_id": "a", "name": "Good A", "thumbnail": "a.jpg"},
                    {"_id": "b", "name": "Good B"},
                    {"_id": "c", "name": "Bad", "thumbnail": 12345, "englishName": {"x": 1}, "status": []}
                ]
            }
        }))
        .unwrap();

        let edges = shows.shows.unwrap().edges;
        assert_eq!(edges.len(), 3);
        assert_eq!(edges[2].record_id(), Some("c"));
        assert_eq!(edges[2].display_title(), "Bad");
        assert_eq!(edges[2].thumbnail, None);
        assert_eq!(edges[2].status, None);
    }

    #[test]
    fn test_malformed_list_elements_are_skipped() {
        let shows: ShowsData = serde_json::from_value(json!({
            "shows": {"edges": [{"_id": 42, "name": "Numeric id"}, "garbage", null, 7]}
        }))
        .unwrap();
        let edges = shows.shows.unwrap().edges;
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].record_id(), Some("42"));

        let data: EpisodeData = serde_json::from_value(json!({
            "episode": {
                "episodeString": 3,
                "sourceUrls": [
                    {"sourceUrl": ["not", "a", "string"], "priority": 1},
                    "junk",
                    {"sourceUrl": "https://ok.example/v.m3u8", "priority": "7"}
                ]
            }
        }))
        .unwrap();
        let episode = data.episode.unwrap();
        assert_eq!(episode.episode_string.as_deref(), Some("3"));
        assert_eq!(episode.source_urls.len(), 2);
        assert_eq!(episode.source_urls[0].source_url, None);
        assert_eq!(episode.source_urls[1].priority(), 7.0);

        let pages: ChapterPagesData = serde_json::from_value(json!({
            "chapterPages": {"edges": [{"pictureUrls": "nope", "pictureUrlHead": false}]}
        }))
        .unwrap();
        let edge = &pages.chapter_pages.unwrap().edges[0];
        assert!(edge.picture_urls.is_empty());
        assert_eq!(edge.picture_url_head, None);
    }
}
