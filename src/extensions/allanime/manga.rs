// AllAnime manga source (allmanga)

use super::{AllAnimeClient, AllAnimeConfig};
use crate::extensions::error::{ExtensionError, ExtensionResult};
use crate::extensions::fetch::FetchBridge;
use crate::extensions::graphql::{queries, QueryRegistry};
use crate::extensions::normalize::{
    coerce_u32, first_non_empty, normalize_thumbnail, parse_number, sort_ascending_by,
    split_composite_id, status_or_unknown,
};
use crate::extensions::schema::{CatalogRecord, ChapterPagesData, MangaData, MangasData, PageEdge};
use crate::extensions::source::ContentSource;
use crate::extensions::types::*;
use std::sync::Arc;

/// Manga catalog and page resolution backed by AllAnime
pub struct AllMangaSource {
    client: AllAnimeClient,
}

impl AllMangaSource {
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

    fn search_mangas(&self, mut search: serde_json::Value, page: u32, opts: CallOptions) -> ExtensionResult<SearchResults> {
        let config = &self.client.config;
        search["isManga"] = serde_json::json!(true);
        search["allowAdult"] = serde_json::json!(opts.allow_adult);
        search["allowUnknown"] = serde_json::json!(false);

        let variables = serde_json::json!({
            "search": search,
            "limit": config.search_page_size,
            "page": page.max(1),
            "translationType": config.translation_type,
            "countryOrigin": config.country_origin
        });

        let data: Option<MangasData> = self.client.graphql().execute(queries::MANGAS_SEARCH, variables)?;
        let edges: Vec<CatalogRecord> = data.and_then(|d| d.mangas).map(|m| m.edges).unwrap_or_default();

        Ok(self
            .client
            .to_search_results(&edges, ExtensionType::Manga, config.search_page_size))
    }

    fn try_discover(
        &self,
        page: u32,
        sort_type: &str,
        genres: &[String],
        opts: CallOptions,
    ) -> ExtensionResult<SearchResults> {
        if !genres.is_empty() {
            return self.search_mangas(serde_json::json!({ "genres": genres }), page, opts);
        }

        match sort_type {
            "latest" | "recent" | "update" => {
                self.search_mangas(serde_json::json!({ "sortBy": "Recent" }), page, opts)
            }
            _ => self
                .client
                .discover_popular(ExtensionType::Manga, page, sort_type, opts),
        }
    }

    fn try_details(&self, id: &str, opts: CallOptions) -> ExtensionResult<MangaDetails> {
        let data: Option<MangaData> = self
            .client
            .graphql()
            .execute(queries::MANGA_DETAILS, serde_json::json!({ "id": id }))?;

        // Upstream answers null both for unknown ids and for adult-gated titles
        let manga = data.and_then(|d| d.manga).ok_or_else(|| ExtensionError::NotFound {
            id: id.to_string(),
            message: if opts.allow_adult {
                format!("Manga not found: {}", id)
            } else {
                format!(
                    "Manga not found: {}. It may be adult content; enable adult content to view it.",
                    id
                )
            },
        })?;

        Ok(self.to_details(id, &manga))
    }

    fn to_details(&self, id: &str, manga: &CatalogRecord) -> MangaDetails {
        let tt = self.client.config.translation_type.as_str();

        let mut chapters: Vec<Chapter> = manga
            .chapter_labels(tt)
            .into_iter()
            .filter_map(|label| {
                let number = parse_number(&label)?;
                Some(Chapter {
                    id: self.item_id(id, &label),
                    number,
                    title: Some(format!("Chapter {}", label)),
                    thumbnail: None,
                    release_date: None,
                })
            })
            .collect();
        sort_ascending_by(&mut chapters, |c| c.number);

        let total_chapters = manga
            .available_chapter_count(tt)
            .or_else(|| u32::try_from(chapters.len()).ok().filter(|n| *n > 0));

        MangaDetails {
            id: id.to_string(),
            title: manga.display_title(),
            english_name: first_non_empty(&[manga.english_name.as_deref()]).map(str::to_string),
            native_name: first_non_empty(&[manga.native_name.as_deref()]).map(str::to_string),
            cover_url: self.client.thumbnail(manga.thumbnail.as_deref()),
            description: first_non_empty(&[manga.description.as_deref()]).map(str::to_string),
            genres: manga.genre_names(),
            status: status_or_unknown(manga.status.as_deref()),
            year: manga.year(),
            rating: manga.rating(),
            chapters,
            media_type: manga.kind.clone(),
            total_chapters,
        }
    }

    fn try_chapter_images(&self, chapter_id: &str) -> ExtensionResult<ChapterImages> {
        let composite =
            split_composite_id(chapter_id).ok_or_else(|| ExtensionError::InvalidId(chapter_id.to_string()))?;
        let config = &self.client.config;
        let translation = composite
            .translation
            .as_deref()
            .unwrap_or(config.translation_type.as_str());

        let data: Option<ChapterPagesData> = self.client.graphql().execute(
            queries::CHAPTER_PAGES,
            serde_json::json!({
                "mangaId": composite.parent_id,
                "translationType": translation,
                "chapterString": composite.number
            }),
        )?;

        let edges = data.and_then(|d| d.chapter_pages).map(|p| p.edges).unwrap_or_default();
        let images = collect_pages(&edges, &config.page_cdn);

        Ok(ChapterImages {
            total_pages: u32::try_from(images.len()).unwrap_or(u32::MAX),
            images,
            title: Some(format!("Chapter {}", composite.number)),
        })
    }
}

/// Pages from the server edge with the most pictures (first wins on ties).
/// Upstream `num` is 0-based; returned pages are 1-based and sorted.
pub(crate) fn collect_pages(edges: &[PageEdge], page_cdn: &str) -> Vec<ChapterImage> {
    let best = edges
        .iter()
        .fold(None::<&PageEdge>, |best, edge| match best {
            Some(b) if b.picture_urls.len() >= edge.picture_urls.len() => Some(b),
            _ => Some(edge),
        });

    let edge = match best {
        Some(e) => e,
        None => return Vec::new(),
    };

    let head = first_non_empty(&[edge.picture_url_head.as_deref()]).unwrap_or(page_cdn);

    let mut images: Vec<ChapterImage> = edge
        .picture_urls
        .iter()
        .enumerate()
        .filter_map(|(index, picture)| {
            let url = normalize_thumbnail(picture.url.as_deref(), head)?;
            let position = u32::try_from(index).ok()?;
            // Out-of-range `num` falls back to the position in the edge
            let page = coerce_u32(&picture.num)
                .and_then(|n| n.checked_add(1))
                .or_else(|| position.checked_add(1))?;
            Some(ChapterImage {
                url,
                page,
                width: None,
                height: None,
            })
        })
        .collect();

    images.sort_by_key(|i| i.page);
    images
}

impl ContentSource for AllMangaSource {
    fn descriptor(&self) -> SourceDescriptor {
        SourceDescriptor {
            name: "AllManga".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            extension_type: ExtensionType::Manga,
            language: "en".to_string(),
            base_url: self.client.config.base_origin.clone(),
        }
    }

    fn search(&self, query: &str, page: u32, opts: CallOptions) -> SearchResults {
        self.search_mangas(serde_json::json!({ "query": query }), page, opts)
            .unwrap_or_else(|e| {
                log::error!("AllManga search '{}' failed: {}", query, e);
                SearchResults::empty()
            })
    }

    fn discover(&self, page: u32, sort_type: &str, genres: &[String], opts: CallOptions) -> SearchResults {
        log::info!("Manga discover called: page={}, sort_type={}, genres={:?}", page, sort_type, genres);

        self.try_discover(page, sort_type, genres, opts).unwrap_or_else(|e| {
            log::error!("AllManga discover failed: {}", e);
            SearchResults::empty()
        })
    }

    fn get_details(&self, id: &str, opts: CallOptions) -> ExtensionResult<Details> {
        self.try_details(id, opts).map(Details::Manga).map_err(|e| {
            log::error!("AllManga details for {} failed: {}", id, e);
            e
        })
    }

    fn get_chapter_images(&self, chapter_id: &str, _opts: CallOptions) -> ChapterImages {
        self.try_chapter_images(chapter_id).unwrap_or_else(|e| {
            log::error!("AllManga pages for {} failed: {}", chapter_id, e);
            ChapterImages::empty()
        })
    }

    fn get_tags(&self, page: u32, opts: CallOptions) -> TagsResult {
        self.client.tags(ExtensionType::Manga, page, opts).unwrap_or_else(|e| {
            log::error!("AllManga tags failed: {}", e);
            TagsResult::empty()
        })
    }

    fn get_recommendations(&self, opts: CallOptions) -> SearchResults {
        self.client
            .recommendations(ExtensionType::Manga, opts)
            .unwrap_or_else(|e| {
                log::error!("AllManga recommendations failed: {}", e);
                SearchResults::empty()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collect_pages_picks_fullest_edge_and_sorts() {
        let edges: Vec<PageEdge> = serde_json::from_value(json!([
            {"pictureUrls": [{"url": "a/1.jpg", "num": 0}], "pictureUrlHead": "https://s1.example/"},
            {
                "pictureUrls": [
                    {"url": "b/3.jpg", "num": 2},
                    {"url": "https://abs.example/b/1.jpg", "num": 0},
                    {"url": "b/2.jpg", "num": "1"},
                    {"url": null, "num": 3}
                ],
                "pictureUrlHead": null
            }
        ]))
        .unwrap();

        let images = collect_pages(&edges, "https://ytimgf.youtube-anime.com");
        let pages: Vec<u32> = images.iter().map(|i| i.page).collect();
        assert_eq!(pages, vec![1, 2, 3]);
        assert_eq!(images[0].url, "https://abs.example/b/1.jpg");
        assert_eq!(images[1].url, "https://ytimgf.youtube-anime.com/b/2.jpg");
        assert!(images.iter().all(|i| i.width.is_none() && i.height.is_none()));
    }

    #[test]
    fn test_collect_pages_without_edges() {
        assert!(collect_pages(&[], "https://cdn.example").is_empty());
    }

    #[test]
    fn test_collect_pages_out_of_range_num() {
        let edges: Vec<PageEdge> = serde_json::from_value(json!([
            {
                "pictureUrlHead": "https://s1.example/",
                "pictureUrls": [
                    {"url": "a.jpg", "num": 4294967295u64},
                    {"url": "b.jpg", "num": 0}
                ]
            }
        ]))
        .unwrap();

        let pages = collect_pages(&edges, "https://cdn.example");
        let numbered: Vec<(u32, &str)> = pages.iter().map(|p| (p.page, p.url.as_str())).collect();
        assert_eq!(
            numbered,
            vec![(1, "https://s1.example/a.jpg"), (1, "https://s1.example/b.jpg")]
        );
        assert!(pages.iter().all(|p| p.page >= 1));
    }
}
