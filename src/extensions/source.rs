// Content Source Contract
//
// The fixed method set every extension exposes to the host. Built-in sources
// and script-backed extensions implement the same trait, so the host never
// needs to know which kind it is talking to.
//
// Every method except `get_details` returns its empty/sentinel shape on
// failure instead of an error.

use super::error::ExtensionResult;
use super::normalize::compose_id;
use super::types::*;

pub trait ContentSource: Send + Sync {
    /// Static description of the source (name, type, language, base URL)
    fn descriptor(&self) -> SourceDescriptor;

    /// Free-text search, 1-based page
    fn search(&self, query: &str, page: u32, opts: CallOptions) -> SearchResults;

    /// Browse by sort order, optionally filtered to `genres`
    fn discover(&self, page: u32, sort_type: &str, genres: &[String], opts: CallOptions) -> SearchResults;

    /// Full record for a content-source id. Fails when upstream has no record.
    fn get_details(&self, id: &str, opts: CallOptions) -> ExtensionResult<Details>;

    /// Playable streams for a composite episode id
    fn get_sources(&self, _episode_id: &str, _opts: CallOptions) -> VideoSources {
        VideoSources::none_found()
    }

    /// Page images for a composite chapter id
    fn get_chapter_images(&self, _chapter_id: &str, _opts: CallOptions) -> ChapterImages {
        ChapterImages::empty()
    }

    /// Genre and studio tags
    fn get_tags(&self, page: u32, opts: CallOptions) -> TagsResult;

    /// Single page of recommendations
    fn get_recommendations(&self, opts: CallOptions) -> SearchResults;

    /// Composite id for an episode or chapter of `parent_id`
    fn item_id(&self, parent_id: &str, number: &str) -> String {
        compose_id(parent_id, number)
    }
}
