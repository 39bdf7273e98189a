// ID Bridge Module
//
// Handles:
// - Canonical (MAL) id -> content-source id resolution
// - Mapping cache (in-memory or SQLite via sqlx)
// - Title matching across catalogs
// - One-shot re-resolution of stale mappings

pub mod cache;
pub mod matching;
pub mod resolver;

pub use cache::{CacheError, IdMapping, MappingCache, MemoryMappingCache, SqliteMappingCache};
pub use matching::{best_match, normalize_media_type, title_similarity, MatchTarget};
pub use resolver::{BridgeLookup, CachedBridge, IdResolver, MappingRequest, Resolution, ResolveError, ResolvedSources};
