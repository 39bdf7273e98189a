// Otaku content sources
//
// AllAnime anime and manga sources behind a common `ContentSource` trait, a
// QuickJS sandbox for third-party script extensions, and the bridge that maps
// canonical catalog ids onto content-source ids.
//
// The library never installs a logger; hosts wire up the `log` facade.

pub mod bridge;
pub mod extensions;

pub use bridge::{CachedBridge, IdResolver, MappingRequest, Resolution};
pub use extensions::{
  AllAnimeConfig, AllAnimeSource, AllMangaSource, CallOptions, ContentSource, ExtensionError, ExtensionRegistry,
  FetchBridge, ScriptSource, UreqFetchBridge,
};
