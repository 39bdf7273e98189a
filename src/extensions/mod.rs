// Extension System Module
//
// Handles:
// - The content-source contract and its two AllAnime implementations
// - JavaScript extensions sandboxed with QuickJS
// - The fetch bridge, the only network capability sources receive
// - Normalizing unstable upstream GraphQL responses
// - Extension loading and handle management

pub mod allanime;
pub mod cipher;
pub mod error;
pub mod extension;
pub mod fetch;
pub mod graphql;
pub mod normalize;
pub mod registry;
pub mod runtime;
pub mod schema;
pub mod source;
pub mod types;

pub use allanime::{AllAnimeConfig, AllAnimeSource, AllMangaSource};
pub use error::{ExtensionError, ExtensionResult, FetchError};
pub use extension::ScriptExtension;
pub use fetch::{FetchBridge, FetchOptions, FetchResponse, UreqFetchBridge};
pub use graphql::QueryRegistry;
pub use registry::ExtensionRegistry;
pub use runtime::ScriptSource;
pub use source::ContentSource;
pub use types::*;

#[cfg(test)]
pub(crate) mod test_support {
    use super::error::FetchError;
    use super::fetch::{FetchBridge, FetchOptions, FetchResponse};
    use std::sync::Mutex;

    /// Canned responses keyed by a substring of the URL or request body.
    /// Unmatched requests fail like a network error.
    pub struct StubBridge {
        routes: Vec<(String, u16, String)>,
        pub calls: Mutex<Vec<String>>,
    }

    impl StubBridge {
        pub fn new() -> Self {
            Self {
                routes: Vec::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn route(self, needle: &str, body: &str) -> Self {
            self.route_with_status(needle, 200, body)
        }

        pub fn route_with_status(mut self, needle: &str, status: u16, body: &str) -> Self {
            self.routes.push((needle.to_string(), status, body.to_string()));
            self
        }
    }

    impl FetchBridge for StubBridge {
        fn fetch(&self, url: &str, options: &FetchOptions) -> Result<FetchResponse, FetchError> {
            self.calls.lock().unwrap().push(url.to_string());
            let body = options.body.as_deref().unwrap_or_default();
            self.routes
                .iter()
                .find(|(needle, _, _)| url.contains(needle.as_str()) || body.contains(needle.as_str()))
                .map(|(_, status, response)| FetchResponse {
                    status: *status,
                    body: response.clone(),
                })
                .ok_or_else(|| FetchError::Transport(format!("no stub for {}", url)))
        }
    }
}
