// Script extension loader
//
// Third-party extensions arrive as JavaScript source defining an
// `extensionObject` with metadata fields and the content-source methods.
// Metadata is read statically from the source so a broken script is rejected
// before it ever runs.

use super::fetch::is_url_allowed;
use super::types::{ExtensionType, SourceDescriptor};
use anyhow::{anyhow, Result};
use regex::Regex;

/// A validated, not-yet-running script extension
#[derive(Debug, Clone)]
pub struct ScriptExtension {
    pub descriptor: SourceDescriptor,
    pub code: String,
    pub allowed_domains: Vec<String>,
}

impl ScriptExtension {
    /// Load an extension from JavaScript code
    pub fn from_code(code: &str) -> Result<Self> {
        if !code.contains("extensionObject") {
            return Err(anyhow!("Extension must define `extensionObject`"));
        }

        let descriptor = Self::extract_descriptor(code)?;
        let allowed_domains = Self::extract_allowed_domains(code, &descriptor.base_url)?;

        Ok(Self {
            descriptor,
            code: code.to_string(),
            allowed_domains,
        })
    }

    fn capture(code: &str, field: &str) -> Result<Option<String>> {
        let re = Regex::new(&format!(r#"\b{}:\s*["']([^"']+)["']"#, regex::escape(field)))?;
        Ok(re
            .captures(code)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string()))
    }

    /// Extract extension metadata from JavaScript code
    fn extract_descriptor(code: &str) -> Result<SourceDescriptor> {
        let name = Self::capture(code, "name")?.ok_or_else(|| anyhow!("Missing extension name"))?;
        let version = Self::capture(code, "version")?.unwrap_or_else(|| "1.0.0".to_string());
        let language = Self::capture(code, "language")?.unwrap_or_else(|| "en".to_string());
        let base_url = Self::capture(code, "baseUrl")?.ok_or_else(|| anyhow!("Missing baseUrl"))?;

        let extension_type = match Self::capture(code, "type")?.as_deref() {
            Some("manga") => ExtensionType::Manga,
            _ => ExtensionType::Anime,
        };

        Ok(SourceDescriptor {
            name,
            version,
            extension_type,
            language,
            base_url,
        })
    }

    /// The base URL's host plus anything listed in `allowedDomains: [...]`
    fn extract_allowed_domains(code: &str, base_url: &str) -> Result<Vec<String>> {
        let mut domains = vec![];

        let url = url::Url::parse(base_url)?;
        if let Some(domain) = url.host_str() {
            domains.push(domain.to_string());
        }

        let list_re = Regex::new(r#"allowedDomains:\s*\[([^\]]*)\]"#)?;
        let item_re = Regex::new(r#"["']([^"']+)["']"#)?;
        if let Some(list) = list_re.captures(code).and_then(|c| c.get(1)) {
            for item in item_re.captures_iter(list.as_str()) {
                let domain = item[1].trim().to_string();
                if !domain.is_empty() && !domains.contains(&domain) {
                    domains.push(domain);
                }
            }
        }

        Ok(domains)
    }

    /// Validate if a URL is allowed for this extension
    pub fn is_url_allowed(&self, url: &str) -> bool {
        is_url_allowed(&self.allowed_domains, url)
    }
}
