// Source URL Cipher
//
// AllAnime hides some stream URLs behind a `--` prefix followed by hex pairs.
// Each pair maps through a fixed substitution table to one character; the
// table is not ASCII hex. Decoding is one-way.

use std::collections::HashMap;

/// Prefix marking an obfuscated source URL
pub const CIPHER_PREFIX: &str = "--";

const SUBSTITUTIONS: [(&str, char); 64] = [
    ("79", 'A'), ("7a", 'B'), ("7b", 'C'), ("7c", 'D'), ("7d", 'E'), ("7e", 'F'),
    ("7f", 'G'), ("70", 'H'), ("71", 'I'), ("72", 'J'), ("73", 'K'), ("74", 'L'),
    ("75", 'M'), ("76", 'N'), ("77", 'O'), ("68", 'P'), ("69", 'Q'), ("6a", 'R'),
    ("6b", 'S'), ("6c", 'T'), ("6d", 'U'), ("6e", 'V'), ("6f", 'W'), ("60", 'X'),
    ("61", 'Y'), ("62", 'Z'),
    ("59", 'a'), ("5a", 'b'), ("5b", 'c'), ("5c", 'd'), ("5d", 'e'), ("5e", 'f'),
    ("5f", 'g'), ("50", 'h'), ("51", 'i'), ("52", 'j'), ("53", 'k'), ("54", 'l'),
    ("55", 'm'), ("56", 'n'), ("57", 'o'), ("48", 'p'), ("49", 'q'), ("4a", 'r'),
    ("4b", 's'), ("4c", 't'), ("4d", 'u'), ("4e", 'v'), ("4f", 'w'), ("40", 'x'),
    ("41", 'y'), ("42", 'z'),
    ("08", '0'), ("09", '1'), ("0a", '2'), ("0b", '3'), ("0c", '4'), ("0d", '5'),
    ("0e", '6'), ("0f", '7'), ("00", '8'), ("01", '9'),
    ("15", '-'), ("16", '.'),
];

/// Punctuation beyond the 64 core symbols: URL delimiters and sub-delimiters
const URL_PUNCTUATION: [(&str, char); 20] = [
    ("67", '_'), ("46", '~'), ("02", ':'), ("17", '/'), ("07", '?'), ("1b", '#'),
    ("05", '='), ("1e", '&'), ("1d", '%'), ("13", '+'), ("14", ','), ("03", ';'),
    ("78", '@'), ("19", '!'), ("1c", '$'), ("10", '('), ("11", ')'), ("12", '*'),
    ("63", '['), ("65", ']'),
];

lazy_static::lazy_static! {
    static ref TABLE: HashMap<&'static str, char> = SUBSTITUTIONS
        .iter()
        .chain(URL_PUNCTUATION.iter())
        .copied()
        .collect();
}

/// Decode an obfuscated string. The `--` prefix is optional; groups missing
/// from the table are dropped.
pub fn decode(encoded: &str) -> String {
    let hex = encoded.strip_prefix(CIPHER_PREFIX).unwrap_or(encoded);
    let bytes = hex.as_bytes();

    bytes
        .chunks(2)
        .filter_map(|pair| std::str::from_utf8(pair).ok())
        .filter_map(|pair| TABLE.get(pair.to_ascii_lowercase().as_str()).copied())
        .collect()
}

pub fn is_obfuscated(url: &str) -> bool {
    url.starts_with(CIPHER_PREFIX)
}

pub fn is_absolute(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Turn a raw `sourceUrl` into a usable URL. Obfuscated values are decoded;
/// paths are joined onto `base_origin`.
pub fn resolve_source_url(raw: &str, base_origin: &str) -> String {
    let decoded = if is_obfuscated(raw) {
        decode(raw)
    } else {
        raw.to_string()
    };

    if is_absolute(&decoded) {
        return decoded;
    }

    let origin = base_origin.trim_end_matches('/');
    if decoded.starts_with('/') {
        format!("{}{}", origin, decoded)
    } else {
        format!("{}/{}", origin, decoded)
    }
}

/// True when `url` hits one of the known-dead endpoints
pub fn is_dead_endpoint(url: &str, dead_patterns: &[String]) -> bool {
    dead_patterns.iter().any(|p| !p.is_empty() && url.contains(p.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Inverse table lookup, only for building fixtures
    fn encode(plain: &str) -> String {
        let mut out = String::from(CIPHER_PREFIX);
        for c in plain.chars() {
            let (hex, _) = SUBSTITUTIONS
                .iter()
                .chain(URL_PUNCTUATION.iter())
                .find(|(_, ch)| *ch == c)
                .unwrap();
            out.push_str(hex);
        }
        out
    }

    #[test]
    fn test_decode_known_fixture() {
        let fixture = "--504c4c484b0217174f51405548165b5755174e17590916550b4d00";
        assert_eq!(decode(fixture), "https://wixmp.com/v/a1.m3u8");
        assert_eq!(encode("https://wixmp.com/v/a1.m3u8"), fixture);
    }

    #[test]
    fn test_decode_is_case_insensitive_and_drops_unknown_pairs() {
        assert_eq!(decode("--5A59"), "ba");
        assert_eq!(decode("--zz5a59"), "ba");
        // Trailing half pair is ignored
        assert_eq!(decode("--5a5"), "b");
    }

    #[test]
    fn test_every_entry_decodes_to_itself() {
        let plain: String = SUBSTITUTIONS.iter().map(|(_, c)| *c).collect();
        assert_eq!(decode(&encode(&plain)), plain);
        assert_eq!(SUBSTITUTIONS.len(), 64);
    }

    #[test]
    fn test_decode_url_sub_delimiters() {
        assert_eq!(
            decode("--504c4c484b02171759785b5c15161e1c10111207120567631465"),
            "https://a@cd-.&$()*?*=_[,]"
        );
        let plain = "https://user@host.example/p!$(a)*/[v1]";
        assert_eq!(decode(&encode(plain)), plain);
        assert_eq!(URL_PUNCTUATION.len(), 20);
    }

    #[test]
    fn test_resolve_path_and_absolute() {
        let path = encode("/apivtwo/clock?id=abc");
        assert_eq!(
            resolve_source_url(&path, "https://allanime.day/"),
            "https://allanime.day/apivtwo/clock?id=abc"
        );
        assert_eq!(
            resolve_source_url("https://cdn.example/x.mp4", "https://allanime.day"),
            "https://cdn.example/x.mp4"
        );
        assert_eq!(
            resolve_source_url("media/x.mp4", "https://allanime.day"),
            "https://allanime.day/media/x.mp4"
        );
    }

    #[test]
    fn test_dead_endpoint_filter() {
        let dead = vec!["/apivtwo/clock".to_string()];
        assert!(is_dead_endpoint("https://allanime.day/apivtwo/clock?id=1", &dead));
        assert!(!is_dead_endpoint("https://repackager.wixmp.com/a.mp4", &dead));
        assert!(!is_dead_endpoint("https://x", &[String::new()]));
    }
}
