// Title matching between the canonical catalog and a content source

use crate::extensions::types::SearchResult;
use std::collections::HashSet;

/// Minimum fuzzy score for a candidate to count as a match
pub const FUZZY_THRESHOLD: f64 = 5.0;
/// Added to the fuzzy score when release years agree
pub const YEAR_BONUS: f64 = 3.0;
/// Score recorded for an exact native-script title match
pub const NATIVE_EXACT_SCORE: f64 = 100.0;
/// Score recorded for an exact romaji/English title match
pub const TITLE_EXACT_SCORE: f64 = 50.0;

/// Compute a title similarity score (case-insensitive).
///
/// Returns 1.0 for exact matches, a length-ratio-scaled score for substring
/// containment (so short substrings inside long titles score low), and Jaccard
/// word similarity otherwise.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let a_lower = a.trim().to_lowercase();
    let b_lower = b.trim().to_lowercase();

    if a_lower == b_lower {
        return 1.0;
    }

    if a_lower.contains(&b_lower) || b_lower.contains(&a_lower) {
        let shorter = a_lower.len().min(b_lower.len()) as f64;
        let longer = a_lower.len().max(b_lower.len()) as f64;
        if longer > 0.0 {
            return 0.8 * (shorter / longer).sqrt();
        }
        return 0.8;
    }

    let a_words: HashSet<&str> = a_lower.split_whitespace().collect();
    let b_words: HashSet<&str> = b_lower.split_whitespace().collect();
    let intersection = a_words.intersection(&b_words).count() as f64;
    let union = a_words.union(&b_words).count() as f64;

    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// Normalize media type strings from both catalogs to a common form
/// (e.g. "TV" vs "TV Series").
pub fn normalize_media_type(raw: &str) -> &'static str {
    match raw.to_lowercase().trim() {
        "tv" | "tv series" | "tv_series" => "TV",
        "movie" | "film" => "MOVIE",
        "ova" | "oav" => "OVA",
        "ona" | "web" => "ONA",
        "special" | "sp" => "SPECIAL",
        "music" | "mv" => "MUSIC",
        "manga" => "MANGA",
        "novel" | "light novel" | "light_novel" | "lightnovel" => "NOVEL",
        "manhwa" => "MANHWA",
        "manhua" => "MANHUA",
        "one-shot" | "one_shot" | "oneshot" => "ONESHOT",
        "doujin" | "doujinshi" => "DOUJIN",
        _ => "UNKNOWN",
    }
}

/// Known titles of the item being resolved
#[derive(Debug, Clone, Default)]
pub struct MatchTarget<'a> {
    pub title: &'a str,
    pub english_title: Option<&'a str>,
    pub alt_titles: &'a [String],
    pub year: Option<u32>,
}

impl<'a> MatchTarget<'a> {
    /// Search queries in priority order: English title, title, then up to four
    /// alt titles, deduplicated case-insensitively
    pub fn search_queries(&self) -> Vec<&'a str> {
        let mut seen = HashSet::new();
        let mut queries = Vec::new();

        let primary = [self.english_title, Some(self.title)];
        let alts = self.alt_titles.iter().take(4).map(|s| Some(s.as_str()));

        for query in primary.into_iter().chain(alts).flatten() {
            let query = query.trim();
            if !query.is_empty() && seen.insert(query.to_lowercase()) {
                queries.push(query);
            }
        }
        queries
    }

    /// Every known title, lowercased and trimmed
    fn all_titles(&self) -> Vec<String> {
        let mut titles: Vec<String> = Vec::new();
        let candidates = [Some(self.title), self.english_title]
            .into_iter()
            .flatten()
            .chain(self.alt_titles.iter().map(String::as_str));

        for title in candidates {
            let t = title.trim().to_lowercase();
            if !t.is_empty() && !titles.contains(&t) {
                titles.push(t);
            }
        }
        titles
    }
}

fn is_native_script(title: &str) -> bool {
    !title.is_ascii()
}

/// Drop candidates whose id was already seen
pub fn dedup_candidates(candidates: &mut Vec<SearchResult>) {
    let mut seen_ids = HashSet::new();
    candidates.retain(|c| seen_ids.insert(c.id.clone()));
}

/// Pick the best candidate in three passes:
/// 1. exact native-script title match
/// 2. exact romaji/English title match
/// 3. fuzzy title similarity with a year bonus, above `FUZZY_THRESHOLD`
///
/// Returns the winning id and its score.
pub fn best_match(target: &MatchTarget<'_>, candidates: &[SearchResult]) -> Option<(String, f64)> {
    let known = target.all_titles();

    // Pass 1: exact native name
    for candidate in candidates {
        for alt in candidate.alt_titles.iter().filter(|a| is_native_script(a)) {
            let alt = alt.trim().to_lowercase();
            if !alt.is_empty() && known.contains(&alt) {
                log::info!(
                    "BRIDGE MATCH (native exact): '{}' native='{}' -> id={}",
                    candidate.title,
                    alt,
                    candidate.id
                );
                return Some((candidate.id.clone(), NATIVE_EXACT_SCORE));
            }
        }
    }

    // Pass 2: exact romaji or English name
    for candidate in candidates {
        let names = std::iter::once(&candidate.title).chain(candidate.alt_titles.iter());
        for name in names.filter(|n| !is_native_script(n)) {
            let name = name.trim().to_lowercase();
            if known.contains(&name) {
                log::info!("BRIDGE MATCH (title exact): '{}' -> id={}", name, candidate.id);
                return Some((candidate.id.clone(), TITLE_EXACT_SCORE));
            }
        }
    }

    // Pass 3: fuzzy fallback
    let queries: Vec<&str> = [Some(target.title), target.english_title].into_iter().flatten().collect();
    let mut best: Option<(String, f64)> = None;

    for candidate in candidates {
        let names = std::iter::once(&candidate.title).chain(candidate.alt_titles.iter());
        let mut score = names
            .flat_map(|name| queries.iter().map(move |q| title_similarity(name, q) * 10.0))
            .fold(0.0_f64, f64::max);

        if let (Some(candidate_year), Some(year)) = (candidate.year, target.year) {
            if candidate_year == year {
                score += YEAR_BONUS;
            }
        }

        log::debug!("BRIDGE FUZZY '{}' [{}]: score={:.1}", candidate.title, candidate.id, score);

        let dominated = best.as_ref().map_or(false, |(_, s)| score <= *s);
        if !dominated && score > FUZZY_THRESHOLD {
            best = Some((candidate.id.clone(), score));
        }
    }

    match &best {
        Some((id, score)) => log::info!("BRIDGE RESULT for '{}': winner='{}' score={:.1} (fuzzy)", target.title, id, score),
        None => log::warn!("BRIDGE RESULT for '{}': no match", target.title),
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, title: &str, alt_titles: &[&str], year: Option<u32>) -> SearchResult {
        SearchResult {
            id: id.to_string(),
            title: title.to_string(),
            cover_url: None,
            description: None,
            year,
            status: "Unknown".to_string(),
            rating: None,
            genres: vec![],
            latest_episode: None,
            latest_episode_date: None,
            available_episodes: None,
            media_type: None,
            alt_titles: alt_titles.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_title_similarity() {
        assert_eq!(title_similarity("Naruto", "naruto"), 1.0);
        // Short substring inside a long title scores low
        assert!(title_similarity("another", "in another world with my smartphone") < 0.5);
        assert!(title_similarity("naruto", "naruto shippuden") > 0.4);
        assert_eq!(title_similarity("one two", "three four"), 0.0);
    }

    #[test]
    fn test_normalize_media_type() {
        assert_eq!(normalize_media_type("TV Series"), "TV");
        assert_eq!(normalize_media_type("tv"), "TV");
        assert_eq!(normalize_media_type("Light Novel"), "NOVEL");
        assert_eq!(normalize_media_type("???"), "UNKNOWN");
    }

    #[test]
    fn test_search_queries_are_deduplicated() {
        let alts = vec!["Kimetsu no Yaiba".to_string(), "demon slayer".to_string()];
        let target = MatchTarget {
            title: "Kimetsu no Yaiba",
            english_title: Some("Demon Slayer"),
            alt_titles: &alts,
            year: None,
        };
        assert_eq!(target.search_queries(), vec!["Demon Slayer", "Kimetsu no Yaiba"]);
    }

    #[test]
    fn test_native_match_beats_title_match() {
        let alts = vec!["アナザー".to_string()];
        let target = MatchTarget {
            title: "Another",
            english_title: None,
            alt_titles: &alts,
            year: Some(2012),
        };
        let candidates = vec![
            candidate("wrong", "Another", &[], Some(2020)),
            candidate("right", "Another", &["アナザー"], Some(2012)),
        ];
        assert_eq!(best_match(&target, &candidates), Some(("right".to_string(), NATIVE_EXACT_SCORE)));
    }

    #[test]
    fn test_english_exact_match() {
        let target = MatchTarget {
            title: "Kimetsu no Yaiba",
            english_title: Some("Demon Slayer"),
            alt_titles: &[],
            year: None,
        };
        let candidates = vec![candidate("ds", "Demon Slayer: Kimetsu no Yaiba", &["Demon Slayer"], None)];
        assert_eq!(best_match(&target, &candidates), Some(("ds".to_string(), TITLE_EXACT_SCORE)));
    }

    #[test]
    fn test_fuzzy_needs_threshold() {
        let target = MatchTarget {
            title: "Naruto",
            english_title: None,
            alt_titles: &[],
            year: Some(2007),
        };
        // 0.8 * sqrt(6/16) * 10 ~= 4.9 alone; the year bonus clears 5.0
        let candidates = vec![candidate("ns", "Naruto Shippuden", &[], Some(2007))];
        let (id, score) = best_match(&target, &candidates).unwrap();
        assert_eq!(id, "ns");
        assert!(score > FUZZY_THRESHOLD);

        let unrelated = vec![candidate("x", "Completely Different", &[], None)];
        assert_eq!(best_match(&target, &unrelated), None);
    }

    #[test]
    fn test_dedup_candidates() {
        let mut list = vec![candidate("a", "A", &[], None), candidate("a", "A again", &[], None), candidate("b", "B", &[], None)];
        dedup_candidates(&mut list);
        assert_eq!(list.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
