//! Text utilities for German court decisions.
//!
//! Pure functions only: HTML cleaning, Leitsatz (headnote) extraction,
//! statute reference extraction, date parsing and the word tokenizer used
//! by the similarity sketch.

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

pub const MIN_YEAR: i32 = 1900;
pub const MAX_YEAR: i32 = 2100;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("html tag regex"));
static ENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]{2,8});").expect("entity regex"));
static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

static HEADING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<h[23][^>]*>\s*(?:tenor|leits(?:ä|&auml;)tze?|leitsatz)\s*</h[23]>\s*(?:<[^>]*>\s*)*([^<]+)")
        .expect("leitsatz heading regex")
});
static LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:tenor|leitsätze|leitsatz)\b[:\s]+([^<\n]+)").expect("leitsatz label regex")
});
static NUMBERED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*((?:\d+|I)\.\s+[^<\n]+)").expect("numbered leitsatz regex")
});
static SENTENCE_END_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?](?:\s|$)").expect("sentence regex"));

static PARAGRAPH_REF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"§§?\s*(\d+[a-z]?)\s*(?:Abs\.\s*\d+\s*)?(?:S(?:atz|\.)\s*\d+\s*)?(?:Nr\.\s*\d+\s*)?([A-Z][A-Za-z]*[A-Z])\b")
        .expect("paragraph reference regex")
});
static ARTICLE_REF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Art\.\s*(\d+[a-z]?)\s*(?:Abs\.\s*\d+\s*)?(GG|EMRK|AEUV|EUV|GRCh)\b")
        .expect("article reference regex")
});

static ISO_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})").expect("iso date regex"));
static GERMAN_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})\.(\d{1,2})\.(\d{4})").expect("german date regex"));
static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})\b").expect("year regex"));

/// Common German function words that carry no topical signal.
const STOP_WORDS: &[&str] = &[
    "aber", "als", "also", "am", "an", "auch", "auf", "aus", "bei", "bis", "da", "damit", "dass",
    "dem", "den", "der", "des", "die", "dies", "diese", "dieser", "dieses", "doch", "durch", "ein",
    "eine", "einem", "einen", "einer", "eines", "es", "für", "gegen", "hat", "hatte", "im", "in",
    "ist", "kann", "mit", "muss", "nach", "nicht", "noch", "nur", "ob", "oder", "sein", "seine",
    "sich", "sie", "sind", "so", "soweit", "über", "um", "und", "unter", "vom", "von", "vor",
    "war", "wenn", "werden", "wird", "wie", "wurde", "zu", "zum", "zur", "sowie", "insoweit",
];

/// Collapse whitespace runs into single spaces and trim.
pub fn normalize_whitespace(text: &str) -> String {
    WS_RE.replace_all(text, " ").trim().to_string()
}

/// Decode the HTML entities found in court documents. Unknown named
/// entities become a space.
pub fn decode_entities(text: &str) -> String {
    ENTITY_RE
        .replace_all(text, |caps: &regex::Captures| {
            let body = &caps[1];
            if let Some(num) = body.strip_prefix('#') {
                let hex = num.strip_prefix('x').or_else(|| num.strip_prefix('X'));
                let code = match hex {
                    Some(hex) => u32::from_str_radix(hex, 16).ok(),
                    None => num.parse::<u32>().ok(),
                };
                return code
                    .and_then(char::from_u32)
                    .map(String::from)
                    .unwrap_or_else(|| " ".to_string());
            }
            let decoded = match body {
                "amp" => "&",
                "lt" => "<",
                "gt" => ">",
                "quot" => "\"",
                "apos" => "'",
                "nbsp" => " ",
                "auml" => "ä",
                "ouml" => "ö",
                "uuml" => "ü",
                "Auml" => "Ä",
                "Ouml" => "Ö",
                "Uuml" => "Ü",
                "szlig" => "ß",
                "sect" => "§",
                "ndash" => "–",
                "mdash" => "—",
                "bdquo" => "„",
                "ldquo" => "“",
                "rdquo" => "”",
                _ => " ",
            };
            decoded.to_string()
        })
        .into_owned()
}

/// Strip markup from raw decision HTML and normalize whitespace.
///
/// The output is never longer than the input.
pub fn clean_html(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let without_tags = TAG_RE.replace_all(raw, " ");
    normalize_whitespace(&decode_entities(&without_tags))
}

/// Truncate to at most `max_chars` characters, appending `...` when cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

/// Extract the Leitsatz (headnote) or Tenor from a decision.
///
/// Tries explicit headings first, then labelled text, then numbered
/// holdings, and finally falls back to the first sentence of the cleaned
/// text.
pub fn extract_leitsatz(raw: &str, max_chars: usize) -> Option<String> {
    if raw.trim().is_empty() {
        return None;
    }

    let explicit = HEADING_RE
        .captures(raw)
        .or_else(|| LABEL_RE.captures(raw))
        .or_else(|| NUMBERED_RE.captures(raw))
        .map(|caps| normalize_whitespace(&decode_entities(&caps[1])))
        .filter(|s| !s.is_empty());

    if let Some(text) = explicit {
        return Some(truncate_chars(&text, max_chars));
    }

    let clean = clean_html(raw);
    let first = match SENTENCE_END_RE.find(&clean) {
        Some(m) => clean[..m.start() + 1].trim(),
        None => clean.trim(),
    };
    if first.is_empty() {
        None
    } else {
        Some(truncate_chars(first, max_chars))
    }
}

/// Statute references such as `§ 573 BGB` or `Art. 3 GG`, deduplicated and
/// sorted.
pub fn extract_statute_refs(text: &str) -> Vec<String> {
    let mut refs: Vec<String> = PARAGRAPH_REF_RE
        .captures_iter(text)
        .map(|c| format!("§ {} {}", &c[1], &c[2]))
        .chain(
            ARTICLE_REF_RE
                .captures_iter(text)
                .map(|c| format!("Art. {} {}", &c[1], &c[2])),
        )
        .collect();
    refs.sort();
    refs.dedup();
    refs
}

/// Parsed decision date. `year` is always derived from `date` when a full
/// date is known; a bare year yields `date: None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateParts {
    pub date: Option<NaiveDate>,
    pub year: Option<i32>,
}

/// Parse `YYYY-MM-DD` (optionally followed by a time), `D.M.YYYY`, or a bare
/// `YYYY`. Years outside 1900..=2100 are rejected.
pub fn parse_decision_date(input: &str) -> DateParts {
    let s = input.trim();
    let in_range = |y: i32| (MIN_YEAR..=MAX_YEAR).contains(&y);

    let ymd = if let Some(c) = ISO_DATE_RE.captures(s) {
        Some((c[1].parse().ok(), c[2].parse().ok(), c[3].parse().ok()))
    } else {
        GERMAN_DATE_RE
            .captures(s)
            .map(|c| (c[3].parse().ok(), c[2].parse().ok(), c[1].parse().ok()))
    };

    if let Some((Some(y), Some(m), Some(d))) = ymd {
        if in_range(y) {
            if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
                return DateParts {
                    date: Some(date),
                    year: Some(date.year()),
                };
            }
        }
        return DateParts::default();
    }

    YEAR_RE
        .captures(s)
        .and_then(|c| c[1].parse::<i32>().ok())
        .filter(|y| in_range(*y))
        .map(|y| DateParts {
            date: None,
            year: Some(y),
        })
        .unwrap_or_default()
}

/// Lower-cased content words: at least three characters, not purely
/// numeric, not a stop word.
pub fn content_words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 3)
        .map(|w| w.to_lowercase())
        .filter(|w| !w.chars().all(|c| c.is_ascii_digit()))
        .filter(|w| !STOP_WORDS.contains(&w.as_str()))
}

/// Lower-case `c` and strip Latin diacritics, as the FTS5 `unicode61`
/// tokenizer does with `remove_diacritics 2`. `ß` is kept.
pub fn fold_char(c: char) -> char {
    let lower = c.to_lowercase().next().unwrap_or(c);
    match lower {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => 'a',
        'ç' | 'ć' | 'č' => 'c',
        'ď' => 'd',
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ę' | 'ě' => 'e',
        'ì' | 'í' | 'î' | 'ï' | 'ī' => 'i',
        'ł' | 'ľ' | 'ĺ' => 'l',
        'ñ' | 'ń' | 'ň' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => 'o',
        'ř' | 'ŕ' => 'r',
        'ś' | 'š' | 'ş' => 's',
        'ť' | 'ţ' => 't',
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' => 'u',
        'ý' | 'ÿ' => 'y',
        'ź' | 'ż' | 'ž' => 'z',
        other => other,
    }
}

/// Map every char through [`fold_char`] so positions in the folded text
/// line up one-to-one with the original chars.
pub fn fold_chars(text: &str) -> Vec<char> {
    text.chars().map(fold_char).collect()
}

/// [`fold_chars`] collected into a string.
pub fn fold(text: &str) -> String {
    text.chars().map(fold_char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_html_strips_tags_and_entities() {
        let raw = "<h2>Tenor</h2><p>Die Revision wird zur&uuml;ckgewiesen.</p>\n\n<p>K&uuml;ndigung&nbsp;&amp; Abmahnung</p>";
        let clean = clean_html(raw);
        assert_eq!(
            clean,
            "Tenor Die Revision wird zurückgewiesen. Kündigung & Abmahnung"
        );
        assert!(clean.chars().count() <= raw.chars().count());
    }

    #[test]
    fn clean_html_empty() {
        assert_eq!(clean_html(""), "");
        assert_eq!(clean_html("<p></p>"), "");
    }

    #[test]
    fn numeric_entities_decode() {
        assert_eq!(decode_entities("&#167; 1 &#x41;"), "§ 1 A");
        assert_eq!(decode_entities("&bogus;"), " ");
    }

    #[test]
    fn leitsatz_from_heading() {
        let raw = "<h2>Leitsatz</h2><p>Überstunden müssen angeordnet werden.</p><p>Rest</p>";
        assert_eq!(
            extract_leitsatz(raw, 200).as_deref(),
            Some("Überstunden müssen angeordnet werden.")
        );
    }

    #[test]
    fn leitsatz_from_label() {
        let raw = "Tenor: Die Revision wird zurückgewiesen.\nGründe folgen.";
        assert_eq!(
            extract_leitsatz(raw, 200).as_deref(),
            Some("Die Revision wird zurückgewiesen.")
        );
    }

    #[test]
    fn leitsatz_falls_back_to_first_sentence() {
        let raw = "<p>Krankenversicherung: Kosten sind nicht erstattungsfähig. Weitere Ausführungen.</p>";
        assert_eq!(
            extract_leitsatz(raw, 200).as_deref(),
            Some("Krankenversicherung: Kosten sind nicht erstattungsfähig.")
        );
    }

    #[test]
    fn leitsatz_is_truncated() {
        let raw = "Leitsatz: ".to_string() + &"a".repeat(50);
        let l = extract_leitsatz(&raw, 10).unwrap();
        assert_eq!(l, format!("{}...", "a".repeat(10)));
        assert!(extract_leitsatz("   ", 10).is_none());
    }

    #[test]
    fn statute_refs() {
        let text = "Nach § 573 Abs. 2 BGB und § 573 BGB sowie Art. 3 GG ist ... § 1 KSchG";
        assert_eq!(
            extract_statute_refs(text),
            vec!["Art. 3 GG", "§ 1 KSchG", "§ 573 BGB"]
        );
    }

    #[test]
    fn date_formats() {
        let iso = parse_decision_date("2022-03-15");
        assert_eq!(iso.date, NaiveDate::from_ymd_opt(2022, 3, 15));
        assert_eq!(iso.year, Some(2022));

        let with_time = parse_decision_date("2022-03-15T00:00:00");
        assert_eq!(with_time.year, Some(2022));

        let german = parse_decision_date("5.1.2024");
        assert_eq!(german.date, NaiveDate::from_ymd_opt(2024, 1, 5));

        let bare = parse_decision_date("2019");
        assert_eq!(bare.date, None);
        assert_eq!(bare.year, Some(2019));

        assert_eq!(parse_decision_date("1850-01-01"), DateParts::default());
        assert_eq!(parse_decision_date("2022-02-30"), DateParts::default());
        assert_eq!(parse_decision_date("unbekannt"), DateParts::default());
    }

    #[test]
    fn content_words_filters_noise() {
        let words: Vec<String> =
            content_words("Die Kündigung des Mietvertrags ist nach 2022 unwirksam.").collect();
        assert_eq!(words, vec!["kündigung", "mietvertrags", "unwirksam"]);
    }

    #[test]
    fn fold_chars_keeps_positions() {
        let folded = fold_chars("ÄBCß");
        assert_eq!(folded, vec!['a', 'b', 'c', 'ß']);
        assert_eq!(fold("Kündigung über Éclat"), "kundigung uber eclat");
    }
}
