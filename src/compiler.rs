//! Query compilation: raw text plus filters into an FTS5 expression.
//!
//! Compilation is pure and total. Quoted phrases survive as phrase terms,
//! tokens ending in `*` become prefix terms, everything else is a plain
//! term. All terms are OR-combined with phrases first; filters stay a
//! separate conjunctive predicate that the text expansion never loosens.
//!
//! Every token is emitted as an FTS5 string literal, so FTS operators in
//! user input (`AND`, `NEAR`, `-`, `:`) are searched for literally instead
//! of being interpreted.

use crate::models::{Query, QueryFilters};

/// One unit of the compiled text expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryTerm {
    Phrase(String),
    Term(String),
    Prefix(String),
}

impl QueryTerm {
    /// Literal text of the term, lower-cased.
    pub fn text(&self) -> &str {
        match self {
            QueryTerm::Phrase(s) | QueryTerm::Term(s) | QueryTerm::Prefix(s) => s,
        }
    }

    fn to_fts5(&self) -> String {
        match self {
            QueryTerm::Phrase(s) | QueryTerm::Term(s) => format!("\"{}\"", s),
            QueryTerm::Prefix(s) => format!("\"{}\"*", s),
        }
    }
}

/// How the store should evaluate a compiled query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    /// Text expression plus filters.
    FullText,
    /// No usable text; match on filters alone.
    Browse,
    /// No text and no filters; matches nothing.
    MatchNothing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
    terms: Vec<QueryTerm>,
    filters: QueryFilters,
    mode: QueryMode,
}

impl CompiledQuery {
    fn from_parts(terms: Vec<QueryTerm>, filters: QueryFilters) -> Self {
        let mode = if !terms.is_empty() {
            QueryMode::FullText
        } else if !filters.is_empty() {
            QueryMode::Browse
        } else {
            QueryMode::MatchNothing
        };
        Self {
            terms,
            filters,
            mode,
        }
    }

    /// OR-query over already tokenized words, without filters. Used for
    /// candidate generation by the similarity matcher.
    pub fn any_of<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut terms = Vec::new();
        for w in words {
            push_unique(&mut terms, sanitize(w.as_ref()).map(QueryTerm::Term));
        }
        Self::from_parts(terms, QueryFilters::default())
    }

    pub fn mode(&self) -> QueryMode {
        self.mode
    }

    pub fn terms(&self) -> &[QueryTerm] {
        &self.terms
    }

    pub fn filters(&self) -> &QueryFilters {
        &self.filters
    }

    pub fn phrases(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().filter_map(|t| match t {
            QueryTerm::Phrase(p) => Some(p.as_str()),
            _ => None,
        })
    }

    /// FTS5 `MATCH` expression, or `None` when the query has no text part.
    pub fn to_fts5(&self) -> Option<String> {
        if self.terms.is_empty() {
            return None;
        }
        Some(
            self.terms
                .iter()
                .map(QueryTerm::to_fts5)
                .collect::<Vec<_>>()
                .join(" OR "),
        )
    }

    /// Literal strings to look for when marking snippets and detecting
    /// matched fields. Longest first, so overlapping terms mark the widest
    /// span.
    pub fn highlight_terms(&self) -> Vec<String> {
        let mut out: Vec<String> = self.terms.iter().map(|t| t.text().to_string()).collect();
        out.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then(a.cmp(b)));
        out.dedup();
        out
    }
}

/// Keep letters, digits and the connectors that appear inside legal
/// references (`VIII ZR 1/21`, `ECLI:DE:...`, `§`). A token without any
/// alphanumeric char is dropped.
fn sanitize(token: &str) -> Option<String> {
    let cleaned: String = token
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '/' | '.' | '-' | ':' | '§'))
        .collect();
    let cleaned = cleaned
        .trim_matches(|c: char| matches!(c, '.' | '-' | ':'))
        .to_lowercase();
    if cleaned.chars().any(char::is_alphanumeric) {
        Some(cleaned)
    } else {
        None
    }
}

fn sanitize_phrase(phrase: &str) -> Option<String> {
    let words: Vec<String> = phrase.split_whitespace().filter_map(sanitize).collect();
    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

fn push_unique(terms: &mut Vec<QueryTerm>, term: Option<QueryTerm>) {
    if let Some(t) = term {
        if !terms.contains(&t) {
            terms.push(t);
        }
    }
}

/// Split raw text into terms, phrases first.
pub fn tokenize(text: &str) -> Vec<QueryTerm> {
    let mut phrases = Vec::new();
    let mut words = Vec::new();

    let mut chars = text.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '"' {
            chars.next();
            // An unterminated quote runs to the end of input.
            let phrase: String = chars.by_ref().take_while(|&c| c != '"').collect();
            push_unique(&mut phrases, sanitize_phrase(&phrase).map(QueryTerm::Phrase));
        } else {
            let mut token = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() || c == '"' {
                    break;
                }
                token.push(c);
                chars.next();
            }
            let term = if let Some(stem) = token.strip_suffix('*') {
                sanitize(stem.trim_end_matches('*')).map(QueryTerm::Prefix)
            } else {
                sanitize(&token).map(QueryTerm::Term)
            };
            push_unique(&mut words, term);
        }
    }

    phrases.extend(words);
    phrases
}

/// Compile a query. Never fails: text that tokenizes to nothing yields a
/// filter-only browse, or a match-nothing query when there are no filters.
pub fn compile(query: &Query) -> CompiledQuery {
    CompiledQuery::from_parts(tokenize(&query.text), query.filters.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(text: &str) -> Query {
        Query::new(text)
    }

    #[test]
    fn single_term() {
        let c = compile(&q("Mietrecht"));
        assert_eq!(c.mode(), QueryMode::FullText);
        assert_eq!(c.to_fts5().as_deref(), Some("\"mietrecht\""));
    }

    #[test]
    fn phrases_come_first() {
        let c = compile(&q("Kündigung \"fristlose Kündigung\" Miet*"));
        assert_eq!(
            c.to_fts5().as_deref(),
            Some("\"fristlose kündigung\" OR \"kündigung\" OR \"miet\"*")
        );
        assert_eq!(c.phrases().collect::<Vec<_>>(), vec!["fristlose kündigung"]);
    }

    #[test]
    fn unterminated_quote_is_a_phrase() {
        let c = compile(&q("Urteil \"grobe Fahrlässigkeit"));
        assert_eq!(
            c.terms(),
            &[
                QueryTerm::Phrase("grobe fahrlässigkeit".into()),
                QueryTerm::Term("urteil".into())
            ]
        );
    }

    #[test]
    fn fts_syntax_is_neutralized() {
        let c = compile(&q("NEAR(a b) -x ^y \"\" *"));
        let fts = c.to_fts5().unwrap();
        assert!(!fts.contains('('));
        assert!(!fts.contains('^'));
        assert_eq!(fts, "\"neara\" OR \"b\" OR \"x\" OR \"y\"");
    }

    #[test]
    fn legal_references_survive() {
        let c = compile(&q("VIII ZR 1/21 § 573"));
        assert_eq!(
            c.to_fts5().as_deref(),
            Some("\"viii\" OR \"zr\" OR \"1/21\" OR \"573\"")
        );
    }

    #[test]
    fn empty_text_modes() {
        assert_eq!(compile(&q("  ")).mode(), QueryMode::MatchNothing);
        assert_eq!(compile(&q("\" \" - *")).mode(), QueryMode::MatchNothing);

        let browse = q("").with_filters(QueryFilters {
            legal_area: Some("Arbeitsrecht".into()),
            ..QueryFilters::default()
        });
        let c = compile(&browse);
        assert_eq!(c.mode(), QueryMode::Browse);
        assert!(c.to_fts5().is_none());
        assert_eq!(c.filters().legal_area.as_deref(), Some("Arbeitsrecht"));
    }

    #[test]
    fn duplicates_are_dropped() {
        let c = compile(&q("miete Miete MIETE"));
        assert_eq!(c.terms().len(), 1);
    }

    #[test]
    fn highlight_terms_longest_first() {
        let c = compile(&q("abc \"abc def\" x"));
        assert_eq!(c.highlight_terms(), vec!["abc def", "abc", "x"]);
    }

    #[test]
    fn any_of_builds_term_disjunction() {
        let c = CompiledQuery::any_of(["kündigung", "eigenbedarf", "kündigung"]);
        assert_eq!(c.to_fts5().as_deref(), Some("\"kündigung\" OR \"eigenbedarf\""));
        assert_eq!(CompiledQuery::any_of(Vec::<String>::new()).mode(), QueryMode::MatchNothing);
    }
}
