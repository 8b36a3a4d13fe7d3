//! Reconciling schema field paths with spreadsheet headers.
//!
//! A [`MatcherChain`] is an ordered list of matchers. Each matcher is tried against every
//! header before the next matcher is consulted, so a stricter match always beats a looser
//! one. New heuristics are added by pushing another [`ColumnMatcher`].

/// Decides whether a spreadsheet header stands for a schema field path.
pub trait ColumnMatcher: Send + Sync {
    fn name(&self) -> &'static str;
    fn matches(&self, field_path: &str, header: &str) -> bool;
}

/// Header equals the field path exactly.
pub struct ExactMatch;

impl ColumnMatcher for ExactMatch {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn matches(&self, field_path: &str, header: &str) -> bool {
        header == field_path
    }
}

/// Field path appears inside the header, case-sensitive.
pub struct ContainsMatch;

impl ColumnMatcher for ContainsMatch {
    fn name(&self) -> &'static str {
        "contains"
    }

    fn matches(&self, field_path: &str, header: &str) -> bool {
        header.contains(field_path)
    }
}

fn normalize_label(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Same words once case and separators are ignored: `project.name` ~ `Project Name`.
pub struct NormalizedLabelMatch;

impl ColumnMatcher for NormalizedLabelMatch {
    fn name(&self) -> &'static str {
        "normalized-label"
    }

    fn matches(&self, field_path: &str, header: &str) -> bool {
        let field = normalize_label(field_path);
        !field.is_empty() && field == normalize_label(header)
    }
}

pub struct CaseInsensitiveExact;

impl ColumnMatcher for CaseInsensitiveExact {
    fn name(&self) -> &'static str {
        "exact-ci"
    }

    fn matches(&self, field_path: &str, header: &str) -> bool {
        header.to_lowercase() == field_path.to_lowercase()
    }
}

pub struct CaseInsensitiveContains;

impl ColumnMatcher for CaseInsensitiveContains {
    fn name(&self) -> &'static str {
        "contains-ci"
    }

    fn matches(&self, field_path: &str, header: &str) -> bool {
        header.to_lowercase().contains(&field_path.to_lowercase())
    }
}

/// Closed list of (field-path keyword, header keyword) pairs for the target system's
/// French labels.
pub const FRENCH_LABEL_PAIRS: &[(&str, &str)] = &[
    ("internal", "internal"),
    ("civility", "civilité"),
    ("function", "fonction"),
    ("department", "direction"),
    ("company", "société"),
];

pub struct KeywordPairs {
    pairs: Vec<(String, String)>,
}

impl KeywordPairs {
    pub fn new<I, A, B>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        Self {
            pairs: pairs
                .into_iter()
                .map(|(field, header)| (field.into().to_lowercase(), header.into().to_lowercase()))
                .collect(),
        }
    }

    pub fn french_labels() -> Self {
        Self::new(FRENCH_LABEL_PAIRS.iter().copied())
    }
}

impl ColumnMatcher for KeywordPairs {
    fn name(&self) -> &'static str {
        "keyword-pair"
    }

    fn matches(&self, field_path: &str, header: &str) -> bool {
        let field = field_path.to_lowercase();
        let header = header.to_lowercase();
        self.pairs
            .iter()
            .any(|(field_kw, header_kw)| field.contains(field_kw.as_str()) && header.contains(header_kw.as_str()))
    }
}

/// Where a field path landed among the headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMatch {
    pub index: usize,
    pub matched_by: &'static str,
}

pub struct MatcherChain {
    matchers: Vec<Box<dyn ColumnMatcher>>,
}

impl MatcherChain {
    pub fn new() -> Self {
        Self {
            matchers: Vec::new(),
        }
    }

    pub fn with(mut self, matcher: impl ColumnMatcher + 'static) -> Self {
        self.matchers.push(Box::new(matcher));
        self
    }

    /// Key columns: exact, then case-sensitive containment, then normalized label.
    pub fn key_columns() -> Self {
        Self::new()
            .with(ExactMatch)
            .with(ContainsMatch)
            .with(NormalizedLabelMatch)
    }

    /// List columns: case-insensitive exact, then case-insensitive containment, then the
    /// French label pairs.
    pub fn list_columns() -> Self {
        Self::new()
            .with(CaseInsensitiveExact)
            .with(CaseInsensitiveContains)
            .with(KeywordPairs::french_labels())
    }

    pub fn locate(&self, field_path: &str, headers: &[String]) -> Option<ColumnMatch> {
        let field_path = field_path.trim();
        if field_path.is_empty() {
            return None;
        }

        self.matchers.iter().find_map(|matcher| {
            headers
                .iter()
                .position(|header| !header.trim().is_empty() && matcher.matches(field_path, header.trim()))
                .map(|index| ColumnMatch {
                    index,
                    matched_by: matcher.name(),
                })
        })
    }
}

impl Default for MatcherChain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_stricter_matcher_wins_over_earlier_header() {
        let chain = MatcherChain::key_columns();
        let hs = headers(&["person.name (legacy)", "person.name"]);

        let found = chain.locate("person.name", &hs).unwrap();
        assert_eq!(found, ColumnMatch { index: 1, matched_by: "exact" });
    }

    #[test]
    fn test_key_containment_is_case_sensitive() {
        let hs = headers(&["Ref PROJECT.CODE"]);
        assert!(ContainsMatch.matches("PROJECT.CODE", &hs[0]));
        assert!(!ContainsMatch.matches("project.code", &hs[0]));
    }

    #[test]
    fn test_dotted_path_maps_to_spaced_label() {
        let chain = MatcherChain::key_columns();
        let found = chain.locate("project.name", &headers(&["Budget", "Project Name"])).unwrap();
        assert_eq!(found.index, 1);
        assert_eq!(found.matched_by, "normalized-label");
    }

    #[test]
    fn test_list_heuristic_pairs() {
        let chain = MatcherChain::list_columns();
        let hs = headers(&["Nom", "Civilité", "Fonction", "Direction", "Société", "Internal ref"]);

        assert_eq!(chain.locate("person.civility", &hs).unwrap().index, 1);
        assert_eq!(chain.locate("person.function", &hs).unwrap().index, 2);
        assert_eq!(chain.locate("person.department", &hs).unwrap().index, 3);
        assert_eq!(chain.locate("person.company", &hs).unwrap().index, 4);
        assert_eq!(chain.locate("person.internal", &hs).unwrap().index, 5);
        assert_eq!(chain.locate("person.country", &hs), None);
    }

    #[test]
    fn test_case_insensitive_exact_before_heuristics() {
        let chain = MatcherChain::list_columns();
        let found = chain
            .locate("Civility", &headers(&["Civilité", "civility"]))
            .unwrap();
        assert_eq!(found, ColumnMatch { index: 1, matched_by: "exact-ci" });
    }

    #[test]
    fn test_blank_headers_and_paths_never_match() {
        let chain = MatcherChain::list_columns();
        assert_eq!(chain.locate("", &headers(&["A"])), None);
        assert_eq!(chain.locate("a", &headers(&["", "  "])), None);
    }

    #[test]
    fn test_custom_matcher_extends_chain() {
        struct Prefix;
        impl ColumnMatcher for Prefix {
            fn name(&self) -> &'static str {
                "prefix"
            }
            fn matches(&self, field_path: &str, header: &str) -> bool {
                field_path.starts_with(header)
            }
        }

        let chain = MatcherChain::new().with(ExactMatch).with(Prefix);
        let found = chain.locate("contract.amount", &headers(&["contract"])).unwrap();
        assert_eq!(found.matched_by, "prefix");
    }
}
