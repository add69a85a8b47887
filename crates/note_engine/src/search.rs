use core_types::Note;

const IMAGE_PREFIX: &str = "image:";

/// A parsed search term. Needles are stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchQuery {
    All,
    Text(String),
    Image(String),
}

impl SearchQuery {
    pub fn parse(term: &str) -> Self {
        let term = term.trim();
        if term.is_empty() {
            return SearchQuery::All;
        }
        match term.strip_prefix(IMAGE_PREFIX) {
            Some(rest) => SearchQuery::Image(rest.trim().to_lowercase()),
            None => SearchQuery::Text(term.to_lowercase()),
        }
    }

    pub fn needs_descriptions(&self) -> bool {
        matches!(self, SearchQuery::Image(_))
    }
}

/// Case-insensitive substring match on title or content. `needle` must be lowercase.
pub fn matches_text(note: &Note, needle: &str) -> bool {
    note.title().to_lowercase().contains(needle) || note.content().to_lowercase().contains(needle)
}

/// A missing description never matches, even for an empty needle.
pub fn description_matches(description: Option<&str>, needle: &str) -> bool {
    description.is_some_and(|text| text.to_lowercase().contains(needle))
}

/// Filters by title/content. Image queries are not handled here since they
/// need description lookups; they return no notes.
pub fn filter_text(term: &str, notes: &[Note]) -> Vec<Note> {
    match SearchQuery::parse(term) {
        SearchQuery::All => notes.to_vec(),
        SearchQuery::Text(needle) => notes
            .iter()
            .filter(|note| matches_text(note, &needle))
            .cloned()
            .collect(),
        SearchQuery::Image(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use core_types::ManualNote;

    use super::*;

    fn notes() -> Vec<Note> {
        vec![
            Note::Manual(ManualNote::new("Groceries", "Milk and EGGS")),
            Note::Manual(ManualNote::new("Lecture", "Derivatives of eggs")),
            Note::Manual(ManualNote::new("Ideas", "nothing here")),
        ]
    }

    #[test]
    fn parses_terms() {
        assert_eq!(SearchQuery::parse("   "), SearchQuery::All);
        assert_eq!(SearchQuery::parse(" Cat "), SearchQuery::Text("cat".into()));
        assert_eq!(
            SearchQuery::parse("image:  Red Cat"),
            SearchQuery::Image("red cat".into())
        );
        assert_eq!(SearchQuery::parse("image:"), SearchQuery::Image(String::new()));
        // The marker is literal and case-sensitive.
        assert_eq!(
            SearchQuery::parse("Image: cat"),
            SearchQuery::Text("image: cat".into())
        );
    }

    #[test]
    fn empty_term_returns_everything_unchanged() {
        let all = notes();
        assert_eq!(filter_text("", &all), all);
    }

    #[test]
    fn text_search_is_case_insensitive_and_order_preserving() {
        let found = filter_text("eggs", &notes());
        let titles: Vec<_> = found.iter().map(Note::title).collect();
        assert_eq!(titles, vec!["Groceries", "Lecture"]);

        let found = filter_text("IDEAS", &notes());
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn description_matching() {
        assert!(description_matches(Some("A black CAT sleeping"), "cat"));
        assert!(!description_matches(Some("a dog"), "cat"));
        assert!(!description_matches(None, ""));
        assert!(description_matches(Some("anything"), ""));
    }
}
