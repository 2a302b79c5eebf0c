//! Rule-based content generation used when no LLM backend answers.
//!
//! Every function here is pure: the same input always produces the same
//! output.

use crate::DEFAULT_CATEGORY;

const SUGGESTION_TEMPLATES: [&str; 5] = [
    "Consider breaking this note into smaller, actionable steps.",
    "Add a deadline or a date so this can be scheduled.",
    "Think about who else should know about this and share it.",
    "Add a link or reference that gives this note more context.",
    "Review this note tomorrow and decide on the next action.",
];

const NEXT_STEPS: [&str; 3] = [
    "Review the details above",
    "Decide on the first concrete action",
    "Set a time to follow up",
];

const SUMMARY_MAX_CHARS: usize = 150;

/// Keyword sets in priority order; the first set with a hit names the category.
const CATEGORY_KEYWORDS: [(&str, &[&str]); 6] = [
    (
        "Work",
        &[
            "meeting",
            "project",
            "deadline",
            "client",
            "office",
            "report",
            "presentation",
            "work",
            "boss",
            "colleague",
            "email",
        ],
    ),
    (
        "Personal",
        &[
            "family", "friend", "friends", "birthday", "home", "health", "doctor", "personal",
        ],
    ),
    (
        "Todo",
        &[
            "todo",
            "to do",
            "to-do",
            "task",
            "remember",
            "don't forget",
            "need to",
            "must",
        ],
    ),
    (
        "Idea",
        &["idea", "ideas", "brainstorm", "concept", "innovation", "what if", "inspiration"],
    ),
    (
        "Shopping",
        &[
            "buy",
            "shop",
            "shopping",
            "grocery",
            "groceries",
            "milk",
            "eggs",
            "bread",
            "store",
            "purchase",
            "order",
        ],
    ),
    (
        "Finance",
        &[
            "pay", "bill", "bills", "budget", "bank", "invoice", "tax", "taxes", "money", "salary",
            "rent", "expense",
        ],
    ),
];

const MOOD_QUOTES: [(&str, &str); 5] = [
    (
        "motivated",
        "Small steps every day add up to big results.",
    ),
    ("calm", "Slow down. Everything you need will come to you in time."),
    ("happy", "Joy shared is joy doubled."),
    ("sad", "Even the darkest night will end and the sun will rise."),
    ("focused", "Do one thing at a time, and do it well."),
];

const GENERAL_QUOTES: [&str; 4] = [
    "Write it down. Ideas fade, notes remain.",
    "The secret of getting ahead is getting started.",
    "Clarity comes from action, not thought alone.",
    "Today's notes are tomorrow's answers.",
];

/// Picks a suggestion template by `chars(content) mod template count`
pub fn fallback_suggestion(content: &str) -> String {
    let index = content.chars().count() % SUGGESTION_TEMPLATES.len();
    SUGGESTION_TEMPLATES[index].to_string()
}

/// Restates the first two sentences under "Details:" followed by a fixed
/// "Next steps:" checklist.
pub fn fallback_enhancement(content: &str) -> String {
    let details = sentences(content)
        .into_iter()
        .take(2)
        .map(|s| format!("{}.", s))
        .collect::<Vec<_>>()
        .join(" ");

    let mut out = format!("Details: {}\n\nNext steps:", details);
    for step in NEXT_STEPS {
        out.push_str("\n- [ ] ");
        out.push_str(step);
    }
    out
}

/// Keyword category for `content`, or `"General"` when nothing matches.
///
/// Multi-word keywords match on word boundaries too, so "bread" never
/// matches inside "breadth".
pub fn fallback_categories(content: &str) -> String {
    let haystack = word_haystack(content);
    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| {
            keywords
                .iter()
                .any(|keyword| haystack.contains(&format!(" {} ", keyword)))
        })
        .map(|(category, _)| category.to_string())
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string())
}

/// First sentence, capped at 150 characters
pub fn fallback_summary(content: &str) -> String {
    let first = sentences(content)
        .into_iter()
        .next()
        .unwrap_or_default();
    crate::truncate_chars(&first, SUMMARY_MAX_CHARS)
}

/// Quote for a known mood, otherwise one chosen by the mood's length
pub fn fallback_quote(mood: Option<&str>) -> String {
    let mood = mood.map(|m| m.trim().to_lowercase()).unwrap_or_default();
    MOOD_QUOTES
        .iter()
        .find(|(name, _)| *name == mood)
        .map(|(_, quote)| quote.to_string())
        .unwrap_or_else(|| {
            GENERAL_QUOTES[mood.chars().count() % GENERAL_QUOTES.len()].to_string()
        })
}

fn sentences(content: &str) -> Vec<String> {
    content
        .split(['.', '?', '!'])
        .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|s| !s.is_empty())
        .collect()
}

/// Lowercase words joined by single spaces and padded on both sides.
/// Apostrophes and hyphens stay inside words.
fn word_haystack(content: &str) -> String {
    let words: Vec<String> = content
        .to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '-'))
        .filter(|w| !w.is_empty())
        .map(|w| w.to_string())
        .collect();
    format!(" {} ", words.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_follow_priority_order() {
        assert_eq!(fallback_categories("Buy milk and eggs"), "Shopping");
        assert_eq!(fallback_categories("Team meeting deadline"), "Work");
        assert_eq!(fallback_categories("just thinking"), "General");
        assert_eq!(fallback_categories("Don't forget mom's birthday"), "Personal");
        assert_eq!(fallback_categories("I need to call the plumber"), "Todo");
        assert_eq!(fallback_categories("What if we used solar?"), "Idea");
        assert_eq!(fallback_categories("Pay the rent"), "Finance");
    }

    #[test]
    fn categories_match_whole_words_only() {
        assert_eq!(fallback_categories("breadth of homework"), "General");
        assert_eq!(fallback_categories("MEETING!!!"), "Work");
    }

    #[test]
    fn suggestion_depends_only_on_length() {
        let a = fallback_suggestion("abcde");
        assert_eq!(a, fallback_suggestion("vwxyz"));
        assert_eq!(a, SUGGESTION_TEMPLATES[0]);
        assert_eq!(fallback_suggestion("ab"), SUGGESTION_TEMPLATES[2]);
        assert_eq!(fallback_suggestion(""), SUGGESTION_TEMPLATES[0]);
    }

    #[test]
    fn enhancement_keeps_two_sentences_and_checklist() {
        let out = fallback_enhancement("Plan the trip. Book hotels!   Pack bags? Leave.");
        assert!(out.starts_with("Details: Plan the trip. Book hotels."));
        assert!(!out.contains("Pack bags"));
        assert_eq!(out.matches("- [ ] ").count(), 3);
        assert!(out.contains("\n\nNext steps:\n- [ ] Review the details above"));
    }

    #[test]
    fn summary_is_first_sentence() {
        assert_eq!(fallback_summary("Ship v2. Then rest."), "Ship v2");
        assert_eq!(fallback_summary("   "), "");
        let long = "word ".repeat(100);
        assert_eq!(fallback_summary(&long).chars().count(), SUMMARY_MAX_CHARS);
    }

    #[test]
    fn quotes_are_deterministic() {
        assert_eq!(fallback_quote(Some("Calm")), MOOD_QUOTES[1].1);
        assert_eq!(fallback_quote(None), GENERAL_QUOTES[0]);
        assert_eq!(fallback_quote(Some("bored")), fallback_quote(Some("tired")));
    }
}
