//! Structural marker extraction.
//!
//! Markers are bold spans (`**Scope of Work**`) and markdown heading lines
//! (`## Fees`). The structuring stage introduces them; the tone finishing
//! stage must carry every one through verbatim.

use regex_lite::Regex;
use std::sync::LazyLock;

static BOLD: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\*\*[^*\n]+?\*\*").ok());

static HEADING: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,6}[ \t]+\S[^\n]*").ok());

/// Every distinct marker in `text`, in order of first appearance.
pub fn extract(text: &str) -> Vec<String> {
    let mut found: Vec<(usize, String)> = Vec::new();
    for pattern in [&*BOLD, &*HEADING].into_iter().flatten() {
        for m in pattern.find_iter(text) {
            found.push((m.start(), m.as_str().trim_end().to_string()));
        }
    }
    found.sort_by_key(|(pos, _)| *pos);

    let mut markers: Vec<String> = Vec::with_capacity(found.len());
    for (_, marker) in found {
        if !markers.contains(&marker) {
            markers.push(marker);
        }
    }
    markers
}

/// Markers present in `source` that do not appear verbatim in `target`.
pub fn missing(source: &str, target: &str) -> Vec<String> {
    extract(source)
        .into_iter()
        .filter(|m| !target.contains(m.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DRAFT: &str = "\
# Engagement Letter

**Scope of Work**
We will prepare the 2023 return.

## Fees
**Billing Rate**: $250/hour. See **Scope of Work** above.
";

    #[test]
    fn finds_bold_and_headings_in_order() {
        assert_eq!(
            extract(DRAFT),
            [
                "# Engagement Letter",
                "**Scope of Work**",
                "## Fees",
                "**Billing Rate**",
            ]
        );
    }

    #[test]
    fn plain_text_has_no_markers() {
        assert!(extract("No structure here, just prose. 2 * 3 = 6.").is_empty());
        assert!(extract("#hashtag is not a heading").is_empty());
    }

    #[test]
    fn verbatim_copy_loses_nothing() {
        let finished = format!("Dear client,\n\n{DRAFT}\nSincerely,");
        assert!(missing(DRAFT, &finished).is_empty());
    }

    #[test]
    fn reworded_marker_is_reported() {
        let finished = DRAFT.replace("**Scope of Work**", "**Scope of Services**");
        assert_eq!(missing(DRAFT, &finished), ["**Scope of Work**"]);
    }

    #[test]
    fn heading_trailing_space_is_ignored() {
        assert_eq!(extract("## Fees   \nbody"), ["## Fees"]);
    }
}
