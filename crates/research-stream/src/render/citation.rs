use once_cell::sync::Lazy;
use regex::Regex;

static CITATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(\d+)\]").expect("citation regex"));

/// Replaces bracketed integers (`[3]`) with superscript citation markers.
///
/// The marker carries the id in `data-citation-id` so the display surface can
/// link it to the matching entry of the citation list. The marker text holds
/// no brackets, so running the substitution twice is harmless.
pub fn substitute(text: &str) -> String {
    CITATION
        .replace_all(text, r#"<sup class="citation" data-citation-id="$1">$1</sup>"#)
        .into_owned()
}

/// Citation ids referenced by `text`, in order of first appearance.
pub fn referenced_ids(text: &str) -> Vec<u32> {
    let mut ids = Vec::new();
    for caps in CITATION.captures_iter(text) {
        if let Ok(id) = caps[1].parse::<u32>()
            && !ids.contains(&id)
        {
            ids.push(id);
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_numeric_brackets() {
        assert_eq!(
            substitute("Claim [1]"),
            r#"Claim <sup class="citation" data-citation-id="1">1</sup>"#
        );
    }

    #[test]
    fn leaves_non_numeric_brackets_alone() {
        assert_eq!(substitute("see [a] and [1a]"), "see [a] and [1a]");
    }

    #[test]
    fn substitution_is_idempotent() {
        let once = substitute("x [2][3]");
        assert_eq!(substitute(&once), once);
    }

    #[test]
    fn collects_unique_ids_in_order() {
        assert_eq!(referenced_ids("[2] then [1] and [2] again"), vec![2, 1]);
    }
}
