//! Hashtag extraction and ranking.

/// Most tags recorded for a single bulletin.
pub const MAX_TAGS: usize = 5;

/// Start of the scoring epoch (2016-01-01 00:03:21 UTC).
pub const SCORE_EPOCH: i64 = 1_451_606_601;

/// Seconds per scoring period; each elapsed period is worth one use.
pub const SCORE_PERIOD: i64 = 86_000;

/// Characters that end a tag.
fn is_tag_break(c: char) -> bool {
    matches!(
        c,
        ' ' | '\u{0c}'
            | '\n'
            | '\r'
            | '\t'
            | '\u{0b}'
            | '\u{00a0}'
            | '\u{1680}'
            | '\u{180e}'
            | '\u{2000}'..='\u{200a}'
            | '\u{2028}'
            | '\u{2029}'
            | '\u{202f}'
            | '\u{205f}'
            | '\u{3000}'
            | '\u{feff}'
    )
}

/// Extract up to [`MAX_TAGS`] distinct tags from `message`, in order of first
/// appearance.
///
/// A tag starts at `#` and runs to the next break character; it includes the
/// leading `#`. A `#` with nothing after it is not a tag.
pub fn parse_tags(message: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    let mut rest = message;

    while let Some(start) = rest.find('#') {
        let run = &rest[start..];
        let end = run.find(is_tag_break).unwrap_or(run.len());
        let tag = &run[..end];
        rest = &run[end..];

        if tag.len() <= 1 || tags.iter().any(|t| t == tag) {
            continue;
        }
        tags.push(tag.to_string());
        if tags.len() == MAX_TAGS {
            break;
        }
    }
    tags
}

/// Rank score of a tag used `count` times and first seen at `first_seen`.
///
/// Every [`SCORE_PERIOD`] after [`SCORE_EPOCH`] adds one point, so a new tag
/// needs fewer uses to outrank an old one.
pub fn tag_score(count: u64, first_seen: i64) -> i64 {
    count as i64 + (first_seen - SCORE_EPOCH).div_euclid(SCORE_PERIOD)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cap_and_dedup() {
        assert_eq!(
            parse_tags("#a #a #b #c #d #e #f"),
            vec!["#a", "#b", "#c", "#d", "#e"]
        );
    }

    #[test]
    fn unicode_breaks() {
        assert_eq!(
            parse_tags("#café\u{3000}#日本\u{2003}#x\u{feff}tail"),
            vec!["#café", "#日本", "#x"]
        );
    }

    #[test]
    fn runs_include_inner_hashes_and_punctuation() {
        assert_eq!(parse_tags("see #a#b, ok"), vec!["#a#b,"]);
    }

    #[test]
    fn bare_hash_is_ignored() {
        assert_eq!(parse_tags("# nothing # here #yes"), vec!["#yes"]);
        assert!(parse_tags("no tags at all").is_empty());
    }

    #[test]
    fn score_rewards_recency() {
        assert_eq!(tag_score(3, SCORE_EPOCH), 3);
        assert_eq!(tag_score(1, SCORE_EPOCH + 10 * SCORE_PERIOD + 5), 11);
        assert_eq!(tag_score(4, SCORE_EPOCH - 1), 3);
    }
}
