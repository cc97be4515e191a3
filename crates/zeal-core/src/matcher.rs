//! Symbol match scoring, following the DevDocs searcher heuristics.
//!
//! All scoring operates on munged strings (see [`munge`]) and byte offsets,
//! so results are stable across docsets regardless of the original symbol
//! spelling.

/// Maximum haystack characters skipped between two matched needle characters.
const MAX_DISTANCE: usize = 8;

/// Maximum haystack characters skipped while looking for the start of a match.
const MAX_GROUP_COUNT: usize = 3;

const DOT: u8 = b'.';

/// Canonicalizes a symbol string for matching: lowercase, with `"::"`, `" "`
/// and `"/"` collapsed to `"."`.
pub fn munge(s: &str) -> String {
    s.to_lowercase()
        .replace("::", ".")
        .replace(' ', ".")
        .replace('/', ".")
}

/// Scores an exact substring match of length `match_len` found at byte
/// offset `match_index` of the munged string `value`.
///
/// Returns a score in `1..=100`, or 0 for a rejected single-character match
/// that is neither at the start of the string nor preceded by a dot.
pub fn score_exact(match_index: usize, match_len: usize, value: &str) -> i32 {
    let value = value.as_bytes();
    let mut score: i32 = 100;

    // One point per unmatched character.
    score -= (value.len() - match_len) as i32;

    if match_index > 0 {
        if value[match_index - 1] == DOT {
            // A match right after a dot scores like a match at the start of
            // the string, minus one.
            score += match_index as i32 - 1;
        } else if match_len == 1 {
            return 0;
        } else {
            // One point per unmatched character back to the nearest dot (or
            // the start), plus one per unmatched character after the match.
            let mut i = match_index as i32 - 2;
            while i >= 0 && value[i as usize] != DOT {
                i -= 1;
            }
            score -= (match_index as i32 - i)
                + (value.len() as i32 - match_len as i32 - match_index as i32);
        }

        // One point per dot before the match, not counting the one
        // immediately preceding it.
        let mut i = match_index as i32 - 2;
        while i >= 0 {
            if value[i as usize] == DOT {
                score -= 1;
            }
            i -= 1;
        }
    }

    // Five points per dot after the match.
    for &b in &value[match_index + match_len..] {
        if b == DOT {
            score -= 5;
        }
    }

    score.max(1)
}

/// Scores a fuzzy match span as produced by [`match_fuzzy`].
///
/// `index` is the one-past-start offset convention used by [`match_fuzzy`]
/// spans; passing 0 scores the span as anchored at the string start.
pub fn score_fuzzy(value: &str, index: usize, length: usize) -> i32 {
    score_fuzzy_bytes(value.as_bytes(), index, length)
}

fn score_fuzzy_bytes(value: &[u8], index: usize, length: usize) -> i32 {
    if index == 0 || value[index - 1] == DOT {
        // 66..99 when the match follows a dot or starts the string.
        (100 - length as i32).max(66)
    } else if value.len() == index + length {
        // 33..66 when the match runs to the end of the string.
        (67 - length as i32).max(33)
    } else {
        // 1..33 for a match in the middle.
        (34 - length as i32).max(1)
    }
}

/// Greedy subsequence match of `needle` in `haystack` with one level of
/// recursive retry past the first matched character.
///
/// Returns `(start, length)` where `start` is one-based: the span covers
/// `haystack[start - 1..start - 1 + length]`. A run is abandoned once
/// [`MAX_GROUP_COUNT`] needle characters have each opened their own group
/// of skipped haystack characters, or once [`MAX_DISTANCE`] characters are
/// skipped between matches past the first needle character. When the
/// recursive retry scores better than the primary span, the retry's span
/// is returned as-is, relative to the suffix it was searched in.
pub fn match_fuzzy(needle: &str, haystack: &str) -> Option<(usize, usize)> {
    match_fuzzy_bytes(needle.as_bytes(), haystack.as_bytes())
}

fn match_fuzzy_bytes(needle: &[u8], haystack: &[u8]) -> Option<(usize, usize)> {
    let mut start: Option<usize> = None;
    let mut length = 0usize;

    let mut group_count = 0usize;
    let mut best_recursive: Option<(i32, usize, usize)> = None;

    let mut j = 0usize;
    for i in 0..needle.len() {
        let mut found = false;
        let mut first = true;
        let mut distance = 0usize;

        while j < haystack.len() {
            j += 1;
            if needle[i] == haystack[j - 1] {
                if start.is_none() {
                    start = Some(j);

                    // The first needle character may recur later in the
                    // haystack; try starting there and keep the better span
                    // in reserve.
                    if let Some((rs, rl)) = match_fuzzy_bytes(needle, &haystack[j..]) {
                        let recursive_score = score_fuzzy_bytes(haystack, rs, rl);
                        if best_recursive.is_none_or(|(best, _, _)| recursive_score > best) {
                            best_recursive = Some((recursive_score, rs, rl));
                        }
                    }
                }

                length = j - start.unwrap_or(j) + 1;
                found = true;
                break;
            }

            // Too many mismatches before this needle character.
            if first {
                group_count += 1;
                if group_count >= MAX_GROUP_COUNT {
                    break;
                }
                first = false;
            }

            // Too large a gap between matched characters.
            if i != 0 {
                distance += 1;
                if distance >= MAX_DISTANCE {
                    break;
                }
            }
        }

        if !found {
            // Ran out of haystack; fall back to the recursive span if one
            // matched under the same constraints.
            return best_recursive.map(|(_, s, l)| (s, l));
        }
    }

    let start = start?;
    let score = score_fuzzy_bytes(haystack, start, length);
    match best_recursive {
        Some((recursive_score, s, l)) if recursive_score > score => Some((s, l)),
        _ => Some((start, length)),
    }
}
