use std::collections::BTreeSet;

/// Parses a human-entered range string ("1-10,12") into sorted, de-duplicated
/// day indices. Tokens are comma separated; each is a bare integer or an
/// inclusive `A-B` range (reversed bounds are swapped). Malformed tokens are
/// skipped, never an error, so a typo can't block saving a class log.
pub fn parse_range(input: &str) -> Vec<u32> {
    let mut days = BTreeSet::new();
    for token in input.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        match token.split_once('-') {
            Some((a, b)) => {
                let (Ok(start), Ok(end)) = (a.trim().parse::<u32>(), b.trim().parse::<u32>())
                else {
                    continue;
                };
                let (lo, hi) = if start > end { (end, start) } else { (start, end) };
                days.extend(lo..=hi);
            }
            None => {
                if let Ok(n) = token.parse::<u32>() {
                    days.insert(n);
                }
            }
        }
    }
    days.into_iter().collect()
}
