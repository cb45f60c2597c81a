use std::collections::BTreeSet;

/// Normalises a description to lowercase alphanumeric words joined by
/// single spaces.
pub fn normalize(s: &str) -> String {
    s.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lowercase alphanumeric tokens strictly longer than `min_len` characters.
pub fn tokens(s: &str, min_len: usize) -> BTreeSet<String> {
    s.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > min_len)
        .map(|w| w.to_string())
        .collect()
}

/// Count of tokens longer than 3 characters shared by both texts.
pub fn shared_long_tokens(a: &str, b: &str) -> usize {
    let ta = tokens(a, 3);
    let tb = tokens(b, 3);
    ta.intersection(&tb).count()
}

/// Boolean description-overlap test used by the resolution stages: true on
/// normalized equality, containment either way, or at least one shared
/// token longer than 3 characters.
pub fn descriptions_overlap(a: &str, b: &str) -> bool {
    let na = normalize(a);
    let nb = normalize(b);
    if na.is_empty() || nb.is_empty() {
        return false;
    }
    na == nb || na.contains(&nb) || nb.contains(&na) || shared_long_tokens(a, b) > 0
}

/// Levenshtein edit distance using the two-row O(min(m,n)) space algorithm.
pub fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let a = s1.as_bytes();
    let b = s2.as_bytes();
    let (m, n) = (a.len(), b.len());

    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }

    // Keep the shorter string in the inner loop to minimise allocation.
    let (a, b, m, n) = if m <= n { (a, b, m, n) } else { (b, a, n, m) };

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0usize; n + 1];

    for i in 1..=m {
        curr[0] = i;
        for j in 1..=n {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}

/// Normalised Levenshtein similarity in [0.0, 1.0], recorded alongside
/// human decisions for the learner.
pub fn description_similarity(s1: &str, s2: &str) -> f64 {
    let a = normalize(s1);
    let b = normalize(s2);

    if a == b {
        return 1.0;
    }

    let max_len = a.len().max(b.len());
    if max_len == 0 {
        return 1.0;
    }

    1.0 - (levenshtein_distance(&a, &b) as f64 / max_len as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_punctuation_and_case() {
        assert_eq!(normalize("Payment: CLIENT-12 (invoice)"), "payment client 12 invoice");
    }

    #[test]
    fn tokens_respect_min_length() {
        let t = tokens("paid for web hosting services", 3);
        assert!(t.contains("hosting"));
        assert!(t.contains("services"));
        assert!(t.contains("paid"));
        assert!(!t.contains("for"));
        assert!(!t.contains("web"));
    }

    #[test]
    fn shared_long_tokens_counts_intersection() {
        assert_eq!(
            shared_long_tokens("monthly hosting invoice", "hosting invoice payment"),
            2
        );
        assert_eq!(shared_long_tokens("alpha beta", "gamma delta"), 0);
    }

    #[test]
    fn overlap_on_containment() {
        assert!(descriptions_overlap("Client 12 payment", "Payment received from Client 12 payment"));
    }

    #[test]
    fn overlap_on_shared_token() {
        assert!(descriptions_overlap("ACME invoice 443", "invoice paid"));
    }

    #[test]
    fn no_overlap_for_unrelated_text() {
        assert!(!descriptions_overlap("coffee shop", "annual rent"));
    }

    #[test]
    fn no_overlap_for_empty_text() {
        assert!(!descriptions_overlap("", "anything"));
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein_distance("abc", "abc"), 0);
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert_eq!(levenshtein_distance("cat", "bat"), 1);
    }

    #[test]
    fn similarity_identical_is_one() {
        assert_eq!(description_similarity("AMAZON", "amazon"), 1.0);
    }

    #[test]
    fn similarity_unrelated_is_low() {
        assert!(description_similarity("AMAZON", "STARBUCKS") < 0.5);
    }
}
