//! Deterministic feature extraction from a raw domain string.
//!
//! Features are computed over the lowercased second-level label only
//! (`kq3v9z7j1x5f8g2h.info` -> `kq3v9z7j1x5f8g2h`). Training data was built
//! the same way, so any change here must bump [`FEATURE_SCHEMA`].

use std::collections::HashMap;

use super::error::{DetectionError, Result};
use super::types::{FeatureSchema, FeatureVector};

/// Schema tag embedded in every artifact trained on these features.
pub const FEATURE_SCHEMA: &str = "dga-features/v1";

/// Number of features in the vector.
pub const FEATURE_COUNT: usize = 2;

/// Feature names, in vector order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "length",  // chars in the second-level label
    "entropy", // Shannon entropy (bits) of the label's char distribution
];

pub fn schema() -> FeatureSchema {
    FeatureSchema::new(FEATURE_SCHEMA, &FEATURE_NAMES)
}

/// Extract the feature vector for `domain`.
pub fn extract(domain: &str) -> Result<FeatureVector> {
    let label = second_level_label(domain)?;

    let length = label.chars().count() as f64;
    let entropy = shannon_entropy(&label);

    Ok(FeatureVector::new(
        FEATURE_SCHEMA,
        vec![
            (FEATURE_NAMES[0].to_string(), length),
            (FEATURE_NAMES[1].to_string(), entropy),
        ],
    ))
}

/// Normalize and pick the label features are computed over: the
/// second-to-last dot-separated part, or the whole name if it has no dot.
pub fn second_level_label(domain: &str) -> Result<String> {
    let normalized = domain.trim().to_lowercase();
    let normalized = normalized.strip_suffix('.').unwrap_or(&normalized);
    if normalized.is_empty() {
        return Err(DetectionError::validation(domain, "domain is empty"));
    }

    let parts: Vec<&str> = normalized.split('.').collect();
    let label = if parts.len() >= 2 {
        parts[parts.len() - 2]
    } else {
        parts[0]
    };

    if label.is_empty() {
        return Err(DetectionError::validation(
            domain,
            "second-level label is empty",
        ));
    }
    Ok(label.to_string())
}

/// Shannon entropy in bits over the char distribution of `s`.
/// Zero for empty or single-symbol strings.
pub fn shannon_entropy(s: &str) -> f64 {
    let mut counts: HashMap<char, u64> = HashMap::new();
    let mut total = 0u64;
    for c in s.chars() {
        *counts.entry(c).or_insert(0) += 1;
        total += 1;
    }
    if total == 0 {
        return 0.0;
    }

    // Sum in a fixed order so results are bit-identical across calls.
    let mut freqs: Vec<(char, u64)> = counts.into_iter().collect();
    freqs.sort_unstable();

    let total_f = total as f64;
    let entropy: f64 = freqs
        .iter()
        .map(|&(_, count)| {
            let p = count as f64 / total_f;
            -p * p.log2()
        })
        .sum();
    // -0.0 for a single symbol
    entropy.max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_label_selection() {
        assert_eq!(second_level_label("kq3v9z7j1x5f8g2h.info").unwrap(), "kq3v9z7j1x5f8g2h");
        assert_eq!(second_level_label("WWW.CNN.COM").unwrap(), "cnn");
        assert_eq!(second_level_label("cnn.com.").unwrap(), "cnn");
        assert_eq!(second_level_label("  localhost ").unwrap(), "localhost");
    }

    #[test]
    fn test_rejects_empty_input() {
        for bad in ["", "   ", ".", ".com"] {
            let err = extract(bad).unwrap_err();
            assert!(matches!(err, DetectionError::Validation { .. }), "{bad:?}: {err}");
        }
    }

    #[test]
    fn test_known_values() {
        let fv = extract("kq3v9z7j1x5f8g2h.info").unwrap();
        assert_eq!(fv.get("length"), Some(16.0));
        // 16 distinct chars -> log2(16)
        assert!((fv.get("entropy").unwrap() - 4.0).abs() < 1e-12);

        let fv = extract("cnn.com").unwrap();
        assert_eq!(fv.get("length"), Some(3.0));
        let expected = -(1.0 / 3.0f64) * (1.0 / 3.0f64).log2() - (2.0 / 3.0f64) * (2.0 / 3.0f64).log2();
        assert!((fv.get("entropy").unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_identical_chars_have_zero_entropy() {
        assert_eq!(shannon_entropy("aaaaaaa"), 0.0);
        assert_eq!(shannon_entropy("z"), 0.0);
        assert_eq!(shannon_entropy(""), 0.0);
    }

    #[test]
    fn test_length_counts_chars_not_bytes() {
        let fv = extract("bücher.de").unwrap();
        assert_eq!(fv.get("length"), Some(6.0));
    }

    #[test]
    fn test_vector_matches_schema() {
        let fv = extract("example.org").unwrap();
        assert!(schema().matches(&fv));
        assert_eq!(fv.names().collect::<Vec<_>>(), FEATURE_NAMES.to_vec());
    }

    proptest! {
        #[test]
        fn prop_extract_is_deterministic(domain in "[a-z0-9-]{1,30}\\.[a-z]{2,6}") {
            let first = extract(&domain).unwrap();
            let second = extract(&domain).unwrap();
            prop_assert_eq!(first.values(), second.values());
        }

        #[test]
        fn prop_entropy_bounded(label in "\\PC{0,40}") {
            let h = shannon_entropy(&label);
            let distinct = label.chars().collect::<std::collections::HashSet<_>>().len();
            prop_assert!(h >= 0.0);
            prop_assert!(h <= (distinct.max(1) as f64).log2() + 1e-9);
        }

        #[test]
        fn prop_case_insensitive(domain in "[a-zA-Z0-9]{1,20}\\.[a-zA-Z]{2,4}") {
            let upper = extract(&domain.to_uppercase()).unwrap();
            let lower = extract(&domain.to_lowercase()).unwrap();
            prop_assert_eq!(upper.values(), lower.values());
        }
    }
}
