//! Feature extraction shared by every learning module
//!
//! Strings become lower-cased tokens longer than two characters, split on
//! whitespace with surrounding punctuation trimmed, so contractions and
//! hyphenated terms stay whole. Objects contribute their keys, arrays the
//! features of their elements, and scalars their string form.

use serde_json::Value;
use std::collections::BTreeSet;

/// Minimum token length (exclusive) kept from free text
const MIN_TOKEN_LEN: usize = 2;

/// Anything that can be turned into a set of discrete features
pub trait Featurize {
    /// Push the features of `self` into `out`
    fn collect_features(&self, out: &mut BTreeSet<String>);

    /// Sorted, de-duplicated features
    fn features(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_features(&mut out);
        out
    }
}

impl Featurize for str {
    fn collect_features(&self, out: &mut BTreeSet<String>) {
        out.extend(
            self.split_whitespace()
                .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()))
                .filter(|token| token.chars().count() > MIN_TOKEN_LEN)
                .map(str::to_lowercase),
        );
    }
}

impl Featurize for String {
    fn collect_features(&self, out: &mut BTreeSet<String>) {
        self.as_str().collect_features(out);
    }
}

impl Featurize for Value {
    fn collect_features(&self, out: &mut BTreeSet<String>) {
        match self {
            Value::String(text) => text.collect_features(out),
            Value::Object(map) => out.extend(map.keys().cloned()),
            Value::Array(items) => {
                for item in items {
                    item.collect_features(out);
                }
            }
            Value::Number(n) => {
                out.insert(n.to_string());
            }
            Value::Bool(b) => {
                out.insert(b.to_string());
            }
            Value::Null => {}
        }
    }
}

/// Extract features from a structured input
pub fn extract_features(value: &Value) -> BTreeSet<String> {
    value.features()
}

/// String form of a value: raw text for strings, JSON for everything else
pub fn value_label(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Jaccard similarity of two feature sets. Two empty sets are identical.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}
