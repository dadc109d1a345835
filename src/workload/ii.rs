//! A MapReduce-compatible inverted index: for every word, the documents
//! that contain it.
//!

use std::collections::BTreeSet;

use crate::*;
use anyhow::Result;

pub fn map(file: &str, contents: &str) -> Vec<KeyValue> {
    let words: BTreeSet<&str> = contents
        .split(|c: char| !c.is_alphabetic())
        .filter(|s| !s.is_empty())
        .collect();
    words
        .into_iter()
        .map(|word| KeyValue::new(word, file))
        .collect()
}

/// Produces `"<count> <doc>,<doc>,..."` with the documents sorted, so the
/// result does not depend on the order values arrive in.
pub fn reduce(_key: &str, values: Box<dyn Iterator<Item = String> + '_>) -> Result<String> {
    let docs: BTreeSet<String> = values.collect();
    Ok(format!(
        "{} {}",
        docs.len(),
        docs.into_iter().collect::<Vec<_>>().join(",")
    ))
}
