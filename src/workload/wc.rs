//! A MapReduce-compatible implementation of word count.
//!

use crate::*;
use anyhow::Result;

pub fn map(_file: &str, contents: &str) -> Vec<KeyValue> {
    contents
        .split(|c: char| !c.is_alphabetic())
        .filter(|s| !s.is_empty())
        .map(|word| KeyValue::new(word.to_lowercase(), "1"))
        .collect()
}

pub fn reduce(_key: &str, values: Box<dyn Iterator<Item = String> + '_>) -> Result<String> {
    let mut count: u64 = 0;
    for value in values {
        count += value.parse::<u64>()?;
    }
    Ok(count.to_string())
}
