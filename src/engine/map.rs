use std::fs;

use anyhow::{bail, Context, Result};
use tracing::debug;

use crate::codec::KeyValueWriter;
use crate::utils::{staging_path, PartitionLayout};
use crate::*;

/// Runs map task `map_task` over `input_file`, splitting its output into
/// `n_reduce` intermediate partitions.
///
/// All `n_reduce` partitions are written, empty ones included, so that every
/// reduce task finds one input per map task.
pub fn do_map(
    layout: &PartitionLayout,
    job_name: &str,
    map_task: u32,
    input_file: &str,
    n_reduce: u32,
    map_fn: MapFn,
) -> Result<()> {
    if n_reduce == 0 {
        bail!("map task {map_task} needs at least one reduce partition");
    }
    let contents = fs::read_to_string(input_file)
        .with_context(|| format!("failed to read map input {input_file}"))?;

    let mut buckets: Vec<Vec<KeyValue>> = vec![Vec::new(); n_reduce as usize];
    for kv in map_fn(input_file, &contents) {
        let bucket_no = ihash(kv.key.as_bytes()) % n_reduce;
        buckets[bucket_no as usize].push(kv);
    }

    for (reduce_task, bucket) in buckets.into_iter().enumerate() {
        let path = layout.partition(job_name, map_task, reduce_task as u32);
        let staged = staging_path(&path);
        let mut writer = KeyValueWriter::create(&staged)?;
        for kv in &bucket {
            writer.write(kv)?;
        }
        writer.finish()?;
        fs::rename(&staged, &path)
            .with_context(|| format!("failed to move partition into {}", path.display()))?;
        debug!(job = job_name, map_task, reduce_task, records = bucket.len(), "wrote partition");
    }
    Ok(())
}
