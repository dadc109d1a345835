use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use itertools::Itertools;
use tracing::{debug, info};

use crate::codec::{read_all, KeyValueWriter};
use crate::utils::{staging_path, PartitionLayout};
use crate::*;

/// Runs reduce task `reduce_task`: gathers its partition from each of the
/// `n_map` map tasks, groups the records by key and writes one
/// `(key, reduce_fn(key, values))` record per distinct key, in ascending key
/// order, to `out_file`.
///
/// Any partition that cannot be opened or decoded fails the whole task, and
/// `out_file` is left untouched: output is staged next to it and only renamed
/// into place once every key has been reduced.
pub fn do_reduce(
    layout: &PartitionLayout,
    job_name: &str,
    reduce_task: u32,
    out_file: &Path,
    n_map: u32,
    reduce_fn: ReduceFn,
) -> Result<()> {
    let mut kvs: Vec<KeyValue> = Vec::new();
    for map_task in 0..n_map {
        let path = layout.partition(job_name, map_task, reduce_task);
        let mut records = read_all(&path)
            .with_context(|| format!("reduce task {reduce_task} cannot read map task {map_task}'s output"))?;
        kvs.append(&mut records);
    }
    debug!(job = job_name, reduce_task, records = kvs.len(), "shuffled partitions");

    // Stable, so each key's values stay in map-task order.
    kvs.sort_by(|a, b| a.key.cmp(&b.key));

    let staged = staging_path(out_file);
    let written = write_groups(&staged, kvs, reduce_fn);
    let keys = match written {
        Ok(keys) => keys,
        Err(err) => {
            let _ = fs::remove_file(&staged);
            return Err(err);
        }
    };
    fs::rename(&staged, out_file)
        .with_context(|| format!("failed to move output into {}", out_file.display()))?;

    info!(job = job_name, reduce_task, keys, "reduce task done");
    Ok(())
}

/// Reduces each run of equal keys in the sorted `kvs` and encodes the results
/// into `path`. Returns the number of distinct keys.
fn write_groups(path: &Path, kvs: Vec<KeyValue>, reduce_fn: ReduceFn) -> Result<usize> {
    let mut writer = KeyValueWriter::create(path)?;
    let mut keys = 0;
    for (key, group) in &kvs.into_iter().chunk_by(|kv| kv.key.clone()) {
        let values = group.map(KeyValue::into_value);
        let value = reduce_fn(&key, Box::new(values))
            .with_context(|| format!("reduce function failed on key {key:?}"))?;
        writer.write(&KeyValue { key, value })?;
        keys += 1;
    }
    writer.finish()?;
    Ok(keys)
}

/// Combines the outputs of all `n_reduce` reduce tasks into the job's final
/// artifact: one `key: value` line per key, sorted by key.
pub fn merge(layout: &PartitionLayout, job_name: &str, n_reduce: u32, out_file: &Path) -> Result<()> {
    let mut kvs = Vec::new();
    for reduce_task in 0..n_reduce {
        let mut records = read_all(&layout.result(job_name, reduce_task))?;
        kvs.append(&mut records);
    }
    kvs.sort_by(|a, b| a.key.cmp(&b.key));

    let staged = staging_path(out_file);
    {
        let file = File::create(&staged)
            .with_context(|| format!("failed to create {}", staged.display()))?;
        let mut out = BufWriter::new(file);
        for kv in &kvs {
            writeln!(out, "{}: {}", kv.key, kv.value)?;
        }
        out.flush()?;
    }
    fs::rename(&staged, out_file)
        .with_context(|| format!("failed to move merged output into {}", out_file.display()))?;
    info!(job = job_name, keys = kvs.len(), out = %out_file.display(), "merged reduce outputs");
    Ok(())
}
