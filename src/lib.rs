//! The scheduling and shuffle core of a MapReduce system.
//!
//! A master splits a [`Job`] into map and reduce tasks and hands them out to an
//! elastic pool of workers over gRPC. Each reduce task pulls the intermediate
//! partitions every map task wrote for it, sorts and groups them by key, and
//! calls the application's reduce function once per distinct key.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hasher;

pub mod cmd;
pub mod codec;
pub mod dispatch;
pub mod engine;
pub mod master;
pub mod registry;
pub mod schedule;
pub mod utils;
pub mod worker;
pub mod workload;

/// Generated gRPC client and server code for `proto/mapreduce.proto`.
pub mod rpc {
    tonic::include_proto!("mapreduce");
}

/////////////////////////////////////////////////////////////////////////////
// MapReduce application types
/////////////////////////////////////////////////////////////////////////////

/// A map function takes the name of an input file and its contents.
///
/// It returns every intermediate key-value pair emitted for that file.
pub type MapFn = fn(file: &str, contents: &str) -> Vec<KeyValue>;

/// A reduce function takes in a key and an iterator over every value
/// emitted for that key. It returns an [`anyhow::Result`]
/// containing a single output value.
///
/// Values arrive ordered by map task index, then by their position in that
/// map task's output. Applications should not rely on this order.
pub type ReduceFn =
    fn(key: &str, values: Box<dyn Iterator<Item = String> + '_>) -> anyhow::Result<String>;

/// A map reduce application.
#[derive(Copy, Clone)]
pub struct Workload {
    pub map_fn: MapFn,
    pub reduce_fn: ReduceFn,
}

/////////////////////////////////////////////////////////////////////////////
// Key-value pairs
/////////////////////////////////////////////////////////////////////////////

/// A single key-value pair.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
pub struct KeyValue {
    /// The key.
    pub key: String,
    /// The value.
    pub value: String,
}

impl KeyValue {
    /// Construct a new key-value pair from the given key and value.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Borrow the key of this key-value pair.
    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Borrow the value of this key-value pair.
    #[inline]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Consumes the key-value pair and returns the value.
    #[inline]
    pub fn into_value(self) -> String {
        self.value
    }
}

/// Hashes an intermediate key. Compute a reduce bucket for a given key
/// by calculating `ihash(key) % n_reduce`.
pub fn ihash(key: &[u8]) -> u32 {
    let mut hasher = fnv::FnvHasher::default();
    hasher.write(key);
    (hasher.finish() & 0x7fffffff) as u32
}

/////////////////////////////////////////////////////////////////////////////
// Jobs, phases and tasks
/////////////////////////////////////////////////////////////////////////////

/// The two stages of a job. No reduce task starts before every map task
/// of the same job has succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Map,
    Reduce,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Map => f.write_str("mapPhase"),
            Phase::Reduce => f.write_str("reducePhase"),
        }
    }
}

impl From<Phase> for rpc::Phase {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Map => rpc::Phase::Map,
            Phase::Reduce => rpc::Phase::Reduce,
        }
    }
}

impl From<rpc::Phase> for Phase {
    fn from(phase: rpc::Phase) -> Self {
        match phase {
            rpc::Phase::Map => Phase::Map,
            rpc::Phase::Reduce => Phase::Reduce,
        }
    }
}

/// One MapReduce computation. Read-only once created.
#[derive(Debug, Clone)]
pub struct Job {
    pub name: String,
    /// Map inputs, one map task per file.
    pub files: Vec<String>,
    pub n_reduce: u32,
}

impl Job {
    pub fn new(name: impl Into<String>, files: Vec<String>, n_reduce: u32) -> Self {
        Self {
            name: name.into(),
            files,
            n_reduce,
        }
    }

    #[inline]
    pub fn n_map(&self) -> u32 {
        self.files.len() as u32
    }

    /// Returns `(ntasks, n_other)` for the given phase: the number of tasks to
    /// run and the size of the opposite phase.
    pub fn tasks(&self, phase: Phase) -> (u32, u32) {
        match phase {
            Phase::Map => (self.n_map(), self.n_reduce),
            Phase::Reduce => (self.n_reduce, self.n_map()),
        }
    }

    /// Builds the argument set for task `index` of `phase`.
    pub fn task_args(&self, phase: Phase, index: u32) -> TaskArgs {
        let (_, n_other) = self.tasks(phase);
        let file = match phase {
            Phase::Map => self.files[index as usize].clone(),
            Phase::Reduce => String::new(),
        };
        TaskArgs {
            job_name: self.name.clone(),
            file,
            phase,
            task_number: index,
            num_other_phase: n_other,
        }
    }
}

/// Everything a worker needs to run one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskArgs {
    pub job_name: String,
    /// Input file for map tasks, empty for reduce tasks.
    pub file: String,
    pub phase: Phase,
    pub task_number: u32,
    /// Reduce count for a map task, map count for a reduce task.
    pub num_other_phase: u32,
}

impl From<&TaskArgs> for rpc::DoTaskArgs {
    fn from(args: &TaskArgs) -> Self {
        rpc::DoTaskArgs {
            job_name: args.job_name.clone(),
            input_file: args.file.clone(),
            phase: rpc::Phase::from(args.phase) as i32,
            task_number: args.task_number,
            num_other_phase: args.num_other_phase,
        }
    }
}

impl TryFrom<rpc::DoTaskArgs> for TaskArgs {
    type Error = anyhow::Error;

    fn try_from(args: rpc::DoTaskArgs) -> anyhow::Result<Self> {
        let phase = rpc::Phase::try_from(args.phase)
            .map_err(|_| anyhow::anyhow!("unknown phase {}", args.phase))?;
        Ok(TaskArgs {
            job_name: args.job_name,
            file: args.input_file,
            phase: phase.into(),
            task_number: args.task_number,
            num_other_phase: args.num_other_phase,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_reports_task_counts_per_phase() {
        let job = Job::new("wc", vec!["a.txt".into(), "b.txt".into(), "c.txt".into()], 4);
        assert_eq!(job.tasks(Phase::Map), (3, 4));
        assert_eq!(job.tasks(Phase::Reduce), (4, 3));
    }

    #[test]
    fn reduce_task_args_carry_no_input_file() {
        let job = Job::new("wc", vec!["a.txt".into()], 2);
        let map = job.task_args(Phase::Map, 0);
        assert_eq!(map.file, "a.txt");
        assert_eq!(map.num_other_phase, 2);

        let reduce = job.task_args(Phase::Reduce, 1);
        assert!(reduce.file.is_empty());
        assert_eq!(reduce.num_other_phase, 1);
    }

    #[test]
    fn task_args_survive_the_wire_type() {
        let job = Job::new("ii", vec!["x".into(), "y".into()], 3);
        let args = job.task_args(Phase::Reduce, 2);
        let wire = rpc::DoTaskArgs::from(&args);
        assert_eq!(wire.phase, rpc::Phase::Reduce as i32);
        assert_eq!(TaskArgs::try_from(wire).unwrap(), args);
    }

    #[test]
    fn unknown_wire_phase_is_rejected() {
        let wire = rpc::DoTaskArgs {
            phase: 7,
            ..Default::default()
        };
        assert!(TaskArgs::try_from(wire).is_err());
    }

    #[test]
    fn ihash_stays_within_31_bits() {
        for key in ["", "a", "hello", "the quick brown fox"] {
            assert!(ihash(key.as_bytes()) <= 0x7fffffff);
        }
        assert_eq!(ihash(b"same"), ihash(b"same"));
    }
}
