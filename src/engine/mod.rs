//! Task bodies: what a worker actually does with a map or reduce task.

pub mod map;
pub mod reduce;

pub use map::do_map;
pub use reduce::{do_reduce, merge};
