// mirrorsync-engine: git plumbing, synchronization, configuration.

pub mod config;
pub mod git;
pub mod lock;
pub mod security;
pub mod sync;
