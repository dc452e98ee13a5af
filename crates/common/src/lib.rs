// mirrorsync-common: shared types and utilities for the mirrorsync workspace

pub mod refname;
pub mod remote;
pub mod types;
