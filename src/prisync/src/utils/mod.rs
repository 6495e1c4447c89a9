//! Utilities. Not intended to be used outside of this crate.
pub(crate) mod panicking;
