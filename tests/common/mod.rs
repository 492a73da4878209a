//! Shared fixtures for integration tests.
//!
//! Builds a throwaway game install (card database plus asset directory), a
//! data directory and a backup directory, and opens a [`Swapper`] on them.

#![allow(dead_code)]

mod fixtures;

pub use fixtures::*;
