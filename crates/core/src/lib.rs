//! Core of the now-playing adapter
//!
//! Keeps the last-known state of the operating system's active media session
//! and translates host queries and commands against it. Platform backends
//! plug in through the traits in [`traits`].

pub mod cache;
pub mod command;
pub mod cover;
pub mod models;
pub mod query;
pub mod settings;
pub mod traits;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use cache::SessionCache;
pub use command::{Command, CommandError, CommandTranslator, LegacyCommand};
pub use cover::CoverStore;
pub use models::*;
pub use query::QueryTranslator;
pub use settings::{data_dir_for, AdapterSettings};
pub use traits::*;
