//! Parsing of the user-facing sync configuration fields.

pub mod frequency;
pub mod repo_url;

pub use frequency::{parse_duration, parse_frequency};
pub use repo_url::RepoCoordinates;
