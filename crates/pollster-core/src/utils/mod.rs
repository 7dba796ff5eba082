//! Utility functions for display formatting.

pub mod format;

pub use format::{format_date, format_datetime, percent_bar, truncate_string};
