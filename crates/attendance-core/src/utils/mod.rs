//! Utility functions for formatting, date handling and string comparison.

pub mod format;

// Re-export commonly used functions at module level
pub use format::{
    cmp_ignore_case, contains_ignore_case, days_until, escape_html, format_currency, format_date,
    format_date_slash, format_date_time, format_time, is_past, parse_date, truncate,
};
