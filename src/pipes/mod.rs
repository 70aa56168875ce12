//! In-memory presentation pipes: text filter, grouping and ordering

pub mod filter;
pub mod group;
pub mod order;
pub mod words;

pub use filter::{CHECKED, MatchOptions, apply_filter, filter_property, filter_rows};
pub use group::{CollapsedGroups, RowGroup, group_rows};
pub use order::{
    Direction, OrderKey, compare_values, order_rows, order_values, parse_order, sort_rows,
};
pub use words::{match_words, starts_with_punctuation, strip_accents};
