pub mod cache;
pub mod distance;
pub mod fuzzy;
