pub mod fuzzy_matcher;
pub mod http_fetch;
pub mod in_memory_catalog;
