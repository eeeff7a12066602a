pub mod sqlitefs;
pub mod stdin_source;
