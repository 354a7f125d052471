// error.rs — Load and configuration errors

use thiserror::Error;

/// Fatal world load failures. Any of these aborts the load before the
/// world is published.
#[derive(Debug, Error)]
pub enum BspError {
    #[error("{name}: file too short ({len} bytes)")]
    TooShort { name: String, len: usize },

    #[error("{name}: not an IBSP file (ident {ident:#010x})")]
    WrongIdent { name: String, ident: i32 },

    #[error("{name} has wrong version number ({found} should be {expected})")]
    WrongVersion {
        name: String,
        found: i32,
        expected: i32,
    },

    #[error("{name}: funny lump size in {lump} ({len} bytes is not a multiple of {record})")]
    FunnyLumpSize {
        name: String,
        lump: &'static str,
        len: usize,
        record: usize,
    },

    #[error("{name}: lump {lump} (offset {offset}, length {len}) lies outside the file")]
    LumpOutOfBounds {
        name: String,
        lump: &'static str,
        offset: i64,
        len: i64,
    },

    #[error("{name}: bad {what} index {index} (count {count})")]
    BadIndex {
        name: String,
        what: &'static str,
        index: i64,
        count: usize,
    },

    #[error("{name}: bad surface type {surface_type} on surface {surface}")]
    BadSurfaceType {
        name: String,
        surface: usize,
        surface_type: i32,
    },

    #[error("{name}: fog {fog}: {reason}")]
    BadFog {
        name: String,
        fog: usize,
        reason: String,
    },

    #[error("{surface}: indices > MAX ({count} >= {max})")]
    IndexBudget {
        surface: String,
        count: usize,
        max: usize,
    },

    #[error("attempted to redundantly load world map {0}")]
    AlreadyLoaded(String),

    #[error("couldn't load {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("couldn't read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("bad config: {0}")]
    Parse(#[from] toml::de::Error),
}
