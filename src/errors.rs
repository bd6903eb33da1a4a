// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatShellError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Authorization error: {0}")]
    Authorization(String),

    #[error("Invalid command ID: {0}")]
    InvalidCommandId(String),

    #[error("empty command")]
    EmptyCommand,

    #[error("{0} queue is closed")]
    QueueClosed(&'static str),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ChatShellError>;
