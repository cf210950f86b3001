pub mod archive;
pub mod commands;
pub mod config;
pub mod error;
pub mod host;
pub mod http;
pub mod package;
pub mod repository;
pub mod resolver;
pub mod runtime;
