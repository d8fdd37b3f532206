//! stagedoor - HTTP deployment daemon over the stagehand core
//!
//! This library provides:
//! - `web`: the upload endpoint plus health and status handlers
//! - `serve`: server startup and graceful shutdown
//! - `commands`: one-shot CLI subcommands (deploy, status, vacuum)

pub mod commands;
pub mod serve;
pub mod web;
