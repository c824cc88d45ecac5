//! Command handlers for the MetaVision CLI.

pub mod cache;
pub mod config;
pub mod extract;
pub mod theme;
