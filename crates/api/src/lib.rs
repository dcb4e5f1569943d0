//! Admin HTTP surface and process wiring for the price watcher.

pub mod app;
