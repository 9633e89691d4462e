//! HTTP control surface for the catalog migration engine.

pub mod app;
