//! Account registration and login with signed bearer tokens, read-only news
//! and market documents, and chart analysis through a generative model.

pub mod analysis;
pub mod app;
pub mod auth;
pub mod config;
pub mod content;
pub mod db;
pub mod errors;
pub mod state;
