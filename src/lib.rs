#![forbid(unsafe_code)]

pub mod cli;
pub mod config;
pub mod content;
pub mod download;
pub mod error;
pub mod fetch;
pub mod formats;
pub mod html;
pub mod localize;
pub mod logging;
pub mod queue;
pub mod render;
pub mod report;
pub mod retry;
pub mod shortlinks;
pub mod store;
pub mod template;
pub mod trackers;
