//! # contentkit-cli
//!
//! Command-line front end for content packs: `upload` pushes packs, entity
//! directories and single files to a content server, `validate` lints them
//! on disk.

pub mod cli;
pub mod client;
pub mod logging;
pub mod upload;

pub use client::{ClientConfig, ClientError, ContentClient, HttpContentClient};
pub use upload::Uploader;
pub use upload::summary::UploadSummary;
