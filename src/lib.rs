//! Garbage collection for deleted document versions.
//!
//! Document versions live in two places: a row in the metadata database and a
//! set of blobs under a content-addressed path in object storage. The ingestion
//! path only marks versions deleted; [`jobs::Scrubber`] later removes their
//! blobs and rows, unless a live version of the same document still shares the
//! content.

pub mod config;
pub mod db;
pub mod jobs;
pub mod models;
pub mod observability;
pub mod services;
