//! Fragmentarium: a local-first fragment engine.
//!
//! Documents go in, immutable fragments come out. Plain text, Markdown,
//! CSV, PDF, DOCX, and zip archives are decomposed into fragments that
//! are appended to a SQLite store and never modified again. On top of the
//! store sit a TF-IDF similarity engine (interactive related-fragment
//! lookup plus a batch signal log) and an export assembler that
//! recombines selected fragments into Markdown, plain text, or a zip
//! bundle.
//!
//! The `frag` binary exposes the engine as a CLI and an HTTP server; this
//! library holds everything else.

pub mod config;
pub mod db;
pub mod export;
pub mod extract;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod server;
pub mod similarity;
pub mod store;
