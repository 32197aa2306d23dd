//! Skill-similarity matching for a skill-swap service.
//!
//! Offered skills are read from the application's SQLite database, described
//! in a sentence each by a local LLM, embedded, and indexed for exact cosine
//! search. An ad-hoc term goes through the same describe-then-embed path and
//! is matched against the index.
//!
//! # Architecture
//!
//! - **Backend**: an Ollama-compatible HTTP service provides text generation
//!   (`/generate`), embeddings (`/embeddings`) and the model list (`/tags`)
//! - **Pipeline**: dedup → availability gate → batched descriptions with
//!   per-skill fallback → bounded concurrent embedding fetch → flat index
//! - **Artifacts**: an index file and a JSON skill manifest, written as a
//!   checked pair; row `i` of the index is manifest entry `i`
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`db`]: SQLite access to the offered-skill list
//! - [`backend`]: Inference backend trait and HTTP client
//! - [`pipeline`]: Rebuild and query orchestration
//! - [`index`]: Flat cosine index and its on-disk pair
//! - [`server`]: HTTP trigger surface (rebuild, similar, health)

pub mod backend;
pub mod config;
pub mod db;
pub mod index;
pub mod pipeline;
pub mod server;
