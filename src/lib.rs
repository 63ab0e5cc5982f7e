//! # citegate
//!
//! Permission-filtered document search that turns a user's question into
//! citation-ready context for a downstream language model.
//!
//! Every search runs on behalf of a user. The user's email is resolved to a
//! directory identity, the identity to the one backend collection that user
//! may read, and the search is scoped to that collection. Any failure along
//! the way denies access; it never widens the search.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌───────────┐   ┌────────────┐   ┌──────────┐
//! │  query    │──▶│ directory │──▶│ collection │──▶│  search  │
//! │  parser   │   │  (LDAP)   │   │  resolver  │   │  (R2R)   │
//! └───────────┘   └───────────┘   └────────────┘   └────┬─────┘
//!                                                       │
//!                  ┌──────────┐   ┌──────────┐          │
//!                  │ context  │◀──│ results  │◀─────────┘
//!                  │assembler │   │processor │
//!                  └────┬─────┘   └──────────┘
//!                       ▼
//!              CLI (`citegate`) / HTTP
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Request-scoped data types |
//! | [`error`] | Client and pipeline error types |
//! | [`query`] | Split raw input into search terms and instructions |
//! | [`directory`] | Email → authorization scope via LDAP |
//! | [`backend`] | R2R collection lookup and search clients |
//! | [`collection`] | Permission policy and scope → collection filter |
//! | [`search`] | Filtered search execution |
//! | [`citation`] | Citation id, file id, and link derivation |
//! | [`results`] | Relevance filter, bounding, and clipping |
//! | [`context`] | Render the context block and source list |
//! | [`pipeline`] | End-to-end orchestration and CLI entry points |
//! | [`server`] | HTTP server |
//! | [`logging`] | Tracing subscriber setup |

pub mod backend;
pub mod citation;
pub mod collection;
pub mod config;
pub mod context;
pub mod directory;
pub mod error;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod query;
pub mod results;
pub mod search;
pub mod server;
