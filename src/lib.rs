//! # Agentic Search
//!
//! Keeps a remote document index in step with a local folder.
//!
//! A folder is enumerated under gitignore-style rules, compared by relative
//! path against the file set recorded at the last sync, and only the
//! difference is sent to the remote: new files are uploaded, deleted files
//! are removed. After submitting, the engine polls the remote until indexing
//! settles, times out or polling fails for good, then records the new file
//! set.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌────────────┐   ┌───────────┐   ┌────────────┐
//! │ ignore_rules│──▶│  scanner   │──▶│ reconcile │──▶│   apply    │
//! │ pattern     │   │  (walkdir) │   │ (set diff)│   │ (PlanExec.)│
//! └─────────────┘   └────────────┘   └───────────┘   └─────┬──────┘
//!                                                          │
//!                     ┌──────────┐   ┌──────────┐          ▼
//!                     │  state   │◀──│   wait   │◀──  RemoteIndex
//!                     │  (JSON)  │   │ (polling)│     (openai/memory)
//!                     └──────────┘   └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`pattern`] | Gitignore-style pattern compilation |
//! | [`ignore_rules`] | Built-in names and layered ignore files |
//! | [`scanner`] | Deterministic folder enumeration |
//! | [`reconcile`] | Local/remote set difference |
//! | [`apply`] | Applying a plan to the remote |
//! | [`wait`] | Polling indexing progress with backoff and deadline |
//! | [`remote`] | Remote index trait, OpenAI and in-memory implementations |
//! | [`state`] | Persisted index state |
//! | [`config`] | TOML configuration |
//! | [`ingest`] | `init` and `sync` |
//! | [`stats`] | `list` and `stats` |
//! | [`cleanup`] | `cleanup` |
//! | [`progress`] | Progress events on stderr |
//! | [`logging`] | Diagnostic logging setup |

pub mod apply;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod ignore_rules;
pub mod ingest;
pub mod logging;
pub mod models;
pub mod pattern;
pub mod progress;
pub mod prompt;
pub mod reconcile;
pub mod remote;
pub mod scanner;
pub mod state;
pub mod stats;
pub mod wait;
