//! # kb-sync
//!
//! Uploads a local folder of documents into a remote knowledge-base
//! collection, exactly once per file content.
//!
//! A batch logs in, finds or creates the target collection, walks the folder
//! for supported documents, drops every file whose current content is already
//! in the upload ledger, and uploads the rest one by one with a pause between
//! requests. Each success is flushed to the ledger straight away, so running
//! the same batch again only uploads what is new, changed, or previously failed.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐
//! │  Login   │──▶│ Resolve  │──▶│  Scan +  │──▶│  Upload  │
//! │ (client) │   │collection│   │  filter  │   │   loop   │
//! └──────────┘   └──────────┘   └────┬─────┘   └────┬─────┘
//!                                    │  ledger      │ mark uploaded
//!                                    ▼              ▼
//!                               ┌─────────────────────────┐
//!                               │  upload_record.json     │
//!                               └─────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! kbsync upload ./docs --collection Docs --url http://localhost:6185 --username admin
//! kbsync upload ./docs --dry-run       # show what would be uploaded
//! kbsync ledger                        # list recorded uploads
//! kbsync collections                   # list remote collections
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Ledger record and wire types |
//! | [`ledger`] | Content-addressed upload ledger |
//! | [`client`] | Knowledge-base service client |
//! | [`resolver`] | Target collection resolution |
//! | [`scan`] | Supported-file discovery |
//! | [`pipeline`] | Batch orchestration |
//! | [`progress`] | Progress reporting |
//! | [`logging`] | tracing subscriber setup |

pub mod client;
pub mod config;
pub mod ledger;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod resolver;
pub mod scan;
