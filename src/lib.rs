//! # Card Sync
//!
//! A local-first business-card manager with folder backup.
//!
//! Cards (contacts from scanned business cards) are filed under the user's
//! own profiles, with images, tags and interaction notes, in a local SQLite
//! database. Folder sync keeps a portable JSON backup of the whole dataset
//! in a folder the user picks: written a few seconds after each change, and
//! checked for a newer copy from another device at startup.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  mutation  ┌──────────────┐  encode  ┌──────────┐  write  ┌────────┐
//! │ Records  │──────────▶│ Orchestrator │────────▶│ Snapshot │───────▶│ Folder │
//! └────┬─────┘            └──────┬───────┘          └──────────┘         └────────┘
//!      │                         │ load / restore
//!      ▼                         ▼
//! ┌──────────────────────────────────┐
//! │        Store (SQLite / memory)   │
//! └──────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! cardsync init
//! cardsync profile add "Acme Corp" --position Engineer
//! cardsync sync enable ~/Dropbox/cards
//! cardsync card add --profile <id> --name "Taro Yamada" --company Initech
//! cardsync sync reconcile
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`attachment`] | Binary attachments as data URLs |
//! | [`snapshot`] | Backup document codec |
//! | [`store`] | Storage trait and in-memory backend |
//! | [`sqlite_store`] | SQLite storage backend |
//! | [`records`] | Create/update/delete operations |
//! | [`folder`] | Sync folder access and handle store |
//! | [`conflict`] | Restore-or-keep policy |
//! | [`orchestrator`] | Debounced sync and reconcile |
//! | [`status_report`] | Sync status on stderr |
//! | [`export`] | Manual export and import |
//! | [`stats`] | Dataset summary |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`error`] | Sync error types |

pub mod attachment;
pub mod config;
pub mod conflict;
pub mod db;
pub mod error;
pub mod export;
pub mod folder;
pub mod migrate;
pub mod models;
pub mod orchestrator;
pub mod records;
pub mod snapshot;
pub mod sqlite_store;
pub mod stats;
pub mod status_report;
pub mod store;
