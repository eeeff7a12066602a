//! Storage engines
//!
//! The buffering layer only talks to engines through the [`Engine`] trait.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  StorageManager                     │
//! │  - session handshake                │
//! │  - content queues, flush            │
//! └─────────────────────────────────────┘
//!          ▲
//!          │ Engine (async whole-file ops)
//!          ▼
//! ┌─────────────────────────────────────┐
//! │  Engine implementations             │
//! │  - exists / mkdir / touch           │
//! │  - read_all / write_all             │
//! └─────────────────────────────────────┘
//!      ▲         ▲           ▲
//!      │         │           │
//!    MemFs    LocalFs     SqliteFs (cli)
//! ```

pub mod localfs;
pub mod memfs;
pub mod types;

pub use localfs::LocalFs;
pub use memfs::MemFs;
pub use types::{BoxedEngine, DynEngine, Engine};
