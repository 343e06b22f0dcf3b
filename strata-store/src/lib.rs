//! # Strata Store
//!
//! Asynchronous persistence for Strata editors.
//!
//! ```text
//! EditorSession ──▶ Editor (strata-core, behind a Mutex)
//!      │
//!      ├─▶ ImageStore ──▶ decoded cache + pending uploads
//!      │        │
//!      │        ▼
//!      ├─▶ PersistentStore (MemoryStore | FsStore)
//!      ├─▶ GarbageCollector
//!      └─▶ OutputSlot
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod backend;
pub mod error;
pub mod gc;
pub mod images;
pub mod output;
pub mod session;

pub use backend::{FsStore, MemoryStore, PersistentStore, UnusedLedger};
pub use error::{StoreError, StoreResult};
pub use gc::{GarbageCollector, GcReport};
pub use images::{CacheStats, DecodedImage, ImageStore};
pub use output::{CanvasOutput, OutputPass, OutputSlot};
pub use session::{EditorSession, LoadOutcome, SaveReport, SessionConfig};
