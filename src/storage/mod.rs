pub mod apply;
pub mod engine;
pub mod memory;
pub mod persistence;

pub use apply::apply_replicated;
pub use engine::{ReadWriter, Reader, Writer};
pub use memory::MemEngine;
pub use persistence::SnapshotManager;
