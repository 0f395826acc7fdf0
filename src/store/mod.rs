//! Storage collaborator: access to captured raw messages.

pub mod fs_backend;
pub mod traits;

pub use fs_backend::FsStore;
pub use traits::{MessageStore, object_key};
