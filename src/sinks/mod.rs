//! Sink implementations

pub mod append_blob;
pub mod console;
pub mod file;
pub mod memory;
pub mod object_store;
pub mod table;

#[cfg(feature = "http")]
pub mod http;

pub use append_blob::{AppendBlobConfig, AppendBlobSink};
pub use console::{ConsoleConfig, ConsoleSink};
pub use file::{FileConfig, FileSink};
pub use memory::{MemoryBuffer, MemorySink};
pub use object_store::{FsObjectStore, ObjectStore, ObjectStoreConfig, ObjectStoreSink};
pub use table::{TableConfig, TableSink};

#[cfg(feature = "http")]
pub use http::{HttpConfig, HttpSink};
#[cfg(feature = "http")]
pub use object_store::HttpObjectStore;
