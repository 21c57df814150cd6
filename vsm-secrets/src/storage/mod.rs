//! Data store and key store backends

mod memory;
mod traits;


pub use memory::{MemoryDataStore, MemoryKeyStore};
pub use traits::{DataStore, KeyStore, StorageError};
