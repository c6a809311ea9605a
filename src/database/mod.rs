pub mod pool;

pub use pool::{StoreError, VenuePools};
