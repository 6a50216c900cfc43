//! Task and owner persistence.
//!
//! Two interchangeable backends implement [`TaskStore`] and [`OwnerStore`]:
//! - [`SqliteTaskStore`]: one `tasks` table with a status column
//! - [`PartitionedTaskStore`]: three state partitions, records move between them
//!
//! Pick one at runtime with [`connect_store`]. The gateway and dispatcher run
//! as separate processes and open theirs with [`connect_shared_store`].

pub mod config;
pub mod error;
pub mod partitioned;
pub mod sqlite;
pub mod traits;

pub use config::{connect_shared_store, connect_store, StoreBackend, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use partitioned::PartitionedTaskStore;
pub use sqlite::SqliteTaskStore;
pub use traits::{OwnerStore, SharedStore, Store, TaskStore};
