pub mod enums;
pub mod error;
pub mod structs;
pub mod validate;

// Re-export the core types to provide a clean public API.
pub use enums::AuthMethod;
pub use error::CoreError;
pub use structs::{ClusterConfig, PhysicalClusters, QueryHistory, Replica, Shard};
pub use validate::{PHYSICAL_DELIMITER, validate_name, validate_physical_clusters};
