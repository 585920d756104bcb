//! In-process data grid the dump engine captures from.

mod affinity;
pub use self::affinity::{Affinity, HashAffinity};

mod cache;
pub use self::cache::{cache_id, CacheConfiguration, GridCache};

mod cluster;
pub use self::cluster::{Cluster, ClusterBuilder};

mod partition;
pub use self::partition::{Capture, Partition, StoredValue};

mod resolver;
pub use self::resolver::{ConflictResolver, Resolution, VersionConflictResolver};
