use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

// Opaque key or value payload tagged with the marshaller type it was written with.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheObject {
    type_tag: u8,
    bytes: Box<[u8]>,
}

impl CacheObject {
    pub const TYPE_INT: u8 = 3;
    pub const TYPE_STRING: u8 = 9;
    pub const TYPE_BYTE_ARR: u8 = 12;
    // Binary object. first 4 bytes hold the type id.
    pub const TYPE_OBJ: u8 = 103;

    pub fn new(type_tag: u8, bytes: impl Into<Box<[u8]>>) -> Self {
        Self {
            type_tag,
            bytes: bytes.into(),
        }
    }

    pub fn int(v: i32) -> Self {
        CacheObject::new(CacheObject::TYPE_INT, v.to_be_bytes().to_vec())
    }

    pub fn string(s: impl AsRef<str>) -> Self {
        CacheObject::new(CacheObject::TYPE_STRING, s.as_ref().as_bytes().to_vec())
    }

    pub fn byte_array(b: impl Into<Box<[u8]>>) -> Self {
        CacheObject::new(CacheObject::TYPE_BYTE_ARR, b)
    }

    pub fn binary(type_id: i32, fields: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(4 + fields.len());
        bytes.extend_from_slice(&type_id.to_be_bytes());
        bytes.extend_from_slice(fields);
        CacheObject::new(CacheObject::TYPE_OBJ, bytes)
    }

    pub fn type_tag(&self) -> u8 {
        self.type_tag
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_i32(&self) -> Option<i32> {
        if self.type_tag != CacheObject::TYPE_INT {
            return None;
        }
        let raw: [u8; 4] = self.bytes.as_ref().try_into().ok()?;
        Some(i32::from_be_bytes(raw))
    }

    pub fn as_str(&self) -> Option<&str> {
        if self.type_tag != CacheObject::TYPE_STRING {
            return None;
        }
        std::str::from_utf8(&self.bytes).ok()
    }

    // Type id of a binary object.
    pub fn binary_type_id(&self) -> Option<i32> {
        if self.type_tag != CacheObject::TYPE_OBJ || self.bytes.len() < 4 {
            return None;
        }
        let raw: [u8; 4] = self.bytes[..4].try_into().ok()?;
        Some(i32::from_be_bytes(raw))
    }
}

impl fmt::Debug for CacheObject {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(v) = self.as_i32() {
            return write!(f, "int({})", v);
        }
        if let Some(s) = self.as_str() {
            return write!(f, "string({:?})", s);
        }
        let shown = &self.bytes[..self.bytes.len().min(32)];
        write!(f, "tag{}({:?})", self.type_tag, shown)
    }
}

/// Version used to order concurrent writes to the same key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CacheVersion {
    pub topology_version: u32,
    pub order: u64,
    pub node_order: u32,
    pub cluster_id: u8,
}

impl CacheVersion {
    pub(crate) const ENCODED_BYTES: usize = 4 // topology_version
        + 8 // order
        + 4 // node_order
        + 1 // cluster_id
    ;

    pub fn new(topology_version: u32, order: u64, node_order: u32, cluster_id: u8) -> Self {
        Self {
            topology_version,
            order,
            node_order,
            cluster_id,
        }
    }
}

// Cluster id is the last tie-break, two data centers may
// produce the same (topology, order, node) triple.
impl PartialOrd for CacheVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CacheVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.topology_version
            .cmp(&other.topology_version)
            .then(self.order.cmp(&other.order))
            .then(self.node_order.cmp(&other.node_order))
            .then(self.cluster_id.cmp(&other.cluster_id))
    }
}

impl fmt::Display for CacheVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "CacheVersion [topVer={}, order={}, nodeOrder={}, clusterId={}]",
            self.topology_version, self.order, self.node_order, self.cluster_id
        )
    }
}

/// One cache row captured by a dump.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DumpEntry {
    pub cache_id: i32,
    pub partition: u32,
    pub key: CacheObject,
    // None for a tombstone.
    pub value: Option<CacheObject>,
    pub version: CacheVersion,
    // Version assigned by the remote writer when the row came through replication.
    pub conflict_version: Option<CacheVersion>,
    // Milliseconds since the epoch.
    pub expire_time: Option<i64>,
}

impl DumpEntry {
    pub fn new(
        cache_id: i32,
        partition: u32,
        key: CacheObject,
        value: CacheObject,
        version: CacheVersion,
    ) -> Self {
        Self {
            cache_id,
            partition,
            key,
            value: Some(value),
            version,
            conflict_version: None,
            expire_time: None,
        }
    }

    pub fn tombstone(cache_id: i32, partition: u32, key: CacheObject, version: CacheVersion) -> Self {
        Self {
            cache_id,
            partition,
            key,
            value: None,
            version,
            conflict_version: None,
            expire_time: None,
        }
    }

    pub fn with_conflict_version(mut self, version: CacheVersion) -> Self {
        self.conflict_version = Some(version);
        self
    }

    pub fn with_expire_time(mut self, expire_time: i64) -> Self {
        self.expire_time = Some(expire_time);
        self
    }

    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }
}
