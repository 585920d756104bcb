//! Binary layout of a single dump record.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ RECORD_BYTES: u32 (whole record, checksum in) │
//! │ KEY_TYPE: u8                                 │
//! │ VALUE_TYPE: u8 (0 for tombstone)             │
//! │ FLAGS: u8                                    │
//! │   bit 0: tombstone                           │
//! │   bit 1: has conflict version                │
//! │   bit 2: has expire time                     │
//! │ CACHE_ID: i32                                │
//! │ PARTITION: u32                               │
//! │ EXPIRE_TIME: i64 (0 when absent)             │
//! │ VERSION: u32 + u64 + u32 + u8                │
//! │ KEY_BYTES: u32                               │
//! ├──────────────────────────────────────────────┤
//! │ KEY: [u8]                                    │
//! │ VALUE: [u8]                                  │
//! │ CONFLICT_VERSION (if flagged)                │
//! ├──────────────────────────────────────────────┤
//! │ CRC32: u32 over everything above             │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! All integers are big endian. Value length is not stored, it is what
//! remains of the record once the key and conflict version are accounted for.

use bytes::{Buf, BufMut};

use crate::common::{Error, ErrorKind, Result};
use crate::core::entry::{CacheObject, CacheVersion, DumpEntry};

pub const HEADER_BYTES: usize = 4 // record_bytes
    + 1 // key_type
    + 1 // value_type
    + 1 // flags
    + 4 // cache_id
    + 4 // partition
    + 8 // expire_time
    + CacheVersion::ENCODED_BYTES // version
    + 4 // key_bytes
;

const CHECKSUM_BYTES: usize = 4;

pub const MIN_RECORD_BYTES: usize = HEADER_BYTES + CHECKSUM_BYTES;

pub const MAX_RECORD_BYTES: usize = 1024 * 1024 * 64;

mod flags {
    pub(super) const TOMBSTONE: u8 = 1 << 0;
    pub(super) const CONFLICT_VERSION: u8 = 1 << 1;
    pub(super) const EXPIRE_TIME: u8 = 1 << 2;

    pub(super) const ALL: u8 = TOMBSTONE | CONFLICT_VERSION | EXPIRE_TIME;
}

// store meta value for record.
#[derive(Debug, PartialEq)]
struct Header {
    record_bytes: u32,
    key_type: u8,
    value_type: u8,
    flags: u8,
    cache_id: i32,
    partition: u32,
    expire_time: i64,
    version: CacheVersion,
    key_bytes: u32,
}

impl Header {
    // record_bytes must already be checked against MAX_RECORD_BYTES.
    fn of(entry: &DumpEntry, record_bytes: usize) -> Self {
        let mut flags = 0;
        if entry.value.is_none() {
            flags |= flags::TOMBSTONE;
        }
        if entry.conflict_version.is_some() {
            flags |= flags::CONFLICT_VERSION;
        }
        if entry.expire_time.is_some() {
            flags |= flags::EXPIRE_TIME;
        }

        Header {
            record_bytes: record_bytes as u32,
            key_type: entry.key.type_tag(),
            value_type: entry.value.as_ref().map(|v| v.type_tag()).unwrap_or(0),
            flags,
            cache_id: entry.cache_id,
            partition: entry.partition,
            expire_time: entry.expire_time.unwrap_or(0),
            version: entry.version,
            key_bytes: entry.key.len() as u32,
        }
    }

    fn put(&self, dst: &mut Vec<u8>) {
        dst.put_u32(self.record_bytes);
        dst.put_u8(self.key_type);
        dst.put_u8(self.value_type);
        dst.put_u8(self.flags);
        dst.put_i32(self.cache_id);
        dst.put_u32(self.partition);
        dst.put_i64(self.expire_time);
        put_version(dst, &self.version);
        dst.put_u32(self.key_bytes);
    }

    // src must hold at least HEADER_BYTES.
    fn get(src: &mut &[u8]) -> Self {
        Header {
            record_bytes: src.get_u32(),
            key_type: src.get_u8(),
            value_type: src.get_u8(),
            flags: src.get_u8(),
            cache_id: src.get_i32(),
            partition: src.get_u32(),
            expire_time: src.get_i64(),
            version: get_version(src),
            key_bytes: src.get_u32(),
        }
    }

    fn has(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }
}

fn record_bytes_of(entry: &DumpEntry) -> usize {
    let value_bytes = entry.value.as_ref().map(|v| v.len()).unwrap_or(0);
    let conflict_bytes = if entry.conflict_version.is_some() {
        CacheVersion::ENCODED_BYTES
    } else {
        0
    };
    MIN_RECORD_BYTES + entry.key.len() + value_bytes + conflict_bytes
}

/// Append the binary expression of entry to dst.
/// Return written bytes.
pub fn encode_to(entry: &DumpEntry, dst: &mut Vec<u8>) -> Result<usize> {
    let record_bytes = record_bytes_of(entry);
    if record_bytes > MAX_RECORD_BYTES {
        return Err(Error::from(ErrorKind::Internal(format!(
            "record exceeds maximum bytes({}). bytes: {}",
            MAX_RECORD_BYTES, record_bytes
        ))));
    }
    let header = Header::of(entry, record_bytes);

    let start = dst.len();
    dst.reserve(record_bytes);

    header.put(dst);
    dst.put_slice(entry.key.bytes());
    if let Some(value) = &entry.value {
        dst.put_slice(value.bytes());
    }
    if let Some(conflict) = &entry.conflict_version {
        put_version(dst, conflict);
    }

    let checksum = calc_crc_checksum(&dst[start..]);
    dst.put_u32(checksum);

    debug_assert_eq!(dst.len() - start, record_bytes);

    Ok(record_bytes)
}

pub fn encode(entry: &DumpEntry) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    encode_to(entry, &mut buf)?;
    Ok(buf)
}

/// Declared length of the record starting at src, without validating the rest.
pub fn peek_record_bytes(src: &[u8]) -> Option<usize> {
    if src.len() < 4 {
        return None;
    }
    Some((&src[..4]).get_u32() as usize)
}

/// Decode the record at the start of src.
/// Return consumed bytes and the entry. Bytes after the declared record end are not looked at.
/// Corruption offsets are relative to src.
pub fn decode(src: &[u8]) -> Result<(usize, DumpEntry)> {
    let record_bytes = match peek_record_bytes(src) {
        Some(n) => n,
        None => return Err(Error::corrupted(0, "truncated record length")),
    };
    if !(MIN_RECORD_BYTES..=MAX_RECORD_BYTES).contains(&record_bytes) {
        return Err(Error::corrupted(
            0,
            format!("invalid record length {}", record_bytes),
        ));
    }
    if src.len() < record_bytes {
        return Err(Error::corrupted(
            0,
            format!(
                "truncated record. declared {} bytes, {} available",
                record_bytes,
                src.len()
            ),
        ));
    }

    let (covered, mut stored) = src[..record_bytes].split_at(record_bytes - CHECKSUM_BYTES);
    let stored = stored.get_u32();
    let actual = calc_crc_checksum(covered);
    if stored != actual {
        return Err(Error::corrupted(
            0,
            format!("checksum mismatch [stored={}, calculated={}]", stored, actual),
        ));
    }

    let mut cursor = covered;
    let header = Header::get(&mut cursor);

    if header.flags & !flags::ALL != 0 {
        return Err(Error::corrupted(
            6,
            format!("unknown flags {:#010b}", header.flags),
        ));
    }

    let key_bytes = header.key_bytes as usize;
    let conflict_bytes = if header.has(flags::CONFLICT_VERSION) {
        CacheVersion::ENCODED_BYTES
    } else {
        0
    };
    if cursor.remaining() < key_bytes + conflict_bytes {
        return Err(Error::corrupted(
            HEADER_BYTES as u64 - 4,
            format!("key length {} exceeds record", key_bytes),
        ));
    }
    let value_bytes = cursor.remaining() - key_bytes - conflict_bytes;

    let key = CacheObject::new(header.key_type, cursor[..key_bytes].to_vec());
    cursor.advance(key_bytes);

    let value = if header.has(flags::TOMBSTONE) {
        if value_bytes != 0 || header.value_type != 0 {
            return Err(Error::corrupted(
                HEADER_BYTES as u64,
                "tombstone record carries a value",
            ));
        }
        None
    } else {
        let value = CacheObject::new(header.value_type, cursor[..value_bytes].to_vec());
        cursor.advance(value_bytes);
        Some(value)
    };

    let conflict_version = if header.has(flags::CONFLICT_VERSION) {
        Some(get_version(&mut cursor))
    } else {
        None
    };

    let expire_time = if header.has(flags::EXPIRE_TIME) {
        Some(header.expire_time)
    } else {
        None
    };

    let entry = DumpEntry {
        cache_id: header.cache_id,
        partition: header.partition,
        key,
        value,
        version: header.version,
        conflict_version,
        expire_time,
    };

    Ok((record_bytes, entry))
}

fn put_version(dst: &mut Vec<u8>, version: &CacheVersion) {
    dst.put_u32(version.topology_version);
    dst.put_u64(version.order);
    dst.put_u32(version.node_order);
    dst.put_u8(version.cluster_id);
}

fn get_version(src: &mut &[u8]) -> CacheVersion {
    CacheVersion {
        topology_version: src.get_u32(),
        order: src.get_u64(),
        node_order: src.get_u32(),
        cluster_id: src.get_u8(),
    }
}

fn calc_crc_checksum(covered: &[u8]) -> u32 {
    let mut h = crc32fast::Hasher::new();
    h.update(covered);
    h.finalize()
}
