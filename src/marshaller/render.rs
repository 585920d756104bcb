use serde_json::{json, Value as Json};

use crate::common::Result;
use crate::core::entry::CacheObject;
use crate::marshaller::mapping::{MappingFileStore, PLATFORM_DEFAULT};

/// Turns tagged payloads into JSON for display.
/// Binary objects need the type registry to resolve their type name.
pub struct ObjectRenderer<'a> {
    registry: Option<&'a MappingFileStore>,
}

impl<'a> ObjectRenderer<'a> {
    pub fn new(registry: Option<&'a MappingFileStore>) -> Self {
        Self { registry }
    }

    pub fn render(&self, obj: &CacheObject) -> Result<Json> {
        if let Some(v) = obj.as_i32() {
            return Ok(json!(v));
        }
        if let Some(s) = obj.as_str() {
            return Ok(json!(s));
        }

        match obj.type_tag() {
            CacheObject::TYPE_BYTE_ARR => Ok(json!(obj.bytes())),
            CacheObject::TYPE_OBJ => match (obj.binary_type_id(), self.registry) {
                (Some(type_id), Some(registry)) => Ok(json!({
                    "type": registry.type_name(PLATFORM_DEFAULT, type_id)?,
                    "fields": hex::encode(&obj.bytes()[4..]),
                })),
                (type_id, _) => Ok(json!({
                    "type_id": type_id,
                    "fields": hex::encode(obj.bytes().get(4..).unwrap_or_default()),
                })),
            },
            tag => Ok(json!({
                "tag": tag,
                "bytes": hex::encode(obj.bytes()),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives() {
        let r = ObjectRenderer::new(None);
        assert_eq!(r.render(&CacheObject::int(5)).unwrap(), json!(5));
        assert_eq!(r.render(&CacheObject::string("x")).unwrap(), json!("x"));
        assert_eq!(
            r.render(&CacheObject::new(200, vec![0xab, 0x01])).unwrap(),
            json!({"tag": 200, "bytes": "ab01"})
        );
    }

    #[test]
    fn binary_object_resolves_type_name() {
        let dir = tempfile::tempdir().unwrap();
        let registry = MappingFileStore::new(dir.path()).unwrap();
        registry.write_mapping(PLATFORM_DEFAULT, 77, "org.example.User").unwrap();

        let r = ObjectRenderer::new(Some(&registry));
        let obj = CacheObject::binary(77, &[1, 2]);
        assert_eq!(
            r.render(&obj).unwrap(),
            json!({"type": "org.example.User", "fields": "0102"})
        );

        assert!(r.render(&CacheObject::binary(78, &[])).is_err());
    }
}
