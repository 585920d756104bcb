//! Type name registry and payload rendering.

mod mapping;
pub use self::mapping::{
    mapping_file_name, parse_mapping_file_name, MappingFileStore, TypeMapping,
    MAPPING_FILE_EXTENSION, PLATFORM_DEFAULT,
};

mod render;
pub use self::render::ObjectRenderer;
