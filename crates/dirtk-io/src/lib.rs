//! Parameter serialization for dirtk transformations.

pub mod record;
pub mod json;

pub use record::{DomainRecord, GlobalRecord, LatticeRecord, LatticeTransformRecord, LevelRecord, MultiLevelRecord, TransformRecord};
pub use json::{load_transform, read_json, save_transform, write_json, TransformDocument, FORMAT_VERSION};
