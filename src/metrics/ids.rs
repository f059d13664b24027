//! Deterministic identifiers for series that have no originating request.

use md5::{Digest, Md5};
use uuid::{Builder, Uuid};

/// Version 3 UUID from the MD5 of `content`, without a namespace.
///
/// Matches `java.util.UUID.nameUUIDFromBytes`, so aggregate series keep the
/// same `request` label across passes and processes.
pub fn name_uuid_from_bytes(content: &str) -> Uuid {
    let digest = Md5::digest(content.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest);
    Builder::from_md5_bytes(bytes).into_uuid()
}

/// Identifier of the `index`-th named sub-series of `parent`.
pub fn sub_series_id(parent: Uuid, index: usize) -> Uuid {
    let name = format!("{}{}", parent, index);
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, name.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_uuid_is_stable() {
        let first = name_uuid_from_bytes("model_count");
        let second = name_uuid_from_bytes("model_count");
        assert_eq!(first, second);
        assert_eq!(first.get_version_num(), 3);
        assert_ne!(first, name_uuid_from_bytes("m1"));
    }

    #[test]
    fn test_name_uuid_known_value() {
        // UUID.nameUUIDFromBytes("".getBytes())
        assert_eq!(
            name_uuid_from_bytes("").to_string(),
            "d41d8cd9-8f00-3204-a980-0998ecf8427e"
        );
    }

    #[test]
    fn test_sub_series_ids() {
        let parent = Uuid::new_v4();
        let first = sub_series_id(parent, 0);
        assert_eq!(first, sub_series_id(parent, 0));
        assert_ne!(first, sub_series_id(parent, 1));
        assert_ne!(first, parent);
        assert_eq!(first.get_version_num(), 5);
    }
}
