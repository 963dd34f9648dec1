//! Type-id lists describing payload signatures.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use smallvec::SmallVec;

// Layer 3: Internal module imports
use crate::error::{Error, ErrorCode};
use crate::meta::{self, TypeId};
use crate::serial::{BinaryDeserializer, BinarySerializer};

/// A payload signature: one dense type id per element, inline up to 8.
pub type TypeIdList = SmallVec<[TypeId; 8]>;

/// Upper bound on serialized list length; anything larger is a framing
/// error, not a legitimate payload.
const MAX_LIST_LEN: u64 = 1024;

/// Serialize a type-id list as `(count:varint, id_1, ..., id_n)`.
pub fn save_type_list(ids: &[TypeId], sink: &mut BinarySerializer) {
    sink.write_varint(ids.len() as u64);
    for &id in ids {
        sink.write_u16(id);
    }
}

/// Deserialize a type-id list written by [`save_type_list`].
pub fn load_type_list(source: &mut BinaryDeserializer<'_>) -> Result<TypeIdList, Error> {
    let count = source.read_varint()?;
    if count > MAX_LIST_LEN {
        return Err(Error::with_context(
            ErrorCode::LoadCallbackFailed,
            format!("type list length {count} exceeds limit"),
        ));
    }
    let mut ids = TypeIdList::new();
    for _ in 0..count {
        ids.push(source.read_u16()?);
    }
    Ok(ids)
}

/// Render a signature as `(name, name, ...)` for logs and errors.
pub fn signature_names(ids: &[TypeId]) -> String {
    let mut out = String::from("(");
    for (i, &id) in ids.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(meta::type_name(id).unwrap_or("?"));
    }
    out.push(')');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn list_roundtrip() {
        let ids: TypeIdList = smallvec![8, 12, 12, 0];
        let mut sink = BinarySerializer::new();
        save_type_list(&ids, &mut sink);
        let bytes = sink.into_bytes();
        let mut source = BinaryDeserializer::new(&bytes);
        assert_eq!(load_type_list(&mut source).unwrap(), ids);
    }

    #[test]
    fn oversized_list_is_rejected() {
        let mut sink = BinarySerializer::new();
        sink.write_varint(1_000_000);
        let bytes = sink.into_bytes();
        let mut source = BinaryDeserializer::new(&bytes);
        assert_eq!(
            load_type_list(&mut source).unwrap_err().code(),
            ErrorCode::LoadCallbackFailed
        );
    }

    #[test]
    fn signature_rendering() {
        let ids: TypeIdList = smallvec![8, 12];
        assert_eq!(signature_names(&ids), "(int64, string)");
    }
}
