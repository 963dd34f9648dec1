//! Builtin meta types and their registration.
//!
//! Ids `0..FIRST_CUSTOM_TYPE_ID` are reserved for this set; the dense
//! layout below is part of the wire contract between runtimes with matching
//! application ids.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
use super::object::{MetaObject, MetaType, TypeId};
use super::registry::insert_raw;
use crate::error::{Error, ErrorCode, ExitReason};
use crate::message::system::{
    DownMsg, ExitMsg, NodeDownMsg, ReceiveTimeoutMsg, SysInfoReply, SysInfoRequest,
};
use crate::serial::{BinaryDeserializer, BinarySerializer};
use crate::util::{ActorAddr, NodeId};

/// Builtin type ids, in registration order.
pub mod ids {
    use super::TypeId;

    pub const UNIT: TypeId = 0;
    pub const BOOL: TypeId = 1;
    pub const INT8: TypeId = 2;
    pub const UINT8: TypeId = 3;
    pub const INT16: TypeId = 4;
    pub const UINT16: TypeId = 5;
    pub const INT32: TypeId = 6;
    pub const UINT32: TypeId = 7;
    pub const INT64: TypeId = 8;
    pub const UINT64: TypeId = 9;
    pub const FLOAT32: TypeId = 10;
    pub const FLOAT64: TypeId = 11;
    pub const STRING: TypeId = 12;
    pub const NODE_ID: TypeId = 13;
    pub const ACTOR_ADDR: TypeId = 14;
    pub const ERROR: TypeId = 15;
    pub const EXIT_REASON: TypeId = 16;
    pub const EXIT_MSG: TypeId = 17;
    pub const DOWN_MSG: TypeId = 18;
    pub const NODE_DOWN_MSG: TypeId = 19;
    pub const RECEIVE_TIMEOUT_MSG: TypeId = 20;
    pub const SYS_INFO_REQUEST: TypeId = 21;
    pub const SYS_INFO_REPLY: TypeId = 22;
}

macro_rules! impl_meta_scalar {
    ($ty:ty, $name:literal, $write:ident, $read:ident) => {
        impl MetaType for $ty {
            const NAME: &'static str = $name;

            fn save(&self, sink: &mut BinarySerializer) -> Result<(), Error> {
                sink.$write(*self);
                Ok(())
            }

            fn load(&mut self, source: &mut BinaryDeserializer<'_>) -> Result<(), Error> {
                *self = source.$read()?;
                Ok(())
            }
        }
    };
}

impl_meta_scalar!(bool, "bool", write_bool, read_bool);
impl_meta_scalar!(i8, "int8", write_i8, read_i8);
impl_meta_scalar!(u8, "uint8", write_u8, read_u8);
impl_meta_scalar!(i16, "int16", write_i16, read_i16);
impl_meta_scalar!(u16, "uint16", write_u16, read_u16);
impl_meta_scalar!(i32, "int32", write_i32, read_i32);
impl_meta_scalar!(u32, "uint32", write_u32, read_u32);
impl_meta_scalar!(i64, "int64", write_i64, read_i64);
impl_meta_scalar!(u64, "uint64", write_u64, read_u64);
impl_meta_scalar!(f32, "float32", write_f32, read_f32);
impl_meta_scalar!(f64, "float64", write_f64, read_f64);

impl MetaType for () {
    const NAME: &'static str = "unit";

    fn save(&self, _sink: &mut BinarySerializer) -> Result<(), Error> {
        Ok(())
    }

    fn load(&mut self, _source: &mut BinaryDeserializer<'_>) -> Result<(), Error> {
        Ok(())
    }
}

impl MetaType for String {
    const NAME: &'static str = "string";

    fn save(&self, sink: &mut BinarySerializer) -> Result<(), Error> {
        sink.write_str(self);
        Ok(())
    }

    fn load(&mut self, source: &mut BinaryDeserializer<'_>) -> Result<(), Error> {
        *self = source.read_str()?;
        Ok(())
    }
}

impl MetaType for NodeId {
    const NAME: &'static str = "node-id";

    fn save(&self, sink: &mut BinarySerializer) -> Result<(), Error> {
        sink.write_raw(self.as_bytes());
        Ok(())
    }

    fn load(&mut self, source: &mut BinaryDeserializer<'_>) -> Result<(), Error> {
        let raw = source.read_raw(NodeId::LENGTH)?;
        let mut bytes = [0u8; NodeId::LENGTH];
        bytes.copy_from_slice(raw);
        *self = NodeId::from_bytes(bytes);
        Ok(())
    }
}

impl MetaType for ActorAddr {
    const NAME: &'static str = "actor-addr";

    fn save(&self, sink: &mut BinarySerializer) -> Result<(), Error> {
        self.node().save(sink)?;
        sink.write_u32(self.process());
        sink.write_u64(self.actor());
        Ok(())
    }

    fn load(&mut self, source: &mut BinaryDeserializer<'_>) -> Result<(), Error> {
        let mut node = NodeId::ZERO;
        node.load(source)?;
        let process = source.read_u32()?;
        let actor = source.read_u64()?;
        *self = ActorAddr::new(node, process, actor);
        Ok(())
    }
}

impl MetaType for crate::error::Error {
    const NAME: &'static str = "error";

    fn save(&self, sink: &mut BinarySerializer) -> Result<(), Error> {
        sink.write_u8(self.code().as_u8());
        match self.context() {
            Some(ctx) => {
                sink.write_bool(true);
                sink.write_str(ctx);
            }
            None => sink.write_bool(false),
        }
        Ok(())
    }

    fn load(&mut self, source: &mut BinaryDeserializer<'_>) -> Result<(), Error> {
        let raw = source.read_u8()?;
        let code = ErrorCode::from_u8(raw).ok_or_else(|| {
            Error::with_context(ErrorCode::LoadCallbackFailed, format!("bad error code {raw}"))
        })?;
        *self = if source.read_bool()? {
            Error::with_context(code, source.read_str()?)
        } else {
            Error::new(code)
        };
        Ok(())
    }
}

impl MetaType for ExitReason {
    const NAME: &'static str = "exit-reason";

    fn save(&self, sink: &mut BinarySerializer) -> Result<(), Error> {
        match self {
            ExitReason::Normal => sink.write_u8(0),
            ExitReason::Kill => sink.write_u8(1),
            ExitReason::UserShutdown => sink.write_u8(2),
            ExitReason::RemoteLinkUnreachable => sink.write_u8(3),
            ExitReason::Abnormal(err) => {
                sink.write_u8(4);
                err.save(sink)?;
            }
        }
        Ok(())
    }

    fn load(&mut self, source: &mut BinaryDeserializer<'_>) -> Result<(), Error> {
        *self = match source.read_u8()? {
            0 => ExitReason::Normal,
            1 => ExitReason::Kill,
            2 => ExitReason::UserShutdown,
            3 => ExitReason::RemoteLinkUnreachable,
            4 => {
                let mut err = Error::default();
                err.load(source)?;
                ExitReason::Abnormal(err)
            }
            other => {
                return Err(Error::with_context(
                    ErrorCode::LoadCallbackFailed,
                    format!("bad exit reason tag {other}"),
                ))
            }
        };
        Ok(())
    }
}

/// Register the full builtin set at ids `0..=22`. Idempotent.
pub(super) fn register_builtin_types() {
    let entries = [
        MetaObject::of::<()>(),
        MetaObject::of::<bool>(),
        MetaObject::of::<i8>(),
        MetaObject::of::<u8>(),
        MetaObject::of::<i16>(),
        MetaObject::of::<u16>(),
        MetaObject::of::<i32>(),
        MetaObject::of::<u32>(),
        MetaObject::of::<i64>(),
        MetaObject::of::<u64>(),
        MetaObject::of::<f32>(),
        MetaObject::of::<f64>(),
        MetaObject::of::<String>(),
        MetaObject::of::<NodeId>(),
        MetaObject::of::<ActorAddr>(),
        MetaObject::of::<crate::error::Error>(),
        MetaObject::of::<ExitReason>(),
        MetaObject::of::<ExitMsg>(),
        MetaObject::of::<DownMsg>(),
        MetaObject::of::<NodeDownMsg>(),
        MetaObject::of::<ReceiveTimeoutMsg>(),
        MetaObject::of::<SysInfoRequest>(),
        MetaObject::of::<SysInfoReply>(),
    ];
    insert_raw(0, &entries);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::registry::type_id_of;

    #[test]
    fn dense_builtin_layout() {
        assert_eq!(type_id_of::<()>().unwrap(), ids::UNIT);
        assert_eq!(type_id_of::<bool>().unwrap(), ids::BOOL);
        assert_eq!(type_id_of::<i64>().unwrap(), ids::INT64);
        assert_eq!(type_id_of::<String>().unwrap(), ids::STRING);
        assert_eq!(type_id_of::<ActorAddr>().unwrap(), ids::ACTOR_ADDR);
        assert_eq!(type_id_of::<ExitMsg>().unwrap(), ids::EXIT_MSG);
    }

    #[test]
    fn error_meta_roundtrip() {
        let original = Error::with_context(ErrorCode::RequestTimeout, "deadline passed");
        let mut sink = BinarySerializer::new();
        original.save(&mut sink).unwrap();
        let bytes = sink.into_bytes();
        let mut source = BinaryDeserializer::new(&bytes);
        let mut restored = Error::default();
        restored.load(&mut source).unwrap();
        assert_eq!(original, restored);
    }

    #[test]
    fn exit_reason_meta_roundtrip() {
        let samples = [
            ExitReason::Normal,
            ExitReason::Kill,
            ExitReason::Abnormal(Error::new(ErrorCode::SocketDisconnected)),
        ];
        for original in samples {
            let mut sink = BinarySerializer::new();
            original.save(&mut sink).unwrap();
            let bytes = sink.into_bytes();
            let mut source = BinaryDeserializer::new(&bytes);
            let mut restored = ExitReason::Normal;
            restored.load(&mut source).unwrap();
            assert_eq!(original, restored);
        }
    }
}
