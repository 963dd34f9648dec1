//! Copy-on-write message payloads.
//!
//! A [`Payload`] is an immutable, ref-counted tuple of runtime-typed
//! values. Cloning is O(1) (bumps the ref count); mutation goes through a
//! copy-if-shared path, so a value observed through one handle never
//! changes underneath another handle.

// Layer 1: Standard library imports
use std::any::Any;
use std::fmt::{self, Display};
use std::sync::Arc;

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
use super::type_list::{load_type_list, save_type_list, signature_names, TypeIdList};
use crate::error::{Error, ErrorCode};
use crate::meta::{self, ErasedValue, MetaType, TypeId};
use crate::serial::{BinaryDeserializer, BinarySerializer};

/// Resolve the dense id for `T`, failing loudly when the type was never
/// registered. Registration is an init-time concern, so a miss here is a
/// programming error rather than a recoverable condition.
pub(crate) fn require_type_id<T: MetaType>() -> TypeId {
    match meta::type_id_of::<T>() {
        Ok(id) => id,
        Err(_) => panic!(
            "{} is not registered; call meta::register_custom::<{}>() during init",
            T::NAME,
            T::NAME
        ),
    }
}

struct PayloadData {
    type_ids: TypeIdList,
    elements: Vec<ErasedValue>,
}

impl Clone for PayloadData {
    fn clone(&self) -> Self {
        let elements = self
            .type_ids
            .iter()
            .zip(&self.elements)
            .map(|(&id, element)| {
                let meta = meta::lookup(id)
                    .unwrap_or_else(|_| panic!("missing meta object for type id {id}"));
                (meta.copy_construct)(&**element)
            })
            .collect();
        Self {
            type_ids: self.type_ids.clone(),
            elements,
        }
    }
}

/// Immutable, ref-counted tuple of runtime-typed values.
///
/// # Example
/// ```rust
/// use hive_rt::payload;
///
/// let msg = payload!(1i64, String::from("ping"));
/// assert_eq!(msg.len(), 2);
/// assert_eq!(msg.get::<i64>(0), Some(&1));
/// assert_eq!(msg.get::<String>(1).map(String::as_str), Some("ping"));
/// ```
#[derive(Clone)]
pub struct Payload {
    data: Arc<PayloadData>,
}

impl Payload {
    /// The empty payload.
    pub fn empty() -> Self {
        Self {
            data: Arc::new(PayloadData {
                type_ids: TypeIdList::new(),
                elements: Vec::new(),
            }),
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.data.elements.len()
    }

    /// Whether the payload holds no elements.
    pub fn is_empty(&self) -> bool {
        self.data.elements.is_empty()
    }

    /// The type-id signature.
    pub fn type_ids(&self) -> &[TypeId] {
        &self.data.type_ids
    }

    /// The type id of element `i`.
    pub fn type_at(&self, i: usize) -> Option<TypeId> {
        self.data.type_ids.get(i).copied()
    }

    /// Whether the signature equals `signature`.
    pub fn matches(&self, signature: &[TypeId]) -> bool {
        self.data.type_ids.as_slice() == signature
    }

    /// Whether more than one handle currently shares the storage.
    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.data) > 1
    }

    /// Borrow element `i` with its erased type.
    pub fn value_at(&self, i: usize) -> Option<&(dyn Any + Send + Sync)> {
        self.data.elements.get(i).map(|element| &**element)
    }

    /// Borrow element `i` as a `T`.
    pub fn get<T: 'static>(&self, i: usize) -> Option<&T> {
        self.data.elements.get(i)?.downcast_ref::<T>()
    }

    /// Mutably borrow element `i` as a `T`, copying the storage first when
    /// it is shared with other handles.
    pub fn mutable_at<T: 'static>(&mut self, i: usize) -> Option<&mut T> {
        let data = Arc::make_mut(&mut self.data);
        data.elements.get_mut(i)?.downcast_mut::<T>()
    }

    /// Extract the whole payload as a typed tuple.
    ///
    /// Returns `unexpected_response` when the signature does not match;
    /// this is the canonical way to pull typed values out of a reply.
    pub fn extract<A: FromPayload>(&self) -> Result<A, Error> {
        A::from_payload(self).ok_or_else(|| {
            Error::with_context(
                ErrorCode::UnexpectedResponse,
                format!(
                    "expected {}, got {}",
                    signature_names(&A::signature()),
                    signature_names(self.type_ids())
                ),
            )
        })
    }

    /// Serialize the signature and all elements.
    pub fn save(&self, sink: &mut BinarySerializer) -> Result<(), Error> {
        save_type_list(&self.data.type_ids, sink);
        for (&id, element) in self.data.type_ids.iter().zip(&self.data.elements) {
            let meta = meta::lookup(id)?;
            (meta.save)(&**element, sink)?;
        }
        Ok(())
    }

    /// Deserialize a payload written by [`Payload::save`].
    pub fn load(source: &mut BinaryDeserializer<'_>) -> Result<Self, Error> {
        let type_ids = load_type_list(source)?;
        let mut elements = Vec::with_capacity(type_ids.len());
        for &id in &type_ids {
            let meta = meta::lookup(id)?;
            let mut element = (meta.default_construct)();
            (meta.load)(&mut *element, source)?;
            elements.push(element);
        }
        Ok(Self {
            data: Arc::new(PayloadData { type_ids, elements }),
        })
    }
}

impl Default for Payload {
    fn default() -> Self {
        Self::empty()
    }
}

impl PartialEq for Payload {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.data, &other.data) {
            return true;
        }
        if self.data.type_ids != other.data.type_ids {
            return false;
        }
        self.data
            .type_ids
            .iter()
            .zip(self.data.elements.iter().zip(&other.data.elements))
            .all(|(&id, (lhs, rhs))| match meta::lookup(id) {
                Ok(meta) => (meta.eq)(&**lhs, &**rhs),
                Err(_) => false,
            })
    }
}

impl Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, (&id, element)) in self
            .data
            .type_ids
            .iter()
            .zip(&self.data.elements)
            .enumerate()
        {
            if i > 0 {
                write!(f, ", ")?;
            }
            match meta::lookup(id) {
                Ok(meta) => write!(f, "{}", (meta.stringify)(&**element))?,
                Err(_) => write!(f, "<unknown:{id}>")?,
            }
        }
        write!(f, ")")
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Payload{self}")
    }
}

/// Incremental payload construction.
///
/// # Example
/// ```rust
/// use hive_rt::message::PayloadBuilder;
///
/// let msg = PayloadBuilder::new()
///     .push(40i64)
///     .push(String::from("answer"))
///     .build();
/// assert_eq!(msg.len(), 2);
/// ```
#[derive(Default)]
pub struct PayloadBuilder {
    type_ids: TypeIdList,
    elements: Vec<ErasedValue>,
}

impl PayloadBuilder {
    /// Start an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value. Panics if `T` was never registered.
    pub fn push<T: MetaType>(mut self, value: T) -> Self {
        self.type_ids.push(require_type_id::<T>());
        self.elements.push(Box::new(value));
        self
    }

    /// Append a value, surfacing unregistered types as `unknown_type`.
    pub fn try_push<T: MetaType>(mut self, value: T) -> Result<Self, Error> {
        self.type_ids.push(meta::type_id_of::<T>()?);
        self.elements.push(Box::new(value));
        Ok(self)
    }

    /// Finish construction.
    pub fn build(self) -> Payload {
        Payload {
            data: Arc::new(PayloadData {
                type_ids: self.type_ids,
                elements: self.elements,
            }),
        }
    }
}

/// Build a [`Payload`] from a list of values.
///
/// ```rust
/// use hive_rt::payload;
///
/// let empty = payload!();
/// let pair = payload!(1i64, 2i64);
/// assert!(empty.is_empty());
/// assert_eq!(pair.len(), 2);
/// ```
#[macro_export]
macro_rules! payload {
    () => {
        $crate::message::Payload::empty()
    };
    ($($value:expr),+ $(,)?) => {{
        let mut builder = $crate::message::PayloadBuilder::new();
        $(builder = builder.push($value);)+
        builder.build()
    }};
}

/// Conversion of typed tuples into payloads.
pub trait IntoPayload {
    /// Perform the conversion. Panics if an element type is unregistered.
    fn into_payload(self) -> Payload;
}

impl IntoPayload for Payload {
    fn into_payload(self) -> Payload {
        self
    }
}

impl IntoPayload for () {
    fn into_payload(self) -> Payload {
        Payload::empty()
    }
}

/// Extraction of typed tuples out of payloads.
pub trait FromPayload: Sized {
    /// The exact signature this tuple matches.
    fn signature() -> TypeIdList;

    /// Clone the elements out of `payload` when the signature matches.
    fn from_payload(payload: &Payload) -> Option<Self>;
}

impl FromPayload for () {
    fn signature() -> TypeIdList {
        TypeIdList::new()
    }

    fn from_payload(payload: &Payload) -> Option<Self> {
        payload.is_empty().then_some(())
    }
}

macro_rules! impl_payload_tuple {
    ($len:literal, $($name:ident : $idx:tt),+) => {
        impl<$($name: MetaType),+> IntoPayload for ($($name,)+) {
            fn into_payload(self) -> Payload {
                PayloadBuilder::new()
                    $(.push(self.$idx))+
                    .build()
            }
        }

        impl<$($name: MetaType),+> FromPayload for ($($name,)+) {
            fn signature() -> TypeIdList {
                let mut ids = TypeIdList::new();
                $(ids.push(require_type_id::<$name>());)+
                ids
            }

            fn from_payload(payload: &Payload) -> Option<Self> {
                if payload.len() != $len {
                    return None;
                }
                Some(($(payload.get::<$name>($idx)?.clone(),)+))
            }
        }
    };
}

impl_payload_tuple!(1, A: 0);
impl_payload_tuple!(2, A: 0, B: 1);
impl_payload_tuple!(3, A: 0, B: 1, C: 2);
impl_payload_tuple!(4, A: 0, B: 1, C: 2, D: 3);
impl_payload_tuple!(5, A: 0, B: 1, C: 2, D: 3, E: 4);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_and_read() {
        let msg = payload!(7i64, String::from("seven"));
        assert_eq!(msg.len(), 2);
        assert_eq!(msg.get::<i64>(0), Some(&7));
        assert_eq!(msg.get::<i64>(1), None);
        assert_eq!(msg.to_string(), "(7, \"seven\")");
    }

    #[test]
    fn copy_on_write_isolates_handles() {
        let mut a = payload!(1i64);
        let b = a.clone();
        assert!(a.is_shared());

        *a.mutable_at::<i64>(0).unwrap() = 99;

        // The other handle still observes the original value.
        assert_eq!(a.get::<i64>(0), Some(&99));
        assert_eq!(b.get::<i64>(0), Some(&1));
        assert!(!b.is_shared());
    }

    #[test]
    fn mutation_without_sharing_keeps_storage() {
        let mut a = payload!(1i64);
        *a.mutable_at::<i64>(0).unwrap() = 2;
        assert_eq!(a.get::<i64>(0), Some(&2));
    }

    #[test]
    fn equality_is_structural() {
        let a = payload!(1i64, String::from("x"));
        let b = payload!(1i64, String::from("x"));
        let c = payload!(2i64, String::from("x"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, payload!(1i64));
    }

    #[test]
    fn save_load_roundtrip() {
        let original = payload!(42i64, String::from("hello"), true);
        let mut sink = BinarySerializer::new();
        original.save(&mut sink).unwrap();
        let bytes = sink.into_bytes();
        let mut source = BinaryDeserializer::new(&bytes);
        let restored = Payload::load(&mut source).unwrap();
        assert_eq!(original, restored);
        assert!(source.is_empty());
    }

    #[test]
    fn tuple_conversions() {
        let msg = (5i64, String::from("five")).into_payload();
        let (n, s): (i64, String) = msg.extract().unwrap();
        assert_eq!(n, 5);
        assert_eq!(s, "five");
    }

    #[test]
    fn extract_mismatch_is_unexpected_response() {
        let msg = payload!(5i64);
        let err = msg.extract::<(String,)>().unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnexpectedResponse);
    }

    #[test]
    fn unknown_wire_type_fails_load() {
        let mut sink = BinarySerializer::new();
        save_type_list(&[TypeId::MAX], &mut sink);
        let bytes = sink.into_bytes();
        let mut source = BinaryDeserializer::new(&bytes);
        assert_eq!(
            Payload::load(&mut source).unwrap_err().code(),
            ErrorCode::UnknownType
        );
    }
}
