//! 64-bit message identifiers.
//!
//! Layout (most significant first): 2 category bits, 1 priority bit,
//! 61 bits of request counter. For any request id `r`, the matching
//! response id differs only in the category bits, which lets a responder
//! correlate without carrying extra state.

// Layer 1: Standard library imports
use std::fmt::{self, Display};

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
// (none)

const CATEGORY_SHIFT: u32 = 62;
const CATEGORY_MASK: u64 = 0b11 << CATEGORY_SHIFT;
const PRIORITY_BIT: u64 = 1 << 61;
const REQUEST_MASK: u64 = PRIORITY_BIT - 1;

const CATEGORY_ASYNC: u64 = 0;
const CATEGORY_REQUEST: u64 = 1;
const CATEGORY_RESPONSE: u64 = 2;

/// Compact message identity word.
///
/// # Example
/// ```rust
/// use hive_rt::message::MessageId;
///
/// let request = MessageId::make_request(7);
/// assert!(request.is_request());
/// let response = request.response_id();
/// assert!(response.is_response());
/// assert_eq!(response.request_number(), 7);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(u64);

impl MessageId {
    /// The id used for plain one-way messages.
    pub const ASYNC: MessageId = MessageId(0);

    /// Build a request id from a request counter value.
    pub fn make_request(number: u64) -> Self {
        Self((CATEGORY_REQUEST << CATEGORY_SHIFT) | (number & REQUEST_MASK))
    }

    /// The response id correlating with this request: same counter and
    /// priority, response category.
    pub fn response_id(self) -> Self {
        Self((self.0 & !CATEGORY_MASK) | (CATEGORY_RESPONSE << CATEGORY_SHIFT))
    }

    /// Raw wire representation.
    pub fn raw(self) -> u64 {
        self.0
    }

    /// Rebuild from the wire representation.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    fn category(self) -> u64 {
        (self.0 & CATEGORY_MASK) >> CATEGORY_SHIFT
    }

    /// Whether this is a plain one-way message id.
    pub fn is_async(self) -> bool {
        self.category() == CATEGORY_ASYNC
    }

    /// Whether this id tags a request.
    pub fn is_request(self) -> bool {
        self.category() == CATEGORY_REQUEST
    }

    /// Whether this id tags a response.
    pub fn is_response(self) -> bool {
        self.category() == CATEGORY_RESPONSE
    }

    /// Whether the priority bit is set.
    pub fn is_urgent(self) -> bool {
        self.0 & PRIORITY_BIT != 0
    }

    /// A copy of this id with the priority bit set.
    pub fn with_urgent_priority(self) -> Self {
        Self(self.0 | PRIORITY_BIT)
    }

    /// The request counter bits.
    pub fn request_number(self) -> u64 {
        self.0 & REQUEST_MASK
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::ASYNC
    }
}

impl Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let category = match self.category() {
            CATEGORY_ASYNC => "async",
            CATEGORY_REQUEST => "req",
            CATEGORY_RESPONSE => "resp",
            _ => "invalid",
        };
        if self.is_urgent() {
            write!(f, "{category}!{}", self.request_number())
        } else {
            write!(f, "{category}:{}", self.request_number())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn async_default() {
        assert!(MessageId::ASYNC.is_async());
        assert!(!MessageId::ASYNC.is_urgent());
        assert_eq!(MessageId::default(), MessageId::ASYNC);
    }

    #[test]
    fn request_response_correlation() {
        let request = MessageId::make_request(99).with_urgent_priority();
        let response = request.response_id();
        assert!(request.is_request());
        assert!(response.is_response());
        assert!(response.is_urgent());
        assert_eq!(response.request_number(), 99);
        assert_ne!(request, response);
    }

    #[test]
    fn counter_is_masked() {
        let id = MessageId::make_request(u64::MAX);
        assert!(id.is_request());
        assert_eq!(id.request_number(), REQUEST_MASK);
    }

    #[test]
    fn raw_roundtrip() {
        let id = MessageId::make_request(123).with_urgent_priority();
        assert_eq!(MessageId::from_raw(id.raw()), id);
    }
}
