//! First-class behaviors: ordered match tables with optional timeouts.
//!
//! A behavior maps payload signatures to handlers. Handlers receive the
//! actor state, the per-message context, and the typed arguments cloned
//! out of the payload; whatever they return converts into an optional
//! reply through [`IntoReply`]. Behaviors stack: pushing installs a new
//! top, popping returns to the previous one, and an empty stack terminates
//! the actor.

// Layer 1: Standard library imports
use std::time::Duration;

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
use super::context::ActorContext;
use crate::error::{Error, ErrorCode};
use crate::message::payload::FromPayload;
use crate::message::type_list::TypeIdList;
use crate::message::Payload;
use crate::meta::TypeId;

/// Boxed message handler: state, context, payload in; optional reply out.
pub(crate) type MessageHandler<S> =
    Box<dyn FnMut(&mut S, &mut ActorContext<S>, &Payload) -> Result<Option<Payload>, Error> + Send>;

/// Boxed receive-timeout handler.
pub(crate) type TimeoutHandler<S> = Box<dyn FnMut(&mut S, &mut ActorContext<S>) + Send>;

struct BehaviorEntry<S> {
    signature: TypeIdList,
    handler: MessageHandler<S>,
}

struct BehaviorTimeout<S> {
    after: Duration,
    handler: TimeoutHandler<S>,
}

/// A match table of `(signature, handler)` pairs plus an optional receive
/// timeout.
///
/// # Example
/// ```rust,ignore
/// Behavior::new()
///     .on(|state: &mut Counter, _ctx, (delta,): (i64,)| {
///         state.value += delta;
///     })
///     .on(|state: &mut Counter, _ctx, (_q,): (String,)| {
///         hive_rt::payload!(state.value)
///     })
///     .with_timeout(Duration::from_secs(5), |_state, ctx| ctx.quit_normal())
/// ```
pub struct Behavior<S> {
    entries: Vec<BehaviorEntry<S>>,
    timeout: Option<BehaviorTimeout<S>>,
}

impl<S: 'static> Behavior<S> {
    /// Start an empty behavior.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            timeout: None,
        }
    }

    /// Append a handler for the signature of `A`.
    ///
    /// Earlier entries win when signatures collide, mirroring the order of
    /// a match expression.
    pub fn on<A, R, F>(mut self, mut f: F) -> Self
    where
        A: FromPayload,
        R: IntoReply,
        F: FnMut(&mut S, &mut ActorContext<S>, A) -> R + Send + 'static,
    {
        let signature = A::signature();
        self.entries.push(BehaviorEntry {
            signature,
            handler: Box::new(move |state, ctx, payload| match A::from_payload(payload) {
                Some(args) => f(state, ctx, args).into_reply(),
                None => Err(Error::with_context(
                    ErrorCode::UnexpectedMessage,
                    "payload does not match handler signature",
                )),
            }),
        });
        self
    }

    /// Install a receive timeout: when no message is consumed for `after`,
    /// the handler runs. The timeout re-arms after every consumed message
    /// and dies with the behavior.
    pub fn with_timeout<F>(mut self, after: Duration, f: F) -> Self
    where
        F: FnMut(&mut S, &mut ActorContext<S>) + Send + 'static,
    {
        self.timeout = Some(BehaviorTimeout {
            after,
            handler: Box::new(f),
        });
        self
    }

    /// Whether the behavior has neither handlers nor a timeout.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.timeout.is_none()
    }

    /// The receive-timeout duration, if any.
    pub(crate) fn timeout_after(&self) -> Option<Duration> {
        self.timeout.as_ref().map(|t| t.after)
    }

    /// Find the first handler matching `signature`.
    pub(crate) fn find_handler(&mut self, signature: &[TypeId]) -> Option<&mut MessageHandler<S>> {
        self.entries
            .iter_mut()
            .find(|entry| entry.signature.as_slice() == signature)
            .map(|entry| &mut entry.handler)
    }

    /// Invoke the timeout handler, if one is installed.
    pub(crate) fn run_timeout(&mut self, state: &mut S, ctx: &mut ActorContext<S>) {
        if let Some(timeout) = &mut self.timeout {
            (timeout.handler)(state, ctx);
        }
    }
}

impl<S: 'static> Default for Behavior<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Conversion of handler return values into optional replies.
pub trait IntoReply {
    /// `Ok(Some(_))` replies to requests, `Ok(None)` stays silent, and
    /// `Err(_)` becomes an error reply (for requests) or the actor's exit
    /// reason (for one-way messages).
    fn into_reply(self) -> Result<Option<Payload>, Error>;
}

impl IntoReply for () {
    fn into_reply(self) -> Result<Option<Payload>, Error> {
        Ok(None)
    }
}

impl IntoReply for Payload {
    fn into_reply(self) -> Result<Option<Payload>, Error> {
        Ok(Some(self))
    }
}

impl IntoReply for Option<Payload> {
    fn into_reply(self) -> Result<Option<Payload>, Error> {
        Ok(self)
    }
}

impl IntoReply for Error {
    fn into_reply(self) -> Result<Option<Payload>, Error> {
        Err(self)
    }
}

impl IntoReply for Result<Payload, Error> {
    fn into_reply(self) -> Result<Option<Payload>, Error> {
        self.map(Some)
    }
}

impl IntoReply for Result<(), Error> {
    fn into_reply(self) -> Result<Option<Payload>, Error> {
        self.map(|_| None)
    }
}

impl IntoReply for Result<Option<Payload>, Error> {
    fn into_reply(self) -> Result<Option<Payload>, Error> {
        self
    }
}
