//! The distribution layer: reactor, socket managers, BASP protocol,
//! remote-actor proxies, and the middleman façade.

pub(crate) mod accept;
pub mod basp;
pub mod middleman;
pub mod multiplexer;
pub(crate) mod proxy;
pub(crate) mod proxy_registry;
pub(crate) mod socket_manager;

pub use middleman::Middleman;
