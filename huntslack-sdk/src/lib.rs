//! huntslack-sdk: Slack realtime channel state for the hunt tools.
//!
//! A [`session::SlackSession`] authenticates against Slack, opens an RTM
//! WebSocket, keeps a registry of channels (membership and unread counters)
//! in sync with the event stream, and fans changes out to per-channel
//! subscribers.

pub mod api;
pub mod auth;
pub mod channel;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod session;
pub mod subscription;
pub mod token;
pub mod transport;

pub use channel::{Channel, ChannelRegistry};
pub use error::{Result, SlackError};
pub use event::{ConnectionState, RtmEvent};
pub use session::{SessionConfig, SlackSession, Subscription};
