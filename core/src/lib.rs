//! Marketplace core: live-channel registry and fanout, conversation
//! aggregation, booking availability and lifecycle rules.
//!
//! Nothing in here talks to storage or HTTP; callers feed it data and
//! collaborator implementations.

pub mod availability;
pub mod booking;
pub mod conversations;
pub mod error;
pub mod live;
pub mod message;
pub mod profile;
pub mod registry;
pub mod services;

pub use availability::{BookingInterval, Interval};
pub use booking::{BookingStatus, PaymentState};
pub use conversations::{ConversationGroup, ConversationSummary};
pub use error::MarketError;
pub use live::{LiveEvent, NotificationKind};
pub use message::Message;
pub use profile::{ArtisanProfile, ClientProfile, Profile, ProfileResolver, Role};
pub use registry::{ConnectionGuard, ConnectionId, ConnectionRegistry, Outbox};
