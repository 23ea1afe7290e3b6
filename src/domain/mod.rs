//! Core domain types for email dispatch

pub mod connection;
pub mod delivery;
pub mod message;

pub use connection::{Connection, ConnectionPatch, ConnectionSummary, OAuthToken};
pub use delivery::{DeliveryLogEntry, DeliveryStats, DeliveryStatus};
pub use message::{AttachmentData, AttachmentRef, Recipient, SendRequest, SendResult};
