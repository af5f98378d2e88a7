// Copyright (c) 2026 Oleksandr Melnychenko, Ukraine
// Ecliptix Security — OTR Messaging Protocol
// Licensed under the MIT License

//! Per-conversation OTR protocol engine.
//!
//! A [`Conversation`] is the unit of state between two endpoints: it consumes
//! inbound transport bytes and produces outbound transport bytes, driving
//! three interlocked state machines over one key-management context:
//!
//! * the four-message authenticated key exchange (AKE) that negotiates a
//!   shared Diffie–Hellman secret and authenticates long-term DSA keys,
//! * the data-message engine that encrypts, authenticates, and continuously
//!   re-keys the channel, revealing retired MAC keys for deniability,
//! * the Socialist Millionaires' Protocol (SMP) that proves knowledge of a
//!   shared secret inside the encrypted channel without revealing it.
//!
//! The transport itself is out of scope: the host moves the returned byte
//! slices and feeds received ones back in. Protocol events (SMP progress,
//! security changes, policy notifications) accumulate in an internal log
//! drained with [`Conversation::take_events`].

mod ake;
mod conversation;
mod data;
mod events;
mod fragment;
mod keys;
mod message;
mod policy;
mod smp;
mod smp_state;
mod version;

pub use conversation::{Conversation, MsgState};
pub use events::{MessageEvent, OtrEvent, SecurityChange, SmpEvent};
pub use message::{ERROR_PREFIX, QUERY_MESSAGE_V2, QUERY_MESSAGE_V3};
pub use policy::Policies;
pub use version::Version;
