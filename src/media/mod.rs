//! Real-time media session management.
//!
//! `MediaSession` owns one room connection via the `RoomTransport` seam:
//! connect/disconnect, remote track (un)subscription, participant roster,
//! and local microphone publish/mute.

pub mod room;
pub mod session;
pub mod token;

pub use room::{
    DisconnectReason, MediaError, PlaybackSink, RoomConnection, RoomEvent, RoomHandle,
    RoomOptions, RoomTransport,
};
pub use session::{
    ConnectionState, DisconnectedHandler, MediaErrorHandler, MediaHandlers, MediaSession,
    MediaSessionOptions, ParticipantHandler, TrackSubscribedHandler,
};
pub use token::{CallToken, HttpTokenIssuer, TokenIssuer};
