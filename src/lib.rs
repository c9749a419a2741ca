// GeoPulse - Live Location Presence Gateway
//
// This crate implements the server side of a shared live map: every
// connected participant reports coordinates over a persistent WebSocket and
// receives the full, current set of all participants' positions after every
// change anywhere in the system.

pub mod config;
pub mod dispatch;
pub mod hub;
pub mod protocol;
pub mod registry;
pub mod server;

pub use config::GatewayConfig;
pub use dispatch::BroadcastDispatcher;
pub use hub::PresenceHub;
pub use protocol::{ClientFrame, FrameError, ParticipantEntry, ServerFrame};
pub use registry::{Participant, ParticipantRegistry, Position, PresenceSnapshot};
pub use server::GatewayServer;
