#![warn(unreachable_pub, unused_qualifications)]

//! *A Rust client for Google's Gemini Live API, built around turn collection.*
//!
//! # Overview
//!
//! A live session is a websocket on which the server pushes messages whenever it
//! likes. This crate queues those messages as they arrive and hands them back one
//! **turn** at a time: everything the model sent in reply to one submission, up to
//! and including the message flagged `turnComplete`.
//!
//! - [`Client`] opens sessions and carries the API key
//! - [`LiveSession`] sends client content and collects turns
//! - [`TurnCollector`] drains the session's queue, optionally bounded by a number
//!   of polls
//! - [`Turn`] assembles the reply text and saves any inline images
//!
//! # Authentication
//!
//! The client requires a Gemini API key which can be provided in two ways:
//! - Environment variable: `GEMINI_API_KEY`, via `Client::from_env()`
//! - Programmatically: `Client::new(api_key)`
//!
//! # Basic Usage
//!
//! ```rust,no_run
//! #[tokio::main]
//! async fn main() -> gemini_live::Result<()> {
//!     let client = gemini_live::Client::from_env()?;
//!     let mut session = client.live("gemini-2.0-flash-exp").await?;
//!
//!     let turn = session.ask("Tell me a short story about vibe coding").await?;
//!     println!("{}", turn.text());
//!
//!     session.close().await
//! }
//! ```
//!
//! # Testing without a server
//!
//! [`LiveSession::new`] accepts any [`Transport`]. A fake one only has to push
//! [`types::ServerMessage`]s to the [`QueueProducer`] it was given.

mod blob;
mod client;
mod collector;
mod error;
mod queue;
mod session;
mod transport;
pub mod types;

pub type Result<T> = std::result::Result<T, Error>;

pub use blob::{PcmFormat, write_blob, write_wav};
pub use client::{Client, ClientInner, Connect};
pub use collector::{
    CollectorConfig, DEFAULT_POLL_INTERVAL, Turn, TurnCollector, TurnState, assemble_text,
};
pub use error::Error;
pub use queue::{Delivery, MessageQueue, QueueProducer};
pub use session::LiveSession;
pub use transport::{Transport, WebSocketTransport};
