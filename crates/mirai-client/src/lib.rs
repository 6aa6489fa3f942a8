//! # mirai-client
//!
//! Client side of a streaming chat session:
//!
//! - [`sse`]: turns a chunked `data:` byte stream into [`StreamEvent`]s
//! - [`backend`]: the [`ChatBackend`] seam and its wire types
//! - [`http`]: the reqwest implementation of [`ChatBackend`]
//! - [`session`]: the [`SessionController`] driving one send at a time
//! - [`history`]: the conversation directory and its selector view-model
//!
//! [`StreamEvent`]: mirai_core::StreamEvent

#![deny(unsafe_code)]

pub mod backend;
pub mod health;
pub mod history;
pub mod http;
pub mod mock;
pub mod session;
pub mod sse;

pub use backend::{ChatBackend, EventStream, StreamRequest, StreamResponse};
pub use health::{HealthReport, HealthStatus};
pub use history::{HistoryDirectory, HistorySelector};
pub use http::{HttpChatBackend, HttpConfig};
pub use mock::{MockBackend, MockResponse};
pub use session::SessionController;
pub use sse::{decode_stream, DecoderOptions, StreamDecoder};
