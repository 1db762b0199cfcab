//! HTTPS fetch tunneled through a message socket.
//!
//! Builds on `sockline`: each fetch opens a fresh message socket, runs a
//! rustls client session over it, writes one HTTP/1.1 request, and decodes
//! the response from the decrypted plaintext.
//!
//! # Architecture
//!
//! `Fetcher` loads the trust anchors once and, per request, wires a
//! `TlsBridge` to a `Lines` reassembler and `read_response`. The bridge's
//! `Driver` and the decoder are polled together in the calling task, so a
//! fetch future is `!Send` and belongs on a current-thread runtime or a
//! `LocalSet`.
//!
//! Only chunked response bodies are supported. The zero-size chunk ends the
//! response and closes the session.
//!
//! # Example
//!
//! ```rust,ignore
//! use sockline_http::{FetchConfig, Fetcher, Request, TrustBundle};
//!
//! async fn example() -> Result<(), sockline_http::HttpError> {
//!     let fetcher = Fetcher::new(
//!         || open_websocket(),
//!         TrustBundle::Directory("certs".into()),
//!         FetchConfig::new("wss://relay.example.net/tunnel"),
//!     );
//!
//!     let req = Request::post("https://example.com/api")?.body("{}");
//!     if let Some(resp) = fetcher.fetch(&req).await? {
//!         assert_eq!(resp.status(), 200);
//!         let body = resp.text()?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod anchors;
pub mod client;
pub mod decode;
pub mod error;
pub mod lines;
pub mod request;
pub mod response;

pub use anchors::TrustBundle;
pub use client::{Connector, FetchConfig, Fetcher};
pub use decode::read_response;
pub use error::HttpError;
pub use lines::Lines;
pub use request::Request;
pub use response::Response;
