//! Content fetch engines
//!
//! The coordinator never talks to the network itself. It hands a validated request
//! to a [`FetchCapability`], which performs the transfer and reports back through a
//! [`ProgressSink`].
//!
//! ## Architecture
//!
//! - [`FetchCapability`]: the engine seam (`supports`, `fetch`, `name`)
//! - [`ProgressSink`]: ordered reporting channel with built-in cancellation checkpoints
//! - [`YtDlpFetcher`]: engine backed by the external `yt-dlp` binary
//!
//! ## Usage
//!
//! ```no_run
//! use ydl_core::fetch::{FetchCapability, YtDlpFetcher};
//! use url::Url;
//!
//! let engine = YtDlpFetcher::from_path().expect("yt-dlp binary not found");
//! let url = Url::parse("https://www.youtube.com/watch?v=dQw4w9WgXcQ").unwrap();
//! assert!(engine.supports(&url));
//! ```

mod parser;
mod sink;
mod traits;
mod ytdlp;

pub use sink::ProgressSink;
pub use traits::{Artifact, FetchCapability, FetchProgress};
pub use ytdlp::YtDlpFetcher;
