//! Blocking client for the WebHDFS REST API.
//!
//! # Overview
//! Two layers: `RestTool` performs one authenticated HTTP call and normalizes
//! the response into JSON, text or an `ApiError`; `WebHdfsClient` maps
//! filesystem operations onto WebHDFS `op` codes, query parameters and verbs,
//! including the two-phase NameNode → DataNode write.
//!
//! # Design
//! - Requests and responses are plain data (`HttpRequest`, `HttpResponse`);
//!   the network sits behind the `Transport` trait, `ureq` by default.
//! - Every failure is an `ApiError`; transport error types never leak.
//! - Logging goes through `tracing`. Subscribers are installed once per
//!   process (`LogService::init`) or injected per client (`with_dispatch`).
//!
//! ```no_run
//! use webhdfs_core::{CreateOptions, WebHdfsClient};
//!
//! let client = WebHdfsClient::new("http://namenode:9870/webhdfs/v1", Some("hdfs"), None);
//! client.mkdirs("/data", "755")?;
//! client.create("/data/a.bin", "a.bin", &CreateOptions::default())?;
//! for entry in client.list_status("/data")? {
//!     println!("{} {}", entry.path_suffix, entry.length);
//! }
//! # Ok::<(), webhdfs_core::ApiError>(())
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod multipart;
pub mod rest;
pub mod transport;
pub mod types;

#[cfg(test)]
mod testing;

pub use client::{AppendOptions, CreateOptions, ReadOptions, WebHdfsClient};
pub use config::{ClientConfig, LogConfig};
pub use error::ApiError;
pub use http::{HttpMethod, HttpRequest, HttpResponse, Params};
pub use logging::LogService;
pub use rest::{ApiResponse, Body, RequestOptions, RestTool};
pub use transport::{Transport, TransportError, UreqTransport};
pub use types::{ContentSummary, FileChecksum, FileStatus, FileType};
