//! WebHDFS operations on top of `RestTool`.
//!
//! # Design
//! `WebHdfsClient` holds a `RestTool` and the identity parameters merged into
//! every call; it carries no other state. Each method maps to one row of the
//! WebHDFS v1 operation table: it builds the query (identity first, then the
//! operation's own parameters), issues the call and extracts the typed result.
//!
//! `create` and `append` follow the two-phase write protocol: a metadata
//! request to the NameNode yields a DataNode `Location`, and the payload goes
//! to that URL in a second request. The transport never follows redirects on
//! its own; `OPEN` and `GETFILECHECKSUM` follow a single 3xx hop explicitly.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn, Dispatch};

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpResponse, Params};
use crate::rest::{ApiResponse, RequestOptions, RestTool};
use crate::transport::Transport;
use crate::types::{
    ContentSummary, ContentSummaryEnvelope, FileChecksum, FileChecksumEnvelope, FileStatus,
    FileStatusEnvelope, FileStatusesEnvelope, PathEnvelope,
};

pub const USER_NAME_PARAM: &str = "user.name";
pub const DEFAULT_PERMISSION: &str = "755";
const OCTET_STREAM: &str = "application/octet-stream";

/// Options for `create`. Unset fields are left out of the query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOptions {
    pub overwrite: bool,
    pub replication: Option<u16>,
    pub block_size: Option<u64>,
    /// Octal, e.g. `"644"`.
    pub permission: Option<String>,
    pub buffer_size: Option<u32>,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            overwrite: true,
            replication: None,
            block_size: None,
            permission: None,
            buffer_size: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppendOptions {
    pub buffer_size: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadOptions {
    pub offset: Option<u64>,
    pub length: Option<u64>,
    pub buffer_size: Option<u32>,
}

#[derive(Debug)]
pub struct WebHdfsClient {
    rest: RestTool,
    default_params: Params,
}

impl WebHdfsClient {
    /// `base_url` points at the WebHDFS root, e.g. `http://namenode:9870/webhdfs/v1`.
    pub fn new(base_url: &str, username: Option<&str>, token: Option<String>) -> Self {
        Self::from_rest(RestTool::new(base_url, token), username)
    }

    pub fn with_transport(
        base_url: &str,
        username: Option<&str>,
        token: Option<String>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self::from_rest(RestTool::with_transport(base_url, token, transport), username)
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(
            &config.base_url,
            config.username.as_deref(),
            config.token.clone(),
        )
    }

    pub fn from_rest(rest: RestTool, username: Option<&str>) -> Self {
        let mut default_params = Params::new();
        if let Some(username) = username {
            default_params.insert(USER_NAME_PARAM, username);
        }
        Self {
            rest,
            default_params,
        }
    }

    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.rest = self.rest.with_dispatch(dispatch);
        self
    }

    pub fn rest(&self) -> &RestTool {
        &self.rest
    }

    pub fn set_token(&self, token: impl Into<String>) {
        self.rest.set_token(token);
    }

    pub fn clear_token(&self) {
        self.rest.clear_token();
    }

    /// Identity parameters, then `op`, then `extra`; later entries win.
    fn merge_params(&self, op: &str, extra: &Params) -> Params {
        let mut params = self.default_params.clone();
        params.insert("op", op);
        params.merge(extra);
        params
    }

    fn options(&self, op: &str, extra: &Params) -> RequestOptions {
        RequestOptions::new().params(self.merge_params(op, extra))
    }

    /// Run any WebHDFS operation. `overrides` are merged last and may replace
    /// the identity parameter for this call only.
    pub fn execute_op(
        &self,
        method: HttpMethod,
        path: &str,
        op: &str,
        overrides: &Params,
    ) -> Result<ApiResponse, ApiError> {
        self.rest.request(method, path, self.options(op, overrides))
    }

    pub fn list_status(&self, path: &str) -> Result<Vec<FileStatus>, ApiError> {
        let response = self.rest.get(path, self.options("LISTSTATUS", &Params::new()))?;
        let listing: FileStatusesEnvelope = response.decode()?;
        Ok(listing.file_statuses.file_status)
    }

    pub fn get_file_status(&self, path: &str) -> Result<FileStatus, ApiError> {
        let response = self.rest.get(path, self.options("GETFILESTATUS", &Params::new()))?;
        let status: FileStatusEnvelope = response.decode()?;
        Ok(status.file_status)
    }

    pub fn mkdirs(&self, path: &str, permission: &str) -> Result<bool, ApiError> {
        let extra: Params = [("permission", permission)].into_iter().collect();
        let response = self.rest.put(path, self.options("MKDIRS", &extra))?;
        Ok(response.boolean())
    }

    /// Read a file or a byte range of it. The whole range is buffered.
    pub fn read_file(&self, path: &str, options: &ReadOptions) -> Result<Vec<u8>, ApiError> {
        let mut extra = Params::new();
        extra.insert_opt("offset", options.offset);
        extra.insert_opt("length", options.length);
        extra.insert_opt("buffersize", options.buffer_size);

        let response = self.get_following_redirect(path, self.options("OPEN", &extra))?;
        let response = self.rest.in_scope(|| RestTool::check_status(response))?;
        Ok(response.body)
    }

    /// Upload `local_path` to `path`.
    ///
    /// Returns `Ok(false)` when the NameNode does not hand out a DataNode
    /// location.
    pub fn create(
        &self,
        path: &str,
        local_path: impl AsRef<Path>,
        options: &CreateOptions,
    ) -> Result<bool, ApiError> {
        let mut extra = Params::new();
        extra.insert("overwrite", options.overwrite.to_string());
        extra.insert_opt("replication", options.replication);
        extra.insert_opt("blocksize", options.block_size);
        extra.insert_opt("permission", options.permission.as_deref());
        extra.insert_opt("buffersize", options.buffer_size);

        self.two_phase_write(HttpMethod::Put, path, "CREATE", &extra, local_path.as_ref())
    }

    /// Append the content of `local_path` to the existing file `path`.
    pub fn append(
        &self,
        path: &str,
        local_path: impl AsRef<Path>,
        options: &AppendOptions,
    ) -> Result<bool, ApiError> {
        let mut extra = Params::new();
        extra.insert_opt("buffersize", options.buffer_size);

        self.two_phase_write(HttpMethod::Post, path, "APPEND", &extra, local_path.as_ref())
    }

    pub fn delete(&self, path: &str, recursive: bool) -> Result<bool, ApiError> {
        let extra: Params = [("recursive", recursive.to_string())].into_iter().collect();
        let response = self.rest.delete(path, self.options("DELETE", &extra))?;
        Ok(response.boolean())
    }

    pub fn rename(&self, src: &str, dst: &str) -> Result<bool, ApiError> {
        let extra: Params = [("destination", dst)].into_iter().collect();
        let response = self.rest.put(src, self.options("RENAME", &extra))?;
        Ok(response.boolean())
    }

    pub fn get_content_summary(&self, path: &str) -> Result<ContentSummary, ApiError> {
        let response = self
            .rest
            .get(path, self.options("GETCONTENTSUMMARY", &Params::new()))?;
        let summary: ContentSummaryEnvelope = response.decode()?;
        Ok(summary.content_summary)
    }

    pub fn get_file_checksum(&self, path: &str) -> Result<FileChecksum, ApiError> {
        let response =
            self.get_following_redirect(path, self.options("GETFILECHECKSUM", &Params::new()))?;
        let checksum: FileChecksumEnvelope = self
            .rest
            .in_scope(|| RestTool::handle_response(response))?
            .decode()?;
        Ok(checksum.file_checksum)
    }

    pub fn get_home_directory(&self) -> Result<String, ApiError> {
        let response = self
            .rest
            .get("/", self.options("GETHOMEDIRECTORY", &Params::new()))?;
        let home: PathEnvelope = response.decode()?;
        Ok(home.path)
    }

    fn get_following_redirect(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<HttpResponse, ApiError> {
        let response = self.rest.send(HttpMethod::Get, path, options)?;
        match redirect_header(&response) {
            Some(location) => {
                self.rest
                    .in_scope(|| debug!(location = %location, "following redirect"));
                self.rest.send(
                    HttpMethod::Get,
                    "",
                    RequestOptions::new().url_override(location),
                )
            }
            None => Ok(response),
        }
    }

    fn two_phase_write(
        &self,
        method: HttpMethod,
        path: &str,
        op: &str,
        extra: &Params,
        local_path: &Path,
    ) -> Result<bool, ApiError> {
        let payload = fs::read(local_path).map_err(|e| {
            let err = ApiError::local_io(local_path, e);
            self.rest.in_scope(|| warn!(op, error = %err, "local file unreadable"));
            err
        })?;

        let response = self.rest.send(method, path, self.options(op, extra))?;
        let location = match redirect_header(&response) {
            Some(location) => Some(location),
            None => self
                .rest
                .in_scope(|| RestTool::handle_response(response))?
                .location()
                .map(str::to_string),
        };
        let Some(location) = location else {
            self.rest
                .in_scope(|| warn!(op, path, "no DataNode location in metadata response"));
            return Ok(false);
        };

        self.rest.in_scope(|| {
            info!(op, path, location = %location, bytes = payload.len(), "sending payload to DataNode")
        });
        self.rest.request(
            method,
            "",
            RequestOptions::new()
                .url_override(location)
                .header("Content-Type", OCTET_STREAM)
                .raw(payload),
        )?;
        Ok(true)
    }
}

/// `Location` of a 3xx response.
fn redirect_header(response: &HttpResponse) -> Option<String> {
    if !response.is_redirect() {
        return None;
    }
    response.header("Location").map(str::to_string)
}
