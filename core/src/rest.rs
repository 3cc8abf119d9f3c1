//! Generic authenticated REST tool.
//!
//! # Design
//! `RestTool` performs one HTTP call per method invocation and normalizes the
//! outcome. Construction (`build_request`) and normalization
//! (`handle_response`) are pure; only `send` touches the `Transport`. The
//! bearer token is the only mutable state and is read when a request is
//! built, so rotating it never affects a call already in flight.

use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, info, Dispatch};

use crate::error::ApiError;
use crate::http::{set_header, HttpMethod, HttpRequest, HttpResponse, Params};
use crate::multipart::MultipartForm;
use crate::transport::{Transport, UreqTransport};

/// Request and response bodies are cut to this many characters in debug logs.
pub const LOG_BODY_LIMIT: usize = 500;

/// Request payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Body {
    #[default]
    Empty,
    /// Serialized as JSON with `Content-Type: application/json`.
    Json(Value),
    /// Sent as-is. Callers set the content type through headers.
    Raw(Vec<u8>),
    Multipart(MultipartForm),
}

/// Everything a single call may carry besides method and endpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub params: Params,
    /// Merged on top of the default headers; caller values win.
    pub headers: Vec<(String, String)>,
    pub body: Body,
    /// Absolute target URL used instead of `base_url + endpoint`, e.g. a
    /// DataNode `Location` handed out by a NameNode.
    pub url_override: Option<String>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key, value);
        self
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        set_header(&mut self.headers, name, value);
        self
    }

    pub fn json(mut self, value: Value) -> Self {
        self.body = Body::Json(value);
        self
    }

    pub fn raw(mut self, bytes: Vec<u8>) -> Self {
        self.body = Body::Raw(bytes);
        self
    }

    pub fn multipart(mut self, form: MultipartForm) -> Self {
        self.body = Body::Multipart(form);
        self
    }

    pub fn url_override(mut self, url: impl Into<String>) -> Self {
        self.url_override = Some(url.into());
        self
    }
}

/// Normalized successful response.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    Json(Value),
    /// The body was not valid JSON.
    Text(String),
}

impl ApiResponse {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ApiResponse::Json(value) => Some(value),
            ApiResponse::Text(_) => None,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.as_json().and_then(|v| v.get(field))
    }

    /// The WebHDFS `boolean` field; absent or non-boolean reads as `false`.
    pub fn boolean(&self) -> bool {
        self.get("boolean").and_then(Value::as_bool).unwrap_or(false)
    }

    /// A `Location` field in a JSON object body.
    pub fn location(&self) -> Option<&str> {
        self.get("Location").and_then(Value::as_str)
    }

    /// Deserialize a JSON body into `T`.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        match self {
            ApiResponse::Json(value) => Ok(serde_json::from_value(value)?),
            ApiResponse::Text(text) => Err(ApiError::Decode(format!(
                "expected a JSON body, got: {}",
                truncate(text.as_bytes(), LOG_BODY_LIMIT)
            ))),
        }
    }
}

/// Characters escaped inside one path segment. `/` is escaped too since
/// segments are encoded one at a time.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Join `base` and `endpoint` with exactly one `/` between them. Each
/// segment of `endpoint` is percent-encoded; `base` is taken as-is.
pub fn join_url(base: &str, endpoint: &str) -> String {
    let path = endpoint
        .trim_start_matches('/')
        .split('/')
        .map(|segment| utf8_percent_encode(segment, PATH_SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/");
    format!("{}/{path}", base.trim_end_matches('/'))
}

fn append_query(url: &str, params: &Params) -> String {
    if params.is_empty() {
        return url.to_string();
    }
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{}", params.encode())
}

fn truncate(bytes: &[u8], limit: usize) -> String {
    String::from_utf8_lossy(bytes).chars().take(limit).collect()
}

fn redacted(headers: &[(String, String)]) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(k, v)| {
            if k.eq_ignore_ascii_case("authorization") {
                (k.clone(), "Bearer ***".to_string())
            } else {
                (k.clone(), v.clone())
            }
        })
        .collect()
}

pub struct RestTool {
    base_url: String,
    token: RwLock<Option<String>>,
    transport: Arc<dyn Transport>,
    dispatch: Option<Dispatch>,
}

impl fmt::Debug for RestTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestTool")
            .field("base_url", &self.base_url)
            .field("has_token", &self.token.read().is_some())
            .finish()
    }
}

impl RestTool {
    /// A tool backed by the default `ureq` transport.
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self::with_transport(base_url, token, Arc::new(UreqTransport::new()))
    }

    pub fn with_transport(
        base_url: &str,
        token: Option<String>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: RwLock::new(token),
            transport,
            dispatch: None,
        }
    }

    /// Route this tool's log records to `dispatch` instead of the global
    /// subscriber.
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write() = Some(token.into());
        self.in_scope(|| info!("bearer token updated"));
    }

    pub fn clear_token(&self) {
        *self.token.write() = None;
        self.in_scope(|| info!("bearer token cleared"));
    }

    /// Run `f` with this tool's dispatch as the default subscriber.
    pub(crate) fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        match &self.dispatch {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, f),
            None => f(),
        }
    }

    fn default_headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![("Accept".to_string(), "application/json".to_string())];
        if let Some(token) = self.token.read().as_deref() {
            headers.push(("Authorization".to_string(), format!("Bearer {token}")));
        }
        headers
    }

    /// Build the request without executing it.
    pub fn build_request(
        &self,
        method: HttpMethod,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<HttpRequest, ApiError> {
        let target = match &options.url_override {
            Some(url) => url.clone(),
            None => join_url(&self.base_url, endpoint),
        };
        let url = append_query(&target, &options.params);

        let mut headers = self.default_headers();
        let body = match options.body {
            Body::Empty => None,
            Body::Json(value) => {
                set_header(&mut headers, "Content-Type", "application/json");
                Some(serde_json::to_vec(&value)?)
            }
            Body::Raw(bytes) => Some(bytes),
            Body::Multipart(form) => {
                set_header(&mut headers, "Content-Type", form.content_type());
                Some(form.encode())
            }
        };
        for (name, value) in &options.headers {
            set_header(&mut headers, name, value.clone());
        }

        Ok(HttpRequest {
            method,
            url,
            headers,
            body,
        })
    }

    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        info!(method = %request.method, url = %request.url, "sending request");
        debug!(headers = ?redacted(&request.headers), "request headers");
        if let Some(body) = &request.body {
            debug!(body = %truncate(body, LOG_BODY_LIMIT), "request body");
        }

        let response = self.transport.execute(request).map_err(|e| {
            error!(method = %request.method, url = %request.url, error = %e, "request failed");
            ApiError::network(e.0)
        })?;

        info!(status = response.status, "received response");
        debug!(headers = ?response.headers, "response headers");
        debug!(body = %truncate(&response.body, LOG_BODY_LIMIT), "response body");
        Ok(response)
    }

    /// Build and execute a request, returning the raw response whatever its
    /// status. Only transport failures are errors here.
    pub fn send(
        &self,
        method: HttpMethod,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<HttpResponse, ApiError> {
        let request = self.build_request(method, endpoint, options)?;
        self.in_scope(|| self.execute(&request))
    }

    /// Pass a `2xx` response through; anything else becomes `ApiError::Http`.
    pub fn check_status(response: HttpResponse) -> Result<HttpResponse, ApiError> {
        if response.is_success() {
            return Ok(response);
        }
        let body = response.text();
        error!(status = response.status, body = %truncate(body.as_bytes(), LOG_BODY_LIMIT), "request returned error status");
        Err(ApiError::Http {
            status: response.status,
            body,
        })
    }

    /// Map a raw response to `ApiResponse` or `ApiError::Http`.
    pub fn handle_response(response: HttpResponse) -> Result<ApiResponse, ApiError> {
        let response = Self::check_status(response)?;
        match serde_json::from_slice::<Value>(&response.body) {
            Ok(value) => Ok(ApiResponse::Json(value)),
            Err(_) => Ok(ApiResponse::Text(response.text())),
        }
    }

    pub fn request(
        &self,
        method: HttpMethod,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse, ApiError> {
        let request = self.build_request(method, endpoint, options)?;
        self.in_scope(|| self.execute(&request).and_then(Self::handle_response))
    }

    pub fn get(&self, endpoint: &str, options: RequestOptions) -> Result<ApiResponse, ApiError> {
        self.request(HttpMethod::Get, endpoint, options)
    }

    pub fn post(&self, endpoint: &str, options: RequestOptions) -> Result<ApiResponse, ApiError> {
        self.request(HttpMethod::Post, endpoint, options)
    }

    pub fn put(&self, endpoint: &str, options: RequestOptions) -> Result<ApiResponse, ApiError> {
        self.request(HttpMethod::Put, endpoint, options)
    }

    pub fn delete(&self, endpoint: &str, options: RequestOptions) -> Result<ApiResponse, ApiError> {
        self.request(HttpMethod::Delete, endpoint, options)
    }

    /// Multipart `POST` of a local file as part `field_name`, with
    /// `extra_fields` as additional text parts.
    pub fn upload(
        &self,
        endpoint: &str,
        file_path: impl AsRef<Path>,
        field_name: &str,
        extra_fields: &[(&str, &str)],
        headers: &[(&str, &str)],
    ) -> Result<ApiResponse, ApiError> {
        let path = file_path.as_ref();
        self.in_scope(|| info!(path = %path.display(), "starting file upload"));

        let bytes = fs::read(path).map_err(|e| {
            let err = ApiError::local_io(path, e);
            self.in_scope(|| error!(error = %err, "upload aborted"));
            err
        })?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| field_name.to_string());

        let mut form = MultipartForm::new();
        for (name, value) in extra_fields {
            form = form.text(*name, *value);
        }
        form = form.file(field_name, filename, bytes);

        let mut options = RequestOptions::new().multipart(form);
        for (name, value) in headers {
            options = options.header(name, *value);
        }
        let response = self.post(endpoint, options)?;
        self.in_scope(|| info!(path = %path.display(), "file uploaded"));
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serde_json::json;

    use super::*;
    use crate::testing::ScriptedTransport;

    fn tool(transport: &Arc<ScriptedTransport>) -> RestTool {
        RestTool::with_transport("http://nn:9870/webhdfs/v1/", None, transport.clone())
    }

    #[test]
    fn join_url_uses_exactly_one_slash() {
        for (base, endpoint) in [
            ("http://h/api", "x/y"),
            ("http://h/api/", "x/y"),
            ("http://h/api", "/x/y"),
            ("http://h/api//", "//x/y"),
        ] {
            assert_eq!(join_url(base, endpoint), "http://h/api/x/y", "{base} + {endpoint}");
        }
        assert_eq!(join_url("http://h/api/", ""), "http://h/api/");
    }

    #[test]
    fn join_url_percent_encodes_segments() {
        assert_eq!(
            join_url("http://h/webhdfs/v1", "/my dir/a#1"),
            "http://h/webhdfs/v1/my%20dir/a%231"
        );
        assert_eq!(join_url("http://h/api", "a?b/100%"), "http://h/api/a%3Fb/100%25");
    }

    #[test]
    fn encoded_path_keeps_query_intact() {
        let transport = ScriptedTransport::new();
        let req = tool(&transport)
            .build_request(HttpMethod::Get, "/a#b", RequestOptions::new().param("op", "GETFILESTATUS"))
            .unwrap();
        assert_eq!(req.url, "http://nn:9870/webhdfs/v1/a%23b?op=GETFILESTATUS");
        assert_eq!(req.query_param("op").as_deref(), Some("GETFILESTATUS"));
    }

    #[test]
    fn url_override_is_not_reencoded() {
        let transport = ScriptedTransport::new();
        let req = tool(&transport)
            .build_request(
                HttpMethod::Put,
                "/my dir",
                RequestOptions::new().url_override("http://dn1:9864/webhdfs/v1/my%20dir?op=CREATE"),
            )
            .unwrap();
        assert_eq!(req.url, "http://dn1:9864/webhdfs/v1/my%20dir?op=CREATE");
    }

    #[test]
    fn build_request_merges_default_and_caller_headers() {
        let transport = ScriptedTransport::new();
        let tool = RestTool::with_transport("http://h", Some("t0k".into()), transport);
        let req = tool
            .build_request(
                HttpMethod::Get,
                "/a",
                RequestOptions::new().header("accept", "text/plain").header("X-Trace", "1"),
            )
            .unwrap();
        assert_eq!(req.url, "http://h/a");
        assert_eq!(req.header("Accept"), Some("text/plain"));
        assert_eq!(req.header("Authorization"), Some("Bearer t0k"));
        assert_eq!(req.header("x-trace"), Some("1"));
        assert!(req.body.is_none());
    }

    #[test]
    fn build_request_without_token_has_no_authorization() {
        let transport = ScriptedTransport::new();
        let req = tool(&transport)
            .build_request(HttpMethod::Get, "a", RequestOptions::new())
            .unwrap();
        assert_eq!(req.header("Accept"), Some("application/json"));
        assert_eq!(req.header("Authorization"), None);
    }

    #[test]
    fn build_request_encodes_json_body() {
        let transport = ScriptedTransport::new();
        let req = tool(&transport)
            .build_request(HttpMethod::Post, "items", RequestOptions::new().json(json!({"k": 1})))
            .unwrap();
        assert_eq!(req.header("Content-Type"), Some("application/json"));
        let body: Value = serde_json::from_slice(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(body, json!({"k": 1}));
    }

    #[test]
    fn url_override_keeps_existing_query() {
        let transport = ScriptedTransport::new();
        let req = tool(&transport)
            .build_request(
                HttpMethod::Put,
                "ignored",
                RequestOptions::new()
                    .url_override("http://dn1:9864/webhdfs/v1/f?op=CREATE")
                    .param("x", "1"),
            )
            .unwrap();
        assert_eq!(req.url, "http://dn1:9864/webhdfs/v1/f?op=CREATE&x=1");
    }

    #[test]
    fn token_rotation_applies_to_next_call() {
        let transport = ScriptedTransport::new();
        transport.push_json(200, "{}");
        transport.push_json(200, "{}");
        transport.push_json(200, "{}");
        let tool = tool(&transport);

        tool.get("a", RequestOptions::new()).unwrap();
        tool.set_token("first");
        tool.get("a", RequestOptions::new()).unwrap();
        tool.clear_token();
        tool.get("a", RequestOptions::new()).unwrap();

        let requests = transport.requests();
        assert_eq!(requests[0].header("Authorization"), None);
        assert_eq!(requests[1].header("Authorization"), Some("Bearer first"));
        assert_eq!(requests[2].header("Authorization"), None);
    }

    #[test]
    fn success_json_is_decoded() {
        let transport = ScriptedTransport::new();
        transport.push_json(200, r#"{"boolean": true}"#);
        let resp = tool(&transport).put("d", RequestOptions::new()).unwrap();
        assert_eq!(resp, ApiResponse::Json(json!({"boolean": true})));
        assert!(resp.boolean());
    }

    #[test]
    fn success_non_json_falls_back_to_text() {
        let transport = ScriptedTransport::new();
        transport.push(201, Vec::new(), b"hello world".to_vec());
        let resp = tool(&transport).get("f", RequestOptions::new()).unwrap();
        assert_eq!(resp, ApiResponse::Text("hello world".into()));
        assert!(!resp.boolean());
    }

    #[test]
    fn error_status_is_http_error_with_body() {
        let transport = ScriptedTransport::new();
        transport.push(403, Vec::new(), b"Permission denied".to_vec());
        let err = tool(&transport).delete("f", RequestOptions::new()).unwrap_err();
        assert_eq!(
            err,
            ApiError::Http {
                status: 403,
                body: "Permission denied".into()
            }
        );
    }

    #[test]
    fn error_status_with_json_body_is_still_an_error() {
        let transport = ScriptedTransport::new();
        transport.push_json(404, r#"{"RemoteException":{"exception":"FileNotFoundException"}}"#);
        let err = tool(&transport).get("f", RequestOptions::new()).unwrap_err();
        assert_eq!(err.status_code(), 404);
        assert!(err.message().contains("FileNotFoundException"));
    }

    #[test]
    fn transport_failure_becomes_network_error() {
        let transport = ScriptedTransport::new();
        transport.fail("connection refused");
        let err = tool(&transport).get("f", RequestOptions::new()).unwrap_err();
        assert_eq!(err, ApiError::network("connection refused"));
        assert_eq!(err.status_code(), 0);
    }

    #[test]
    fn send_returns_redirects_unnormalized() {
        let transport = ScriptedTransport::new();
        transport.push(307, vec![("Location", "http://dn1:9864/x")], Vec::new());
        let resp = tool(&transport)
            .send(HttpMethod::Put, "f", RequestOptions::new())
            .unwrap();
        assert_eq!(resp.status, 307);
        assert_eq!(resp.header("location"), Some("http://dn1:9864/x"));
    }

    #[test]
    fn decode_text_is_decode_error() {
        let err = ApiResponse::Text("nope".into()).decode::<Value>().unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[test]
    fn truncate_counts_characters() {
        let long = "é".repeat(600);
        assert_eq!(truncate(long.as_bytes(), LOG_BODY_LIMIT).chars().count(), 500);
    }

    #[test]
    fn redacted_hides_token() {
        let headers = vec![("Authorization".to_string(), "Bearer secret".to_string())];
        assert_eq!(redacted(&headers)[0].1, "Bearer ***");
    }

    #[test]
    fn upload_sends_multipart_form() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"payload").unwrap();
        let transport = ScriptedTransport::new();
        transport.push_json(200, r#"{"ok": true}"#);

        let resp = tool(&transport)
            .upload("files", file.path(), "file", &[("kind", "raw")], &[("X-Req", "7")])
            .unwrap();
        assert_eq!(resp.get("ok"), Some(&json!(true)));

        let requests = transport.requests();
        let req = &requests[0];
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.url, "http://nn:9870/webhdfs/v1/files");
        assert!(req
            .header("Content-Type")
            .unwrap()
            .starts_with("multipart/form-data; boundary="));
        assert_eq!(req.header("X-Req"), Some("7"));
        let body = String::from_utf8(req.body.clone().unwrap()).unwrap();
        assert!(body.contains("name=\"kind\"\r\n\r\nraw\r\n"));
        assert!(body.contains("name=\"file\"; filename="));
        assert!(body.contains("payload"));
    }

    #[test]
    fn upload_of_missing_file_is_local_io_error() {
        let transport = ScriptedTransport::new();
        let err = tool(&transport)
            .upload("files", "/definitely/not/here.bin", "file", &[], &[])
            .unwrap_err();
        match err {
            ApiError::LocalIo { path, .. } => assert_eq!(path, "/definitely/not/here.bin"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(transport.call_count(), 0);
    }

    #[test]
    fn injected_dispatch_is_used() {
        let transport = ScriptedTransport::new();
        transport.push_json(200, "{}");
        let dispatch = Dispatch::new(tracing_subscriber::registry());
        let tool = tool(&transport).with_dispatch(dispatch);
        assert!(tool.get("a", RequestOptions::new()).is_ok());
    }
}
