//! In-memory WebHDFS NameNode and DataNode.
//!
//! NameNode routes live under `/webhdfs/v1`. Data-carrying operations
//! (`CREATE`, `APPEND`, `OPEN`, `GETFILECHECKSUM`) answer `307` with a
//! `Location` on `/datanode/webhdfs/v1` of the same server, or a JSON
//! `{"Location": ...}` body when the request carries `noredirect=true`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use percent_encoding::percent_decode_str;
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};

const NAMENODE_PREFIX: &str = "/webhdfs/v1";
const DATANODE_PREFIX: &str = "/datanode/webhdfs/v1";
const DEFAULT_USER: &str = "dr.who";
const DEFAULT_REPLICATION: u16 = 3;
const DEFAULT_BLOCK_SIZE: u64 = 134_217_728;

#[derive(Clone, Debug, Default)]
pub struct MockConfig {
    /// Requests whose `user.name` is listed get `403 Permission denied`.
    pub denied_users: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Directory,
    File {
        data: Vec<u8>,
        replication: u16,
        block_size: u64,
    },
}

#[derive(Clone, Debug)]
pub struct Node {
    pub kind: NodeKind,
    pub owner: String,
    pub permission: String,
    pub modification_time: u64,
}

impl Node {
    fn directory(owner: &str, permission: &str) -> Self {
        Node {
            kind: NodeKind::Directory,
            owner: owner.to_string(),
            permission: permission.to_string(),
            modification_time: now_millis(),
        }
    }

    fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    fn len(&self) -> u64 {
        match &self.kind {
            NodeKind::Directory => 0,
            NodeKind::File { data, .. } => data.len() as u64,
        }
    }
}

/// Absolute path → node. The root directory always exists.
pub type Namespace = BTreeMap<String, Node>;

#[derive(Clone)]
pub struct AppState {
    pub fs: Arc<RwLock<Namespace>>,
    pub config: Arc<MockConfig>,
}

pub fn app() -> Router {
    app_with(MockConfig::default())
}

pub fn app_with(config: MockConfig) -> Router {
    let mut fs = Namespace::new();
    fs.insert("/".to_string(), Node::directory("hdfs", "755"));
    let state = AppState {
        fs: Arc::new(RwLock::new(fs)),
        config: Arc::new(config),
    };
    let namenode = get(namenode_get)
        .put(namenode_put)
        .post(namenode_post)
        .delete(namenode_delete);
    let datanode = get(datanode_get).put(datanode_put).post(datanode_post);
    Router::new()
        .route("/webhdfs/v1", namenode.clone())
        .route("/webhdfs/v1/", namenode.clone())
        .route("/webhdfs/v1/{*path}", namenode)
        .route("/datanode/webhdfs/v1/{*path}", datanode)
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

pub async fn run_with(listener: TcpListener, config: MockConfig) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with(config)).await
}

type Params = HashMap<String, String>;

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Filesystem path addressed by `uri` below `prefix`, normalized to a leading
/// slash and no trailing slash.
/// The decoded filesystem path below `prefix`.
fn fs_path(uri: &Uri, prefix: &str) -> String {
    let rest = uri.path().strip_prefix(prefix).unwrap_or("");
    let decoded = percent_decode_str(rest).decode_utf8_lossy();
    format!("/{}", decoded.trim_matches('/'))
}

fn parent(path: &str) -> Option<String> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(idx) => Some(path[..idx].to_string()),
        None => None,
    }
}

fn name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or("")
}

fn is_descendant(candidate: &str, ancestor: &str) -> bool {
    if ancestor == "/" {
        return candidate != "/";
    }
    candidate
        .strip_prefix(ancestor)
        .is_some_and(|rest| rest.starts_with('/'))
}

fn user(params: &Params) -> &str {
    params.get("user.name").map(String::as_str).unwrap_or(DEFAULT_USER)
}

fn flag(params: &Params, key: &str, default: bool) -> bool {
    params
        .get(key)
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn remote_exception(status: StatusCode, exception: &str, message: String) -> Response {
    let body = json!({
        "RemoteException": {
            "exception": exception,
            "javaClassName": format!("org.apache.hadoop.{exception}"),
            "message": message,
        }
    });
    (status, Json(body)).into_response()
}

fn not_found(path: &str) -> Response {
    remote_exception(
        StatusCode::NOT_FOUND,
        "FileNotFoundException",
        format!("File does not exist: {path}"),
    )
}

fn bad_op(op: &str, method: &str) -> Response {
    remote_exception(
        StatusCode::BAD_REQUEST,
        "IllegalArgumentException",
        format!("Invalid value for webhdfs parameter \"op\": {op} is not a valid {method} operation"),
    )
}

fn boolean(value: bool) -> Response {
    Json(json!({ "boolean": value })).into_response()
}

fn denied(state: &AppState, params: &Params) -> Option<Response> {
    let user = params.get("user.name")?;
    if state.config.denied_users.iter().any(|u| u == user) {
        return Some((StatusCode::FORBIDDEN, "Permission denied").into_response());
    }
    None
}

fn file_status_json(suffix: &str, node: &Node, children: Option<usize>) -> Value {
    let (file_type, replication, block_size) = match &node.kind {
        NodeKind::Directory => ("DIRECTORY", 0, 0),
        NodeKind::File {
            replication,
            block_size,
            ..
        } => ("FILE", *replication, *block_size),
    };
    let mut status = json!({
        "accessTime": if node.is_dir() { 0 } else { node.modification_time },
        "blockSize": block_size,
        "group": "supergroup",
        "length": node.len(),
        "modificationTime": node.modification_time,
        "owner": node.owner,
        "pathSuffix": suffix,
        "permission": node.permission,
        "replication": replication,
        "type": file_type,
    });
    if let Some(children) = children {
        status["childrenNum"] = json!(children);
    }
    status
}

fn children<'a>(fs: &'a Namespace, dir: &'a str) -> impl Iterator<Item = (&'a String, &'a Node)> {
    fs.iter()
        .filter(move |(path, _)| parent(path).as_deref() == Some(dir))
}

/// `307` to the DataNode, or `200 {"Location": ...}` with `noredirect=true`.
fn redirect(headers: &HeaderMap, uri: &Uri, params: &Params) -> Response {
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");
    // Still percent-encoded, as the client sent it.
    let path = uri.path().strip_prefix(NAMENODE_PREFIX).unwrap_or("");
    let query = uri.query().unwrap_or("");
    let location =
        format!("http://{host}{DATANODE_PREFIX}{path}?{query}&namenoderpcaddress=localhost:8020");
    debug!(location = %location, "redirecting to datanode");
    if flag(params, "noredirect", false) {
        return Json(json!({ "Location": location })).into_response();
    }
    (
        StatusCode::TEMPORARY_REDIRECT,
        [(header::LOCATION, location)],
    )
        .into_response()
}

async fn namenode_get(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    Query(params): Query<Params>,
) -> Response {
    if let Some(resp) = denied(&state, &params) {
        return resp;
    }
    let path = fs_path(&uri, NAMENODE_PREFIX);
    let op = params.get("op").cloned().unwrap_or_default();
    let fs = state.fs.read().await;

    match op.as_str() {
        "GETFILESTATUS" => match fs.get(&path) {
            Some(node) => {
                let count = node.is_dir().then(|| children(&fs, &path).count());
                Json(json!({ "FileStatus": file_status_json("", node, count) })).into_response()
            }
            None => not_found(&path),
        },
        "LISTSTATUS" => match fs.get(&path) {
            Some(node) if node.is_dir() => {
                let entries: Vec<Value> = children(&fs, &path)
                    .map(|(child, node)| {
                        let count = node.is_dir().then(|| children(&fs, child).count());
                        file_status_json(name(child), node, count)
                    })
                    .collect();
                Json(json!({ "FileStatuses": { "FileStatus": entries } })).into_response()
            }
            Some(node) => Json(json!({
                "FileStatuses": { "FileStatus": [file_status_json("", node, None)] }
            }))
            .into_response(),
            None => not_found(&path),
        },
        "GETCONTENTSUMMARY" => match fs.get(&path) {
            Some(node) => {
                let mut directories = 0u64;
                let mut files = 0u64;
                let mut length = 0u64;
                let subtree = fs
                    .iter()
                    .filter(|(p, _)| p.as_str() == path || is_descendant(p, &path));
                for (_, n) in subtree {
                    if n.is_dir() {
                        directories += 1;
                    } else {
                        files += 1;
                        length += n.len();
                    }
                }
                let replication = match &node.kind {
                    NodeKind::File { replication, .. } => *replication as u64,
                    NodeKind::Directory => DEFAULT_REPLICATION as u64,
                };
                Json(json!({
                    "ContentSummary": {
                        "directoryCount": directories,
                        "fileCount": files,
                        "length": length,
                        "quota": -1,
                        "spaceConsumed": length * replication,
                        "spaceQuota": -1,
                    }
                }))
                .into_response()
            }
            None => not_found(&path),
        },
        "GETHOMEDIRECTORY" => {
            Json(json!({ "Path": format!("/user/{}", user(&params)) })).into_response()
        }
        "OPEN" | "GETFILECHECKSUM" => match fs.get(&path) {
            Some(node) if !node.is_dir() => redirect(&headers, &uri, &params),
            Some(_) => remote_exception(
                StatusCode::NOT_FOUND,
                "FileNotFoundException",
                format!("Path is not a file: {path}"),
            ),
            None => not_found(&path),
        },
        other => bad_op(other, "GET"),
    }
}

async fn namenode_put(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    Query(params): Query<Params>,
) -> Response {
    if let Some(resp) = denied(&state, &params) {
        return resp;
    }
    let path = fs_path(&uri, NAMENODE_PREFIX);
    let op = params.get("op").cloned().unwrap_or_default();

    match op.as_str() {
        "MKDIRS" => {
            let mut fs = state.fs.write().await;
            let permission = params.get("permission").map(String::as_str).unwrap_or("755");
            let mut ancestors = vec![path.clone()];
            let mut cursor = parent(&path);
            while let Some(p) = cursor {
                cursor = parent(&p);
                ancestors.push(p);
            }
            for dir in ancestors.iter().rev() {
                match fs.get(dir) {
                    Some(node) if !node.is_dir() => {
                        return remote_exception(
                            StatusCode::FORBIDDEN,
                            "ParentNotDirectoryException",
                            format!("{dir} is not a directory"),
                        );
                    }
                    Some(_) => {}
                    None => {
                        fs.insert(dir.clone(), Node::directory(user(&params), permission));
                    }
                }
            }
            info!(path = %path, "mkdirs");
            boolean(true)
        }
        "RENAME" => {
            let Some(destination) = params.get("destination") else {
                return remote_exception(
                    StatusCode::BAD_REQUEST,
                    "IllegalArgumentException",
                    "Required param destination for op: RENAME is null or empty".to_string(),
                );
            };
            let dst = format!("/{}", destination.trim_matches('/'));
            let mut fs = state.fs.write().await;
            let dst_parent_is_dir = parent(&dst)
                .and_then(|p| fs.get(&p))
                .is_some_and(Node::is_dir);
            if path == "/" || !fs.contains_key(&path) || fs.contains_key(&dst) || !dst_parent_is_dir
            {
                return boolean(false);
            }
            let moved: Vec<String> = fs
                .keys()
                .filter(|p| p.as_str() == path || is_descendant(p, &path))
                .cloned()
                .collect();
            for old in moved {
                if let Some(node) = fs.remove(&old) {
                    let new = format!("{dst}{}", &old[path.len()..]);
                    fs.insert(new, node);
                }
            }
            info!(src = %path, dst = %dst, "rename");
            boolean(true)
        }
        "CREATE" => {
            let fs = state.fs.read().await;
            match fs.get(&path) {
                Some(node) if node.is_dir() => remote_exception(
                    StatusCode::FORBIDDEN,
                    "FileAlreadyExistsException",
                    format!("{path} already exists as a directory"),
                ),
                Some(_) if !flag(&params, "overwrite", false) => remote_exception(
                    StatusCode::FORBIDDEN,
                    "FileAlreadyExistsException",
                    format!("{path} for client already exists"),
                ),
                _ => redirect(&headers, &uri, &params),
            }
        }
        other => bad_op(other, "PUT"),
    }
}

async fn namenode_post(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    Query(params): Query<Params>,
) -> Response {
    if let Some(resp) = denied(&state, &params) {
        return resp;
    }
    let path = fs_path(&uri, NAMENODE_PREFIX);
    let op = params.get("op").cloned().unwrap_or_default();

    match op.as_str() {
        "APPEND" => {
            let fs = state.fs.read().await;
            match fs.get(&path) {
                Some(node) if !node.is_dir() => redirect(&headers, &uri, &params),
                _ => not_found(&path),
            }
        }
        other => bad_op(other, "POST"),
    }
}

async fn namenode_delete(
    State(state): State<AppState>,
    uri: Uri,
    Query(params): Query<Params>,
) -> Response {
    if let Some(resp) = denied(&state, &params) {
        return resp;
    }
    let path = fs_path(&uri, NAMENODE_PREFIX);
    let op = params.get("op").cloned().unwrap_or_default();
    if op != "DELETE" {
        return bad_op(&op, "DELETE");
    }

    let mut fs = state.fs.write().await;
    if path == "/" || !fs.contains_key(&path) {
        return boolean(false);
    }
    let descendants: Vec<String> = fs
        .keys()
        .filter(|p| is_descendant(p, &path))
        .cloned()
        .collect();
    if !descendants.is_empty() && !flag(&params, "recursive", false) {
        return remote_exception(
            StatusCode::FORBIDDEN,
            "PathIsNotEmptyDirectoryException",
            format!("{path} is non empty"),
        );
    }
    for p in descendants {
        fs.remove(&p);
    }
    fs.remove(&path);
    info!(path = %path, "delete");
    boolean(true)
}

async fn datanode_get(
    State(state): State<AppState>,
    uri: Uri,
    Query(params): Query<Params>,
) -> Response {
    let path = fs_path(&uri, DATANODE_PREFIX);
    let fs = state.fs.read().await;
    let Some(NodeKind::File { data, .. }) = fs.get(&path).map(|n| &n.kind) else {
        return not_found(&path);
    };

    match params.get("op").map(String::as_str) {
        Some("OPEN") => {
            let offset = params
                .get("offset")
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(0)
                .min(data.len());
            let end = params
                .get("length")
                .and_then(|v| v.parse::<usize>().ok())
                .map(|len| offset.saturating_add(len).min(data.len()))
                .unwrap_or(data.len());
            (
                [(header::CONTENT_TYPE, "application/octet-stream")],
                data[offset..end].to_vec(),
            )
                .into_response()
        }
        Some("GETFILECHECKSUM") => {
            let crc = crc32fast::hash(data);
            Json(json!({
                "FileChecksum": {
                    "algorithm": "CRC32",
                    "bytes": format!("{crc:08x}"),
                    "length": 4,
                }
            }))
            .into_response()
        }
        Some(other) => bad_op(other, "GET"),
        None => bad_op("", "GET"),
    }
}

async fn datanode_put(
    State(state): State<AppState>,
    uri: Uri,
    Query(params): Query<Params>,
    body: Bytes,
) -> Response {
    let path = fs_path(&uri, DATANODE_PREFIX);
    let mut fs = state.fs.write().await;

    let mut cursor = parent(&path);
    while let Some(dir) = cursor {
        cursor = parent(&dir);
        fs.entry(dir)
            .or_insert_with(|| Node::directory(user(&params), "755"));
    }

    let replication = params
        .get("replication")
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_REPLICATION);
    let block_size = params
        .get("blocksize")
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_BLOCK_SIZE);
    let permission = params.get("permission").map(String::as_str).unwrap_or("644");
    fs.insert(
        path.clone(),
        Node {
            kind: NodeKind::File {
                data: body.to_vec(),
                replication,
                block_size,
            },
            owner: user(&params).to_string(),
            permission: permission.to_string(),
            modification_time: now_millis(),
        },
    );
    info!(path = %path, bytes = body.len(), "create");
    (
        StatusCode::CREATED,
        [(header::LOCATION, format!("hdfs://localhost:8020{path}"))],
    )
        .into_response()
}

async fn datanode_post(State(state): State<AppState>, uri: Uri, body: Bytes) -> Response {
    let path = fs_path(&uri, DATANODE_PREFIX);
    let mut fs = state.fs.write().await;
    match fs.get_mut(&path) {
        Some(node) => match &mut node.kind {
            NodeKind::File { data, .. } => {
                data.extend_from_slice(&body);
                node.modification_time = now_millis();
                info!(path = %path, bytes = body.len(), "append");
                StatusCode::OK.into_response()
            }
            NodeKind::Directory => not_found(&path),
        },
        None => not_found(&path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_of_nested_and_top_level_paths() {
        assert_eq!(parent("/a/b/c").as_deref(), Some("/a/b"));
        assert_eq!(parent("/a").as_deref(), Some("/"));
        assert_eq!(parent("/"), None);
    }

    #[test]
    fn fs_path_normalizes_slashes() {
        let uri: Uri = "/webhdfs/v1/a/b/?op=LISTSTATUS".parse().unwrap();
        assert_eq!(fs_path(&uri, NAMENODE_PREFIX), "/a/b");
        let root: Uri = "/webhdfs/v1/?op=LISTSTATUS".parse().unwrap();
        assert_eq!(fs_path(&root, NAMENODE_PREFIX), "/");
    }

    #[test]
    fn fs_path_decodes_percent_escapes() {
        let uri: Uri = "/webhdfs/v1/my%20dir/a%231?op=MKDIRS".parse().unwrap();
        assert_eq!(fs_path(&uri, NAMENODE_PREFIX), "/my dir/a#1");
    }

    #[test]
    fn descendant_check_respects_segment_boundaries() {
        assert!(is_descendant("/a/b", "/a"));
        assert!(!is_descendant("/ab", "/a"));
        assert!(!is_descendant("/a", "/a"));
        assert!(is_descendant("/a", "/"));
    }

    #[test]
    fn directory_status_json_has_directory_type() {
        let node = Node::directory("hdfs", "755");
        let status = file_status_json("d", &node, Some(0));
        assert_eq!(status["type"], "DIRECTORY");
        assert_eq!(status["pathSuffix"], "d");
        assert_eq!(status["childrenNum"], 0);
    }
}
