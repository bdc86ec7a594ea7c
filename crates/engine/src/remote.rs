//! Client for the remote project service over an abstract request/response
//! transport.
//!
//! The transport only moves JSON bodies and status codes; this module owns the
//! paths, the body shapes and the mapping of statuses onto [`RemoteError`].

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use tabsync_core::{LockStatus, Project, ProjectId};

pub const PROJECTS_PATH: &str = "/api/projects";
pub const PROJECTS_BULK_PATH: &str = "/api/projects/bulk";
pub const PROJECTS_RESET_PATH: &str = "/api/projects/reset";
pub const LOCK_STATUS_PATH: &str = "/api/locks/status";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => f.write_str("GET"),
            Self::Post => f.write_str("POST"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    /// Path plus query string.
    pub path: String,
    pub body: Option<Value>,
}

impl Request {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(body),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    /// Parsed JSON body, `Value::Null` when the body was empty or not JSON.
    pub body: Value,
}

impl Response {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The request could not be completed at all (no status to report).
#[derive(Debug, Clone, Error)]
#[error("transport failure: {0}")]
pub struct TransportError(pub String);

pub trait Transport {
    fn send(&self, request: &Request) -> Result<Response, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Rc<T> {
    fn send(&self, request: &Request) -> Result<Response, TransportError> {
        (**self).send(request)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&self, request: &Request) -> Result<Response, TransportError> {
        (**self).send(request)
    }
}

/// Body of a `409` from the bulk endpoint: the write was refused and the
/// server's canonical copy of the project is returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictBody {
    pub code: String,
    pub project_id: ProjectId,
    #[serde(default)]
    pub project: Option<Project>,
    #[serde(default)]
    pub server_version: Option<String>,
}

impl fmt::Display for ConflictBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on project {}", self.code, self.project_id)
    }
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("session rejected by server")]
    Unauthorized,

    #[error("conflict: {0}")]
    Conflict(Box<ConflictBody>),

    #[error("server responded {status}: {message}")]
    Status { status: u16, message: String },

    #[error("malformed response: {0}")]
    Decode(String),
}

/// One project in a bulk push, carrying the server version it was edited from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkEntry {
    #[serde(flatten)]
    pub project: Project,
    pub base_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkRequest {
    pub projects: Vec<BulkEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deleted: Vec<ProjectId>,
}

impl BulkRequest {
    pub fn is_empty(&self) -> bool {
        self.projects.is_empty() && self.deleted.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct ProjectsResponse {
    projects: Vec<Project>,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    projects: Vec<Project>,
}

#[derive(Debug, Deserialize)]
struct LockStatusResponse {
    #[serde(default = "default_ok")]
    ok: bool,
    #[serde(flatten)]
    status: LockStatus,
}

fn default_ok() -> bool {
    true
}

pub struct RemoteClient<T> {
    transport: T,
}

impl<T: Transport> RemoteClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn call(&self, request: Request) -> Result<Value, RemoteError> {
        log::debug!("{} {}", request.method, request.path);
        let response = self.transport.send(&request)?;
        check_status(response)
    }

    /// `GET projects-collection`: the server's full canonical collection.
    pub fn fetch_projects(&self) -> Result<Vec<Project>, RemoteError> {
        let body = self.call(Request::get(PROJECTS_PATH))?;
        let parsed: ProjectsResponse =
            serde_json::from_value(body).map_err(|e| RemoteError::Decode(e.to_string()))?;
        Ok(parsed.projects)
    }

    /// `POST projects-bulk`. Returns the server's confirmed copies of the
    /// accepted projects; older servers may return none.
    pub fn push_bulk(&self, batch: &BulkRequest) -> Result<Vec<Project>, RemoteError> {
        let body = serde_json::to_value(batch).map_err(|e| RemoteError::Decode(e.to_string()))?;
        let reply = self.call(Request::post(PROJECTS_BULK_PATH, body))?;
        if reply.is_null() {
            return Ok(Vec::new());
        }
        let parsed: BulkResponse =
            serde_json::from_value(reply).map_err(|e| RemoteError::Decode(e.to_string()))?;
        Ok(parsed.projects)
    }

    /// `POST projects-reset`.
    pub fn reset_projects(&self) -> Result<(), RemoteError> {
        self.call(Request::post(PROJECTS_RESET_PATH, Value::Object(Default::default())))?;
        Ok(())
    }

    /// `GET lock-status(resource_key)`.
    pub fn lock_status(&self, resource_key: &str) -> Result<LockStatus, RemoteError> {
        let path = format!("{LOCK_STATUS_PATH}?resource_key={}", encode_query_value(resource_key));
        let body = self.call(Request::get(path))?;
        let parsed: LockStatusResponse =
            serde_json::from_value(body).map_err(|e| RemoteError::Decode(e.to_string()))?;
        if !parsed.ok {
            return Err(RemoteError::Decode("lock status reported ok=false".into()));
        }
        Ok(parsed.status)
    }
}

fn check_status(response: Response) -> Result<Value, RemoteError> {
    if response.is_success() {
        return Ok(response.body);
    }
    match response.status {
        401 => Err(RemoteError::Unauthorized),
        409 => match serde_json::from_value::<ConflictBody>(response.body.clone()) {
            Ok(conflict) => Err(RemoteError::Conflict(Box::new(conflict))),
            Err(_) => Err(RemoteError::Status {
                status: 409,
                message: error_message(&response.body),
            }),
        },
        status => Err(RemoteError::Status {
            status,
            message: error_message(&response.body),
        }),
    }
}

fn error_message(body: &Value) -> String {
    match body.get("error") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None if body.is_null() => String::new(),
        None => body.to_string(),
    }
}

/// Percent-encode a query value, keeping only RFC 3986 unreserved characters.
pub fn encode_query_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
