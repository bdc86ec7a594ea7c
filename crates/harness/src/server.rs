use std::cell::RefCell;
use std::collections::HashMap;

use serde_json::{Value, json};
use tabsync_core::{LockStatus, Project, ProjectId, clock::ms_to_rfc3339};
use tabsync_engine::remote::{
    LOCK_STATUS_PATH, PROJECTS_BULK_PATH, PROJECTS_PATH, PROJECTS_RESET_PATH, encode_query_value,
};
use tabsync_engine::{Method, Request, Response, Transport, TransportError};

/// Server versions are issued one second apart from this instant.
const VERSION_EPOCH_MS: u64 = 1_771_243_200_000; // 2026-02-16T12:00:00Z

#[derive(Default)]
struct ServerState {
    projects: Vec<Project>,
    seed: Vec<Project>,
    locks: HashMap<String, LockStatus>,
    requests: Vec<Request>,
    offline: bool,
    reject_session: bool,
    issued_versions: u64,
}

impl ServerState {
    fn next_version(&mut self) -> String {
        self.issued_versions += 1;
        ms_to_rfc3339(VERSION_EPOCH_MS + self.issued_versions * 1_000)
    }
}

/// In-process stand-in for the remote project service, speaking the same
/// paths and bodies the engine's client expects.
#[derive(Default)]
pub struct FakeServer {
    state: RefCell<ServerState>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Server holding `projects` as its canonical collection. A reset restores it.
    pub fn with_projects(projects: Vec<Project>) -> Self {
        let server = Self::new();
        {
            let mut state = server.state.borrow_mut();
            state.seed = projects.clone();
            state.projects = projects;
        }
        server
    }

    /// Overwrite the canonical collection, as if another client had written it.
    pub fn set_projects(&self, projects: Vec<Project>) {
        self.state.borrow_mut().projects = projects;
    }

    pub fn projects(&self) -> Vec<Project> {
        self.state.borrow().projects.clone()
    }

    pub fn project(&self, id: &str) -> Option<Project> {
        self.state
            .borrow()
            .projects
            .iter()
            .find(|p| p.id.as_str() == id)
            .cloned()
    }

    pub fn set_lock(&self, resource_key: &str, status: LockStatus) {
        self.state
            .borrow_mut()
            .locks
            .insert(resource_key.to_string(), status);
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.borrow_mut().offline = offline;
    }

    pub fn set_reject_session(&self, reject: bool) {
        self.state.borrow_mut().reject_session = reject;
    }

    pub fn requests(&self) -> Vec<Request> {
        self.state.borrow().requests.clone()
    }

    pub fn request_count(&self, method: Method, path: &str) -> usize {
        self.state
            .borrow()
            .requests
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    fn handle_bulk(state: &mut ServerState, body: &Value) -> Response {
        let Some(entries) = body.get("projects").and_then(Value::as_array) else {
            return Response::new(400, json!({ "error": "projects required" }));
        };

        // All-or-nothing: validate every entry before applying any.
        let mut accepted = Vec::new();
        for entry in entries {
            let project: Project = match serde_json::from_value(entry.clone()) {
                Ok(p) => p,
                Err(e) => return Response::new(400, json!({ "error": e.to_string() })),
            };
            let base = entry.get("base_version").and_then(Value::as_str);
            if let Some(current) = state.projects.iter().find(|p| p.id == project.id) {
                let current_version = current.server_version();
                if base != current_version {
                    return Response::new(
                        409,
                        json!({
                            "code": "version_conflict",
                            "project_id": current.id,
                            "project": current,
                            "server_version": current_version,
                        }),
                    );
                }
            }
            accepted.push(project);
        }

        let mut confirmed = Vec::with_capacity(accepted.len());
        for mut project in accepted {
            project.fields.remove("base_version");
            let version = state.next_version();
            project.updated_at = Some(version.clone());
            project.server_updated_at = Some(version);
            match state.projects.iter_mut().find(|p| p.id == project.id) {
                Some(slot) => *slot = project.clone(),
                None => state.projects.push(project.clone()),
            }
            confirmed.push(project);
        }

        if let Some(deleted) = body.get("deleted").and_then(Value::as_array) {
            let ids: Vec<ProjectId> = deleted
                .iter()
                .filter_map(|v| v.as_str().map(ProjectId::from))
                .collect();
            state.projects.retain(|p| !ids.contains(&p.id));
        }

        Response::new(200, json!({ "ok": true, "projects": confirmed }))
    }
}

impl Transport for FakeServer {
    fn send(&self, request: &Request) -> Result<Response, TransportError> {
        let mut state = self.state.borrow_mut();
        state.requests.push(request.clone());

        if state.offline {
            return Err(TransportError("connection refused".into()));
        }
        if state.reject_session {
            return Ok(Response::new(401, json!({ "error": "authentication required" })));
        }

        let lock_prefix = format!("{LOCK_STATUS_PATH}?resource_key=");
        let response = match (request.method, request.path.as_str()) {
            (Method::Get, PROJECTS_PATH) => {
                Response::new(200, json!({ "projects": state.projects }))
            }
            (Method::Post, PROJECTS_BULK_PATH) => {
                let body = request.body.clone().unwrap_or(Value::Null);
                Self::handle_bulk(&mut state, &body)
            }
            (Method::Post, PROJECTS_RESET_PATH) => {
                state.projects = state.seed.clone();
                Response::new(200, json!({ "ok": true }))
            }
            (Method::Get, path) if path.starts_with(&lock_prefix) => {
                let encoded = &path[lock_prefix.len()..];
                let status = state
                    .locks
                    .iter()
                    .find(|(key, _)| encode_query_value(key) == encoded)
                    .map(|(_, status)| status.clone())
                    .unwrap_or(LockStatus {
                        locked: false,
                        is_owner: false,
                        owner: None,
                        expires_at: None,
                    });
                let mut body = serde_json::to_value(status).unwrap_or(Value::Null);
                if let Value::Object(map) = &mut body {
                    map.insert("ok".into(), Value::Bool(true));
                }
                Response::new(200, body)
            }
            _ => Response::new(404, json!({ "error": "not found" })),
        };
        Ok(response)
    }
}
