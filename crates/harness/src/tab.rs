use std::rc::Rc;

use serde_json::Value;
use tabsync_core::{AuthGuard, Project, ProjectId, SessionContext, VersionStamp};
use tabsync_engine::{Engine, EngineConfig, EngineError, SignalChannel};
use tabsync_storage::KeyValueStore;

use crate::{FakeServer, ManualClock};

pub type TabEngine = Engine<Box<dyn KeyValueStore>, Rc<FakeServer>>;

/// One execution context: an engine on its own store handle, talking to the
/// shared fake server.
pub struct TestTab {
    pub engine: TabEngine,
    pub auth: AuthGuard,
}

impl TestTab {
    pub fn new(
        scope: &str,
        store: Box<dyn KeyValueStore>,
        server: Rc<FakeServer>,
        channel: SignalChannel,
        clock: ManualClock,
    ) -> Result<Self, EngineError> {
        let auth = AuthGuard::new();
        let engine = Engine::new(
            EngineConfig::default(),
            SessionContext::with_auth(scope, auth.clone()),
            store,
            server,
            channel,
            Box::new(clock),
        )?;
        Ok(Self { engine, auth })
    }

    pub fn project(&self, id: &str) -> Option<Project> {
        self.engine.get_project(&ProjectId::from(id))
    }

    pub fn project_name(&self, id: &str) -> Option<String> {
        self.project(id).map(|p| p.name)
    }

    /// Business field of one item, as currently stored locally.
    pub fn item_field(&self, project_id: &str, item_id: &str, field: &str) -> Option<Value> {
        self.project(project_id)?
            .item(item_id)?
            .field(field)
            .cloned()
    }

    /// Read-modify-write of a local project through `update_project`.
    pub fn edit(
        &mut self,
        id: &str,
        change: impl FnOnce(&mut Project),
    ) -> Result<VersionStamp, EngineError> {
        let project_id = ProjectId::from(id);
        let mut project = self
            .engine
            .get_project(&project_id)
            .ok_or(EngineError::ProjectNotFound(project_id))?;
        change(&mut project);
        self.engine.update_project(project)
    }

    pub fn rename(&mut self, id: &str, name: &str) -> Result<VersionStamp, EngineError> {
        self.edit(id, |p| p.name = name.to_string())
    }

    pub fn set_item_field(
        &mut self,
        project_id: &str,
        item_id: &str,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<VersionStamp, EngineError> {
        let value = value.into();
        self.edit(project_id, |p| {
            if let Some(item) = p.item_mut(item_id) {
                item.fields.insert(field.to_string(), value);
            }
        })
    }
}
