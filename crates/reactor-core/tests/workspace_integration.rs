//! End-to-end workspace scenarios against a mocked engine: happy path,
//! port conflict, and the up-then-down zero-containers invariant.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use reactor_core::engine::{
    BuildContext, BuildEvent, ContainerInfo, ContainerSpec, ContainerState, Engine, ExecOptions,
    ExecStream, FileChange,
};
use reactor_core::errors::Result;
use reactor_core::workspace;
use reactor_core::workspace_orchestrator;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
struct MockEngine {
    containers: std::sync::Arc<Mutex<HashMap<String, ContainerInfo>>>,
}

impl MockEngine {
    fn new() -> Self {
        MockEngine {
            containers: std::sync::Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl Engine for MockEngine {
    async fn ping(&self, _cancel: &CancellationToken) -> Result<String> {
        Ok("1.0".to_string())
    }

    async fn list(
        &self,
        label_selector: Option<&str>,
        _cancel: &CancellationToken,
    ) -> Result<Vec<ContainerInfo>> {
        let containers = self.containers.lock().unwrap();
        let clauses: Vec<(String, String)> = label_selector
            .map(|s| {
                s.split(',')
                    .filter_map(|c| c.split_once('='))
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        Ok(containers
            .values()
            .filter(|c| {
                clauses
                    .iter()
                    .all(|(k, v)| c.labels.get(k).map(|lv| lv == v).unwrap_or(false))
            })
            .cloned()
            .collect())
    }

    async fn inspect(&self, id: &str, _cancel: &CancellationToken) -> Result<ContainerInfo> {
        self.containers
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| reactor_core::ReactorError::NotFound(id.to_string()))
    }

    async fn create(&self, spec: &ContainerSpec, _cancel: &CancellationToken) -> Result<String> {
        let id = format!("id-{}", spec.name);
        self.containers.lock().unwrap().insert(
            id.clone(),
            ContainerInfo {
                id: id.clone(),
                name: spec.name.clone(),
                state: ContainerState::Stopped,
                image: spec.image.clone(),
                labels: spec.labels.clone(),
            },
        );
        Ok(id)
    }

    async fn start(&self, id: &str, _cancel: &CancellationToken) -> Result<()> {
        if let Some(c) = self.containers.lock().unwrap().get_mut(id) {
            c.state = ContainerState::Running;
        }
        Ok(())
    }

    async fn stop(
        &self,
        id: &str,
        _grace: Duration,
        _cancel: &CancellationToken,
    ) -> Result<()> {
        if let Some(c) = self.containers.lock().unwrap().get_mut(id) {
            c.state = ContainerState::Stopped;
        }
        Ok(())
    }

    async fn remove(&self, id: &str, _force: bool, _cancel: &CancellationToken) -> Result<()> {
        self.containers.lock().unwrap().remove(id);
        Ok(())
    }

    async fn exec_create(
        &self,
        _id: &str,
        _options: &ExecOptions,
        _cancel: &CancellationToken,
    ) -> Result<String> {
        unimplemented!("not exercised by workspace up/down scenarios")
    }

    async fn exec_start_attached(
        &self,
        _exec_id: &str,
        _tty: bool,
        _cancel: &CancellationToken,
    ) -> Result<ExecStream> {
        unimplemented!()
    }

    async fn exec_inspect(
        &self,
        _exec_id: &str,
        _cancel: &CancellationToken,
    ) -> Result<(bool, Option<i64>)> {
        unimplemented!()
    }

    async fn exec_resize(
        &self,
        _exec_id: &str,
        _rows: u16,
        _cols: u16,
        _cancel: &CancellationToken,
    ) -> Result<()> {
        unimplemented!()
    }

    async fn resize(
        &self,
        _id: &str,
        _rows: u16,
        _cols: u16,
        _cancel: &CancellationToken,
    ) -> Result<()> {
        unimplemented!()
    }

    async fn kill(
        &self,
        _id: &str,
        _signal_name: &str,
        _cancel: &CancellationToken,
    ) -> Result<()> {
        unimplemented!()
    }

    async fn diff(&self, _id: &str, _cancel: &CancellationToken) -> Result<Vec<FileChange>> {
        Ok(vec![])
    }

    async fn image_list(&self, _cancel: &CancellationToken) -> Result<Vec<String>> {
        Ok(vec![])
    }

    async fn image_build(
        &self,
        _build: &BuildContext,
        _cancel: &CancellationToken,
    ) -> Result<futures::stream::BoxStream<'static, Result<BuildEvent>>> {
        unimplemented!()
    }
}

fn write_service(dir: &Path, name: &str, port: u16) {
    let service_dir = dir.join(name);
    std::fs::create_dir_all(&service_dir).unwrap();
    std::fs::write(
        service_dir.join(".devcontainer.json"),
        format!(r#"{{ "image": "node:18", "forwardPorts": [{port}] }}"#),
    )
    .unwrap();
}

fn write_manifest(dir: &Path, services: &[&str]) -> std::path::PathBuf {
    let mut body = String::from("version: \"1\"\nservices:\n");
    for s in services {
        body.push_str(&format!("  {s}:\n    path: ./{s}\n"));
    }
    let path = dir.join("reactor-workspace.yml");
    std::fs::write(&path, body).unwrap();
    path
}

#[tokio::test]
async fn workspace_up_happy_path_starts_both_services_with_instance_label() {
    let dir = tempfile::tempdir().unwrap();
    write_service(dir.path(), "api", 8080);
    write_service(dir.path(), "web", 3000);
    let manifest_path = write_manifest(dir.path(), &["api", "web"]);

    let (manifest, hash) = workspace::load_manifest(&manifest_path).unwrap();
    let engine = MockEngine::new();

    let results = workspace_orchestrator::up(
        engine.clone(),
        dir.path(),
        &manifest,
        &hash,
        &[],
        &[],
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.outcome.is_ok()));

    let containers = engine.containers.lock().unwrap();
    assert_eq!(containers.len(), 2);
    for c in containers.values() {
        assert_eq!(
            c.labels.get("com.reactor.workspace.instance").unwrap(),
            &hash
        );
        assert_eq!(c.state, ContainerState::Running);
    }
}

#[tokio::test]
async fn workspace_up_port_conflict_creates_no_containers() {
    let dir = tempfile::tempdir().unwrap();
    write_service(dir.path(), "api", 8080);
    write_service(dir.path(), "web", 8080);
    let manifest_path = write_manifest(dir.path(), &["api", "web"]);

    let (manifest, hash) = workspace::load_manifest(&manifest_path).unwrap();
    let engine = MockEngine::new();

    let err = workspace_orchestrator::up(
        engine.clone(),
        dir.path(),
        &manifest,
        &hash,
        &[],
        &[],
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();

    match err {
        reactor_core::ReactorError::PortConflict { port, services } => {
            assert_eq!(port, 8080);
            assert_eq!(services.len(), 2);
        }
        other => panic!("expected PortConflict, got {other:?}"),
    }

    assert!(engine.containers.lock().unwrap().is_empty());
}

#[tokio::test]
async fn workspace_up_then_down_leaves_zero_containers() {
    let dir = tempfile::tempdir().unwrap();
    write_service(dir.path(), "api", 8080);
    let manifest_path = write_manifest(dir.path(), &["api"]);

    let (manifest, hash) = workspace::load_manifest(&manifest_path).unwrap();
    let engine = MockEngine::new();

    workspace_orchestrator::up(
        engine.clone(),
        dir.path(),
        &manifest,
        &hash,
        &[],
        &[],
        &CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(engine.containers.lock().unwrap().len(), 1);

    workspace_orchestrator::down(&engine, &manifest, &hash, &[], &CancellationToken::new())
        .await
        .unwrap();
    assert!(engine.containers.lock().unwrap().is_empty());
}
