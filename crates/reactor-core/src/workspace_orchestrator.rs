//! C6: the multi-service workspace orchestrator — preflight validation,
//! parallel dispatch, label-based discovery, and aggregated results.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::blueprint::{self, BuildOptions};
use crate::config::{self, PortMapping, ResolvedConfig};
use crate::engine::{BuildEvent, ContainerState, Engine};
use crate::errors::{ReactorError, Result};
use crate::identity::workspace_container_name;
use crate::lifecycle::{self, UpFlags};
use crate::workspace::{self, WorkspaceManifest, WorkspaceService};

pub const INSTANCE_LABEL: &str = "com.reactor.workspace.instance";
pub const SERVICE_LABEL: &str = "com.reactor.workspace.service";

/// Per-service resolved spec plus its selected name.
struct ServiceContext {
    name: String,
    container_name: String,
    cfg: ResolvedConfig,
}

fn resolve_service(
    manifest_dir: &Path,
    name: &str,
    service: &WorkspaceService,
) -> Result<ServiceContext> {
    let service_root = workspace::resolve_service_path(manifest_dir, service)?;
    let spec_path = config::find_spec(&service_root)
        .ok_or_else(|| ReactorError::SpecNotFound(service_root.clone()))?;
    let raw_spec = config::load_spec(&spec_path)?;
    let mut cfg = config::resolve(raw_spec, &service_root)?;

    if let Some(account) = &service.account {
        cfg.account = account.clone();
    }

    let container_name = workspace_container_name(name, &cfg.project_hash);

    Ok(ServiceContext {
        name: name.to_string(),
        container_name,
        cfg,
    })
}

fn select_services<'a>(
    manifest: &'a WorkspaceManifest,
    requested: &[String],
) -> Result<Vec<(&'a String, &'a WorkspaceService)>> {
    if requested.is_empty() {
        return Ok(manifest.services.iter().collect());
    }

    requested
        .iter()
        .map(|name| {
            manifest
                .services
                .get_key_value(name)
                .ok_or_else(|| ReactorError::UnknownService(name.clone()))
        })
        .collect()
}

/// C6.2: `validate` — resolve every service's spec; success iff all do.
#[instrument(skip(manifest))]
pub fn validate(manifest_dir: &Path, manifest: &WorkspaceManifest) -> Vec<(String, Result<()>)> {
    manifest
        .services
        .iter()
        .map(|(name, service)| {
            let result = resolve_service(manifest_dir, name, service).map(|_| ());
            (name.clone(), result)
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct ServiceStatus {
    pub service: String,
    pub path: String,
    pub account: String,
    pub state: ContainerState,
}

/// C6.3: `list` — expected container name + observed engine state, per
/// service.
#[instrument(skip(engine, manifest, cancel))]
pub async fn list<E: Engine>(
    engine: &E,
    manifest_dir: &Path,
    manifest: &WorkspaceManifest,
    cancel: &CancellationToken,
) -> Result<Vec<ServiceStatus>> {
    let mut out = Vec::new();
    for (name, service) in &manifest.services {
        let ctx = resolve_service(manifest_dir, name, service)?;
        let containers = engine.list(None, cancel).await?;
        let state = containers
            .iter()
            .find(|c| c.name == ctx.container_name)
            .map(|c| c.state)
            .unwrap_or(ContainerState::NotFound);

        out.push(ServiceStatus {
            service: name.clone(),
            path: service.path.clone(),
            account: ctx.cfg.account.clone(),
            state,
        });
    }
    Ok(out)
}

#[derive(Debug, Clone)]
pub struct UpResult {
    pub service: String,
    pub outcome: std::result::Result<(), String>,
}

/// C6.4: `up [services...]`.
#[instrument(skip(engine, manifest, extra_ports, cancel))]
pub async fn up<E: Engine + Clone + Send + Sync + 'static>(
    engine: E,
    manifest_dir: &Path,
    manifest: &WorkspaceManifest,
    workspace_hash: &str,
    requested: &[String],
    extra_ports: &[PortMapping],
    cancel: &CancellationToken,
) -> Result<Vec<UpResult>> {
    let selected = select_services(manifest, requested)?;

    // Preflight A: reject if any selected service already has a running
    // instance-labeled container.
    let selector = format!("{INSTANCE_LABEL}={workspace_hash}");
    let running = engine.list(Some(&selector), cancel).await?;
    let running_services: HashSet<String> = running
        .iter()
        .filter(|c| c.state == ContainerState::Running)
        .filter_map(|c| c.labels.get(SERVICE_LABEL).cloned())
        .collect();

    let conflicts: Vec<String> = selected
        .iter()
        .filter(|(name, _)| running_services.contains(name.as_str()))
        .map(|(name, _)| (*name).clone())
        .collect();

    if !conflicts.is_empty() {
        return Err(ReactorError::AlreadyRunning(conflicts));
    }

    // Preflight B: resolve every selected service, then check for
    // cross-service host-port collisions.
    let mut contexts = Vec::new();
    for (name, service) in &selected {
        contexts.push(resolve_service(manifest_dir, name, service)?);
    }

    check_port_conflicts(&contexts, extra_ports)?;

    info!(count = contexts.len(), "dispatching workspace up");

    // Shared so every service's output lines are prefixed and interleaved
    // without tearing a line in half, while the final per-service summary
    // still only prints once, after `join_all` returns.
    let stdout_lock = Arc::new(Mutex::new(()));

    let tasks = contexts.into_iter().map(|ctx| {
        let engine = engine.clone();
        let workspace_hash = workspace_hash.to_string();
        let extra_ports = extra_ports.to_vec();
        let cancel = cancel.clone();
        let stdout_lock = stdout_lock.clone();
        async move {
            let service_name = ctx.name.clone();
            let outcome =
                up_one_service(&engine, &ctx, &workspace_hash, &extra_ports, &cancel, &stdout_lock)
                    .await;
            UpResult {
                service: service_name,
                outcome: outcome.map_err(|e| e.to_string()),
            }
        }
    });

    Ok(join_all(tasks).await)
}

/// Print `text` line by line, each prefixed with `service`, holding `lock`
/// for the whole call so concurrent services can't interleave mid-line.
fn print_prefixed(lock: &Mutex<()>, service: &str, text: &str) {
    let _guard = lock.lock().unwrap();
    for line in text.lines() {
        println!("[{service}] {line}");
    }
}

fn check_port_conflicts(contexts: &[ServiceContext], extra_ports: &[PortMapping]) -> Result<()> {
    let cli_ports: HashSet<u16> = extra_ports.iter().map(|p| p.host).collect();
    let mut owners: HashMap<u16, Vec<String>> = HashMap::new();

    for ctx in contexts {
        for port in &ctx.cfg.forward_ports {
            if cli_ports.contains(&port.host) {
                continue;
            }
            owners.entry(port.host).or_default().push(ctx.name.clone());
        }
    }

    for (port, services) in owners {
        if services.len() > 1 {
            return Err(ReactorError::PortConflict { port, services });
        }
    }

    Ok(())
}

async fn up_one_service<E: Engine>(
    engine: &E,
    ctx: &ServiceContext,
    workspace_hash: &str,
    extra_ports: &[PortMapping],
    cancel: &CancellationToken,
    stdout_lock: &Arc<Mutex<()>>,
) -> Result<()> {
    crate::state::ensure_project_state_dirs(&ctx.cfg)?;

    let mut labels = HashMap::new();
    labels.insert(INSTANCE_LABEL.to_string(), workspace_hash.to_string());
    labels.insert(SERVICE_LABEL.to_string(), ctx.name.clone());

    let opts = BuildOptions {
        extra_ports,
        ..Default::default()
    };

    let mut spec = blueprint::build_blueprint_with_name(
        &ctx.cfg,
        opts,
        labels,
        ctx.container_name.clone(),
    );

    let build = ctx.cfg.spec.build.as_ref().map(|b| crate::engine::BuildContext {
        context_dir: ctx.cfg.project_root.join(&b.context),
        dockerfile: b.dockerfile.clone(),
        tag: format!("{}:latest", ctx.container_name),
        no_cache: false,
    });

    let service_name = ctx.name.clone();
    let build_lock = stdout_lock.clone();
    lifecycle::up(
        engine,
        &mut spec,
        build.as_ref(),
        UpFlags::default(),
        move |event| {
            let text = match event {
                BuildEvent::Stream(s) => s.as_str(),
                BuildEvent::Error(s) => s.as_str(),
            };
            print_prefixed(&build_lock, &service_name, text);
        },
        cancel,
    )
    .await?;

    if let Some(raw) = ctx.cfg.spec.post_create_command.clone() {
        let argv = raw.into_argv();
        let info = engine.inspect(&spec.name, cancel).await?;
        let service_name = ctx.name.clone();
        let post_create_lock = stdout_lock.clone();
        lifecycle::run_post_create(engine, &info.id, argv, move |chunk| {
            print_prefixed(&post_create_lock, &service_name, &String::from_utf8_lossy(chunk));
        }, cancel)
        .await?;
    }

    Ok(())
}

/// C6.5: `down [services...]` — find by instance+service label pair, stop
/// running ones, then remove. Per-service failures are reported but do not
/// stop the loop.
#[instrument(skip(engine, manifest, cancel))]
pub async fn down<E: Engine>(
    engine: &E,
    manifest: &WorkspaceManifest,
    workspace_hash: &str,
    requested: &[String],
    cancel: &CancellationToken,
) -> Result<Vec<UpResult>> {
    let selected = select_services(manifest, requested)?;
    let mut results = Vec::new();

    for (name, _) in selected {
        let selector = format!("{INSTANCE_LABEL}={workspace_hash},{SERVICE_LABEL}={name}");
        let outcome = down_one(engine, &selector, cancel).await;
        results.push(UpResult {
            service: name.clone(),
            outcome: outcome.map_err(|e| e.to_string()),
        });
    }

    Ok(results)
}

async fn down_one<E: Engine>(
    engine: &E,
    selector: &str,
    cancel: &CancellationToken,
) -> Result<()> {
    let containers = engine.list(Some(selector), cancel).await?;
    for c in containers {
        if c.state == ContainerState::Running {
            engine
                .stop(&c.id, std::time::Duration::from_secs(10), cancel)
                .await
                .ok();
        }
        engine
            .remove(&c.id, true, cancel)
            .await
            .map_err(|e| ReactorError::RemoveFailed(c.id.clone(), e.to_string()))?;
    }
    Ok(())
}

/// C6.5: `exec <service>` target resolution — find the single running
/// container for the instance+service label pair.
#[instrument(skip(engine, cancel))]
pub async fn resolve_exec_target<E: Engine>(
    engine: &E,
    workspace_hash: &str,
    service: &str,
    cancel: &CancellationToken,
) -> Result<String> {
    let selector = format!("{INSTANCE_LABEL}={workspace_hash},{SERVICE_LABEL}={service}");
    let containers = engine.list(Some(&selector), cancel).await?;
    let running: Vec<_> = containers
        .into_iter()
        .filter(|c| c.state == ContainerState::Running)
        .collect();

    match running.len() {
        0 => Err(ReactorError::NotRunning(service.to_string())),
        1 => Ok(running.into_iter().next().unwrap().id),
        _ => Err(ReactorError::MultipleMatches(service.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectSpec;
    use crate::provider::Provider;
    use std::path::PathBuf;

    fn ctx(name: &str, ports: Vec<PortMapping>) -> ServiceContext {
        ServiceContext {
            name: name.to_string(),
            container_name: workspace_container_name(name, "deadbeef"),
            cfg: ResolvedConfig {
                spec: ProjectSpec::default(),
                project_root: PathBuf::from(format!("/tmp/{name}")),
                project_hash: "deadbeef".to_string(),
                account: "cam".to_string(),
                forward_ports: ports,
                provider: Provider::Claude,
            },
        }
    }

    #[test]
    fn detects_cross_service_port_conflict() {
        let a = ctx("api", vec![PortMapping { host: 8080, container: 8080 }]);
        let b = ctx("web", vec![PortMapping { host: 8080, container: 8080 }]);
        let err = check_port_conflicts(&[a, b], &[]).unwrap_err();
        match err {
            ReactorError::PortConflict { port, services } => {
                assert_eq!(port, 8080);
                assert_eq!(services.len(), 2);
            }
            other => panic!("expected PortConflict, got {other:?}"),
        }
    }

    #[test]
    fn no_conflict_for_distinct_ports() {
        let a = ctx("api", vec![PortMapping { host: 8080, container: 8080 }]);
        let b = ctx("web", vec![PortMapping { host: 3000, container: 3000 }]);
        assert!(check_port_conflicts(&[a, b], &[]).is_ok());
    }

    #[test]
    fn cli_port_override_exempt_from_collision() {
        let a = ctx("api", vec![PortMapping { host: 8080, container: 8080 }]);
        let b = ctx("web", vec![PortMapping { host: 8080, container: 8080 }]);
        let extra = vec![PortMapping { host: 8080, container: 9090 }];
        assert!(check_port_conflicts(&[a, b], &extra).is_ok());
    }
}
