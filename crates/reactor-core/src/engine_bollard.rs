//! Concrete `Engine` implementation backed by the Docker Engine API via
//! `bollard`. Chosen over shelling out to the `docker` CLI because the
//! session subsystem (§4.5.3) needs separately addressable
//! create/start/resize/kill primitives for a single exec session, which a
//! CLI subprocess wrapping `docker exec` cannot expose.

use std::collections::HashMap;
use std::time::Duration;

use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
    ResizeContainerTtyOptions, StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, ResizeExecOptions, StartExecResults};
use bollard::image::BuildImageOptions;
use bollard::models::{HostConfig, PortBinding as BollardPortBinding};
use bollard::Docker;
use futures::stream::{BoxStream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::engine::{
    BuildContext, BuildEvent, ChangeKind, ContainerInfo, ContainerSpec, ContainerState, Engine,
    ExecOptions, ExecStream, FileChange,
};
use crate::engine::bytes_compat::Bytes;
use crate::errors::{ReactorError, Result};

/// Races `fut` against its per-call deadline and against cooperative
/// cancellation (§4.3). Returns the inner bollard result unwrapped so
/// callers keep their existing per-call error mapping; a timeout or a
/// fired token short-circuits before the bollard future ever resolves.
async fn with_deadline<T, Fut>(
    timeout: Duration,
    cancel: &CancellationToken,
    fut: Fut,
) -> Result<std::result::Result<T, bollard::errors::Error>>
where
    Fut: std::future::Future<Output = std::result::Result<T, bollard::errors::Error>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ReactorError::Cancelled),
        res = tokio::time::timeout(timeout, fut) => {
            res.map_err(|_| ReactorError::EngineUnavailable("call timed out".into()))
        }
    }
}

/// Docker-Engine-API-backed adapter. Cheap to clone: `bollard::Docker`
/// wraps a connection pool internally.
#[derive(Clone)]
pub struct BollardEngine {
    docker: Docker,
}

impl BollardEngine {
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| ReactorError::EngineUnavailable(e.to_string()))?;
        Ok(BollardEngine { docker })
    }
}

fn map_bollard_err(context: &str) -> impl Fn(bollard::errors::Error) -> ReactorError + '_ {
    move |e| ReactorError::EngineUnavailable(format!("{context}: {e}"))
}

fn state_from_str(s: &str) -> ContainerState {
    match s {
        "running" => ContainerState::Running,
        "" => ContainerState::NotFound,
        _ => ContainerState::Stopped,
    }
}

impl Engine for BollardEngine {
    #[instrument(skip(self, cancel))]
    async fn ping(&self, cancel: &CancellationToken) -> Result<String> {
        let version = with_deadline(crate::engine::PING_TIMEOUT, cancel, self.docker.version())
            .await?
            .map_err(map_bollard_err("ping"))?;
        version
            .version
            .ok_or_else(|| ReactorError::EngineUnavailable("no API version reported".into()))
    }

    #[instrument(skip(self, cancel))]
    async fn list(
        &self,
        label_selector: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ContainerInfo>> {
        let mut filters: HashMap<String, Vec<String>> = HashMap::new();
        if let Some(selector) = label_selector {
            // Each comma-separated `key=value` clause becomes its own entry;
            // Docker's label filter ANDs every entry in the list rather than
            // accepting a single comma-joined constraint.
            let clauses: Vec<String> = selector.split(',').map(|s| s.to_string()).collect();
            filters.insert("label".to_string(), clauses);
        }

        let options = ListContainersOptions::<String> {
            all: true,
            filters,
            ..Default::default()
        };

        let containers = with_deadline(
            crate::engine::CALL_TIMEOUT,
            cancel,
            self.docker.list_containers(Some(options)),
        )
        .await?
        .map_err(map_bollard_err("list"))?;

        Ok(containers
            .into_iter()
            .map(|c| ContainerInfo {
                id: c.id.unwrap_or_default(),
                name: c
                    .names
                    .and_then(|n| n.into_iter().next())
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_default(),
                state: state_from_str(c.state.as_deref().unwrap_or_default()),
                image: c.image.unwrap_or_default(),
                labels: c.labels.unwrap_or_default(),
            })
            .collect())
    }

    #[instrument(skip(self, cancel))]
    async fn inspect(&self, id: &str, cancel: &CancellationToken) -> Result<ContainerInfo> {
        let info = with_deadline(
            crate::engine::CALL_TIMEOUT,
            cancel,
            self.docker.inspect_container(id, None),
        )
        .await?
        .map_err(|e| {
            if matches!(e, bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) {
                ReactorError::NotFound(id.to_string())
            } else {
                ReactorError::EngineUnavailable(e.to_string())
            }
        })?;

        let running = info
            .state
            .as_ref()
            .and_then(|s| s.running)
            .unwrap_or(false);

        Ok(ContainerInfo {
            id: info.id.unwrap_or_else(|| id.to_string()),
            name: info
                .name
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_default(),
            state: if running {
                ContainerState::Running
            } else {
                ContainerState::Stopped
            },
            image: info.config.and_then(|c| c.image).unwrap_or_default(),
            labels: HashMap::new(),
        })
    }

    #[instrument(skip(self, spec, cancel))]
    async fn create(&self, spec: &ContainerSpec, cancel: &CancellationToken) -> Result<String> {
        let binds: Vec<String> = spec
            .mounts
            .iter()
            .map(|m| {
                let mode = match m.mode {
                    crate::engine::MountMode::ReadWrite => "rw",
                    crate::engine::MountMode::ReadOnly => "ro",
                };
                format!("{}:{}:{}", m.source, m.target, mode)
            })
            .collect();

        let mut port_bindings: HashMap<String, Option<Vec<BollardPortBinding>>> = HashMap::new();
        let mut exposed_ports: HashMap<String, HashMap<(), ()>> = HashMap::new();
        for pb in &spec.port_bindings {
            let key = format!("{}/tcp", pb.container);
            port_bindings.insert(
                key.clone(),
                Some(vec![BollardPortBinding {
                    host_ip: None,
                    host_port: Some(pb.host.to_string()),
                }]),
            );
            exposed_ports.insert(key, HashMap::new());
        }

        let host_config = HostConfig {
            binds: Some(binds),
            port_bindings: Some(port_bindings),
            network_mode: Some(spec.network_mode.clone()),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            cmd: Some(spec.command.clone()),
            working_dir: Some(spec.work_dir.clone()),
            user: spec.user.clone(),
            env: Some(spec.environment.clone()),
            labels: Some(spec.labels.clone()),
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let response = with_deadline(
            crate::engine::LONG_CALL_TIMEOUT,
            cancel,
            self.docker.create_container(Some(options), config),
        )
        .await?
        .map_err(|e| ReactorError::CreateFailed(spec.name.clone(), e.to_string()))?;

        Ok(response.id)
    }

    #[instrument(skip(self, cancel))]
    async fn start(&self, id: &str, cancel: &CancellationToken) -> Result<()> {
        with_deadline(
            crate::engine::CALL_TIMEOUT,
            cancel,
            self.docker.start_container::<String>(id, None),
        )
        .await?
        .map_err(|e| ReactorError::StartFailed(id.to_string(), e.to_string()))
    }

    #[instrument(skip(self, cancel))]
    async fn stop(&self, id: &str, grace: Duration, cancel: &CancellationToken) -> Result<()> {
        let options = StopContainerOptions {
            t: grace.as_secs() as i64,
        };
        with_deadline(
            crate::engine::CALL_TIMEOUT,
            cancel,
            self.docker.stop_container(id, Some(options)),
        )
        .await?
        .map_err(|e| ReactorError::EngineUnavailable(format!("stop {id}: {e}")))
    }

    #[instrument(skip(self, cancel))]
    async fn remove(&self, id: &str, force: bool, cancel: &CancellationToken) -> Result<()> {
        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };
        with_deadline(
            crate::engine::LONG_CALL_TIMEOUT,
            cancel,
            self.docker.remove_container(id, Some(options)),
        )
        .await?
        .map_err(|e| ReactorError::RemoveFailed(id.to_string(), e.to_string()))
    }

    #[instrument(skip(self, options, cancel))]
    async fn exec_create(
        &self,
        id: &str,
        options: &ExecOptions,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let create_options = CreateExecOptions {
            cmd: Some(options.cmd.clone()),
            attach_stdin: Some(options.attach_stdin),
            attach_stdout: Some(options.attach_stdout),
            attach_stderr: Some(options.attach_stderr),
            tty: Some(options.tty),
            ..Default::default()
        };

        let result = with_deadline(
            crate::engine::CALL_TIMEOUT,
            cancel,
            self.docker.create_exec(id, create_options),
        )
        .await?
        .map_err(|e| ReactorError::EngineUnavailable(format!("exec_create {id}: {e}")))?;
        Ok(result.id)
    }

    #[instrument(skip(self, cancel))]
    async fn exec_start_attached(
        &self,
        exec_id: &str,
        tty: bool,
        cancel: &CancellationToken,
    ) -> Result<ExecStream> {
        let result = with_deadline(
            crate::engine::CALL_TIMEOUT,
            cancel,
            self.docker.start_exec(
                exec_id,
                Some(bollard::exec::StartExecOptions {
                    detach: false,
                    tty,
                    output_capacity: None,
                }),
            ),
        )
        .await?
        .map_err(|e| ReactorError::EngineUnavailable(format!("exec_start {exec_id}: {e}")))?;

        match result {
            StartExecResults::Attached { input, output } => {
                let mapped: BoxStream<'static, std::io::Result<Bytes>> = output
                    .map(|item| {
                        item.map(|log| Bytes(log.into_bytes().to_vec()))
                            .map_err(|e| std::io::Error::other(e.to_string()))
                    })
                    .boxed();
                Ok(ExecStream {
                    input: Box::new(input),
                    output: mapped,
                })
            }
            StartExecResults::Detached => Err(ReactorError::EngineUnavailable(
                "exec unexpectedly detached".into(),
            )),
        }
    }

    #[instrument(skip(self, cancel))]
    async fn exec_inspect(
        &self,
        exec_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(bool, Option<i64>)> {
        let inspect = with_deadline(
            crate::engine::CALL_TIMEOUT,
            cancel,
            self.docker.inspect_exec(exec_id),
        )
        .await?
        .map_err(|e| ReactorError::EngineUnavailable(format!("exec_inspect {exec_id}: {e}")))?;
        Ok((inspect.running.unwrap_or(false), inspect.exit_code))
    }

    #[instrument(skip(self, cancel))]
    async fn exec_resize(
        &self,
        exec_id: &str,
        rows: u16,
        cols: u16,
        cancel: &CancellationToken,
    ) -> Result<()> {
        with_deadline(
            crate::engine::CALL_TIMEOUT,
            cancel,
            self.docker.resize_exec(
                exec_id,
                ResizeExecOptions {
                    height: rows,
                    width: cols,
                },
            ),
        )
        .await?
        .map_err(|e| ReactorError::EngineUnavailable(format!("exec_resize {exec_id}: {e}")))
    }

    #[instrument(skip(self, cancel))]
    async fn resize(
        &self,
        id: &str,
        rows: u16,
        cols: u16,
        cancel: &CancellationToken,
    ) -> Result<()> {
        with_deadline(
            crate::engine::CALL_TIMEOUT,
            cancel,
            self.docker.resize_container_tty(
                id,
                ResizeContainerTtyOptions {
                    height: rows,
                    width: cols,
                },
            ),
        )
        .await?
        .map_err(|e| ReactorError::EngineUnavailable(format!("resize {id}: {e}")))
    }

    #[instrument(skip(self, cancel))]
    async fn kill(&self, id: &str, signal_name: &str, cancel: &CancellationToken) -> Result<()> {
        let options = bollard::container::KillContainerOptions {
            signal: signal_name.to_string(),
        };
        with_deadline(
            crate::engine::CALL_TIMEOUT,
            cancel,
            self.docker.kill_container(id, Some(options)),
        )
        .await?
        .map_err(|e| ReactorError::EngineUnavailable(format!("kill {id}: {e}")))
    }

    #[instrument(skip(self, cancel))]
    async fn diff(&self, id: &str, cancel: &CancellationToken) -> Result<Vec<FileChange>> {
        let changes = with_deadline(
            crate::engine::CALL_TIMEOUT,
            cancel,
            self.docker.container_changes(id),
        )
        .await?
        .map_err(|e| ReactorError::EngineUnavailable(format!("diff {id}: {e}")))?
        .unwrap_or_default();

        Ok(changes
            .into_iter()
            .map(|c| FileChange {
                kind: match c.kind {
                    bollard::models::FilesystemChangeKindEnum::ADD => ChangeKind::Added,
                    bollard::models::FilesystemChangeKindEnum::MODIFY => ChangeKind::Changed,
                    bollard::models::FilesystemChangeKindEnum::DELETE => ChangeKind::Deleted,
                    _ => ChangeKind::Changed,
                },
                path: c.path,
            })
            .collect())
    }

    #[instrument(skip(self, cancel))]
    async fn image_list(&self, cancel: &CancellationToken) -> Result<Vec<String>> {
        let images = with_deadline(
            crate::engine::CALL_TIMEOUT,
            cancel,
            self.docker.list_images::<String>(None),
        )
        .await?
        .map_err(|e| ReactorError::EngineUnavailable(format!("image_list: {e}")))?;

        Ok(images
            .into_iter()
            .flat_map(|i| i.repo_tags)
            .collect())
    }

    #[instrument(skip(self, build, cancel))]
    async fn image_build(
        &self,
        build: &BuildContext,
        cancel: &CancellationToken,
    ) -> Result<BoxStream<'static, Result<BuildEvent>>> {
        let tar_bytes = pack_context(&build.context_dir)?;

        let options = BuildImageOptions {
            dockerfile: build.dockerfile.clone(),
            t: build.tag.clone(),
            nocache: build.no_cache,
            rm: true,
            ..Default::default()
        };

        let stream = self
            .docker
            .build_image(options, None, Some(tar_bytes.into()));

        let mut mapped: BoxStream<'static, Result<BuildEvent>> = stream
            .map(|item| match item {
                Ok(info) => {
                    if let Some(err) = info.error {
                        Ok(BuildEvent::Error(err))
                    } else if let Some(s) = info.stream {
                        Ok(BuildEvent::Stream(s))
                    } else {
                        Ok(BuildEvent::Stream(String::new()))
                    }
                }
                Err(e) => Err(ReactorError::BuildFailed(build.tag.clone(), e.to_string())),
            })
            .boxed();

        // Only the daemon's first response (build-initiation) is deadlined;
        // once the build is underway its own duration is unbounded.
        let first = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ReactorError::Cancelled),
            res = tokio::time::timeout(crate::engine::LONG_CALL_TIMEOUT, mapped.next()) => {
                res.map_err(|_| ReactorError::EngineUnavailable("build initiation timed out".into()))?
            }
        };

        let rebuilt: BoxStream<'static, Result<BuildEvent>> = match first {
            Some(event) => futures::stream::once(async move { event }).chain(mapped).boxed(),
            None => futures::stream::empty().boxed(),
        };

        Ok(rebuilt)
    }
}

/// Pack a build context directory into an in-memory tar archive with
/// forward-slash paths, per §4.5.2.
fn pack_context(context_dir: &std::path::Path) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    {
        let mut builder = tar::Builder::new(&mut buf);
        builder
            .append_dir_all(".", context_dir)
            .map_err(ReactorError::Io)?;
        builder.finish().map_err(ReactorError::Io)?;
    }
    Ok(buf)
}
