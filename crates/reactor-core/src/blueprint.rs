//! C4: pure function from `ResolvedConfig` + runtime toggles to a
//! `ContainerSpec`. Contains no I/O; this is the primary unit-test target.

use std::collections::HashMap;

use crate::config::{self, PortMapping, ResolvedConfig};
use crate::engine::{ContainerSpec, Mount, PortBinding};
use crate::identity::container_name;

pub const DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Runtime toggles that alter blueprint construction without touching the
/// resolved spec itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions<'a> {
    pub discovery_mode: bool,
    pub host_engine_integration: bool,
    pub extra_ports: &'a [PortMapping],
    pub isolation: Option<&'a str>,
}

/// Additional labels a caller (the workspace orchestrator) wants merged in.
pub type ExtraLabels = HashMap<String, String>;

/// Build a `ContainerSpec` for a single-service container.
pub fn build_blueprint(
    cfg: &ResolvedConfig,
    opts: BuildOptions<'_>,
    extra_labels: ExtraLabels,
) -> ContainerSpec {
    let name = container_name(
        &cfg.account,
        &cfg.project_root,
        &cfg.project_hash,
        opts.isolation,
    );

    build_blueprint_with_name(cfg, opts, extra_labels, name)
}

/// Build a `ContainerSpec` with a caller-supplied name, used by the
/// workspace orchestrator which derives names via its own scheme
/// (`reactor-ws-<service>-<hash>`) instead of the single-service one.
pub fn build_blueprint_with_name(
    cfg: &ResolvedConfig,
    opts: BuildOptions<'_>,
    extra_labels: ExtraLabels,
    name: String,
) -> ContainerSpec {
    let image = cfg
        .spec
        .image
        .clone()
        .unwrap_or_else(|| cfg.provider.default_image().to_string());

    let mounts = if opts.discovery_mode {
        Vec::new()
    } else {
        let mut mounts = vec![Mount::rw(
            cfg.project_root.to_string_lossy().to_string(),
            "/workspace".to_string(),
        )];

        if let Ok(state_dir) = cfg.project_state_dir() {
            for pm in cfg.provider.mount_list() {
                mounts.push(Mount::rw(
                    state_dir.join(&pm.source).to_string_lossy().to_string(),
                    pm.target,
                ));
            }
        }

        if opts.host_engine_integration {
            mounts.push(Mount::rw(DOCKER_SOCKET.to_string(), DOCKER_SOCKET.to_string()));
        }

        mounts
    };

    let merged_ports = config::merge_ports(&cfg.forward_ports, opts.extra_ports);
    let port_bindings: Vec<PortBinding> = merged_ports
        .into_iter()
        .map(|p| PortBinding {
            host: p.host,
            container: p.container,
        })
        .collect();

    let mut labels: HashMap<String, String> = HashMap::new();
    labels.insert("com.reactor.project.hash".to_string(), cfg.project_hash.clone());
    labels.insert("com.reactor.account".to_string(), cfg.account.clone());
    labels.extend(extra_labels);

    let mut environment = vec![
        format!("PROJECT_HASH={}", cfg.project_hash),
        format!("ACCOUNT={}", cfg.account),
    ];
    environment.sort();

    ContainerSpec {
        name,
        image,
        command: vec!["sleep".to_string(), "infinity".to_string()],
        work_dir: "/workspace".to_string(),
        user: cfg.spec.remote_user.clone(),
        environment,
        mounts,
        port_bindings,
        labels,
        network_mode: "bridge".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectSpec;
    use crate::provider::Provider;
    use std::path::PathBuf;

    fn test_config() -> ResolvedConfig {
        ResolvedConfig {
            spec: ProjectSpec::default(),
            project_root: PathBuf::from("/tmp/my-api"),
            project_hash: "a3b8c2d1".to_string(),
            account: "cam".to_string(),
            forward_ports: vec![],
            provider: Provider::Claude,
        }
    }

    #[test]
    fn discovery_mode_has_empty_mounts() {
        let cfg = test_config();
        let opts = BuildOptions {
            discovery_mode: true,
            ..Default::default()
        };
        let spec = build_blueprint(&cfg, opts, HashMap::new());
        assert!(spec.mounts.is_empty());
    }

    #[test]
    fn normal_mode_mounts_workspace_and_provider_state() {
        let cfg = test_config();
        let spec = build_blueprint(&cfg, BuildOptions::default(), HashMap::new());
        assert_eq!(spec.mounts.len(), 2);
        assert_eq!(spec.mounts[0].target, "/workspace");
        assert_eq!(spec.mounts[1].target, "/home/claude/.claude");
    }

    #[test]
    fn host_engine_integration_adds_docker_socket_mount() {
        let cfg = test_config();
        let opts = BuildOptions {
            host_engine_integration: true,
            ..Default::default()
        };
        let spec = build_blueprint(&cfg, opts, HashMap::new());
        assert!(spec
            .mounts
            .iter()
            .any(|m| m.target == DOCKER_SOCKET && m.source == DOCKER_SOCKET));
    }

    #[test]
    fn command_is_sleep_infinity() {
        let cfg = test_config();
        let spec = build_blueprint(&cfg, BuildOptions::default(), HashMap::new());
        assert_eq!(spec.command, vec!["sleep", "infinity"]);
    }

    #[test]
    fn name_follows_deterministic_scheme() {
        let cfg = test_config();
        let spec = build_blueprint(&cfg, BuildOptions::default(), HashMap::new());
        assert_eq!(spec.name, "reactor-cam-my-api-a3b8c2d1");
    }

    #[test]
    fn labels_include_identity() {
        let cfg = test_config();
        let spec = build_blueprint(&cfg, BuildOptions::default(), HashMap::new());
        assert_eq!(spec.labels.get("com.reactor.project.hash").unwrap(), "a3b8c2d1");
        assert_eq!(spec.labels.get("com.reactor.account").unwrap(), "cam");
    }

    #[test]
    fn extra_ports_override_spec_ports_on_host_collision() {
        let mut cfg = test_config();
        cfg.forward_ports = vec![PortMapping { host: 8080, container: 8080 }];
        let extra = vec![PortMapping { host: 8080, container: 9090 }];
        let opts = BuildOptions {
            extra_ports: &extra,
            ..Default::default()
        };
        let spec = build_blueprint(&cfg, opts, HashMap::new());
        assert_eq!(spec.port_bindings, vec![PortBinding { host: 8080, container: 9090 }]);
    }
}
