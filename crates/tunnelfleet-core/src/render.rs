// ── Descriptor rendering ──
//
// Turns provisioned instances into the artifacts the container runtime
// and clients consume:
//
// - `docker-compose.yml` with a tunnel unit + forwarding proxy per instance
//   and one bridge network per instance
// - `proxies.txt`, one `user:pass@ip:port` line per instance
// - `data/tinyproxy<i>/tinyproxy.conf`, the proxy config each instance mounts
//
// Rendering is pure. `Artifacts::write` serializes everything up front and
// only then touches disk.

use std::fmt::Write as _;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::catalog::EndpointId;
use crate::config::{FleetSettings, TunnelSettings};
use crate::error::CoreError;
use crate::persist::StagedWrite;
use crate::select::join_ids;

pub const DESCRIPTOR_FILE: &str = "docker-compose.yml";
pub const ACCESS_LIST_FILE: &str = "proxies.txt";
pub const PROXY_CONFIG_DIR: &str = "data";
pub const PROXY_CONFIG_FILE: &str = "tinyproxy.conf";

/// Environment variable carrying the endpoint list on tunnel units.
pub const ENDPOINT_VAR: &str = "COUNTRY";

/// Port the proxy listens on inside its namespace.
pub const PROXY_CONTAINER_PORT: u16 = 8888;

const PROXY_CONFIG_MOUNT: &str = "/etc/tinyproxy/tinyproxy.conf";
const PROXY_LOG_FILE: &str = "/var/log/tinyproxy/tinyproxy.log";
const RESTART_POLICY: &str = "unless-stopped";

// ── Inputs ──────────────────────────────────────────────────────────

/// One provisioned tunnel + proxy pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instance {
    /// 1-based ordinal.
    pub index: usize,
    pub port: u16,
    pub endpoints: Vec<EndpointId>,
}

/// Fleet-wide values shared by every instance of a run.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub tunnel: &'a TunnelSettings,
    pub fleet: &'a FleetSettings,
    /// Address advertised in the access list.
    pub host_ip: IpAddr,
}

pub fn tunnel_service_name(index: usize) -> String {
    format!("vpn{index}")
}

pub fn proxy_service_name(index: usize) -> String {
    format!("tinyproxy{index}")
}

pub fn network_name(index: usize) -> String {
    format!("vpn_net_{index}")
}

// ── Descriptor model ────────────────────────────────────────────────

/// Compose-style multi-service descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeFile {
    pub services: IndexMap<String, Service>,
    #[serde(default)]
    pub networks: IndexMap<String, NetworkDecl>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub image: String,
    pub container_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cap_add: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub environment: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    pub restart: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDecl {
    pub driver: String,
}

impl Default for NetworkDecl {
    fn default() -> Self {
        Self {
            driver: "bridge".into(),
        }
    }
}

// ── Outputs ─────────────────────────────────────────────────────────

/// One access-list row.
#[derive(Debug, Clone)]
pub struct AccessEntry {
    pub index: usize,
    pub username: String,
    pub password: SecretString,
    pub host: IpAddr,
    pub port: u16,
}

impl AccessEntry {
    /// `user:pass@ip:port`. IPv6 hosts are bracketed.
    pub fn to_line(&self) -> String {
        let host = match self.host {
            IpAddr::V4(v4) => v4.to_string(),
            IpAddr::V6(v6) => format!("[{v6}]"),
        };
        format!(
            "{}:{}@{host}:{}",
            self.username,
            self.password.expose_secret(),
            self.port
        )
    }
}

/// Proxy configuration file for one instance, relative to the output directory.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub index: usize,
    pub relative_path: PathBuf,
    pub contents: String,
}

/// Everything one run produces.
#[derive(Debug, Clone)]
pub struct Artifacts {
    pub descriptor: ComposeFile,
    pub access: Vec<AccessEntry>,
    pub proxy_configs: Vec<ProxyConfig>,
}

/// Paths written by [`Artifacts::write`].
#[derive(Debug, Clone, Serialize)]
pub struct WrittenArtifacts {
    pub descriptor: PathBuf,
    pub access_list: PathBuf,
    pub proxy_configs: Vec<PathBuf>,
}

impl Artifacts {
    pub fn descriptor_yaml(&self) -> Result<String, CoreError> {
        serde_yaml::to_string(&self.descriptor).map_err(|source| CoreError::Serialization {
            what: "descriptor",
            source,
        })
    }

    /// Newline-separated access lines.
    pub fn access_list(&self) -> String {
        let mut out = String::new();
        for entry in &self.access {
            let _ = writeln!(out, "{}", entry.to_line());
        }
        out
    }

    /// Write every artifact under `out_dir`.
    ///
    /// All files are staged before the first one is renamed into place. A
    /// failure while staging leaves the previous run's files as they were;
    /// only a failed rename can leave a mix.
    pub fn write(&self, out_dir: &Path) -> Result<WrittenArtifacts, CoreError> {
        let descriptor_yaml = self.descriptor_yaml()?;
        let descriptor = StagedWrite::new(&out_dir.join(DESCRIPTOR_FILE), &descriptor_yaml)?;
        let access_list = StagedWrite::new(&out_dir.join(ACCESS_LIST_FILE), &self.access_list())?;
        let proxy_configs = self
            .proxy_configs
            .iter()
            .map(|cfg| StagedWrite::new(&out_dir.join(&cfg.relative_path), &cfg.contents))
            .collect::<Result<Vec<_>, _>>()?;

        let proxy_configs = proxy_configs
            .into_iter()
            .map(StagedWrite::commit)
            .collect::<Result<Vec<_>, _>>()?;
        let descriptor = descriptor.commit()?;
        info!(path = %descriptor.display(), "descriptor written");
        let access_list = access_list.commit()?;
        info!(path = %access_list.display(), "access list written");

        Ok(WrittenArtifacts {
            descriptor,
            access_list,
            proxy_configs,
        })
    }
}

// ── Rendering ───────────────────────────────────────────────────────

/// Render the descriptor, access list, and proxy configs for `instances`.
pub fn render(ctx: &RenderContext<'_>, instances: &[Instance]) -> Artifacts {
    let mut descriptor = ComposeFile::default();
    let mut access = Vec::with_capacity(instances.len());
    let mut proxy_configs = Vec::with_capacity(instances.len());

    for instance in instances {
        let proxy_config = proxy_config(ctx.fleet, instance.index);

        descriptor.services.insert(
            tunnel_service_name(instance.index),
            tunnel_unit(ctx, instance),
        );
        descriptor.services.insert(
            proxy_service_name(instance.index),
            proxy_unit(ctx.fleet, instance.index, &proxy_config.relative_path),
        );
        descriptor
            .networks
            .insert(network_name(instance.index), NetworkDecl::default());

        access.push(AccessEntry {
            index: instance.index,
            username: ctx.fleet.username.clone(),
            password: ctx.fleet.password.clone(),
            host: ctx.host_ip,
            port: instance.port,
        });
        proxy_configs.push(proxy_config);
    }

    Artifacts {
        descriptor,
        access,
        proxy_configs,
    }
}

fn tunnel_unit(ctx: &RenderContext<'_>, instance: &Instance) -> Service {
    let tunnel = ctx.tunnel;

    let mut environment = IndexMap::new();
    environment.insert("USER".to_owned(), tunnel.user.clone());
    environment.insert("PASS".to_owned(), tunnel.secret.expose_secret().to_owned());
    environment.insert(ENDPOINT_VAR.to_owned(), join_ids(&instance.endpoints));
    environment.insert("TECHNOLOGY".to_owned(), tunnel.protocol.to_string());
    if let Some(ref network) = tunnel.network {
        environment.insert("NETWORK".to_owned(), network.clone());
    }

    // Staggered start: each tunnel waits for the previous one.
    let depends_on = if ctx.fleet.stagger && instance.index > 1 {
        vec![tunnel_service_name(instance.index - 1)]
    } else {
        Vec::new()
    };

    Service {
        image: tunnel.image.clone(),
        container_name: tunnel_service_name(instance.index),
        cap_add: vec!["NET_ADMIN".into()],
        devices: vec!["/dev/net/tun".into()],
        environment,
        network_mode: None,
        networks: vec![network_name(instance.index)],
        // The proxy shares this namespace, so the namespace owner publishes its port.
        ports: vec![format!("{}:{PROXY_CONTAINER_PORT}", instance.port)],
        volumes: Vec::new(),
        depends_on,
        restart: RESTART_POLICY.into(),
    }
}

fn proxy_unit(fleet: &FleetSettings, index: usize, config_path: &Path) -> Service {
    let tunnel = tunnel_service_name(index);
    Service {
        image: fleet.proxy_image.clone(),
        container_name: proxy_service_name(index),
        network_mode: Some(format!("service:{tunnel}")),
        volumes: vec![format!(
            "./{}:{PROXY_CONFIG_MOUNT}:ro",
            config_path.display()
        )],
        depends_on: vec![tunnel],
        restart: RESTART_POLICY.into(),
        ..Service::default()
    }
}

fn proxy_config(fleet: &FleetSettings, index: usize) -> ProxyConfig {
    let mut contents = String::new();
    let _ = writeln!(contents, "User nobody");
    let _ = writeln!(contents, "Group nogroup");
    let _ = writeln!(contents, "Port {PROXY_CONTAINER_PORT}");
    let _ = writeln!(contents, "Listen 0.0.0.0");
    let _ = writeln!(contents, "Timeout 600");
    let _ = writeln!(contents, "LogFile \"{PROXY_LOG_FILE}\"");
    let _ = writeln!(contents, "LogLevel Info");
    let _ = writeln!(contents, "MaxClients 100");
    let _ = writeln!(contents, "Allow 0.0.0.0/0");
    let _ = writeln!(
        contents,
        "BasicAuth {} {}",
        fleet.username,
        fleet.password.expose_secret()
    );
    let _ = writeln!(contents, "DisableViaHeader Yes");

    ProxyConfig {
        index,
        relative_path: Path::new(PROXY_CONFIG_DIR)
            .join(proxy_service_name(index))
            .join(PROXY_CONFIG_FILE),
        contents,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;
    use std::net::{Ipv4Addr, Ipv6Addr};

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::VpnProtocol;

    fn settings() -> (TunnelSettings, FleetSettings) {
        let tunnel = TunnelSettings {
            user: "vpnuser".into(),
            secret: SecretString::from("vpnpass"),
            protocol: VpnProtocol::OpenvpnTcp,
            endpoints: IndexMap::new(),
            random: false,
            seed: None,
            image: "azinchen/nordvpn:latest".into(),
            network: Some("192.168.1.0/24".into()),
        };
        let fleet = FleetSettings {
            count: 3,
            base_port: 9000,
            username: "proxy".into(),
            password: SecretString::from("hunter2"),
            max_endpoints_per_instance: 5,
            proxy_image: "vimagick/tinyproxy".into(),
            output_dir: PathBuf::from("out"),
            stagger: true,
        };
        (tunnel, fleet)
    }

    fn instances(ports: &[u16]) -> Vec<Instance> {
        ports
            .iter()
            .enumerate()
            .map(|(i, &port)| Instance {
                index: i + 1,
                port,
                endpoints: vec![EndpointId(81), EndpointId(74)],
            })
            .collect()
    }

    fn host() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7))
    }

    #[test]
    fn one_isolated_network_per_instance() {
        let (tunnel, fleet) = settings();
        let ctx = RenderContext {
            tunnel: &tunnel,
            fleet: &fleet,
            host_ip: host(),
        };
        let artifacts = render(&ctx, &instances(&[9001, 9003, 9004]));
        let compose = &artifacts.descriptor;

        assert_eq!(compose.services.len(), 6);
        assert_eq!(compose.networks.len(), 3);

        let mut seen = HashSet::new();
        for i in 1..=3 {
            let vpn = &compose.services[&tunnel_service_name(i)];
            assert_eq!(vpn.networks, vec![network_name(i)]);
            assert!(seen.insert(vpn.networks[0].clone()), "network shared");

            let proxy = &compose.services[&proxy_service_name(i)];
            assert_eq!(
                proxy.network_mode.as_deref(),
                Some(format!("service:vpn{i}").as_str())
            );
            assert_eq!(proxy.depends_on, vec![tunnel_service_name(i)]);
            assert!(proxy.networks.is_empty());
            assert!(proxy.ports.is_empty());
        }
    }

    #[test]
    fn tunnel_unit_carries_credentials_and_endpoints() {
        let (tunnel, fleet) = settings();
        let ctx = RenderContext {
            tunnel: &tunnel,
            fleet: &fleet,
            host_ip: host(),
        };
        let artifacts = render(&ctx, &instances(&[9001]));
        let vpn = &artifacts.descriptor.services["vpn1"];

        assert_eq!(vpn.cap_add, vec!["NET_ADMIN".to_owned()]);
        assert_eq!(vpn.devices, vec!["/dev/net/tun".to_owned()]);
        assert_eq!(vpn.environment["USER"], "vpnuser");
        assert_eq!(vpn.environment["PASS"], "vpnpass");
        assert_eq!(vpn.environment[ENDPOINT_VAR], "81;74");
        assert_eq!(vpn.environment["TECHNOLOGY"], "openvpn_tcp");
        assert_eq!(vpn.environment["NETWORK"], "192.168.1.0/24");
        assert_eq!(vpn.ports, vec!["9001:8888".to_owned()]);
        assert_eq!(vpn.restart, "unless-stopped");
    }

    #[test]
    fn tunnels_start_staggered() {
        let (tunnel, mut fleet) = settings();
        let ctx = RenderContext {
            tunnel: &tunnel,
            fleet: &fleet,
            host_ip: host(),
        };
        let compose = render(&ctx, &instances(&[1, 2, 3])).descriptor;
        assert!(compose.services["vpn1"].depends_on.is_empty());
        assert_eq!(compose.services["vpn2"].depends_on, vec!["vpn1".to_owned()]);
        assert_eq!(compose.services["vpn3"].depends_on, vec!["vpn2".to_owned()]);

        fleet.stagger = false;
        let ctx = RenderContext {
            tunnel: &tunnel,
            fleet: &fleet,
            host_ip: host(),
        };
        let compose = render(&ctx, &instances(&[1, 2, 3])).descriptor;
        assert!(compose.services["vpn3"].depends_on.is_empty());
    }

    #[test]
    fn access_list_has_one_line_per_instance() {
        let (tunnel, fleet) = settings();
        let ctx = RenderContext {
            tunnel: &tunnel,
            fleet: &fleet,
            host_ip: host(),
        };
        let list = render(&ctx, &instances(&[9001, 9003, 9004])).access_list();
        let lines: Vec<_> = list.lines().collect();
        assert_eq!(lines, vec![
            "proxy:hunter2@203.0.113.7:9001",
            "proxy:hunter2@203.0.113.7:9003",
            "proxy:hunter2@203.0.113.7:9004",
        ]);
    }

    #[test]
    fn ipv6_hosts_are_bracketed() {
        let entry = AccessEntry {
            index: 1,
            username: "u".into(),
            password: SecretString::from("p"),
            host: IpAddr::V6(Ipv6Addr::LOCALHOST),
            port: 8080,
        };
        assert_eq!(entry.to_line(), "u:p@[::1]:8080");
    }

    #[test]
    fn proxy_config_embeds_credentials() {
        let (tunnel, fleet) = settings();
        let ctx = RenderContext {
            tunnel: &tunnel,
            fleet: &fleet,
            host_ip: host(),
        };
        let artifacts = render(&ctx, &instances(&[9001, 9002]));
        let second = &artifacts.proxy_configs[1];
        assert_eq!(
            second.relative_path,
            PathBuf::from("data/tinyproxy2/tinyproxy.conf")
        );
        assert!(second.contents.contains("BasicAuth proxy hunter2\n"));
        assert!(second.contents.contains("Port 8888\n"));
        assert!(second.contents.contains("LogFile \"/var/log/tinyproxy/tinyproxy.log\""));

        let proxy = &artifacts.descriptor.services["tinyproxy2"];
        assert_eq!(proxy.volumes, vec![
            "./data/tinyproxy2/tinyproxy.conf:/etc/tinyproxy/tinyproxy.conf:ro".to_owned()
        ]);
    }

    #[test]
    fn write_produces_parseable_artifacts() {
        let (tunnel, fleet) = settings();
        let ctx = RenderContext {
            tunnel: &tunnel,
            fleet: &fleet,
            host_ip: host(),
        };
        let artifacts = render(&ctx, &instances(&[9001, 9003]));
        let dir = tempfile::tempdir().unwrap();

        let written = artifacts.write(dir.path()).unwrap();

        let yaml = std::fs::read_to_string(&written.descriptor).unwrap();
        let parsed: ComposeFile = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, artifacts.descriptor);

        let list = std::fs::read_to_string(&written.access_list).unwrap();
        assert_eq!(list.lines().count(), 2);

        assert_eq!(written.proxy_configs.len(), 2);
        for path in &written.proxy_configs {
            assert!(path.is_file());
        }
    }

    #[test]
    fn failed_write_keeps_previous_run() {
        let (tunnel, fleet) = settings();
        let ctx = RenderContext {
            tunnel: &tunnel,
            fleet: &fleet,
            host_ip: host(),
        };
        let dir = tempfile::tempdir().unwrap();
        let first = render(&ctx, &instances(&[9001, 9003]))
            .write(dir.path())
            .unwrap();
        let old_descriptor = std::fs::read_to_string(&first.descriptor).unwrap();
        let old_access = std::fs::read_to_string(&first.access_list).unwrap();

        // A plain file where the third proxy's config directory belongs.
        std::fs::write(dir.path().join("data/tinyproxy3"), "blocker").unwrap();
        let err = render(&ctx, &instances(&[9101, 9102, 9103]))
            .write(dir.path())
            .unwrap_err();
        assert!(matches!(err, CoreError::Persistence { .. }));

        assert_eq!(std::fs::read_to_string(&first.descriptor).unwrap(), old_descriptor);
        assert_eq!(std::fs::read_to_string(&first.access_list).unwrap(), old_access);
        let mut names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        assert_eq!(names, vec!["data", DESCRIPTOR_FILE, ACCESS_LIST_FILE]);
    }
}
