// ── Host address discovery ──
//
// The access list advertises the address clients should dial. We want
// the address of the interface that routes outward, not loopback.
// Connecting a UDP socket sends no packets; it only asks the kernel
// which local address it would route from, so it never waits on the
// network. The hostname fallback goes through the system resolver, which
// can block; it runs on a helper thread and is abandoned after
// `PROBE_TIMEOUT`.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

/// Longest the hostname lookup may take before it is abandoned.
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Well-known public address used only as a routing target.
const ROUTE_TARGET: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)), 80);

/// Resolve the host's outbound address once per run.
///
/// Falls back to resolving the local hostname, then to loopback.
pub fn resolve_host_ip() -> IpAddr {
    match outbound_ip() {
        Ok(ip) => {
            debug!(%ip, "resolved outbound address");
            return ip;
        }
        Err(e) => debug!(error = %e, "outbound address probe failed"),
    }

    if let Some(ip) = hostname_ip() {
        debug!(%ip, "resolved address from hostname");
        return ip;
    }

    warn!("could not determine a routable host address, using loopback");
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn outbound_ip() -> io::Result<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.connect(ROUTE_TARGET)?;

    let ip = socket.local_addr()?.ip();
    if ip.is_unspecified() || ip.is_loopback() {
        return Err(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("probe returned non-routable address {ip}"),
        ));
    }
    Ok(ip)
}

fn hostname_ip() -> Option<IpAddr> {
    let name = hostname::get().ok()?.into_string().ok()?;
    within(PROBE_TIMEOUT, move || {
        (name.as_str(), 0)
            .to_socket_addrs()
            .ok()?
            .map(|addr| addr.ip())
            .find(|ip| !ip.is_loopback() && !ip.is_unspecified())
    })
}

/// Run `lookup` on a helper thread and give up after `timeout`.
///
/// A lookup that overruns keeps its thread until the resolver returns;
/// its result is discarded.
fn within<T, F>(timeout: Duration, lookup: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce() -> Option<T> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(lookup());
    });
    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(_) => {
            debug!(?timeout, "hostname lookup timed out");
            None
        }
    }
}
