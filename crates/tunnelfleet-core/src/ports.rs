// ── Port allocation ──
//
// Finds `count` free TCP ports by scanning upward from a base port.
// A port counts as free when a wildcard listener can bind it; the
// listener is dropped straight away so nothing stays held. Another
// process can still grab the port before the container runtime does,
// so the result is advisory.

use std::net::{Ipv4Addr, TcpListener};

use tracing::debug;

use crate::error::CoreError;

/// Lowest port a fleet instance may use.
pub const MIN_PORT: u16 = 1;

/// Answers whether a local TCP port can be bound right now.
pub trait PortProbe {
    fn is_available(&self, port: u16) -> bool;
}

/// Probes by binding `0.0.0.0:<port>` and releasing it immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProbe;

impl PortProbe for TcpProbe {
    fn is_available(&self, port: u16) -> bool {
        TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).is_ok()
    }
}

/// Allocate `count` free ports starting at `base_port`, probing the real network stack.
pub fn allocate(base_port: u16, count: usize) -> Result<Vec<u16>, CoreError> {
    allocate_with(&TcpProbe, base_port, count)
}

/// Allocate `count` ports using `probe`.
///
/// Candidates are `base_port, base_port + 1, ...` up to 65535. Busy ports
/// are skipped. Ports come back in discovery order, which is ascending but
/// not necessarily contiguous.
pub fn allocate_with<P>(probe: &P, base_port: u16, count: usize) -> Result<Vec<u16>, CoreError>
where
    P: PortProbe + ?Sized,
{
    let mut found = Vec::with_capacity(count);
    if count == 0 {
        return Ok(found);
    }

    for port in base_port.max(MIN_PORT)..=u16::MAX {
        if probe.is_available(port) {
            debug!(port, "port available");
            found.push(port);
            if found.len() == count {
                return Ok(found);
            }
        } else {
            debug!(port, "port in use, skipping");
        }
    }

    Err(CoreError::PortExhaustion {
        requested: count,
        base_port,
        found,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    /// Every port is free except the listed ones.
    struct Occupied(HashSet<u16>);

    impl Occupied {
        fn new(ports: &[u16]) -> Self {
            Self(ports.iter().copied().collect())
        }
    }

    impl PortProbe for Occupied {
        fn is_available(&self, port: u16) -> bool {
            !self.0.contains(&port)
        }
    }

    #[test]
    fn skips_occupied_ports() {
        let probe = Occupied::new(&[9000, 9002]);
        let ports = allocate_with(&probe, 9000, 3).unwrap();
        assert_eq!(ports, vec![9001, 9003, 9004]);
    }

    #[test]
    fn contiguous_when_nothing_is_busy() {
        let probe = Occupied::new(&[]);
        let ports = allocate_with(&probe, 20000, 4).unwrap();
        assert_eq!(ports, vec![20000, 20001, 20002, 20003]);
    }

    #[test]
    fn zero_count_probes_nothing() {
        struct Panics;
        impl PortProbe for Panics {
            fn is_available(&self, _: u16) -> bool {
                panic!("probe should not run");
            }
        }
        assert!(allocate_with(&Panics, 8000, 0).unwrap().is_empty());
    }

    #[test]
    fn port_zero_is_never_a_candidate() {
        let probe = Occupied::new(&[]);
        assert_eq!(allocate_with(&probe, 0, 2).unwrap(), vec![1, 2]);
    }

    #[test]
    fn exhaustion_reports_partial_result() {
        let probe = Occupied::new(&[65533]);
        let err = allocate_with(&probe, 65532, 4).unwrap_err();
        match err {
            CoreError::PortExhaustion {
                requested,
                base_port,
                found,
            } => {
                assert_eq!(requested, 4);
                assert_eq!(base_port, 65532);
                assert_eq!(found, vec![65532, 65534, 65535]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn real_probe_skips_a_held_port() {
        let held = TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0)).unwrap();
        let held_port = held.local_addr().unwrap().port();

        let ports = allocate(held_port, 2).unwrap();
        assert_eq!(ports.len(), 2);
        assert!(!ports.contains(&held_port));
        assert!(ports.iter().all(|&p| p > held_port));
        assert_ne!(ports[0], ports[1]);

        // Allocation must not leave the port bound.
        drop(TcpListener::bind((Ipv4Addr::UNSPECIFIED, ports[0])).unwrap());
    }
}
