//! Host port allocator (spec §4.3). A pure component: given a Gameserver
//! whose port mappings may have `host_port == 0` and a set of host ports
//! already held by other Gameservers, fill in the zero slots and validate
//! the already-assigned ones. No I/O, no network probing — reservation is
//! purely logical, the same "compute the next free slot against an in-hand
//! used set" shape as the teacher's `ServerCluster::poll` game-port
//! assignment in `server_cluster.rs`, generalized from one port per server
//! to an arbitrary list of named, protocol-tagged mappings.

use std::collections::HashSet;

use crate::error::ServiceError;
use crate::models::{Gameserver, Protocol};

/// Ephemeral-safe range the corpus (and this implementation) searches
/// within, per spec §4.3.
const PORT_RANGE_START: u16 = 1024;
const PORT_RANGE_END: u16 = 65535;

/// Fills every unassigned (`host_port == 0`) mapping on `gs` with the
/// lowest free integer `>= container_port`, honoring `used`, the ports
/// already taken in this same server, and the ephemeral-safe range.
/// Already-assigned mappings are validated against `used` and treated as a
/// hard error on collision.
pub fn allocate_ports_for_server(
    gs: &mut Gameserver,
    used: &HashSet<(Protocol, u16)>,
) -> Result<(), ServiceError> {
    let mut reserved_this_server: HashSet<(Protocol, u16)> = HashSet::new();

    for mapping in &mut gs.port_mappings {
        if mapping.host_port != 0 {
            let key = (mapping.protocol, mapping.host_port);
            if used.contains(&key) || reserved_this_server.contains(&key) {
                return Err(ServiceError::Conflict(format!(
                    "host port {}/{} is already in use",
                    mapping.host_port,
                    mapping.protocol.as_str()
                )));
            }
            reserved_this_server.insert(key);
            continue;
        }

        let start = mapping.container_port.max(PORT_RANGE_START);
        let mut candidate = start;
        let found = loop {
            let key = (mapping.protocol, candidate);
            if !used.contains(&key) && !reserved_this_server.contains(&key) {
                break Some(candidate);
            }
            if candidate == PORT_RANGE_END {
                break None;
            }
            candidate += 1;
        };

        match found {
            Some(port) => {
                reserved_this_server.insert((mapping.protocol, port));
                mapping.host_port = port;
            }
            None => {
                return Err(ServiceError::Conflict(format!(
                    "no free host port available for mapping '{}' ({}-{})",
                    mapping.name, PORT_RANGE_START, PORT_RANGE_END
                )));
            }
        }
    }

    Ok(())
}

/// Collects the `(protocol, host_port)` pairs currently held by every
/// Gameserver in `servers`, optionally excluding one id (used when
/// re-allocating for an update so a server doesn't collide with itself).
pub fn collect_used_ports(
    servers: &[Gameserver],
    exclude_id: Option<&str>,
) -> HashSet<(Protocol, u16)> {
    servers
        .iter()
        .filter(|gs| exclude_id != Some(gs.id.as_str()))
        .flat_map(|gs| {
            gs.port_mappings
                .iter()
                .filter(|m| m.host_port != 0)
                .map(|m| (m.protocol, m.host_port))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PortMapping;

    fn gs_with_mapping(container_port: u16, host_port: u16, protocol: Protocol) -> Gameserver {
        let mut gs = Gameserver::new("t".into(), "game".into(), 512, vec![]);
        gs.port_mappings = vec![PortMapping {
            name: "game".into(),
            protocol,
            container_port,
            host_port,
        }];
        gs
    }

    #[test]
    fn assigns_lowest_free_port_at_or_above_container_port() {
        let mut gs = gs_with_mapping(25565, 0, Protocol::Tcp);
        allocate_ports_for_server(&mut gs, &HashSet::new()).unwrap();
        assert_eq!(gs.port_mappings[0].host_port, 25565);
    }

    #[test]
    fn skips_used_ports() {
        let mut gs = gs_with_mapping(25565, 0, Protocol::Tcp);
        let used: HashSet<_> = [(Protocol::Tcp, 25565)].into_iter().collect();
        allocate_ports_for_server(&mut gs, &used).unwrap();
        assert_eq!(gs.port_mappings[0].host_port, 25566);
    }

    #[test]
    fn different_protocol_does_not_collide() {
        let mut gs = gs_with_mapping(25565, 0, Protocol::Udp);
        let used: HashSet<_> = [(Protocol::Tcp, 25565)].into_iter().collect();
        allocate_ports_for_server(&mut gs, &used).unwrap();
        assert_eq!(gs.port_mappings[0].host_port, 25565);
    }

    #[test]
    fn preassigned_collision_is_hard_error() {
        let mut gs = gs_with_mapping(25565, 25565, Protocol::Tcp);
        let used: HashSet<_> = [(Protocol::Tcp, 25565)].into_iter().collect();
        assert!(allocate_ports_for_server(&mut gs, &used).is_err());
    }

    #[test]
    fn two_mappings_in_same_server_do_not_collide_with_each_other() {
        let mut gs = Gameserver::new("t".into(), "game".into(), 512, vec![]);
        gs.port_mappings = vec![
            PortMapping {
                name: "a".into(),
                protocol: Protocol::Tcp,
                container_port: 25565,
                host_port: 0,
            },
            PortMapping {
                name: "b".into(),
                protocol: Protocol::Tcp,
                container_port: 25565,
                host_port: 0,
            },
        ];
        allocate_ports_for_server(&mut gs, &HashSet::new()).unwrap();
        assert_ne!(gs.port_mappings[0].host_port, gs.port_mappings[1].host_port);
    }
}
