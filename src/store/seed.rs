use chrono::Utc;

use crate::models::{ConfigVar, Game, PortMapping, Protocol};

/// Built-in Game catalog inserted the first time the store starts with an
/// empty `games` table (spec §4.1). Two entries are enough to exercise both
/// protocols the Port Allocator has to handle.
pub fn default_games() -> Vec<Game> {
    let now = Utc::now();

    vec![
        Game {
            id: "minecraft".to_string(),
            name: "minecraft".to_string(),
            image: "itzg/minecraft-server:latest".to_string(),
            min_memory_mb: 1024,
            rec_memory_mb: 2048,
            port_mappings: vec![PortMapping {
                name: "game".to_string(),
                protocol: Protocol::Tcp,
                container_port: 25565,
                host_port: 0,
            }],
            config_vars: vec![
                ConfigVar {
                    name: "EULA".to_string(),
                    display_name: "Accept EULA".to_string(),
                    required: true,
                    default: None,
                    description: "You must accept the Minecraft EULA to run a server."
                        .to_string(),
                },
                ConfigVar {
                    name: "DIFFICULTY".to_string(),
                    display_name: "Difficulty".to_string(),
                    required: false,
                    default: Some("normal".to_string()),
                    description: "Game difficulty (peaceful, easy, normal, hard).".to_string(),
                },
            ],
            created_at: now,
            updated_at: now,
        },
        Game {
            id: "valheim".to_string(),
            name: "valheim".to_string(),
            image: "lloesche/valheim-server:latest".to_string(),
            min_memory_mb: 2048,
            rec_memory_mb: 4096,
            port_mappings: vec![PortMapping {
                name: "game".to_string(),
                protocol: Protocol::Udp,
                container_port: 2456,
                host_port: 0,
            }],
            config_vars: vec![ConfigVar {
                name: "SERVER_PASS".to_string(),
                display_name: "Server Password".to_string(),
                required: true,
                default: None,
                description: "Password required to join the server.".to_string(),
            }],
            created_at: now,
            updated_at: now,
        },
    ]
}
