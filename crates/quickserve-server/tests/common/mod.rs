#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use quickserve_config::{ConfigLoader, QuickServeConfig};
use quickserve_server::{Server, ServerState, Services, ShutdownSignal};

pub const CONFIG: &str = r#"
[[servers]]
name = "api"
port = 8080
database = "main"

[[servers]]
name = "live"
type = "socket"
port = 8081
database = "main"

[[databases]]
name = "main"
type = "in-memory"

[[entities]]
name = "users"

[entities.fields]
email = { type = "string", required = true }
password = { type = "string", required = true, secure = true }

[[entities]]
name = "posts"

[entities.fields]
title = { type = "string", required = true }
author = { type = "reference", entity = "users" }

[auth.strategies.jwt]
secret = "e2e-secret"
expiresIn = "1h"
refreshToken = { enabled = true, expiration = "1d" }
entity = { name = "users", identifiers = ["email", "password"] }

[auth.permissions]
whitelist = ["/users", "create_users"]

[auth.permissions.default]
"*" = { get = true, list = true, search = true }

[auth.permissions.entities.users]
posts = { insert = true, update = true }
"#;

pub fn config() -> QuickServeConfig {
    ConfigLoader::new()
        .with_string(CONFIG, "toml")
        .unwrap()
        .load()
        .unwrap()
}

/// Starts the server named `name` on an ephemeral port.
pub async fn start(name: &str) -> (SocketAddr, ShutdownSignal) {
    let config = config();
    let services = Services::from_config(&config).unwrap();
    let server = config
        .servers
        .iter()
        .find(|server| server.name == name)
        .unwrap()
        .clone();
    let state = Arc::new(ServerState::new(server, &services).unwrap());

    let server = Server::bind_to(state, "127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap();
    let shutdown = ShutdownSignal::new();
    tokio::spawn(server.run(shutdown.clone()));
    (addr, shutdown)
}
