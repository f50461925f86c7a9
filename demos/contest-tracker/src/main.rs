//! Follows one contest live: looks it up by friendly id, prints its game
//! history, then tails the contest chat room and session events.
//!
//! Usage:
//!
//! ```text
//! contest-tracker <resources.json> <contest-friendly-id>
//! ```
//!
//! `resources.json` is the bootstrap bundle:
//!
//! ```json
//! { "version": "0.10.113.w", "server_list": ["gateway.example.com"], "schema": { ... } }
//! ```

use majrpc::{Api, ApiResources, ClientEvent};
use serde_json::Value;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(resources_path), Some(friendly_id)) = (args.next(), args.next())
    else {
        eprintln!("usage: contest-tracker <resources.json> <contest-friendly-id>");
        std::process::exit(2);
    };
    let friendly_id: u64 = friendly_id.parse()?;

    let bundle: Value =
        serde_json::from_str(&tokio::fs::read_to_string(&resources_path).await?)?;
    let resources = ApiResources {
        version: bundle["version"]
            .as_str()
            .ok_or("resources: missing version")?
            .to_string(),
        server_list: bundle["server_list"]
            .as_array()
            .ok_or("resources: missing server_list")?
            .iter()
            .filter_map(|s| s.as_str().map(str::to_string))
            .collect(),
        schema: bundle["schema"].clone(),
    };

    let api = Api::new(resources)?;
    api.init().await?;

    let Some(contest) = api.find_contest(friendly_id).await? else {
        eprintln!("no contest with friendly id {friendly_id}");
        std::process::exit(1);
    };
    println!("contest: {} (id {})", contest.name, contest.unique_id);

    let games = api.contest_game_ids(contest.unique_id).await?;
    println!("{} finished games", games.len());
    for uuid in &games {
        println!("  {uuid}");
    }

    let mut room = api.subscribe_to_room(contest.unique_id).await?;
    let mut events = api.errors();
    println!("watching room {} (ctrl-c to quit)", contest.unique_id);

    loop {
        tokio::select! {
            n = room.recv() => match n {
                Some(n) => println!("[{}] {}", n.name, n.data),
                None => break,
            },
            ev = events.recv() => match ev {
                Ok(ClientEvent::HeartbeatFailed { detail }) => {
                    tracing::warn!(%detail, "heartbeat failed");
                }
                Ok(ClientEvent::Connection(ev)) => {
                    tracing::info!(?ev, "connection event");
                }
                Err(_) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    api.close().await;
    Ok(())
}
