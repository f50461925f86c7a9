//! The façade: one long-lived gateway session and its typed operations.

use std::sync::Arc;

use majrpc_client::{
    Caller, ClientEvent, HeartbeatConfig, HeartbeatMonitor, Notification,
    NotificationRouter, RpcClient, ServiceProxy, DEFAULT_CALL_TIMEOUT,
};
use majrpc_protocol::{value_to_bytes, MessageCodec, ProtocolError, ProtocolSchema};
use majrpc_room::{RoomSubscription, SubscriptionManager};
use majrpc_transport::{Connection, ConnectionEvent};
use rand::Rng;
use serde_json::{json, Value};
use tokio::sync::{broadcast, Mutex};

use crate::records::{Contest, GameRecord, GameStep, Player};
use crate::{login, pagination, Account, MajrpcError};

const EVENT_CAPACITY: usize = 32;

/// The bootstrap result: everything the client needs that is fetched over
/// HTTP before the WebSocket session starts.
#[derive(Debug, Clone)]
pub struct ApiResources {
    /// Game version string, e.g. `0.10.113.w`.
    pub version: String,
    /// Gateway hostnames; one is picked at random per session.
    pub server_list: Vec<String>,
    /// The protocol schema document.
    pub schema: Value,
}

/// A session against one gateway.
///
/// Construct with [`new`](Self::new), open with [`init`](Self::init), and
/// use until [`close`](Self::close) or the gateway hangs up. There is no
/// automatic reconnect; a dead session is rebuilt from scratch.
pub struct Api {
    connection: Arc<Connection>,
    codec: MessageCodec,
    rpc: Arc<RpcClient>,
    lobby: ServiceProxy,
    router: NotificationRouter,
    rooms: SubscriptionManager<ServiceProxy>,
    events_tx: broadcast::Sender<ClientEvent>,
    heartbeat: Mutex<Option<HeartbeatMonitor>>,
    version: String,
    client_version: String,
}

impl Api {
    /// Parses the schema, picks a gateway, and wires the session together.
    /// Nothing touches the network until [`init`](Self::init).
    pub fn new(resources: ApiResources) -> Result<Self, MajrpcError> {
        let schema = ProtocolSchema::from_value(resources.schema)?;
        let codec = MessageCodec::new(Arc::new(schema));

        if resources.server_list.is_empty() {
            return Err(MajrpcError::EmptyServerList);
        }
        let pick = rand::rng().random_range(0..resources.server_list.len());
        let url = format!("wss://{}", resources.server_list[pick]);

        let client_version = client_version_of(&resources.version);
        tracing::info!(%url, %client_version, "session configured");

        let connection = Arc::new(Connection::new(url));
        let rpc = Arc::new(RpcClient::new(Arc::clone(&connection), codec.clone()));
        let lobby = ServiceProxy::new("Lobby", Arc::clone(&rpc));
        let router = NotificationRouter::new(&connection, codec.clone());
        let rooms = SubscriptionManager::new(lobby.clone());

        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        tokio::spawn(forward_connection_events(
            connection.events(),
            events_tx.clone(),
        ));

        Ok(Self {
            connection,
            codec,
            rpc,
            lobby,
            router,
            rooms,
            events_tx,
            heartbeat: Mutex::new(None),
            version: resources.version,
            client_version,
        })
    }

    /// Opens the WebSocket and starts the heartbeat.
    pub async fn init(&self) -> Result<(), MajrpcError> {
        self.connection.init().await?;
        let monitor = HeartbeatMonitor::start(
            self.lobby.clone(),
            HeartbeatConfig::default(),
            self.events_tx.clone(),
        );
        *self.heartbeat.lock().await = Some(monitor);
        Ok(())
    }

    /// Closes the session. Pending calls fail with `ConnectionClosed`;
    /// calling again is a no-op.
    pub async fn close(&self) {
        self.heartbeat.lock().await.take();
        self.connection.close();
    }

    /// Generic escape hatch for methods without a typed wrapper.
    pub async fn call(
        &self,
        service: &str,
        method: &str,
        args: Value,
    ) -> Result<Value, MajrpcError> {
        Ok(self
            .rpc
            .call(service, method, args, DEFAULT_CALL_TIMEOUT)
            .await?)
    }

    /// Every decoded server push, from subscription time on.
    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.router.subscribe()
    }

    /// Connection lifecycle events merged with heartbeat failures.
    pub fn errors(&self) -> broadcast::Receiver<ClientEvent> {
        self.events_tx.subscribe()
    }

    /// Signs in with a passport token obtained out of band.
    pub async fn log_in(
        &self,
        uid: &str,
        access_token: &str,
    ) -> Result<Account, MajrpcError> {
        login::log_in(
            &self.lobby,
            uid,
            access_token,
            &self.version,
            &self.client_version,
        )
        .await
    }

    /// Looks a contest up by its friendly id.
    pub async fn find_contest(
        &self,
        friendly_id: u64,
    ) -> Result<Option<Contest>, MajrpcError> {
        let resp = self
            .lobby
            .call(
                "fetchCustomizedContestByContestId",
                json!({ "contest_id": friendly_id }),
            )
            .await?;
        Ok(resp
            .get("contest_info")
            .filter(|info| !info.is_null())
            .map(contest_from_info))
    }

    /// All finished game ids for a contest, oldest first.
    pub async fn contest_game_ids(
        &self,
        unique_id: u64,
    ) -> Result<Vec<String>, MajrpcError> {
        Ok(pagination::contest_game_ids(&self.lobby, unique_id).await?)
    }

    /// Finds a player by friendly id.
    pub async fn find_player(
        &self,
        friendly_id: u64,
    ) -> Result<Option<Player>, MajrpcError> {
        let search = self
            .lobby
            .call(
                "searchAccountByPattern",
                json!({ "pattern": friendly_id.to_string() }),
            )
            .await?;
        let Some(decode_id) = search.get("decode_id").and_then(Value::as_u64)
        else {
            return Ok(None);
        };

        let brief = self
            .lobby
            .call(
                "fetchMultiAccountBrief",
                json!({ "account_id_list": [decode_id] }),
            )
            .await?;
        let player = brief
            .get("players")
            .and_then(Value::as_array)
            .and_then(|players| players.first())
            .map(|p| Player {
                account_id: p.get("account_id").and_then(Value::as_u64).unwrap_or_default(),
                nickname: p
                    .get("nickname")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            });
        Ok(player)
    }

    /// Fetches and decodes a finished game by uuid. `None` when the
    /// gateway has no record data for it.
    pub async fn fetch_game_record(
        &self,
        uuid: &str,
    ) -> Result<Option<GameRecord>, MajrpcError> {
        let resp = self
            .lobby
            .call(
                "fetchGameRecord",
                json!({
                    "game_uuid": uuid,
                    "client_version_string": self.client_version,
                }),
            )
            .await?;
        decode_game_record(&self.codec, resp)
    }

    /// Subscribes to a contest chat room's pushes. Dropping the handle
    /// releases the room reference.
    pub async fn subscribe_to_room(
        &self,
        room_id: u64,
    ) -> Result<RoomSubscription<ServiceProxy>, MajrpcError> {
        Ok(self.rooms.acquire(room_id, self.router.subscribe()).await?)
    }
}

/// `web-` plus the version with its trailing two characters dropped, the
/// form the gateway expects in `client_version_string`.
fn client_version_of(version: &str) -> String {
    let cut = version.len().saturating_sub(2);
    format!("web-{}", version.get(..cut).unwrap_or(version))
}

fn contest_from_info(info: &Value) -> Contest {
    let seconds = |key: &str| info.get(key).and_then(Value::as_u64).unwrap_or_default();
    Contest {
        unique_id: seconds("unique_id"),
        friendly_id: seconds("contest_id"),
        name: info
            .get("contest_name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        created_time_ms: seconds("create_time") * 1000,
        start_time_ms: seconds("start_time") * 1000,
        finish_time_ms: seconds("finish_time") * 1000,
    }
}

/// Decodes the record blob inside a `fetchGameRecord` response.
///
/// The blob is a `GameDetailRecords` message whose `records` list holds
/// name-wrapped steps. Older games ship an empty `records` and carry the
/// same steps as the `result` of `actions` entries with `type == 1`.
fn decode_game_record(
    codec: &MessageCodec,
    mut resp: Value,
) -> Result<Option<GameRecord>, MajrpcError> {
    let Some(data) = resp
        .as_object_mut()
        .and_then(|obj| obj.remove("data"))
        .filter(|d| !d.is_null())
    else {
        return Ok(None);
    };
    let blob = value_to_bytes(&data).ok_or_else(|| {
        ProtocolError::MalformedMessage("game record data is not a byte array".into())
    })?;
    let details = codec.decode_message("GameDetailRecords", &blob)?;

    let records = details
        .get("records")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let wrapped: Vec<Value> = if records.is_empty() {
        details
            .get("actions")
            .and_then(Value::as_array)
            .map(|actions| {
                actions
                    .iter()
                    .filter(|a| a.get("type").and_then(Value::as_u64) == Some(1))
                    .filter_map(|a| a.get("result").cloned())
                    .collect()
            })
            .unwrap_or_default()
    } else {
        records
    };

    let mut steps = Vec::with_capacity(wrapped.len());
    for item in &wrapped {
        let bytes = value_to_bytes(item).ok_or_else(|| {
            ProtocolError::MalformedMessage("game step is not a byte array".into())
        })?;
        let (name, data) = codec.decode_wrapped(&bytes)?;
        steps.push(GameStep { name, data });
    }
    Ok(Some(GameRecord { head: resp, steps }))
}

async fn forward_connection_events(
    mut events: broadcast::Receiver<ConnectionEvent>,
    tx: broadcast::Sender<ClientEvent>,
) {
    loop {
        match events.recv().await {
            Ok(ev) => {
                let terminal = matches!(ev, ConnectionEvent::Closed);
                let _ = tx.send(ClientEvent::Connection(ev));
                if terminal {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use majrpc_protocol::bytes_to_value;

    fn codec() -> MessageCodec {
        let schema = ProtocolSchema::from_value(json!({
            "messages": {
                "GameDetailRecords": {
                    "fields": [
                        { "name": "records", "tag": 1, "type": "bytes",
                          "repeated": true },
                        { "name": "actions", "tag": 2, "type": "message",
                          "message": "GameAction", "repeated": true }
                    ]
                },
                "GameAction": {
                    "fields": [
                        { "name": "type", "tag": 1, "type": "uint" },
                        { "name": "result", "tag": 2, "type": "bytes" }
                    ]
                },
                "RecordDiscard": {
                    "fields": [
                        { "name": "seat", "tag": 1, "type": "uint" }
                    ]
                }
            },
            "services": {}
        }))
        .unwrap();
        MessageCodec::new(Arc::new(schema))
    }

    fn wrapped_discard(codec: &MessageCodec, seat: u64) -> Value {
        let bytes = codec
            .encode_wrapped("RecordDiscard", &json!({ "seat": seat }))
            .unwrap();
        bytes_to_value(&bytes)
    }

    #[test]
    fn client_version_drops_the_suffix() {
        assert_eq!(client_version_of("0.10.113.w"), "web-0.10.113");
        assert_eq!(client_version_of("w"), "web-");
    }

    #[test]
    fn contest_times_convert_to_milliseconds() {
        let contest = contest_from_info(&json!({
            "unique_id": 777,
            "contest_id": 123456,
            "contest_name": "League",
            "create_time": 10,
            "start_time": 20,
            "finish_time": 30,
        }));
        assert_eq!(contest.unique_id, 777);
        assert_eq!(contest.friendly_id, 123456);
        assert_eq!(contest.name, "League");
        assert_eq!(contest.created_time_ms, 10_000);
        assert_eq!(contest.start_time_ms, 20_000);
        assert_eq!(contest.finish_time_ms, 30_000);
    }

    #[test]
    fn game_record_decodes_the_records_list() {
        let codec = codec();
        let details = json!({
            "records": [wrapped_discard(&codec, 0), wrapped_discard(&codec, 3)],
        });
        let blob = codec.encode_message("GameDetailRecords", &details).unwrap();
        let resp = json!({ "data": bytes_to_value(&blob), "head": { "uuid": "g1" } });

        let record = decode_game_record(&codec, resp).unwrap().unwrap();
        assert_eq!(record.steps.len(), 2);
        assert_eq!(record.steps[0].name, "RecordDiscard");
        assert_eq!(record.steps[0].data["seat"], json!(0));
        assert_eq!(record.steps[1].data["seat"], json!(3));
        // The blob itself is stripped from the head.
        assert!(record.head.get("data").is_none());
    }

    #[test]
    fn empty_records_fall_back_to_type_one_actions() {
        let codec = codec();
        let details = json!({
            "actions": [
                { "type": 2, "result": wrapped_discard(&codec, 1) },
                { "type": 1, "result": wrapped_discard(&codec, 2) },
            ],
        });
        let blob = codec.encode_message("GameDetailRecords", &details).unwrap();
        let resp = json!({ "data": bytes_to_value(&blob) });

        let record = decode_game_record(&codec, resp).unwrap().unwrap();
        assert_eq!(record.steps.len(), 1);
        assert_eq!(record.steps[0].data["seat"], json!(2));
    }

    #[test]
    fn missing_data_is_absence_not_failure() {
        let codec = codec();
        assert!(decode_game_record(&codec, json!({})).unwrap().is_none());
    }
}
