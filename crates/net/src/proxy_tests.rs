// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::server::{self, RequestHandler};
use colony_storage::BatchConfig;
use serde_json::json;

/// Minimal master endpoint for proxy exercises.
#[derive(Default)]
struct StubMaster {
    state: Mutex<HashMap<String, Value>>,
    decisions: Mutex<Vec<DecisionRecord>>,
    events: Mutex<Vec<Event>>,
    stops: Mutex<Vec<String>>,
}

#[async_trait]
impl RequestHandler for StubMaster {
    async fn handle(&self, request: Request) -> Response {
        match request {
            Request::GetEnvData { key, default } => Response::EnvData {
                value: self.state.lock().get(&key).cloned().unwrap_or(default),
            },
            Request::UpdateEnvData { key, value } => {
                self.state.lock().insert(key, value);
                Response::Updated { success: true }
            }
            Request::GetAgentData { default, .. } => Response::AgentData { value: default },
            Request::GetAgentDataByType { .. } => Response::AgentDataByType {
                values: [("A7".to_string(), json!(7))].into_iter().collect(),
            },
            Request::QueueDecisions { records } => {
                self.decisions.lock().extend(records);
                Response::Ok
            }
            Request::QueueEvents { .. } => Response::Ok,
            Request::SendEvent { event } => {
                self.events.lock().push(event);
                Response::EventAccepted { accepted: true }
            }
            Request::StopSimulation { node_id } => {
                self.stops.lock().push(node_id);
                Response::Ok
            }
            other => Response::Error {
                message: format!("stub: {other:?}"),
            },
        }
    }
}

struct Rig {
    proxy: Arc<ProxyEnv>,
    stub: Arc<StubMaster>,
    stop: Arc<StopSignal>,
}

async fn rig() -> Rig {
    let stub = Arc::new(StubMaster::default());
    let (listener, port) = server::bind("127.0.0.1", 0).await.unwrap();
    server::spawn(
        listener,
        Arc::clone(&stub) as Arc<dyn RequestHandler>,
        Arc::new(StopSignal::default()),
    );

    let stop = Arc::new(StopSignal::default());
    let master = RpcClient::new("127.0.0.1", port);
    let batch = BatchProcessor::start(
        Arc::new(MasterSink::new(master.clone())),
        BatchConfig {
            batch_size: 1,
            max_wait: Duration::from_millis(10),
        },
    );
    let proxy = ProxyEnv::new(
        NodeId::new("w-1"),
        master,
        Arc::new(AgentDirectory::new()),
        batch,
        Arc::clone(&stop),
    );
    proxy.set_trail_id(TrailId::new("trail-1"));
    Rig { proxy, stub, stop }
}

#[tokio::test]
async fn proxy_env_id_is_node_scoped() {
    let rig = rig().await;
    assert_eq!(rig.proxy.env_id(), AgentId::new("w-1_ENV"));
    assert_eq!(rig.proxy.trail_id(), TrailId::new("trail-1"));
}

#[tokio::test]
async fn get_and_update_data_round_trip_through_master() {
    let rig = rig().await;
    assert_eq!(
        rig.proxy.get_data("season", json!("none")).await,
        json!("none")
    );
    assert!(rig.proxy.update_data("season", json!("spring")).await);
    assert_eq!(
        rig.proxy.get_data("season", json!("none")).await,
        json!("spring")
    );
}

#[tokio::test]
async fn unreachable_master_yields_defaults() {
    let stop = Arc::new(StopSignal::default());
    let master = RpcClient::new("127.0.0.1", 1).with_timeout(Duration::from_millis(200));
    let batch = BatchProcessor::start(
        Arc::new(MasterSink::new(master.clone())),
        BatchConfig::default(),
    );
    let proxy = ProxyEnv::new(
        NodeId::new("w-1"),
        master,
        Arc::new(AgentDirectory::new()),
        batch,
        stop,
    );

    assert_eq!(proxy.get_data("k", json!(5)).await, json!(5));
    assert!(!proxy.update_data("k", json!(1)).await);
    assert!(proxy
        .get_agent_data_by_type("T", "score", json!(-1))
        .await
        .is_empty());
}

#[tokio::test]
async fn queued_decisions_flush_to_master() {
    let rig = rig().await;
    rig.proxy
        .queue_decision(colony_core::test_support::decision("trail-1", "A1", 0))
        .await;

    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if !rig.stub.decisions.lock().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn data_event_is_serviced_with_paired_response() {
    let rig = rig().await;
    rig.proxy.update_data("policy", json!("strict")).await;

    let request = Event::data_request("A1", colony_core::ENV_ID, "req-1", "policy", json!("none"));
    let responses = rig.proxy.handle_env_event(request).await;
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].event_kind, kind::DATA_RESPONSE);
    assert_eq!(responses[0].from_agent_id, "w-1_ENV");
    assert_eq!(responses[0].to_agent_id, "A1");
    assert_eq!(responses[0].field("value"), Some(&json!("strict")));
}

#[tokio::test]
async fn agent_data_by_type_event_returns_master_merge() {
    let rig = rig().await;
    let request = Event::agent_data_by_type(
        "A1",
        colony_core::ENV_ID,
        "req-2",
        "T",
        "score",
        json!(-1),
    );
    let responses = rig.proxy.handle_env_event(request).await;
    assert_eq!(responses[0].field("value"), Some(&json!({"A7": 7})));
}

#[tokio::test]
async fn unknown_env_events_forward_to_master() {
    let rig = rig().await;
    let done = Event::new("A1", colony_core::ENV_ID, "DoneEvent");
    let responses = rig.proxy.handle_env_event(done.clone()).await;
    assert!(responses.is_empty());
    assert_eq!(rig.stub.events.lock()[0].event_id, done.event_id);
}

#[tokio::test]
async fn end_event_stops_locally_and_notifies_master() {
    let rig = rig().await;
    rig.proxy
        .handle_env_event(colony_core::test_support::end_event("done"))
        .await;
    assert!(rig.stop.is_stopped());
    assert_eq!(rig.stub.stops.lock().clone(), vec!["w-1"]);
}

#[tokio::test]
async fn tracker_completes_each_request_exactly_once() {
    let tracker = RequestTracker::new();
    let rx = tracker.register("req-1");
    assert_eq!(tracker.pending_count(), 1);

    let response = Event::new("ENV", "w-1_ENV", kind::DATA_RESPONSE).with("request_id", "req-1");
    assert!(tracker.complete(response.clone()));
    assert_eq!(tracker.pending_count(), 0);

    // Second completion finds nothing parked
    assert!(!tracker.complete(response));

    let event = tracker
        .await_response("req-1", rx, Duration::from_millis(100))
        .await
        .unwrap();
    assert_eq!(event.request_id(), Some("req-1"));
}

#[tokio::test]
async fn tracker_timeout_removes_the_pending_entry() {
    let tracker = RequestTracker::new();
    let rx = tracker.register("req-slow");

    let err = tracker
        .await_response("req-slow", rx, Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, ProxyError::Timeout(_)));
    assert_eq!(tracker.pending_count(), 0);

    // A late response is ignored, not double-delivered
    let late = Event::new("ENV", "w-1_ENV", kind::DATA_RESPONSE).with("request_id", "req-slow");
    assert!(!tracker.complete(late));
}

#[tokio::test]
async fn responses_without_request_id_are_ignored() {
    let tracker = RequestTracker::new();
    let _rx = tracker.register("req-1");
    assert!(!tracker.complete(Event::new("ENV", "w-1_ENV", kind::DATA_RESPONSE)));
    assert_eq!(tracker.pending_count(), 1);
}

#[tokio::test]
async fn event_correlated_request_round_trip() {
    let rig = rig().await;

    // Spawn the responder: when the master stub receives the DataEvent,
    // answer it back through the proxy's event path.
    let proxy = Arc::clone(&rig.proxy);
    let stub = Arc::clone(&rig.stub);
    tokio::spawn(async move {
        loop {
            let request = stub.events.lock().first().cloned();
            if let Some(request) = request {
                let response =
                    Event::data_response("ENV", &request, json!("answered"), true, None);
                proxy.handle_env_event(response).await;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    });

    let request = Event::data_request(
        "w-1_ENV",
        colony_core::ENV_ID,
        "req-9",
        "anything",
        Value::Null,
    );
    let response = tokio::time::timeout(Duration::from_secs(2), rig.proxy.request(request))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response.field("value"), Some(&json!("answered")));
    assert_eq!(rig.proxy.tracker().pending_count(), 0);
}
