//! Text request to result series against an in-process OpenTSDB stand-in

use std::sync::{Arc, Mutex};

use axum::{Json, Router, extract::State, routing::post};
use chrono::{TimeZone, Utc};
use opentsdb::{DateCache, Host, QueryContext, Request, TimeExpr};
use serde_json::{Value, json};

/// Keeps every request body it receives
#[derive(Clone, Default)]
struct Recorder {
    bodies: Arc<Mutex<Vec<Value>>>,
}

async fn query_handler(State(state): State<Recorder>, Json(body): Json<Value>) -> Json<Value> {
    let metric = body["queries"][0]["metric"].clone();
    state.bodies.lock().unwrap().push(body);
    Json(json!([{
        "metric": metric,
        "tags": {},
        "aggregateTags": ["host"],
        "dps": {"1710072000": 10.0}
    }]))
}

async fn start_server() -> (String, Recorder) {
    let state = Recorder::default();
    let app = Router::new()
        .route("/api/query", post(query_handler))
        .with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr.to_string(), state)
}

#[tokio::test]
async fn test_parsed_request_reaches_server_as_wire_json() {
    let (addr, recorder) = start_server().await;
    let mut host = Host::new(&format!("http://{addr}")).unwrap();

    let request: Request = "start=2h-ago&m=sum:rate{counter,,1}:net.bytes{iface=eth0,host=a}"
        .parse()
        .unwrap();
    let rs = host.query(&request).await.unwrap();
    assert_eq!(rs[0].metric, "net.bytes");
    assert_eq!(rs[0].aggregate_tags, vec!["host"]);

    let bodies = recorder.bodies.lock().unwrap();
    assert_eq!(
        bodies[0],
        json!({
            "start": "2h-ago",
            "queries": [{
                "aggregator": "sum",
                "metric": "net.bytes",
                "rate": true,
                "rateOptions": {"counter": true, "resetValue": 1},
                "tags": {"host": "a", "iface": "eth0"}
            }]
        })
    );
}

#[tokio::test]
async fn test_date_cache_sends_pinned_epoch_window() {
    let (addr, recorder) = start_server().await;
    let reference = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
    let mut dc = DateCache::new(Host::new(&addr).unwrap(), reference);

    let mut request: Request = "start=1h-ago&m=avg:cpu".parse().unwrap();
    request.auto_downsample(60).unwrap();

    dc.query(&request).await.unwrap();
    dc.query(&request).await.unwrap();

    let bodies = recorder.bodies.lock().unwrap();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["start"], json!(reference.timestamp() - 3600));
    assert_eq!(bodies[0]["end"], json!(reference.timestamp()));
    assert_eq!(bodies[0]["queries"][0]["downsample"], json!("60s-avg"));
    assert_eq!(
        dc.normalize(&request, Utc::now()).unwrap().end,
        Some(TimeExpr::Epoch(reference.timestamp()))
    );
}
