//! Integration tests for shelterd
//!
//! These tests drive the engine over a file-backed store the way the daemon
//! wires it, including restarts and the IPC path.

use chrono::NaiveDate;
use shelter_api::{
    AggregateKind, AggregateQuery, AggregateResult, Command, GateDecision, Response,
    ResponsePayload, SensorRef, SensorReading,
};
use shelter_config::{Settings, parse_config};
use shelter_core::{OccupancyEngine, fingerprint};
use shelter_ipc::{IpcClient, IpcError, IpcServer, ServerMessage};
use shelter_store::{SqliteStore, Store};
use shelter_util::{DATABASE_FILENAME, ShelterError, ShelterId};
use std::path::Path;
use std::sync::Arc;
use std::thread;

const SECRET: &str = "supersecure";

fn config_for(ids: &[&str]) -> Settings {
    let mut toml = String::from("config_version = 1\n\n[counting]\ndebounce_window_seconds = 5\n");
    for id in ids {
        toml.push_str(&format!(
            "\n[[shelters]]\nid = \"{}\"\ncredential_sha256 = \"{}\"\n",
            id,
            fingerprint(SECRET)
        ));
    }
    parse_config(&toml).unwrap()
}

fn open_engine(data_dir: &Path, settings: &Settings) -> (OccupancyEngine, Arc<dyn Store>) {
    let store: Arc<dyn Store> = Arc::new(
        SqliteStore::open(data_dir.join(DATABASE_FILENAME), settings.store.busy_timeout).unwrap(),
    );
    let engine = OccupancyEngine::new(store.clone(), settings.counting.debounce_window);
    engine.provision(&settings.shelters).unwrap();
    engine.reconcile_all().unwrap();
    (engine, store)
}

fn reading(shelter: &str, sensor: u32, status: &str, timestamp: &str) -> SensorReading {
    SensorReading {
        shelter_id: ShelterId::new(shelter),
        sensor_id: SensorRef::Id(sensor),
        status: status.into(),
        timestamp: timestamp.into(),
        credential: SECRET.into(),
    }
}

fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

#[test]
fn test_config_provisions_shelters() {
    let dir = tempfile::tempdir().unwrap();
    let settings = config_for(&["abc", "REF123"]);
    let (engine, _) = open_engine(dir.path(), &settings);

    let shelters = engine.list_shelters().unwrap();
    assert_eq!(shelters.len(), 2);
    assert!(shelters.iter().all(|s| s.current_count == 0));
}

#[test]
fn test_scenarios_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let settings = config_for(&["S1"]);

    {
        let (engine, _) = open_engine(dir.path(), &settings);

        let steps = [
            (1, "2024-05-10 09:00:00", true, 1),
            (2, "2024-05-10 09:00:01", false, 1),
            (2, "2024-05-10 09:00:06", true, 0),
            (2, "2024-05-10 09:00:12", true, 0),
        ];
        for (sensor, ts, accepted, counter) in steps {
            let outcome = engine
                .ingest_event(&reading("S1", sensor, "Obstacle", ts))
                .unwrap();
            assert_eq!(outcome.accepted, accepted, "{}", ts);
            assert_eq!(outcome.counter, counter, "{}", ts);
        }
    }

    // Restarted daemon: same answers, and the last crossing is still debounced
    let (engine, store) = open_engine(dir.path(), &settings);

    let replay = engine
        .ingest_event(&reading("S1", 2, "Obstacle", "2024-05-10 09:00:12"))
        .unwrap();
    assert_eq!(replay.decision, GateDecision::Suppressed);

    let daily = engine
        .query(
            &AggregateQuery::new(AggregateKind::Daily, "S1").on_day(day("2024-05-10")),
            day("2024-05-10"),
        )
        .unwrap();
    assert!(matches!(daily, AggregateResult::Daily(d) if d.daily_count == 0 && d.day == "2024-05-10"));

    let interval = engine
        .query(
            &AggregateQuery::new(AggregateKind::Interval, "S1")
                .between(Some(day("2024-05-10")), None),
            day("2024-05-10"),
        )
        .unwrap();
    assert!(matches!(
        interval,
        AggregateResult::Interval(i) if i.people_in == 1 && i.people_out == 2
    ));

    assert_eq!(store.ledger_records(&ShelterId::new("S1")).unwrap().len(), 3);
}

#[test]
fn test_wrong_credential_is_independent_of_counting() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, store) = open_engine(dir.path(), &config_for(&["S1"]));

    let mut forged = reading("S1", 1, "Obstacle", "2024-05-10 09:00:00");
    forged.credential = SECRET[..SECRET.len() - 1].into();

    assert!(matches!(
        engine.ingest_event(&forged),
        Err(ShelterError::Unauthorized(_))
    ));
    assert!(store.ledger_records(&ShelterId::new("S1")).unwrap().is_empty());
}

#[test]
fn test_startup_reconciliation_repairs_cache() {
    let dir = tempfile::tempdir().unwrap();
    let settings = config_for(&["S1"]);

    {
        let (engine, store) = open_engine(dir.path(), &settings);
        engine
            .ingest_event(&reading("S1", 1, "Obstacle", "2024-05-10 09:00:00"))
            .unwrap();
        store.set_cached_count(&ShelterId::new("S1"), 42).unwrap();
    }

    let (engine, _) = open_engine(dir.path(), &settings);
    let current = engine
        .query(
            &AggregateQuery::new(AggregateKind::Current, "S1"),
            day("2024-05-10"),
        )
        .unwrap();
    assert!(matches!(current, AggregateResult::Current { current_count: 1, .. }));
}

#[test]
fn test_same_shelter_concurrency() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, store) = open_engine(dir.path(), &config_for(&["S1"]));
    let engine = Arc::new(engine);

    // Sixteen racing sensors, two distinct crossings ten seconds apart
    let handles: Vec<_> = (0..16)
        .map(|i| {
            let engine = Arc::clone(&engine);
            let ts = if i % 2 == 0 {
                "2024-05-10 09:00:00"
            } else {
                "2024-05-10 09:00:10"
            };
            thread::spawn(move || engine.ingest_event(&reading("S1", 1, "Obstacle", ts)).unwrap())
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let records = store.ledger_records(&ShelterId::new("S1")).unwrap();
    assert!(!records.is_empty() && records.len() <= 2);

    let shelter = store.get_shelter(&ShelterId::new("S1")).unwrap().unwrap();
    assert_eq!(shelter.current_count, records.len() as i64);
    assert_eq!(records.last().unwrap().resulting_count, shelter.current_count);
}

#[tokio::test]
async fn test_ingest_over_ipc() {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("shelterd.sock");
    let (engine, _) = open_engine(dir.path(), &config_for(&["S1"]));
    let engine = Arc::new(engine);

    let mut server = IpcServer::new(&socket_path);
    server.start().await.unwrap();
    let server = Arc::new(server);
    let mut messages = server.take_message_receiver().await.unwrap();

    let accept = server.clone();
    tokio::spawn(async move {
        let _ = accept.run().await;
    });

    let responder = server.clone();
    tokio::spawn(async move {
        while let Some(msg) = messages.recv().await {
            if let ServerMessage::Request { client_id, request } = msg {
                let engine = engine.clone();
                let result = tokio::task::spawn_blocking(move || match request.command {
                    Command::IngestEvent(r) => engine.ingest_event(&r).map(ResponsePayload::Ingested),
                    Command::Query(q) => engine
                        .query(&q, day("2024-05-10"))
                        .map(ResponsePayload::Aggregate),
                    _ => Ok(ResponsePayload::Pong),
                })
                .await
                .unwrap();

                let response = Response::from_result(request.request_id, result);
                let _ = responder.send_response(&client_id, response).await;
            }
        }
    });

    let mut client = IpcClient::connect(&socket_path).await.unwrap();

    let outcome = client
        .ingest(reading("S1", 1, "Obstacle", "2024-05-10 09:00:00"))
        .await
        .unwrap();
    assert!(outcome.accepted);
    assert_eq!(outcome.counter, 1);

    match client
        .ingest(reading("nowhere", 1, "Obstacle", "2024-05-10 09:00:00"))
        .await
    {
        Err(IpcError::Rejected(e)) => {
            assert_eq!(e.code, shelter_api::ErrorCode::NotFound);
            assert!(!e.retryable);
        }
        other => panic!("unexpected result {:?}", other),
    }

    let current = client
        .query(AggregateQuery::new(AggregateKind::Current, "S1"))
        .await
        .unwrap();
    assert!(matches!(current, AggregateResult::Current { current_count: 1, .. }));

    let response = client
        .send(Command::Query(AggregateQuery::new(
            AggregateKind::WeeklyByDay,
            "S1",
        )))
        .await
        .unwrap();
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["result"]["ok"]["kind"], "weekly_by_day");
    assert_eq!(json["result"]["ok"]["weekly_data"].as_array().unwrap().len(), 7);
    assert_eq!(json["result"]["ok"]["weekly_data"][6]["count"], 1);
}
