use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use image::{ImageFormat, Rgb, RgbImage};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use tabsense_lib::camera::HttpCameraResolver;
use tabsense_lib::capture::{CaptureConfig, FrameCapturer};
use tabsense_lib::detection::HttpDetector;
use tabsense_lib::models::{
    CaptureKind, DaySet, ImageLayout, NamingScheme, RenderOptions, ScheduleEntry,
};
use tabsense_lib::scheduler::{JobKind, PipelineExecutor, Scheduler};

fn snapshot_png() -> Vec<u8> {
    let frame = RgbImage::from_pixel(64, 36, Rgb([200, 200, 200]));
    let mut bytes = Cursor::new(Vec::new());
    frame.write_to(&mut bytes, ImageFormat::Png).unwrap();
    bytes.into_inner()
}

fn at(date: (i32, u32, u32), h: u32, m: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(date.0, date.1, date.2)
        .unwrap()
        .and_hms_opt(h, m, s)
        .unwrap()
}

const MONDAY: (i32, u32, u32) = (2024, 1, 1);
const TUESDAY: (i32, u32, u32) = (2024, 1, 2);
const NEXT_MONDAY: (i32, u32, u32) = (2024, 1, 8);

fn r1_entry() -> ScheduleEntry {
    ScheduleEntry::new(
        "acme",
        "R1",
        "",
        vec![1, 2],
        NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
        NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        DaySet::from_names(["Monday"]).unwrap(),
    )
}

/// Dashboard API and cameras on one mock server. `dead_sector` resolves to
/// an address nothing listens on.
async fn dashboard(dead_sector: Option<u32>) -> MockServer {
    let server = MockServer::start().await;

    for sector in [1u32, 2] {
        let link = if Some(sector) == dead_sector {
            "http://127.0.0.1:9/snap.jpg".to_string()
        } else {
            format!("{}/snap/{sector}.jpg", server.uri())
        };
        Mock::given(method("GET"))
            .and(path("/cam"))
            .and(query_param("client", "acme"))
            .and(query_param("room", "R1"))
            .and(query_param("sector", sector.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": format!("cam-{sector}"),
                "room": "R1",
                "sector": sector,
                "link": link,
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(format!("/snap/{sector}.jpg")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(snapshot_png()))
            .mount(&server)
            .await;
    }

    Mock::given(method("GET"))
        .and(path("/detect"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "2": {"control": "imagedata/control/R1-x-2.png", "highlight": "imagedata/highlight/R1-2.png"}
        })))
        .mount(&server)
        .await;

    server
}

fn executor(server: &MockServer, root: &Path) -> PipelineExecutor {
    let api = reqwest::Client::new();
    let capturer = FrameCapturer::new(CaptureConfig {
        http_timeout: Duration::from_secs(2),
        ..CaptureConfig::default()
    })
    .unwrap();
    PipelineExecutor::new(
        Arc::new(HttpCameraResolver::new(api.clone(), server.uri())),
        Arc::new(capturer),
        Arc::new(HttpDetector::new(api, server.uri())),
        ImageLayout::new(root, NamingScheme::RoomPrefixed),
        RenderOptions::default(),
    )
}

async fn detect_requests(server: &MockServer) -> Vec<Request> {
    server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|request| request.url.path() == "/detect")
        .collect()
}

fn query_values(request: &Request, key: &str) -> Vec<String> {
    request
        .url
        .query_pairs()
        .filter(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
        .collect()
}

fn png_count(dir: &Path) -> usize {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(Result::ok)
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "png"))
            .count(),
        Err(_) => 0,
    }
}

/// Runs one full shift day: the control trigger, the current trigger and
/// the detection trigger.
async fn run_day(
    scheduler: &mut Scheduler,
    executor: &mut PipelineExecutor,
    date: (i32, u32, u32),
) -> usize {
    let mut executed = 0;
    for now in [at(date, 8, 0, 0), at(date, 17, 0, 0), at(date, 17, 0, 5)] {
        executed += scheduler.run_pending(now, executor).await.executed.len();
    }
    executed
}

#[tokio::test]
async fn monday_shift_captures_then_detects() {
    let server = dashboard(None).await;
    let dir = tempfile::tempdir().unwrap();
    let mut executor = executor(&server, dir.path());
    let mut scheduler = Scheduler::new(TimeDelta::seconds(5));
    let entry = r1_entry();
    scheduler.refresh(std::slice::from_ref(&entry), at(MONDAY, 7, 0, 0));

    let control = scheduler.run_pending(at(MONDAY, 8, 0, 0), &mut executor).await;
    assert_eq!(control.executed.len(), 2);
    assert!(control.failed.is_empty());
    assert!(control.executed.iter().all(|k| k.kind == JobKind::ControlCapture));
    assert_eq!(png_count(&dir.path().join("control")), 2);

    // Polling again in the same minute repeats nothing.
    let again = scheduler.run_pending(at(MONDAY, 8, 0, 30), &mut executor).await;
    assert!(again.is_idle());
    assert_eq!(png_count(&dir.path().join("control")), 2);

    let current = scheduler.run_pending(at(MONDAY, 17, 0, 0), &mut executor).await;
    assert_eq!(current.executed.len(), 2);
    assert_eq!(png_count(&dir.path().join("captures")), 2);
    assert!(detect_requests(&server).await.is_empty());

    let detect = scheduler.run_pending(at(MONDAY, 17, 0, 5), &mut executor).await;
    assert_eq!(detect.executed.len(), 1);
    assert!(detect.failed.is_empty());

    let key = entry.entry_id();
    let ledger = executor.ledger();
    let control_id = &ledger.latest(&key, CaptureKind::Control).unwrap().id;
    let current_id = &ledger.latest(&key, CaptureKind::Current).unwrap().id;
    assert_ne!(control_id, current_id);

    for sector in [1, 2] {
        let control_png = dir.path().join(format!("control/R1-{control_id}-{sector}.png"));
        let current_png = dir.path().join(format!("captures/R1-{current_id}-{sector}.png"));
        assert!(std::fs::metadata(&control_png).unwrap().len() > 0);
        assert!(std::fs::metadata(&current_png).unwrap().len() > 0);
        let decoded = image::open(&current_png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (1024, 576));
    }

    let requests = detect_requests(&server).await;
    assert_eq!(requests.len(), 1);
    assert_eq!(query_values(&requests[0], "control"), vec![format!("R1-{control_id}")]);
    assert_eq!(query_values(&requests[0], "current"), vec![format!("R1-{current_id}")]);
    assert_eq!(query_values(&requests[0], "sectors"), vec!["1", "2"]);
    assert_eq!(query_values(&requests[0], "client"), vec!["acme"]);
    assert_eq!(query_values(&requests[0], "crop"), vec!["true"]);
    assert_eq!(query_values(&requests[0], "color"), vec!["blue"]);
}

#[tokio::test]
async fn tuesday_produces_nothing() {
    let server = dashboard(None).await;
    let dir = tempfile::tempdir().unwrap();
    let mut executor = executor(&server, dir.path());
    let mut scheduler = Scheduler::new(TimeDelta::seconds(5));
    scheduler.refresh(&[r1_entry()], at(TUESDAY, 0, 0, 0));

    assert_eq!(run_day(&mut scheduler, &mut executor, TUESDAY).await, 0);
    assert_eq!(png_count(&dir.path().join("control")), 0);
    assert_eq!(png_count(&dir.path().join("captures")), 0);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn each_monday_gets_fresh_sessions() {
    let server = dashboard(None).await;
    let dir = tempfile::tempdir().unwrap();
    let mut executor = executor(&server, dir.path());
    let mut scheduler = Scheduler::new(TimeDelta::seconds(5));
    let entry = r1_entry();
    scheduler.refresh(std::slice::from_ref(&entry), at(MONDAY, 7, 0, 0));

    assert_eq!(run_day(&mut scheduler, &mut executor, MONDAY).await, 5);
    let first = executor
        .ledger()
        .latest(&entry.entry_id(), CaptureKind::Control)
        .unwrap()
        .id
        .clone();

    // Tuesday through Sunday are polled and skipped.
    for day in 2..=7 {
        assert_eq!(run_day(&mut scheduler, &mut executor, (2024, 1, day)).await, 0);
    }

    assert_eq!(run_day(&mut scheduler, &mut executor, NEXT_MONDAY).await, 5);
    let second = executor
        .ledger()
        .latest(&entry.entry_id(), CaptureKind::Control)
        .unwrap()
        .id
        .clone();

    assert_ne!(first, second);
    assert_eq!(png_count(&dir.path().join("control")), 4);
    assert_eq!(png_count(&dir.path().join("captures")), 4);
    assert_eq!(detect_requests(&server).await.len(), 2);
}

#[tokio::test]
async fn unreachable_camera_does_not_stop_the_shift() {
    let server = dashboard(Some(1)).await;
    let dir = tempfile::tempdir().unwrap();
    let mut executor = executor(&server, dir.path());
    let mut scheduler = Scheduler::new(TimeDelta::seconds(5));
    let entry = r1_entry();
    scheduler.refresh(std::slice::from_ref(&entry), at(MONDAY, 7, 0, 0));

    let control = scheduler.run_pending(at(MONDAY, 8, 0, 0), &mut executor).await;
    assert_eq!(control.executed.len(), 2);
    assert_eq!(control.failed.len(), 1);
    assert_eq!(control.failed[0].sector, Some(1));
    assert_eq!(png_count(&dir.path().join("control")), 1);

    let current = scheduler.run_pending(at(MONDAY, 17, 0, 0), &mut executor).await;
    assert_eq!(current.failed.len(), 1);
    assert_eq!(png_count(&dir.path().join("captures")), 1);

    let session = executor
        .ledger()
        .latest(&entry.entry_id(), CaptureKind::Current)
        .unwrap();
    assert!(session.failed.contains(&1));
    assert!(session.captured.contains(&2));

    // Detection still fires with the sectors that were scheduled.
    let detect = scheduler.run_pending(at(MONDAY, 17, 0, 5), &mut executor).await;
    assert_eq!(detect.executed.len(), 1);
    assert!(detect.failed.is_empty());

    let requests = detect_requests(&server).await;
    assert_eq!(requests.len(), 1);
    assert_eq!(query_values(&requests[0], "sectors"), vec!["1", "2"]);
}

#[tokio::test]
async fn strict_mode_skips_incomplete_detection() {
    let server = dashboard(Some(2)).await;
    let dir = tempfile::tempdir().unwrap();
    let mut executor = executor(&server, dir.path()).require_complete_captures(true);
    let mut scheduler = Scheduler::new(TimeDelta::seconds(5));
    scheduler.refresh(&[r1_entry()], at(MONDAY, 7, 0, 0));

    assert_eq!(run_day(&mut scheduler, &mut executor, MONDAY).await, 5);
    assert!(detect_requests(&server).await.is_empty());
}

#[tokio::test]
async fn monday_night_shift_is_compared_on_tuesday_morning() {
    let server = dashboard(None).await;
    let dir = tempfile::tempdir().unwrap();
    let mut executor = executor(&server, dir.path());
    let mut scheduler = Scheduler::new(TimeDelta::seconds(5));
    let mut entry = r1_entry();
    entry.start = NaiveTime::from_hms_opt(22, 0, 0).unwrap();
    entry.end = NaiveTime::from_hms_opt(6, 0, 0).unwrap();
    scheduler.refresh(std::slice::from_ref(&entry), at(MONDAY, 0, 0, 0));

    for now in [at(MONDAY, 6, 0, 0), at(MONDAY, 6, 0, 5)] {
        assert!(scheduler.run_pending(now, &mut executor).await.executed.is_empty());
    }
    assert_eq!(png_count(&dir.path().join("captures")), 0);

    let control = scheduler.run_pending(at(MONDAY, 22, 0, 0), &mut executor).await;
    assert_eq!(control.executed.len(), 2);
    let current = scheduler.run_pending(at(TUESDAY, 6, 0, 0), &mut executor).await;
    assert_eq!(current.executed.len(), 2);
    assert!(current.failed.is_empty());
    let detect = scheduler.run_pending(at(TUESDAY, 6, 0, 5), &mut executor).await;
    assert_eq!(detect.executed.len(), 1);
    assert!(detect.failed.is_empty());

    let ledger = executor.ledger();
    let control_id = &ledger.latest(&entry.entry_id(), CaptureKind::Control).unwrap().id;
    let current_id = &ledger.latest(&entry.entry_id(), CaptureKind::Current).unwrap().id;
    let requests = detect_requests(&server).await;
    assert_eq!(requests.len(), 1);
    assert_eq!(query_values(&requests[0], "control"), vec![format!("R1-{control_id}")]);
    assert_eq!(query_values(&requests[0], "current"), vec![format!("R1-{current_id}")]);
}
