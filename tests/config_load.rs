use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::Builder;

use vision_node::config::VisionConfig;
use vision_node::detect::EngineMode;
use vision_node::display::DisplayMode;
use vision_node::frame::Resolution;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "VISION_CONFIG",
        "VISION_HTTP_ADDR",
        "VISION_CAMERA_URL",
        "VISION_ENGINE",
        "VISION_MODEL_PATH",
        "VISION_LABELS",
        "VISION_OFFLINE",
        "VISION_JOIN_ATTEMPTS",
    ] {
        std::env::remove_var(key);
    }
}

fn config_file(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
    let mut file = Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp config");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = VisionConfig::load().expect("load config");
    assert_eq!(cfg.http.addr, "0.0.0.0:8080");
    assert_eq!(cfg.http.max_requests_per_turn, 4);
    assert_eq!(cfg.http.stream_write_timeout, Duration::from_millis(5000));
    assert_eq!(cfg.camera.url, "stub://camera");
    assert_eq!(cfg.camera.resolution, Resolution::new(320, 240));
    assert_eq!(cfg.engine.name, "stub");
    assert_eq!(cfg.engine.mode, EngineMode::Classification);
    assert_eq!(cfg.engine.labels, vec!["background", "plug", "switch"]);
    assert_eq!(cfg.engine.min_confidence, 0.0);
    assert_eq!(cfg.scheduler.yield_interval, Duration::from_millis(10));
    assert_eq!(cfg.network.join_attempts, 20);
    assert!(!cfg.network.offline);
    assert_eq!(cfg.display, DisplayMode::Auto);
}

#[test]
fn loads_json_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = config_file(
        ".json",
        r#"{
            "http": { "addr": "127.0.0.1:9000", "max_requests_per_turn": 2 },
            "camera": { "url": "/var/lib/frames", "width": 640, "height": 480 },
            "engine": {
                "mode": "object_detection",
                "input_width": 128,
                "input_height": 96,
                "min_confidence": 0.25
            },
            "network": { "join_attempts": 5, "join_interval_ms": 200 },
            "display": { "mode": "plain" }
        }"#,
    );
    std::env::set_var("VISION_CONFIG", file.path());
    std::env::set_var("VISION_CAMERA_URL", "stub://bench");
    std::env::set_var("VISION_LABELS", "bg, cup ,mug");
    std::env::set_var("VISION_OFFLINE", "true");

    let cfg = VisionConfig::load().expect("load config");
    assert_eq!(cfg.http.addr, "127.0.0.1:9000");
    assert_eq!(cfg.http.max_requests_per_turn, 2);
    assert_eq!(cfg.camera.url, "stub://bench");
    assert_eq!(cfg.camera.resolution, Resolution::new(640, 480));
    assert_eq!(cfg.engine.mode, EngineMode::ObjectDetection);
    assert_eq!(cfg.engine.input, Resolution::new(128, 96));
    assert_eq!(cfg.engine.labels, vec!["bg", "cup", "mug"]);
    assert_eq!(cfg.engine.min_confidence, 0.25);
    assert_eq!(cfg.network.join_attempts, 5);
    assert_eq!(cfg.join_policy().interval, Duration::from_millis(200));
    assert!(cfg.network.offline);
    assert_eq!(cfg.display, DisplayMode::Plain);

    let api = cfg.api_config();
    assert_eq!(api.addr, "127.0.0.1:9000");
    assert_eq!(api.max_requests_per_turn, 2);

    clear_env();
}

#[test]
fn loads_toml_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = config_file(
        ".toml",
        r#"
[engine]
name = "STUB"
labels = ["none", "plug"]
background_labels = ["none"]

[scheduler]
yield_ms = 25
"#,
    );

    let cfg = VisionConfig::load_from(Some(file.path())).expect("load config");
    assert_eq!(cfg.engine.name, "stub");
    assert_eq!(cfg.engine.labels, vec!["none", "plug"]);
    assert_eq!(cfg.aggregator_config().background_labels, vec!["none"]);
    assert_eq!(cfg.scheduler.yield_interval, Duration::from_millis(25));
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    for body in [
        r#"{ "camera": { "width": 0 } }"#,
        r#"{ "engine": { "input_height": 0 } }"#,
        r#"{ "engine": { "labels": [] } }"#,
        r#"{ "engine": { "min_confidence": 1.5 } }"#,
        r#"{ "engine": { "mode": "segmentation" } }"#,
        r#"{ "network": { "join_attempts": 0 } }"#,
        r#"{ "http": { "max_requests_per_turn": 0 } }"#,
    ] {
        let file = config_file(".json", body);
        assert!(
            VisionConfig::load_from(Some(file.path())).is_err(),
            "accepted {}",
            body
        );
    }

    std::env::set_var("VISION_JOIN_ATTEMPTS", "many");
    assert!(VisionConfig::load().is_err());
    clear_env();
}

#[test]
fn missing_or_malformed_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    assert!(VisionConfig::load_from(Some(std::path::Path::new("/nonexistent/vision.json"))).is_err());
    let file = config_file(".json", "{ not json");
    assert!(VisionConfig::load_from(Some(file.path())).is_err());
}
