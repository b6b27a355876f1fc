use std::path::PathBuf;

use super::validation::validate_config;
use super::*;

fn write_config(dir: &std::path::Path, content: &str) -> PathBuf {
    let path = dir.join("odometr.toml");
    std::fs::write(&path, content).unwrap();
    path
}

fn base_config() -> Config {
    Config {
        rider_id: "rider-1".to_string(),
        ..Config::default()
    }
}

#[test]
fn test_minimal_file_gets_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "rider_id = \"rider-7\"\n");

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.rider_id, "rider-7");
    assert_eq!(config.provider, ProviderChoice::Auto);
    assert_eq!(
        config.foreground_interval_secs,
        crate::constants::DEFAULT_FOREGROUND_INTERVAL_SECS
    );
    assert_eq!(
        config.foreground_timeout_ms,
        crate::constants::FOREGROUND_TIMEOUT_MS
    );
    assert_eq!(
        config.min_distance_meters,
        crate::constants::DEFAULT_MIN_DISTANCE_METERS
    );
}

#[test]
fn test_full_file_round_trips_every_field() {
    let dir = tempfile::tempdir().unwrap();
    let replay = dir.path().join("route.json");
    std::fs::write(&replay, "[]").unwrap();
    let path = write_config(
        dir.path(),
        &format!(
            "rider_id = \"rider-7\"\n\
             provider = \"replay\"\n\
             replay_path = \"{}\"\n\
             foreground_interval_secs = 30\n\
             foreground_timeout_ms = 5000\n\
             background_timeout_ms = 30000\n\
             min_distance_meters = 25\n",
            replay.display()
        ),
    );

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.provider, ProviderChoice::Replay);
    assert_eq!(config.replay_path.as_deref(), Some(replay.as_path()));
    assert_eq!(config.foreground_interval_secs, 30);
    assert_eq!(config.foreground_timeout_ms, 5000);
    assert_eq!(config.background_timeout_ms, 30000);
    assert_eq!(config.min_distance_meters, 25);
}

#[test]
fn test_missing_rider_id_is_rejected() {
    let config = Config::default();
    assert!(validate_config(&config).is_err());

    let blank = Config {
        rider_id: "   ".to_string(),
        ..Config::default()
    };
    assert!(validate_config(&blank).is_err());
}

#[test]
fn test_interval_range_is_enforced() {
    let mut config = base_config();
    config.foreground_interval_secs = 4;
    assert!(validate_config(&config).is_err());

    config.foreground_interval_secs = 301;
    assert!(validate_config(&config).is_err());

    config.foreground_interval_secs = 5;
    assert!(validate_config(&config).is_ok());
    config.foreground_interval_secs = 300;
    assert!(validate_config(&config).is_ok());
}

#[test]
fn test_timeout_ranges_are_enforced() {
    let mut config = base_config();
    config.foreground_timeout_ms = 999;
    assert!(validate_config(&config).is_err());

    config.foreground_timeout_ms = 60_001;
    assert!(validate_config(&config).is_err());

    config.foreground_timeout_ms = 8_000;
    config.background_timeout_ms = 120_001;
    assert!(validate_config(&config).is_err());

    config.background_timeout_ms = 120_000;
    assert!(validate_config(&config).is_ok());
}

#[test]
fn test_distance_ceiling_is_enforced() {
    let mut config = base_config();
    config.min_distance_meters = 501;
    assert!(validate_config(&config).is_err());

    config.min_distance_meters = 0;
    assert!(validate_config(&config).is_ok());
}

#[test]
fn test_replay_provider_requires_replay_path() {
    let mut config = base_config();
    config.provider = ProviderChoice::Replay;
    assert!(validate_config(&config).is_err());
}

#[test]
fn test_replay_path_must_exist() {
    let mut config = base_config();
    config.provider = ProviderChoice::Replay;
    config.replay_path = Some(PathBuf::from("/nonexistent/route.json"));
    assert!(validate_config(&config).is_err());
}

#[test]
fn test_unparseable_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "rider_id = [not toml");
    assert!(load_from_path(&path).is_err());
}

#[test]
fn test_unknown_provider_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        dir.path(),
        "rider_id = \"r\"\nprovider = \"carrier-pigeon\"\n",
    );
    assert!(load_from_path(&path).is_err());
}

#[test]
fn test_default_config_file_parses_after_setting_rider() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("odometr.toml");
    create_default_config(&path).unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    let filled = content.replace("rider_id = \"\"", "rider_id = \"rider-1\"");
    std::fs::write(&path, filled).unwrap();

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.rider_id, "rider-1");
    assert_eq!(config.provider, ProviderChoice::Auto);
}

#[test]
fn test_acquire_tuning_mirrors_config() {
    let mut config = base_config();
    config.foreground_timeout_ms = 3_000;
    config.background_timeout_ms = 40_000;
    config.min_distance_meters = 42;

    let tuning = config.acquire_tuning();
    assert_eq!(tuning.foreground_timeout_ms, 3_000);
    assert_eq!(tuning.background_timeout_ms, 40_000);
    assert_eq!(tuning.min_distance_meters, 42);
}
