#![cfg(feature = "pmoconfig")]

use pmovideo::{ConsistencyMode, VideoConfigExt};
use std::time::Duration;

fn load_config(yaml: &str) -> (tempfile::TempDir, pmoconfig::Config) {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("config.yaml"), yaml).unwrap();
    let config = pmoconfig::Config::load_config(dir.path().to_str().unwrap()).unwrap();
    (dir, config)
}

#[test]
fn test_settings_from_defaults() {
    let (dir, config) = load_config("");
    let settings = config.video_settings().unwrap();

    assert_eq!(settings.data_dir, dir.path().join("data"));
    assert!(settings.data_dir.is_dir());
    assert!(settings.video_directories.is_empty());
    assert_eq!(
        settings.default_video_directory.as_deref(),
        Some(dir.path().join("videos").to_str().unwrap())
    );
    assert_eq!(settings.max_items, 10_000);
    assert_eq!(settings.page_size, 50);
    assert_eq!(settings.consistency, ConsistencyMode::LastWriterWins);
    assert_eq!(settings.signal_window, Duration::from_secs(10));
}

#[test]
fn test_settings_from_user_file() {
    let (dir, config) = load_config(
        "videos:\n  directories:\n    - /srv/videos\n    - local\n  extensions: [.MP4]\n\
         catalog:\n  page_size: 20\n\
         sync:\n  consistency: compare_and_swap\n  signal_window_secs: 4\n",
    );
    let settings = config.video_settings().unwrap();

    assert_eq!(
        settings.video_directories,
        vec![
            "/srv/videos".to_string(),
            dir.path().join("local").to_string_lossy().to_string(),
        ]
    );
    assert_eq!(settings.extensions, vec!["mp4".to_string()]);
    assert_eq!(settings.page_size, 20);
    assert_eq!(settings.consistency, ConsistencyMode::CompareAndSwap);
    assert_eq!(settings.signal_window, Duration::from_secs(4));
}

#[test]
fn test_unknown_consistency_falls_back() {
    let (_dir, config) = load_config("sync:\n  consistency: eventually\n");
    assert_eq!(config.video_consistency(), ConsistencyMode::LastWriterWins);
}

#[test]
fn test_sync_options() {
    let (_dir, config) = load_config(
        "sync:\n  state_poll_ms: 1500\n  signal_poll_ms: 200\n  \
         max_failures: 2\n  cooldown_secs: 9\n",
    );
    let options = config.video_sync_options();

    assert_eq!(options.state_interval, Duration::from_millis(1500));
    assert_eq!(options.signal_interval, Duration::from_millis(200));
    assert_eq!(options.backoff.max_failures, 2);
    assert_eq!(options.backoff.cooldown, Duration::from_secs(9));
    assert_eq!(options.backoff.initial, Duration::from_millis(500));
    assert_eq!(options.backoff.max, Duration::from_secs(30));
}
