use pmovideo::{
    DataLayout, ManualClock, MemoryFs, ProfileId, Settings, SignalChannel, SignalKind,
    VideoSyncService,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn create_channel(clock: &ManualClock) -> (TempDir, SignalChannel) {
    let temp_dir = tempfile::tempdir().unwrap();
    let channel = SignalChannel::new(
        DataLayout::new(temp_dir.path()),
        Arc::new(clock.clone()),
        Duration::from_secs(10),
    );
    (temp_dir, channel)
}

fn create_service(clock: &ManualClock) -> (TempDir, VideoSyncService) {
    let temp_dir = tempfile::tempdir().unwrap();
    let fs = Arc::new(MemoryFs::new());
    fs.add_dir("/v", 1, &["a.mp4"]);
    let settings = Settings::new(temp_dir.path(), vec!["/v".to_string()]);
    let service = VideoSyncService::with_backends(settings, fs, Arc::new(clock.clone()));
    (temp_dir, service)
}

#[test]
fn test_level_triggered_marker_is_never_cleared() {
    let clock = ManualClock::new(10_000);
    let (_temp_dir, channel) = create_channel(&clock);
    let profile = ProfileId::default_profile();

    assert_eq!(channel.check(&profile, SignalKind::Volume), 0);
    assert_eq!(channel.raise(&profile, SignalKind::Volume).unwrap(), 10_000);
    assert_eq!(channel.check(&profile, SignalKind::Volume), 10_000);
    assert_eq!(channel.check(&profile, SignalKind::Volume), 10_000);

    clock.advance(500);
    channel.raise(&profile, SignalKind::Volume).unwrap();
    assert_eq!(channel.check(&profile, SignalKind::Volume), 10_500);
    // Les autres types restent indépendants
    assert_eq!(channel.check(&profile, SignalKind::Mute), 0);
}

#[test]
fn test_edge_triggered_marker_is_consumed_once() {
    let clock = ManualClock::new(10_000);
    let (temp_dir, channel) = create_channel(&clock);
    let profile = ProfileId::from_dashboard_number(1);

    channel.raise(&profile, SignalKind::DashboardRefresh).unwrap();
    clock.advance(2_000);
    assert!(channel.consume_recent(&profile, SignalKind::DashboardRefresh).unwrap());
    assert!(!channel.consume_recent(&profile, SignalKind::DashboardRefresh).unwrap());

    let marker = DataLayout::new(temp_dir.path()).signal_path(&profile, "dashboard_refresh");
    assert!(!marker.exists());
}

#[test]
fn test_edge_triggered_marker_expires() {
    let clock = ManualClock::new(10_000);
    let (temp_dir, channel) = create_channel(&clock);
    let profile = ProfileId::default_profile();

    channel.raise(&profile, SignalKind::ConfigChange).unwrap();
    clock.advance(10_000);
    assert!(!channel.consume_recent(&profile, SignalKind::ConfigChange).unwrap());

    let marker = DataLayout::new(temp_dir.path()).signal_path(&profile, "config_change");
    assert!(!marker.exists());
}

#[test]
fn test_unreadable_marker_reads_as_zero() {
    let clock = ManualClock::new(10_000);
    let (temp_dir, channel) = create_channel(&clock);
    let profile = ProfileId::default_profile();
    let marker = DataLayout::new(temp_dir.path()).signal_path(&profile, "mute");
    std::fs::create_dir_all(marker.parent().unwrap()).unwrap();
    std::fs::write(&marker, "soon").unwrap();

    assert_eq!(channel.check(&profile, SignalKind::Mute), 0);
}

#[test]
fn test_service_raises_level_signals() {
    let clock = ManualClock::new(50_000);
    let (_temp_dir, service) = create_service(&clock);
    let profile = ProfileId::default_profile();

    assert_eq!(service.check_volume_signal(&profile), 0);
    service.set_volume(&profile, 70).unwrap();
    assert_eq!(service.check_volume_signal(&profile), 50_000);

    clock.advance(1);
    assert!(service.toggle_mute(&profile).unwrap());
    assert_eq!(service.check_mute_signal(&profile), 50_001);
    assert!(!service.toggle_mute(&profile).unwrap());
}

#[test]
fn test_dashboard_refresh_round_trip() {
    let clock = ManualClock::new(50_000);
    let (_temp_dir, service) = create_service(&clock);
    let profile = ProfileId::from_dashboard_number(4);

    assert!(!service.check_refresh_signal(&profile).unwrap());
    assert_eq!(service.trigger_dashboard_refresh(&profile).unwrap(), 50_000);
    assert_eq!(service.state(&profile).last_refresh_trigger, 50_000);

    clock.advance(3_000);
    assert!(service.check_refresh_signal(&profile).unwrap());
    assert!(!service.check_refresh_signal(&profile).unwrap());
}

#[test]
fn test_config_change_notification() {
    let clock = ManualClock::new(50_000);
    let (_temp_dir, service) = create_service(&clock);
    let profile = ProfileId::default_profile();
    let other = ProfileId::sanitize("other");

    service.notify_config_change(&profile).unwrap();
    assert!(!service.check_config_changes(&other).unwrap());
    assert!(service.check_config_changes(&profile).unwrap());
    assert!(!service.check_config_changes(&profile).unwrap());
}
