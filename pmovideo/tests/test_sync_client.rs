use async_trait::async_trait;
use pmovideo::sync::{
    BackoffPolicy, DisplaySink, LocalSource, PollOutcome, StateSource, SyncClient, SyncOptions,
};
use pmovideo::{
    CurrentVideo, Error, ManualClock, MemoryFs, PlaybackState, ProfileId, ProfileState, Result,
    Settings, SignalKind, VideoSyncService,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

#[derive(Default)]
struct FakeSource {
    state: Mutex<ProfileState>,
    volume_marker: Mutex<i64>,
    mute_marker: Mutex<i64>,
    fetches: AtomicUsize,
    offline: AtomicBool,
    delay: Option<Duration>,
}

impl FakeSource {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    fn set_video(&self, video: Option<CurrentVideo>) {
        self.state.lock().unwrap().current_video = video;
    }
}

#[async_trait]
impl StateSource for FakeSource {
    async fn fetch_state(&self, _profile: &ProfileId) -> Result<ProfileState> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::NotFound("server unreachable".to_string()));
        }
        Ok(self.state.lock().unwrap().clone())
    }

    async fn check_signal(&self, _profile: &ProfileId, kind: SignalKind) -> Result<i64> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::NotFound("server unreachable".to_string()));
        }
        Ok(match kind {
            SignalKind::Volume => *self.volume_marker.lock().unwrap(),
            SignalKind::Mute => *self.mute_marker.lock().unwrap(),
            _ => 0,
        })
    }
}

#[derive(Default)]
struct RecordingSink {
    loads: Vec<Option<CurrentVideo>>,
    playback: Vec<PlaybackState>,
    volumes: Vec<(u8, bool)>,
}

impl DisplaySink for RecordingSink {
    fn load_video(&mut self, video: Option<&CurrentVideo>) {
        self.loads.push(video.cloned());
    }

    fn apply_playback(&mut self, playback: PlaybackState) {
        self.playback.push(playback);
    }

    fn apply_volume(&mut self, volume: u8, muted: bool) {
        self.volumes.push((volume, muted));
    }
}

fn fast_options() -> SyncOptions {
    SyncOptions {
        state_interval: Duration::from_millis(10),
        signal_interval: Duration::from_millis(5),
        request_timeout: Duration::from_secs(1),
        backoff: BackoffPolicy {
            initial: Duration::from_millis(5),
            multiplier: 2.0,
            max: Duration::from_millis(20),
            max_failures: 3,
            cooldown: Duration::from_millis(30),
        },
    }
}

fn create_client(source: Arc<FakeSource>) -> SyncClient<Arc<FakeSource>, RecordingSink> {
    SyncClient::new(
        source,
        RecordingSink::default(),
        ProfileId::default_profile(),
        fast_options(),
    )
}

#[tokio::test]
async fn test_video_is_loaded_only_when_identity_changes() {
    let source = Arc::new(FakeSource::default());
    source.set_video(Some(CurrentVideo::new("a.mp4", 0)));
    let client = create_client(source.clone());

    assert_eq!(client.poll_state().await, PollOutcome::Applied { reloaded: true });
    assert_eq!(client.poll_state().await, PollOutcome::Applied { reloaded: false });

    // Même nom, autre répertoire : c'est une autre vidéo
    source.set_video(Some(CurrentVideo::new("a.mp4", 1)));
    assert_eq!(client.poll_state().await, PollOutcome::Applied { reloaded: true });

    source.set_video(None);
    assert_eq!(client.poll_state().await, PollOutcome::Applied { reloaded: true });
    assert_eq!(client.poll_state().await, PollOutcome::Applied { reloaded: false });

    client
        .with_sink(|sink| {
            assert_eq!(
                sink.loads,
                vec![
                    Some(CurrentVideo::new("a.mp4", 0)),
                    Some(CurrentVideo::new("a.mp4", 1)),
                    None,
                ]
            );
            // Lecture et volume sont réappliqués à chaque sondage
            assert_eq!(sink.playback.len(), 5);
            assert_eq!(sink.volumes.len(), 5);
        })
        .await;
}

#[tokio::test]
async fn test_playback_follows_state() {
    let source = Arc::new(FakeSource::default());
    let client = create_client(source.clone());

    client.poll_state().await;
    source.state.lock().unwrap().playback_state = PlaybackState::Play;
    client.poll_state().await;

    client
        .with_sink(|sink| {
            assert_eq!(sink.playback, vec![PlaybackState::Stop, PlaybackState::Play]);
        })
        .await;
}

#[tokio::test]
async fn test_overlapping_polls_are_skipped() {
    let source = Arc::new(FakeSource::with_delay(Duration::from_millis(100)));
    let client = create_client(source.clone());

    let (first, second) = tokio::join!(client.poll_state(), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        client.poll_state().await
    });

    assert_eq!(first, PollOutcome::Applied { reloaded: true });
    assert_eq!(second, PollOutcome::Skipped);
    assert_eq!(source.fetches.load(Ordering::SeqCst), 1);

    // Le verrou est relâché une fois la requête terminée
    assert_eq!(client.poll_state().await, PollOutcome::Applied { reloaded: false });
}

#[tokio::test]
async fn test_signal_poll_applies_volume_only_on_change() {
    let source = Arc::new(FakeSource::default());
    let client = create_client(source.clone());

    assert_eq!(client.poll_signals().await, PollOutcome::Unchanged);
    assert_eq!(source.fetches.load(Ordering::SeqCst), 0);

    {
        let mut state = source.state.lock().unwrap();
        state.volume = 80;
        state.muted = true;
    }
    *source.volume_marker.lock().unwrap() = 1_000;

    assert_eq!(client.poll_signals().await, PollOutcome::Applied { reloaded: false });
    assert_eq!(client.poll_signals().await, PollOutcome::Unchanged);

    *source.mute_marker.lock().unwrap() = 1_200;
    assert_eq!(client.poll_signals().await, PollOutcome::Applied { reloaded: false });

    client
        .with_sink(|sink| {
            assert_eq!(sink.volumes, vec![(80, true), (80, true)]);
            assert!(sink.loads.is_empty());
        })
        .await;
}

#[tokio::test]
async fn test_failures_are_reported() {
    let source = Arc::new(FakeSource::default());
    source.offline.store(true, Ordering::SeqCst);
    let client = create_client(source.clone());

    assert!(matches!(client.poll_state().await, PollOutcome::Failed(_)));
    assert!(matches!(client.poll_signals().await, PollOutcome::Failed(_)));
    client.with_sink(|sink| assert!(sink.loads.is_empty())).await;

    source.offline.store(false, Ordering::SeqCst);
    assert_eq!(client.poll_state().await, PollOutcome::Applied { reloaded: true });
}

#[tokio::test]
async fn test_slow_request_times_out() {
    let source = Arc::new(FakeSource::with_delay(Duration::from_millis(300)));
    let mut options = fast_options();
    options.request_timeout = Duration::from_millis(50);
    let client = SyncClient::new(
        source,
        RecordingSink::default(),
        ProfileId::default_profile(),
        options,
    );

    assert!(matches!(client.poll_state().await, PollOutcome::Failed(_)));
}

#[tokio::test]
async fn test_run_until_shutdown() {
    let source = Arc::new(FakeSource::default());
    source.set_video(Some(CurrentVideo::new("loop.mp4", 0)));
    let client = create_client(source.clone());
    let (tx, rx) = watch::channel(false);

    tokio::join!(client.run(rx), async {
        tokio::time::sleep(Duration::from_millis(60)).await;
        tx.send(true).unwrap();
    });

    assert!(source.fetches.load(Ordering::SeqCst) >= 2);
    client
        .with_sink(|sink| {
            assert_eq!(sink.loads, vec![Some(CurrentVideo::new("loop.mp4", 0))]);
        })
        .await;
}

#[tokio::test]
async fn test_run_survives_outage() {
    let source = Arc::new(FakeSource::default());
    source.offline.store(true, Ordering::SeqCst);
    let client = create_client(source.clone());
    let (tx, rx) = watch::channel(false);

    tokio::join!(client.run(rx), async {
        tokio::time::sleep(Duration::from_millis(40)).await;
        source.offline.store(false, Ordering::SeqCst);
        // Au pire : pause de 30 ms puis un intervalle de 10 ms
        tokio::time::sleep(Duration::from_millis(150)).await;
        tx.send(true).unwrap();
    });

    client.with_sink(|sink| assert_eq!(sink.loads, vec![None])).await;
}

#[tokio::test]
async fn test_local_source_end_to_end() {
    let temp_dir = tempfile::tempdir().unwrap();
    let fs = Arc::new(MemoryFs::new());
    fs.add_dir("/v", 1, &["a.mp4"]);
    let clock = ManualClock::new(5_000);
    let settings = Settings::new(temp_dir.path(), vec!["/v".to_string()]);
    let service = Arc::new(VideoSyncService::with_backends(settings, fs, Arc::new(clock.clone())));
    let profile = ProfileId::from_dashboard_number(1);

    let client = SyncClient::new(
        LocalSource::new(service.clone()),
        RecordingSink::default(),
        profile.clone(),
        fast_options(),
    );

    service.set_current_video(&profile, "a.mp4", 0).unwrap();
    service.play(&profile).unwrap();
    assert_eq!(client.poll_state().await, PollOutcome::Applied { reloaded: true });

    clock.advance(100);
    service.set_volume(&profile, 25).unwrap();
    assert_eq!(client.poll_signals().await, PollOutcome::Applied { reloaded: false });
    assert_eq!(client.poll_signals().await, PollOutcome::Unchanged);

    client
        .with_sink(|sink| {
            assert_eq!(sink.loads, vec![Some(CurrentVideo::new("a.mp4", 0))]);
            assert_eq!(sink.playback, vec![PlaybackState::Play]);
            assert_eq!(sink.volumes.last(), Some(&(25, false)));
        })
        .await;
}

#[test]
fn test_local_source_reads_signal_markers() {
    let temp_dir = tempfile::tempdir().unwrap();
    let fs = Arc::new(MemoryFs::new());
    fs.add_dir("/v", 1, &[]);
    let settings = Settings::new(temp_dir.path(), vec!["/v".to_string()]);
    let clock = ManualClock::new(7_000);
    let service = Arc::new(VideoSyncService::with_backends(settings, fs, Arc::new(clock)));
    let profile = ProfileId::default_profile();
    let source = LocalSource::new(service.clone());

    tokio_test::block_on(async {
        let before = tokio_test::assert_ok!(source.check_signal(&profile, SignalKind::Mute).await);
        assert_eq!(before, 0);

        service.toggle_mute(&profile).unwrap();
        let after = tokio_test::assert_ok!(source.check_signal(&profile, SignalKind::Mute).await);
        assert_eq!(after, 7_000);

        let state = tokio_test::assert_ok!(source.fetch_state(&profile).await);
        assert!(state.muted);
    });
}
