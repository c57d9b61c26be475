//! Boucle de synchronisation d'un écran
//!
//! Deux canaux indépendants : l'état complet à intervalle lent, les
//! signaux volume/muet à intervalle rapide. Chaque canal n'a jamais plus
//! d'une requête en vol, recule exponentiellement sur erreur et marque
//! une pause longue après trop d'échecs consécutifs.

use super::backoff::{Backoff, BackoffPolicy, RetryDelay};
use super::gate::PollGate;
use crate::profile::{CurrentVideo, PlaybackState, ProfileId, ProfileState};
use crate::service::VideoSyncService;
use crate::signal::SignalKind;
use crate::{Error, Result};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

const STATE_INTERVAL: Duration = Duration::from_millis(3000);
const SIGNAL_INTERVAL: Duration = Duration::from_millis(400);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Origine de l'état d'un profil (service local ou API distante)
#[async_trait]
pub trait StateSource: Send + Sync {
    async fn fetch_state(&self, profile: &ProfileId) -> Result<ProfileState>;

    /// Horodatage du marqueur `kind`, 0 s'il est absent
    async fn check_signal(&self, profile: &ProfileId, kind: SignalKind) -> Result<i64>;
}

#[async_trait]
impl<T: StateSource + ?Sized> StateSource for Arc<T> {
    async fn fetch_state(&self, profile: &ProfileId) -> Result<ProfileState> {
        (**self).fetch_state(profile).await
    }

    async fn check_signal(&self, profile: &ProfileId, kind: SignalKind) -> Result<i64> {
        (**self).check_signal(profile, kind).await
    }
}

/// Lecteur piloté par la boucle de synchronisation
pub trait DisplaySink: Send {
    /// Charge (ou décharge si `None`) une vidéo ; coûteux
    fn load_video(&mut self, video: Option<&CurrentVideo>);

    fn apply_playback(&mut self, playback: PlaybackState);

    fn apply_volume(&mut self, volume: u8, muted: bool);
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub state_interval: Duration,
    pub signal_interval: Duration,
    pub request_timeout: Duration,
    pub backoff: BackoffPolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            state_interval: STATE_INTERVAL,
            signal_interval: SIGNAL_INTERVAL,
            request_timeout: REQUEST_TIMEOUT,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Résultat d'un sondage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// État appliqué ; `reloaded` si la vidéo a été (re)chargée
    Applied { reloaded: bool },
    /// Aucun signal n'a bougé
    Unchanged,
    /// Un sondage du même canal était déjà en vol
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone, Copy)]
enum Channel {
    State,
    Signals,
}

struct ClientState<D> {
    sink: D,
    // None tant que rien n'a été chargé
    loaded: Option<Option<CurrentVideo>>,
    seen_volume: i64,
    seen_mute: i64,
}

impl<D: DisplaySink> ClientState<D> {
    fn apply(&mut self, state: &ProfileState) -> bool {
        let reload = self.loaded.as_ref() != Some(&state.current_video);
        if reload {
            self.sink.load_video(state.current_video.as_ref());
            self.loaded = Some(state.current_video.clone());
        }
        self.sink.apply_playback(state.playback_state);
        self.sink.apply_volume(state.volume, state.muted);
        reload
    }
}

pub struct SyncClient<S, D> {
    source: S,
    profile: ProfileId,
    options: SyncOptions,
    inner: Mutex<ClientState<D>>,
    state_gate: PollGate,
    signal_gate: PollGate,
}

impl<S: StateSource, D: DisplaySink> SyncClient<S, D> {
    pub fn new(source: S, sink: D, profile: ProfileId, options: SyncOptions) -> Self {
        Self {
            source,
            profile,
            options,
            inner: Mutex::new(ClientState {
                sink,
                loaded: None,
                seen_volume: 0,
                seen_mute: 0,
            }),
            state_gate: PollGate::new(),
            signal_gate: PollGate::new(),
        }
    }

    pub fn profile(&self) -> &ProfileId {
        &self.profile
    }

    /// Accès au lecteur (inspection, tests)
    pub async fn with_sink<R>(&self, f: impl FnOnce(&D) -> R) -> R {
        let inner = self.inner.lock().await;
        f(&inner.sink)
    }

    async fn call<T>(
        &self,
        request: impl Future<Output = Result<T>>,
    ) -> std::result::Result<T, String> {
        match tokio::time::timeout(self.options.request_timeout, request).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("request timed out after {:?}", self.options.request_timeout)),
        }
    }

    /// Sondage de l'état complet
    pub async fn poll_state(&self) -> PollOutcome {
        let Some(_permit) = self.state_gate.try_acquire() else {
            debug!(profile = %self.profile, "State poll still in flight, skipping");
            return PollOutcome::Skipped;
        };

        let state = match self.call(self.source.fetch_state(&self.profile)).await {
            Ok(state) => state,
            Err(reason) => return PollOutcome::Failed(reason),
        };

        let reloaded = self.inner.lock().await.apply(&state);
        if reloaded {
            debug!(profile = %self.profile, video = ?state.current_video, "Video loaded");
        }
        PollOutcome::Applied { reloaded }
    }

    /// Sondage rapide des signaux volume et muet
    pub async fn poll_signals(&self) -> PollOutcome {
        let Some(_permit) = self.signal_gate.try_acquire() else {
            return PollOutcome::Skipped;
        };

        let volume_check = self.source.check_signal(&self.profile, SignalKind::Volume);
        let volume = match self.call(volume_check).await {
            Ok(ts) => ts,
            Err(reason) => return PollOutcome::Failed(reason),
        };
        let mute_check = self.source.check_signal(&self.profile, SignalKind::Mute);
        let mute = match self.call(mute_check).await {
            Ok(ts) => ts,
            Err(reason) => return PollOutcome::Failed(reason),
        };

        {
            let inner = self.inner.lock().await;
            if volume <= inner.seen_volume && mute <= inner.seen_mute {
                return PollOutcome::Unchanged;
            }
        }

        let state = match self.call(self.source.fetch_state(&self.profile)).await {
            Ok(state) => state,
            Err(reason) => return PollOutcome::Failed(reason),
        };

        let mut inner = self.inner.lock().await;
        inner.sink.apply_volume(state.volume, state.muted);
        inner.seen_volume = inner.seen_volume.max(volume);
        inner.seen_mute = inner.seen_mute.max(mute);
        PollOutcome::Applied { reloaded: false }
    }

    /// Fait tourner les deux canaux jusqu'à ce que `shutdown` passe à vrai
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        info!(profile = %self.profile, "🎬 Display sync started");
        tokio::join!(
            self.channel_loop(Channel::State, shutdown.clone()),
            self.channel_loop(Channel::Signals, shutdown),
        );
        info!(profile = %self.profile, "Display sync stopped");
    }

    async fn channel_loop(&self, channel: Channel, mut shutdown: watch::Receiver<bool>) {
        let period = match channel {
            Channel::State => self.options.state_interval,
            Channel::Signals => self.options.signal_interval,
        };
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut backoff = Backoff::new(self.options.backoff.clone());

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = wait_for_shutdown(&mut shutdown) => break,
            }

            let outcome = match channel {
                Channel::State => self.poll_state().await,
                Channel::Signals => self.poll_signals().await,
            };

            match outcome {
                PollOutcome::Failed(reason) => {
                    let delay = backoff.record_failure();
                    match delay {
                        RetryDelay::Backoff(d) => {
                            warn!(
                                profile = %self.profile,
                                ?channel,
                                delay = ?d,
                                "Poll failed: {}", reason
                            )
                        }
                        RetryDelay::Cooldown(d) => {
                            warn!(
                                profile = %self.profile,
                                ?channel,
                                cooldown = ?d,
                                "Too many failures, pausing: {}", reason
                            )
                        }
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(delay.duration()) => {}
                        _ = wait_for_shutdown(&mut shutdown) => break,
                    }
                    ticker.reset();
                }
                PollOutcome::Skipped => {}
                PollOutcome::Applied { .. } | PollOutcome::Unchanged => backoff.reset(),
            }
        }
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Source adossée à un service dans le même processus
#[derive(Clone)]
pub struct LocalSource {
    service: Arc<VideoSyncService>,
}

impl LocalSource {
    pub fn new(service: Arc<VideoSyncService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl StateSource for LocalSource {
    async fn fetch_state(&self, profile: &ProfileId) -> Result<ProfileState> {
        let service = self.service.clone();
        let profile = profile.clone();
        tokio::task::spawn_blocking(move || service.state(&profile))
            .await
            .map_err(|e| Error::Other(anyhow::anyhow!("state task failed: {e}")))
    }

    async fn check_signal(&self, profile: &ProfileId, kind: SignalKind) -> Result<i64> {
        let service = self.service.clone();
        let profile = profile.clone();
        tokio::task::spawn_blocking(move || service.signal_marker(&profile, kind))
            .await
            .map_err(|e| Error::Other(anyhow::anyhow!("signal task failed: {e}")))
    }
}
