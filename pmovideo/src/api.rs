//! API REST de contrôle des écrans vidéo
//!
//! Toutes les routes acceptent `?d=<n>` ou `?profile=<nom>` pour choisir
//! le profil (un nom explicite l'emporte). Le travail disque est déporté
//! sur le pool bloquant de tokio.

use crate::profile::{CurrentVideo, PlaybackState, ProfileId, ProfileState, Toggle};
use crate::service::{CatalogEntry, CatalogPage, VideoSyncService};
use crate::signal::SignalKind;
use crate::Error;
use axum::{
    extract::{FromRequest, FromRequestParts, Path, Query, Request, State},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::sync::Arc;
use tracing::error;
use utoipa::{IntoParams, ToSchema};

type SharedService = Arc<VideoSyncService>;

/// Router à monter sous `/api/video`
pub fn video_api_router(service: SharedService) -> Router {
    Router::new()
        .route("/current", get(get_current).post(set_current).delete(clear_current))
        .route("/play", post(play))
        .route("/pause", post(pause))
        .route("/stop", post(stop))
        .route("/playback", get(get_playback))
        .route("/volume", get(get_volume).post(set_volume))
        .route("/mute", get(get_mute))
        .route("/mute/toggle", post(toggle_mute))
        .route("/loop", get(get_loop).post(set_loop))
        .route("/play-all", get(get_play_all).post(set_play_all))
        .route("/external-audio", get(get_external_audio).post(set_external_audio))
        .route("/next", get(get_next))
        .route("/move", post(move_video))
        .route("/catalog", get(list_catalog))
        .route("/state", get(get_state))
        .route("/signals/config", get(signal_config))
        .route("/signals/refresh", get(signal_refresh))
        .route("/signals/volume", get(signal_volume))
        .route("/signals/mute", get(signal_mute))
        .route("/refresh", post(trigger_refresh))
        .route("/profiles", get(list_profiles))
        .route("/profiles/{id}", delete(delete_profile))
        .with_state(service)
}

/// Sélection du profil
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProfileQuery {
    /// Numéro de dashboard (`0` → `default`, `n` → `dashboard{n}`)
    pub d: Option<i64>,
    /// Nom de profil explicite, filtré sur `[A-Za-z0-9_-]`
    pub profile: Option<String>,
}

impl ProfileQuery {
    fn resolve(&self) -> ProfileId {
        VideoSyncService::resolve_profile(self.d, self.profile.as_deref())
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    /// Page (à partir de 1)
    pub page: Option<i64>,
    /// Taille de page (1 à 500)
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SetCurrentVideoRequest {
    #[schema(example = "intro.mp4")]
    pub filename: String,
    #[serde(default)]
    pub dir_index: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VolumeRequest {
    #[schema(example = 65)]
    pub volume: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ModeRequest {
    #[schema(example = "on")]
    pub mode: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    pub filename: String,
    #[serde(default)]
    pub dir_index: i64,
    #[schema(example = "up")]
    pub direction: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CurrentVideoResponse {
    pub current_video: Option<CurrentVideo>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackResponse {
    pub playback_state: PlaybackState,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VolumeResponse {
    pub volume: u8,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MuteResponse {
    pub muted: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ModeResponse {
    pub mode: Toggle,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NextVideoResponse {
    pub video: Option<CatalogEntry>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    pub order: Vec<String>,
}

/// État d'un marqueur de signal
#[derive(Debug, Serialize, ToSchema)]
pub struct SignalResponse {
    pub signal: String,
    /// Horodatage du marqueur (ms Unix), 0 s'il est absent
    pub timestamp: i64,
    /// Pour les signaux sur front : vrai si le marqueur était récent (il est alors consommé)
    pub triggered: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RefreshResponse {
    pub timestamp: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProfilesResponse {
    pub profiles: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteProfileResponse {
    pub profile: String,
    pub deleted: bool,
}

/// Réponse d'erreur REST générique.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    #[schema(example = "VALIDATION")]
    pub error: String,
    pub message: String,
}

fn map_error(error: Error) -> Response {
    let (status, code) = match &error {
        Error::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION"),
        Error::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        Error::Conflict { .. } => (StatusCode::CONFLICT, "CONFLICT"),
        Error::Io { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
        Error::Serialization(_) => (StatusCode::INTERNAL_SERVER_ERROR, "SERIALIZATION_ERROR"),
        Error::ScanFailed(_) | Error::Other(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
        }
    };
    if status.is_server_error() {
        error!("Video API error: {}", error);
    }

    (
        status,
        Json(ErrorResponse {
            error: code.to_string(),
            message: error.to_string(),
        }),
    )
        .into_response()
}

/// `Query` dont le rejet suit le format d'erreur de l'API
pub struct ApiQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Query::<T>::from_request_parts(parts, state)
            .await
            .map(|Query(value)| ApiQuery(value))
            .map_err(|rejection| map_error(Error::validation(rejection.body_text())))
    }
}

/// `Json` dont le rejet suit le format d'erreur de l'API
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Json::<T>::from_request(req, state)
            .await
            .map(|Json(value)| ApiJson(value))
            .map_err(|rejection| map_error(Error::validation(rejection.body_text())))
    }
}

/// Exécute `f` sur le pool bloquant et sérialise le résultat
async fn run<T, F>(service: SharedService, f: F) -> Response
where
    T: Serialize + Send + 'static,
    F: FnOnce(&VideoSyncService) -> crate::Result<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(move || f(&service)).await {
        Ok(Ok(value)) => (StatusCode::OK, Json(value)).into_response(),
        Ok(Err(e)) => map_error(e),
        Err(e) => map_error(Error::Other(anyhow::anyhow!("request task failed: {e}"))),
    }
}

// --- Vidéo courante ---

#[utoipa::path(
    get,
    path = "/api/video/current",
    tag = "video",
    params(ProfileQuery),
    responses((status = 200, description = "Vidéo courante du profil", body = CurrentVideoResponse))
)]
pub async fn get_current(
    State(service): State<SharedService>,
    ApiQuery(q): ApiQuery<ProfileQuery>,
) -> Response {
    let profile = q.resolve();
    run(service, move |s| {
        Ok(CurrentVideoResponse {
            current_video: s.current_video(&profile),
        })
    })
    .await
}

#[utoipa::path(
    post,
    path = "/api/video/current",
    tag = "video",
    params(ProfileQuery),
    request_body = SetCurrentVideoRequest,
    responses(
        (status = 200, description = "Vidéo sélectionnée", body = CurrentVideoResponse),
        (status = 400, description = "Nom de fichier invalide", body = ErrorResponse)
    )
)]
pub async fn set_current(
    State(service): State<SharedService>,
    ApiQuery(q): ApiQuery<ProfileQuery>,
    ApiJson(req): ApiJson<SetCurrentVideoRequest>,
) -> Response {
    let profile = q.resolve();
    run(service, move |s| {
        let video = s.set_current_video(&profile, &req.filename, req.dir_index)?;
        Ok(CurrentVideoResponse {
            current_video: Some(video),
        })
    })
    .await
}

#[utoipa::path(
    delete,
    path = "/api/video/current",
    tag = "video",
    params(ProfileQuery),
    responses((status = 200, description = "Vidéo courante effacée", body = CurrentVideoResponse))
)]
pub async fn clear_current(
    State(service): State<SharedService>,
    ApiQuery(q): ApiQuery<ProfileQuery>,
) -> Response {
    let profile = q.resolve();
    run(service, move |s| {
        s.clear_current_video(&profile)?;
        Ok(CurrentVideoResponse { current_video: None })
    })
    .await
}

// --- Lecture ---

async fn set_playback(service: SharedService, q: ProfileQuery, state: PlaybackState) -> Response {
    let profile = q.resolve();
    run(service, move |s| {
        Ok(PlaybackResponse {
            playback_state: s.set_playback(&profile, state)?,
        })
    })
    .await
}

#[utoipa::path(
    post,
    path = "/api/video/play",
    tag = "video",
    params(ProfileQuery),
    responses((status = 200, description = "Lecture demandée", body = PlaybackResponse))
)]
pub async fn play(
    State(service): State<SharedService>,
    ApiQuery(q): ApiQuery<ProfileQuery>,
) -> Response {
    set_playback(service, q, PlaybackState::Play).await
}

#[utoipa::path(
    post,
    path = "/api/video/pause",
    tag = "video",
    params(ProfileQuery),
    responses((status = 200, description = "Pause demandée", body = PlaybackResponse))
)]
pub async fn pause(
    State(service): State<SharedService>,
    ApiQuery(q): ApiQuery<ProfileQuery>,
) -> Response {
    set_playback(service, q, PlaybackState::Pause).await
}

#[utoipa::path(
    post,
    path = "/api/video/stop",
    tag = "video",
    params(ProfileQuery),
    responses((status = 200, description = "Arrêt demandé", body = PlaybackResponse))
)]
pub async fn stop(
    State(service): State<SharedService>,
    ApiQuery(q): ApiQuery<ProfileQuery>,
) -> Response {
    set_playback(service, q, PlaybackState::Stop).await
}

#[utoipa::path(
    get,
    path = "/api/video/playback",
    tag = "video",
    params(ProfileQuery),
    responses((status = 200, description = "État de lecture", body = PlaybackResponse))
)]
pub async fn get_playback(
    State(service): State<SharedService>,
    ApiQuery(q): ApiQuery<ProfileQuery>,
) -> Response {
    let profile = q.resolve();
    run(service, move |s| {
        Ok(PlaybackResponse {
            playback_state: s.playback_state(&profile),
        })
    })
    .await
}

// --- Volume et muet ---

#[utoipa::path(
    get,
    path = "/api/video/volume",
    tag = "video",
    params(ProfileQuery),
    responses((status = 200, description = "Volume (0-100)", body = VolumeResponse))
)]
pub async fn get_volume(
    State(service): State<SharedService>,
    ApiQuery(q): ApiQuery<ProfileQuery>,
) -> Response {
    let profile = q.resolve();
    run(service, move |s| Ok(VolumeResponse { volume: s.volume(&profile) })).await
}

#[utoipa::path(
    post,
    path = "/api/video/volume",
    tag = "video",
    params(ProfileQuery),
    request_body = VolumeRequest,
    responses(
        (status = 200, description = "Volume appliqué (borné à 0-100)", body = VolumeResponse)
    )
)]
pub async fn set_volume(
    State(service): State<SharedService>,
    ApiQuery(q): ApiQuery<ProfileQuery>,
    ApiJson(req): ApiJson<VolumeRequest>,
) -> Response {
    let profile = q.resolve();
    run(service, move |s| {
        Ok(VolumeResponse {
            volume: s.set_volume(&profile, req.volume)?,
        })
    })
    .await
}

#[utoipa::path(
    get,
    path = "/api/video/mute",
    tag = "video",
    params(ProfileQuery),
    responses((status = 200, description = "État du muet", body = MuteResponse))
)]
pub async fn get_mute(
    State(service): State<SharedService>,
    ApiQuery(q): ApiQuery<ProfileQuery>,
) -> Response {
    let profile = q.resolve();
    run(service, move |s| Ok(MuteResponse { muted: s.muted(&profile) })).await
}

#[utoipa::path(
    post,
    path = "/api/video/mute/toggle",
    tag = "video",
    params(ProfileQuery),
    responses((status = 200, description = "Nouvel état du muet", body = MuteResponse))
)]
pub async fn toggle_mute(
    State(service): State<SharedService>,
    ApiQuery(q): ApiQuery<ProfileQuery>,
) -> Response {
    let profile = q.resolve();
    run(service, move |s| {
        Ok(MuteResponse {
            muted: s.toggle_mute(&profile)?,
        })
    })
    .await
}

// --- Modes ---

#[derive(Debug, Clone, Copy)]
enum ModeField {
    Loop,
    PlayAll,
    ExternalAudio,
}

async fn read_mode(service: SharedService, q: ProfileQuery, field: ModeField) -> Response {
    let profile = q.resolve();
    run(service, move |s| {
        let mode = match field {
            ModeField::Loop => s.loop_mode(&profile),
            ModeField::PlayAll => s.play_all_mode(&profile),
            ModeField::ExternalAudio => s.external_audio_mode(&profile),
        };
        Ok(ModeResponse { mode })
    })
    .await
}

async fn write_mode(
    service: SharedService,
    q: ProfileQuery,
    field: ModeField,
    req: ModeRequest,
) -> Response {
    let profile = q.resolve();
    run(service, move |s| {
        let mode: Toggle = req.mode.parse()?;
        let mode = match field {
            ModeField::Loop => s.set_loop_mode(&profile, mode)?,
            ModeField::PlayAll => s.set_play_all_mode(&profile, mode)?,
            ModeField::ExternalAudio => s.set_external_audio_mode(&profile, mode)?,
        };
        Ok(ModeResponse { mode })
    })
    .await
}

#[utoipa::path(
    get,
    path = "/api/video/loop",
    tag = "video",
    params(ProfileQuery),
    responses((status = 200, description = "Mode boucle", body = ModeResponse))
)]
pub async fn get_loop(
    State(service): State<SharedService>,
    ApiQuery(q): ApiQuery<ProfileQuery>,
) -> Response {
    read_mode(service, q, ModeField::Loop).await
}

#[utoipa::path(
    post,
    path = "/api/video/loop",
    tag = "video",
    params(ProfileQuery),
    request_body = ModeRequest,
    responses(
        (status = 200, description = "Mode boucle appliqué", body = ModeResponse),
        (status = 400, description = "Valeur autre que on/off", body = ErrorResponse)
    )
)]
pub async fn set_loop(
    State(service): State<SharedService>,
    ApiQuery(q): ApiQuery<ProfileQuery>,
    ApiJson(req): ApiJson<ModeRequest>,
) -> Response {
    write_mode(service, q, ModeField::Loop, req).await
}

#[utoipa::path(
    get,
    path = "/api/video/play-all",
    tag = "video",
    params(ProfileQuery),
    responses((status = 200, description = "Mode lecture enchaînée", body = ModeResponse))
)]
pub async fn get_play_all(
    State(service): State<SharedService>,
    ApiQuery(q): ApiQuery<ProfileQuery>,
) -> Response {
    read_mode(service, q, ModeField::PlayAll).await
}

#[utoipa::path(
    post,
    path = "/api/video/play-all",
    tag = "video",
    params(ProfileQuery),
    request_body = ModeRequest,
    responses(
        (status = 200, description = "Mode lecture enchaînée appliqué", body = ModeResponse),
        (status = 400, description = "Valeur autre que on/off", body = ErrorResponse)
    )
)]
pub async fn set_play_all(
    State(service): State<SharedService>,
    ApiQuery(q): ApiQuery<ProfileQuery>,
    ApiJson(req): ApiJson<ModeRequest>,
) -> Response {
    write_mode(service, q, ModeField::PlayAll, req).await
}

#[utoipa::path(
    get,
    path = "/api/video/external-audio",
    tag = "video",
    params(ProfileQuery),
    responses((status = 200, description = "Mode audio externe", body = ModeResponse))
)]
pub async fn get_external_audio(
    State(service): State<SharedService>,
    ApiQuery(q): ApiQuery<ProfileQuery>,
) -> Response {
    read_mode(service, q, ModeField::ExternalAudio).await
}

#[utoipa::path(
    post,
    path = "/api/video/external-audio",
    tag = "video",
    params(ProfileQuery),
    request_body = ModeRequest,
    responses(
        (status = 200, description = "Mode audio externe appliqué", body = ModeResponse),
        (status = 400, description = "Valeur autre que on/off", body = ErrorResponse)
    )
)]
pub async fn set_external_audio(
    State(service): State<SharedService>,
    ApiQuery(q): ApiQuery<ProfileQuery>,
    ApiJson(req): ApiJson<ModeRequest>,
) -> Response {
    write_mode(service, q, ModeField::ExternalAudio, req).await
}

// --- Catalogue et ordre ---

#[utoipa::path(
    get,
    path = "/api/video/next",
    tag = "video",
    params(ProfileQuery),
    responses(
        (status = 200, description = "Vidéo suivante dans l'ordre du profil", body = NextVideoResponse)
    )
)]
pub async fn get_next(
    State(service): State<SharedService>,
    ApiQuery(q): ApiQuery<ProfileQuery>,
) -> Response {
    let profile = q.resolve();
    run(service, move |s| Ok(NextVideoResponse { video: s.next_video(&profile) })).await
}

#[utoipa::path(
    post,
    path = "/api/video/move",
    tag = "video",
    params(ProfileQuery),
    request_body = MoveRequest,
    responses(
        (status = 200, description = "Nouvel ordre", body = OrderResponse),
        (status = 400, description = "Paramètre invalide", body = ErrorResponse),
        (status = 404, description = "Vidéo absente de l'ordre", body = ErrorResponse)
    )
)]
pub async fn move_video(
    State(service): State<SharedService>,
    ApiQuery(q): ApiQuery<ProfileQuery>,
    ApiJson(req): ApiJson<MoveRequest>,
) -> Response {
    let profile = q.resolve();
    run(service, move |s| {
        let order = s.move_video(&profile, &req.filename, req.dir_index, &req.direction)?;
        Ok(OrderResponse { order })
    })
    .await
}

#[utoipa::path(
    get,
    path = "/api/video/catalog",
    tag = "video",
    params(ProfileQuery, PageQuery),
    responses(
        (status = 200, description = "Page du catalogue dans l'ordre du profil", body = CatalogPage)
    )
)]
pub async fn list_catalog(
    State(service): State<SharedService>,
    ApiQuery(q): ApiQuery<ProfileQuery>,
    ApiQuery(page): ApiQuery<PageQuery>,
) -> Response {
    let profile = q.resolve();
    run(service, move |s| Ok(s.list_catalog(&profile, page.page, page.limit))).await
}

#[utoipa::path(
    get,
    path = "/api/video/state",
    tag = "video",
    params(ProfileQuery),
    responses((status = 200, description = "État complet du profil", body = ProfileState))
)]
pub async fn get_state(
    State(service): State<SharedService>,
    ApiQuery(q): ApiQuery<ProfileQuery>,
) -> Response {
    let profile = q.resolve();
    run(service, move |s| Ok(s.state(&profile))).await
}

// --- Signaux ---

async fn check_signal(service: SharedService, q: ProfileQuery, kind: SignalKind) -> Response {
    let profile = q.resolve();
    run(service, move |s| {
        let timestamp = s.signal_marker(&profile, kind);
        let triggered = match kind {
            SignalKind::DashboardRefresh => s.check_refresh_signal(&profile)?,
            SignalKind::ConfigChange => s.check_config_changes(&profile)?,
            SignalKind::Volume | SignalKind::Mute => timestamp > 0,
        };
        Ok(SignalResponse {
            signal: kind.to_string(),
            timestamp,
            triggered,
        })
    })
    .await
}

#[utoipa::path(
    get,
    path = "/api/video/signals/config",
    tag = "signals",
    params(ProfileQuery),
    responses(
        (status = 200, description = "Changement de configuration récent (consommé)", body = SignalResponse)
    )
)]
pub async fn signal_config(
    State(service): State<SharedService>,
    ApiQuery(q): ApiQuery<ProfileQuery>,
) -> Response {
    check_signal(service, q, SignalKind::ConfigChange).await
}

#[utoipa::path(
    get,
    path = "/api/video/signals/refresh",
    tag = "signals",
    params(ProfileQuery),
    responses(
        (status = 200, description = "Demande de rafraîchissement récente (consommée)", body = SignalResponse)
    )
)]
pub async fn signal_refresh(
    State(service): State<SharedService>,
    ApiQuery(q): ApiQuery<ProfileQuery>,
) -> Response {
    check_signal(service, q, SignalKind::DashboardRefresh).await
}

#[utoipa::path(
    get,
    path = "/api/video/signals/volume",
    tag = "signals",
    params(ProfileQuery),
    responses((status = 200, description = "Dernier changement de volume", body = SignalResponse))
)]
pub async fn signal_volume(
    State(service): State<SharedService>,
    ApiQuery(q): ApiQuery<ProfileQuery>,
) -> Response {
    check_signal(service, q, SignalKind::Volume).await
}

#[utoipa::path(
    get,
    path = "/api/video/signals/mute",
    tag = "signals",
    params(ProfileQuery),
    responses((status = 200, description = "Dernier changement du muet", body = SignalResponse))
)]
pub async fn signal_mute(
    State(service): State<SharedService>,
    ApiQuery(q): ApiQuery<ProfileQuery>,
) -> Response {
    check_signal(service, q, SignalKind::Mute).await
}

#[utoipa::path(
    post,
    path = "/api/video/refresh",
    tag = "signals",
    params(ProfileQuery),
    responses(
        (status = 200, description = "Rafraîchissement des dashboards demandé", body = RefreshResponse)
    )
)]
pub async fn trigger_refresh(
    State(service): State<SharedService>,
    ApiQuery(q): ApiQuery<ProfileQuery>,
) -> Response {
    let profile = q.resolve();
    run(service, move |s| {
        Ok(RefreshResponse {
            timestamp: s.trigger_dashboard_refresh(&profile)?,
        })
    })
    .await
}

// --- Administration ---

#[utoipa::path(
    get,
    path = "/api/video/profiles",
    tag = "profiles",
    responses((status = 200, description = "Profils présents sur disque", body = ProfilesResponse))
)]
pub async fn list_profiles(State(service): State<SharedService>) -> Response {
    run(service, |s| {
        let profiles = s.list_profiles()?.into_iter().map(|p| p.to_string()).collect();
        Ok(ProfilesResponse { profiles })
    })
    .await
}

#[utoipa::path(
    delete,
    path = "/api/video/profiles/{id}",
    tag = "profiles",
    params(("id" = String, Path, description = "Nom du profil")),
    responses(
        (status = 200, description = "Profil supprimé (ou déjà absent)", body = DeleteProfileResponse)
    )
)]
pub async fn delete_profile(
    State(service): State<SharedService>,
    Path(id): Path<String>,
) -> Response {
    let profile = ProfileId::sanitize(&id);
    run(service, move |s| {
        let deleted = s.delete_profile(&profile)?;
        Ok(DeleteProfileResponse {
            profile: profile.to_string(),
            deleted,
        })
    })
    .await
}
