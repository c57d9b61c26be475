//! Documentation OpenAPI de l'API vidéo

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::get_current,
        crate::api::set_current,
        crate::api::clear_current,
        crate::api::play,
        crate::api::pause,
        crate::api::stop,
        crate::api::get_playback,
        crate::api::get_volume,
        crate::api::set_volume,
        crate::api::get_mute,
        crate::api::toggle_mute,
        crate::api::get_loop,
        crate::api::set_loop,
        crate::api::get_play_all,
        crate::api::set_play_all,
        crate::api::get_external_audio,
        crate::api::set_external_audio,
        crate::api::get_next,
        crate::api::move_video,
        crate::api::list_catalog,
        crate::api::get_state,
        crate::api::signal_config,
        crate::api::signal_refresh,
        crate::api::signal_volume,
        crate::api::signal_mute,
        crate::api::trigger_refresh,
        crate::api::list_profiles,
        crate::api::delete_profile,
    ),
    components(
        schemas(
            crate::profile::CurrentVideo,
            crate::profile::PlaybackState,
            crate::profile::ProfileState,
            crate::profile::Toggle,
            crate::service::CatalogEntry,
            crate::service::CatalogPage,
            crate::api::SetCurrentVideoRequest,
            crate::api::VolumeRequest,
            crate::api::ModeRequest,
            crate::api::MoveRequest,
            crate::api::CurrentVideoResponse,
            crate::api::PlaybackResponse,
            crate::api::VolumeResponse,
            crate::api::MuteResponse,
            crate::api::ModeResponse,
            crate::api::NextVideoResponse,
            crate::api::OrderResponse,
            crate::api::SignalResponse,
            crate::api::RefreshResponse,
            crate::api::ProfilesResponse,
            crate::api::DeleteProfileResponse,
            crate::api::ErrorResponse,
        )
    ),
    tags(
        (name = "video", description = "Contrôle de la lecture et du catalogue par profil"),
        (name = "signals", description = "Marqueurs de changement sondés par les écrans"),
        (name = "profiles", description = "Administration des profils")
    ),
    info(
        title = "PMOVideo API",
        version = "0.1.0",
        description = r#"
# Synchronisation des écrans vidéo

Chaque profil (`?d=<n>` ou `?profile=<nom>`) porte un état de contrôle
partagé par le dashboard et l'écran :
- vidéo courante `{filename, dirIndex}`
- état de lecture `play` / `pause` / `stop`
- volume 0-100 et muet
- modes boucle, lecture enchaînée, audio externe

Les écrans sondent `/state` toutes les 3 s et `/signals/volume|mute`
toutes les 400 ms ; l'ordre du catalogue est propre à chaque profil.
        "#,
        license(
            name = "MIT",
        ),
    )
)]
pub struct ApiDoc;
