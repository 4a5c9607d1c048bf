use crate::{
    bus::airplay_volume_for_pct,
    error::{ActivationError, AppError},
    services::restart_all,
    state::AppState,
    volume::checked_vol_pct,
};
use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Player states in which shairport-sync is known to have a connected client
const ACTIVE_PLAYER_STATES: [&str; 2] = ["Playing", "Paused"];

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ReceiverData {
    pub vol_pct: Option<u8>,
    pub hostname: String,
    pub bt_discoverable: bool,
    pub bt_discoverable_since: Option<DateTime<Utc>>,
    pub shairport_sync_client_name: Option<String>,
    pub shairport_sync_player_state: Option<String>,
    pub success: bool,
}

#[derive(Debug, Deserialize)]
pub struct VolPctRequest {
    pub vol_pct: i64,
    #[serde(default)]
    pub set_airplay_client_vol: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct VolPctResponse {
    pub vol_pct: i64,
    pub success: bool,
}

fn json_response<T: Serialize>(body: T) -> Response {
    (
        StatusCode::OK,
        [(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")],
        Json(body),
    )
        .into_response()
}

pub async fn receiver_data(State(state): State<AppState>) -> Response {
    let mut success = true;

    let vol_pct = match state.volume.get_vol_pct().await {
        Ok(pct) => Some(pct),
        Err(e) => {
            warn!("Unable to read volume: {}", e);
            success = false;
            None
        }
    };

    let store = state.activation.store();
    let bt_discoverable_since = match store.activated_at() {
        Ok(at) => at.map(DateTime::<Utc>::from),
        Err(e) => {
            warn!("Unable to read discoverability marker: {}", e);
            success = false;
            None
        }
    };

    let (client_name, player_state) =
        tokio::join!(state.bus.client_name(), state.bus.player_state());

    // A "Stopped" player may or may not still have a client connected, so
    // only report the client while it is playing or paused.
    let (shairport_sync_client_name, shairport_sync_player_state) = match (client_name, player_state)
    {
        (Some(name), Some(player_state))
            if ACTIVE_PLAYER_STATES.contains(&player_state.as_str()) =>
        {
            (Some(name), Some(player_state))
        }
        _ => (None, None),
    };

    json_response(ReceiverData {
        vol_pct,
        hostname: state.hostname.to_string(),
        bt_discoverable: bt_discoverable_since.is_some(),
        bt_discoverable_since,
        shairport_sync_client_name,
        shairport_sync_player_state,
        success,
    })
}

pub async fn set_vol_pct(
    State(state): State<AppState>,
    Json(request): Json<VolPctRequest>,
) -> Response {
    let success = match apply_volume(&state, &request).await {
        Ok(()) => true,
        Err(e) => {
            warn!("Setting volume to {} failed: {}", request.vol_pct, e);
            false
        }
    };

    json_response(VolPctResponse {
        vol_pct: request.vol_pct,
        success,
    })
}

async fn apply_volume(
    state: &AppState,
    request: &VolPctRequest,
) -> Result<(), crate::error::VolumeError> {
    let vol_pct = checked_vol_pct(request.vol_pct)?;
    state.volume.set_vol_pct(vol_pct).await?;

    if request.set_airplay_client_vol {
        info!("Setting airplay client volume: {}.", vol_pct);
        state
            .bus
            .set_airplay_volume(airplay_volume_for_pct(vol_pct))
            .await?;
    }
    Ok(())
}

/// Runs the activation as its own task: a client hanging up must not cancel
/// the sequence between enabling the radio and writing the marker.
pub async fn make_bt_discoverable(State(state): State<AppState>) -> Response {
    let activation = state.activation.clone();
    let task = tokio::spawn(async move { activation.activate().await });

    let success = match task.await {
        Ok(Ok(())) => true,
        Ok(Err(ActivationError::Contended)) => {
            info!("Discoverability request rejected: another change is in flight");
            false
        }
        Ok(Err(e)) => {
            error!("Making bluetooth discoverable failed: {}", e);
            false
        }
        Err(e) => {
            error!("Discoverability task did not complete: {}", e);
            false
        }
    };

    json_response(SuccessResponse { success })
}

pub async fn disconnect_clients(State(state): State<AppState>) -> Response {
    info!("Disconnecting clients by restarting bluetooth and airplay services...");

    let units: Vec<String> = state
        .config
        .services
        .bluetooth_units
        .iter()
        .chain(std::iter::once(&state.config.services.airplay_unit))
        .cloned()
        .collect();

    let services = state.services.clone();
    let task = tokio::spawn(async move { restart_all(services.as_ref(), &units).await });

    let success = match task.await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            error!("Disconnecting clients failed: {}", e);
            false
        }
        Err(e) => {
            error!("Service restart task did not complete: {}", e);
            false
        }
    };

    json_response(SuccessResponse { success })
}

/// CORS preflight
pub async fn preflight() -> Response {
    (
        StatusCode::OK,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, OPTIONS"),
            (
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                "X-Requested-With, Content-Type",
            ),
        ],
    )
        .into_response()
}

/// Unrouted paths: preflight for OPTIONS, 404 otherwise
pub async fn fallback(method: Method) -> Result<Response, AppError> {
    if method == Method::OPTIONS {
        return Ok(preflight().await);
    }
    Err(AppError::NotFound)
}
