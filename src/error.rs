use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the HTTP layer itself. Business failures never end up
/// here; they are reported as `{"success": false}` bodies.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not Found")]
    NotFound,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
        };

        (
            status,
            [(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")],
            self.to_string(),
        )
            .into_response()
    }
}

/// Errors from the on-disk discoverability state store
#[derive(Error, Debug)]
pub enum StoreError {
    /// Another process or task currently holds the exclusive token
    #[error("discoverability lock is held elsewhere")]
    WouldBlock,

    #[error("state store I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.display().to_string(),
            source,
        }
    }

    pub fn is_contention(&self) -> bool {
        matches!(self, StoreError::WouldBlock)
    }
}

/// Errors from the system bus client
#[derive(Error, Debug)]
pub enum BusError {
    #[error("D-Bus connection failed: {0}")]
    Connection(#[source] zbus::Error),

    #[error("D-Bus call {call} failed: {source}")]
    Call {
        call: &'static str,
        #[source]
        source: zbus::Error,
    },

    #[error("D-Bus call {call} timed out after {timeout:?}")]
    Timeout { call: &'static str, timeout: Duration },
}

/// Errors from restarting system services
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("failed to run systemctl for {unit}: {source}")]
    Spawn {
        unit: String,
        #[source]
        source: std::io::Error,
    },

    #[error("restart of {unit} exited with {code:?}: {stderr}")]
    ExitStatus {
        unit: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("restart of {unit} timed out after {timeout:?}")]
    Timeout { unit: String, timeout: Duration },
}

/// Errors from the mixer volume controller
#[derive(Error, Debug)]
pub enum VolumeError {
    #[error("failed to run amixer: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("amixer exited with {code:?}: {stderr}")]
    ExitStatus { code: Option<i32>, stderr: String },

    #[error("could not find a volume percentage in amixer output")]
    Parse,

    #[error("volume percentage {0} is outside 0..=100")]
    OutOfRange(i64),

    #[error("amixer timed out after {0:?}")]
    Timeout(Duration),

    #[error("AirPlay volume update failed: {0}")]
    Bus(#[from] BusError),
}

/// Why an activation request did not make the radio discoverable
#[derive(Error, Debug)]
pub enum ActivationError {
    #[error("another discoverability change is already in flight")]
    Contended,

    #[error("service restart failed: {0}")]
    ServiceRestart(#[from] ServiceError),

    #[error("enabling discoverability failed: {0}")]
    Bus(#[from] BusError),

    #[error("discoverability state store failed: {0}")]
    Store(#[source] StoreError),
}

impl From<StoreError> for ActivationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::WouldBlock => ActivationError::Contended,
            other => ActivationError::Store(other),
        }
    }
}
