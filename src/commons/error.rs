//! Defines all crypto manager errors.

use std::{error, fmt};
use crate::api::kmip::ClusterId;
use crate::api::status::{ErrorResponse, FaultCategory};


//------------ ErrorKind -----------------------------------------------------

/// The kinds of failures that cross the crypto manager boundary.
///
/// Several [`Error`] variants may map onto the same kind. Callers that only
/// care about what went wrong, not about the details, match on this.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    InvalidClusterId,
    InvalidServerName,
    AlreadyRegistered,
    NoDefaultProvider,
    NativeProviderUnsupported,
    Internal,
}


//------------ Error ---------------------------------------------------------

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Error {
    //-----------------------------------------------------------------
    // Provider Issues (1000-1099)
    //-----------------------------------------------------------------

    // 1000
    InvalidClusterId(ClusterId),

    // 1001
    ClusterAlreadyRegistered(ClusterId),

    // 1002
    NoDefaultProvider,

    //-----------------------------------------------------------------
    // Server Issues (1100-1199)
    //-----------------------------------------------------------------

    // 1100
    InvalidServerName(ClusterId, String),

    // 1101
    ServerAlreadyRegistered(ClusterId, String),

    //-----------------------------------------------------------------
    // Key Issues (1200-1299)
    //-----------------------------------------------------------------

    // 1200
    NativeProviderUnsupported(ClusterId),

    //-----------------------------------------------------------------
    // System Issues (1900-1999)
    //-----------------------------------------------------------------

    // 1900
    TaskFailed(String),

    // 1999
    Custom(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::InvalidClusterId(cluster) => {
                write!(f, "Invalid cluster ID '{}'", cluster)
            }
            Error::ClusterAlreadyRegistered(cluster) => {
                write!(f, "Cluster '{}' is already registered", cluster)
            }
            Error::NoDefaultProvider => write!(f, "No default provider"),
            Error::InvalidServerName(cluster, server) => {
                write!(
                    f, "Invalid server name '{}' for cluster '{}'",
                    server, cluster
                )
            }
            Error::ServerAlreadyRegistered(cluster, server) => {
                write!(
                    f, "Server '{}' is already registered for cluster '{}'",
                    server, cluster
                )
            }
            Error::NativeProviderUnsupported(cluster) => {
                write!(
                    f,
                    "Cannot generate keys with native key provider '{}'",
                    cluster
                )
            }
            Error::TaskFailed(msg) => write!(f, "Task failed: {}", msg),
            Error::Custom(msg) => f.write_str(msg),
        }
    }
}

impl error::Error for Error { }

impl Error {
    pub fn custom(msg: impl fmt::Display) -> Self {
        Error::Custom(msg.to_string())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidClusterId(_) => ErrorKind::InvalidClusterId,
            Error::ClusterAlreadyRegistered(_)
            | Error::ServerAlreadyRegistered(..) => {
                ErrorKind::AlreadyRegistered
            }
            Error::NoDefaultProvider => ErrorKind::NoDefaultProvider,
            Error::InvalidServerName(..) => ErrorKind::InvalidServerName,
            Error::NativeProviderUnsupported(_) => {
                ErrorKind::NativeProviderUnsupported
            }
            Error::TaskFailed(_) | Error::Custom(_) => ErrorKind::Internal,
        }
    }

    /// Turns the error into the fault returned to callers.
    pub fn to_error_response(&self) -> ErrorResponse {
        match self {
            // 1000
            Error::InvalidClusterId(cluster) => {
                ErrorResponse::runtime("kmip-cluster-unknown", self)
                    .with_cluster(cluster)
            }

            // 1001
            Error::ClusterAlreadyRegistered(cluster) => {
                ErrorResponse::runtime("kmip-cluster-duplicate", self)
                    .with_cluster(cluster)
            }

            // 1002
            Error::NoDefaultProvider => {
                ErrorResponse::runtime("kmip-no-default-provider", self)
            }

            // 1100
            Error::InvalidServerName(cluster, server) => {
                ErrorResponse::runtime("kmip-server-unknown", self)
                    .with_cluster(cluster)
                    .with_server(server)
            }

            // 1101
            Error::ServerAlreadyRegistered(cluster, server) => {
                ErrorResponse::runtime("kmip-server-duplicate", self)
                    .with_cluster(cluster)
                    .with_server(server)
            }

            // 1200
            Error::NativeProviderUnsupported(cluster) => {
                ErrorResponse::runtime("kmip-native-provider", self)
                    .with_cluster(cluster)
            }

            // 1900
            Error::TaskFailed(msg) => {
                ErrorResponse::new(
                    FaultCategory::SystemError, "sys-task-failed", self
                ).with_cause(msg)
            }

            // 1999
            Error::Custom(_) => {
                ErrorResponse::new(
                    FaultCategory::SystemError, "general-error", self
                )
            }
        }
    }
}


//============ Tests =========================================================
