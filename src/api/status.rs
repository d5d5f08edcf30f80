//! Error reporting.

use std::fmt;
use std::collections::HashMap;
use serde::{Deserialize, Serialize};


//------------ FaultCategory -------------------------------------------------

/// The declared fault a failed operation is reported as.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum FaultCategory {
    RuntimeFault,
    InvalidArgument,
    SystemError,
}

impl fmt::Display for FaultCategory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            FaultCategory::RuntimeFault => "RuntimeFault",
            FaultCategory::InvalidArgument => "InvalidArgument",
            FaultCategory::SystemError => "SystemError",
        })
    }
}


//------------ ErrorResponse -------------------------------------------------

/// A fault as returned across the crypto manager boundary.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ErrorResponse {
    /// The declared fault.
    pub category: FaultCategory,

    /// The error label.
    pub label: String,

    /// The human readable error message.
    pub msg: String,

    /// Arguments with details about the error.
    pub args: HashMap<String, String>,
}

impl ErrorResponse {
    pub fn new(
        category: FaultCategory, label: &str, msg: impl fmt::Display
    ) -> Self {
        ErrorResponse {
            category,
            label: label.to_string(),
            msg: msg.to_string(),
            args: HashMap::new(),
        }
    }

    /// Creates a runtime fault, the category every registry error uses.
    pub fn runtime(label: &str, msg: impl fmt::Display) -> Self {
        Self::new(FaultCategory::RuntimeFault, label, msg)
    }

    pub fn with_arg(mut self, key: &str, value: impl fmt::Display) -> Self {
        self.args.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_cause(self, cause: impl fmt::Display) -> Self {
        self.with_arg("cause", cause)
    }

    pub fn with_cluster(self, cluster: impl fmt::Display) -> Self {
        self.with_arg("cluster", cluster)
    }

    pub fn with_server(self, server: impl fmt::Display) -> Self {
        self.with_arg("server", server)
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match serde_json::to_string(&self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{}: {}", self.category, self.msg),
        }
    }
}
