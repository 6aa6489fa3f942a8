//! Backend liveness as reported by `GET /api/health`.

use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HealthStatus {
    Ok,
    Unavailable,
}

impl HealthStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Unavailable => "unavailable",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HealthReport {
    pub status: HealthStatus,
    /// Response body as received (`Null` when absent or not JSON).
    pub raw: Value,
}

impl HealthReport {
    /// Healthy only when `status` is a string equal to `"ok"`, ignoring case.
    pub fn from_body(raw: Value) -> Self {
        let healthy = raw
            .get("status")
            .and_then(Value::as_str)
            .is_some_and(|s| s.trim().eq_ignore_ascii_case("ok"));
        Self {
            status: if healthy {
                HealthStatus::Ok
            } else {
                HealthStatus::Unavailable
            },
            raw,
        }
    }

    pub fn unavailable(raw: Value) -> Self {
        Self {
            status: HealthStatus::Unavailable,
            raw,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == HealthStatus::Ok
    }
}
