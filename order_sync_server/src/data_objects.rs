use std::fmt::Display;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

/// Query string of the authorization-code callback redirect.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub code: String,
    #[serde(default)]
    pub state: Option<String>,
}

/// Body of the metrics job trigger. Defaults: today, daily.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsJobParams {
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub period_type: Option<String>,
}
