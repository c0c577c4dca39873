//! Origin response bodies

use serde::Deserialize;

/// Error body the catalog origin sends with non-2xx responses, and
/// occasionally with a 200.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusBody {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub status_code: Option<i64>,
    #[serde(default)]
    pub status_message: Option<String>,
}

impl StatusBody {
    /// Whether the body explicitly reports failure.
    pub fn is_failure(&self) -> bool {
        self.success == Some(false)
    }

    pub fn describe(&self) -> String {
        match (&self.status_code, &self.status_message) {
            (Some(code), Some(message)) => format!("{} (code {})", message, code),
            (None, Some(message)) => message.clone(),
            (Some(code), None) => format!("code {}", code),
            (None, None) => "no status message".to_string(),
        }
    }
}
