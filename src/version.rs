// Version information for the anemia eye service

/// Full version string with feature description
pub const VERSION: &str = "v1.0.0-anemia-eye-2025-10-20";

/// Semantic version number
pub const VERSION_NUMBER: &str = env!("CARGO_PKG_VERSION");

/// Build date
pub const BUILD_DATE: &str = "2025-10-20";

/// Supported features in this version
pub const FEATURES: &[&str] = &[
    "eye-presence-gate",
    "anemia-classifier",
    "gcs-upload",
    "firestore-history",
    "local-storage",
];

/// Get formatted version string for logging
pub fn get_version_string() -> String {
    format!("Anemia Eye Service {} ({})", VERSION_NUMBER, BUILD_DATE)
}

/// Get full version info for API responses
pub fn get_version_info() -> serde_json::Value {
    serde_json::json!({
        "version": VERSION_NUMBER,
        "build": VERSION,
        "date": BUILD_DATE,
        "features": FEATURES,
    })
}
