//! Per-user settings document stored alongside the user row

/// Default settings document seeded when an account is created
pub fn default_settings() -> serde_json::Value {
    serde_json::json!({
        "export": {
            "lastExportedAt": null,
        },
        "notification": {
            "reminder": {
                "enabled": false,
                "timing": {
                    "type": "daily",
                    "time": "09:00",
                    "dayOfWeek": null,
                    "dayOfMonth": null,
                },
                "targetEvents": "week",
            },
        },
        "misc": {
            "showTutorial": true,
        },
    })
}
