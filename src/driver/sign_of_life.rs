use chrono::{DateTime, Utc};

use super::runtime_poll::ActiveSource;

fn fmt_time(t: Option<DateTime<Utc>>) -> String {
    t.map_or_else(|| "never".to_string(), |t| t.to_rfc3339())
}

impl super::InverterDriver {
    /// Lines of the periodic sign-of-life log
    pub(crate) fn sign_of_life_lines(&self) -> Vec<String> {
        let stats = self.source.stats();
        let mut lines = vec![
            "--- Start: sign of life ---".to_string(),
            format!("Last update: {}", fmt_time(self.last_tick)),
            format!(
                "Last {} fetch: {} ({} ok, {} failed)",
                self.source.kind().as_str(),
                fmt_time(stats.last_success),
                stats.successes,
                stats.failures
            ),
        ];
        if let Some(err) = &stats.last_error {
            lines.push(format!("Last error: {}", err));
        }
        if let ActiveSource::Cloud(cloud) = &self.source {
            let power = cloud.cached().map_or(0.0, |r| r.ac_power);
            lines.push(format!("Last '/Ac/Power' (Cloud): {}", power));
        }
        let published = self
            .dbus
            .value(crate::topology::AC_POWER)
            .unwrap_or(serde_json::Value::Null);
        lines.push(format!("Last '/Ac/Power': {}", published));
        lines.push("--- End: sign of life ---".to_string());
        lines
    }

    pub(crate) fn log_sign_of_life(&self) {
        for line in self.sign_of_life_lines() {
            self.logger.info(&line);
        }
    }
}
