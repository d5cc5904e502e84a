use crate::status::CanonicalStatus;

/// Text rendering applied by `GetText` and change notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextFormat {
    #[default]
    Plain,
    KiloWattHour,
    Watt,
    Ampere,
    Volt,
    /// Victron `/StatusCode` rendered as its state label
    StatusCode,
    /// Integer rendered as lowercase hex without prefix (`/ProductId`)
    Hex,
}

pub(crate) fn format_text_value(val: &serde_json::Value) -> String {
    match val {
        serde_json::Value::Null => String::new(),
        serde_json::Value::Number(n) => {
            if n.is_f64() {
                n.as_f64().map_or_else(|| n.to_string(), |f| format!("{:.2}", f))
            } else {
                n.to_string()
            }
        }
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Bool(b) => b.to_string(),
        _ => val.to_string(),
    }
}

/// Render a value using the text format registered for its path
pub(crate) fn format_text(val: &serde_json::Value, format: TextFormat) -> String {
    let unit = |decimals: usize, unit: &str| match val.as_f64() {
        Some(f) => format!("{:.*} {}", decimals, f, unit),
        None => format_text_value(val),
    };
    match format {
        TextFormat::Plain => format_text_value(val),
        TextFormat::KiloWattHour => unit(2, "KWh"),
        TextFormat::Watt => unit(1, "W"),
        TextFormat::Ampere => unit(1, "A"),
        TextFormat::Volt => unit(1, "V"),
        TextFormat::StatusCode => val
            .as_i64()
            .and_then(CanonicalStatus::from_code)
            .map_or_else(|| format_text_value(val), |s| s.label()),
        TextFormat::Hex => val
            .as_u64()
            .map_or_else(|| format_text_value(val), |u| format!("{:x}", u)),
    }
}
