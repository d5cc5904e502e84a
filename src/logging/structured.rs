use tracing::{debug, error, info, trace, warn};

/// Context information for log messages
#[derive(Debug, Clone)]
pub struct LogContext {
    /// Component name (e.g., "driver", "cloud", "modbus")
    pub component: String,
    /// Active telemetry source, when the component is source-specific
    pub source: Option<String>,
    /// D-Bus device instance of the published inverter
    pub device_instance: Option<u32>,
    /// Additional context fields
    pub extra_fields: std::collections::BTreeMap<String, String>,
}

impl LogContext {
    /// Create a new log context
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
            source: None,
            device_instance: None,
            extra_fields: std::collections::BTreeMap::new(),
        }
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }

    pub fn with_device_instance(mut self, device_instance: u32) -> Self {
        self.device_instance = Some(device_instance);
        self
    }

    /// Add extra field
    pub fn with_field(mut self, key: &str, value: String) -> Self {
        self.extra_fields.insert(key.to_string(), value);
        self
    }
}

/// Structured logger with context
#[derive(Clone)]
pub struct StructuredLogger {
    pub(crate) context: LogContext,
}

impl StructuredLogger {
    pub fn new(context: LogContext) -> Self {
        Self { context }
    }

    pub fn info(&self, message: &str) {
        let fields = self.format_fields();
        info!(%fields, "{}", message);
    }
    pub fn warn(&self, message: &str) {
        let fields = self.format_fields();
        warn!(%fields, "{}", message);
    }
    pub fn error(&self, message: &str) {
        let fields = self.format_fields();
        error!(%fields, "{}", message);
    }
    pub fn debug(&self, message: &str) {
        let fields = self.format_fields();
        debug!(%fields, "{}", message);
    }
    pub fn trace(&self, message: &str) {
        let fields = self.format_fields();
        trace!(%fields, "{}", message);
    }

    /// Render the context as `key=value` pairs, component first
    pub fn format_fields(&self) -> String {
        let mut fields = vec![format!("component={}", self.context.component)];
        if let Some(ref source) = self.context.source {
            fields.push(format!("source={}", source));
        }
        if let Some(device_instance) = self.context.device_instance {
            fields.push(format!("device_instance={}", device_instance));
        }
        for (key, value) in &self.context.extra_fields {
            fields.push(format!("{}={}", key, value));
        }
        fields.join(",")
    }
}

/// Create a logger for a specific component
pub fn get_logger(component: &str) -> StructuredLogger {
    StructuredLogger::new(LogContext::new(component))
}

/// Create a logger with full context
pub fn get_logger_with_context(context: LogContext) -> StructuredLogger {
    StructuredLogger::new(context)
}
