use super::*;

impl Default for InverterConfig {
    fn default() -> Self {
        Self {
            device_instance: 23,
            position: 0,
            max_power: 5000.0,
            grid_voltage: 230.0,
            serial: None,
            product_name: "Solax X1".to_string(),
        }
    }
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://www.solaxcloud.com/proxyApp/proxy/api/getRealtimeInfo.do"
                .to_string(),
            token_id: String::new(),
            registration_number: String::new(),
            timeout_seconds: 10,
            min_fetch_interval_seconds: MIN_CLOUD_FETCH_INTERVAL_SECS,
        }
    }
}

impl Default for ModbusConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
            slave_id: 1,
            timeout_ms: 1000,
            max_trackers: 3,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            console_level: None,
            file_level: None,
            file: "/tmp/helios.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut phases = IndexMap::new();
        phases.insert("phase1".to_string(), "L1".to_string());
        Self {
            source: SourceKind::Cloud,
            inverter: InverterConfig::default(),
            phases,
            cloud: CloudConfig::default(),
            modbus: ModbusConfig::default(),
            logging: LoggingConfig::default(),
            poll_interval_ms: 500,
            sign_of_life_minutes: 10,
        }
    }
}
