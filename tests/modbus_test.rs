use helios::config::ModbusConfig;
use helios::modbus::{
    ModbusClient, decode_i16, decode_string, decode_u32_lsw_first, registers, scale,
};

#[test]
fn modbus_client_starts_disconnected() {
    let cfg = ModbusConfig::default();
    let client = ModbusClient::new(&cfg);
    assert!(!client.is_connected());
}

#[test]
fn decode_i16_reinterprets_sign() {
    assert_eq!(decode_i16(0xFFFF), -1);
    assert_eq!(decode_i16(0x0064), 100);
}

#[test]
fn total_yield_is_low_word_first() {
    // 0x0001_86A0 = 100000 -> 10000.0 kWh at 0.1 kWh per count
    let regs = [0x86A0u16, 0x0001u16];
    let raw = decode_u32_lsw_first(&regs).unwrap();
    assert_eq!(raw, 100_000);
    assert_eq!(scale(raw, 0.1), 10_000.0);
    assert!(decode_u32_lsw_first(&regs[..1]).is_err());
}

#[test]
fn decode_string_strips_padding() {
    let regs = [0x5842u16, 0x3330u16, 0x3232u16, 0x0000u16];
    assert_eq!(decode_string(&regs).unwrap(), "XB3022");
}

#[test]
fn serial_register_window() {
    assert_eq!(registers::SERIAL_NUMBER, 0x0000);
    assert_eq!(registers::SERIAL_NUMBER_LEN, 7);
}

#[test]
fn modbus_config_defaults() {
    let c = ModbusConfig::default();
    assert_eq!(c.port, "/dev/ttyUSB0");
    assert_eq!(c.baud_rate, 9600);
    assert_eq!(c.slave_id, 1);
}

#[tokio::test]
async fn read_on_missing_port_fails_without_panicking() {
    let cfg = ModbusConfig {
        port: "/dev/helios-does-not-exist".to_string(),
        ..Default::default()
    };
    let mut client = ModbusClient::new(&cfg);
    let err = client.read_input_registers(0x0000, 3).await.unwrap_err();
    assert!(err.to_string().contains("Failed to open serial port"));
    assert!(err.is_tick_scoped());
    assert!(!client.is_connected());
}
