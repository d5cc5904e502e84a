//! Modbus RTU field-bus source for SolaX inverters
//!
//! This module provides the RS-485 link to the inverter ([`ModbusClient`]),
//! the SolaX register map ([`SolaxRtuTransport`]) behind the
//! [`FieldBusTransport`] seam, and [`FieldBusSource`], which assembles one
//! [`RawFieldBusReading`] per tick including runtime tracker discovery.

use crate::config::ModbusConfig;
use crate::error::{HeliosError, Result};
use crate::logging::{StructuredLogger, get_logger};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::timeout;
use tokio_modbus::client::rtu;
use tokio_modbus::prelude::*;

/// SolaX input/holding register addresses
pub mod registers {
    /// Single-phase grid voltage, current, power
    pub const SINGLE_PHASE_BLOCK: u16 = 0x0000;
    /// First three-phase block (R); S and T follow every 4 registers
    pub const THREE_PHASE_BLOCK: u16 = 0x006A;
    pub const THREE_PHASE_STRIDE: u16 = 4;

    pub const PV1_VOLTAGE: u16 = 0x0003;
    pub const PV2_VOLTAGE: u16 = 0x0004;
    pub const PV1_CURRENT: u16 = 0x0005;
    pub const PV2_CURRENT: u16 = 0x0006;
    pub const PV1_POWER: u16 = 0x000A;
    pub const PV2_POWER: u16 = 0x000B;
    /// PV3 voltage, current, power
    pub const PV3_BLOCK: u16 = 0x0124;

    pub const RUN_MODE: u16 = 0x0009;
    pub const YIELD_TODAY: u16 = 0x0050;
    /// 32-bit, low word first
    pub const TOTAL_YIELD: u16 = 0x0052;

    /// Holding registers with the ASCII serial number
    pub const SERIAL_NUMBER: u16 = 0x0000;
    pub const SERIAL_NUMBER_LEN: u16 = 7;
}

/// Highest tracker index with a known register layout
pub const MAX_SUPPORTED_TRACKERS: usize = 3;

/// AC output of one phase
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PhaseReading {
    pub power: f64,
    pub current: f64,
    pub voltage: f64,
}

/// DC input of one MPPT tracker
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrackerReading {
    pub power: f64,
    pub current: f64,
    pub voltage: f64,
}

/// Energy counters and run mode
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InverterCounters {
    /// kWh
    pub total_yield: f64,
    /// kWh
    pub yield_today: f64,
    pub run_mode: u16,
}

/// One complete field-bus fetch
#[derive(Debug, Clone, PartialEq)]
pub struct RawFieldBusReading {
    /// One entry per configured phase, in configured order
    pub phases: Vec<PhaseReading>,
    /// One entry per discovered tracker, tracker 1 first
    pub trackers: Vec<TrackerReading>,
    pub total_yield: f64,
    pub yield_today: f64,
    pub run_mode: u16,
    pub fetched_at: DateTime<Utc>,
}

/// Register-level access to the inverter
#[async_trait::async_trait]
pub trait FieldBusTransport: Send {
    /// Read AC output of field-bus phase `phase` (the N of its `phase<N>`
    /// key) with `phase_count` phases configured
    async fn read_phase(&mut self, phase: usize, phase_count: usize) -> Result<PhaseReading>;

    /// Read tracker `tracker` (1-based); `None` when the tracker does not exist
    async fn read_tracker(&mut self, tracker: usize) -> Result<Option<TrackerReading>>;

    async fn read_counters(&mut self) -> Result<InverterCounters>;

    async fn read_serial(&mut self) -> Result<String>;
}

/// Lazily connected Modbus RTU client
pub struct ModbusClient {
    client: Option<tokio_modbus::client::Context>,
    config: ModbusConfig,
    operation_timeout: Duration,
    logger: StructuredLogger,
}

impl ModbusClient {
    pub fn new(config: &ModbusConfig) -> Self {
        Self {
            client: None,
            config: config.clone(),
            operation_timeout: Duration::from_millis(config.timeout_ms.max(1)),
            logger: get_logger("modbus"),
        }
    }

    /// Open the serial port and attach to the configured slave
    pub async fn connect(&mut self) -> Result<()> {
        self.logger.info(&format!(
            "Opening {} at {} baud (slave {})",
            self.config.port, self.config.baud_rate, self.config.slave_id
        ));
        let builder = tokio_serial::new(&self.config.port, self.config.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .timeout(self.operation_timeout);
        let port = tokio_serial::SerialStream::open(&builder).map_err(|e| {
            let msg = format!("Failed to open serial port {}: {}", self.config.port, e);
            self.logger.error(&msg);
            HeliosError::device(msg)
        })?;
        self.client = Some(rtu::attach_slave(port, Slave(self.config.slave_id)));
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if self.client.take().is_some() {
            self.logger.info("Closing serial link");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    /// Read input registers; a Modbus exception yields `Ok(None)`
    pub async fn try_read_input_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Option<Vec<u16>>> {
        self.read(RegisterKind::Input, address, count).await
    }

    /// Read input registers; a Modbus exception is a device error
    pub async fn read_input_registers(&mut self, address: u16, count: u16) -> Result<Vec<u16>> {
        self.read(RegisterKind::Input, address, count)
            .await?
            .ok_or_else(|| exception_error(address))
    }

    pub async fn read_holding_registers(&mut self, address: u16, count: u16) -> Result<Vec<u16>> {
        self.read(RegisterKind::Holding, address, count)
            .await?
            .ok_or_else(|| exception_error(address))
    }

    async fn read(
        &mut self,
        kind: RegisterKind,
        address: u16,
        count: u16,
    ) -> Result<Option<Vec<u16>>> {
        if !self.is_connected() {
            self.connect().await?;
        }
        let timeout_duration = self.operation_timeout;
        self.logger.trace(&format!(
            "Reading {} {:?} registers from 0x{:04X}",
            count, kind, address
        ));

        let client = self
            .client
            .as_mut()
            .ok_or_else(|| HeliosError::device("Not connected to Modbus device"))?;
        let outcome = match kind {
            RegisterKind::Input => {
                timeout(timeout_duration, client.read_input_registers(address, count)).await
            }
            RegisterKind::Holding => {
                timeout(timeout_duration, client.read_holding_registers(address, count)).await
            }
        };

        match outcome {
            Ok(Ok(Ok(words))) => {
                if words.len() < usize::from(count) {
                    return Err(HeliosError::device(format!(
                        "Short read at 0x{:04X}: expected {} registers, got {}",
                        address,
                        count,
                        words.len()
                    )));
                }
                Ok(Some(words))
            }
            Ok(Ok(Err(exception))) => {
                self.logger.debug(&format!(
                    "Modbus exception at 0x{:04X}: {:?}",
                    address, exception
                ));
                Ok(None)
            }
            Ok(Err(e)) => {
                // Drop the link so the next tick reopens the port
                self.disconnect();
                Err(HeliosError::device(format!(
                    "Failed to read registers at 0x{:04X}: {}",
                    address, e
                )))
            }
            Err(_) => {
                self.disconnect();
                Err(HeliosError::device(format!(
                    "Read at 0x{:04X} timed out after {} ms",
                    address,
                    timeout_duration.as_millis()
                )))
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum RegisterKind {
    Input,
    Holding,
}

fn exception_error(address: u16) -> HeliosError {
    HeliosError::device(format!("Modbus exception reading 0x{:04X}", address))
}

/// Reinterpret a register as a signed 16-bit value
pub fn decode_i16(register: u16) -> i16 {
    register as i16
}

/// Decode an unsigned 32-bit value stored low word first
pub fn decode_u32_lsw_first(registers: &[u16]) -> Result<u32> {
    if registers.len() < 2 {
        return Err(HeliosError::device(
            "Insufficient registers for 32-bit value",
        ));
    }
    Ok((u32::from(registers[1]) << 16) | u32::from(registers[0]))
}

/// Decode an ASCII string, two characters per register, high byte first
pub fn decode_string(registers: &[u16]) -> Result<String> {
    let bytes: Vec<u8> = registers.iter().flat_map(|r| r.to_be_bytes()).collect();
    let string = String::from_utf8(bytes)
        .map_err(|e| HeliosError::device(format!("Invalid UTF-8 string: {}", e)))?;
    Ok(string.trim_matches('\0').trim().to_string())
}

/// Apply a decimal scale factor (0.1 for deci-units)
pub fn scale(raw: impl Into<f64>, factor: f64) -> f64 {
    raw.into() * factor
}

/// SolaX register map over a [`ModbusClient`]
pub struct SolaxRtuTransport {
    client: ModbusClient,
}

impl SolaxRtuTransport {
    pub fn new(config: &ModbusConfig) -> Self {
        Self {
            client: ModbusClient::new(config),
        }
    }

    fn phase_block(phase: usize, phase_count: usize) -> u16 {
        if phase_count <= 1 {
            registers::SINGLE_PHASE_BLOCK
        } else {
            let offset = u16::try_from(phase.saturating_sub(1)).unwrap_or(0);
            registers::THREE_PHASE_BLOCK + registers::THREE_PHASE_STRIDE * offset
        }
    }

    async fn read_single(&mut self, address: u16) -> Result<Option<u16>> {
        Ok(self
            .client
            .try_read_input_registers(address, 1)
            .await?
            .map(|w| w[0]))
    }
}

#[async_trait::async_trait]
impl FieldBusTransport for SolaxRtuTransport {
    async fn read_phase(&mut self, phase: usize, phase_count: usize) -> Result<PhaseReading> {
        let block = Self::phase_block(phase, phase_count);
        let words = self.client.read_input_registers(block, 3).await?;
        Ok(PhaseReading {
            voltage: scale(words[0], 0.1),
            current: scale(decode_i16(words[1]), 0.1),
            power: f64::from(decode_i16(words[2])),
        })
    }

    async fn read_tracker(&mut self, tracker: usize) -> Result<Option<TrackerReading>> {
        let (v_addr, i_addr, p_addr) = match tracker {
            1 => (registers::PV1_VOLTAGE, registers::PV1_CURRENT, registers::PV1_POWER),
            2 => (registers::PV2_VOLTAGE, registers::PV2_CURRENT, registers::PV2_POWER),
            3 => {
                let Some(words) = self
                    .client
                    .try_read_input_registers(registers::PV3_BLOCK, 3)
                    .await?
                else {
                    return Ok(None);
                };
                return Ok(Some(TrackerReading {
                    voltage: scale(words[0], 0.1),
                    current: scale(words[1], 0.1),
                    power: f64::from(decode_i16(words[2])),
                }));
            }
            _ => return Ok(None),
        };

        let Some(power) = self.read_single(p_addr).await? else {
            return Ok(None);
        };
        let voltage = self.read_single(v_addr).await?.unwrap_or(0);
        let current = self.read_single(i_addr).await?.unwrap_or(0);
        Ok(Some(TrackerReading {
            power: f64::from(decode_i16(power)),
            voltage: scale(voltage, 0.1),
            current: scale(current, 0.1),
        }))
    }

    async fn read_counters(&mut self) -> Result<InverterCounters> {
        let run_mode = self.client.read_input_registers(registers::RUN_MODE, 1).await?[0];
        let today = self
            .client
            .read_input_registers(registers::YIELD_TODAY, 1)
            .await?[0];
        let total = self
            .client
            .read_input_registers(registers::TOTAL_YIELD, 2)
            .await?;
        Ok(InverterCounters {
            total_yield: scale(decode_u32_lsw_first(&total)?, 0.1),
            yield_today: scale(today, 0.1),
            run_mode,
        })
    }

    async fn read_serial(&mut self) -> Result<String> {
        let words = self
            .client
            .read_holding_registers(registers::SERIAL_NUMBER, registers::SERIAL_NUMBER_LEN)
            .await?;
        let serial = decode_string(&words)?;
        if serial.is_empty() {
            return Err(HeliosError::device("Inverter reported an empty serial number"));
        }
        Ok(serial)
    }
}

/// Field-bus telemetry source with tracker discovery
pub struct FieldBusSource {
    transport: Box<dyn FieldBusTransport>,
    /// Field-bus phase numbers in configured order
    phases: Vec<usize>,
    max_trackers: usize,
    logger: StructuredLogger,
}

impl FieldBusSource {
    pub fn new(transport: Box<dyn FieldBusTransport>, phases: Vec<usize>, max_trackers: usize) -> Self {
        Self {
            transport,
            phases,
            max_trackers: max_trackers.max(1),
            logger: get_logger("modbus"),
        }
    }

    /// Production source over the configured serial link
    pub fn from_config(config: &ModbusConfig, phases: Vec<usize>) -> Self {
        let max_trackers = config.max_trackers.min(MAX_SUPPORTED_TRACKERS);
        Self::new(
            Box::new(SolaxRtuTransport::new(config)),
            phases,
            max_trackers,
        )
    }

    pub async fn read_serial(&mut self) -> Result<String> {
        self.transport.read_serial().await
    }

    /// Read every configured phase, discover trackers and read the counters
    ///
    /// Phase readings come back in configured order, each read by its own
    /// field-bus phase number.
    pub async fn fetch(&mut self) -> Result<RawFieldBusReading> {
        let phase_count = self.phases.len();
        let mut phases = Vec::with_capacity(phase_count);
        for &phase in &self.phases {
            phases.push(self.transport.read_phase(phase, phase_count).await?);
        }

        let mut trackers = Vec::new();
        for tracker in 1..=self.max_trackers {
            match self.transport.read_tracker(tracker).await? {
                Some(reading) => trackers.push(reading),
                None => break,
            }
        }
        if trackers.is_empty() {
            return Err(HeliosError::device("No PV trackers reported by the inverter"));
        }

        let counters = self.transport.read_counters().await?;
        self.logger.trace(&format!(
            "Field-bus read: {} phase(s), {} tracker(s), run mode {}",
            phases.len(),
            trackers.len(),
            counters.run_mode
        ));

        Ok(RawFieldBusReading {
            phases,
            trackers,
            total_yield: counters.total_yield,
            yield_today: counters.yield_today,
            run_mode: counters.run_mode,
            fetched_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedTransport {
        trackers: Vec<TrackerReading>,
        fail_counters: bool,
    }

    #[async_trait::async_trait]
    impl FieldBusTransport for ScriptedTransport {
        async fn read_phase(&mut self, phase: usize, _phase_count: usize) -> Result<PhaseReading> {
            Ok(PhaseReading {
                power: 100.0 * phase as f64,
                current: 0.5 * phase as f64,
                voltage: 230.0,
            })
        }

        async fn read_tracker(&mut self, tracker: usize) -> Result<Option<TrackerReading>> {
            Ok(self.trackers.get(tracker - 1).copied())
        }

        async fn read_counters(&mut self) -> Result<InverterCounters> {
            if self.fail_counters {
                return Err(HeliosError::device("timeout"));
            }
            Ok(InverterCounters {
                total_yield: 1234.5,
                yield_today: 3.2,
                run_mode: 2,
            })
        }

        async fn read_serial(&mut self) -> Result<String> {
            Ok("XM3A0000000000".to_string())
        }
    }

    fn tracker(power: f64) -> TrackerReading {
        TrackerReading {
            power,
            current: 1.0,
            voltage: 300.0,
        }
    }

    #[test]
    fn decodes_low_word_first_totals() {
        assert_eq!(decode_u32_lsw_first(&[0x0001, 0x0001]).unwrap(), 65537);
        assert!(decode_u32_lsw_first(&[0x0001]).is_err());
        assert!((scale(decode_u32_lsw_first(&[12345, 0]).unwrap(), 0.1) - 1234.5).abs() < 1e-9);
    }

    #[test]
    fn decodes_signed_power_and_serial() {
        assert_eq!(decode_i16(0xFFFF), -1);
        assert_eq!(decode_i16(1500), 1500);
        assert_eq!(decode_string(&[0x5858, 0x3132, 0x0000]).unwrap(), "XX12");
    }

    #[test]
    fn phase_blocks_follow_register_map() {
        assert_eq!(SolaxRtuTransport::phase_block(1, 1), 0x0000);
        assert_eq!(SolaxRtuTransport::phase_block(1, 3), 0x006A);
        assert_eq!(SolaxRtuTransport::phase_block(2, 3), 0x006E);
        assert_eq!(SolaxRtuTransport::phase_block(3, 3), 0x0072);
    }

    #[tokio::test]
    async fn discovery_stops_at_first_absent_tracker() {
        let transport = ScriptedTransport {
            trackers: vec![tracker(1000.0), tracker(800.0), tracker(0.0)],
            fail_counters: false,
        };
        let mut source = FieldBusSource::new(Box::new(transport), vec![1, 2, 3], 8);
        let reading = source.fetch().await.unwrap();
        assert_eq!(reading.trackers.len(), 3);
        assert_eq!(reading.phases.len(), 3);
        assert_eq!(reading.phases[1].power, 200.0);
        assert_eq!(reading.run_mode, 2);
    }

    #[tokio::test]
    async fn phases_are_read_by_their_key_number() {
        let transport = ScriptedTransport {
            trackers: vec![tracker(1.0)],
            fail_counters: false,
        };
        let mut source = FieldBusSource::new(Box::new(transport), vec![3, 1], 3);
        let reading = source.fetch().await.unwrap();
        assert_eq!(reading.phases[0].power, 300.0);
        assert_eq!(reading.phases[1].power, 100.0);
    }

    #[tokio::test]
    async fn discovery_respects_tracker_limit() {
        let transport = ScriptedTransport {
            trackers: vec![tracker(1.0), tracker(2.0), tracker(3.0)],
            fail_counters: false,
        };
        let mut source = FieldBusSource::new(Box::new(transport), vec![1], 2);
        assert_eq!(source.fetch().await.unwrap().trackers.len(), 2);
    }

    #[tokio::test]
    async fn zero_trackers_is_a_device_error() {
        let transport = ScriptedTransport {
            trackers: vec![],
            fail_counters: false,
        };
        let mut source = FieldBusSource::new(Box::new(transport), vec![1], 3);
        let err = source.fetch().await.unwrap_err();
        assert!(matches!(err, HeliosError::Device { .. }));
    }

    #[tokio::test]
    async fn counter_failure_fails_the_whole_fetch() {
        let transport = ScriptedTransport {
            trackers: vec![tracker(1.0)],
            fail_counters: true,
        };
        let mut source = FieldBusSource::new(Box::new(transport), vec![1], 3);
        assert!(source.fetch().await.is_err());
        assert_eq!(source.read_serial().await.unwrap(), "XM3A0000000000");
    }

    #[test]
    fn client_starts_disconnected() {
        let client = ModbusClient::new(&ModbusConfig::default());
        assert!(!client.is_connected());
    }
}
