#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Interpret the input as u16 register stream in big-endian pairs
    let regs: Vec<u16> = data
        .chunks_exact(2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .collect();

    let _ = helios::modbus::decode_u32_lsw_first(&regs);
    let _ = helios::modbus::decode_string(&regs);
    if let Some(first) = regs.first() {
        let _ = helios::modbus::scale(helios::modbus::decode_i16(*first), 0.1);
    }
});
