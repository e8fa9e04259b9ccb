use convflow::*;
use convflow_accel::wire::{decode_samples, encode_job};
use convflow_accel::{golden, AccelConfig, Core, EngineConfig, Top};
use convflow_std::{Parity, StopBits, UartConfig, UartRx, UartTx};

fn config(uart: UartConfig) -> AccelConfig {
    let engine = EngineConfig { max_kernel_size: 5, max_height: 8, max_width: 8, ..Default::default() };
    AccelConfig { engine, rx_depth: 32, tx_depth: 32, uart }
}

/// Host-side transceivers around the device.
fn serial_bench(config: &AccelConfig) -> Testbench<impl Module<I = VrChannel<u8>, O = VrChannel<u8>>> {
    let phy = UartTx::new(config.uart).unwrap().then(Top::new(config).unwrap()).then(UartRx::new(config.uart).unwrap());
    Testbench::new(phy)
}

#[test]
fn serial_matches_core() {
    let _ = env_logger::builder().is_test(true).try_init();
    let uart = UartConfig { divisor: 8, ..UartConfig::default() };
    let config = config(uart);

    let coeffs = [1, 2, 1, 2, -12, 2, 1, 2, 1];
    let pixels = (0..20u8).map(|p| p.wrapping_mul(37)).collect::<Vec<_>>();
    let request = encode_job(3, &coeffs, 4, 5, &pixels);
    let expected = golden::convolve(3, &coeffs, 4, 5, &pixels, 24);

    let mut core = Testbench::new(Core::new(&config).unwrap());
    let direct = core.run(request.clone(), 60, 10_000, |_| true).unwrap();

    let mut serial = serial_bench(&config);
    let budget = 2 * uart.frame_cycles() * (request.len() + direct.len()) as u64 + 10_000;
    let over_the_line = serial.run(request, 60, budget, |_| true).unwrap();

    assert_eq!(direct, over_the_line);
    assert_eq!(decode_samples(&over_the_line, 24).unwrap(), expected);
}

#[test]
fn serial_with_parity_and_two_stop_bits() {
    let uart = UartConfig { divisor: 6, data_bits: 8, parity: Parity::Even, stop_bits: StopBits::Two };
    let config = config(uart);

    let request = encode_job(1, &[-1], 2, 2, &[1, 2, 3, 4]);
    let mut serial = serial_bench(&config);
    let budget = 2 * uart.frame_cycles() * (request.len() + 12) as u64 + 1000;
    let output = serial.run(request, 12, budget, |_| true).unwrap();
    assert_eq!(decode_samples(&output, 24).unwrap(), [-1, -2, -3, -4]);
}
