//! Runs one convolution job on a simulated or real accelerator and checks it against the software reference.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::time::Duration;

use argh::FromArgs;
use convflow_accel::config::TIMEOUT_SECONDS;
use convflow_accel::{AccelConfig, Core};
use convflow_host::*;
use convflow_std::UartConfig;
use itertools::Itertools;
use log::info;

#[derive(FromArgs)]
/// Convolve a synthetic image on the accelerator
struct Args {
    /// kernel: identity, box, gaussian, sobel-x, sobel-y, sharpen (default: gaussian)
    #[argh(option, short = 'k', default = "Preset::Gaussian")]
    kernel: Preset,

    /// kernel size for the resizable kernels (default: 5)
    #[argh(option, short = 's', default = "5")]
    size: usize,

    /// image height (default: 24)
    #[argh(option, default = "24")]
    height: usize,

    /// image width (default: 32)
    #[argh(option, default = "32")]
    width: usize,

    /// simulate the serial line instead of the byte-level datapath
    #[argh(switch)]
    serial: bool,

    /// clock cycles per bit of the simulated serial line (default: 16)
    #[argh(option, default = "16")]
    divisor: u32,

    /// already configured serial device of a real accelerator
    #[argh(option, short = 'd')]
    device: Option<PathBuf>,
}

/// Gradient with a bright square in the middle.
fn synthetic(height: usize, width: usize) -> Image {
    Image::from_fn(height, width, |row, col| {
        let inside = (height / 4..height - height / 4).contains(&row) && (width / 4..width - width / 4).contains(&col);
        if inside {
            230
        } else {
            (4 * (row + col)).min(120) as u8
        }
    })
}

fn filter<L: Link>(link: L, config: HostConfig, kernel: Kernel, image: &Image) -> Result<(FilterOutput, L)> {
    let mut host = Accelerator::new(link, config)?;
    let output = host.convolve(kernel, image)?;
    if host.stats().retries > 0 {
        info!("job needed {} retries", host.stats().retries);
    }
    Ok((output, host.into_link()))
}

fn preview(output: &FilterOutput) -> String {
    const SHADES: &[u8] = b" .:-=+*#%@";
    output
        .to_image()
        .pixels()
        .chunks(output.width().max(1))
        .map(|row| row.iter().map(|px| SHADES[usize::from(*px) * (SHADES.len() - 1) / 255] as char).collect::<String>())
        .join("\n")
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let kernel = args.kernel.kernel(args.size)?;
    let image = synthetic(args.height, args.width);

    let output = if let Some(path) = &args.device {
        let port = OpenOptions::new().read(true).write(true).open(path)?;
        let link = IoLink::new(port, Duration::from_secs(TIMEOUT_SECONDS + 1));
        filter(link, HostConfig::default(), kernel.clone(), &image)?.0
    } else {
        let mut config = AccelConfig::new();
        config.uart = UartConfig { divisor: args.divisor, ..UartConfig::default() };
        config.engine.timeout = 16 * config.uart.frame_cycles();
        let host_config = HostConfig::for_device(&config.engine);
        let link_config = SimLinkConfig::for_device(&config);

        let (output, cycles) = if args.serial {
            let link = SimLink::new(SerialPhy::new(&config)?, link_config);
            let (output, link) = filter(link, host_config, kernel.clone(), &image)?;
            (output, link.cycles())
        } else {
            let link = SimLink::new(Core::new(&config)?, link_config);
            let (output, link) = filter(link, host_config, kernel.clone(), &image)?;
            (output, link.cycles())
        };
        println!("simulated {} cycles", cycles);
        output
    };

    let expected = golden::convolve(kernel.size(), kernel.coeffs(), image.height(), image.width(), image.pixels(), 24);
    let mismatches = output.samples().iter().zip(&expected).filter(|(a, b)| a != b).count();

    let size = kernel.size();
    println!("{} kernel {}x{} on a {}x{} image", args.kernel, size, size, image.height(), image.width());
    if let Some((min, max)) = output.range() {
        println!("results in {}..={}", min, max);
    }
    println!("{}", preview(&output));

    if mismatches > 0 {
        return Err(format!("{} of {} results differ from the reference", mismatches, expected.len()).into());
    }
    println!("all {} results match the reference", expected.len());
    Ok(())
}
