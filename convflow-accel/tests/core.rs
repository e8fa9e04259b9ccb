use convflow::*;
use convflow_accel::wire::{decode_samples, encode_job};
use convflow_accel::{golden, AccelConfig, Core, EngineConfig, Footprint};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

struct Job {
    size: usize,
    coeffs: Vec<i16>,
    height: usize,
    width: usize,
    pixels: Vec<u8>,
}

impl Job {
    fn random(rng: &mut StdRng, size: usize, height: usize, width: usize) -> Self {
        let coeffs = (0..size * size).map(|_| rng.random()).collect();
        let pixels = (0..height * width).map(|_| rng.random()).collect();
        Self { size, coeffs, height, width, pixels }
    }

    fn request(&self) -> Vec<u8> {
        encode_job(self.size as u8, &self.coeffs, self.height as u16, self.width as u16, &self.pixels)
    }

    fn expected(&self, result_width: u32) -> Vec<i32> {
        golden::convolve(self.size, &self.coeffs, self.height, self.width, &self.pixels, result_width)
    }

    /// Generous cycle budget with the egress ready half of the time.
    fn budget(&self) -> u64 {
        let window = self.size + 10;
        let cells = (self.height + window) * (self.width + window);
        let macs = self.height * self.width * window * window;
        (4 * (self.request().len() + cells + macs) + 8 * self.height * self.width + 1000) as u64
    }
}

fn small_config(footprint: Footprint) -> AccelConfig {
    let engine = EngineConfig { max_kernel_size: 11, max_height: 24, max_width: 24, footprint, ..Default::default() };
    AccelConfig { engine, rx_depth: 16, tx_depth: 16, ..AccelConfig::new() }
}

fn run_jobs(config: &AccelConfig, jobs: &[Job], rng: &mut StdRng) -> Vec<Vec<i32>> {
    let mut tb = Testbench::new(Core::new(config).unwrap());
    let width = config.engine.result_width;
    let bytes = (width / 8) as usize;

    jobs.iter()
        .map(|job| {
            let expected = job.height * job.width * bytes;
            let output = tb.run(job.request(), expected, job.budget(), |_| rng.random_bool(0.5)).unwrap();
            decode_samples(&output, width).unwrap()
        })
        .collect()
}

#[test]
fn random_jobs_match_reference() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let config = small_config(Footprint::Exact);

    let jobs = (0..6)
        .map(|_| {
            let size = 2 * rng.random_range(0..4) + 1;
            let (height, width) = (rng.random_range(1..12), rng.random_range(1..12));
            Job::random(&mut rng, size, height, width)
        })
        .collect::<Vec<_>>();

    // Jobs are sent back to back on the same device.
    let outputs = run_jobs(&config, &jobs, &mut rng);
    for (job, output) in jobs.iter().zip(outputs) {
        assert_eq!(output, job.expected(24), "{}x{} kernel, {}x{} image", job.size, job.size, job.height, job.width);
    }
}

#[test]
fn footprints_produce_identical_results() {
    let mut rng = StdRng::seed_from_u64(7);
    let jobs = [Job::random(&mut rng, 3, 5, 7), Job::random(&mut rng, 1, 4, 4), Job::random(&mut rng, 5, 3, 9)];

    let exact = run_jobs(&small_config(Footprint::Exact), &jobs, &mut rng);
    let embedded = run_jobs(&small_config(Footprint::Embedded), &jobs, &mut rng);
    assert_eq!(exact, embedded);
    for (job, output) in jobs.iter().zip(exact) {
        assert_eq!(output, job.expected(24));
    }
}

#[test]
fn wide_results_use_four_bytes() {
    let mut rng = StdRng::seed_from_u64(32);
    let mut config = small_config(Footprint::Exact);
    config.engine.result_width = 32;

    let mut job = Job::random(&mut rng, 3, 4, 4);
    job.coeffs.iter_mut().for_each(|coeff| *coeff = i16::MIN);
    job.pixels.iter_mut().for_each(|pixel| *pixel = 255);

    let outputs = run_jobs(&config, std::slice::from_ref(&job), &mut rng);
    assert_eq!(outputs[0], job.expected(32));
    // The center pixel sees all nine taps.
    assert_eq!(outputs[0][5], 9 * i32::from(i16::MIN) * 255);
}

#[test]
fn oversized_job_is_skipped() {
    let mut rng = StdRng::seed_from_u64(25);
    let config = small_config(Footprint::Exact);
    let mut tb = Testbench::new(Core::new(&config).unwrap());

    // Only the header of the oversized job is sent: the device drops it right after the dimensions.
    let oversized = encode_job(3, &[1; 9], 25, 2, &[]);
    assert!(tb.run(oversized, 0, 1000, |_| true).unwrap().is_empty());

    let job = Job::random(&mut rng, 3, 3, 3);
    let output = tb.run(job.request(), 27, job.budget(), |_| true).unwrap();
    assert_eq!(decode_samples(&output, 24).unwrap(), job.expected(24));
    assert_eq!(tb.module().engine().stats().jobs_rejected, 1);
}

macro_rules! test_kernel_size {
    ($($size:literal),*) => {
        paste::paste! {
            $(
                #[test]
                fn [<output_count_kernel_ $size>]() {
                    let mut rng = StdRng::seed_from_u64($size);
                    let job = Job::random(&mut rng, $size, 6, 9);
                    let outputs = run_jobs(&small_config(Footprint::Exact), std::slice::from_ref(&job), &mut rng);
                    assert_eq!(outputs[0].len(), 6 * 9);
                    assert_eq!(outputs[0], job.expected(24));
                }
            )*
        }
    };
}

test_kernel_size!(1, 3, 5, 7, 9, 11);
