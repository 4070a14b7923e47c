use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use clap::Parser;

/// Write a day of sample plant logs, one file per block of hours.
///
/// Even-numbered files are comma-separated with separate `Date` and `Time`
/// columns; odd-numbered ones are tab-separated `.txt` with one combined
/// timestamp column and the tag columns in a different order. Every file
/// after the first repeats the previous file's last timestamp on its first
/// row, and the very first file repeats its first row, as real loggers do.
#[derive(Parser)]
#[command(name = "generate-sample")]
struct Cli {
    /// Output directory
    #[arg(default_value = "sample_logs")]
    out_dir: PathBuf,

    /// Number of files
    #[arg(long, default_value_t = 4)]
    files: usize,

    /// Hours covered by each file
    #[arg(long, default_value_t = 6)]
    hours_per_file: i64,

    /// Seconds between samples
    #[arg(long, default_value_t = 1)]
    step: i64,
}

const TAGS: [&str; 4] = ["FT101", "PT201", "TT301", "LT401"];

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// Slow baseline plus a few process upsets, in hours since midnight.
fn signal(tag: usize, hour: f64, rng: &mut SimpleRng) -> f64 {
    let (base, upsets, noise): (f64, &[(f64, f64, f64)], f64) = match tag {
        0 => (120.0, &[(3.0, 0.4, 35.0), (14.5, 1.0, -20.0)], 1.5),
        1 => (4.2, &[(8.0, 0.2, 1.1)], 0.02),
        2 => (65.0, &[(11.0, 2.5, 8.0), (20.0, 0.5, 12.0)], 0.3),
        _ => (50.0 + 10.0 * (hour / 24.0 * std::f64::consts::TAU).sin(), &[], 0.5),
    };
    let bumps: f64 = upsets
        .iter()
        .map(|&(mu, sigma, amp)| gaussian(hour, mu, sigma, amp))
        .sum();
    base + bumps + rng.gauss(0.0, noise)
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

fn write_file(
    path: &Path,
    comma: bool,
    timestamps: impl Iterator<Item = NaiveDateTime>,
    midnight: NaiveDateTime,
    rng: &mut SimpleRng,
) -> Result<usize> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut out = BufWriter::new(file);

    // Odd files list the tags back to front.
    let order: Vec<usize> = if comma {
        (0..TAGS.len()).collect()
    } else {
        (0..TAGS.len()).rev().collect()
    };
    let names: Vec<&str> = order.iter().map(|&i| TAGS[i]).collect();
    if comma {
        writeln!(out, "Date,Time,{}", names.join(","))?;
    } else {
        writeln!(out, "Time\t{}", names.join("\t"))?;
    }

    let mut rows = 0;
    for ts in timestamps {
        let hour = (ts - midnight).num_seconds() as f64 / 3600.0;
        let values: Vec<String> = order
            .iter()
            .map(|&tag| format!("{:.3}", signal(tag, hour, rng)))
            .collect();
        if comma {
            writeln!(
                out,
                "{},{},{}",
                ts.format("%-m/%-d/%Y"),
                ts.format("%-H:%M:%S"),
                values.join(",")
            )?;
        } else {
            writeln!(out, "{}\t{}", ts.format("%Y/%-m/%-d %-I:%M:%S %p"), values.join("\t"))?;
        }
        rows += 1;
    }
    out.flush()?;
    Ok(rows)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    std::fs::create_dir_all(&cli.out_dir)
        .with_context(|| format!("creating {}", cli.out_dir.display()))?;

    let mut rng = SimpleRng::new(42);
    let midnight = NaiveDate::from_ymd_opt(2018, 9, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .context("sample start date")?;
    let step = Duration::seconds(cli.step.max(1));
    let samples_per_file = cli.hours_per_file * 3600 / cli.step.max(1);

    let mut total = 0;
    for n in 0..cli.files {
        let start = midnight + Duration::hours(cli.hours_per_file * n as i64);
        let comma = n % 2 == 0;
        let name = format!(
            "Plant_{}.{}",
            start.format("%Y%m%d-%H%M%S"),
            if comma { "csv" } else { "txt" }
        );
        let path = cli.out_dir.join(name);

        // First row duplicates: the previous file's last stamp, or for the
        // first file its own first stamp.
        let lead = if n == 0 { start } else { start - step };
        let timestamps = std::iter::once(lead)
            .chain((0..samples_per_file).map(|i| start + step * i as i32));

        let rows = write_file(&path, comma, timestamps, midnight, &mut rng)?;
        println!("Wrote {rows} rows to {}", path.display());
        total += rows;
    }

    println!("Wrote {total} rows in {} files ({} tags each)", cli.files, TAGS.len());
    Ok(())
}
