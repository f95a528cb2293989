mod cli;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use beatlight::analysis::{default_catalog, SpectrumConfig};
use beatlight::audio::{decode::decode_audio, SampleBuffer};
use beatlight::detect::{DetectionResult, EngineRegistry};
use beatlight::dispatch::{
    BandTrack, HttpLightDevice, LightDevice, LogDevice, PlaybackClock, PlayheadDispatcher,
};
use beatlight::jobs::{JobEventKind, JobOutput, JobRequest, Orchestrator, SpectralReport};

use cli::{Cli, Command};
use config::Config;

const TICK_RATE: f32 = 30.0;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let config = match config::find_config(cli.config.as_deref()) {
        Some(path) => {
            let cfg = config::load_config(&path)?;
            log::info!("Loaded config from {}", path.display());
            cfg
        }
        None => Config::default(),
    };

    match cli.command {
        Command::Engines => {
            let registry = EngineRegistry::with_defaults();
            println!("Available engines:");
            for engine in registry.engines() {
                println!(
                    "  {:<20} {} (threshold {})",
                    engine.key(),
                    engine.description(),
                    engine.default_threshold()
                );
            }
            Ok(())
        }
        Command::Analyze {
            input,
            output,
            window_size,
            hop_size,
            threshold,
        } => {
            let mut spectrum = config.analysis.clone();
            if let Some(size) = window_size {
                spectrum.window_size = size;
            }
            if let Some(hop) = hop_size {
                spectrum.hop_size = hop;
            }

            let orchestrator = Orchestrator::new();
            let buffer = load(&input)?;
            let report = analyze(&orchestrator, buffer, spectrum, &config)?;

            println!("{:<12} {:>8} {:>9} {:>10}", "band", "hz", "impulses", "peak");
            for band in &report.bands {
                let impulses = band.impulses(threshold);
                let peak = impulses.iter().map(|i| i.strength).fold(0.0f32, f32::max);
                println!(
                    "{:<12} {:>8.1} {:>9} {:>10.2}",
                    band.band.name,
                    report.sequence.bin_frequency(band.bin),
                    impulses.len(),
                    peak
                );
            }

            if let Some(path) = output {
                write_json(&path, &report.bands)?;
            }
            Ok(())
        }
        Command::Detect {
            input,
            engine,
            threshold,
            output,
        } => {
            let engine = engine.unwrap_or_else(|| config.detection.engine.clone());
            let orchestrator = Orchestrator::new();
            let buffer = load(&input)?;
            let result = detect(&orchestrator, buffer, &engine, threshold, &config)?;

            println!("{} onsets from {}", result.events.len(), engine);
            for event in &result.events {
                match event.strength {
                    Some(s) => println!("  {:>9.3}s  {:.3}", event.time, s),
                    None => println!("  {:>9.3}s", event.time),
                }
            }

            if let Some(path) = output {
                write_json(&path, &result)?;
            }
            Ok(())
        }
        Command::Waveform {
            input,
            buckets,
            output,
        } => {
            let orchestrator = Orchestrator::new();
            let buffer = load(&input)?;
            let summary = match run_job(&orchestrator, JobRequest::WaveformSummary { buffer, buckets })? {
                JobOutput::WaveformSummary(summary) => summary,
                other => anyhow::bail!("Unexpected job output: {:?}", other),
            };
            log::info!(
                "{} buckets of {:.3}s, peak {:.3}, peak RMS {:.3}",
                summary.buckets.len(),
                summary.bucket_duration,
                summary.peak_amplitude,
                summary.peak_rms
            );
            if let Some(path) = output {
                write_json(&path, &summary)?;
            }
            Ok(())
        }
        Command::Play {
            input,
            device_url,
            speed,
            engine,
            threshold,
        } => {
            if !(speed > 0.0) {
                anyhow::bail!("Playback speed must be positive, got {}", speed);
            }
            let orchestrator = Orchestrator::new();
            let buffer = load(&input)?;
            let duration = buffer.duration();

            let mut pulses = config.dispatch.pulses.clone();
            let tracks = match engine {
                Some(key) => {
                    let result = detect(&orchestrator, buffer, &key, None, &config)?;
                    // Engine events may carry no strength; let them all through.
                    pulses.threshold = 0.0;
                    vec![BandTrack::from_onsets(key, &result)]
                }
                None => {
                    let report = analyze(&orchestrator, buffer, config.analysis.clone(), &config)?;
                    report.bands.iter().map(BandTrack::from_series).collect()
                }
            };
            if let Some(t) = threshold {
                pulses.threshold = t;
            }

            let device: Arc<dyn LightDevice> = match device_url.or_else(|| config.dispatch.device_url.clone()) {
                Some(url) => Arc::new(
                    HttpLightDevice::new(url, Duration::from_millis(config.dispatch.device_timeout_ms))
                        .context("Failed to create HTTP light device")?,
                ),
                None => Arc::new(LogDevice),
            };
            log::info!("Playing {:.1}s at {}x to {}", duration, speed, device.name());

            let mut dispatcher = PlayheadDispatcher::new(&pulses, device);
            let sent = simulate_playback(&mut dispatcher, &tracks, duration, speed);
            log::info!(
                "Sent {} pulses, {} impulses crossed",
                sent,
                dispatcher.state().fired_count()
            );
            Ok(())
        }
    }
}

fn load(input: &Path) -> Result<SampleBuffer> {
    if !input.exists() {
        anyhow::bail!("Input file not found: {}", input.display());
    }
    log::info!("Decoding {}...", input.display());
    decode_audio(input)
}

fn analyze(
    orchestrator: &Orchestrator,
    buffer: SampleBuffer,
    spectrum: SpectrumConfig,
    config: &Config,
) -> Result<SpectralReport> {
    let request = JobRequest::SpectralAnalysis {
        buffer,
        spectrum,
        bands: config.bands.clone(),
        catalog: default_catalog(),
    };
    match run_job(orchestrator, request)? {
        JobOutput::SpectralAnalysis(report) => Ok(report),
        other => anyhow::bail!("Unexpected job output: {:?}", other),
    }
}

fn detect(
    orchestrator: &Orchestrator,
    buffer: SampleBuffer,
    engine: &str,
    threshold: Option<f32>,
    config: &Config,
) -> Result<DetectionResult> {
    let mut params = config.detection.params.clone();
    if threshold.is_some() {
        params.threshold = threshold;
    }
    let request = JobRequest::OnsetDetection {
        buffer,
        engine: engine.to_string(),
        params,
    };
    match run_job(orchestrator, request)? {
        JobOutput::OnsetDetection(result) => Ok(result),
        other => anyhow::bail!("Unexpected job output: {:?}", other),
    }
}

/// Run one job to completion behind a progress bar.
fn run_job(orchestrator: &Orchestrator, request: JobRequest) -> Result<JobOutput> {
    let kind = request.kind();
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {msg} {bar:40.cyan/blue} {pos}/{len} ({eta} remaining)")?
            .progress_chars("=>-"),
    );
    pb.set_message(kind.name());

    let bar = pb.clone();
    let handle = orchestrator.enqueue(request, move |event| match event.kind {
        JobEventKind::Started => bar.reset_elapsed(),
        JobEventKind::Progress(p) => {
            bar.set_length(p.total as u64);
            bar.set_position(p.processed as u64);
        }
    });
    let result = handle.wait();
    pb.finish_and_clear();

    let outcome = result.with_context(|| format!("{} job failed", kind.name()))?;
    log::info!(
        "{} job {} finished in {:.2}s",
        kind.name(),
        outcome.job_id,
        outcome.elapsed.as_secs_f32()
    );
    Ok(outcome.output)
}

/// Tick a wall-clock-driven playhead at [`TICK_RATE`] until the end of the
/// file. Returns the number of pulses sent to the device.
fn simulate_playback(
    dispatcher: &mut PlayheadDispatcher,
    tracks: &[BandTrack],
    duration: f32,
    speed: f32,
) -> usize {
    let tick = Duration::from_secs_f32(1.0 / TICK_RATE);
    let start = Instant::now();
    let mut sent = 0;

    loop {
        let position = (start.elapsed().as_secs_f32() * speed).min(duration);
        let clock = PlaybackClock {
            current_time: position,
            is_playing: true,
            total_duration: duration,
        };
        for pulse in dispatcher.on_tick(&clock, tracks) {
            log::info!(
                "{:>8.3}s {:<12} strength {:>6.2} -> {}",
                pulse.time,
                pulse.band,
                pulse.strength,
                pulse.brightness
            );
            sent += 1;
        }
        if position >= duration {
            break;
        }
        std::thread::sleep(tick);
    }
    sent
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), value)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    log::info!("Wrote {}", path.display());
    Ok(())
}
