use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "beatlight", about = "Audio impulse analysis that drives a networked light")]
pub struct Cli {
    /// Config file (defaults to ./beatlight.toml, then the user config dir)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Spectral analysis and per-band impulse decomposition
    Analyze {
        /// Input audio file (WAV, MP3, FLAC, OGG)
        input: PathBuf,

        /// Write the band series as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// FFT window size in samples (power of two)
        #[arg(long)]
        window_size: Option<usize>,

        /// Hop between windows in samples
        #[arg(long)]
        hop_size: Option<usize>,

        /// Impulse strength reported in the summary
        #[arg(long, default_value_t = 2.0)]
        threshold: f32,
    },

    /// Run one onset-detection engine
    Detect {
        input: PathBuf,

        /// Engine key (see `beatlight engines`)
        #[arg(short, long)]
        engine: Option<String>,

        /// Override the engine's threshold
        #[arg(long)]
        threshold: Option<f32>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Analyze, then replay the file against a simulated clock and pulse the light
    Play {
        input: PathBuf,

        /// HTTP endpoint of the light; commands are logged when unset
        #[arg(long)]
        device_url: Option<String>,

        /// Playback speed multiplier
        #[arg(long, default_value_t = 1.0)]
        speed: f32,

        /// Drive pulses from a detection engine instead of band impulses
        #[arg(short, long)]
        engine: Option<String>,

        /// Minimum impulse strength that fires
        #[arg(long)]
        threshold: Option<f32>,
    },

    /// Min/max/RMS waveform summary
    Waveform {
        input: PathBuf,

        #[arg(long, default_value_t = 1000)]
        buckets: usize,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List available detection engines
    Engines,
}
