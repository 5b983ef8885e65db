//! Newsreel - narrated news player
//!
//! Composition root: wires the software audio graph to cpal output and the
//! media library to the playback controller.

mod display;
mod output;
mod source;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use newsreel_analysis::{normalize, AlignmentTimeline};
use newsreel_audio::{
    AudioGraphManager, GraphConfig, PlaybackController, PlaybackState, SoftwareBackend, Track,
};
use newsreel_library::{
    await_record, Config, HttpClient, HttpSpeechClient, LocalMediaStore, MediaStore, Narrator,
    Poller, StoryRecord,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// How often the play loop refreshes the display
const FRAME_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Parser)]
#[command(name = "newsreel", about = "Narrated news player", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Play a track with a live spectrum
    Play {
        /// Local path, file:// or http(s):// URL
        source: String,
        /// Alignment JSON (row or columnar form) for word highlighting
        #[arg(long)]
        alignment: Option<PathBuf>,
        /// Start position in seconds
        #[arg(long, default_value_t = 0.0)]
        offset: f64,
    },
    /// Generate narration for a story
    Narrate {
        #[arg(long)]
        story: String,
        #[arg(long)]
        text: String,
        #[arg(long)]
        voice: Option<String>,
    },
    /// Show a story's stored media record
    Show {
        id: String,
        /// Wait for an in-progress generation to finish
        #[arg(long)]
        wait: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("newsreel=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load();

    match cli.command {
        Command::Play {
            source,
            alignment,
            offset,
        } => play(&config, source, alignment, offset),
        Command::Narrate { story, text, voice } => narrate(&config, &story, &text, voice.as_deref()),
        Command::Show { id, wait } => show(&config, &id, wait),
    }
}

fn play(config: &Config, url: String, alignment: Option<PathBuf>, offset: f64) -> Result<()> {
    let timeline = alignment.map(|path| load_timeline(&path)).transpose()?.flatten();

    let sample_rate = output::default_sample_rate()?;
    let backend = SoftwareBackend::new(sample_rate).with_start_suspended(config.start_suspended);
    let _output = output::start(backend.renderer())?;

    let manager = Arc::new(AudioGraphManager::new(
        Arc::new(backend),
        GraphConfig {
            metadata_timeout: config.metadata_timeout(),
            ..Default::default()
        },
    ));
    let http = HttpClient::new().context("Failed to create HTTP client")?;
    let controller = PlaybackController::new(
        manager.clone(),
        Arc::new(source::LoaderSource::new(sample_rate, http)),
    );

    tracing::info!(url = %url, sample_rate, "Starting playback");
    controller.play(&Track::new(url.clone(), url).with_offset(offset))?;

    let mut stdout = std::io::stdout();
    loop {
        if controller.pump_events() || controller.state() != PlaybackState::Playing {
            break;
        }

        let Some(visualizer) = controller.visualizer() else {
            break;
        };
        visualizer.refresh();
        let position = controller.position().unwrap_or(0.0);
        let word = timeline
            .as_ref()
            .and_then(|t| t.word_at(position))
            .map(|w| w.text.as_str());

        let line = display::status_line(position, &visualizer.data().read(), word);
        write!(stdout, "\r{line}\x1b[K")?;
        stdout.flush()?;

        std::thread::sleep(FRAME_INTERVAL);
    }
    writeln!(stdout)?;

    drop(controller);
    manager.cleanup(None);
    Ok(())
}

/// Read an alignment file; unusable alignment plays without highlighting
fn load_timeline(path: &Path) -> Result<Option<AlignmentTimeline>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Invalid JSON in {}", path.display()))?;

    let alignment = normalize(Some(&value));
    if alignment.is_none() {
        tracing::warn!(path = %path.display(), "Alignment unusable, playing without highlights");
    }
    Ok(alignment.map(AlignmentTimeline::new))
}

fn open_store(config: &Config) -> Result<LocalMediaStore> {
    LocalMediaStore::open(
        &config.database_path(),
        &config.blob_dir(),
        config.public_base_url.clone(),
    )
    .context("Failed to open media store")
}

fn narrate(config: &Config, story: &str, text: &str, voice: Option<&str>) -> Result<()> {
    let Some(endpoint) = config.speech_endpoint.clone() else {
        bail!("speech_endpoint is not configured");
    };
    let http = HttpClient::new().context("Failed to create HTTP client")?;
    let speech = HttpSpeechClient::new(
        http,
        endpoint,
        config.speech_api_key.clone().unwrap_or_default(),
        config.default_voice_id.clone().unwrap_or_default(),
    );

    let narrator = Narrator::new(Arc::new(speech), Arc::new(open_store(config)?));
    let narration = narrator.narrate(story, text, voice)?;

    println!("{}", narration.audio_url);
    match narration.alignment {
        Some(alignment) => println!("{} aligned characters", alignment.len()),
        None => println!("no alignment"),
    }
    Ok(())
}

fn show(config: &Config, id: &str, wait: bool) -> Result<()> {
    let store = open_store(config)?;
    let record = if wait {
        await_record(&store, &Poller::default(), id)?
    } else {
        match store.get_record(id)? {
            Some(record) => record,
            None => bail!("No record for story {id}"),
        }
    };
    print_record(&record);
    Ok(())
}

fn print_record(record: &StoryRecord) {
    println!("story:   {}", record.id);
    println!("status:  {}", record.status.as_str());
    if let Some(url) = &record.audio_url {
        println!("audio:   {url}");
    }
    if let Some(error) = &record.error {
        println!("error:   {error}");
    }
    if let Some(alignment) = &record.alignment {
        let timeline = AlignmentTimeline::new(alignment.clone());
        println!(
            "words:   {} over {:.1}s",
            timeline.words().len(),
            timeline.duration()
        );
    }
}
