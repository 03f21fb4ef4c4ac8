use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use xxhash_rust::xxh3::xxh3_64;

use sticker_codecs::{codec_by_name, unzip_codec_for, LottieBackend, Lz4Codec};
use sticker_core::format::{frame_entries, DEFAULT_CANVAS_SIZE};
use sticker_core::{transcode_vector, ContainerDecoder, ContainerHeader};
use sticker_player::{
    DecodeQueue, FsResourceStore, LocalTranscoder, PlaybackMode, PlayerConfig, PlayerContext,
    SoftwareRenderer, ThreadClock,
};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "sticker",
    about = "Encode, inspect, decode and play animated sticker containers",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// Transcode to a delta-frame container first, then play that
    Cached,
    /// Render the vector animation on every tick
    Direct,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a Lottie animation (.json or gzip-wrapped .tgs) into a container
    Encode {
        /// Source vector animation
        input: PathBuf,
        /// Destination container
        output: PathBuf,
        /// Output width in pixels
        #[arg(long, default_value_t = DEFAULT_CANVAS_SIZE)]
        width: u32,
        /// Output height in pixels
        #[arg(long, default_value_t = DEFAULT_CANVAS_SIZE)]
        height: u32,
        /// Frame codec: lz4 | gzip | passthrough
        #[arg(short, long, default_value = "lz4")]
        codec: String,
    },
    /// Print header metadata and frame stream statistics
    Inspect {
        /// Container to inspect
        file: PathBuf,
        /// Print per-frame details, including a digest of each decoded frame
        #[arg(long)]
        frames: bool,
        /// Frame codec the container was written with
        #[arg(short, long, default_value = "lz4")]
        codec: String,
    },
    /// Reconstruct a single frame by index
    ///
    /// Frames are deltas of their predecessors, so every frame before the
    /// requested one is decoded too.
    DecodeFrame {
        /// Container
        file: PathBuf,
        /// Zero-based frame index
        #[arg(short, long)]
        index: u32,
        /// Write raw YUVA bytes to a file instead of printing a hex dump
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(short, long, default_value = "lz4")]
        codec: String,
    },
    /// Play a vector animation headless and report what was presented
    Play {
        /// Vector animation (.json or .tgs)
        file: PathBuf,
        #[arg(short, long, value_enum, default_value_t = Mode::Cached)]
        mode: Mode,
        /// How long to play
        #[arg(short, long, default_value_t = 2.0)]
        seconds: f64,
        /// Canvas edge in pixels
        #[arg(long, default_value_t = DEFAULT_CANVAS_SIZE)]
        size: u32,
    },
    /// Benchmark sequential frame reconstruction over whole cycles
    Bench {
        /// Container
        file: PathBuf,
        /// Number of full animation cycles to decode
        #[arg(long, default_value_t = 10)]
        cycles: u32,
        #[arg(short, long, default_value = "lz4")]
        codec: String,
    },
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

fn read_container(file: &Path) -> anyhow::Result<Arc<[u8]>> {
    let bytes = std::fs::read(file).with_context(|| format!("reading container {:?}", file))?;
    Ok(bytes.into())
}

fn hex_dump(bytes: &[u8], limit: usize) {
    let preview = &bytes[..bytes.len().min(limit)];
    for (i, chunk) in preview.chunks(16).enumerate() {
        print!("  {:04x}  ", i * 16);
        for b in chunk {
            print!("{:02x} ", b);
        }
        for _ in chunk.len()..16 {
            print!("   ");
        }
        // One mark per pixel: '#' if any channel is set.
        print!("  |");
        for px in chunk.chunks(4) {
            print!(" {}", if px.iter().all(|b| *b == 0) { "." } else { "#" });
        }
        println!(" |");
    }
    if bytes.len() > limit {
        println!("  ... ({} bytes remaining not shown)", bytes.len() - limit);
    }
}

// ── Subcommand implementations ─────────────────────────────────────────────

fn run_encode(
    input: PathBuf,
    output: PathBuf,
    width: u32,
    height: u32,
    codec_name: &str,
) -> anyhow::Result<()> {
    let codec = codec_by_name(codec_name)?;
    let codec_display = codec.name();
    let payload =
        std::fs::read(&input).with_context(|| format!("opening input file {:?}", input))?;
    let unzip = unzip_codec_for(&payload);
    let cache_key = input.display().to_string();

    let t0 = Instant::now();
    let container = transcode_vector(
        &payload,
        &cache_key,
        width,
        height,
        unzip.as_ref(),
        &LottieBackend::new(),
        codec.clone(),
    )?;
    let elapsed = t0.elapsed();

    std::fs::write(&output, &container)
        .with_context(|| format!("creating output file {:?}", output))?;

    let header = ContainerHeader::parse(&container)?;
    let frames = frame_entries(&container)?.len() as u64;
    let raw = frames * header.frame_size() as u64;
    eprintln!("  codec       : {}", codec_display);
    eprintln!("  canvas      : {}x{} @ {} fps", width, height, header.fps);
    eprintln!("  frames      : {}", frames);
    eprintln!("  source      : {}", human_bytes(payload.len() as u64));
    eprintln!("  raw frames  : {}", human_bytes(raw));
    eprintln!("  container   : {}", human_bytes(container.len() as u64));
    eprintln!("  ratio       : {:.2}x", raw as f64 / container.len() as f64);
    eprintln!(
        "  throughput  : {:.1} frames/s",
        frames as f64 / elapsed.as_secs_f64()
    );
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

fn run_inspect(file: PathBuf, show_frames: bool, codec_name: &str) -> anyhow::Result<()> {
    let data = read_container(&file)?;
    let header = ContainerHeader::parse(&data)?;
    let entries = frame_entries(&data)?;
    let compressed: u64 = entries.iter().map(|e| e.length as u64).sum();
    let raw = entries.len() as u64 * header.frame_size() as u64;

    println!("=== Sticker container: {:?} ===", file);
    println!();
    println!("  canvas         : {}x{}", header.width, header.height);
    println!("  frame rate     : {} fps", header.fps);
    println!("  frame count    : {}", entries.len());
    println!(
        "  duration       : {:.2}s",
        entries.len() as f64 / header.fps as f64
    );
    println!("  frame size     : {}", human_bytes(header.frame_size() as u64));
    println!("  raw size       : {}", human_bytes(raw));
    println!("  compressed     : {}", human_bytes(compressed));
    println!("  file on disk   : {}", human_bytes(data.len() as u64));
    println!("  ratio          : {:.2}x", raw as f64 / data.len() as f64);

    if show_frames {
        let mut decoder = ContainerDecoder::open(data.clone(), codec_by_name(codec_name)?)?;
        println!();
        println!(
            "  {:>8}  {:>14}  {:>12}  {:>16}",
            "frame", "file offset", "compressed", "xxh3"
        );
        println!("  {}", "-".repeat(56));
        for (i, e) in entries.iter().enumerate() {
            let digest = xxh3_64(decoder.decode_next()?);
            println!(
                "  {:>8}  {:>14}  {:>12}  {:016x}",
                i,
                e.offset,
                human_bytes(e.length as u64),
                digest
            );
        }
    }

    Ok(())
}

fn run_decode_frame(
    file: PathBuf,
    index: u32,
    output: Option<PathBuf>,
    codec_name: &str,
) -> anyhow::Result<()> {
    let data = read_container(&file)?;
    let mut decoder = ContainerDecoder::open(data, codec_by_name(codec_name)?)?;
    let count = decoder.frame_count()?;
    if index >= count {
        anyhow::bail!("frame {} out of range: container has {} frames", index, count);
    }

    let t0 = Instant::now();
    for _ in 0..index {
        decoder.decode_next()?;
    }
    let frame = decoder.decode_next()?.to_vec();
    let elapsed = t0.elapsed();

    eprintln!(
        "  reconstructed frame {} ({} deltas) in {:.3}ms",
        index,
        index + 1,
        elapsed.as_secs_f64() * 1000.0
    );

    match output {
        Some(path) => {
            std::fs::write(&path, &frame)?;
            eprintln!("  written to {:?}", path);
        }
        None => {
            println!(
                "--- frame {} ({}x{} YUVA, {} bytes) ---",
                index,
                decoder.header.width,
                decoder.header.height,
                frame.len()
            );
            hex_dump(&frame, 256);
        }
    }

    Ok(())
}

fn run_play(file: PathBuf, mode: Mode, seconds: f64, size: u32) -> anyhow::Result<()> {
    let file = file
        .canonicalize()
        .with_context(|| format!("resolving {:?}", file))?;
    let root = file
        .parent()
        .context("animation file has no parent directory")?
        .to_path_buf();
    let key = file
        .file_name()
        .context("animation file has no name")?
        .to_string_lossy()
        .into_owned();

    let head = std::fs::read(&file).with_context(|| format!("reading {:?}", file))?;
    let unzip = unzip_codec_for(&head);
    let store = Arc::new(FsResourceStore::new(root));
    let backend = Arc::new(LottieBackend::new());
    let context = PlayerContext {
        executor: Arc::new(DecodeQueue::spawn("sticker-decode")?),
        clock: Arc::new(ThreadClock::spawn()?),
        store: store.clone(),
        transcoder: Arc::new(LocalTranscoder::new(
            store,
            unzip.clone(),
            backend.clone(),
            Arc::new(Lz4Codec),
        )),
        frame_codec: Arc::new(Lz4Codec),
        unzip,
        vector_backend: backend,
        config: PlayerConfig {
            canvas_width: size,
            canvas_height: size,
            ..PlayerConfig::default()
        },
    };

    let mode = match mode {
        Mode::Cached => PlaybackMode::Cached,
        Mode::Direct => PlaybackMode::Direct,
    };
    let mut player = context.player(SoftwareRenderer::new());
    let started_at = Instant::now();
    let first_frame = Arc::new(std::sync::Mutex::new(None::<Duration>));
    let first = first_frame.clone();
    player.on_playback_started(move || {
        if let Ok(mut slot) = first.lock() {
            slot.get_or_insert(started_at.elapsed());
        }
    });
    player.setup(key.as_str(), size, size, mode);
    player.set_visible(true);
    player.on_display_membership_changed(true);

    let window = Duration::from_secs_f64(seconds.max(0.0));
    player.pump_for(window);
    let presented = player.frames_presented();
    player.reset();

    let time_to_first = first_frame.lock().ok().and_then(|f| *f);
    println!("=== Played {:?} ({:?}) ===", file, mode);
    println!("  window           : {:.2}s", window.as_secs_f64());
    match time_to_first {
        Some(t) => println!("  first frame      : {:.1}ms", t.as_secs_f64() * 1000.0),
        None => println!("  first frame      : never"),
    }
    println!("  frames presented : {}", presented);
    if let Some(t) = time_to_first {
        let playing = window.saturating_sub(t).as_secs_f64();
        if playing > 0.0 {
            println!("  effective rate   : {:.1} fps", presented as f64 / playing);
        }
    }
    if let Some((w, h, rgba)) = player.renderer().last_frame() {
        println!("  last frame       : {}x{} xxh3={:016x}", w, h, xxh3_64(rgba));
    }
    Ok(())
}

fn run_bench(file: PathBuf, cycles: u32, codec_name: &str) -> anyhow::Result<()> {
    let data = read_container(&file)?;
    let mut decoder = ContainerDecoder::open(data, codec_by_name(codec_name)?)?;
    let frame_count = decoder.frame_count()?;
    let total = frame_count as u64 * cycles.max(1) as u64;

    eprintln!(
        "benchmarking {} cycles of {} frames ({}x{})...",
        cycles.max(1),
        frame_count,
        decoder.header.width,
        decoder.header.height
    );

    let t0 = Instant::now();
    let mut latencies_us: Vec<u64> = Vec::with_capacity(total as usize);
    for _ in 0..total {
        let t = Instant::now();
        decoder.decode_next()?;
        latencies_us.push(t.elapsed().as_micros() as u64);
    }
    let elapsed = t0.elapsed();
    latencies_us.sort_unstable();

    let pct = |p: f64| latencies_us[((latencies_us.len() as f64 * p) as usize).min(latencies_us.len() - 1)];
    let raw = total * decoder.header.frame_size() as u64;
    let budget_us = 1_000_000 / decoder.header.fps as u64;

    println!();
    println!("=== Sequential Frame Decode Benchmark ===");
    println!("  frames      : {}", total);
    println!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    println!(
        "  throughput  : {}/s ({:.0} frames/s)",
        human_bytes((raw as f64 / elapsed.as_secs_f64()) as u64),
        total as f64 / elapsed.as_secs_f64()
    );
    println!("  latency:");
    println!("    min  : {} µs", latencies_us[0]);
    println!("    p50  : {} µs", pct(0.50));
    println!("    p95  : {} µs", pct(0.95));
    println!("    p99  : {} µs", pct(0.99));
    println!("    max  : {} µs", latencies_us[latencies_us.len() - 1]);
    println!("  frame budget at {} fps : {} µs", decoder.header.fps, budget_us);

    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Encode {
            input,
            output,
            width,
            height,
            codec,
        } => run_encode(input, output, width, height, &codec),
        Commands::Inspect {
            file,
            frames,
            codec,
        } => run_inspect(file, frames, &codec),
        Commands::DecodeFrame {
            file,
            index,
            output,
            codec,
        } => run_decode_frame(file, index, output, &codec),
        Commands::Play {
            file,
            mode,
            seconds,
            size,
        } => run_play(file, mode, seconds, size),
        Commands::Bench {
            file,
            cycles,
            codec,
        } => run_bench(file, cycles, &codec),
    }
}
