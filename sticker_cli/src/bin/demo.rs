//! Sticker playback demo
//!
//! Synthesises a gzip-wrapped Lottie animation, transcodes it into a
//! delta-frame container, then compares the two playback paths: decoding
//! cached container frames against rendering the vector program on every
//! tick, both headless and through the real player.

use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use flate2::write::GzEncoder;
use flate2::Compression as GzCompression;

use sticker_codecs::{GzipCodec, LottieBackend, Lz4Codec};
use sticker_core::format::frame_entries;
use sticker_core::{transcode_vector, ContainerDecoder, FrameSource, VectorDecoder};
use sticker_player::{
    DecodeQueue, FsResourceStore, LocalTranscoder, PlaybackMode, PlayerConfig, PlayerContext,
    SoftwareRenderer, ThreadClock,
};

// ── constants ──────────────────────────────────────────────────────────────

const COMPOSITION: u32 = 512;
const CANVAS: u32 = 256;
const FRAMES: u32 = 60;
const FPS: u32 = 60;
const PLAY_WINDOW: Duration = Duration::from_millis(1500);

const COLORS: &[[f32; 3]] = &[
    [0.95, 0.26, 0.21],
    [0.13, 0.59, 0.95],
    [0.30, 0.69, 0.31],
    [1.00, 0.76, 0.03],
    [0.61, 0.15, 0.69],
];

// ── data generator ─────────────────────────────────────────────────────────

/// A shape layer holding one ellipse that travels from `from` to `to` and back.
fn dot_layer(index: usize, from: [u32; 2], to: [u32; 2], size: u32) -> String {
    let [r, g, b] = COLORS[index % COLORS.len()];
    let half = FRAMES / 2;
    format!(
        r#"{{"ty": 4, "ip": 0, "op": {FRAMES},
            "ks": {{"p": {{"a": 1, "k": [
                {{"t": 0, "s": [{fx}, {fy}]}},
                {{"t": {half}, "s": [{tx}, {ty}]}},
                {{"t": {FRAMES}, "s": [{fx}, {fy}]}}
            ]}}}},
            "shapes": [{{"ty": "gr", "it": [
                {{"ty": "el", "p": {{"k": [0, 0]}}, "s": {{"k": [{size}, {size}]}}}},
                {{"ty": "fl", "c": {{"k": [{r}, {g}, {b}, 1]}}, "o": {{"k": 100}}}},
                {{"ty": "tr", "p": {{"k": [0, 0]}}}}
            ]}}]}}"#,
        fx = from[0],
        fy = from[1],
        tx = to[0],
        ty = to[1],
    )
}

/// Deterministic Lottie document: a row of bouncing dots on a flat background.
fn generate_lottie() -> String {
    let mut layers: Vec<String> = (0..COLORS.len())
        .map(|i| {
            let x = 64 + i as u32 * 96;
            dot_layer(i, [x, 96], [x, 416 - i as u32 * 24], 48 + i as u32 * 8)
        })
        .collect();
    layers.push(format!(
        r##"{{"ty": 1, "ip": 0, "op": {FRAMES}, "sc": "#f5f5f5", "sw": {COMPOSITION}, "sh": {COMPOSITION}, "ks": {{}}}}"##
    ));
    format!(
        r#"{{"v": "5.7.0", "fr": {FPS}, "ip": 0, "op": {FRAMES}, "w": {COMPOSITION}, "h": {COMPOSITION}, "layers": [{}]}}"#,
        layers.join(",")
    )
}

fn gzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut enc = GzEncoder::new(Vec::new(), GzCompression::default());
    enc.write_all(bytes)?;
    Ok(enc.finish()?)
}

// ── timing ─────────────────────────────────────────────────────────────────

fn human_bytes(n: u64) -> String {
    const U: &[&str] = &["B", "KB", "MB", "GB"];
    let mut v = n as f64;
    let mut u = 0;
    while v >= 1024.0 && u < U.len() - 1 { v /= 1024.0; u += 1; }
    if u == 0 { format!("{n} B") } else { format!("{v:.2} {}", U[u]) }
}

fn fmt_duration(d: Duration) -> String {
    let ms = d.as_secs_f64() * 1000.0;
    if ms < 1.0 {
        format!("{:.1} µs", ms * 1000.0)
    } else if ms < 1000.0 {
        format!("{ms:.1} ms")
    } else {
        format!("{:.2} s", d.as_secs_f64())
    }
}

/// Per-frame latencies of `cycles` passes over a frame source.
fn frame_latencies(source: &mut dyn FrameSource, frames: u32, cycles: u32) -> Result<Vec<Duration>> {
    let mut lats = Vec::with_capacity((frames * cycles) as usize);
    for _ in 0..frames * cycles {
        let t = Instant::now();
        source.next_frame()?;
        lats.push(t.elapsed());
    }
    lats.sort_unstable();
    Ok(lats)
}

// ── headless player ────────────────────────────────────────────────────────

struct PlayReport {
    first_frame: Option<Duration>,
    presented: u64,
}

fn play(dir: &Path, key: &str, mode: PlaybackMode) -> Result<PlayReport> {
    let store = Arc::new(FsResourceStore::new(dir));
    let backend = Arc::new(LottieBackend::new());
    let context = PlayerContext {
        executor: Arc::new(DecodeQueue::spawn("sticker-decode")?),
        clock: Arc::new(ThreadClock::spawn()?),
        store: store.clone(),
        transcoder: Arc::new(LocalTranscoder::new(
            store,
            Arc::new(GzipCodec::default()),
            backend.clone(),
            Arc::new(Lz4Codec),
        )),
        frame_codec: Arc::new(Lz4Codec),
        unzip: Arc::new(GzipCodec::default()),
        vector_backend: backend,
        config: PlayerConfig {
            canvas_width: CANVAS,
            canvas_height: CANVAS,
            ..PlayerConfig::default()
        },
    };

    let mut player = context.player(SoftwareRenderer::new());
    let t0 = Instant::now();
    let first = Arc::new(Mutex::new(None::<Duration>));
    let slot = first.clone();
    player.on_playback_started(move || {
        if let Ok(mut slot) = slot.lock() {
            slot.get_or_insert(t0.elapsed());
        }
    });
    player.set_visible(true);
    player.on_display_membership_changed(true);
    player.setup(key, CANVAS, CANVAS, mode);
    player.pump_for(PLAY_WINDOW);

    let presented = player.frames_presented();
    player.reset();
    let first_frame = first.lock().ok().and_then(|f| *f);
    Ok(PlayReport {
        first_frame,
        presented,
    })
}

// ── main flow ──────────────────────────────────────────────────────────────

fn run() -> Result<()> {
    env_logger::init();
    let out_dir = std::env::temp_dir().join("sticker_demo");
    std::fs::create_dir_all(&out_dir)?;

    println!();
    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║            Animated sticker playback  ·  cached vs direct        ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();

    // ── Phase 1: Source asset ─────────────────────────────────────────────
    section("1 · SOURCE ASSET");
    let json = generate_lottie();
    let payload = gzip(json.as_bytes())?;
    let asset_path = out_dir.join("demo.tgs");
    std::fs::write(&asset_path, &payload)?;
    println!("  composition    : {COMPOSITION}x{COMPOSITION}, {FRAMES} frames @ {FPS} fps");
    println!("  lottie json    : {}", human_bytes(json.len() as u64));
    println!("  gzip wrapped   : {}", human_bytes(payload.len() as u64));
    println!();

    // ── Phase 2: Transcode ────────────────────────────────────────────────
    section("2 · TRANSCODE TO DELTA-FRAME CONTAINER");
    let backend = LottieBackend::new();
    let unzip = GzipCodec::default();
    let t0 = Instant::now();
    let container = transcode_vector(
        &payload,
        "demo.tgs",
        CANVAS,
        CANVAS,
        &unzip,
        &backend,
        Arc::new(Lz4Codec),
    )?;
    let transcode_time = t0.elapsed();
    let entries = frame_entries(&container)?;
    let raw = entries.len() as u64 * (CANVAS * CANVAS * 4) as u64;
    let largest = entries.iter().map(|e| e.length).max().unwrap_or(0);
    let smallest = entries.iter().map(|e| e.length).min().unwrap_or(0);
    println!("  canvas         : {CANVAS}x{CANVAS} YUVA");
    println!("  frames         : {}", entries.len());
    println!("  raw frames     : {}", human_bytes(raw));
    println!("  container      : {}", human_bytes(container.len() as u64));
    println!("  ratio          : {:.1}x", raw as f64 / container.len() as f64);
    println!(
        "  delta sizes    : {} .. {}",
        human_bytes(smallest as u64),
        human_bytes(largest as u64)
    );
    println!("  transcode time : {}", fmt_duration(transcode_time));
    println!();

    // ── Phase 3: Per-frame cost ───────────────────────────────────────────
    section("3 · PER-FRAME COST  ·  3 cycles each");
    let mut cached = ContainerDecoder::open(container.clone().into(), Arc::new(Lz4Codec))?;
    let cached_lats = frame_latencies(&mut cached, FRAMES, 3)?;
    let mut direct = VectorDecoder::open(&payload, "demo.tgs", &unzip, &backend, CANVAS, CANVAS)?;
    let direct_lats = frame_latencies(&mut direct, FRAMES, 3)?;

    let budget = Duration::from_secs_f64(1.0 / FPS as f64);
    println!("  {:<22}  {:>10}  {:>10}  {:>10}", "path", "p50", "p95", "max");
    println!("  {}", "─".repeat(58));
    for (label, lats) in [("cached (lz4 + xor)", &cached_lats), ("direct (rasterise)", &direct_lats)] {
        let pct = |p: f64| lats[((lats.len() as f64 * p) as usize).min(lats.len() - 1)];
        println!(
            "  {:<22}  {:>10}  {:>10}  {:>10}",
            label,
            fmt_duration(pct(0.50)),
            fmt_duration(pct(0.95)),
            fmt_duration(lats[lats.len() - 1]),
        );
    }
    println!("  frame budget at {FPS} fps: {}", fmt_duration(budget));
    println!();

    // ── Phase 4: Real player ──────────────────────────────────────────────
    section("4 · PLAYER  ·  shared decode worker, real clock");
    let expected = PLAY_WINDOW.as_secs_f64() * FPS as f64;
    let mut reports = Vec::new();
    for (label, mode) in [("cached", PlaybackMode::Cached), ("direct", PlaybackMode::Direct)] {
        let report = play(&out_dir, "demo.tgs", mode)?;
        println!(
            "  {:<8} first frame after {:>10}, {:>4} frames presented (~{:.0} possible)",
            label,
            report.first_frame.map_or("never".to_string(), fmt_duration),
            report.presented,
            expected
        );
        reports.push((label, report));
    }
    println!();

    // ── Summary ───────────────────────────────────────────────────────────
    section("SUMMARY");
    let p50 = |lats: &[Duration]| lats[lats.len() / 2];
    println!("  {:<40}  {}", "Container size vs raw frames:", format!("{:.1}x smaller", raw as f64 / container.len() as f64));
    println!("  {:<40}  {}", "Container size vs gzip source:", format!("{:.1}x", container.len() as f64 / payload.len() as f64));
    println!("  {:<40}  {}", "Cached frame p50:", fmt_duration(p50(&cached_lats)));
    println!("  {:<40}  {}", "Direct frame p50:", fmt_duration(p50(&direct_lats)));
    for (label, report) in &reports {
        println!("  {:<40}  {}", format!("Frames presented ({label}):"), report.presented);
    }
    println!();

    let _ = std::fs::remove_file(&asset_path);
    Ok(())
}

// ── small helpers ──────────────────────────────────────────────────────────

fn section(title: &str) {
    println!("━━━ {title} {}", "━".repeat(70usize.saturating_sub(title.len() + 5)));
}

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
