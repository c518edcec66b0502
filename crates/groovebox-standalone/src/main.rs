//! groovebox-standalone: runs the engine on the default audio device with
//! its own tempo and built-in drum kits, driven from stdin

mod config;
mod console;

use std::io::BufRead;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use console::Action;
use groovebox_core::MidiBuffer;
use groovebox_core::limits::PLAYER_COUNT;
use groovebox_services::{
    DrumRack, Engine, EngineHandle, Metronome, Mixer, RealtimeOutputStream, default_output_info,
};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const HOUSEKEEPING_INTERVAL: Duration = Duration::from_millis(50);

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("groovebox=debug".parse()?)
            .add_directive("cpal=warn".parse()?))
        .init();

    info!("Starting groovebox");

    if !config::config_path().exists() {
        config::save_config(&config::AppConfig::default());
    }
    let config = config::load_config();

    let (device, sample_rate, channels) = default_output_info().context("querying output device")?;
    info!(device = %device, sample_rate, channels, "Using output device");

    let (engine, handle) = Engine::new(sample_rate as f64);
    assign_kit_channels(&handle);
    restore_session(&handle, &config.session);

    let _stream = start_stream(engine, sample_rate, config.audio.block_size, config.audio.max_block_size)?;

    let running = Arc::new(AtomicBool::new(true));
    let housekeeping = spawn_housekeeping(handle.clone(), running.clone());

    println!("{}", console::HELP);
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        match console::parse(&line) {
            Ok(Some(Action::Quit)) => break,
            Ok(Some(action)) => {
                if let Err(e) = run(&handle, action) {
                    println!("error: {e:#}");
                }
            }
            Ok(None) => {}
            Err(e) => println!("error: {e:#}"),
        }
    }

    let _ = handle.panic();
    running.store(false, Ordering::Relaxed);
    let _ = housekeeping.join();
    info!("Stopped groovebox");
    Ok(())
}

/// Give each player its own channel so each kit lands on its own mixer
/// strip; restored settings may override this
fn assign_kit_channels(handle: &EngineHandle) {
    for player in 0..PLAYER_COUNT {
        if let Err(e) = handle.set_output_channel(player, player as u8) {
            warn!(player, error = %e, "Could not assign kit channel");
        }
    }
}

fn restore_session(handle: &EngineHandle, session: &config::SessionConfig) {
    if let Some(path) = &session.settings_path {
        if let Err(e) = handle.load_settings(path) {
            warn!(path = %path.display(), error = %e, "Could not restore settings");
        }
    }
    for (player, path) in session.pattern_files.iter().enumerate() {
        if let Err(e) = handle.load_pattern_file(player, 0, path) {
            warn!(player, path = %path.display(), error = %e, "Could not load pattern");
        }
    }
}

/// Open the device with the engine, kits, mixer and click owned by the callback
fn start_stream(
    mut engine: Engine,
    sample_rate: u32,
    block_size: Option<u32>,
    max_block_size: usize,
) -> Result<RealtimeOutputStream> {
    let shared = engine.shared();
    let max_block_size = max_block_size.max(block_size.unwrap_or(0) as usize).max(64);
    let mut mixer = Mixer::new(shared.clone(), sample_rate as f32, max_block_size);
    let mut metronome = Metronome::new(sample_rate as f32);
    let mut kits = DrumRack::new(sample_rate as f32, max_block_size);
    let mut midi = MidiBuffer::default();
    let mut stereo = vec![0.0f32; max_block_size * 2];

    let stream = RealtimeOutputStream::start(block_size, move |data, _, channels| {
        let channels = channels.max(1) as usize;
        for chunk in data.chunks_mut(max_block_size * channels) {
            let frames = chunk.len() / channels;
            let span = engine.process_block(frames, &[], None, &mut midi);
            let routes: [u8; PLAYER_COUNT] =
                std::array::from_fn(|i| engine.player(i).map_or(i as u8, |player| player.output_channel));

            let out = &mut stereo[..frames * 2];
            if !kits.render(&midi, &routes, frames) || !mixer.process_block(&kits.outputs(frames), out) {
                out.fill(0.0);
            }
            match &span {
                Some(span) if shared.metronome.load(Ordering::Relaxed) => {
                    metronome.render(span, engine.transport().beats_per_bar(), out);
                }
                Some(_) => {}
                None => metronome.reset(),
            }

            for (frame, stereo_frame) in chunk.chunks_exact_mut(channels).zip(out.chunks_exact(2)) {
                for (channel, sample) in frame.iter_mut().enumerate() {
                    *sample = stereo_frame.get(channel).copied().unwrap_or(0.0);
                }
            }
        }
    })
    .context("starting output stream")?;
    Ok(stream)
}

/// Drains engine events and drops retired objects off the audio thread
fn spawn_housekeeping(handle: EngineHandle, running: Arc<AtomicBool>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while running.load(Ordering::Relaxed) {
            for event in handle.events() {
                debug!(?event, "Engine event");
            }
            handle.collect_garbage();
            thread::sleep(HOUSEKEEPING_INTERVAL);
        }
    })
}

fn run(handle: &EngineHandle, action: Action) -> Result<()> {
    match action {
        Action::Play => handle.play()?,
        Action::Stop => handle.stop()?,
        Action::Pause => handle.pause()?,
        Action::Continue => handle.continue_playback()?,
        Action::Panic => handle.panic()?,
        Action::Quit => {}
        Action::Help => println!("{}", console::HELP),
        Action::Status => println!(
            "{} bar {} beat {:.2} tempo {:.1}{}",
            if handle.is_playing() { "playing" } else { "stopped" },
            handle.current_bar() + 1,
            handle.current_beat(),
            handle.tempo(),
            if handle.is_recording() { " [rec]" } else { "" },
        ),
        Action::Tempo(bpm) => handle.set_tempo(bpm)?,
        Action::Metronome(enabled) => handle.set_metronome(enabled),
        Action::SendClock(enabled) => handle.set_send_clock(enabled)?,
        Action::Swing(player, amount) => handle.set_swing(player, amount),
        Action::Energy(player, amount) => handle.set_energy(player, amount),
        Action::Humanize(player, amount) => handle.set_humanization(player, amount),
        Action::Pattern { player, slot, bars: Some(bars) } => handle.queue_pattern_change(player, slot, bars)?,
        Action::Pattern { player, slot, bars: None } => handle.select_pattern(player, slot)?,
        Action::Fill(player) => handle.trigger_fill(player)?,
        Action::Load { player, slot, path } => handle.load_pattern_file(player, slot, &path)?,
        Action::SceneSave(index, name) => handle.save_scene(index, &name)?,
        Action::SceneLoad(index) => handle.load_scene(index)?,
        Action::SceneTrigger(index) => handle.trigger_scene(index)?,
        Action::SceneQueue(index, bars) => handle.queue_scene_change(index, bars)?,
        Action::SceneClear(index) => handle.clear_scene(index)?,
        Action::Record { overdub } => handle.start_live_recording(overdub)?,
        Action::RecordStop => handle.stop_live_recording()?,
        Action::Export(path) => handle.export_recording(&path, None, 0)?,
        Action::Learn(parameter) => handle.start_midi_learn(parameter)?,
        Action::Set(parameter, value) => handle.send_midi_feedback(parameter, value)?,
        Action::SaveSettings(path) => handle.save_settings(&path)?,
        Action::LoadSettings(path) => handle.load_settings(&path)?,
    }
    Ok(())
}
