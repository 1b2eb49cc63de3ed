use crate::cli::{Cli, Commands};
use ffsqueeze::config::Config;
use ffsqueeze::engine::capability::CapabilityMatrix;
use ffsqueeze::engine::controller::JobController;
use ffsqueeze::engine::core::{
    AudioPolicy, Backend, BitratePlan, Codec, EncodeJob, FALLBACK_AUDIO_KBPS, JobEvent,
    PresetTier, TerminalStatus, build_pass_cmd, encoder_name, ffmpeg_version, ffprobe_version,
    format_ffmpeg_cmd, probe_audio_bitrate_kbps, probe_duration, resolve_audio_kbps,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

pub fn run(mut cli: Cli) {
    if let Some(command) = cli.command.take() {
        match command {
            Commands::CheckFfmpeg => handle_check_ffmpeg(),
            Commands::DetectHw => handle_detect_hw(),
            Commands::Probe { file } => handle_probe(file),
            Commands::DryRun { input } => handle_dry_run(input, &cli),
            Commands::InitConfig => handle_init_config(),
        }
        return;
    }

    let Some(input) = cli.input.take() else {
        eprintln!("Error: no input file given (see --help)");
        process::exit(2);
    };

    if let Err(e) = run_compress(input, &cli) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

/// Effective settings for one invocation: CLI flags over stored defaults
struct JobSettings {
    codec: Codec,
    backend: Backend,
    preset: PresetTier,
    audio: AudioPolicy,
    target_mb: f64,
}

fn resolve_settings(cli: &Cli, config: &Config) -> JobSettings {
    JobSettings {
        codec: cli.codec.unwrap_or(config.defaults.codec),
        backend: cli.backend.unwrap_or(config.defaults.backend),
        preset: cli.preset.unwrap_or(config.defaults.preset),
        audio: cli.audio.unwrap_or(config.defaults.audio),
        target_mb: cli.target_mb.unwrap_or(config.defaults.target_mb),
    }
}

/// Default output path: `<stem><suffix>.mp4` beside the input
fn derive_output_path(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{}{}.mp4", stem, suffix))
}

fn run_compress(input: PathBuf, cli: &Cli) -> anyhow::Result<()> {
    let mut config = Config::load().unwrap_or_default();
    let settings = resolve_settings(cli, &config);

    // Settings-changed notification: persist only when a flag actually moved
    // a stored default
    if config.apply_job_settings(
        settings.codec,
        settings.backend,
        settings.preset,
        settings.audio,
        settings.target_mb,
    ) {
        if let Err(e) = config.save() {
            eprintln!("Warning: could not persist settings: {:#}", e);
        }
    }

    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| derive_output_path(&input, &config.defaults.output_suffix));
    let target_bytes = (settings.target_mb * 1024.0 * 1024.0) as u64;

    println!("Input:  {}", input.display());
    println!("Output: {}", output.display());
    println!(
        "Target: {:.1} MB ({} via {}, {} preset, audio {})",
        settings.target_mb, settings.codec, settings.backend, settings.preset, settings.audio
    );

    let job = EncodeJob::new(
        input,
        output.clone(),
        target_bytes,
        settings.codec,
        settings.backend,
        settings.preset,
        settings.audio,
    );

    // Session capability matrix; software-only jobs need no trials
    let caps = if job.backend.is_hardware() {
        println!("Probing hardware encoders (one trial per codec/vendor, up to 8 s each)...");
        CapabilityMatrix::probe()
    } else {
        CapabilityMatrix::new()
    };

    install_sigint_handler();

    let mut controller = JobController::new();
    controller.start(job, caps)?;

    loop {
        if sigint_requested() && controller.is_running() {
            controller.cancel();
        }

        match controller.events().recv_timeout(Duration::from_millis(100)) {
            Ok(JobEvent::Log(line)) => {
                let _ = append_job_log(&line);
            }
            Ok(JobEvent::PassStarted { pass }) => {
                println!("Pass {} of 2...", pass);
            }
            Ok(JobEvent::Progress {
                fraction, speed, ..
            }) => {
                print!("\rProgress: {:>5.1}%", fraction * 100.0);
                if let Some(speed) = speed {
                    print!(" | Speed: {:.2}x", speed);
                }
                std::io::stdout().flush().ok();
            }
            Ok(JobEvent::Finished(status)) => {
                println!();
                match status {
                    TerminalStatus::Success => println!("Done: {}", output.display()),
                    TerminalStatus::Failed(reason) => {
                        eprintln!("Failed: {}", reason);
                        process::exit(1);
                    }
                    TerminalStatus::Canceled => {
                        eprintln!(
                            "Canceled. Any partial output at {} is not valid.",
                            output.display()
                        );
                        process::exit(130);
                    }
                }
                break;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    Ok(())
}

fn handle_check_ffmpeg() {
    match ffmpeg_version() {
        Ok(version) => {
            println!("ffmpeg found: {}", version);
            match ffprobe_version() {
                Ok(probe_version) => {
                    println!("ffprobe found: {}", probe_version);
                    process::exit(0);
                }
                Err(e) => {
                    eprintln!("Error: {:#}", e);
                    process::exit(1);
                }
            }
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

fn handle_detect_hw() {
    println!("Running encoder capability trials (up to 8 s each)...");
    let matrix = CapabilityMatrix::probe();

    for codec in Codec::ALL {
        println!("\n{}:", codec);
        let note = if codec == Codec::Av1 {
            " - not selectable in target-size mode"
        } else {
            ""
        };
        println!(
            "  OK   {} ({}){}",
            Backend::Software,
            encoder_name(codec, Backend::Software),
            note
        );

        for backend in Backend::HARDWARE {
            match matrix.status(codec, backend) {
                Some(status) if status.available => {
                    println!("  OK   {} ({})", backend, encoder_name(codec, backend));
                }
                Some(status) => {
                    println!(
                        "  skip {} ({}) -> {}",
                        backend,
                        encoder_name(codec, backend),
                        status.detail.as_deref().unwrap_or("unavailable")
                    );
                }
                None => {}
            }
        }
    }
}

fn handle_probe(file: PathBuf) {
    match probe_duration(&file) {
        Ok(duration) => {
            println!("Duration: {:.2} seconds", duration);
            match probe_audio_bitrate_kbps(&file) {
                Some(kbps) => println!("Audio bitrate: {} kbps", kbps),
                None => println!(
                    "Audio bitrate: undeterminable (copy policy assumes {} kbps)",
                    FALLBACK_AUDIO_KBPS
                ),
            }
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

fn handle_dry_run(input: PathBuf, cli: &Cli) {
    let config = Config::load().unwrap_or_default();
    let settings = resolve_settings(cli, &config);

    let duration = match probe_duration(&input) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    };

    let audio_kbps = resolve_audio_kbps(settings.audio, &input);
    let target_bytes = (settings.target_mb * 1024.0 * 1024.0) as u64;
    let plan = match BitratePlan::compute(target_bytes, duration, audio_kbps) {
        Ok(plan) => plan,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| derive_output_path(&input, &config.defaults.output_suffix));
    let job = EncodeJob::new(
        input,
        output,
        target_bytes,
        settings.codec,
        settings.backend,
        settings.preset,
        settings.audio,
    );

    for pass in 1..=2u8 {
        println!("{}", format_ffmpeg_cmd(&build_pass_cmd(&job, &plan, pass)));
    }
}

fn handle_init_config() {
    match Config::load() {
        Ok(cfg) => {
            match Config::config_path() {
                Ok(path) => println!("Config loaded successfully from {}", path.display()),
                Err(e) => println!("Config loaded, but config path unknown: {:#}", e),
            }
            println!("{:#?}", cfg);
        }
        Err(e) => {
            println!("Config missing or invalid: {:#}", e);
            println!("Creating default config...");

            let cfg = Config::default();
            if let Err(err) = cfg.save() {
                eprintln!("Failed to save default config: {:#}", err);
                process::exit(1);
            } else {
                match Config::config_path() {
                    Ok(path) => println!("Default config saved to {}", path.display()),
                    Err(e) => println!("Default config saved (path unknown): {:#}", e),
                }
            }
        }
    }
}

/// Append one raw job-log line to ffsqueeze.log in the current directory
fn append_job_log(message: &str) -> anyhow::Result<()> {
    use std::fs::OpenOptions;

    let log_path = std::env::current_dir()?.join("ffsqueeze.log");
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;

    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    writeln!(file, "[{}] {}", timestamp, message)?;
    Ok(())
}

static SIGINT_FLAG: AtomicBool = AtomicBool::new(false);

fn sigint_requested() -> bool {
    SIGINT_FLAG.load(Ordering::Relaxed)
}

#[cfg(unix)]
fn install_sigint_handler() {
    extern "C" fn on_sigint(_signum: libc::c_int) {
        SIGINT_FLAG.store(true, Ordering::Relaxed);
    }

    unsafe {
        libc::signal(
            libc::SIGINT,
            on_sigint as extern "C" fn(libc::c_int) as libc::sighandler_t,
        );
    }
}

#[cfg(not(unix))]
fn install_sigint_handler() {}
