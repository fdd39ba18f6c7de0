use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use gswitch::config::Config;
use gswitch::devices::SystemRegistry;
use gswitch::driver::SystemDriver;
use gswitch::worker::SwitchWorker;
use gswitch::{GpuManager, list_gpu_names, logging};

fn print_usage() {
    println!("gswitch_daemon - hold the GPU mux connection and apply the launch mode");
    println!();
    println!("Usage:");
    println!("  gswitch_daemon [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --config <path>   Config file (default: <config dir>/gswitch/config.toml)");
    println!("  --help            Show this help");
    println!();
    println!("On Ctrl+C the daemon restores dynamic switching (shutdown.restore-dynamic)");
    println!("and closes the driver connection.");
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_usage();
                process::exit(0);
            }
            "--config" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                } else {
                    eprintln!("Error: --config requires an argument");
                    process::exit(1);
                }
            }
            arg => {
                eprintln!("Unknown argument: {arg}");
                eprintln!();
                print_usage();
                process::exit(1);
            }
        }
        i += 1;
    }

    let config = Config::load_or_default(config_path.as_deref())?;
    logging::setup(
        logging::level_filter(&config.logging.level),
        config.logging.file.as_deref(),
    )?;

    for name in list_gpu_names(&SystemRegistry::default()) {
        log::info!("Found GPU: {name}");
    }

    let mut manager = GpuManager::new(SystemDriver::default());
    manager.connect()?;

    match config.launch.mode {
        Some(mode) => log::info!("Applying launch mode {mode}"),
        None => log::info!("No launch mode configured, leaving the mux as it is"),
    }
    let worker = SwitchWorker::spawn_with_launch(manager, config.launch.mode);

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(200));
    }

    log::info!("Shutting down");
    let report = worker.shutdown(config.shutdown.restore_dynamic);
    for (mode, ok) in &report.applied {
        log::info!("{mode}: {}", if *ok { "ok" } else { "failed" });
    }
    if !report.closed {
        log::error!("Driver connection was not closed cleanly");
        process::exit(1);
    }
    Ok(())
}
