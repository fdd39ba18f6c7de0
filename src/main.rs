use std::path::PathBuf;
use std::process;

use gswitch::config::Config;
use gswitch::devices::SystemRegistry;
use gswitch::driver::SystemDriver;
use gswitch::{GpuManager, SwitcherMode, list_gpu_names, logging};

fn print_usage(program: &str) {
    println!("gswitch - query and switch the active GPU of a dual-GPU laptop");
    println!();
    println!("Usage:");
    println!("  {program} [OPTIONS] <COMMAND>");
    println!();
    println!("Commands:");
    println!("  status [--json]   Show the active GPU and dynamic switching state");
    println!("  integrated        Force the integrated GPU");
    println!("  discrete          Force the discrete GPU");
    println!("  dynamic           Restore dynamic switching");
    println!("  gpus              List the installed GPUs");
    println!();
    println!("Options:");
    println!("  --config <path>   Config file (default: <config dir>/gswitch/config.toml)");
    println!("  --verbose         Log at debug level");
    println!("  --help            Show this help");
}

enum Command {
    Status { json: bool },
    Switch(SwitcherMode),
    Gpus,
}

fn on_off(value: Option<bool>, yes: &str, no: &str) -> String {
    match value {
        Some(true) => yes.to_string(),
        Some(false) => no.to_string(),
        None => "unknown".to_string(),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("gswitch");

    let mut config_path: Option<PathBuf> = None;
    let mut verbose = false;
    let mut json = false;
    let mut command: Option<&str> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_usage(program);
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
            "--verbose" | "-v" => verbose = true,
            "--json" => json = true,
            arg if command.is_none() && !arg.starts_with('-') => command = Some(arg),
            arg => {
                eprintln!("Unknown argument: {arg}");
                eprintln!();
                print_usage(program);
                process::exit(1);
            }
        }
        i += 1;
    }

    let command = match command {
        Some("status") => Command::Status { json },
        Some("gpus") => Command::Gpus,
        Some(mode) => match mode.parse() {
            Ok(mode) => Command::Switch(mode),
            Err(e) => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        },
        None => {
            print_usage(program);
            process::exit(1);
        }
    };

    let config = Config::load_or_default(config_path.as_deref())?;
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        logging::level_filter(&config.logging.level)
    };
    logging::setup(level, config.logging.file.as_deref())?;

    if let Command::Gpus = command {
        for name in list_gpu_names(&SystemRegistry::default()) {
            println!("{name}");
        }
        return Ok(());
    }

    let mut manager = GpuManager::new(SystemDriver::default());
    manager.connect()?;

    let ok = match command {
        Command::Status { json: true } => {
            let document = serde_json::json!({
                "status": manager.status(),
                "gpus": list_gpu_names(&SystemRegistry::default()),
            });
            println!("{}", serde_json::to_string_pretty(&document)?);
            true
        }
        Command::Status { json: false } => {
            let status = manager.status();
            println!(
                "Active GPU:        {}",
                on_off(status.integrated, "integrated", "discrete")
            );
            println!(
                "Dynamic switching: {}",
                on_off(status.dynamic, "enabled", "disabled")
            );
            for name in list_gpu_names(&SystemRegistry::default()) {
                println!("GPU:               {name}");
            }
            true
        }
        Command::Switch(mode) => {
            let ok = manager.request_mode(mode);
            if ok {
                println!("Switched to {mode}");
            } else {
                eprintln!("Switching to {mode} failed");
            }
            ok
        }
        Command::Gpus => true,
    };

    let closed = manager.close();
    if !ok || !closed {
        process::exit(1);
    }
    Ok(())
}
