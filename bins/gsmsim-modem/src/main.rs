use clap::Parser;

use std::sync::Arc;

use gsmsim_config::{SharedConfig, toml_config};
use gsmsim_core::debug;
use gsmsim_modem::{CallStateHandle, ModelInterpreter, SimulatedGsmCallState, SimulatedRadioControl, TcpModemServer};

/// Load configuration file
fn load_config_from_toml(cfg_path: &str) -> SharedConfig {
    match toml_config::from_file(cfg_path) {
        Ok(c) => c,
        Err(e) => {
            println!("Failed to load configuration from {}: {}", cfg_path, e);
            std::process::exit(1);
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Simulated GSM modem",
    long_about = "Serves a simulated GSM modem AT interpreter over TCP using the provided TOML configuration file"
)]
struct Args {
    /// Config file (required)
    #[arg(help = "TOML config with server and call state parameters")]
    config: String,
}

fn main() {
    let args = Args::parse();
    let cfg = load_config_from_toml(&args.config);
    let _log_guard = match debug::setup_logging_default(cfg.config().debug_log.clone()) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to open debug log: {}", e);
            std::process::exit(1);
        }
    };

    let sim = SimulatedGsmCallState::from_config(&cfg.config().call_state);
    let (call_state, worker) = match CallStateHandle::spawn(sim) {
        Ok(spawned) => spawned,
        Err(e) => {
            tracing::error!("failed to start call state worker: {}", e);
            std::process::exit(1);
        }
    };
    let interpreter = Arc::new(ModelInterpreter::from_config(call_state, &cfg.config()));

    let server = match TcpModemServer::bind(cfg.clone(), Arc::clone(&interpreter)) {
        Ok(server) => Arc::new(server),
        Err(e) => {
            tracing::error!("failed to bind {}: {}", cfg.config().server.bind_addr(), e);
            std::process::exit(1);
        }
    };

    // Set up Ctrl+C handler for graceful shutdown
    let s = Arc::clone(&server);
    ctrlc::set_handler(move || {
        s.stop();
    })
    .expect("failed to set Ctrl+C handler");

    if let Err(e) = server.run() {
        tracing::error!("server failed: {}", e);
    }

    interpreter.shutdown();
    let _ = worker.join();
    tracing::info!("served {} sessions", cfg.state_read().sessions_served);
}
