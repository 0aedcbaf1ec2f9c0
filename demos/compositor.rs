use std::{path::PathBuf, time::Duration};

use clap::Parser;
use kiln::compositor::{Compositor, CompositorConfig, CompositorHandler, CompositorState};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Name of the listening socket
    #[arg(short, long)]
    socket: Option<String>,
    /// Name of the seat
    #[arg(long)]
    seat: Option<String>,
    /// Graphics backend module
    #[arg(short, long)]
    graphics_backend: Option<PathBuf>,
    /// Input backend module
    #[arg(short, long)]
    input_backend: Option<PathBuf>,
}

struct Handler;

impl CompositorHandler for Handler {
    fn initialized(&mut self, compositor: &mut Compositor) {
        let outputs = compositor
            .graphics_backend()
            .map(|graphics| graphics.outputs())
            .unwrap_or_default();
        for output in outputs {
            if let Err(err) = compositor.add_output(&output) {
                warn!(output = %output.name(), %err, "Skipping output");
            }
        }
        info!(bounds = ?compositor.outputs_bounding_box(), "Outputs arranged");
    }
}

fn main() {
    if let Ok(env_filter) = tracing_subscriber::EnvFilter::try_from_default_env() {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().init();
    }

    let cli = Cli::parse();
    let mut config = CompositorConfig::from_env();
    if let Some(socket) = cli.socket {
        config.socket_name = Some(socket);
    }
    if let Some(seat) = cli.seat {
        config.seat_name = seat;
    }
    if let Some(path) = cli.graphics_backend {
        config.default_graphics_backend = path;
    }
    if let Some(path) = cli.input_backend {
        config.default_input_backend = path;
    }

    let mut compositor = Compositor::new(config);
    compositor.set_handler(Handler);
    if let Err(err) = compositor.start() {
        error!(%err, "Failed to start the compositor");
        return;
    }

    while compositor.state() == CompositorState::Initialized {
        if let Err(err) = compositor.process_loop(Some(Duration::from_millis(16))) {
            error!(%err, "Main loop failed");
            break;
        }
    }
    compositor.finish();
}
