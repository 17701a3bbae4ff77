/*!
 * Bluelight TUI
 * Pair nearby Bluetooth devices and choose which ones act as keys
 */

use std::fs::OpenOptions;
use std::io;
use std::sync::Mutex;

use anyhow::Result;
use clap::Parser;
use crossbeam::channel::Receiver;
use crossterm::{
    event::{self, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing::{error, info};

mod app;
mod ui;

use app::{App, KeyAction};
use bluelight_agent::{AgentConfig, Controller, DevicesChanged, TrustedKeys, DEFAULT_CONFIG_PATH};
use ui::render_ui;

type Tui = Terminal<CrosstermBackend<io::Stdout>>;

#[derive(Parser)]
#[command(name = "bluelight")]
#[command(about = "Bluelight Bluetooth Pairing and Key Management")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Write debug logs to this file
    #[arg(short, long)]
    debug: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(log_path) = &cli.debug {
        let file = OpenOptions::new().create(true).append(true).open(log_path)?;
        tracing_subscriber::fmt()
            .with_env_filter("bluelight_agent=debug,bluelight=debug")
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    }

    let config = AgentConfig::load(&cli.config)?;

    // Bus failures here end the process before the terminal is touched
    let mut controller = Controller::connect(&config.bluetooth)?;
    let changes = controller
        .subscribe()
        .ok_or_else(|| anyhow::anyhow!("device list already has a subscriber"))?;
    controller.start_discovery()?;
    controller.update_devices();

    let mut app = App::new(TrustedKeys::load(&config.keys_path)?);
    app.set_devices(controller.devices());

    // Initialize terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run(&mut terminal, &mut controller, &changes, &mut app, &config);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    controller.stop_discovery();
    if let Err(e) = app.keys.save(&config.keys_path) {
        error!("Could not save keys: {}", e);
        return Err(e.into());
    }
    info!("Saved {} keys", app.keys.len());

    result
}

fn run(
    terminal: &mut Tui,
    controller: &mut Controller,
    changes: &Receiver<DevicesChanged>,
    app: &mut App,
    config: &AgentConfig,
) -> Result<()> {
    loop {
        controller.poll();

        if changes.try_iter().count() > 0 {
            app.set_devices(controller.devices());
        }

        terminal.draw(|f| render_ui(f, app))?;

        // Handle events
        if event::poll(config.input_timeout())? {
            if let Event::Key(key) = event::read()? {
                match app.handle_key(key) {
                    KeyAction::Quit => return Ok(()),
                    KeyAction::Refresh => {
                        controller.update_devices();
                    }
                    KeyAction::None => {}
                }
            }
        }

        controller.update_devices();
    }
}
