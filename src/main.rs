use std::path::PathBuf;
use std::time::Duration;
use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use enerzal_core::{
    AuthClient, BackendClient, ChatSession, Config, NoticeKind, Outcome, RenderFrame, RenderSink,
    TokenStore,
};

mod app;
mod handler;
mod tui;
mod ui;

use app::App;
use tui::EventHandler;

const TICK_RATE: Duration = Duration::from_millis(300);

#[derive(Parser)]
#[command(name = "enerzal")]
#[command(about = "Chat with the Enerzal employee assistant from the terminal")]
struct Cli {
    /// Backend base URL
    #[arg(long, global = true, env = "ENERZAL_BASE_URL")]
    base_url: Option<String>,

    /// Response mode: whole or stream
    #[arg(long, global = true, env = "ENERZAL_RESPONSE_MODE")]
    mode: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the chat window (default)
    Chat,
    /// Send one message and print the reply as HTML
    Ask {
        /// Your message
        message: String,
        /// Upload this document first
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Log in with email, password, and a TOTP code
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        /// Current code from your authenticator app
        #[arg(long)]
        totp: String,
    },
    /// Create an account and save the TOTP enrollment QR code
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        /// Where to write the QR code PNG
        #[arg(long, default_value = "enerzal-totp.png")]
        qr_out: PathBuf,
    },
    /// Show the profile of the logged-in user
    Profile,
    /// Forget the stored login token
    Logout,
    /// Print the effective configuration
    Config {
        /// Also write it to the config file
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let cli = Cli::parse();

    let mut config = Config::load().unwrap_or_else(|err| {
        tracing::warn!(error = %err, "could not read config, using defaults");
        Config::new()
    });
    config.apply_overrides(cli.base_url, cli.mode)?;

    let tokens = TokenStore::default_location()?;
    let backend = BackendClient::from_config(&config)?.with_token_store(tokens.clone());

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => run_tui(backend, config).await?,
        Commands::Ask { message, file } => ask(backend, config, &message, file).await?,
        Commands::Login { email, password, totp } => {
            let auth = AuthClient::new(backend, tokens);
            auth.login(&email, &password, &totp).await?;
            println!("Logged in as {}", email);
        }
        Commands::Signup { email, password, qr_out } => {
            let auth = AuthClient::new(backend, tokens);
            let outcome = auth.signup(&email, &password).await?;
            println!("{}", outcome.message);
            if let Some(png) = outcome.qrcode_png {
                std::fs::write(&qr_out, png)?;
                println!("Scan the QR code in {} with your authenticator app", qr_out.display());
            }
        }
        Commands::Profile => {
            let auth = AuthClient::new(backend, tokens);
            let profile = auth.profile().await?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
        Commands::Logout => {
            AuthClient::new(backend, tokens).logout()?;
            println!("Logged out");
        }
        Commands::Config { save } => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            if save {
                config.save()?;
            }
        }
    }

    Ok(())
}

/// Logs go to a file so they never draw over the TUI
fn init_logging() -> Result<()> {
    use tracing_subscriber::EnvFilter;

    let log_dir = Config::config_dir()?;
    std::fs::create_dir_all(&log_dir)?;
    let log_file = std::fs::File::create(log_dir.join("enerzal.log"))?;

    let filter = EnvFilter::try_from_env("ENERZAL_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(log_file)
        .with_ansi(false)
        .init();
    Ok(())
}

async fn run_tui(backend: BackendClient, config: Config) -> Result<()> {
    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let (updates_tx, mut updates_rx) = mpsc::unbounded_channel();
    let mut app = App::new(backend, config, updates_tx);
    let mut events = EventHandler::new(TICK_RATE);

    let result = async {
        while !app.should_quit {
            terminal.draw(|frame| ui::render(&mut app, frame))?;

            tokio::select! {
                Some(event) = events.next() => handler::handle_event(&mut app, event).await?,
                Some(update) = updates_rx.recv() => app.apply_update(update),
                else => break,
            }

            while let Ok(update) = updates_rx.try_recv() {
                app.apply_update(update);
            }
            app.poll_task(&mut updates_rx).await;
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    tui::restore()?;
    result
}

/// Keeps the latest frame; prints notices to stderr
#[derive(Default)]
struct LatestHtml {
    html: String,
}

impl RenderSink for LatestHtml {
    fn paint(&mut self, frame: RenderFrame<'_>) {
        self.html.clear();
        self.html.push_str(frame.html);
    }

    fn notice(&mut self, kind: NoticeKind, text: &str) {
        match kind {
            NoticeKind::Error => eprintln!("error: {}", text),
            NoticeKind::Confirmation => eprintln!("{}", text),
        }
    }
}

async fn ask(backend: BackendClient, mut config: Config, message: &str, file: Option<PathBuf>) -> Result<()> {
    // Nobody is watching it type
    config.typing_delay_ms = 0;
    let mut session = ChatSession::from_backend(backend, &config);
    let mut sink = LatestHtml::default();

    if let Some(path) = file {
        if let Outcome::Failed(err) = session.upload_path(&mut sink, &path).await {
            return Err(anyhow!("upload failed: {}", err));
        }
    }

    match session.send_message(&mut sink, message).await {
        Outcome::Completed(_) => {
            print!("{}", sink.html);
            Ok(())
        }
        Outcome::Skipped => Err(anyhow!("Nothing to send")),
        Outcome::Failed(err) => Err(anyhow!("chat failed: {}", err)),
    }
}
