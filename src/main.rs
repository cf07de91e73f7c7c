use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{LevelFilter, error, info, warn};
use tokio::net::TcpListener;

use chatrelay::api::{AppState, create_router};
use chatrelay::config::Settings;
use chatrelay::session::{
    ChatSession, EnvIdentity, FileStore, IdentityProvider, Sender, SessionState,
};
use chatrelay::transport::HttpTransport;
use chatrelay::upstream::UpstreamClient;

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.common);

    let settings = Settings::load(cli.common.config.as_deref())?;

    match cli.command {
        Command::Serve(cmd) => run_serve(settings, cmd),
        Command::Chat(cmd) => run_chat(settings, cmd),
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Chatrelay - streaming chat proxy and terminal client.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Reduce output to only errors
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the proxy server in front of the upstream API
    Serve(ServeCommand),
    /// Chat from the terminal through a running proxy
    Chat(ChatCommand),
}

#[derive(Debug, Args)]
struct ServeCommand {
    /// Override the listen address
    #[arg(long, value_name = "ADDR")]
    listen: Option<String>,
}

#[derive(Debug, Args)]
struct ChatCommand {
    /// Override the proxy base URL
    #[arg(long, value_name = "URL")]
    proxy: Option<String>,
    /// Override the node id
    #[arg(long, value_name = "ID")]
    node_id: Option<String>,
}

fn init_logging(common: &CommonOpts) {
    let level = if common.quiet {
        LevelFilter::Error
    } else {
        match common.verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(level.to_string()),
    )
    .init();

    // Bridge tower-http's tracing spans onto the same level.
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("chatrelay={level},tower_http={level}")));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init()
        .ok();
}

#[tokio::main]
async fn run_serve(settings: Settings, cmd: ServeCommand) -> Result<()> {
    let state = match settings.api_token.as_deref() {
        Some(token) if !token.is_empty() => {
            AppState::new(UpstreamClient::new(&settings.upstream_base_url, token))
        }
        _ => {
            error!("CHATRELAY_API_TOKEN is not set; requests will fail with 500");
            AppState::unconfigured()
        }
    };

    let app = create_router(state);
    let addr = cmd.listen.unwrap_or(settings.listen_addr);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    info!(
        "chatrelay proxy listening on {addr}, upstream {}",
        settings.upstream_base_url
    );

    axum::serve(listener, app).await.context("serving")?;
    Ok(())
}

#[tokio::main]
async fn run_chat(settings: Settings, cmd: ChatCommand) -> Result<()> {
    let proxy_url = cmd.proxy.unwrap_or(settings.proxy_base_url);
    let node_id = cmd.node_id.unwrap_or(settings.node_id);
    if node_id.is_empty() {
        anyhow::bail!("node_id is not configured (set CHATRELAY_NODE_ID or pass --node-id)");
    }

    let state_path = settings
        .state_path
        .unwrap_or_else(FileStore::default_path);
    let store = FileStore::open(&state_path)?;
    let transport = HttpTransport::new(proxy_url);

    let mut session = ChatSession::new(transport, store, node_id)
        .with_share_user(settings.share_user_id);

    let providers: Vec<Box<dyn IdentityProvider>> =
        vec![Box::new(EnvIdentity::new("CHATRELAY_USER_ID"))];
    session.bootstrap(&providers).await?;

    println!("chatrelay chat (run {})", session.run_id());
    println!("(/new starts a fresh topic, /quit exits)\n");
    for message in session.transcript() {
        print_message(message);
    }

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();

        match line {
            "/quit" | "/exit" => break,
            "/new" => {
                if confirm("Start a new topic?")? {
                    session.new_chat()?;
                    println!("run {}", session.run_id());
                    for message in session.transcript() {
                        print_message(message);
                    }
                }
            }
            _ => {
                if session.state() != SessionState::Idle {
                    continue;
                }
                stream_to_stdout(&mut session, line).await?;
                let banner = session.last_error().map(str::to_string);
                if let Some(banner) = banner {
                    if let Some(message) = session.transcript().last() {
                        print_message(message);
                    }
                    warn!("{banner}");
                    session.clear_error();
                }
            }
        }
    }

    Ok(())
}

/// Send one prompt, printing reply text incrementally as chunks decode.
async fn stream_to_stdout(
    session: &mut ChatSession<HttpTransport, FileStore>,
    prompt: &str,
) -> Result<()> {
    let mut printed = 0usize;
    session
        .send_with(prompt, |text| {
            if text.len() > printed {
                print!("{}", &text[printed..]);
                let _ = io::stdout().flush();
                printed = text.len();
            }
        })
        .await;
    println!();
    Ok(())
}

fn print_message(message: &chatrelay::session::Message) {
    let who = match message.sender {
        Sender::User => "you",
        Sender::Assistant => "bot",
    };
    println!("{who}: {}", message.text);
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
