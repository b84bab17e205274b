//! xsession - Entry Point
//!
//! Small driver for the session manager: connect the default session, open
//! named sessions, then tear everything down with the close handshake.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

use xsession::metrics::METRICS;
use xsession::{
    Config, ConnectionManager, Console, IpMode, Variables, XSessionFactory, VERSION,
};

/// X Protocol session driver
#[derive(Parser)]
#[command(name = "xsession")]
#[command(version = VERSION)]
#[command(about = "Open and close MySQL X Protocol sessions")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    host: Option<String>,

    #[arg(short = 'P', long, global = true)]
    port: Option<u16>,

    #[arg(short, long, global = true)]
    user: Option<String>,

    #[arg(short, long, global = true)]
    password: Option<String>,

    #[arg(long, global = true)]
    schema: Option<String>,

    /// Unix socket path
    #[arg(long, global = true)]
    socket: Option<String>,

    #[arg(long, global = true)]
    ssl_mode: Option<String>,

    /// ip4, ip6 or any
    #[arg(long, global = true)]
    ip_mode: Option<IpMode>,

    /// Authenticate with PLAIN instead of MYSQL41
    #[arg(long, global = true)]
    plain_auth: bool,

    /// Connect the default session without authenticating
    #[arg(long, global = true)]
    no_auth: bool,

    /// Tell the server the client can handle an expired password
    #[arg(long, global = true)]
    expired_password: bool,

    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress session switch and close output
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect the default session and print the client id
    Ping,
    /// Connect the default session and open named sessions
    Open {
        /// NAME[:USER[:PASSWORD[:SCHEMA]]], repeatable
        #[arg(short, long = "session", required = true)]
        sessions: Vec<String>,
    },
}

fn main() -> Result<()> {
    // Install the ring crypto provider for rustls
    let _ = rustls::crypto::ring::default_provider().install_default();

    let cli = Cli::parse();
    let config = load_config(&cli.global)?;

    xsession::util::init_tracing(&config.logging)?;
    info!(version = VERSION, host = %config.connection.host, "Starting xsession");

    let console = Console::stdio(cli.global.verbose);
    let mut manager = ConnectionManager::new(
        config.connection.clone(),
        XSessionFactory,
        Variables::new(),
        console.clone(),
    );

    let result = run(&mut manager, &cli);
    if let Err(e) = &result {
        error!(error = %e, "Session driver failed");
    }

    manager.destroy();
    if console.is_verbose() {
        console.print_verbose(format_args!("{}\n", METRICS.snapshot()));
    }
    result
}

fn run(manager: &mut ConnectionManager<XSessionFactory, Variables>, cli: &Cli) -> Result<()> {
    let global = &cli.global;
    manager
        .connect_default(global.expired_password, global.no_auth, global.plain_auth)
        .context("Failed to connect default session")?;

    match &cli.command {
        Commands::Ping => {
            let client_id = manager.active_session().map(xsession::protocol::Session::client_id)?;
            manager
                .console()
                .print(format_args!("client id {}\n", client_id));
        }
        Commands::Open { sessions } => {
            for arg in sessions {
                let (name, user, password, schema) = parse_session(arg);
                manager
                    .create(name, user, password, schema, false)
                    .with_context(|| format!("Failed to open session {}", name))?;
            }

            let names = manager
                .session_names()
                .into_iter()
                .map(|name| if name.is_empty() { "default" } else { name })
                .collect::<Vec<_>>()
                .join(", ");
            manager.console().print(format_args!("sessions: {}\n", names));

            while !manager.is_default_active() {
                manager.close_active(false, global.quiet)?;
            }
        }
    }
    Ok(())
}

/// Split `NAME[:USER[:PASSWORD[:SCHEMA]]]`
fn parse_session(arg: &str) -> (&str, &str, &str, &str) {
    let mut parts = arg.splitn(4, ':');
    let mut next = || parts.next().unwrap_or("");
    let name = next();
    let user = next();
    let password = next();
    let schema = next();
    (name, user, password, schema)
}

fn load_config(args: &GlobalArgs) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => Config::default(),
    };

    let conn = &mut config.connection;
    if let Some(host) = &args.host {
        conn.host = host.clone();
    }
    if let Some(port) = args.port {
        conn.port = port;
    }
    if let Some(user) = &args.user {
        conn.user = user.clone();
    }
    if let Some(password) = &args.password {
        conn.password = password.clone();
    }
    if let Some(schema) = &args.schema {
        conn.schema = schema.clone();
    }
    if let Some(socket) = &args.socket {
        conn.socket = socket.clone();
    }
    if let Some(mode) = &args.ssl_mode {
        conn.ssl.ssl_mode = mode.to_ascii_uppercase();
    }
    if let Some(mode) = args.ip_mode {
        conn.ip_mode = mode;
    }
    if args.verbose && std::env::var_os("RUST_LOG").is_none() {
        config.logging.level = "info".to_string();
    }

    config.validate()?;
    Ok(config)
}
