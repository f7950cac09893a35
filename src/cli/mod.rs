//! Command-line interface parsing and handling
//!
//! This module parses command-line arguments, builds the backend client and
//! session, and dispatches to the chat loop or one of the one-shot commands.

pub mod chat;
pub mod credentials;
pub mod display;
pub mod servers;
pub mod settings;
pub mod tools;


use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::api::HttpBackend;
use crate::core::config::Config;
use crate::core::conversation::{ChatClient, TurnOptions};
use crate::core::session::{SessionContext, SessionStore};
use crate::utils::logging::TranscriptLog;

#[derive(Parser)]
#[command(name = "toolchat")]
#[command(version)]
#[command(about = "A terminal chat client for discovering and running MCP tool servers")]
#[command(
    long_about = "Toolchat talks to an AI chat backend that can recommend, configure, and run \
MCP tool servers for you. Responses stream into the terminal as they arrive; function \
results the backend asks for are sent back automatically.\n\n\
Environment Variables:\n\
  TOOLCHAT_BACKEND_URL   Backend base URL (overrides the config file)\n\
  RUST_LOG               Diagnostic log filter (defaults to warn)\n\n\
Chat commands:\n\
  /servers                         List servers attached to this session\n\
  /add <server>                    Attach a server\n\
  /credentials <server>            Enter credentials for a server\n\
  /invoke <server> <tool> [json]   Run a tool directly\n\
  /log [filename]                  Enable or toggle the transcript log\n\
  /reset                           Start a new session\n\
  /quit                            Leave the chat"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Backend base URL for this run
    #[arg(short = 'b', long, global = true, value_name = "URL")]
    pub backend: Option<String>,

    /// Read and write configuration at this path
    #[arg(short = 'c', long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Append the transcript to the specified file
    #[arg(short = 'l', long, global = true)]
    pub log: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the interactive chat (default)
    Chat,
    /// Send a single message and print the response
    Say {
        /// Message to send
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
    },
    /// List servers attached to the current session
    Servers {
        /// Keep polling, every SECS seconds
        #[arg(short = 'w', long, value_name = "SECS", num_args = 0..=1, default_missing_value = "5")]
        watch: Option<u64>,
    },
    /// Attach a server to the current session
    AddServer {
        /// Server identifier
        server: String,
    },
    /// Enter credentials for an attached server
    Credentials {
        /// Server identifier
        server: String,
    },
    /// Run a tool on an attached server
    Invoke {
        /// Server identifier
        server: String,
        /// Tool name
        tool: String,
        /// Tool arguments as a JSON object
        #[arg(short = 'a', long, value_name = "JSON")]
        args: Option<String>,
    },
    /// Start over with a new session identifier
    Reset,
    /// Set a configuration value, or show the configuration when no value is given
    Set {
        /// Configuration key to set
        key: Option<String>,
        /// Value to set for the key
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        value: Vec<String>,
    },
    /// Unset a configuration value
    Unset {
        /// Configuration key to unset
        key: String,
    },
}

/// Everything a command needs: configuration, the backend client, the
/// persisted session, and the transcript log.
pub struct CliContext {
    pub config: Config,
    pub client: ChatClient<HttpBackend>,
    pub session: SessionContext,
    pub transcript: TranscriptLog,
}

impl CliContext {
    fn build(args: &Args, config: Config) -> Result<Self, Box<dyn Error>> {
        let backend_url = args
            .backend
            .clone()
            .unwrap_or_else(|| config.backend_url());
        crate::utils::url::endpoint_url(&backend_url, &[])
            .map_err(|err| format!("Invalid backend URL '{backend_url}': {err}"))?;

        let client = ChatClient::new(
            HttpBackend::new(backend_url),
            TurnOptions::from_config(&config),
        );
        let session = SessionContext::load_or_create(SessionStore::new(config.session_file_path()))?;
        let transcript = TranscriptLog::new(args.log.clone().or_else(|| config.transcript_log.clone()));

        Ok(Self {
            config,
            client,
            session,
            transcript,
        })
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    // A second initialization (e.g. from tests) is harmless.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn load_config(args: &Args) -> Result<Config, Box<dyn Error>> {
    let config = match &args.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    Ok(config)
}

fn config_path(args: &Args) -> PathBuf {
    args.config.clone().unwrap_or_else(Config::get_config_path)
}

pub fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let mut args = Args::parse();
    let config = load_config(&args)?;

    match args.command.take().unwrap_or(Commands::Chat) {
        Commands::Set { key, value } => {
            let mut config = config;
            settings::set(&mut config, &config_path(&args), key.as_deref(), &value)
        }
        Commands::Unset { key } => {
            let mut config = config;
            settings::unset(&mut config, &config_path(&args), &key)
        }
        command => {
            let mut context = CliContext::build(&args, config)?;
            run_command(command, &mut context).await
        }
    }
}

async fn run_command(command: Commands, context: &mut CliContext) -> Result<(), Box<dyn Error>> {
    match command {
        Commands::Chat => chat::run_chat(context).await,
        Commands::Say { prompt } => chat::run_say(context, prompt).await,
        Commands::Servers { watch } => match watch {
            Some(secs) => servers::watch_servers(context, secs).await,
            None => servers::list_servers(context).await,
        },
        Commands::AddServer { server } => servers::add_server(context, &server).await,
        Commands::Credentials { server } => credentials::run_credentials(context, &server).await,
        Commands::Invoke { server, tool, args } => {
            tools::run_invoke(context, &server, &tool, args.as_deref()).await
        }
        Commands::Reset => settings::reset_session(context),
        Commands::Set { .. } | Commands::Unset { .. } => Ok(()),
    }
}
