pub mod daemon;
pub mod jobs;

use clap::{Parser, Subcommand};

pub const DEFAULT_CLIENT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 4000;

/// Creamy Videos Importer - queue video URLs for download and upload to a creamy-videos instance
#[derive(Parser, Debug)]
#[command(
    name = "cvi",
    version,
    about = "Creamy Videos Importer - queue video URLs for download and upload to a creamy-videos instance"
)]
pub struct Cli {
    /// Importer host (bind host for `start`)
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Importer port (bind port for `start`)
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Host to contact a running importer on.
    pub fn client_host(&self) -> &str {
        self.host.as_deref().unwrap_or(DEFAULT_CLIENT_HOST)
    }

    pub fn client_port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the importer in the foreground
    Start {
        /// Path to configuration file
        #[arg(short = 'c', long = "config")]
        config: Option<String>,

        /// Number of parallel workers
        #[arg(short = 'w', long)]
        workers: Option<usize>,

        /// Base URL of the creamy-videos instance to upload to
        #[arg(long = "creamy-host")]
        creamy_host: Option<String>,

        /// Path to the youtube-dl compatible binary
        #[arg(long = "ytdl-bin")]
        ytdl_bin: Option<String>,

        /// Seconds to keep finished and failed jobs
        #[arg(long = "retention")]
        retention: Option<u64>,

        /// URL to queue at startup (repeatable)
        #[arg(long = "seed", value_name = "URL")]
        seeds: Vec<String>,
    },

    /// Show importer status
    Status,

    /// Queue a URL for import
    Push {
        /// Video or playlist URL
        url: String,

        /// Tag to attach to the uploaded video (repeatable)
        #[arg(short = 't', long = "tag")]
        tags: Vec<String>,
    },

    /// List known jobs
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Forget a job
    Remove {
        /// Job ID
        id: String,
    },
}

/// Build the base URL for the importer HTTP API.
pub fn base_url(host: &str, port: u16) -> String {
    format!("http://{}:{}", host, port)
}

/// Format a connection error message for when the importer is not reachable.
pub fn connection_error_message(host: &str, port: u16) -> String {
    format!(
        "Could not connect to importer at {}:{}. Is it running? (try: cvi start)",
        host, port
    )
}

/// Map a reqwest failure to a user-facing error.
pub(crate) fn handle_request_error(err: reqwest::Error, host: &str, port: u16) -> anyhow::Error {
    if err.is_connect() || err.is_timeout() {
        anyhow::anyhow!("{}", connection_error_message(host, port))
    } else {
        anyhow::anyhow!("Request failed: {}", err)
    }
}

/// Dispatch the CLI command to the appropriate handler.
pub async fn dispatch(cli: &Cli) -> anyhow::Result<()> {
    let (host, port) = (cli.client_host(), cli.client_port());
    match &cli.command {
        Some(Commands::Start {
            config,
            workers,
            creamy_host,
            ytdl_bin,
            retention,
            seeds,
        }) => {
            let options = crate::daemon::StartOptions {
                config_path: config.as_ref().map(Into::into),
                host: cli.host.clone(),
                port: cli.port,
                workers: *workers,
                creamy_host: creamy_host.clone(),
                ytdl_bin: ytdl_bin.clone(),
                retention_secs: *retention,
                seeds: seeds.clone(),
            };
            daemon::cmd_start(options).await
        }
        Some(Commands::Status) => daemon::cmd_status(host, port).await,
        Some(Commands::Push { url, tags }) => jobs::cmd_push(host, port, url, tags).await,
        Some(Commands::List { json }) => jobs::cmd_list(host, port, *json).await,
        Some(Commands::Remove { id }) => jobs::cmd_remove(host, port, id).await,
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}
