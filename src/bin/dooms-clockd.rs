use std::sync::Arc;

use clap::Parser;
use dooms_clock::config::Config;
use dooms_clock::daemon;
use dooms_clock::error::Result;
use dooms_clock::interfaces::channel::ChannelClient;
use dooms_clock::providers::http_channel::HttpChannelClient;
use dooms_clock::services::parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dooms-clockd")]
#[command(about = "Doomsday clock channel tracker")]
struct Cli {
    /// JSON config file; flags and environment override its values.
    #[arg(long, env = "CLOCK_CONFIG")]
    config: Option<String>,

    #[arg(long, env = "API_HOST")]
    host: Option<String>,

    #[arg(long, env = "API_PORT")]
    port: Option<u16>,

    #[arg(long, env = "DATABASE_PATH")]
    db: Option<String>,

    #[arg(long, env = "TELEGRAM_CHANNEL_USERNAME")]
    channel: Option<String>,

    #[arg(long, env = "CHANNEL_GATEWAY_URL")]
    gateway_url: Option<String>,

    #[arg(long, env = "CHANNEL_GATEWAY_TOKEN")]
    gateway_token: Option<String>,

    #[arg(long, env = "UPDATE_INTERVAL_SECONDS")]
    interval: Option<u64>,

    #[arg(long, env = "AUTO_FETCH")]
    auto_fetch: Option<bool>,

    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the HTTP server (default).
    Serve,
    /// Print the upstream channel's metadata.
    Status,
    /// Run the clock parser over a text and print the analysis.
    Parse {
        #[arg(long)]
        text: String,
    },
    ConfigShow,
}

impl Cli {
    fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(db) = &self.db {
            config.database_path = db.clone();
        }
        if let Some(channel) = &self.channel {
            config.channel.username = channel.clone();
        }
        if let Some(url) = &self.gateway_url {
            config.channel.base_url = Some(url.clone());
        }
        if let Some(token) = &self.gateway_token {
            config.channel.token = Some(token.clone());
        }
        if let Some(interval) = self.interval {
            config.update_interval_seconds = interval;
        }
        if let Some(auto_fetch) = self.auto_fetch {
            config.auto_fetch = auto_fetch;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        Ok(config)
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_default()
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{},dooms_clock={}",
            config.log_level, config.log_level
        ))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => daemon::run(config).await,
        Commands::Status => {
            let client = HttpChannelClient::new(&config.channel)?;
            let client: Arc<dyn ChannelClient> = Arc::new(client);
            let info = client.channel_info().await?;
            print_json(&info);
            Ok(())
        }
        Commands::Parse { text } => {
            print_json(&parser::analyze(&text));
            Ok(())
        }
        Commands::ConfigShow => {
            let mut shown = config;
            if shown.channel.token.is_some() {
                shown.channel.token = Some("<redacted>".to_string());
            }
            print_json(&shown);
            Ok(())
        }
    }
}
