//! Sendwise CLI - runs the email marketing API server

mod commands;

use clap::{Parser, Subcommand};
use commands::{GenerateKeyCommand, ServeCommand};
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Layer};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "SENDWISE_LOG_LEVEL", global = true)]
    log_level: String,

    /// Log format: compact, full
    #[arg(
        long,
        default_value = "compact",
        env = "SENDWISE_LOG_FORMAT",
        global = true
    )]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve(ServeCommand),
    /// Print a fresh encryption key for SENDWISE_ENCRYPTION_KEY
    GenerateKey(GenerateKeyCommand),
}

fn log_filter(level: &str) -> anyhow::Result<EnvFilter> {
    // RUST_LOG takes full control when set
    if std::env::var("RUST_LOG").is_ok() {
        return Ok(EnvFilter::try_from_default_env()?);
    }

    Ok(EnvFilter::try_new(format!(
        "sendwise={level},\
         sendwise_cli={level},\
         sendwise_core={level},\
         sendwise_database={level},\
         sendwise_migrations={level},\
         sendwise_email={level},\
         sendwise_contacts={level},\
         sendwise_campaigns={level},\
         sqlx=warn,\
         sea_orm=warn,\
         sea_orm_migration=warn,\
         h2=warn,\
         tower=warn,\
         tower_http=info,\
         hyper=warn,\
         reqwest=warn,\
         rustls=warn,\
         hickory_proto=warn,\
         hickory_resolver=warn,\
         aws_smithy_runtime=warn",
        level = level
    ))?)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = log_filter(&cli.log_level)?;
    let fmt_layer = match cli.log_format.as_str() {
        "full" => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .boxed(),
        _ => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Serve(serve_cmd) => serve_cmd.execute(),
        Commands::GenerateKey(key_cmd) => key_cmd.execute(),
    }
}
