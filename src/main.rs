use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use secrecy::{ExposeSecret, SecretString};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use chatvoice::api::ApiServer;
use chatvoice::session::FileIdentityStore;
use chatvoice::voice::{NATIVE_FORMATS, NativeCapture, TranscriptionClient};
use chatvoice::{Config, CredentialBroker, TranscriptSink, VoicePipeline};

/// chatvoice - Voice input and session credentials for an embedded chat widget
#[derive(Parser)]
#[command(name = "chatvoice", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the backend server (session and transcription endpoints)
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Request a chat session client secret
    Session {
        /// Caller identity; defaults to the persisted device identity
        #[arg(short, long)]
        user: Option<String>,
        /// Origin of the page embedding the chat widget
        #[arg(long, env = "CHATVOICE_ORIGIN")]
        origin: Option<String>,
        /// Existing client secret to refresh
        #[arg(long)]
        refresh: Option<String>,
    },
    /// Record once from the microphone and print the transcript
    Record {
        /// Stop after this many seconds instead of waiting for Enter
        #[arg(short, long)]
        duration: Option<u64>,
    },
}

/// Prints delivered transcripts to stdout
struct StdoutSink;

#[async_trait]
impl TranscriptSink for StdoutSink {
    async fn on_transcription_complete(&self, text: &str) -> anyhow::Result<()> {
        println!("\n{text}");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,chatvoice=info",
        1 => "info,chatvoice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve { port } => serve(port).await,
        Command::Session {
            user,
            origin,
            refresh,
        } => session(user.as_deref(), origin.as_deref(), refresh).await,
        Command::Record { duration } => record(duration).await,
    }
}

async fn serve(port: Option<u16>) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(port) = port {
        config.server.port = port;
    }
    tracing::info!(port = config.server.port, "starting chatvoice backend");
    ApiServer::from_config(&config)?.run().await?;
    Ok(())
}

async fn session(
    user: Option<&str>,
    origin: Option<&str>,
    refresh: Option<String>,
) -> anyhow::Result<()> {
    let config = Config::load_with_origin(origin)?;
    let identities = Arc::new(FileIdentityStore::new(config.identity_path()));
    let broker = CredentialBroker::from_config(&config, identities)?;

    let existing = refresh.map(SecretString::from);
    let credential = broker
        .issue_credential(existing.as_ref(), user, None)
        .await?;

    println!("identity:      {}", credential.identity());
    println!("origin:        {}", credential.origin());
    println!("client_secret: {}", credential.secret().expose_secret());
    Ok(())
}

async fn record(duration: Option<u64>) -> anyhow::Result<()> {
    let config = Config::load()?;
    let transcriber = TranscriptionClient::from_config(&config)?;
    let pipeline = VoicePipeline::new(
        Arc::new(NativeCapture::new()),
        transcriber,
        Arc::new(StdoutSink),
    )
    .with_preferences(NATIVE_FORMATS)
    .with_min_indicator(config.voice.min_indicator);

    let mode = pipeline.start().await?;
    match mode.label() {
        Some(label) => println!("Recording ({label})"),
        None => println!("Recording"),
    }

    let mut status = pipeline.subscribe();
    let display = tokio::spawn(async move {
        while status.changed().await.is_ok() {
            if let Some(timer) = status.borrow_and_update().timer() {
                print!("\r{timer}");
                let _ = std::io::stdout().flush();
            }
        }
    });

    match duration {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => {
            println!("Press Enter to stop");
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            lines.next_line().await?;
        }
    }

    let pending = pipeline.stop().await?;
    println!("\nTranscribing...");
    let result = pending.wait().await;
    display.abort();
    result?;
    Ok(())
}
