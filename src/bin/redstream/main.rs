//! redstream - publish to and follow Redis streams from the command line

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;

use redstream::config::{Config, LogFormat};
use redstream::Streams;

/// redstream - stream producer and consumer group client
#[derive(Parser, Debug)]
#[command(name = "redstream")]
#[command(author, version, about = "Publish to and consume from Redis streams")]
struct Args {
    /// TOML configuration file; REDIS_HOST, REDIS_PORT and REDIS_PASSWORD override it
    #[arg(short, long, env = "REDSTREAM_CONFIG")]
    config: Option<PathBuf>,

    /// Log level, overrides the configuration file
    #[arg(long, env = "REDSTREAM_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Append a payload to a stream
    Publish {
        /// Logical stream name (stored as `streams:<name>`)
        stream: String,
        /// Payload to store in the `payload` field
        payload: String,
    },

    /// Follow a stream as one consumer of a consumer group until Ctrl-C
    Subscribe {
        /// Logical stream name
        stream: String,
        /// Consumer group
        #[arg(short, long)]
        group: String,
        /// Consumer name; a random one when omitted
        #[arg(short = 'n', long)]
        consumer: Option<String>,
        /// Acknowledge every message after printing it
        #[arg(long)]
        ack: bool,
        /// Create the group at the start of the stream instead of its tail
        #[arg(long)]
        from_beginning: bool,
    },

    /// Publish a sample JSON document and read it back through a consumer group
    Demo,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let mut config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}", "Configuration error".red(), e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if args.json_logs {
        config.logging.format = LogFormat::Json;
    }
    redstream::telemetry::init_logging(&config.logging);

    let streams = match Streams::connect(&config).await {
        Ok(streams) => streams,
        Err(e) => {
            eprintln!("{}: {}", "Connection failed".red(), e);
            return ExitCode::FAILURE;
        }
    };

    let result = match args.command {
        Command::Publish { stream, payload } => {
            commands::publish(&streams, &stream, &payload).await
        }
        Command::Subscribe {
            stream,
            group,
            consumer,
            ack,
            from_beginning,
        } => {
            let streams = if from_beginning {
                let mut config = config.clone();
                config.consumer.group_start = redstream::GroupStart::Beginning;
                Streams::new(streams.broker().clone(), &config)
            } else {
                streams
            };
            commands::subscribe(&streams, &stream, &group, consumer, ack).await
        }
        Command::Demo => commands::demo(&streams).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            ExitCode::FAILURE
        }
    }
}
