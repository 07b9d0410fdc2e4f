use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use voice_commander::Config;
use voice_commander::channels::{ChannelHandle, ConsoleChannel, DiscordChannel, TextChannel};
use voice_commander::commands::{
    AnnounceHandler, CommandDispatcher, CommandEntry, CommandParser, CommandTable, GuildRef,
    HandlerRegistry,
};
use voice_commander::voice::{
    AudioTransport, CloudRecognizer, Recognizer, SessionRegistry, TimeoutRecognizer,
    VoicePipeline, WavFileTransport,
};

/// Voice Commander - spoken commands for a Discord music bot
#[derive(Parser)]
#[command(name = "voice-commander", version, about)]
struct Cli {
    /// Config file (defaults to ~/.config/voice-commander/config.toml)
    #[arg(short, long, env = "VOICE_COMMANDER_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse a transcript as if it had been spoken
    Parse {
        /// Recognized text, e.g. "뮤직봇 재생 아이유"
        text: String,
    },
    /// List trigger phrases and the commands they map to
    Commands,
    /// Run a WAV file through recognition, parsing and dispatch
    Replay {
        /// 16-bit PCM WAV file
        wav: PathBuf,

        /// Speaker ID the audio is attributed to
        #[arg(long, default_value = "1")]
        speaker: u64,

        /// Guild ID for the session
        #[arg(long, default_value = "1")]
        guild: u64,

        /// Send replies to this Discord channel instead of the console
        #[arg(long)]
        discord_channel: Option<String>,

        /// Stream the file as fast as possible instead of in real time
        #[arg(long)]
        fast: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,voice_commander=info",
        1 => "info,voice_commander=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Command::Parse { text } => {
            cmd_parse(&config, &text);
            Ok(())
        }
        Command::Commands => {
            cmd_commands(&config);
            Ok(())
        }
        Command::Replay {
            wav,
            speaker,
            guild,
            discord_channel,
            fast,
        } => cmd_replay(config, &wav, speaker, guild, discord_channel, fast).await,
    }
}

fn build_parser(config: &Config) -> CommandParser {
    let mut table = CommandTable::korean();
    for (phrase, command) in &config.commands.phrases {
        table.insert(CommandEntry::new(phrase, command));
    }
    CommandParser::new(&config.voice.wake_phrase, table)
}

fn build_dispatcher(config: &Config, table: &CommandTable) -> CommandDispatcher {
    let mut registry = HandlerRegistry::new();
    registry.extend_aliases(&config.commands.aliases);
    let added = AnnounceHandler::register_missing(&mut registry, table);
    tracing::debug!(handlers = added, "registered announce handlers");

    CommandDispatcher::new(registry)
        .with_rich_formatting(config.discord.embeds)
        .with_command_prefix(config.discord.command_prefix.clone())
}

fn cmd_parse(config: &Config, text: &str) {
    let parser = build_parser(config);

    match parser.parse(text) {
        Some(parsed) => {
            println!("command: {}", parsed.command);
            println!("phrase:  {}", parsed.phrase);
            println!("args:    {}", parsed.args);
        }
        None if parser.is_voice_command(text) => {
            println!("wake phrase heard, but no command matched");
        }
        None => println!("not a voice command (say \"{}...\")", parser.command_prefix()),
    }
}

fn cmd_commands(config: &Config) {
    let parser = build_parser(config);
    let table = parser.table();

    println!("Wake phrase: {}", parser.wake_phrase());
    for command in table.commands() {
        let phrases: Vec<&str> = table
            .entries()
            .iter()
            .filter(|e| e.command == command)
            .map(|e| e.phrase.as_str())
            .collect();
        println!("  {command:<12} {}", phrases.join(", "));
    }
}

async fn cmd_replay(
    mut config: Config,
    wav: &std::path::Path,
    speaker: u64,
    guild: u64,
    discord_channel: Option<String>,
    fast: bool,
) -> anyhow::Result<()> {
    let mut transport = WavFileTransport::open(wav, speaker)
        .with_context(|| format!("failed to load {}", wav.display()))?;
    if fast {
        transport = transport.unpaced();
    }
    config.voice.sample_rate = transport.sample_rate();
    config.voice.channels = transport.channels();
    let transport = Arc::new(transport);

    let recognizer = CloudRecognizer::from_config(&config.stt)?;
    tracing::info!(backend = recognizer.name(), "recognizer ready");
    let recognizer: Arc<dyn Recognizer> = match config.stt.timeout {
        Some(timeout) => Arc::new(TimeoutRecognizer::new(recognizer, timeout)),
        None => Arc::new(recognizer),
    };

    let (surface, channel_id): (Arc<dyn TextChannel>, String) = match discord_channel {
        Some(id) => {
            let token = config
                .discord
                .token
                .as_ref()
                .context("DISCORD_TOKEN is required to reply in Discord")?;
            (Arc::new(DiscordChannel::new(token)?), id)
        }
        None => (Arc::new(ConsoleChannel::new()), "console".to_string()),
    };

    let parser = build_parser(&config);
    let dispatcher = build_dispatcher(&config, parser.table());
    let pipeline = Arc::new(VoicePipeline::new(recognizer, parser, dispatcher, &config.voice));
    let sessions = SessionRegistry::new(pipeline, config.voice.clone())
        .ignore_speaker(config.discord.bot_user_id);

    let guild_ref = GuildRef {
        id: guild,
        name: format!("guild-{guild}"),
    };
    let channel = ChannelHandle::new(surface, channel_id);
    let audio: Arc<dyn AudioTransport> = transport.clone();

    sessions.start_listening(guild_ref, audio, channel, None)?;

    tokio::select! {
        () = transport.played() => {
            tracing::info!("replay finished, draining pending chunks");
            sessions.finish(guild).await;
        }
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("interrupted");
            sessions.stop_listening(guild);
        }
    }

    Ok(())
}
