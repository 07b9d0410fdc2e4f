//! Command parsing and dispatch integration tests

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use voice_commander::commands::{
    AnnounceHandler, Author, CommandDescriptor, CommandDispatcher, CommandEntry, CommandParser,
    CommandTable, DispatchContext, DispatchOutcome, HandlerRegistry, Response, handler_fn,
};
use voice_commander::config::file::read_config_file;
use voice_commander::{Config, Error};

mod common;

use common::{MockPlayers, console, sent, test_guild, voice_room};

fn context(handle: voice_commander::channels::ChannelHandle, in_voice: bool) -> DispatchContext {
    DispatchContext {
        author: Author {
            id: 7,
            name: "민지".to_string(),
            voice_channel: in_voice.then(voice_room),
        },
        channel: handle,
        guild: test_guild(),
        permissions: None,
    }
}

fn music_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(handler_fn(
        CommandDescriptor::new("play").param("player").rest("query"),
        |args| async move {
            let query = args.text("query").unwrap_or_default().to_string();
            let channel = args.player().map(|p| p.voice_channel_id()).unwrap_or_default();
            Ok(Some(Response::new(format!("▶️ {query} (#{channel})"))))
        },
    )));
    registry.register(Arc::new(handler_fn(
        CommandDescriptor::new("volume").param("player").param("value"),
        |args| async move {
            let Ok(value) = args.text("value").unwrap_or_default().parse::<u8>() else {
                return Err(Error::Handler(
                    "볼륨은 0에서 100 사이의 숫자여야 합니다".to_string(),
                ));
            };
            Ok(Some(Response::new(format!("🔊 {value}%"))))
        },
    )));
    registry
}

#[tokio::test]
async fn test_spoken_play_reaches_player() {
    let parser = CommandParser::default();
    let players = Arc::new(MockPlayers::default());
    let dispatcher = CommandDispatcher::new(music_registry()).with_players(players.clone());
    let (console, handle) = console();

    let parsed = parser.parse("뮤직봇 틀어줘 아이유 좋은 날").unwrap();
    let outcome = dispatcher
        .dispatch(&parsed.command, &parsed.args, &context(handle, true))
        .await
        .unwrap();

    assert_eq!(outcome, DispatchOutcome::Completed { responded: true });
    assert_eq!(sent(&console), vec!["▶️ 아이유 좋은 날 (#99)"]);
    assert_eq!(players.summons.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_play_outside_voice_channel() {
    let players = Arc::new(MockPlayers::default());
    let dispatcher = CommandDispatcher::new(music_registry()).with_players(players.clone());
    let (console, handle) = console();

    let result = dispatcher
        .dispatch("play", "아이유", &context(handle, false))
        .await;

    assert!(matches!(result, Err(Error::VoiceContextMissing(_))));
    assert_eq!(players.summons.load(Ordering::SeqCst), 1);
    assert_eq!(sent(&console), vec!["음성 채널에 먼저 들어가 주세요."]);
}

#[tokio::test]
async fn test_handler_error_goes_to_channel() {
    let players = Arc::new(MockPlayers::default());
    let dispatcher = CommandDispatcher::new(music_registry()).with_players(players);
    let (console, handle) = console();

    let outcome = dispatcher
        .dispatch("volume", "크게", &context(handle, true))
        .await
        .unwrap();

    assert!(matches!(outcome, DispatchOutcome::HandlerFailed(_)));
    assert_eq!(sent(&console), vec!["볼륨은 0에서 100 사이의 숫자여야 합니다"]);
}

#[tokio::test]
async fn test_config_phrases_and_aliases() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[voice]
wake_phrase = "DJ"

[commands]
"볼륨업" = "louder"

[aliases]
louder = "volume"
"#
    )
    .unwrap();

    let fc = read_config_file(file.path()).unwrap();
    let config = Config::resolve(fc, |_| None).unwrap();

    let mut table = CommandTable::korean();
    for (phrase, command) in &config.commands.phrases {
        table.insert(CommandEntry::new(phrase, command));
    }
    let parser = CommandParser::new(&config.voice.wake_phrase, table);

    let mut registry = music_registry();
    registry.extend_aliases(&config.commands.aliases);
    let dispatcher =
        CommandDispatcher::new(registry).with_players(Arc::new(MockPlayers::default()));
    let (console, handle) = console();

    // "볼륨업" is longer than "볼륨", so the configured phrase wins
    let parsed = parser.parse("dj 볼륨업 80").unwrap();
    assert_eq!(parsed.command, "louder");

    dispatcher
        .dispatch(&parsed.command, &parsed.args, &context(handle, true))
        .await
        .unwrap();
    assert_eq!(sent(&console), vec!["🔊 80%"]);
}

#[tokio::test]
async fn test_unhandled_table_commands_are_announced() {
    let parser = CommandParser::default();
    let mut registry = music_registry();
    AnnounceHandler::register_missing(&mut registry, parser.table());
    let dispatcher = CommandDispatcher::new(registry).with_rich_formatting(true);
    let (console, handle) = console();

    let parsed = parser.parse("뮤직봇 셔플").unwrap();
    dispatcher
        .dispatch(&parsed.command, &parsed.args, &context(handle, true))
        .await
        .unwrap();

    let message = &console.transcript()[0];
    assert_eq!(message.content(), "**shuffle**\n🔊 명령어: `shuffle`");
}
