use super::chat::{export_transcript, parse_input, stream_reply, ReplInput, ReplyEnd};
use super::config_keys::{apply_set, apply_unset};
use super::setup::{pick_provider, PreparedSession};
use super::*;
use crate::api::ProviderInfo;
use crate::core::orchestrator::CompletionOrchestrator;
use crate::utils::logging::LoggingState;
use crate::utils::test_utils::{
    plain_provider, streaming_provider, BodyStep, Script, ScriptedBackend,
};
use tokio::io::{AsyncBufReadExt, BufReader};

mod test_helpers {
    use super::*;

    pub(super) fn parse_args(argv: &[&str]) -> Args {
        Args::try_parse_from(argv)
            .unwrap_or_else(|err| panic!("argv={argv:?} should parse successfully: {err}"))
    }

    pub(super) fn streaming_session(scripts: Vec<Script>) -> PreparedSession {
        let mut orchestrator = CompletionOrchestrator::new(ScriptedBackend::new(scripts));
        orchestrator.select_provider(streaming_provider());
        PreparedSession {
            orchestrator,
            logging: LoggingState::new(None).expect("logging state"),
        }
    }
}

use test_helpers::{parse_args, streaming_session};

#[test]
fn chat_is_the_default_command() {
    let args = parse_args(&["causette"]);
    assert!(args.command.is_none());
    assert!(args.provider.is_none());
}

#[test]
fn global_flags_apply_to_subcommands() {
    let argv = [
        "causette",
        "say",
        "-p",
        "openrouter",
        "--model",
        "gpt-4o",
        "--base-url",
        "http://example.test/api",
        "hello",
        "there",
    ];
    let args = parse_args(&argv);
    assert_eq!(args.provider.as_deref(), Some("openrouter"));
    assert_eq!(args.model.as_deref(), Some("gpt-4o"));
    assert_eq!(args.base_url.as_deref(), Some("http://example.test/api"));
    match args.command {
        Some(Commands::Say { prompt }) => assert_eq!(prompt, vec!["hello", "there"]),
        _ => panic!("expected say subcommand for argv={argv:?}"),
    }
}

#[test]
fn log_flag_takes_a_path() {
    let args = parse_args(&["causette", "chat", "-l", "session.log"]);
    assert_eq!(args.log, Some(std::path::PathBuf::from("session.log")));
    assert!(matches!(args.command, Some(Commands::Chat)));
}

#[test]
fn repl_input_parsing() {
    assert_eq!(parse_input("   "), ReplInput::Empty);
    assert_eq!(
        parse_input("  hello there "),
        ReplInput::Message("hello there".into())
    );
    assert_eq!(parse_input("/stop"), ReplInput::Stop);
    assert_eq!(parse_input("/reset"), ReplInput::Reset);
    assert_eq!(parse_input("/export"), ReplInput::Export(None));
    assert_eq!(
        parse_input("/export  notes/chat.md "),
        ReplInput::Export(Some("notes/chat.md".into()))
    );
    assert_eq!(parse_input("/log"), ReplInput::Log);
    assert_eq!(parse_input("/quit"), ReplInput::Quit);
    assert_eq!(parse_input("/exit"), ReplInput::Quit);
    assert_eq!(parse_input("/frobnicate x"), ReplInput::Unknown("/frobnicate".into()));
}

#[test]
fn provider_resolution_order() {
    let providers: Vec<ProviderInfo> = vec![streaming_provider(), plain_provider()];

    let requested = pick_provider(&providers, Some("HuggingFace"), Some("openrouter"));
    assert_eq!(requested.map(|p| p.id).as_deref(), Ok("huggingface"));

    let configured = pick_provider(&providers, None, Some("huggingface"));
    assert_eq!(configured.map(|p| p.id).as_deref(), Ok("huggingface"));

    let unknown_default = pick_provider(&providers, None, Some("gone"));
    assert_eq!(unknown_default.map(|p| p.id).as_deref(), Ok("openrouter"));

    let err = pick_provider(&providers, Some("nope"), None).expect_err("unknown provider");
    assert!(err.contains("openrouter, huggingface"), "{err}");

    assert!(pick_provider(&[], None, None).is_err());
}

#[test]
fn set_and_unset_config_keys() {
    let mut config = Config::default();

    apply_set(&mut config, "default-provider", &["openrouter".into()]).expect("set provider");
    assert_eq!(config.default_provider.as_deref(), Some("openrouter"));

    apply_set(
        &mut config,
        "default-model",
        &["OpenRouter".into(), "meta/llama".into()],
    )
    .expect("set model");
    assert_eq!(
        config.get_default_model("openrouter").map(String::as_str),
        Some("meta/llama")
    );
    assert!(apply_set(&mut config, "default-model", &["openrouter".into()]).is_err());

    assert!(apply_set(&mut config, "base-url", &["localhost".into()]).is_err());
    assert!(apply_set(&mut config, "base-url", &["http://exa mple.com".into()]).is_err());
    assert!(config.base_url.is_none());
    apply_set(&mut config, "base-url", &["http://host:9000/api".into()]).expect("set url");
    assert_eq!(config.base_url.as_deref(), Some("http://host:9000/api"));

    apply_set(&mut config, "idle-timeout", &["30".into()]).expect("set timeout");
    assert_eq!(config.idle_timeout_secs, Some(30));
    assert!(apply_set(&mut config, "idle-timeout", &["soon".into()]).is_err());

    assert!(apply_set(&mut config, "colour", &["blue".into()]).is_err());
    assert!(apply_set(&mut config, "default-provider", &[]).is_err());

    apply_unset(&mut config, "default-model", Some("openrouter")).expect("unset model");
    assert!(config.get_default_model("openrouter").is_none());
    assert!(apply_unset(&mut config, "default-model", None).is_err());
    apply_unset(&mut config, "default-provider", None).expect("unset provider");
    assert!(config.default_provider.is_none());
}

#[tokio::test]
async fn stream_reply_prints_deltas_as_they_arrive() {
    let mut session = streaming_session(vec![Script::Stream(vec![
        BodyStep::frame("Hel"),
        BodyStep::frame("lo"),
        BodyStep::done(),
    ])]);
    session.orchestrator.send("hi").expect("send succeeds");

    let mut lines = BufReader::new(tokio::io::empty()).lines();
    let mut out = Vec::new();
    let end = stream_reply(&mut session.orchestrator, &mut lines, &mut out)
        .await
        .expect("stream reply");

    assert_eq!(end, ReplyEnd::Completed);
    assert_eq!(String::from_utf8(out).unwrap(), "Hello\n");
}

#[tokio::test]
async fn stop_typed_during_reply_cancels_it() {
    let mut session = streaming_session(vec![Script::Stream(vec![
        BodyStep::frame("partial"),
        BodyStep::Hang,
    ])]);
    session.orchestrator.send("hi").expect("send succeeds");
    let handle = session
        .orchestrator
        .active_stream()
        .cloned()
        .expect("active handle");

    let mut lines = BufReader::new(&b"what?\n/stop\n"[..]).lines();
    let mut out = Vec::new();
    let end = stream_reply(&mut session.orchestrator, &mut lines, &mut out)
        .await
        .expect("stream reply");

    assert_eq!(end, ReplyEnd::Stopped);
    assert!(handle.is_finished());
    assert!(!session.orchestrator.is_streaming());
}

#[tokio::test]
async fn stream_reply_reports_failure() {
    let mut session = streaming_session(vec![Script::Reject(
        crate::core::error::TransportError::Status {
            status: 502,
            message: "Bad Gateway".into(),
        },
    )]);
    session.orchestrator.send("hi").expect("send succeeds");

    let mut lines = BufReader::new(tokio::io::empty()).lines();
    let mut out = Vec::new();
    let end = stream_reply(&mut session.orchestrator, &mut lines, &mut out)
        .await
        .expect("stream reply");
    assert_eq!(end, ReplyEnd::Failed("Bad Gateway".into()));
}

#[tokio::test]
async fn export_skips_system_messages() {
    let mut session = streaming_session(vec![Script::Stream(vec![
        BodyStep::frame("Answer"),
        BodyStep::done(),
    ])]);
    assert_eq!(export_transcript(&session), "");

    session.orchestrator.send("Question").expect("send succeeds");
    session.orchestrator.wait_for_turn().await;

    let transcript = export_transcript(&session);
    assert!(transcript.starts_with("# Causette chat\n\nModel: test-model\nProvider: OpenRouter\n"));
    assert!(transcript.contains("**USER**"));
    assert!(transcript.contains("**ASSISTANT**"));
    assert!(!transcript.contains("**SYSTEM**"));
    assert!(transcript.ends_with("\n\nAnswer"));
}
