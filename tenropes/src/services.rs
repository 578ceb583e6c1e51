use std::{collections::HashSet, fs, io, path::Path, sync::Arc, time::Duration};

use anyhow::{Context, Result, bail};
use clap::CommandFactory;
use clap_complete::{Shell, generate};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use owo_colors::OwoColorize;
use tenropes_core::api::{ChatApi, RestClient, SocketTransport};
use tenropes_core::compose::{Draft, classify};
use tenropes_core::context::SessionContext;
use tenropes_core::feed::LivePolicy;
use tenropes_core::models::{ChannelMetadata, Message, MessageKey, UserMetadata};
use tenropes_core::session::{ChannelSession, FeedEvent, LoadOlder, SessionOptions};
use tenropes_core::theme::{AuthoredTheme, normalize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::cli::{Args, Command};
use crate::render;
use crate::settings::merge_settings_with_args;

pub async fn run(args: Args) -> Result<()> {
    if let Command::Completions { shell } = args.command {
        print_completions(shell);
        return Ok(());
    }

    let args = merge_settings_with_args(&args)?;

    if args.command.needs_backend() && args.token.is_empty() {
        bail!(
            "No access token. Pass --token, set TENROPES_TOKEN or add `token` to the config file"
        );
    }

    match &args.command {
        Command::Watch { channel } => watch(&args, channel).await,
        Command::History { channel, pages } => history(&args, channel, *pages).await,
        Command::Send { channel, text } => send(&args, channel, &text.join(" ")).await,
        Command::Theme {
            channel,
            file,
            json,
        } => theme(&args, channel.as_deref(), file.as_deref(), *json).await,
        Command::Completions { .. } => Ok(()),
    }
}

fn print_completions(shell: Shell) {
    let mut cmd = Args::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
}

fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

fn live_policy(args: &Args) -> LivePolicy {
    if args.dedupe {
        LivePolicy::Dedupe
    } else {
        LivePolicy::Prepend
    }
}

/// Finds a channel the user belongs to by id or, failing that, by name.
pub fn find_channel<'a>(
    channels: &'a [ChannelMetadata],
    wanted: &str,
) -> Option<&'a ChannelMetadata> {
    let wanted = wanted.trim();
    if let Ok(id) = wanted.parse::<i64>() {
        if let Some(channel) = channels.iter().find(|channel| channel.id == id) {
            return Some(channel);
        }
    }

    channels
        .iter()
        .find(|channel| channel.name.eq_ignore_ascii_case(wanted))
}

async fn resolve_channel(api: &impl ChatApi, wanted: &str) -> Result<ChannelMetadata> {
    let channels = api.fetch_channels().await?;
    find_channel(&channels, wanted)
        .cloned()
        .with_context(|| format!("No channel named or numbered {wanted:?}"))
}

async fn open_session(
    args: &Args,
    api: Arc<RestClient>,
    channel: &ChannelMetadata,
    context: SessionContext,
    events: Option<mpsc::UnboundedSender<FeedEvent>>,
) -> ChannelSession<RestClient> {
    let transport = SocketTransport::new(&args.base_url, &args.token);
    let options = SessionOptions {
        policy: live_policy(args),
        events,
    };

    let spinner = spinner(&format!("Loading #{}...", channel.name));
    let session =
        ChannelSession::open(channel, api, &transport, context, options).await;
    spinner.finish_and_clear();

    session
}

fn print_lines(lines: impl IntoIterator<Item = String>) {
    for line in lines {
        println!("{line}");
    }
}

/// Pushes queued while the session was opening that the feed snapshot does not
/// already show.
pub fn unseen_pushes(snapshot: &[Message], queued: Vec<Message>) -> Vec<Message> {
    let mut shown: HashSet<MessageKey> = snapshot.iter().map(Message::key).collect();
    queued
        .into_iter()
        .filter(|message| !shown.remove(&message.key()))
        .collect()
}

fn show_push(message: &Message, members: &[UserMetadata], context: &SessionContext) {
    if context.should_alert(Some(message.channel_id)) {
        print!("\x07");
    }
    println!("{}", render::message_line(message, members));
}

fn report_event(event: FeedEvent, channel: &ChannelMetadata) {
    match event {
        FeedEvent::Pushed(_) => {}
        FeedEvent::Dropped(raw) => warn!("Ignored malformed message: {raw}"),
        FeedEvent::Disconnected => warn!("Live connection to #{} closed", channel.name),
    }
}

async fn watch(args: &Args, wanted: &str) -> Result<()> {
    let api = Arc::new(RestClient::new(&args.base_url, &args.token)?);
    let channel = resolve_channel(api.as_ref(), wanted).await?;

    let context = SessionContext::new();
    if args.no_bell {
        context.mark_notifications_refused();
    }

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let session = open_session(args, api, &channel, context.clone(), Some(events_tx)).await;

    println!("{}", format!("#{}", channel.name).bright_green().bold());
    let members = session.members().await;
    let snapshot = session.messages().await;

    // pushes received while opening are already in the snapshot
    let mut queued = Vec::new();
    while let Ok(event) = events_rx.try_recv() {
        match event {
            FeedEvent::Pushed(message) => queued.push(message),
            other => report_event(other, &channel),
        }
    }
    print_lines(render::transcript(&snapshot, &members));
    for message in unseen_pushes(&snapshot, queued) {
        show_push(&message, &members, &context);
    }

    if !session.is_live() {
        warn!("Not receiving live messages for #{}", channel.name);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut draft = Draft::default();
    let mut live = true;

    loop {
        tokio::select! {
            event = events_rx.recv(), if live => match event {
                Some(FeedEvent::Pushed(message)) => show_push(&message, &members, &context),
                Some(other) => report_event(other, &channel),
                None => live = false,
            },
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };

                match line.trim() {
                    "/quit" => break,
                    "/older" => match session.load_older().await {
                        Ok(LoadOlder::Appended(count)) => {
                            let messages = session.messages().await;
                            let older = &messages[messages.len().saturating_sub(count)..];
                            println!("{}", "earlier messages".dimmed());
                            print_lines(render::transcript(older, &members));
                        }
                        Ok(LoadOlder::Exhausted) => println!("{}", "no older messages".dimmed()),
                        Ok(LoadOlder::Skipped | LoadOlder::Stale) => {}
                        Err(e) => error!("{e:#}"),
                    },
                    _ => {
                        draft.set(line.as_str());
                        if let Err(e) = session.send(&mut draft).await {
                            error!("{e:#}");
                        }
                    }
                }
            }
        }
    }

    session.close();
    Ok(())
}

async fn history(args: &Args, wanted: &str, pages: usize) -> Result<()> {
    let api = Arc::new(RestClient::new(&args.base_url, &args.token)?);
    let channel = resolve_channel(api.as_ref(), wanted).await?;
    let session = open_session(args, api, &channel, SessionContext::new(), None).await;

    let spinner = spinner("Loading older messages...");
    for _ in 0..pages {
        match session.load_older().await? {
            LoadOlder::Appended(count) => info!("loaded {count} older messages"),
            LoadOlder::Exhausted | LoadOlder::Skipped | LoadOlder::Stale => break,
        }
    }
    spinner.finish_and_clear();

    let messages: Vec<Message> = session.messages().await;
    print_lines(render::transcript(&messages, &session.members().await));
    session.close();

    Ok(())
}

async fn send(args: &Args, wanted: &str, text: &str) -> Result<()> {
    let api = RestClient::new(&args.base_url, &args.token)?;
    let channel = resolve_channel(&api, wanted).await?;
    let content = classify(text).context("Nothing to send")?;

    api.send_message(channel.id, &content)
        .await
        .with_context(|| format!("Failed to send message to #{}", channel.name))?;
    println!("Sent {} to #{}", content.kind().to_lowercase(), channel.name.green());

    Ok(())
}

fn read_theme_file(path: &Path) -> Result<AuthoredTheme> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read theme file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse theme file {}", path.display()))
}

async fn theme(
    args: &Args,
    channel: Option<&str>,
    file: Option<&Path>,
    json: bool,
) -> Result<()> {
    let authored = match (channel, file) {
        (Some(wanted), _) => {
            let api = RestClient::new(&args.base_url, &args.token)?;
            resolve_channel(&api, wanted).await?.theme_or_default()
        }
        (None, Some(path)) => read_theme_file(path)?,
        (None, None) => AuthoredTheme::default(),
    };

    let validated = normalize(&authored);

    if json {
        println!("{}", serde_json::to_string_pretty(&validated)?);
    } else {
        print_lines(render::theme_report(&authored, &validated));
    }

    Ok(())
}
