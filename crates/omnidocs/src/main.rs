//! A terminal client for asking questions about uploaded documents.

#[macro_use]
extern crate tracing;

use std::env;
use std::io::Write as _;
use std::path::Path;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use omnidocs::core::{Notification, NotificationLevel, TurnOutcome};
use omnidocs::http::{ApiConfigBuilder, HttpBackend};
use omnidocs::protocol::{DocumentStatus, Source};
use omnidocs::{Client, ClientBuilder};
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::sleep;

enum ClientEvent {
    Delta(String),
    Sources(Vec<Source>),
    Notification(Notification),
}

const BAR_CHAR: &str = "▎";

const HELP: &str = "\
Commands:
  /upload <path> [title]   upload a document
  /docs                    list documents
  /select [id...]          ask about these documents only (none for all)
  /reprocess <id>          process a document again
  /delete <id>             delete a document
  /new                     start a new conversation
  /resume <session id>     continue a previous conversation
  /sessions                list recent conversations
  /usage                   show usage against the plan
  /subscription            show the subscription
  /quit                    exit
Anything else is asked as a question.";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let Ok(token) = env::var("OMNIDOCS_API_TOKEN") else {
        eprintln!("OMNIDOCS_API_TOKEN environment variable is not set");
        return;
    };
    let mut config = ApiConfigBuilder::with_token(token);
    if let Ok(base_url) = env::var("OMNIDOCS_API_URL") {
        config = config.with_base_url(base_url);
    }

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();

    let client = ClientBuilder::with_config(config.build())
        .on_text_delta({
            let event_tx = event_tx.clone();
            move |text| {
                event_tx.send(ClientEvent::Delta(text.to_owned())).ok();
            }
        })
        .on_sources({
            let event_tx = event_tx.clone();
            move |sources| {
                event_tx.send(ClientEvent::Sources(sources.to_vec())).ok();
            }
        })
        .on_notification({
            let event_tx = event_tx.clone();
            move |notification| {
                event_tx.send(ClientEvent::Notification(notification)).ok();
            }
        })
        .build();

    if client.documents().refresh().await.is_ok() {
        let pending: Vec<_> = client
            .documents()
            .registry()
            .iter()
            .filter(|record| !record.status.is_terminal())
            .map(|record| record.id.clone())
            .collect();
        for id in pending {
            client.documents().track(&id);
        }
    }

    println!("{}", "Type /help for commands.".dimmed());

    let mut input = BufReader::new(io::stdin()).lines();

    loop {
        prompt();

        // Background notifications keep arriving while waiting for input.
        let line = loop {
            select! {
                line = input.next_line() => break line,
                Some(event) = event_rx.recv() => {
                    println!();
                    print_event(event);
                    prompt();
                }
            }
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                error!("error reading input: {}", err);
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(command) = line.strip_prefix('/') {
            if !run_command(&client, command).await {
                break;
            }
            continue;
        }

        ask(&client, line, &mut event_rx).await;
    }
}

async fn ask(
    client: &Client<HttpBackend>,
    question: &str,
    event_rx: &mut mpsc::UnboundedReceiver<ClientEvent>,
) {
    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")
        .unwrap()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
    let progress_bar = ProgressBar::new_spinner();
    progress_bar.set_style(progress_style);
    progress_bar.set_message("🔎 Searching documents...");

    let chat = client.chat().clone();
    let question = question.to_owned();
    let mut turn = tokio::spawn(async move { chat.send_message(question).await });

    let mut answering = false;
    let mut sources = vec![];

    let outcome = loop {
        let sleep = sleep(Duration::from_millis(100));
        select! {
            outcome = &mut turn => break outcome,
            Some(event) = event_rx.recv() => {
                handle_turn_event(event, &progress_bar, &mut answering, &mut sources);
            }
            _ = sleep => {
                if !progress_bar.is_finished() {
                    progress_bar.inc(1);
                }
            }
        }
    };

    // Events sent right before the turn ended.
    while let Ok(event) = event_rx.try_recv() {
        handle_turn_event(event, &progress_bar, &mut answering, &mut sources);
    }
    progress_bar.finish_and_clear();
    if answering {
        println!();
    }

    match outcome {
        Ok(TurnOutcome::Settled) => print_sources(&sources),
        Ok(TurnOutcome::Failed(err)) => debug!("turn failed: {err:?}"),
        Ok(TurnOutcome::Busy) => {
            println!("{}", "Still answering the previous question.".yellow());
        }
        Err(err) => error!("turn task failed: {err}"),
    }
    println!();
}

fn handle_turn_event(
    event: ClientEvent,
    progress_bar: &ProgressBar,
    answering: &mut bool,
    sources: &mut Vec<Source>,
) {
    match event {
        ClientEvent::Delta(text) => {
            if !*answering {
                progress_bar.finish_and_clear();
                print!("{}📄 ", BAR_CHAR.bright_cyan());
                *answering = true;
            }
            print!("{}", text.bright_white());
            std::io::stdout().flush().ok();
        }
        ClientEvent::Sources(received) => *sources = received,
        ClientEvent::Notification(notification) => {
            progress_bar.finish_and_clear();
            if *answering {
                println!();
                *answering = false;
            }
            print_notification(&notification);
        }
    }
}

async fn run_command(client: &Client<HttpBackend>, command: &str) -> bool {
    let mut args = command.split_whitespace();
    let Some(name) = args.next() else {
        println!("{HELP}");
        return true;
    };

    match name {
        "help" => println!("{HELP}"),
        "quit" | "exit" => return false,
        "upload" => {
            let Some(path) = args.next() else {
                println!("Usage: /upload <path> [title]");
                return true;
            };
            let title: Vec<_> = args.collect();
            let title = (!title.is_empty()).then(|| title.join(" "));
            if let Ok(record) = client.upload_file(Path::new(path), title).await {
                println!("{} {}", "Uploaded as".dimmed(), record.id.bold());
            }
        }
        "docs" => {
            if client.documents().refresh().await.is_ok() {
                print_documents(client);
            }
        }
        "select" => {
            let selected = client.select_documents(args);
            if selected.is_empty() {
                println!("Asking about all processed documents.");
            } else {
                println!("Asking about: {}", selected.join(", "));
            }
        }
        "reprocess" => {
            let Some(id) = args.next() else {
                println!("Usage: /reprocess <id>");
                return true;
            };
            client.documents().reprocess(id).await.ok();
        }
        "delete" => {
            let Some(id) = args.next() else {
                println!("Usage: /delete <id>");
                return true;
            };
            client.documents().delete(id).await.ok();
        }
        "new" => {
            if client.chat().new_conversation() {
                println!("Started a new conversation.");
            }
        }
        "resume" => {
            let Some(id) = args.next() else {
                println!("Usage: /resume <session id>");
                return true;
            };
            if client.chat().resume(id) {
                println!("Continuing conversation {id}.");
            }
        }
        "sessions" => match client.backend().list_sessions(10, 0).await {
            Ok(resp) => {
                for session in resp.sessions {
                    let title = session.title.as_deref().unwrap_or("(untitled)");
                    println!(
                        "{}  {}  {} messages",
                        session.id.bold(),
                        title,
                        session.message_count
                    );
                }
            }
            Err(err) => println!("{}", err.to_string().red()),
        },
        "usage" => match client.backend().usage().await {
            Ok(usage) => {
                println!(
                    "Queries:   {} / {}",
                    usage.queries_used,
                    limit_text(usage.queries_limit)
                );
                println!(
                    "Documents: {} / {}",
                    usage.documents_used,
                    limit_text(usage.documents_limit)
                );
                println!(
                    "Storage:   {:.1} MB / {:.1} MB",
                    usage.storage_used_mb, usage.storage_limit_mb
                );
            }
            Err(err) => println!("{}", err.to_string().red()),
        },
        "subscription" => match client.backend().subscription().await {
            Ok(subscription) => {
                println!(
                    "Plan: {:?} ({:?})",
                    subscription.tier, subscription.status
                );
                if let Some(end) = &subscription.current_period_end {
                    let verb = if subscription.cancel_at_period_end {
                        "Ends"
                    } else {
                        "Renews"
                    };
                    println!("{verb} on {end}");
                }
            }
            Err(err) => println!("{}", err.to_string().red()),
        },
        _ => println!("Unknown command /{name}. Type /help for commands."),
    }
    true
}

fn print_documents(client: &Client<HttpBackend>) {
    let registry = client.documents().registry();
    if registry.is_empty() {
        println!("No documents yet. Use /upload to add one.");
        return;
    }
    let selected = client.chat().conversation().selected_documents().to_vec();
    for record in registry.iter() {
        let marker = if selected.contains(&record.id) { "*" } else { " " };
        let status = match record.status {
            DocumentStatus::Completed => {
                format!("{} chunks", record.chunk_count).green().to_string()
            }
            DocumentStatus::Failed => record
                .error_message
                .as_deref()
                .unwrap_or("failed")
                .red()
                .to_string(),
            status => status.yellow().to_string(),
        };
        println!(
            "{marker} {}  {}  {status}",
            record.id.bold(),
            record.display_name()
        );
    }
}

fn print_sources(sources: &[Source]) {
    if sources.is_empty() {
        return;
    }
    println!("{}", "Sources:".dimmed());
    for (index, source) in sources.iter().enumerate() {
        let mut location = source.document_title.clone();
        if let Some(page) = source.page_number {
            location.push_str(&format!(", page {page}"));
        }
        if let Some(section) = &source.section_header {
            location.push_str(&format!(", {section}"));
        }
        println!(
            "{}[{}] {} {}",
            BAR_CHAR.dimmed(),
            index + 1,
            location,
            format!("({:.0}%)", source.relevance_score * 100.0).dimmed()
        );
    }
}

fn print_event(event: ClientEvent) {
    match event {
        ClientEvent::Notification(notification) => {
            print_notification(&notification)
        }
        ClientEvent::Delta(_) | ClientEvent::Sources(_) => {}
    }
}

fn print_notification(notification: &Notification) {
    match notification.level {
        NotificationLevel::Info => {
            println!("{}ℹ️  {}", BAR_CHAR.bright_blue(), notification.message)
        }
        NotificationLevel::Success => {
            println!("{}✅ {}", BAR_CHAR.bright_green(), notification.message)
        }
        NotificationLevel::Error => println!(
            "{}❌ {}",
            BAR_CHAR.bright_red(),
            notification.message.red()
        ),
    }
}

fn limit_text(limit: i64) -> String {
    if limit < 0 {
        "unlimited".to_owned()
    } else {
        limit.to_string()
    }
}

#[inline]
fn prompt() {
    print!("> ");
    std::io::stdout().flush().ok();
}
