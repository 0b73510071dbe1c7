//! Startup helpers for the line-oriented chatbot client binary.
//!
//! Configuration comes from `CHATBOT_*` environment variables:
//! `CHATBOT_API_URL` (backend base URL), `CHATBOT_USER_ID` (skip login),
//! `CHATBOT_EMAIL`/`CHATBOT_PASSWORD` (login), and `CHATBOT_NGROK_COMPAT`
//! (send the ngrok interstitial bypass header).

use std::io::{BufRead, Write};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;

use crate::auth;
use crate::backend::{BackendConfig, HttpChatBackend};
use crate::conversations::export::{self, ExportFormat};
use crate::conversations::{ChatStore, Conversation, FileUpload, UserId};

/// Default backend base URL when `CHATBOT_API_URL` is not set.
const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";

/// Run the client until EOF or `/quit`.
///
/// # Returns
/// `ExitCode::SUCCESS` on a clean exit, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    tracing::info!("Starting chatbot client v{}", env!("CARGO_PKG_VERSION"));

    let config = config_from_env();
    let backend = match HttpChatBackend::new(&config) {
        Ok(backend) => Arc::new(backend),
        Err(e) => {
            tracing::error!("Failed to create backend client: {e}");
            return ExitCode::from(1);
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = drive(&rt, backend) {
        tracing::error!("Client error: {e}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

/// Build the backend configuration from the environment.
#[must_use]
pub fn config_from_env() -> BackendConfig {
    let base_url =
        std::env::var("CHATBOT_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_owned());
    let mut config = BackendConfig::new(base_url);
    let ngrok = std::env::var("CHATBOT_NGROK_COMPAT")
        .is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
    if ngrok {
        config = config.with_header("ngrok-skip-browser-warning", "true");
    }
    config
}

/// Resolve the identity to load: explicit `CHATBOT_USER_ID`, or a login
/// with `CHATBOT_EMAIL`/`CHATBOT_PASSWORD`.
async fn resolve_identity(backend: &HttpChatBackend) -> anyhow::Result<UserId> {
    if let Ok(id) = std::env::var("CHATBOT_USER_ID") {
        return Ok(UserId::new(id));
    }
    let email = std::env::var("CHATBOT_EMAIL")
        .context("set CHATBOT_USER_ID, or CHATBOT_EMAIL and CHATBOT_PASSWORD")?;
    let password = std::env::var("CHATBOT_PASSWORD").context("CHATBOT_PASSWORD is not set")?;
    let profile = auth::login(backend, &email, &password).await?;
    Ok(profile.id)
}

/// The interactive loop. Every line is a message for the active
/// conversation unless it starts with a `/command`.
fn drive(rt: &tokio::runtime::Runtime, backend: Arc<HttpChatBackend>) -> anyhow::Result<()> {
    let user = rt.block_on(resolve_identity(&backend))?;
    let store = ChatStore::new(backend);
    rt.block_on(store.load(&user));
    print_overview(rt, &store);
    println!("Befehle: /list /new /select <n> /rename <titel> /system <text>");
    println!("         /attach <datei>... /detach <n> /export json|txt /delete /quit");

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }
        if let Some(command) = line.strip_prefix('/') {
            handle_command(rt, &store, command);
        } else {
            send_message(rt, &store, line);
        }
    }
    Ok(())
}

fn handle_command(rt: &tokio::runtime::Runtime, store: &ChatStore, command: &str) {
    let (verb, rest) = command.split_once(' ').unwrap_or((command, ""));
    let rest = rest.trim();
    match verb {
        "list" => print_overview(rt, store),
        "new" => match rt.block_on(store.create_conversation()) {
            Ok(id) => println!("Neuer Chat angelegt ({id})."),
            Err(e) => eprintln!("Fehler: {e}"),
        },
        "select" => {
            let chats = rt.block_on(store.conversations());
            match rest.parse::<usize>().ok().and_then(|n| chats.get(n)) {
                Some(conv) => {
                    if let Err(e) = rt.block_on(store.select_conversation(&conv.id)) {
                        eprintln!("Fehler: {e}");
                    }
                }
                None => eprintln!("Unbekannter Index: {rest}"),
            }
        }
        "rename" => {
            if let Some(id) = rt.block_on(store.active_id()) {
                if let Err(e) = rt.block_on(store.rename_conversation(&id, rest)) {
                    eprintln!("Fehler: {e}");
                }
            }
        }
        "system" => {
            if let Some(id) = rt.block_on(store.active_id()) {
                if let Err(e) = rt.block_on(store.set_system_instruction(&id, rest)) {
                    eprintln!("Fehler: {e}");
                }
            }
        }
        "attach" => attach_paths(rt, store, rest),
        "detach" => detach_index(rt, store, rest),
        "export" => export_active(rt, store, rest),
        "delete" => {
            if let Some(id) = rt.block_on(store.active_id()) {
                match rt.block_on(store.delete_conversation(&id)) {
                    Ok(()) => println!("Chat gelöscht."),
                    Err(e) => eprintln!("Fehler: {e}"),
                }
            }
        }
        other => eprintln!("Unbekannter Befehl: /{other}"),
    }
}

fn send_message(rt: &tokio::runtime::Runtime, store: &ChatStore, text: &str) {
    let Some(id) = rt.block_on(store.active_id()) else {
        eprintln!("Kein Chat ausgewählt. /new legt einen an.");
        return;
    };
    if let Err(e) = rt.block_on(store.post_message(&id, text)) {
        eprintln!("Fehler: {e}");
    }
    if let Some(conv) = rt.block_on(store.active_conversation()) {
        if let Some(reply) = conv.messages.last() {
            println!("{}: {}", reply.role, reply.content);
        }
    }
}

fn attach_paths(rt: &tokio::runtime::Runtime, store: &ChatStore, rest: &str) {
    let Some(id) = rt.block_on(store.active_id()) else {
        eprintln!("Kein Chat ausgewählt.");
        return;
    };
    let mut files = Vec::new();
    for path in rest.split_whitespace() {
        match std::fs::read(path) {
            Ok(bytes) => {
                let name = std::path::Path::new(path)
                    .file_name()
                    .map_or_else(|| path.to_owned(), |n| n.to_string_lossy().into_owned());
                files.push(FileUpload::new(name, bytes));
            }
            Err(e) => {
                eprintln!("Kann {path} nicht lesen: {e}");
                return;
            }
        }
    }
    if files.is_empty() {
        eprintln!("Keine Dateien angegeben.");
        return;
    }
    match rt.block_on(store.attach_files(&id, &files)) {
        Ok(()) => println!("{} Datei(en) hochgeladen.", files.len()),
        Err(e) => eprintln!("Fehler: {e}"),
    }
}

fn detach_index(rt: &tokio::runtime::Runtime, store: &ChatStore, rest: &str) {
    let Some(conv) = rt.block_on(store.active_conversation()) else {
        eprintln!("Kein Chat ausgewählt.");
        return;
    };
    match rest.parse::<usize>().ok().and_then(|n| conv.attachments.get(n)) {
        Some(attachment) => {
            if let Err(e) = rt.block_on(store.remove_attachment(&conv.id, &attachment.id)) {
                eprintln!("Fehler: {e}");
            }
        }
        None => eprintln!("Unbekannter Index: {rest}"),
    }
}

fn export_active(rt: &tokio::runtime::Runtime, store: &ChatStore, rest: &str) {
    let Some(conv) = rt.block_on(store.active_conversation()) else {
        eprintln!("Kein Chat ausgewählt.");
        return;
    };
    match rest.parse::<ExportFormat>() {
        Ok(format) => match export::render(&conv, format) {
            Ok(rendered) => println!("{rendered}"),
            Err(e) => eprintln!("Fehler: {e}"),
        },
        Err(e) => eprintln!("{e}"),
    }
}

fn print_overview(rt: &tokio::runtime::Runtime, store: &ChatStore) {
    let chats = rt.block_on(store.conversations());
    let active = rt.block_on(store.active_id());
    if chats.is_empty() {
        println!("Keine Chats vorhanden. /new legt einen an.");
        return;
    }
    for (index, conv) in chats.iter().enumerate() {
        let marker = if Some(&conv.id) == active.as_ref() { "*" } else { " " };
        println!("{marker} [{index}] {} — {}", conv.title, preview_line(conv));
    }
}

fn preview_line(conv: &Conversation) -> String {
    conv.preview().replace('\n', " ")
}
