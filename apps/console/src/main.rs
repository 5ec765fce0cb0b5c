use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use client_core::{
    rest::{RestConnection, RestLeadService, RestSessionProvider},
    Access, DeleteConfirmer, LeadConsole, LeadDraft, NoticeKind, SignIn,
};
use shared::{
    domain::LeadStatus,
    protocol::{Credentials, LeadRecord},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;

/// Terminal client for the lead management backend.
#[derive(Parser, Debug)]
struct Args {
    /// Backend base URL, e.g. https://project.example.co
    #[arg(long)]
    base_url: Option<String>,
    /// Public API key for the backend
    #[arg(long)]
    api_key: Option<String>,
    /// Email to sign in with (prompted when omitted)
    #[arg(long)]
    email: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    List,
    Add,
    Status { index: usize, status: LeadStatus },
    Delete { index: usize },
    Reload,
    Logout,
    Help,
    Quit,
}

fn parse_command(line: &str) -> Result<Command, String> {
    let mut parts = line.split_whitespace();
    let Some(keyword) = parts.next() else {
        return Err("empty command".to_string());
    };
    let command = match keyword {
        "list" => Command::List,
        "add" => Command::Add,
        "reload" => Command::Reload,
        "logout" => Command::Logout,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        "status" => {
            let index = parse_index(parts.next())?;
            let status = parts
                .next()
                .ok_or_else(|| format!("usage: status <n> <{}>", status_options()))?
                .parse::<LeadStatus>()
                .map_err(|err| err.to_string())?;
            Command::Status { index, status }
        }
        "delete" => Command::Delete {
            index: parse_index(parts.next())?,
        },
        other => return Err(format!("unknown command '{other}'; try 'help'")),
    };
    if parts.next().is_some() {
        return Err("unexpected trailing arguments".to_string());
    }
    Ok(command)
}

fn parse_index(part: Option<&str>) -> Result<usize, String> {
    part.and_then(|value| value.parse::<usize>().ok())
        .filter(|index| *index >= 1)
        .ok_or_else(|| "expected a lead number starting at 1".to_string())
}

fn status_options() -> String {
    LeadStatus::ALL
        .iter()
        .map(|status| status.as_str())
        .collect::<Vec<_>>()
        .join("|")
}

fn prompt(label: &str) -> Option<String> {
    print!("{label}");
    io::stdout().flush().ok()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line).ok()?;
    Some(line.trim().to_string())
}

struct PromptConfirmer;

#[async_trait]
impl DeleteConfirmer for PromptConfirmer {
    async fn confirm_delete(&self, lead: &LeadRecord) -> bool {
        let answer = prompt(&format!("delete lead '{}'? [y/N] ", lead.name));
        matches!(
            answer.map(|value| value.to_lowercase()).as_deref(),
            Some("y") | Some("yes")
        )
    }
}

fn display_or_dash(value: Option<&str>) -> &str {
    match value {
        Some(value) if !value.trim().is_empty() => value,
        _ => "-",
    }
}

fn print_leads(leads: &[LeadRecord]) {
    if leads.is_empty() {
        println!("no leads yet");
        return;
    }
    for (index, lead) in leads.iter().enumerate() {
        println!(
            "{:>3}. {}  [{}]  contact: {}  category: {}  created: {}",
            index + 1,
            lead.name,
            lead.status,
            display_or_dash(lead.contact_handle.as_deref()),
            display_or_dash(lead.category.as_deref()),
            lead.created_at.format("%Y-%m-%d %H:%M"),
        );
        if let Some(note) = lead.note.as_deref().filter(|note| !note.trim().is_empty()) {
            println!("     note: {note}");
        }
    }
}

async fn print_notice(console: &LeadConsole) {
    if let Some(notice) = console.last_message().await {
        match notice.kind {
            NoticeKind::Failure => println!("error: {}", notice.text),
            NoticeKind::Info => println!("{}", notice.text),
        }
    }
}

async fn lead_at(console: &LeadConsole, index: usize) -> Option<LeadRecord> {
    console.leads().await.into_iter().nth(index - 1)
}

async fn sign_in_interactively(console: &LeadConsole, preset_email: Option<&str>) -> Result<bool> {
    loop {
        let email = match preset_email {
            Some(email) => email.to_string(),
            None => match prompt("email (blank to quit): ") {
                Some(value) if !value.is_empty() => value,
                _ => return Ok(false),
            },
        };
        let Some(password) = prompt("password: ") else {
            return Ok(false);
        };
        match console.sign_in(&Credentials { email, password }).await {
            Ok(SignIn::Established) => return Ok(true),
            Ok(SignIn::SessionMissing) | Err(_) => print_notice(console).await,
        }
    }
}

fn print_help() {
    println!("commands:");
    println!("  list               show the cached lead list");
    println!("  reload             re-fetch the list from the backend");
    println!("  add                create a lead (prompts for each field)");
    println!("  status <n> <value> set lead n to {}", status_options());
    println!("  delete <n>         delete lead n (asks for confirmation)");
    println!("  logout             sign out and exit");
    println!("  quit               exit without signing out");
}

async fn repl(console: &LeadConsole) -> Result<()> {
    println!("type 'help' for the command list");
    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Ok(());
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let command = match parse_command(line) {
            Ok(command) => command,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };
        match command {
            Command::Quit => return Ok(()),
            Command::Help => print_help(),
            Command::List => print_leads(&console.leads().await),
            Command::Reload => {
                let _ = console.reload().await;
                print_leads(&console.leads().await);
                print_notice(console).await;
            }
            Command::Add => {
                let draft = LeadDraft {
                    name: prompt("name: ").unwrap_or_default(),
                    contact_handle: prompt("contact: ").unwrap_or_default(),
                    category: prompt("category: ").unwrap_or_default(),
                    note: prompt("note: ").unwrap_or_default(),
                };
                console.set_draft(draft).await;
                if console.create_lead().await.is_ok() {
                    print_leads(&console.leads().await);
                }
                print_notice(console).await;
            }
            Command::Status { index, status } => match lead_at(console, index).await {
                Some(lead) => {
                    let _ = console.update_status(lead.id, status).await;
                    print_leads(&console.leads().await);
                    print_notice(console).await;
                }
                None => println!("no lead #{index}"),
            },
            Command::Delete { index } => match lead_at(console, index).await {
                Some(lead) => {
                    let _ = console.delete_lead(lead.id).await;
                    print_leads(&console.leads().await);
                    print_notice(console).await;
                }
                None => println!("no lead #{index}"),
            },
            Command::Logout => {
                console.logout().await;
                println!("signed out");
                return Ok(());
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Args::parse();
    let settings = config::load_settings();
    let base_url = args.base_url.unwrap_or(settings.base_url);
    let api_key = args.api_key.or(settings.api_key).unwrap_or_default();
    let email = args.email.or(settings.email);

    info!("connecting to {base_url}");
    let conn = RestConnection::new(&base_url, api_key)?;
    let session = Arc::new(RestSessionProvider::new(conn.clone()));
    let data = Arc::new(RestLeadService::new(conn));
    let console = LeadConsole::new(session, data, Arc::new(PromptConfirmer));

    loop {
        match console.open().await? {
            Access::Granted => break,
            Access::RedirectToLogin => {
                if !sign_in_interactively(&console, email.as_deref()).await? {
                    return Ok(());
                }
            }
        }
    }

    print_leads(&console.leads().await);
    print_notice(&console).await;
    repl(&console).await
}
