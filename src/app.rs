use std::collections::HashSet;
use std::io::{self, Write};

use anyhow::Result;
use oauth2::Scope;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::Cli;
use crate::config::AppDefaults;
use crate::dispatch::{DispatchEngine, DispatchItem, Pacing, SystemInvoker};
use crate::gmail::GmailClient;
use crate::oauth;
use crate::scan::Scanner;
use crate::senders::group_by_sender;
use crate::types::{DispatchStatus, ScanProgress, SenderGroup, StatusUpdate};

pub async fn run(cli: Cli) -> Result<()> {
    let mut defaults = AppDefaults::load()?;
    if let Some(cap) = cli.max_results {
        defaults.result_cap = cap;
    }

    let scopes = vec![
        Scope::new("https://www.googleapis.com/auth/gmail.readonly".into()),
        Scope::new("https://www.googleapis.com/auth/userinfo.email".into()),
    ];
    let token = oauth::obtain_token(&scopes, "default").await?;
    let account = oauth::fetch_user_email(&token.access_token).await?;
    info!(account = %account, "Authorized");

    let api = GmailClient::new(defaults.request_timeout)?;

    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping scan");
            cancel_on_signal.cancel();
        }
    });

    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
    let progress_printer = tokio::spawn(async move {
        while let Some(snapshot) = progress_rx.recv().await {
            match snapshot {
                ScanProgress::Starting => eprintln!("Scanning mailbox..."),
                ScanProgress::Listing { count } => {
                    eprintln!("  discovered {count} candidate messages")
                }
                ScanProgress::Fetching { current, total } => {
                    eprintln!("  fetched headers {current}/{total}")
                }
            }
        }
    });

    let scanner = Scanner::new(&api, &defaults);
    let messages = scanner
        .fetch_candidates(&token.access_token, &progress_tx, &cancel)
        .await?;
    drop(progress_tx);
    let _ = progress_printer.await;

    let mut groups = group_by_sender(messages);
    if groups.is_empty() {
        println!("No senders with unsubscribe headers found.");
        return Ok(());
    }

    print_groups(&account, &groups);

    if cli.list_only {
        return Ok(());
    }

    let mut selection: HashSet<String> = if cli.all {
        groups.iter().map(|g| g.email.clone()).collect()
    } else {
        prompt_selection(&groups)?
    };
    if selection.is_empty() {
        println!("Nothing selected.");
        return Ok(());
    }

    let items: Vec<DispatchItem> = groups
        .iter()
        .filter(|g| selection.contains(&g.email))
        .map(DispatchItem::from_group)
        .collect();

    let (status_tx, mut status_rx) = mpsc::unbounded_channel();
    let status_printer = tokio::spawn(async move {
        while let Some(StatusUpdate { email, status }) = status_rx.recv().await {
            match status {
                DispatchStatus::Pending => {}
                DispatchStatus::Processing => println!("  ...  {email}"),
                DispatchStatus::Done => println!("  ok   {email}"),
                DispatchStatus::Error => println!("  FAIL {email}"),
            }
        }
    });

    println!("Unsubscribing from {} senders:", items.len());
    let invoker = SystemInvoker;
    let pacing = Pacing {
        settle: defaults.settle_delay,
        step: defaults.pacing_delay,
        cleanup: defaults.cleanup_delay,
    };
    let mut engine = DispatchEngine::new(&invoker, pacing, status_tx);
    let report = engine.run(&items, &mut groups, &mut selection).await;
    drop(engine);
    let _ = status_printer.await;

    let failed = report
        .statuses
        .values()
        .filter(|s| **s == DispatchStatus::Error)
        .count();
    println!("Cleaned {} senders; {} failed.", report.cleaned, failed);
    if failed > 0 {
        println!("Failed senders stay listed; run again to retry them.");
    }

    Ok(())
}

fn print_groups(account: &str, groups: &[SenderGroup]) {
    println!("\nSenders with unsubscribe headers in {account}:\n");
    for (i, group) in groups.iter().enumerate() {
        let mechanism = match (&group.links.http_url, &group.links.mailto) {
            (Some(_), _) if group.one_click => "http, one-click",
            (Some(_), _) => "http",
            (None, Some(_)) => "mailto",
            (None, None) => "no link",
        };
        println!(
            "{:>3}. [{:>3} msgs] {} <{}> ({mechanism})",
            i + 1,
            group.messages.len(),
            group.display_name,
            group.email,
        );
    }
    println!();
}

fn prompt_selection(groups: &[SenderGroup]) -> Result<HashSet<String>> {
    print!("Select senders to unsubscribe (e.g. 1,3,5 or 'all'; empty to abort): ");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    let line = line.trim();

    if line.is_empty() {
        return Ok(HashSet::new());
    }
    if line.eq_ignore_ascii_case("all") {
        return Ok(groups.iter().map(|g| g.email.clone()).collect());
    }

    let mut selection = HashSet::new();
    for part in line.split([',', ' ']).filter(|p| !p.is_empty()) {
        match part.parse::<usize>() {
            Ok(n) if n >= 1 && n <= groups.len() => {
                selection.insert(groups[n - 1].email.clone());
            }
            _ => warn!(input = %part, "Ignoring invalid selection"),
        }
    }
    Ok(selection)
}
