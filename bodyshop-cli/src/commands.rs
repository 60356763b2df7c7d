use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use bodyshop_core::{
    domain::{
        invoice::{Discrepancy, GuardState, InvoiceEditSession, InvoiceError, InvoiceId, JsonFileInvoiceRepository, Totals},
        session::{
            ProbeOutcome, RefreshScheduler, SessionError, SessionEvent, SessionService, SessionStore,
            SupabaseAuthProvider, ToastOptions, TracingNotifier,
        },
    },
    Settings,
};
use chrono::Utc;
use supabase_auth::SupabaseClient;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::{
    cli::{Commands, RecalcArgs},
    config::BodyshopConfig,
    session_store::SessionSnapshot,
};

type Service = SessionService<SupabaseAuthProvider, TracingNotifier>;

pub async fn run(command: Commands) -> Result<()> {
    if let Commands::ConfigPath = command {
        return config_path();
    }

    let settings = BodyshopConfig::load()?.settings()?;
    let snapshot = SessionSnapshot::default_location()?;

    match command {
        Commands::Login { email } => login(&settings, &snapshot, email).await,
        Commands::Logout => logout(&settings, &snapshot).await,
        Commands::Status => status(&settings, &snapshot).await,
        Commands::Watch => watch(&settings, &snapshot).await,
        Commands::Recalc(args) => recalc(&settings, &snapshot, args).await,
        Commands::Diff { invoice_id } => diff(&settings, InvoiceId::new(invoice_id)).await,
        Commands::ConfigPath => config_path(),
    }
}

fn config_path() -> Result<()> {
    let path = BodyshopConfig::config_path()?;
    if !path.exists() {
        BodyshopConfig::default().save()?;
        println!("Created default config at {}", path.display());
    } else {
        println!("{}", path.display());
    }
    Ok(())
}

fn provider(settings: &Settings) -> Result<Arc<SupabaseAuthProvider>> {
    anyhow::ensure!(
        !settings.auth.url.is_empty(),
        "No Supabase URL configured. Set supabase_url in {} or SUPABASE_URL.",
        BodyshopConfig::config_path()?.display()
    );
    let client = SupabaseClient::new(&settings.auth.url, settings.auth.anon_key.clone());
    Ok(Arc::new(SupabaseAuthProvider::new(client)))
}

/// Service seeded with the saved session, if any.
fn restore_service(settings: &Settings, snapshot: &SessionSnapshot) -> Result<Service> {
    let store = match snapshot.load()? {
        Some(session) => SessionStore::with_session(session),
        None => SessionStore::new(),
    };
    Ok(SessionService::with_store(
        provider(settings)?,
        TracingNotifier,
        settings.session.clone(),
        store,
    ))
}

/// Keep the snapshot in line with the store after a refresh.
async fn persist_current(service: &Service, snapshot: &SessionSnapshot) -> Result<()> {
    match service.store().current().await {
        Some(session) => snapshot.save(&session),
        None => snapshot.clear(),
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{label}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line).context("Failed to read input")?;
    Ok(line.trim().to_string())
}

async fn login(settings: &Settings, snapshot: &SessionSnapshot, email: Option<String>) -> Result<()> {
    let provider = provider(settings)?;
    let email = match email {
        Some(email) => email,
        None => prompt("Email: ")?,
    };
    let password = rpassword::prompt_password("Password: ").context("Failed to read password")?;

    let session = provider
        .sign_in(&email, &password)
        .await
        .context("Sign-in failed")?;
    snapshot.save(&session)?;

    info!(user_id = %session.user.id, "signed in");
    println!(
        "Signed in as {}. Session saved to {}.",
        session.user.email.as_deref().unwrap_or(&session.user.id),
        snapshot.path().display()
    );
    Ok(())
}

async fn logout(settings: &Settings, snapshot: &SessionSnapshot) -> Result<()> {
    let service = restore_service(settings, snapshot)?;
    service.sign_out().await;
    snapshot.clear()?;
    println!("Signed out.");
    Ok(())
}

async fn status(settings: &Settings, snapshot: &SessionSnapshot) -> Result<()> {
    let service = restore_service(settings, snapshot)?;

    let outcome = service.probe_connectivity().await;
    println!("Connection: {}", describe_connection(&outcome));

    let policy = service.current_policy().await;
    println!(
        "Refresh policy: check every {}s, refresh {}s before expiry",
        policy.check_interval.as_secs(),
        policy.refresh_margin.as_secs()
    );

    match service.verify().await {
        Ok(Some(session)) => {
            persist_current(&service, snapshot).await?;
            let minutes = (session.expires_at - Utc::now()).num_minutes();
            println!("Session: active, expires at {} (in {minutes} min)", session.expires_at);
        }
        Ok(None) => println!("Session: signed out"),
        Err(SessionError::AuthExpired) => {
            snapshot.clear()?;
            println!("Session: expired. Run `bodyshop login` to sign in again.");
        }
        Err(e) => println!("Session: could not verify ({e})"),
    }

    Ok(())
}

async fn watch(settings: &Settings, snapshot: &SessionSnapshot) -> Result<()> {
    let service = restore_service(settings, snapshot)?;
    if service.store().current().await.is_none() {
        bail!("Not signed in. Run `bodyshop login` first.");
    }

    let mut events = service.subscribe();
    let outcome = service.probe_connectivity().await;
    println!("Connection: {}", describe_connection(&outcome));

    let mut scheduler = RefreshScheduler::new(service.clone());
    scheduler.start();
    println!("Keeping the session fresh. Press Ctrl+C to stop.");

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("Stopping.");
                break;
            }
            event = events.recv() => match event {
                Ok(SessionEvent::Refreshed { expires_at }) => {
                    persist_current(&service, snapshot).await?;
                    println!("Token refreshed, valid until {expires_at}");
                }
                Ok(SessionEvent::Expired) => {
                    snapshot.clear()?;
                    println!("Session expired. Run `bodyshop login` to sign in again.");
                    break;
                }
                Ok(SessionEvent::Halted { consecutive_failures }) => {
                    println!("Refresh stopped after {consecutive_failures} failures. Press Enter to retry.");
                }
                Ok(SessionEvent::QualityChanged(quality)) => println!("Connection quality: {quality}"),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "missed session events"),
                Err(RecvError::Closed) => break,
            },
            line = stdin.next_line(), if stdin_open => match line? {
                Some(_) if service.store().is_halted().await => {
                    let outcome = scheduler.reset().await;
                    println!("Retrying. Connection: {}", describe_connection(&outcome));
                }
                Some(_) => {}
                None => stdin_open = false,
            },
        }
    }

    scheduler.stop();
    Ok(())
}

async fn open_invoice(settings: &Settings, id: &InvoiceId) -> Result<(JsonFileInvoiceRepository, InvoiceEditSession)> {
    let repo = JsonFileInvoiceRepository::new(&settings.invoice.data_dir);
    let edit = InvoiceEditSession::open(&repo, id, &settings.invoice.load_retry(), settings.invoice.tolerance)
        .await
        .with_context(|| format!("Failed to open invoice {id}"))?;
    Ok((repo, edit))
}

async fn recalc(settings: &Settings, snapshot: &SessionSnapshot, args: RecalcArgs) -> Result<()> {
    let id = InvoiceId::new(args.invoice_id);
    let (repo, mut edit) = open_invoice(settings, &id).await?;
    print_totals("Saved", &edit.totals());

    if args.apply_report {
        if edit.source_report().is_none() {
            bail!("Invoice {id} has no source report");
        }
        edit.apply_source_values();
    }
    if let Some(rate) = args.tax_rate {
        edit.set_tax_rate(rate);
    }
    if args.acknowledge {
        edit.acknowledge_totals_discrepancy();
    }

    println!("Totals are {}", describe_state(edit.guard_state()));
    print_totals("Displayed", &edit.totals());
    print_discrepancies(&edit.discrepancies());

    if !args.save {
        return Ok(());
    }

    match edit.prepare_save() {
        Ok(_) => {}
        Err(InvoiceError::TotalsDiscrepancy { computed, persisted }) => {
            bail!("Computed total {computed} differs from saved total {persisted}. Re-run with --acknowledge to overwrite.")
        }
        Err(e) => return Err(e).context("Invoice cannot be saved"),
    }

    let service = restore_service(settings, snapshot)?;
    let toasts = ToastOptions::default()
        .with_loading(format!("Saving invoice {id}"))
        .with_success("Invoice saved")
        .with_error("Could not save invoice");

    let repo = &repo;
    let edit = &mut edit;
    let written = service
        .execute_with_valid_session(&toasts, move |_session| edit.save(repo))
        .await?;
    persist_current(&service, snapshot).await?;

    print_totals("Written", &written);
    Ok(())
}

async fn diff(settings: &Settings, id: InvoiceId) -> Result<()> {
    let (_, edit) = open_invoice(settings, &id).await?;
    let Some(report) = edit.source_report() else {
        bail!("Invoice {id} has no source report");
    };

    let found = edit.discrepancies();
    if found.is_empty() {
        println!("Invoice {id} matches report {}", report.id);
    } else {
        println!("Invoice {id} differs from report {}:", report.id);
        print_discrepancies(&found);
    }
    Ok(())
}

fn describe_connection(outcome: &ProbeOutcome) -> String {
    match (outcome.degraded, outcome.latency) {
        (true, _) => format!("{} (unreachable, operations at risk)", outcome.quality),
        (false, Some(latency)) => format!("{} ({} ms)", outcome.quality, latency.as_millis()),
        (false, None) => outcome.quality.to_string(),
    }
}

fn describe_state(state: GuardState) -> &'static str {
    match state {
        GuardState::Loaded { .. } => "pinned to the saved values",
        GuardState::Dirty { .. } => "out of date until every line is complete",
        GuardState::Recalculated { .. } => "recalculated from the lines",
    }
}

fn print_totals(label: &str, totals: &Totals) {
    println!(
        "{label:>9}: subtotal {}  tax {}  total {}",
        totals.subtotal, totals.tax_amount, totals.total
    );
}

fn print_discrepancies(found: &[Discrepancy]) {
    for discrepancy in found {
        println!("  - {discrepancy}");
    }
}
