//! Gatehouse command-line front end.
//!
//! Drives the binding layer against the in-memory backend: seed starter
//! data, show the gate roster or any stored document, check a visitor in,
//! manage accounts and personnel, or print the effective configuration.
//!
//! Usage:
//!   GATEHOUSE_API_KEY=dev gatehouse roster --seed
//!   GATEHOUSE_API_KEY=dev gatehouse show personnel/p1 --seed
//!   GATEHOUSE_API_KEY=dev gatehouse check-in --name "Jo Park" --host p2 --seed
//!   GATEHOUSE_API_KEY=dev gatehouse register --email guard@camp.example --password hunter22
//!   GATEHOUSE_API_KEY=dev gatehouse add-personnel --email guard@camp.example --password hunter22 \
//!       --name "Asha Rai" --rank Captain --force-id F4242 --department Command --block "Admin Building" --room "Office 2"
//!   gatehouse --config ./gatehouse.toml config
//!
//! Without an API key every command runs against stub handles: reads are
//! empty and writes go nowhere. The in-memory backend starts empty on every
//! run, so account commands create the account they sign in with.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use gatehouse_client::constants::{PERSONNEL_COLLECTION, USERS_COLLECTION, VISITORS_COLLECTION};
use gatehouse_client::{
    ClientHandles, ClientRegistry, CollectionSubscription, DocumentKey, MemoryConnector, Reference,
    SeedOutcome, SessionOptions, SetMode, Stabilizer, StoreConfig, SubscriptionState,
    initiate_email_sign_up, require_account,
};
use gatehouse_types::{
    Personnel, PersonnelStatus, Principal, Record, Roster, UserProfile, Visitor, VisitorStatus,
};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

/// How long a command waits to observe the effect of its own write.
const CONFIRM_WAIT: Duration = Duration::from_secs(5);

#[derive(clap::Args, Debug)]
struct Account {
    #[arg(long)]
    email: String,
    #[arg(long)]
    password: String,
}

fn parse_status(s: &str) -> Result<PersonnelStatus, String> {
    serde_json::from_value(json!(s)).map_err(|_| format!("unknown status '{s}'"))
}

#[derive(Parser, Debug)]
#[command(name = "gatehouse")]
#[command(about = "Visitor and personnel gate management")]
struct Args {
    /// Config file (defaults to ~/.config/gatehouse/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Seed personnel and visitors with starter data where empty
    Seed,
    /// Show visitors on site and who they are visiting
    Roster {
        /// Seed starter data first
        #[arg(long)]
        seed: bool,
    },
    /// Register a visitor at the gate
    CheckIn {
        #[arg(long)]
        name: String,
        /// Id of the personnel record being visited
        #[arg(long)]
        host: String,
        /// Check-in time (HH:MM); defaults to now (UTC)
        #[arg(long)]
        time: Option<String>,
        #[arg(long)]
        photo_id: Option<String>,
        /// Seed starter data first
        #[arg(long)]
        seed: bool,
    },
    /// Print a stored document, or every document in a collection, as JSON
    Show {
        /// Collection (`visitors`) or document (`visitors/v1`) path
        path: String,
        /// Seed starter data first
        #[arg(long)]
        seed: bool,
    },
    /// Create an account and its user profile
    Register {
        #[command(flatten)]
        account: Account,
        #[arg(long, default_value = "")]
        first_name: String,
        #[arg(long, default_value = "")]
        last_name: String,
    },
    /// Change the first and last name on an account's profile
    Profile {
        #[command(flatten)]
        account: Account,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
    },
    /// Add a personnel record; requires a signed-in account
    AddPersonnel {
        /// Sign up with these credentials first; without them the session
        /// is signed out and the record is refused
        #[arg(long, requires = "password")]
        email: Option<String>,
        #[arg(long, requires = "email")]
        password: Option<String>,
        #[arg(long)]
        name: String,
        #[arg(long)]
        rank: String,
        #[arg(long)]
        force_id: String,
        #[arg(long)]
        department: String,
        #[arg(long, default_value = "Military Camp Alpha")]
        facility: String,
        #[arg(long)]
        block: String,
        #[arg(long)]
        room: String,
        /// Active, "On Leave", or Transferred
        #[arg(long, default_value = "Active", value_parser = parse_status)]
        status: PersonnelStatus,
    },
    /// Print the effective configuration (credential redacted)
    Config,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries command output
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = StoreConfig::resolve(args.config.as_deref()).context("failed to load config")?;

    if let Command::Config = args.command {
        return print_config(&config);
    }

    let registry = ClientRegistry::new(MemoryConnector::new());
    registry
        .errors()
        .subscribe(|e| {
            warn!(kind = %e.kind, operation = %e.operation, path = %e.path, "{}", e.message);
        })
        .detach();

    let handles = registry.acquire(&config);
    if handles.is_stub() {
        warn!("Running against stub handles; nothing will be stored");
    }

    match args.command {
        Command::Seed => seed(&handles).await,
        Command::Roster { seed: with_seed } => {
            if with_seed {
                seed(&handles).await?;
            }
            roster(&handles).await
        }
        Command::CheckIn {
            name,
            host,
            time,
            photo_id,
            seed: with_seed,
        } => {
            if with_seed {
                seed(&handles).await?;
            }
            let visitor = Visitor {
                id: String::new(),
                name,
                photo_id,
                visiting_personnel_id: host,
                time_in: time.unwrap_or_else(now_hh_mm),
                status: VisitorStatus::OnSite,
            };
            check_in(&handles, visitor).await?;
            roster(&handles).await
        }
        Command::Show { path, seed: with_seed } => {
            if with_seed {
                seed(&handles).await?;
            }
            show(&handles, &path).await
        }
        Command::Register {
            account,
            first_name,
            last_name,
        } => register(&handles, &account, first_name, last_name).await,
        Command::Profile {
            account,
            first_name,
            last_name,
        } => profile(&handles, &account, &first_name, &last_name).await,
        Command::AddPersonnel {
            email,
            password,
            name,
            rank,
            force_id,
            department,
            facility,
            block,
            room,
            status,
        } => {
            if let (Some(email), Some(password)) = (email, password) {
                sign_up(&handles, &Account { email, password }).await?;
            }
            let record = Personnel {
                id: String::new(),
                name,
                rank,
                force_id,
                department,
                facility,
                block,
                room,
                status,
                user_id: None,
            };
            add_personnel(&handles, record).await
        }
        Command::Config => Ok(()),
    }
}

fn print_config(config: &StoreConfig) -> Result<()> {
    let mut shown = config.clone();
    if shown.has_credentials() {
        shown.api_key = Some("<redacted>".into());
    }
    print!("{}", toml::to_string_pretty(&shown).context("failed to render config")?);
    Ok(())
}

async fn seed(handles: &ClientHandles) -> Result<()> {
    let report = gatehouse_client::seed(handles.store().as_ref()).await.context("seeding failed")?;
    for (collection, outcome) in [(PERSONNEL_COLLECTION, report.personnel), (VISITORS_COLLECTION, report.visitors)] {
        match outcome {
            SeedOutcome::Seeded(n) => println!("{collection}: seeded {n} documents"),
            SeedOutcome::Skipped => println!("{collection}: already populated, skipped"),
        }
    }
    Ok(())
}

/// Current state of a subscription, or the read error it reported.
fn loaded<T: Clone>(what: &str, state: SubscriptionState<Vec<T>>) -> Result<Vec<T>> {
    if let Some(error) = state.error {
        bail!("reading {what} failed: {error}");
    }
    Ok(state.data.unwrap_or_default())
}

async fn roster(handles: &ClientHandles) -> Result<()> {
    let personnel = handles.collection::<Personnel>(Some(Arc::new(Reference::collection(PERSONNEL_COLLECTION)?)));
    let visitors = handles.collection::<Visitor>(Some(Arc::new(Reference::collection(VISITORS_COLLECTION)?)));

    // Wait for the first snapshot of each
    let mut p_updates = Box::pin(personnel.updates());
    let mut v_updates = Box::pin(visitors.updates());
    let p_state = next_settled(&mut p_updates).await;
    let v_state = next_settled(&mut v_updates).await;

    let roster = Roster::build(&loaded("personnel", p_state)?, &loaded("visitors", v_state)?);
    print_roster(&roster);
    Ok(())
}

async fn next_settled<S, T>(updates: &mut S) -> SubscriptionState<T>
where
    S: futures::Stream<Item = SubscriptionState<T>> + Unpin,
{
    while let Some(state) = updates.next().await {
        if !state.is_loading {
            return state;
        }
    }
    SubscriptionState::idle()
}

fn print_roster(roster: &Roster) {
    println!("{:<20} {:<28} {:<6} {}", "VISITOR", "VISITING", "IN", "STATUS");
    for entry in &roster.entries {
        let host = entry.host.as_ref().map_or_else(
            || format!("? ({})", entry.visitor.visiting_personnel_id),
            |p| format!("{} {}, {}", p.rank, p.name, p.room),
        );
        println!(
            "{:<20} {:<28} {:<6} {}",
            entry.visitor.name,
            host,
            entry.visitor.time_in,
            entry.visitor.status.as_str()
        );
    }
    println!();
    println!(
        "{} on site, {} overstaying, {} active personnel",
        roster.on_site, roster.overstaying, roster.active_personnel
    );
    let orphans = roster.orphans().count();
    if orphans > 0 {
        println!("{orphans} visitor(s) reference unknown personnel");
    }
}

async fn check_in(handles: &ClientHandles, visitor: Visitor) -> Result<()> {
    let visitors_ref = Arc::new(Reference::collection(VISITORS_COLLECTION)?);
    let visitors = handles.collection::<Visitor>(Some(visitors_ref.clone()));

    let Some(target) = handles.gateway().create(&visitors_ref, &visitor, DocumentKey::Auto) else {
        bail!("check-in for {} was rejected", visitor.name);
    };
    let Some(id) = target.id().map(String::from) else {
        bail!("created reference {target} has no document id");
    };
    info!("Checking in {} as {}", visitor.name, id);

    if handles.is_stub() {
        return Ok(());
    }
    confirm_created(&visitors, &id, |v| v.id.as_str()).await?;
    println!("Checked in {} ({id})", visitor.name);
    Ok(())
}

/// Wait until the write that created `id` shows up in `subscription`.
async fn confirm_created<R>(
    subscription: &CollectionSubscription<R>,
    id: &str,
    id_of: fn(&R) -> &str,
) -> Result<()>
where
    R: gatehouse_types::FromDocument + Clone + Send + Sync + 'static,
{
    let mut rx = subscription.watch();
    let seen = tokio::time::timeout(
        CONFIRM_WAIT,
        rx.wait_for(|s| s.error.is_some() || s.data.iter().flatten().any(|r| id_of(r) == id)),
    )
    .await;
    match seen {
        Ok(Ok(state)) => match &state.error {
            None => Ok(()),
            Some(error) => bail!("subscription failed: {error}"),
        },
        Ok(Err(_)) => bail!("subscription closed"),
        Err(_) => bail!("{id} not confirmed within {:?}", CONFIRM_WAIT),
    }
}

async fn show(handles: &ClientHandles, path: &str) -> Result<()> {
    // Odd segment counts are collections, even ones documents
    if let Ok(collection) = Reference::collection(path) {
        let records = handles.collection::<Record>(Some(Arc::new(collection)));
        let state = next_settled(&mut Box::pin(records.updates())).await;
        for record in loaded(path, state)? {
            println!("{}", serde_json::to_string(&record)?);
        }
        return Ok(());
    }

    let document = Reference::document(path).with_context(|| format!("'{path}' is not a store path"))?;
    let record = handles.document::<Record>(Some(Arc::new(document)));
    let state = next_settled(&mut Box::pin(record.updates())).await;
    if let Some(error) = state.error {
        bail!("reading {path} failed: {error}");
    }
    match state.data.flatten() {
        Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
        None => bail!("no document at {path}"),
    }
    Ok(())
}

/// Create the account and wait until the session reports it.
async fn sign_up(handles: &ClientHandles, account: &Account) -> Result<Principal> {
    if handles.is_stub() {
        bail!("accounts need a configured backend (set GATEHOUSE_API_KEY)");
    }

    let mut session = handles.session(SessionOptions::default());
    initiate_email_sign_up(handles.auth(), &account.email, &account.password);
    // Sign-up failures are only logged; silence here means it was rejected
    let user = match tokio::time::timeout(CONFIRM_WAIT, session.wait_for(|s| s.is_authenticated())).await {
        Ok(Ok(state)) => state.user.clone(),
        Ok(Err(_)) => bail!("session listener closed"),
        Err(_) => bail!("sign-up for {} was not accepted (see log)", account.email),
    };
    user.context("no session after sign-up")
}

/// `users/{uid}` for the signed-in principal.
fn profile_reference(user: &Principal) -> Result<Arc<Reference>> {
    let mut profile_ref = Stabilizer::new();
    profile_ref
        .stabilize(Some(user.uid), |uid| {
            uid.as_ref()
                .and_then(|uid| Reference::document(&format!("{USERS_COLLECTION}/{}", uid.to_hex())).ok())
        })
        .with_context(|| format!("could not build a profile reference for {user}"))
}

/// Wait for the profile at `reference` to exist, then return it.
async fn confirm_profile(handles: &ClientHandles, reference: Arc<Reference>) -> Result<UserProfile> {
    let stored = handles.document::<UserProfile>(Some(reference.clone()));
    let mut rx = stored.watch();
    let seen = tokio::time::timeout(
        CONFIRM_WAIT,
        rx.wait_for(|s| s.error.is_some() || matches!(s.data, Some(Some(_)))),
    )
    .await;
    match seen {
        Ok(Ok(state)) => match (&state.data, &state.error) {
            (Some(Some(p)), _) => Ok(p.clone()),
            (_, error) => bail!("profile read failed: {:?}", error),
        },
        Ok(Err(_)) => bail!("profile subscription closed"),
        Err(_) => bail!("profile {reference} not confirmed within {:?}", CONFIRM_WAIT),
    }
}

async fn register(
    handles: &ClientHandles,
    account: &Account,
    first_name: String,
    last_name: String,
) -> Result<()> {
    let user = sign_up(handles, account).await?;
    let reference = profile_reference(&user)?;
    let profile = UserProfile {
        id: user.uid.to_hex(),
        email: user.email.clone(),
        username: user.username().map(String::from),
        first_name,
        last_name,
        role_id: "gate-guard".into(),
        is_active: true,
    };
    handles.gateway().set(&reference, &profile, SetMode::Overwrite);

    let stored = confirm_profile(handles, reference).await?;
    println!("Registered {} as {}", stored.display_name(), user);
    Ok(())
}

async fn profile(
    handles: &ClientHandles,
    account: &Account,
    first_name: &str,
    last_name: &str,
) -> Result<()> {
    let user = sign_up(handles, account).await?;
    let reference = profile_reference(&user)?;
    handles.gateway().set(
        &reference,
        &json!({ "firstName": first_name, "lastName": last_name }),
        SetMode::Merge,
    );

    // The merge lands asynchronously; watch for the new name rather than any profile
    let stored = handles.document::<UserProfile>(Some(reference.clone()));
    let mut rx = stored.watch();
    let seen = tokio::time::timeout(
        CONFIRM_WAIT,
        rx.wait_for(|s| {
            s.error.is_some()
                || s.data.iter().flatten().any(|p| p.first_name == first_name && p.last_name == last_name)
        }),
    )
    .await;
    match seen {
        Ok(Ok(state)) => match (&state.data, &state.error) {
            (Some(Some(p)), None) => {
                println!("Profile for {} now reads {}", user, p.display_name());
                Ok(())
            }
            (_, error) => bail!("profile update failed: {:?}", error),
        },
        Ok(Err(_)) => bail!("profile subscription closed"),
        Err(_) => bail!("profile update for {user} not confirmed within {:?}", CONFIRM_WAIT),
    }
}

async fn add_personnel(handles: &ClientHandles, mut record: Personnel) -> Result<()> {
    let mut session = handles.session(SessionOptions::default());
    let user = require_account(&mut session)
        .await
        .with_context(|| format!("cannot add {}", record.name))?;
    record.user_id = Some(user.uid.to_hex());

    let personnel_ref = Arc::new(Reference::collection(PERSONNEL_COLLECTION)?);
    let personnel = handles.collection::<Personnel>(Some(personnel_ref.clone()));
    let Some(target) = handles.gateway().create(&personnel_ref, &record, DocumentKey::Auto) else {
        bail!("adding {} was rejected", record.name);
    };
    let Some(id) = target.id().map(String::from) else {
        bail!("created reference {target} has no document id");
    };

    confirm_created(&personnel, &id, |p| p.id.as_str()).await?;
    println!("Added {} {} ({}) as {id} for {user}", record.rank, record.name, record.status.as_str());
    Ok(())
}

fn now_hh_mm() -> String {
    let secs = gatehouse_types::now_millis() / 1000;
    format!("{:02}:{:02}", (secs / 3600) % 24, (secs / 60) % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    const ADD: [&str; 14] = [
        "gatehouse", "add-personnel", "--name", "Asha Rai", "--rank", "Captain", "--force-id", "F4242",
        "--department", "Command", "--block", "Admin Building", "--room", "Office 2",
    ];

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_status_accepts_wire_names() {
        assert_eq!(parse_status("On Leave"), Ok(PersonnelStatus::OnLeave));
        assert_eq!(parse_status("Transferred"), Ok(PersonnelStatus::Transferred));
        assert!(parse_status("Retired").is_err());
    }

    #[test]
    fn test_add_personnel_credentials_come_in_pairs() {
        let args = Args::try_parse_from(ADD).unwrap();
        match args.command {
            Command::AddPersonnel { facility, status, email, .. } => {
                assert_eq!(facility, "Military Camp Alpha");
                assert_eq!(status, PersonnelStatus::Active);
                assert_eq!(email, None);
            }
            other => panic!("unexpected command {other:?}"),
        }

        let email_only: Vec<&str> = ADD.iter().copied().chain(["--email", "guard@camp.example"]).collect();
        assert!(Args::try_parse_from(email_only).is_err());
    }
}
