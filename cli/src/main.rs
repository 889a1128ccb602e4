use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use serde_json::{Value, json};
use staffid::api::recovery_token;
use staffid::card::{AdminCard, BusinessCard, IdCard, card_file_name};
use staffid::error::{ConfigError, ExportError};
use staffid::export::export_staff;
use staffid::types::{Credentials, PhotoUpload, ProfileUpdate, Registration, StaffUpdate};
use staffid::{AuthPhase, AuthState, ClientConfig, ErrorCode, GuardDecision, Role, Route, SessionError, StaffIdClient, guard};
use tracing_subscriber::EnvFilter;

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{0}")]
    Session(#[from] SessionError),
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("unknown route `{0}`")]
    UnknownRoute(String),
    #[error("{route} is not available: {reason}")]
    Denied { route: &'static str, reason: String },
    #[error("cannot read {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("{0}")]
    Export(#[from] ExportError),
}

impl CliError {
    fn code(&self) -> &'static str {
        match self {
            Self::Session(e) => e.error_code(),
            Self::Config(e) => e.error_code(),
            Self::UnknownRoute(_) => "E_UNKNOWN_ROUTE",
            Self::Denied { .. } => "E_DENIED",
            Self::ReadFile { .. } => "E_READ_FILE",
            Self::InvalidJson(_) => "E_INVALID_JSON",
            Self::Export(e) => e.error_code(),
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "staffid", about = "Staff identity client: sign in, profiles, ID cards and the staff directory")]
struct Cli {
    #[arg(long, env = "STAFFID_BASE_URL")]
    base_url: Option<String>,

    #[arg(long, env = "STAFFID_SESSION_FILE")]
    session_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in with email and password.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "STAFFID_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create a staff account and sign in.
    Register {
        #[arg(long)]
        email: String,
        #[arg(long, env = "STAFFID_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        staff_id: String,
        #[arg(long)]
        department: String,
    },
    /// Forget the stored session.
    Logout,
    /// Request a reset email or set a new password from a recovery link.
    Password(PasswordCommand),
    /// Restore the stored session and print it.
    Status,
    /// Show where a dashboard path resolves for the current session.
    Route { path: String },
    Profile(ProfileCommand),
    Card(CardCommand),
    Staff(StaffCommand),
}

#[derive(Args, Debug)]
struct PasswordCommand {
    #[command(subcommand)]
    command: PasswordSubcommand,
}

#[derive(Subcommand, Debug)]
enum PasswordSubcommand {
    /// Email a recovery link.
    Forgot {
        #[arg(long)]
        email: String,
    },
    /// Set a new password using the emailed recovery link.
    Reset {
        /// Full recovery link, `...#access_token=...&type=recovery`.
        #[arg(long, conflicts_with = "token", required_unless_present = "token")]
        link: Option<String>,
        /// Access token already taken from the link.
        #[arg(long)]
        token: Option<String>,
        #[arg(long, env = "STAFFID_NEW_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long, env = "STAFFID_CONFIRM_PASSWORD", hide_env_values = true)]
        confirm: String,
    },
}

fn reset_token(link: Option<&str>, token: Option<&str>) -> Result<String, CliError> {
    match (link, token) {
        (Some(link), _) => Ok(recovery_token(link)?),
        (None, Some(token)) => Ok(token.to_owned()),
        (None, None) => Err(SessionError::InvalidArgument("a recovery link or token is required".to_owned()).into()),
    }
}

#[derive(Args, Debug)]
struct ProfileCommand {
    #[command(subcommand)]
    command: ProfileSubcommand,
}

#[derive(Subcommand, Debug)]
enum ProfileSubcommand {
    Show,
    Update(ProfileFields),
    Photo { file: PathBuf },
}

#[derive(Args, Debug, Default)]
struct ProfileFields {
    #[arg(long)]
    first_name: Option<String>,
    #[arg(long)]
    last_name: Option<String>,
    #[arg(long)]
    phone_number: Option<String>,
    #[arg(long)]
    department: Option<String>,
    #[arg(long)]
    job_title: Option<String>,
    #[arg(long)]
    position: Option<String>,
}

impl From<ProfileFields> for ProfileUpdate {
    fn from(f: ProfileFields) -> Self {
        Self {
            first_name: f.first_name,
            last_name: f.last_name,
            phone_number: f.phone_number,
            department: f.department,
            job_title: f.job_title,
            position: f.position,
        }
    }
}

#[derive(Args, Debug)]
struct CardCommand {
    #[command(subcommand)]
    command: CardSubcommand,
}

#[derive(Subcommand, Debug)]
enum CardSubcommand {
    /// Smart ID card payload and export file name.
    Id,
    /// Business card payload.
    Business,
    /// Admin profile card payload.
    Admin,
}

#[derive(Args, Debug)]
struct StaffCommand {
    #[command(subcommand)]
    command: StaffSubcommand,
}

#[derive(Subcommand, Debug)]
enum StaffSubcommand {
    List,
    Show {
        id: String,
    },
    Update {
        id: String,
        /// Raw JSON object; merged under the typed flags.
        #[arg(long)]
        data: Option<String>,
        #[command(flatten)]
        fields: StaffFields,
    },
    Delete {
        id: String,
    },
    /// Staff and department totals.
    Stats,
    /// Admin dashboard summary.
    Dashboard,
    /// Write the staff directory to a CSV file.
    Export {
        #[arg(default_value = "employees.csv")]
        file: PathBuf,
    },
    Invite {
        #[arg(long)]
        email: String,
        #[arg(long, env = "STAFFID_INVITE_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

#[derive(Args, Debug, Default)]
struct StaffFields {
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    first_name: Option<String>,
    #[arg(long)]
    last_name: Option<String>,
    #[arg(long)]
    department: Option<String>,
    #[arg(long)]
    job_title: Option<String>,
    #[arg(long)]
    position: Option<String>,
    #[arg(long)]
    staff_id: Option<String>,
    #[arg(long)]
    phone_number: Option<String>,
}

fn staff_update(fields: StaffFields, data: Option<&str>) -> Result<StaffUpdate, CliError> {
    let mut update = match data {
        Some(raw) => staff_update_from_json(&serde_json::from_str::<Value>(raw)?),
        None => StaffUpdate::default(),
    };
    let StaffFields { email, first_name, last_name, department, job_title, position, staff_id, phone_number } = fields;
    update.email = email.or(update.email);
    update.first_name = first_name.or(update.first_name);
    update.last_name = last_name.or(update.last_name);
    update.department = department.or(update.department);
    update.job_title = job_title.or(update.job_title);
    update.position = position.or(update.position);
    update.staff_id = staff_id.or(update.staff_id);
    update.phone_number = phone_number.or(update.phone_number);
    Ok(update)
}

fn staff_update_from_json(value: &Value) -> StaffUpdate {
    let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_owned);
    StaffUpdate {
        email: text("email"),
        first_name: text("firstName"),
        last_name: text("lastName"),
        department: text("department"),
        job_title: text("jobTitle"),
        position: text("position"),
        staff_id: text("staffId"),
        phone_number: text("phoneNumber"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error [{}]: {e}", e.code());
            ExitCode::FAILURE
        }
    }
}

fn build_client(cli: &Cli) -> Result<StaffIdClient, CliError> {
    let mut config = ClientConfig::from_env()?;
    if let Some(base_url) = &cli.base_url {
        config = config.with_base_url(base_url)?;
    }
    if let Some(path) = &cli.session_file {
        config = config.with_session_file(path);
    }
    tracing::debug!(base_url = %config.base_url, session_file = %config.session_file.display(), "client configured");
    Ok(StaffIdClient::from_config(&config)?)
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let client = build_client(&cli)?;

    match cli.command {
        Command::Login { email, password } => {
            let role = client.sign_in(&Credentials { email, password }).await?;
            print_json(&json!({ "role": role.as_str(), "home": Route::home(role).path() }))
        }
        Command::Register { email, password, staff_id, department } => {
            let role = client
                .sign_up(&Registration { email, password, staff_id, department })
                .await?;
            print_json(&json!({ "role": role.as_str(), "home": Route::home(role).path() }))
        }
        Command::Logout => {
            client.session().logout().await?;
            print_json(&json!({ "ok": true }))
        }
        Command::Password(password) => run_password(&client, password).await,
        Command::Status => {
            let state = client.session().bootstrap().await;
            print_json(&state_json(&state))
        }
        Command::Route { path } => {
            let route = Route::parse(&path).ok_or(CliError::UnknownRoute(path))?;
            let state = client.session().bootstrap().await;
            print_json(&decision_json(route, guard(route, &state)))
        }
        Command::Profile(profile) => run_profile(&client, profile).await,
        Command::Card(card) => run_card(&client, card).await,
        Command::Staff(staff) => run_staff(&client, staff).await,
    }
}

async fn run_password(client: &StaffIdClient, password: PasswordCommand) -> Result<(), CliError> {
    let message = match password.command {
        PasswordSubcommand::Forgot { email } => client.auth().forgot_password(&email).await?,
        PasswordSubcommand::Reset { link, token, password, confirm } => {
            let token = reset_token(link.as_deref(), token.as_deref())?;
            client.auth().reset_password(&token, &password, &confirm).await?
        }
    };
    print_json(&json!({ "message": message, "next": Route::Login.path() }))
}

async fn run_profile(client: &StaffIdClient, profile: ProfileCommand) -> Result<(), CliError> {
    let state = client.session().bootstrap().await;
    if !state.is_authenticated() {
        return Err(denied(Route::Profile, "sign in first"));
    }

    let profile = match profile.command {
        ProfileSubcommand::Show => client.profile().get().await?,
        ProfileSubcommand::Update(fields) => client.profile().update(&fields.into()).await?,
        ProfileSubcommand::Photo { file } => {
            let bytes = std::fs::read(&file)
                .map_err(|source| CliError::ReadFile { path: file.display().to_string(), source })?;
            let name = file
                .file_name()
                .map_or_else(|| "photo".to_owned(), |n| n.to_string_lossy().into_owned());
            client.profile().upload_photo(PhotoUpload::from_file(name, bytes)).await?
        }
    };
    print_json(&serde_json::to_value(profile)?)
}

async fn run_card(client: &StaffIdClient, card: CardCommand) -> Result<(), CliError> {
    let route = match card.command {
        CardSubcommand::Id => Route::SmartId,
        CardSubcommand::Business => Route::BusinessCard,
        CardSubcommand::Admin => Route::AdminProfile,
    };
    require(client, route).await?;

    let profile = client.profile().get().await?;
    let output = match card.command {
        CardSubcommand::Id => json!({
            "qr": IdCard::from_profile(&profile).qr_payload(),
            "file": card_file_name(profile.staff_id.as_deref()),
        }),
        CardSubcommand::Business => json!({ "qr": BusinessCard::from_profile(&profile).qr_payload() }),
        CardSubcommand::Admin => json!({ "qr": AdminCard::from_profile(&profile).qr_payload() }),
    };
    print_json(&output)
}

async fn run_staff(client: &StaffIdClient, staff: StaffCommand) -> Result<(), CliError> {
    require(client, Route::AdminEmployees).await?;
    let api = client.staff();

    let output = match staff.command {
        StaffSubcommand::List => serde_json::to_value(api.list().await?)?,
        StaffSubcommand::Show { id } => serde_json::to_value(api.get(&id).await?)?,
        StaffSubcommand::Update { id, data, fields } => {
            let update = staff_update(fields, data.as_deref())?;
            serde_json::to_value(api.update(&id, &update).await?)?
        }
        StaffSubcommand::Delete { id } => api.delete(&id).await?,
        StaffSubcommand::Stats => {
            let staff = api.total_staff().await?;
            let departments = api.total_departments().await?;
            json!({ "totalStaff": staff, "totalDepartments": departments })
        }
        StaffSubcommand::Dashboard => api.dashboard().await?,
        StaffSubcommand::Export { file } => {
            let rows = export_staff(&file, &api.list().await?)?;
            json!({ "file": file.display().to_string(), "rows": rows })
        }
        StaffSubcommand::Invite { email, password } => api.invite(&email, &password).await?,
    };
    print_json(&output)
}

/// Bootstrap and refuse locally when the guard would not show `route`.
async fn require(client: &StaffIdClient, route: Route) -> Result<(), CliError> {
    let state = client.session().bootstrap().await;
    match guard(route, &state) {
        GuardDecision::Allow(_) => Ok(()),
        GuardDecision::Loading => Err(denied(route, "session still loading")),
        GuardDecision::RedirectToLogin => Err(denied(route, "sign in first")),
        GuardDecision::RedirectHome(home) => Err(denied(route, &format!("your dashboard is {}", home.path()))),
    }
}

fn denied(route: Route, reason: &str) -> CliError {
    CliError::Denied { route: route.path(), reason: reason.to_owned() }
}

fn phase_label(phase: AuthPhase) -> &'static str {
    match phase {
        AuthPhase::Uninitialized => "uninitialized",
        AuthPhase::Bootstrapping => "bootstrapping",
        AuthPhase::Authenticated(_) => "authenticated",
        AuthPhase::Unauthenticated => "unauthenticated",
    }
}

fn state_json(state: &AuthState) -> Value {
    json!({
        "phase": phase_label(state.phase),
        "authenticated": state.is_authenticated(),
        "role": state.role.map(Role::as_str),
        "home": state.role.map(|r| Route::home(r).path()),
        "lastError": state.last_error.as_ref().map(|e| json!({ "code": e.error_code(), "message": e.to_string() })),
    })
}

fn decision_json(route: Route, decision: GuardDecision) -> Value {
    let outcome = match decision {
        GuardDecision::Loading => "loading",
        GuardDecision::Allow(_) => "allow",
        GuardDecision::RedirectToLogin | GuardDecision::RedirectHome(_) => "redirect",
    };
    json!({
        "requested": route.path(),
        "decision": outcome,
        "target": decision.target().map(Route::path),
    })
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
