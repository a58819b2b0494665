mod api;
mod auth;
mod config;
mod dates;
mod oauth;
mod output;
mod pagination;
mod resources;

use std::error::Error;

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::api::ChatClient;
use crate::auth::{AuthError, AuthStore, StoredToken, env_token};
use crate::config::Config;
use crate::dates::format_time;
use crate::oauth::OAuthClient;
use crate::output::Formatter;
use crate::resources::attachments::AttachmentsCommand;
use crate::resources::emoji::EmojiCommand;
use crate::resources::events::EventsCommand;
use crate::resources::media::MediaCommand;
use crate::resources::members::MembersCommand;
use crate::resources::messages::MessagesCommand;
use crate::resources::notifications::NotificationsCommand;
use crate::resources::reactions::ReactionsCommand;
use crate::resources::readstate::ReadStateCommand;
use crate::resources::spaces::SpacesCommand;
use crate::resources::{CommandError, Context};

#[derive(Parser)]
#[command(
    name = "gchat",
    version,
    about = "Command-line client for the Google Chat REST API",
    after_help = "Examples:\n  gchat auth login\n  gchat spaces list\n  gchat spaces list --all --json\n  gchat messages list AAAA --page-size 10\n  gchat messages send AAAA --text \"hello\"\n  gchat members list spaces/AAAA\n  gchat media download spaces/AAAA/messages/BBBB/attachments/CCCC -o report.pdf"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(long, global = true, help = "Output raw JSON instead of tables")]
    json: bool,

    #[arg(short, long, global = true, help = "Suppress informational messages")]
    quiet: bool,

    #[arg(short, long, global = true, help = "Log HTTP requests and responses to stderr")]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Manage OAuth2 credentials")]
    Auth {
        #[command(subcommand)]
        command: AuthCommand,
    },
    #[command(about = "Manage spaces")]
    Spaces {
        #[command(subcommand)]
        command: SpacesCommand,
    },
    #[command(about = "Read, send, and edit messages")]
    Messages {
        #[command(subcommand)]
        command: MessagesCommand,
    },
    #[command(about = "Manage space memberships")]
    Members {
        #[command(subcommand)]
        command: MembersCommand,
    },
    #[command(about = "Manage message reactions")]
    Reactions {
        #[command(subcommand)]
        command: ReactionsCommand,
    },
    #[command(about = "Manage custom emojis")]
    Emoji {
        #[command(subcommand)]
        command: EmojiCommand,
    },
    #[command(about = "Inspect message attachments")]
    Attachments {
        #[command(subcommand)]
        command: AttachmentsCommand,
    },
    #[command(about = "Upload and download media")]
    Media {
        #[command(subcommand)]
        command: MediaCommand,
    },
    #[command(name = "readstate", about = "Read and update read state")]
    ReadState {
        #[command(subcommand)]
        command: ReadStateCommand,
    },
    #[command(about = "List and inspect space events")]
    Events {
        #[command(subcommand)]
        command: EventsCommand,
    },
    #[command(about = "Read and update notification settings")]
    Notifications {
        #[command(subcommand)]
        command: NotificationsCommand,
    },
}

#[derive(Subcommand)]
enum AuthCommand {
    #[command(about = "Log in with the OAuth2 browser flow")]
    Login(AuthLoginArgs),
    #[command(about = "Remove the saved token")]
    Logout,
    #[command(about = "Show where credentials come from")]
    Status,
}

#[derive(Args)]
struct AuthLoginArgs {
    #[arg(long, help = "OAuth2 client id (overrides GCHAT_CLIENT_ID and config.json)")]
    client_id: Option<String>,

    #[arg(long, help = "OAuth2 client secret (overrides GCHAT_CLIENT_SECRET and config.json)")]
    client_secret: Option<String>,

    #[arg(long, help = "Print the authorization URL without opening a browser")]
    no_browser: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let formatter = Formatter::new(cli.json, cli.quiet);

    if let Err(error) = run(cli, formatter).await {
        report_error(&formatter, error.as_ref());
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("gchat=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn report_error(formatter: &Formatter, error: &(dyn Error + 'static)) {
    formatter.error(&error.to_string());
    let Some(command_error) = error.downcast_ref::<CommandError>() else {
        return;
    };
    if command_error.is_transport() {
        eprintln!("  Check your network connection and GCHAT_API_BASE_URL.");
        return;
    }
    let Some(api) = command_error.api_error() else {
        return;
    };
    if let Some(reason) = api.reason() {
        eprintln!("  Reason: {reason}");
    }
    for link in api.help_links() {
        eprintln!("  Help: {} ({})", link.description, link.url);
    }
}

async fn run(cli: Cli, formatter: Formatter) -> Result<(), Box<dyn Error>> {
    let config = Config::load()?;
    let store = AuthStore::new(config.token_path.clone());
    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let command = match cli.command {
        Command::Auth { command } => {
            return handle_auth(command, &config, &store, &formatter, &cancel).await;
        }
        command => command,
    };

    let token = resolve_token(&config, &store).await?;
    let client = ChatClient::new(config.api_base_url.clone())
        .with_upload_base_url(config.upload_base_url.clone())
        .with_token(token)
        .with_cancellation(cancel);
    let ctx = Context { client, formatter };

    match command {
        Command::Auth { .. } => Ok(()),
        Command::Spaces { command } => resources::spaces::run(command, &ctx).await,
        Command::Messages { command } => resources::messages::run(command, &ctx).await,
        Command::Members { command } => resources::members::run(command, &ctx).await,
        Command::Reactions { command } => resources::reactions::run(command, &ctx).await,
        Command::Emoji { command } => resources::emoji::run(command, &ctx).await,
        Command::Attachments { command } => resources::attachments::run(command, &ctx).await,
        Command::Media { command } => resources::media::run(command, &ctx).await,
        Command::ReadState { command } => resources::readstate::run(command, &ctx).await,
        Command::Events { command } => resources::events::run(command, &ctx).await,
        Command::Notifications { command } => {
            resources::notifications::run(command, &ctx).await
        }
    }?;
    Ok(())
}

fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("interrupt received, cancelling");
            cancel.cancel();
        }
    });
}

/// Picks the bearer token: `GCHAT_TOKEN` first, then the saved token,
/// refreshed and re-saved when it is about to expire.
async fn resolve_token(config: &Config, store: &AuthStore) -> Result<String, AuthError> {
    if let Some(token) = env_token() {
        debug!("using token from {}", auth::TOKEN_ENV);
        return Ok(token);
    }

    let token = store.load()?.ok_or(AuthError::NotLoggedIn)?;
    if !token.is_expired_at(Utc::now()) {
        return Ok(token.access_token);
    }
    if !token.can_refresh() {
        return Err(AuthError::NotLoggedIn);
    }

    debug!("access token expired, refreshing");
    let oauth = oauth_client(config, None, None)?;
    let refreshed = oauth.refresh(&token).await?;
    store.store(&refreshed)?;
    Ok(refreshed.access_token)
}

fn oauth_client(
    config: &Config,
    client_id: Option<String>,
    client_secret: Option<String>,
) -> Result<OAuthClient, AuthError> {
    let client_id = client_id
        .or_else(|| config.client_id.clone())
        .unwrap_or_default();
    let client_secret = client_secret
        .or_else(|| config.client_secret.clone())
        .unwrap_or_default();
    OAuthClient::new(client_id, client_secret)
}

async fn handle_auth(
    command: AuthCommand,
    config: &Config,
    store: &AuthStore,
    formatter: &Formatter,
    cancel: &CancellationToken,
) -> Result<(), Box<dyn Error>> {
    match command {
        AuthCommand::Login(args) => {
            let oauth = oauth_client(config, args.client_id, args.client_secret)?;
            let token = oauth::login(&oauth, formatter, cancel, !args.no_browser).await?;
            store.store(&token)?;
            formatter.success(&format!(
                "Authentication successful! Token saved to {}",
                store.path().display()
            ));
        }
        AuthCommand::Logout => {
            if store.clear()? {
                formatter.success("Logged out.");
            } else {
                formatter.message("No saved token found.");
            }
        }
        AuthCommand::Status => print_status(store.load()?, store, formatter)?,
    }
    Ok(())
}

fn print_status(
    saved: Option<StoredToken>,
    store: &AuthStore,
    formatter: &Formatter,
) -> Result<(), Box<dyn Error>> {
    let from_env = env_token().is_some();
    if formatter.is_json() {
        formatter.print_json(&serde_json::json!({
            "envToken": from_env,
            "tokenFile": store.path().display().to_string(),
            "loggedIn": saved.is_some(),
            "expiry": saved.as_ref().and_then(|token| token.expiry),
            "refreshable": saved.as_ref().is_some_and(StoredToken::can_refresh),
        }))?;
        return Ok(());
    }

    let source = if from_env {
        auth::TOKEN_ENV.to_string()
    } else if saved.is_some() {
        "token file".to_string()
    } else {
        "none".to_string()
    };
    let mut fields = vec![
        ("Token Source", source),
        ("Token File", store.path().display().to_string()),
    ];
    if let Some(token) = &saved {
        let expiry = token
            .expiry
            .map(|expiry| format_time(&expiry.to_rfc3339()))
            .unwrap_or_default();
        fields.push(("Expires", expiry));
        fields.push(("Refreshable", token.can_refresh().to_string()));
    }
    formatter.print_details(&fields)?;
    if !from_env && saved.is_none() {
        formatter.message("Not logged in. Run `gchat auth login` to authenticate.");
    }
    Ok(())
}
