use std::sync::Arc;

use axum::{Json, Router, routing::get};
use clap::{Parser, Subcommand, ValueEnum};
use launchpad_auth::{
    AuthContext, AuthError, BearerGateway, BearerLayer, CredentialProvider, DeviceFlowClient,
    DeviceFlowFailure, GitHubProvider, GoogleProvider, OAuthClient, OAuthClientConfig,
    OAuthProvider, ProviderValidator, TokenValidator,
};
use serde::Serialize;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(
    name = "launchpad-auth",
    about = "Sign in with the OAuth device flow and guard HTTP routes with bearer tokens."
)]
struct Cli {
    /// Authorization server. Credentials are read from <PROVIDER>_CLIENT_ID,
    /// <PROVIDER>_CLIENT_SECRET and <PROVIDER>_SCOPES.
    #[arg(long, value_enum, default_value_t = ProviderKind::Google, global = true)]
    provider: ProviderKind,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProviderKind {
    Google,
    Github,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the device flow and print the tokens as JSON.
    Login {
        #[arg(long)]
        no_browser: bool,
    },
    /// Exchange a refresh token for a new access token.
    Refresh {
        #[arg(long)]
        refresh_token: String,
    },
    /// Check an access token and print the identity behind it.
    Validate {
        #[arg(long)]
        token: String,
    },
    /// Serve GET /whoami behind the bearer gateway.
    Serve {
        #[arg(long, default_value = "127.0.0.1:8080")]
        listen: String,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Flow(#[from] DeviceFlowFailure),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.provider {
        ProviderKind::Google => run(GoogleProvider::new(), "GOOGLE", cli.command).await,
        ProviderKind::Github => run(GitHubProvider::new(), "GITHUB", cli.command).await,
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        "launchpad_auth=debug"
    } else {
        "launchpad_auth=info"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run<P>(provider: P, prefix: &str, command: Command) -> Result<(), CliError>
where
    P: OAuthProvider + 'static,
{
    let config = OAuthClientConfig::from_env(prefix)?;
    let client = OAuthClient::new(provider, config)?;

    match command {
        Command::Login { no_browser } => login(client, !no_browser).await,
        Command::Refresh { refresh_token } => {
            let tokens = client.refresh_token(&refresh_token).await?;
            print_json(&tokens)
        }
        Command::Validate { token } => {
            let context = ProviderValidator::new(Arc::new(client))
                .validate(&token)
                .await?;
            print_json(&context)
        }
        Command::Serve { listen } => serve(client, &listen).await,
    }
}

async fn login<P: OAuthProvider>(
    client: OAuthClient<P>,
    open_browser: bool,
) -> Result<(), CliError> {
    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let flow = DeviceFlowClient::new(client);
    let result = flow
        .run(&cancel, |session| {
            eprintln!(
                "Open {} and enter the code {}",
                session.verification_uri, session.user_code
            );
            if open_browser {
                let target = session
                    .verification_uri_complete
                    .as_deref()
                    .unwrap_or(&session.verification_uri);
                if let Err(err) = webbrowser::open(target) {
                    eprintln!("Failed to open browser automatically: {err}");
                }
            }
        })
        .await;
    ctrl_c.abort();

    print_json(&result?.tokens)
}

async fn serve<P>(client: OAuthClient<P>, listen: &str) -> Result<(), CliError>
where
    P: OAuthProvider + 'static,
{
    let gateway = BearerGateway::new(ProviderValidator::new(Arc::new(client)));
    let app = Router::new()
        .route("/whoami", get(whoami))
        .layer(BearerLayer::new(gateway));

    let listener = TcpListener::bind(listen).await?;
    info!(address = %listener.local_addr()?, "serving /whoami");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;
    Ok(())
}

async fn whoami(context: AuthContext) -> Json<AuthContext> {
    Json(context)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
