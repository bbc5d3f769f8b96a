use clap::{Parser, Subcommand};
use sessionlink::app::App;
use sessionlink::config::{ClientConfig, ConfigError};
use sessionlink::identity::{HttpIdentityClient, IdentityBackend, IdentityError};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
}

#[derive(Parser, Debug)]
#[command(name = "sessionlink", about = "Session-bound realtime client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stay connected as the signed-in user until Ctrl-C.
    Connect,
    /// Sign in with email and password and persist the session.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "SESSIONLINK_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Revoke and forget the persisted session.
    Logout,
    /// Print the resolved endpoint and the current session.
    Status,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = ClientConfig::from_env()?;

    match cli.command {
        Command::Connect => run_connect(&config).await,
        Command::Login { email, password } => run_login(&config, &email, &password).await,
        Command::Logout => run_logout(&config).await,
        Command::Status => run_status(&config).await,
    }
}

async fn run_connect(config: &ClientConfig) -> Result<(), CliError> {
    let app = App::from_config(config)?;
    tracing::info!(endpoint = %app.connections().endpoint(), "sessionlink starting");
    app.run(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "ctrl-c handler failed; shutting down");
        }
    })
    .await;
    Ok(())
}

async fn run_login(config: &ClientConfig, email: &str, password: &str) -> Result<(), CliError> {
    let client = HttpIdentityClient::new(&config.identity)?;
    let session = client.sign_in_with_password(email, password).await?;
    println!("signed in as {}", session.user.email.as_deref().unwrap_or(&session.user.id));
    Ok(())
}

async fn run_logout(config: &ClientConfig) -> Result<(), CliError> {
    let client = HttpIdentityClient::new(&config.identity)?;
    client.sign_out().await?;
    println!("signed out");
    Ok(())
}

async fn run_status(config: &ClientConfig) -> Result<(), CliError> {
    let client = HttpIdentityClient::new(&config.identity)?;
    println!("endpoint: {}", config.socket_endpoint());
    println!("identity: {}", config.identity.url);

    match client.get_session().await? {
        Some(session) => {
            println!("session: signed in as {}", session.user.id);
            if let Some(email) = &session.user.email {
                println!("email: {email}");
            }
        }
        None => println!("session: signed out"),
    }
    Ok(())
}
