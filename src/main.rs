use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use neonchat::{
    api::routes::{create_router, AppState},
    client::{ApiClient, ChatController, ChatState, TracingNotifier, TurnOutcome},
    config::Config,
    services::{llm_gateway::AnthropicGateway, mailer::MailerSendClient},
    storage::{self, identity::SeaOrmIdentityStore, repository::SeaOrmConversationRepository},
};

#[derive(Parser)]
#[command(name = "neonchat", version, about = "Authenticated streaming chat service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve {
        /// Config file (defaults to ~/.neonchat/config)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Interactive terminal chat against a running server
    Chat {
        #[arg(long, env = "NEONCHAT_URL", default_value = "http://localhost:8080")]
        url: String,

        /// Session token from a previous sign-in
        #[arg(long, env = "NEONCHAT_TOKEN")]
        token: Option<String>,

        /// Sign in by email link when no token is given
        #[arg(long)]
        email: Option<String>,
    },
}

fn init_tracing(default_filter: String) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    match Cli::parse().command {
        Command::Serve { config, port } => serve(config, port).await,
        Command::Chat { url, token, email } => chat(url, token, email).await,
    }
}

async fn serve(config_path: Option<PathBuf>, port: Option<u16>) -> anyhow::Result<()> {
    let mut config = Config::load_from(config_path.as_deref())?;
    if let Some(port) = port {
        config.server_port = port;
    }

    init_tracing(format!(
        "neonchat={level},tower_http={level}",
        level = config.log_level
    ));

    if config.llm_api_key.is_empty() {
        tracing::warn!("No LLM API key configured; chat turns will fail");
    }
    if config.mail_api_key.is_empty() {
        tracing::warn!("No mail API key configured; email sign-in will fail");
    }

    let db = storage::shared_connection(&config.database_url, config.max_connections).await?;
    let repo = Arc::new(SeaOrmConversationRepository::new(db.clone()));
    let identity = Arc::new(SeaOrmIdentityStore::new(db));
    let gateway = Arc::new(AnthropicGateway::from_config(&config));
    let mailer = Arc::new(MailerSendClient::from_config(&config));

    let bind_address = config.bind_address();
    let cors_enabled = config.cors_enabled;
    tracing::info!("Using model {}", gateway.model());

    let state = AppState::new(config, repo, identity, gateway, mailer);

    let limiter = state.limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            limiter.cleanup_expired();
        }
    });

    let mut app = create_router(state);
    if cors_enabled {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Shutting down");
    })
    .await?;

    Ok(())
}

async fn chat(url: String, token: Option<String>, email: Option<String>) -> anyhow::Result<()> {
    init_tracing("neonchat=warn".to_string());

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut api = ApiClient::new(url);

    match (token, email) {
        (Some(token), _) => api.set_token(Some(token)),
        (None, Some(email)) => {
            api.request_sign_in(&email).await?;
            println!("A sign-in link was sent to {}.", email);
            print!("Paste the token from the link: ");
            std::io::stdout().flush()?;
            let Some(token) = stdin.next_line().await? else {
                return Ok(());
            };
            let session = api.verify_email(token.trim(), &email).await?;
            println!("Signed in. Session token: {}", session.token);
        }
        (None, None) => anyhow::bail!("either --token or --email is required"),
    }

    let user = api.current_user().await?;
    println!("Signed in as {}", user.email);

    let mut controller = ChatController::new(api, TracingNotifier);
    controller.load_conversations().await?;
    match controller.conversations().first().map(|c| c.id) {
        Some(id) => {
            controller.select_conversation(id).await?;
        }
        None => {
            controller.start_new_conversation().await?;
        }
    }
    print_help();
    print_transcript(&controller);

    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = stdin.next_line().await? else {
            break;
        };
        let line = line.trim();

        match line {
            "" => continue,
            "/quit" => break,
            "/help" => print_help(),
            "/new" => {
                controller.start_new_conversation().await?;
                println!("Started a new conversation");
            }
            "/list" => {
                controller.load_conversations().await?;
                for (i, c) in controller.conversations().iter().enumerate() {
                    println!("{:>3}  {}  ({} messages)", i + 1, c.title, c.messages.len());
                }
            }
            _ if line.starts_with("/open ") => {
                let picked = line["/open ".len()..]
                    .trim()
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|i| controller.conversations().get(i))
                    .map(|c| c.id);
                match picked {
                    Some(id) => {
                        controller.select_conversation(id).await?;
                        print_transcript(&controller);
                    }
                    None => println!("No such conversation; try /list"),
                }
            }
            content => {
                let outcome = controller
                    .send(content, |chunk| {
                        print!("{}", chunk);
                        std::io::stdout().flush().ok();
                    })
                    .await?;
                println!();

                match outcome {
                    TurnOutcome::Saved(_) | TurnOutcome::EmptyReply => {}
                    TurnOutcome::SaveFailed(e) => println!("[not saved: {}]", e),
                    TurnOutcome::Failed(e) => println!("[failed: {}]", e),
                }

                if matches!(controller.session().map(|s| s.state()), Some(ChatState::Error(_))) {
                    controller.acknowledge_error();
                }
            }
        }
    }

    Ok(())
}

fn print_help() {
    println!("Commands: /new, /list, /open <n>, /help, /quit. Anything else is sent.");
}

fn print_transcript(controller: &ChatController) {
    if let Some(session) = controller.session() {
        println!("--- {} ---", session.title());
        for message in session.messages() {
            println!("[{}] {}", message.role, message.content);
        }
    }
}
