// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Coach-Session command line front end
//!
//! Drives the session manager from a terminal: sign in with any supported
//! method, inspect the restored session, record practice sessions and sign
//! out.

use anyhow::Context;
use clap::{Parser, Subcommand};
use coach_session::{
    config::Config,
    db::{FirestoreDb, ProfileStore},
    providers::{AppleWebBroker, ConsolePrompt, GoogleOAuthClient, IdentityToolkitClient},
    store::{FileStore, KeyValueStore, SessionStore},
    Providers, SessionManager, User,
};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "coach-session", version, about = "Manage the coaching app session")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the restored session
    Status,
    /// Sign in with email and password
    SignIn { email: String, password: String },
    /// Create an account
    SignUp {
        email: String,
        password: String,
        name: String,
    },
    /// Sign in with Google in the browser
    Google,
    /// Sign in with Apple in the browser
    Apple,
    /// Send a password reset email
    ResetPassword { email: String },
    /// Sign out everywhere
    SignOut,
    /// Record a completed practice session
    Record {
        score: u64,
        #[arg(long, default_value_t = 10)]
        minutes: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    init_logging();
    let cli = Cli::parse();

    let config = Config::from_env().context("Failed to load configuration")?;
    let manager = build_manager(&config).await?;

    let outcome = match cli.command {
        Command::Status => Ok(manager.current_user()),
        Command::SignIn { email, password } => manager
            .sign_in_with_password(&email, &password)
            .await
            .map(Some),
        Command::SignUp {
            email,
            password,
            name,
        } => manager
            .sign_up_with_password(&email, &password, &name)
            .await
            .map(Some),
        Command::Google => manager.sign_in_with_google().await.map(Some),
        Command::Apple => manager.sign_in_with_apple().await.map(Some),
        Command::ResetPassword { email } => {
            manager.reset_password(&email).await.map(|()| {
                eprintln!("Password reset email sent to {email}");
                None
            })
        }
        Command::SignOut => manager.sign_out().await.map(|()| None),
        Command::Record { score, minutes } => manager
            .update_user(|user| user.record_session(score, practice_duration(minutes)))
            .await
            .map(Some),
    };

    match outcome {
        Ok(user) => {
            print_user(user.as_ref())?;
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("{e}");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn build_manager(config: &Config) -> anyhow::Result<Arc<SessionManager>> {
    let http = config.http_client().context("Failed to build HTTP client")?;
    let prompt = Arc::new(ConsolePrompt::new());

    let files = FileStore::open(&config.session_dir).with_context(|| {
        format!(
            "Failed to open session directory {}",
            config.session_dir.display()
        )
    })?;
    tracing::debug!(dir = %files.dir().display(), "Session store opened");
    // Provider tokens live next to the session so a later run can revoke them.
    let backend: Arc<dyn KeyValueStore> = Arc::new(files);

    let providers = Providers {
        identity: Arc::new(
            IdentityToolkitClient::new(http.clone(), config).with_token_store(backend.clone()),
        ),
        apple: Arc::new(AppleWebBroker::new(config, prompt.clone())),
        google: Arc::new(
            GoogleOAuthClient::new(http, config, prompt).with_token_store(backend.clone()),
        ),
    };
    let store = SessionStore::new(backend);

    let profiles: Option<Arc<dyn ProfileStore>> = match &config.gcp_project_id {
        Some(project_id) => match FirestoreDb::new(project_id).await {
            Ok(db) => Some(Arc::new(db)),
            Err(e) => {
                tracing::warn!(error = %e, "Continuing without remote profiles");
                None
            }
        },
        None => None,
    };

    Ok(SessionManager::start(providers, store, profiles))
}

fn practice_duration(minutes: u64) -> Duration {
    Duration::from_secs(minutes.saturating_mul(60))
}

fn print_user(user: Option<&User>) -> anyhow::Result<()> {
    match user {
        Some(user) => println!("{}", serde_json::to_string_pretty(user)?),
        None => println!("Not signed in"),
    }
    Ok(())
}

/// Initialize structured JSON logging on stderr.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
        .from_env_lossy()
        .add_directive(
            "coach_session=debug"
                .parse()
                .unwrap_or_else(|_| tracing::level_filters::LevelFilter::DEBUG.into()),
        );

    tracing_subscriber::registry().with(filter).with(format).init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn practice_duration_saturates() {
        assert_eq!(practice_duration(10), Duration::from_secs(600));
        assert_eq!(practice_duration(u64::MAX), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn cli_parses_record_minutes() {
        let cli = Cli::try_parse_from(["coach-session", "record", "80", "--minutes", "25"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Record {
                score: 80,
                minutes: 25
            }
        ));
    }
}
