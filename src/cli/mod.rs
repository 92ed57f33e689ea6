//! CLI argument parsing module
//!
//! This module handles command-line argument parsing and application entry point.

use crate::browser::BrowserCookieExtractor;
use crate::config::{BrowserCookieConfig, Config};
use crate::error::{Result, SyncError};
use crate::exit_code::exit_code_for_error;
use crate::output::{OutputFormat, OutputWriter};
use crate::scheduler::Scheduler;
use crate::service::{Request, Response, Service};
use crate::store::{JsonFileStore, SharedStore};
use crate::utils::{FileUtils, StringUtils, UrlUtils};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::sync::Arc;

/// Main entry point for the CLI application
pub fn run() {
    let matches = create_app().get_matches();
    crate::logging::init(matches.get_flag("verbose"));

    if let Err(e) = run_with_args(&matches) {
        OutputWriter::new(OutputFormat::Text).write_error(&e.to_string());
        std::process::exit(exit_code_for_error(&e));
    }
}

fn run_with_args(matches: &ArgMatches) -> Result<()> {
    let config = build_config_from_args(matches)?;
    let store_path = config.resolved_store_path()?;
    log::debug!("Using store {:?}", store_path);
    let store: SharedStore = Arc::new(JsonFileStore::open(store_path)?);
    let source = BrowserCookieExtractor::new(config.browser_config()?);
    let service = Service::new(&config, store, source)?;

    let (command, sub) = matches
        .subcommand()
        .ok_or_else(|| SyncError::Config("No command given".to_string()))?;

    if command == "status" {
        let format = if sub.get_flag("json") {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        };
        return OutputWriter::new(format).write_status(&service.status()?);
    }

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| SyncError::Config(format!("Failed to create async runtime: {}", e)))?;
    let output = OutputWriter::new(OutputFormat::Text);

    rt.block_on(async {
        match command {
            "login" => {
                let email = required(sub, "email")?;
                let password = required(sub, "password")?;
                let api_url = matches.get_one::<String>("api-url").map(String::as_str);
                let logged_in = service.login(email, password, api_url).await?;
                output.write_response(&Response {
                    user: logged_in.user,
                    ..Response::ok()
                })
            }
            "logout" => output.write_response(&service.handle(Request::Logout).await),
            "sync" => {
                let result = service.sync_now().await.into_result()?;
                output.write_sync_result(&result)
            }
            "refresh" => refresh(&service, &output).await,
            "run" => {
                let mut scheduler = Scheduler::from_config(&config);
                if let Some(raw) = sub.get_one::<String>("sync-interval") {
                    scheduler = Scheduler::new(StringUtils::parse_interval(raw)?, scheduler.refresh_every());
                }
                if let Some(raw) = sub.get_one::<String>("refresh-interval") {
                    scheduler = Scheduler::new(scheduler.sync_every(), StringUtils::parse_interval(raw)?);
                }
                scheduler.run(&service, shutdown_signal()).await;
                Ok(())
            }
            other => Err(SyncError::Unsupported(format!("Unknown command: {}", other))),
        }
    })
}

async fn refresh(service: &Service<BrowserCookieExtractor>, output: &OutputWriter) -> Result<()> {
    if !service.status()?.logged_in {
        return Err(SyncError::NotLoggedIn);
    }
    if service.refresh().await {
        return output.write("Token refreshed\n");
    }
    if service.status()?.logged_in {
        Err(SyncError::RefreshFailed)
    } else {
        Err(SyncError::AuthExpired)
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str> {
    matches
        .get_one::<String>(name)
        .map(String::as_str)
        .ok_or_else(|| SyncError::Config(format!("Missing --{}", name)))
}

/// Create the CLI application structure
fn create_app() -> Command {
    Command::new("cookie-sync")
        .version(crate::VERSION)
        .about("Keeps a backend account supplied with your browser session cookies")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(Arg::new("config")
            .short('c')
            .long("config")
            .value_name("FILE")
            .env("COOKIE_SYNC_CONFIG")
            .global(true)
            .help("Configuration file (TOML)"))
        .arg(Arg::new("store")
            .long("store")
            .value_name("FILE")
            .env("COOKIE_SYNC_STORE")
            .global(true)
            .help("Session store file"))
        .arg(Arg::new("api-url")
            .long("api-url")
            .value_name("URL")
            .env("COOKIE_SYNC_API_URL")
            .global(true)
            .help("Backend base URL"))
        .arg(Arg::new("browser")
            .short('b')
            .long("browser")
            .value_name("BROWSER[+KEYRING][:PROFILE]")
            .global(true)
            .help("Browser to read cookies from"))
        .arg(Arg::new("verbose")
            .short('v')
            .long("verbose")
            .global(true)
            .help("Verbose output")
            .action(ArgAction::SetTrue))
        .subcommand(Command::new("login")
            .about("Log in and run a first sync")
            .arg(Arg::new("email")
                .short('e')
                .long("email")
                .value_name("EMAIL")
                .required(true))
            .arg(Arg::new("password")
                .short('p')
                .long("password")
                .value_name("PASSWORD")
                .env("COOKIE_SYNC_PASSWORD")
                .hide_env_values(true)
                .required(true)))
        .subcommand(Command::new("logout")
            .about("Log out and clear the stored session"))
        .subcommand(Command::new("sync")
            .about("Harvest cookies and submit them now"))
        .subcommand(Command::new("refresh")
            .about("Refresh the access token"))
        .subcommand(Command::new("status")
            .about("Show session and last sync")
            .arg(Arg::new("json")
                .long("json")
                .help("Print status as JSON")
                .action(ArgAction::SetTrue)))
        .subcommand(Command::new("run")
            .about("Run the sync and token refresh timers until interrupted")
            .arg(Arg::new("sync-interval")
                .long("sync-interval")
                .value_name("INTERVAL")
                .help("Sync period (minutes, or with s/m/h)"))
            .arg(Arg::new("refresh-interval")
                .long("refresh-interval")
                .value_name("INTERVAL")
                .help("Token refresh period (minutes, or with s/m/h)")))
}

/// Build configuration from command line arguments
fn build_config_from_args(matches: &ArgMatches) -> Result<Config> {
    let config_path = matches
        .get_one::<String>("config")
        .map(|path| FileUtils::expand_path(path))
        .transpose()?;
    let mut config = Config::load(config_path.as_deref())?;

    if let Some(url) = matches.get_one::<String>("api-url") {
        UrlUtils::validate_url(url)?;
        config.api_base_url = Some(url.clone());
    }

    if let Some(spec) = matches.get_one::<String>("browser") {
        BrowserCookieConfig::parse(spec)?;
        config.browser = spec.clone();
    }

    if let Some(path) = matches.get_one::<String>("store") {
        config.store_path = Some(FileUtils::expand_path(path)?);
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_definition_is_consistent() {
        create_app().debug_assert();
    }

    #[test]
    fn config_overrides_come_from_flags() {
        let matches = create_app()
            .try_get_matches_from([
                "cookie-sync",
                "--api-url",
                "https://api.example.com",
                "--browser",
                "chromium:/tmp/Cookies",
                "--store",
                "/tmp/cookie-sync-store.json",
                "status",
            ])
            .expect("matches");
        let config = build_config_from_args(&matches).expect("config");
        assert_eq!(config.api_base_url.as_deref(), Some("https://api.example.com"));
        assert_eq!(config.browser, "chromium:/tmp/Cookies");
        assert_eq!(
            config.store_path.as_deref(),
            Some(std::path::Path::new("/tmp/cookie-sync-store.json"))
        );
    }

    #[test]
    fn login_requires_email_and_password() {
        let result = create_app().try_get_matches_from(["cookie-sync", "login", "-e", "a@b.c"]);
        if std::env::var_os("COOKIE_SYNC_PASSWORD").is_none() {
            assert!(result.is_err());
        }
    }
}
