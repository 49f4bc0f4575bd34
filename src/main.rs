use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use jitcall::auth::{AuthError, RegistrationProfile, SecondaryLoginOutcome};
use jitcall::{decide, App, Config};
use rustyline::error::ReadlineError;
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;

/// jitCall client session tools
#[derive(Parser, Debug)]
#[command(name = "jitcall")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to config.toml (also: JITCALL_CONFIG)
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive session: login, navigation and requests
    Shell,
    /// Show the cached external API token state
    Token {
        /// Print the token value itself
        #[arg(long)]
        show: bool,
    },
    /// Delete the cached external API token
    ClearToken,
    /// Evaluate the route guard for a path
    Route {
        path: String,
        /// Decide as a signed-in user
        #[arg(long)]
        authenticated: bool,
    },
    /// Print the resolved configuration, secrets redacted
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    jitcall::logging::init(if cli.debug {
        "jitcall=debug"
    } else {
        jitcall::logging::DEFAULT_DIRECTIVE
    });

    match cli.command {
        Command::Route {
            path,
            authenticated,
        } => {
            let decision = decide(authenticated, &path);
            match decision.redirect_target() {
                Some(target) => println!("{path}: redirect to {target}"),
                None => println!("{path}: allow"),
            }
            Ok(())
        }
        Command::Config => {
            let config = Config::load(cli.config.as_deref())?;
            match &config.config_path {
                Some(path) => println!("# loaded from {}", path.display()),
                None => println!("# defaults (no config file found)"),
            }
            println!("# token store: {}", config.storage.db_path()?.display());
            match jitcall::app::supabase_reachable(&config).await? {
                Some(true) => println!("# supabase: reachable"),
                Some(false) => println!("# supabase: unreachable"),
                None => println!("# supabase: not configured"),
            }
            print!("{}", toml::to_string_pretty(&config.redacted())?);
            Ok(())
        }
        Command::Token { show } => {
            let app = App::from_config(Config::load(cli.config.as_deref())?)?;
            match app.tokens.get_token() {
                Some(token) if show => println!("{token}"),
                Some(token) => println!("external API token cached ({} chars)", token.len()),
                None => println!("no external API token cached"),
            }
            Ok(())
        }
        Command::ClearToken => {
            let app = App::from_config(Config::load(cli.config.as_deref())?)?;
            app.tokens
                .clear_token()
                .context("Failed to clear external API token")?;
            println!("external API token cleared");
            Ok(())
        }
        Command::Shell => {
            let app = App::from_config(Config::load(cli.config.as_deref())?)?;
            run_shell(&app).await
        }
    }
}

const SHELL_HELP: &str = "\
Commands:
  login <email>            Sign in (password is prompted)
  register <email>         Create an account (profile fields are prompted)
  logout                   Sign out and clear the external API token
  whoami                   Show the current session and profile
  go <path>                Evaluate navigation to <path>
  get <url>                Send a GET through the request pipeline
  token                    Show the cached external API token state
  contacts                 List your contacts
  add-contact <phone>      Add the user registered with <phone>
  rename <name> <last>     Change your profile name
  photo <file>             Upload a JPEG or PNG as your profile photo
  help                     Show this help
  quit                     Leave the shell";

async fn run_shell(app: &App) -> Result<()> {
    report_secondary_logins(app);

    let mut rl = rustyline::DefaultEditor::new().context("Failed to start line editor")?;
    println!("jitcall shell. Type 'help' for commands.");

    loop {
        let line = match rl.readline("jitcall> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(line);

        let mut parts = line.split_whitespace();
        let command = parts.next().unwrap_or_default();
        let args: Vec<&str> = parts.collect();

        let result = match (command, args.as_slice()) {
            ("quit" | "exit", _) => break,
            ("help", _) => {
                println!("{SHELL_HELP}");
                Ok(())
            }
            ("login", [email]) => shell_login(app, email).await,
            ("register", [email]) => shell_register(app, email).await,
            ("logout", []) => shell_logout(app).await,
            ("whoami", []) => shell_whoami(app).await,
            ("go", [path]) => {
                let decision = app.guard.can_activate(path);
                match decision.redirect_target() {
                    Some(target) => println!("redirected to {target}"),
                    None => println!("now at /{}", path.trim_start_matches('/')),
                }
                Ok(())
            }
            ("get", [url]) => shell_get(app, url).await,
            ("token", []) => {
                match app.tokens.get_token() {
                    Some(token) => println!("external API token cached ({} chars)", token.len()),
                    None => println!("no external API token cached"),
                }
                Ok(())
            }
            ("contacts", []) => shell_contacts(app).await,
            ("add-contact", [phone]) => shell_add_contact(app, phone).await,
            ("rename", [name, last_name]) => shell_rename(app, name, last_name).await,
            ("photo", [file]) => shell_photo(app, file).await,
            _ => {
                println!("Unknown command or wrong arguments. Type 'help'.");
                Ok(())
            }
        };

        if let Err(e) = result {
            println!("error: {e:#}");
        }
    }

    Ok(())
}

/// Print secondary login outcomes as they arrive.
fn report_secondary_logins(app: &App) {
    let mut outcomes = app.tokens.subscribe_outcomes();
    tokio::spawn(async move {
        loop {
            match outcomes.recv().await {
                Ok(SecondaryLoginOutcome::Stored) => println!("\n(external API session established)"),
                Ok(SecondaryLoginOutcome::NoToken) => {
                    println!("\n(external API login returned no token)")
                }
                Ok(SecondaryLoginOutcome::Failed(reason)) => {
                    println!("\n(external API login failed: {reason})")
                }
                Ok(SecondaryLoginOutcome::Discarded) => {}
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });
}

fn signed_in_id(app: &App) -> Result<String> {
    app.identity
        .current_session()
        .principal_id()
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("not signed in"))
}

fn report_auth_error(e: AuthError) -> anyhow::Error {
    tracing::debug!(error = %e, "Auth operation failed");
    if e.is_credential_error() {
        anyhow::anyhow!("{}", e.user_message())
    } else {
        anyhow::anyhow!("{} ({e})", e.user_message())
    }
}

async fn shell_login(app: &App, email: &str) -> Result<()> {
    let password = dialoguer::Password::new()
        .with_prompt("Password")
        .interact()?;
    let session = app
        .identity
        .login(email, &password)
        .await
        .map_err(report_auth_error)?;
    println!("signed in as {}", session.principal_id().unwrap_or_default());
    Ok(())
}

async fn shell_register(app: &App, email: &str) -> Result<()> {
    let name: String = dialoguer::Input::new().with_prompt("Name").interact_text()?;
    let last_name: String = dialoguer::Input::new()
        .with_prompt("Last name")
        .interact_text()?;
    let phone: String = dialoguer::Input::new()
        .with_prompt("Phone")
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.len() >= 10 && input.chars().all(|c| c.is_ascii_digit()) {
                Ok(())
            } else {
                Err("at least 10 digits")
            }
        })
        .interact_text()?;
    let password = dialoguer::Password::new()
        .with_prompt("Password")
        .with_confirmation("Confirm password", "Passwords do not match")
        .interact()?;

    let profile = RegistrationProfile {
        name,
        last_name,
        phone,
    };
    let session = app
        .identity
        .register(profile, email, &password)
        .await
        .map_err(report_auth_error)?;
    println!(
        "account created for {} ({})",
        email,
        session.principal_id().unwrap_or_default()
    );
    Ok(())
}

async fn shell_logout(app: &App) -> Result<()> {
    app.identity.logout().await.map_err(report_auth_error)?;
    println!("signed out");
    Ok(())
}

async fn shell_whoami(app: &App) -> Result<()> {
    let session = app.identity.current_session();
    let Some(id) = session.principal_id() else {
        println!("not signed in");
        return Ok(());
    };

    println!("principal: {id}");
    if let Some(profile) = app.identity.profile(id).await {
        println!("name:      {} {}", profile.name, profile.last_name);
        println!("email:     {}", profile.email);
        println!("phone:     {}", profile.phone);
        if let Some(photo) = profile.photo_url {
            println!("photo:     {photo}");
        }
    }
    let id_token = if app.identity.provider_id_token().is_some() {
        "present"
    } else {
        "absent"
    };
    println!("provider ID token: {id_token}");
    Ok(())
}

async fn shell_get(app: &App, url: &str) -> Result<()> {
    let resp = app
        .http
        .execute(app.http.request(reqwest::Method::GET, url))
        .await
        .with_context(|| format!("GET {url} failed"))?;
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    println!("{status}");
    if !body.is_empty() {
        println!("{}", body.chars().take(2000).collect::<String>());
    }
    Ok(())
}

async fn shell_contacts(app: &App) -> Result<()> {
    let owner = signed_in_id(app)?;
    let contacts = app.profiles.contacts(&owner).await?;
    if contacts.is_empty() {
        println!("no contacts yet");
    }
    for contact in contacts {
        println!("{} {}  {}", contact.name, contact.last_name, contact.phone);
    }
    Ok(())
}

async fn shell_add_contact(app: &App, phone: &str) -> Result<()> {
    let owner = signed_in_id(app)?;
    let contact = app.profiles.add_contact_by_phone(&owner, phone).await?;
    println!("{} added to your contacts", contact.name);
    Ok(())
}

async fn shell_rename(app: &App, name: &str, last_name: &str) -> Result<()> {
    let owner = signed_in_id(app)?;
    app.profiles.update_user_name(&owner, name, last_name).await?;
    println!("name updated");
    Ok(())
}

async fn shell_photo(app: &App, file: &str) -> Result<()> {
    use base64::Engine;

    let owner = signed_in_id(app)?;
    let content_type = match file.rsplit('.').next().map(str::to_ascii_lowercase).as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        _ => anyhow::bail!("only .jpg, .jpeg and .png files are supported"),
    };
    let bytes = std::fs::read(file).with_context(|| format!("Failed to read {file}"))?;
    let data_url = format!(
        "data:{content_type};base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    );

    let url = app.profiles.upload_profile_photo(&owner, &data_url).await?;
    println!("photo uploaded: {url}");
    Ok(())
}
