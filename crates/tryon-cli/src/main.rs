use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use reqwest::blocking::Client as HttpClient;
use serde_json::json;
use tryon_contracts::events::{payload, EventWriter};
use tryon_contracts::generation::GenerationRequest;
use tryon_contracts::images::EncodedImage;
use tryon_contracts::session::{CredentialPolicy, SessionState, SessionStore, UserProfile};
use tryon_engine::{
    fetch_result_image, ingest_path, AuthClient, AuthError, AuthOutcome, GenerationError,
    GenerationErrorKind, GenerationOutcome, InFlight, ResultSlot, Ticket, TryOnConfig,
    TryOnEngine,
};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(
    name = "tryon",
    version,
    about = "Virtual try-on from a face photo and a garment photo"
)]
struct Cli {
    /// Directory holding session.json and events.jsonl.
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    events: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Signup(SignupArgs),
    Login(LoginArgs),
    Logout(LogoutArgs),
    Whoami,
    SetKey(SetKeyArgs),
    ClearKey,
    Models,
    Generate(GenerateArgs),
}

#[derive(Debug, Parser)]
struct SignupArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    email: String,
    #[arg(long)]
    password: String,
}

#[derive(Debug, Parser)]
struct LoginArgs {
    #[arg(long)]
    email: String,
    #[arg(long)]
    password: String,
}

#[derive(Debug, Parser)]
struct LogoutArgs {
    /// Forget the stored API key as well.
    #[arg(long)]
    clear_key: bool,
}

#[derive(Debug, Parser)]
struct SetKeyArgs {
    key: String,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    /// Face photo.
    #[arg(long)]
    subject: PathBuf,
    #[arg(long)]
    garment: PathBuf,
    #[arg(long, default_value = "canvas")]
    model: String,
    /// Overrides the stored API key for this run only.
    #[arg(long)]
    api_key: Option<String>,
    /// File or directory for the result.
    #[arg(long)]
    out: Option<PathBuf>,
    #[arg(long, default_value_t = 120)]
    timeout_secs: u64,
}

type GenerationAttempt = Result<GenerationOutcome, GenerationError>;
type SharedResults = Arc<Mutex<ResultSlot<GenerationAttempt>>>;

struct CliContext {
    config: TryOnConfig,
    events: EventWriter,
    sessions: SessionStore,
    /// Held by the generation worker until it finishes, even past a timeout.
    generating: InFlight,
    results: SharedResults,
}

impl CliContext {
    fn new(mut config: TryOnConfig, state_dir: Option<PathBuf>, events: Option<PathBuf>) -> Self {
        if let Some(state_dir) = state_dir {
            config.state_dir = state_dir;
        }
        let events_path = events.unwrap_or_else(|| config.events_path());
        let events = EventWriter::new(events_path, Uuid::new_v4().to_string());
        let sessions = SessionStore::new(config.session_path());
        Self {
            config,
            events,
            sessions,
            generating: InFlight::new(),
            results: Arc::new(Mutex::new(ResultSlot::new())),
        }
    }
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("tryon error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    execute(cli, TryOnConfig::from_env())
}

fn execute(cli: Cli, config: TryOnConfig) -> Result<i32> {
    let ctx = CliContext::new(config, cli.state_dir, cli.events);
    let session = ctx.sessions.load()?;
    ctx.events.emit(
        "session_started",
        payload(json!({
            "command": command_name(&cli.command),
            "authenticated": session.is_authenticated(),
        })),
    )?;
    match cli.command {
        Command::Signup(args) => run_signup(&ctx, session, args),
        Command::Login(args) => run_login(&ctx, session, args),
        Command::Logout(args) => run_logout(&ctx, session, args),
        Command::Whoami => run_whoami(&session),
        Command::SetKey(args) => run_set_key(&ctx, session, Some(args.key)),
        Command::ClearKey => run_set_key(&ctx, session, None),
        Command::Models => run_models(&ctx),
        Command::Generate(args) => run_generate(&ctx, &session, args),
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Signup(_) => "signup",
        Command::Login(_) => "login",
        Command::Logout(_) => "logout",
        Command::Whoami => "whoami",
        Command::SetKey(_) => "set-key",
        Command::ClearKey => "clear-key",
        Command::Models => "models",
        Command::Generate(_) => "generate",
    }
}

fn require_session(session: &SessionState) -> Result<()> {
    if !session.is_authenticated() {
        bail!("Please log in first (tryon login --email <EMAIL> --password <PASSWORD>).");
    }
    Ok(())
}

fn run_signup(ctx: &CliContext, session: SessionState, args: SignupArgs) -> Result<i32> {
    let client = AuthClient::new(ctx.config.auth_base_url.clone());
    let outcome = client.signup(&args.name, &args.email, &args.password);
    finish_auth(ctx, session, "signup", &args.email, outcome)
}

fn run_login(ctx: &CliContext, session: SessionState, args: LoginArgs) -> Result<i32> {
    let client = AuthClient::new(ctx.config.auth_base_url.clone());
    let outcome = client.login(&args.email, &args.password);
    finish_auth(ctx, session, "login", &args.email, outcome)
}

fn finish_auth(
    ctx: &CliContext,
    mut session: SessionState,
    action: &str,
    email: &str,
    outcome: Result<AuthOutcome, AuthError>,
) -> Result<i32> {
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(err) => {
            ctx.events.emit(
                "auth_failed",
                payload(json!({ "action": action, "error": err.to_string() })),
            )?;
            eprintln!("{err}");
            return Ok(1);
        }
    };
    let Some(token) = outcome.token else {
        ctx.events.emit(
            "auth_succeeded",
            payload(json!({ "action": action, "signed_in": false })),
        )?;
        println!(
            "{}",
            outcome
                .message
                .as_deref()
                .unwrap_or("Account created. Please log in.")
        );
        return Ok(0);
    };
    let user = outcome.user.unwrap_or_else(|| UserProfile {
        name: None,
        email: email.trim().to_string(),
    });
    let greeting = format!("Welcome, {}.", user.display_name());
    session.sign_in(token, Some(user));
    ctx.sessions.save(&session)?;
    ctx.events.emit(
        "auth_succeeded",
        payload(json!({ "action": action, "signed_in": true })),
    )?;
    println!("{greeting}");
    Ok(0)
}

fn run_logout(ctx: &CliContext, mut session: SessionState, args: LogoutArgs) -> Result<i32> {
    let policy = if args.clear_key {
        CredentialPolicy::ClearOnLogout
    } else {
        ctx.config.credential_policy
    };
    session.logout(policy);
    ctx.sessions.save(&session)?;
    let kept_api_key = session.credential.is_some();
    ctx.events
        .emit("logged_out", payload(json!({ "kept_api_key": kept_api_key })))?;
    println!("Logged out.");
    Ok(0)
}

fn run_whoami(session: &SessionState) -> Result<i32> {
    require_session(session)?;
    match &session.user {
        Some(user) => println!("{} <{}>", user.display_name(), user.email),
        None => println!("Signed in."),
    }
    match session.credential.as_deref() {
        Some(key) => println!("API key: {}", mask_key(key)),
        None => println!("API key: not set"),
    }
    Ok(0)
}

fn run_set_key(ctx: &CliContext, mut session: SessionState, key: Option<String>) -> Result<i32> {
    require_session(&session)?;
    session.set_credential(key);
    ctx.sessions.save(&session)?;
    match session.credential.as_deref() {
        Some(key) => println!("API key saved ({}).", mask_key(key)),
        None => println!("API key cleared."),
    }
    Ok(0)
}

fn run_models(ctx: &CliContext) -> Result<i32> {
    let engine = TryOnEngine::from_config(&ctx.config, ctx.events.clone());
    let default_id = engine.resolve("").id.clone();
    for model in engine.models() {
        let marker = if model.id == default_id { "*" } else { " " };
        let key = if model.requires_credential {
            "API key required"
        } else {
            "offline"
        };
        println!(
            "{marker} {:<12} {:<26} {:<5} {key}",
            model.id,
            model.display_name,
            model.tier.as_str()
        );
    }
    Ok(0)
}

fn run_generate(ctx: &CliContext, session: &SessionState, args: GenerateArgs) -> Result<i32> {
    require_session(session)?;
    let Some(guard) = ctx.generating.try_begin() else {
        bail!("A generation is already running.");
    };
    let subject = ingest_path(&args.subject)
        .with_context(|| format!("face photo {}", args.subject.display()))?;
    let garment = ingest_path(&args.garment)
        .with_context(|| format!("garment photo {}", args.garment.display()))?;
    let credential = args
        .api_key
        .clone()
        .or_else(|| session.credential.clone());
    let request = GenerationRequest::new(subject, garment, args.model.clone())
        .with_credential(credential);

    let engine = TryOnEngine::from_config(&ctx.config, ctx.events.clone());
    let ticket = lock_results(&ctx.results)?.begin();
    let results = Arc::clone(&ctx.results);
    let (done_tx, done_rx) = mpsc::channel();
    thread::spawn(move || {
        let _guard = guard;
        let applied = deliver(&results, &ticket, engine.generate(&request));
        let _ = done_tx.send(applied);
    });

    let attempt = match done_rx.recv_timeout(Duration::from_secs(args.timeout_secs.max(1))) {
        Ok(true) => lock_results(&ctx.results)?.take(),
        Ok(false) => bail!("Generation result arrived after it was discarded."),
        Err(RecvTimeoutError::Timeout) => {
            lock_results(&ctx.results)?.reset();
            if ctx.generating.is_busy() {
                eprintln!("note: the provider call is still running in the background.");
            }
            bail!(
                "Generation timed out after {}s; any late result will be ignored.",
                args.timeout_secs
            );
        }
        Err(RecvTimeoutError::Disconnected) => bail!("generation worker stopped unexpectedly"),
    };
    let outcome = match attempt {
        Some(Ok(outcome)) => outcome,
        Some(Err(err)) if err.kind() == GenerationErrorKind::MissingCredential => {
            eprintln!("{err} Add one with `tryon set-key <KEY>` or pass --api-key.");
            return Ok(2);
        }
        Some(Err(err)) => return Err(err.into()),
        None => bail!("No generation result to save."),
    };

    for warning in &outcome.warnings {
        eprintln!("note: {warning}");
    }
    let image = fetch_result_image(&HttpClient::new(), &outcome.result.image)?;
    let path = output_path(args.out.as_deref(), &outcome.request_id, &image);
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(&path, image.bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;
    ctx.events.emit(
        "result_saved",
        payload(json!({
            "request_id": outcome.request_id,
            "path": path.to_string_lossy(),
            "source": outcome.result.source.as_str(),
            "bytes": image.len(),
        })),
    )?;
    println!(
        "Saved {} result ({}) to {}",
        outcome.result.label,
        outcome.result.source,
        path.display()
    );
    Ok(0)
}

/// Stores a finished attempt unless its ticket went stale while it ran.
fn deliver(results: &SharedResults, ticket: &Ticket, attempt: GenerationAttempt) -> bool {
    match results.lock() {
        Ok(mut slot) => slot.apply(ticket, attempt),
        Err(_) => false,
    }
}

fn lock_results(results: &SharedResults) -> Result<MutexGuard<'_, ResultSlot<GenerationAttempt>>> {
    results
        .lock()
        .map_err(|_| anyhow!("generation result lock poisoned"))
}

/// `out` may name a file, an existing directory, or nothing (current dir).
fn output_path(out: Option<&Path>, request_id: &str, image: &EncodedImage) -> PathBuf {
    let stem: String = request_id.chars().filter(|c| *c != '-').take(8).collect();
    let file_name = format!("tryon-{stem}.{}", image.extension());
    match out {
        Some(path) if path.is_dir() => path.join(file_name),
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(file_name),
    }
}

fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{tail}", "*".repeat(chars.len() - 4))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{ImageFormat, Rgba, RgbaImage};
    use serde_json::Value;

    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["tryon"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).expect("valid arguments")
    }

    fn offline_config() -> TryOnConfig {
        TryOnConfig::from_lookup(|key| match key {
            "TRYON_AUTH_BASE_URL" => Some("http://127.0.0.1:9".to_string()),
            _ => None,
        })
    }

    fn write_png(path: &Path, width: u32, height: u32, color: [u8; 4]) -> Result<()> {
        let image = RgbaImage::from_pixel(width, height, Rgba(color));
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        fs::write(path, bytes)?;
        Ok(())
    }

    fn event_types(path: &Path) -> Result<Vec<String>> {
        let raw = fs::read_to_string(path)?;
        Ok(raw
            .lines()
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .filter_map(|row| row.get("type").and_then(Value::as_str).map(str::to_string))
            .collect())
    }

    #[test]
    fn generate_defaults_to_canvas_model() {
        let cli = parse(&["generate", "--subject", "a.png", "--garment", "b.png"]);
        match cli.command {
            Command::Generate(args) => {
                assert_eq!(args.model, "canvas");
                assert_eq!(args.api_key, None);
                assert_eq!(args.timeout_secs, 120);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_state_dir_is_accepted_after_subcommand() {
        let cli = parse(&["models", "--state-dir", "/tmp/tryon-state"]);
        assert_eq!(cli.state_dir, Some(PathBuf::from("/tmp/tryon-state")));
    }

    #[test]
    fn mask_key_keeps_last_four_characters() {
        assert_eq!(mask_key("abcdef123456"), "********3456");
        assert_eq!(mask_key("abc"), "***");
    }

    #[test]
    fn output_path_handles_files_directories_and_default() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let image = EncodedImage::new(vec![1u8], "image/png", None);
        let request_id = "1234abcd-5678-90ef";

        assert_eq!(
            output_path(Some(temp.path()), request_id, &image),
            temp.path().join("tryon-1234abcd.png")
        );
        let file = temp.path().join("result.png");
        assert_eq!(output_path(Some(&file), request_id, &image), file);
        assert_eq!(
            output_path(None, request_id, &image),
            PathBuf::from("tryon-1234abcd.png")
        );
        Ok(())
    }

    #[test]
    fn generate_requires_a_session() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let state = temp.path().to_string_lossy().to_string();
        let cli = parse(&[
            "--state-dir",
            &state,
            "generate",
            "--subject",
            "a.png",
            "--garment",
            "b.png",
        ]);
        let err = execute(cli, offline_config()).unwrap_err();
        assert!(err.to_string().contains("Please log in first"));
        Ok(())
    }

    #[test]
    fn short_password_login_exits_nonzero_and_logs_failure() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let state = temp.path().to_string_lossy().to_string();
        let cli = parse(&[
            "--state-dir",
            &state,
            "login",
            "--email",
            "a@b.com",
            "--password",
            "short",
        ]);
        assert_eq!(execute(cli, offline_config())?, 1);
        assert_eq!(
            event_types(&temp.path().join("events.jsonl"))?,
            vec!["session_started", "auth_failed"]
        );
        assert!(SessionStore::new(temp.path().join("session.json"))
            .load()?
            .auth_token
            .is_none());
        Ok(())
    }

    #[test]
    fn canvas_generation_saves_result_for_signed_in_user() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let sessions = SessionStore::new(temp.path().join("session.json"));
        let mut session = SessionState::default();
        session.sign_in(
            "token-1".to_string(),
            Some(UserProfile {
                name: Some("Ada".to_string()),
                email: "ada@example.com".to_string(),
            }),
        );
        sessions.save(&session)?;

        let subject = temp.path().join("face.png");
        let garment = temp.path().join("shirt.png");
        write_png(&subject, 40, 40, [200, 150, 120, 255])?;
        write_png(&garment, 120, 180, [10, 20, 200, 255])?;
        let out = temp.path().join("out").join("result.png");

        let state = temp.path().to_string_lossy().to_string();
        let subject_arg = subject.to_string_lossy().to_string();
        let garment_arg = garment.to_string_lossy().to_string();
        let out_arg = out.to_string_lossy().to_string();
        let cli = parse(&[
            "--state-dir",
            &state,
            "generate",
            "--subject",
            &subject_arg,
            "--garment",
            &garment_arg,
            "--out",
            &out_arg,
        ]);
        assert_eq!(execute(cli, offline_config())?, 0);

        let saved = image::open(&out)?;
        assert_eq!((saved.width(), saved.height()), (120, 180));
        let types = event_types(&temp.path().join("events.jsonl"))?;
        assert_eq!(types.first().map(String::as_str), Some("session_started"));
        assert_eq!(types.last().map(String::as_str), Some("result_saved"));
        assert!(types.iter().any(|kind| kind == "generation_completed"));
        Ok(())
    }

    #[test]
    fn missing_credential_exits_with_code_two() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let sessions = SessionStore::new(temp.path().join("session.json"));
        let mut session = SessionState::default();
        session.sign_in("token-1".to_string(), None);
        sessions.save(&session)?;
        let subject = temp.path().join("face.png");
        write_png(&subject, 10, 10, [0, 0, 0, 255])?;

        let state = temp.path().to_string_lossy().to_string();
        let subject_arg = subject.to_string_lossy().to_string();
        let cli = parse(&[
            "--state-dir",
            &state,
            "generate",
            "--subject",
            &subject_arg,
            "--garment",
            &subject_arg,
            "--model",
            "nanobanana",
        ]);
        assert_eq!(execute(cli, offline_config())?, 2);
        Ok(())
    }

    fn signed_in() -> SessionState {
        let mut session = SessionState::default();
        session.sign_in("token-1".to_string(), None);
        session
    }

    #[test]
    fn second_generation_is_refused_while_one_is_running() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let ctx = CliContext::new(offline_config(), Some(temp.path().to_path_buf()), None);
        let _running = ctx.generating.try_begin();
        let args = match parse(&["generate", "--subject", "a.png", "--garment", "b.png"]).command {
            Command::Generate(args) => args,
            other => panic!("unexpected command: {other:?}"),
        };

        let err = run_generate(&ctx, &signed_in(), args).unwrap_err();
        assert_eq!(err.to_string(), "A generation is already running.");
        Ok(())
    }

    #[test]
    fn late_attempt_after_reset_is_dropped() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let ctx = CliContext::new(offline_config(), Some(temp.path().to_path_buf()), None);
        let ticket = lock_results(&ctx.results)?.begin();
        let results = Arc::clone(&ctx.results);

        // timeout path: the waiting side gives up before the worker reports
        lock_results(&ctx.results)?.reset();
        let worker = thread::spawn(move || {
            deliver(&results, &ticket, Err(GenerationError::MissingImage))
        });

        assert!(!worker.join().map_err(|_| anyhow!("worker panicked"))?);
        assert!(lock_results(&ctx.results)?.current().is_none());
        Ok(())
    }

    #[test]
    fn current_attempt_is_delivered() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let ctx = CliContext::new(offline_config(), Some(temp.path().to_path_buf()), None);
        let ticket = lock_results(&ctx.results)?.begin();
        assert!(deliver(&ctx.results, &ticket, Err(GenerationError::MissingImage)));
        let attempt = lock_results(&ctx.results)?.take();
        assert!(matches!(attempt, Some(Err(GenerationError::MissingImage))));
        Ok(())
    }

    #[test]
    fn logout_keeps_api_key_unless_asked() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let state = temp.path().to_string_lossy().to_string();
        let sessions = SessionStore::new(temp.path().join("session.json"));
        let mut session = SessionState::default();
        session.sign_in("token-1".to_string(), None);
        session.set_credential(Some("key-123456".to_string()));
        sessions.save(&session)?;

        assert_eq!(execute(parse(&["--state-dir", &state, "logout"]), offline_config())?, 0);
        let loaded = sessions.load()?;
        assert!(!loaded.is_authenticated());
        assert_eq!(loaded.credential.as_deref(), Some("key-123456"));

        execute(
            parse(&["--state-dir", &state, "logout", "--clear-key"]),
            offline_config(),
        )?;
        assert_eq!(sessions.load()?.credential, None);
        Ok(())
    }
}
