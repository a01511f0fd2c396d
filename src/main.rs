use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use time::OffsetDateTime;
use time::macros::format_description;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;
use xauth::clipboard::copy_to_clipboard;
use xauth::clock::{Clock, SystemClock, next_tick, seconds_remaining};
use xauth::config::{Config, TokenDefaults, config_path, save_config, store_root};
use xauth::crypto::generate_new_config;
use xauth::keychain::FileKeychain;
use xauth::prompt::{confirm, prompt_password_hidden, prompt_string};
use xauth::qr::PasteScanner;
use xauth::refs::JsonRefList;
use xauth::session::get_master_key_with_cache;
use xauth::{Algorithm, App, NewToken, PasscodeType, TokenKind};

type Session = App<FileKeychain, JsonRefList>;

#[derive(Parser, Debug)]
#[command(name = "xauth", version, about = "HOTP/TOTP authenticator with an encrypted token store")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize the token store
    Init,

    /// Add a token by hand; the secret is prompted for
    Add {
        #[arg(long)]
        issuer: Option<String>,
        #[arg(long)]
        account: Option<String>,
        /// Counter-based (HOTP) instead of time-based
        #[arg(long)]
        hotp: bool,
        /// SHA1, SHA256 or SHA512
        #[arg(long, value_parser = parse_algorithm)]
        algorithm: Option<Algorithm>,
        #[arg(long)]
        digits: Option<u32>,
    },

    /// Add a token from a pasted otpauth:// URL (QR code contents)
    Scan,

    /// List passcodes
    ///
    /// Examples:
    ///   xauth ls
    ///   xauth ls github
    Ls {
        /// Only issuers or accounts containing this text
        filter: Option<String>,
    },

    /// Copy a passcode to the clipboard
    Clip {
        /// Position as shown by `xauth ls`
        position: usize,
    },

    /// Change issuer and/or account of a token
    Edit {
        position: usize,
        #[arg(long)]
        issuer: Option<String>,
        #[arg(long)]
        account: Option<String>,
    },

    /// Delete tokens
    Rm {
        #[arg(required = true)]
        positions: Vec<usize>,
        /// Do not ask for confirmation
        #[arg(long, short)]
        yes: bool,
    },

    /// Move tokens in front of the token at `--to` (use the list length for the end)
    Mv {
        #[arg(required = true)]
        positions: Vec<usize>,
        #[arg(long)]
        to: usize,
    },

    /// Keep printing passcodes, refreshed on every period boundary
    Watch {
        filter: Option<String>,
    },

    /// Interactive session (type `help` inside)
    Shell,
}

fn parse_algorithm(s: &str) -> Result<Algorithm, String> {
    Algorithm::parse(s).ok_or_else(|| format!("unknown algorithm '{s}', expected SHA1, SHA256 or SHA512"))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "xauth=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => cmd_init()?,
        Commands::Add {
            issuer,
            account,
            hotp,
            algorithm,
            digits,
        } => cmd_add(issuer, account, hotp, algorithm, digits)?,
        Commands::Scan => cmd_scan()?,
        Commands::Ls { filter } => cmd_ls(filter)?,
        Commands::Clip { position } => cmd_clip(position)?,
        Commands::Edit {
            position,
            issuer,
            account,
        } => cmd_edit(position, issuer, account)?,
        Commands::Rm { positions, yes } => cmd_rm(&positions, yes)?,
        Commands::Mv { positions, to } => cmd_mv(&positions, to)?,
        Commands::Watch { filter } => cmd_watch(filter)?,
        Commands::Shell => cmd_shell()?,
    }

    Ok(())
}

fn cmd_init() -> anyhow::Result<()> {
    let root = store_root()?;
    let config_path = config_path()?;
    if config_path.exists() {
        println!("Store already exists at: {}", root.display());
        return Ok(());
    }

    std::fs::create_dir_all(&root)?;
    let master_password = prompt_password_hidden("New master password: ")?;
    let repeated = prompt_password_hidden("Confirm master password: ")?;
    if master_password != repeated {
        anyhow::bail!("Passwords do not match");
    }

    let config = generate_new_config(&master_password)?;
    save_config(&config, &config_path)?;

    println!("Initialized store at {}", root.display());
    Ok(())
}

fn open_app() -> anyhow::Result<Session> {
    open_app_with(|_| {})
}

/// Unlock the store and load every token, with `adjust` applied to the
/// configured defaults for new tokens.
fn open_app_with(adjust: impl FnOnce(&mut TokenDefaults)) -> anyhow::Result<Session> {
    let root = store_root()?;
    let config = Config::load_from(&root.join("config.json"))
        .with_context(|| format!("No store at {}, run `xauth init` first", root.display()))?;
    let mk = get_master_key_with_cache(&config, &root)?;

    let mut defaults = config.defaults.clone();
    adjust(&mut defaults);

    let mut app = App::new(
        FileKeychain::new(&root, mk),
        JsonRefList::new(&root),
        Box::new(SystemClock),
        defaults,
    );
    app.setup();
    Ok(app)
}

fn id_at(app: &Session, position: usize) -> anyhow::Result<Uuid> {
    app.id_at(position)
        .ok_or_else(|| anyhow!("No token at position {position}"))
}

fn label(issuer: &str, account: &str) -> String {
    if issuer.is_empty() {
        account.to_string()
    } else {
        format!("{issuer} ({account})")
    }
}

fn print_passcodes(app: &Session, now: OffsetDateTime) {
    let passcodes = app.passcodes();
    if passcodes.is_empty() {
        println!("No tokens.");
        return;
    }

    for p in passcodes {
        let position = app.position(p.id).unwrap_or_default();
        let left = match app.lookup(p.id).map(|otp| otp.token.kind) {
            Some(TokenKind::TimeStep(period)) => format!("{:>3}s", seconds_remaining(now, period)),
            _ => "hotp".to_string(),
        };
        println!("{position:>3}  {:<9} {left}  {}", p.text, label(&p.issuer, &p.account));
    }
}

fn cmd_add(
    issuer: Option<String>,
    account: Option<String>,
    hotp: bool,
    algorithm: Option<Algorithm>,
    digits: Option<u32>,
) -> anyhow::Result<()> {
    let mut app = open_app_with(|defaults| {
        if let Some(algorithm) = algorithm {
            defaults.algorithm = algorithm;
        }
        if let Some(digits) = digits {
            defaults.digits = digits;
        }
    })?;

    let issuer = match issuer {
        Some(issuer) => issuer,
        None => prompt_string("Issuer: ")?,
    };
    let account = match account {
        Some(account) => account,
        None => prompt_string("Account: ")?,
    };
    let key = prompt_password_hidden("Secret (base32): ")?;

    let form = NewToken {
        issuer,
        account,
        key,
        kind: if hotp { PasscodeType::Hotp } else { PasscodeType::Totp },
    };
    let id = app.add_token(form).into_result()?;

    if let Some(p) = app.passcode(id) {
        println!("Added {}: {}", label(&p.issuer, &p.account), p.text);
    }
    Ok(())
}

fn cmd_scan() -> anyhow::Result<()> {
    let mut app = open_app()?;
    scan_into(&mut app)
}

fn scan_into(app: &mut Session) -> anyhow::Result<()> {
    match app.scan(&mut PasteScanner).into_result()? {
        Some(id) => {
            if let Some(p) = app.passcode(id) {
                println!("Added {}: {}", label(&p.issuer, &p.account), p.text);
            }
        }
        None => println!("Nothing scanned."),
    }
    Ok(())
}

fn cmd_ls(filter: Option<String>) -> anyhow::Result<()> {
    let mut app = open_app()?;
    app.set_filter(filter.unwrap_or_default());
    print_passcodes(&app, SystemClock.now());
    Ok(())
}

fn cmd_clip(position: usize) -> anyhow::Result<()> {
    let app = open_app()?;
    clip(&app, position)
}

fn clip(app: &Session, position: usize) -> anyhow::Result<()> {
    let id = id_at(app, position)?;
    let p = app
        .passcode(id)
        .ok_or_else(|| anyhow!("No passcode for position {position}"))?;
    copy_to_clipboard(&p.text)?;
    println!("Passcode for {} copied to clipboard.", label(&p.issuer, &p.account));
    Ok(())
}

fn cmd_edit(position: usize, issuer: Option<String>, account: Option<String>) -> anyhow::Result<()> {
    let mut app = open_app()?;
    edit(&mut app, position, issuer, account)
}

/// Labels not given are asked for; an empty answer keeps the current one.
fn edit(
    app: &mut Session,
    position: usize,
    issuer: Option<String>,
    account: Option<String>,
) -> anyhow::Result<()> {
    let id = id_at(app, position)?;
    let (current_issuer, current_account) = match app.lookup(id) {
        Some(otp) => (otp.token.issuer.clone(), otp.token.account.clone()),
        None => anyhow::bail!("No token at position {position}"),
    };

    let ask_all = issuer.is_none() && account.is_none();
    let ask = |name: &str, current: String| -> anyhow::Result<String> {
        let answer = prompt_string(&format!("{name} [{current}]: "))?;
        Ok(if answer.trim().is_empty() { current } else { answer })
    };
    let issuer = match issuer {
        Some(issuer) => issuer,
        None if ask_all => ask("Issuer", current_issuer)?,
        None => current_issuer,
    };
    let account = match account {
        Some(account) => account,
        None if ask_all => ask("Account", current_account)?,
        None => current_account,
    };

    app.edit(id, &issuer, &account).into_result()?;
    println!("Updated {}", label(&issuer, &account));
    Ok(())
}

fn cmd_rm(positions: &[usize], yes: bool) -> anyhow::Result<()> {
    let mut app = open_app()?;
    remove(&mut app, positions, yes)
}

fn remove(app: &mut Session, positions: &[usize], yes: bool) -> anyhow::Result<()> {
    for &position in positions {
        let id = id_at(app, position)?;
        if let Some(otp) = app.lookup(id) {
            println!("  {position:>3}  {}", label(&otp.token.issuer, &otp.token.account));
        }
    }
    println!("This action cannot be undone.");
    if !yes && !confirm("Delete?")? {
        println!("Cancelled.");
        return Ok(());
    }

    let removed = app.delete(positions).into_result()?;
    println!("Deleted {removed} token(s).");
    Ok(())
}

fn cmd_mv(positions: &[usize], to: usize) -> anyhow::Result<()> {
    let mut app = open_app()?;
    app.move_items(positions, to).into_result()?;
    print_passcodes(&app, SystemClock.now());
    Ok(())
}

fn cmd_watch(filter: Option<String>) -> anyhow::Result<()> {
    let mut app = open_app()?;
    app.set_filter(filter.unwrap_or_default());

    loop {
        let now = SystemClock.now();
        app.update_time(now);
        println!("-- {} --", now.format(format_description!("[hour]:[minute]:[second]"))?);
        print_passcodes(&app, now);

        let Some(next) = next_refresh(&app, now) else {
            return Ok(());
        };
        let wait = std::time::Duration::try_from(next - now).unwrap_or(std::time::Duration::from_secs(1));
        std::thread::sleep(wait);
    }
}

/// Earliest period boundary among the time-based tokens.
fn next_refresh(app: &Session, now: OffsetDateTime) -> Option<OffsetDateTime> {
    app.tokens()
        .ids()
        .iter()
        .filter_map(|id| match app.lookup(*id)?.token.kind {
            TokenKind::TimeStep(period) => Some(next_tick(now, period)),
            TokenKind::Counter(_) => None,
        })
        .min()
}

const SHELL_HELP: &str = "\
commands:
  ls                      list passcodes (honours the filter)
  filter [text]           show only matching issuers/accounts; no text clears it
  next <n>                next passcode of a counter-based token
  clip <n>                copy passcode to the clipboard
  edit <n>                change issuer/account
  rm <n>...               delete tokens
  mv <n>... to <m>        move tokens in front of position m
  scan                    add a token from an otpauth:// URL
  quit";

fn cmd_shell() -> anyhow::Result<()> {
    let mut app = open_app()?;
    let stdin = io::stdin();

    loop {
        print!("xauth> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            println!();
            return Ok(());
        }

        app.update_time(SystemClock.now());
        let words: Vec<&str> = line.split_whitespace().collect();
        match run_shell_command(&mut app, &words) {
            Ok(true) => continue,
            Ok(false) => return Ok(()),
            Err(e) => eprintln!("error: {e:#}"),
        }
    }
}

/// Returns `false` when the session should end.
fn run_shell_command(app: &mut Session, words: &[&str]) -> anyhow::Result<bool> {
    let Some((&command, args)) = words.split_first() else {
        return Ok(true);
    };

    match command {
        "ls" => print_passcodes(app, SystemClock.now()),
        "filter" => {
            app.set_filter(args.join(" "));
            print_passcodes(app, SystemClock.now());
        }
        "next" => {
            let id = id_at(app, single_position(args)?)?;
            let p = app.increment_counter(id).into_result()?;
            println!("{}  {}", p.text, label(&p.issuer, &p.account));
        }
        "clip" => clip(app, single_position(args)?)?,
        "edit" => edit(app, single_position(args)?, None, None)?,
        "rm" => remove(app, &parse_positions(args)?, false)?,
        "mv" => {
            let (sources, destination) = parse_move(args)?;
            app.move_items(&sources, destination).into_result()?;
            print_passcodes(app, SystemClock.now());
        }
        "scan" => scan_into(app)?,
        "help" | "?" => println!("{SHELL_HELP}"),
        "quit" | "exit" | "q" => return Ok(false),
        other => println!("unknown command '{other}', try `help`"),
    }
    Ok(true)
}

fn parse_positions(args: &[&str]) -> anyhow::Result<Vec<usize>> {
    if args.is_empty() {
        anyhow::bail!("expected at least one position");
    }
    args.iter()
        .map(|arg| {
            arg.parse::<usize>()
                .map_err(|_| anyhow!("'{arg}' is not a position"))
        })
        .collect()
}

fn single_position(args: &[&str]) -> anyhow::Result<usize> {
    match parse_positions(args)?.as_slice() {
        [position] => Ok(*position),
        _ => anyhow::bail!("expected exactly one position"),
    }
}

/// `<n>... to <m>`
fn parse_move(args: &[&str]) -> anyhow::Result<(Vec<usize>, usize)> {
    let Some(split) = args.iter().position(|arg| *arg == "to") else {
        anyhow::bail!("usage: mv <n>... to <m>");
    };
    let sources = parse_positions(&args[..split])?;
    let destination = single_position(&args[split + 1..])?;
    Ok((sources, destination))
}
