use std::path::PathBuf;
use std::{fs, process};

use anyhow::{anyhow, bail, Context as _};
use colored::Colorize;

use factom_identity::engine::Memory;
use factom_identity::{ChainId, Config, Controller, Fetcher};
use factom_identity_api::{Client, DEFAULT_ADDRESS};

mod logger;

pub const HELP: &str = r#"
Usage

   factom-identity [--all | --id <hex>] [<option>...]

   Resolve Factom identities from the ledger of a factomd node and print
   them as JSON.

Options

    --all                   Resolve every registered identity
    --id <hex>              Resolve the identity with this root chain id (888888...)
    -s, --server <addr>     Address of the factomd node (default: localhost:8088)
    -p, --pretty            Indent the output
    -l, --log <level>       debug, info, warn, error or none (default: none)
    --config <path>         JSON configuration file
    --workers <n>           Threads walking chains concurrently with --all
    -h, --help              Print help
"#;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    All,
    Identity(ChainId),
}

#[derive(Debug)]
struct Options {
    target: Target,
    server: String,
    pretty: bool,
    log: Option<log::Level>,
    config: Option<PathBuf>,
    workers: Option<usize>,
}

impl Options {
    fn from_env() -> Result<Self, anyhow::Error> {
        Self::parse(lexopt::Parser::from_env())
    }

    fn parse(mut parser: lexopt::Parser) -> Result<Self, anyhow::Error> {
        use lexopt::prelude::*;

        let mut target = None;
        let mut server = String::from(DEFAULT_ADDRESS);
        let mut pretty = false;
        let mut log = None;
        let mut config = None;
        let mut workers = None;

        while let Some(arg) = parser.next()? {
            match arg {
                Long("all") => {
                    target = Some(Target::All);
                }
                Long("id") => {
                    let value = parser.value()?;
                    let root = value
                        .parse::<ChainId>()
                        .with_context(|| format!("invalid root chain id {value:?}"))?;
                    target = Some(Target::Identity(root));
                }
                Short('s') | Long("server") => {
                    server = parser.value()?.parse()?;
                }
                Short('p') | Long("pretty") => {
                    pretty = true;
                }
                Short('l') | Long("log") => {
                    let value: String = parser.value()?.parse()?;
                    log = logger::level(&value)
                        .ok_or_else(|| anyhow!("invalid log level '{value}'"))?;
                }
                Long("config") => {
                    config = Some(PathBuf::from(parser.value()?));
                }
                Long("workers") => {
                    workers = Some(parser.value()?.parse()?);
                }
                Short('h') | Long("help") => {
                    println!("{HELP}");
                    process::exit(0);
                }
                _ => return Err(anyhow!(arg.unexpected())),
            }
        }
        let Some(target) = target else {
            bail!("either `--all` or `--id <hex>` must be given, see `--help`");
        };

        Ok(Self {
            target,
            server,
            pretty,
            log,
            config,
            workers,
        })
    }
}

fn main() {
    let options = match Options::from_env() {
        Ok(options) => options,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            process::exit(2);
        }
    };
    if let Some(level) = options.log {
        if let Err(err) = logger::init(level) {
            eprintln!("{} {err}", "error:".red().bold());
        }
    }
    if let Err(err) = execute(options) {
        eprintln!("{} {err:#}", "error:".red().bold());
        process::exit(1);
    }
}

fn execute(options: Options) -> anyhow::Result<()> {
    let mut config = match &options.config {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            serde_json::from_str::<Config>(&json)
                .with_context(|| format!("invalid config {}", path.display()))?
        }
        None => Config::default(),
    };
    if let Some(workers) = options.workers {
        config.workers = workers;
    }

    let client = Client::new(&options.server)?;
    if !client.is_alive() {
        bail!("factomd at {} is not reachable", options.server);
    }
    let mut ctrl = Controller::new(client, Memory::new(), config);
    let output = resolve(&mut ctrl, &options.target)?;

    if options.pretty {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", serde_json::to_string(&output)?);
    }
    Ok(())
}

/// Resolve `target`, returning the JSON to print.
fn resolve<F>(ctrl: &mut Controller<F, Memory>, target: &Target) -> anyhow::Result<serde_json::Value>
where
    F: Fetcher + Sync,
{
    match target {
        Target::Identity(root) => {
            let id = ctrl.find_identity(root)?;
            Ok(serde_json::to_value(id)?)
        }
        Target::All => {
            let resolved = ctrl.find_all()?;
            for (root, err) in &resolved.failures {
                eprintln!(
                    "{} failed to resolve identity {root}: {err}",
                    "warning:".yellow().bold()
                );
            }
            Ok(serde_json::to_value(resolved.identities)?)
        }
    }
}
