use anyhow::{anyhow, Context};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use clusterconf_admin::{ClientConfig, HttpAdminClient};
use clusterconf_session::error::{EXIT_CANCELLED, EXIT_INVALID};
use clusterconf_session::{
    render, report_exit_code, ApplyOutcome, AssumeYes, ConfigSession, Confirm, ExternalEditor, FileConfig,
    SessionConfig, SessionError, StdinConfirm,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn cli() -> Command {
    Command::new("clusterconf")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Inspect and change cluster-wide configuration")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("api-urls")
                .long("api-urls")
                .global(true)
                .env("CLUSTERCONF_API_URLS")
                .value_delimiter(',')
                .help("Comma-separated admin API addresses"),
        )
        .arg(
            Arg::new("tls-enabled")
                .long("tls-enabled")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Use HTTPS for the admin API"),
        )
        .arg(
            Arg::new("tls-cert")
                .long("tls-cert")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Client certificate (PEM)"),
        )
        .arg(
            Arg::new("tls-key")
                .long("tls-key")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Client private key (PEM)"),
        )
        .arg(
            Arg::new("tls-truststore")
                .long("tls-truststore")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Trusted CA certificate (PEM)"),
        )
        .arg(
            Arg::new("all")
                .long("all")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Include tunable properties"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Config file (default: ~/.config/clusterconf/config.toml)"),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .global(true)
                .value_parser(value_parser!(u64))
                .help("Seconds to wait for nodes to apply a change"),
        )
        .arg(
            Arg::new("yes")
                .long("yes")
                .short('y')
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Do not ask for confirmation"),
        )
        .arg(
            Arg::new("no-wait")
                .long("no-wait")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Return as soon as the change is accepted"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::Count)
                .help("More log output (-v info, -vv debug)"),
        )
        .subcommand(Command::new("edit").about("Edit cluster configuration in $EDITOR"))
        .subcommand(
            Command::new("import")
                .about("Replace cluster configuration with the contents of a file")
                .arg(file_arg(true)),
        )
        .subcommand(
            Command::new("export")
                .about("Write cluster configuration to a file (stdout if omitted)")
                .arg(file_arg(false)),
        )
        .subcommand(
            Command::new("lint")
                .about("Check a configuration file without applying it")
                .arg(file_arg(true))
                .arg(
                    Arg::new("remote")
                        .long("remote")
                        .action(ArgAction::SetTrue)
                        .help("Also validate with the control plane (dry run)"),
                ),
        )
        .subcommand(
            Command::new("set")
                .about("Set a single property (`set name value` or `set name=value`)")
                .arg(Arg::new("name").required(true))
                .arg(Arg::new("value").allow_hyphen_values(true)),
        )
        .subcommand(
            Command::new("get")
                .about("Print a single property")
                .arg(Arg::new("name").required(true))
                .arg(
                    Arg::new("reveal")
                        .long("reveal")
                        .action(ArgAction::SetTrue)
                        .help("Print secret values"),
                ),
        )
        .subcommand(
            Command::new("force-reset")
                .about("Reset overrides to their defaults, bypassing validation")
                .arg(Arg::new("names").num_args(0..).help("Only reset these properties")),
        )
        .subcommand(Command::new("status").about("Show per-node configuration status"))
}

fn file_arg(required: bool) -> Arg {
    Arg::new("file")
        .required(required)
        .value_parser(value_parser!(PathBuf))
}

fn init_tracing(verbosity: u8) {
    let default = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn client_config(mut config: ClientConfig, matches: &ArgMatches) -> ClientConfig {
    if let Some(hosts) = matches.get_many::<String>("api-urls") {
        config.hosts = hosts.cloned().collect();
    }
    if matches.get_flag("tls-enabled") {
        config.tls.enabled = true;
    }
    if let Some(cert) = matches.get_one::<PathBuf>("tls-cert") {
        config.tls.cert_file = Some(cert.clone());
        config.tls.enabled = true;
    }
    if let Some(key) = matches.get_one::<PathBuf>("tls-key") {
        config.tls.key_file = Some(key.clone());
        config.tls.enabled = true;
    }
    if let Some(ca) = matches.get_one::<PathBuf>("tls-truststore") {
        config.tls.ca_file = Some(ca.clone());
        config.tls.enabled = true;
    }
    config
}

fn session_config(mut config: SessionConfig, matches: &ArgMatches) -> SessionConfig {
    if matches.get_flag("all") {
        config.include_tunables = true;
    }
    if matches.get_flag("yes") {
        config.assume_yes = true;
    }
    if matches.get_flag("no-wait") {
        config.wait = false;
    }
    if let Some(secs) = matches.get_one::<u64>("timeout") {
        config = config.with_convergence_timeout(Duration::from_secs(*secs));
    }
    config
}

fn confirm_for(config: &SessionConfig) -> Box<dyn Confirm> {
    if config.assume_yes {
        Box::new(AssumeYes)
    } else {
        Box::new(StdinConfirm)
    }
}

fn print_outcome(outcome: &ApplyOutcome) -> i32 {
    match outcome {
        ApplyOutcome::NoChanges => println!("No changes to apply."),
        ApplyOutcome::Aborted => println!("Aborted, nothing was applied."),
        ApplyOutcome::Applied { patch, version, wait } => {
            println!(
                "Applied {} change(s); new configuration version is {version}.",
                patch.len()
            );
            print!("{}", render::wait(wait));
        }
    }
    outcome.exit_code()
}

fn required<'a>(args: &'a ArgMatches, id: &str) -> anyhow::Result<&'a String> {
    args.get_one::<String>(id).ok_or_else(|| anyhow!("missing <{id}>"))
}

async fn run(matches: &ArgMatches) -> anyhow::Result<i32> {
    let file = FileConfig::discover(matches.get_one::<PathBuf>("config").map(PathBuf::as_path))?;
    let client_config = client_config(file.admin, matches);
    let session_config = session_config(file.session, matches);

    let client = HttpAdminClient::new(&client_config).context("creating admin client")?;
    tracing::debug!(hosts = ?client.hosts(), "using admin API");

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted");
                cancel.cancel();
            }
        }
    });

    let confirm = confirm_for(&session_config);
    let session =
        ConfigSession::new(Arc::new(client), client_config.retry, session_config).with_cancellation(cancel.clone());

    match matches.subcommand() {
        Some(("edit", _)) => {
            let outcome = session.edit(&ExternalEditor::from_env(), confirm.as_ref()).await?;
            Ok(print_outcome(&outcome))
        }
        Some(("import", args)) => {
            let path = args
                .get_one::<PathBuf>("file")
                .ok_or_else(|| anyhow!("missing <file>"))?;
            let outcome = session.import(path, confirm.as_ref()).await?;
            Ok(print_outcome(&outcome))
        }
        Some(("export", args)) => {
            match args.get_one::<PathBuf>("file") {
                Some(path) => {
                    session.export_to(path).await?;
                    println!("Wrote configuration to {}", path.display());
                }
                None => print!("{}", session.export().await?),
            }
            Ok(0)
        }
        Some(("lint", args)) => {
            let path = args
                .get_one::<PathBuf>("file")
                .ok_or_else(|| anyhow!("missing <file>"))?;
            let report = session.lint(path, args.get_flag("remote")).await?;
            print!("{}", render::lint(&report));
            Ok(if report.is_clean() { 0 } else { EXIT_INVALID })
        }
        Some(("set", args)) => {
            let name = required(args, "name")?;
            let (name, value) = match args.get_one::<String>("value") {
                Some(value) => (name.as_str(), value.as_str()),
                None => name
                    .split_once('=')
                    .ok_or_else(|| anyhow!("expected `set <name> <value>` or `set <name>=<value>`"))?,
            };
            let outcome = session.set(name, value).await?;
            Ok(print_outcome(&outcome))
        }
        Some(("get", args)) => {
            let reading = session.get(required(args, "name")?, args.get_flag("reveal")).await?;
            println!("{}", render::reading(&reading));
            Ok(0)
        }
        Some(("force-reset", args)) => {
            let names: Vec<String> = args.get_many::<String>("names").into_iter().flatten().cloned().collect();
            let outcome = session.force_reset(&names, confirm.as_ref()).await?;
            Ok(print_outcome(&outcome))
        }
        Some(("status", _)) => {
            let report = session.status().await?;
            print!("{}", render::convergence(&report));
            Ok(if cancel.is_cancelled() {
                EXIT_CANCELLED
            } else {
                report_exit_code(&report)
            })
        }
        Some((other, _)) => Err(anyhow!("unknown command {other}")),
        None => Err(anyhow!("no command given")),
    }
}

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();
    init_tracing(matches.get_count("verbose"));

    let code = match run(&matches).await {
        Ok(code) => code,
        Err(e) => match e.downcast_ref::<SessionError>() {
            Some(session_error) => {
                eprintln!("error: {session_error}");
                session_error.exit_code()
            }
            None => {
                eprintln!("error: {e:#}");
                1
            }
        },
    };
    std::process::exit(code);
}
