pub mod commands;
pub mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use swaig_core::config::{AppConfig, ConfigOverrides, LoadOptions};

#[derive(Debug, Parser)]
#[command(
    name = "swaig-test",
    about = "Local test harness for SWAIG DataMap functions",
    long_about = "Execute, list, and validate DataMap function definitions locally, the way the platform would evaluate them.",
    after_help = "Examples:\n  swaig-test exec --file functions.json --function get_weather --args '{\"city\":\"Austin\"}'\n  swaig-test list --file functions.json\n  swaig-test validate --file functions.json --json\n  swaig-test config"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a swaig.toml config file")]
    config: Option<PathBuf>,
    #[arg(short, long, global = true, help = "Log every pipeline step at debug level to stderr")]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Execute one DataMap function with JSON arguments")]
    Exec {
        #[arg(long, help = "JSON file holding one definition, a list, or {\"functions\": [...]}")]
        file: PathBuf,
        #[arg(long, help = "Name of the function to execute")]
        function: String,
        #[arg(long, help = "Function arguments as a JSON object")]
        args: Option<String>,
        #[arg(long, help = "Per-webhook timeout override in seconds")]
        timeout_secs: Option<u64>,
    },
    #[command(about = "List the functions found in a definitions file")]
    List {
        #[arg(long)]
        file: PathBuf,
    },
    #[command(about = "Check every DataMap definition in a file for structural problems")]
    Validate {
        #[arg(long)]
        file: PathBuf,
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let log_config = AppConfig::load(LoadOptions {
        config_path: cli.config.clone(),
        overrides: ConfigOverrides::default(),
        ..LoadOptions::default()
    })
    .ok();
    logging::init(log_config.as_ref(), cli.verbose);

    let result = match cli.command {
        Command::Exec { file, function, args, timeout_secs } => {
            commands::exec::run(commands::exec::ExecOptions {
                file,
                function,
                args,
                timeout_secs,
                config_path: cli.config,
            })
        }
        Command::List { file } => commands::list::run(&file),
        Command::Validate { file, json } => commands::validate::run(&file, json),
        Command::Config => commands::CommandResult {
            exit_code: 0,
            output: commands::config::run(cli.config.as_deref()),
        },
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
