//! splat - Scripted platform driver
//!
//! Entry point that handles CLI argument parsing, binds the requested
//! scripted platform class and runs either one-shot commands or the REPL.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use scripted_platform::core::{Dictionary, ExecutionContext, StructuredValue};
use scripted_platform::platform::{ScriptedPlatform, ScriptedPlatformInterface, DEFAULT_SESSION_DICTIONARY};
use scripted_platform::script::{FixturePlatform, HandlerRegistry, PythonBridge, ScriptBridge};
use scripted_platform::ui::cli::{
    execute_command, parse_command, parse_construction_arg, run_cli, CommandOutcome,
};

/// splat: drive a debugger platform implemented by a scripted object
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Handler class to instantiate ("module.Class" for Python scripts)
    #[arg(long, default_value = FixturePlatform::CLASS_NAME)]
    class: String,

    /// Python script defining the handler class (requires the "python" feature)
    #[arg(short, long)]
    script: Option<String>,

    /// Namespace unqualified class names are resolved in
    #[arg(long, default_value = DEFAULT_SESSION_DICTIONARY)]
    session: String,

    /// JSON process table for the fixture platform
    #[arg(short, long)]
    processes: Option<String>,

    /// Construction argument passed to the handler (KEY=VALUE, repeatable)
    #[arg(short = 'a', long = "arg", value_parser = parse_construction_arg)]
    args: Vec<(String, StructuredValue)>,

    /// Run a command and exit instead of starting the REPL (repeatable)
    #[arg(short, long)]
    command: Vec<String>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    // 1. Parse command line arguments
    let args = Args::parse();

    // 2. Initialize logger with verbosity level
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(
        match args.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        },
    ))
    .init();

    log::debug!("Class: {}", args.class);
    log::debug!("Script: {:?}", args.script);

    // 3. Pick the bridge that creates the handler object
    let bridge: Arc<dyn ScriptBridge> = match &args.script {
        Some(path) => {
            let mut python = PythonBridge::new();
            python.initialize()?;
            let module = python.load_script(path)?;
            log::info!("Loaded {} as module {}", path, module);
            Arc::new(python)
        }
        None => Arc::new(HandlerRegistry::with_builtins()),
    };

    let mut construction_args: Dictionary = args.args.into_iter().collect();
    if let Some(path) = args.processes {
        construction_args.insert("path", path);
    }

    let mut interface = ScriptedPlatformInterface::new(bridge);
    interface.set_session_dictionary(args.session.as_str());

    let platform = ScriptedPlatform::with_interface(
        interface,
        &args.class,
        &ExecutionContext::new(),
        Some(&construction_args),
    )
    .with_context(|| format!("could not bind platform class '{}'", args.class))?;

    // 4. Run one-shot commands or the interactive REPL
    if args.command.is_empty() {
        println!("[*] splat v{} - {}", env!("CARGO_PKG_VERSION"), platform.class_name());
        run_cli(&platform)?;
    } else {
        let mut failed = 0;
        for command in &args.command {
            match execute_command(&platform, parse_command(command)) {
                CommandOutcome::Continue => {}
                CommandOutcome::Failed => failed += 1,
                CommandOutcome::Quit => break,
            }
        }
        if failed > 0 {
            anyhow::bail!("{} of {} command(s) failed", failed, args.command.len());
        }
    }

    Ok(())
}
