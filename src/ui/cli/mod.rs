//! CLI - reedline-based REPL interface
//!
//! Drives a `ScriptedPlatform` interactively: list and inspect processes,
//! attach, launch and kill through the bound scripted object.

use anyhow::Result;
use colored::Colorize;
use reedline::{Prompt, PromptHistorySearch, PromptHistorySearchStatus, Reedline, Signal};
use std::borrow::Cow;

use crate::core::{Pid, ProcessAttachInfo, ProcessInstanceInfo, ProcessLaunchInfo, Status, StructuredValue};
use crate::platform::ScriptedPlatform;

/// Custom prompt showing the bound platform class
pub struct PlatformPrompt {
    class_name: String,
}

impl PlatformPrompt {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
        }
    }
}

impl Prompt for PlatformPrompt {
    fn render_prompt_left(&self) -> Cow<'_, str> {
        Cow::Owned(format!("[platform:{}]", self.class_name))
    }

    fn render_prompt_right(&self) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_indicator(&self, _prompt_mode: reedline::PromptEditMode) -> Cow<'_, str> {
        Cow::Borrowed("> ")
    }

    fn render_prompt_multiline_indicator(&self) -> Cow<'_, str> {
        Cow::Borrowed("... ")
    }

    fn render_prompt_history_search_indicator(
        &self,
        history_search: PromptHistorySearch,
    ) -> Cow<'_, str> {
        let prefix = match history_search.status {
            PromptHistorySearchStatus::Passing => "",
            PromptHistorySearchStatus::Failing => "(failed) ",
        };
        Cow::Owned(format!("(search: {}{}) ", prefix, history_search.term))
    }
}

/// Command parsing result
#[derive(Debug, PartialEq)]
pub enum ParsedCommand {
    /// List processes: ps [filter]
    ListProcesses(Option<String>),
    /// Show one process: info <pid>
    ProcessInfo(Pid),
    /// Attach by pid: attach <pid>
    AttachPid(Pid),
    /// Attach by name: attach -n <name> [--waitfor]
    AttachName { name: String, wait_for_launch: bool },
    /// Launch: launch <path> [args...]
    Launch { path: String, args: Vec<String> },
    /// Kill: kill <pid>
    Kill(Pid),
    /// Dump the raw process list: raw ps
    RawList,
    /// Dump the raw process info: raw info <pid>
    RawInfo(Pid),
    /// Help: ? or help
    Help,
    /// Quit: q or exit
    Quit,
    /// Unknown command
    Unknown(String),
}

/// Parse a command string into a structured command
pub fn parse_command(input: &str) -> ParsedCommand {
    let input = input.trim();
    let mut words = input.split_whitespace();
    let cmd = words.next().unwrap_or("");
    let rest: Vec<&str> = words.collect();

    let pid_arg = |idx: usize| rest.get(idx).and_then(|s| parse_pid(s).ok());

    match cmd {
        "ps" | "list" => ParsedCommand::ListProcesses(rest.first().map(|s| s.to_string())),
        "info" => match pid_arg(0) {
            Some(pid) => ParsedCommand::ProcessInfo(pid),
            None => ParsedCommand::Unknown(input.to_string()),
        },
        "attach" => match rest.as_slice() {
            ["-n", name, flags @ ..] => ParsedCommand::AttachName {
                name: name.to_string(),
                wait_for_launch: flags.contains(&"--waitfor"),
            },
            [pid] => match parse_pid(pid) {
                Ok(pid) => ParsedCommand::AttachPid(pid),
                Err(_) => ParsedCommand::Unknown(input.to_string()),
            },
            _ => ParsedCommand::Unknown(input.to_string()),
        },
        "launch" | "run" => match rest.split_first() {
            Some((path, args)) => ParsedCommand::Launch {
                path: path.to_string(),
                args: args.iter().map(|s| s.to_string()).collect(),
            },
            None => ParsedCommand::Unknown(input.to_string()),
        },
        "kill" => match pid_arg(0) {
            Some(pid) => ParsedCommand::Kill(pid),
            None => ParsedCommand::Unknown(input.to_string()),
        },
        "raw" => match rest.first().copied() {
            Some("ps") | Some("list") => ParsedCommand::RawList,
            Some("info") => match pid_arg(1) {
                Some(pid) => ParsedCommand::RawInfo(pid),
                None => ParsedCommand::Unknown(input.to_string()),
            },
            _ => ParsedCommand::Unknown(input.to_string()),
        },
        "?" | "help" => ParsedCommand::Help,
        "q" | "quit" | "exit" => ParsedCommand::Quit,
        _ => ParsedCommand::Unknown(input.to_string()),
    }
}

/// Parse a pid (supports 0x prefix and decimal)
fn parse_pid(s: &str) -> Result<Pid, std::num::ParseIntError> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Pid::from_str_radix(hex, 16)
    } else {
        s.parse()
    }
}

/// Parse a `KEY=VALUE` construction argument.
///
/// Integers and `true`/`false` are typed; everything else is a string.
pub fn parse_construction_arg(s: &str) -> Result<(String, StructuredValue), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    if key.is_empty() {
        return Err(format!("empty key in '{}'", s));
    }

    let value = if let Ok(i) = value.parse::<i64>() {
        StructuredValue::Integer(i)
    } else if let Ok(b) = value.parse::<bool>() {
        StructuredValue::Boolean(b)
    } else {
        StructuredValue::String(value.to_string())
    };

    Ok((key.to_string(), value))
}

/// Print the help message
fn print_help() {
    println!("{}", "Scripted Platform Commands".bold().cyan());
    println!("{}", "═".repeat(50).cyan());

    println!("\n{}", "Processes:".bold().yellow());
    println!("  {}        List processes", "ps [filter]".green());
    println!("  {}         Show process details", "info <pid>".green());

    println!("\n{}", "Control:".bold().yellow());
    println!("  {}       Attach to a process", "attach <pid>".green());
    println!("  {}  Attach by name", "attach -n <name>".green());
    println!("  {}  Launch a process", "launch <path> ...".green());
    println!("  {}         Kill a process", "kill <pid>".green());

    println!("\n{}", "Raw:".bold().yellow());
    println!("  {}            Dump the process list", "raw ps".green());
    println!("  {}     Dump one process entry", "raw info <pid>".green());

    println!("\n{}", "Other:".bold().yellow());
    println!("  {}                 Show this help", "?".green());
    println!("  {}                 Quit", "q".green());
}

fn print_process(info: &ProcessInstanceInfo) {
    println!(
        "  {:>8}  {:<24} {}",
        info.pid.to_string().green(),
        info.name,
        info.arch.as_deref().unwrap_or("-").dimmed()
    );
}

fn print_status(action: &str, status: &Status) -> CommandOutcome {
    match status.message() {
        None => {
            println!("[*] {} succeeded", action);
            CommandOutcome::Continue
        }
        Some(msg) => {
            println!("{} {} failed: {}", "[!]".red(), action, msg);
            CommandOutcome::Failed
        }
    }
}

fn print_error(err: impl std::fmt::Display) -> CommandOutcome {
    println!("{} {}", "[!]".red(), err);
    CommandOutcome::Failed
}

fn print_json(value: StructuredValue) -> CommandOutcome {
    match serde_json::to_string_pretty(&value.to_json()) {
        Ok(text) => {
            println!("{}", text);
            CommandOutcome::Continue
        }
        Err(e) => print_error(format!("Could not render value: {}", e)),
    }
}

/// Result of running one command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Continue,
    /// The command ran but the platform reported an error
    Failed,
    Quit,
}

/// Execute a parsed command
pub fn execute_command(platform: &ScriptedPlatform, cmd: ParsedCommand) -> CommandOutcome {
    match cmd {
        ParsedCommand::ListProcesses(filter) => match platform.find_processes(filter.as_deref()) {
            Ok(processes) => {
                println!("[*] {} process(es)", processes.len());
                for info in &processes {
                    print_process(info);
                }
                CommandOutcome::Continue
            }
            Err(e) => print_error(e),
        },
        ParsedCommand::ProcessInfo(pid) => match platform.get_process_info(pid) {
            Ok(info) => {
                print_process(&info);
                if let (Some(uid), Some(gid)) = (info.uid, info.gid) {
                    println!("            uid={} gid={}", uid, gid);
                }
                if let Some(parent) = info.parent_pid {
                    println!("            parent={}", parent);
                }
                if !info.args.is_empty() {
                    println!("            args={}", info.args.join(" "));
                }
                CommandOutcome::Continue
            }
            Err(e) => print_error(e),
        },
        ParsedCommand::AttachPid(pid) => print_status(
            &format!("Attach to {}", pid),
            &platform.attach(&ProcessAttachInfo::by_pid(pid)),
        ),
        ParsedCommand::AttachName {
            name,
            wait_for_launch,
        } => {
            let mut info = ProcessAttachInfo::by_name(name.as_str());
            info.wait_for_launch = wait_for_launch;
            print_status(&format!("Attach to '{}'", name), &platform.attach(&info))
        }
        ParsedCommand::Launch { path, args } => {
            let info = ProcessLaunchInfo::new(&path).with_args(args);
            print_status(&format!("Launch {}", path), &platform.launch(&info))
        }
        ParsedCommand::Kill(pid) => print_status(&format!("Kill {}", pid), &platform.kill(pid)),
        ParsedCommand::RawList => match platform.interface().list_processes() {
            Ok(dict) => print_json(dict.into()),
            Err(e) => print_error(e),
        },
        ParsedCommand::RawInfo(pid) => match platform.interface().get_process_info(pid) {
            Ok(dict) => print_json(dict.into()),
            Err(e) => print_error(e),
        },
        ParsedCommand::Help => {
            print_help();
            CommandOutcome::Continue
        }
        ParsedCommand::Quit => {
            println!("[*] Shutting down...");
            CommandOutcome::Quit
        }
        ParsedCommand::Unknown(input) => {
            println!("{} Unknown command: '{}'", "[!]".red(), input);
            println!("    Type '?' for help");
            CommandOutcome::Failed
        }
    }
}

/// Run the CLI REPL
pub fn run_cli(platform: &ScriptedPlatform) -> Result<()> {
    let mut line_editor = Reedline::create();
    let prompt = PlatformPrompt::new(platform.class_name());

    println!(
        "{}",
        "╔══════════════════════════════════════════════════════════════╗".cyan()
    );
    println!(
        "{}",
        "║  Scripted Platform CLI - Type '?' for help, 'q' to quit      ║".cyan()
    );
    println!(
        "{}",
        "╚══════════════════════════════════════════════════════════════╝".cyan()
    );

    loop {
        let sig = line_editor.read_line(&prompt)?;
        match sig {
            Signal::Success(buffer) => {
                let input = buffer.trim();
                if input.is_empty() {
                    continue;
                }

                if execute_command(platform, parse_command(input)) == CommandOutcome::Quit {
                    break;
                }
            }
            Signal::CtrlD | Signal::CtrlC => {
                println!("\n[*] Interrupted");
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_process_commands() {
        assert_eq!(parse_command("ps"), ParsedCommand::ListProcesses(None));
        assert_eq!(
            parse_command("list bash"),
            ParsedCommand::ListProcesses(Some("bash".into()))
        );
        assert_eq!(parse_command("info 1234"), ParsedCommand::ProcessInfo(1234));
        assert_eq!(parse_command("kill 0x10"), ParsedCommand::Kill(16));
        assert_eq!(parse_command("raw info 7"), ParsedCommand::RawInfo(7));
        assert_eq!(parse_command("raw ps"), ParsedCommand::RawList);
    }

    #[test]
    fn test_parse_attach() {
        assert_eq!(parse_command("attach 99"), ParsedCommand::AttachPid(99));
        assert_eq!(
            parse_command("attach -n a.out --waitfor"),
            ParsedCommand::AttachName {
                name: "a.out".into(),
                wait_for_launch: true
            }
        );
        assert!(matches!(parse_command("attach"), ParsedCommand::Unknown(_)));
        assert!(matches!(parse_command("attach x"), ParsedCommand::Unknown(_)));
    }

    #[test]
    fn test_parse_launch() {
        assert_eq!(
            parse_command("launch /bin/ls -l /tmp"),
            ParsedCommand::Launch {
                path: "/bin/ls".into(),
                args: vec!["-l".into(), "/tmp".into()]
            }
        );
        assert!(matches!(parse_command("launch"), ParsedCommand::Unknown(_)));
    }

    #[test]
    fn test_parse_misc() {
        assert_eq!(parse_command("?"), ParsedCommand::Help);
        assert_eq!(parse_command("  q "), ParsedCommand::Quit);
        assert_eq!(
            parse_command("frobnicate"),
            ParsedCommand::Unknown("frobnicate".into())
        );
        assert!(matches!(parse_command("info abc"), ParsedCommand::Unknown(_)));
    }

    #[test]
    fn test_parse_construction_arg() {
        assert_eq!(
            parse_construction_arg("path=procs.json"),
            Ok(("path".into(), StructuredValue::String("procs.json".into())))
        );
        assert_eq!(
            parse_construction_arg("limit=5"),
            Ok(("limit".into(), StructuredValue::Integer(5)))
        );
        assert_eq!(
            parse_construction_arg("verbose=true"),
            Ok(("verbose".into(), StructuredValue::Boolean(true)))
        );
        assert!(parse_construction_arg("novalue").is_err());
        assert!(parse_construction_arg("=x").is_err());
    }

    #[test]
    fn test_command_outcomes() {
        use crate::core::{Dictionary, ExecutionContext};
        use crate::script::HandlerRegistry;
        use std::sync::Arc;

        let args = Dictionary::new().with(
            "processes",
            Dictionary::new().with("42", Dictionary::new().with("name", "init")),
        );
        let platform = ScriptedPlatform::create(
            Arc::new(HandlerRegistry::with_builtins()),
            "FixturePlatform",
            &ExecutionContext::new(),
            Some(&args),
        )
        .unwrap();

        assert_eq!(execute_command(&platform, parse_command("info 42")), CommandOutcome::Continue);
        assert_eq!(execute_command(&platform, parse_command("info 43")), CommandOutcome::Failed);
        assert_eq!(execute_command(&platform, parse_command("kill 43")), CommandOutcome::Failed);
        assert_eq!(execute_command(&platform, parse_command("bogus")), CommandOutcome::Failed);
        assert_eq!(execute_command(&platform, parse_command("kill 42")), CommandOutcome::Continue);
        assert_eq!(execute_command(&platform, parse_command("q")), CommandOutcome::Quit);
    }
}
