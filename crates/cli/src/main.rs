// crates/cli/src/main.rs
//! `statusbar`: reads the session JSON on stdin, prints one line on stdout.
//!
//! Whatever happens the process exits 0 and prints exactly one line, empty
//! if nothing could be rendered, so the prompt is never broken.

use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::Parser;
use claude_statusbar_core::{build_status_line, Flags, Settings};

#[derive(Debug, Parser)]
#[command(name = "statusbar", version, about)]
struct Args {
    /// Hide the directory when it is the projects root
    #[arg(long)]
    short: bool,

    /// Skip the pull request and CI lookup
    #[arg(long)]
    no_pr: bool,

    /// Skip the diff line delta
    #[arg(long)]
    no_diff: bool,

    /// Skip transcript scanning (context usage, duration, summary prompt)
    #[arg(long)]
    no_transcript: bool,

    /// Disable colored output (also respects NO_COLOR)
    #[arg(long)]
    no_color: bool,

    /// Config file (default: <config dir>/claude-statusbar/config.toml)
    #[arg(long, env = "STATUSBAR_CONFIG")]
    config: Option<PathBuf>,
}

impl Args {
    fn flags(&self) -> Flags {
        Flags {
            short: self.short,
            no_pr: self.no_pr,
            no_diff: self.no_diff,
            no_transcript: self.no_transcript,
            no_color: self.no_color || no_color_env(),
        }
    }
}

/// Any value of NO_COLOR, even empty, turns color off.
fn no_color_env() -> bool {
    std::env::var_os("NO_COLOR").is_some()
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // Help and version go to stdout; usage errors still leave an
            // empty status line and a zero exit.
            let _ = e.print();
            if !matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
                println!();
            }
            return;
        }
    };
    let _guard = claude_statusbar_observability::init_tracing();

    // Stderr can bleed into the prompt; panics go to the log instead.
    std::panic::set_hook(Box::new(|info| {
        tracing::error!(panic = %info, "status line panicked");
    }));

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| run(&args)));
    let line = match result {
        Ok(Ok(line)) => line,
        Ok(Err(e)) => {
            tracing::warn!(error = format!("{e:#}"), "status line failed");
            String::new()
        }
        Err(_) => String::new(),
    };
    println!("{line}");
}

fn run(args: &Args) -> anyhow::Result<String> {
    let flags = args.flags();
    // Stdout is a pipe, so `colored` would switch itself off without this.
    colored::control::set_override(!flags.no_color);

    let config_path = args
        .config
        .clone()
        .or_else(claude_statusbar_core::paths::default_config_path);
    let settings = Settings::load(config_path.as_deref());

    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("reading session JSON from stdin")?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building runtime")?;
    Ok(runtime.block_on(build_status_line(&input, &settings, flags)))
}
