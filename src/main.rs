//! webhost - HTML document host with a JavaScript bridge
//!
//! Loads one page, runs its scripts and timers, then prints the console.
//!
//! ```text
//! webhost <file-or-url> [--eval <script>]
//! ```

use std::env;
use std::process::ExitCode;
use webhost::devtools::LogLevel;
use webhost::{EngineConfig, NAME, VERSION, WebPage};

struct Args {
    target: String,
    eval: Option<String>,
}

fn parse_args() -> Option<Args> {
    let mut args = env::args().skip(1);
    let mut target = None;
    let mut eval = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--eval" => eval = Some(args.next()?),
            "--version" => {
                println!("{NAME} {VERSION}");
                std::process::exit(0);
            }
            _ if target.is_none() => target = Some(arg),
            _ => return None,
        }
    }
    Some(Args { target: target?, eval })
}

fn run(args: Args) -> webhost::Result<()> {
    let config = EngineConfig::from_env()?;
    let mut page = WebPage::new(config)?;
    page.load_from_url(&args.target)?;

    if let Some(script) = &args.eval {
        match page.evaluate(script) {
            Ok(value) => println!("{value}"),
            Err(err) => eprintln!("{err}"),
        }
    }

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(page.run_until_idle());

    let caption = page.caption();
    if !caption.is_empty() {
        println!("# {caption}");
    }
    for message in page.console().borrow().messages() {
        match message.level {
            LogLevel::Log => println!("{}", message.message),
            level => println!("[{}] {}", level.as_str(), message.message),
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    let Some(args) = parse_args() else {
        eprintln!("usage: {NAME} <file-or-url> [--eval <script>]");
        return ExitCode::from(2);
    };

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{NAME}: {err}");
            ExitCode::FAILURE
        }
    }
}
