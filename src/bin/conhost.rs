// (C) 2025 - Enzo Lombardi

//! Headless console host bootstrap: parses argv the way `wmain` does,
//! wires a real tty and an in-process channel transport to the
//! dispatcher, and runs until the transport disconnects.
//!
//! CLI parsing is intentionally minimal (matching `wmain`'s own hand-rolled
//! scan rather than reaching for a CLI-parsing crate) — the binary exists so
//! the library has a runnable entry point, not to be a polished frontend.

use std::process::ExitCode;
use std::sync::mpsc;

use conhost::console::input::ENABLE_PROCESSED_INPUT;
use conhost::console::Console;
use conhost::core::error::{ConsoleHostError, Result};
use conhost::dispatcher::{Dispatcher, Incoming, Transport};
use conhost::protocol::Reply;
use conhost::renderer::TtyRenderer;

struct Args {
    headless: bool,
    width: i16,
    height: i16,
    #[allow(dead_code)]
    signal: u32,
    server: Option<u32>,
}

fn parse_args(argv: &[String]) -> Result<Args> {
    let mut headless = false;
    let mut width = 80i16;
    let mut height = 150i16;
    let mut signal = 0u32;
    let mut server = None;

    let mut i = 0;
    while i < argv.len() {
        match argv[i].as_str() {
            "--headless" => headless = true,
            "--width" => {
                i += 1;
                let raw = argv.get(i).ok_or_else(|| ConsoleHostError::bootstrap("--width needs a value"))?;
                let value: u32 = raw.parse().map_err(|_| ConsoleHostError::bootstrap("--width is not a number"))?;
                if value == 0 || value > 0xffff {
                    return Err(ConsoleHostError::bootstrap("--width out of range"));
                }
                width = value as i16;
            }
            "--height" => {
                i += 1;
                let raw = argv.get(i).ok_or_else(|| ConsoleHostError::bootstrap("--height needs a value"))?;
                let value: u32 = raw.parse().map_err(|_| ConsoleHostError::bootstrap("--height is not a number"))?;
                if value == 0 || value > 0xffff {
                    return Err(ConsoleHostError::bootstrap("--height out of range"));
                }
                height = value as i16;
            }
            "--signal" => {
                i += 1;
                let raw = argv.get(i).ok_or_else(|| ConsoleHostError::bootstrap("--signal needs a value"))?;
                signal = raw.parse().map_err(|_| ConsoleHostError::bootstrap("--signal is not a number"))?;
            }
            "--server" => {
                i += 1;
                let raw = argv.get(i).ok_or_else(|| ConsoleHostError::bootstrap("--server needs a value"))?;
                server = Some(raw.parse().map_err(|_| ConsoleHostError::bootstrap("--server is not a number"))?);
            }
            other => {
                return Err(ConsoleHostError::bootstrap(format!("unknown option {other}")));
            }
        }
        i += 1;
    }

    Ok(Args { headless, width, height, signal, server })
}

/// The other half of the in-process channel: replies flow straight back
/// out over the same logical transport a real coordination process would
/// own. Stands in for the out-of-scope `CoordinationTransport` collaborator.
struct ChannelTransport {
    replies: mpsc::Sender<Reply>,
}

impl Transport for ChannelTransport {
    fn reply(&mut self, reply: Reply) {
        if self.replies.send(reply).is_err() {
            log::warn!("reply channel disconnected");
        }
    }
}

fn run() -> Result<ExitCode> {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    log::info!("{}", argv.join(" "));

    let args = parse_args(&argv)?;

    if !args.headless {
        eprintln!("windowed mode not supported");
        return Ok(ExitCode::SUCCESS);
    }

    if args.server.is_none() {
        log::error!("no server handle");
        return Ok(ExitCode::FAILURE);
    }

    let mut console = Console::new(args.width, args.height);
    console.mode = ENABLE_PROCESSED_INPUT;

    let renderer = TtyRenderer::new(std::io::stdout());
    let mut dispatcher = Dispatcher::new(console, renderer);

    let (request_tx, request_rx) = mpsc::channel::<Incoming>();
    let (reply_tx, _reply_rx) = mpsc::channel::<Reply>();
    let mut transport = ChannelTransport { replies: reply_tx };

    // conhost.c owns the pty slave directly, so the terminal driver never
    // gets a chance to line-buffer or echo; raw mode is this process's
    // equivalent when it's plugged into a real tty for manual testing.
    crossterm::terminal::enable_raw_mode()?;

    // A real coordination process would feed `request_tx` from its own I/O
    // thread; dropping it here simply ends the loop once `recv()` sees the
    // channel disconnected, which is enough to demonstrate startup/teardown.
    drop(request_tx);

    let exit = dispatcher.run(&request_rx, &mut transport);
    log::info!("exiting: {:?}", exit);

    crossterm::terminal::disable_raw_mode()?;

    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    // stdout carries the VT stream the renderer writes to the real tty;
    // log output must not share it, so this logs to stderr instead of
    // reaching for `SimpleLogger`'s split stdout/stderr-by-level default.
    simplelog::WriteLogger::init(simplelog::LevelFilter::Info, simplelog::Config::default(), std::io::stderr())
        .expect("logger already initialized");

    match run() {
        Ok(code) => code,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
