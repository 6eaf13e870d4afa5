//! Minimal stand-in for a supervised executable.
//!
//! Accepts the same `--remote-debugging-port=` and `--user-data-dir=` flags
//! the supervisor passes and listens on the port until it is signalled.
//! Unknown flags are ignored. Extra switches drive failure scenarios:
//!
//! - `--no-listen`: never open the port
//! - `--close-after-ms=N`: stop listening after N ms but keep running
//! - `--exit-after-ms=N`: exit with status 3 after N ms
//! - `--spawn-grandchild`: start `sleep 60` in the same process group and
//!   write its pid to `<user-data-dir>/grandchild.pid`
//! - `--record-args`: write every argument to `<user-data-dir>/args.txt`
//! - `--listen-once`: only the first run in a data directory listens and
//!   honours `--exit-after-ms`; later runs behave like `--no-listen`

use std::io::ErrorKind;
use std::net::{Ipv4Addr, TcpListener};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const PORT_FLAG: &str = "--remote-debugging-port=";
const DATA_DIR_FLAG: &str = "--user-data-dir=";

#[derive(Default)]
struct StubOptions {
    port: Option<u16>,
    data_dir: Option<PathBuf>,
    listen: bool,
    close_after: Option<Duration>,
    exit_after: Option<Duration>,
    spawn_grandchild: bool,
    record_args: bool,
    listen_once: bool,
}

fn millis(value: &str) -> Option<Duration> {
    value.parse().ok().map(Duration::from_millis)
}

fn parse(args: &[String]) -> StubOptions {
    let mut options = StubOptions {
        listen: true,
        ..Default::default()
    };

    for arg in args {
        if let Some(port) = arg.strip_prefix(PORT_FLAG) {
            options.port = port.parse().ok();
        } else if let Some(dir) = arg.strip_prefix(DATA_DIR_FLAG) {
            options.data_dir = Some(PathBuf::from(dir));
        } else if let Some(ms) = arg.strip_prefix("--close-after-ms=") {
            options.close_after = millis(ms);
        } else if let Some(ms) = arg.strip_prefix("--exit-after-ms=") {
            options.exit_after = millis(ms);
        } else {
            match arg.as_str() {
                "--no-listen" => options.listen = false,
                "--spawn-grandchild" => options.spawn_grandchild = true,
                "--record-args" => options.record_args = true,
                "--listen-once" => options.listen_once = true,
                _ => {}
            }
        }
    }

    options
}

fn main() -> std::io::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut options = parse(&args);
    println!("control-port-stub pid {}", std::process::id());

    if let Some(dir) = &options.data_dir {
        if options.listen_once {
            let marker = dir.join("first-run");
            if marker.exists() {
                options.listen = false;
                options.exit_after = None;
            } else {
                std::fs::write(&marker, std::process::id().to_string())?;
            }
        }
        if options.record_args {
            std::fs::write(dir.join("args.txt"), args.join("\n"))?;
        }
        if options.spawn_grandchild {
            let grandchild = Command::new("sleep")
                .arg("60")
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()?;
            std::fs::write(dir.join("grandchild.pid"), grandchild.id().to_string())?;
        }
    }

    if let Some(delay) = options.exit_after {
        thread::spawn(move || {
            thread::sleep(delay);
            eprintln!("control-port-stub exiting on request");
            std::process::exit(3);
        });
    }

    let listener = match (options.listen, options.port) {
        (true, Some(port)) => Some(TcpListener::bind((Ipv4Addr::LOCALHOST, port))?),
        _ => None,
    };

    let started = Instant::now();
    if let Some(listener) = listener {
        listener.set_nonblocking(true)?;
        loop {
            if options.close_after.is_some_and(|limit| started.elapsed() >= limit) {
                eprintln!("control-port-stub closing control port");
                break;
            }
            match listener.accept() {
                // connections are only probed, never spoken to
                Ok((stream, _)) => drop(stream),
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(10))
                }
                Err(e) => return Err(e),
            }
        }
    }

    loop {
        thread::sleep(Duration::from_secs(3600));
    }
}
