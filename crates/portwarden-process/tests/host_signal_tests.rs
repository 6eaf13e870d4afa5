//! Host termination signals, exercised in a re-executed copy of this test binary
#![cfg(unix)]

use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use nix::sys::signal::{raise, Signal};
use portwarden_process::{LaunchConfig, Supervisor, HOST_EXIT_CODE};
use tokio::time::{sleep, timeout, Instant};

const STUB: &str = env!("CARGO_BIN_EXE_control-port-stub");
const SCENARIO_ENV: &str = "PORTWARDEN_HOST_SCENARIO";
const SURVIVED: &str = "HOST_SURVIVED";

/// Entry point of the re-executed host; does nothing in a normal test run
#[test]
fn host_scenario() {
    let Ok(scenario) = std::env::var(SCENARIO_ENV) else {
        return;
    };

    let runtime = tokio::runtime::Runtime::new().unwrap();
    runtime.block_on(async move {
        // host signal handling stays at its default: enabled
        let config = LaunchConfig::new()
            .executable(STUB)
            .readiness(100, Duration::from_millis(50))
            .monitor_interval(Duration::from_millis(100))
            .kill_grace(Duration::from_secs(3));
        let supervisor = Supervisor::new(config);

        let handle = supervisor.launch().await.unwrap();
        println!("DATA_DIR={}", handle.data_dir.unwrap().display());
        println!("CHILD_PID={}", handle.pid.unwrap());

        match scenario.as_str() {
            "interrupt-while-running" => raise(Signal::SIGINT).unwrap(),
            "terminate-after-kill" => {
                supervisor.kill().await;
                raise(Signal::SIGTERM).unwrap();
            }
            other => panic!("unknown scenario {other}"),
        }

        sleep(Duration::from_secs(10)).await;
        println!("{SURVIVED} state={:?}", supervisor.state());
    });
}

struct HostRun {
    status: ExitStatus,
    stdout: String,
}

impl HostRun {
    fn value(&self, key: &str) -> Option<&str> {
        self.stdout
            .lines()
            .find_map(|line| line.strip_prefix(key)?.strip_prefix('='))
    }

    fn survived(&self) -> bool {
        self.stdout.contains(SURVIVED)
    }
}

async fn run_host(scenario: &str) -> HostRun {
    let output = tokio::process::Command::new(std::env::current_exe().unwrap())
        .args(["host_scenario", "--exact", "--nocapture", "--quiet", "--test-threads=1"])
        .env(SCENARIO_ENV, scenario)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();

    let output = timeout(Duration::from_secs(60), output)
        .await
        .expect("host did not finish")
        .expect("host could not run");

    HostRun {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
    }
}

fn is_alive(pid: u32) -> bool {
    if cfg!(target_os = "linux") {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => !stat
                .rsplit(')')
                .next()
                .is_some_and(|rest| rest.trim_start().starts_with('Z')),
            Err(_) => false,
        }
    } else {
        nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok()
    }
}

async fn eventually_dead(pid: u32) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while is_alive(pid) {
        if Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(20)).await;
    }
    true
}

#[tokio::test]
async fn test_interrupt_kills_child_and_exits_host() {
    let run = run_host("interrupt-while-running").await;

    assert!(!run.survived(), "host kept running:\n{}", run.stdout);
    assert_eq!(run.status.code(), Some(HOST_EXIT_CODE));

    let dir = PathBuf::from(run.value("DATA_DIR").expect("data dir reported"));
    assert!(!dir.exists());

    let pid: u32 = run.value("CHILD_PID").unwrap().parse().unwrap();
    assert!(eventually_dead(pid).await);
}

#[tokio::test]
async fn test_signal_after_kill_keeps_default_termination() {
    let run = run_host("terminate-after-kill").await;

    assert!(!run.survived(), "host swallowed SIGTERM:\n{}", run.stdout);
    assert_eq!(run.status.signal(), Some(Signal::SIGTERM as i32));

    let dir = PathBuf::from(run.value("DATA_DIR").expect("data dir reported"));
    assert!(!dir.exists());
}
