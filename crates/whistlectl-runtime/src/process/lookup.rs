//! Discover proxy processes by listening port or by command-line tag.
//!
//! Port owners are found with `lsof`, falling back to `ss` on Linux where
//! `lsof` is often missing. Tagged processes are found by scanning the
//! process table with `sysinfo`. The calling process is never returned.

use std::io;

use sysinfo::{ProcessesToUpdate, System};
use tokio::process::Command;
use tracing::debug;

/// A process found in the process table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessMatch {
    pub pid: u32,
    pub command_line: String,
}

/// PIDs of processes listening on TCP `port`.
pub async fn pids_listening_on(port: u16) -> io::Result<Vec<u32>> {
    let pids = match lsof_listeners(port).await {
        Ok(pids) => pids,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(port, "lsof not available, falling back to ss");
            ss_listeners(port).await?
        }
        Err(e) => return Err(e),
    };

    Ok(without_self(pids))
}

async fn lsof_listeners(port: u16) -> io::Result<Vec<u32>> {
    let output = Command::new("lsof")
        .args(["-nP", "-t"])
        .arg(format!("-iTCP:{port}"))
        .arg("-sTCP:LISTEN")
        .output()
        .await?;

    // lsof exits 1 when nothing matches; the empty output says the same.
    Ok(parse_lsof_pids(&String::from_utf8_lossy(&output.stdout)))
}

#[cfg(target_os = "linux")]
async fn ss_listeners(port: u16) -> io::Result<Vec<u32>> {
    let output = Command::new("ss")
        .arg("-Hltnp")
        .arg(format!("sport = :{port}"))
        .output()
        .await?;

    if !output.status.success() {
        return Err(io::Error::other(format!(
            "ss exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(parse_ss_pids(&String::from_utf8_lossy(&output.stdout)))
}

#[cfg(not(target_os = "linux"))]
async fn ss_listeners(_port: u16) -> io::Result<Vec<u32>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "no port lookup tool available (install lsof)",
    ))
}

/// `lsof -t` prints one PID per line.
pub(crate) fn parse_lsof_pids(output: &str) -> Vec<u32> {
    let mut pids: Vec<u32> = output
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect();
    pids.sort_unstable();
    pids.dedup();
    pids
}

/// Extract every `pid=<n>` from `ss -p` output, e.g.
/// `LISTEN 0 511 127.0.0.1:8899 0.0.0.0:* users:(("node",pid=1234,fd=20))`.
pub(crate) fn parse_ss_pids(output: &str) -> Vec<u32> {
    let mut pids: Vec<u32> = output
        .split("pid=")
        .skip(1)
        .filter_map(|rest| {
            let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
            digits.parse().ok()
        })
        .collect();
    pids.sort_unstable();
    pids.dedup();
    pids
}

/// Processes whose command line contains `tag`.
///
/// The process table scan is blocking, so it runs on the blocking pool.
pub async fn processes_matching_tag(tag: &str) -> io::Result<Vec<ProcessMatch>> {
    let tag = tag.to_string();
    tokio::task::spawn_blocking(move || scan_process_table(&tag))
        .await
        .map_err(io::Error::other)
}

fn scan_process_table(tag: &str) -> Vec<ProcessMatch> {
    let mut system = System::new_all();
    system.refresh_processes(ProcessesToUpdate::All, true);

    let own_pid = std::process::id();
    let mut matches: Vec<ProcessMatch> = system
        .processes()
        .iter()
        .filter_map(|(pid, process)| {
            // On Linux every thread is listed too; only whole processes are targets.
            if process.thread_kind().is_some() {
                return None;
            }
            let args: Vec<String> = process
                .cmd()
                .iter()
                .map(|a| a.to_string_lossy().into_owned())
                .collect();
            (pid.as_u32() != own_pid && command_line_matches(&args, tag)).then(|| ProcessMatch {
                pid: pid.as_u32(),
                command_line: args.join(" "),
            })
        })
        .collect();
    matches.sort_by_key(|m| m.pid);
    matches
}

/// Whether any argument contains the tag.
pub(crate) fn command_line_matches(args: &[String], tag: &str) -> bool {
    !tag.is_empty() && args.iter().any(|a| a.contains(tag))
}

fn without_self(mut pids: Vec<u32>) -> Vec<u32> {
    let own_pid = std::process::id();
    pids.retain(|pid| *pid != own_pid);
    pids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lsof_output_parsing() {
        assert_eq!(parse_lsof_pids("1234\n99\n1234\n\n"), vec![99, 1234]);
        assert!(parse_lsof_pids("").is_empty());
    }

    #[test]
    fn ss_output_parsing() {
        let output = "LISTEN 0 511 127.0.0.1:8899 0.0.0.0:* users:((\"node\",pid=1234,fd=20),(\"node\",pid=1240,fd=20))\n\
                      LISTEN 0 511 [::1]:8899 [::]:* users:((\"node\",pid=1234,fd=21))\n";
        assert_eq!(parse_ss_pids(output), vec![1234, 1240]);
    }

    #[test]
    fn ss_output_without_process_info() {
        // Without privileges ss omits the users column.
        assert!(parse_ss_pids("LISTEN 0 511 127.0.0.1:8899 0.0.0.0:*\n").is_empty());
    }

    #[test]
    fn tag_matching() {
        let args: Vec<String> = ["node", "/usr/lib/whistle/index.js", "run", "-S", "auto-whistle-sdk-test"]
            .iter()
            .map(ToString::to_string)
            .collect();
        assert!(command_line_matches(&args, "auto-whistle-sdk"));
        assert!(!command_line_matches(&args, "other-tag"));
        assert!(!command_line_matches(&args, ""));
    }

    #[test]
    fn self_is_filtered() {
        let own = std::process::id();
        assert_eq!(without_self(vec![own, 1]), vec![1]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[cfg(target_os = "linux")]
    async fn scan_skips_own_threads() {
        let exe = std::env::current_exe().unwrap();
        let tag = exe.file_name().unwrap().to_string_lossy().into_owned();

        let own_tasks: Vec<u32> = std::fs::read_dir("/proc/self/task")
            .unwrap()
            .filter_map(|entry| entry.ok()?.file_name().to_str()?.parse().ok())
            .collect();
        assert!(own_tasks.len() > 1, "expected worker threads");

        let matches = processes_matching_tag(&tag).await.unwrap();
        for m in &matches {
            assert!(!own_tasks.contains(&m.pid), "own thread {} matched", m.pid);
        }
    }

    #[tokio::test]
    async fn scan_never_returns_own_process() {
        let matches = processes_matching_tag("cargo").await.unwrap();
        assert!(matches.iter().all(|m| m.pid != std::process::id()));
    }
}
