//! Shared helpers for runtime integration tests.
//!
//! - [`StatusStub`] - minimal HTTP server standing in for the proxy's status endpoint
//! - [`FakeProxy`] - shell script standing in for the `w2` binary
//! - [`RecordingTerminator`] - terminator that records calls instead of killing
//! - [`spawn_listener`] - real TCP listener process for termination tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use whistlectl_core::Result;
use whistlectl_runtime::ProcessTerminator;

/// Bind an ephemeral loopback port and return it after releasing it.
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
    listener.local_addr().unwrap().port()
}

/// HTTP server answering 503 for the first `failures` requests, then 200.
pub struct StatusStub {
    pub port: u16,
    hits: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl StatusStub {
    pub async fn healthy() -> Self {
        Self::failing_first(0).await
    }

    pub async fn failing_first(failures: usize) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        let task = tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let n = counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = socket.read(&mut buf).await;
                    let response = if n < failures {
                        "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                    } else {
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{}"
                    };
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self { port, hits, task }
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl Drop for StatusStub {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Executable script that mimics `w2 start` and `w2 add`.
///
/// Every invocation appends its arguments to `calls.log` next to the script.
pub struct FakeProxy {
    dir: TempDir,
    path: PathBuf,
}

impl FakeProxy {
    /// Prints the bound address for `start` and exits 0 for `add`.
    pub fn well_behaved() -> Self {
        Self::with_body(
            r#"case "$1" in
  start)
    port=""
    while [ $# -gt 0 ]; do
      if [ "$1" = "-p" ]; then
        shift
        port="$1"
      fi
      shift
    done
    echo "[i] whistle started"
    echo "[i] 1. use your device to visit the following URL list:"
    echo "       http://127.0.0.1:${port}/"
    exit 0
    ;;
  add)
    echo "Setting successful"
    exit 0
    ;;
esac
exit 0"#,
        )
    }

    /// Like [`Self::well_behaved`], but `start` also leaves a detached HTTP
    /// daemon listening on the port, the way the real proxy does. Each
    /// daemon's PID is appended to `daemons.log`. Requires `python3`.
    pub fn daemonizing() -> Self {
        let proxy = Self::with_body(
            r#"case "$1" in
  start)
    port=""
    while [ $# -gt 0 ]; do
      if [ "$1" = "-p" ]; then
        shift
        port="$1"
      fi
      shift
    done
    dir="$(dirname "$0")"
    python3 "$dir/daemon.py" "$port" </dev/null >/dev/null 2>&1 &
    echo $! >> "$dir/daemons.log"
    echo "       http://127.0.0.1:${port}/"
    exit 0
    ;;
esac
exit 0"#,
        );
        std::fs::write(proxy.dir().join("daemon.py"), STATUS_DAEMON).unwrap();
        proxy
    }

    /// PIDs of daemons started so far, oldest first.
    pub fn daemon_pids(&self) -> Vec<u32> {
        std::fs::read_to_string(self.dir.path().join("daemons.log"))
            .unwrap_or_default()
            .lines()
            .filter_map(|l| l.trim().parse().ok())
            .collect()
    }

    /// Exits with status 3 for every subcommand.
    pub fn failing() -> Self {
        Self::with_body(
            r#"echo "[!] something went wrong" >&2
exit 3"#,
        )
    }

    /// Prints nothing useful and stays alive.
    pub fn silent() -> Self {
        Self::with_body("sleep 30")
    }

    fn with_body(body: &str) -> Self {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("w2");
        let log = dir.path().join("calls.log");
        let script = format!(
            "#!/bin/sh\necho \"$@\" >> \"{}\"\n{}\n",
            log.display(),
            body
        );
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        Self { dir, path }
    }

    pub fn binary(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Argument lines recorded so far.
    pub fn calls(&self) -> Vec<String> {
        std::fs::read_to_string(self.dir.path().join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

/// Terminator that records requests and never signals anything.
#[derive(Debug, Default)]
pub struct RecordingTerminator {
    ports: Mutex<Vec<u16>>,
    tags: Mutex<Vec<String>>,
}

impl RecordingTerminator {
    pub fn ports(&self) -> Vec<u16> {
        self.ports.lock().unwrap().clone()
    }

    pub fn tags(&self) -> Vec<String> {
        self.tags.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessTerminator for RecordingTerminator {
    async fn kill_port(&self, port: u16) -> Result<Vec<u32>> {
        self.ports.lock().unwrap().push(port);
        Ok(Vec::new())
    }

    async fn kill_tagged(&self, tag: &str) -> Result<Vec<u32>> {
        self.tags.lock().unwrap().push(tag.to_string());
        Ok(Vec::new())
    }
}

/// HTTP server answering 200 on every path.
const STATUS_DAEMON: &str = r#"import http.server
import sys


class Handler(http.server.BaseHTTPRequestHandler):
    def do_GET(self):
        self.send_response(200)
        self.send_header("Content-Length", "2")
        self.end_headers()
        self.wfile.write(b"{}")

    def log_message(self, *args):
        pass


http.server.HTTPServer(("127.0.0.1", int(sys.argv[1])), Handler).serve_forever()
"#;

/// Whether `python3` can be run; tests needing a real listener skip without it.
pub fn python3_available() -> bool {
    std::process::Command::new("python3")
        .arg("--version")
        .output()
        .is_ok_and(|out| out.status.success())
}

/// Spawn a `python3` process that listens on `port` until killed.
pub fn spawn_listener(port: u16) -> Child {
    let script = format!(
        "import socket, time\n\
         s = socket.socket()\n\
         s.setsockopt(socket.SOL_SOCKET, socket.SO_REUSEADDR, 1)\n\
         s.bind(('127.0.0.1', {port}))\n\
         s.listen()\n\
         time.sleep(60)\n"
    );
    Command::new("python3")
        .arg("-c")
        .arg(&script)
        .kill_on_drop(true)
        .spawn()
        .unwrap()
}

/// Wait until something accepts connections on `port`.
pub async fn wait_for_listener(port: u16) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while TcpStream::connect(("127.0.0.1", port)).await.is_err() {
        assert!(Instant::now() < deadline, "nothing listening on {port}");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
