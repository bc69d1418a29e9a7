//! Persistent privileged shell with a serial job queue.
//!
//! One long-lived shell process (normally `su`) is owned by a single worker
//! task. Every submission, quick query or streamed job, is queued on an
//! unbounded channel and executed in order. Each job is framed with a unique
//! end marker: stdout receives `<marker>:<exit code>`, stderr receives
//! `<marker>`, and the worker reads both streams until both markers arrive.
//!
//! The shell is spawned lazily on the first job and re-spawned on the next job
//! after it dies. There is no timeout and no cancellation.

use crate::error::ShellError;
use crate::models::{OutputLine, UNKNOWN};
use crate::system::command::ShellScript;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};

/// How to obtain the privileged shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfig {
    pub program: String,
    pub args: Vec<String>,
    /// Refuse the session unless `id -u` prints `0`.
    pub require_root: bool,
}

impl Default for ShellConfig {
    fn default() -> Self {
        ShellConfig {
            program: "su".to_string(),
            args: Vec::new(),
            require_root: true,
        }
    }
}

/// Captured result of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    pub success: bool,
    pub exit_code: i32,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    /// Set when the job never ran to completion in a live shell.
    pub error: Option<ShellError>,
}

impl JobResult {
    fn unavailable(error: ShellError) -> Self {
        JobResult {
            success: false,
            exit_code: -1,
            stdout: Vec::new(),
            stderr: Vec::new(),
            error: Some(error),
        }
    }

    /// Joined stderr then stdout, or the shell error when nothing was captured.
    pub fn diagnostic(&self) -> Option<String> {
        let joined = self
            .stderr
            .iter()
            .chain(self.stdout.iter())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n");
        let joined = joined.trim();
        if !joined.is_empty() {
            return Some(joined.to_string());
        }
        self.error.as_ref().map(|e| e.to_string())
    }

    /// Trimmed stdout, or the `"unknown"` sentinel on any failure.
    pub fn quick_output(&self) -> String {
        if self.success {
            self.stdout.join("\n").trim().to_string()
        } else {
            UNKNOWN.to_string()
        }
    }
}

/// A submitted job whose output is streamed.
///
/// `lines` is closed before `result` resolves.
pub struct ShellJob {
    pub lines: mpsc::UnboundedReceiver<OutputLine>,
    pub result: oneshot::Receiver<JobResult>,
}

struct Job {
    script: String,
    sink: Option<mpsc::UnboundedSender<OutputLine>>,
    reply: oneshot::Sender<JobResult>,
}

/// Handle to the shared privileged shell. Cheap to clone.
#[derive(Clone)]
pub struct RootShell {
    tx: mpsc::UnboundedSender<Job>,
}

impl RootShell {
    /// Start the worker task. Must be called from within a tokio runtime.
    /// The shell process itself is not spawned until the first job.
    pub fn start(config: ShellConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Worker {
            config,
            session: None,
            seq: 0,
        };
        tokio::spawn(worker.run(rx));
        RootShell { tx }
    }

    /// Queue a job and return immediately.
    pub fn submit(
        &self,
        script: impl Into<ShellScript>,
        sink: Option<mpsc::UnboundedSender<OutputLine>>,
    ) -> oneshot::Receiver<JobResult> {
        let (reply, result) = oneshot::channel();
        let job = Job {
            script: script.into().render(),
            sink,
            reply,
        };
        if let Err(mpsc::error::SendError(job)) = self.tx.send(job) {
            let _ = job.reply.send(JobResult::unavailable(ShellError::WorkerGone));
        }
        result
    }

    /// Queue a job whose output lines are delivered as they arrive.
    pub fn stream(&self, script: impl Into<ShellScript>) -> ShellJob {
        let (line_tx, lines) = mpsc::unbounded_channel();
        let result = self.submit(script, Some(line_tx));
        ShellJob { lines, result }
    }

    /// Run a job to completion and return everything it printed.
    pub async fn run(&self, script: impl Into<ShellScript>) -> JobResult {
        self.submit(script, None)
            .await
            .unwrap_or_else(|_| JobResult::unavailable(ShellError::WorkerGone))
    }

    /// Trimmed stdout of a cheap query, `"unknown"` on any failure.
    pub async fn run_quick(&self, script: impl Into<ShellScript>) -> String {
        self.run(script).await.quick_output()
    }

    /// Blocking flavor of [`RootShell::run_quick`].
    ///
    /// Blocks the calling thread until the shell answers; must not be called
    /// from an async context (use `spawn_blocking`).
    pub fn run_quick_blocking(&self, script: impl Into<ShellScript>) -> String {
        self.submit(script, None)
            .blocking_recv()
            .map(|r| r.quick_output())
            .unwrap_or_else(|_| UNKNOWN.to_string())
    }
}

/// Line reader that tolerates output which is not valid UTF-8.
///
/// Bytes read so far are kept in `buf`, so a read dropped by `select!` loses
/// nothing and the next call picks up where it stopped.
struct LossyLines<R> {
    inner: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LossyLines<R> {
    fn new(inner: R) -> Self {
        LossyLines {
            inner: BufReader::new(inner),
            buf: Vec::new(),
        }
    }

    /// Next line without its terminator, invalid sequences replaced by
    /// U+FFFD. `None` at end of stream.
    async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        let read = self.inner.read_until(b'\n', &mut self.buf).await?;
        if read == 0 && self.buf.is_empty() {
            return Ok(None);
        }
        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        }
        let line = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        Ok(Some(line))
    }
}

struct Session {
    child: Child,
    stdin: ChildStdin,
    stdout: LossyLines<ChildStdout>,
    stderr: LossyLines<ChildStderr>,
}

impl Session {
    async fn exec(
        &mut self,
        script: &str,
        marker: &str,
        sink: Option<&mpsc::UnboundedSender<OutputLine>>,
    ) -> Result<JobResult, ShellError> {
        let body = if script.trim().is_empty() { "true" } else { script };
        let framed = format!(
            "{{ {body}\n}} </dev/null\n__rootmod_rc=$?; echo \"{marker}:$__rootmod_rc\"; echo \"{marker}\" >&2\n"
        );

        let Session {
            stdin,
            stdout,
            stderr,
            ..
        } = self;

        stdin.write_all(framed.as_bytes()).await.map_err(io_to_shell)?;
        stdin.flush().await.map_err(io_to_shell)?;

        let mut out = Vec::new();
        let mut err = Vec::new();
        let mut exit_code: Option<i32> = None;
        let mut stderr_done = false;

        while exit_code.is_none() || !stderr_done {
            tokio::select! {
                line = stdout.next_line(), if exit_code.is_none() => {
                    let Some(line) = line.map_err(io_to_shell)? else {
                        return Err(ShellError::ShellDied);
                    };
                    match line.find(marker) {
                        Some(idx) => {
                            // Output without a trailing newline ends up glued to the marker.
                            if idx > 0 {
                                emit(&mut out, sink, &line[..idx], OutputLine::Stdout);
                            }
                            let code = line[idx + marker.len()..]
                                .trim_start_matches(':')
                                .trim()
                                .parse::<i32>()
                                .unwrap_or(-1);
                            exit_code = Some(code);
                        }
                        None => emit(&mut out, sink, &line, OutputLine::Stdout),
                    }
                }
                line = stderr.next_line(), if !stderr_done => {
                    let Some(line) = line.map_err(io_to_shell)? else {
                        return Err(ShellError::ShellDied);
                    };
                    match line.find(marker) {
                        Some(idx) => {
                            if idx > 0 {
                                emit(&mut err, sink, &line[..idx], OutputLine::Stderr);
                            }
                            stderr_done = true;
                        }
                        None => emit(&mut err, sink, &line, OutputLine::Stderr),
                    }
                }
            }
        }

        let exit_code = exit_code.unwrap_or(-1);
        Ok(JobResult {
            success: exit_code == 0,
            exit_code,
            stdout: out,
            stderr: err,
            error: None,
        })
    }
}

fn emit(
    captured: &mut Vec<String>,
    sink: Option<&mpsc::UnboundedSender<OutputLine>>,
    line: &str,
    wrap: fn(String) -> OutputLine,
) {
    log::debug!("[Shell] {}", line);
    if let Some(sink) = sink {
        let _ = sink.send(wrap(line.to_string()));
    }
    captured.push(line.to_string());
}

fn io_to_shell(e: std::io::Error) -> ShellError {
    match e.kind() {
        std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::UnexpectedEof => {
            ShellError::ShellDied
        }
        _ => ShellError::Io(e.to_string()),
    }
}

struct Worker {
    config: ShellConfig,
    session: Option<Session>,
    seq: u64,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Job>) {
        while let Some(job) = rx.recv().await {
            let result = self.execute(&job.script, job.sink.as_ref()).await;
            // Close the line stream before the outcome is delivered.
            drop(job.sink);
            let _ = job.reply.send(result);
        }
        self.close();
        log::debug!("[Shell] Job queue closed, worker exiting");
    }

    async fn execute(
        &mut self,
        script: &str,
        sink: Option<&mpsc::UnboundedSender<OutputLine>>,
    ) -> JobResult {
        if self.session.is_none() {
            match self.open().await {
                Ok(session) => self.session = Some(session),
                Err(e) => {
                    log::warn!("[Shell] Privileged shell unavailable: {}", e);
                    return JobResult::unavailable(e);
                }
            }
        }

        self.seq += 1;
        let marker = self.marker();
        let Some(session) = self.session.as_mut() else {
            return JobResult::unavailable(ShellError::ShellDied);
        };

        match session.exec(script, &marker, sink).await {
            Ok(result) => result,
            Err(e) => {
                log::warn!("[Shell] Job failed, dropping session: {}", e);
                self.close();
                JobResult::unavailable(e)
            }
        }
    }

    fn marker(&self) -> String {
        format!("__ROOTMOD_END_{}_{}__", std::process::id(), self.seq)
    }

    async fn open(&mut self) -> Result<Session, ShellError> {
        log::info!(
            "[Shell] Starting privileged shell: {} {}",
            self.config.program,
            self.config.args.join(" ")
        );
        let mut child = Command::new(&self.config.program)
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ShellError::SpawnFailed {
                program: self.config.program.clone(),
                reason: e.to_string(),
            })?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            let _ = child.start_kill();
            return Err(ShellError::Io("shell pipes unavailable".to_string()));
        };

        let mut session = Session {
            child,
            stdin,
            stdout: LossyLines::new(stdout),
            stderr: LossyLines::new(stderr),
        };

        if self.config.require_root {
            self.seq += 1;
            let marker = self.marker();
            let probe = session.exec("id -u", &marker, None).await?;
            let uid = probe.stdout.first().map(|s| s.trim().to_string());
            if uid.as_deref() != Some("0") {
                let _ = session.child.start_kill();
                return Err(ShellError::NotRoot(uid.unwrap_or_else(|| UNKNOWN.to_string())));
            }
        }

        Ok(session)
    }

    fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            let _ = session.child.start_kill();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::command::ShellCommand;

    fn sh() -> RootShell {
        RootShell::start(ShellConfig {
            program: "sh".to_string(),
            args: Vec::new(),
            require_root: false,
        })
    }

    fn sh_c(script: &str) -> ShellCommand {
        ShellCommand::new("sh").arg("-c").arg(script)
    }

    #[tokio::test]
    async fn test_run_captures_stdout() {
        let shell = sh();
        let result = shell.run(ShellCommand::new("echo").arg("hello world")).await;
        assert!(result.success);
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, vec!["hello world".to_string()]);
        assert!(result.stderr.is_empty());
    }

    #[tokio::test]
    async fn test_nonzero_exit_reports_failure_with_diagnostic() {
        let shell = sh();
        let result = shell.run(sh_c("echo out; echo oops >&2; exit 3")).await;
        assert!(!result.success);
        assert_eq!(result.exit_code, 3);
        assert_eq!(result.diagnostic().as_deref(), Some("oops\nout"));
    }

    #[tokio::test]
    async fn test_unterminated_output_is_kept() {
        let shell = sh();
        let result = shell.run(ShellCommand::new("printf").arg("no-newline")).await;
        assert!(result.success);
        assert_eq!(result.stdout, vec!["no-newline".to_string()]);
    }

    #[tokio::test]
    async fn test_invalid_utf8_output_keeps_session() {
        let shell = sh();
        let before = shell.run_quick(sh_c("echo $PPID")).await;

        let result = shell.run(sh_c("printf 'caf\\351\\n'; echo done")).await;
        assert!(result.success);
        assert_eq!(result.exit_code, 0);
        assert_eq!(
            result.stdout,
            vec!["caf\u{FFFD}".to_string(), "done".to_string()]
        );
        assert_eq!(result.error, None);

        let after = shell.run_quick(sh_c("echo $PPID")).await;
        assert_ne!(before, UNKNOWN);
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_streamed_on_stderr() {
        let shell = sh();
        let mut job = shell.stream(sh_c("printf '\\377\\376 raw\\n' >&2; echo ok"));

        let mut lines = Vec::new();
        while let Some(line) = job.lines.recv().await {
            lines.push(line);
        }
        let result = job.result.await.unwrap();

        assert!(result.success);
        assert!(lines.contains(&OutputLine::Stderr("\u{FFFD}\u{FFFD} raw".to_string())));
        assert!(lines.contains(&OutputLine::Stdout("ok".to_string())));
    }

    #[tokio::test]
    async fn test_stream_delivers_lines_then_result() {
        let shell = sh();
        let mut job = shell.stream(sh_c("echo one; echo two >&2; echo three"));

        let mut lines = Vec::new();
        while let Some(line) = job.lines.recv().await {
            lines.push(line);
        }
        let result = job.result.await.unwrap();

        assert!(result.success);
        assert!(lines.contains(&OutputLine::Stdout("one".to_string())));
        assert!(lines.contains(&OutputLine::Stderr("two".to_string())));
        assert!(lines.contains(&OutputLine::Stdout("three".to_string())));
        assert_eq!(lines.len(), 3);
    }

    #[tokio::test]
    async fn test_jobs_are_serialized() {
        let shell = sh();
        let first = shell.submit(sh_c("sleep 0.2; echo first"), None);
        let second = shell.submit(ShellCommand::new("echo").arg("second"), None);
        let a = first.await.unwrap();
        let b = second.await.unwrap();
        assert_eq!(a.stdout, vec!["first".to_string()]);
        assert_eq!(b.stdout, vec!["second".to_string()]);
    }

    #[tokio::test]
    async fn test_session_state_persists_between_jobs() {
        let shell = sh();
        assert!(shell.run(ShellCommand::new("cd").arg("/")).await.success);
        assert_eq!(shell.run_quick(ShellCommand::new("pwd")).await, "/");
        assert!(shell.run(ShellScript::new()).await.success);
    }

    #[tokio::test]
    async fn test_arguments_are_not_expanded() {
        let shell = sh();
        let out = shell.run_quick(ShellCommand::new("echo").arg("$(id -u); true")).await;
        assert_eq!(out, "$(id -u); true");
    }

    #[tokio::test]
    async fn test_shell_restarts_after_exit() {
        let shell = sh();
        let died = shell.run(ShellCommand::new("exit").arg("0")).await;
        assert!(!died.success);
        assert_eq!(died.error, Some(ShellError::ShellDied));

        let again = shell.run_quick(ShellCommand::new("echo").arg("back")).await;
        assert_eq!(again, "back");
    }

    #[tokio::test]
    async fn test_missing_shell_degrades_to_sentinel() {
        let shell = RootShell::start(ShellConfig {
            program: "/nonexistent/rootmod-su".to_string(),
            args: Vec::new(),
            require_root: false,
        });
        assert_eq!(shell.run_quick(ShellCommand::new("echo").arg("x")).await, UNKNOWN);

        let result = shell.run(ShellCommand::new("echo").arg("x")).await;
        assert!(!result.success);
        assert!(result
            .diagnostic()
            .unwrap_or_default()
            .contains("Failed to spawn shell"));
    }

    #[tokio::test]
    async fn test_require_root_rejects_unprivileged_shell() {
        let uid = std::process::Command::new("id").arg("-u").output().unwrap();
        if String::from_utf8_lossy(&uid.stdout).trim() == "0" {
            // Running as root: the probe would legitimately pass.
            return;
        }
        let shell = RootShell::start(ShellConfig {
            program: "sh".to_string(),
            args: Vec::new(),
            require_root: true,
        });
        let result = shell.run(ShellCommand::new("echo").arg("x")).await;
        assert!(!result.success);
        assert!(matches!(result.error, Some(ShellError::NotRoot(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_blocking_quick_from_worker_thread() {
        let shell = sh();
        let out = tokio::task::spawn_blocking(move || {
            shell.run_quick_blocking(ShellCommand::new("echo").arg("  padded  "))
        })
        .await
        .unwrap();
        assert_eq!(out, "padded");
    }
}
