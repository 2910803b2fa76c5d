//! The executor (§4.9.4): builtins, command resolution, pipelines,
//! redirection, logical chaining, sequencing, and history persistence.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::io::AsyncReadExt;

use vos_provider::{ByteReader, Environment};
use vos_vfs::VirtualOs;

use crate::ast::{LogicalChain, LogicalOp, Pipeline, RedirectKind, Sequence, Stage};
use crate::expand;
use crate::history::{self, HistoryEntry};
use crate::parser;

const MAX_HISTORY: usize = 1000;

/// The result of executing one command line: combined output text and an
/// exit code, 0 for success.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShellResult {
    pub output: String,
    pub code: i32,
}

/// Owns the façade, the mutable environment, and bounded history for one
/// shell session. Cheap to share behind an `Arc`: every operation borrows
/// `&self` (§9: "no process-global state required").
pub struct Shell {
    facade: Arc<VirtualOs>,
    env: RwLock<Environment>,
    history: Mutex<Vec<HistoryEntry>>,
    /// Tracks recursive `execute` calls made by command substitution so only
    /// the outermost call is recorded to history.
    depth: AtomicUsize,
}

impl Shell {
    #[must_use]
    pub fn new(facade: Arc<VirtualOs>, user: impl Into<String>) -> Self {
        let user = user.into();
        let home = vos_path::join("/home", &user);
        let mut env = Environment::new();
        env.set("USER", user);
        env.set("HOME", home.clone());
        env.set("PWD", "/".to_string());
        env.set("PATH", format!("/bin:{home}/.bin"));
        Shell {
            facade,
            env: RwLock::new(env),
            history: Mutex::new(Vec::new()),
            depth: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn facade(&self) -> &VirtualOs {
        &self.facade
    }

    /// A cloned snapshot of the current environment, safe to hold across an
    /// `await` point without contending the lock.
    #[must_use]
    pub fn env_snapshot(&self) -> Environment {
        self.env.read().clone()
    }

    pub fn set_env(&self, key: impl Into<String>, value: impl Into<String>) {
        self.env.write().set(key, value);
    }

    /// Load `<HOME>/.bash_history` into memory, if present. Call once at
    /// session start; never called automatically so tests stay hermetic.
    pub async fn load_history(&self) {
        let path = self.history_path();
        if let Ok(mut f) = self.facade.open(&path).await {
            if let Ok(bytes) = f.read_to_end().await {
                let text = String::from_utf8_lossy(&bytes).into_owned();
                *self.history.lock() = history::load(&text);
            }
        }
    }

    fn history_path(&self) -> String {
        vos_path::join(self.env_snapshot().home(), ".bash_history")
    }

    /// Parse and run one command line. `Execute("")` (or all-whitespace)
    /// returns `{"", 0}` without touching history (§4.9.4).
    pub async fn execute(&self, line: &str) -> ShellResult {
        if line.trim().is_empty() {
            return ShellResult::default();
        }

        self.depth.fetch_add(1, Ordering::SeqCst);
        let sequence = parser::parse(line);
        let result = self.run_sequence(&sequence).await;
        let depth_after = self.depth.fetch_sub(1, Ordering::SeqCst) - 1;

        if depth_after == 0 {
            self.record_history(line).await;
        }

        result
    }

    async fn record_history(&self, line: &str) {
        let rendered = {
            let mut h = self.history.lock();
            h.push(HistoryEntry::now(line));
            if h.len() > MAX_HISTORY {
                let excess = h.len() - MAX_HISTORY;
                h.drain(0..excess);
            }
            history::render(&h)
        };
        let path = self.history_path();
        let _ = self.facade.write(&path, Box::new(std::io::Cursor::new(rendered.into_bytes()))).await;
    }

    async fn run_sequence(&self, sequence: &Sequence) -> ShellResult {
        let mut output = String::new();
        let mut code = 0;
        for chain in &sequence.chains {
            let r = self.run_chain(chain).await;
            output.push_str(&r.output);
            code = r.code;
        }
        ShellResult { output, code }
    }

    async fn run_chain(&self, chain: &LogicalChain) -> ShellResult {
        let mut pipelines = chain.pipelines.iter();
        let Some(first) = pipelines.next() else {
            return ShellResult::default();
        };

        let mut result = self.run_pipeline(first).await;
        let mut output = result.output.clone();

        for (op, pipeline) in chain.ops.iter().zip(pipelines) {
            let should_run = match op {
                LogicalOp::And => result.code == 0,
                LogicalOp::Or => result.code != 0,
            };
            if should_run {
                result = self.run_pipeline(pipeline).await;
                output.push_str(&result.output);
            }
        }

        ShellResult { output, code: result.code }
    }

    async fn run_pipeline(&self, pipeline: &Pipeline) -> ShellResult {
        let n = pipeline.stages.len();
        let mut stdin: Option<Vec<u8>> = None;
        let mut code = 0;
        let mut bytes: Vec<u8> = Vec::new();

        for (i, stage) in pipeline.stages.iter().enumerate() {
            let is_last = i + 1 == n;
            let (out, stage_code) = self.run_stage(stage, stdin.take()).await;
            code = stage_code;
            bytes = out;
            if !is_last && stage_code != 0 {
                break;
            }
            stdin = Some(bytes.clone());
        }

        ShellResult { output: String::from_utf8_lossy(&bytes).into_owned(), code }
    }

    /// Run a single stage and return the bytes that flow downstream (empty
    /// when stdout was redirected to a file, per the single-stream model
    /// documented in the design notes) plus its exit code.
    async fn run_stage(&self, stage: &Stage, stdin: Option<Vec<u8>>) -> (Vec<u8>, i32) {
        if let Some(group) = &stage.group {
            let r = self.run_sequence(group).await;
            let bytes = r.output.into_bytes();
            self.apply_redirects(stage, &bytes).await;
            let downstream = if redirects_stdout(&stage.redirects) { Vec::new() } else { bytes };
            return (downstream, r.code);
        }

        let mut args = Vec::new();
        for word in &stage.words {
            match expand::expand_word(word, self).await {
                Ok(mut expanded) => args.append(&mut expanded),
                Err(e) => return (format!("{e}\n").into_bytes(), 1),
            }
        }
        if args.is_empty() {
            return (Vec::new(), 0);
        }

        let stdin_bytes = if let Some(heredoc) = &stage.stdin_heredoc {
            let body = if heredoc.expand {
                expand::expand_text(&heredoc.body, self).await.unwrap_or_else(|_| heredoc.body.clone())
            } else {
                heredoc.body.clone()
            };
            Some(body.into_bytes())
        } else {
            stdin
        };

        let (out, code) = self.dispatch(&args, stdin_bytes).await;
        self.apply_redirects(stage, &out).await;
        let downstream = if redirects_stdout(&stage.redirects) { Vec::new() } else { out };
        (downstream, code)
    }

    /// Write stage output to every file-backed redirect target. Append
    /// redirects read the existing content through the façade first, then
    /// rewrite the whole file with the concatenation (§4.9.4). `StderrToStdout`
    /// has no file target: with a single captured output stream there is no
    /// separate stderr to fold, so it is a no-op here (see DESIGN.md).
    async fn apply_redirects(&self, stage: &Stage, bytes: &[u8]) {
        for redirect in &stage.redirects {
            if matches!(redirect.kind, RedirectKind::StderrToStdout) {
                continue;
            }

            let Ok(expanded) = expand::expand_text(&redirect.target, self).await else {
                continue;
            };
            let env = self.env_snapshot();
            let target = expand_tilde(&expanded, env.home());
            let path = if target.starts_with('/') { target } else { vos_path::join(env.pwd(), &target) };

            let append = matches!(
                redirect.kind,
                RedirectKind::StdoutAppend | RedirectKind::StderrAppend | RedirectKind::BothAppend
            );

            let mut content = Vec::new();
            if append {
                if let Ok(mut f) = self.facade.open(&path).await {
                    content = f.read_to_end().await.unwrap_or_default();
                }
            }
            content.extend_from_slice(bytes);
            let _ = self.facade.write(&path, Box::new(std::io::Cursor::new(content))).await;
        }
    }

    async fn dispatch(&self, args: &[String], stdin: Option<Vec<u8>>) -> (Vec<u8>, i32) {
        match args[0].as_str() {
            "cd" => self.builtin_cd(&args[1..]).await,
            "pwd" => self.builtin_pwd(),
            "echo" => builtin_echo(&args[1..]),
            "env" => self.builtin_env(),
            "history" => self.builtin_history(&args[1..]).await,
            _ => self.run_external(args, stdin).await,
        }
    }

    async fn builtin_cd(&self, args: &[String]) -> (Vec<u8>, i32) {
        let env = self.env_snapshot();
        let target = match args.first() {
            Some(p) if p.starts_with('/') => p.clone(),
            Some(p) if p.starts_with('~') => expand_tilde(p, env.home()),
            Some(p) => vos_path::join(env.pwd(), p),
            None => env.home().to_string(),
        };

        match self.facade.stat(&target).await {
            Ok(entry) if entry.is_dir => {
                self.env.write().set("PWD", vos_path::normalize(&target));
                (Vec::new(), 0)
            }
            Ok(_) => (format!("cd: {target}: Not a directory\n").into_bytes(), 1),
            Err(_) => (format!("cd: {target}: No such file or directory\n").into_bytes(), 1),
        }
    }

    fn builtin_pwd(&self) -> (Vec<u8>, i32) {
        (format!("{}\n", self.env_snapshot().pwd()).into_bytes(), 0)
    }

    fn builtin_env(&self) -> (Vec<u8>, i32) {
        let env = self.env_snapshot();
        let mut vars: Vec<(String, String)> = env.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        vars.sort();
        let mut out = String::new();
        for (k, v) in vars {
            out.push_str(&format!("{k}={v}\n"));
        }
        (out.into_bytes(), 0)
    }

    async fn builtin_history(&self, args: &[String]) -> (Vec<u8>, i32) {
        match args.first().map(String::as_str) {
            Some("-c") => {
                self.history.lock().clear();
                self.persist_history().await;
                (Vec::new(), 0)
            }
            Some("-a") => {
                self.persist_history().await;
                (Vec::new(), 0)
            }
            Some("-n") => {
                self.load_history().await;
                (Vec::new(), 0)
            }
            Some("-d") => {
                let Some(n) = args.get(1).and_then(|s| s.parse::<usize>().ok()) else {
                    return (b"history: -d: option requires a numeric argument\n".to_vec(), 1);
                };
                let removed = {
                    let mut h = self.history.lock();
                    if n == 0 || n > h.len() {
                        false
                    } else {
                        h.remove(n - 1);
                        true
                    }
                };
                if !removed {
                    return (b"history: position out of range\n".to_vec(), 1);
                }
                self.persist_history().await;
                (Vec::new(), 0)
            }
            Some(other) => (format!("history: {other}: invalid option\n").into_bytes(), 1),
            None => {
                let entries = self.history.lock().clone();
                let mut out = String::new();
                for (i, entry) in entries.iter().enumerate() {
                    out.push_str(&format!("{:>5}  {}\n", i + 1, entry.command));
                }
                (out.into_bytes(), 0)
            }
        }
    }

    async fn persist_history(&self) {
        let rendered = history::render(&self.history.lock());
        let path = self.history_path();
        let _ = self.facade.write(&path, Box::new(std::io::Cursor::new(rendered.into_bytes()))).await;
    }

    async fn resolve_command(&self, cmd: &str, env: &Environment) -> Option<String> {
        if cmd.contains('/') {
            let path = if cmd.starts_with('/') { cmd.to_string() } else { vos_path::join(env.pwd(), cmd) };
            return Some(path);
        }
        for dir in env.path().split(':').filter(|d| !d.is_empty()) {
            let candidate = vos_path::join(dir, cmd);
            if let Ok(entry) = self.facade.stat(&candidate).await {
                if entry.perm.can_execute() {
                    return Some(candidate);
                }
            }
        }
        None
    }

    /// Resolve, substitute directories for `ls`, invoke, and format failures
    /// as `<command>: <error>` (§7).
    async fn run_external(&self, args: &[String], stdin: Option<Vec<u8>>) -> (Vec<u8>, i32) {
        let cmd = &args[0];
        let env = self.env_snapshot();

        let Some(mut resolved) = self.resolve_command(cmd, &env).await else {
            return (format!("command not found: {cmd}\n").into_bytes(), 1);
        };

        let mut call_args: Vec<String> = args[1..].to_vec();

        if let Ok(entry) = self.facade.stat(&resolved).await {
            if entry.is_dir {
                call_args = vec![resolved.clone()];
                resolved = self.resolve_command("ls", &env).await.unwrap_or_else(|| "/bin/ls".to_string());
            }
        }

        let stdin_reader: Option<ByteReader> = stdin.map(|b| Box::new(std::io::Cursor::new(b)) as ByteReader);

        match self.facade.exec(&resolved, call_args, stdin_reader, &env).await {
            Ok(mut reader) => {
                let mut buf = Vec::new();
                match reader.read_to_end(&mut buf).await {
                    Ok(_) => (buf, 0),
                    Err(e) => (format!("{cmd}: {e}\n").into_bytes(), 1),
                }
            }
            // An empty-message `Other` error is the `false`-style convention
            // for a silent non-zero exit (§4.3 carries no exit code through
            // `Exec` itself; see DESIGN.md).
            Err(vos_provider::VfsError::Other { message }) if message.is_empty() => (Vec::new(), 1),
            Err(e) => (format!("{cmd}: {e}\n").into_bytes(), 1),
        }
    }
}

fn redirects_stdout(redirects: &[crate::ast::Redirect]) -> bool {
    redirects.iter().any(|r| {
        matches!(
            r.kind,
            RedirectKind::StdoutOverwrite | RedirectKind::StdoutAppend | RedirectKind::BothOverwrite | RedirectKind::BothAppend
        )
    })
}

fn expand_tilde(s: &str, home: &str) -> String {
    if s == "~" {
        return home.to_string();
    }
    if let Some(rest) = s.strip_prefix("~/") {
        return vos_path::join(home, rest);
    }
    s.to_string()
}

/// `echo [-n] [-e|-E] args...` (§4.9.4). `-e` interprets backslash escapes;
/// `-E` (the default) does not. `-n` suppresses the trailing newline.
fn builtin_echo(args: &[String]) -> (Vec<u8>, i32) {
    let mut no_newline = false;
    let mut interpret = false;
    let mut i = 0;

    while i < args.len() {
        match args[i].as_str() {
            "-n" => no_newline = true,
            "-e" => interpret = true,
            "-E" => interpret = false,
            _ => break,
        }
        i += 1;
    }

    let joined = args[i..].join(" ");
    let mut out = if interpret { interpret_escapes(&joined) } else { joined };
    if !no_newline {
        out.push('\n');
    }
    (out.into_bytes(), 0)
}

/// Interpret `echo -e` backslash escapes: `\n \t \r \a \b \f \v \\`, `\0NNN`
/// octal, `\xNN` hex, and `\c` (suppress the rest of the output, newline
/// included).
fn interpret_escapes(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::new();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] != '\\' || i + 1 >= chars.len() {
            out.push(chars[i]);
            i += 1;
            continue;
        }

        match chars[i + 1] {
            'n' => { out.push('\n'); i += 2; }
            't' => { out.push('\t'); i += 2; }
            'r' => { out.push('\r'); i += 2; }
            'a' => { out.push('\u{7}'); i += 2; }
            'b' => { out.push('\u{8}'); i += 2; }
            'f' => { out.push('\u{c}'); i += 2; }
            'v' => { out.push('\u{b}'); i += 2; }
            '\\' => { out.push('\\'); i += 2; }
            'c' => return out,
            '0' => {
                let mut j = i + 2;
                let mut digits = String::new();
                while digits.len() < 3 && j < chars.len() && chars[j].is_digit(8) {
                    digits.push(chars[j]);
                    j += 1;
                }
                if let Ok(byte) = u8::from_str_radix(&digits, 8) {
                    out.push(byte as char);
                }
                i = j;
            }
            'x' => {
                let mut j = i + 2;
                let mut digits = String::new();
                while digits.len() < 2 && j < chars.len() && chars[j].is_ascii_hexdigit() {
                    digits.push(chars[j]);
                    j += 1;
                }
                if let Ok(byte) = u8::from_str_radix(&digits, 16) {
                    out.push(byte as char);
                }
                i = j;
            }
            other => {
                out.push('\\');
                out.push(other);
                i += 2;
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use vos_provider::Permission;
    use vos_provider_memory::MemoryProvider;

    fn shell() -> Shell {
        let mem = Arc::new(MemoryProvider::new());
        mem.add_file("/a.txt", Permission::RW, b"line one\nline two\n".to_vec());
        let facade = Arc::new(VirtualOs::new(mem));
        Shell::new(facade, "tester")
    }

    #[tokio::test]
    async fn empty_line_returns_empty_result() {
        let shell = shell();
        let r = shell.execute("").await;
        assert_eq!(r, ShellResult::default());
        assert!(shell.history.lock().is_empty());
    }

    #[tokio::test]
    async fn echo_prints_joined_args_with_newline() {
        let shell = shell();
        let r = shell.execute("echo hi there").await;
        assert_eq!(r.output, "hi there\n");
        assert_eq!(r.code, 0);
    }

    #[tokio::test]
    async fn echo_dash_n_suppresses_newline() {
        let shell = shell();
        let r = shell.execute("echo -n hi").await;
        assert_eq!(r.output, "hi");
    }

    #[tokio::test]
    async fn echo_dash_e_interprets_escapes() {
        let shell = shell();
        let r = shell.execute("echo -e a\\\\nb").await;
        assert_eq!(r.output, "a\nb\n");
    }

    #[tokio::test]
    async fn cd_then_pwd_reflects_new_directory() {
        let shell = shell();
        shell.facade().mkdir("/work", Permission::RWX).await.unwrap();
        let cd = shell.execute("cd /work").await;
        assert_eq!(cd.code, 0);
        let pwd = shell.execute("pwd").await;
        assert_eq!(pwd.output, "/work\n");
    }

    #[tokio::test]
    async fn cd_into_file_fails() {
        let shell = shell();
        let r = shell.execute("cd /a.txt").await;
        assert_eq!(r.code, 1);
        assert!(r.output.contains("Not a directory"));
    }

    #[tokio::test]
    async fn and_chain_short_circuits_on_failure() {
        let shell = shell();
        let r = shell.execute("cd /nope && echo unreachable").await;
        assert_eq!(r.code, 1);
        assert!(!r.output.contains("unreachable"));
    }

    #[tokio::test]
    async fn or_chain_runs_fallback_on_failure() {
        let shell = shell();
        let r = shell.execute("cd /nope || echo fallback").await;
        assert_eq!(r.code, 0);
        assert_eq!(r.output, "cd: /nope: No such file or directory\nfallback\n");
    }

    #[tokio::test]
    async fn sequence_runs_every_stage_regardless_of_code() {
        let shell = shell();
        let r = shell.execute("echo a; cd /nope; echo b").await;
        assert!(r.output.contains('a'));
        assert!(r.output.contains('b'));
        assert_eq!(r.code, 0);
    }

    #[tokio::test]
    async fn redirect_overwrite_writes_target_and_empties_downstream() {
        let shell = shell();
        let r = shell.execute("echo hi > /out.txt").await;
        assert_eq!(r.output, "");
        let mut f = shell.facade().open("/out.txt").await.unwrap();
        assert_eq!(f.read_to_end().await.unwrap(), b"hi\n");
    }

    #[tokio::test]
    async fn redirect_append_concatenates_existing_content() {
        let shell = shell();
        shell.execute("echo first > /log.txt").await;
        shell.execute("echo second >> /log.txt").await;
        let mut f = shell.facade().open("/log.txt").await.unwrap();
        assert_eq!(f.read_to_end().await.unwrap(), b"first\nsecond\n");
    }

    #[tokio::test]
    async fn command_not_found_reports_and_fails() {
        let shell = shell();
        let r = shell.execute("nope-at-all").await;
        assert_eq!(r.code, 1);
        assert!(r.output.contains("command not found: nope-at-all"));
    }

    #[tokio::test]
    async fn history_records_successful_commands_in_order() {
        let shell = shell();
        shell.execute("echo a").await;
        shell.execute("echo b").await;
        let r = shell.execute("history").await;
        assert!(r.output.contains("echo a"));
        assert!(r.output.contains("echo b"));
        assert!(!r.output.contains("history"));
    }

    #[tokio::test]
    async fn command_substitution_does_not_pollute_history() {
        let shell = shell();
        shell.execute("echo $(echo inner)").await;
        let r = shell.execute("history").await;
        let count = r.output.lines().filter(|l| l.contains("echo inner")).count();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn history_dash_c_clears() {
        let shell = shell();
        shell.execute("echo a").await;
        shell.execute("history -c").await;
        let r = shell.execute("history").await;
        assert_eq!(r.output, "");
    }

    #[tokio::test]
    async fn env_lists_sorted_vars() {
        let shell = shell();
        let r = shell.execute("env").await;
        let lines: Vec<&str> = r.output.lines().collect();
        let mut sorted = lines.clone();
        sorted.sort();
        assert_eq!(lines, sorted);
        assert!(r.output.contains("USER=tester"));
    }

    #[tokio::test]
    async fn pipeline_feeds_stdout_into_next_stdin() {
        let mem = Arc::new(MemoryProvider::new());
        let facade = Arc::new(VirtualOs::new(mem));
        let shell = Shell::new(facade, "tester");
        let r = shell.execute("echo hello | echo piped").await;
        assert_eq!(r.output, "piped\n");
        assert_eq!(r.code, 0);
    }
}
