//! The per-command shell interaction loop.
//!
//! Given an already-open interactive channel and a validated command, drive
//! the remote shell until an exit-status sentinel, a limit, or a failure
//! ends the command, answering password prompts along the way. The loop has
//! to survive three hostile conditions: prompts that would block forever,
//! pagers that swallow output, and unbounded or silent output.

use crate::broker::{PasswordBroker, RequestContext};
use crate::SessionError;
use regex::Regex;
use russh::client::Msg;
use russh::{Channel, ChannelMsg};
use secrecy::{ExposeSecret, SecretString};
use shellgate_policy::PolicyEngine;
use shellgate_types::{CommandResult, PromptKind};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Abort after this much silence, once password strategies are exhausted.
pub(crate) const HANG_WATCHDOG: Duration = Duration::from_secs(10);

/// Receive tick bounding `channel.wait()` so wall-clock timers stay live.
const RECV_TICK: Duration = Duration::from_millis(50);

/// Re-scan the buffer for prompts at least this often, even without new
/// output.
const PROMPT_SCAN_INTERVAL: Duration = Duration::from_millis(500);

/// Prompts sit at the end of the stream; bounding the scan keeps large
/// outputs cheap.
const PROMPT_SCAN_WINDOW: usize = 4096;

/// Speculative sudo send: prompt may be echo-suppressed.
const SUDO_SPECULATIVE_DELAY: Duration = Duration::from_millis(500);

/// Last-resort sudo send.
const SUDO_LAST_RESORT_DELAY: Duration = Duration::from_secs(3);

/// Shell prelude sent once per session at connect time: a predictable
/// prompt, no echo, and no pagers anywhere.
pub(crate) const ENV_PRELUDE: &[&str] = &[
    "export TERM=xterm",
    "export PS1='$ '",
    "stty -echo",
    "export PAGER=cat",
    "export SYSTEMD_PAGER=cat",
    "export SYSTEMD_LESS=",
    "export SYSTEMD_COLORS=0",
    "export GIT_PAGER=cat",
    "export MANPAGER=cat",
];

// ── Password handlers ────────────────────────────────────────────

/// Handler chain entry, tried in order when a prompt is detected.
pub(crate) enum PasswordHandler {
    /// A literal elevation password is configured for this command.
    Sudo { password: SecretString },
    /// Ask the upstream client out-of-band through the broker.
    Interactive { broker: Arc<PasswordBroker> },
}

enum PromptAction {
    Send(SecretString),
    Fail(String),
}

// ── Execution context ────────────────────────────────────────────

/// Everything one command's read loop needs, passed by reference.
pub(crate) struct ExecContext {
    pub command: String,
    pub sanitized: String,
    pub input_data: Option<String>,
    pub deadline_ms: u64,
    pub cap_bytes: usize,
    pub max_lines: usize,
    pub handlers: Vec<PasswordHandler>,
    pub is_sudo: bool,
    pub force_noninteractive_sudo: bool,
    pub broker_timeout: Duration,
    pub request_context: RequestContext,
}

impl ExecContext {
    fn configured_sudo_password(&self) -> Option<&SecretString> {
        self.handlers.iter().find_map(|h| match h {
            PasswordHandler::Sudo { password } => Some(password),
            PasswordHandler::Interactive { .. } => None,
        })
    }
}

// ── Compiled patterns ────────────────────────────────────────────

/// Regexes the loop needs, compiled once per session.
pub(crate) struct ShellPatterns {
    sentinel: Regex,
    sentinel_strip: Regex,
    ansi_colors: Regex,
    prompt_line: Regex,
    prompt_tail: Regex,
    prompts: Vec<(PromptKind, Regex)>,
}

impl ShellPatterns {
    pub(crate) fn new() -> Self {
        let compile = |p: &str| Regex::new(p).expect("shell pattern compiles");
        // Ordered most-specific first; the generic `password:` shape must
        // come last.
        let prompts = vec![
            (PromptKind::Sudo, compile(r"(?i)\[sudo\] password for [^:]+:")),
            (PromptKind::Sudo, compile(r"(?i)password for [^:]+:")),
            (PromptKind::Sudo, compile(r"sudo: a terminal is required to read the password")),
            (PromptKind::Sudo, compile(r"sudo: no tty present and no askpass program specified")),
            (PromptKind::Sudo, compile(r"(?i)PAM authentication error")),
            (PromptKind::Sudo, compile(r"Try again\.")),
            (PromptKind::Ssh, compile(r"(?i)SSH password:")),
            (PromptKind::Ssh, compile(r"(?i)SSH key passphrase:")),
            (PromptKind::Login, compile(r"(?im)^login:")),
            (PromptKind::Interactive, compile(r"(?i)enter password:")),
            (PromptKind::Interactive, compile(r"(?i)password:")),
        ];
        Self {
            sentinel: compile(r"__EXIT_STATUS:(\d+)__"),
            sentinel_strip: compile(r"__EXIT_STATUS:\d+__\s*"),
            ansi_colors: compile(r"\x1b\[[0-9;]*m"),
            prompt_line: compile(r"^[$#]\s*$"),
            prompt_tail: compile(r"(?m)[$#]\s*$"),
            prompts,
        }
    }

    /// First prompt shape present in the buffer tail, if any.
    fn detect_prompt(&self, buffer: &str) -> Option<(PromptKind, String)> {
        let mut start = buffer.len().saturating_sub(PROMPT_SCAN_WINDOW);
        while !buffer.is_char_boundary(start) {
            start += 1;
        }
        let tail = &buffer[start..];
        for (kind, pattern) in &self.prompts {
            if let Some(m) = pattern.find(tail) {
                return Some((*kind, m.as_str().to_string()));
            }
        }
        None
    }

    /// Parse and strip the exit-status sentinel. Leaves a partially
    /// received sentinel in place for the next chunk.
    fn extract_exit_status(&self, buffer: &mut String) -> Option<i32> {
        if !buffer.contains("__EXIT_STATUS:") {
            return None;
        }
        let status: i32 = self
            .sentinel
            .captures(buffer)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())?;
        *buffer = self.sentinel_strip.replace_all(buffer, "").into_owned();
        Some(status)
    }

    /// Strip shell echoes, residual prompt lines, and ANSI colors.
    fn clean_output(&self, raw: &str) -> String {
        raw.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !self.prompt_line.is_match(line))
            .map(|line| self.ansi_colors.replace_all(line, "").into_owned())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ── Command normalization and framing ────────────────────────────

/// Rewrite the command so it cannot hang on pagers or interactive sudo.
/// Pipe segments are inspected independently: only segments naming the
/// service manager or log-query tool get the pager flags.
pub(crate) fn normalize_noninteractive(cmd: &str, force_noninteractive_sudo: bool) -> String {
    let mut cmd = cmd.trim().to_string();

    if force_noninteractive_sudo && cmd.starts_with("sudo ") {
        let mut parts: Vec<&str> = cmd.split_whitespace().collect();
        let has_flag = parts.iter().skip(1).take(2).any(|p| *p == "-n");
        if !has_flag {
            parts.insert(1, "-n");
        }
        cmd = parts.join(" ");
    }

    if cmd.contains('|') {
        let segments: Vec<String> = cmd
            .split('|')
            .map(|segment| {
                if segment.contains("systemctl") || segment.contains("journalctl") {
                    append_pager_flags(segment.trim())
                } else {
                    // Untouched, so `||` chains survive the round trip.
                    segment.to_string()
                }
            })
            .collect();
        segments.join("|")
    } else {
        append_pager_flags(&cmd)
    }
}

fn append_pager_flags(segment: &str) -> String {
    let mut out = segment.to_string();
    if segment.contains("systemctl") || segment.contains("journalctl") {
        if !out.contains("--no-pager") {
            out.push_str(" --no-pager");
        }
        if segment.contains("systemctl") && !out.contains("--plain") {
            out.push_str(" --plain");
        }
    }
    out
}

/// Compose the command so the real exit code survives the PTY stream.
pub(crate) fn frame_command(cmd: &str) -> String {
    format!("set +e; {cmd}; echo __EXIT_STATUS:$?__\n")
}

/// The three proactive elevation strategies, collapsed into one decision so
/// the latch can be replayed deterministically: reactive on a visible cue,
/// speculative at 0.5 s with an empty buffer, last resort at 3 s.
pub(crate) fn should_send_sudo_password(
    elapsed: Duration,
    buffer_empty: bool,
    cue_visible: bool,
    already_sent: bool,
) -> bool {
    if already_sent {
        return false;
    }
    cue_visible
        || (elapsed >= SUDO_SPECULATIVE_DELAY && buffer_empty)
        || elapsed >= SUDO_LAST_RESORT_DELAY
}

fn sudo_cue_visible(buffer: &str) -> bool {
    buffer.to_lowercase().contains("password") || buffer.contains("[sudo]")
}

// ── The read loop ────────────────────────────────────────────────

struct LoopState {
    stdout: String,
    stderr: String,
    total_bytes: usize,
    truncated: bool,
    exit_status: Option<i32>,
    password_error: Option<String>,
    sudo_password_sent: bool,
    prompt_scan_due: bool,
    last_output: Instant,
    last_prompt_scan: Instant,
}

/// Send one framed command and capture its output.
///
/// Runs with the session mutex held; the channel is exclusively ours until
/// the command resolves one way or another.
pub(crate) async fn run_command(
    channel: &mut Channel<Msg>,
    patterns: &ShellPatterns,
    policy: &PolicyEngine,
    ctx: &ExecContext,
) -> Result<CommandResult, SessionError> {
    let started = Instant::now();
    let deadline = started + Duration::from_millis(ctx.deadline_ms);

    let normalized = normalize_noninteractive(&ctx.sanitized, ctx.force_noninteractive_sudo);
    channel.data(frame_command(&normalized).as_bytes()).await?;
    if let Some(input) = &ctx.input_data {
        let mut input = input.clone();
        if !input.ends_with('\n') {
            input.push('\n');
        }
        channel.data(input.as_bytes()).await?;
    }

    let mut state = LoopState {
        stdout: String::new(),
        stderr: String::new(),
        total_bytes: 0,
        truncated: false,
        exit_status: None,
        password_error: None,
        sudo_password_sent: false,
        prompt_scan_due: false,
        last_output: started,
        last_prompt_scan: started,
    };

    loop {
        if Instant::now() >= deadline {
            return Ok(deadline_result(patterns, policy, ctx, &state, started));
        }

        match tokio::time::timeout(RECV_TICK, channel.wait()).await {
            Ok(Some(ChannelMsg::Data { ref data })) => {
                state.stdout.push_str(&String::from_utf8_lossy(data));
                state.total_bytes += data.len();
                state.last_output = Instant::now();
                state.prompt_scan_due = true;
                if let Some(status) = patterns.extract_exit_status(&mut state.stdout) {
                    state.exit_status = Some(status);
                }
            }
            Ok(Some(ChannelMsg::ExtendedData { ref data, ext })) if ext == 1 => {
                state.stderr.push_str(&String::from_utf8_lossy(data));
                state.total_bytes += data.len();
                state.last_output = Instant::now();
            }
            // The sentinel is authoritative for per-command status on a
            // long-lived shell; channel-level exit only arrives at close.
            Ok(Some(ChannelMsg::ExitStatus { .. })) => {}
            Ok(Some(ChannelMsg::Eof)) | Ok(Some(ChannelMsg::Close)) | Ok(None) => {
                return Err(SessionError::Transport(
                    "channel closed before command completed".to_string(),
                ));
            }
            Ok(Some(_)) => {}
            // Receive tick elapsed with no traffic; fall through to timers.
            Err(_) => {}
        }

        // Cap first: a single chunk can carry both the overflow and the
        // sentinel, and the truncation flag must survive that.
        if state.total_bytes > ctx.cap_bytes {
            state.truncated = true;
            break;
        }
        if state.exit_status.is_some() {
            break;
        }

        if state.password_error.is_none()
            && (state.prompt_scan_due
                || state.last_prompt_scan.elapsed() >= PROMPT_SCAN_INTERVAL)
        {
            state.prompt_scan_due = false;
            state.last_prompt_scan = Instant::now();
            handle_prompts(channel, patterns, ctx, &mut state).await?;
        }
        if state.password_error.is_some() {
            state.exit_status = Some(1);
            break;
        }

        // Proactive elevation: a configured sudo password may be sent once,
        // even before any prompt text is visible.
        if ctx.is_sudo && !state.sudo_password_sent {
            if let Some(password) = ctx.configured_sudo_password() {
                let decide = should_send_sudo_password(
                    started.elapsed(),
                    state.stdout.trim().is_empty(),
                    sudo_cue_visible(&state.stdout),
                    state.sudo_password_sent,
                );
                if decide {
                    tracing::debug!(
                        session_id = %ctx.request_context.session_id,
                        "sending configured sudo password"
                    );
                    send_password(channel, password).await?;
                    state.stdout.clear();
                    state.sudo_password_sent = true;
                    state.last_output = Instant::now();
                }
            }
        }

        if state.last_output.elapsed() > HANG_WATCHDOG {
            return Ok(hang_result(ctx, started));
        }
    }

    if state.password_error.is_some() {
        return Ok(password_error_result(ctx, &state, started));
    }

    Ok(final_result(patterns, policy, ctx, state, started))
}

/// Detect a prompt in the buffered output and run the handler chain.
async fn handle_prompts(
    channel: &mut Channel<Msg>,
    patterns: &ShellPatterns,
    ctx: &ExecContext,
    state: &mut LoopState,
) -> Result<(), SessionError> {
    let Some((kind, text)) = patterns.detect_prompt(&state.stdout) else {
        return Ok(());
    };

    match dispatch_handlers(ctx, kind, &text).await {
        PromptAction::Send(password) => {
            tracing::debug!(
                session_id = %ctx.request_context.session_id,
                prompt_type = %kind,
                "answering password prompt"
            );
            send_password(channel, &password).await?;
            // Clear so the already-consumed prompt is not re-detected, and
            // latch the sudo send so the proactive sender stays quiet.
            state.stdout.clear();
            if ctx.is_sudo || kind == PromptKind::Sudo {
                state.sudo_password_sent = true;
            }
            state.last_output = Instant::now();
        }
        PromptAction::Fail(reason) => {
            tracing::warn!(
                session_id = %ctx.request_context.session_id,
                prompt_type = %kind,
                "password prompt unanswerable: {reason}"
            );
            state.password_error = Some(reason);
        }
    }
    Ok(())
}

async fn dispatch_handlers(ctx: &ExecContext, kind: PromptKind, text: &str) -> PromptAction {
    for handler in &ctx.handlers {
        match handler {
            PasswordHandler::Sudo { password } => {
                let handles = kind == PromptKind::Sudo
                    || (ctx.is_sudo && kind == PromptKind::Interactive);
                if handles {
                    return PromptAction::Send(password.clone());
                }
            }
            PasswordHandler::Interactive { broker } => {
                let delivered = broker
                    .request_password(text, kind, &ctx.request_context, ctx.broker_timeout)
                    .await;
                return match delivered {
                    Some(password) => PromptAction::Send(password),
                    None => PromptAction::Fail(
                        "password request was cancelled or timed out".to_string(),
                    ),
                };
            }
        }
    }
    PromptAction::Fail(
        "Password required but not provided. Pass sudo_password or set \
         SHELLGATE_SUDO_PASSWORD."
            .to_string(),
    )
}

async fn send_password(
    channel: &mut Channel<Msg>,
    password: &SecretString,
) -> Result<(), SessionError> {
    let line = format!("{}\n", password.expose_secret());
    channel.data(line.as_bytes()).await?;
    Ok(())
}

// ── Result construction ──────────────────────────────────────────

fn hang_result(ctx: &ExecContext, started: Instant) -> CommandResult {
    let stderr = if ctx.is_sudo {
        format!(
            "Sudo command timed out: {}. Ensure the sudo password is configured correctly.",
            ctx.command
        )
    } else {
        "Command timed out - may be waiting for input. Check if a password is required."
            .to_string()
    };
    CommandResult {
        stdout: String::new(),
        stderr,
        exit_status: Some(1),
        duration_ms: started.elapsed().as_millis() as u64,
        truncated: false,
        session_id: ctx.request_context.session_id.clone(),
    }
}

fn password_error_result(ctx: &ExecContext, state: &LoopState, started: Instant) -> CommandResult {
    CommandResult {
        stdout: String::new(),
        stderr: state.password_error.clone().unwrap_or_default(),
        exit_status: Some(1),
        duration_ms: started.elapsed().as_millis() as u64,
        truncated: false,
        session_id: ctx.request_context.session_id.clone(),
    }
}

fn deadline_result(
    patterns: &ShellPatterns,
    policy: &PolicyEngine,
    ctx: &ExecContext,
    state: &LoopState,
    started: Instant,
) -> CommandResult {
    let stdout = policy.redact_secrets(&patterns.clean_output(&state.stdout));
    let mut stderr = policy.redact_secrets(&state.stderr);
    if !stderr.is_empty() {
        stderr.push('\n');
    }
    stderr.push_str(&format!(
        "command deadline of {} ms exceeded; output may be partial",
        ctx.deadline_ms
    ));
    CommandResult {
        stdout,
        stderr,
        exit_status: None,
        duration_ms: started.elapsed().as_millis() as u64,
        truncated: false,
        session_id: ctx.request_context.session_id.clone(),
    }
}

fn final_result(
    patterns: &ShellPatterns,
    policy: &PolicyEngine,
    ctx: &ExecContext,
    mut state: LoopState,
    started: Instant,
) -> CommandResult {
    // The byte cap bounds pre-redaction output.
    if state.truncated && state.stdout.len() > ctx.cap_bytes {
        let mut end = ctx.cap_bytes;
        while !state.stdout.is_char_boundary(end) {
            end -= 1;
        }
        state.stdout.truncate(end);
    }

    let stdout = policy.redact_secrets(&patterns.clean_output(&state.stdout));
    let stderr = policy.redact_secrets(&state.stderr);
    let (stdout, truncated) = limit_lines(stdout, ctx.max_lines, state.truncated);

    CommandResult {
        stdout,
        stderr,
        exit_status: state.exit_status,
        duration_ms: started.elapsed().as_millis() as u64,
        truncated,
        session_id: ctx.request_context.session_id.clone(),
    }
}

fn limit_lines(stdout: String, max_lines: usize, already_truncated: bool) -> (String, bool) {
    let lines: Vec<&str> = stdout.lines().collect();
    if lines.len() <= max_lines {
        return (stdout, already_truncated);
    }
    let mut limited: Vec<&str> = lines.into_iter().take(max_lines).collect();
    let marker = format!("... [output truncated after {max_lines} lines]");
    limited.push(&marker);
    (limited.join("\n"), true)
}

// ── Connect-time prologue ────────────────────────────────────────

/// Read until a shell prompt shows up, bounded by `timeout`. A missing
/// prompt is logged, not fatal: some shells draw no prompt until input.
pub(crate) async fn wait_for_prompt(
    channel: &mut Channel<Msg>,
    patterns: &ShellPatterns,
    timeout: Duration,
) {
    let deadline = Instant::now() + timeout;
    let mut buffer = String::new();
    while Instant::now() < deadline {
        match tokio::time::timeout(Duration::from_millis(100), channel.wait()).await {
            Ok(Some(ChannelMsg::Data { ref data })) => {
                buffer.push_str(&String::from_utf8_lossy(data));
                if patterns.prompt_tail.is_match(&buffer) {
                    return;
                }
            }
            Ok(Some(_)) => {}
            Ok(None) => return,
            Err(_) => {}
        }
    }
    tracing::warn!("shell prompt not detected during connect");
}

/// Send the environment prelude, one line at a time.
pub(crate) async fn send_prelude(channel: &mut Channel<Msg>) -> Result<(), SessionError> {
    for line in ENV_PRELUDE {
        channel.data(format!("{line}\n").as_bytes()).await?;
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns() -> ShellPatterns {
        ShellPatterns::new()
    }

    // ── framing ─────────────────────────────────────────────────

    #[test]
    fn test_frame_command() {
        let framed = frame_command("ls -la");
        assert_eq!(framed, "set +e; ls -la; echo __EXIT_STATUS:$?__\n");
    }

    #[test]
    fn test_sentinel_extraction() {
        let p = patterns();
        let mut buffer = "total 4\nfile.txt\n__EXIT_STATUS:0__\n".to_string();
        assert_eq!(p.extract_exit_status(&mut buffer), Some(0));
        assert!(!buffer.contains("__EXIT_STATUS"));
        assert!(buffer.contains("file.txt"));
    }

    #[test]
    fn test_sentinel_partial_chunk_waits() {
        let p = patterns();
        let mut buffer = "out\n__EXIT_STATUS:4".to_string();
        assert_eq!(p.extract_exit_status(&mut buffer), None);
        buffer.push_str("2__\n");
        assert_eq!(p.extract_exit_status(&mut buffer), Some(42));
    }

    #[test]
    fn test_sentinel_never_in_output() {
        let p = patterns();
        for status in [0, 1, 17, 255] {
            let mut buffer = format!("line\n__EXIT_STATUS:{status}__\n");
            assert_eq!(p.extract_exit_status(&mut buffer), Some(status));
            assert!(!buffer.contains("__EXIT_STATUS"));
        }
    }

    // ── normalization ───────────────────────────────────────────

    #[test]
    fn test_sudo_noninteractive_insertion() {
        assert_eq!(
            normalize_noninteractive("sudo whoami", true),
            "sudo -n whoami"
        );
        // Already present: unchanged
        assert_eq!(
            normalize_noninteractive("sudo -n whoami", true),
            "sudo -n whoami"
        );
        // Not forced: unchanged
        assert_eq!(normalize_noninteractive("sudo whoami", false), "sudo whoami");
    }

    #[test]
    fn test_pager_flags_appended() {
        let out = normalize_noninteractive("systemctl status nginx", false);
        assert!(out.contains("--no-pager"));
        assert!(out.contains("--plain"));

        let out = normalize_noninteractive("journalctl -n 50", false);
        assert!(out.contains("--no-pager"));
        assert!(!out.contains("--plain"));
    }

    #[test]
    fn test_pager_flags_only_on_matching_pipe_segments() {
        let out = normalize_noninteractive("systemctl status nginx | grep active", false);
        let segments: Vec<&str> = out.split('|').collect();
        assert!(segments[0].contains("--no-pager"));
        assert!(segments[0].contains("--plain"));
        assert!(!segments[1].contains("--no-pager"));
    }

    #[test]
    fn test_or_chains_survive_normalization() {
        let out = normalize_noninteractive("true || echo fallback", false);
        assert_eq!(out, "true || echo fallback");
    }

    #[test]
    fn test_plain_commands_unchanged() {
        assert_eq!(normalize_noninteractive("ls -la", false), "ls -la");
        assert_eq!(
            normalize_noninteractive("ps aux | grep nginx", false),
            "ps aux | grep nginx"
        );
    }

    // ── prompts ─────────────────────────────────────────────────

    #[test]
    fn test_detect_sudo_prompt() {
        let p = patterns();
        let (kind, text) = p
            .detect_prompt("some output\n[sudo] password for admin:")
            .unwrap();
        assert_eq!(kind, PromptKind::Sudo);
        assert!(text.contains("[sudo]"));
    }

    #[test]
    fn test_detect_no_tty_as_sudo() {
        let p = patterns();
        let (kind, _) = p
            .detect_prompt("sudo: no tty present and no askpass program specified")
            .unwrap();
        assert_eq!(kind, PromptKind::Sudo);
    }

    #[test]
    fn test_detect_generic_password_prompt() {
        let p = patterns();
        let (kind, _) = p.detect_prompt("Password:").unwrap();
        assert_eq!(kind, PromptKind::Interactive);
    }

    #[test]
    fn test_no_prompt_in_ordinary_output() {
        let p = patterns();
        assert!(p.detect_prompt("total 4\nfile.txt\n").is_none());
    }

    // ── proactive sudo decision ─────────────────────────────────

    #[test]
    fn test_sudo_strategies() {
        let ms = Duration::from_millis;
        // Reactive: cue visible, send regardless of elapsed time
        assert!(should_send_sudo_password(ms(10), false, true, false));
        // Speculative: half a second of empty buffer
        assert!(should_send_sudo_password(ms(600), true, false, false));
        assert!(!should_send_sudo_password(ms(400), true, false, false));
        // Non-empty buffer without cue: wait for the last resort
        assert!(!should_send_sudo_password(ms(600), false, false, false));
        assert!(should_send_sudo_password(ms(3100), false, false, false));
        // The latch wins over everything
        assert!(!should_send_sudo_password(ms(3100), true, true, true));
    }

    // ── epilogue ────────────────────────────────────────────────

    #[test]
    fn test_clean_output_strips_prompts_and_ansi() {
        let p = patterns();
        let raw = "$ \n\x1b[31mred line\x1b[0m\nplain\n# \n";
        assert_eq!(p.clean_output(raw), "red line\nplain");
    }

    // ── result construction ─────────────────────────────────────

    fn exec_ctx(command: &str) -> ExecContext {
        ExecContext {
            command: command.to_string(),
            sanitized: command.to_string(),
            input_data: None,
            deadline_ms: 300_000,
            cap_bytes: 4096,
            max_lines: 10_000,
            handlers: Vec::new(),
            is_sudo: command.trim().starts_with("sudo"),
            force_noninteractive_sudo: false,
            broker_timeout: Duration::from_secs(60),
            request_context: RequestContext {
                session_id: "s1".to_string(),
                host: "h".to_string(),
                username: "u".to_string(),
                command: command.to_string(),
            },
        }
    }

    fn loop_state(stdout: String) -> LoopState {
        LoopState {
            stdout,
            stderr: String::new(),
            total_bytes: 0,
            truncated: false,
            exit_status: None,
            password_error: None,
            sudo_password_sent: false,
            prompt_scan_due: false,
            last_output: Instant::now(),
            last_prompt_scan: Instant::now(),
        }
    }

    #[test]
    fn test_hang_result_messages() {
        let result = hang_result(&exec_ctx("tail -f /var/log/syslog"), Instant::now());
        assert_eq!(result.exit_status, Some(1));
        assert!(result.stderr.contains("timed out"));
        assert!(result.stdout.is_empty());
        assert!(!result.truncated);

        let result = hang_result(&exec_ctx("sudo whoami"), Instant::now());
        assert!(result.stderr.contains("Sudo command timed out"));
    }

    #[test]
    fn test_password_error_result() {
        let ctx = exec_ctx("sudo id");
        let mut state = loop_state(String::new());
        state.password_error = Some("Password required but not provided.".to_string());
        let result = password_error_result(&ctx, &state, Instant::now());
        assert_eq!(result.exit_status, Some(1));
        assert!(result.stderr.contains("Password required"));
    }

    #[test]
    fn test_final_result_enforces_byte_cap() {
        let p = patterns();
        let policy = shellgate_policy::PolicyEngine::with_defaults(
            shellgate_types::PermissibilityLevel::Medium,
        );
        // 8000 bytes of numbered rows, already flagged by the cap check.
        let big: String = (0..800).map(|i| format!("row {i:04}\n")).collect();
        let mut state = loop_state(big);
        state.truncated = true;
        state.total_bytes = 8000;

        let result = final_result(&p, &policy, &exec_ctx("cat big.log"), state, Instant::now());
        assert!(result.truncated);
        assert!(result.stdout.len() <= 4096);
        assert!(result.exit_status.is_none());
    }

    #[test]
    fn test_limit_lines() {
        let stdout = (0..20).map(|i| format!("line{i}")).collect::<Vec<_>>().join("\n");
        let (limited, truncated) = limit_lines(stdout.clone(), 5, false);
        assert!(truncated);
        assert_eq!(limited.lines().count(), 6);
        assert!(limited.ends_with("... [output truncated after 5 lines]"));

        let (untouched, truncated) = limit_lines(stdout.clone(), 100, false);
        assert!(!truncated);
        assert_eq!(untouched, stdout);

        // An earlier byte-cap truncation is preserved
        let (_, truncated) = limit_lines("a".to_string(), 100, true);
        assert!(truncated);
    }
}
