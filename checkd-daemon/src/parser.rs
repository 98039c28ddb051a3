//! Incremental parser for the checker's watch-mode output.
//!
//! Raw chunks are reassembled into lines per stream, then every complete
//! line is classified. The phrases the checker prints are matched only in
//! [`classify_line`], so a change in its output format stays local to it.

use std::sync::LazyLock;

use regex::Regex;

static SUMMARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"found (\d+) errors? and (\d+) warnings?").expect("summary pattern is valid")
});

static ANSI_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").expect("ansi pattern is valid"));

const STARTED_MARKERS: &[&str] = &["Loading svelte-check in workspace", "Getting Svelte diagnostics"];
const WATCHING_FOOTER: &str = "Watching for file changes";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Started,
    Summary { errors: u32, warnings: u32 },
    Separator,
    Footer,
    Text,
}

pub fn classify_line(line: &str) -> LineKind {
    if let Some(caps) = SUMMARY.captures(line) {
        let errors = caps[1].parse().unwrap_or(u32::MAX);
        let warnings = caps[2].parse().unwrap_or(u32::MAX);
        return LineKind::Summary { errors, warnings };
    }
    if STARTED_MARKERS.iter().any(|marker| line.contains(marker)) {
        return LineKind::Started;
    }
    if line.contains(WATCHING_FOOTER) {
        return LineKind::Footer;
    }
    let trimmed = line.trim();
    if trimmed.len() >= 3 && trimmed.chars().all(|c| c == '=') {
        return LineKind::Separator;
    }
    LineKind::Text
}

/// Which pipe a chunk came from. Each keeps its own partial line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSource {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub output: String,
    pub errors: u32,
    pub warnings: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseEvent {
    CycleStarted,
    CycleFinished(CycleReport),
}

#[derive(Debug, Default)]
pub struct OutputParser {
    stdout_tail: Vec<u8>,
    stderr_tail: Vec<u8>,
    accumulated: Vec<String>,
    /// Whether the current cycle has produced anything besides start markers.
    has_content: bool,
}

impl OutputParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw chunk; returns the events its complete lines produced, in order.
    pub fn push_chunk(&mut self, source: OutputSource, chunk: &[u8]) -> Vec<ParseEvent> {
        let tail = match source {
            OutputSource::Stdout => &mut self.stdout_tail,
            OutputSource::Stderr => &mut self.stderr_tail,
        };
        tail.extend_from_slice(chunk);

        let Some(last_newline) = tail.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };
        let rest = tail.split_off(last_newline + 1);
        let complete = std::mem::replace(tail, rest);

        let mut events = Vec::new();
        for raw in complete[..complete.len() - 1].split(|&b| b == b'\n') {
            if let Some(event) = self.push_line(&clean_line(raw)) {
                events.push(event);
            }
        }
        events
    }

    /// Forget partial lines and the in-flight cycle, as after a restart.
    pub fn reset(&mut self) {
        self.stdout_tail.clear();
        self.stderr_tail.clear();
        self.accumulated.clear();
        self.has_content = false;
    }

    fn push_line(&mut self, line: &str) -> Option<ParseEvent> {
        match classify_line(line) {
            LineKind::Separator | LineKind::Footer => None,
            LineKind::Text if !self.has_content && line.trim().is_empty() => None,
            LineKind::Text => {
                self.has_content = true;
                self.accumulated.push(line.to_string());
                None
            }
            LineKind::Started => {
                self.accumulated.push(line.to_string());
                Some(ParseEvent::CycleStarted)
            }
            LineKind::Summary { errors, warnings } => {
                self.accumulated.push(line.to_string());
                self.has_content = false;
                let output = std::mem::take(&mut self.accumulated).join("\n");
                Some(ParseEvent::CycleFinished(CycleReport {
                    output: output.trim_end().to_string(),
                    errors,
                    warnings,
                }))
            }
        }
    }
}

fn clean_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let text = String::from_utf8_lossy(raw);
    ANSI_ESCAPE.replace_all(&text, "").into_owned()
}
