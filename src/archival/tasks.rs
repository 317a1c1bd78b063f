//! Checkbox task extraction for spec task documents.
//!
//! A task line is a list item (`-`, `*`, `+` or `1.`/`1)`) whose first token
//! is a one-character checkbox: `[x]`/`[X]` complete, `[ ]` incomplete, any
//! other symbol in progress. Indented continuation lines tagged
//! `Requirements:` or `Depends on:` attach to the task above them.

use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "marker", rename_all = "snake_case")]
pub enum TaskState {
    Complete,
    Incomplete,
    InProgress(char),
}

impl TaskState {
    fn from_marker(marker: char) -> Self {
        match marker {
            'x' | 'X' => Self::Complete,
            ' ' => Self::Incomplete,
            other => Self::InProgress(other),
        }
    }

    pub fn is_complete(self) -> bool {
        matches!(self, Self::Complete)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    /// 1-based position in the document, independent of any numbering in the text.
    pub ordinal: usize,
    pub state: TaskState,
    /// Explicit numbering from the source line (`2.1` in `- [ ] 2.1 Build it`).
    pub label: Option<String>,
    pub description: String,
    pub requirements: Vec<String>,
    pub depends_on: Vec<usize>,
    /// Dependency tokens that name neither a label nor an ordinal.
    pub unresolved_deps: Vec<String>,
}

impl Task {
    pub fn is_complete(&self) -> bool {
        self.state.is_complete()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskDocument {
    pub tasks: Vec<Task>,
    pub malformed_lines: Vec<String>,
}

impl TaskDocument {
    pub fn total(&self) -> usize {
        self.tasks.len()
    }

    pub fn completed(&self) -> usize {
        self.tasks.iter().filter(|t| t.is_complete()).count()
    }

    pub fn in_progress(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| matches!(t.state, TaskState::InProgress(_)))
            .count()
    }
}

static TASK_RE: OnceLock<Regex> = OnceLock::new();
static CANDIDATE_RE: OnceLock<Regex> = OnceLock::new();
static LABEL_RE: OnceLock<Regex> = OnceLock::new();
static META_RE: OnceLock<Regex> = OnceLock::new();

fn task_re() -> &'static Regex {
    TASK_RE.get_or_init(|| {
        Regex::new(r"^\s*(?:[-*+]|\d+[.)])\s+\[([^\]])\](?:\s+(.*))?$").unwrap()
    })
}

// Either a short bracket token that is not a link, or an unterminated bracket.
fn candidate_re() -> &'static Regex {
    CANDIDATE_RE.get_or_init(|| {
        Regex::new(r"^\s*(?:[-*+]|\d+[.)])\s+\[(?:[^\]]{0,3}\](?:[^(]|$)|[^\]]*$)").unwrap()
    })
}

fn label_re() -> &'static Regex {
    LABEL_RE.get_or_init(|| Regex::new(r"^(\d+(?:\.\d+)*)\.?\s+(.*)$").unwrap())
}

fn meta_re() -> &'static Regex {
    META_RE.get_or_init(|| {
        Regex::new(
            r"(?i)^[-*]?\s*_?\s*(requirements?|refs|depends on|depends|dependencies)\s*:\s*(.*?)_?\s*$",
        )
        .unwrap()
    })
}

enum MetaTag {
    Requirements,
    Dependencies,
}

fn parse_meta_line(line: &str) -> Option<(MetaTag, Vec<String>)> {
    let caps = meta_re().captures(line.trim())?;
    let tag = match caps[1].to_ascii_lowercase().as_str() {
        "requirement" | "requirements" | "refs" => MetaTag::Requirements,
        _ => MetaTag::Dependencies,
    };
    let values = caps[2]
        .split(',')
        .map(|v| v.trim().trim_matches('_').trim())
        .filter(|v| !v.is_empty())
        .map(ToOwned::to_owned)
        .collect();
    Some((tag, values))
}

fn split_label(text: &str) -> (Option<String>, String) {
    match label_re().captures(text) {
        Some(caps) => (Some(caps[1].to_string()), caps[2].trim().to_string()),
        None => (None, text.trim().to_string()),
    }
}

/// Parse a tasks document. Never fails; unparseable task-like lines are
/// reported in `malformed_lines`.
pub fn parse(document: &str) -> TaskDocument {
    let mut out = TaskDocument::default();
    // Raw dependency tokens per task index, resolved once all labels are known.
    let mut raw_deps: Vec<Vec<String>> = Vec::new();
    let mut attach_to: Option<usize> = None;

    for line in document.lines() {
        if let Some(caps) = task_re().captures(line) {
            let marker = caps[1].chars().next().unwrap_or(' ');
            let text = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            let (label, description) = split_label(text);
            out.tasks.push(Task {
                ordinal: out.tasks.len() + 1,
                state: TaskState::from_marker(marker),
                label,
                description,
                requirements: Vec::new(),
                depends_on: Vec::new(),
                unresolved_deps: Vec::new(),
            });
            raw_deps.push(Vec::new());
            attach_to = Some(out.tasks.len() - 1);
            continue;
        }

        if candidate_re().is_match(line) {
            out.malformed_lines.push(line.to_string());
            attach_to = None;
            continue;
        }

        let indented = line.starts_with(' ') || line.starts_with('\t');
        if line.trim().is_empty() || !indented {
            attach_to = None;
            continue;
        }

        let Some(idx) = attach_to else {
            continue;
        };
        match parse_meta_line(line) {
            Some((MetaTag::Requirements, values)) => out.tasks[idx].requirements.extend(values),
            Some((MetaTag::Dependencies, values)) => raw_deps[idx].extend(values),
            None => {}
        }
    }

    let labels: HashMap<String, usize> = out
        .tasks
        .iter()
        .filter_map(|t| t.label.clone().map(|l| (l, t.ordinal)))
        .collect();
    for (task, deps) in out.tasks.iter_mut().zip(raw_deps) {
        for token in deps {
            let token = token.trim_start_matches('#');
            let resolved = labels
                .get(token)
                .copied()
                .or_else(|| token.parse::<usize>().ok());
            match resolved {
                Some(ordinal) if !task.depends_on.contains(&ordinal) => {
                    task.depends_on.push(ordinal);
                }
                Some(_) => {}
                None if !task.unresolved_deps.iter().any(|t| t == token) => {
                    task.unresolved_deps.push(token.to_string());
                }
                None => {}
            }
        }
    }

    out
}

/// Dependency problems worth surfacing; none of them block completion.
pub fn validate_task_references(tasks: &[Task]) -> Vec<String> {
    let mut warnings = Vec::new();
    for task in tasks {
        for dep in &task.depends_on {
            if *dep == task.ordinal {
                warnings.push(format!("task {} depends on itself", task.ordinal));
            } else if *dep == 0 || *dep > tasks.len() {
                warnings.push(format!(
                    "task {} depends on missing task {}",
                    task.ordinal, dep
                ));
            }
        }
        for token in &task.unresolved_deps {
            warnings.push(format!(
                "task {} depends on unknown task '{}'",
                task.ordinal, token
            ));
        }
    }
    warnings
}
