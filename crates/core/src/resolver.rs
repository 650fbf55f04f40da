// vharness - HDL Simulation Test Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Source resolution: explicit path lists and glob-style directory patterns.
//!
//! Pattern matches are sorted lexicographically right after expansion, so the
//! compile order never depends on directory enumeration order.

use crate::error::{HarnessError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Which discovery pass produced a group of sources.
///
/// Packages hold shared declarations and must be compiled before the
/// components of the same library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourcePass {
    Packages,
    Components,
}

/// Directory convention of one library below a common root:
/// `<root>/<library>/pkg/*` and `<root>/<library>/components/<name>/src/*.<ext>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryLayout {
    pub root: PathBuf,
    pub library: String,
    pub extension: String,
}

impl LibraryLayout {
    pub fn new(root: impl Into<PathBuf>, library: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            library: library.into(),
            extension: "vhd".to_string(),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn library_dir(&self) -> PathBuf {
        self.root.join(&self.library)
    }

    pub fn packages_pattern(&self) -> String {
        format!("{}/pkg/*", path_to_pattern(&self.library_dir()))
    }

    pub fn components_pattern(&self) -> String {
        format!(
            "{}/components/*/src/*.{}",
            path_to_pattern(&self.library_dir()),
            self.extension
        )
    }

    pub fn pattern(&self, pass: SourcePass) -> String {
        match pass {
            SourcePass::Packages => self.packages_pattern(),
            SourcePass::Components => self.components_pattern(),
        }
    }

    /// Testbench directory of one component: `components/<name>/tb`.
    pub fn testbench_dir(&self, component: &str) -> PathBuf {
        self.library_dir()
            .join("components")
            .join(component)
            .join("tb")
    }
}

fn path_to_pattern(path: &Path) -> String {
    let s = path.to_string_lossy().replace('\\', "/");
    s.trim_end_matches('/').to_string()
}

/// Explicit mode: paths come back in the given order, without existence checks.
pub fn resolve_explicit<I, P>(paths: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    paths.into_iter().map(Into::into).collect()
}

fn has_wildcard(segment: &str) -> bool {
    segment.contains(|c| matches!(c, '*' | '?' | '['))
}

/// Expand a glob-style pattern (`*`, `?`, `[...]` per path component) into the
/// sorted list of matching regular files.
///
/// A walk root that does not exist yields an empty list.
pub fn expand_pattern(pattern: &str) -> Result<Vec<PathBuf>> {
    let invalid = |reason: &str| HarnessError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    };

    if pattern.trim().is_empty() {
        return Err(invalid("pattern is empty"));
    }

    let segments: Vec<&str> = pattern.split('/').collect();
    let Some(first_wild) = segments.iter().position(|s| has_wildcard(s)) else {
        let path = PathBuf::from(pattern);
        return Ok(if path.is_file() { vec![path] } else { Vec::new() });
    };

    let rest: Vec<&str> = segments[first_wild..].to_vec();
    for seg in &rest {
        if seg.is_empty() {
            return Err(invalid("empty path component after a wildcard"));
        }
        if *seg == "." || *seg == ".." {
            return Err(invalid("relative component after a wildcard"));
        }
    }

    let prefix = segments[..first_wild].join("/");
    let (base, relative) = match (prefix.is_empty(), first_wild) {
        (true, 0) => (PathBuf::from("."), true),
        (true, _) => (PathBuf::from("/"), false),
        (false, _) => (PathBuf::from(prefix), false),
    };

    if !base.is_dir() {
        warn!("Pattern root {:?} does not exist; '{}' matches nothing", base, pattern);
        return Ok(Vec::new());
    }

    // Every level is checked in filter_entry; walkdir skips the predicate
    // below min_depth, so the depth bound is applied afterwards instead.
    let depth = rest.len();
    let mut matches: Vec<PathBuf> = WalkDir::new(&base)
        .follow_links(true)
        .max_depth(depth)
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || segment_matches(rest[e.depth() - 1], &e.file_name().to_string_lossy())
        })
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(err) => {
                warn!("Skipping unreadable entry while expanding '{}': {}", pattern, err);
                None
            }
        })
        .filter(|e| e.depth() == depth && e.file_type().is_file())
        .map(|e| {
            let path = e.into_path();
            if relative {
                path.strip_prefix(".").map(Path::to_path_buf).unwrap_or(path)
            } else {
                path
            }
        })
        .collect();

    matches.sort();
    debug!("Pattern '{}' matched {} file(s)", pattern, matches.len());
    if matches.is_empty() {
        warn!("Pattern '{}' matched no files", pattern);
    }
    Ok(matches)
}

/// Match one path component against one pattern segment.
///
/// Names starting with `.` only match a segment that starts with a literal `.`.
pub fn segment_matches(pattern: &str, name: &str) -> bool {
    fn match_class(pat: &[char], ch: char) -> Option<(bool, usize)> {
        let mut i = 1;
        let negate = matches!(pat.get(i), Some('!') | Some('^'));
        if negate {
            i += 1;
        }
        let mut matched = false;
        let mut first = true;
        loop {
            let c = *pat.get(i)?;
            if c == ']' && !first {
                break;
            }
            if pat.get(i + 1) == Some(&'-') && pat.get(i + 2).is_some_and(|&e| e != ']') {
                let end = pat[i + 2];
                matched |= c <= ch && ch <= end;
                i += 3;
            } else {
                matched |= c == ch;
                i += 1;
            }
            first = false;
        }
        Some((matched != negate, i + 1))
    }

    fn match_here(pat: &[char], text: &[char]) -> bool {
        let Some(&p) = pat.first() else {
            return text.is_empty();
        };
        match p {
            '*' => (0..=text.len()).any(|i| match_here(&pat[1..], &text[i..])),
            '?' => !text.is_empty() && match_here(&pat[1..], &text[1..]),
            '[' => match (text.first(), match_class(pat, text.first().copied().unwrap_or('\0'))) {
                (Some(_), Some((true, len))) => match_here(&pat[len..], &text[1..]),
                (_, Some((false, _))) | (None, Some(_)) => false,
                // Unterminated class: treat '[' literally.
                (_, None) => text.first() == Some(&'[') && match_here(&pat[1..], &text[1..]),
            },
            c => text.first() == Some(&c) && match_here(&pat[1..], &text[1..]),
        }
    }

    if name.starts_with('.') && !pattern.starts_with('.') {
        return false;
    }

    let pat_chars: Vec<char> = pattern.chars().collect();
    let text_chars: Vec<char> = name.chars().collect();
    match_here(&pat_chars, &text_chars)
}
