//! Coverage profile parsing
//!
//! A profile is a text file whose first line may declare the coverage mode
//! (`mode: set`) and whose remaining lines look like
//!
//! ```text
//! <file>:<startLine>.<startCol>,<endLine>.<endCol> <numStatements> <executionCount>
//! ```
//!
//! Each block adds its statements to the total, and to the covered total when it
//! executed at least once. Blocks are grouped by the directory of their file.

use super::types::{PackageCoverageStats, TestingStats};
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use tracing::trace;

/// File names the collector probes, relative to the project root, in order
pub const DEFAULT_PROFILE_PATHS: [&str; 3] = [
    "coverage.out",
    "coverage/coverage.out",
    ".coverage/coverage.out",
];

/// Return the first candidate profile that exists under `root`
pub fn locate_profile<P: AsRef<Path>>(root: &Path, candidates: &[P]) -> Option<PathBuf> {
    candidates
        .iter()
        .map(|candidate| root.join(candidate))
        .find(|path| path.is_file())
}

/// Parse a coverage profile from text
///
/// Returns `None` when the profile holds no statements at all.
pub fn parse_profile(content: &str) -> Option<TestingStats> {
    read_profile(content.as_bytes()).ok().flatten()
}

/// Parse a coverage profile from a reader
///
/// Lines are split on raw bytes, so a line that is not valid UTF-8 is skipped like
/// any other malformed line. Only a failure of the reader itself is an error.
pub fn read_profile<R: BufRead>(reader: R) -> io::Result<Option<TestingStats>> {
    let mut stats = TestingStats::default();
    let mut seen_first = false;

    for (number, line) in reader.split(b'\n').enumerate() {
        let line = line?;
        let Ok(line) = std::str::from_utf8(&line) else {
            trace!("Skipping non-UTF-8 coverage line {}", number + 1);
            seen_first = true;
            continue;
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }

        let is_first = !seen_first;
        seen_first = true;
        if is_first && text.starts_with("mode:") {
            continue;
        }

        match parse_block(text) {
            Some(block) => stats.record(&block),
            None => trace!("Skipping malformed coverage line: {}", text),
        }
    }

    if stats.total_statements == 0 {
        return Ok(None);
    }
    Ok(Some(stats))
}

/// One parsed profile line
#[derive(Debug, PartialEq)]
struct Block<'a> {
    package: &'a str,
    statements: u64,
    executions: u64,
}

fn parse_block(text: &str) -> Option<Block<'_>> {
    let mut fields = text.split_whitespace();
    let location = fields.next()?;
    let statements = fields.next()?.parse().ok()?;
    let executions = fields.next()?.parse().ok()?;

    Some(Block {
        package: package_of(location),
        statements,
        executions,
    })
}

/// Directory portion of a block location, with the `:line.col,line.col` span removed
fn package_of(location: &str) -> &str {
    let file = match location.rfind(':') {
        Some(idx) if is_span(&location[idx + 1..]) => &location[..idx],
        _ => location,
    };

    match file.rfind('/') {
        Some(0) => "/",
        Some(idx) => &file[..idx],
        None => ".",
    }
}

fn is_span(suffix: &str) -> bool {
    !suffix.is_empty()
        && suffix
            .chars()
            .all(|c| c.is_ascii_digit() || c == '.' || c == ',')
}

impl TestingStats {
    fn record(&mut self, block: &Block<'_>) {
        let covered = if block.executions > 0 {
            block.statements
        } else {
            0
        };

        self.total_statements = self.total_statements.saturating_add(block.statements);
        self.covered_statements = self.covered_statements.saturating_add(covered);

        let package = self
            .package_stats
            .entry(block.package.to_string())
            .or_insert_with(|| PackageCoverageStats {
                name: block.package.to_string(),
                ..Default::default()
            });
        package.statements = package.statements.saturating_add(block.statements);
        package.covered_statements = package.covered_statements.saturating_add(covered);
    }
}
