use std::collections::HashMap;
use std::io::{self, Write};

use anyhow::Result;
use bstr::BStr;
use clap::Args;
use git_blame::{blame, blame_working_tree, BlameLine, BlameOptions};
use git_hash::ObjectId;
use git_object::{Commit, Object};
use git_utils::date::DateFormat;

use super::open_repo;
use crate::Cli;

#[derive(Args)]
pub struct BlameArgs {
    /// Show line range (start,end)
    #[arg(short = 'L')]
    line_range: Option<String>,

    /// Detect lines copied from other files
    #[arg(long)]
    detect_copies: bool,

    /// Detect lines moved within the same commit
    #[arg(long)]
    detect_moves: bool,

    /// Follow renames across history
    #[arg(short = 'M', long = "follow-renames")]
    detect_renames: bool,

    /// Don't treat root commits as a blame boundary
    #[arg(long)]
    show_root: bool,

    /// Ignore whitespace changes
    #[arg(short = 'w')]
    ignore_whitespace: bool,

    /// Output in porcelain format
    #[arg(long)]
    porcelain: bool,

    /// Show line numbers
    #[arg(short = 'n', long)]
    show_number: bool,

    /// Show email instead of author name
    #[arg(short = 'e', long)]
    show_email: bool,

    /// Revision to blame from (defaults to HEAD; pass "working" to blame
    /// uncommitted changes against HEAD)
    #[arg(long, value_name = "rev")]
    rev: Option<String>,

    /// File to blame
    file: String,
}

pub fn run(args: &BlameArgs, cli: &Cli) -> Result<i32> {
    let repo = open_repo(cli)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let path = BStr::new(args.file.as_bytes());

    let options = BlameOptions {
        detect_renames: args.detect_renames,
        detect_moves: args.detect_moves,
        detect_copies: args.detect_copies,
        show_root: args.show_root,
        ..BlameOptions::default()
    };

    let lines = match args.rev.as_deref() {
        Some("working") => {
            let head = repo
                .head_oid()?
                .ok_or_else(|| anyhow::anyhow!("HEAD does not point to a valid object"))?;
            let working_path = std::path::Path::new(&args.file);
            let content = std::fs::read(working_path)
                .map_err(|e| anyhow::anyhow!("failed to read '{}': {}", args.file, e))?;
            blame_working_tree(&repo, head, path, content, options)?
        }
        Some(rev) => {
            let start_oid = git_revwalk::resolve_revision(&repo, rev)?;
            blame(&repo, start_oid, path, options)?
        }
        None => {
            let start_oid = repo
                .head_oid()?
                .ok_or_else(|| anyhow::anyhow!("HEAD does not point to a valid object"))?;
            blame(&repo, start_oid, path, options)?
        }
    };

    if lines.is_empty() {
        return Ok(0);
    }

    let (start_line, end_line) = if let Some(ref range) = args.line_range {
        parse_line_range(range, lines.len())?
    } else {
        (1, lines.len())
    };

    let mut commit_cache: HashMap<ObjectId, Commit> = HashMap::new();
    for line in &lines {
        if let Some(oid) = line.commit {
            if let std::collections::hash_map::Entry::Vacant(e) = commit_cache.entry(oid) {
                if let Some(Object::Commit(c)) = repo.odb().read(&oid)? {
                    e.insert(c);
                }
            }
        }
    }

    let line_width = format!("{}", end_line).len();
    let max_author_len = commit_cache
        .values()
        .map(|c| String::from_utf8_lossy(&c.author.name).len())
        .max()
        .unwrap_or(10);

    for line in &lines {
        let line_num = line.final_line as usize;
        if line_num < start_line || line_num > end_line {
            continue;
        }

        if args.porcelain {
            write_porcelain_entry(line, commit_cache.get(&line.commit.unwrap_or(ObjectId::NULL_SHA1)), &mut out)?;
            continue;
        }

        match line.commit {
            None => {
                write!(
                    out,
                    "{:>8} ({:>width$} {:>lw$}) ",
                    "00000000",
                    "Not Committed Yet",
                    line.final_line,
                    width = max_author_len,
                    lw = line_width,
                )?;
            }
            Some(oid) => {
                let hex = oid.to_hex();
                let (prefix, short_display) = if line.boundary {
                    ("^", &hex[..7.min(hex.len())])
                } else {
                    ("", &hex[..8.min(hex.len())])
                };

                if let Some(commit) = commit_cache.get(&oid) {
                    let author = if args.show_email {
                        format!("<{}>", String::from_utf8_lossy(&commit.author.email))
                    } else {
                        String::from_utf8_lossy(&commit.author.name).to_string()
                    };
                    let date = commit.author.date.format(&DateFormat::Iso);
                    let date_display = &date[..date.len().min(25)];

                    write!(
                        out,
                        "{}{} ({:>width$} {} {:>lw$}) ",
                        prefix,
                        short_display,
                        author,
                        date_display,
                        line.final_line,
                        width = max_author_len,
                        lw = line_width,
                    )?;
                } else {
                    write!(out, "{}{} ({:>lw$}) ", prefix, short_display, line.final_line, lw = line_width)?;
                }
            }
        }

        // The porcelain branch above already wrote the content line; this
        // path still needs the raw text for its own display.
        writeln!(out, "{}", line_display_text(&repo, line)?)?;
    }

    Ok(0)
}

/// Re-read the blamed line's text from the origin's own blob, since
/// `BlameLine` only carries attribution, not content.
fn line_display_text(repo: &git_repository::Repository, line: &BlameLine) -> Result<String> {
    let Some(oid) = line.commit else {
        return Ok(String::new());
    };
    let obj = repo
        .odb()
        .read(&oid)?
        .ok_or_else(|| anyhow::anyhow!("commit not found: {}", oid))?;
    let tree_oid = match obj {
        Object::Commit(c) => c.tree,
        _ => anyhow::bail!("not a commit: {}", oid),
    };
    let path_str = String::from_utf8_lossy(&line.path).into_owned();
    let blob_oid = resolve_path_in_tree(repo, &tree_oid, &path_str)?;
    let blob_obj = repo
        .odb()
        .read(&blob_oid)?
        .ok_or_else(|| anyhow::anyhow!("blob not found: {}", blob_oid))?;
    match blob_obj {
        Object::Blob(blob) => {
            let content = String::from_utf8_lossy(&blob.data);
            Ok(content
                .lines()
                .nth((line.origin_line - 1) as usize)
                .unwrap_or("")
                .to_string())
        }
        _ => anyhow::bail!("not a blob: {}", blob_oid),
    }
}

fn write_porcelain_entry(line: &BlameLine, commit: Option<&Commit>, out: &mut impl Write) -> Result<()> {
    let hex = line.commit.map(|o| o.to_hex()).unwrap_or_else(|| "0".repeat(40));
    writeln!(out, "{} {} {} 1", hex, line.origin_line, line.final_line)?;

    if let Some(c) = commit {
        writeln!(out, "author {}", String::from_utf8_lossy(&c.author.name))?;
        writeln!(out, "author-mail <{}>", String::from_utf8_lossy(&c.author.email))?;
        writeln!(out, "author-time {}", c.author.date.timestamp)?;
        writeln!(out, "author-tz {}", format_tz(c.author.date.tz_offset))?;
        writeln!(out, "committer {}", String::from_utf8_lossy(&c.committer.name))?;
        writeln!(out, "committer-mail <{}>", String::from_utf8_lossy(&c.committer.email))?;
        writeln!(out, "committer-time {}", c.committer.date.timestamp)?;
        writeln!(out, "committer-tz {}", format_tz(c.committer.date.tz_offset))?;
        writeln!(out, "summary {}", String::from_utf8_lossy(c.summary()))?;
    }

    writeln!(out, "\t")?;
    Ok(())
}

fn format_tz(offset_minutes: i32) -> String {
    let sign = if offset_minutes >= 0 { '+' } else { '-' };
    let abs = offset_minutes.unsigned_abs();
    let hours = abs / 60;
    let mins = abs % 60;
    format!("{}{:02}{:02}", sign, hours, mins)
}

fn resolve_path_in_tree(repo: &git_repository::Repository, tree_oid: &ObjectId, path: &str) -> Result<ObjectId> {
    use bstr::ByteSlice;

    let components: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let mut current = *tree_oid;

    for component in &components {
        let obj = repo
            .odb()
            .read(&current)?
            .ok_or_else(|| anyhow::anyhow!("tree not found: {}", current))?;

        let tree = match obj {
            Object::Tree(t) => t,
            _ => anyhow::bail!("not a tree: {}", current),
        };

        let entry = tree
            .entries
            .iter()
            .find(|e| e.name.as_bstr() == component.as_bytes().as_bstr())
            .ok_or_else(|| anyhow::anyhow!("path '{}' not found", component))?;

        current = entry.oid;
    }

    Ok(current)
}

fn parse_line_range(range: &str, total: usize) -> Result<(usize, usize)> {
    let parts: Vec<&str> = range.split(',').collect();
    match parts.len() {
        1 => {
            let start: usize = parts[0].parse()?;
            Ok((start, total))
        }
        2 => {
            let start: usize = parts[0].parse()?;
            let end: usize = parts[1].parse()?;
            Ok((start, end.min(total)))
        }
        _ => anyhow::bail!("invalid line range: {}", range),
    }
}
