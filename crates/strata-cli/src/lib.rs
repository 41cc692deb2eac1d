//! strata command-line browser.
//!
//! Serves `file://` only. Archive, HTTP and document providers need
//! collaborators this binary does not ship, so their config tables are
//! read but unused here.
//!
//! ```bash
//! strata ls file:///tmp
//! strata stat file:///etc/hosts
//! strata tree --depth 2 file:///usr/share/doc
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use strata_kernel::{FileObject, FileSystemManager, FileType, ManagerConfig, ProviderRegistry};

#[derive(Debug, Parser)]
#[command(name = "strata", version, about = "Browse virtual file systems")]
pub struct Cli {
    /// Config file (defaults to $XDG_CONFIG_HOME/strata/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the children of a folder
    Ls { uri: String },
    /// Write a file's content to stdout
    Cat { uri: String },
    /// Show type, size, timestamps and attributes
    Stat { uri: String },
    /// Print the subtree under a folder
    Tree {
        uri: String,
        #[arg(long, default_value_t = 8)]
        depth: usize,
    },
}

pub fn load_config(path: Option<&Path>) -> Result<ManagerConfig> {
    match path {
        Some(path) => {
            ManagerConfig::load_from(path).with_context(|| format!("loading config from {}", path.display()))
        }
        None => ManagerConfig::load().context("loading default config"),
    }
}

/// Run one command, writing its output to `out`.
pub async fn run<W: Write>(cli: Cli, out: &mut W) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let vfs = FileSystemManager::new(ProviderRegistry::with_defaults(), config);

    let result = match &cli.command {
        Command::Ls { uri } => ls(&vfs, uri, out).await,
        Command::Cat { uri } => cat(&vfs, uri, out).await,
        Command::Stat { uri } => stat(&vfs, uri, out).await,
        Command::Tree { uri, depth } => tree(&vfs, uri, *depth, out).await,
    };
    vfs.close().await;
    result
}

async fn resolve(vfs: &FileSystemManager, uri: &str) -> Result<Arc<FileObject>> {
    let file = vfs.resolve_file(uri).await.with_context(|| format!("resolving {uri}"))?;
    file.require_exists().await?;
    Ok(file)
}

fn display_name(file: &FileObject, kind: FileType) -> String {
    let base = file.name().base_name();
    if kind == FileType::Folder { format!("{base}/") } else { base.to_string() }
}

async fn ls<W: Write>(vfs: &FileSystemManager, uri: &str, out: &mut W) -> Result<()> {
    let folder = resolve(vfs, uri).await?;
    for child in folder.get_children().await? {
        let kind = child.get_type().await?;
        writeln!(out, "{}", display_name(&child, kind))?;
    }
    Ok(())
}

async fn cat<W: Write>(vfs: &FileSystemManager, uri: &str, out: &mut W) -> Result<()> {
    let file = resolve(vfs, uri).await?;
    let bytes = file.content().read_to_end().await?;
    out.write_all(&bytes)?;
    Ok(())
}

async fn stat<W: Write>(vfs: &FileSystemManager, uri: &str, out: &mut W) -> Result<()> {
    let file = resolve(vfs, uri).await?;
    let fs = file.file_system()?;
    let kind = file.get_type().await?;

    writeln!(out, "name: {}", file.name())?;
    writeln!(out, "type: {kind}")?;
    if kind.has_content() {
        let content = file.content();
        writeln!(out, "size: {}", content.size().await?)?;
        if fs.has_capability(strata_kernel::Capability::LastModified) {
            if let Some(modified) = content.last_modified().await? {
                let modified: DateTime<Utc> = modified.into();
                writeln!(out, "modified: {}", modified.to_rfc3339())?;
            }
        }
        let info = content.content_info().await?;
        if let Some(content_type) = &info.content_type {
            writeln!(out, "content-type: {content_type}")?;
        }
        writeln!(out, "encoding: {}", info.content_encoding)?;
    }
    if fs.has_capability(strata_kernel::Capability::Attributes) {
        for (name, value) in file.content().attributes().await? {
            writeln!(out, "{name}: {value}")?;
        }
    }
    writeln!(out, "capabilities: {}", fs.capabilities())?;
    Ok(())
}

async fn tree<W: Write>(vfs: &FileSystemManager, uri: &str, max_depth: usize, out: &mut W) -> Result<()> {
    let root = resolve(vfs, uri).await?;
    let mut stack = vec![(root, 0usize)];
    while let Some((file, depth)) = stack.pop() {
        let kind = file.get_type().await?;
        let label = if depth == 0 { file.name().to_string() } else { display_name(&file, kind) };
        writeln!(out, "{}{}", "  ".repeat(depth), label)?;

        if kind.has_children() && depth < max_depth {
            let children = file.get_children().await?;
            stack.extend(children.into_iter().rev().map(|child| (child, depth + 1)));
        }
    }
    Ok(())
}
