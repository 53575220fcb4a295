//! `dchat ingest`: read files from disk and feed them to the core
//! [`Ingestor`].
//!
//! Files are read as UTF-8 text. Binary formats (PDF, DOCX) are expected to
//! be converted to text beforehand; non-UTF-8 files are skipped with a
//! warning. A file's identity in the collection is its name, or its path
//! relative to the directory being walked. Re-ingesting a source replaces
//! its previous chunks.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use docchat_core::ingest::{IngestReport, IngestRequest, Ingestor};

use crate::config::Config;
use crate::pipeline::Pipeline;

/// Patterns applied when a directory is given.
pub const DEFAULT_INCLUDE_GLOBS: &[&str] = &[
    "**/*.txt",
    "**/*.md",
    "**/*.markdown",
    "**/*.rst",
    "**/*.html",
    "**/*.csv",
    "**/*.json",
];

const DEFAULT_EXCLUDE_GLOBS: &[&str] = &["**/.git/**", "**/target/**", "**/node_modules/**"];

/// A file selected for ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Identity in the collection.
    pub source_id: String,
}

/// File type label from the extension, lowercased. Files without one are
/// `txt`.
pub fn file_type_of(path: &Path) -> String {
    match path.extension().and_then(|e| e.to_str()) {
        Some("markdown") => "md".to_string(),
        Some("htm") => "html".to_string(),
        Some(ext) if !ext.is_empty() => ext.to_lowercase(),
        _ => "txt".to_string(),
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

/// Expand files and directories into the list of sources to ingest.
///
/// Explicit files are always taken. Directories are walked and filtered by
/// `include` (defaults to [`DEFAULT_INCLUDE_GLOBS`]) and `exclude`.
pub fn collect_sources(
    paths: &[PathBuf],
    include: &[String],
    exclude: &[String],
) -> Result<Vec<SourceFile>> {
    let include_patterns: Vec<String> = if include.is_empty() {
        DEFAULT_INCLUDE_GLOBS.iter().map(|s| s.to_string()).collect()
    } else {
        include.to_vec()
    };
    let mut exclude_patterns: Vec<String> =
        DEFAULT_EXCLUDE_GLOBS.iter().map(|s| s.to_string()).collect();
    exclude_patterns.extend(exclude.iter().cloned());

    let include_set = build_globset(&include_patterns)?;
    let exclude_set = build_globset(&exclude_patterns)?;

    let mut sources = Vec::new();
    for root in paths {
        if root.is_file() {
            let name = root
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .ok_or_else(|| anyhow::anyhow!("Not a file path: {}", root.display()))?;
            sources.push(SourceFile {
                path: root.clone(),
                source_id: name,
            });
            continue;
        }
        if !root.is_dir() {
            bail!("Path does not exist: {}", root.display());
        }

        let mut found = Vec::new();
        for entry in WalkDir::new(root) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            let rel_str = relative.to_string_lossy().replace('\\', "/");

            if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
                continue;
            }
            found.push(SourceFile {
                path: path.to_path_buf(),
                source_id: rel_str,
            });
        }
        found.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        sources.extend(found);
    }

    Ok(sources)
}

/// Ingest one file. `file_type` overrides the extension-derived label.
pub async fn ingest_file(
    ingestor: &Ingestor,
    source: &SourceFile,
    file_type: Option<&str>,
) -> Result<IngestReport> {
    let text = std::fs::read_to_string(&source.path)
        .with_context(|| format!("Failed to read {} as UTF-8 text", source.path.display()))?;
    let file_type = file_type
        .map(str::to_string)
        .unwrap_or_else(|| file_type_of(&source.path));

    let mut request = IngestRequest::new(&source.source_id, text, file_type);
    request
        .extra
        .insert("path".to_string(), source.path.display().to_string());

    Ok(ingestor.ingest(request).await?)
}

/// Run `dchat ingest`.
pub async fn run_ingest(
    config: &Config,
    paths: &[PathBuf],
    include: &[String],
    exclude: &[String],
    file_type: Option<&str>,
) -> Result<()> {
    let sources = collect_sources(paths, include, exclude)?;
    if sources.is_empty() {
        println!("ingest");
        println!("  no matching files");
        return Ok(());
    }

    let pipeline = Pipeline::open(config).await?;
    let ingestor = pipeline.ingestor()?;

    let mut ingested = 0usize;
    let mut chunks = 0usize;
    let mut failed = 0usize;

    for source in &sources {
        match ingest_file(&ingestor, source, file_type).await {
            Ok(report) => {
                ingested += 1;
                chunks += report.chunk_count;
                println!("  {} ({} chunks)", source.source_id, report.chunk_count);
            }
            Err(e) => {
                tracing::warn!(source = %source.source_id, error = %e, "ingest failed");
                eprintln!("Warning: {}: {:#}", source.source_id, e);
                failed += 1;
            }
        }
    }

    println!("ingest");
    println!("  files: {}", sources.len());
    println!("  ingested: {}", ingested);
    println!("  chunks: {}", chunks);
    println!("  failed: {}", failed);

    pipeline.close().await;
    if failed > 0 && ingested == 0 {
        bail!("No files were ingested");
    }
    Ok(())
}
