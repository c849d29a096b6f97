//! Document extraction: file on disk → [`RawDocument`].
//!
//! Dispatch is a [`SourceFormat`] lookup in a [`FormatRegistry`]. Files with
//! an unknown extension are [`RagError::UnsupportedFormat`]; files that fail
//! to parse are [`RagError::Extraction`]. Neither panics, so a batch can
//! skip the bad file and keep going.
//!
//! OOXML containers (`.docx`, `.pptx`, `.xlsx`) are read with `zip` and
//! `quick-xml`; every ZIP entry read is size-bounded. PDFs go through
//! `pdf-extract`.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use quick_xml::events::Event;
use walkdir::WalkDir;

use rag_harness_core::models::{RawDocument, SourceFormat};
use rag_harness_core::RagError;

/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb guard).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
const XLSX_MAX_SHEETS: usize = 100;
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;

/// Turns a file into a [`RawDocument`].
pub trait Extractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<RawDocument, RagError>;
}

/// Bytes → text for one format. Errors are plain reasons; the registry
/// attaches the document id.
pub type ExtractFn = fn(&[u8]) -> std::result::Result<String, String>;

/// Extraction functions keyed by [`SourceFormat`].
pub struct FormatRegistry {
    handlers: HashMap<SourceFormat, ExtractFn>,
}

impl Default for FormatRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(SourceFormat::PlainText, extract_utf8);
        registry.register(SourceFormat::Markdown, extract_utf8);
        registry.register(SourceFormat::Pdf, extract_pdf);
        registry.register(SourceFormat::Docx, extract_docx);
        registry.register(SourceFormat::Pptx, extract_pptx);
        registry.register(SourceFormat::Xlsx, extract_xlsx);
        registry
    }
}

impl FormatRegistry {
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Add or replace the handler for `format`.
    pub fn register(&mut self, format: SourceFormat, handler: ExtractFn) {
        self.handlers.insert(format, handler);
    }

    pub fn supports(&self, format: SourceFormat) -> bool {
        self.handlers.contains_key(&format)
    }

    /// Resolve the format of `path` from its extension.
    pub fn format_of(&self, path: &Path) -> Result<SourceFormat, RagError> {
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_default();
        SourceFormat::from_extension(&extension)
            .filter(|format| self.supports(*format))
            .ok_or_else(|| RagError::UnsupportedFormat {
                path: path.to_path_buf(),
                extension,
            })
    }

    /// Extract in-memory content that is already known to be `format`.
    pub fn extract_bytes(
        &self,
        id: &str,
        bytes: &[u8],
        format: SourceFormat,
    ) -> Result<RawDocument, RagError> {
        let handler = self
            .handlers
            .get(&format)
            .ok_or_else(|| RagError::UnsupportedFormat {
                path: PathBuf::from(id),
                extension: format.as_str().to_string(),
            })?;
        let text = handler(bytes).map_err(|reason| RagError::Extraction {
            source_id: id.to_string(),
            reason,
        })?;
        Ok(RawDocument::new(id, text, format))
    }
}

impl Extractor for FormatRegistry {
    fn extract(&self, path: &Path) -> Result<RawDocument, RagError> {
        let format = self.format_of(path)?;
        let id = path.display().to_string();
        let bytes = std::fs::read(path).map_err(|e| RagError::Extraction {
            source_id: id.clone(),
            reason: e.to_string(),
        })?;
        self.extract_bytes(&id, &bytes, format)
    }
}

/// Walk `root` and return the files matching any of `include_globs`
/// (relative to `root`), sorted. VCS and build directories are skipped.
pub fn collect_paths(root: &Path, include_globs: &[String]) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        bail!("Not a directory: {}", root.display());
    }

    let include = build_globset(include_globs)?;
    let exclude = build_globset(&[
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ])?;

    let mut paths = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        if exclude.is_match(relative) || !include.is_match(relative) {
            continue;
        }
        paths.push(path.to_path_buf());
    }

    paths.sort();
    Ok(paths)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

// ============ Format handlers ============

fn extract_utf8(bytes: &[u8]) -> std::result::Result<String, String> {
    String::from_utf8(bytes.to_vec()).map_err(|e| format!("not valid UTF-8: {}", e))
}

fn extract_pdf(bytes: &[u8]) -> std::result::Result<String, String> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| format!("PDF: {}", e))
}

type Archive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

fn open_archive(bytes: &[u8]) -> std::result::Result<Archive<'_>, String> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| format!("OOXML: {}", e))
}

fn read_entry(archive: &mut Archive<'_>, name: &str) -> std::result::Result<Vec<u8>, String> {
    let entry = archive
        .by_name(name)
        .map_err(|e| format!("OOXML entry {}: {}", name, e))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| format!("OOXML entry {}: {}", name, e))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(format!(
            "OOXML entry {} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        ));
    }
    Ok(out)
}

/// Entry names under `prefix` + N + `.xml`, in numeric order of N.
fn numbered_entries(archive: &Archive<'_>, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(prefix) && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches(prefix)
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

/// Concatenate the text of every `<t>` element (any namespace prefix).
/// `block` names the element that ends a paragraph; a newline is emitted
/// after each one so sentence splitting still sees line breaks.
fn text_runs(xml: &[u8], block: &[u8]) -> std::result::Result<String, String> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                let text = te.unescape().map_err(|e| format!("OOXML: {}", e))?;
                out.push_str(&text);
            }
            Ok(Event::End(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"t" {
                    in_text = false;
                } else if name.as_ref() == block && !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("OOXML: {}", e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(out.trim_end().to_string())
}

fn extract_docx(bytes: &[u8]) -> std::result::Result<String, String> {
    let mut archive = open_archive(bytes)?;
    let xml = read_entry(&mut archive, "word/document.xml")?;
    text_runs(&xml, b"p")
}

fn extract_pptx(bytes: &[u8]) -> std::result::Result<String, String> {
    let mut archive = open_archive(bytes)?;
    let mut slides = Vec::new();
    for name in numbered_entries(&archive, "ppt/slides/slide") {
        let xml = read_entry(&mut archive, &name)?;
        let text = text_runs(&xml, b"p")?;
        if !text.is_empty() {
            slides.push(text);
        }
    }
    Ok(slides.join("\n\n"))
}

fn extract_xlsx(bytes: &[u8]) -> std::result::Result<String, String> {
    let mut archive = open_archive(bytes)?;
    let shared = if archive.file_names().any(|n| n == "xl/sharedStrings.xml") {
        let xml = read_entry(&mut archive, "xl/sharedStrings.xml")?;
        shared_strings(&xml)?
    } else {
        Vec::new()
    };

    let mut sheets = Vec::new();
    for name in numbered_entries(&archive, "xl/worksheets/sheet")
        .into_iter()
        .take(XLSX_MAX_SHEETS)
    {
        let xml = read_entry(&mut archive, &name)?;
        let text = sheet_cells(&xml, &shared)?;
        if !text.is_empty() {
            sheets.push(text);
        }
    }
    Ok(sheets.join("\n"))
}

/// One string per `<si>` item, joining rich-text runs.
fn shared_strings(xml: &[u8]) -> std::result::Result<Vec<String>, String> {
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;
    // `<rPh>` holds phonetic readings, not cell text
    let mut phonetic = 0usize;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"rPh" => phonetic += 1,
                b"t" => in_text = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_text && phonetic == 0 => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&te.unescape().map_err(|e| format!("OOXML: {}", e))?);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"si" => strings.extend(current.take()),
                b"rPh" => phonetic = phonetic.saturating_sub(1),
                b"t" => in_text = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("OOXML: {}", e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Cell values of one worksheet, space-separated. Shared-string cells are
/// resolved; inline and numeric values are taken as written.
fn sheet_cells(xml: &[u8], shared: &[String]) -> std::result::Result<String, String> {
    let mut cells: Vec<String> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut shared_cell = false;
    let mut in_value = false;
    let mut phonetic = 0usize;

    while cells.len() < XLSX_MAX_CELLS_PER_SHEET {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"c" => {
                    shared_cell = e.attributes().flatten().any(|a| {
                        a.key.local_name().as_ref() == b"t" && a.value.as_ref() == b"s"
                    });
                }
                b"v" | b"t" => in_value = true,
                b"rPh" => phonetic += 1,
                _ => {}
            },
            Ok(Event::Text(te)) if in_value && phonetic == 0 => {
                let raw = te.unescape().map_err(|e| format!("OOXML: {}", e))?;
                let value = raw.trim();
                if shared_cell {
                    if let Some(s) = value.parse::<usize>().ok().and_then(|i| shared.get(i)) {
                        cells.push(s.clone());
                    }
                } else if !value.is_empty() {
                    cells.push(value.to_string());
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"rPh" => phonetic = phonetic.saturating_sub(1),
                b"c" => shared_cell = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("OOXML: {}", e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(cells.join(" "))
}
