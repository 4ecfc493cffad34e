//! Coverage results and the `.cov` report format.
//!
//! A `.cov` file has a short text header followed by a binary line table:
//!
//! ```text
//! COVSESSION VERSION: 1
//! COVSESSION ID: <session id>
//! File Table: count <N>
//! <id>, <path>
//! Line Table: <M> lines
//! <M x 12 bytes: file_id u32 LE, line u32 LE, hits u32 LE>
//! ```

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Extension of every report artifact.
pub const REPORT_EXTENSION: &str = "cov";

mod consts {
    pub(crate) const SUPPORTED_FILE_VERSION: u32 = 1;
    pub(crate) const LINE_ENTRY_SIZE: usize = 12;
    pub(crate) const VERSION_PREFIX: &str = "COVSESSION VERSION: ";
    pub(crate) const SESSION_PREFIX: &str = "COVSESSION ID: ";
    pub(crate) const FILE_TABLE_PREFIX: &str = "File Table: count ";
    pub(crate) const LINE_TABLE_PREFIX: &str = "Line Table: ";
}

/// Report header: format version and the session that produced the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportHeader {
    pub version: u32,
    pub session_id: String,
}

impl Default for ReportHeader {
    fn default() -> Self {
        Self {
            version: consts::SUPPORTED_FILE_VERSION,
            session_id: String::new(),
        }
    }
}

/// A source file that was in scope for the session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileEntry {
    pub id: u32,
    pub path: String,
}

/// Hit count for one executed line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineHit {
    pub file_id: u32,
    /// 1-based line number.
    pub line: u32,
    pub hits: u32,
}

/// A builder for creating `CoverageResult` instances.
#[derive(Debug, Default)]
pub struct CoverageResultBuilder {
    data: CoverageResult,
}

impl CoverageResultBuilder {
    /// Sets the identifier of the session the result belongs to.
    pub fn session_id(mut self, session_id: &str) -> Self {
        self.data.header.session_id = session_id.to_string();
        self
    }

    /// Adds a file to the file table. Ids are assigned sequentially.
    pub fn add_file(mut self, path: &str) -> Self {
        let id = self.data.files.len() as u32;
        self.data.files.push(FileEntry {
            id,
            path: path.to_string(),
        });
        self
    }

    pub fn add_hit(mut self, file_id: u32, line: u32, hits: u32) -> Self {
        self.data.lines.push(LineHit {
            file_id,
            line,
            hits,
        });
        self
    }

    /// Consumes the builder and returns the final `CoverageResult`.
    ///
    /// # Errors
    /// Returns a `ValidationError` if the constructed data is inconsistent.
    pub fn build(self) -> Result<CoverageResult> {
        self.data.validate()?;
        Ok(self.data)
    }
}

/// Everything an engine measured during one session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CoverageResult {
    pub header: ReportHeader,
    pub files: Vec<FileEntry>,
    pub lines: Vec<LineHit>,
}

impl CoverageResult {
    pub fn builder() -> CoverageResultBuilder {
        CoverageResultBuilder::default()
    }

    /// Checks for sequential file ids, valid line references and values that
    /// would break the line-oriented header.
    pub fn validate(&self) -> Result<()> {
        if self.header.session_id.contains(['\n', '\r']) {
            return Err(Error::ValidationError(
                "Session id contains a line break".to_string(),
            ));
        }

        for (i, file) in self.files.iter().enumerate() {
            if file.id != i as u32 {
                return Err(Error::ValidationError(format!(
                    "Non-sequential file ID {} at index {}",
                    file.id, i
                )));
            }
            if file.path.contains(['\n', '\r']) {
                return Err(Error::ValidationError(format!(
                    "File path with line break at index {i}"
                )));
            }
        }

        let num_files = self.files.len();
        for hit in &self.lines {
            if hit.file_id as usize >= num_files {
                return Err(Error::ValidationError(format!(
                    "Line record references invalid file ID: {}",
                    hit.file_id
                )));
            }
            if hit.line == 0 {
                return Err(Error::ValidationError(format!(
                    "Line numbers start at 1 (file ID {})",
                    hit.file_id
                )));
            }
        }
        Ok(())
    }

    pub fn find_file(&self, id: u32) -> Option<&FileEntry> {
        self.files.get(id as usize).filter(|f| f.id == id)
    }

    pub fn find_file_by_path(&self, path: &str) -> Option<&FileEntry> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Number of covered lines per file id. Files without hits are absent.
    pub fn get_coverage_stats(&self) -> HashMap<u32, usize> {
        let mut stats = HashMap::new();
        for hit in &self.lines {
            *stats.entry(hit.file_id).or_insert(0) += 1;
        }
        stats
    }

    pub fn total_hits(&self) -> u64 {
        self.lines.iter().map(|l| l.hits as u64).sum()
    }
}

/// Turns a `CoverageResult` into the bytes of a report artifact.
pub trait ReportSerializer {
    fn serialize(&self, result: &CoverageResult, writer: &mut dyn Write) -> Result<()>;
}

/// Writes the `.cov` format.
#[derive(Debug, Clone, Copy, Default)]
pub struct CovSerializer;

impl ReportSerializer for CovSerializer {
    fn serialize(&self, result: &CoverageResult, mut writer: &mut dyn Write) -> Result<()> {
        to_writer(result, &mut writer)
    }
}

/// Returns true for names of the form `<32 lowercase hex chars>.cov`.
pub fn is_report_file_name(name: &str) -> bool {
    let Some(token) = name
        .strip_suffix(REPORT_EXTENSION)
        .and_then(|s| s.strip_suffix('.'))
    else {
        return false;
    };
    token.len() == crate::token::TOKEN_HEX_LEN
        && token
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Lists the report artifacts directly inside `dir`, sorted by path.
pub fn find_reports<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let mut reports = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if entry.file_name().to_str().is_some_and(is_report_file_name) {
            reports.push(entry.path());
        }
    }
    reports.sort();
    Ok(reports)
}

/// Parses a `.cov` file from a file path.
pub fn from_file<P: AsRef<Path>>(path: P) -> Result<CoverageResult> {
    from_reader(File::open(path)?)
}

/// Parses a `.cov` report from any reader.
pub fn from_reader<R: Read>(reader: R) -> Result<CoverageResult> {
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    let version = parse_header_line(&mut reader, &mut line, consts::VERSION_PREFIX)?
        .parse()
        .map_err(|_| Error::InvalidFormat("Malformed version number".into()))?;

    if version != consts::SUPPORTED_FILE_VERSION {
        return Err(Error::UnsupportedVersion(version));
    }

    let session_id =
        parse_header_line(&mut reader, &mut line, consts::SESSION_PREFIX)?.to_string();
    let header = ReportHeader {
        version,
        session_id,
    };

    let files = parse_file_table(&mut reader, &mut line)?;
    let lines = parse_line_table(&mut reader, &mut line)?;

    let data = CoverageResult {
        header,
        files,
        lines,
    };
    data.validate()?;
    Ok(data)
}

fn parse_header_line<'a>(
    reader: &mut impl BufRead,
    line: &'a mut String,
    prefix: &str,
) -> Result<&'a str> {
    line.clear();
    if reader.read_line(line)? == 0 {
        return Err(Error::InvalidFormat(format!(
            "Expected header line with prefix '{prefix}', but found EOF"
        )));
    }
    line.strip_suffix('\n')
        .unwrap_or(line.as_str())
        .strip_prefix(prefix)
        .ok_or_else(|| {
            Error::InvalidFormat(format!(
                "Invalid header line format, expected prefix '{prefix}'"
            ))
        })
}

fn parse_file_table(reader: &mut impl BufRead, line: &mut String) -> Result<Vec<FileEntry>> {
    line.clear();
    reader.read_line(line)?;
    let count = line
        .trim_end()
        .strip_prefix(consts::FILE_TABLE_PREFIX)
        .ok_or_else(|| Error::InvalidFileTable("Missing or malformed header".to_string()))?
        .parse::<usize>()
        .map_err(|_| Error::InvalidFileTable("Invalid count value".to_string()))?;

    let mut files = Vec::new();
    for i in 0..count {
        line.clear();
        if reader.read_line(line)? == 0 {
            return Err(Error::InvalidFileTable(format!(
                "Expected {count} files, found {i}"
            )));
        }
        let entry = line.strip_suffix('\n').unwrap_or(line.as_str());
        let (id, path) = entry
            .split_once(", ")
            .ok_or_else(|| Error::InvalidFileTable(format!("Malformed file entry: {entry}")))?;
        let id = id
            .parse::<u32>()
            .map_err(|_| Error::InvalidFileTable(format!("Invalid file id: {id}")))?;
        if id != i as u32 {
            return Err(Error::InvalidFileTable(format!(
                "Non-sequential file ID. Expected {i}, got {id}"
            )));
        }
        files.push(FileEntry {
            id,
            path: path.to_string(),
        });
    }
    Ok(files)
}

fn parse_line_table(reader: &mut impl BufRead, line: &mut String) -> Result<Vec<LineHit>> {
    line.clear();
    if reader.read_line(line)? == 0 {
        return Err(Error::InvalidLineTable("Missing line table".to_string()));
    }
    let count = line
        .trim_end()
        .strip_prefix(consts::LINE_TABLE_PREFIX)
        .and_then(|rest| rest.strip_suffix(" lines"))
        .ok_or_else(|| Error::InvalidLineTable("Missing or malformed header".to_string()))?
        .parse::<usize>()
        .map_err(|_| Error::InvalidLineTable("Invalid line count".to_string()))?;

    if count == 0 {
        return Ok(Vec::new());
    }

    let len = count
        .checked_mul(consts::LINE_ENTRY_SIZE)
        .and_then(|len| u64::try_from(len).ok())
        .ok_or_else(|| Error::InvalidLineTable(format!("Line count too large: {count}")))?;

    // Grows with the data actually present, never with the declared count.
    let mut binary_data = Vec::new();
    reader.take(len).read_to_end(&mut binary_data)?;
    if (binary_data.len() as u64) < len {
        return Err(Error::InvalidLineTable(format!(
            "Truncated line table, expected {count} records"
        )));
    }

    let lines = binary_data
        .chunks_exact(consts::LINE_ENTRY_SIZE)
        .map(|chunk| LineHit {
            file_id: read_u32(&chunk[0..4]),
            line: read_u32(&chunk[4..8]),
            hits: read_u32(&chunk[8..12]),
        })
        .collect();

    Ok(lines)
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

/// Writes a result to a file path, replacing any existing file.
pub fn to_file<P: AsRef<Path>>(data: &CoverageResult, path: P) -> Result<()> {
    let mut file = File::create(path)?;
    to_writer(data, &mut file)?;
    file.flush()?;
    Ok(())
}

/// Writes a result to any writer.
pub fn to_writer<W: Write>(data: &CoverageResult, writer: &mut W) -> Result<()> {
    data.validate()?;

    writeln!(writer, "{}{}", consts::VERSION_PREFIX, data.header.version)?;
    writeln!(writer, "{}{}", consts::SESSION_PREFIX, data.header.session_id)?;

    writeln!(writer, "{}{}", consts::FILE_TABLE_PREFIX, data.files.len())?;
    for file in &data.files {
        writeln!(writer, "{}, {}", file.id, file.path)?;
    }

    writeln!(
        writer,
        "{}{} lines",
        consts::LINE_TABLE_PREFIX,
        data.lines.len()
    )?;
    if !data.lines.is_empty() {
        let mut binary_data = Vec::with_capacity(data.lines.len() * consts::LINE_ENTRY_SIZE);
        for hit in &data.lines {
            binary_data.extend_from_slice(&hit.file_id.to_le_bytes());
            binary_data.extend_from_slice(&hit.line.to_le_bytes());
            binary_data.extend_from_slice(&hit.hits.to_le_bytes());
        }
        writer.write_all(&binary_data)?;
    }

    Ok(())
}
