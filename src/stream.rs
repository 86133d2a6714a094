//! Record-at-a-time reading of the text format.
//!
//! The header (library attributes and attribute sets) is parsed up front;
//! each `<Spectrum=K>` or `<Cluster=K>` block after it is parsed on demand,
//! so only one record is held in memory at a time. Line numbers in errors
//! stay absolute.

use crate::ast::{Library, Record};
use crate::error::ParserError;
use crate::parser::Parser;
use log::debug;
use miette::NamedSource;
use std::collections::HashSet;

pub struct RecordReader<'a> {
    name: String,
    text: &'a str,
    // Byte offset and 1-based line of the next record's opening tag
    offset: usize,
    line: usize,
    header: Library,
    spectrum_ids: HashSet<String>,
    cluster_ids: HashSet<String>,
    failed: bool,
}

impl<'a> RecordReader<'a> {
    /// Parses the header of `text` and positions the reader on its first record.
    pub fn new(text: &'a str, name: impl Into<String>) -> Result<Self, ParserError> {
        let name = name.into();
        let (header_end, header_lines) = next_record(text, 0);
        let header = Parser::new_with_name(&text[..header_end], name.clone()).parse_library()?;
        debug!(
            "{name}: header spans {header_lines} lines, {} attribute sets",
            header.attribute_sets.len()
        );
        Ok(Self {
            name,
            text,
            offset: header_end,
            line: header_lines + 1,
            header,
            spectrum_ids: HashSet::new(),
            cluster_ids: HashSet::new(),
            failed: false,
        })
    }

    /// The library attributes and attribute sets.
    pub fn header(&self) -> &Library {
        &self.header
    }

    pub fn into_header(self) -> Library {
        self.header
    }

    fn check_unique(&mut self, record: Record, chunk: &str, line: usize) -> Result<Record, ParserError> {
        let (entity, id, fresh) = match &record {
            Record::Spectrum(spectrum) => (
                "Spectrum",
                spectrum.id.clone(),
                self.spectrum_ids.insert(spectrum.id.clone()),
            ),
            Record::Cluster(cluster) => (
                "Cluster",
                cluster.id.clone(),
                self.cluster_ids.insert(cluster.id.clone()),
            ),
        };
        if fresh {
            return Ok(record);
        }
        let tag_len = chunk.lines().next().map_or(0, str::len);
        Err(ParserError::DuplicateId {
            src: NamedSource::new(self.name.clone(), chunk.to_string()),
            span: (0, tag_len).into(),
            line,
            entity: entity.to_string(),
            id,
        })
    }
}

impl Iterator for RecordReader<'_> {
    type Item = Result<Record, ParserError>;

    /// Yields records in file order. Iteration ends after the first error.
    fn next(&mut self) -> Option<Self::Item> {
        let text = self.text;
        if self.failed || self.offset >= text.len() {
            return None;
        }

        let tag_line_len = text[self.offset..]
            .find('\n')
            .map_or(text.len() - self.offset, |i| i + 1);
        let (end, lines) = next_record(text, self.offset + tag_line_len);
        let chunk = &text[self.offset..end];
        let first_line = self.line;
        self.offset = end;
        self.line += lines + 1;

        let result = Parser::with_first_line(chunk, self.name.clone(), first_line)
            .parse_record()
            .and_then(|record| self.check_unique(record, chunk, first_line));
        if result.is_err() {
            self.failed = true;
        }
        Some(result)
    }
}

/// Byte offset of the first record tag line at or after `from`, and the
/// number of lines before it.
fn next_record(text: &str, from: usize) -> (usize, usize) {
    let mut offset = from;
    let mut lines = 0;
    for line in text[from..].split_inclusive('\n') {
        if is_record_tag(line) {
            return (offset, lines);
        }
        offset += line.len();
        lines += 1;
    }
    (text.len(), lines)
}

fn is_record_tag(line: &str) -> bool {
    let line = line.trim_end();
    line.starts_with("<Spectrum=") || line.starts_with("<Cluster=")
}
