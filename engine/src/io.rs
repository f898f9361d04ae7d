//! Utilities for reading and writing the whitespace separated text files
//! exchanged between the preprocessing stages.
//!
//! To use it you should import the `Load` and `Store` traits and use the
//! `load_from` and `write_to` methods.
//!
//! # Example
//!
//! ```no_run
//! # use road_network_prep::io::*;
//! # use road_network_prep::datastr::graph::WeightedEdgeList;
//!
//! let time = WeightedEdgeList::load_from("Guangdong.time")?;
//! time.write_to(&"Guangdong_copy.time")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::error::{IoContext, PrepError, Result};
use std::{
    fs::File,
    io::{prelude::*, BufReader, BufWriter},
    path::{Path, PathBuf},
    str::{FromStr, SplitWhitespace},
};

/// Line oriented reader which keeps track of the current position
/// so that syntax errors can point to the offending line.
#[derive(Debug)]
pub struct TextReader<R = BufReader<File>> {
    path: PathBuf,
    inner: R,
    line: usize,
    buf: String,
}

impl TextReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_path(path)?;
        Ok(Self::from_reader(path, BufReader::new(file)))
    }
}

impl<R: BufRead> TextReader<R> {
    pub fn from_reader(path: impl Into<PathBuf>, inner: R) -> Self {
        TextReader {
            path: path.into(),
            inner,
            line: 0,
            buf: String::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_raw_line(&mut self) -> Result<bool> {
        self.buf.clear();
        let read = self.inner.read_line(&mut self.buf).with_path(&self.path)?;
        if read > 0 {
            self.line += 1;
        }
        Ok(read > 0)
    }

    /// Skip one line, usually a column header. Fails on premature end of file.
    pub fn skip_line(&mut self) -> Result<()> {
        if self.read_raw_line()? {
            Ok(())
        } else {
            Err(self.syntax_error("unexpected end of file"))
        }
    }

    /// The next non-blank line split into whitespace separated fields.
    pub fn next_fields(&mut self) -> Result<Option<Fields<'_>>> {
        loop {
            if !self.read_raw_line()? {
                return Ok(None);
            }
            if !self.buf.trim().is_empty() {
                break;
            }
        }
        Ok(Some(Fields::new(&self.path, self.line, &self.buf)))
    }

    /// Like `next_fields` but a missing line is a syntax error.
    pub fn expect_fields(&mut self) -> Result<Fields<'_>> {
        if self.next_fields()?.is_none() {
            return Err(self.syntax_error("unexpected end of file"));
        }
        Ok(Fields::new(&self.path, self.line, &self.buf))
    }

    /// Read a header line consisting of a single count.
    pub fn read_count(&mut self) -> Result<usize> {
        let mut fields = self.expect_fields()?;
        fields.next()
    }

    pub fn syntax_error(&self, content: &str) -> PrepError {
        PrepError::Syntax {
            path: self.path.clone(),
            line: self.line,
            content: content.to_string(),
        }
    }
}

/// The fields of a single line.
#[derive(Debug)]
pub struct Fields<'a> {
    path: &'a Path,
    line: usize,
    text: &'a str,
    tokens: SplitWhitespace<'a>,
}

impl<'a> Fields<'a> {
    fn new(path: &'a Path, line: usize, text: &'a str) -> Self {
        Fields {
            path,
            line,
            text: text.trim_end(),
            tokens: text.split_whitespace(),
        }
    }

    /// Parse the next field.
    pub fn next<T: FromStr>(&mut self) -> Result<T> {
        match self.tokens.next() {
            Some(token) => token.parse().map_err(|_| self.error()),
            None => Err(self.error()),
        }
    }

    /// Parse the next `n` fields into a vector.
    pub fn next_n<T: FromStr>(&mut self, n: usize) -> Result<Vec<T>> {
        (0..n).map(|_| self.next()).collect()
    }

    /// Number of fields on this line.
    pub fn len(&self) -> usize {
        self.text.split_whitespace().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn error(&self) -> PrepError {
        PrepError::Syntax {
            path: self.path.to_path_buf(),
            line: self.line,
            content: self.text.to_string(),
        }
    }
}

/// A trait which allows reading a data structure from a text file.
pub trait Load: Sized {
    fn load<R: BufRead>(reader: &mut TextReader<R>) -> Result<Self>;

    fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = TextReader::open(path.as_ref())?;
        Self::load(&mut reader)
    }
}

/// A trait which allows writing a data structure to a text file.
pub trait Store {
    fn store(&self, out: &mut dyn Write) -> std::io::Result<()>;

    fn write_to(&self, path: &dyn AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        write_text(path, |out| self.store(out))
    }
}

/// Create (or truncate) `path` and hand a buffered writer to `f`.
pub fn write_text<F>(path: &Path, f: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> std::io::Result<()>,
{
    let mut out = BufWriter::new(File::create(path).with_path(path)?);
    f(&mut out).with_path(path)?;
    out.flush().with_path(path)
}

#[cfg(test)]
pub(crate) fn reader_for(content: &str) -> TextReader<std::io::Cursor<Vec<u8>>> {
    TextReader::from_reader("<memory>", std::io::Cursor::new(content.as_bytes().to_vec()))
}

#[cfg(test)]
pub(crate) fn store_to_string<S: Store>(data: &S) -> String {
    let mut buf = Vec::new();
    data.store(&mut buf).unwrap();
    String::from_utf8(buf).unwrap()
}
