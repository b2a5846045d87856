use anyhow::{Result, anyhow, bail};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// The tabular file a session answers questions about. Only the schema and
/// size are read here; the rows are loaded by pandas where code runs.
///
/// The header scan names columns the way `pandas.read_csv` does, but once
/// pandas has read the file its names replace the scanned ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    pub path: PathBuf,
    pub columns: Vec<String>,
    pub row_count: usize,
}

impl Dataset {
    pub fn load(path: &Path) -> Result<Self> {
        let absolute = fs::canonicalize(path)
            .map_err(|err| anyhow!("Failed to load dataset {}: {err}", path.display()))?;
        let text = fs::read_to_string(&absolute)
            .map_err(|err| anyhow!("Failed to load dataset {}: {err}", absolute.display()))?;

        let (columns, row_count) = parse_csv_shape(&text)
            .map_err(|reason| anyhow!("Failed to load dataset {}: {reason}", absolute.display()))?;

        Ok(Self {
            path: absolute,
            columns,
            row_count,
        })
    }

    #[cfg(any(test, feature = "test-support"))]
    pub fn from_parts(path: impl Into<PathBuf>, columns: &[&str], row_count: usize) -> Self {
        Self {
            path: path.into(),
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            row_count,
        }
    }

    /// Takes the column names and row count pandas reported for this file.
    pub fn adopt_pandas_shape(&mut self, columns: Vec<String>, row_count: usize) {
        self.columns = columns;
        self.row_count = row_count;
    }

    pub fn describe(&self) -> String {
        format!(
            "{} ({} rows, {} columns)",
            self.path.display(),
            self.row_count,
            self.columns.len()
        )
    }
}

/// Header fields plus the number of data records. Quoted fields may span
/// lines and escape quotes as `""`.
fn parse_csv_shape(text: &str) -> Result<(Vec<String>, usize), String> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut records = CsvRecords::new(text);

    let Some(header) = records.next() else {
        return Err("file is empty".to_string());
    };
    let header = header?;
    if header.iter().all(|field| field.trim().is_empty()) {
        return Err("missing header row".to_string());
    }

    let mut row_count = 0;
    for record in records {
        let record = record?;
        if !(record.len() == 1 && record[0].is_empty()) {
            row_count += 1;
        }
    }

    Ok((pandas_column_names(header), row_count))
}

/// Blank names become `Unnamed: <index>` and repeats get `.1`, `.2`, ...
/// suffixes, skipping any suffixed name already taken.
fn pandas_column_names(header: Vec<String>) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    header
        .into_iter()
        .enumerate()
        .map(|(index, raw)| {
            let mut name = if raw.is_empty() {
                format!("Unnamed: {index}")
            } else {
                raw
            };
            let mut seen = counts.get(&name).copied().unwrap_or(0);
            while seen > 0 {
                counts.insert(name.clone(), seen + 1);
                name = format!("{name}.{seen}");
                seen = counts.get(&name).copied().unwrap_or(0);
            }
            counts.insert(name.clone(), seen + 1);
            name
        })
        .collect()
}

struct CsvRecords<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> CsvRecords<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            chars: text.chars().peekable(),
        }
    }
}

impl Iterator for CsvRecords<'_> {
    type Item = Result<Vec<String>, String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.chars.peek()?;

        let mut fields = Vec::new();
        let mut field = String::new();
        let mut in_quotes = false;

        while let Some(ch) = self.chars.next() {
            if in_quotes {
                match ch {
                    '"' if self.chars.peek() == Some(&'"') => {
                        self.chars.next();
                        field.push('"');
                    }
                    '"' => in_quotes = false,
                    other => field.push(other),
                }
                continue;
            }

            match ch {
                '"' if field.is_empty() => in_quotes = true,
                ',' => fields.push(std::mem::take(&mut field)),
                '\r' if self.chars.peek() == Some(&'\n') => {}
                '\n' => {
                    fields.push(field);
                    return Some(Ok(fields));
                }
                other => field.push(other),
            }
        }

        if in_quotes {
            return Some(Err("unterminated quoted field".to_string()));
        }
        fields.push(field);
        Some(Ok(fields))
    }
}

pub fn require_dataset_path(explicit: Option<&Path>, configured: Option<&Path>) -> Result<PathBuf> {
    match explicit.or(configured) {
        Some(path) => Ok(path.to_path_buf()),
        None => bail!("No dataset configured: pass --dataset <path> or set DATASET_PATH"),
    }
}
