use std::{cmp::Reverse, num::ParseFloatError, path::Path};

use derive_more::derive::{Deref, Display, From, Into};
use itertools::Itertools as _;
use ordered_float::OrderedFloat;
use thiserror::Error;

use crate::error::{read_to_string, ReadError};

pub const USER_COLUMN: &str = "USER";
pub const GPU_HOURS_COLUMN: &str = "GPU-HOURS";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Deref, Display, From, Into)]
pub struct SlurmUser(pub String);

#[derive(Debug, Clone, PartialEq)]
pub struct UsageRow {
    pub user: SlurmUser,
    pub gpu_hours: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Whitespace,
    Comma,
    /// `sacct -P` / `sreport -P`
    Pipe,
}

impl Delimiter {
    /// Tried in this order against the header line.
    pub const CANDIDATES: [Delimiter; 3] = [Delimiter::Whitespace, Delimiter::Comma, Delimiter::Pipe];

    pub fn split(self, line: &str) -> Vec<&str> {
        match self {
            Delimiter::Whitespace => line.split_whitespace().collect_vec(),
            Delimiter::Comma => line.split(',').map(str::trim).collect_vec(),
            Delimiter::Pipe => line.split('|').map(str::trim).collect_vec(),
        }
    }
}

/// Where the interesting columns sit in the header.
#[derive(Debug, Clone, Copy)]
struct Columns {
    user: usize,
    gpu_hours: usize,
    width: usize,
}

impl Columns {
    fn find(header: &[&str]) -> Option<Self> {
        let position = |name: &str| header.iter().position(|&field| field == name);
        Some(Self {
            user: position(USER_COLUMN)?,
            gpu_hours: position(GPU_HOURS_COLUMN)?,
            width: header.len(),
        })
    }
}

#[derive(Debug, Error)]
pub enum UsageTableError {
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error("data seems to be empty")]
    Empty,
    #[error("input file must contain at least '{user}' and '{hours}' columns", user = USER_COLUMN, hours = GPU_HOURS_COLUMN)]
    MissingColumns,
    #[error("line {line}: expected {expected} fields, got {got}")]
    RaggedRow {
        line: usize,
        expected: usize,
        got: usize,
    },
    #[error("line {line}: `{value}` is not a valid number of GPU-hours")]
    InvalidGpuHours {
        line: usize,
        value: String,
        #[source]
        source: Option<ParseFloatError>,
    },
}

/// Blank lines and the `-----` rulers slurm tools print under their headers.
fn is_filler(line: &str) -> bool {
    line.chars().all(|c| matches!(c, '-' | '+' | ' ' | '\t'))
}

fn parse_row(
    line_number: usize,
    line: &str,
    delimiter: Delimiter,
    columns: Columns,
) -> Result<UsageRow, UsageTableError> {
    let fields = delimiter.split(line);
    let ragged = || UsageTableError::RaggedRow {
        line: line_number,
        expected: columns.width,
        got: fields.len(),
    };
    if fields.len() > columns.width {
        return Err(ragged());
    }
    let (Some(&user), Some(&value)) = (fields.get(columns.user), fields.get(columns.gpu_hours)) else {
        return Err(ragged());
    };

    let invalid = |source| UsageTableError::InvalidGpuHours {
        line: line_number,
        value: value.to_owned(),
        source,
    };
    let gpu_hours = value.parse::<f64>().map_err(|e| invalid(Some(e)))?;
    if !gpu_hours.is_finite() {
        return Err(invalid(None));
    }

    Ok(UsageRow {
        user: SlurmUser(user.to_owned()),
        gpu_hours,
    })
}

/// GPU-hours per user, in input order. The first non-blank line is the header and has to name
/// both a `USER` and a `GPU-HOURS` column; any other columns are ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageTable {
    rows: Vec<UsageRow>,
    delimiter: Delimiter,
}

impl UsageTable {
    pub fn parse(input: impl AsRef<str>) -> Result<Self, UsageTableError> {
        let mut lines = input
            .as_ref()
            .lines()
            .enumerate()
            .map(|(i, line)| (i + 1, line))
            .filter(|(_, line)| !is_filler(line));

        let Some((_, header)) = lines.next() else {
            return Err(UsageTableError::Empty);
        };
        let (delimiter, columns) = Delimiter::CANDIDATES
            .into_iter()
            .find_map(|delimiter| Columns::find(&delimiter.split(header)).map(|c| (delimiter, c)))
            .ok_or(UsageTableError::MissingColumns)?;

        let rows = lines
            .map(|(line_number, line)| parse_row(line_number, line, delimiter, columns))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { rows, delimiter })
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self, UsageTableError> {
        Self::parse(read_to_string(path.as_ref())?)
    }

    pub fn rows(&self) -> &[UsageRow] {
        &self.rows
    }

    pub fn delimiter(&self) -> Delimiter {
        self.delimiter
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Highest usage first. Users with equal usage keep their input order.
    pub fn sorted_descending(&self) -> Vec<&UsageRow> {
        self.rows
            .iter()
            .sorted_by_key(|row| Reverse(OrderedFloat(row.gpu_hours)))
            .collect_vec()
    }

    pub fn total_gpu_hours(&self) -> f64 {
        self.rows.iter().map(|row| row.gpu_hours).sum()
    }
}
