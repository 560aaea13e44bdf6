use std::{
    num::{ParseFloatError, ParseIntError},
    ops::Sub,
    path::Path,
};

use itertools::Itertools as _;
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::error::{read_to_string, ReadError};
use crate::misc::parsing::normalize;

/// Lines containing any of these are column headers of the report.
const HEADER_MARKERS: [&str; 2] = ["NODELIST", "STATE"];

/// name, state, cpu, load, mem, gpu
pub const MIN_FIELDS: usize = 6;

static MEM_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<free>[0-9]+)/(?P<total>[0-9]+)(?P<unit>[A-Za-z]*)")
        .expect("memory field regex should compile")
});

/// A `free/total` pair. Can only be built with `total >= free >= 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Allocation<T> {
    free: T,
    total: T,
}

impl<T> Allocation<T>
where
    T: Copy + Default + PartialOrd + Sub<Output = T>,
{
    pub fn new(free: T, total: T) -> Option<Self> {
        (free >= T::default() && total >= free).then_some(Self { free, total })
    }

    pub fn free(&self) -> T {
        self.free
    }

    pub fn total(&self) -> T {
        self.total
    }

    pub fn used(&self) -> T {
        self.total - self.free
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Cpu,
    Memory,
    Gpu,
}

impl Resource {
    pub const ALL: [Resource; 3] = [Resource::Cpu, Resource::Memory, Resource::Gpu];

    pub fn label(self) -> &'static str {
        match self {
            Resource::Cpu => "CPUs",
            Resource::Memory => "Memory (MB)",
            Resource::Gpu => "GPUs",
        }
    }
}

/// One line of the node report. Memory is in MB.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRow {
    pub name: String,
    pub state: String,
    pub cpu: Allocation<u32>,
    pub load: f64,
    pub mem: Allocation<f64>,
    pub gpu: Allocation<u32>,
}

impl NodeRow {
    pub fn used(&self, resource: Resource) -> f64 {
        match resource {
            Resource::Cpu => self.cpu.used().into(),
            Resource::Memory => self.mem.used(),
            Resource::Gpu => self.gpu.used().into(),
        }
    }

    pub fn free(&self, resource: Resource) -> f64 {
        match resource {
            Resource::Cpu => self.cpu.free().into(),
            Resource::Memory => self.mem.free(),
            Resource::Gpu => self.gpu.free().into(),
        }
    }

    pub fn total(&self, resource: Resource) -> f64 {
        match resource {
            Resource::Cpu => self.cpu.total().into(),
            Resource::Memory => self.mem.total(),
            Resource::Gpu => self.gpu.total().into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NodeLineError {
    #[error("{field} `{value}`: expected `free/total`")]
    NotAFraction { field: &'static str, value: String },
    #[error("{field} `{value}`: {source}")]
    InvalidCount {
        field: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },
    #[error("load `{value}`: {source}")]
    InvalidLoad {
        value: String,
        #[source]
        source: ParseFloatError,
    },
    #[error("memory `{0}`: expected `free/total<unit>`")]
    MemoryPattern(String),
    #[error("{field} `{value}`: free is negative or exceeds total")]
    FreeExceedsTotal { field: &'static str, value: String },
}

/// Why a line did not turn into a [`NodeRow`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SkipReason {
    #[error("blank line")]
    Blank,
    #[error("header line")]
    Header,
    #[error("expected at least {min} fields, got {0}", min = MIN_FIELDS)]
    TooFewFields(usize),
    #[error(transparent)]
    Malformed(#[from] NodeLineError),
}

impl SkipReason {
    /// Blank and header lines are expected, everything else means data got dropped.
    pub fn is_rejection(&self) -> bool {
        matches!(self, SkipReason::TooFewFields(_) | SkipReason::Malformed(_))
    }
}

fn parse_count_pair(field: &'static str, value: &str) -> Result<Allocation<u32>, NodeLineError> {
    let Some((free, total)) = value.split_once('/') else {
        return Err(NodeLineError::NotAFraction {
            field,
            value: value.to_owned(),
        });
    };
    let parse = |count: &str| {
        count
            .parse::<u32>()
            .map_err(|source| NodeLineError::InvalidCount {
                field,
                value: value.to_owned(),
                source,
            })
    };
    Allocation::new(parse(free)?, parse(total)?).ok_or_else(|| NodeLineError::FreeExceedsTotal {
        field,
        value: value.to_owned(),
    })
}

/// `free/total<unit>`, the unit applies to both sides.
fn parse_memory(value: &str) -> Result<Allocation<f64>, NodeLineError> {
    let caps = MEM_FIELD
        .captures(value)
        .ok_or_else(|| NodeLineError::MemoryPattern(value.to_owned()))?;
    let unit = &caps["unit"];
    let free = normalize(&format!("{}{unit}", &caps["free"]));
    let total = normalize(&format!("{}{unit}", &caps["total"]));
    Allocation::new(free, total).ok_or_else(|| NodeLineError::FreeExceedsTotal {
        field: "memory",
        value: value.to_owned(),
    })
}

/// Parses one line of the form `NAME STATE FREE/TOTAL_CPU LOAD FREE/TOTAL_MEM<unit> FREE/TOTAL_GPU ...`.
/// Everything after the gpu column is ignored.
pub fn parse_node_line(line: &str) -> Result<NodeRow, SkipReason> {
    let line = line.trim();
    if line.is_empty() {
        return Err(SkipReason::Blank);
    }
    if HEADER_MARKERS.iter().any(|marker| line.contains(marker)) {
        return Err(SkipReason::Header);
    }

    let fields = line.split_whitespace().collect_vec();
    let &[name, state, cpu, load, mem, gpu, ..] = fields.as_slice() else {
        return Err(SkipReason::TooFewFields(fields.len()));
    };

    Ok(NodeRow {
        name: name.to_owned(),
        state: state.to_owned(),
        cpu: parse_count_pair("cpu", cpu)?,
        load: load
            .parse()
            .map_err(|source| NodeLineError::InvalidLoad {
                value: load.to_owned(),
                source,
            })?,
        mem: parse_memory(mem)?,
        gpu: parse_count_pair("gpu", gpu)?,
    })
}

/// All nodes of one report, in input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeTable {
    rows: Vec<NodeRow>,
    rejected: usize,
}

impl NodeTable {
    /// Never fails: lines that can't be parsed are logged and dropped.
    pub fn parse(input: impl AsRef<str>) -> Self {
        let (rows, skipped): (Vec<_>, Vec<_>) = input
            .as_ref()
            .lines()
            .enumerate()
            .map(|(i, line)| {
                parse_node_line(line).inspect_err(|reason| log_skip(i + 1, line, reason))
            })
            .partition_result();

        Self {
            rows,
            rejected: skipped.iter().filter(|reason| reason.is_rejection()).count(),
        }
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self, ReadError> {
        Ok(Self::parse(read_to_string(path.as_ref())?))
    }

    pub fn rows(&self) -> &[NodeRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of lines that looked like data but were dropped.
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    pub fn sum_used(&self, resource: Resource) -> f64 {
        self.rows.iter().map(|row| row.used(resource)).sum()
    }

    pub fn sum_free(&self, resource: Resource) -> f64 {
        self.rows.iter().map(|row| row.free(resource)).sum()
    }
}

fn log_skip(line_number: usize, line: &str, reason: &SkipReason) {
    match reason {
        SkipReason::Malformed(e) => {
            warn!("Skipping line {line_number}: {} error: {e}", line.trim())
        }
        other => debug!("ignoring line {line_number}: {other}"),
    }
}
