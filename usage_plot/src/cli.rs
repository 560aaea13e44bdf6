use std::path::PathBuf;

use clap::{error::ErrorKind, Parser};
use log::LevelFilter;

use crate::FAILURE_EXIT_CODE;

pub const DEFAULT_GPU_HOURS_OUTPUT: &str = "gpu_hours.png";
pub const DEFAULT_NODES_OUTPUT: &str = "nodes.png";
pub const DEFAULT_AGGREGATE_OUTPUT: &str = "aggregate.png";

#[derive(Debug, Clone, PartialEq, clap::Args)]
pub struct Common {
    /// Extra settings file, layered over `config/usage_plot.toml`
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// off, error, warn, info, debug or trace
    #[arg(long, default_value_t = LevelFilter::Info)]
    pub log_level: LevelFilter,
}

/// Plot GPU-hours per user as a bar chart, highest usage first.
#[derive(Debug, Clone, PartialEq, Parser)]
#[command(version)]
pub struct GpuHoursArgs {
    /// Table with a header naming at least `USER` and `GPU-HOURS` (whitespace, comma or `|` separated)
    pub input_file: PathBuf,
    #[arg(default_value = DEFAULT_GPU_HOURS_OUTPUT)]
    pub output_file: PathBuf,
    #[command(flatten)]
    pub common: Common,
}

/// Plot per-node and cluster-wide CPU, memory and GPU allocation from a node listing.
#[derive(Debug, Clone, PartialEq, Parser)]
#[command(version)]
pub struct ClusterStatsArgs {
    /// One node per line: `NAME STATE FREE/TOTAL_CPU LOAD FREE/TOTAL_MEM<unit> FREE/TOTAL_GPU ...`
    pub statsfile: PathBuf,
    #[arg(long, default_value = DEFAULT_NODES_OUTPUT)]
    pub nodes_output: PathBuf,
    #[arg(long, default_value = DEFAULT_AGGREGATE_OUTPUT)]
    pub aggregate_output: PathBuf,
    /// Title of the per-node chart (default: `node_chart_title` setting)
    #[arg(long)]
    pub title: Option<String>,
    #[command(flatten)]
    pub common: Common,
}

/// [`Parser::parse`], except that usage errors exit with 1 instead of clap's 2.
pub fn parse_args<A: Parser>() -> A {
    A::try_parse().unwrap_or_else(|e| match e.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => e.exit(),
        _ => {
            let _ = e.print();
            std::process::exit(FAILURE_EXIT_CODE.into())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpu_hours_defaults() {
        let args = GpuHoursArgs::try_parse_from(["gpu-hours-plot", "report.txt"]).unwrap();
        assert_eq!(args.input_file, PathBuf::from("report.txt"));
        assert_eq!(args.output_file, PathBuf::from(DEFAULT_GPU_HOURS_OUTPUT));
        assert_eq!(args.common.log_level, LevelFilter::Info);
        assert_eq!(args.common.config, None);
    }

    #[test]
    fn gpu_hours_output_and_flags() {
        let args = GpuHoursArgs::try_parse_from([
            "gpu-hours-plot",
            "report.txt",
            "out.png",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(args.output_file, PathBuf::from("out.png"));
        assert_eq!(args.common.log_level, LevelFilter::Debug);
    }

    #[test]
    fn gpu_hours_requires_input() {
        let error = GpuHoursArgs::try_parse_from(["gpu-hours-plot"]).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn cluster_stats_defaults() {
        let args = ClusterStatsArgs::try_parse_from(["cluster-stats-plot", "stats.txt"]).unwrap();
        assert_eq!(args.statsfile, PathBuf::from("stats.txt"));
        assert_eq!(args.nodes_output, PathBuf::from(DEFAULT_NODES_OUTPUT));
        assert_eq!(args.aggregate_output, PathBuf::from(DEFAULT_AGGREGATE_OUTPUT));
        assert_eq!(args.title, None);
    }

    #[test]
    fn cluster_stats_title() {
        let args = ClusterStatsArgs::try_parse_from([
            "cluster-stats-plot",
            "stats.txt",
            "--title",
            "Per-node Resource Usage at PLI",
        ])
        .unwrap();
        assert_eq!(args.title.as_deref(), Some("Per-node Resource Usage at PLI"));
    }
}
