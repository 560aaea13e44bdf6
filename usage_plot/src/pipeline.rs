use anyhow::{ensure, Result};
use log::{info, warn};
use thiserror::Error;
use usage_data::{NodeTable, UsageTable};

use crate::{
    cli::{ClusterStatsArgs, GpuHoursArgs},
    config::Settings,
    render::{plot, render_png, FigureSize, Theme},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("No data parsed.")]
    NoDataParsed,
    #[error("no users found in input, nothing to plot")]
    NoUsageRows,
}

/// Reads the usage table and plots it as one bar per user, highest usage first.
pub fn gpu_hours_plot(args: &GpuHoursArgs, settings: &Settings) -> Result<()> {
    let table = UsageTable::read(&args.input_file)?;
    info!(
        "read {} users ({:?} separated) from {}",
        table.len(),
        table.delimiter(),
        args.input_file.display()
    );
    ensure!(!table.is_empty(), PipelineError::NoUsageRows);

    let rows = table.sorted_descending();
    let theme = Theme::from(settings);
    render_png(
        &args.output_file,
        FigureSize::GPU_HOURS.in_pixels(settings.dpi),
        |backend| plot::gpu_hours(backend, &theme, &rows),
    )?;
    println!("Saved plot to {}", args.output_file.display());

    Ok(())
}

/// Parses the node listing and writes both the per-node and the aggregate chart.
pub fn cluster_stats_plot(args: &ClusterStatsArgs, settings: &Settings) -> Result<()> {
    let table = NodeTable::read(&args.statsfile)?;
    if table.rejected() > 0 {
        warn!("{} lines of {} could not be parsed", table.rejected(), args.statsfile.display());
    }
    ensure!(!table.is_empty(), PipelineError::NoDataParsed);
    info!("parsed {} nodes from {}", table.len(), args.statsfile.display());

    let theme = Theme::from(settings);
    let title = args.title.as_deref().unwrap_or(&settings.node_chart_title);

    render_png(
        &args.nodes_output,
        FigureSize::NODES.in_pixels(settings.dpi),
        |backend| plot::per_node(backend, &theme, title, &table),
    )?;
    println!("Saved per-node stacked plot to {}", args.nodes_output.display());

    render_png(
        &args.aggregate_output,
        FigureSize::AGGREGATE.in_pixels(settings.dpi),
        |backend| plot::aggregate(backend, &theme, &table),
    )?;
    println!("Saved aggregate stacked plot to {}", args.aggregate_output.display());

    Ok(())
}
