use std::process::ExitCode;

use usage_plot::{
    cli::{self, ClusterStatsArgs},
    config::read_config,
    exit_code, logging, pipeline,
};

fn main() -> ExitCode {
    let args: ClusterStatsArgs = cli::parse_args();
    logging::init_logger(args.common.log_level);

    exit_code(
        read_config(args.common.config.as_deref())
            .and_then(|settings| pipeline::cluster_stats_plot(&args, &settings)),
    )
}
