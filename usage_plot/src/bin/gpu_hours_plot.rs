use std::process::ExitCode;

use usage_plot::{
    cli::{self, GpuHoursArgs},
    config::read_config,
    exit_code, logging, pipeline,
};

fn main() -> ExitCode {
    let args: GpuHoursArgs = cli::parse_args();
    logging::init_logger(args.common.log_level);

    exit_code(
        read_config(args.common.config.as_deref())
            .and_then(|settings| pipeline::gpu_hours_plot(&args, &settings)),
    )
}
