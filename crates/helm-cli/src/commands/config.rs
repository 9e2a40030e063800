use helm_types::HelmConfig;

use crate::error::CliResult;
use crate::output::OutputFormat;

pub fn show(config: &HelmConfig, format: OutputFormat) -> CliResult<()> {
    crate::output::print_one(config, format);
    Ok(())
}
