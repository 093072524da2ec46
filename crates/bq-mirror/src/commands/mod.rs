pub mod batch_sync;
pub mod connection_info;
pub mod schema_sync;
pub mod table_sync;

use common::BatchReport;
use std::process::ExitCode;

pub(crate) fn report_exit_code(report: &BatchReport) -> ExitCode {
    ExitCode::from(report.exit_code())
}
