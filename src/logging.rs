use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

/// Writes formatted log lines to stderr. `quiet` drops them, which `analyze`
/// uses when event rendering already covers the job.
#[derive(Clone, Copy)]
pub(crate) struct StderrMakeWriter {
    pub quiet: bool,
}

impl<'a> MakeWriter<'a> for StderrMakeWriter {
    type Writer = StderrWriter;

    fn make_writer(&'a self) -> Self::Writer {
        StderrWriter { quiet: self.quiet }
    }
}

pub(crate) struct StderrWriter {
    quiet: bool,
}

impl std::io::Write for StderrWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if !self.quiet {
            std::io::stderr().write_all(buf)?;
        }
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        if !self.quiet {
            std::io::stderr().flush()?;
        }
        Ok(())
    }
}

/// `RUST_LOG` wins over the configured level.
pub(crate) fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber once; later calls are no-ops.
pub(crate) fn init_tracing(level: &str, quiet: bool) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(build_filter(level))
        .with_target(false)
        .with_writer(StderrMakeWriter { quiet })
        .try_init();
}
