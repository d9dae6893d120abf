use std::io::IsTerminal;

use color_eyre::eyre::WrapErr;
use tracing::Subscriber;
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    filter::Directive,
    layer::{Layer, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter,
};

#[derive(Clone, Default, Debug, clap::ValueEnum)]
pub(crate) enum Logger {
    #[default]
    Compact,
    Full,
    Pretty,
    Json,
}

impl std::fmt::Display for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let logger = match self {
            Logger::Compact => "compact",
            Logger::Full => "full",
            Logger::Pretty => "pretty",
            Logger::Json => "json",
        };
        write!(f, "{}", logger)
    }
}

#[derive(clap::Args, Debug, Default)]
pub(crate) struct Instrumentation {
    /// Enable debug logs, -vv for trace
    #[clap(
        short = 'v',
        env = "GHA_SIGSTORE_CONFORMANCE_VERBOSITY",
        long,
        action = clap::ArgAction::Count,
        global = true
    )]
    pub(crate) verbose: u8,
    /// Which logger to use
    #[clap(
        long,
        env = "GHA_SIGSTORE_CONFORMANCE_LOGGER",
        default_value_t = Default::default(),
        global = true
    )]
    pub(crate) logger: Logger,
    /// Tracing directives
    ///
    /// See https://docs.rs/tracing-subscriber/latest/tracing_subscriber/filter/struct.EnvFilter.html#directives
    #[clap(
        long = "log-directive",
        global = true,
        env = "GHA_SIGSTORE_CONFORMANCE_LOG_DIRECTIVES",
        value_delimiter = ',',
        num_args = 0..
    )]
    pub(crate) log_directives: Vec<Directive>,
}

impl Instrumentation {
    pub(crate) fn log_level(&self) -> String {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
        .to_string()
    }

    /// Debug tracing of the action implies at least `-v`.
    pub(crate) fn raise_to_debug(&mut self) {
        self.verbose = self.verbose.max(1);
    }

    pub(crate) fn setup(&self) -> color_eyre::Result<()> {
        let filter_layer = self.filter_layer()?;

        let registry = tracing_subscriber::registry()
            .with(filter_layer)
            .with(ErrorLayer::default());

        match self.logger {
            Logger::Compact => {
                let fmt_layer = self.fmt_layer_compact();
                registry.with(fmt_layer).try_init()?
            }
            Logger::Full => {
                let fmt_layer = self.fmt_layer_full();
                registry.with(fmt_layer).try_init()?
            }
            Logger::Pretty => {
                let fmt_layer = self.fmt_layer_pretty();
                registry.with(fmt_layer).try_init()?
            }
            Logger::Json => {
                let fmt_layer = self.fmt_layer_json();
                registry.with(fmt_layer).try_init()?
            }
        }

        Ok(())
    }

    // Logs go to stderr; stdout is reserved for workflow commands like `::error::`.
    pub(crate) fn fmt_layer_full<S>(&self) -> impl Layer<S>
    where
        S: Subscriber + for<'span> LookupSpan<'span>,
    {
        tracing_subscriber::fmt::Layer::new()
            .with_ansi(std::io::stderr().is_terminal())
            .with_writer(std::io::stderr)
    }

    pub(crate) fn fmt_layer_pretty<S>(&self) -> impl Layer<S>
    where
        S: Subscriber + for<'span> LookupSpan<'span>,
    {
        tracing_subscriber::fmt::Layer::new()
            .with_ansi(std::io::stderr().is_terminal())
            .with_writer(std::io::stderr)
            .pretty()
    }

    pub(crate) fn fmt_layer_json<S>(&self) -> impl Layer<S>
    where
        S: Subscriber + for<'span> LookupSpan<'span>,
    {
        tracing_subscriber::fmt::Layer::new()
            .with_ansi(std::io::stderr().is_terminal())
            .with_writer(std::io::stderr)
            .json()
    }

    pub(crate) fn fmt_layer_compact<S>(&self) -> impl Layer<S>
    where
        S: Subscriber + for<'span> LookupSpan<'span>,
    {
        tracing_subscriber::fmt::Layer::new()
            .with_ansi(std::io::stderr().is_terminal())
            .with_writer(std::io::stderr)
            .compact()
            .without_time()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_file(false)
            .with_line_number(false)
    }

    pub(crate) fn filter_layer(&self) -> color_eyre::Result<EnvFilter> {
        let mut filter_layer = match EnvFilter::try_from_default_env() {
            Ok(layer) => layer,
            Err(e) => {
                // If the user sets `RUST_LOG` and it fails to parse, that's an error.
                if let Some(source) = std::error::Error::source(&e) {
                    match source.downcast_ref::<std::env::VarError>() {
                        Some(std::env::VarError::NotPresent) => (),
                        _ => return Err(e).wrap_err_with(|| "parsing RUST_LOG directives"),
                    }
                }
                EnvFilter::try_new(self.default_directive())?
            }
        };

        for directive in &self.log_directives {
            let directive_clone = directive.clone();
            filter_layer = filter_layer.add_directive(directive_clone);
        }

        Ok(filter_layer)
    }

    fn default_directive(&self) -> String {
        format!(
            "{}={}",
            env!("CARGO_PKG_NAME").replace('-', "_"),
            self.log_level()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_raises_but_never_lowers() {
        let mut instrumentation = Instrumentation::default();
        assert_eq!(instrumentation.log_level(), "info");

        instrumentation.raise_to_debug();
        assert_eq!(instrumentation.log_level(), "debug");

        instrumentation.verbose = 2;
        instrumentation.raise_to_debug();
        assert_eq!(instrumentation.log_level(), "trace");
    }

    #[test]
    fn default_directive_targets_this_crate() {
        let instrumentation = Instrumentation {
            verbose: 1,
            ..Default::default()
        };
        assert_eq!(
            instrumentation.default_directive(),
            "sigstore_conformance_action=debug"
        );
        assert!(EnvFilter::try_new(instrumentation.default_directive()).is_ok());
    }
}
