//! Userspace side of the UDP capture pipeline: open the pinned transport
//! channel, poll it, and hand each decoded event to a display or
//! forwarding sink.

pub mod channel;
pub mod consumer;
pub mod forward;

/// Logging setup shared by all the tools.
///
/// `RUST_LOG` wins when set; otherwise `--debug` raises the level so the
/// per-event diagnostics become visible.
pub fn init_tracing(debug: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let default = if debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Parses a tool's command line.
///
/// Help and version requests terminate normally with exit code 0;
/// anything malformed (bad port range, bad IP literal, unknown flag)
/// prints the usage error and exits 1.
pub fn parse_args<T: clap::Parser>() -> T {
    match T::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let code = exit_code_for(&err);
            let _ = err.print();
            std::process::exit(code);
        }
    }
}

fn exit_code_for(err: &clap::Error) -> i32 {
    if err.use_stderr() {
        1
    } else {
        0
    }
}
