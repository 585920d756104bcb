use gridump::cli;
use gridump::config::env;

fn main() {
    // Install global collector configured based on GRIDUMP_LOG env var.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env(env::LOG_DIRECTIVE)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .on_thread_start(|| tracing::trace!("thread start"))
        .on_thread_stop(|| tracing::trace!("thread stop"))
        .enable_time()
        .build();

    let code = match runtime {
        Ok(runtime) => runtime.block_on(run()),
        Err(err) => {
            eprintln!("{}", err);
            2
        }
    };
    std::process::exit(code);
}

async fn run() -> i32 {
    match cli::parse().run().await {
        Ok(outcome) => outcome.exit_code(),
        Err(err) => {
            eprintln!("{}", err);
            2
        }
    }
}
