use desk_sim::cli::{self, Command, FormatArg};
use desk_sim::config;
use desk_sim::error::Result;
use desk_sim::logging::LoggingConfig;
use desk_sim::output::{self, Formatter, HumanFormatter, JsonFormatter, SummaryFormatter};
use desk_sim::runner::ReplicationRunner;
use tracing::error;

fn main() {
    if let Err(err) = run() {
        error!(%err, "desk-sim failed");
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = cli::parse_args()?;
    LoggingConfig::from_verbosity(cli.verbose).init()?;

    match cli.command {
        Command::Run(args) => {
            let (config, format) = config::build_config(&args)?;
            let runner = ReplicationRunner::new(config)?;
            let report = runner.run()?;
            let formatter = formatter_for(&format);
            print!("{}", formatter.write(&report));
        }
        Command::ShowConfig(args) => {
            let config = config::load_config(&args.config)?;
            let runner = ReplicationRunner::new(config)?;
            print!("{}", output::describe_config(runner.config(), runner.roster()));
        }
    }

    Ok(())
}

fn formatter_for(format: &FormatArg) -> Box<dyn Formatter> {
    match format {
        FormatArg::Human => Box::new(HumanFormatter),
        FormatArg::Summary => Box::new(SummaryFormatter),
        FormatArg::Json => Box::new(JsonFormatter),
    }
}
