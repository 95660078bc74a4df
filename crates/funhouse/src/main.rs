mod cli;
mod output;
mod paths;
mod run;
mod source;

use anyhow::Result;
use cli::Command;
use run::AppContext;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Command::Check(args) => run::run_check(&args),
        Command::Effects => run::run_effects(&AppContext::load(cli.config.as_deref())?),
        Command::Render(args) => run::run_render(AppContext::load(cli.config.as_deref())?, &args),
        Command::Preview(args) => {
            run::run_preview(AppContext::load(cli.config.as_deref())?, &args)
        }
    }
}
