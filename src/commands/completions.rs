//! `nimbus completions` — shell completion script generation.

use crate::cli::{Cli, CompletionsArgs, Shell};
use anyhow::Result;
use clap::CommandFactory;
use clap_complete::Generator;
use clap_complete_nushell::Nushell;
use std::io;

fn print_completions<G: Generator>(generator: G, cmd: &mut clap::Command) {
    clap_complete::generate(generator, cmd, cmd.get_name().to_string(), &mut io::stdout());
}

pub fn run(args: CompletionsArgs) -> Result<()> {
    let mut cmd = Cli::command();

    match args.shell {
        Shell::Bash => print_completions(clap_complete::Shell::Bash, &mut cmd),
        Shell::Zsh => print_completions(clap_complete::Shell::Zsh, &mut cmd),
        Shell::Fish => print_completions(clap_complete::Shell::Fish, &mut cmd),
        Shell::Nushell => print_completions(Nushell, &mut cmd),
    }

    Ok(())
}
