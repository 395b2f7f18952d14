use clap::Parser;

/// Command-line options for unsub.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Soft cap on how many candidate messages to discover.
    #[arg(long)]
    pub max_results: Option<usize>,

    /// Unsubscribe from every discovered sender without prompting.
    #[arg(long)]
    pub all: bool,

    /// Scan and print the ranked sender list, then exit without dispatching.
    #[arg(long)]
    pub list_only: bool,
}
