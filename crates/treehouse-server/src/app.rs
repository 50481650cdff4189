use clap::{Arg, ArgAction, Command};

pub fn build_cli() -> Command {
    Command::new("treehouse")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Run coding agents in parallel, one git worktree per branch")
        .long_about("treehouse serves an HTTP and WebSocket API for creating git worktrees from base repositories and running an external coding-assistant CLI inside them. Each session is an independent process streamed back to the client that started it.")
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .help("Config file applied on top of user and project config")
                .value_parser(clap::value_parser!(std::path::PathBuf)),
        )
        .arg(
            Arg::new("port")
                .long("port")
                .short('p')
                .help("Port to listen on (overrides config)")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("bind")
                .long("bind")
                .help("Address to bind (overrides config)"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Only log errors")
                .action(ArgAction::SetTrue),
        )
}
