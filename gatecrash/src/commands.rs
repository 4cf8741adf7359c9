use crate::CLAP_STYLING;
use clap::{arg, command};
use url::Url;

pub(crate) fn command_argument_builder() -> clap::Command {
    command!("gatecrash")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("gatecrash")
        .about(
            "Audits web login forms for weak credentials using blind response \
            differencing. Only run against systems you are authorized to test.",
        )
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner and non-essential output").required(false))
        .arg(
            arg!(-u --"url" <URL>)
                .required(false)
                .help("A single login page URL to audit")
                .value_parser(clap::value_parser!(Url))
                .conflicts_with("targets-file"),
        )
        .arg(
            arg!(-T --"targets-file" <PATH>)
                .required(false)
                .help("Path to a newline-delimited file of login page URLs")
                .value_parser(clap::value_parser!(std::path::PathBuf))
                .conflicts_with("url"),
        )
        .arg(
            arg!(-t --"threads" <NUM_WORKERS>)
                .required(false)
                .help("The number of async trial workers used within one target.")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            arg!(-c --"config" <PATH>)
                .required(false)
                .help("JSON configuration file; missing sections fall back to defaults")
                .value_parser(clap::value_parser!(std::path::PathBuf)),
        )
        .arg(
            arg!(-U --"user-list" <PATH>)
                .required(false)
                .help("Extra username wordlist merged into the built-in dictionary"),
        )
        .arg(
            arg!(-P --"pass-list" <PATH>)
                .required(false)
                .help("Extra password wordlist merged into the built-in dictionary"),
        )
        .arg(
            arg!(--"proxy" <URL>)
                .required(false)
                .help("Route every request through this proxy (e.g. http://127.0.0.1:8080)"),
        )
        .arg(
            arg!(--"sql-injection")
                .required(false)
                .help("Always rerun with the SQL injection payload list after dictionary exhaustion")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            arg!(--"log-dir" <PATH>)
                .required(false)
                .help("Directory that receives the dated activity and success logs")
                .default_value("logs"),
        )
}
