use std::path::PathBuf;
use std::time::Duration;

use clap::{arg, command, crate_name, value_parser, Arg, ArgAction, ArgMatches, Command};
use client::account::CONNECTION_STRING_ENV;
use client::{Metadata, PollOptions};
use tracing_subscriber::EnvFilter;

mod cli;

#[tokio::main]
async fn main() {
    let cli = build_cli().get_matches();

    match cli.subcommand() {
        Some((cli::VERSION_SUBCOMMAND, _)) => cli::version::run(),
        Some((cli::BUGREPORT_SUBCOMMAND, _)) => cli::bugreport::run(),
        Some((cli::SERVER_SUBCOMMAND, _)) => cli::server::run().await,
        Some((name, matches)) => {
            init_logging();
            if let Err(e) = run_client(name, matches).await {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
        None => {}
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_client(name: &str, matches: &ArgMatches) -> client::Result<()> {
    let connection = string(matches, cli::CONNECTION_STRING_ARG);
    let service = cli::client::connect(connection)?;

    match name {
        cli::SHARE_SUBCOMMAND => match matches.subcommand() {
            Some((cli::LIST_SUBCOMMAND, _)) => cli::client::list_shares(&service).await,
            Some((cli::CREATE_SUBCOMMAND, m)) => {
                let quota = m.get_one::<u32>("quota").copied();
                let metadata: Metadata = m
                    .get_many::<(String, String)>("metadata")
                    .unwrap_or_default()
                    .cloned()
                    .collect();
                cli::client::create_share(&service, string(m, "name"), quota, metadata).await
            }
            Some((cli::SHOW_SUBCOMMAND, m)) => {
                cli::client::show_share(&service, string(m, "name")).await
            }
            Some((cli::DELETE_SUBCOMMAND, m)) => {
                cli::client::delete_share(&service, string(m, "name")).await
            }
            _ => Ok(()),
        },
        cli::MKDIR_SUBCOMMAND => {
            cli::client::make_directory(&service, string(matches, "share"), string(matches, "path"))
                .await
        }
        cli::UPLOAD_SUBCOMMAND => {
            cli::client::upload(
                &service,
                string(matches, "share"),
                string(matches, "path"),
                local(matches),
            )
            .await
        }
        cli::DOWNLOAD_SUBCOMMAND => {
            cli::client::download(
                &service,
                string(matches, "share"),
                string(matches, "path"),
                local(matches),
            )
            .await
        }
        cli::RANGES_SUBCOMMAND => {
            cli::client::list_ranges(&service, string(matches, "share"), string(matches, "path"))
                .await
        }
        cli::CLEAR_SUBCOMMAND => {
            cli::client::clear_range(
                &service,
                string(matches, "share"),
                string(matches, "path"),
                number(matches, "offset"),
                number(matches, "length"),
            )
            .await
        }
        cli::TREE_SUBCOMMAND => {
            let path = matches
                .get_one::<String>("path")
                .map_or("", String::as_str);
            cli::client::tree(&service, string(matches, "share"), path).await
        }
        cli::COPY_SUBCOMMAND => {
            let wait = matches.get_flag("wait").then(|| PollOptions {
                interval: Duration::from_millis(number(matches, "interval")),
                max_wait: matches
                    .get_one::<u64>("max-wait")
                    .map(|s| Duration::from_secs(*s)),
            });
            cli::client::copy(
                &service,
                string(matches, "share"),
                string(matches, "source"),
                string(matches, "destination"),
                wait,
            )
            .await
        }
        cli::RM_SUBCOMMAND => {
            cli::client::remove(
                &service,
                string(matches, "share"),
                string(matches, "path"),
                matches.get_flag("dir"),
            )
            .await
        }
        _ => Ok(()),
    }
}

// Required arguments are enforced by clap before any of these run.
fn string<'a>(matches: &'a ArgMatches, id: &str) -> &'a str {
    matches
        .get_one::<String>(id)
        .map_or("", String::as_str)
}

fn number(matches: &ArgMatches, id: &str) -> u64 {
    matches.get_one::<u64>(id).copied().unwrap_or_default()
}

fn local(matches: &ArgMatches) -> &std::path::Path {
    matches
        .get_one::<PathBuf>("local")
        .map_or_else(|| std::path::Path::new(""), PathBuf::as_path)
}

fn parse_metadata(pair: &str) -> Result<(String, String), String> {
    match pair.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
        _ => Err(format!("`{pair}` is not a KEY=VALUE pair")),
    }
}

fn connection_string() -> Arg {
    arg!(-c --"connection-string" <CONNECTION_STRING>)
        .required(true)
        .env(CONNECTION_STRING_ENV)
        .hide_env_values(true)
        .help("Account connection string, e.g. UseDevelopmentStorage=true")
}

fn share_arg() -> Arg {
    arg!(<share> "Share name")
}

fn path_arg() -> Arg {
    arg!(<path> "Path inside the share, components separated by /")
}

fn local_arg() -> Arg {
    arg!(<local> "Local file").value_parser(value_parser!(PathBuf))
}

fn client_command(name: &'static str, about: &'static str) -> Command {
    Command::new(name).about(about).arg(connection_string())
}

fn build_cli() -> Command {
    command!(crate_name!())
        .version(clap::crate_version!())
        .about(clap::crate_description!())
        .subcommand(Command::new(cli::VERSION_SUBCOMMAND).about(cli::VERSION_DESCRIPTION))
        .subcommand(Command::new(cli::BUGREPORT_SUBCOMMAND).about(cli::BUGREPORT_DESCRIPTION))
        .subcommand(Command::new(cli::SERVER_SUBCOMMAND).about(cli::SERVER_DESCRIPTION))
        .subcommand(
            client_command(cli::SHARE_SUBCOMMAND, cli::SHARE_DESCRIPTION)
                .subcommand_required(true)
                .subcommand(Command::new(cli::LIST_SUBCOMMAND).about(cli::SHARE_LIST_DESCRIPTION))
                .subcommand(
                    Command::new(cli::CREATE_SUBCOMMAND)
                        .about(cli::SHARE_CREATE_DESCRIPTION)
                        .arg(arg!(<name> "Share name"))
                        .arg(
                            arg!(-q --quota <GIB> "Quota in GiB, 1 to 5120")
                                .value_parser(value_parser!(u32).range(1..=5120)),
                        )
                        .arg(
                            arg!(-m --metadata <PAIR> "Metadata entry KEY=VALUE, may be repeated")
                                .action(ArgAction::Append)
                                .value_parser(parse_metadata),
                        ),
                )
                .subcommand(
                    Command::new(cli::SHOW_SUBCOMMAND)
                        .about(cli::SHARE_SHOW_DESCRIPTION)
                        .arg(arg!(<name> "Share name")),
                )
                .subcommand(
                    Command::new(cli::DELETE_SUBCOMMAND)
                        .about(cli::SHARE_DELETE_DESCRIPTION)
                        .arg(arg!(<name> "Share name")),
                ),
        )
        .subcommand(
            client_command(cli::MKDIR_SUBCOMMAND, cli::MKDIR_DESCRIPTION)
                .arg(share_arg())
                .arg(path_arg()),
        )
        .subcommand(
            client_command(cli::UPLOAD_SUBCOMMAND, cli::UPLOAD_DESCRIPTION)
                .arg(share_arg())
                .arg(path_arg())
                .arg(local_arg()),
        )
        .subcommand(
            client_command(cli::DOWNLOAD_SUBCOMMAND, cli::DOWNLOAD_DESCRIPTION)
                .arg(share_arg())
                .arg(path_arg())
                .arg(local_arg()),
        )
        .subcommand(
            client_command(cli::RANGES_SUBCOMMAND, cli::RANGES_DESCRIPTION)
                .arg(share_arg())
                .arg(path_arg()),
        )
        .subcommand(
            client_command(cli::CLEAR_SUBCOMMAND, cli::CLEAR_DESCRIPTION)
                .arg(share_arg())
                .arg(path_arg())
                .arg(
                    arg!(-o --offset <OFFSET> "First byte to clear")
                        .required(true)
                        .value_parser(value_parser!(u64)),
                )
                .arg(
                    arg!(-l --length <LENGTH> "Number of bytes to clear")
                        .required(true)
                        .value_parser(value_parser!(u64)),
                ),
        )
        .subcommand(
            client_command(cli::TREE_SUBCOMMAND, cli::TREE_DESCRIPTION)
                .arg(share_arg())
                .arg(arg!([path] "Directory to start from, the share root when absent")),
        )
        .subcommand(
            client_command(cli::COPY_SUBCOMMAND, cli::COPY_DESCRIPTION)
                .arg(share_arg())
                .arg(arg!(<source> "Source file path"))
                .arg(arg!(<destination> "Destination file path"))
                .arg(arg!(-w --wait "Poll until the copy finishes"))
                .arg(
                    arg!(-i --interval <MILLISECONDS> "Poll interval")
                        .default_value("1000")
                        .value_parser(value_parser!(u64)),
                )
                .arg(
                    arg!(--"max-wait" <SECONDS> "Give up waiting after this long")
                        .value_parser(value_parser!(u64)),
                ),
        )
        .subcommand(
            client_command(cli::RM_SUBCOMMAND, cli::RM_DESCRIPTION)
                .arg(share_arg())
                .arg(path_arg())
                .arg(arg!(-d --dir "The path is a directory")),
        )
        .arg_required_else_help(true)
        .disable_version_flag(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn copy_arguments() {
        // Act
        let matches = build_cli()
            .try_get_matches_from([
                "fshare",
                "copy",
                "-c",
                "UseDevelopmentStorage=true",
                "s1",
                "a",
                "b",
                "--wait",
                "--max-wait",
                "30",
            ])
            .unwrap();

        // Assert
        let (name, copy) = matches.subcommand().unwrap();
        assert_eq!(name, cli::COPY_SUBCOMMAND);
        assert_eq!(string(copy, "source"), "a");
        assert_eq!(string(copy, "destination"), "b");
        assert!(copy.get_flag("wait"));
        assert_eq!(number(copy, "interval"), 1000);
        assert_eq!(copy.get_one::<u64>("max-wait"), Some(&30));
    }

    #[test]
    fn share_create_collects_metadata() {
        // Act
        let matches = build_cli()
            .try_get_matches_from([
                "fshare",
                "share",
                "-c",
                "UseDevelopmentStorage=true",
                "create",
                "s1",
                "-q",
                "10",
                "-m",
                "owner=ops",
                "-m",
                "tier=hot",
            ])
            .unwrap();

        // Assert
        let (_, share) = matches.subcommand().unwrap();
        let (_, create) = share.subcommand().unwrap();
        assert_eq!(create.get_one::<u32>("quota"), Some(&10));
        let metadata: Vec<&(String, String)> = create.get_many("metadata").unwrap().collect();
        assert_eq!(metadata.len(), 2);
    }

    #[test]
    fn quota_out_of_range_rejected() {
        // Act
        let result = build_cli().try_get_matches_from([
            "fshare",
            "share",
            "-c",
            "UseDevelopmentStorage=true",
            "create",
            "s1",
            "-q",
            "6000",
        ]);

        // Assert
        assert!(result.is_err());
    }

    #[test]
    fn metadata_pairs() {
        assert_eq!(
            parse_metadata("k=v=w"),
            Ok(("k".to_owned(), "v=w".to_owned()))
        );
        assert!(parse_metadata("=v").is_err());
        assert!(parse_metadata("novalue").is_err());
    }
}
