use bugreport::{
    bugreport,
    collector::{CompileTimeInformation, EnvironmentVariables, OperatingSystem, SoftwareVersion},
    format::Markdown,
};

// FSHARE_CONNECTION_STRING carries the account key and is left out.
const REPORTED_VARIABLES: &[&str] = &[
    "SHELL",
    "TERM",
    "RUST_LOG",
    "FSHARE_DATA_DIR",
    "FSHARE_DATA_FILE",
    "FSHARE_PORT",
    "FSHARE_COPY_DELAY_MS",
];

pub fn run() {
    bugreport!()
        .info(SoftwareVersion::default())
        .info(OperatingSystem::default())
        .info(EnvironmentVariables::list(REPORTED_VARIABLES))
        .info(CompileTimeInformation::default())
        .print::<Markdown>();
}
