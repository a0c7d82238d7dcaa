use std::env;

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
struct VersionInfo {
    name: &'static str,
    version: &'static str,
    os: &'static str,
    architecture: &'static str,
    default_endpoint: &'static str,
}

pub fn run() {
    let info = VersionInfo {
        name: clap::crate_name!(),
        version: clap::crate_version!(),
        os: env::consts::OS,
        architecture: env::consts::ARCH,
        default_endpoint: client::account::DEVELOPMENT_ENDPOINT,
    };

    println!("Name           : {}", info.name);
    println!("Version        : {}", info.version);
    println!("OS             : {}", info.os);
    println!("Architecture   : {}", info.architecture);
    println!("Emulator       : {}", info.default_endpoint);
}
