/// Runs the emulator until Ctrl+C or SIGTERM. Settings come from the
/// `FSHARE_*` environment variables.
pub async fn run() {
    server::run().await;
}
