fn main() -> anyhow::Result<()> {
    launch_feed::cli::run()
}
