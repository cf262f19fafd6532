fn main() -> anyhow::Result<()> {
    purple_notes::cli::run()
}
