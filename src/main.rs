fn main() -> anyhow::Result<()> {
    taskrow::cli::run()
}
