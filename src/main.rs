fn main() -> anyhow::Result<()> {
    log_sift::run()
}
