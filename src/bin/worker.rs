#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = exam_attempts::run_worker().await {
        eprintln!("exam-attempts worker fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
