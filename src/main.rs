#[tokio::main]
async fn main() {
    if let Err(e) = devops_dashboard::run().await {
        log::error!("[server] {}", e);
        eprintln!("devops-dashboard: {}", e);
        std::process::exit(1);
    }
}
