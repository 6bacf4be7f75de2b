#[tokio::main]
async fn main() {
    if let Err(e) = echomind_lib::run().await {
        eprintln!("echomind: {e}");
        std::process::exit(1);
    }
}
