use kestrel_client::client;
use kestrel_logger::log::log;
use kestrel_logger::severity::LogSeverity::Info;

#[tokio::main]
async fn main() {
    log("Kestrel init".to_owned(), Info);
    client::run().await;
}
