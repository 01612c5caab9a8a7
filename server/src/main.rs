use std::env;

use tokio::io;
use tracing_subscriber::fmt;
use tracing::{info, Level};

use wirechat_server::ServerListener;

#[tokio::main]
async fn main() -> io::Result<()> {
    fmt()
        .compact() // use abbreviated log format
        .with_max_level(Level::INFO)
        .with_thread_ids(true) // display thread id where event happens
        .init(); // set as default subscriber

    // first argument overrides the listen address
    let addr = env::args().nth(1).unwrap_or_else(|| protocol::DEFAULT_ADDR.to_owned());

    info!("Server starting.. {:?}", &addr);

    let listener = ServerListener::bind(addr.as_str()).await?;
    listener.run().await
}
