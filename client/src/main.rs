use std::env;

use async_trait::async_trait;
use tokio::select;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_stream::StreamExt; // provides combinator methods like next on to of FramedRead buf read and Stream trait

use tracing_subscriber::fmt;
use tracing::{info, warn, Level};

use protocol::{Packet, UserStatus, DEFAULT_ADDR};
use wirechat_client::{Client, ClientError, PacketHandler};

const GREETINGS: &str = "WELCOME! TYPE AND PRESS RETURN TO SEND MESSAGES. \\quit TO LEAVE.";

// Prints chat events to stdout
struct Printer;

#[async_trait]
impl PacketHandler for Printer {
    async fn handle(&mut self, packet: Packet) {
        match packet {
            Packet::UserWroteMessage { name, message } => println!("{}: {}", name, message),
            Packet::UserStatusWasUpdated { name, status: UserStatus::LoggedIn } => println!(">>> {} LOGGED IN", name),
            Packet::UserStatusWasUpdated { name, status: UserStatus::LoggedOut } => println!(">>> {} DISCONNECTED", name),
            Packet::UserStatusWasUpdated { name, status: UserStatus::Typing } => println!(">>> {} is typing...", name),
            Packet::UserStatusWasUpdated { status: UserStatus::NotTyping, .. } => {}
            other => info!("Received from server: {}", other),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    fmt()
        .compact() // use abbreviated log format
        .with_max_level(Level::INFO)
        .with_thread_ids(true) // display thread id where event happens
        .init(); // set as default subscriber

    // optional requested name, then optional server address
    let mut args = env::args().skip(1);
    let name = args.next();
    let addr = args.next().unwrap_or_else(|| DEFAULT_ADDR.to_owned());

    info!("Client starting, connecting to server {:?}", &addr);

    let mut client = Client::connect(addr.as_str()).await?;
    let assigned = client.login(name.as_deref(), Printer).await?;
    println!("You logged in as \"{}\"", assigned);
    println!("{}", GREETINGS);

    // longer lines could not be relayed under our name and would get us disconnected
    let mut fr = FramedRead::new(tokio::io::stdin(), LinesCodec::new_with_max_length(client.max_message_len()));

    loop {
        select! {
            line = fr.next() => match line {
                Some(Ok(line)) if line == "\\quit" => {
                    info!("Session terminated by user...");
                    break;
                }
                Some(Ok(line)) if line.is_empty() => continue,
                Some(Ok(line)) => client.send(vec![Packet::SubmitMessage { message: line }]).await?,
                Some(Err(e)) => warn!("Ignoring input line: {}", e),
                None => break,
            },
            _ = client.closed() => {
                info!("Server has closed the connection");
                break;
            }
        }
    }

    client.close().await;
    Ok(())
}
