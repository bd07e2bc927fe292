//! Interactive client: relays stdin lines to the server and prints whatever
//! comes back, including pushed key updates.

use clap::Parser;
use courier_kv::protocol::MAX_MESSAGE_SIZE;
use courier_kv::telemetry::{self, LogLevel};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "courier-cli")]
#[command(about = "Interactive client for courier-kv")]
#[command(version)]
struct Args {
    /// Server address as `host:port`
    #[arg(default_value = "localhost:6969")]
    addr: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    telemetry::init_logging(LogLevel::from_flags(false, args.debug));

    let stream = match TcpStream::connect(&args.addr).await {
        Ok(stream) => stream,
        Err(e) => {
            error!(addr = %args.addr, "Error connecting to the server: {}", e);
            return;
        }
    };
    info!(addr = %args.addr, "Connected to the server");

    let (reader, writer) = stream.into_split();

    tokio::select! {
        _ = print_responses(reader) => {}
        _ = relay_stdin(writer) => {}
    }

    info!("Disconnected from server");
}

async fn print_responses(mut reader: OwnedReadHalf) {
    let mut buffer = [0u8; MAX_MESSAGE_SIZE];
    loop {
        match reader.read(&mut buffer).await {
            Ok(0) => {
                info!("Server closed connection");
                return;
            }
            Ok(n) => println!("{}", String::from_utf8_lossy(&buffer[..n])),
            Err(e) => {
                warn!("Error reading from server: {}", e);
                return;
            }
        }
    }
}

async fn relay_stdin(mut writer: OwnedWriteHalf) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if let Err(e) = writer.write_all(line.as_bytes()).await {
                    warn!("Error sending message to server: {}", e);
                    return;
                }
            }
            Ok(None) => return,
            Err(e) => {
                warn!("Error reading stdin: {}", e);
                return;
            }
        }
    }
}
