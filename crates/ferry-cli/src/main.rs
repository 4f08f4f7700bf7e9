use std::process;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::{Parser, Subcommand};
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde_json::{json, Map, Value};

#[derive(Parser)]
#[command(name = "ferry", about = "Ferry event bus CLI")]
struct Cli {
    /// Server address
    #[arg(long, default_value = "http://localhost:8080", global = true)]
    addr: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage queues
    #[command(subcommand)]
    Queue(QueueCommands),

    /// Push, poll and settle events
    #[command(subcommand)]
    Event(EventCommands),
}

#[derive(Subcommand)]
enum QueueCommands {
    /// Create a queue and its dead-letter queue
    Create {
        /// Queue name
        name: String,

        /// Number of partitions
        #[arg(long, default_value = "1")]
        partitions: usize,

        /// Ack timeout in minutes
        #[arg(long, default_value = "30")]
        ack_timeout: u32,
    },

    /// Delete a queue, its partitions and its dead-letter queue
    Delete {
        /// Queue name
        name: String,
    },

    /// Grow a queue to more partitions
    Scale {
        /// Queue name
        name: String,

        /// New number of partitions
        partitions: usize,
    },

    /// Drop every buffered event of a queue
    Clear {
        /// Queue name
        name: String,
    },

    /// Show queue statistics
    Info {
        /// Queue name
        name: String,
    },

    /// List queues and dead-letter queues
    List,
}

#[derive(Subcommand)]
enum EventCommands {
    /// Push an event
    Push {
        /// Queue name
        queue: String,

        #[arg(long, default_value = "")]
        key: String,

        #[arg(long, default_value = "")]
        body: String,

        /// Header as name=value; may be repeated
        #[arg(long = "header", value_parser = parse_header)]
        headers: Vec<(String, String)>,
    },

    /// Take the next event and start a delivery
    Poll {
        /// Queue name
        queue: String,
    },

    /// Show the next event without delivering it
    Peek {
        /// Queue name
        queue: String,
    },

    /// Acknowledge a delivery
    Ack {
        /// Queue name
        queue: String,

        /// Delivery id returned by poll
        delivery_id: String,
    },

    /// Move a delivery to the dead-letter queue
    DeadLetter {
        /// Queue name
        queue: String,

        /// Delivery id returned by poll
        delivery_id: String,
    },
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected name=value, got \"{raw}\"")),
    }
}

struct BusClient {
    http: Client,
    base: Url,
}

impl BusClient {
    fn new(addr: &str) -> Result<Self, String> {
        let base = Url::parse(addr).map_err(|e| format!("invalid address {addr}: {e}"))?;
        if base.cannot_be_a_base() {
            return Err(format!("invalid address {addr}"));
        }
        Ok(Self {
            http: Client::new(),
            base,
        })
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(["api", "bus"]).extend(segments);
        }
        self.http.request(method, url)
    }

    /// Send and return the JSON body, if any. Error bodies become
    /// `code: message`.
    async fn send(&self, request: RequestBuilder) -> Result<Option<Value>, String> {
        let response = request
            .send()
            .await
            .map_err(|e| format!("unavailable: cannot reach {}: {e}", self.base))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| format!("unavailable: {e}"))?;

        if !status.is_success() {
            return Err(match serde_json::from_str::<Value>(&text) {
                Ok(body) => format!(
                    "{}: {}",
                    body["code"].as_str().unwrap_or("unknown"),
                    body["message"].as_str().unwrap_or(text.as_str())
                ),
                Err(_) => format!("http_{}: {text}", status.as_u16()),
            });
        }
        if status == StatusCode::ACCEPTED || text.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| format!("invalid_response: {e}"))
    }
}

fn print_json(value: Option<Value>) {
    if let Some(value) = value {
        match serde_json::to_string_pretty(&value) {
            Ok(text) => println!("{text}"),
            Err(_) => println!("{value}"),
        }
    }
}

async fn run(client: &BusClient, command: Commands) -> Result<(), String> {
    match command {
        Commands::Queue(cmd) => run_queue(client, cmd).await,
        Commands::Event(cmd) => run_event(client, cmd).await,
    }
}

async fn run_queue(client: &BusClient, command: QueueCommands) -> Result<(), String> {
    match command {
        QueueCommands::Create {
            name,
            partitions,
            ack_timeout,
        } => {
            let request = client.request(Method::POST, &["queue"]).query(&[
                ("queueName", name.clone()),
                ("numberOfPartitions", partitions.to_string()),
                ("maxAckTimeout", ack_timeout.to_string()),
            ]);
            client.send(request).await?;
            println!("Created queue \"{name}\"");
        }
        QueueCommands::Delete { name } => {
            client
                .send(client.request(Method::DELETE, &["queue", &name]))
                .await?;
            println!("Deleted queue \"{name}\"");
        }
        QueueCommands::Scale { name, partitions } => {
            let request = client.request(Method::POST, &["queue", "scale"]).query(&[
                ("queueName", name.clone()),
                ("numberOfPartitions", partitions.to_string()),
            ]);
            client.send(request).await?;
            println!("Scaled queue \"{name}\" to {partitions} partitions");
        }
        QueueCommands::Clear { name } => {
            let request = client
                .request(Method::POST, &["queue", "clear"])
                .query(&[("queueName", &name)]);
            client.send(request).await?;
            println!("Cleared queue \"{name}\"");
        }
        QueueCommands::Info { name } => {
            print_json(
                client
                    .send(client.request(Method::GET, &["queue", "info", &name]))
                    .await?,
            );
        }
        QueueCommands::List => {
            print_json(client.send(client.request(Method::GET, &["queues"])).await?);
        }
    }
    Ok(())
}

async fn run_event(client: &BusClient, command: EventCommands) -> Result<(), String> {
    match command {
        EventCommands::Push {
            queue,
            key,
            body,
            headers,
        } => {
            let header: Map<String, Value> = headers
                .into_iter()
                .map(|(name, value)| (name, Value::String(value)))
                .collect();
            let event = json!({
                "header": header,
                "key": STANDARD.encode(key),
                "body": STANDARD.encode(body),
            });
            let request = client
                .request(Method::POST, &["queue", "event"])
                .query(&[("queueName", &queue)])
                .json(&event);
            client.send(request).await?;
            println!("Pushed event to \"{queue}\"");
        }
        EventCommands::Poll { queue } => {
            print_json(
                client
                    .send(client.request(Method::GET, &["queue", "event", &queue]))
                    .await?,
            );
        }
        EventCommands::Peek { queue } => {
            print_json(
                client
                    .send(client.request(Method::GET, &["queue", "event", "peek", &queue]))
                    .await?,
            );
        }
        EventCommands::Ack { queue, delivery_id } => {
            let request = client
                .request(Method::POST, &["queue", "ack"])
                .query(&[("queueName", &queue), ("deliveryId", &delivery_id)]);
            client.send(request).await?;
            println!("Acked {delivery_id}");
        }
        EventCommands::DeadLetter { queue, delivery_id } => {
            let request = client
                .request(Method::POST, &["queue", "deadletter"])
                .query(&[("queueName", &queue), ("deliveryId", &delivery_id)]);
            client.send(request).await?;
            println!("Moved {delivery_id} to the dead-letter queue of \"{queue}\"");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let client = match BusClient::new(&cli.addr) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("error: invalid_argument: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = run(&client, cli.command).await {
        eprintln!("error: {e}");
        process::exit(1);
    }
}
