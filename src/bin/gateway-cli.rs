use clap::{Parser, Subcommand};
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;

use rpc_gateway::codec::xmlrpc::{marshal_call, parse_response};
use rpc_gateway::codec::MethodResponse;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Client for the RPC gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Basic-auth user forwarded to the called method.
    #[arg(long)]
    user: Option<String>,

    #[arg(long, default_value = "")]
    password: String,

    /// Deadline sent as `grpc-timeout`, in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List callable methods
    List,
    /// Check gateway health
    Health,
    /// Call a method over the JSON transport
    Call {
        method: String,
        #[arg(default_value = "{}")]
        body: String,
        /// Fold a streamed response into one document
        #[arg(long)]
        merge: bool,
    },
    /// Call a method over XML-RPC with a JSON object as the struct parameter
    Xmlrpc {
        method: String,
        #[arg(default_value = "{}")]
        params: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let request = match &cli.command {
        Commands::List => client.get(format!("{}/", cli.url)),
        Commands::Health => client.get(format!("{}/health", cli.url)),
        Commands::Call { method, body, merge } => client
            .post(format!("{}/{}?merge={}", cli.url, method, u8::from(*merge)))
            .header(CONTENT_TYPE, "application/json")
            .body(body.clone()),
        Commands::Xmlrpc { method, params } => {
            let params: Value = serde_json::from_str(params)?;
            client
                .post(format!("{}/xmlrpc", cli.url))
                .header(CONTENT_TYPE, "text/xml")
                .body(marshal_call(method, &[params]))
        }
    };

    let mut request = request.header("x-request-id", uuid::Uuid::new_v4().to_string());
    if let Some(user) = &cli.user {
        request = request.basic_auth(user, Some(&cli.password));
    }
    if let Some(ms) = cli.timeout_ms {
        request = request.header("grpc-timeout", format!("{}m", ms));
    }

    let res = request.send().await?;
    let status = res.status();
    let body = res.bytes().await?;
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        eprintln!("Response: {}", String::from_utf8_lossy(&body));
        std::process::exit(1);
    }

    match cli.command {
        Commands::Xmlrpc { .. } => match parse_response(&body)? {
            MethodResponse::Value(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            MethodResponse::Fault(fault) => {
                eprintln!("Fault {}: {}", fault.code, fault.message);
                std::process::exit(2);
            }
        },
        _ => print_json_lines(&body)?,
    }
    Ok(())
}

/// Pretty-print each JSON document of a (possibly newline-delimited) body.
fn print_json_lines(body: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
    for line in body.split(|b| *b == b'\n').filter(|l| !l.trim_ascii().is_empty()) {
        match serde_json::from_slice::<Value>(line) {
            Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
            Err(_) => println!("{}", String::from_utf8_lossy(line)),
        }
    }
    Ok(())
}
