//! Entry point: serves the HTTP surface by default, or runs a one-shot /
//! interactive CLI against the same orchestrator container for local
//! debugging without standing up a server.

use std::io::{self, Write};
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use task_orchestrator_core::background;
use task_orchestrator_core::config::OrchestratorConfig;
use task_orchestrator_core::orchestrator::OrchestratorContainer;

#[cfg(feature = "web-server")]
use task_orchestrator_core::http::{self, RateLimiter};

#[tokio::main]
async fn main() -> Result<()> {
    init_logger("info")?;

    let args: Vec<String> = std::env::args().collect();
    let config = OrchestratorConfig::from_env();
    let container = Arc::new(OrchestratorContainer::new(config)?);

    match args.get(1).map(String::as_str) {
        None | Some("server") => run_server(container).await,
        Some("chat") => interactive_chat(container).await,
        Some("status") => {
            print_status(&container).await;
            Ok(())
        }
        Some("help") => {
            print_help();
            Ok(())
        }
        Some(_) => {
            let message = args[1..].join(" ");
            let response = container.handle_request(&message, None, false).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
    }
}

async fn run_server(container: Arc<OrchestratorContainer>) -> Result<()> {
    print_banner();

    #[cfg(feature = "web-server")]
    {
        let rate_limit = container.config.rate_limit;
        let limiter = Arc::new(RateLimiter::new(rate_limit));
        let routes = http::routes(container.clone(), limiter);

        tokio::spawn(background::run_autonomous_optimizer(
            container.clone(),
            background::DEFAULT_OPTIMIZER_INTERVAL,
        ));
        tokio::spawn(background::run_proactive_loop(
            container.clone(),
            background::DEFAULT_PROACTIVE_INTERVAL,
        ));

        let addr: SocketAddr = "0.0.0.0:8080".parse()?;
        println!("listening on http://{addr}");
        warp::serve(routes).run(addr).await;
        Ok(())
    }

    #[cfg(not(feature = "web-server"))]
    {
        println!("web-server feature disabled; rebuild with --features web-server");
        Ok(())
    }
}

async fn interactive_chat(container: Arc<OrchestratorContainer>) -> Result<()> {
    println!("orchestrator chat. type 'quit' to exit, 'status' for backend health.");
    let mut session_id: Option<String> = None;
    loop {
        print!("> ");
        io::stdout().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim();

        match input {
            "" => continue,
            "quit" | "exit" => break,
            "status" => print_status(&container).await,
            request => {
                let response = container.handle_request(request, session_id.clone(), true).await;
                session_id = Some(response.session_id.clone());
                println!("{}", response.response);
            }
        }
    }
    Ok(())
}

async fn print_status(container: &OrchestratorContainer) {
    let health = container.backends.aggregate_health().await;
    let stats = container.metrics.stats().await;
    println!("{}", serde_json::json!({ "backends": health, "metrics": stats }));
}

fn print_banner() {
    println!(
        r#"
task-orchestrator-core
autonomous planning and execution over a small set of HTTP backends
"#
    );
}

fn print_help() {
    println!(
        r#"
usage:
  orchestrator              start the HTTP server (default)
  orchestrator chat         interactive REPL against the orchestrator
  orchestrator status       print backend health and metrics once
  orchestrator <message>    run one request through the orchestrator, print the JSON response
"#
    );
}

fn init_logger(level: &str) -> Result<()> {
    let filter = match level {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_target(false)
        .init();

    Ok(())
}
