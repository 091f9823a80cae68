use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use webmpc_mock_server::MockServer;

const DEFAULT_ADDR: &str = "127.0.0.1:0";

fn parse_arg_value(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let addr = parse_arg_value(&args, "--addr")
        .or_else(|| std::env::var("WEBMPC_MOCK_ADDR").ok())
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());

    let addr_file = parse_arg_value(&args, "--addr-file").map(PathBuf::from);
    let run_for_ms = parse_arg_value(&args, "--run-for-ms")
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis);

    let mut server = match MockServer::start(&addr) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    if let Some(path) = &addr_file {
        let _ = fs::write(path, server.addr().to_string());
    }

    println!("mock_server listening on {}", server.ws_url());

    let start = Instant::now();
    loop {
        thread::sleep(Duration::from_millis(100));
        if let Some(max) = run_for_ms {
            if start.elapsed() >= max {
                break;
            }
        }
    }

    eprintln!("handled {} commands", server.received().len());
    server.shutdown();
}
