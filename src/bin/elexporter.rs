//! Runs the ECHONET Lite LAN controller: discovers home air conditioners
//! on the local network and exposes their temperatures on `/metrics`.

use clap::Parser;
use echonet_controller::class_dictionary::ClassDictionary;
use echonet_controller::config::Config;
use echonet_controller::controller::ControllerNode;
use echonet_controller::metrics::PrometheusSink;
use std::path::Path;
use std::sync::Arc;

fn main() {
    env_logger::init();
    let config = Config::parse();

    let dictionary = Arc::new(ClassDictionary::load(Path::new(&config.class_db_dir)));
    let metrics = Arc::new(PrometheusSink::new());

    serve_metrics(config.metrics_addr.clone(), metrics.clone());

    let mut node = match ControllerNode::new(dictionary, metrics) {
        Ok(n) => n,
        Err(e) => {
            log::error!("failed to start controller: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = node.start() {
        log::error!("controller exited: {}", e);
        std::process::exit(1);
    }
}

fn serve_metrics(addr: String, sink: Arc<PrometheusSink>) {
    std::thread::spawn(move || {
        let server = match tiny_http::Server::http(&addr) {
            Ok(s) => s,
            Err(e) => {
                log::error!("failed to bind metrics listener on {}: {}", addr, e);
                return;
            }
        };
        log::info!("metrics listening on {}", addr);

        for request in server.incoming_requests() {
            let body = sink.encode();
            let response = tiny_http::Response::from_string(body);
            if let Err(e) = request.respond(response) {
                log::warn!("failed to write metrics response: {}", e);
            }
        }
    });
}
