//! Runs the Wi-SUN B-route smart meter client: joins the meter's PAN and
//! exposes instantaneous power consumption on `/metrics`.

use clap::Parser;
use echonet_controller::config::Config;
use echonet_controller::electricity::ElectricityControllerNode;
use echonet_controller::metrics::PrometheusSink;
use std::sync::Arc;

fn main() {
    env_logger::init();
    let config = Config::parse();

    if let Err(e) = config.validate_broute_credentials() {
        log::error!("{}", e);
        std::process::exit(1);
    }

    let metrics = Arc::new(PrometheusSink::new());
    serve_metrics(config.metrics_addr.clone(), metrics.clone());

    let mut node = match ElectricityControllerNode::new(&config.serial_device, metrics) {
        Ok(n) => n,
        Err(e) => {
            log::error!("failed to open serial device {}: {}", config.serial_device, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = node.start(&config.broute_id, &config.broute_password) {
        log::error!("failed to join smart meter: {}", e);
        std::process::exit(1);
    }

    loop {
        match node.get_power_consumption() {
            Ok(watts) => log::info!("instantaneous power: {} W", watts),
            Err(e) => log::warn!("power read failed: {}", e),
        }
        std::thread::sleep(config.update_interval());
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
