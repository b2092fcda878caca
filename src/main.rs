use vhost_server::config::{display::display_config, load_configs};
use vhost_server::error::Result;
use vhost_server::prelude::{Poll, errors, info};
use vhost_server::server::Server;

fn main() -> Result<()> {
    let mut args = std::env::args();
    let program = args.next().unwrap_or_else(|| "vhost_server".to_string());
    let Some(path) = args.next() else {
        errors!("Usage: {} <config_file>", program);
        std::process::exit(1);
    };
    let configs = load_configs(std::path::Path::new(&path))?;

    let owned: Vec<_> = configs.iter().map(|c| (**c).clone()).collect();
    display_config(&owned);

    let poll = Poll::new()?;
    let server = Server::new(configs, &poll)?;
    info!("starting event loop");
    server.run(poll)
}
