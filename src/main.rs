use portwho::docker::DockerInventory;
use portwho::rpc::RpcResolver;
use portwho::{directory, report, sockets};

fn main() -> anyhow::Result<()> {
    init_tracing();

    let records = directory::collect_process_records()?;
    let mut containers = DockerInventory::new();
    let process_directory = directory::build_directory(&records, &mut containers);

    let socket_table = sockets::collect_sockets()?;

    let mut rpc = RpcResolver::new();
    let rows = report::reconcile(&socket_table, &process_directory, &mut rpc);
    report::print_report(&rows);

    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "portwho=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
