use clap::Parser;

#[derive(Debug, Parser)]
pub struct Args {
    /// Address for the HTTP API (ingestion, replica reports, decisions,
    /// metrics, health).
    #[arg(long, default_value = "0.0.0.0:18090")]
    pub listen_addr: String,

    /// Control loop tick interval, in seconds.
    #[arg(long, default_value_t = 5)]
    pub tick_interval_secs: u64,

    /// Hard-cap SCALE_UP at `max_replicas + num_overprovision`
    /// (`serve.strict_max_capacity`). Passed explicitly into the decision
    /// generator rather than read from global config at decision time.
    #[arg(long, env = "AUTOSCALE_STRICT_MAX_CAPACITY", action = clap::ArgAction::Set, default_value_t = true)]
    pub strict_max_capacity: bool,

    /// Log output format: "text" (human-readable, default) or "json".
    #[arg(long, env = "AUTOSCALE_LOG_FORMAT", default_value = "text")]
    pub log_format: String,
}
