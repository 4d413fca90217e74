use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;

/// Caching, rule-routing DNS forwarder
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// DNS server host, overrides the config file value
    #[arg(long, env = "DNSRELAY_HOST")]
    pub host: Option<IpAddr>,

    /// DNS server port, overrides the config file value
    #[arg(long, env = "DNSRELAY_PORT")]
    pub port: Option<u16>,

    /// Path to the configuration file
    #[arg(long, env = "DNSRELAY_CONF")]
    pub conf: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error
    #[arg(long, env = "DNSRELAY_LOG_LEVEL")]
    pub log_level: Option<String>,
}
